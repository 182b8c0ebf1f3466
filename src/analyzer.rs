use crate::error::{EstimateError, Result};
use crate::loader::RawTable;
use crate::models::{
    AtarBound, Config, CourseRecord, RangeConfig, ReportRow, ScalingConfig, Student,
};
use crate::records::RecordNormalizer;
use crate::scaling::ScalingStore;

const LOWER_BOUND: &str = "LowerBound";
const ATAR: &str = "ATAR";

/// Majors that count in full towards the aggregate.
const BEST_MAJORS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// Titles are Major1, Major2, Major3 and Minor by slot, whatever their classification.
    Scored { best_four: [String; 4], score: u32 },
    /// Fewer than three majors, so there is no valid combination to score.
    NoMajors,
}

pub struct AggregateScorer<'a> {
    config: &'a ScalingConfig,
}

impl<'a> AggregateScorer<'a> {
    pub fn new(config: &'a ScalingConfig) -> Self {
        Self { config }
    }

    /// Select the best three majors plus the best remaining course,
    /// scale them and weight the fourth.
    pub fn score(&self, student: &Student, store: &ScalingStore) -> Result<Aggregate> {
        let mut majors: Vec<&CourseRecord> = student.majors().collect();
        let minors: Vec<&CourseRecord> = student.minors().collect();

        if majors.len() < BEST_MAJORS {
            return Ok(Aggregate::NoMajors);
        }

        // Stable sorts: equal averages keep their course order
        sort_by_average_desc(&mut majors);
        let mut fourth_choices: Vec<&CourseRecord> = majors.split_off(BEST_MAJORS);
        fourth_choices.extend(minors);
        sort_by_average_desc(&mut fourth_choices);

        let fourth = fourth_choices
            .first()
            .copied()
            .ok_or_else(|| EstimateError::NoFourthCourse {
                student: student.full_name.clone(),
            })?;

        let best_four = [majors[0], majors[1], majors[2], fourth];
        let mut scaled = [0.0f64; 4];
        for (slot, course) in best_four.iter().enumerate() {
            let params = store.params_for_course(&course.title)?;
            scaled[slot] = params.scale(course.average_unit_score);
        }

        let total =
            scaled[0] + scaled[1] + scaled[2] + self.config.fourth_course_weight * scaled[3];
        let score = total.round_ties_even().max(0.0) as u32;

        log::debug!(
            "{}: best four {:?} scaled {:?} aggregate {}",
            student.full_name,
            best_four.iter().map(|course| course.title.as_str()).collect::<Vec<_>>(),
            scaled,
            score
        );

        Ok(Aggregate::Scored {
            best_four: best_four.map(|course| course.title.clone()),
            score,
        })
    }
}

fn sort_by_average_desc(courses: &mut [&CourseRecord]) {
    courses.sort_by(|a, b| {
        b.average_unit_score
            .partial_cmp(&a.average_unit_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Maps aggregate scores to ranks through bounds sorted descending by lower bound.
pub struct RankPredictor<'a> {
    bounds: Vec<AtarBound>,
    ranges: &'a RangeConfig,
}

impl<'a> RankPredictor<'a> {
    pub fn new(bounds: Vec<AtarBound>, ranges: &'a RangeConfig) -> Result<Self> {
        if let Some(index) =
            (1..bounds.len()).find(|&i| bounds[i].lower_bound > bounds[i - 1].lower_bound)
        {
            return Err(EstimateError::BoundsNotDescending { index });
        }
        Ok(Self { bounds, ranges })
    }

    pub fn from_table(table: &RawTable, ranges: &'a RangeConfig) -> Result<Self> {
        let lower_bound = table.column(LOWER_BOUND)?;
        let rank = table.column(ATAR)?;

        let bounds = table
            .rows()
            .map(|row| {
                Ok(AtarBound {
                    lower_bound: row.parse_f64(lower_bound)?,
                    rank: row.parse(rank)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(bounds, ranges)
    }

    /// Rank of the first bound at or below the score.
    pub fn predict(&self, score: u32) -> Result<u32> {
        self.bounds
            .iter()
            .find(|bound| bound.lower_bound <= f64::from(score))
            .map(|bound| bound.rank)
            .ok_or(EstimateError::NoBoundMatch { score })
    }

    /// Ten point display range around a predicted rank.
    pub fn range_label(&self, rank: u32) -> String {
        if rank > self.ranges.top_rank_cutoff {
            return self.ranges.top_range_label.clone();
        }
        let rank = i64::from(rank);
        format!(
            "{} - {}",
            rank - self.ranges.below_offset,
            rank + self.ranges.above_offset
        )
    }
}

/// Runs the whole pipeline for one batch of input tables.
pub struct AtarEstimator<'a> {
    config: &'a Config,
}

impl<'a> AtarEstimator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Any format or lookup error aborts the batch; no partial report is returned.
    pub fn produce_report(
        &self,
        academic_records: &RawTable,
        past_params: &RawTable,
        scaling_groups: &RawTable,
        atar_bounds: &RawTable,
    ) -> Result<Vec<ReportRow>> {
        let students =
            RecordNormalizer::new(&self.config.classification).normalize(academic_records)?;
        let store = ScalingStore::build(
            past_params,
            scaling_groups,
            &self.config.scaling,
            self.config.strip_error_rows,
        )?;
        let predictor = RankPredictor::from_table(atar_bounds, &self.config.ranges)?;
        let scorer = AggregateScorer::new(&self.config.scaling);

        let mut rows = Vec::with_capacity(students.len());
        for student in &students {
            let (best_four, score) = match scorer.score(student, &store)? {
                Aggregate::Scored { best_four, score } => (best_four, score),
                Aggregate::NoMajors => {
                    log::warn!(
                        "Skipping {}: fewer than {} major courses",
                        student.full_name,
                        BEST_MAJORS
                    );
                    continue;
                }
            };

            let predicted_rank = predictor.predict(score)?;
            let [major1, major2, major3, minor] = best_four;

            rows.push(ReportRow {
                student_id: student.id.clone(),
                full_name: student.full_name.clone(),
                predicted_rank,
                predicted_range: predictor.range_label(predicted_rank),
                major1,
                major2,
                major3,
                minor,
            });
        }

        Ok(rows)
    }
}
