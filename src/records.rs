use crate::error::Result;
use crate::loader::RawTable;
use crate::models::{round2, ClassificationConfig, CourseRecord, Student};
use std::collections::BTreeMap;

const STUDENT_ID: &str = "StudentId1";
const FULL_NAME: &str = "Fullname1";
const YEAR_LEVEL: &str = "YearLevel1";
const COURSE_TITLE: &str = "CoursewithOtherSchool1";
const COURSE_TYPE: &str = "UnitAccredType1";
const UNIT_SCORE: &str = "ScaledUnitScore1";

const STUDENT_ID_WIDTH: usize = 7;

/// One unit result from the academic record export.
#[derive(Debug, Clone)]
struct UnitRow {
    student_id: String,
    full_name: String,
    year_level: u32,
    course_title: String,
    course_type: String,
    unit_score: f64, // 0 when missing
}

/// Turns the academic record export into students with classified courses.
pub struct RecordNormalizer<'a> {
    config: &'a ClassificationConfig,
}

impl<'a> RecordNormalizer<'a> {
    pub fn new(config: &'a ClassificationConfig) -> Self {
        Self { config }
    }

    /// Build one student per distinct full name, in ascending name order.
    ///
    /// Students with fewer than `min_majors` major courses are left out.
    pub fn normalize(&self, table: &RawTable) -> Result<Vec<Student>> {
        let unit_rows = read_unit_rows(table)?;

        let mut by_name: BTreeMap<&str, Vec<&UnitRow>> = BTreeMap::new();
        for row in &unit_rows {
            by_name.entry(row.full_name.as_str()).or_default().push(row);
        }

        let mut students = Vec::new();
        for (name, rows) in by_name {
            let student = self.build_student(name, &rows);
            let majors = student.majors().count();
            let minors = student.minors().count();

            log::info!(
                "Name: {} Year: {} Majors: {} Minors: {}",
                name,
                student.year_level,
                majors,
                minors
            );

            if majors >= self.config.min_majors {
                students.push(student);
            } else {
                log::debug!("Skipping {}: only {} major courses", name, majors);
            }
        }

        Ok(students)
    }

    fn build_student(&self, name: &str, rows: &[&UnitRow]) -> Student {
        // Grouping guarantees at least one row per name
        let first = rows[0];

        let mut titles: Vec<&str> = Vec::new();
        for row in rows {
            if self.counts_as_course(row) && !titles.contains(&row.course_title.as_str()) {
                titles.push(&row.course_title);
            }
        }

        let courses = titles
            .into_iter()
            .map(|title| {
                let units: Vec<&UnitRow> = rows
                    .iter()
                    .copied()
                    .filter(|row| row.course_title == title)
                    .collect();
                CourseRecord {
                    title: title.to_string(),
                    is_major: self.is_major(title, first.year_level, units.len()),
                    average_unit_score: average_unit_score(&units),
                }
            })
            .collect();

        Student {
            id: format!("{:0>width$}", first.student_id, width = STUDENT_ID_WIDTH),
            full_name: name.to_string(),
            year_level: first.year_level,
            courses,
        }
    }

    fn counts_as_course(&self, row: &UnitRow) -> bool {
        !row.course_title.contains('(')
            && row.course_title != self.config.excluded_course_marker
            && row.course_type == self.config.assessed_course_type
    }

    fn is_major(&self, title: &str, year_level: u32, unit_count: usize) -> bool {
        if self.config.is_core_course(title) {
            return true;
        }
        match self.config.minor_threshold(year_level) {
            Some(min_units) => unit_count >= min_units,
            None => true,
        }
    }
}

fn read_unit_rows(table: &RawTable) -> Result<Vec<UnitRow>> {
    let student_id = table.column(STUDENT_ID)?;
    let full_name = table.column(FULL_NAME)?;
    let year_level = table.column(YEAR_LEVEL)?;
    let course_title = table.column(COURSE_TITLE)?;
    let course_type = table.column(COURSE_TYPE)?;
    let unit_score = table.column(UNIT_SCORE)?;

    table
        .rows()
        .map(|row| {
            Ok(UnitRow {
                student_id: row.get(student_id).trim().to_string(),
                full_name: row.get(full_name).trim_end().to_string(),
                year_level: row.parse(year_level)?,
                course_title: row.get(course_title).trim_end().to_string(),
                course_type: row.get(course_type).trim().to_string(),
                unit_score: row.parse_optional_f64(unit_score)?.unwrap_or(0.0),
            })
        })
        .collect()
}

/// Mean of the non-zero unit scores, rounded to two decimals; zero scores are missing results.
fn average_unit_score(units: &[&UnitRow]) -> f64 {
    let scores: Vec<f64> = units
        .iter()
        .map(|unit| unit.unit_score)
        .filter(|score| *score != 0.0)
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        round2(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = concat!(
        "StudentId1,Fullname1,YearLevel1,CoursewithOtherSchool1,",
        "UnitAccredType1,UnitwithOtherCheck1,UnitValue1,ScaledUnitScore1\n",
    );

    fn normalize(body: &str) -> Result<Vec<Student>> {
        let table = RawTable::from_reader("ACS export", format!("{HEADER}{body}").as_bytes())?;
        let config = ClassificationConfig::default();
        RecordNormalizer::new(&config).normalize(&table)
    }

    fn course<'s>(student: &'s Student, title: &str) -> &'s CourseRecord {
        student
            .courses
            .iter()
            .find(|course| course.title == title)
            .unwrap()
    }

    /// Three three-unit majors for a Year 12 student, plus whatever `extra` adds.
    fn year12_student(name: &str, id: &str, extra: &str) -> String {
        let mut rows = String::new();
        for title in ["ENGLISH", "CHEMISTRY", "PHYSICS"] {
            for unit in 1..=3 {
                rows.push_str(&format!(
                    "{id},\"{name}\",12,{title},T,{title} Unit {unit},1.0,80\n"
                ));
            }
        }
        rows.push_str(extra);
        rows
    }

    #[test]
    fn average_excludes_zero_unit_scores() {
        let rows = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,HISTORY,T,Unit 1,1.0,0\n\
             1234,\"Lee, Avery\",12,HISTORY,T,Unit 2,1.0,10\n\
             1234,\"Lee, Avery\",12,HISTORY,T,Unit 3,1.0,20\n",
        );
        let students = normalize(&rows).unwrap();
        assert_eq!(course(&students[0], "HISTORY").average_unit_score, 15.0);
    }

    #[test]
    fn course_with_only_zero_scores_averages_to_zero() {
        let rows = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,HISTORY,T,Unit 1,1.0,0\n\
             1234,\"Lee, Avery\",12,HISTORY,T,Unit 2,1.0,\n",
        );
        let students = normalize(&rows).unwrap();
        assert_eq!(course(&students[0], "HISTORY").average_unit_score, 0.0);
    }

    #[test]
    fn averages_round_to_two_decimals() {
        let rows = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,HISTORY,T,Unit 1,1.0,70\n\
             1234,\"Lee, Avery\",12,HISTORY,T,Unit 2,1.0,70\n\
             1234,\"Lee, Avery\",12,HISTORY,T,Unit 3,1.0,71\n",
        );
        let students = normalize(&rows).unwrap();
        assert_eq!(course(&students[0], "HISTORY").average_unit_score, 70.33);
    }

    #[test]
    fn unit_count_threshold_depends_on_year_level() {
        let year12 = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,HISTORY,T,Unit 1,1.0,70\n\
             1234,\"Lee, Avery\",12,HISTORY,T,Unit 2,1.0,70\n",
        );
        let students = normalize(&year12).unwrap();
        assert!(!course(&students[0], "HISTORY").is_major);
        assert!(course(&students[0], "CHEMISTRY").is_major);

        let year11 = "55,\"Moreno, Jules\",11,CHEMISTRY,T,Unit 1,1.0,70\n\
                      55,\"Moreno, Jules\",11,CHEMISTRY,T,Unit 2,1.0,70\n\
                      55,\"Moreno, Jules\",11,PHYSICS,T,Unit 1,1.0,70\n\
                      55,\"Moreno, Jules\",11,PHYSICS,T,Unit 2,1.0,70\n\
                      55,\"Moreno, Jules\",11,BIOLOGY,T,Unit 1,1.0,70\n\
                      55,\"Moreno, Jules\",11,BIOLOGY,T,Unit 2,1.0,70\n\
                      55,\"Moreno, Jules\",11,HISTORY,T,Unit 1,1.0,70\n";
        let students = normalize(year11).unwrap();
        assert!(course(&students[0], "BIOLOGY").is_major);
        assert!(!course(&students[0], "HISTORY").is_major);
    }

    #[test]
    fn core_courses_are_always_major() {
        let rows = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,MATHEMATICAL METHODS,T,Unit 1,1.0,70\n",
        );
        let students = normalize(&rows).unwrap();
        assert!(course(&students[0], "MATHEMATICAL METHODS").is_major);
    }

    #[test]
    fn excluded_rows_do_not_create_courses() {
        let rows = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,UNGROUPED UNITS,T,Unit 1,1.0,70\n\
             1234,\"Lee, Avery\",12,DRAMA (OTHER SCHOOL),T,Unit 1,1.0,70\n\
             1234,\"Lee, Avery\",12,WORKPLACE LEARNING,A,Unit 1,1.0,70\n",
        );
        let students = normalize(&rows).unwrap();
        let titles: Vec<&str> = students[0].courses.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["ENGLISH", "CHEMISTRY", "PHYSICS"]);
    }

    #[test]
    fn courses_keep_first_seen_order_without_duplicates() {
        let rows = "9,\"Patel, Kiara\",12,PHYSICS,T,Unit 1,1.0,70\n\
                    9,\"Patel, Kiara\",12,ENGLISH,T,Unit 1,1.0,70\n\
                    9,\"Patel, Kiara\",12,PHYSICS,T,Unit 2,1.0,70\n\
                    9,\"Patel, Kiara\",12,CHEMISTRY,T,Unit 1,1.0,70\n\
                    9,\"Patel, Kiara\",12,PHYSICS,T,Unit 3,1.0,70\n\
                    9,\"Patel, Kiara\",12,CHEMISTRY,T,Unit 2,1.0,70\n\
                    9,\"Patel, Kiara\",12,CHEMISTRY,T,Unit 3,1.0,70\n";
        let students = normalize(rows).unwrap();
        let titles: Vec<&str> = students[0].courses.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["PHYSICS", "ENGLISH", "CHEMISTRY"]);
    }

    #[test]
    fn drops_students_with_fewer_than_three_majors() {
        let mut rows = year12_student("Lee, Avery", "1234", "");
        rows.push_str(
            "77,\"Zhou, Sam\",12,ENGLISH,T,Unit 1,1.0,70\n\
             77,\"Zhou, Sam\",12,HISTORY,T,Unit 1,1.0,70\n\
             77,\"Zhou, Sam\",12,DRAMA,T,Unit 1,1.0,70\n",
        );
        let students = normalize(&rows).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].full_name, "Lee, Avery");
    }

    #[test]
    fn students_are_ordered_by_name_with_padded_ids() {
        let mut rows = year12_student("Moreno, Jules", "42", "");
        rows.push_str(&year12_student("Lee, Avery   ", "1234", ""));
        let students = normalize(&rows).unwrap();
        let names: Vec<&str> = students.iter().map(|s| s.full_name.as_str()).collect();
        assert_eq!(names, vec!["Lee, Avery", "Moreno, Jules"]);
        assert_eq!(students[0].id, "0001234");
        assert_eq!(students[1].id, "0000042");
        assert_eq!(students[0].year_level, 12);
    }

    #[test]
    fn missing_columns_fail_fast() {
        let table = RawTable::from_reader(
            "ACS export",
            "StudentId1,Fullname1\n1,\"Lee, Avery\"\n".as_bytes(),
        )
        .unwrap();
        let config = ClassificationConfig::default();
        let err = RecordNormalizer::new(&config).normalize(&table).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn infinite_unit_scores_fail_fast() {
        let rows = year12_student(
            "Lee, Avery",
            "1234",
            "1234,\"Lee, Avery\",12,HISTORY,T,Unit 1,1.0,inf\n",
        );
        let err = normalize(&rows).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("'inf'"));
    }

    #[test]
    fn year_level_without_threshold_makes_every_course_major() {
        let rows = "31,\"Nguyen, Tam\",10,CHEMISTRY,T,Unit 1,1.0,70\n\
                    31,\"Nguyen, Tam\",10,PHYSICS,T,Unit 1,1.0,70\n\
                    31,\"Nguyen, Tam\",10,HISTORY,T,Unit 1,1.0,70\n";
        let students = normalize(rows).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].year_level, 10);
        assert!(students[0].courses.iter().all(|course| course.is_major));
    }

    #[test]
    fn malformed_scores_fail_fast() {
        let rows = "1,\"Lee, Avery\",12,ENGLISH,T,Unit 1,1.0,eighty\n";
        let err = normalize(rows).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("ScaledUnitScore1"));
    }
}
