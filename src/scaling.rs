use crate::error::{EstimateError, Result};
use crate::loader::RawTable;
use crate::models::{round2, ScalingConfig, ScalingParams};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const SCALING_GROUP: &str = "ScalingGroup";
const PARAMETER: &str = "Parameter";

const MODULE_GROUP_TYPE: &str = "ModGroupType1";
const GROUP_LABEL: &str = "Textbox58";
const COURSE_TITLE: &str = "CourseTitle";
const ERROR_FLAG: &str = "Error1";

const ASSESSED_GROUP_TYPE: &str = "Type T";
const ERROR_MARKER: &str = "*Error";

/// Per-group transform coefficients plus the course -> scaling group map.
#[derive(Debug, Clone)]
pub struct ScalingStore {
    params: HashMap<u32, ScalingParams>,
    course_groups: HashMap<String, u32>,
    defaults: ScalingParams,
}

impl ScalingStore {
    pub fn build(
        past_params: &RawTable,
        scaling_groups: &RawTable,
        config: &ScalingConfig,
        strip_error_rows: bool,
    ) -> Result<Self> {
        let defaults = ScalingParams {
            a: config.default_a,
            b: config.default_b,
        };
        let params = read_past_params(past_params, defaults)?;
        let course_groups = read_scaling_groups(scaling_groups, strip_error_rows)?;

        log::info!(
            "Loaded parameters for {} scaling groups covering {} courses",
            params.len(),
            course_groups.len()
        );

        Ok(Self {
            params,
            course_groups,
            defaults,
        })
    }

    pub fn group_for(&self, course: &str) -> Result<u32> {
        self.course_groups
            .get(course)
            .copied()
            .ok_or_else(|| EstimateError::NoScalingGroup {
                course: course.to_string(),
            })
    }

    /// Coefficients for a group, falling back to the defaults when it has no history.
    pub fn params_for_group(&self, group: u32) -> ScalingParams {
        self.params.get(&group).copied().unwrap_or(self.defaults)
    }

    pub fn params_for_course(&self, course: &str) -> Result<ScalingParams> {
        Ok(self.params_for_group(self.group_for(course)?))
    }
}

#[derive(Default)]
struct ParamHistory {
    a: Vec<f64>,
    b: Vec<f64>,
}

fn read_past_params(
    table: &RawTable,
    defaults: ScalingParams,
) -> Result<HashMap<u32, ScalingParams>> {
    let group_column = table.column(SCALING_GROUP)?;
    let parameter_column = table.column(PARAMETER)?;

    let mut history: HashMap<u32, ParamHistory> = HashMap::new();

    for row in table.rows() {
        let group: u32 = row.parse(group_column)?;
        let entry = history.entry(group).or_default();

        let values = match row.get(parameter_column).trim() {
            "a" => &mut entry.a,
            "b" => &mut entry.b,
            other => {
                return Err(EstimateError::UnknownParameter {
                    group,
                    value: other.to_string(),
                })
            }
        };

        for column in 0..row.width() {
            if column == group_column || column == parameter_column {
                continue;
            }
            if let Some(value) = row.parse_optional_f64(column)? {
                values.push(value);
            }
        }
    }

    Ok(history
        .into_iter()
        .map(|(group, history)| {
            let params = ScalingParams {
                a: mean(&history.a).unwrap_or(defaults.a),
                b: mean(&history.b).unwrap_or(defaults.b),
            };
            (group, params)
        })
        .collect())
}

fn read_scaling_groups(table: &RawTable, strip_error_rows: bool) -> Result<HashMap<String, u32>> {
    let type_column = table.column(MODULE_GROUP_TYPE)?;
    let label_column = table.column(GROUP_LABEL)?;
    let title_column = table.column(COURSE_TITLE)?;
    let error_column = table
        .optional_column(ERROR_FLAG)
        .filter(|_| strip_error_rows);

    let mut course_groups = HashMap::new();
    let mut stripped = 0usize;

    for row in table.rows() {
        if let Some(column) = error_column {
            if row.get(column).trim() == ERROR_MARKER {
                stripped += 1;
                continue;
            }
        }
        if row.get(type_column).trim() != ASSESSED_GROUP_TYPE {
            continue;
        }

        let label = row.get(label_column);
        let group = trailing_group_number(label).ok_or_else(|| row.invalid(label_column, label))?;
        course_groups.insert(row.get(title_column).trim().to_string(), group);
    }

    if stripped > 0 {
        log::warn!("Ignored {} scaling group rows flagged as errors", stripped);
    }

    Ok(course_groups)
}

/// The scaling group number is the last token of the label, e.g. "Scaling Group 7".
fn trailing_group_number(label: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|\s)(\d+)\s*$").expect("group label pattern is valid")
    });

    pattern
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(round2(values.iter().sum::<f64>() / values.len() as f64))
    }
}
