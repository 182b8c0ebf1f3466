use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub data_directory: Option<String>,
    pub data_url: Option<String>,
    pub output_directory: Option<String>,
    pub strip_error_rows: bool,
    pub input_files: InputFiles,
    pub scaling: ScalingConfig,
    pub classification: ClassificationConfig,
    pub ranges: RangeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

/// File names of the four input tables, resolved against the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFiles {
    pub acs_export: String,
    pub past_params: String,
    pub scaling_groups: String,
    pub atar_bounds: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Used for a scaling group with no historical `a` values.
    pub default_a: f64,
    /// Used for a scaling group with no historical `b` values.
    pub default_b: f64,
    pub fourth_course_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Courses that always count as majors regardless of unit count.
    pub core_courses: Vec<String>,
    pub excluded_course_marker: String,
    pub assessed_course_type: String,
    pub min_majors: usize,
    pub minor_unit_thresholds: Vec<UnitThreshold>,
}

/// A course with fewer than `min_units` units at `year_level` is a minor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitThreshold {
    pub year_level: u32,
    pub min_units: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    pub top_rank_cutoff: u32,
    pub top_range_label: String,
    pub below_offset: i64,
    pub above_offset: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            data_directory: Some("data".to_string()),
            data_url: None,
            output_directory: Some("output".to_string()),
            strip_error_rows: true,
            input_files: InputFiles::default(),
            scaling: ScalingConfig::default(),
            classification: ClassificationConfig::default(),
            ranges: RangeConfig::default(),
        }
    }
}

impl Default for InputFiles {
    fn default() -> Self {
        Self {
            acs_export: "y12-acs-export.csv".to_string(),
            past_params: "past_params.csv".to_string(),
            scaling_groups: "scaling_groups.csv".to_string(),
            atar_bounds: "atar_bounds.csv".to_string(),
        }
    }
}

impl ScalingConfig {
    pub const DEFAULT_A: f64 = 10.0;
    pub const DEFAULT_B: f64 = 2.0;
    pub const FOURTH_COURSE_WEIGHT: f64 = 0.6;
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            default_a: Self::DEFAULT_A,
            default_b: Self::DEFAULT_B,
            fourth_course_weight: Self::FOURTH_COURSE_WEIGHT,
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            core_courses: vec![
                "SPECIALIST MATHEMATICS".to_string(),
                "SPECIALIST METHODS".to_string(),
                "MATHEMATICAL METHODS".to_string(),
                // Spelled as it appears in the ACS export
                "MATHEMATICAL APPLIATIONS".to_string(),
                "ENGLISH".to_string(),
                "LITERATURE".to_string(),
            ],
            excluded_course_marker: "UNGROUPED UNITS".to_string(),
            assessed_course_type: "T".to_string(),
            min_majors: 3,
            minor_unit_thresholds: vec![
                UnitThreshold { year_level: 12, min_units: 3 },
                UnitThreshold { year_level: 11, min_units: 2 },
            ],
        }
    }
}

impl ClassificationConfig {
    pub fn is_core_course(&self, title: &str) -> bool {
        self.core_courses.iter().any(|core| core == title)
    }

    pub fn minor_threshold(&self, year_level: u32) -> Option<usize> {
        self.minor_unit_thresholds
            .iter()
            .find(|threshold| threshold.year_level == year_level)
            .map(|threshold| threshold.min_units)
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            top_rank_cutoff: 96,
            top_range_label: "90 - 100".to_string(),
            below_offset: 7,
            above_offset: 3,
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Resolve an input file name to a local path or URL, depending on the data source mode.
    pub fn source_for(&self, file_name: &str) -> anyhow::Result<String> {
        match self.data_source_mode {
            DataSourceMode::Local => {
                let data_dir = self.data_directory.as_deref().unwrap_or("data");
                Ok(Path::new(data_dir).join(file_name).to_string_lossy().into_owned())
            }
            DataSourceMode::Internet => {
                let base = self.data_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("data_url must be set when data_source_mode is \"internet\"")
                })?;
                Ok(format!("{}/{}", base.trim_end_matches('/'), file_name))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseRecord {
    pub title: String,
    pub is_major: bool,
    pub average_unit_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: String,
    pub full_name: String,
    pub year_level: u32,
    pub courses: Vec<CourseRecord>, // first-seen order, unique titles
}

impl Student {
    pub fn majors(&self) -> impl Iterator<Item = &CourseRecord> {
        self.courses.iter().filter(|course| course.is_major)
    }

    pub fn minors(&self) -> impl Iterator<Item = &CourseRecord> {
        self.courses.iter().filter(|course| !course.is_major)
    }
}

/// Linear transform coefficients of a scaling group: `scaled = raw * b + a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingParams {
    pub a: f64,
    pub b: f64,
}

impl ScalingParams {
    pub fn scale(&self, raw: f64) -> f64 {
        raw * self.b + self.a
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtarBound {
    pub lower_bound: f64,
    pub rank: u32,
}

/// One line of the estimate report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub student_id: String,
    pub full_name: String,
    pub predicted_rank: u32,
    pub predicted_range: String,
    pub major1: String,
    pub major2: String,
    pub major3: String,
    pub minor: String,
}

/// Round to two decimal places.
///
/// Rounds the exact stored binary value, so 2.675 (stored just below) becomes 2.67.
pub fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
