use thiserror::Error;

pub type Result<T> = std::result::Result<T, EstimateError>;

/// Errors that abort a whole estimation batch.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("{table}: missing column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("{table}, row {row}: invalid value '{value}' in column '{column}'")]
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("scaling group {group}: unknown parameter '{value}' (expected 'a' or 'b')")]
    UnknownParameter { group: u32, value: String },

    #[error("course '{course}' is not in any scaling group")]
    NoScalingGroup { course: String },

    #[error("no ATAR bound matches aggregate score {score}")]
    NoBoundMatch { score: u32 },

    #[error("ATAR bounds are not sorted descending by lower bound (entry {index})")]
    BoundsNotDescending { index: usize },

    #[error("{student} has exactly three majors and no other course for the fourth slot")]
    NoFourthCourse { student: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EstimateError {
    /// Missing or malformed input data.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            EstimateError::MissingColumn { .. }
                | EstimateError::InvalidValue { .. }
                | EstimateError::UnknownParameter { .. }
                | EstimateError::Csv(_)
        )
    }

    /// A course or score that the reference data has no entry for.
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            EstimateError::NoScalingGroup { .. }
                | EstimateError::NoBoundMatch { .. }
                | EstimateError::BoundsNotDescending { .. }
        )
    }
}
