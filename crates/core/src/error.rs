//! Error types for scattergrid

use thiserror::Error;

/// Main error type for scattergrid operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Unable to find layer \"{0}\"")]
    LayerNotFound(String),

    #[error("\"{0}\" not recognised as an available field")]
    FieldNotFound(String),

    #[error("SQL Expression Parsing Error: {0}")]
    ExpressionParse(String),

    #[error("Unknown gridding algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidParameter`]
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a configuration problem detected before any
    /// output is produced.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::LayerNotFound(_)
                | Error::FieldNotFound(_)
                | Error::ExpressionParse(_)
                | Error::UnknownAlgorithm(_)
                | Error::InvalidParameter { .. }
                | Error::InvalidDimensions { .. }
        )
    }
}

/// Result type alias for scattergrid operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_offending_value() {
        assert_eq!(
            Error::LayerNotFound("invalid".into()).to_string(),
            "Unable to find layer \"invalid\""
        );
        assert_eq!(
            Error::FieldNotFound("invalid".into()).to_string(),
            "\"invalid\" not recognised as an available field"
        );
        assert!(Error::ExpressionParse("unexpected end".into())
            .to_string()
            .starts_with("SQL Expression Parsing Error"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::invalid_parameter("power", "abc", "not a number").is_configuration());
        assert!(!Error::Cancelled.is_configuration());
    }
}
