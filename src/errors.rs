//! Error types and validation functions for the ECM pipeline.
//!
//! Errors fall into five categories that decide how far a failure travels:
//! data-quality, insufficient-data, estimation and diagnostic failures are
//! contained inside a single analysis unit, while fatal configuration errors
//! abort the whole batch.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Error types for stationarity, cointegration and error-correction analysis.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum EcmAnalysisError {
    /// Input data is unusable: NaN/Inf values, missing columns, zero variance.
    #[error("Data quality problem in {context}: {reason}")]
    DataQuality {
        /// Series or table the problem was found in
        context: String,
        /// What was wrong with it
        reason: String,
    },

    /// Not enough observations for the requested operation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual number of data points provided
        actual: usize,
    },

    /// Invalid parameter value.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Low-level numerical failure (singular matrix, non-finite intermediate).
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },

    /// Lag selection or model fitting failed.
    #[error("Estimation failed during {stage}: {reason}")]
    EstimationFailure {
        /// Estimation stage (lag selection, VECM fit, ...)
        stage: String,
        /// Underlying reason
        reason: String,
    },

    /// A single diagnostic test could not be computed.
    #[error("Diagnostic test {test_name} failed: {reason}")]
    DiagnosticFailure {
        /// Name of the diagnostic test
        test_name: String,
        /// Underlying reason
        reason: String,
    },

    /// Missing input file, malformed schema or invalid configuration.
    #[error("Fatal configuration error: {reason}")]
    FatalConfiguration {
        /// What is wrong with the run configuration
        reason: String,
    },

    /// I/O operation error.
    #[error("I/O operation failed: {operation}")]
    IoError {
        /// I/O operation that failed
        operation: String,
        /// Underlying error if available
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization failed ({format}): {reason}")]
    SerializationError {
        /// Format that failed (JSON, CSV)
        format: String,
        /// Underlying reason
        reason: String,
    },
}

/// Result type for ECM analysis operations.
pub type EcmResult<T> = Result<T, EcmAnalysisError>;

/// Failure taxonomy used for skip records and propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// NaN/Inf, missing columns, zero-variance predictors
    DataQuality,
    /// Too few rows or aligned points
    InsufficientData,
    /// Numerical failure in lag selection or fitting
    EstimationFailure,
    /// A single diagnostic test failed
    DiagnosticFailure,
    /// Aborts the batch
    FatalConfiguration,
}

impl EcmAnalysisError {
    /// Taxonomy category of this error.
    ///
    /// Parameter and numerical errors raised while a unit is being processed
    /// count as estimation failures. I/O and serialization problems can only
    /// come from loading or saving the batch and are therefore fatal.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DataQuality { .. } => ErrorCategory::DataQuality,
            Self::InsufficientData { .. } => ErrorCategory::InsufficientData,
            Self::InvalidParameter { .. }
            | Self::NumericalError { .. }
            | Self::EstimationFailure { .. } => ErrorCategory::EstimationFailure,
            Self::DiagnosticFailure { .. } => ErrorCategory::DiagnosticFailure,
            Self::FatalConfiguration { .. }
            | Self::IoError { .. }
            | Self::SerializationError { .. } => ErrorCategory::FatalConfiguration,
        }
    }

    /// True when the error must abort the whole batch.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::FatalConfiguration
    }

    /// Wrap an error raised inside an estimation stage, keeping data-quality
    /// and insufficient-data errors as they are.
    pub fn into_estimation(self, stage: &str) -> Self {
        match self {
            Self::DataQuality { .. } | Self::InsufficientData { .. } => self,
            Self::EstimationFailure { .. } => self,
            other => Self::EstimationFailure {
                stage: stage.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for EcmAnalysisError {
    fn from(err: std::io::Error) -> Self {
        EcmAnalysisError::IoError {
            operation: err.kind().to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for EcmAnalysisError {
    fn from(err: serde_json::Error) -> Self {
        EcmAnalysisError::SerializationError {
            format: "JSON".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<csv::Error> for EcmAnalysisError {
    fn from(err: csv::Error) -> Self {
        EcmAnalysisError::SerializationError {
            format: "CSV".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Validates that data has sufficient length for analysis.
///
/// # Example
/// ```rust
/// use conflict_ecm::errors::validate_data_length;
///
/// let data = vec![1.0, 2.0, 3.0];
/// assert!(validate_data_length(&data, 2, "test").is_ok());
/// assert!(validate_data_length(&data, 5, "test").is_err());
/// ```
pub fn validate_data_length(data: &[f64], min_required: usize, _operation: &str) -> EcmResult<()> {
    if data.len() < min_required {
        Err(EcmAnalysisError::InsufficientData {
            required: min_required,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

/// Validates that a parameter is within expected bounds (inclusive).
///
/// # Example
/// ```rust
/// use conflict_ecm::errors::validate_parameter;
///
/// assert!(validate_parameter(0.05, 0.0, 1.0, "significance").is_ok());
/// assert!(validate_parameter(1.5, 0.0, 1.0, "significance").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> EcmResult<()> {
    if value.is_nan() {
        return Err(EcmAnalysisError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if min.is_nan() || max.is_nan() || min > max {
        return Err(EcmAnalysisError::NumericalError {
            reason: format!(
                "Invalid bounds for parameter {}: min={}, max={}",
                name, min, max
            ),
            operation: None,
        });
    }

    if value < min || value > max {
        Err(EcmAnalysisError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that all values in a series are finite.
///
/// Returns a [`EcmAnalysisError::DataQuality`] error naming the first
/// offending index, since a non-finite observation makes the whole series
/// unusable for unit-root testing.
///
/// # Example
/// ```rust
/// use conflict_ecm::errors::validate_all_finite;
///
/// assert!(validate_all_finite(&[1.0, 2.0, 3.0], "usdprice").is_ok());
/// assert!(validate_all_finite(&[1.0, f64::NAN, 3.0], "usdprice").is_err());
/// ```
pub fn validate_all_finite(data: &[f64], name: &str) -> EcmResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        let value_desc = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };

        return Err(EcmAnalysisError::DataQuality {
            context: name.to_string(),
            reason: format!("non-finite value at index {}: {}", i, value_desc),
        });
    }

    Ok(())
}

/// Validates that a series is not constant.
pub fn validate_nonzero_variance(data: &[f64], name: &str) -> EcmResult<()> {
    if data.len() < 2 {
        return Ok(());
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
    if var <= 1e-14 * mean.abs().max(1.0).powi(2) {
        return Err(EcmAnalysisError::DataQuality {
            context: name.to_string(),
            reason: "zero variance".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_data_length_insufficient() {
        let data = vec![1.0, 2.0];
        match validate_data_length(&data, 5, "test_operation") {
            Err(EcmAnalysisError::InsufficientData { required, actual }) => {
                assert_eq!(required, 5);
                assert_eq!(actual, 2);
            }
            _ => panic!("Expected InsufficientData error"),
        }
    }

    #[test]
    fn test_validate_data_length_exact_minimum() {
        let data = vec![1.0, 2.0, 3.0];
        assert!(validate_data_length(&data, 3, "test_operation").is_ok());
    }

    #[test]
    fn test_validate_parameter_bounds() {
        assert!(validate_parameter(0.5, 0.0, 1.0, "alpha").is_ok());
        assert!(validate_parameter(0.0, 0.0, 1.0, "alpha").is_ok());
        assert!(validate_parameter(-0.1, 0.0, 1.0, "alpha").is_err());
        assert!(validate_parameter(f64::NAN, 0.0, 1.0, "alpha").is_err());
        assert!(matches!(
            validate_parameter(0.5, 1.0, 0.0, "alpha"),
            Err(EcmAnalysisError::NumericalError { .. })
        ));
    }

    #[test]
    fn test_validate_all_finite_reports_index() {
        let err = validate_all_finite(&[1.0, 2.0, f64::NEG_INFINITY], "conflict_intensity")
            .unwrap_err();
        match err {
            EcmAnalysisError::DataQuality { context, reason } => {
                assert_eq!(context, "conflict_intensity");
                assert!(reason.contains("index 2"));
                assert!(reason.contains("-Infinity"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(validate_all_finite(&[], "empty").is_ok());
    }

    #[test]
    fn test_zero_variance_detection() {
        assert!(validate_nonzero_variance(&[3.0; 10], "flat").is_err());
        assert!(validate_nonzero_variance(&[1.0, 2.0, 3.0], "ramp").is_ok());
    }

    #[test]
    fn test_categories() {
        let fatal = EcmAnalysisError::FatalConfiguration {
            reason: "missing input".to_string(),
        };
        assert!(fatal.is_fatal());

        let numerical = EcmAnalysisError::NumericalError {
            reason: "singular".to_string(),
            operation: None,
        };
        assert_eq!(numerical.category(), ErrorCategory::EstimationFailure);
        assert!(!numerical.is_fatal());

        let wrapped = numerical.into_estimation("vecm_fit");
        match wrapped {
            EcmAnalysisError::EstimationFailure { stage, reason } => {
                assert_eq!(stage, "vecm_fit");
                assert!(reason.contains("singular"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let short = EcmAnalysisError::InsufficientData {
            required: 30,
            actual: 29,
        };
        assert_eq!(
            short.into_estimation("vecm_fit").category(),
            ErrorCategory::InsufficientData
        );

        let io: EcmAnalysisError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "nope").into();
        assert!(io.is_fatal());
    }
}
