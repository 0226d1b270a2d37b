use thiserror::Error;

pub type Result<T> = std::result::Result<T, SurvivalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurvivalError {
    #[error("not enough data: {message}")]
    InsufficientData { message: String },

    #[error("hessian is singular: {message}")]
    SingularHessian { message: String },

    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("survival data is broken: {message}")]
    InvalidSurvivalData { message: String },
}

impl SurvivalError {
    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData { message: message.into() }
    }

    pub fn singular_hessian(message: impl Into<String>) -> Self {
        Self::SingularHessian { message: message.into() }
    }

    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn invalid_survival_data(message: impl Into<String>) -> Self {
        Self::InvalidSurvivalData { message: message.into() }
    }
}

/// check a confidence level lies strictly inside (0, 1)
pub(crate) fn check_confidence_level(level: f64) -> Result<f64> {
    if level.is_finite() && level > 0.0 && level < 1.0 {
        Ok(level)
    } else {
        Err(SurvivalError::invalid_parameter("confidence_level", level.to_string()))
    }
}
