use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CallosumError {
    ConfigurationError(String),
    RegistrationError(String),
    RoutingError(String),
}

impl fmt::Display for CallosumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallosumError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            CallosumError::RegistrationError(msg) => write!(f, "Registration error: {msg}"),
            CallosumError::RoutingError(msg) => write!(f, "Routing error: {msg}"),
        }
    }
}

impl std::error::Error for CallosumError {}

impl From<crate::config::ConfigurationError> for CallosumError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        CallosumError::ConfigurationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CallosumError>;
