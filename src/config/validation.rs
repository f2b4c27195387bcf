use crate::config::models::ProxyConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Proxy configuration validator
pub struct ProxyConfigValidator;

impl ProxyConfigValidator {
    /// Validate the whole configuration, reporting every problem at once.
    pub fn validate(config: &ProxyConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.ip.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "ip".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if config.port == 0 {
            errors.push(ValidationError::InvalidField {
                field: "port".to_string(),
                message: "must be between 1 and 65535".to_string(),
            });
        }

        if let Err(e) = Self::validate_cookie_name(&config.cookie) {
            errors.push(e);
        }

        match &config.sessions {
            None => errors.push(ValidationError::MissingField {
                field: "sessions".to_string(),
            }),
            Some(path) if path.as_os_str().is_empty() => {
                errors.push(ValidationError::InvalidField {
                    field: "sessions".to_string(),
                    message: "path must not be empty".to_string(),
                })
            }
            Some(_) => {}
        }

        for (field, value) in [
            ("upstream_timeout_secs", config.upstream_timeout_secs),
            ("poll_interval_secs", config.poll_interval_secs),
        ] {
            if value == Some(0) {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "must be greater than zero when set".to_string(),
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    /// Cookie names are RFC 6265 tokens: visible ASCII minus separators.
    pub fn validate_cookie_name(name: &str) -> ValidationResult<()> {
        const SEPARATORS: &[char] = &[
            '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', '{', '}',
        ];

        if name.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "cookie".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !c.is_ascii_graphic() || SEPARATORS.contains(c))
        {
            return Err(ValidationError::InvalidField {
                field: "cookie".to_string(),
                message: format!("'{name}' contains invalid character {bad:?}"),
            });
        }

        Ok(())
    }
}
