use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid regex '{expression}': {source}")]
    InvalidRegex {
        expression: String,
        #[source]
        source: regex::Error,
    },

    #[error("score_factor must be within [0, 1], got {value}")]
    ScoreFactorOutOfRange { value: f64 },

    #[error("invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("unknown skill type: {kind}")]
    UnknownSkill { kind: String },

    #[error("invalid skill config: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_regex(expression: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidRegex {
            expression: expression.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_cron(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unknown_skill(kind: impl Into<String>) -> Self {
        Self::UnknownSkill { kind: kind.into() }
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
