use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied input violates a precondition. Nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    /// A migration file failed to apply. It was rolled back and not recorded.
    #[error("migration {filename} failed: {reason}")]
    Migration { filename: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("notifier error: {0}")]
    Notify(String),

    #[error("update error: {0}")]
    Update(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn migration_error_names_the_file() {
        let err = Error::Migration {
            filename: "002_add_index.sql".to_string(),
            reason: "no such table: thoughts".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "migration 002_add_index.sql failed: no such table: thoughts"
        );
    }

    #[test]
    fn only_validation_errors_report_as_validation() {
        assert!(Error::Validation("content is required".into()).is_validation());
        assert!(!Error::Database("disk I/O error".into()).is_validation());
    }
}
