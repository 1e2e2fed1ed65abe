//! Domain error types.

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("source {source_name} unavailable after {attempts} attempts: {reason}")]
    SourceUnavailable {
        source_name: String,
        attempts: u32,
        reason: String,
    },

    #[error("unexpected payload from {source_name}: {reason}")]
    SchemaMismatch { source_name: String, reason: String },

    #[error("data quality failure ({}): {message}", .failed.join(", "))]
    DataQualityFailure {
        failed: Vec<String>,
        message: String,
    },

    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },

    #[error("http transport error: {reason}")]
    Http { reason: String },

    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn persistence(reason: impl ToString) -> Self {
        EtlError::PersistenceFailure {
            reason: reason.to_string(),
        }
    }

    pub fn schema(source_name: &str, reason: impl Into<String>) -> Self {
        EtlError::SchemaMismatch {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EtlError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        EtlError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_data_quality(&self) -> bool {
        matches!(self, EtlError::DataQualityFailure { .. })
    }
}

impl From<&EtlError> for std::process::ExitCode {
    fn from(err: &EtlError) -> Self {
        let code: u8 = match err {
            EtlError::Io(_) => 1,
            EtlError::ConfigParse { .. }
            | EtlError::ConfigMissing { .. }
            | EtlError::ConfigInvalid { .. } => 2,
            EtlError::SourceUnavailable { .. }
            | EtlError::SchemaMismatch { .. }
            | EtlError::Http { .. } => 3,
            EtlError::PersistenceFailure { .. } | EtlError::Upload { .. } => 4,
            EtlError::DataQualityFailure { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_quality_message_lists_failed_checks() {
        let err = EtlError::DataQualityFailure {
            failed: vec!["fx_join_gaps".into(), "non_positive_close".into()],
            message: "2 of 4 checks failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "data quality failure (fx_join_gaps, non_positive_close): 2 of 4 checks failed"
        );
        assert!(err.is_data_quality());
    }

    #[test]
    fn source_unavailable_message() {
        let err = EtlError::SourceUnavailable {
            source_name: "stooq".into(),
            attempts: 5,
            reason: "HTTP 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "source stooq unavailable after 5 attempts: HTTP 503"
        );
        assert!(!err.is_data_quality());
    }

    #[test]
    fn helper_constructors() {
        match EtlError::missing("sqlite", "path") {
            EtlError::ConfigMissing { section, key } => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            other => panic!("expected ConfigMissing, got: {other}"),
        }
        assert!(matches!(
            EtlError::schema("ecb", "no Date column"),
            EtlError::SchemaMismatch { .. }
        ));
    }
}
