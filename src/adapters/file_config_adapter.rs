//! INI file configuration adapter.

use crate::domain::error::EtlError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EtlError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| EtlError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, EtlError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| EtlError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[pipeline]
symbols = AAPL, MSFT
benchmark = SPY
partitioned = no
snapshot_days = 14

[sqlite]
path = /var/lib/etl/warehouse.db

[postgres]
connection_string = host=localhost dbname=warehouse user=etl
"#;

    #[test]
    fn reads_strings() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("pipeline", "symbols").as_deref(), Some("AAPL, MSFT"));
        assert_eq!(
            adapter.get_string("postgres", "connection_string").as_deref(),
            Some("host=localhost dbname=warehouse user=etl")
        );
    }

    #[test]
    fn missing_key_or_section_is_none() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("pipeline", "missing"), None);
        assert_eq!(adapter.get_string("slack", "webhook_url"), None);
    }

    #[test]
    fn typed_accessors() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("pipeline", "snapshot_days", 30).unwrap(), 14);
        assert_eq!(adapter.get_int("retry", "max_attempts", 5).unwrap(), 5);
        assert!(!adapter.get_bool("pipeline", "partitioned", true).unwrap());
        assert!(adapter.get_bool("quality", "require_today", true).unwrap());
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let adapter =
            FileConfigAdapter::from_string("[retry]\nmax_attempts = many\n[quality]\nrequire_today = maybe\n")
                .unwrap();
        assert!(matches!(
            adapter.get_int("retry", "max_attempts", 5),
            Err(EtlError::ConfigInvalid { .. })
        ));
        let err = adapter.get_bool("quality", "require_today", true).unwrap_err();
        assert!(err.to_string().contains("[quality] require_today"));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[ecb]\nurl = http://localhost/eurofxref-hist.csv\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("ecb", "url").as_deref(),
            Some("http://localhost/eurofxref-hist.csv")
        );
    }

    #[test]
    fn missing_file_is_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/etl.ini").unwrap_err();
        assert!(matches!(err, EtlError::ConfigParse { .. }));
    }
}
