//! Configuration access port trait.

use crate::domain::error::EtlError;

/// Sectioned key/value lookup. Only `get_string` is backend-specific; typed
/// accessors fall back to `default` when the key is absent and reject values
/// that are present but unparsable.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, EtlError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(v) if v.trim().is_empty() => Ok(default),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| EtlError::invalid(section, key, format!("'{v}' is not an integer"))),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, EtlError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(v) => match v.trim().to_lowercase().as_str() {
                "" => Ok(default),
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(EtlError::invalid(section, key, format!("'{v}' is not a boolean"))),
            },
        }
    }
}
