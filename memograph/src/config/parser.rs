//! `key = value` configuration parsing.

use crate::config::{Config, ConfigError};

/// Parses configuration text: one `key = value` per line, `#` comments,
/// blank lines ignored. Later duplicates overwrite earlier ones.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let mut config = Config::new();
    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Malformed {
                line: index + 1,
                text: line.to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Malformed {
                line: index + 1,
                text: line.to_string(),
            });
        }
        config.insert_raw(key.to_string(), value.trim().to_string());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;

    #[test]
    fn test_parse_basic_file() {
        let config = parse_config(
            "# runtime settings\n\
             memory_cache/unused_size_limit = 1048576\n\
             \n\
             disk_cache/factory = disk\n\
             testing = true\n",
        )
        .unwrap();

        assert_eq!(
            config
                .get_integer(keys::MEMORY_CACHE_UNUSED_SIZE_LIMIT)
                .unwrap(),
            Some(1_048_576)
        );
        assert_eq!(
            config.get_string(keys::DISK_CACHE_FACTORY),
            Some("disk".to_string())
        );
        assert_eq!(config.get_bool(keys::TESTING).unwrap(), Some(true));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let config = parse_config("a = 1\na = 2\n").unwrap();
        assert_eq!(config.get_integer("a").unwrap(), Some(2));
    }

    #[test]
    fn test_malformed_line_reports_number() {
        let err = parse_config("valid = 1\nnot a setting\n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Malformed {
                line: 2,
                text: "not a setting".to_string()
            }
        );
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(parse_config("= value\n").is_err());
    }

    #[test]
    fn test_values_may_contain_equals() {
        let config = parse_config("url = http://host?a=b\n").unwrap();
        assert_eq!(config.get_string("url"), Some("http://host?a=b".to_string()));
    }
}
