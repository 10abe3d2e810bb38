//! Configuration file support.
//!
//! # Configuration File Format
//!
//! ```toml
//! [run]
//! keywords = "aortic stenosis, mitral regurgitation"
//! sources = "pubmed,crossref,openalex"
//! keyword_join = "or"
//! page_size = 20
//! max_pages = 5
//! deadline_secs = 300
//! source_priority = ["crossref", "pubmed", "openalex"]
//!
//! [output]
//! directory = "data"
//!
//! [http]
//! timeout_secs = 30
//! connect_timeout_secs = 10
//! contact_email = "lab@example.org"
//!
//! [rate_limits]
//! default_requests_per_second = 1.0
//! pubmed = 3.0
//!
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! backoff_multiplier = 2.0
//! jitter = 0.25
//!
//! [credentials]
//! crossref_mailto = "lab@example.org"
//! ```

use std::path::{Path, PathBuf};

use super::Config;
use crate::error::HarvestError;

/// File name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "literature-collector.toml";

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

impl From<ConfigFileError> for HarvestError {
    fn from(err: ConfigFileError) -> Self {
        HarvestError::Config(err.to_string())
    }
}

/// Locate the configuration file.
///
/// Order: the explicit path (which must exist), `./literature-collector.toml`,
/// then `<user config dir>/literature-collector/config.toml`.
pub fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigFileError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(ConfigFileError::NotFound(path.to_path_buf()));
    }

    let candidates = std::iter::once(PathBuf::from(CONFIG_FILE_NAME)).chain(
        dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join("config.toml")),
    );

    Ok(candidates.into_iter().find(|p| p.is_file()))
}

/// Render the built-in defaults as TOML
pub fn default_config_toml() -> Result<String, ConfigFileError> {
    toml::to_string_pretty(&Config::default()).map_err(|e| ConfigFileError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[run]\n").unwrap();

        assert_eq!(find_config_file(Some(&path)).unwrap(), Some(path));
    }

    #[test]
    fn test_find_missing_explicit_file() {
        let result = find_config_file(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigFileError::NotFound(_))));
    }

    #[test]
    fn test_default_config_round_trip() {
        let rendered = default_config_toml().unwrap();
        assert!(rendered.contains("[run]"));
        assert!(rendered.contains("[rate_limits]"));
        // Unset credentials are left out rather than rendered empty
        assert!(!rendered.contains("ncbi_api_key"));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.run.page_size, 20);
        assert_eq!(parsed.run.source_priority, Config::default().run.source_priority);
    }
}
