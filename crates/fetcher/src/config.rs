//! Credentials and transport settings for the Climate Data Store.
//!
//! Settings come from `CDSAPI_URL` / `CDSAPI_KEY` first and fall back to a
//! `.cdsapirc` file (`url:` and `key:` lines). Nothing is ever prompted for.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FetchError, Result};

/// Default CDS API endpoint.
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";

/// Settings for [`CdsFetcher`](crate::CdsFetcher).
#[derive(Debug, Clone)]
pub struct CdsConfig {
    /// API base URL, without trailing slash.
    pub url: String,
    /// Personal access token sent as `PRIVATE-TOKEN`.
    pub key: String,
    /// Directory holding staged provider files.
    pub staging_dir: PathBuf,
    /// Delay between job status polls.
    pub poll_interval: Duration,
    /// Give up on a job after this many polls.
    pub max_polls: u32,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for CdsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CDS_URL.to_string(),
            key: String::new(),
            staging_dir: std::env::temp_dir().join("cds-staging"),
            poll_interval: Duration::from_secs(5),
            max_polls: 720,
            request_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl CdsConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            staging_dir: staging_dir.into(),
            ..Default::default()
        }
    }

    /// Load from the environment, then from `.cdsapirc` for anything unset.
    ///
    /// The rc file is `CDSAPI_RC` if set, otherwise `$HOME/.cdsapirc`.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        let mut url = std::env::var("CDSAPI_URL").ok();
        let mut key = std::env::var("CDSAPI_KEY").ok();

        if url.is_none() || key.is_none() {
            if let Some(rc_path) = rc_path() {
                if rc_path.exists() {
                    let (rc_url, rc_key) = parse_rc_file(&rc_path)?;
                    url = url.or(rc_url);
                    key = key.or(rc_key);
                }
            }
        }

        if let Some(url) = url {
            config.url = url.trim_end_matches('/').to_string();
        }
        config.key = key.ok_or_else(|| {
            FetchError::config("no CDS API key: set CDSAPI_KEY or provide a .cdsapirc file")
        })?;

        if let Ok(dir) = std::env::var("CDS_STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }

        if let Ok(val) = std::env::var("CDS_POLL_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                config.poll_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("CDS_MAX_POLLS") {
            if let Ok(n) = val.parse() {
                config.max_polls = n;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(FetchError::config(format!("invalid CDS url: {}", self.url)));
        }
        if self.key.trim().is_empty() {
            return Err(FetchError::config("CDS API key is empty"));
        }
        if self.max_polls == 0 {
            return Err(FetchError::config("max_polls must be > 0"));
        }
        Ok(())
    }
}

fn rc_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CDSAPI_RC") {
        return Some(PathBuf::from(path));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| Path::new(&home).join(".cdsapirc"))
}

fn parse_rc_file(path: &Path) -> Result<(Option<String>, Option<String>)> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_rc(&contents))
}

/// Extract `url:` and `key:` values from `.cdsapirc` contents.
pub fn parse_rc(contents: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;

    for line in contents.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.trim() {
            "url" => url = Some(value.to_string()),
            "key" => key = Some(value.to_string()),
            _ => {}
        }
    }

    (url, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rc() {
        let (url, key) = parse_rc("url: https://cds.example.org/api\nkey: abcd-1234\n");
        assert_eq!(url.as_deref(), Some("https://cds.example.org/api"));
        assert_eq!(key.as_deref(), Some("abcd-1234"));
    }

    #[test]
    fn test_parse_rc_ignores_noise() {
        let (url, key) = parse_rc("# comment\nverify: 0\n\nkey:   \nurl:https://a.b/api");
        assert_eq!(url.as_deref(), Some("https://a.b/api"));
        assert_eq!(key, None);
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = CdsConfig::new("https://cds.example.org/api/", "k", "/tmp/stage");
        assert_eq!(config.url, "https://cds.example.org/api");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = CdsConfig::new("ftp://nope", "k", "/tmp");
        assert!(config.validate().is_err());

        let config = CdsConfig::new(DEFAULT_CDS_URL, " ", "/tmp");
        assert!(config.validate().is_err());

        let mut config = CdsConfig::new(DEFAULT_CDS_URL, "k", "/tmp");
        config.max_polls = 0;
        assert!(config.validate().is_err());
    }
}
