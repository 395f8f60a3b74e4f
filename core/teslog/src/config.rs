//! `~/.teslog/config.toml` loading. Every key has a default and a missing
//! file means "all defaults"; command-line flags override on top.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use teslog_core::{DisplayZone, DEFAULT_GAP_ALERT_SECS, DEFAULT_ZOOM};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".teslog/config.toml";
const DEFAULT_STORE_RELATIVE_PATH: &str = ".teslog/teslog.db";
const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";

#[derive(Debug, Clone, Deserialize)]
pub struct TeslogConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_gap_alert_secs")]
    pub gap_alert_secs: i64,
    #[serde(default)]
    pub want_offline: bool,
    #[serde(default = "default_follow_lines")]
    pub follow_lines: usize,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl Default for TeslogConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            gap_alert_secs: default_gap_alert_secs(),
            want_offline: false,
            follow_lines: default_follow_lines(),
            geocode: GeocodeConfig::default(),
            store: StoreConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocode_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            timeout_secs: default_geocode_timeout_secs(),
            zoom: default_zoom(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub enabled: bool,
    /// SQLite file for sessions and the geocode cache.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub outdir: Option<PathBuf>,
}

impl TeslogConfig {
    pub fn zone(&self) -> Result<DisplayZone, String> {
        parse_zone(&self.timezone)
    }

    /// Database path: configured, else `~/.teslog/teslog.db`.
    pub fn store_path(&self) -> Result<PathBuf, String> {
        match &self.store.path {
            Some(path) => Ok(expand_home(path)),
            None => default_store_path(),
        }
    }
}

pub fn parse_zone(value: &str) -> Result<DisplayZone, String> {
    DisplayZone::parse(value).ok_or_else(|| {
        format!(
            "Unsupported timezone '{}': use local, utc, an offset like +05:30, or a zone name like Europe/Berlin",
            value
        )
    })
}

pub fn default_config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

pub fn default_store_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(DEFAULT_STORE_RELATIVE_PATH))
}

pub fn load_config(path: Option<PathBuf>) -> Result<TeslogConfig, String> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(TeslogConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        format!(
            "Failed to read config {}: {}",
            config_path.display(),
            err
        )
    })?;
    toml::from_str::<TeslogConfig>(&content).map_err(|err| {
        format!(
            "Failed to parse config {}: {}",
            config_path.display(),
            err
        )
    })
}

/// `~/x` → `$HOME/x`; anything else is returned as given.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn default_timezone() -> String {
    "local".to_string()
}

fn default_gap_alert_secs() -> i64 {
    DEFAULT_GAP_ALERT_SECS
}

fn default_follow_lines() -> usize {
    10
}

fn default_endpoint() -> String {
    DEFAULT_NOMINATIM_ENDPOINT.to_string()
}

fn default_user_agent() -> String {
    format!("teslog/{}", env!("CARGO_PKG_VERSION"))
}

fn default_geocode_timeout_secs() -> u64 {
    20
}

fn default_zoom() -> u8 {
    DEFAULT_ZOOM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config.timezone, "local");
        assert_eq!(config.gap_alert_secs, 12_000);
        assert_eq!(config.follow_lines, 10);
        assert!(!config.geocode.enabled);
        assert_eq!(config.geocode.zoom, 18);
        assert_eq!(config.geocode.timeout_secs, 20);
        assert!(config.archive.outdir.is_none());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
timezone = "+02:00"
gap_alert_secs = 600
want_offline = true

[geocode]
enabled = true
user_agent = "my-car-log"
timeout_secs = 5

[store]
enabled = true
path = "/var/lib/teslog/sessions.db"

[archive]
outdir = "/var/log/tesla"
"#,
        )
        .expect("write config");

        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config.gap_alert_secs, 600);
        assert!(config.want_offline);
        assert!(config.geocode.enabled);
        assert_eq!(config.geocode.user_agent, "my-car-log");
        assert_eq!(config.geocode.endpoint, DEFAULT_NOMINATIM_ENDPOINT);
        assert_eq!(config.geocode.timeout_secs, 5);
        assert_eq!(
            config.store_path().expect("store path"),
            PathBuf::from("/var/lib/teslog/sessions.db")
        );
        assert_eq!(config.archive.outdir, Some(PathBuf::from("/var/log/tesla")));
        assert!(config.zone().is_ok());
    }

    #[test]
    fn load_config_rejects_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "gap_alert_secs = \"soon\"").expect("write config");
        let err = load_config(Some(path)).expect_err("must fail");
        assert!(err.starts_with("Failed to parse config"), "{}", err);
    }

    #[test]
    fn zone_names_are_accepted() {
        let config = TeslogConfig {
            timezone: "America/Los_Angeles".to_string(),
            ..TeslogConfig::default()
        };
        assert!(matches!(config.zone(), Ok(DisplayZone::Named(_))));
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let config = TeslogConfig {
            timezone: "Mars/Olympus".to_string(),
            ..TeslogConfig::default()
        };
        assert!(config.zone().is_err());
    }
}
