use std::fs;
use std::path::{Path, PathBuf};

use derive_setters::Setters;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{FlotaError, FlotaResult};
use crate::services::DEFAULT_MAINTENANCE_THRESHOLD_KM;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/flota/config.toml";
pub const DEFAULT_LOG_FILE: &str = "~/.cache/flota/flota.log";
pub const DEFAULT_PAGE_SIZE: usize = 4;

pub const ENV_SUPABASE_URL: &str = "FLOTA_SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "FLOTA_ANON_KEY";

#[derive(Debug, Clone, PartialEq, Deserialize, Setters)]
#[serde(default, deny_unknown_fields)]
pub struct FlotaConfig {
    #[setters(strip_option, into)]
    pub supabase_url: Option<String>,
    #[setters(strip_option, into)]
    pub anon_key: Option<String>,
    #[setters(strip_option, into)]
    pub fixtures_dir: Option<PathBuf>,
    #[setters(into)]
    pub email_domain: String,
    pub page_size: usize,
    pub maintenance_threshold_km: f64,
    pub event_poll_time: u64,
    pub http_timeout_ms: u64,
    pub max_column_width: usize,
    #[setters(into)]
    pub log_file: PathBuf,
}

impl Default for FlotaConfig {
    fn default() -> Self {
        FlotaConfig {
            supabase_url: None,
            anon_key: None,
            fixtures_dir: None,
            email_domain: "cfe.com.mx".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            maintenance_threshold_km: DEFAULT_MAINTENANCE_THRESHOLD_KM,
            event_poll_time: 100,
            http_timeout_ms: 10_000,
            max_column_width: 40,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

/// Where records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Rest { url: String, anon_key: String },
    Fixtures(PathBuf),
}

pub fn expand_path(raw: &str) -> FlotaResult<PathBuf> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| FlotaError::ConfigError(format!("cannot expand {raw:?}: {e}")))
}

impl FlotaConfig {
    /// Reads the TOML file at `path`, or the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&str>) -> FlotaResult<Self> {
        let explicit = path.is_some();
        let path = expand_path(path.unwrap_or(DEFAULT_CONFIG_PATH))?;
        if !path.exists() {
            if explicit {
                return Err(FlotaError::ConfigError(format!("{} does not exist", path.display())));
            }
            debug!("No config at {}, using defaults", path.display());
            return Ok(FlotaConfig::default());
        }
        let config = Self::from_file(&path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> FlotaResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> FlotaResult<Self> {
        let mut config: FlotaConfig = toml::from_str(text)?;
        config.expand_paths()?;
        Ok(config)
    }

    fn expand_paths(&mut self) -> FlotaResult<()> {
        self.log_file = expand_path(&self.log_file.to_string_lossy())?;
        if let Some(dir) = &self.fixtures_dir {
            self.fixtures_dir = Some(expand_path(&dir.to_string_lossy())?);
        }
        Ok(())
    }

    /// Environment overrides; `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SUPABASE_URL).filter(|v| !v.is_empty()) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = lookup(ENV_ANON_KEY).filter(|v| !v.is_empty()) {
            self.anon_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> FlotaResult<()> {
        if self.page_size == 0 {
            return Err(FlotaError::ConfigError("page_size must be at least 1".into()));
        }
        if !self.maintenance_threshold_km.is_finite() || self.maintenance_threshold_km < 0.0 {
            return Err(FlotaError::ConfigError(
                "maintenance_threshold_km must be a non-negative number".into(),
            ));
        }
        self.backend().map(|_| ())
    }

    /// Fixtures win over the REST backend so a demo never hits the network.
    pub fn backend(&self) -> FlotaResult<Backend> {
        if let Some(dir) = &self.fixtures_dir {
            return Ok(Backend::Fixtures(dir.clone()));
        }
        match (&self.supabase_url, &self.anon_key) {
            (Some(url), Some(key)) => Ok(Backend::Rest {
                url: url.clone(),
                anon_key: key.clone(),
            }),
            _ => Err(FlotaError::ConfigError(format!(
                "no backend configured: set supabase_url and anon_key ({ENV_SUPABASE_URL} / {ENV_ANON_KEY}) or fixtures_dir"
            ))),
        }
    }
}
