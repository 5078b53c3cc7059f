use clap::Parser;

use crate::config::{FlotaConfig, expand_path};
use crate::domain::FlotaResult;

pub const ENV_PASSWORD: &str = "FLOTA_PASSWORD";

/// flota - fleet inspection and voucher dashboard for the terminal
#[derive(Parser, Debug, Default)]
#[command(name = "flota")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Serve records from a directory of <table>.json files instead of the backend
    #[arg(short, long)]
    pub fixtures: Option<String>,

    /// Backend base url (overrides config and environment)
    #[arg(long)]
    pub url: Option<String>,

    /// Rows per table page
    #[arg(short, long)]
    pub page_size: Option<usize>,

    /// Sign in on startup; the password is read from FLOTA_PASSWORD
    #[arg(short, long)]
    pub email: Option<String>,

    /// Write logs to this file
    #[arg(long)]
    pub log_file: Option<String>,

    /// Screen to open first, e.g. /vales or /reports/12
    #[arg(short, long, default_value = "/reports")]
    pub route: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Flags win over both the config file and the environment.
    pub fn apply(&self, mut config: FlotaConfig) -> FlotaResult<FlotaConfig> {
        if let Some(dir) = &self.fixtures {
            config = config.fixtures_dir(expand_path(dir)?);
        }
        if let Some(url) = &self.url {
            config = config.supabase_url(url.as_str());
        }
        if let Some(page_size) = self.page_size {
            config = config.page_size(page_size);
        }
        if let Some(log_file) = &self.log_file {
            config = config.log_file(expand_path(log_file)?);
        }
        Ok(config)
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "flota=info",
            1 => "flota=debug",
            _ => "flota=trace",
        }
    }
}
