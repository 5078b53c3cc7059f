use std::fs::{self, OpenOptions};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, info_span};
use tracing_error::{ErrorLayer, SpanTrace};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use flota::auth::{AuthClient, FIXTURE_USERS_TABLE, FixtureAuth, RestAuth};
use flota::cli::{Cli, ENV_PASSWORD};
use flota::config::{Backend, FlotaConfig};
use flota::controller::Controller;
use flota::domain::FlotaResult;
use flota::model::{Model, Status};
use flota::routes::Route;
use flota::store::{MemoryStore, Query, RecordStore, RestStore};
use flota::ui::FlotaUI;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config, &cli) {
        eprintln!("Error: cannot open log file {}: {e}", config.log_file.display());
        return ExitCode::FAILURE;
    }

    let _span = info_span!("flota").entered();
    let result = run(&cli, &config);
    ratatui::restore();
    match result {
        Err(e) => {
            error!("{e}\n{}", SpanTrace::capture());
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn load_config(cli: &Cli) -> FlotaResult<FlotaConfig> {
    let config = FlotaConfig::load(cli.config.as_deref())?.apply_env(|key| std::env::var(key).ok());
    let config = cli.apply(config)?;
    config.validate()?;
    Ok(config)
}

/// The terminal belongs to the UI, so every log line goes to a file.
fn init_logging(config: &FlotaConfig, cli: &Cli) -> std::io::Result<()> {
    if let Some(parent) = config.log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&config.log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn backend(config: &FlotaConfig) -> FlotaResult<(Arc<dyn RecordStore>, Arc<dyn AuthClient>)> {
    match config.backend()? {
        Backend::Rest { url, anon_key } => {
            info!("Using backend at {url}");
            let timeout = Duration::from_millis(config.http_timeout_ms);
            let store = RestStore::new(&url, &anon_key, timeout)?;
            let auth = RestAuth::new(&url, &anon_key, timeout)?;
            Ok((Arc::new(store), Arc::new(auth)))
        }
        Backend::Fixtures(dir) => {
            info!("Serving fixtures from {}", dir.display());
            let store = MemoryStore::load_dir(&dir)?;
            let auth = match store.select(&Query::from(FIXTURE_USERS_TABLE)) {
                Ok(accounts) => FixtureAuth::from_records(&accounts),
                Err(e) => {
                    info!("No fixture accounts: {e}");
                    FixtureAuth::new()
                }
            };
            Ok((Arc::new(store), Arc::new(auth)))
        }
    }
}

fn run(cli: &Cli, config: &FlotaConfig) -> FlotaResult<()> {
    info!("Starting flota {}", env!("CARGO_PKG_VERSION"));
    let (store, auth) = backend(config)?;

    let credentials = cli
        .email
        .clone()
        .map(|email| (email, std::env::var(ENV_PASSWORD).unwrap_or_default()));

    let mut terminal = ratatui::init();
    let size = terminal.size()?;

    let mut model = Model::init(config, store, auth, size.width as usize, size.height as usize);
    model.start(Route::parse(&cli.route), credentials);

    let mut ui = FlotaUI::new(config.max_column_width);
    let controller = Controller::new(config.event_poll_time);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Fold in finished background requests
        model.poll_fetches();

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}
