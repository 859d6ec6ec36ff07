pub mod models {
    pub mod climate;
    pub mod haier;
}

pub mod config;
pub mod env_file;
pub mod schema;
pub mod utils;
pub mod services {
    pub mod app;
    pub mod climate;
    pub mod peripherals;
    pub mod registry;
    pub mod wiring;
}

use crate::config::Config;
use crate::env_file::CliArgs;
use crate::models::climate::ClimateMode;
use crate::services::app::{self, Application};
use crate::services::registry::Climate;
use crate::utils::serde_enum_name;
use log::{error, info};

pub fn run(cli: CliArgs) -> Result<(), String> {
    // 1) Load config; CLI flags override the environment
    let mut cfg = Config::from_env()?;
    if let Some(path) = cli.config_path {
        cfg.config_path = path;
    }
    cfg.validate_only |= cli.validate_only;
    info!(
        "Config loaded (config_path={}, validate_only={})",
        cfg.config_path.display(),
        cfg.validate_only
    );

    // 2) Read the document
    let doc = app::read_document(&cfg.config_path)
        .map_err(|e| format!("{}: {}", cfg.config_path.display(), e))?;
    info!(
        "Document read: {} transmitter(s), {} receiver(s), {} climate entr{}",
        doc.remote_transmitter.len(),
        doc.remote_receiver.len(),
        doc.climate.len(),
        if doc.climate.len() == 1 { "y" } else { "ies" }
    );

    // 3) Validate, wire and register
    let mut application = Application::load(doc).map_err(|e| format!("{}: {}", cfg.config_path.display(), e))?;
    if cfg.validate_only {
        info!("Configuration valid; skipping setup (validate_only)");
        return Ok(());
    }

    // 4) Setup: every component becomes active
    application.setup().map_err(|e| format!("setup failed: {}", e))?;
    application.dump_config();

    for id in application.climates().ids() {
        if let Some(climate) = application.climates().get(&id) {
            let climate = climate.borrow();
            let traits = climate.traits();
            let modes = traits
                .supported_modes
                .iter()
                .filter(|m| **m != ClimateMode::Off)
                .filter_map(serde_enum_name)
                .collect::<Vec<_>>()
                .join(",");
            info!(
                "Climate {} ready ('{}', modes={}, range={}..{}C)",
                id,
                climate.name(),
                modes,
                traits.visual_min_temperature,
                traits.visual_max_temperature
            );
        }
    }
    info!("{} component(s) active", application.components().len());

    Ok(())
}

fn main() {
    let cli = match env_file::parse_args(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };
    let loaded_env = match env_file::load(cli.env_file.clone()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "haier-ir-climate {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
