pub mod calibration;
pub mod config;
pub mod events;
pub mod export;
pub mod features;
pub mod frame;
pub mod gamestate;
pub mod gbt;
pub mod http_client;
pub mod labels;
pub mod literal;
pub mod passing_report;
pub mod pipeline;
pub mod provider_fetch;
pub mod spadl;
pub mod store;
pub mod training;
pub mod translate;
pub mod vaep;
pub mod xg_report;

/// Stderr logging filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Load `.env.local` then `.env`, ignoring missing files.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}
