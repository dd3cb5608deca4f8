use clap::Parser;
use shiftlog::app::{App, connect};
use shiftlog::core::config::{load_config, resolve};
use shiftlog::core::notify::ToastQueue;
use shiftlog::tui;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

const TOAST_CAPACITY: usize = 5;
const TOAST_TTL: Duration = Duration::from_secs(4);

#[derive(Parser)]
#[command(name = "shiftlog", about = "Shift, expense and fleet cost tracker for drivers")]
struct Args {
    /// Backend project URL (overrides config and SHIFTLOG_BACKEND_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// Seconds between background refreshes
    #[arg(long)]
    refresh_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return Err(std::io::Error::other(e.to_string()));
        }
    };
    let config = resolve(&config, args.backend_url.as_deref(), args.refresh_secs);

    // Initialize file logger
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create(&config.log_file) {
        let _ = WriteLogger::init(config.log_level, log_config, log_file);
    }

    log::info!("Shiftlog starting up against {}", config.backend_url);

    let backend = match connect(&config).await {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("Sign-in failed: {}", e);
            eprintln!("Sign-in failed: {}", e.message());
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let toasts = Arc::new(ToastQueue::new(TOAST_CAPACITY, TOAST_TTL));
    let app = App::new(backend, toasts.clone());

    // Bootstrap and the first refresh run in the background so the first
    // frame shows up immediately. Without a session there is nothing to refresh.
    let background = {
        let app = app.clone();
        let interval = config.refresh_interval;
        tokio::spawn(async move {
            if app.bootstrap().await {
                app.periodic_refresh(interval).await;
            }
        })
    };

    let result = tui::run(&app, toasts);

    background.abort();
    log::info!("Shiftlog exiting");
    result
}
