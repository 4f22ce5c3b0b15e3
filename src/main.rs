use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use motiontime::clock::SystemMonotonic;
use motiontime::config::{ConfigOverrides, SyncConfig};
use motiontime::format::TimeStyle;
use motiontime::net::NtpTransport;
use motiontime::scheduler::SyncScheduler;
use motiontime::status::{write_status_file, SyncState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    ntp_server: Option<String>,

    #[arg(long)]
    ntp_port: Option<u16>,

    #[arg(long)]
    local_port: Option<u16>,

    /// Seconds between syncs once synchronized
    #[arg(long)]
    healthy_interval: Option<u32>,

    /// Seconds between retries while unsynchronized
    #[arg(long)]
    error_interval: Option<u32>,

    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Write the sync state as JSON here after every attempt
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Sync once, print the time and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            ntp_server: self.ntp_server.clone(),
            ntp_port: self.ntp_port,
            local_port: self.local_port,
            healthy_interval_secs: self.healthy_interval,
            error_interval_secs: self.error_interval,
            sync_timeout_ms: self.timeout_ms,
        }
    }
}

fn write_status(path: &Path, state: &SyncState) {
    if let Err(e) = write_status_file(path, state) {
        warn!("Failed to write status file {}: {:#}", path.display(), e);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = SyncConfig::resolve(args.config.as_deref(), &args.overrides())?;

    let transport = match NtpTransport::bind(config.local_port) {
        Ok(t) => t.with_server_port(config.ntp_port),
        Err(e) => {
            error!("Failed to bind UDP port {}: {}", config.local_port, e);
            return Err(e).context("NTP endpoint unavailable");
        }
    };

    let mut scheduler = SyncScheduler::new(transport, config, SystemMonotonic::new());

    if args.once {
        let result = scheduler.sync_now().await;
        if let Some(path) = &args.status_file {
            write_status(path, &scheduler.state());
        }

        let clock = scheduler.clock();
        let clock = clock.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        println!("{}", clock.current_time(TimeStyle::Human));
        println!("{}", clock.current_time(TimeStyle::Filename));

        if result.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        let _ = shutdown_tx.send(true);
    })?;

    let status_file = args.status_file.clone();
    scheduler
        .run(shutdown_rx, |state| {
            if let Some(path) = &status_file {
                write_status(path, state);
            }
        })
        .await;

    info!("Exiting.");
    Ok(())
}
