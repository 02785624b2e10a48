#[cfg(feature = "adc")]
mod adc;
mod board;
mod button;
mod config;
mod control;
mod hw;
mod profile;
mod pump;
mod sensor;
#[cfg(feature = "sim")]
mod sim;

use anyhow::{Context, Result};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use board::Board;
use control::ControlLoop;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("start: soil-moisture auto irrigation with profile select");

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").ok();
    let cfg = config::load_or_default(config_path.as_deref())?;
    let profiles = cfg.profile_table();
    for mode in profile::Mode::ALL {
        let p = profiles.get(mode);
        info!(
            %mode,
            threshold = p.threshold,
            pump_run_ms = p.pump_run_ms,
            indicator_pin = p.indicator_pin,
            "profile"
        );
    }
    if cfg.control.max_pump_cycles.is_none() {
        tracing::warn!("no max_pump_cycles set: a sensor stuck dry will keep the pump cycling");
    }

    // ── Hardware ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let board = Board::new(&cfg, Arc::clone(&shutdown)).context("failed to initialise board")?;

    // ── Shutdown on Ctrl-C ──────────────────────────────────────────
    let signal_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    // ── Control loop (blocking, owns the board) ─────────────────────
    let mut control = ControlLoop::new(board, &cfg, shutdown);
    tokio::task::spawn_blocking(move || control.run())
        .await
        .context("control loop panicked")?;

    Ok(())
}
