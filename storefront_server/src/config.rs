//! Server configuration.
//!
//! Everything is read from `SPG_`-prefixed environment variables, with logged defaults for anything not set, so a
//! bare `cargo run` comes up on localhost against a local database.

use std::env;

use chrono::Duration;
use log::*;
use razorpay_tools::RazorpayConfig;
use spg_common::parse_boolean_flag;

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 4360;
const DEFAULT_FALLBACK_DIR: &str = "data/fallback";
const DEFAULT_PAYMENT_WINDOW: Duration = Duration::minutes(10);
const DEFAULT_EXPIRY_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Directory for the JSON fallback store that captures orders while the database is down.
    pub fallback_dir: String,
    /// How long a gateway order may sit in `Pending` before the reaper expires it.
    pub payment_window: Duration,
    /// How often the expiry worker sweeps for stale pending orders.
    pub expiry_interval_secs: u64,
    /// Set `SPG_RUN_EXPIRY_WORKER=0` to run without the reaper, e.g. when several server instances share a database
    /// and only one of them should sweep.
    pub run_expiry_worker: bool,
    pub razorpay: RazorpayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: String::default(),
            fallback_dir: DEFAULT_FALLBACK_DIR.to_string(),
            payment_window: DEFAULT_PAYMENT_WINDOW,
            expiry_interval_secs: DEFAULT_EXPIRY_INTERVAL_SECS,
            run_expiry_worker: true,
            razorpay: RazorpayConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = env::var("SPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPG_PORT. {e} Using the default, {DEFAULT_SPG_PORT}, instead."
                    );
                    DEFAULT_SPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPG_PORT);
        let database_url = storefront_engine::db::db_url();
        let fallback_dir = env::var("SPG_FALLBACK_DIR").unwrap_or_else(|_| {
            info!("🪛️ SPG_FALLBACK_DIR is not set. Using the default, {DEFAULT_FALLBACK_DIR}.");
            DEFAULT_FALLBACK_DIR.to_string()
        });
        let payment_window = env::var("SPG_PAYMENT_WINDOW_MINUTES")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| {
                        error!("🪛️ {s} is not a valid value for SPG_PAYMENT_WINDOW_MINUTES. {e} Using the default.");
                        e
                    })
                    .ok()
            })
            .map(Duration::minutes)
            .unwrap_or(DEFAULT_PAYMENT_WINDOW);
        let expiry_interval_secs = env::var("SPG_EXPIRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_EXPIRY_INTERVAL_SECS);
        let run_expiry_worker = parse_boolean_flag(env::var("SPG_RUN_EXPIRY_WORKER").ok(), true);
        let razorpay = RazorpayConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            fallback_dir,
            payment_window,
            expiry_interval_secs,
            run_expiry_worker,
            razorpay,
        }
    }
}
