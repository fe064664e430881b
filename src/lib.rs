// lib.rs
#![warn(clippy::large_futures)]

pub use std::{
    net,
    pin::Pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

pub use anyhow::bail;
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::{mpsc, watch, RwLock},
    time::{sleep, Duration},
};

mod steinhart;
pub use steinhart::*;

mod property;
pub use property::*;

mod things;
pub use things::*;

mod credentials;
pub use credentials::*;

mod config;
pub use config::*;

mod measure;
pub use measure::*;

mod telemetry;
pub use telemetry::*;

#[cfg(target_os = "espidf")]
mod state;
#[cfg(target_os = "espidf")]
pub use state::*;

#[cfg(target_os = "espidf")]
mod adc;
#[cfg(target_os = "espidf")]
pub use adc::*;

#[cfg(target_os = "espidf")]
mod mqtt;
#[cfg(target_os = "espidf")]
pub use mqtt::*;

#[cfg(target_os = "espidf")]
mod apiserver;
#[cfg(target_os = "espidf")]
pub use apiserver::*;

#[cfg(target_os = "espidf")]
mod wifi;
#[cfg(target_os = "espidf")]
pub use wifi::*;

#[cfg(target_os = "espidf")]
mod tasks;
#[cfg(target_os = "espidf")]
pub use tasks::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn build_timestamp() -> &'static str {
    option_env!("BUILD_TIMESTAMP").unwrap_or("-")
}

#[derive(Clone, Debug, Serialize)]
pub struct Uptime {
    pub uptime: usize,
    pub uptime_s: String,
}

impl Uptime {
    pub fn from_secs(uptime: usize) -> Self {
        let (d, rem) = (uptime / 86400, uptime % 86400);
        let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
        Uptime {
            uptime,
            uptime_s: format!("{d}d {h:02}:{m:02}:{s:02}"),
        }
    }
}


// EOF
