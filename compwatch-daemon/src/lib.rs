//! compwatch daemon: environment configuration, tracing setup and the
//! perpetual pass scheduler.

pub mod config;
mod error;
mod runtime;

pub use config::{Config, LogFormat, StoreConfig};
pub use error::DaemonError;
pub use runtime::{
    init_tracing, next_delay, run, start_blocking, PassKind, PassOutcome, Timing, Worker,
};
