//! Tracing setup
//!
//! Logs go to stderr so that command output on stdout stays machine readable.

use std::io;
use std::time::Instant;

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, span, Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::constants::SubDao;

pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_subscriber() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // A second call (tests, embedding) keeps the first subscriber
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        info!("Tracing initialized");
    }
}

/// Span covering one voting power computation
pub fn computation_span(owner: &Pubkey, sub_dao: SubDao) -> Span {
    span!(
        Level::INFO,
        "voting_power",
        owner = %owner,
        sub_dao = %sub_dao,
    )
}

/// Logs the elapsed time of an operation when dropped
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn start(operation: &'static str) -> Self {
        debug!(operation, "Operation started");
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        debug!(operation = self.operation, elapsed_ms, "Operation finished");
    }
}
