//! Logging for the CLI and live runner.

mod logging;

pub use logging::{env_filter, setup_logging};
