//! Monitoring Module
//!
//! Provides observability for DynKG training runs:
//! - Structured logging via `tracing`
//! - Epoch-indexed scalar summaries

pub mod logging;
pub mod summary;

pub use logging::{init_logging, LogFormat, LogLevel, LoggerConfig};
pub use summary::{ScalarEvent, SummaryWriter};
