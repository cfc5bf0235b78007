//! Prometheus-based monitoring.
//!
//! Tracks pipeline runs, capability handler attempts, quality scores, image
//! slot failures and translations.
//!
//! ```ignore
//! use autopress::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! MetricsCollector::new().record_quality(82.0);
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};
