//! Metrics and observability infrastructure for snowplay.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `exporter`: Prometheus recorder and end-of-run text file export

pub mod events;
pub mod exporter;

pub use exporter::{MetricsExporter, init};

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use snowplay::metrics::events::{RecordsRead, RecordsSkipped};
///
/// emit!(RecordsRead { family: "log", count: 100 });
/// emit!(RecordsSkipped { family: "log", count: 2 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
