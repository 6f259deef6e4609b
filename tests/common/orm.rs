//! Stand-in for a data-access library sitting between application code
//! and the query logger.

use std::time::Duration;

use query_log_sink::{QueryClass, QueryLogger};

/// Run one statement through `layers` nested library frames.
#[inline(never)]
pub fn query_through_layers(log: &QueryLogger, layers: usize) -> QueryClass {
    if layers > 1 {
        return std::hint::black_box(query_through_layers(log, layers - 1));
    }
    log.trace_elapsed(
        Duration::from_millis(1),
        || ("SELECT * FROM users".to_string(), 1),
        None,
    )
}
