// =============================================================================
// Trace id generator
// =============================================================================
//
// Every order_events row, config_audit row, and log line for a single
// logical operation (one tick's worth of work for one symbol, one admin
// call) shares a trace id so they can be joined for forensics.

use uuid::Uuid;

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unique_ids() {
        assert_ne!(new_trace_id(), new_trace_id());
    }
}
