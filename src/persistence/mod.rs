// =============================================================================
// Persistence — sqlx pool, migrations, row models, append-only writers
// =============================================================================

pub mod config_store;
pub mod events;
pub mod heartbeat;
pub mod idempotency;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod trace;

pub use events::{append_order_event, stuck_orders, OrderEvent};
pub use idempotency::{make_client_order_id, make_client_order_id_default, normalize_symbol};
pub use trace::new_trace_id;
