// =============================================================================
// Exchange integrations
// =============================================================================
//
// One `ExchangeClient` implementation per venue, plus the shared rate
// limiter they're each built on. `binance.rs` and `bybit.rs` talk to the
// real REST APIs; `paper.rs` wraps either one to simulate fills for demo
// accounts.

pub mod binance;
pub mod bybit;
pub mod client;
pub mod paper;
pub mod rate_limit;

pub use binance::BinanceFuturesClient;
pub use bybit::BybitLinearClient;
pub use client::{ExchangeClient, OrderResult, OrderSide, OrderStatus, PlaceOrderRequest};
pub use paper::PaperClient;
pub use rate_limit::{Budget, RateLimiter};
