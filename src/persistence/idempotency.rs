// =============================================================================
// Idempotency key builder
// =============================================================================
//
// `client_order_id` must be stable for retries of "the same opportunity":
// same action, same symbol, same bar. Re-evaluating the same bar twice (a
// crashed tick restarted, a lock TTL expired mid-flight) must produce the
// identical id so the venue and `order_events` both collapse retries into
// one order.

use sha2::{Digest, Sha256};

const MAX_LEN: usize = 64;
const DEFAULT_STRATEGY_TAG: &str = "sb";

/// Strip separators a venue symbol is commonly typed with (`BTC/USDT`,
/// `BTC-USDT`, `btc usdt`) down to the bare `BTCUSDT` form.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .to_ascii_uppercase()
        .trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | ':' | ' '))
        .collect()
}

/// Build `<action>_<strategy_tag>_<symbol>_<kline_open_time_ms>`, hash-
/// shortened to stay under `max_len` while keeping a readable prefix.
pub fn make_client_order_id(
    action: &str,
    symbol: &str,
    kline_open_time_ms: i64,
    strategy_tag: &str,
) -> String {
    let action = action.to_ascii_lowercase();
    let sym = normalize_symbol(symbol);
    let base = format!("{action}_{strategy_tag}_{sym}_{kline_open_time_ms}");
    if base.len() <= MAX_LEN {
        return base;
    }

    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    let digest = hasher.finalize();
    let hash_prefix = hex::encode(digest)[..10].to_string();
    let sym_short = &sym[..sym.len().min(10)];
    let short = format!("{action}_{strategy_tag}_{sym_short}_{kline_open_time_ms}_{hash_prefix}");
    short[..short.len().min(MAX_LEN)].to_string()
}

/// Convenience wrapper using this system's default strategy tag.
pub fn make_client_order_id_default(action: &str, symbol: &str, kline_open_time_ms: i64) -> String {
    make_client_order_id(action, symbol, kline_open_time_ms, DEFAULT_STRATEGY_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_separator_forms() {
        assert_eq!(normalize_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("btc-usdt"), "BTCUSDT");
        assert_eq!(normalize_symbol(" BTC USDT "), "BTCUSDT");
        assert_eq!(normalize_symbol("BTC:USDT"), "BTCUSDT");
    }

    #[test]
    fn same_tuple_yields_same_id() {
        let a = make_client_order_id_default("buy", "BTCUSDT", 1_700_000_000_000);
        let b = make_client_order_id_default("buy", "BTCUSDT", 1_700_000_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn different_bar_yields_different_id() {
        let a = make_client_order_id_default("buy", "BTCUSDT", 1_700_000_000_000);
        let b = make_client_order_id_default("buy", "BTCUSDT", 1_700_000_060_000);
        assert_ne!(a, b);
    }

    #[test]
    fn short_id_is_readable_and_under_limit() {
        let id = make_client_order_id_default("buy", "BTCUSDT", 1_700_000_000_000);
        assert!(id.len() <= MAX_LEN);
        assert_eq!(id, "buy_sb_BTCUSDT_1700000000000");
    }

    #[test]
    fn overlong_id_is_hash_shortened_under_limit() {
        let id = make_client_order_id("emergency_exit", "SOMEVERYLONGSYMBOLNAMEUSDT", 1_700_000_000_000, "a-very-long-strategy-tag-name");
        assert!(id.len() <= MAX_LEN);
        assert!(id.contains("SOMEVERYLON"));
    }
}
