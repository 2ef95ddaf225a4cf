// =============================================================================
// Environment-driven configuration
// =============================================================================
//
// Replaces the teacher's file-backed, hot-reloadable `RuntimeConfig`: this
// system's config surface is env vars (spec §6) plus the `system_config`
// table for the handful of flags the admin plane toggles at runtime
// (`HALT_TRADING`, `EMERGENCY_EXIT`, `AI_MODEL_KEY`). Static, process-
// lifetime settings are loaded once at startup the way
// `AgentConfig::from_env()` does in the pack's InvestIQ agent.

use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Binance,
    Bybit,
    Paper,
}

impl std::str::FromStr for Exchange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "bybit" => Ok(Self::Bybit),
            "paper" => Ok(Self::Paper),
            other => Err(anyhow::anyhow!("unknown EXCHANGE: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub exchange: Exchange,
    pub exchange_category: String,
    pub futures_leverage: u32,
    pub bybit_position_idx: u32,

    pub symbols: Vec<String>,
    pub interval_minutes: i64,
    pub strategy_tick_seconds: u64,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,

    pub hard_stop_loss_pct: f64,
    pub max_concurrent_positions: u32,
    pub min_order_usdt: f64,
    pub auto_leverage_min: u32,
    pub auto_leverage_max: u32,

    pub ai_enabled: bool,
    pub ai_weight: f64,
    pub ai_lr: f64,
    pub ai_l2: f64,
    pub ai_model_key: String,

    pub take_profit_reason_on_positive_pnl: bool,
    pub admin_token: String,

    pub database_url: String,
    pub redis_url: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    pub binance_base_url: String,
    pub binance_api_key: String,
    pub binance_api_secret: String,

    pub bybit_base_url: String,
    pub bybit_api_key: String,
    pub bybit_api_secret: String,

    pub instance_id: String,
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let exchange: Exchange = env_var("EXCHANGE", "paper")
            .parse()
            .context("invalid EXCHANGE")?;

        let symbols = Self::parse_symbols();

        let config = Self {
            exchange,
            exchange_category: env_var("EXCHANGE_CATEGORY", "linear"),
            futures_leverage: env_parse("FUTURES_LEVERAGE", 10),
            bybit_position_idx: env_parse("BYBIT_POSITION_IDX", 0),

            symbols,
            interval_minutes: env_parse("INTERVAL_MINUTES", 15),
            strategy_tick_seconds: env_parse("STRATEGY_TICK_SECONDS", 900),
            ema_fast_period: env_parse("EMA_FAST_PERIOD", 12),
            ema_slow_period: env_parse("EMA_SLOW_PERIOD", 26),

            hard_stop_loss_pct: env_parse("HARD_STOP_LOSS_PCT", 0.03),
            max_concurrent_positions: env_parse("MAX_CONCURRENT_POSITIONS", 3),
            min_order_usdt: env_parse("MIN_ORDER_USDT", 50.0),
            auto_leverage_min: env_parse("AUTO_LEVERAGE_MIN", 10),
            auto_leverage_max: env_parse("AUTO_LEVERAGE_MAX", 20),

            ai_enabled: env_bool("AI_ENABLED", true),
            ai_weight: env_parse("AI_WEIGHT", 0.35),
            ai_lr: env_parse("AI_LR", 0.05),
            ai_l2: env_parse("AI_L2", 1e-6),
            ai_model_key: env_var("AI_MODEL_KEY", "AI_MODEL_STATE"),

            take_profit_reason_on_positive_pnl: env_bool("TAKE_PROFIT_REASON_ON_POSITIVE_PNL", true),
            admin_token: env_var("ADMIN_TOKEN", ""),

            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            redis_url: env_var("REDIS_URL", "redis://127.0.0.1/"),

            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),

            binance_base_url: env_var("BINANCE_BASE_URL", "https://fapi.binance.com"),
            binance_api_key: env_var("BINANCE_API_KEY", ""),
            binance_api_secret: env_var("BINANCE_API_SECRET", ""),

            bybit_base_url: env_var("BYBIT_BASE_URL", "https://api.bybit.com"),
            bybit_api_key: env_var("BYBIT_API_KEY", ""),
            bybit_api_secret: env_var("BYBIT_API_SECRET", ""),

            instance_id: env_var("INSTANCE_ID", "default"),
        };

        info!(
            exchange = ?config.exchange,
            symbols = ?config.symbols,
            interval_minutes = config.interval_minutes,
            strategy_tick_seconds = config.strategy_tick_seconds,
            max_concurrent_positions = config.max_concurrent_positions,
            ai_enabled = config.ai_enabled,
            "configuration loaded"
        );

        Ok(config)
    }

    fn parse_symbols() -> Vec<String> {
        let raw = std::env::var("SYMBOLS")
            .ok()
            .or_else(|| std::env::var("SYMBOL").ok())
            .unwrap_or_else(|| "BTCUSDT".to_string());

        raw.split(|c: char| c == ',' || c.is_whitespace())
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_parses_case_insensitively() {
        assert_eq!("Binance".parse::<Exchange>().unwrap(), Exchange::Binance);
        assert_eq!("BYBIT".parse::<Exchange>().unwrap(), Exchange::Bybit);
        assert!("unknown".parse::<Exchange>().is_err());
    }
}
