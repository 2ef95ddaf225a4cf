// =============================================================================
// Strategy engine — per-tick orchestration
// =============================================================================
//
// Spec §4.4's full tick flow: reconcile stuck orders, enforce stop-losses,
// run the emergency exit if flagged, evaluate signals, rank and size
// candidates within the concurrency cap, open the winners, and train the
// online model on anything that just closed.

pub mod emergency;
pub mod lifecycle;
pub mod lock;
pub mod market;
pub mod online_model;
pub mod positions;
pub mod reconcile;
pub mod scoring;
pub mod signal;
pub mod sizing;
pub mod stop_loss;

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::exchange::ExchangeClient;
use crate::persistence::config_store;
use crate::persistence::trace::new_trace_id;
use crate::strategy::lifecycle::OpenPlan;
use crate::strategy::online_model::OnlineLogisticRegression;

pub const HALT_TRADING_KEY: &str = "HALT_TRADING";

/// A symbol with a BUY signal and no open position — scored and ranked per
/// spec §4.4.2 before the concurrency cap is applied.
struct Candidate {
    symbol: String,
    robot_score: f64,
    ai_prob: Option<f64>,
    combined: f64,
    close: Decimal,
    features_json: serde_json::Value,
}

/// Run one tick across every configured symbol. Per-symbol failures are
/// logged and do not abort the rest of the tick — each symbol's critical
/// section stands alone.
pub async fn run_tick(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    config: &Config,
    model: &mut OnlineLogisticRegression,
) {
    let trace_id = new_trace_id();
    let kline_open_time_ms = crate::time::now_ms();

    if let Err(e) = reconcile::sweep(pool, client, &trace_id).await {
        warn!(error = %e, "reconciliation sweep failed");
    }

    let emergency_active = emergency::is_active(pool).await.unwrap_or(false);
    if emergency_active {
        let realized = emergency::close_all(pool, client, &trace_id, &config.symbols, kline_open_time_ms).await;
        for (symbol, _pnl) in realized {
            train_from_last_close(pool, &symbol, model).await;
        }
        if let Err(e) = emergency::clear(pool, &trace_id).await {
            warn!(error = %e, "failed to clear emergency exit flag");
        }
        return;
    }

    let halted = config_store::get_bool(pool, HALT_TRADING_KEY, false)
        .await
        .unwrap_or(false);

    let mut candidates = Vec::new();
    let lock_ttl = std::time::Duration::from_millis((config.strategy_tick_seconds as f64 * 900.0) as u64);

    for symbol in &config.symbols {
        let Some(tick_lock) = lock::try_acquire(&config.redis_url, client.name(), symbol, lock_ttl).await else {
            warn!(symbol, "skipping symbol this tick, failed to acquire tick lock");
            continue;
        };

        let bar = match market::latest(pool, symbol, config.interval_minutes).await {
            Ok(Some(b)) => b,
            Ok(None) => {
                tick_lock.release().await;
                continue;
            }
            Err(e) => {
                warn!(symbol, error = %e, "failed to load latest bar");
                tick_lock.release().await;
                continue;
            }
        };

        match stop_loss::enforce(
            pool,
            client,
            &trace_id,
            symbol,
            bar.close,
            kline_open_time_ms,
            config.hard_stop_loss_pct,
        )
        .await
        {
            Ok(Some(_pnl)) => {
                train_from_last_close(pool, symbol, model).await;
                tick_lock.release().await;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(symbol, error = %e, "stop loss enforcement failed");
                tick_lock.release().await;
                continue;
            }
        }

        if halted {
            tick_lock.release().await;
            continue;
        }

        let signal = signal::evaluate(bar.features.ema_fast, bar.features.ema_slow, bar.features.rsi);

        let open_trade = positions::latest_position(pool, symbol).await.unwrap_or(None);
        let has_position = open_trade.as_ref().is_some_and(|p| p.base_qty > Decimal::ZERO);

        match signal {
            Some(signal::Signal::Sell) if has_position => {
                let qty = open_trade.map(|p| p.base_qty).unwrap_or(Decimal::ZERO);
                let plan = lifecycle::ClosePlan {
                    symbol: symbol.clone(),
                    qty,
                    reason_code: crate::enums::ReasonCode::StrategyExit,
                    reason: "setup B sell signal".to_string(),
                    kline_open_time_ms,
                };
                match lifecycle::close_long(
                    pool,
                    client,
                    &trace_id,
                    &plan,
                    config.take_profit_reason_on_positive_pnl,
                )
                .await
                {
                    Ok(_) => {
                        train_from_last_close(pool, symbol, model).await;
                    }
                    Err(e) => warn!(symbol, error = %e, "strategy exit close failed"),
                }
            }
            Some(signal::Signal::Buy) if !has_position => {
                let close_f64 = market::close_f64(&bar);
                let ema_fast = bar.features.ema_fast.unwrap_or(close_f64);
                let ema_slow = bar.features.ema_slow.unwrap_or(close_f64);
                let robot = scoring::robot_score(ema_fast, ema_slow, close_f64, bar.features.rsi, signal::Signal::Buy);

                let ai_prob = if config.ai_enabled {
                    Some(model.predict_proba(&bar.features.to_model_input()))
                } else {
                    None
                };
                let combined = scoring::combined_score(robot, ai_prob, config.ai_weight);

                let features_json = serde_json::to_value(bar.features).unwrap_or(serde_json::Value::Null);
                candidates.push(Candidate {
                    symbol: symbol.clone(),
                    robot_score: robot,
                    ai_prob,
                    combined,
                    close: bar.close,
                    features_json,
                });
            }
            _ => {}
        }

        tick_lock.release().await;
    }

    if !halted && !candidates.is_empty() {
        open_ranked_candidates(pool, client, config, &trace_id, candidates, kline_open_time_ms).await;
    }

    if let Err(e) = model.maybe_persist(pool, &config.ai_model_key, &trace_id).await {
        warn!(error = %e, "failed to persist AI model checkpoint");
    }
}

async fn open_ranked_candidates(
    pool: &MySqlPool,
    client: &Arc<dyn ExchangeClient>,
    config: &Config,
    trace_id: &str,
    mut candidates: Vec<Candidate>,
    kline_open_time_ms: i64,
) {
    let open_cnt = positions::open_count(pool, &config.symbols).await.unwrap_or(0);
    let available_slots = config.max_concurrent_positions.saturating_sub(open_cnt) as usize;
    if available_slots == 0 {
        return;
    }

    candidates.sort_by(|a, b| b.combined.partial_cmp(&a.combined).unwrap_or(std::cmp::Ordering::Equal));

    for candidate in candidates.into_iter().take(available_slots) {
        let leverage = sizing::leverage_for_score(candidate.combined, config.auto_leverage_min, config.auto_leverage_max);
        let Some(qty) = sizing::qty_min(
            Decimal::try_from(config.min_order_usdt).unwrap_or_default(),
            leverage,
            candidate.close,
        ) else {
            continue;
        };
        if qty <= Decimal::ZERO {
            continue;
        }

        let entry_price_f64 = candidate.close.to_f64().unwrap_or(0.0);
        let stop_price = sizing::stop_price(candidate.close, config.hard_stop_loss_pct);

        let plan = OpenPlan {
            symbol: candidate.symbol.clone(),
            qty,
            entry_price: candidate.close,
            leverage,
            stop_dist_pct: config.hard_stop_loss_pct,
            stop_price,
            robot_score: candidate.robot_score,
            ai_prob: candidate.ai_prob,
            features_json: candidate.features_json,
            kline_open_time_ms,
        };

        match lifecycle::open_long(pool, client, trace_id, &plan).await {
            Ok(_) => info!(symbol = %candidate.symbol, entry_price = entry_price_f64, "candidate opened"),
            Err(e) => warn!(symbol = %candidate.symbol, error = %e, "failed to open candidate"),
        }
    }
}

/// Call after a trade closes with a known label, to keep the online model
/// learning from realized outcomes (spec §4.4.8).
pub fn train_on_closed_trade(model: &mut OnlineLogisticRegression, features_json: &serde_json::Value, label: u8) {
    let Ok(fv) = serde_json::from_value::<crate::indicators::FeatureVector>(features_json.clone()) else {
        return;
    };
    model.partial_fit(&fv.to_model_input(), label);
}

/// Look up the trade just closed for `symbol` and train the model on it.
/// Safe to call right after any successful close — it reads back the row
/// that close just wrote, so it always trains on that trade, not a stale one.
async fn train_from_last_close(pool: &MySqlPool, symbol: &str, model: &mut OnlineLogisticRegression) {
    let trade = match positions::last_closed_trade(pool, symbol).await {
        Ok(t) => t,
        Err(e) => {
            warn!(symbol, error = %e, "failed to load last closed trade for training");
            return;
        }
    };
    if let Some(trade) = trade {
        if let Some(label) = trade.label {
            train_on_closed_trade(model, &trade.features_json.0, label as u8);
        }
    }
}
