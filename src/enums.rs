// =============================================================================
// Shared domain enums
// =============================================================================
//
// Mirrors `original_source/shared/domain/enums.py` exactly: these are wire
// values persisted as plain strings in `order_events`/`trade_logs`/
// `config_audit`, so every variant's `Display` must match the Python
// `str, Enum` value byte-for-byte.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventType {
    Created,
    Submitted,
    Filled,
    Canceled,
    Error,
    Reconciled,
}

impl OrderEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Submitted => "SUBMITTED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Error => "ERROR",
            Self::Reconciled => "RECONCILED",
        }
    }
}

impl std::fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Side> for crate::exchange::OrderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => crate::exchange::OrderSide::Buy,
            Side::Sell => crate::exchange::OrderSide::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    StrategySignal,
    StrategyExit,
    TakeProfit,
    StopLoss,
    AdminHalt,
    AdminResume,
    AdminUpdateConfig,
    EmergencyExit,
    Reconcile,
    DataSync,
    System,
    AiSelect,
    AiTrain,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrategySignal => "STRATEGY_SIGNAL",
            Self::StrategyExit => "STRATEGY_EXIT",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::StopLoss => "STOP_LOSS",
            Self::AdminHalt => "ADMIN_HALT",
            Self::AdminResume => "ADMIN_RESUME",
            Self::AdminUpdateConfig => "ADMIN_UPDATE_CONFIG",
            Self::EmergencyExit => "EMERGENCY_EXIT",
            Self::Reconcile => "RECONCILE",
            Self::DataSync => "DATA_SYNC",
            Self::System => "SYSTEM",
            Self::AiSelect => "AI_SELECT",
            Self::AiTrain => "AI_TRAIN",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecomputeStatus {
    Pending,
    Done,
    Error,
}

impl PrecomputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for PrecomputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_event_type_values_match_wire_contract() {
        assert_eq!(OrderEventType::Created.as_str(), "CREATED");
        assert_eq!(OrderEventType::Reconciled.as_str(), "RECONCILED");
    }

    #[test]
    fn reason_code_values_match_wire_contract() {
        assert_eq!(ReasonCode::StopLoss.as_str(), "STOP_LOSS");
        assert_eq!(ReasonCode::EmergencyExit.as_str(), "EMERGENCY_EXIT");
        assert_eq!(ReasonCode::AiTrain.as_str(), "AI_TRAIN");
    }
}
