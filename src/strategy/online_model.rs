// =============================================================================
// Online logistic regression — per-process AI scorer
// =============================================================================
//
// Ported from `original_source/shared/ai/online_model.py`'s
// `OnlineLogisticRegression`: SGD with L2, numerically stable sigmoid,
// persisted as JSON to `system_config[AI_MODEL_KEY]` every 10 updates.

use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::enums::ReasonCode;
use crate::error::EngineError;
use crate::indicators::feature_vector::MODEL_INPUT_LEN;
use crate::persistence::config_store;

const PERSIST_EVERY_N_UPDATES: u64 = 10;
const MODEL_VERSION: u32 = 1;

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineLogisticRegression {
    pub dim: usize,
    pub lr: f64,
    pub l2: f64,
    pub bias: f64,
    pub w: Vec<f64>,
    pub seen: u64,
    pub version: u32,
}

impl OnlineLogisticRegression {
    pub fn new(dim: usize, lr: f64, l2: f64) -> Self {
        Self {
            dim,
            lr,
            l2,
            bias: 0.0,
            w: vec![0.0; dim],
            seen: 0,
            version: MODEL_VERSION,
        }
    }

    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.5;
        }
        let n = x.len().min(self.w.len());
        let z = self.bias + (0..n).map(|i| self.w[i] * x[i]).sum::<f64>();
        sigmoid(z)
    }

    /// One SGD step with L2 regularization. Returns the pre-update
    /// prediction (matches the Python original's `partial_fit` return).
    pub fn partial_fit(&mut self, x: &[f64], y: u8) -> f64 {
        let y = if y == 1 { 1.0 } else { 0.0 };
        let p = self.predict_proba(x);
        let err = p - y;

        let n = x.len().min(self.w.len());
        for i in 0..n {
            let (xi, wi) = (x[i], self.w[i]);
            self.w[i] = wi - self.lr * (err * xi + self.l2 * wi);
        }
        self.bias -= self.lr * err;
        self.seen += 1;
        p
    }

    /// Load the persisted model, or start from zeros if missing/corrupt.
    pub async fn load(pool: &MySqlPool, key: &str, lr: f64, l2: f64) -> Self {
        match config_store::get(pool, key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Self>(&raw) {
                Ok(mut model) => {
                    if model.w.len() != model.dim {
                        model.w.resize(model.dim, 0.0);
                    }
                    model
                }
                Err(e) => {
                    warn!(error = %e, "AI model state corrupt, starting from zeros");
                    Self::new(MODEL_INPUT_LEN, lr, l2)
                }
            },
            Ok(None) => Self::new(MODEL_INPUT_LEN, lr, l2),
            Err(e) => {
                warn!(error = %e, "failed to load AI model state, starting from zeros");
                Self::new(MODEL_INPUT_LEN, lr, l2)
            }
        }
    }

    /// Persist if `seen` just crossed a multiple of [`PERSIST_EVERY_N_UPDATES`].
    pub async fn maybe_persist(
        &self,
        pool: &MySqlPool,
        key: &str,
        trace_id: &str,
    ) -> Result<(), EngineError> {
        if self.seen == 0 || self.seen % PERSIST_EVERY_N_UPDATES != 0 {
            return Ok(());
        }
        let payload = serde_json::to_string(self).map_err(|e| EngineError::internal(e.to_string()))?;
        config_store::set(
            pool,
            "strategy-engine",
            key,
            &payload,
            trace_id,
            ReasonCode::AiTrain,
            "online model checkpoint",
        )
        .await?;
        info!(seen = self.seen, "AI model checkpoint persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_proba_on_zero_weights_is_half() {
        let model = OnlineLogisticRegression::new(3, 0.05, 1e-6);
        assert!((model.predict_proba(&[1.0, 2.0, 3.0]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn predict_proba_empty_input_is_half() {
        let model = OnlineLogisticRegression::new(3, 0.05, 1e-6);
        assert_eq!(model.predict_proba(&[]), 0.5);
    }

    #[test]
    fn partial_fit_moves_prediction_toward_label() {
        let mut model = OnlineLogisticRegression::new(2, 0.5, 0.0);
        let x = [1.0, -1.0];
        let p0 = model.predict_proba(&x);
        for _ in 0..20 {
            model.partial_fit(&x, 1);
        }
        let p1 = model.predict_proba(&x);
        assert!(p1 > p0);
        assert_eq!(model.seen, 20);
    }

    #[test]
    fn sigmoid_is_stable_for_large_magnitude_inputs() {
        assert!(sigmoid(1000.0) > 0.999);
        assert!(sigmoid(-1000.0) < 0.001);
    }
}
