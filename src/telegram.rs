// =============================================================================
// Telegram notifier — best-effort, never blocks trading
// =============================================================================
//
// Out of scope per spec §1: message templates and delivery guarantees are
// an external collaborator's concern. Only the interface matters here —
// "send this text, and if it fails, log and move on" — grounded in the
// teacher's consistent "log and continue" error style across
// `reconcile.rs`/`main.rs`'s stream-reconnect loops.

use tracing::warn;

pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Fire-and-forget. Errors are logged at `warn!` and swallowed —
    /// callers never branch on the result.
    pub async fn notify(&self, text: &str) {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "telegram notification rejected");
            }
            Err(e) => {
                warn!(error = %e, "telegram notification failed to send");
            }
            Ok(_) => {}
        }
    }
}
