//! Bill-ready push notifications.
//!
//! `/notify` records a `(chat_id, bill_code)` row in the tenant database.
//! When a bill moves from an in-progress status to `ready`, via the
//! status-update endpoint or the daily sweep, every recorded chat gets
//! one message and the rows are deleted.

use sqlx::PgPool;

use crate::error::AppError;
use crate::services::telegram::TelegramClient;

pub const READY_STATUS: &str = "ready";

/// Statuses a bill can leave toward `ready` with a notification.
pub const NOTIFIABLE_PRIOR_STATUSES: [&str; 3] = ["cut", "pending", "with_tailor"];

pub fn should_notify(old_status: &str, new_status: &str) -> bool {
    new_status == READY_STATUS && NOTIFIABLE_PRIOR_STATUSES.contains(&old_status)
}

pub async fn record_notify_request(
    pool: &PgPool,
    chat_id: i64,
    bill_code: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO bill_notifications (chat_id, bill_code, created_at)
         VALUES ($1, $2, NOW())
         ON CONFLICT (chat_id, bill_code) DO NOTHING",
    )
    .bind(chat_id)
    .bind(bill_code)
    .execute(pool)
    .await?;
    Ok(())
}

/// Push "ready" messages for one bill and clear its notify rows.
/// Returns the number of chats notified.
pub async fn flush_bill_notifications(
    pool: &PgPool,
    telegram: &TelegramClient,
    bill_code: &str,
) -> Result<u32, AppError> {
    let chats: Vec<(i64,)> =
        sqlx::query_as("SELECT chat_id FROM bill_notifications WHERE bill_code = $1")
            .bind(bill_code)
            .fetch_all(pool)
            .await?;

    let mut notified = 0;
    for (chat_id,) in chats {
        let text = format!("Your bill {} is ready for pickup.", bill_code);
        match telegram.send_message(chat_id, &text).await {
            Ok(()) => {
                sqlx::query(
                    "DELETE FROM bill_notifications WHERE chat_id = $1 AND bill_code = $2",
                )
                .bind(chat_id)
                .bind(bill_code)
                .execute(pool)
                .await?;
                notified += 1;
            }
            Err(e) => {
                // Row stays; the daily sweep retries.
                tracing::warn!(chat = chat_id, bill = %bill_code, "push failed: {}", e);
            }
        }
    }
    Ok(notified)
}

/// Daily sweep: flush every bill that is `ready` and still has notify
/// rows (covers pushes that failed at update time).
pub async fn sweep_ready_bills(
    pool: &PgPool,
    telegram: &TelegramClient,
) -> Result<u32, AppError> {
    let codes: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT n.bill_code
         FROM bill_notifications n
         JOIN bills b ON b.code = n.bill_code
         WHERE b.status = $1",
    )
    .bind(READY_STATUS)
    .fetch_all(pool)
    .await?;

    let mut total = 0;
    for (code,) in codes {
        total += flush_bill_notifications(pool, telegram, &code).await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_transitions() {
        assert!(should_notify("cut", "ready"));
        assert!(should_notify("pending", "ready"));
        assert!(should_notify("with_tailor", "ready"));
        assert!(!should_notify("ready", "ready"));
        assert!(!should_notify("pending", "cut"));
        assert!(!should_notify("delivered", "ready"));
    }
}
