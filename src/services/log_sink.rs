//! Internal-error sink: a row in the current tenant's `log` table plus an
//! email to the operator. Strictly best-effort: a broken sink must never
//! take a request down with it.

use std::sync::Arc;
use std::time::Duration;

use crate::db::PoolRegistry;
use crate::services::mailer::Mailer;

const SINK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn report_internal_error(
    pools: &Arc<PoolRegistry>,
    mailer: &Mailer,
    context: &str,
    detail: &str,
) {
    if let Ok(pool) = pools.current_pool() {
        let insert = sqlx::query(
            "INSERT INTO log (level, context, message, created_at)
             VALUES ('error', $1, $2, NOW())",
        )
        .bind(context)
        .bind(detail)
        .execute(&*pool)
        .await;
        if let Err(e) = insert {
            tracing::error!("log sink insert failed: {}", e);
        }
    }

    let subject = format!("[pardaaf] internal error: {}", context);
    let send = mailer.send_admin_alert(&subject, detail.to_string());
    match tokio::time::timeout(SINK_TIMEOUT, send).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("log sink email failed: {}", e),
        Err(_) => tracing::error!("log sink email timed out"),
    }
}
