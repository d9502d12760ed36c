//! Telegram webhook: drives the order-status dialogue.
//!
//! The webhook always answers 200 with `{"ok": true}`; Telegram retries
//! anything else, and a retry storm is worse than one dropped reply.
//! Tenant resolution happens per message from the `name@codename` reply,
//! through the master catalog like every other path.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::services::bot_state::{
    next_state_for_command, parse_command, parse_scoped_ref, BotCommand, BotState,
};
use crate::services::notifications;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub async fn webhook(
    State(state): State<AppState>,
    Json(update): Json<Update>,
) -> Json<Value> {
    let ok = Json(json!({ "ok": true }));

    let Some(message) = update.message else {
        return ok;
    };
    let chat_id = message.chat.id;
    let Some(text) = message.text else {
        return ok;
    };

    match handle_message(&state, chat_id, &text).await {
        Ok(reply) => {
            if let Err(e) = state.telegram.send_message(chat_id, &reply).await {
                tracing::error!(chat = chat_id, "bot reply failed: {}", e);
            }
        }
        Err(e) => {
            tracing::error!(chat = chat_id, "bot message handling failed: {}", e);
        }
    }
    ok
}

async fn handle_message(
    state: &AppState,
    chat_id: i64,
    text: &str,
) -> Result<String, AppError> {
    let command = parse_command(text);

    if let Some(next) = next_state_for_command(&command) {
        state.bot_states.set(chat_id, next).await?;
        let reply = match command {
            BotCommand::Start => {
                "Salaam! Send /link to connect your account, /checkbillstatus to look up \
                 a bill, or /notify to get a message when your order is ready."
            }
            BotCommand::Link => "Send your username as name@gallery, e.g. basir@gallerya.",
            BotCommand::CheckBillStatus => {
                "Send the bill number as code@gallery, e.g. B42@gallerya."
            }
            BotCommand::Notify => {
                "Send the bill number as code@gallery and I will message you when it is ready."
            }
            BotCommand::Text(_) => unreachable!("text has no command transition"),
        };
        return Ok(reply.to_string());
    }

    let prior = state.bot_states.get(chat_id).await?;
    let (reply, next) = match prior {
        BotState::AwaitingUsername => handle_link(state, chat_id, text).await?,
        BotState::AwaitingBillCheck => handle_bill_check(state, text).await?,
        BotState::AwaitingBillNumber => handle_notify(state, chat_id, text).await?,
        BotState::Idle => (
            "Send /link, /checkbillstatus or /notify to get started.".to_string(),
            BotState::Idle,
        ),
    };
    state.bot_states.set(chat_id, next).await?;
    Ok(reply)
}

async fn handle_link(
    state: &AppState,
    chat_id: i64,
    text: &str,
) -> Result<(String, BotState), AppError> {
    let Some((username, codename)) = parse_scoped_ref(text) else {
        return Ok((
            "That does not look right. Send name@gallery, e.g. basir@gallerya.".to_string(),
            BotState::AwaitingUsername,
        ));
    };

    let gallery = match state.catalog.resolve(&codename).await {
        Ok(g) => g,
        Err(_) => {
            return Ok((
                format!("I do not know a gallery called {}.", codename),
                BotState::AwaitingUsername,
            ))
        }
    };

    let pool = state.pools.pool_for(&gallery.db_name)?;
    let updated = sqlx::query("UPDATE users SET chat_id = $1 WHERE username = $2")
        .bind(chat_id)
        .bind(&username)
        .execute(&*pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Ok((
            format!("No user {} at {}.", username, codename),
            BotState::AwaitingUsername,
        ));
    }
    Ok((
        format!("Linked! You are now connected as {}@{}.", username, codename),
        BotState::Idle,
    ))
}

async fn bill_status(
    state: &AppState,
    codename: &str,
    code: &str,
) -> Result<Option<String>, AppError> {
    let gallery = state.catalog.resolve(codename).await?;
    let pool = state.pools.pool_for(&gallery.db_name)?;
    let status: Option<String> = sqlx::query_scalar("SELECT sp_bill_status($1)")
        .bind(code)
        .fetch_one(&*pool)
        .await?;
    Ok(status)
}

async fn handle_bill_check(
    state: &AppState,
    text: &str,
) -> Result<(String, BotState), AppError> {
    let Some((code, codename)) = parse_scoped_ref(text) else {
        return Ok((
            "Send the bill number as code@gallery, e.g. B42@gallerya.".to_string(),
            BotState::AwaitingBillCheck,
        ));
    };

    match bill_status(state, &codename, &code).await {
        Ok(Some(status)) => Ok((
            format!("Bill {} is currently: {}.", code, status),
            BotState::Idle,
        )),
        Ok(None) => Ok((
            format!("I could not find bill {} at {}.", code, codename),
            BotState::Idle,
        )),
        Err(AppError::BadRequest(_)) | Err(AppError::NotFound(_)) => Ok((
            format!("I do not know a gallery called {}.", codename),
            BotState::AwaitingBillCheck,
        )),
        Err(e) => Err(e),
    }
}

async fn handle_notify(
    state: &AppState,
    chat_id: i64,
    text: &str,
) -> Result<(String, BotState), AppError> {
    let Some((code, codename)) = parse_scoped_ref(text) else {
        return Ok((
            "Send the bill number as code@gallery, e.g. B42@gallerya.".to_string(),
            BotState::AwaitingBillNumber,
        ));
    };

    let gallery = match state.catalog.resolve(&codename).await {
        Ok(g) => g,
        Err(_) => {
            return Ok((
                format!("I do not know a gallery called {}.", codename),
                BotState::AwaitingBillNumber,
            ))
        }
    };

    let pool = state.pools.pool_for(&gallery.db_name)?;
    let status: Option<String> = sqlx::query_scalar("SELECT sp_bill_status($1)")
        .bind(&code)
        .fetch_one(&*pool)
        .await?;

    match status.as_deref() {
        None => Ok((
            format!("I could not find bill {} at {}.", code, codename),
            BotState::Idle,
        )),
        Some(notifications::READY_STATUS) => Ok((
            format!("Good news: bill {} is already ready for pickup.", code),
            BotState::Idle,
        )),
        Some(_) => {
            notifications::record_notify_request(&pool, chat_id, &code).await?;
            Ok((
                format!("Done. I will message you when bill {} is ready.", code),
                BotState::Idle,
            ))
        }
    }
}
