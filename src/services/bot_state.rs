//! Per-chat conversational state for the order-status bot.
//!
//! State lives in Redis with a one-hour TTL, so an abandoned dialogue
//! falls back to idle on its own. Transitions themselves are pure and
//! fully enumerable; the webhook handler supplies the side effects.

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const STATE_TTL_SECS: u64 = 3600;

fn state_key(chat_id: i64) -> String {
    format!("bot:state:{}", chat_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotState {
    Idle,
    AwaitingUsername,
    AwaitingBillCheck,
    AwaitingBillNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Link,
    CheckBillStatus,
    Notify,
    Text(String),
}

pub fn parse_command(text: &str) -> BotCommand {
    match text.trim() {
        "/start" => BotCommand::Start,
        "/link" => BotCommand::Link,
        "/checkbillstatus" => BotCommand::CheckBillStatus,
        "/notify" => BotCommand::Notify,
        other => BotCommand::Text(other.to_string()),
    }
}

/// The state a command moves the dialogue into, regardless of the state
/// it was in. `/start` always resets; the three stateful commands each
/// open their awaiting state; free text resolves in the handler.
pub fn next_state_for_command(command: &BotCommand) -> Option<BotState> {
    match command {
        BotCommand::Start => Some(BotState::Idle),
        BotCommand::Link => Some(BotState::AwaitingUsername),
        BotCommand::CheckBillStatus => Some(BotState::AwaitingBillCheck),
        BotCommand::Notify => Some(BotState::AwaitingBillNumber),
        BotCommand::Text(_) => None,
    }
}

/// Parse `local@codename` replies ("basir@gallerya", "B42@gallerya").
pub fn parse_scoped_ref(text: &str) -> Option<(String, String)> {
    let (local, codename) = text.trim().split_once('@')?;
    if local.is_empty() || codename.is_empty() {
        return None;
    }
    if local.contains('@') || codename.contains('@') {
        return None;
    }
    Some((local.to_string(), codename.trim().to_lowercase()))
}

#[derive(Clone)]
pub struct BotStateStore {
    redis_client: Client,
}

impl BotStateStore {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            redis_client: Client::open(redis_url)?,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.redis_client.get_multiplexed_async_connection().await
    }

    pub async fn get(&self, chat_id: i64) -> Result<BotState, AppError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(state_key(chat_id)).await?;
        Ok(raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(BotState::Idle))
    }

    pub async fn set(&self, chat_id: i64, state: BotState) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        if state == BotState::Idle {
            // Idle is the absence of state; no reason to keep a key alive.
            let _: () = conn.del(state_key(chat_id)).await?;
            return Ok(());
        }
        let encoded = serde_json::to_string(&state)
            .map_err(|e| AppError::Internal(format!("bot state encode: {}", e)))?;
        let _: () = conn
            .set_ex(state_key(chat_id), encoded, STATE_TTL_SECS)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        assert_eq!(parse_command("/start"), BotCommand::Start);
        assert_eq!(parse_command("/link"), BotCommand::Link);
        assert_eq!(parse_command("/checkbillstatus"), BotCommand::CheckBillStatus);
        assert_eq!(parse_command("/notify"), BotCommand::Notify);
        assert_eq!(
            parse_command(" B42@gallerya "),
            BotCommand::Text("B42@gallerya".to_string())
        );
    }

    #[test]
    fn command_transitions_match_state_machine() {
        assert_eq!(
            next_state_for_command(&BotCommand::Link),
            Some(BotState::AwaitingUsername)
        );
        assert_eq!(
            next_state_for_command(&BotCommand::CheckBillStatus),
            Some(BotState::AwaitingBillCheck)
        );
        assert_eq!(
            next_state_for_command(&BotCommand::Notify),
            Some(BotState::AwaitingBillNumber)
        );
        assert_eq!(
            next_state_for_command(&BotCommand::Start),
            Some(BotState::Idle)
        );
        assert_eq!(
            next_state_for_command(&BotCommand::Text("hi".to_string())),
            None
        );
    }

    #[test]
    fn scoped_refs_parse() {
        assert_eq!(
            parse_scoped_ref("basir@gallerya"),
            Some(("basir".to_string(), "gallerya".to_string()))
        );
        assert_eq!(
            parse_scoped_ref("B42@GalleryA"),
            Some(("B42".to_string(), "gallerya".to_string()))
        );
        assert_eq!(parse_scoped_ref("no-separator"), None);
        assert_eq!(parse_scoped_ref("@gallerya"), None);
        assert_eq!(parse_scoped_ref("basir@"), None);
        assert_eq!(parse_scoped_ref("a@b@c"), None);
    }

    #[test]
    fn state_serialization_is_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&BotState::AwaitingBillNumber).unwrap(),
            "\"AWAITING_BILL_NUMBER\""
        );
    }
}
