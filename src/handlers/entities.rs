//! Table-driven CRUD for the inventory entity families.
//!
//! Every family is a thin pass-through: the url-encoded form travels to a
//! per-entity stored procedure as jsonb, and list/get/remove map to the
//! matching procedures. The schemas themselves stay opaque to the core.

use std::collections::HashMap;

use axum::extract::{Form, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::Principal;
use crate::error::AppError;
use crate::services::images::{ImageOutcome, ImageStatus};
use crate::AppState;

pub struct EntityDescriptor {
    /// Route segment, e.g. `purchase-item` in `/add-or-edit-purchase-item`.
    pub name: &'static str,
    /// Stored-procedure suffix, e.g. `purchase_item`.
    pub proc: &'static str,
    pub read_level: u8,
    pub write_level: u8,
    /// Blob-store kind for entities that carry an image.
    pub image_kind: Option<&'static str>,
}

pub const DESCRIPTORS: &[EntityDescriptor] = &[
    EntityDescriptor {
        name: "product",
        proc: "product",
        read_level: 1,
        write_level: 2,
        image_kind: Some("product"),
    },
    EntityDescriptor {
        name: "roll",
        proc: "roll",
        read_level: 1,
        write_level: 2,
        image_kind: None,
    },
    EntityDescriptor {
        name: "expense",
        proc: "expense",
        read_level: 1,
        write_level: 2,
        image_kind: None,
    },
    EntityDescriptor {
        name: "supplier",
        proc: "supplier",
        read_level: 1,
        write_level: 2,
        image_kind: None,
    },
    EntityDescriptor {
        name: "entity",
        proc: "entity",
        read_level: 1,
        write_level: 2,
        image_kind: Some("entity"),
    },
    EntityDescriptor {
        name: "purchase",
        proc: "purchase",
        read_level: 1,
        write_level: 2,
        image_kind: None,
    },
    EntityDescriptor {
        name: "purchase-item",
        proc: "purchase_item",
        read_level: 1,
        write_level: 2,
        image_kind: None,
    },
    EntityDescriptor {
        name: "users",
        proc: "user",
        read_level: 3,
        write_level: 3,
        image_kind: Some("user"),
    },
];

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

fn form_to_json(form: &HashMap<String, String>) -> Value {
    let mut map = Map::new();
    for (k, v) in form {
        map.insert(k.clone(), Value::String(v.clone()));
    }
    Value::Object(map)
}

pub async fn list(
    desc: &'static EntityDescriptor,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let rows: Option<Value> = sqlx::query_scalar(&format!("SELECT sp_list_{}()", desc.proc))
        .fetch_one(&*pool)
        .await?;
    Ok(Json(rows.unwrap_or_else(|| Value::Array(Vec::new()))))
}

pub async fn get_one(
    desc: &'static EntityDescriptor,
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let row: Option<Value> = sqlx::query_scalar(&format!("SELECT sp_get_{}($1)", desc.proc))
        .bind(&query.id)
        .fetch_one(&*pool)
        .await?;
    match row {
        Some(Value::Null) | None => Err(AppError::NotFound(format!(
            "{} {} not found",
            desc.name, query.id
        ))),
        Some(value) => Ok(Json(value)),
    }
}

pub async fn add_or_edit(
    desc: &'static EntityDescriptor,
    State(state): State<AppState>,
    principal: Principal,
    Form(mut form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let image_status = form.remove("image_status");
    let image_data = form.remove("image_data");

    let pool = state.pools.current_pool()?;
    let code: String =
        sqlx::query_scalar(&format!("SELECT sp_save_{}($1::jsonb)", desc.proc))
            .bind(form_to_json(&form))
            .fetch_one(&*pool)
            .await?;

    if let Some(kind) = desc.image_kind {
        let status = match image_status.as_deref() {
            Some(raw) => ImageStatus::parse(raw)?,
            None => ImageStatus::Unchanged,
        };
        let outcome = state
            .images
            .apply(&principal.tenant, kind, &code, status, image_data)
            .await?;
        persist_image_url(&pool, kind, &code, outcome).await?;
    }

    Ok(Json(json!({ "result": true, "code": code })))
}

async fn persist_image_url(
    pool: &sqlx::PgPool,
    kind: &str,
    code: &str,
    outcome: ImageOutcome,
) -> Result<(), AppError> {
    let url = match outcome {
        ImageOutcome::Unchanged => return Ok(()),
        ImageOutcome::Stored(url) => Some(url),
        ImageOutcome::Removed => None,
    };
    sqlx::query(&format!("SELECT sp_set_{}_image($1, $2)", kind))
        .bind(code)
        .bind(url)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub id: String,
}

pub async fn remove(
    desc: &'static EntityDescriptor,
    State(state): State<AppState>,
    Form(payload): Form<RemoveRequest>,
) -> Result<Json<Value>, AppError> {
    let pool = state.pools.current_pool()?;
    let removed: Option<bool> =
        sqlx::query_scalar(&format!("SELECT sp_remove_{}($1)", desc.proc))
            .bind(&payload.id)
            .fetch_one(&*pool)
            .await?;

    if removed != Some(true) {
        return Err(AppError::NotFound(format!(
            "{} {} not found",
            desc.name, payload.id
        )));
    }
    Ok(Json(json!({ "result": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_levels_are_sane() {
        for desc in DESCRIPTORS {
            assert!(desc.read_level <= desc.write_level, "{}", desc.name);
            assert!((1..=5).contains(&desc.read_level));
            assert!((1..=5).contains(&desc.write_level));
            assert!(!desc.proc.contains('-'));
        }
    }

    #[test]
    fn user_routes_are_admin_only() {
        let users = DESCRIPTORS.iter().find(|d| d.name == "users").unwrap();
        assert_eq!(users.read_level, 3);
        assert_eq!(users.write_level, 3);
    }

    #[test]
    fn form_serializes_to_flat_object() {
        let mut form = HashMap::new();
        form.insert("name".to_string(), "Velvet".to_string());
        form.insert("price".to_string(), "1200".to_string());
        let value = form_to_json(&form);
        assert_eq!(value["name"], "Velvet");
        assert_eq!(value["price"], "1200");
    }
}
