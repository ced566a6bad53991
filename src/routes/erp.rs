use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::identity::Identity;
use crate::types::request::{Create, Delete, Read, Search, Update};
use crate::types::response::{Health, Records};

/// Generic `search_read` passthrough. Requires the `read` scope.
#[instrument(skip(state, identity, params), fields(model = %params.model))]
pub(crate) async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(params): Json<Search>,
) -> Result<Json<Records>, Error> {
    let client = state.client_for(&identity)?;

    let mut kwargs = Map::new();
    if let Some(fields) = params.fields {
        kwargs.insert("fields".into(), json!(fields));
    }
    if let Some(limit) = params.limit {
        kwargs.insert("limit".into(), json!(limit));
    }
    if let Some(offset) = params.offset {
        kwargs.insert("offset".into(), json!(offset));
    }

    let records = client
        .call(
            &params.model,
            "search_read",
            json!([params.domain]),
            Value::Object(kwargs),
        )
        .await?;

    let count = records.as_array().map(Vec::len).unwrap_or_default();

    Ok(Json(Records { count, records }))
}

#[instrument(skip(state, identity, params), fields(model = %params.model))]
pub(crate) async fn read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(params): Json<Read>,
) -> Result<Json<Records>, Error> {
    let client = state.client_for(&identity)?;

    let mut kwargs = Map::new();
    if let Some(fields) = params.fields {
        kwargs.insert("fields".into(), json!(fields));
    }

    let records = client
        .call(
            &params.model,
            "read",
            json!([params.ids]),
            Value::Object(kwargs),
        )
        .await?;

    let count = records.as_array().map(Vec::len).unwrap_or_default();
    if count == 0 {
        return Err(Error::NotFound);
    }

    Ok(Json(Records { count, records }))
}

/// Requires the `write` scope.
#[instrument(skip(state, identity, params), fields(model = %params.model))]
pub(crate) async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(params): Json<Create>,
) -> Result<Json<Value>, Error> {
    let client = state.client_for(&identity)?;

    let id = client
        .call(&params.model, "create", json!([params.values]), json!({}))
        .await?;

    Ok(Json(json!({ "id": id })))
}

#[instrument(skip(state, identity, params), fields(model = %params.model))]
pub(crate) async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(params): Json<Update>,
) -> Result<Json<Value>, Error> {
    let client = state.client_for(&identity)?;

    let updated = client
        .call(
            &params.model,
            "write",
            json!([params.ids, params.values]),
            json!({}),
        )
        .await?;

    Ok(Json(json!({ "updated": updated })))
}

/// Requires the `delete` scope.
#[instrument(skip(state, identity, params), fields(model = %params.model))]
pub(crate) async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(params): Json<Delete>,
) -> Result<Json<Value>, Error> {
    let client = state.client_for(&identity)?;

    let deleted = client
        .call(&params.model, "unlink", json!([params.ids]), json!({}))
        .await?;

    Ok(Json(json!({ "deleted": deleted })))
}

#[instrument(skip(state, identity))]
pub(crate) async fn fields(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(model): Path<String>,
) -> Result<Json<Value>, Error> {
    let client = state.client_for(&identity)?;

    let fields = client
        .call(
            &model,
            "fields_get",
            json!([]),
            json!({"attributes": ["string", "help", "type", "required"]}),
        )
        .await?;

    Ok(Json(fields))
}

/// Public liveness probe; reports the upstream connection state without
/// failing the request.
#[instrument(skip(state))]
pub(crate) async fn health(State(state): State<AppState>) -> Json<Health> {
    let probe = state
        .client
        .call("ir.module.module", "search_count", json!([[]]), json!({}))
        .await;

    let health = match probe {
        Ok(_) => Health {
            status: "healthy",
            upstream: "ok",
            timestamp: Utc::now().to_rfc3339(),
            error: None,
        },
        Err(e) => Health {
            status: "unhealthy",
            upstream: "error",
            timestamp: Utc::now().to_rfc3339(),
            error: Some(e.to_string()),
        },
    };

    Json(health)
}

pub(crate) async fn root() -> Json<Value> {
    Json(json!({
        "message": "erpgate",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}
