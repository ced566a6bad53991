use axum::Extension;
use axum::Json;
use axum::extract::State;
use serde_json::json;
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::core::store::CredentialRepository;
use crate::types::identity::{BadgeIdentity, Identity, UpstreamOverride};
use crate::types::request::{Login, Logout, PinLogin};
use crate::types::response::{Confirmation, IdentitySummary, Token};
use crate::utils::auth::BearerToken;

#[instrument(skip(state, params), fields(username = %params.username))]
pub(crate) async fn login(
    State(state): State<AppState>,
    Json(params): Json<Login>,
) -> Result<Json<Token>, Error> {
    if params.username.is_empty() || params.password.is_empty() {
        return Err(Error::MissingCredentials);
    }

    let mut user = state
        .credentials
        .lookup(&params.username)
        .await
        .ok_or_else(|| {
            tracing::warn!("login attempt for unknown user");
            Error::InvalidCredentials
        })?;

    if !state.credentials.verify(&user, &params.password).await? {
        tracing::warn!("wrong password");
        return Err(Error::InvalidCredentials);
    }

    let upstream = UpstreamOverride {
        endpoint: params.upstream_endpoint,
        database: params.upstream_database,
        account: params.upstream_account,
        secret: params.upstream_secret,
    };

    if !upstream.is_empty() {
        // Probe the override before minting a token that embeds it.
        let probe = state.override_client(&upstream)?;
        if let Err(e) = probe.authenticate().await {
            tracing::warn!("upstream override rejected: {}", e);
            return Err(Error::InvalidCredentials);
        }

        user.upstream = Some(upstream);
    }

    let identity = Identity::Standard(user);
    let token = state.tokens.issue(&identity)?;

    tracing::info!("login succeeded");

    Ok(Json(Token::bearer(token, state.tokens.ttl_seconds())))
}

#[instrument(skip(state, params))]
pub(crate) async fn pin_login(
    State(state): State<AppState>,
    Json(params): Json<PinLogin>,
) -> Result<Json<Token>, Error> {
    if params.badge_number.is_empty() || params.pin.is_empty() {
        return Err(Error::MissingCredentials);
    }

    // The PIN is compared upstream; the registry search doubles as the
    // credential check.
    let domain = json!([
        ["barcode", "=", params.badge_number],
        ["pin", "=", params.pin],
        ["active", "=", true]
    ]);

    let employees = state
        .client
        .call(
            "hr.employee",
            "search_read",
            json!([domain]),
            json!({"fields": ["id", "name", "barcode"], "limit": 1}),
        )
        .await?;

    let employee = employees
        .as_array()
        .and_then(|employees| employees.first())
        .ok_or_else(|| {
            tracing::warn!("no employee matched badge and pin");
            Error::InvalidCredentials
        })?;

    let employee_id = employee["id"].as_i64().ok_or(Error::Internal)?;
    let name = employee["name"].as_str().unwrap_or_default().to_string();

    let identity = Identity::Badge(BadgeIdentity::new(
        employee_id,
        name,
        params.badge_number.clone(),
    ));
    let token = state.tokens.issue(&identity)?;

    tracing::info!(caller = %identity.display_name(), "pin login succeeded");

    Ok(Json(Token::bearer(token, state.tokens.ttl_seconds())))
}

#[instrument(skip_all)]
pub(crate) async fn me(Extension(identity): Extension<Identity>) -> Json<IdentitySummary> {
    let summary = match &identity {
        Identity::Standard(user) => IdentitySummary {
            username: user.username.clone(),
            scopes: user.scopes.clone(),
            active: user.active,
            employee_name: None,
        },
        Identity::Badge(employee) => IdentitySummary {
            username: identity.subject(),
            scopes: employee.scopes.clone(),
            active: true,
            employee_name: Some(employee.name.clone()),
        },
    };

    Json(summary)
}

#[instrument(skip_all)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    Extension(BearerToken(presented)): Extension<BearerToken>,
    Json(params): Json<Logout>,
) -> Result<Json<Confirmation>, Error> {
    let token = params.token.unwrap_or(presented);

    state.tokens.revoke(&token).await;

    tracing::info!("token revoked");

    Ok(Json(Confirmation {
        message: "token revoked",
    }))
}
