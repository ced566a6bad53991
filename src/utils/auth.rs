use std::future::Future;
use std::pin::Pin;

use axum::extract::State;
use axum::{body::Body, extract::Request, http, http::Response, middleware::Next};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::core::config::UpstreamSecrets;
use crate::core::error::Error;
use crate::core::state::AppState;
use crate::core::store::{CredentialRepository, InMemoryRevocationStore, RevocationStore};
use crate::types::identity::{
    BADGE_SCOPES, BADGE_SUBJECT_PREFIX, BadgeIdentity, Identity, UpstreamOverride,
};

const ISSUER: &str = "erpgate";
const POS_SCOPE: &str = "pos";

#[derive(Deserialize, Serialize, Debug)]
pub(crate) struct Claims {
    pub(crate) exp: usize,
    pub(crate) iat: usize,
    pub(crate) sub: String,
    pub(crate) iss: String,
    pub(crate) scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) employee_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) employee_badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) upstream: Option<UpstreamClaim>,
}

/// Override fields carried inside a token. Deliberately has no secret
/// field; the secret is re-joined from server configuration at validation.
#[derive(Deserialize, Serialize, Debug)]
pub(crate) struct UpstreamClaim {
    pub(crate) endpoint: Option<String>,
    pub(crate) database: Option<String>,
    pub(crate) account: Option<String>,
}

/// Raw bearer token as presented, kept around so logout can revoke it.
#[derive(Clone, Debug)]
pub(crate) struct BearerToken(pub(crate) String);

#[derive(Clone)]
pub(crate) struct TokenController {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    revocations: InMemoryRevocationStore,
}

impl std::fmt::Debug for TokenController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenController")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenController {
    pub(crate) fn new(secret: &str, ttl_minutes: i64) -> Self {
        let mut validation = Validation::default();
        // Expiry is exact; the default 60s leeway would keep dead tokens
        // usable past their exp claim.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::minutes(ttl_minutes),
            revocations: InMemoryRevocationStore::default(),
        }
    }

    pub(crate) fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub(crate) fn issue(&self, identity: &Identity) -> Result<String, Error> {
        let current_time = Utc::now();
        let expiration_time = current_time + self.ttl;

        let mut claims = Claims {
            exp: expiration_time.timestamp() as usize,
            iat: current_time.timestamp() as usize,
            sub: identity.subject(),
            iss: ISSUER.into(),
            scopes: identity.scopes().to_vec(),
            employee_id: None,
            employee_name: None,
            employee_badge: None,
            upstream: None,
        };

        match identity {
            Identity::Badge(employee) => {
                claims.employee_id = Some(employee.employee_id);
                claims.employee_name = Some(employee.name.clone());
                claims.employee_badge = Some(employee.badge_number.clone());
            }
            Identity::Standard(user) => {
                if let Some(upstream) = &user.upstream {
                    claims.upstream = Some(UpstreamClaim {
                        endpoint: upstream.endpoint.clone(),
                        database: upstream.database.clone(),
                        account: upstream.account.clone(),
                    });
                }
            }
        }

        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Resolves a token to a caller identity. The revocation gate runs
    /// before any decoding; badge subjects are rebuilt wholly from claims,
    /// standard subjects are re-looked-up so disabling a user takes effect
    /// on their live tokens.
    pub(crate) async fn validate<R: CredentialRepository>(
        &self,
        token: &str,
        repo: &R,
        secrets: &UpstreamSecrets,
    ) -> Result<Identity, Error> {
        if self.revocations.contains(token).await {
            return Err(Error::RevokedToken);
        }

        let claims =
            match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation) {
                Ok(token_data) => token_data.claims,
                Err(e) => match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        return Err(Error::ExpiredToken);
                    }
                    _ => return Err(Error::MalformedToken),
                },
            };

        if claims.sub.starts_with(BADGE_SUBJECT_PREFIX) {
            let (Some(employee_id), Some(name)) = (claims.employee_id, claims.employee_name)
            else {
                return Err(Error::MalformedToken);
            };

            let scopes = if claims.scopes.is_empty() {
                BADGE_SCOPES.iter().map(|s| s.to_string()).collect()
            } else {
                claims.scopes
            };

            return Ok(Identity::Badge(BadgeIdentity {
                employee_id,
                name,
                badge_number: claims.employee_badge.unwrap_or_default(),
                scopes,
            }));
        }

        let mut user = repo
            .lookup(&claims.sub)
            .await
            .ok_or(Error::UnknownSubject)?;

        if !user.active {
            return Err(Error::Disabled);
        }

        if let Some(claim) = claims.upstream {
            let mut upstream = UpstreamOverride {
                endpoint: claim.endpoint,
                database: claim.database,
                account: claim.account,
                secret: None,
            };
            secrets.rejoin(&mut upstream);
            user.upstream = Some(upstream);
        }

        Ok(Identity::Standard(user))
    }

    pub(crate) async fn revoke(&self, token: &str) {
        self.revocations.add(token).await;
    }
}

pub(crate) async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response<Body>, Error> {
    let auth_header = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .ok_or(Error::NoCredentials)?;

    let mut header = auth_header.to_str()?.split_whitespace();
    let (_bearer, token) = (
        header.next(),
        header.next().ok_or(Error::NoCredentials)?.to_string(),
    );

    let identity = state
        .tokens
        .validate(&token, &state.credentials, &state.upstream_secrets)
        .await?;

    request.extensions_mut().insert(BearerToken(token));
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

pub(crate) fn check_scope(identity: &Identity, scope: &str) -> bool {
    // Badge holders always satisfy the point-of-sale scope, even if a
    // token's literal scope list says otherwise.
    if matches!(identity, Identity::Badge(_)) && scope == POS_SCOPE {
        return true;
    }

    identity.scopes().iter().any(|held| held == scope)
}

pub(crate) fn require_scope(
    scope: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Result<Response<Body>, Error>> + Send>>
+ Clone {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let identity = request
                .extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(Error::NoCredentials)?;

            if !check_scope(&identity, scope) {
                tracing::warn!(caller = %identity.display_name(), scope, "access denied");
                return Err(Error::Forbidden {
                    scope: scope.to_string(),
                });
            }

            tracing::debug!(caller = %identity.display_name(), scope, "access granted");

            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::create_secret_map;
    use crate::core::store::StaticCredentialStore;
    use crate::types::identity::StandardIdentity;
    use std::collections::HashMap;

    fn user(username: &str, scopes: &[&str], active: bool) -> StandardIdentity {
        StandardIdentity {
            username: username.to_string(),
            password_hash: "$2b$04$unused".to_string(),
            active,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            upstream: None,
        }
    }

    fn store() -> StaticCredentialStore {
        let mut users = HashMap::new();
        users.insert("admin".into(), user("admin", &["read", "write", "delete"], true));
        users.insert("readonly".into(), user("readonly", &["read"], true));
        users.insert("retired".into(), user("retired", &["read"], false));

        StaticCredentialStore::new(users)
    }

    fn secrets() -> UpstreamSecrets {
        UpstreamSecrets::new("default-key".into(), create_secret_map("svc:svc-key"))
    }

    fn controller(ttl_minutes: i64) -> TokenController {
        TokenController::new("test-signing-secret", ttl_minutes)
    }

    #[tokio::test]
    async fn issue_then_validate_round_trips_username_and_scopes() {
        let tokens = controller(30);
        let identity = Identity::Standard(user("admin", &["read", "write", "delete"], true));

        let token = tokens.issue(&identity).unwrap();
        let resolved = tokens.validate(&token, &store(), &secrets()).await.unwrap();

        match resolved {
            Identity::Standard(resolved) => {
                assert_eq!(resolved.username, "admin");
                assert_eq!(resolved.scopes, vec!["read", "write", "delete"]);
            }
            other => panic!("expected standard identity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let tokens = controller(-1);
        let identity = Identity::Standard(user("admin", &["read"], true));

        let token = tokens.issue(&identity).unwrap();
        let result = tokens.validate(&token, &store(), &secrets()).await;

        assert!(matches!(result, Err(Error::ExpiredToken)));
    }

    #[tokio::test]
    async fn revoked_tokens_fail_even_before_expiry() {
        let tokens = controller(30);
        let identity = Identity::Standard(user("admin", &["read"], true));

        let token = tokens.issue(&identity).unwrap();
        assert!(tokens.validate(&token, &store(), &secrets()).await.is_ok());

        tokens.revoke(&token).await;
        tokens.revoke(&token).await;

        let result = tokens.validate(&token, &store(), &secrets()).await;
        assert!(matches!(result, Err(Error::RevokedToken)));
    }

    #[tokio::test]
    async fn tampered_tokens_are_malformed() {
        let tokens = controller(30);
        let identity = Identity::Standard(user("admin", &["read"], true));

        let mut token = tokens.issue(&identity).unwrap();
        let flipped = if token.ends_with('A') { 'B' } else { 'A' };
        token.pop();
        token.push(flipped);

        let result = tokens.validate(&token, &store(), &secrets()).await;
        assert!(matches!(result, Err(Error::MalformedToken)));
    }

    #[tokio::test]
    async fn tokens_for_deleted_users_fail_with_unknown_subject() {
        let tokens = controller(30);
        let identity = Identity::Standard(user("ghost", &["read"], true));

        let token = tokens.issue(&identity).unwrap();
        let result = tokens.validate(&token, &store(), &secrets()).await;

        assert!(matches!(result, Err(Error::UnknownSubject)));
    }

    #[tokio::test]
    async fn tokens_for_disabled_users_are_rejected() {
        let tokens = controller(30);
        let identity = Identity::Standard(user("retired", &["read"], false));

        let token = tokens.issue(&identity).unwrap();
        let result = tokens.validate(&token, &store(), &secrets()).await;

        assert!(matches!(result, Err(Error::Disabled)));
    }

    #[tokio::test]
    async fn badge_identities_rebuild_from_claims_alone() {
        let tokens = controller(30);
        let identity = Identity::Badge(BadgeIdentity::new(42, "Ada".into(), "B-0042".into()));

        let token = tokens.issue(&identity).unwrap();
        // Empty store: the registry is never consulted for badge subjects.
        let empty = StaticCredentialStore::new(HashMap::new());
        let resolved = tokens.validate(&token, &empty, &secrets()).await.unwrap();

        match resolved {
            Identity::Badge(employee) => {
                assert_eq!(employee.employee_id, 42);
                assert_eq!(employee.name, "Ada");
                assert_eq!(employee.badge_number, "B-0042");
                assert_eq!(employee.scopes, vec!["read", "pos"]);
            }
            other => panic!("expected badge identity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn override_secret_is_rejoined_but_never_encoded() {
        let tokens = controller(30);
        let mut admin = user("admin", &["read", "write", "delete"], true);
        admin.upstream = Some(UpstreamOverride {
            endpoint: Some("https://erp.example.com".into()),
            database: Some("prod".into()),
            account: Some("svc".into()),
            secret: Some("typed-at-login".into()),
        });

        let token = tokens.issue(&Identity::Standard(admin)).unwrap();

        // The encoded claims must not carry any secret.
        let payload = jsonwebtoken::decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret("test-signing-secret".as_bytes()),
            &Validation::default(),
        )
        .unwrap()
        .claims;
        assert!(payload["upstream"].get("secret").is_none());
        assert_eq!(payload["upstream"]["account"], "svc");

        let resolved = tokens.validate(&token, &store(), &secrets()).await.unwrap();
        let upstream = resolved.upstream_override().unwrap();
        assert_eq!(upstream.secret.as_deref(), Some("svc-key"));
        assert_eq!(upstream.database.as_deref(), Some("prod"));
    }

    #[test]
    fn scope_checks_match_held_scopes() {
        let readonly = Identity::Standard(user("readonly", &["read"], true));
        let admin = Identity::Standard(user("admin", &["read", "write"], true));

        assert!(!check_scope(&readonly, "write"));
        assert!(check_scope(&admin, "write"));
        assert!(check_scope(&readonly, "read"));
    }

    #[test]
    fn badge_identities_always_hold_pos() {
        // Literal scopes tampered to omit pos; the carve-out still admits.
        let employee = Identity::Badge(BadgeIdentity {
            employee_id: 1,
            name: "Ada".into(),
            badge_number: "B-0001".into(),
            scopes: vec!["read".into()],
        });

        assert!(check_scope(&employee, "pos"));
        assert!(!check_scope(&employee, "write"));
    }
}
