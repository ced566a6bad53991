use crate::core::client::Client;
use crate::core::config::{self, Args, UpstreamSecrets};
use crate::core::error::{ConfigError, Error};
use crate::core::store::StaticCredentialStore;
use crate::types::identity::{Identity, UpstreamOverride};
use crate::utils::auth::TokenController;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    pub(crate) credentials: StaticCredentialStore,
    pub(crate) tokens: TokenController,
    /// Shared default client; constructed once and eagerly authenticated at
    /// startup. Cloning shares the session handle.
    pub(crate) client: Client,
    pub(crate) upstream_secrets: UpstreamSecrets,
    upstream_url: String,
    upstream_database: String,
    upstream_account: String,
}

impl AppState {
    pub(crate) fn new(args: &Args) -> Result<Self, ConfigError> {
        let users = config::create_user_map(&args.users)?;

        let client = Client::new(
            &args.upstream_url,
            &args.upstream_database,
            &args.upstream_account,
            &args.upstream_secret,
        )?;

        let upstream_secrets = UpstreamSecrets::new(
            args.upstream_secret.clone(),
            args.account_secrets
                .as_deref()
                .map(config::create_secret_map)
                .unwrap_or_default(),
        );

        Ok(AppState {
            credentials: StaticCredentialStore::new(users),
            tokens: TokenController::new(
                &args.secret,
                args.token_ttl_minutes
                    .unwrap_or(config::DEFAULT_TOKEN_TTL_MINUTES),
            ),
            client,
            upstream_secrets,
            upstream_url: args.upstream_url.clone(),
            upstream_database: args.upstream_database.clone(),
            upstream_account: args.upstream_account.clone(),
        })
    }

    /// Client selection per request: callers carrying an upstream override
    /// get a fresh client scoped to it (own session, re-authenticates on
    /// demand); everyone else shares the default client.
    pub(crate) fn client_for(&self, identity: &Identity) -> Result<Client, Error> {
        match identity.upstream_override() {
            Some(upstream) => self.override_client(upstream),
            None => Ok(self.client.clone()),
        }
    }

    /// Builds a client for an override, filling unset fields from the
    /// default upstream configuration.
    pub(crate) fn override_client(&self, upstream: &UpstreamOverride) -> Result<Client, Error> {
        let secret = match &upstream.secret {
            Some(secret) => secret.clone(),
            None => self
                .upstream_secrets
                .secret_for(upstream.account.as_deref()),
        };

        Client::new(
            upstream.endpoint.as_deref().unwrap_or(&self.upstream_url),
            upstream
                .database
                .as_deref()
                .unwrap_or(&self.upstream_database),
            upstream
                .account
                .as_deref()
                .unwrap_or(&self.upstream_account),
            &secret,
        )
        .map_err(|e| {
            tracing::error!("failed to build override client: {}", e);
            Error::Internal
        })
    }
}
