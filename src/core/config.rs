use std::collections::HashMap;

use serde::Deserialize;

use crate::core::error::ConfigError;
use crate::types::identity::{StandardIdentity, UpstreamOverride};

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct Args {
    pub(crate) log_level: String,
    pub(crate) port: u16,
    pub(crate) secret: String,
    pub(crate) token_ttl_minutes: Option<i64>,
    /// Comma-separated `username:bcrypt-hash:scope|scope[:disabled]` entries.
    pub(crate) users: String,
    pub(crate) upstream_url: String,
    pub(crate) upstream_database: String,
    pub(crate) upstream_account: String,
    pub(crate) upstream_secret: String,
    /// Optional comma-separated `account:secret` entries for callers that
    /// log in with their own upstream account.
    pub(crate) account_secrets: Option<String>,
}

pub(crate) const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

pub(crate) fn create_user_map(
    users: &str,
) -> Result<HashMap<String, StandardIdentity>, ConfigError> {
    users
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let mut parts = entry.trim().split(':');

            let username = parts.next().unwrap_or_default().to_string();
            let password_hash = parts.next().unwrap_or_default().to_string();
            let scopes: Vec<String> = parts
                .next()
                .unwrap_or_default()
                .split('|')
                .filter(|scope| !scope.is_empty())
                .map(|scope| scope.to_string())
                .collect();
            let active = parts.next() != Some("disabled");

            if username.is_empty() || password_hash.is_empty() || scopes.is_empty() {
                return Err(ConfigError::InvalidUserEntry(entry.trim().to_string()));
            }

            Ok((
                username.clone(),
                StandardIdentity {
                    username,
                    password_hash,
                    active,
                    scopes,
                    upstream: None,
                },
            ))
        })
        .collect()
}

pub(crate) fn create_secret_map(secrets: &str) -> HashMap<String, String> {
    secrets
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            entry
                .trim()
                .split_once(':')
                .map(|(account, secret)| (account.to_string(), secret.to_string()))
        })
        .collect()
}

/// Server-side upstream secrets. Tokens never carry a secret; it is
/// re-joined here at validation time, keyed by the override's account name.
#[derive(Clone)]
pub(crate) struct UpstreamSecrets {
    default: String,
    by_account: HashMap<String, String>,
}

impl std::fmt::Debug for UpstreamSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSecrets")
            .field("accounts", &self.by_account.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl UpstreamSecrets {
    pub(crate) fn new(default: String, by_account: HashMap<String, String>) -> Self {
        Self {
            default,
            by_account,
        }
    }

    pub(crate) fn secret_for(&self, account: Option<&str>) -> String {
        account
            .and_then(|account| self.by_account.get(account))
            .unwrap_or(&self.default)
            .clone()
    }

    pub(crate) fn rejoin(&self, upstream: &mut UpstreamOverride) {
        upstream.secret = Some(self.secret_for(upstream.account.as_deref()));
    }
}
