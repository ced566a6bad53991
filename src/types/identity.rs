use serde::{Deserialize, Serialize};

/// Alternate upstream account supplied at login. The secret is only ever
/// populated server-side; token claims carry the other three fields.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub(crate) struct UpstreamOverride {
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
    #[serde(default)]
    pub(crate) database: Option<String>,
    #[serde(default)]
    pub(crate) account: Option<String>,
    #[serde(default, skip_serializing)]
    pub(crate) secret: Option<String>,
}

impl UpstreamOverride {
    pub(crate) fn is_empty(&self) -> bool {
        self.endpoint.is_none()
            && self.database.is_none()
            && self.account.is_none()
            && self.secret.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StandardIdentity {
    pub(crate) username: String,
    pub(crate) password_hash: String,
    pub(crate) active: bool,
    pub(crate) scopes: Vec<String>,
    pub(crate) upstream: Option<UpstreamOverride>,
}

/// Employee resolved from the upstream registry at pin-login. Lives only
/// inside a token's lifetime, so it carries no active flag.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BadgeIdentity {
    pub(crate) employee_id: i64,
    pub(crate) name: String,
    pub(crate) badge_number: String,
    pub(crate) scopes: Vec<String>,
}

pub(crate) const BADGE_SCOPES: [&str; 2] = ["read", "pos"];
pub(crate) const BADGE_SUBJECT_PREFIX: &str = "employee_";

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Identity {
    Standard(StandardIdentity),
    Badge(BadgeIdentity),
}

impl Identity {
    pub(crate) fn subject(&self) -> String {
        match self {
            Identity::Standard(user) => user.username.clone(),
            Identity::Badge(employee) => {
                format!("{}{}", BADGE_SUBJECT_PREFIX, employee.employee_id)
            }
        }
    }

    pub(crate) fn scopes(&self) -> &[String] {
        match self {
            Identity::Standard(user) => &user.scopes,
            Identity::Badge(employee) => &employee.scopes,
        }
    }

    /// Name used in audit records: the badge holder's display name where
    /// applicable, the username otherwise.
    pub(crate) fn display_name(&self) -> &str {
        match self {
            Identity::Standard(user) => &user.username,
            Identity::Badge(employee) => &employee.name,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        match self {
            Identity::Standard(user) => user.active,
            Identity::Badge(_) => true,
        }
    }

    pub(crate) fn upstream_override(&self) -> Option<&UpstreamOverride> {
        match self {
            Identity::Standard(user) => user.upstream.as_ref(),
            Identity::Badge(_) => None,
        }
    }
}

impl BadgeIdentity {
    pub(crate) fn new(employee_id: i64, name: String, badge_number: String) -> Self {
        Self {
            employee_id,
            name,
            badge_number,
            scopes: BADGE_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
