use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub(crate) struct Token {
    pub(crate) access_token: String,
    pub(crate) token_type: &'static str,
    pub(crate) expires_in: i64,
}

impl Token {
    pub(crate) fn bearer(access_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "bearer",
            expires_in,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct IdentitySummary {
    pub(crate) username: String,
    pub(crate) scopes: Vec<String>,
    pub(crate) active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) employee_name: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct Confirmation {
    pub(crate) message: &'static str,
}

#[derive(Serialize)]
pub(crate) struct Records {
    pub(crate) count: usize,
    pub(crate) records: Value,
}

#[derive(Serialize)]
pub(crate) struct Health {
    pub(crate) status: &'static str,
    pub(crate) upstream: &'static str,
    pub(crate) timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}
