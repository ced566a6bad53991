use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct Login {
    pub(crate) username: String,
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) upstream_endpoint: Option<String>,
    #[serde(default)]
    pub(crate) upstream_database: Option<String>,
    #[serde(default)]
    pub(crate) upstream_account: Option<String>,
    #[serde(default)]
    pub(crate) upstream_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PinLogin {
    pub(crate) badge_number: String,
    pub(crate) pin: String,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct Logout {
    /// Token to revoke; defaults to the one presented in the header.
    #[serde(default)]
    pub(crate) token: Option<String>,
}

fn empty_domain() -> Value {
    Value::Array(Vec::new())
}

#[derive(Debug, Deserialize)]
pub(crate) struct Search {
    pub(crate) model: String,
    #[serde(default = "empty_domain")]
    pub(crate) domain: Value,
    #[serde(default)]
    pub(crate) fields: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
    #[serde(default)]
    pub(crate) offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Read {
    pub(crate) model: String,
    pub(crate) ids: Vec<i64>,
    #[serde(default)]
    pub(crate) fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Create {
    pub(crate) model: String,
    pub(crate) values: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    pub(crate) model: String,
    pub(crate) ids: Vec<i64>,
    pub(crate) values: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Delete {
    pub(crate) model: String,
    pub(crate) ids: Vec<i64>,
}
