use axum::http::StatusCode;
use axum::http::header::ToStrError;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    HTTPClient(#[from] reqwest::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("Invalid user entry: {0}")]
    InvalidUserEntry(String),
    #[error("Upstream authentication failed at startup: {0}")]
    Upstream(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Reqwest error: {0}")]
    HTTPClient(#[from] reqwest::Error),
    #[error("Header decode error: {0}")]
    HeaderDecode(#[from] ToStrError),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("No credentials provided")]
    NoCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Expired token")]
    ExpiredToken,
    #[error("Malformed token")]
    MalformedToken,
    #[error("Revoked token")]
    RevokedToken,
    #[error("Unknown token subject")]
    UnknownSubject,
    #[error("User is disabled")]
    Disabled,
    #[error("Missing required scope: {scope}")]
    Forbidden { scope: String },
    #[error("Record not found")]
    NotFound,
    #[error("Upstream fault: {0}")]
    Upstream(String),
    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),
    #[error("Upstream call {method} on {model} failed: {message}")]
    UpstreamCall {
        model: String,
        method: String,
        message: String,
    },
    #[error("Internal server error")]
    Internal,
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::MissingCredentials => StatusCode::BAD_REQUEST,
            Error::NoCredentials
            | Error::InvalidCredentials
            | Error::ExpiredToken
            | Error::MalformedToken
            | Error::RevokedToken
            | Error::UnknownSubject => StatusCode::UNAUTHORIZED,
            Error::Disabled | Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Upstream(_) | Error::UpstreamAuth(_) | Error::UpstreamCall { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Error::HTTPClient(_)
            | Error::HeaderDecode(_)
            | Error::Serialize(_)
            | Error::Jwt(_)
            | Error::Bcrypt(_)
            | Error::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("{:?}", self);
        } else {
            tracing::warn!("{:?}", self);
        }

        let message = match status {
            // Internal details stay out of responses.
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}
