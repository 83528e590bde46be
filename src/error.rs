use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Config IO error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing parameters")]
    BadRequest,

    #[error("Invalid credentials")]
    Forbidden,

    #[error("Upstream error: {0}")]
    UpstreamConnect(String),

    #[error("Upstream error: no response headers within {0:?}")]
    UpstreamTimeout(std::time::Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden => StatusCode::FORBIDDEN,
            ProxyError::UpstreamConnect(_) | ProxyError::UpstreamTimeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
