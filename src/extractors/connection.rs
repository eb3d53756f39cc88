//! Extract the target connection name from the request (X-Connection header).

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header naming the logical connection a request should run against.
pub const CONNECTION_HEADER: &str = "X-Connection";

/// Optional connection name from the `X-Connection` header. Absent or blank
/// means the application default.
#[derive(Clone, Debug)]
pub struct ConnectionName(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ConnectionName
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CONNECTION_HEADER)
            .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
            .map(|s: &str| s.trim().to_string())
            .filter(|s: &String| !s.is_empty());
        Ok(ConnectionName(value))
    }
}
