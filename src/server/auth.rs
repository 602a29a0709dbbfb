//! HTTP Basic authentication against the single static credential pair.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::config::Credentials;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Malformed Basic credentials")]
    Malformed,

    #[error("User '{0}' cannot be authenticated")]
    Rejected(String),
}

/// Extract the `(username, password)` pair from a Basic Authorization header.
pub fn parse_basic(headers: &HeaderMap) -> Result<(String, String), AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::Malformed)?;

    let (scheme, encoded) = value.trim().split_once(' ').ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::Malformed);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
    let (username, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;

    Ok((username.to_string(), password.to_string()))
}

impl Credentials {
    /// Check the request's Basic credentials. Both fields must match exactly.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let (username, password) = parse_basic(headers)?;
        let username_ok = username == self.username;
        let password_ok = password == self.password;
        if username_ok && password_ok {
            Ok(())
        } else {
            Err(AuthError::Rejected(username))
        }
    }
}

/// Build a Basic Authorization header value.
pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}
