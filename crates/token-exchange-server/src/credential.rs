//! IdP credential extraction from request headers.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use std::fmt;

/// A credential presented by the caller.
#[derive(Clone, PartialEq, Eq)]
pub enum IdpCredential {
    /// IdP access token from `Authorization: Bearer`.
    Bearer(String),
    /// Value of the IdP session cookie.
    SessionCookie(String),
}

impl fmt::Debug for IdpCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdpCredential::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            IdpCredential::SessionCookie(_) => f.write_str("SessionCookie([REDACTED])"),
        }
    }
}

impl IdpCredential {
    pub fn kind(&self) -> &'static str {
        match self {
            IdpCredential::Bearer(_) => "bearer",
            IdpCredential::SessionCookie(_) => "cookie",
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(s) = header.to_str() else { continue };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

/// Credentials in the order they should be tried: bearer first, then the
/// session cookie.
pub fn extract_credentials(headers: &HeaderMap, cookie_name: &str) -> Vec<IdpCredential> {
    let mut credentials = Vec::with_capacity(2);
    if let Some(token) = bearer_token(headers) {
        credentials.push(IdpCredential::Bearer(token));
    }
    if let Some(cookie) = session_cookie(headers, cookie_name) {
        credentials.push(IdpCredential::SessionCookie(cookie));
    }
    credentials
}
