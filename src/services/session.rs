//! Server-side session state and the axum extractors built on it.
//!
//! A session is an opaque uuid travelling in the `x-session-id` header;
//! cookie plumbing belongs to whatever sits in front of this service. Each
//! session carries at most one authenticated user id, plus any pending OTP
//! challenges keyed separately by the challenge manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Default)]
struct SessionData {
    user_id: Option<i64>,
}

/// In-process session registry, single-writer per session by construction
/// (one browser owns its session id).
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, SessionData>>>,
}

impl SessionStore {
    pub fn authenticate(&self, session_id: &str, user_id: i64) {
        let mut sessions = self.inner.lock().expect("session store poisoned");
        sessions.entry(session_id.to_string()).or_default().user_id = Some(user_id);
    }

    pub fn user_id(&self, session_id: &str) -> Option<i64> {
        let sessions = self.inner.lock().expect("session store poisoned");
        sessions.get(session_id).and_then(|s| s.user_id)
    }

    pub fn clear(&self, session_id: &str) {
        let mut sessions = self.inner.lock().expect("session store poisoned");
        sessions.remove(session_id);
    }
}

/// The caller's session id; freshly minted when the header is absent so that
/// a first request (e.g. starting a login) gets a session to continue with.
pub struct SessionId(pub String);

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(SessionId(id))
    }
}

/// Extractor for endpoints that require a signed-in user.
pub struct CurrentUser {
    pub session_id: String,
    pub user_id: i64,
}

pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Please log in first" })),
        )
            .into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Unauthorized;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let session_id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(Unauthorized)?;

        let user_id = state.sessions.user_id(session_id).ok_or(Unauthorized)?;

        Ok(CurrentUser {
            session_id: session_id.to_string(),
            user_id,
        })
    }
}

/// Request metadata recorded into login history.
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());

        let user_agent = parts
            .headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientMeta { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_then_clear() {
        let store = SessionStore::default();
        assert_eq!(store.user_id("s1"), None);

        store.authenticate("s1", 42);
        assert_eq!(store.user_id("s1"), Some(42));
        assert_eq!(store.user_id("s2"), None);

        store.clear("s1");
        assert_eq!(store.user_id("s1"), None);
    }

    #[test]
    fn reauthentication_overwrites() {
        let store = SessionStore::default();
        store.authenticate("s1", 1);
        store.authenticate("s1", 2);
        assert_eq!(store.user_id("s1"), Some(2));
    }
}
