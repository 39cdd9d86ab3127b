//! In-memory login sessions and signed session cookies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::RwLock;

pub const SESSION_COOKIE: &str = "sessionid";

const VACUUM_INTERVAL: Duration = Duration::from_secs(300);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Sessions keyed by id, expiring after `ttl` without activity.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::TimeDelta,
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: i64::try_from(ttl_secs)
                .ok()
                .and_then(chrono::TimeDelta::try_seconds)
                .unwrap_or(chrono::TimeDelta::MAX),
        }
    }

    /// Start a session for `user_id`, returning its id.
    pub async fn create(&self, user_id: i64) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id.clone(),
            Session {
                user_id,
                created_at: now,
                last_seen: now,
            },
        );
        crate::metrics::active_sessions(sessions.len());
        id
    }

    /// Resolve a live session and refresh its activity time. Expired
    /// sessions are removed on access.
    pub async fn touch(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get_mut(id) {
            None => return None,
            Some(session) if now - session.last_seen > self.ttl => true,
            Some(session) => {
                session.last_seen = now;
                return Some(session.clone());
            }
        };
        if expired {
            sessions.remove(id);
        }
        None
    }

    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        crate::metrics::active_sessions(sessions.len());
        removed
    }

    /// End every session belonging to `user_id` except `keep`.
    pub async fn remove_user(&self, user_id: i64, keep: Option<&str>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, s| s.user_id != user_id || Some(id.as_str()) == keep);
        crate::metrics::active_sessions(sessions.len());
        before - sessions.len()
    }

    /// Drop expired sessions, returning how many were removed.
    pub async fn vacuum(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_seen <= self.ttl);
        crate::metrics::active_sessions(sessions.len());
        before - sessions.len()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Periodically purge expired sessions for the life of the process.
pub fn spawn_vacuum_task(store: Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(VACUUM_INTERVAL);
        loop {
            interval.tick().await;
            let removed = store.vacuum().await;
            if removed > 0 {
                let remaining = store.count().await;
                tracing::debug!(removed, remaining, "Vacuumed expired sessions");
            }
        }
    })
}

fn signature(secret: &str, session_id: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(session_id.as_bytes());
    Some(mac)
}

/// Cookie value `<id>.<hex hmac>`.
pub fn sign_session_id(secret: &str, session_id: &str) -> String {
    let tag = signature(secret, session_id)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{session_id}.{tag}")
}

/// Recover the session id from a signed cookie value, rejecting tampering.
pub fn verify_signed_id(secret: &str, cookie_value: &str) -> Option<String> {
    let (session_id, tag) = cookie_value.rsplit_once('.')?;
    let tag = hex::decode(tag).ok()?;
    signature(secret, session_id)?.verify_slice(&tag).ok()?;
    Some(session_id.to_string())
}

/// Find a cookie by name in a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.trim_matches('"'))
    })
}

/// `Set-Cookie` value establishing a session.
pub fn session_cookie(signed_value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={signed_value}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes the session cookie.
pub fn expired_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
