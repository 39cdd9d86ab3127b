//! Request authentication: session lookup and permission extractors.

pub mod session;

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::AppError;
use crate::models::user::User;
use crate::routes::AppState;
use crate::services::activity_service::Actor;
use crate::services::user_service;

/// Session id carried by the request's signed cookie, if any.
pub fn session_id_from_headers(headers: &HeaderMap, secret: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|header| session::cookie_value(header, session::SESSION_COOKIE))
        .filter(|value| !value.is_empty())
        .and_then(|value| session::verify_signed_id(secret, value))
}

/// Best-effort client address: first `X-Forwarded-For` hop, else the peer.
///
/// The forwarded hop is only used when it parses as an IP address, so junk
/// never reaches the activity log's address column.
pub fn client_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .map(|ip| ip.to_string());

    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

/// An authenticated, active user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session_id: String,
    pub ip_address: Option<String>,
}

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: Some(self.user.id),
            ip_address: self.ip_address.clone(),
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session_id = session_id_from_headers(&parts.headers, &state.config.secret_key)
            .ok_or(AppError::Unauthenticated)?;
        let session = state
            .sessions
            .touch(&session_id)
            .await
            .ok_or(AppError::Unauthenticated)?;

        let mut conn = state.conn().await?;
        let user = user_service::get_user(&mut conn, session.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::Unauthenticated)?;

        Ok(CurrentUser {
            user,
            session_id,
            ip_address: client_ip(parts),
        })
    }
}

/// An authenticated superuser; other users are refused with 403.
#[derive(Debug, Clone)]
pub struct SuperUser(pub CurrentUser);

impl FromRequestParts<AppState> for SuperUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if !current.user.is_superuser {
            return Err(AppError::Forbidden(
                "Only system administrators can access this page.".to_string(),
            ));
        }
        Ok(SuperUser(current))
    }
}

/// Request origin for anonymous endpoints (login).
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn test_session_id_from_signed_cookie() {
        let signed = session::sign_session_id("k", "sid");
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("a=b; sessionid={signed}")).unwrap(),
        );
        assert_eq!(session_id_from_headers(&headers, "k").as_deref(), Some("sid"));
        assert_eq!(session_id_from_headers(&headers, "other"), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new(), "k"), None);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(client_ip(&parts).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_client_ip_ignores_malformed_forwarded_for() {
        let junk = "x".repeat(60);
        let mut request = Request::builder()
            .header("x-forwarded-for", junk.as_str())
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5000))));
        let (parts, _) = request.into_parts();
        assert_eq!(client_ip(&parts).as_deref(), Some("192.0.2.4"));

        let request = Request::builder()
            .header("x-forwarded-for", format!("{junk}, 10.0.0.1"))
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(client_ip(&parts), None);

        let request = Request::builder()
            .header("x-forwarded-for", " 2001:db8::1 ")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(client_ip(&parts).as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5000))));
        let (parts, _) = request.into_parts();
        assert_eq!(client_ip(&parts).as_deref(), Some("192.0.2.4"));
    }
}
