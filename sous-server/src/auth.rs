//! Session-cookie authorization.
//!
//! Sign-in happens elsewhere; this service only resolves the `sous_session`
//! cookie to a user id and checks it against the user the request claims to act
//! for. A request without the cookie is turned away before storage is touched.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use uuid::Uuid;

use sous_core::store::SessionStore;
use sous_core::SousError;

pub const SESSION_COOKIE: &str = "sous_session";

/// Value of the session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Resolve the caller and require it to be `claimed`.
pub async fn authorize<S: SessionStore + ?Sized>(
    sessions: &S,
    headers: &HeaderMap,
    claimed: Option<Uuid>,
) -> Result<Uuid, SousError> {
    let token = session_token(headers)
        .ok_or_else(|| SousError::Auth("missing session cookie".to_string()))?;
    let claimed = claimed.ok_or_else(|| SousError::Auth("missing user_id".to_string()))?;

    match sessions.resolve_session(&token).await? {
        Some(user) if user == claimed => Ok(user),
        Some(user) => {
            tracing::warn!(session_user = %user, claimed = %claimed, "Session does not match claimed user");
            Err(SousError::Auth("session does not match user".to_string()))
        }
        None => Err(SousError::Auth("unknown or expired session".to_string())),
    }
}

/// Resolve the caller when there is no claimed id to compare against, e.g. for
/// recipe ids whose owner is only known after a lookup.
pub async fn require_user<S: SessionStore + ?Sized>(
    sessions: &S,
    headers: &HeaderMap,
) -> Result<Uuid, SousError> {
    let token = session_token(headers)
        .ok_or_else(|| SousError::Auth("missing session cookie".to_string()))?;
    sessions
        .resolve_session(&token)
        .await?
        .ok_or_else(|| SousError::Auth("unknown or expired session".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use sous_core::MemoryStore;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    #[test]
    fn test_session_token_among_other_cookies() {
        let h = headers("theme=dark; sous_session=abc123; lang=en");
        assert_eq!(session_token(&h), Some("abc123".to_string()));
        assert_eq!(session_token(&headers("sous_session=")), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_authorize_requires_matching_user() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_session("tok", user, None);
        let h = headers("sous_session=tok");

        assert_eq!(authorize(&store, &h, Some(user)).await.unwrap(), user);
        assert!(matches!(
            authorize(&store, &h, Some(Uuid::new_v4())).await,
            Err(SousError::Auth(_))
        ));
        assert!(matches!(
            authorize(&store, &h, None).await,
            Err(SousError::Auth(_))
        ));
        assert!(matches!(
            authorize(&store, &headers("sous_session=nope"), Some(user)).await,
            Err(SousError::Auth(_))
        ));
        assert!(matches!(
            authorize(&store, &HeaderMap::new(), Some(user)).await,
            Err(SousError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_require_user() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_session("tok", user, None);

        assert_eq!(require_user(&store, &headers("sous_session=tok")).await.unwrap(), user);
        assert!(require_user(&store, &HeaderMap::new()).await.is_err());
        assert!(require_user(&store, &headers("sous_session=other")).await.is_err());
    }
}
