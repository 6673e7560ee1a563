//! Authentication middleware
//!
//! `authenticate` runs on every request and attaches an [`Identity`]; the
//! `require_*` layers gate individual routes on it.

use crate::api::ApiError;
use crate::auth::{
    api::AuthState,
    models::{Identity, User},
    permissions::PermissionSource,
    tokens::{validate_token_plaintext, TokenScope},
};
use crate::store::StoreError;
use crate::validation::Validator;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

/// Resolves the bearer token (if any) to an [`Identity`] and stores it in the
/// request extensions.
pub async fn authenticate(State(auth): State<AuthState>, mut req: Request, next: Next) -> Response {
    let response = match resolve_identity(&auth, req.headers()) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    };
    vary_on_authorization(response)
}

fn vary_on_authorization(mut response: Response) -> Response {
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

fn resolve_identity(auth: &AuthState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    // An empty header counts as absent.
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .filter(|value| !value.is_empty())
    else {
        return Ok(Identity::Anonymous);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(parse_bearer)
        .ok_or(ApiError::InvalidToken)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.is_valid() {
        return Err(ApiError::InvalidToken);
    }

    let record = match auth.tokens.resolve(token) {
        Ok(record) => record,
        Err(StoreError::NotFound) => return Err(ApiError::InvalidToken),
        Err(err) => return Err(ApiError::internal(err)),
    };
    if record.scope != TokenScope::Authentication {
        debug!(scope = ?record.scope, "Rejected token with wrong scope");
        return Err(ApiError::InvalidToken);
    }

    match auth.users.get_by_email(&record.email) {
        Ok(user) => Ok(Identity::User(user)),
        Err(StoreError::NotFound) => Err(ApiError::InvalidToken),
        Err(err) => Err(ApiError::internal(err)),
    }
}

/// Splits `Bearer <token>`. Anything but exactly two space-separated parts
/// with a literal `Bearer` scheme is rejected.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

pub fn authenticated_user(identity: Option<&Identity>) -> Result<&User, ApiError> {
    match identity {
        Some(Identity::User(user)) => Ok(user),
        Some(Identity::Anonymous) | None => Err(ApiError::AuthenticationRequired),
    }
}

pub fn activated_user(identity: Option<&Identity>) -> Result<&User, ApiError> {
    let user = authenticated_user(identity)?;
    if !user.activated {
        return Err(ApiError::InactiveAccount);
    }
    Ok(user)
}

pub async fn require_authenticated_user(req: Request, next: Next) -> Result<Response, ApiError> {
    authenticated_user(req.extensions().get::<Identity>())?;
    Ok(next.run(req).await)
}

pub async fn require_activated_user(req: Request, next: Next) -> Result<Response, ApiError> {
    activated_user(req.extensions().get::<Identity>())?;
    Ok(next.run(req).await)
}

/// State for [`require_permission`]: the grant source and the code a route needs.
#[derive(Clone)]
pub struct PermissionGate {
    permissions: Arc<dyn PermissionSource>,
    code: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn PermissionSource>, code: &'static str) -> Self {
        Self { permissions, code }
    }
}

/// Activated user holding the gate's permission code.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = activated_user(req.extensions().get::<Identity>())?;
    let granted = gate
        .permissions
        .permissions_for(user)
        .map_err(ApiError::internal)?;
    if !granted.includes(gate.code) {
        debug!(email = %user.email, code = gate.code, "Permission denied");
        return Err(ApiError::NotPermitted);
    }
    Ok(next.run(req).await)
}

/// Extractor for handlers behind a gate.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        authenticated_user(parts.extensions.get::<Identity>())
            .cloned()
            .map(CurrentUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        permissions::{PermissionRepository, Permissions},
        tokens::TokenStore,
        user_store::UserRepository,
    };
    use crate::store::StoreClient;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    struct FixedPermissions(Vec<&'static str>);

    impl PermissionSource for FixedPermissions {
        fn permissions_for(&self, _user: &User) -> Result<Permissions, StoreError> {
            Ok(self.0.iter().copied().collect())
        }
    }

    fn create_test_user(activated: bool) -> User {
        User {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            password_hash: "hash".to_string(),
            activated,
            version: 1,
        }
    }

    fn gated(granted: Vec<&'static str>, identity: Identity) -> Router {
        let gate = PermissionGate::new(Arc::new(FixedPermissions(granted)), "worlds:read");
        Router::new()
            .route(
                "/gated",
                get(|CurrentUser(user): CurrentUser| async move { user.email }),
            )
            .route_layer(from_fn_with_state(gate, require_permission))
            .layer(Extension(identity))
    }

    async fn status_of(app: Router) -> StatusCode {
        app.oneshot(HttpRequest::builder().uri("/gated").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Token abc"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer a b"), None);
        assert_eq!(parse_bearer("bearer abc"), None);
    }

    #[test]
    fn test_identity_gates() {
        let anonymous = Identity::Anonymous;
        assert!(matches!(
            authenticated_user(Some(&anonymous)),
            Err(ApiError::AuthenticationRequired)
        ));
        assert!(matches!(
            authenticated_user(None),
            Err(ApiError::AuthenticationRequired)
        ));

        let inactive = Identity::User(create_test_user(false));
        assert!(authenticated_user(Some(&inactive)).is_ok());
        assert!(matches!(
            activated_user(Some(&inactive)),
            Err(ApiError::InactiveAccount)
        ));

        let active = Identity::User(create_test_user(true));
        assert_eq!(activated_user(Some(&active)).unwrap().email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_require_permission() {
        let active = Identity::User(create_test_user(true));

        assert_eq!(
            status_of(gated(vec!["worlds:read"], active.clone())).await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(gated(vec!["worlds:write"], active)).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(gated(vec!["worlds:read"], Identity::User(create_test_user(false)))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(gated(vec!["worlds:read"], Identity::Anonymous)).await,
            StatusCode::UNAUTHORIZED
        );
    }

    fn create_test_auth() -> AuthState {
        let store = StoreClient::in_memory().unwrap();
        AuthState {
            users: UserRepository::new(store.clone(), 4),
            tokens: TokenStore::new(store.clone()),
            permissions: PermissionRepository::new(store),
            token_ttl: chrono::Duration::hours(1),
            default_permissions: Arc::new(Vec::new()),
        }
    }

    fn whoami(auth: AuthState) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(identity): Extension<Identity>| async move {
                    match identity {
                        Identity::Anonymous => "anonymous".to_string(),
                        Identity::User(user) => user.email,
                    }
                }),
            )
            .layer(from_fn_with_state(auth, authenticate))
    }

    async fn call_whoami(auth: &AuthState, authorization: Option<&str>) -> (StatusCode, String, bool) {
        let mut req = HttpRequest::builder().uri("/whoami");
        if let Some(value) = authorization {
            req = req.header(header::AUTHORIZATION, value);
        }
        let response = whoami(auth.clone())
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let varies = response
            .headers()
            .get_all(header::VARY)
            .iter()
            .any(|v| v == "Authorization");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), varies)
    }

    #[tokio::test]
    async fn test_authenticate_resolves_identity() {
        let auth = create_test_auth();
        let user = auth
            .users
            .new_user("Alice", "alice@example.com", "pa55word!")
            .unwrap();
        auth.users.insert(&user).unwrap();
        let issued = auth
            .tokens
            .issue(&user.email, chrono::Duration::hours(1), TokenScope::Authentication)
            .unwrap();

        let (status, body, varies) = call_whoami(&auth, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
        assert!(varies);

        let (status, body, _) = call_whoami(&auth, Some("")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let (status, body, _) =
            call_whoami(&auth, Some(format!("Bearer {}", issued.token).as_str())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice@example.com");
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_tokens() {
        let auth = create_test_auth();
        let user = auth
            .users
            .new_user("Alice", "alice@example.com", "pa55word!")
            .unwrap();
        auth.users.insert(&user).unwrap();

        let activation = auth
            .tokens
            .issue(&user.email, chrono::Duration::hours(1), TokenScope::Activation)
            .unwrap();
        let expired = auth
            .tokens
            .issue(&user.email, chrono::Duration::seconds(-5), TokenScope::Authentication)
            .unwrap();
        let orphan = auth
            .tokens
            .issue("ghost@example.com", chrono::Duration::hours(1), TokenScope::Authentication)
            .unwrap();

        for header_value in [
            "Token abc".to_string(),
            "Bearer short".to_string(),
            format!("Bearer {}", "A".repeat(26)),
            format!("Bearer {}", activation.token),
            format!("Bearer {}", expired.token),
            format!("Bearer {}", orphan.token),
        ] {
            let (status, _, varies) = call_whoami(&auth, Some(header_value.as_str())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{header_value}");
            assert!(varies);
        }
    }
}
