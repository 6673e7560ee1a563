//! CORS policy built from the trusted origin list.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, warn};

/// Exact-match list of origins allowed to make cross-origin requests.
#[derive(Debug, Clone, Default)]
pub struct TrustedOrigins(Arc<Vec<HeaderValue>>);

impl TrustedOrigins {
    pub fn new(origins: &[String]) -> Self {
        let origins = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring malformed trusted origin");
                    None
                }
            })
            .collect();
        Self(Arc::new(origins))
    }

    pub fn contains(&self, origin: &HeaderValue) -> bool {
        self.0.iter().any(|trusted| trusted == origin)
    }
}

/// Exact-match CORS layer. Preflights from trusted origins are answered by
/// the layer itself; with no trusted origins no CORS headers are granted.
pub fn cors_layer(origins: &TrustedOrigins) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.0.iter().cloned()))
        .allow_methods([
            Method::OPTIONS,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::GET,
            Method::POST,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Runs outside [`cors_layer`]. A preflight whose origin is not trusted loses
/// its `Access-Control-Request-Method` header, so the CORS layer treats it as
/// a plain `OPTIONS` request and the router answers it.
pub async fn forward_untrusted_preflight(
    State(origins): State<TrustedOrigins>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        let trusted = req
            .headers()
            .get(header::ORIGIN)
            .is_some_and(|origin| origins.contains(origin));
        if !trusted
            && req
                .headers_mut()
                .remove(header::ACCESS_CONTROL_REQUEST_METHOD)
                .is_some()
        {
            debug!("Forwarding preflight from untrusted origin");
        }
    }
    next.run(req).await
}
