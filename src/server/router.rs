use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tracing::debug;

use super::state::ServeState;
use crate::context::{InboundRequest, RequestContext, REQUEST_ID_HEADER};
use crate::errors::PluginError;

pub const FORWARDED_METHOD_HEADER: &str = "x-forwarded-method";
pub const FORWARDED_URI_HEADER: &str = "x-forwarded-uri";

pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/authorize", any(authorize))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn authorize(
    State(state): State<ServeState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let method = forwarded_method(&headers).unwrap_or(method);
    let path = forwarded_path(&headers).unwrap_or_else(|| uri.path().to_string());
    let request = InboundRequest::new(method, path).with_headers(headers);
    let ctx = RequestContext::for_request(&request, state.request_timeout);

    let result = match request.normalized_path() {
        Ok(path) => match state.registry.proxies().match_path(&path) {
            Some(proxy) => state.plugin.on_request(&ctx, &proxy, &request).await,
            None => {
                debug!(path = %path, "no proxy covers request path");
                Err(PluginError::misconfigured(format!(
                    "no proxy for path {path}"
                )))
            }
        },
        Err(err) => {
            debug!(path = %request.path, error = %err, "request path rejected");
            Err(PluginError::InvalidPath {
                detail: err.to_string(),
            })
        }
    };

    let mut response = match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&ctx.trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn forwarded_method(headers: &HeaderMap) -> Option<Method> {
    let raw = headers.get(FORWARDED_METHOD_HEADER)?.to_str().ok()?.trim();
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).ok()
}

/// Path component of `x-forwarded-uri`, without query or fragment.
fn forwarded_path(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(FORWARDED_URI_HEADER)?.to_str().ok()?.trim();
    let uri: Uri = raw.parse().ok()?;
    let path = uri.path();
    (!path.is_empty()).then(|| path.to_string())
}
