use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::tracing::{scope_request_id, RequestId};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

static REQUEST_ID: HeaderName = HeaderName::from_static(REQUEST_ID_HEADER);

/// Assigns the request id: the client's `x-request-id` when it is well formed,
/// a fresh UUID otherwise. The id is set on the forwarded request, stored as an
/// extension, scoped for error bodies and echoed on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(RequestId::from_header)
        .unwrap_or_default();

    // Ids are ASCII-only, so conversion only fails for hand-built values.
    let echoed = HeaderValue::from_str(id.as_str()).ok();
    if let Some(value) = &echoed {
        request.headers_mut().insert(REQUEST_ID.clone(), value.clone());
    }
    request.extensions_mut().insert(id.clone());

    let mut response = scope_request_id(id, next.run(request)).await;
    if let Some(value) = echoed {
        response.headers_mut().insert(REQUEST_ID.clone(), value);
    }
    response
}
