//! Traffic pipeline middleware.
//! Correlates, rate limits, tracks and normalizes every non-exempt request.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::errors::ApiError;
use crate::http::request::{resolve_request_id, RequestId};
use crate::http::response::{
    apply_rate_limit_status, into_envelope, set_rate_limit_headers, set_request_id,
};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::observability::tracing::request_span;
use crate::security::rate_limit::client_identity;

pub async fn traffic_pipeline(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    // 1. Exempt paths skip tracking and limiting but still get a correlation
    //    id, in the header and in any error envelope.
    if state.exempt_paths.load().matches(&path) {
        let request_id = resolve_request_id(req.headers());
        req.extensions_mut().insert(RequestId(request_id.clone()));
        let response = next.run(req).await;
        let mut response = into_envelope(response, &path, &request_id, state.errors.debug).await;
        set_request_id(response.headers_mut(), &request_id);
        return response;
    }

    // 2. Begin tracking
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(req.headers(), peer);
    let guard = state.tracker.begin(&req, &client);
    let request_id = guard.request_id().to_string();
    let span = request_span(
        &request_id,
        &guard.context().method,
        &path,
        &guard.context().trace,
    );

    async move {
        let debug = state.errors.debug;

        // 3. Admission
        let admission = state.limiter.check(&client, &path);

        let mut response = match admission {
            Err(exceeded) => {
                let retry_after = exceeded.retry_after_secs();
                tracing::warn!(
                    client = %client,
                    limit = exceeded.limit,
                    retry_after,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited(state.limiter.settings().key_scope.as_str());

                let mut response =
                    ApiError::rate_limited(retry_after).render(Some(&path), Some(&request_id), debug);
                set_rate_limit_headers(response.headers_mut(), exceeded.limit, 0, retry_after);
                response
            }
            Ok(status) => {
                req.extensions_mut().insert(RequestId(request_id.clone()));
                req.extensions_mut().insert(guard.context().trace.clone());

                // 4. Handler, then error normalization
                let response = next.run(req).await;
                let mut response = into_envelope(response, &path, &request_id, debug).await;
                apply_rate_limit_status(response.headers_mut(), &status);
                response
            }
        };

        // 5. End tracking and echo correlation id
        guard.finish(response.status().as_u16());
        set_request_id(response.headers_mut(), &request_id);
        response
    }
    .instrument(span)
    .await
}
