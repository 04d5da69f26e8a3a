//! Runtime plugin handlers
//!
//! A [`Handler`] is the validated, executable form of a manifest
//! [`HandlerSpec`](super::manifest::HandlerSpec). Handlers are built by the
//! loader outside any lock and are cheap to clone, so request dispatch can
//! take a snapshot and execute without holding the route table open.

use axum::Json;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Executable request handler owned by a plugin's route bindings
#[derive(Debug, Clone)]
pub enum Handler {
    /// Fixed status and JSON body
    Static {
        status: StatusCode,
        body: serde_json::Value,
    },
    /// Reflect the request back as JSON
    Echo,
    /// Forward the request to an upstream URL
    Proxy {
        upstream: url::Url,
        forward_query: bool,
    },
}

impl Handler {
    /// Produce a response for one inbound request.
    ///
    /// `path` and `query` are the original request values; proxy handlers
    /// forward the method and query but not the path suffix, matching the
    /// one-endpoint-per-upstream plugins this replaces.
    pub async fn respond(
        &self,
        client: &reqwest::Client,
        method: &Method,
        path: &str,
        query: Option<&str>,
    ) -> Response {
        match self {
            Self::Static { status, body } => (*status, Json(body.clone())).into_response(),
            Self::Echo => Json(json!({
                "code": 200,
                "method": method.as_str(),
                "path": path,
                "query": query,
            }))
            .into_response(),
            Self::Proxy {
                upstream,
                forward_query,
            } => proxy(client, upstream, *forward_query, method, query).await,
        }
    }
}

/// Forward a request upstream and relay status, content type, and body
async fn proxy(
    client: &reqwest::Client,
    upstream: &url::Url,
    forward_query: bool,
    method: &Method,
    query: Option<&str>,
) -> Response {
    let mut url = upstream.clone();
    if forward_query {
        if let Some(q) = query {
            url.set_query(Some(q));
        }
    }

    match client.request(method.clone(), url.clone()).send().await {
        Ok(resp) => {
            let status = resp.status();
            let content_type = resp.headers().get(header::CONTENT_TYPE).cloned();
            match resp.bytes().await {
                Ok(bytes) => {
                    let mut response = (status, bytes).into_response();
                    if let Some(ct) = content_type {
                        response.headers_mut().insert(header::CONTENT_TYPE, ct);
                    }
                    response
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "failed to read upstream body");
                    upstream_error()
                }
            }
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "upstream request failed");
            upstream_error()
        }
    }
}

fn upstream_error() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "code": 502, "msg": "upstream request failed" })),
    )
        .into_response()
}
