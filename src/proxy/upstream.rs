//! Upstream request forwarding
//!
//! This module turns an inbound request into a request against the selected
//! backend, relays the backend's answer, and maps every failure to a generic
//! 500 so backend topology never leaks to the caller.

use crate::config::{RouterConfig, RoutingRules};
use crate::error::ProxyError;
use crate::proxy::backend::{decoded_path, target_url};
use crate::proxy::headers::{HeaderPipeline, copy_response_headers};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, BodyStream, Empty, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue,
    X_CONTENT_TYPE_OPTIONS,
};
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every response the proxy produces
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

/// Body of the generic error response
pub const SERVER_ERROR_BODY: &str = "Server Error\n";

/// Handles proxying requests to the two local backends
#[derive(Debug)]
pub struct ProxyHandler {
    config: Arc<RouterConfig>,
    rules: RoutingRules,
    headers: HeaderPipeline,
    client: reqwest::Client,
}

impl ProxyHandler {
    /// Create a handler with the standard header pipeline.
    pub fn new(config: Arc<RouterConfig>, rules: RoutingRules) -> Result<Self, ProxyError> {
        let headers = HeaderPipeline::standard(&rules);
        Self::with_pipeline(config, rules, headers)
    }

    pub fn with_pipeline(
        config: Arc<RouterConfig>,
        rules: RoutingRules,
        headers: HeaderPipeline,
    ) -> Result<Self, ProxyError> {
        // Backends that terminate TLS themselves use self-signed certificates.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            config,
            rules,
            headers,
            client,
        })
    }

    /// Answer one inbound request. Never fails: errors become a 500.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        if *request.method() == Method::OPTIONS {
            tracing::debug!(path = %request.uri().path(), "preflight answered");
            return preflight_response();
        }

        let method = request.method().clone();
        let uri = request.uri().clone();

        match self.forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, url = %uri, error = %e, "proxy request failed");
                server_error_response()
            }
        }
    }

    /// Forward the request to its backend and stream the answer back.
    async fn forward<B>(&self, request: Request<B>) -> Result<Response<ProxyBody>, ProxyError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        // Rules match the decoded path; the backend still gets the raw one.
        let path = decoded_path(parts.uri.path());
        let backend = self.rules.select_backend(&path);

        let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let url = target_url(backend.port(&self.config), path_and_query)?;
        let mut outbound_headers = self.headers.apply(&parts.headers, &path);

        let body = if body.is_end_stream() {
            None
        } else {
            if let Some(len) = body.size_hint().exact() {
                outbound_headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            }
            Some(streamed_body(body))
        };

        tracing::debug!(
            backend = backend.name(),
            method = %parts.method,
            url = %url,
            "forwarding request"
        );

        let mut outbound = self
            .client
            .request(parts.method.clone(), url.clone())
            .headers(outbound_headers);
        if let Some(body) = body {
            outbound = outbound.body(body);
        }
        let upstream = outbound.send().await?;

        let status = upstream.status();
        let mut headers = HeaderMap::with_capacity(upstream.headers().len() + 1);
        copy_response_headers(upstream.headers(), &mut headers);
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        tracing::info!(
            status = status.as_u16(),
            method = %parts.method,
            url = %url,
            "request proxied"
        );

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(|e| Box::new(e) as BoxError);

        let mut response = Response::new(StreamBody::new(stream).boxed_unsync());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Immediate answer to a CORS preflight.
pub fn preflight_response() -> Response<ProxyBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::OK;
    response
}

/// Generic 500 that reveals nothing about the failure.
pub fn server_error_response() -> Response<ProxyBody> {
    let mut response = Response::new(full(SERVER_ERROR_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

/// Relay the inbound body to the backend chunk by chunk, dropping trailers.
fn streamed_body<B>(body: B) -> reqwest::Body
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    // Not BodyExt::map_err: BodyStream is a Body too.
    let stream = TryStreamExt::map_err(BodyStream::new(body), Into::<BoxError>::into)
        .try_filter_map(|frame| async move { Ok::<_, BoxError>(frame.into_data().ok()) });
    reqwest::Body::wrap_stream(stream)
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn full(chunk: impl Into<Bytes>) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}
