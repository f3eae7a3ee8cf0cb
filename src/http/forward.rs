//! Downstream forwarding stage.
//!
//! # Responsibilities
//! - Build the outbound request from the rewritten downstream target
//! - Send it through the shared HTTP client under the downstream timeout
//! - Store the response (or the failure) on the context

use std::time::Duration;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, Request, Response},
};
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use crate::pipeline::{DownstreamContext, PipelineError, Stage};

pub const X_REQUEST_ID: &str = "x-request-id";

/// The HTTP side of one request, carried through the pipeline.
#[derive(Debug)]
pub struct HttpExchange {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Body>,
    pub response: Option<Response<Body>>,
}

impl HttpExchange {
    pub fn new(method: Method, headers: HeaderMap, body: Body) -> Self {
        Self {
            method,
            headers,
            body: Some(body),
            response: None,
        }
    }
}

/// Final stage: sends the request to the leased endpoint.
pub struct ForwardStage {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl ForwardStage {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }

    fn build_request(ctx: &mut DownstreamContext<HttpExchange>) -> Result<Request<Body>, PipelineError> {
        let uri = ctx
            .target
            .to_uri()
            .map_err(|e| PipelineError::InvalidTarget(format!("{}: {e}", ctx.target)))?;

        let mut headers = std::mem::take(&mut ctx.exchange.headers);
        // the client derives Host from the rewritten URI
        headers.remove(header::HOST);
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id.to_string()) {
            headers.entry(X_REQUEST_ID).or_insert(id);
        }

        let mut builder = Request::builder()
            .method(ctx.exchange.method.clone())
            .uri(uri);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }

        let body = ctx.exchange.body.take().unwrap_or_else(Body::empty);
        builder
            .body(body)
            .map_err(|e| PipelineError::InvalidTarget(e.to_string()))
    }
}

fn into_body_response(response: Response<Incoming>) -> Response<Body> {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

impl Stage<HttpExchange> for ForwardStage {
    fn invoke<'a>(&'a self, ctx: &'a mut DownstreamContext<HttpExchange>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let request = match Self::build_request(ctx) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(request_id = %ctx.request_id, error = %e, "Cannot build downstream request");
                    ctx.set_pipeline_error(e);
                    return;
                }
            };

            match tokio::time::timeout(self.timeout, self.client.request(request)).await {
                Ok(Ok(response)) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        target = %ctx.target,
                        status = %response.status(),
                        "Downstream responded"
                    );
                    ctx.exchange.response = Some(into_body_response(response));
                }
                Ok(Err(e)) => {
                    tracing::error!(request_id = %ctx.request_id, target = %ctx.target, error = %e, "Downstream error");
                    ctx.set_pipeline_error(PipelineError::Downstream(e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        target = %ctx.target,
                        timeout = ?self.timeout,
                        "Downstream request timed out"
                    );
                    ctx.set_pipeline_error(PipelineError::DownstreamTimeout);
                }
            }
        })
    }
}
