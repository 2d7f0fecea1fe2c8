//! Transparent HTTP proxy to the build server.
//!
//! Every inbound request is replayed against the upstream with the same
//! method, path, query and headers. Request and response bodies are streamed
//! through without buffering.

use axum::{
    body::{Body, HttpBody},
    http::{Request, Response, StatusCode, Uri},
};
use bytes::Bytes;
use hyper::body::{Frame, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};

use crate::dev::bundler::Upstream;
use crate::dev::responses::plain_text;
use crate::error::ProxyError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP/1 client shared by every proxied exchange.
pub type ProxyClient = Client<HttpConnector, Body>;

/// Forwards requests to the build server.
#[derive(Clone)]
pub struct RequestProxy {
    upstream: Upstream,
    client: ProxyClient,
}

impl RequestProxy {
    pub fn new(upstream: Upstream) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self { upstream, client }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    pub(crate) fn client(&self) -> &ProxyClient {
        &self.client
    }

    /// Proxy one exchange.
    ///
    /// Never fails: if the build server cannot be reached the caller gets a
    /// `502 Bad Gateway` with a plain-text explanation.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        match self.forward(req).await {
            Ok(response) => response,
            Err(err) => {
                warn!("{}", err);
                plain_text(StatusCode::BAD_GATEWAY, format!("Bad Gateway: {}", err))
            }
        }
    }

    /// Proxy one exchange that is cut off once `terminate` is cancelled.
    ///
    /// Returns `None` if that happens before the upstream head arrived. After
    /// that point the response body fails with [`ProxyError::Terminated`].
    pub async fn handle_until(
        &self,
        req: Request<Body>,
        terminate: &CancellationToken,
    ) -> Option<Response<Body>> {
        tokio::select! {
            biased;
            _ = terminate.cancelled() => {
                debug!("exchange terminated before the upstream answered");
                None
            }
            response = self.handle(req) => {
                let (parts, body) = response.into_parts();
                let body = TerminableBody::new(body, terminate.clone());
                Some(Response::from_parts(parts, Body::new(body)))
            }
        }
    }

    /// Proxy one exchange, surfacing upstream failures as errors.
    ///
    /// The response body is still streaming when this returns; a reset after
    /// the head arrived ends the body early instead.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let url = self.upstream_url(&parts.uri);

        let uri: Uri = url.parse().map_err(|e: axum::http::uri::InvalidUri| {
            ProxyError::InvalidUri {
                uri: url.clone(),
                message: e.to_string(),
            }
        })?;

        // Version is left at the client default; the upstream only speaks HTTP/1.
        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = parts.headers;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ProxyError::Upstream {
                url: url.clone(),
                message: error_chain(&e),
            })?;

        info!(url = %url, path = %path, status = response.status().as_u16(), "proxied");

        let (parts, incoming) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(incoming)))
    }

    /// Absolute upstream URL for an inbound request URI.
    pub fn upstream_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.upstream.base_url(), path_and_query)
    }
}

/// Response body that fails once its token is cancelled.
struct TerminableBody {
    inner: Body,
    terminated: Pin<Box<WaitForCancellationFutureOwned>>,
    done: bool,
}

impl TerminableBody {
    fn new(inner: Body, terminate: CancellationToken) -> Self {
        Self {
            inner,
            terminated: Box::pin(terminate.cancelled_owned()),
            done: false,
        }
    }
}

impl HttpBody for TerminableBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.terminated.as_mut().poll(cx).is_ready() {
            this.done = true;
            return Poll::Ready(Some(Err(axum::Error::new(ProxyError::Terminated))));
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.done || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Flatten an error and its sources into one line.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
