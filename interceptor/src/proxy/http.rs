//! Plain-HTTP (port 80) interception: terminate the client's request
//! locally, forward it to the real destination over a fresh outbound
//! connection, and relay the response back, logging both along the way.
//!
//! No HTTP/2, no WebSocket upgrades, no connection pooling: one upstream
//! connection per intercepted request, matching the inbound side's single
//! accepted flow per connection.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use interceptor_core::tcp::PendingFlow;
use interceptor_core::TcpHandler;
use tokio::net::TcpStream;
use tracing::warn;

use crate::har::{HarHeader, HarRecorder};
use crate::proxy::FlowStream;

pub struct HttpProxy {
    har: Arc<HarRecorder>,
}

impl HttpProxy {
    pub fn new(har: Arc<HarRecorder>) -> Self {
        Self { har }
    }
}

#[async_trait]
impl TcpHandler for HttpProxy {
    async fn handle(&self, pending: PendingFlow) {
        let flow = match pending.accept() {
            Ok(flow) => flow,
            Err(error) => {
                warn!(%error, "failed to accept http flow");
                return;
            }
        };
        let peer_address = flow.peer().address;
        let io = TokioIo::new(FlowStream::new(flow));
        let har = Arc::clone(&self.har);

        let service = service_fn(move |request| {
            let har = Arc::clone(&har);
            async move { forward(request, peer_address, har).await }
        });

        if let Err(error) = hyper::server::conn::http1::Builder::new()
            .serve_connection(io, service)
            .await
        {
            warn!(%error, "http connection ended with an error");
        }
    }
}

async fn forward(
    request: Request<Incoming>,
    fallback_address: Ipv4Addr,
    har: Arc<HarRecorder>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let host_header = request
        .headers()
        .get(hyper::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let host = host_header
        .as_deref()
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
        .unwrap_or_else(|| fallback_address.to_string());

    let method = request.method().to_string();
    let uri = request.uri().clone();
    let url = format!("http://{host}{}", uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"));

    let request_headers: Vec<HarHeader> = request
        .headers()
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.to_string(),
            value: value.to_str().unwrap_or("").to_string(),
        })
        .collect();

    let upstream_addr = match crate::dns::resolve(&host, 80).await {
        Ok(addr) => addr,
        Err(error) => {
            warn!(%error, host, "failed to resolve upstream host");
            return Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap());
        }
    };

    let stream = match TcpStream::connect(upstream_addr).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(%error, %upstream_addr, "failed to connect to upstream");
            return Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap());
        }
    };

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            warn!(%error, "upstream http connection ended with an error");
        }
    });

    let upstream_response = sender.send_request(request).await?;
    let status = upstream_response.status().as_u16();
    let response_headers: Vec<HarHeader> = upstream_response
        .headers()
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.to_string(),
            value: value.to_str().unwrap_or("").to_string(),
        })
        .collect();
    let mime_type = upstream_response
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let body_bytes = upstream_response.into_body().collect().await?.to_bytes();

    har.record(
        chrono::Utc::now().to_rfc3339(),
        method.clone(),
        url.clone(),
        request_headers,
        status,
        response_headers,
        mime_type,
        &body_bytes,
    );
    tracing::event!(
        target: "interceptor::exchange",
        tracing::Level::INFO,
        method = %method,
        url = %url,
        status = %status,
    );

    Ok(Response::builder()
        .status(status)
        .body(Full::new(body_bytes))
        .unwrap())
}
