//! TLS-terminating (port 443) interception: perform the TLS handshake with
//! the child locally using a leaf certificate minted for whatever SNI it
//! asked for, then open a real TLS connection to the actual destination
//! and relay the decrypted HTTP exchange between the two, same as
//! [`crate::proxy::http`] does for plaintext.

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use interceptor_core::tcp::PendingFlow;
use interceptor_core::TcpHandler;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::warn;

use crate::ca::CertificateAuthority;
use crate::har::{HarHeader, HarRecorder};
use crate::proxy::FlowStream;

/// Resolves a per-connection certificate from the SNI name the client
/// offers, minting a new leaf on first sight of a name and reusing it
/// afterward. Connections with no SNI have nothing to impersonate and are
/// rejected.
struct SniResolver {
    ca: Arc<CertificateAuthority>,
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
        let sni = client_hello.server_name()?;
        self.ca.certificate_for(sni).ok()
    }
}

pub struct TlsProxy {
    ca: Arc<CertificateAuthority>,
    har: Arc<HarRecorder>,
}

impl TlsProxy {
    pub fn new(ca: Arc<CertificateAuthority>, har: Arc<HarRecorder>) -> Self {
        Self { ca, har }
    }
}

#[async_trait]
impl TcpHandler for TlsProxy {
    async fn handle(&self, pending: PendingFlow) {
        let flow = match pending.accept() {
            Ok(flow) => flow,
            Err(error) => {
                warn!(%error, "failed to accept tls flow");
                return;
            }
        };
        let peer_address = flow.peer().address;

        let mut server_config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(SniResolver { ca: Arc::clone(&self.ca) }));
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let tls_stream = match acceptor.accept(FlowStream::new(flow)).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%error, "tls handshake with child failed");
                return;
            }
        };
        let sni = tls_stream
            .get_ref()
            .1
            .server_name()
            .map(str::to_string)
            .unwrap_or_else(|| peer_address.to_string());

        let io = TokioIo::new(tls_stream);
        let har = Arc::clone(&self.har);
        let sni_for_service = sni.clone();

        let service = service_fn(move |request| {
            let har = Arc::clone(&har);
            let sni = sni_for_service.clone();
            async move { forward(request, sni, har).await }
        });

        if let Err(error) = hyper::server::conn::http1::Builder::new()
            .serve_connection(io, service)
            .await
        {
            warn!(%error, "https connection ended with an error");
        }
    }
}

async fn forward(
    request: Request<Incoming>,
    sni: String,
    har: Arc<HarRecorder>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = request.method().to_string();
    let uri = request.uri().clone();
    let url = format!("https://{sni}{}", uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"));

    let request_headers: Vec<HarHeader> = request
        .headers()
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.to_string(),
            value: value.to_str().unwrap_or("").to_string(),
        })
        .collect();

    let upstream_addr = match crate::dns::resolve(&sni, 443).await {
        Ok(addr) => addr,
        Err(error) => {
            warn!(%error, sni, "failed to resolve upstream host");
            return Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap());
        }
    };

    let tcp_stream = match TcpStream::connect(upstream_addr).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(%error, %upstream_addr, "failed to connect to upstream");
            return Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap());
        }
    };

    let mut root_store = rustls::RootCertStore::empty();
    root_store.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
        rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    let client_config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));
    let server_name = match rustls::ServerName::try_from(sni.as_str()) {
        Ok(name) => name,
        Err(error) => {
            warn!(%error, sni, "not a valid tls server name");
            return Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap());
        }
    };
    let tls_stream = match connector.connect(server_name, tcp_stream).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(%error, sni, "upstream tls handshake failed");
            return Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap());
        }
    };

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(tls_stream)).await?;
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            warn!(%error, "upstream https connection ended with an error");
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
