//! HTTP probe client.
//!
//! Issues a single GET per probe over hyper's HTTP/1.1 client connection,
//! optionally through an HTTP forward proxy:
//!
//! ```text
//! direct   http://host   → TCP host:port → GET /path
//! direct   https://host  → TCP host:port → TLS → GET /path
//! proxied  http://host   → TCP proxy     → GET http://host/path
//! proxied  https://host  → TCP proxy     → CONNECT host:443 → TLS → GET /path
//! ```
//!
//! The connect phase and the response phase are each bounded by the task
//! timeout. Running out of time while waiting for the response is reported
//! as [`ProbeOutcome::Timeout`], not as an error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderValue, Method, Request, StatusCode, Uri};
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::error::ProbeError;
use crate::task::ProbeTask;

/// A probe that completed at the HTTP level, or ran out of time waiting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    /// The target (or the proxy on its behalf) answered.
    Response { status: u16, elapsed: Duration },
    /// No response head arrived within the timeout.
    Timeout,
}

/// Outcome of one probe call: an HTTP-level outcome or a transport error.
pub type ProbeResult = Result<ProbeOutcome, ProbeError>;

/// Performs one probe. Implementations never retry; retry policy belongs
/// to the scheduler.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, task: &ProbeTask) -> impl Future<Output = ProbeResult> + Send;
}

/// Forward proxy address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    host: String,
    port: u16,
}

impl ProxyEndpoint {
    /// Parse `http://host[:port]` or bare `host[:port]`. Port defaults to 80.
    pub fn parse(url: &str) -> Result<Self, ProbeError> {
        let invalid = |reason: String| ProbeError::InvalidProxy {
            url: url.to_string(),
            reason,
        };
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        match uri.scheme_str() {
            None | Some("http") => {}
            Some(other) => return Err(invalid(format!("unsupported proxy scheme {other}"))),
        }
        let host = uri.host().ok_or_else(|| invalid("missing host".to_string()))?;
        Ok(Self {
            host: unbracket(host).to_string(),
            port: uri.port_u16().unwrap_or(80),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Probe URL broken into the pieces each connection path needs.
#[derive(Debug)]
struct Target {
    https: bool,
    /// Host without IPv6 brackets, for socket connects and SNI.
    host: String,
    port: u16,
    /// `Host` header value: host plus explicit port if the URL had one.
    host_header: String,
    /// Path and query, `/` when empty.
    origin: String,
}

impl Target {
    fn parse(url: &str) -> Result<Self, ProbeError> {
        let invalid = |reason: String| ProbeError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        let https = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(other) => return Err(invalid(format!("unsupported scheme {other}"))),
            None => return Err(invalid("missing scheme".to_string())),
        };
        let host = uri.host().ok_or_else(|| invalid("missing host".to_string()))?;
        let host_header = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let origin = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_string();
        Ok(Self {
            https,
            host: unbracket(host).to_string(),
            port: uri.port_u16().unwrap_or(if https { 443 } else { 80 }),
            host_header,
            origin,
        })
    }

    fn absolute(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{scheme}://{}{}", self.host_header, self.origin)
    }

    fn connect_authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn unbracket(host: &str) -> &str {
    host.trim_start_matches('[').trim_end_matches(']')
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type BoxedIo = Box<dyn Io>;

/// Production [`Prober`] over hyper, shared read-only by every worker.
pub struct HttpProber {
    proxy: Option<ProxyEndpoint>,
    tls: TlsConnector,
    user_agent: HeaderValue,
}

impl std::fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProber")
            .field("proxy", &self.proxy)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl HttpProber {
    /// Create a prober verifying TLS against the Mozilla root store.
    pub fn new(proxy: Option<&str>, user_agent: &str) -> Result<Self, ProbeError> {
        Self::with_tls_config(proxy, user_agent, default_tls_config()?)
    }

    pub fn with_tls_config(
        proxy: Option<&str>,
        user_agent: &str,
        tls: Arc<rustls::ClientConfig>,
    ) -> Result<Self, ProbeError> {
        let proxy = proxy.map(ProxyEndpoint::parse).transpose()?;
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| ProbeError::Http(format!("invalid user agent: {e}")))?;
        Ok(Self {
            proxy,
            tls: TlsConnector::from(tls),
            user_agent,
        })
    }

    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    async fn connect(&self, target: &Target) -> Result<BoxedIo, ProbeError> {
        match (&self.proxy, target.https) {
            (None, false) => Ok(Box::new(connect_target(target).await?)),
            (None, true) => {
                let tcp = connect_target(target).await?;
                Ok(Box::new(self.tls_handshake(target, tcp).await?))
            }
            (Some(proxy), false) => Ok(Box::new(connect_proxy(proxy).await?)),
            (Some(proxy), true) => {
                let tunnel = self.open_tunnel(proxy, target).await?;
                Ok(Box::new(self.tls_handshake(target, tunnel).await?))
            }
        }
    }

    /// Ask the proxy for a raw tunnel to the target with `CONNECT`.
    async fn open_tunnel(
        &self,
        proxy: &ProxyEndpoint,
        target: &Target,
    ) -> Result<TokioIo<hyper::upgrade::Upgraded>, ProbeError> {
        let tcp = connect_proxy(proxy).await?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tcp))
            .await
            .map_err(|e| ProbeError::Proxy(format!("handshake with {proxy} failed: {e}")))?;
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                trace!(error = %e, "proxy tunnel connection closed");
            }
        });

        let authority = target.connect_authority();
        let req = Request::builder()
            .method(Method::CONNECT)
            .uri(authority.as_str())
            .header(HOST, authority.as_str())
            .header(USER_AGENT, self.user_agent.clone())
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::InvalidUrl {
                url: authority.clone(),
                reason: e.to_string(),
            })?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Proxy(format!("CONNECT {authority} via {proxy} failed: {e}")))?;
        if resp.status() != StatusCode::OK {
            return Err(ProbeError::Proxy(format!(
                "tunnel connection to {authority} failed: {}",
                resp.status()
            )));
        }
        let upgraded = hyper::upgrade::on(resp)
            .await
            .map_err(|e| ProbeError::Proxy(format!("tunnel to {authority} failed: {e}")))?;
        Ok(TokioIo::new(upgraded))
    }

    async fn tls_handshake<S>(
        &self,
        target: &Target,
        io: S,
    ) -> Result<tokio_rustls::client::TlsStream<S>, ProbeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|e| ProbeError::Tls(format!("invalid server name {}: {e}", target.host)))?;
        self.tls
            .connect(server_name, io)
            .await
            .map_err(|e| ProbeError::Tls(e.to_string()))
    }

    fn request(&self, target: &Target) -> Result<Request<Empty<Bytes>>, ProbeError> {
        // Plain HTTP through a proxy goes out in absolute-form; everything
        // else reaches the target directly (or via tunnel) in origin-form.
        let request_target = if self.proxy.is_some() && !target.https {
            target.absolute()
        } else {
            target.origin.clone()
        };
        Request::builder()
            .method(Method::GET)
            .uri(request_target.as_str())
            .header(HOST, target.host_header.as_str())
            .header(USER_AGENT, self.user_agent.clone())
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::InvalidUrl {
                url: target.absolute(),
                reason: e.to_string(),
            })
    }
}

impl Prober for HttpProber {
    async fn probe(&self, task: &ProbeTask) -> ProbeResult {
        let target = Target::parse(task.url())?;
        let timeout = task.timeout();
        let started = Instant::now();

        let io = match tokio::time::timeout(timeout, self.connect(&target)).await {
            Ok(io) => io?,
            Err(_) => return Err(ProbeError::ConnectTimeout(timeout)),
        };
        let request = self.request(&target)?;
        // A plain-http request handed to the proxy that fails before any
        // response head arrives never reached the target.
        let failure: fn(String) -> ProbeError = if self.proxy.is_some() && !target.https {
            ProbeError::Proxy
        } else {
            ProbeError::Http
        };

        match tokio::time::timeout(timeout, send(io, request, failure)).await {
            Ok(Ok(status)) => {
                let elapsed = started.elapsed();
                trace!(url = task.url(), %status, ?elapsed, "probe answered");
                Ok(ProbeOutcome::Response {
                    status: status.as_u16(),
                    elapsed,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!(url = task.url(), ?timeout, "probe timed out waiting for response");
                Ok(ProbeOutcome::Timeout)
            }
        }
    }
}

async fn connect_target(target: &Target) -> Result<TcpStream, ProbeError> {
    TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|e| ProbeError::Connect(format!("{}: {e}", target.connect_authority())))
}

async fn connect_proxy(proxy: &ProxyEndpoint) -> Result<TcpStream, ProbeError> {
    TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| ProbeError::Proxy(format!("cannot connect to proxy {proxy}: {e}")))
}

/// Send the request and wait for the response head; the body is not read.
/// Errors raised before the head arrives are wrapped with `failure`.
async fn send(
    io: BoxedIo,
    request: Request<Empty<Bytes>>,
    failure: fn(String) -> ProbeError,
) -> Result<StatusCode, ProbeError> {
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| failure(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let resp = sender
        .send_request(request)
        .await
        .map_err(|e| failure(e.to_string()))?;
    Ok(resp.status())
}

/// TLS client configuration using the Mozilla root certificate store.
pub fn default_tls_config() -> Result<Arc<rustls::ClientConfig>, ProbeError> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| ProbeError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(Arc::new(config))
}
