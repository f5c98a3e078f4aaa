//! `hyper`-backed transport for the Inferable control plane.

use std::sync::Arc;
use std::{fmt, time::Duration};

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::time::timeout;
use tracing::debug;
use url::Url;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{FetchRequest, FetchResponse, Transport, TransportError, TransportResult};

/// Configuration for [`HttpTransport`].
#[derive(Clone)]
pub struct HttpTransportConfig {
    endpoint: String,
    secret: String,
    timeout: Duration,
    pool_idle_timeout: Duration,
}

impl fmt::Debug for HttpTransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransportConfig")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransportConfig {
    /// Creates a configuration for the supplied endpoint and bearer secret.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] if the endpoint is not an
    /// absolute `http://` or `https://` URL.
    pub fn new(endpoint: impl AsRef<str>, secret: impl Into<String>) -> TransportResult<Self> {
        Ok(Self {
            endpoint: sanitize_endpoint(endpoint.as_ref())?,
            secret: secret.into(),
            timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
        })
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how long idle pooled connections are kept open. Pollers and the
    /// heartbeat share one pool.
    #[must_use]
    pub fn with_pool_idle_timeout(mut self, idle: Duration) -> Self {
        self.pool_idle_timeout = idle;
        self
    }

    /// Returns the sanitized endpoint, without a trailing slash.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

type ControlPlaneClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Transport that issues requests over HTTP(S) with a bearer credential.
pub struct HttpTransport {
    client: ControlPlaneClient,
    endpoint: String,
    secret: String,
    timeout: Duration,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Constructs a transport from the supplied configuration.
    #[must_use]
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            client: pooled_client(config.pool_idle_timeout),
            endpoint: config.endpoint,
            secret: config.secret,
            timeout: config.timeout,
        }
    }

    fn build_uri(&self, request: &FetchRequest) -> TransportResult<Uri> {
        let path = request.path();
        let raw = if path.starts_with('/') {
            format!("{}{path}", self.endpoint)
        } else {
            format!("{}/{path}", self.endpoint)
        };

        let mut url = Url::parse(&raw)
            .map_err(|err| TransportError::invalid_request(format!("invalid URL {raw}: {err}")))?;
        if !request.query().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query());
        }

        url.as_str()
            .parse::<Uri>()
            .map_err(|err| TransportError::invalid_request(format!("invalid URL {url}: {err}")))
    }

    fn build_request(&self, request: &FetchRequest) -> TransportResult<Request<Body>> {
        let uri = self.build_uri(request)?;

        let mut builder = Request::builder()
            .method(request.method().clone())
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", self.secret));

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = match request.body() {
            Some(bytes) if !bytes.is_empty() => {
                if request.header(CONTENT_TYPE.as_str()).is_none() {
                    builder = builder.header(CONTENT_TYPE, "application/json");
                }
                Body::from(bytes.to_vec())
            }
            _ => Body::empty(),
        };

        builder
            .body(body)
            .map_err(|err| TransportError::invalid_request(format!("failed to build request: {err}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> TransportResult<FetchResponse> {
        let method = request.method().clone();
        let path = request.path().to_owned();
        let request = self.build_request(&request)?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| TransportError::transport(format!("{method} {path} timed out")))?
            .map_err(|err| TransportError::transport(format!("{method} {path} failed: {err}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body()).await.map_err(|err| {
            TransportError::response(format!("failed to read {method} {path} response: {err}"))
        })?;

        debug!(%method, %path, %status, bytes = body.len(), "control plane response");

        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(FetchResponse::new(status, headers, body))
    }
}

fn webpki_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|root| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            root.subject,
            root.spki,
            root.name_constraints,
        )
    }));
    roots
}

// Accepts both schemes: self-hosted control planes often run on plain HTTP.
fn pooled_client(pool_idle_timeout: Duration) -> ControlPlaneClient {
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_roots())
        .with_no_client_auth();

    let mut tcp = HttpConnector::new();
    tcp.enforce_http(false);
    tcp.set_nodelay(true);

    Client::builder()
        .pool_idle_timeout(pool_idle_timeout)
        .build(HttpsConnector::from((tcp, Arc::new(tls))))
}

fn sanitize_endpoint(input: &str) -> TransportResult<String> {
    let trimmed = input.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(TransportError::configuration(format!(
            "invalid URL: {trimmed} (endpoint must start with http:// or https://)"
        )));
    }

    Url::parse(trimmed)
        .map_err(|err| TransportError::configuration(format!("invalid URL {trimmed}: {err}")))?;

    Ok(trimmed.trim_end_matches('/').to_owned())
}
