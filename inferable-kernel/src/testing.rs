//! In-memory transport used by the kernel's unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hyper::header::{HeaderValue, RETRY_AFTER};
use hyper::{Method, StatusCode};
use inferable_transport::{FetchRequest, FetchResponse, Transport, TransportError, TransportResult};
use serde_json::Value;

type Responder = Box<dyn Fn(&FetchRequest) -> TransportResult<FetchResponse> + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    responder: Responder,
}

impl Route {
    fn matches(&self, request: &FetchRequest) -> bool {
        if *request.method() != self.method {
            return false;
        }
        match self.path.strip_suffix('*') {
            Some(prefix) => request.path().starts_with(prefix),
            None => request.path() == self.path,
        }
    }
}

/// Records every request and answers from a list of routes. A path ending in
/// `*` matches by prefix; unmatched requests fail with a 404 status.
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on<F>(&self, method: Method, path: &str, responder: F)
    where
        F: Fn(&FetchRequest) -> TransportResult<FetchResponse> + Send + Sync + 'static,
    {
        self.routes.lock().unwrap().push(Route {
            method,
            path: path.to_owned(),
            responder: Box::new(responder),
        });
    }

    pub(crate) fn on_json(&self, method: Method, path: &str, body: Value) {
        self.on(method, path, move |_| FetchResponse::json_ok(&body));
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, method: &Method, prefix: &str) -> Vec<FetchRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method() == method && request.path().starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: FetchRequest) -> TransportResult<FetchResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let routes = self.routes.lock().unwrap();
        match routes.iter().find(|route| route.matches(&request)) {
            Some(route) => (route.responder)(&request),
            None => Err(TransportError::Status {
                status: StatusCode::NOT_FOUND,
                body: format!("no route for {} {}", request.method(), request.path()),
            }),
        }
    }
}

/// Builds a `200 OK` JSON response carrying a `Retry-After` header.
pub(crate) fn json_with_retry_after(body: &Value, retry_after: Duration) -> FetchResponse {
    let mut response = FetchResponse::json_ok(body).unwrap();
    response.headers_mut().insert(
        RETRY_AFTER,
        HeaderValue::from_str(&retry_after.as_secs().to_string()).unwrap(),
    );
    response
}
