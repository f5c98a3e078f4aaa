use std::time::Duration;

use inferable::{
    ClientOptions, Function, FunctionMetadata, Inferable, InferableError, ServiceState,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
struct ReverseInput {
    input: String,
}

#[derive(Deserialize, JsonSchema)]
struct DivideInput {
    a: f64,
    b: f64,
}

fn options(server: &MockServer) -> ClientOptions {
    ClientOptions::new("sk_test")
        .with_api_endpoint(server.uri())
        .with_machine_id("rs-integration")
        .with_initial_poll_backoff(Duration::from_millis(10))
        .with_heartbeat_interval(Duration::from_secs(60))
        .with_request_timeout(Duration::from_secs(5))
}

async fn requests_to(
    server: &MockServer,
    http_method: &str,
    prefix: &str,
) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| {
            request.method.as_str() == http_method && request.url.path().starts_with(prefix)
        })
        .collect()
}

#[tokio::test]
async fn server_ok_checks_live_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .and(header("authorization", "Bearer sk_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let client = Inferable::new(options(&server)).unwrap();
    client.server_ok().await.unwrap();
    client.shutdown().await;
}

#[tokio::test]
async fn server_ok_rejects_other_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "starting" })))
        .mount(&server)
        .await;

    let client = Inferable::new(options(&server)).unwrap();
    let err = client.server_ok().await.expect_err("not ok");
    assert!(matches!(err, InferableError::ControlPlane(_)));
    assert!(err.to_string().contains("starting"));
    client.shutdown().await;
}

#[tokio::test]
async fn heartbeat_pings_registered_services() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/ping"))
        .and(body_json(json!({ "services": ["default"] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let client = Inferable::new(options(&server)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.shutdown().await;

    let pings = requests_to(&server, "POST", "/v2/ping").await;
    assert_eq!(pings[0].headers.get("x-machine-id").unwrap(), "rs-integration");
    assert_eq!(pings[0].headers.get("x-machine-sdk-language").unwrap(), "rust");
}

#[tokio::test]
async fn service_handles_calls_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/machines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "clusterId": "c1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clusters/c1/calls"))
        .and(query_param("acknowledge", "true"))
        .and(query_param("service", "default"))
        .and(query_param("status", "pending"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "call-1", "function": "reverse", "input": { "Input": "Hello, Inferable!" } },
            { "id": "call-2", "function": "unknown", "input": {} },
            { "id": "call-3", "function": "divide", "input": { "a": 1, "b": 0 } }
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clusters/c1/calls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/clusters/c1/calls/call-1/result"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/clusters/c1/calls/call-3/result"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = Inferable::new(options(&server)).unwrap();
    let service = client.default_service();
    service
        .register_func(Function::infallible(
            FunctionMetadata::new("reverse")
                .unwrap()
                .with_description("Reverses a message"),
            |input: ReverseInput| input.input.chars().rev().collect::<String>(),
        ))
        .unwrap();
    service
        .register_func(Function::new(
            FunctionMetadata::new("divide").unwrap(),
            |input: DivideInput| {
                if input.b == 0.0 {
                    Err("division by zero")
                } else {
                    Ok(input.a / input.b)
                }
            },
        ))
        .unwrap();

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Polling);
    assert_eq!(service.cluster_id().as_deref(), Some("c1"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    client.shutdown().await;
    assert_eq!(service.state(), ServiceState::Stopped);

    let registration = &requests_to(&server, "POST", "/machines").await[0];
    assert_eq!(registration.headers.get("x-machine-id").unwrap(), "rs-integration");
    let body: Value = registration.body_json().unwrap();
    assert_eq!(body["service"], "default");
    let names: Vec<_> = body["functions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|function| function["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["divide", "reverse"]);
    let schema: Value =
        serde_json::from_str(body["functions"][1]["schema"].as_str().unwrap()).unwrap();
    assert_eq!(schema["required"], json!(["Input"]));

    let resolved: Value = requests_to(&server, "POST", "/clusters/c1/calls/call-1/result").await[0]
        .body_json()
        .unwrap();
    assert_eq!(resolved["result"], "!elbarefnI ,olleH");
    assert_eq!(resolved["resultType"], "resolution");
    assert!(resolved["meta"]["functionExecutionTime"].is_u64());

    let rejected: Value = requests_to(&server, "POST", "/clusters/c1/calls/call-3/result").await[0]
        .body_json()
        .unwrap();
    assert_eq!(rejected["result"], "division by zero");
    assert_eq!(rejected["resultType"], "rejection");

    assert!(
        requests_to(&server, "POST", "/clusters/c1/calls/call-2/")
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn failed_handshake_keeps_service_unregistered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/machines"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad secret"))
        .mount(&server)
        .await;

    let client = Inferable::new(options(&server)).unwrap();
    let service = client.register_service("math").unwrap();
    service
        .register_func(Function::infallible(
            FunctionMetadata::new("reverse").unwrap(),
            |input: ReverseInput| input.input,
        ))
        .unwrap();

    let err = service.start().await.expect_err("handshake rejected");
    assert!(err.to_string().contains("bad secret"));
    assert_eq!(service.state(), ServiceState::Unregistered);
    client.shutdown().await;
}
