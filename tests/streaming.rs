mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::KID;

async fn harness() -> (Router, MockServer, TempDir) {
    let server = MockServer::start().await;
    common::mount_jwks(&server, vec![common::jwk(7, KID)]).await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Oslo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Oslo",
            "sys": {"country": "NO"},
            "main": {"temp": 3.04, "feels_like": 0.2, "humidity": 88, "pressure": 1009},
            "weather": [{"main": "Snow", "description": "light snow"}],
            "wind": {"speed": 2.1},
            "dt": 1700000000
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Atlantis"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let files = tempfile::tempdir().unwrap();
    let app = common::router(&common::config(&server, files.path())).await;
    (app, server, files)
}

fn query(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// `(event, data)` pairs in arrival order.
async fn events(app: &Router, request: Request<Body>) -> Vec<(String, Value)> {
    let response = common::send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    text.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event: ") {
                    name = Some(v.to_string());
                } else if let Some(v) = line.strip_prefix("data: ") {
                    data = Some(serde_json::from_str(v).unwrap());
                }
            }
            Some((name?, data?))
        })
        .collect()
}

fn names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

#[tokio::test]
async fn weather_stream_reports_progress_then_result() {
    let (app, _server, _files) = harness().await;

    let request = Request::get(format!("/stream/weather?{}", query(&[("city", "Oslo")])))
        .header(header::AUTHORIZATION, format!("Bearer {}", common::token_for("alice")))
        .body(Body::empty())
        .unwrap();
    let events = events(&app, request).await;

    assert_eq!(names(&events), ["status", "progress", "progress", "progress", "complete"]);
    assert_eq!(events[0].1["status"], "starting");
    assert_eq!(events[0].1["metadata"]["params"]["city"], "Oslo");

    let stages: Vec<_> = events[1..4].iter().map(|(_, d)| (d["stage"].clone(), d["progress"].clone())).collect();
    assert_eq!(
        stages,
        [
            (json!("validation"), json!(10)),
            (json!("execution"), json!(50)),
            (json!("processing"), json!(90)),
        ]
    );

    let complete = &events[4].1;
    assert_eq!(complete["success"], true);
    assert_eq!(complete["result"]["city"], "Oslo");
    assert_eq!(complete["result"]["temperature_celsius"], 3.0);
    assert!(complete["duration_ms"].is_number());
    assert!(complete["completed_at"].is_string());
}

#[tokio::test]
async fn query_token_is_accepted_on_stream_routes() {
    let (app, _server, _files) = harness().await;
    let token = common::token_for("alice");

    let request = Request::get(format!(
        "/stream/weather?{}",
        query(&[("city", "Atlantis"), ("token", &token)])
    ))
    .body(Body::empty())
    .unwrap();
    let events = events(&app, request).await;

    assert_eq!(names(&events), ["status", "progress", "progress", "error"]);
    let error = &events[3].1;
    assert_eq!(error["code"], -32009);
    assert_eq!(error["message"], "City not found: Atlantis");
    assert!(error["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn query_token_is_ignored_outside_stream_routes() {
    let (app, _server, _files) = harness().await;
    let token = common::token_for("alice");

    let request = Request::post(format!("/mcp?{}", query(&[("token", &token)])))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string()))
        .unwrap();
    let response = common::send(&app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        common::body_json(response).await,
        json!({"error": "unauthorized", "message": "Missing Authorization header"})
    );
}

#[tokio::test]
async fn stream_routes_still_require_a_valid_token() {
    let (app, _server, _files) = harness().await;

    let anonymous = Request::get("/stream/weather?city=Oslo").body(Body::empty()).unwrap();
    let response = common::send(&app, anonymous).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let expired = common::sign(7, KID, &common::claims("alice", -60));
    let request = Request::get(format!("/stream/weather?{}", query(&[("city", "Oslo"), ("token", &expired)])))
        .body(Body::empty())
        .unwrap();
    let response = common::send(&app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(common::body_json(response).await["message"], "Token has expired");
}

#[tokio::test]
async fn file_stream_writes_inside_the_allowed_directory() {
    let (app, _server, files) = harness().await;
    let token = common::token_for("alice");
    let target = files.path().join("streamed.txt");
    let target = target.display().to_string();

    let write = Request::get(format!(
        "/stream/file?{}",
        query(&[("operation", "write"), ("filepath", &target), ("content", "from a stream")])
    ))
    .header(header::AUTHORIZATION, format!("Bearer {token}"))
    .body(Body::empty())
    .unwrap();
    let write_events = events(&app, write).await;
    assert_eq!(names(&write_events).last(), Some(&"complete"));
    assert_eq!(write_events.last().unwrap().1["result"]["bytes_written"], 13);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "from a stream");

    let outside = Request::get(format!(
        "/stream/file?{}",
        query(&[("operation", "read"), ("filepath", "/etc/passwd.txt")])
    ))
    .header(header::AUTHORIZATION, format!("Bearer {token}"))
    .body(Body::empty())
    .unwrap();
    let events = events(&app, outside).await;
    assert_eq!(names(&events).last(), Some(&"error"));
    assert_eq!(events.last().unwrap().1["code"], -32002);
}
