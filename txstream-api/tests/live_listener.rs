mod common;

use assert_matches::assert_matches;
use common::Journal;
use common::Reply;
use common::ScriptedTransport;
use http::Method;
use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use txstream_api::ApiError;
use txstream_api::LiveListener;
use txstream_api::endpoint::bitsocket::LAST_EVENT_ID_HEADER;

fn header(req: &txstream_client::Request, name: &str) -> Option<String> {
    req.headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[tokio::test(start_paused = true)]
async fn idle_stream_is_recycled_from_the_last_event_id() {
    let first = format!(
        "{}{}",
        common::push_event("41", &[json!({"tx": {"h": "a"}})]),
        common::push_event("42", &[json!({"tx": {"h": "b"}})]),
    );
    let second = common::push_event("43", &[json!({"tx": {"h": "c"}})]);
    let transport = ScriptedTransport::new(Journal::default()).route(
        Method::GET,
        "/s/",
        vec![Reply::sse(&first), Reply::sse(&second)],
    );
    let client = common::bitsocket(transport.clone(), Duration::from_secs(60));
    let mut listener = LiveListener::new(client, json!({ "find": {} }));

    let mut seen = Vec::new();
    for _ in 0..3 {
        let record = listener.next().await.expect("record").expect("ok");
        seen.push(record["tx"]["h"].clone());
    }
    assert_eq!(seen, vec![json!("a"), json!("b"), json!("c")]);
    assert_eq!(listener.recycles(), 1);
    assert_eq!(listener.last_event_id(), Some("43"));

    let requests = transport.requests_to("/s/");
    assert_eq!(requests.len(), 2);
    assert_eq!(
        header(&requests[0], "accept").as_deref(),
        Some("text/event-stream")
    );
    assert_eq!(header(&requests[0], LAST_EVENT_ID_HEADER), None);
    assert_eq!(
        header(&requests[1], LAST_EVENT_ID_HEADER).as_deref(),
        Some("42")
    );
    assert_eq!(transport.cancelled(), vec![true, false]);
}

fn two_stalling_pushes() -> ScriptedTransport {
    ScriptedTransport::new(Journal::default()).route(
        Method::GET,
        "/s/",
        vec![
            Reply::sse(&common::push_event("1", &[json!({"tx": {"h": "a"}})])),
            Reply::sse(&common::push_event("2", &[json!({"tx": {"h": "b"}})])),
        ],
    )
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_comes_from_the_provider() {
    let transport = two_stalling_pushes();
    let client = common::bitsocket(transport.clone(), Duration::from_secs(5));
    let mut listener = LiveListener::new(client, json!({ "find": {} }));

    assert_matches!(listener.next().await, Some(Ok(_)));
    let stalled_at = Instant::now();
    assert_matches!(listener.next().await, Some(Ok(record)) if record["tx"]["h"] == "b");

    let waited = stalled_at.elapsed();
    assert!(
        waited >= Duration::from_secs(5) && waited < Duration::from_secs(6),
        "recycled after {waited:?}"
    );
    assert_eq!(listener.recycles(), 1);
    assert_eq!(transport.requests_to("/s/").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn explicit_idle_timeout_overrides_the_provider() {
    let transport = two_stalling_pushes();
    let client = common::bitsocket(transport.clone(), Duration::from_secs(300));
    let mut listener = LiveListener::new(client, json!({ "find": {} }))
        .with_idle_timeout(Duration::from_secs(2));

    assert_matches!(listener.next().await, Some(Ok(_)));
    let stalled_at = Instant::now();
    assert_matches!(listener.next().await, Some(Ok(_)));

    let waited = stalled_at.elapsed();
    assert!(
        waited >= Duration::from_secs(2) && waited < Duration::from_secs(3),
        "recycled after {waited:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn resumes_from_a_given_event_id() {
    let transport = ScriptedTransport::new(Journal::default()).route(
        Method::GET,
        "/s/",
        vec![Reply::sse(&common::push_event("8", &[json!({"n": 1})]))],
    );
    let client = common::bitsocket(transport.clone(), Duration::from_secs(60));
    let mut listener = LiveListener::new(client, json!({ "find": {} }))
        .resume_from(Some("7".to_string()));

    assert_eq!(
        listener.next().await.map(|r| r.ok()),
        Some(Some(json!({"n": 1})))
    );
    let requests = transport.requests_to("/s/");
    assert_eq!(
        header(&requests[0], LAST_EVENT_ID_HEADER).as_deref(),
        Some("7")
    );
}

#[tokio::test(start_paused = true)]
async fn listen_error_is_returned_not_recycled() {
    let transport = ScriptedTransport::new(Journal::default()).route(
        Method::GET,
        "/s/",
        vec![Reply::status(StatusCode::FORBIDDEN)],
    );
    let client = common::bitsocket(transport.clone(), Duration::from_secs(60));
    let mut listener = LiveListener::new(client, json!({ "find": {} }));

    assert_matches!(
        listener.next().await,
        Some(Err(ApiError::Protocol { status, .. })) if status == StatusCode::FORBIDDEN
    );
    assert_eq!(listener.recycles(), 0);
}

#[tokio::test]
async fn listen_path_carries_the_encoded_query() {
    let transport = ScriptedTransport::new(Journal::default()).route(
        Method::GET,
        "/s/",
        vec![Reply::sse(&common::push_event("1", &[json!(1)]))],
    );
    let client = common::bitsocket(transport.clone(), Duration::from_secs(60));
    let mut handle = client
        .listen(json!({ "find": {} }), None)
        .await
        .expect("listen");
    assert_matches!(handle.next_record().await, Some(Ok(_)));

    let expected = txstream_api::query::encode_path(json!({ "find": {} })).expect("encode");
    assert_eq!(
        common::url_path(&transport.requests()[0].url),
        format!("/s/{expected}")
    );
}
