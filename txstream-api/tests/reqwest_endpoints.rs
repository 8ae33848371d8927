use assert_matches::assert_matches;
use bytes::Bytes;
use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use txstream_api::ApiError;
use txstream_api::BitbusClient;
use txstream_api::BitfsClient;
use txstream_api::BitfsUri;
use txstream_api::BitsocketClient;
use txstream_api::Provider;
use txstream_api::ReqwestTransport;
use txstream_api::StaticToken;
use txstream_api::Status;
use txstream_api::query;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(reqwest::Client::new())
}

#[tokio::test]
async fn bitbus_fetch_streams_ndjson_with_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/block"))
        .and(header("token", "secret"))
        .and(body_json(json!({"v": 3, "q": {"find": {"out.s2": "B"}, "limit": 2}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"tx\":{\"h\":\"a\"}}\n{\"tx\":{\"h\":\"b\"}}"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = BitbusClient::new(
        transport(),
        Provider::new("bitbus", server.uri()),
        StaticToken::new("secret"),
    );
    let records = client
        .fetch(json!({"find": {"out.s2": "B"}, "limit": 2}))
        .await
        .expect("fetch");

    assert_eq!(
        records,
        vec![json!({"tx": {"h": "a"}}), json!({"tx": {"h": "b"}})]
    );
}

#[tokio::test]
async fn bitbus_without_token_surfaces_forbidden() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/block"))
        .respond_with(ResponseTemplate::new(403).set_body_string("token required"))
        .mount(&server)
        .await;

    let client = BitbusClient::new(
        transport(),
        Provider::new("bitbus", server.uri()),
        StaticToken::anonymous(),
    );
    let err = client.fetch(json!({"find": {}})).await.unwrap_err();

    assert_matches!(
        &err,
        ApiError::Protocol { status, body } if *status == StatusCode::FORBIDDEN && body == "token required"
    );
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
}

#[tokio::test]
async fn bitbus_status_reads_the_chain_tip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"height": 650000, "hash": "0000abc"})),
        )
        .mount(&server)
        .await;

    let client = BitbusClient::new(
        transport(),
        Provider::new("bitbus", server.uri()),
        StaticToken::anonymous(),
    );
    assert_eq!(
        client.status().await.expect("status"),
        Status {
            height: 650000,
            hash: Some("0000abc".to_string())
        }
    );
}

#[tokio::test]
async fn bitsocket_listen_decodes_the_event_stream() {
    let server = MockServer::start().await;
    let encoded = query::encode_path(json!({"find": {}})).expect("encode");
    let body = concat!(
        "data: {\"type\":\"open\",\"data\":[]}\n\n",
        "id: 5\n",
        "data: {\"type\":\"push\",\"data\":[{\"tx\":{\"h\":\"m\"}}]}\n\n",
    );
    Mock::given(method("GET"))
        .and(path(format!("/s/{encoded}")))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = BitsocketClient::new(
        transport(),
        Provider::new("bitsocket", server.uri()),
        StaticToken::anonymous(),
    );
    let mut handle = client.listen(json!({"find": {}}), None).await.expect("listen");
    let record = handle.next_record().await.expect("record").expect("ok");
    assert_eq!(record.into_json(), Some(json!({"tx": {"h": "m"}})));
    assert_eq!(handle.last_event_id().as_deref(), Some("5"));
}

#[tokio::test]
async fn bitfs_fetch_concatenates_the_raw_body() {
    let server = MockServer::start().await;
    let tx = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
    let payload = vec![0u8, 159, 146, 150, 255];
    Mock::given(method("GET"))
        .and(path(format!("/{tx}.out.0.3")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let client = BitfsClient::new(
        transport(),
        Provider::new("bitfs", server.uri()),
        StaticToken::anonymous(),
    );
    let uri = BitfsUri::parse(&format!("bitfs://{tx}.out.0.3")).expect("uri");
    assert_eq!(client.fetch(&uri).await.expect("fetch"), Bytes::from(payload));
}
