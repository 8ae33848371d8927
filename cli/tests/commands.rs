use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use txstream_api::crossover::CrossoverError;
use txstream_api::crossover::RecordKind;
use txstream_cli::Clients;
use txstream_cli::config::ScrapeConfig;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::path_regex;

/// Stdout whose reader has gone away.
struct ClosedStdout;

impl Write for ClosedStdout {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn config_for(server: &MockServer, dir: &TempDir) -> ScrapeConfig {
    let mut config = ScrapeConfig::default();
    config.endpoints.bitbus = server.uri();
    config.endpoints.bitsocket = server.uri();
    config.endpoints.bitfs = server.uri();
    config.checkpoint = dir.path().join("tape.json");
    config
}

#[tokio::test]
async fn scrape_stops_without_saving_when_output_fails() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"height": 105})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/block"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"tx\":{\"h\":\"a\"}}\n{\"tx\":{\"h\":\"b\"}}\n"),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new()?;
    let mut config = config_for(&server, &dir);
    config.crossover.from = 100;
    let checkpoint = config.checkpoint.clone();

    let err = txstream_cli::run_scrape(config, ClosedStdout, CancellationToken::new())
        .await
        .unwrap_err();

    assert_matches!(
        err.downcast_ref::<CrossoverError>(),
        Some(CrossoverError::Handler {
            kind: RecordKind::Confirmed,
            ..
        })
    );
    assert!(!checkpoint.exists());
    Ok(())
}

#[tokio::test]
async fn listen_pauses_before_reconnecting() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let push = json!({"type": "push", "data": [{"tx": {"h": "a"}}]});
    Mock::given(method("GET"))
        .and(path_regex("^/s/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(format!("id: 1\ndata: {push}\n\n")),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new()?;
    let clients = Clients::new(&config_for(&server, &dir));

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        trigger.cancel();
    });
    let last_event_id = txstream_cli::run_listen(
        &clients,
        json!({"find": {}}),
        None,
        Duration::from_millis(250),
        Vec::new(),
        shutdown,
    )
    .await?;

    assert_eq!(last_event_id.as_deref(), Some("1"));
    let connections = server
        .received_requests()
        .await
        .unwrap_or_default()
        .len();
    assert!(
        (2..=4).contains(&connections),
        "{connections} connections in 600ms"
    );
    Ok(())
}
