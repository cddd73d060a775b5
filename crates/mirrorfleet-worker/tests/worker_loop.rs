//! End-to-end worker loop: a command provider syncing against a mock
//! coordinator.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mirrorfleet_api::{ClientCmd, CmdVerb};
use mirrorfleet_worker::{Config, Worker};

async fn mock_coordinator() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/job/unit"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/job/unit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/job/unit"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/job/unit/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn force_start_runs_a_sync_and_reports_success() {
    let server = mock_coordinator().await;
    let dir = tempfile::tempdir().unwrap();

    let cfg = Config {
        name: "unit".into(),
        provider: "command".into(),
        upstream: "https://example.org/repo".into(),
        command: "echo synced".into(),
        mirror_dir: dir.path().join("data").display().to_string(),
        log_dir: dir.path().join("log").display().to_string(),
        api: server.uri(),
        addr: "127.0.0.1:0".into(),
        interval: 1,
        retry: 1,
        concurrent: 1,
        ..Default::default()
    };

    let worker = Worker::new(cfg).unwrap();
    let run = tokio::spawn(worker.clone().run());

    // give registration and state restore a moment
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(
        worker
            .handle_client_cmd(ClientCmd {
                cmd: CmdVerb::Start,
                force: true,
            })
            .await
    );

    let mut reported = false;
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        reported = requests.iter().any(|r| {
            r.method.as_str() == "PATCH"
                && String::from_utf8_lossy(&r.body).contains("\"success\"")
        });
        if reported {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(reported, "worker never reported a successful sync");

    // registration happened exactly once at startup
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.method.as_str() == "HEAD")
            .count(),
        1
    );

    worker.halt().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), run).await;
}

#[tokio::test]
async fn control_endpoint_accepts_commands_and_serves_logs() {
    let server = mock_coordinator().await;
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("log");

    let cfg = Config {
        name: "unit".into(),
        provider: "command".into(),
        upstream: "https://example.org/repo".into(),
        command: "true".into(),
        mirror_dir: dir.path().join("data").display().to_string(),
        log_dir: log_dir.display().to_string(),
        api: server.uri(),
        addr: "127.0.0.1:0".into(),
        concurrent: 1,
        ..Default::default()
    };

    let worker = Worker::new(cfg).unwrap();
    let listener = mirrorfleet_worker::server::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mirrorfleet_worker::server::serve(listener, worker.clone()));

    let http = reqwest::Client::new();
    let base = format!("http://{addr}");

    // no log yet
    let resp = http.get(format!("{base}/log")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    std::fs::create_dir_all(&log_dir).unwrap();
    std::fs::write(log_dir.join("latest.log"), "sync output\n").unwrap();
    let resp = http.get(format!("{base}/log")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "sync output\n");

    // ping is accepted, unknown verbs are not
    let resp = http
        .post(format!("{base}/"))
        .json(&serde_json::json!({"cmd": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = http
        .post(format!("{base}/"))
        .json(&serde_json::json!({"cmd": "reload"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 406);
}

#[tokio::test]
async fn unknown_commands_are_rejected() {
    let server = mock_coordinator().await;
    let dir = tempfile::tempdir().unwrap();

    let cfg = Config {
        name: "unit".into(),
        provider: "command".into(),
        upstream: "https://example.org/repo".into(),
        command: "true".into(),
        mirror_dir: dir.path().join("data").display().to_string(),
        log_dir: dir.path().join("log").display().to_string(),
        api: server.uri(),
        addr: "127.0.0.1:0".into(),
        ..Default::default()
    };

    let worker = Worker::new(cfg).unwrap();
    assert!(
        !worker
            .handle_client_cmd(ClientCmd {
                cmd: CmdVerb::Unknown,
                force: false,
            })
            .await
    );
}
