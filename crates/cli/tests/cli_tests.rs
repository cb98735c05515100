//! CLI integration tests

use chrono::{TimeZone, Utc};
use kmctl::client::{ApiClient, ApiError, ClusterStatus};
use kmctl::commands::{deployments, maintenance, status};
use kmctl::output::OutputFormat;
use mockito::Matcher;
use serde_json::json;
use std::process::{Command, Output};

/// Run the built binary with an isolated home directory
fn kmctl(args: &[&str]) -> Output {
    let home = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_kmctl"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("KMCTL_API_URL")
        .output()
        .expect("Failed to execute kmctl")
}

#[test]
fn test_cli_help() {
    let output = kmctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("kube-monitor"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("deployments"), "Should show deployments command");
    assert!(stdout.contains("config"), "Should show config command");
    assert!(stdout.contains("maintenance"), "Should show maintenance command");
}

#[test]
fn test_cli_version() {
    let output = kmctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("kmctl"), "Should show binary name");
}

#[test]
fn test_schedule_help() {
    let output = kmctl(&["maintenance", "schedule", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for flag in ["--project", "--cluster", "--start", "--end", "--workload"] {
        assert!(stdout.contains(flag), "Should show {} option", flag);
    }
}

#[test]
fn test_status_requires_cluster() {
    let output = kmctl(&["status", "--project", "shop"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--cluster"));
}

#[test]
fn test_schedule_rejects_bad_timestamp() {
    let output = kmctl(&[
        "maintenance",
        "schedule",
        "-p",
        "shop",
        "-c",
        "prod",
        "--start",
        "tonight",
        "--end",
        "2030-05-02T02:00:00Z",
    ]);

    assert!(!output.status.success());
}

#[test]
fn test_deployments_json_against_server() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/deployments")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{
                "project": "shop",
                "cluster": "prod",
                "workloadName": "api",
                "expiration": "2030-05-01T22:03:00Z"
            }])
            .to_string(),
        )
        .create();

    let output = kmctl(&["--api-url", &server.url(), "--format", "json", "deployments"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success());
    assert!(stdout.contains("\"workloadName\": \"api\""));
}

#[test]
fn test_unknown_cluster_exits_nonzero() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/status")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error":"could not find cluster dev in project shop"}"#)
        .create();

    let output = kmctl(&["--api-url", &server.url(), "status", "-p", "shop", "-c", "dev"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr)
        .contains("Not found: could not find cluster dev in project shop"));
}

#[tokio::test]
async fn test_status_sends_query_parameters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/status")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("project".into(), "shop".into()),
            Matcher::UrlEncoded("cluster".into(), "prod".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "project": "shop",
                "cluster": "prod",
                "state": "DEGRADED",
                "issues": ["Deployment api expected 3 replicas, but only 1 ready"],
                "deploymentsActive": []
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = ApiClient::new(&server.url()).unwrap();
    let result: ClusterStatus = status::fetch_status(&client, "shop", "prod").await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.state, "DEGRADED");
    assert_eq!(result.issues.len(), 1);

    tokio_test::assert_ok!(status::show_status(&client, "shop", "prod", OutputFormat::Table).await);
}

#[tokio::test]
async fn test_error_body_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/deployments")
        .with_status(500)
        .with_body(r#"{"error":"cluster client error: boom"}"#)
        .create_async()
        .await;

    let client = ApiClient::new(&server.url()).unwrap();
    let err = deployments::list_deployments(&client, false, OutputFormat::Json)
        .await
        .unwrap_err();

    let api = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api.status, 500);
    assert_eq!(api.message, "cluster client error: boom");
    assert!(!api.is_not_found());
}

#[tokio::test]
async fn test_schedule_posts_request() {
    let mut server = mockito::Server::new_async().await;
    let body = json!({
        "project": "shop",
        "cluster": "prod",
        "startTime": "2030-05-01T22:00:00Z",
        "endTime": "2030-05-02T02:00:00Z",
        "workloadsToScale": ["api", "worker"]
    });
    let mock = server
        .mock("POST", "/maintenance")
        .match_body(Matcher::Json(body.clone()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = ApiClient::new(&server.url()).unwrap();
    let request = maintenance::build_request(
        "shop".to_string(),
        "prod".to_string(),
        Utc.with_ymd_and_hms(2030, 5, 1, 22, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2030, 5, 2, 2, 0, 0).unwrap(),
        vec!["api".to_string(), "worker".to_string()],
    );

    tokio_test::assert_ok!(
        maintenance::schedule_maintenance(&client, request, OutputFormat::Table).await
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_inverted_window_is_not_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/maintenance")
        .expect(0)
        .create_async()
        .await;

    let client = ApiClient::new(&server.url()).unwrap();
    let request = maintenance::build_request(
        "shop".to_string(),
        "prod".to_string(),
        Utc.with_ymd_and_hms(2030, 5, 2, 2, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2030, 5, 1, 22, 0, 0).unwrap(),
        Vec::new(),
    );

    tokio_test::assert_err!(
        maintenance::schedule_maintenance(&client, request, OutputFormat::Json).await
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_maintenance_list_renders_states() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/maintenance")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{
                "maintenanceRequest": {
                    "project": "shop",
                    "cluster": "prod",
                    "startTime": "2030-05-01T22:00:00Z",
                    "endTime": "2030-05-02T02:00:00Z",
                    "workloadsToScale": ["api"]
                },
                "maintenanceStatus": "STARTED",
                "originalReplicaCounts": {"api": 3}
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let client = ApiClient::new(&server.url()).unwrap();
    tokio_test::assert_ok!(maintenance::list_maintenance(&client, OutputFormat::Table).await);
}
