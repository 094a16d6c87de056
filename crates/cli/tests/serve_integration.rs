//! Integration tests for the `goldi` binary.
//!
//! Server tests start `goldi serve` as a child process on a unique port and
//! only hit endpoints that never reach the model.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Base port is derived from the process id so separate test binaries
/// don't collide on the same range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn goldi() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_goldi"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    for var in ["GOLDI_PORT", "GOLDI_RATE_LIMIT", "GOLDI_MODEL", "ANTHROPIC_API_KEY"] {
        cmd.env_remove(var);
    }
    cmd
}

/// Kills the server when a test finishes, pass or fail.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn start_server() -> Server {
    let port = next_port();
    let child = goldi()
        .env("ANTHROPIC_API_KEY", "test-key")
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start goldi serve");

    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server { child, port }
}

fn http(port: u16, method: &str, path: &str, body: Option<&str>) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let body = body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        port,
        body.len(),
        body
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_http_response(&response)
}

/// Parse an HTTP response into (status_code, JSON body).
fn parse_http_response(response: &str) -> (u16, serde_json::Value) {
    let status = response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b)
        .unwrap_or("");
    (status, serde_json::from_str(body).unwrap_or(serde_json::Value::Null))
}

#[test]
fn serve_health() {
    let server = start_server();
    let (status, body) = http(server.port, "GET", "/health", None);
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[test]
fn serve_unknown_route() {
    let server = start_server();
    let (status, body) = http(server.port, "GET", "/contracts", None);
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[test]
fn serve_blank_problem_is_rejected() {
    let server = start_server();
    let (status, body) = http(
        server.port,
        "POST",
        "/problems/validate",
        Some(r#"{"problemInput":"   "}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "MISSING_INPUT");
}

#[test]
fn serve_workflow_on_unknown_project() {
    let server = start_server();
    let (status, body) = http(
        server.port,
        "POST",
        "/workflows/user-stories",
        Some(r#"{"projectId":"nowhere"}"#),
    );
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "PROJECT_NOT_FOUND");
    assert!(body["error"]["message"].as_str().unwrap().contains("nowhere"));
}

#[test]
fn serve_history_of_empty_project() {
    let server = start_server();
    let (status, body) = http(server.port, "GET", "/projects/p-1/events", None);
    assert_eq!(status, 200);
    assert_eq!(body["events"], serde_json::json!([]));

    let (status, body) = http(server.port, "GET", "/projects/p-1/executions", None);
    assert_eq!(status, 200);
    assert_eq!(body["executions"], serde_json::json!([]));
}

#[test]
fn serve_selecting_unknown_solution() {
    let server = start_server();
    let (status, body) = http(
        server.port,
        "PUT",
        "/projects/p-1/selected-solutions",
        Some(r#"{"solutionIds":["s-x"]}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "UNKNOWN_SOLUTION");
}

#[test]
fn serve_requires_api_key() {
    let output = goldi()
        .arg("serve")
        .arg("--port")
        .arg(next_port().to_string())
        .output()
        .expect("failed to run goldi");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ANTHROPIC_API_KEY"), "{stderr}");
}

#[test]
fn config_prints_defaults_with_key_redacted() {
    let output = goldi()
        .env("ANTHROPIC_API_KEY", "sk-secret")
        .env("GOLDI_RATE_LIMIT", "7")
        .arg("config")
        .output()
        .expect("failed to run goldi");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("sk-secret"));

    let config: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(config["server"]["port"], 8080);
    assert_eq!(config["server"]["rate_limit"], 7);
    assert_eq!(config["llm"]["api_key"], "<redacted>");
    assert_eq!(config["pipeline"]["persona_count"], 5);
}

#[test]
fn config_rejects_invalid_file() {
    let output = goldi()
        .arg("config")
        .arg("--config")
        .arg("does-not-exist.toml")
        .output()
        .expect("failed to run goldi");
    assert!(!output.status.success());
}
