//! End-to-end tests for the server over in-memory streams.
//!
//! These tests verify:
//! - Request/response correlation and id preservation
//! - Notifications never produce a response
//! - Error mapping for malformed lines, unknown tools and resources
//! - Acquisition timing with and without hardware (paused clock)
//! - Shutdown, exit and end-of-input lifecycle

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use sensormcp_core::McpResult;
use sensormcp_device::{
    ActivityLog, CO2_SIMULATED_RANGE, HardwareEndpoint, HardwareLink, PortDescriptor,
    ReadingStatus, SensorEngine,
};
use sensormcp_protocol::{Content, Tool};
use sensormcp_transport::{LineCodec, LineReader, ResponseEmitter};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::handler::{DeviceContext, ToolHandler};
use crate::{Server, StopReason};

const PIPE_CAPACITY: usize = 64 * 1024;

// ============================================================================
// Harness
// ============================================================================

/// The peer side of a running server.
struct Client {
    writer: DuplexStream,
    lines: Lines<BufReader<DuplexStream>>,
    server: JoinHandle<StopReason>,
}

impl Client {
    fn start(server: Server) -> Self {
        Self::start_with_codec(server, LineCodec::new())
    }

    fn start_with_codec(server: Server, codec: LineCodec) -> Self {
        let (writer, server_in) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_out, client_out) = tokio::io::duplex(PIPE_CAPACITY);
        let server = tokio::spawn(server.run_transport(
            LineReader::with_codec(server_in, codec),
            ResponseEmitter::new(server_out),
            std::future::pending(),
        ));
        Self {
            writer,
            lines: BufReader::new(client_out).lines(),
            server,
        }
    }

    async fn send_raw(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn send_request(&mut self, id: Value, method: &str, params: Option<Value>) {
        let mut message = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(params) = params {
            message["params"] = params;
        }
        self.send(message).await;
    }

    async fn recv(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .unwrap()
            .expect("server closed its output");
        serde_json::from_str(&line).unwrap()
    }

    async fn request(&mut self, id: Value, method: &str, params: Option<Value>) -> Value {
        self.send_request(id, method, params).await;
        self.recv().await
    }

    /// Closes the input and returns the stop reason plus any remaining lines.
    async fn close(self) -> (StopReason, Vec<Value>) {
        let Client {
            writer,
            mut lines,
            server,
        } = self;
        drop(writer);
        let mut rest = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            rest.push(serde_json::from_str(&line).unwrap());
        }
        (server.await.unwrap(), rest)
    }
}

fn simulated_server() -> Server {
    Server::new("sensormcp", "0.1.0").device_catalog().build()
}

fn hardware_server() -> (Server, Arc<SensorEngine>, HardwareEndpoint) {
    let (link, endpoint) = HardwareLink::channel(PortDescriptor {
        path: "/dev/test-sensor".to_string(),
        description: "test".to_string(),
    });
    let engine = Arc::new(SensorEngine::new(Some(link)));
    let server = Server::new("sensormcp", "0.1.0")
        .engine(Arc::clone(&engine))
        .device_catalog()
        .build();
    (server, engine, endpoint)
}

fn emit_after(endpoint: &HardwareEndpoint, delay: Duration, line: &'static str) {
    let lines = endpoint.lines.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = lines.send(line.to_string());
    });
}

/// Extracts the JSON document from a `tools/call` text result.
fn tool_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

/// Extracts the JSON document from a `resources/read` result.
fn resource_payload(response: &Value) -> Value {
    let text = response["result"]["contents"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

fn error_code(response: &Value) -> i64 {
    response["error"]["code"].as_i64().unwrap()
}

fn assert_elapsed(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(50),
        "expected ~{expected:?}, got {actual:?}"
    );
}

// ============================================================================
// Correlation
// ============================================================================

#[tokio::test]
async fn initialize_echoes_version_and_identity() {
    let mut client = Client::start(simulated_server());

    let response = client
        .request(
            json!("init-1"),
            "initialize",
            Some(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "inspector", "version": "1.0"}
            })),
        )
        .await;
    assert_eq!(response["id"], "init-1");
    assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(response["result"]["serverInfo"]["name"], "sensormcp");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["resources"].is_object());

    let response = client.request(json!(2), "initialize", None).await;
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");

    let (reason, rest) = client.close().await;
    assert_eq!(reason, StopReason::EndOfInput);
    assert!(rest.is_empty());
}

#[tokio::test]
async fn ids_are_echoed_with_their_type() {
    let mut client = Client::start(simulated_server());

    let numeric = client.request(json!(7), "tools/list", None).await;
    let string = client.request(json!("7"), "tools/list", None).await;
    let float = client.request(json!(1.5), "tools/list", None).await;

    assert_eq!(numeric["id"], json!(7));
    assert!(numeric["id"].is_u64());
    assert_eq!(string["id"], json!("7"));
    assert_eq!(float["id"], json!(1.5));
}

#[tokio::test]
async fn notifications_are_never_answered() {
    let mut client = Client::start(simulated_server());

    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    client.send(json!({"jsonrpc": "2.0", "method": "initialized"})).await;
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 3}}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/whatever"}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "id": null, "method": "tools/list"}))
        .await;

    let response = client.request(json!(9), "tools/list", None).await;
    assert_eq!(response["id"], 9);

    let (reason, rest) = client.close().await;
    assert_eq!(reason, StopReason::EndOfInput);
    assert!(rest.is_empty(), "unexpected lines: {rest:?}");
}

#[tokio::test]
async fn unknown_method_is_an_empty_success() {
    let mut client = Client::start(simulated_server());
    let response = client.request(json!(1), "prompts/list", None).await;
    assert_eq!(response["result"], json!({}));
    assert!(response.get("error").is_none());
}

#[tokio::test]
async fn catalogs_are_stable() {
    let mut client = Client::start(simulated_server());

    let first = client.request(json!(1), "tools/list", None).await;
    let second = client.request(json!(1), "tools/list", None).await;
    assert_eq!(first.to_string(), second.to_string());
    let names: Vec<&str> = first["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        [
            "get_device_info",
            "get_sensor_data",
            "get_battery_status",
            "get_wifi_status",
            "get_mqtt_status",
            "restart_sensor",
        ]
    );
    for tool in first["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
        assert_eq!(tool["inputSchema"]["properties"], json!({}));
    }

    let first = client.request(json!(2), "resources/list", None).await;
    let second = client.request(json!(2), "resources/list", None).await;
    assert_eq!(first.to_string(), second.to_string());
    let uris: Vec<&str> = first["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert_eq!(
        uris,
        ["device://info", "device://sensor/data", "device://network/status"]
    );
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn malformed_lines_get_errors() {
    let mut client = Client::start(simulated_server());

    client.send_raw("{not json").await;
    let response = client.recv().await;
    assert_eq!(error_code(&response), -32700);
    assert_eq!(response["id"], 0);

    client.send(json!({"id": 4, "method": "tools/list"})).await;
    let response = client.recv().await;
    assert_eq!(error_code(&response), -32600);
    assert_eq!(response["id"], 4);

    client
        .send(json!({"jsonrpc": "2.0", "id": "m", "method": ""}))
        .await;
    let response = client.recv().await;
    assert_eq!(error_code(&response), -32600);
    assert_eq!(response["id"], "m");

    // The loop survives all of the above.
    let response = client.request(json!(5), "tools/list", None).await;
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn oversized_line_is_a_parse_error() {
    let mut client = Client::start_with_codec(simulated_server(), LineCodec::with_max_line_size(64));

    client.send_raw(&"x".repeat(200)).await;
    let response = client.recv().await;
    assert_eq!(error_code(&response), -32700);
    assert_eq!(response["id"], 0);

    let response = client.request(json!(1), "tools/list", None).await;
    assert_eq!(response["id"], 1);
}

#[tokio::test]
async fn tool_and_resource_lookup_errors() {
    let mut client = Client::start(simulated_server());

    let response = client
        .request(json!(1), "tools/call", Some(json!({"name": "nonexistent"})))
        .await;
    assert_eq!(error_code(&response), -32601);

    let response = client
        .request(json!(2), "tools/call", Some(json!({"arguments": {}})))
        .await;
    assert_eq!(error_code(&response), -32602);

    let response = client.request(json!(3), "tools/call", None).await;
    assert_eq!(error_code(&response), -32602);

    let response = client
        .request(json!(4), "resources/read", Some(json!({"uri": "bogus"})))
        .await;
    assert_eq!(error_code(&response), -32602);

    let response = client.request(json!(5), "resources/read", Some(json!({}))).await;
    assert_eq!(error_code(&response), -32602);

    let response = client
        .request(json!(6), "resources/read", Some(json!({"uri": 5})))
        .await;
    assert_eq!(error_code(&response), -32602);
}

struct PanicTool;

impl ToolHandler for PanicTool {
    fn definition(&self) -> Tool {
        Tool {
            name: "explode".to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        }
    }

    fn call(&self, _ctx: &DeviceContext, _arguments: Value) -> McpResult<Vec<Content>> {
        panic!("handler failure");
    }
}

#[tokio::test]
async fn handler_panic_is_an_internal_error() {
    let server = Server::new("sensormcp", "0.1.0")
        .device_catalog()
        .tool(PanicTool)
        .build();
    let mut client = Client::start(server);

    let response = client
        .request(json!("boom"), "tools/call", Some(json!({"name": "explode"})))
        .await;
    assert_eq!(response["id"], "boom");
    assert_eq!(error_code(&response), -32603);

    let response = client.request(json!(2), "tools/list", None).await;
    assert_eq!(response["id"], 2);
}

// ============================================================================
// Acquisition
// ============================================================================

#[tokio::test(start_paused = true)]
async fn sensor_resource_without_hardware_is_immediate() {
    let mut client = Client::start(simulated_server());

    let started = Instant::now();
    let response = client
        .request(
            json!(1),
            "resources/read",
            Some(json!({"uri": "device://sensor/data"})),
        )
        .await;
    assert_eq!(started.elapsed(), Duration::ZERO);

    assert_eq!(response["result"]["contents"][0]["mimeType"], "application/json");
    let reading = resource_payload(&response);
    assert_eq!(reading["status"], "simulated_data");
    let co2 = u32::try_from(reading["co2Level"].as_u64().unwrap()).unwrap();
    assert!(CO2_SIMULATED_RANGE.contains(&co2));
}

#[tokio::test(start_paused = true)]
async fn silent_hardware_times_out() {
    let (server, _engine, mut endpoint) = hardware_server();
    let mut client = Client::start(server);

    let started = Instant::now();
    let response = client
        .request(json!(1), "tools/call", Some(json!({"name": "get_sensor_data"})))
        .await;
    assert_elapsed(started.elapsed(), Duration::from_millis(5000));

    let reading = tool_payload(&response);
    assert_eq!(reading["status"], "timeout_simulated_data");
    assert_eq!(endpoint.commands.recv().await.unwrap(), b"READ\n");
}

#[tokio::test(start_paused = true)]
async fn hardware_reading_wins_without_late_resolution() {
    let (server, engine, endpoint) = hardware_server();
    let mut client = Client::start(server);
    emit_after(&endpoint, Duration::from_millis(100), "CO2 (ppm):812");

    let started = Instant::now();
    let response = client
        .request(json!(1), "tools/call", Some(json!({"name": "get_sensor_data"})))
        .await;
    assert_elapsed(started.elapsed(), Duration::from_millis(100));

    let reading = tool_payload(&response);
    assert_eq!(reading["status"], "data_received");
    assert_eq!(reading["co2Level"], 812);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.current().status, ReadingStatus::DataReceived);
    assert_eq!(engine.current().co2_level, 812);
    assert_eq!(engine.link().unwrap().subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_acquisitions_resolve_independently() {
    let (server, _engine, endpoint) = hardware_server();
    let mut client = Client::start(server);
    let start = Instant::now();

    client
        .send_request(
            json!("a"),
            "resources/read",
            Some(json!({"uri": "device://sensor/data"})),
        )
        .await;
    emit_after(&endpoint, Duration::from_millis(100), "CO2 (ppm):812");
    let first = client.recv().await;
    assert_elapsed(start.elapsed(), Duration::from_millis(100));
    assert_eq!(first["id"], "a");
    assert_eq!(resource_payload(&first)["status"], "data_received");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = client
        .request(json!("b"), "tools/call", Some(json!({"name": "get_sensor_data"})))
        .await;
    assert_elapsed(start.elapsed(), Duration::from_millis(5200));
    assert_eq!(second["id"], "b");
    assert_eq!(tool_payload(&second)["status"], "timeout_simulated_data");
}

#[tokio::test(start_paused = true)]
async fn responses_follow_completion_order() {
    let (server, _engine, _endpoint) = hardware_server();
    let mut client = Client::start(server);

    client
        .send_request(json!("slow"), "tools/call", Some(json!({"name": "get_sensor_data"})))
        .await;
    client.send_request(json!("fast"), "tools/list", None).await;

    let first = client.recv().await;
    let second = client.recv().await;
    assert_eq!(first["id"], "fast");
    assert_eq!(second["id"], "slow");
}

// ============================================================================
// Catalog payloads
// ============================================================================

#[tokio::test]
async fn device_tools_report_state() {
    let mut client = Client::start(simulated_server());

    let info = client
        .request(json!(1), "tools/call", Some(json!({"name": "get_device_info"})))
        .await;
    let info = tool_payload(&info);
    assert_eq!(info["deviceId"], "envsensor-001");
    assert_eq!(info["batteryLevel"], 100);
    assert_eq!(info["hardwareConnected"], false);

    let battery = client
        .request(json!(2), "tools/call", Some(json!({"name": "get_battery_status"})))
        .await;
    assert_eq!(tool_payload(&battery)["batteryLevel"], 100);

    let wifi = client
        .request(json!(3), "tools/call", Some(json!({"name": "get_wifi_status"})))
        .await;
    assert_eq!(tool_payload(&wifi)["connected"], false);

    let mqtt = client
        .request(json!(4), "tools/call", Some(json!({"name": "get_mqtt_status"})))
        .await;
    assert_eq!(tool_payload(&mqtt)["connected"], false);

    let network = client
        .request(
            json!(5),
            "resources/read",
            Some(json!({"uri": "device://network/status"})),
        )
        .await;
    let network = resource_payload(&network);
    assert_eq!(network["wifi"]["connected"], false);
    assert_eq!(network["mqtt"]["connected"], false);

    let device = client
        .request(json!(6), "resources/read", Some(json!({"uri": "device://info"})))
        .await;
    assert_eq!(resource_payload(&device)["name"], "Environmental Sensor");
}

#[tokio::test]
async fn restart_sensor_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("activity.log");
    let server = Server::new("sensormcp", "0.1.0")
        .activity_log(ActivityLog::new(&path))
        .device_catalog()
        .build();
    let mut client = Client::start(server);

    let response = client
        .request(json!(1), "tools/call", Some(json!({"name": "restart_sensor"})))
        .await;
    assert_eq!(tool_payload(&response)["success"], true);
    client.close().await;

    let log = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3, "{log}");
    assert!(lines[0].ends_with("server started: sensormcp v0.1.0"));
    assert!(lines[1].ends_with("sensor restart requested"));
    assert!(lines[2].ends_with("server stopped: end of input"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn announces_readiness_first() {
    let server = Server::new("sensormcp", "0.1.0")
        .announce(true)
        .device_catalog()
        .build();
    let mut client = Client::start(server);

    let first = client.recv().await;
    assert_eq!(first["method"], "notifications/message");
    assert!(first.get("id").is_none());
    assert_eq!(first["params"]["level"], "info");
    assert_eq!(first["params"]["logger"], "sensormcp");
    assert_eq!(first["params"]["data"], "sensormcp v0.1.0 ready");
}

#[tokio::test(start_paused = true)]
async fn shutdown_answers_then_stops_after_grace() {
    let mut client = Client::start(simulated_server());

    let started = Instant::now();
    let response = client.request(json!(1), "shutdown", None).await;
    assert_eq!(response["result"], json!({}));

    let Client {
        writer: _writer,
        mut lines,
        server,
    } = client;
    assert!(lines.next_line().await.unwrap().is_none());
    assert_eq!(server.await.unwrap(), StopReason::Shutdown);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn exit_notification_stops_silently() {
    let mut client = Client::start(simulated_server());
    client.send(json!({"jsonrpc": "2.0", "method": "exit"})).await;

    let Client {
        writer: _writer,
        mut lines,
        server,
    } = client;
    assert!(lines.next_line().await.unwrap().is_none());
    assert_eq!(server.await.unwrap(), StopReason::Exit);
}

#[tokio::test(start_paused = true)]
async fn end_of_input_waits_for_pending_requests() {
    let (server, _engine, _endpoint) = hardware_server();
    let mut client = Client::start(server);

    let started = Instant::now();
    client
        .send_request(json!(1), "tools/call", Some(json!({"name": "get_sensor_data"})))
        .await;
    let (reason, rest) = client.close().await;

    assert_eq!(reason, StopReason::EndOfInput);
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0]["id"], 1);
    assert_eq!(tool_payload(&rest[0])["status"], "timeout_simulated_data");
    assert_elapsed(started.elapsed(), Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn background_tick_drains_battery() {
    let server = Server::new("sensormcp", "0.1.0")
        .tick(Some(sensormcp_device::TickConfig {
            interval: Duration::from_secs(30),
            battery_drain: 5,
        }))
        .device_catalog()
        .build();
    let device = Arc::clone(server.context().device());
    let mut client = Client::start(server);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(device.battery_level(), 90);

    let response = client
        .request(json!(1), "tools/call", Some(json!({"name": "get_battery_status"})))
        .await;
    assert_eq!(tool_payload(&response)["batteryLevel"], 90);
}
