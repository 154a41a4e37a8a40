//! Client → server → relay over loopback TCP

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use armstream::calibration::{CalibrationRange, CalibrationStore};
use armstream::relay::{ConnectionStatus, FrameEvent, RelayEvent};
use armstream::source::DebugSimulator;
use armstream::{ClientConfig, ServerConfig, StreamingClient, Subscription, TelemetryServer};

const WAIT: Duration = Duration::from_secs(5);

fn store() -> Arc<CalibrationStore> {
    Arc::new(
        CalibrationStore::from_ranges(vec![
            CalibrationRange::new("shoulder_pan", 758.0, 3292.0, -100.0, 100.0),
            CalibrationRange::new("elbow_flex", 0.0, 1000.0, -90.0, 90.0),
            CalibrationRange::new("gripper", 2029.0, 3265.0, 0.0, 100.0),
        ])
        .unwrap(),
    )
}

fn client_config(addr: &str) -> ClientConfig {
    ClientConfig::new(addr)
        .sample_rate(100.0)
        .session_id("e2e-session")
        .device("arm_e2e", "so101_leader")
        .backoff(Duration::from_millis(10), Duration::from_millis(50))
        .progress_interval(0)
}

struct RunningServer {
    server: Arc<TelemetryServer>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<armstream::Result<()>>,
}

impl RunningServer {
    async fn start(ingest: TcpListener, dashboard: Option<TcpListener>) -> Self {
        let config = ServerConfig::default()
            .idle_timeout(Duration::from_secs(2))
            .cleanup_interval(Duration::from_millis(100));
        let server = Arc::new(TelemetryServer::new(config));
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .serve_until(ingest, dashboard, async {
                        let _ = shutdown_rx.await;
                    })
                    .await
            })
        };

        Self {
            server,
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(WAIT, self.task).await.unwrap().unwrap().unwrap();
    }
}

fn spawn_client(addr: &str) -> (oneshot::Sender<()>, JoinHandle<armstream::Result<armstream::client::ClientReport>>) {
    let store = store();
    let source = DebugSimulator::new(&store, ["shoulder_pan", "elbow_flex"]).unwrap();
    let (client, _events) = StreamingClient::new(client_config(addr), store, source);

    let (stop, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(client.run_until(async {
        let _ = stop_rx.await;
    }));
    (stop, task)
}

async fn next_frame(sub: &mut Subscription) -> FrameEvent {
    loop {
        let delivery = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        if let RelayEvent::Frame(frame) = delivery.event.as_ref() {
            return frame.clone();
        }
    }
}

#[tokio::test]
async fn test_frames_reach_subscriber_in_order() {
    let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = ingest.local_addr().unwrap().to_string();
    let server = RunningServer::start(ingest, None).await;

    let mut sub = server.server.relay().subscribe().unwrap();
    let (stop, client) = spawn_client(&addr);

    // Session opens before any frame is applied
    let first = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    match first.event.as_ref() {
        RelayEvent::Status(status) => {
            assert_eq!(status.session_id, "e2e-session");
            assert_eq!(status.status, ConnectionStatus::Connected);
        }
        other => panic!("expected status, got {:?}", other),
    }

    let store = store();
    let mut last_sequence = 0;
    for _ in 0..20 {
        let frame = next_frame(&mut sub).await;
        assert!(frame.sequence > last_sequence);
        last_sequence = frame.sequence;

        assert_eq!(frame.device_id, "arm_e2e");
        assert_eq!(frame.angles.len(), store.len());
        for range in store.ranges() {
            let angle = frame.angles[&range.joint_name];
            assert!(range.contains_angle(angle), "{} out of range", range.joint_name);
            let normalized = frame.normalized[&range.joint_name];
            assert!((0.0..=1.0).contains(&normalized));
        }
        // Held joint stays at its midpoint
        assert_eq!(frame.angles["gripper"], 50.0);
    }

    stop.send(()).unwrap();
    let report = timeout(WAIT, client).await.unwrap().unwrap().unwrap();
    assert!(report.frames_sent >= 20);

    // Closing the stream detaches the session
    loop {
        let delivery = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        if let RelayEvent::Status(status) = delivery.event.as_ref() {
            assert_eq!(status.status, ConnectionStatus::Disconnected);
            break;
        }
    }

    let stats = server.server.stats().await;
    assert!(stats.frames_applied >= 20);
    assert_eq!(stats.frames_dropped, 0);
    assert_eq!(stats.total_connections, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_sequence_continues_across_reconnect() {
    let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = ingest.local_addr().unwrap();
    let addr = local.to_string();

    let first_server = RunningServer::start(ingest, None).await;
    let mut sub = first_server.server.relay().subscribe().unwrap();
    let (stop, client) = spawn_client(&addr);

    let mut last_before = 0;
    for _ in 0..5 {
        last_before = next_frame(&mut sub).await.sequence;
    }
    drop(sub);
    first_server.stop().await;

    // Same address, fresh server process state
    let ingest = TcpListener::bind(local).await.unwrap();
    let second_server = RunningServer::start(ingest, None).await;
    let mut sub = second_server.server.relay().subscribe().unwrap();

    let resumed = next_frame(&mut sub).await;
    assert_eq!(resumed.session_id, "e2e-session");
    assert!(
        resumed.sequence > last_before,
        "sequence restarted: {} after {}",
        resumed.sequence,
        last_before
    );

    stop.send(()).unwrap();
    let report = timeout(WAIT, client).await.unwrap().unwrap().unwrap();
    assert!(report.connections >= 2);

    second_server.stop().await;
}

#[tokio::test]
async fn test_stalled_subscriber_does_not_block_ingest() {
    let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = ingest.local_addr().unwrap().to_string();
    let server = RunningServer::start(ingest, None).await;

    // Never read
    let _stalled = server.server.relay().subscribe().unwrap();
    let mut live = server.server.relay().subscribe().unwrap();
    let (stop, client) = spawn_client(&addr);

    // Well past the per-subscriber queue depth
    let mut last_sequence = 0;
    for _ in 0..100 {
        let frame = next_frame(&mut live).await;
        assert!(frame.sequence > last_sequence);
        last_sequence = frame.sequence;
    }

    let stats = server.server.relay().subscriber_stats();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().any(|s| s.delivered == 0));

    stop.send(()).unwrap();
    timeout(WAIT, client).await.unwrap().unwrap().unwrap();
    server.stop().await;
}

async fn http_get(addr: &str, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", path, addr);
    stream.write_all(request.as_bytes()).await.unwrap();
    stream
}

async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    timeout(WAIT, async {
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before {:?}", needle);
            buf.extend_from_slice(&chunk[..n]);
            if String::from_utf8_lossy(&buf).contains(needle) {
                break;
            }
        }
    })
    .await
    .unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn test_dashboard_endpoints() {
    let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dashboard = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = ingest.local_addr().unwrap().to_string();
    let web = dashboard.local_addr().unwrap().to_string();
    let server = RunningServer::start(ingest, Some(dashboard)).await;

    let mut missing = http_get(&web, "/nope").await;
    let response = read_until(&mut missing, "not found").await;
    assert!(response.starts_with("HTTP/1.1 404"));

    let mut events = http_get(&web, "/stream").await;
    let head = read_until(&mut events, "\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("text/event-stream"));

    let (stop, client) = spawn_client(&addr);

    let body = read_until(&mut events, "event: frame").await;
    assert!(body.contains("\"session_id\":\"e2e-session\""));

    let mut data = http_get(&web, "/data").await;
    let mut response = String::new();
    timeout(WAIT, data.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));

    let json_start = response.find("\r\n\r\n").unwrap() + 4;
    let json: serde_json::Value = serde_json::from_str(&response[json_start..]).unwrap();
    assert_eq!(json["sessions"][0]["session_id"], "e2e-session");
    assert_eq!(json["sessions"][0]["status"], "streaming");
    assert!(json["sessions"][0]["last_frame"]["sequence"].as_u64().unwrap() >= 1);
    assert_eq!(json["subscribers"], 1);

    stop.send(()).unwrap();
    timeout(WAIT, client).await.unwrap().unwrap().unwrap();
    server.stop().await;
}
