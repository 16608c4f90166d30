mod common;
use crate::common::builders::ConfigFileBuilder;
use crate::common::{eventually, init_tracing, with_timeout};

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use jobtail::hub::{Hub, HubHandle, Message};
use jobtail::job::{JobId, JobRegistry, JobState};
use jobtail::server::{self, AppState};
use jobtail::types::ChangeSourceKind;

type TestResult<T = ()> = Result<T, Box<dyn Error>>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct RunningServer {
    addr: SocketAddr,
    hub: HubHandle,
    registry: Arc<JobRegistry>,
    _logs: tempfile::TempDir,
}

impl RunningServer {
    fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

async fn start_server() -> TestResult<RunningServer> {
    let logs = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .log_dir(logs.path())
        .change_source(ChangeSourceKind::Poll)
        .poll_interval_ms(20)
        .build();

    let hub = Hub::spawn();
    let registry = Arc::new(JobRegistry::from_config(&cfg, Some(hub.clone())));
    registry.prepare()?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(Arc::clone(&registry), hub.clone(), cfg);
    tokio::spawn(server::serve(listener, state, std::future::pending()));

    Ok(RunningServer {
        addr,
        hub,
        registry,
        _logs: logs,
    })
}

/// Next data frame as text, skipping control frames.
async fn next_text(socket: &mut Socket) -> TestResult<String> {
    loop {
        match with_timeout(socket.next()).await {
            Some(Ok(WsMessage::Text(text))) => return Ok(text),
            Some(Ok(WsMessage::Binary(bytes))) => {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            Some(Ok(WsMessage::Close(_))) | None => return Err("socket closed".into()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Read data frames until the socket closes; returns everything received.
async fn read_to_close(socket: &mut Socket) -> TestResult<String> {
    let mut out = String::new();
    loop {
        match with_timeout(socket.next()).await {
            Some(Ok(WsMessage::Text(text))) => out.push_str(&text),
            Some(Ok(WsMessage::Binary(bytes))) => out.push_str(&String::from_utf8_lossy(&bytes)),
            Some(Ok(WsMessage::Close(_))) | None => return Ok(out),
            Some(Ok(_)) => {}
            Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(out),
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[tokio::test]
async fn hub_stamps_sender_and_echoes_to_everyone() -> TestResult {
    init_tracing();
    let server = start_server().await?;

    let (mut alice, _) = connect_async(server.url("/hub")).await?;
    let (mut bob, _) = connect_async(server.url("/hub")).await?;
    assert!(eventually(Duration::from_secs(3), || server.hub.client_count() == 2).await);

    alice
        .send(WsMessage::Text(r#"{"type":"chat","action":"say","text":"hi"}"#.to_string()))
        .await?;

    let to_alice = Message::from_wire(&next_text(&mut alice).await?)?;
    let to_bob = Message::from_wire(&next_text(&mut bob).await?)?;
    assert_eq!(to_alice, to_bob);
    assert_eq!(to_alice.kind, "chat");
    assert_eq!(to_alice.text, "hi");
    assert!(to_alice.sender.starts_with("ID"), "{:?}", to_alice.sender);

    // A sender claimed by the browser is replaced with its real id.
    bob.send(WsMessage::Text(r#"{"type":"chat","text":"yo","sender":"ID999"}"#.to_string()))
        .await?;
    let from_bob = Message::from_wire(&next_text(&mut alice).await?)?;
    assert_eq!(from_bob.text, "yo");
    assert_ne!(from_bob.sender, "ID999");
    assert_ne!(from_bob.sender, to_alice.sender);

    // Malformed frames are ignored; the connection stays usable.
    alice.send(WsMessage::Text("not json".to_string())).await?;
    bob.close(None).await?;
    assert!(eventually(Duration::from_secs(3), || server.hub.client_count() == 1).await);

    server.hub.broadcast(&Message::new("job", "started")).await?;
    let event = Message::from_wire(&next_text(&mut alice).await?)?;
    assert_eq!(event.action, "started");
    Ok(())
}

#[tokio::test]
async fn live_endpoint_streams_output_and_accepts_kill() -> TestResult {
    init_tracing();
    let server = start_server().await?;

    let job = server
        .registry
        .launch("echo first; sleep 0.5; echo second; sleep 30", None)
        .await?;
    let id = job.id().clone();

    let (mut viewer, _) = connect_async(server.url(&format!("/jobs/{id}/live?offset=0"))).await?;

    let mut seen = String::new();
    while !seen.contains("second\n") {
        seen.push_str(&next_text(&mut viewer).await?);
    }
    assert!(seen.starts_with("Start:"), "offset=0 replays the header: {seen:?}");
    assert!(seen.contains("first\nsecond\n"));

    viewer.send(WsMessage::Text("kill".to_string())).await?;
    let tail = read_to_close(&mut viewer).await?;
    assert!(!tail.contains("first"), "nothing is delivered twice");

    let mut states = job.subscribe();
    let state = *with_timeout(states.wait_for(|s| s.is_terminal())).await?;
    assert_eq!(state, JobState::Killed);
    Ok(())
}

#[tokio::test]
async fn live_endpoint_without_offset_starts_at_the_end() -> TestResult {
    init_tracing();
    let server = start_server().await?;

    let job = server
        .registry
        .launch("echo early; sleep 1; echo late", None)
        .await?;
    let mut states = job.subscribe();
    with_timeout(async {
        while !std::fs::read_to_string(job.log_path())
            .is_ok_and(|log| log.contains("early\n"))
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    let (mut viewer, _) = connect_async(server.url(&format!("/jobs/{}/live", job.id()))).await?;
    let streamed = read_to_close(&mut viewer).await?;
    assert!(streamed.contains("late\n"), "{streamed:?}");
    assert!(!streamed.contains("early"), "{streamed:?}");
    assert!(streamed.contains("Status:completed"), "footer is flushed before close");

    let state = *with_timeout(states.wait_for(|s| s.is_terminal())).await?;
    assert_eq!(state, JobState::Completed);
    Ok(())
}

#[tokio::test]
async fn live_endpoint_rejects_unknown_jobs_before_upgrading() -> TestResult {
    init_tracing();
    let server = start_server().await?;

    let ghost = JobId::encode("echo ghost", chrono::Utc::now())?;
    for path in [format!("/jobs/{ghost}/live"), "/jobs/not-an-id/live".to_string()] {
        match connect_async(server.url(&path)).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 404, "{path}");
            }
            Err(other) => return Err(format!("{path}: unexpected error {other}").into()),
            Ok(_) => return Err(format!("{path}: upgrade should be refused").into()),
        }
    }
    Ok(())
}
