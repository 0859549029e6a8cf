//! Scripted fake display device for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;

use display_link::{ClientOptions, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 32;

pub fn handshake() -> String {
    format!(
        "{{\"status\":\"ready\",\"code\":0,\"width\":{WIDTH},\"height\":{HEIGHT},\"format\":\"RGB565\",\"endianness\":\"little\"}}"
    )
}

/// Options with short timeouts so failure paths finish quickly.
pub fn fast_options() -> ClientOptions {
    ClientOptions::new()
        .with_handshake_timeout(Duration::from_millis(500))
        .with_ready_timeout(Duration::from_millis(300))
        .with_ack_timeout(Duration::from_millis(300))
        .with_write_timeout(Duration::from_millis(500))
        .with_poll_interval(Duration::from_millis(20))
        .with_retry_delay(Duration::from_millis(10))
        .with_close_timeout(Duration::from_secs(1))
        .with_reconnect(
            ReconnectPolicy::new([Duration::from_millis(50)]).with_max_duration(Duration::from_secs(10)),
        )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Reply Script
// ============================================================================

fn ack(status: &str, code: i64) -> String {
    format!("{{\"status\":\"{status}\",\"code\":{code}}}")
}

/// What the device does with the bytes after a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Reads the payload, like firmware that sent an OK `ready`.
    Read,
    /// Expects no payload, like firmware that refused the header.
    Skip,
    /// Stops reading for good but keeps the socket open.
    Stall,
}

/// How the device answers one frame.
#[derive(Debug, Clone)]
pub struct FrameReply {
    /// Line sent after the header; `None` stays silent.
    pub ready: Option<String>,
    pub payload: Payload,
    /// Line sent after the payload; `None` stays silent.
    pub done: Option<String>,
}

impl FrameReply {
    pub fn ok() -> Self {
        Self::completion(0)
    }

    /// Completion with `status:"ok"` and `code`.
    pub fn completion(code: i64) -> Self {
        Self {
            ready: Some(ack("ready", 0)),
            payload: Payload::Read,
            done: Some(ack("ok", code)),
        }
    }

    /// Completion with `status:"error"` and `code`.
    pub fn error(code: i64) -> Self {
        Self {
            ready: Some(ack("ready", 0)),
            payload: Payload::Read,
            done: Some(ack("error", code)),
        }
    }

    /// Never acknowledges the payload.
    pub fn silent() -> Self {
        Self {
            ready: Some(ack("ready", 0)),
            payload: Payload::Read,
            done: None,
        }
    }

    /// Never answers the header.
    pub fn no_ready() -> Self {
        Self {
            ready: None,
            payload: Payload::Skip,
            done: None,
        }
    }

    /// Refuses the header with `status` (`ready` or `error`) and `code`.
    pub fn refuse(status: &str, code: i64) -> Self {
        Self {
            ready: Some(ack(status, code)),
            payload: Payload::Skip,
            done: None,
        }
    }

    /// Answers `ready`, then never reads again.
    pub fn stall() -> Self {
        Self {
            ready: Some(ack("ready", 0)),
            payload: Payload::Stall,
            done: None,
        }
    }
}

/// A frame as the device received it.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub connection: usize,
    pub screen_id: String,
    pub payload: Vec<u8>,
}

// ============================================================================
// FakeDevice
// ============================================================================

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<FrameReply>>,
    frames: Mutex<Vec<ReceivedFrame>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    connections: AtomicUsize,
    protocol_errors: AtomicUsize,
    refused: AtomicUsize,
    stalled: AtomicUsize,
}

/// A TCP server that behaves like the display firmware.
pub struct FakeDevice {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeDevice {
    /// Starts a device that sends the standard handshake.
    pub async fn start() -> anyhow::Result<Self> {
        Self::with_handshake(handshake()).await
    }

    /// Starts a device that greets every connection with `handshake`.
    pub async fn with_handshake(handshake: String) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let shared = Arc::new(Shared::default());

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = accept_shared.connections.fetch_add(1, Ordering::SeqCst) + 1;
                let (reader, mut writer) = stream.into_split();
                if writer
                    .write_all(format!("{handshake}\n").as_bytes())
                    .await
                    .is_err()
                {
                    continue;
                }
                *accept_shared.writer.lock().await = Some(writer);
                tokio::spawn(serve(index, reader, Arc::clone(&accept_shared)));
            }
        });

        Ok(Self { port, shared })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queues replies for the next frames; frames beyond the script get `ok`.
    pub fn script(&self, replies: impl IntoIterator<Item = FrameReply>) {
        self.shared.script.lock().extend(replies);
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<ReceivedFrame> {
        self.shared.frames.lock().clone()
    }

    pub fn protocol_errors(&self) -> usize {
        self.shared.protocol_errors.load(Ordering::SeqCst)
    }

    /// Headers refused or left unanswered without reading a payload.
    pub fn refused(&self) -> usize {
        self.shared.refused.load(Ordering::SeqCst)
    }

    /// Connections on which the device stopped reading.
    pub fn stalled(&self) -> usize {
        self.shared.stalled.load(Ordering::SeqCst)
    }

    /// Writes an unsolicited line on the current connection.
    pub async fn send_line(&self, line: &str) -> anyhow::Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no connection"))?;
        writer.write_all(format!("{line}\n").as_bytes()).await?;
        Ok(())
    }

    /// Closes the device side of the current connection.
    pub async fn hang_up(&self) {
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

async fn serve(connection: usize, reader: tokio::net::tcp::OwnedReadHalf, shared: Arc<Shared>) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let header: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(_) => {
                shared.protocol_errors.fetch_add(1, Ordering::SeqCst);
                continue;
            }
        };
        if header["command"] != "DISPLAY" {
            shared.protocol_errors.fetch_add(1, Ordering::SeqCst);
            continue;
        }
        let length = header["length"].as_u64().unwrap_or(0) as usize;
        let screen_id = header["screen_id"].as_str().unwrap_or_default().to_string();

        let reply = shared
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(FrameReply::ok);

        if let Some(ready) = &reply.ready {
            if !reply_line(&shared, ready).await {
                return;
            }
        }

        match reply.payload {
            Payload::Read => {}
            Payload::Skip => {
                shared.refused.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            Payload::Stall => {
                shared.stalled.fetch_add(1, Ordering::SeqCst);
                // Holds the read half so the socket stays open and unread.
                std::future::pending::<()>().await;
            }
        }

        let mut payload = vec![0u8; length];
        if reader.read_exact(&mut payload).await.is_err() {
            return;
        }
        shared.frames.lock().push(ReceivedFrame {
            connection,
            screen_id,
            payload,
        });

        if let Some(done) = &reply.done {
            if !reply_line(&shared, done).await {
                return;
            }
        }
    }
}

async fn reply_line(shared: &Shared, line: &str) -> bool {
    let mut writer = shared.writer.lock().await;
    match writer.as_mut() {
        Some(writer) => writer.write_all(format!("{line}\n").as_bytes()).await.is_ok(),
        None => false,
    }
}

/// Polls `condition` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
