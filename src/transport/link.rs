//! A negotiated TCP link to the device.
//!
//! [`Link::open`] connects, runs the handshake and spawns the receiver
//! loop. The resulting link owns the write half of the stream, the
//! correlator for its acknowledgements and the immutable capabilities from
//! its handshake. A reconnect always builds a new `Link`.
//!
//! # Teardown
//!
//! [`Link::close`] is idempotent: the first call stops the receiver loop,
//! fails pending waits and shuts the write half down; later calls do
//! nothing. Writes after close fail with [`Error::ConnectionClosed`], and a
//! write blocked on a device that stopped reading is abandoned so the write
//! half can be released.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::LinkGeneration;
use crate::protocol::{Capabilities, Status};

use super::correlator::{Correlator, PendingWait};
use super::handshake::negotiate;
use super::receiver::{EventSink, LossHandler, ReceiverLoop};

// ============================================================================
// LinkConfig
// ============================================================================

/// Connection-level settings for [`Link::open`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Device host name or address.
    pub host: String,
    /// Device TCP port.
    pub port: u16,
    /// Bound on TCP connect and on the handshake read, each.
    pub handshake_timeout: Duration,
    /// Receiver loop read timeout.
    pub poll_interval: Duration,
    /// Consecutive read errors before the link is declared lost.
    pub max_read_errors: u32,
}

// ============================================================================
// Link
// ============================================================================

/// A connected, handshake-validated link.
pub struct Link {
    generation: LinkGeneration,
    capabilities: Capabilities,
    peer: SocketAddr,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    correlator: Arc<Correlator>,
    stop: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    closed: AtomicBool,
    closing: watch::Sender<bool>,
    receiver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("generation", &self.generation)
            .field("peer", &self.peer)
            .field("capabilities", &self.capabilities)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Link {
    /// Connects to the device, negotiates capabilities and starts receiving.
    ///
    /// On failure the stream is dropped, which closes the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if connect or handshake times out
    /// - [`Error::Connection`] if the TCP connect fails
    /// - [`Error::Handshake`] if the handshake line is invalid
    pub async fn open(
        config: &LinkConfig,
        on_event: EventSink,
        on_lost: LossHandler,
    ) -> Result<Arc<Self>> {
        let address = format!("{}:{}", config.host, config.port);
        debug!(%address, "Connecting to device");

        let stream = timeout(config.handshake_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| Error::connection_timeout(config.handshake_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("{address}: {e}")))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let peer = stream.peer_addr()?;

        let (mut reader, writer) = stream.into_split();
        let (capabilities, lines) = negotiate(&mut reader, config.handshake_timeout).await?;

        let generation = LinkGeneration::next();
        let correlator = Correlator::new();
        let stop = Arc::new(AtomicBool::new(false));
        let lost = Arc::new(AtomicBool::new(false));

        let receiver = ReceiverLoop {
            reader,
            lines,
            generation,
            correlator: Arc::clone(&correlator),
            on_event,
            on_lost,
            stop: Arc::clone(&stop),
            lost: Arc::clone(&lost),
            poll_interval: config.poll_interval,
            max_read_errors: config.max_read_errors,
        };
        let handle = tokio::spawn(async move {
            receiver.run().await;
        });

        info!(%generation, %peer, %capabilities, "Device link ready");

        Ok(Arc::new(Self {
            generation,
            capabilities,
            peer,
            writer: tokio::sync::Mutex::new(Some(writer)),
            correlator,
            stop,
            lost,
            closed: AtomicBool::new(false),
            closing: watch::Sender::new(false),
            receiver: parking_lot::Mutex::new(Some(handle)),
        }))
    }

    /// Returns the link's generation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> LinkGeneration {
        self.generation
    }

    /// Returns the capabilities negotiated for this link.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns `true` once [`Link::close`] has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns `true` if the receiver loop detected a lost connection.
    #[inline]
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Registers a wait for the next response with `expected` status.
    #[inline]
    #[must_use]
    pub fn register(&self, expected: Status) -> PendingWait {
        self.correlator.register(expected)
    }

    /// Number of outstanding response waits.
    #[inline]
    #[must_use]
    pub fn pending_waits(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Writes all of `bytes` to the device.
    ///
    /// A write still waiting when the link is closed gives up.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the link is or becomes closed
    /// - [`Error::Io`] on write failure
    pub async fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut closing = self.closing.subscribe();
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let mut writer = tokio::select! {
            writer = self.writer.lock() => writer,
            _ = closing.wait_for(|closed| *closed) => return Err(Error::ConnectionClosed),
        };
        let writer = writer.as_mut().ok_or(Error::ConnectionClosed)?;
        tokio::select! {
            result = writer.write_all(bytes) => result?,
            _ = closing.wait_for(|closed| *closed) => {
                debug!(generation = %self.generation, "Write abandoned by close");
                return Err(Error::ConnectionClosed);
            }
        }
        Ok(())
    }

    /// Tears the link down.
    ///
    /// Returns `true` if this call performed the teardown.
    pub fn close(self: &Arc<Self>) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.stop.store(true, Ordering::SeqCst);
        self.closing.send_replace(true);
        self.correlator.fail_all();

        match Handle::try_current() {
            Ok(runtime) => {
                let link = Arc::clone(self);
                runtime.spawn(async move {
                    if let Some(mut writer) = link.writer.lock().await.take()
                        && let Err(e) = writer.shutdown().await
                    {
                        debug!(generation = %link.generation, error = %e, "Write half shutdown failed");
                    }
                });
            }
            // Outside a runtime (e.g. during drop); dropping the half closes it.
            Err(_) => {
                if let Ok(mut writer) = self.writer.try_lock() {
                    writer.take();
                }
            }
        }

        info!(generation = %self.generation, peer = %self.peer, "Device link closed");
        true
    }

    /// Waits up to `wait` for the receiver loop to finish.
    pub async fn join_receiver(&self, wait: Duration) {
        let handle = self.receiver.lock().take();
        let Some(handle) = handle else {
            return;
        };

        match timeout(wait, handle).await {
            Ok(Ok(())) => debug!(generation = %self.generation, "Receiver joined"),
            Ok(Err(e)) => warn!(generation = %self.generation, error = %e, "Receiver task failed"),
            Err(_) => warn!(
                generation = %self.generation,
                wait_ms = wait.as_millis() as u64,
                "Receiver did not stop in time"
            ),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    const HANDSHAKE: &[u8] = b"{\"status\":\"ready\",\"code\":0,\"width\":128,\"height\":128,\"format\":\"RGB565\",\"endianness\":\"little\"}\n";

    fn config(port: u16) -> LinkConfig {
        LinkConfig {
            host: "127.0.0.1".into(),
            port,
            handshake_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            max_read_errors: 3,
        }
    }

    fn sinks(losses: &Arc<AtomicUsize>) -> (EventSink, LossHandler) {
        let losses = Arc::clone(losses);
        (
            Arc::new(|_: crate::protocol::DeviceEvent| {}),
            Arc::new(move |_: LinkGeneration| {
                losses.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[tokio::test]
    async fn test_open_write_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let device = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(HANDSHAKE).await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap()
        });

        let losses = Arc::new(AtomicUsize::new(0));
        let (on_event, on_lost) = sinks(&losses);
        let link = Link::open(&config(port), on_event, on_lost)
            .await
            .expect("link");
        assert_eq!(link.capabilities().width, 128);

        link.write_all(b"hello\n").await.expect("write");
        assert_eq!(device.await.unwrap().as_deref(), Some("hello"));

        assert!(link.close());
        assert!(!link.close());
        assert!(matches!(
            link.write_all(b"x").await,
            Err(Error::ConnectionClosed)
        ));
        link.join_receiver(Duration::from_secs(1)).await;
        assert_eq!(losses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_abandons_blocked_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Greets, then never reads; the socket stays open.
        let device = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(HANDSHAKE).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let losses = Arc::new(AtomicUsize::new(0));
        let (on_event, on_lost) = sinks(&losses);
        let link = Link::open(&config(port), on_event, on_lost)
            .await
            .expect("link");

        let writer = Arc::clone(&link);
        let write = tokio::spawn(async move { writer.write_all(&vec![0u8; 64 << 20]).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!write.is_finished(), "write should be stalled on a full socket");
        assert!(link.close());

        let result = timeout(Duration::from_secs(2), write)
            .await
            .expect("write released by close")
            .unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));

        // The write half is shut down once the abandoned write lets go of it.
        let mut released = false;
        for _ in 0..100 {
            if link.writer.lock().await.is_none() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released);

        device.abort();
    }

    #[tokio::test]
    async fn test_incomplete_handshake_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let device = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"{\"status\":\"ready\",\"code\":0,\"width\":128}\n")
                .await
                .unwrap();
            let mut buf = [0u8; 8];
            // Client must close the transport after a failed handshake.
            tokio::io::AsyncReadExt::read(&mut stream, &mut buf)
                .await
                .unwrap_or(0)
        });

        let losses = Arc::new(AtomicUsize::new(0));
        let (on_event, on_lost) = sinks(&losses);
        let result = Link::open(&config(port), on_event, on_lost).await;
        assert!(matches!(result, Err(Error::Handshake { .. })));
        assert_eq!(device.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_peer_close_reports_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(HANDSHAKE).await.unwrap();
        });

        let losses = Arc::new(AtomicUsize::new(0));
        let (on_event, on_lost) = sinks(&losses);
        let link = Link::open(&config(port), on_event, on_lost)
            .await
            .expect("link");

        link.join_receiver(Duration::from_secs(2)).await;
        assert_eq!(losses.load(Ordering::SeqCst), 1);
        assert!(link.is_lost());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let losses = Arc::new(AtomicUsize::new(0));
        let (on_event, on_lost) = sinks(&losses);
        let result = Link::open(&config(port), on_event, on_lost).await;
        assert!(result.is_err());
    }
}
