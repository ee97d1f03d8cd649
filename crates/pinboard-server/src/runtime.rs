//! Network runtime.
//!
//! Glues the sans-IO [`ServerDriver`] to tokio. A single task owns the
//! driver and processes events strictly in arrival order; every connection
//! gets a reader that forwards decoded frames to that task and a writer fed
//! by a bounded queue. A full or closed queue is a delivery gap.
//!
//! ```text
//! reader ──┐                          ┌──▶ writer (session 1)
//! reader ──┼─▶ driver task ─execute──┼──▶ writer (session 2)
//! ticker ──┘                          └──▶ writer (session 3)
//! ```

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use pinboard_core::Environment;
use pinboard_proto::{Frame, FrameHeader};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};

use crate::{
    auth::Authorizer,
    driver::{ServerDriver, ServerEvent},
    error::ServerError,
    executor::{ActionExecutor, ExecutorError, execute_actions},
    storage::Storage,
};

/// Capacity of the driver's inbound command queue.
const COMMAND_CAPACITY: usize = 1024;

/// Default capacity of each session's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Production environment: system clocks, tokio timers, OS randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(err) = getrandom::fill(buffer) {
            // Ids and session ids cannot be generated safely.
            tracing::error!(%err, "operating system randomness unavailable");
            std::process::abort();
        }
    }
}

enum Command {
    Accepted { session_id: u64, outbound: mpsc::Sender<Frame> },
    Event(ServerEvent),
}

/// Handle to a running driver task.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<Command>,
    next_session: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted { session_id, .. } => {
                f.debug_struct("Accepted").field("session_id", session_id).finish_non_exhaustive()
            },
            Self::Event(event) => f.debug_tuple("Event").field(event).finish(),
        }
    }
}

/// Move `driver` onto its own task, along with a ticker for idle timeouts.
pub fn spawn_driver<E, S, A>(driver: ServerDriver<E, S, A>) -> DriverHandle
where
    E: Environment,
    S: Storage,
    A: Authorizer,
{
    let (commands, inbound) = mpsc::channel(COMMAND_CAPACITY);
    let tick_interval = driver.config().tick_interval;

    tokio::spawn(run_driver(driver, inbound));
    tokio::spawn(run_ticker(commands.clone(), tick_interval));

    DriverHandle {
        commands,
        next_session: Arc::new(AtomicU64::new(1)),
        outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
    }
}

impl DriverHandle {
    /// Use a different outbound queue capacity for sessions attached after
    /// this call.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Attach a connected byte stream as a new session.
    ///
    /// Returns the session id and the task serving the connection.
    pub async fn connect<T>(&self, stream: T) -> Result<(u64, JoinHandle<()>), ServerError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (outbound, queue) = mpsc::channel(self.outbound_capacity);

        self.commands
            .send(Command::Accepted { session_id, outbound })
            .await
            .map_err(|_| ServerError::DriverStopped)?;

        let commands = self.commands.clone();
        Ok((session_id, tokio::spawn(run_connection(stream, session_id, commands, queue))))
    }
}

/// Accept TCP connections until the listener fails.
pub async fn serve(listener: TcpListener, handle: DriverHandle) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let (session_id, _) = handle.connect(stream).await?;
        tracing::debug!(%peer, session_id, "connection accepted");
    }
}

/// Read one frame. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FrameHeader::SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {},
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let header = FrameHeader::from_bytes(&header)?;
    let mut payload = vec![0u8; Frame::payload_len_from_header(&header)?];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Frame::new(header, payload)))
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    frame.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}

async fn run_driver<E, S, A>(mut driver: ServerDriver<E, S, A>, mut inbound: mpsc::Receiver<Command>)
where
    E: Environment,
    S: Storage,
    A: Authorizer,
{
    let policy = driver.config().broadcast;
    let mut executor = ChannelExecutor::default();

    while let Some(command) = inbound.recv().await {
        let event = match command {
            Command::Accepted { session_id, outbound } => {
                executor.outbound.insert(session_id, outbound);
                ServerEvent::ConnectionAccepted { session_id }
            },
            Command::Event(event) => event,
        };

        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            if let ServerEvent::ConnectionClosed { session_id, .. } = &event {
                executor.outbound.remove(session_id);
            }

            let actions = match driver.process_event(event) {
                Ok(actions) => actions,
                Err(err) => {
                    tracing::warn!(%err, "event dropped");
                    continue;
                },
            };

            let report = execute_actions(&mut executor, driver.registry(), policy, actions);
            if !report.gaps.is_empty() {
                tracing::debug!(gaps = ?report.gaps, "delivery gaps");
            }
            for session_id in report.closed {
                pending.push_back(ServerEvent::ConnectionClosed {
                    session_id,
                    reason: "closed by server".to_owned(),
                });
            }
        }
    }

    tracing::info!("driver stopped");
}

async fn run_ticker(commands: mpsc::Sender<Command>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if commands.send(Command::Event(ServerEvent::Tick)).await.is_err() {
            return;
        }
    }
}

async fn run_connection<T>(
    stream: T,
    session_id: u64,
    commands: mpsc::Sender<Command>,
    mut queue: mpsc::Receiver<Frame>,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let write = async move {
        while let Some(frame) = queue.recv().await {
            if let Err(err) = write_frame(&mut writer, &frame).await {
                tracing::debug!(session_id, %err, "write failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
    };

    let read = async {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    let event = ServerEvent::FrameReceived { session_id, frame };
                    if commands.send(Command::Event(event)).await.is_err() {
                        return "driver stopped".to_owned();
                    }
                },
                Ok(None) => return "peer closed".to_owned(),
                Err(err) => return err.to_string(),
            }
        }
    };

    let reason = tokio::select! {
        () = write => "closed by server".to_owned(),
        reason = read => reason,
    };

    tracing::debug!(session_id, %reason, "connection finished");
    let _ = commands.send(Command::Event(ServerEvent::ConnectionClosed { session_id, reason })).await;
}

/// Delivers frames into per-session outbound queues.
#[derive(Default)]
struct ChannelExecutor {
    outbound: HashMap<u64, mpsc::Sender<Frame>>,
}

impl ActionExecutor for ChannelExecutor {
    fn send(&mut self, session_id: u64, frame: &Frame) -> Result<(), ExecutorError> {
        let queue = self.outbound.get(&session_id).ok_or(ExecutorError::UnknownSession(session_id))?;
        queue.try_send(frame.clone()).map_err(|_| ExecutorError::DeliveryGap(session_id))
    }

    fn close(&mut self, session_id: u64, reason: &str) {
        if self.outbound.remove(&session_id).is_some() {
            tracing::debug!(session_id, reason, "closing session");
        }
    }
}
