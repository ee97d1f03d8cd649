//! Turmoil network transport.
//!
//! Runs the real tokio runtime glue from `pinboard_server::runtime` over
//! turmoil's simulated TCP, so framing, per-session queues and the ticker
//! are exercised under virtual time, latency and partitions.

use pinboard_client::{Client, ClientAction, ClientError, ClientEvent, ClientIdentity};
use pinboard_proto::{Frame, UserId};
use pinboard_server::{
    DriverHandle, ServerError,
    runtime::{read_frame, write_frame},
};
use thiserror::Error;
use tokio::io::{ReadHalf, WriteHalf};
use turmoil::net::{TcpListener, TcpStream};

use crate::sim_env::SimEnv;

/// Failures of a simulated peer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Framing or I/O failed.
    #[error(transparent)]
    Transport(#[from] ServerError),

    /// The client state machine rejected an event.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
}

impl From<std::io::Error> for PeerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(ServerError::Io(err))
    }
}

/// Listening side of the simulated network.
pub struct SimTransport {
    listener: TcpListener,
}

impl SimTransport {
    /// Bind on the current turmoil host.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        Ok(Self { listener: TcpListener::bind(addr).await? })
    }

    /// Accept connections and attach each to the driver. Runs until the
    /// listener or the driver fails.
    pub async fn serve(self, handle: DriverHandle) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let (session_id, _) = handle.connect(stream).await?;
            tracing::debug!(%peer, session_id, "simulated connection accepted");
        }
    }

    /// Open a framed connection to `addr`.
    pub async fn connect(addr: &str) -> std::io::Result<SimConnection> {
        let (reader, writer) = tokio::io::split(TcpStream::connect(addr).await?);
        Ok(SimConnection { reader, writer })
    }
}

/// Framed client side of a simulated TCP connection.
pub struct SimConnection {
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
}

impl SimConnection {
    /// Send one frame.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ServerError> {
        write_frame(&mut self.writer, frame).await
    }

    /// Receive one frame; `None` once the server hangs up.
    pub async fn recv(&mut self) -> Result<Option<Frame>, ServerError> {
        read_frame(&mut self.reader).await
    }
}

/// A [`Client`] wired to a [`SimConnection`].
pub struct SimPeer {
    client: Client<SimEnv>,
    connection: SimConnection,
}

impl SimPeer {
    /// Connect to `addr` and complete the handshake as `user_id`.
    pub async fn connect(addr: &str, env: SimEnv, user_id: UserId) -> Result<Self, PeerError> {
        let connection = SimTransport::connect(addr).await?;
        let mut peer = Self { client: Client::new(env, ClientIdentity { user_id }), connection };

        peer.act(ClientEvent::Connect).await?;
        peer.until(|action| matches!(action, ClientAction::Connected { .. })).await?;
        Ok(peer)
    }

    /// The client state machine.
    pub fn client(&self) -> &Client<SimEnv> {
        &self.client
    }

    /// Feed an event, send what the client emits and return everything
    /// else it reported.
    pub async fn act(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, PeerError> {
        let actions = self.client.handle(event)?;
        let mut reported = Vec::new();
        for action in actions {
            match action {
                ClientAction::Send(frame) => self.connection.send(&frame).await?,
                other => reported.push(other),
            }
        }
        Ok(reported)
    }

    /// Process incoming frames until the client reports an action matching
    /// `done`, and return it.
    pub async fn until<F>(&mut self, mut done: F) -> Result<ClientAction, PeerError>
    where
        F: FnMut(&ClientAction) -> bool,
    {
        loop {
            let Some(frame) = self.connection.recv().await? else {
                self.client.handle(ClientEvent::Disconnected)?;
                return Err(PeerError::Closed);
            };
            let reported = self.act(ClientEvent::FrameReceived(frame)).await?;
            if let Some(action) = reported.into_iter().find(&mut done) {
                return Ok(action);
            }
        }
    }
}
