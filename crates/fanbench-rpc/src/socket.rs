//! Message transports shared by every RPC connection
//!
//! A [`MessageSocket`] carries whole newline-delimited text frames in both
//! directions. The same socket backs three transports: an in-memory pair,
//! a TCP stream between master and slave, and the stdin/stdout pipes of a
//! worker child process. The RPC layer never sees which one it got.

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::debug;

/// Transport failures surfaced to socket users
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer end of the socket has gone away
    #[error("connection closed")]
    Closed,
    /// A worker child was spawned without piped stdin/stdout
    #[error("child process is missing stdin/stdout pipes")]
    MissingChildPipes,
}

/// Cloneable write half of a [`MessageSocket`]
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<String>,
}

impl MessageSender {
    /// Queue one frame for delivery to the peer
    pub fn send(&self, payload: impl Into<String>) -> Result<(), SocketError> {
        self.tx.send(payload.into()).map_err(|_| SocketError::Closed)
    }
}

/// Duplex channel of whole text frames
///
/// Reading is exclusive (one consumer holds the socket), writing is shared
/// through cloned [`MessageSender`] handles.
pub struct MessageSocket {
    sender: MessageSender,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl MessageSocket {
    /// Two directly connected in-memory sockets
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: MessageSender { tx: a_tx },
                receiver: b_rx,
            },
            Self {
                sender: MessageSender { tx: b_tx },
                receiver: a_rx,
            },
        )
    }

    /// Socket over an established TCP connection
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::from_io(reader, writer)
    }

    /// Socket over a child process's piped stdin/stdout
    ///
    /// Takes ownership of both pipes; the child must have been spawned with
    /// `Stdio::piped()` for each.
    pub fn from_child(child: &mut Child) -> Result<Self, SocketError> {
        let stdin = child.stdin.take().ok_or(SocketError::MissingChildPipes)?;
        let stdout = child.stdout.take().ok_or(SocketError::MissingChildPipes)?;
        Ok(Self::from_io(stdout, stdin))
    }

    /// Socket over this process's own stdin/stdout
    ///
    /// Used by worker processes, whose parent holds the other end of the
    /// pipes. Anything else the worker wants to print must go to stderr.
    pub fn stdio() -> Self {
        Self::from_io(tokio::io::stdin(), tokio::io::stdout())
    }

    fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, LinesCodec::new());
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(line) => {
                        if in_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "transport read ended");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut frames = FramedWrite::new(writer, LinesCodec::new());
            while let Some(line) = out_rx.recv().await {
                if let Err(e) = frames.send(line).await {
                    debug!(error = %e, "transport write ended");
                    break;
                }
            }
        });

        Self {
            sender: MessageSender { tx: out_tx },
            receiver: in_rx,
        }
    }

    /// A cloneable handle for writing to this socket
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Queue one frame for delivery to the peer
    pub fn send(&self, payload: impl Into<String>) -> Result<(), SocketError> {
        self.sender.send(payload)
    }

    /// Receive the next frame; `None` once the peer is gone
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}
