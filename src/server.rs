//! TCP listener for file channels
//!
//! Each accepted connection gets its own [`FileChannel`]. The connection
//! task decodes requests into the channel while a writer task forwards the
//! channel's responses back to the socket.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::JsonFrameCodec;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::transfer::{ClientMessage, DrainReport, FileChannel, LocalFileSource, ServerMessage};

type ServerCodec = JsonFrameCodec<ClientMessage, ServerMessage>;

/// File channel server
pub struct FileServer {
    listener: TcpListener,
    source: Arc<LocalFileSource>,
}

impl FileServer {
    /// Bind the listener described by `config`
    pub async fn bind(config: &Config) -> Result<Self> {
        let addr = config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let source = match &config.files.root {
            Some(root) => LocalFileSource::with_root(root),
            None => LocalFileSource::new(),
        };

        Ok(Self {
            listener,
            source: Arc::new(source),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves, then close every open
    /// connection.
    ///
    /// Returns the handles released by the connections still open at shutdown.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<DrainReport> {
        tokio::pin!(shutdown);
        let cancel = CancellationToken::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            connections.spawn(serve_connection(
                                stream,
                                peer,
                                self.source.clone(),
                                cancel.child_token(),
                            ));
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(open = connections.len(), "Listener stopped, closing connections");
        cancel.cancel();

        let mut total = DrainReport::default();
        while let Some(joined) = connections.join_next().await {
            match joined {
                Ok(report) => {
                    total.closed += report.closed;
                    total.failed += report.failed;
                }
                Err(e) => tracing::error!(error = %e, "Connection task failed"),
            }
        }

        Ok(total)
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    source: Arc<LocalFileSource>,
    cancel: CancellationToken,
) -> DrainReport {
    let conn_id = Uuid::new_v4();
    tracing::info!(conn_id = %conn_id, peer = %peer, "Connection opened");

    let (mut sink, mut frames) = Framed::new(stream, ServerCodec::new()).split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let channel = FileChannel::spawn(conn_id, source, outbound_tx);

    // Owned by this task: dropping the set aborts the writer with the connection
    let mut writer = JoinSet::new();
    writer.spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = sink.send(message).await {
                tracing::warn!(conn_id = %conn_id, error = %e, "Failed to write response");
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(ClientMessage::FileRequest(request))) => {
                if channel.request(request).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "Dropping connection after bad frame");
                break;
            }
            None => break,
        }
    }

    let report = channel.close().await;

    // The writer finishes once the channel has released its outbound sender.
    // On shutdown a peer that stopped reading would hold it forever, so the
    // set is dropped instead, aborting the writer.
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = async {
            while let Some(joined) = writer.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(conn_id = %conn_id, error = %e, "Writer task failed");
                }
            }
        } => {}
    }
    drop(writer);

    tracing::info!(
        conn_id = %conn_id,
        released = report.closed,
        close_failures = report.failed,
        "Connection closed"
    );

    report
}
