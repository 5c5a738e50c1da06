//! TCP listener speaking the JSON-lines protocol.
//!
//! One task per connection reads request lines; every call then runs on
//! its own task with its own cancellation token, so a slow stream never
//! blocks other calls on the same connection. Outbound frames from all
//! calls funnel through one writer task per connection.
//!
//! A call is cancelled when the client sends `cancel` for its id, when the
//! connection closes, or when the server shuts down.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use filenode_kernel::{FileNode, FsError, FsResult};

use crate::constants::{MAX_FRAME_LEN, OUTBOUND_BUFFER, STREAM_BUFFER};
use crate::metrics::Metrics;
use crate::protocol::{Call, ClientFrame, ProtocolError, ServerFrame, WireChunk};

type InFlight = Arc<DashMap<u64, CancellationToken>>;

/// Serves a [`FileNode`] to TCP clients.
pub struct Server {
    node: Arc<FileNode>,
    metrics: Arc<Metrics>,
}

impl Server {
    pub fn new(node: Arc<FileNode>, metrics: Arc<Metrics>) -> Self {
        Self { node, metrics }
    }

    pub fn node(&self) -> &Arc<FileNode> {
        &self.node
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Accept connections until `shutdown` fires. Spawns a task per
    /// connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "filenode listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let this = Arc::clone(&self);
                        let conn_cancel = shutdown.child_token();
                        let span = tracing::info_span!("conn", %peer);
                        tokio::spawn(
                            async move {
                                tracing::debug!("connection opened");
                                if let Err(e) = this.handle_connection(stream, conn_cancel).await {
                                    tracing::debug!("connection error: {e}");
                                }
                                tracing::debug!("connection closed");
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!("accept error: {e}");
                    }
                },
            }
        }

        tracing::info!("filenode listener stopped");
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, conn_cancel: CancellationToken) -> anyhow::Result<()> {
        let (reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let writer_task = tokio::spawn(write_frames(writer, out_rx));
        let in_flight: InFlight = Arc::new(DashMap::new());

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        loop {
            line.clear();
            let mut limited = (&mut reader).take(MAX_FRAME_LEN as u64 + 1);
            let read = tokio::select! {
                _ = conn_cancel.cancelled() => break,
                read = limited.read_line(&mut line) => read,
            };
            match read {
                Ok(0) => break,
                Ok(_) if line.len() > MAX_FRAME_LEN => {
                    let err = ProtocolError::Malformed(format!("frame exceeds {MAX_FRAME_LEN} bytes"));
                    let _ = out_tx.send(ServerFrame::from_protocol_error(0, &err)).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("read error: {e}");
                    break;
                }
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.handle_line(trimmed, &out_tx, &in_flight, &conn_cancel).await;
        }

        // Closing the connection cancels everything still running on it.
        conn_cancel.cancel();
        drop(out_tx);
        if let Err(e) = writer_task.await? {
            tracing::debug!("writer stopped: {e}");
        }
        Ok(())
    }

    async fn handle_line(
        &self,
        line: &str,
        out: &mpsc::Sender<ServerFrame>,
        in_flight: &InFlight,
        conn_cancel: &CancellationToken,
    ) {
        let frame: ClientFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                let err = ProtocolError::Malformed(e.to_string());
                let _ = out.send(ServerFrame::from_protocol_error(0, &err)).await;
                return;
            }
        };
        let id = frame.id;

        let call = match Call::from_frame(&frame) {
            Ok(call) => call,
            Err(e) => {
                tracing::debug!(id, method = %frame.method, "rejected frame: {e}");
                let _ = out.send(ServerFrame::from_protocol_error(id, &e)).await;
                return;
            }
        };

        if let Call::Cancel { target } = call {
            let found = match in_flight.get(&target) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            };
            tracing::debug!(id, target, found, "cancel requested");
            let _ = out
                .send(ServerFrame::Result {
                    id,
                    result: json!({ "cancelled": found }),
                })
                .await;
            return;
        }

        let token = conn_cancel.child_token();
        match in_flight.entry(id) {
            MapEntry::Occupied(_) => {
                let err = ProtocolError::DuplicateId(id);
                let _ = out.send(ServerFrame::from_protocol_error(id, &err)).await;
                return;
            }
            MapEntry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        let method = call.method();
        let span = tracing::info_span!("rpc", method, id);
        let node = Arc::clone(&self.node);
        let metrics = Arc::clone(&self.metrics);
        let out = out.clone();
        let in_flight = Arc::clone(in_flight);

        tokio::spawn(
            async move {
                let started = Instant::now();
                tracing::debug!("call started");

                let outcome = dispatch(&node, id, call, &out, &token).await;
                in_flight.remove(&id);
                let elapsed = started.elapsed();

                let terminal = match outcome {
                    Ok(frame) => {
                        tracing::debug!(?elapsed, "call finished");
                        metrics.record(method, elapsed, true);
                        frame
                    }
                    Err(e) if e.is_cancelled() => {
                        tracing::debug!(?elapsed, "call cancelled");
                        metrics.record(method, elapsed, true);
                        ServerFrame::from_fs_error(id, &e)
                    }
                    Err(e) => {
                        tracing::warn!(code = e.code(), error = %e, ?elapsed, "call failed");
                        metrics.record(method, elapsed, false);
                        ServerFrame::from_fs_error(id, &e)
                    }
                };
                let _ = out.send(terminal).await;
            }
            .instrument(span),
        );
    }
}

/// Run one call. Stream items are sent as they are produced; the returned
/// frame ends the call.
async fn dispatch(
    node: &Arc<FileNode>,
    id: u64,
    call: Call,
    out: &mpsc::Sender<ServerFrame>,
    cancel: &CancellationToken,
) -> FsResult<ServerFrame> {
    match call {
        Call::ListDir(req) => {
            let (tx, rx) = mpsc::channel(STREAM_BUFFER);
            let produce = async move { node.list_dir(&req, &tx, cancel).await };
            let (summary, ()) = tokio::join!(produce, forward(id, rx, out, to_item));
            let summary = summary?;
            Ok(ServerFrame::End {
                id,
                next_page_token: summary.next_page_token,
            })
        }
        Call::StreamFile(req) => {
            let (tx, rx) = mpsc::channel(STREAM_BUFFER);
            let produce = async move { node.stream_file(&req, &tx, cancel).await };
            let (summary, ()) = tokio::join!(produce, forward(id, rx, out, |chunk| to_item(WireChunk::from(chunk))));
            let summary = summary?;
            tracing::debug!(chunks = summary.chunks, bytes = summary.bytes, "stream complete");
            Ok(ServerFrame::End {
                id,
                next_page_token: None,
            })
        }
        Call::Stat { path } => result_frame(id, &node.stat(&path).await?),
        Call::CreateDir { path, recursive } => {
            result_frame(id, &node.create_dir(&path, recursive, cancel).await)
        }
        Call::CreateFile { path, content } => {
            result_frame(id, &node.create_file(&path, &content, cancel).await)
        }
        Call::Delete { paths, permanent } => {
            result_frame(id, &node.delete(&paths, permanent, cancel).await)
        }
        Call::Rename { path, new_name } => {
            result_frame(id, &node.rename(&path, &new_name, cancel).await)
        }
        Call::GetDrives => {
            let node = Arc::clone(node);
            let drives = tokio::task::spawn_blocking(move || node.get_drives())
                .await
                .map_err(|e| FsError::internal(e.to_string()))?;
            result_frame(id, &drives)
        }
        Call::GetDeviceInfo => {
            let node = Arc::clone(node);
            let info = tokio::task::spawn_blocking(move || node.device_info())
                .await
                .map_err(|e| FsError::internal(e.to_string()))?;
            result_frame(id, &info)
        }
        Call::Cancel { .. } => Err(FsError::invalid_argument("cancel is not a call")),
    }
}

/// Relay stream items to the connection until the producer finishes or
/// the connection goes away.
async fn forward<T, F>(id: u64, mut rx: mpsc::Receiver<T>, out: &mpsc::Sender<ServerFrame>, to_value: F)
where
    F: Fn(T) -> Value,
{
    while let Some(item) = rx.recv().await {
        let frame = ServerFrame::Item {
            id,
            item: to_value(item),
        };
        if out.send(frame).await.is_err() {
            break;
        }
    }
}

fn to_item<T: Serialize>(item: T) -> Value {
    serde_json::to_value(item).unwrap_or_default()
}

fn result_frame<T: Serialize>(id: u64, value: &T) -> FsResult<ServerFrame> {
    let result = serde_json::to_value(value).map_err(|e| FsError::internal(e.to_string()))?;
    Ok(ServerFrame::Result { id, result })
}

async fn write_frames(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<ServerFrame>) -> std::io::Result<()> {
    while let Some(frame) = rx.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }
    writer.shutdown().await
}
