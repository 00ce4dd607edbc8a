//! Per-connection task.
//!
//! One task per accepted TCP connection:
//!
//! 1. Read the identity line and register a `ClientSink` with the coordinator.
//! 2. Write the round status and welcome lines straight to the socket.
//! 3. Spawn the writer task that drains the sink's queue into the socket.
//! 4. Read `VOTE` commands until the peer leaves, the session is revoked, or
//!    the coordinator stops.
//!
//! Replies to the client go through the same queue as broadcasts, so a
//! client sees its lines in the order they were produced.

use crate::actors::coordinator::CoordinatorHandle;
use crate::actors::messages::BroadcastStatus;
use crate::config::DEFAULT_OUTBOUND_BUFFER;
use crate::errors::VcError;
use crate::observability::metrics as obs;
use crate::protocol::{self, ClientCommand, MAX_LINE_LENGTH};
use crate::sink::{ClientSink, Payload};

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;
type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Capacity of the outbound queue between the coordinator and the socket.
    pub outbound_buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

/// Why the reader loop stopped.
enum Exit {
    Disconnected,
    Revoked,
    Fatal(VcError),
}

/// Serve one client until it disconnects or `cancel` fires.
#[instrument(skip_all, name = "vc.connection", fields(peer = %peer))]
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: CoordinatorHandle,
    settings: ConnectionSettings,
    cancel: CancellationToken,
) {
    obs::record_connection_opened();
    debug!(target: "vc.connection", "Connection opened");

    if let Err(e) = serve(stream, &coordinator, settings, &cancel).await {
        debug!(target: "vc.connection", error = %e, "Connection ended with error");
    }

    obs::record_connection_closed();
    debug!(target: "vc.connection", "Connection closed");
}

async fn serve(
    stream: TcpStream,
    coordinator: &CoordinatorHandle,
    settings: ConnectionSettings,
    cancel: &CancellationToken,
) -> Result<(), VcError> {
    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut writer = FramedWrite::new(write_half, LinesCodec::new());

    let first = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        line = lines.next() => line,
    };
    let identity = match first {
        Some(Ok(first)) => protocol::parse_identity(&first),
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
            debug!(target: "vc.connection", max = MAX_LINE_LENGTH, "Oversized identity line");
            None
        }
        Some(Err(LinesCodecError::Io(_))) | None => return Ok(()),
    };
    let Some(identity) = identity else {
        write_line(&mut writer, "", protocol::error_line(&VcError::InvalidIdentity)).await?;
        return Ok(());
    };

    let session = cancel.child_token();
    let (sink, outbound) =
        ClientSink::channel(identity.as_str(), settings.outbound_buffer, session.clone());

    let status = match coordinator.register(sink.clone()).await {
        Ok(status) => status,
        Err(e) => {
            info!(
                target: "vc.connection",
                client_id = %identity,
                reason = e.reason(),
                "Registration rejected"
            );
            write_line(&mut writer, &identity, protocol::error_line(&e)).await?;
            return Ok(());
        }
    };

    // Written before the writer task exists, so nothing broadcast after the
    // registration can overtake them.
    let greeting = protocol::status_lines(&status)
        .into_iter()
        .chain(std::iter::once(protocol::welcome_line(&status.options)));
    for line in greeting {
        if let Err(e) = write_line(&mut writer, &identity, line).await {
            session.cancel();
            release(coordinator, &sink).await;
            return Err(e);
        }
    }

    let writer_task = tokio::spawn(run_writer(
        writer,
        outbound,
        session.clone(),
        Arc::from(identity.as_str()),
    ));

    let exit = read_votes(&mut lines, coordinator, &sink, &session).await;

    // Revoke first: a locked coordinator may be blocked writing to this sink.
    session.cancel();
    release(coordinator, &sink).await;

    let writer = writer_task.await.ok().flatten();
    match exit {
        Exit::Fatal(e) => {
            info!(
                target: "vc.connection",
                client_id = %identity,
                reason = e.reason(),
                "Closing connection"
            );
            if let Some(mut writer) = writer {
                write_line(&mut writer, &identity, protocol::error_line(&e)).await?;
            }
        }
        Exit::Revoked => {
            info!(target: "vc.connection", client_id = %identity, "Session revoked");
        }
        Exit::Disconnected => {
            debug!(target: "vc.connection", client_id = %identity, "Client disconnected");
        }
    }

    Ok(())
}

async fn read_votes(
    lines: &mut LineReader,
    coordinator: &CoordinatorHandle,
    sink: &ClientSink,
    session: &CancellationToken,
) -> Exit {
    loop {
        let next = tokio::select! {
            () = session.cancelled() => return Exit::Revoked,
            line = lines.next() => line,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                debug!(
                    target: "vc.connection",
                    client_id = %sink.identity(),
                    max = MAX_LINE_LENGTH,
                    "Discarding oversized line"
                );
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                debug!(target: "vc.connection", error = %e, "Read failed");
                return Exit::Disconnected;
            }
            None => return Exit::Disconnected,
        };

        let ClientCommand::Vote(option) = ClientCommand::parse(&line) else {
            debug!(
                target: "vc.connection",
                client_id = %sink.identity(),
                len = line.len(),
                "Ignoring unknown command"
            );
            continue;
        };

        let result = tokio::select! {
            () = session.cancelled() => return Exit::Revoked,
            result = coordinator.submit_vote(sink.identity(), option) => result,
        };

        match result {
            Ok(receipt) => {
                if !receipt.acknowledged {
                    reply(sink, protocol::vote_accepted_line(&receipt.option)).await;
                }
                if receipt.broadcast == BroadcastStatus::Dropped {
                    reply(sink, protocol::error_line(&VcError::DispatchBackpressure)).await;
                }
            }
            Err(e) if e.is_recoverable() => {
                reply(sink, protocol::error_line(&e)).await;
            }
            Err(e) => return Exit::Fatal(e),
        }
    }
}

/// Queue a reply behind anything already queued for this client.
async fn reply(sink: &ClientSink, line: String) {
    if let Err(e) = sink.send(Payload::from(line)).await {
        debug!(
            target: "vc.connection",
            client_id = %sink.identity(),
            error = %e,
            "Reply not queued"
        );
    }
}

async fn release(coordinator: &CoordinatorHandle, sink: &ClientSink) {
    if let Err(e) = coordinator.release(sink).await {
        debug!(
            target: "vc.connection",
            client_id = %sink.identity(),
            error = %e,
            "Release skipped"
        );
    }
}

async fn write_line(writer: &mut LineWriter, client_id: &str, line: String) -> Result<(), VcError> {
    writer
        .send(line)
        .await
        .map_err(|e| VcError::SinkWriteFailure {
            client_id: client_id.to_string(),
            reason: e.to_string(),
        })
}

/// Drain the outbound queue into the socket until the session ends.
///
/// Returns the writer if it is still usable.
async fn run_writer(
    mut writer: LineWriter,
    mut outbound: mpsc::Receiver<Payload>,
    session: CancellationToken,
    client_id: Arc<str>,
) -> Option<LineWriter> {
    loop {
        let line = tokio::select! {
            () = session.cancelled() => return Some(writer),
            line = outbound.recv() => match line {
                Some(line) => line,
                None => return Some(writer),
            },
        };

        let result = tokio::select! {
            () = session.cancelled() => return None,
            result = writer.send(line) => result,
        };

        if let Err(e) = result {
            warn!(
                target: "vc.connection",
                client_id = %client_id,
                error = %e,
                "Socket write failed, revoking session"
            );
            session.cancel();
            return None;
        }
    }
}
