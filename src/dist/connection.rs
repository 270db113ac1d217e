//! Established connections: framing, heartbeats and control dispatch.
//!
//! Once the handshake completes, a connection switches to 4-byte
//! length-prefixed frames. A zero-length frame is a heartbeat and is
//! echoed straight back. Every other frame starts with the pass-through
//! byte `0x70`, followed by a version-prefixed control term and, for the
//! send-style messages, a version-prefixed payload term.
//!
//! Each connection runs two tasks: a writer draining an unbounded frame
//! queue, and a reader that parses frames and dispatches control messages
//! into the process runtime. A codec error on the stream closes the
//! connection; an unknown control tag only drops the frame.

use super::error::DistError;
use super::handshake;
use crate::atom::Atom;
use crate::core::ExitReason;
use crate::node::NodeHandle;
use crate::term::{decode, decode_stream, encode, Term, WireScope};
use malachite::Integer;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// First byte of every non-heartbeat distribution frame.
pub(crate) const PASS_THROUGH: u8 = 0x70;

/// Control message discriminators.
pub(crate) mod ctrl {
    pub const LINK: i64 = 1;
    pub const EXIT: i64 = 3;
    pub const REG_SEND: i64 = 6;
    pub const EXIT2: i64 = 8;
    pub const SEND_SENDER: i64 = 22;
    pub const UNLINK_ID: i64 = 35;
    pub const UNLINK_ID_ACC: i64 = 36;
}

/// Handle to an established connection, shared via the node's table.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    /// The peer's node name, as greeted in the handshake.
    pub(crate) peer_name: Atom,
    /// The peer's creation.
    pub(crate) peer_creation: u32,
    /// Our name on this connection, assigned by the peer.
    pub(crate) local_name: Atom,
    /// Our creation on this connection.
    pub(crate) local_creation: u32,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    io_tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl ConnectionHandle {
    /// The identity local PIDs and refs are stamped with on this
    /// connection.
    pub(crate) fn scope(&self) -> WireScope {
        WireScope {
            local_name: self.local_name,
            local_creation: self.local_creation,
        }
    }

    /// Queues a control message, with an optional payload term, for
    /// transmission.
    pub(crate) fn send_ctrl(
        &self,
        control: &Term,
        payload: Option<&Term>,
    ) -> Result<(), DistError> {
        let scope = self.scope();
        let mut frame = vec![PASS_THROUGH];
        frame.extend(encode(control, Some(scope))?);
        if let Some(payload) = payload {
            frame.extend(encode(payload, Some(scope))?);
        }
        self.send_raw(frame)
    }

    fn send_raw(&self, frame: Vec<u8>) -> Result<(), DistError> {
        self.tx
            .send(frame)
            .map_err(|_| DistError::ConnectionClosed)
    }

    /// Tears the connection's I/O tasks down.
    pub(crate) fn close(&self) {
        for task in self.io_tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Runs the handshake over `stream` and, on success, registers the
/// connection with the node and starts its I/O tasks. Returns the peer's
/// node name.
pub(crate) async fn establish<S>(node: NodeHandle, mut stream: S) -> Result<Atom, DistError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let outcome = handshake::client(&mut stream, node.node_name(), node.cookie()).await?;
    let peer = outcome.peer_name;

    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let io_tasks = Arc::new(Mutex::new(Vec::with_capacity(2)));

    let conn = ConnectionHandle {
        peer_name: peer,
        peer_creation: outcome.peer_creation,
        local_name: outcome.local_name,
        local_creation: outcome.local_creation,
        tx,
        io_tasks: io_tasks.clone(),
    };

    let writer_task = tokio::spawn(write_loop(writer, rx));
    io_tasks.lock().push(writer_task.abort_handle());

    // The connection must be visible before the first inbound frame is
    // dispatched, so insertion happens ahead of the reader task.
    node.insert_connection(conn);

    let reader_node = node.clone();
    let reader_task = tokio::spawn(async move {
        let result = read_loop(reader, &reader_node, peer).await;
        match result {
            Ok(()) => tracing::info!(node = %peer, "connection closed by peer"),
            Err(error) => tracing::warn!(node = %peer, %error, "connection failed"),
        }
        reader_node.connection_closed(peer);
    });
    io_tasks.lock().push(reader_task.abort_handle());

    tracing::info!(
        node = %peer,
        local = %outcome.local_name,
        creation = outcome.local_creation,
        "connected"
    );
    Ok(peer)
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let len = (frame.len() as u32).to_be_bytes();
        if writer.write_all(&len).await.is_err() || writer.write_all(&frame).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R>(mut reader: R, node: &NodeHandle, peer: Atom) -> Result<(), DistError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut len = [0u8; 4];
        if let Err(error) = reader.read_exact(&mut len).await {
            // A clean EOF between frames is a normal close.
            if error.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(());
            }
            return Err(error.into());
        }
        let len = u32::from_be_bytes(len) as usize;

        if len == 0 {
            // Heartbeat: echo an empty frame.
            if let Some(conn) = node.connection(peer) {
                let _ = conn.send_raw(Vec::new());
            }
            continue;
        }

        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        handle_frame(node, peer, &frame)?;
    }
}

fn handle_frame(node: &NodeHandle, peer: Atom, frame: &[u8]) -> Result<(), DistError> {
    if frame.first() != Some(&PASS_THROUGH) {
        tracing::warn!(node = %peer, first = ?frame.first(), "dropping non-pass-through frame");
        return Ok(());
    }
    let conn = node.connection(peer).ok_or(DistError::ConnectionClosed)?;
    let scope = conn.scope();

    let (control, used) = decode_stream(&frame[1..], Some(scope))?;
    let rest = &frame[1 + used..];
    let payload = if rest.is_empty() {
        None
    } else {
        Some(decode(rest, Some(scope))?)
    };

    tracing::trace!(node = %peer, %control, "control message");
    dispatch(node, &conn, control, payload);
    Ok(())
}

/// Routes one decoded control message into the runtime.
fn dispatch(node: &NodeHandle, conn: &ConnectionHandle, control: Term, payload: Option<Term>) {
    let Some(items) = control.as_tuple() else {
        tracing::warn!(%control, "control message is not a tuple, dropping");
        return;
    };
    let Some(tag) = items.first().and_then(Term::as_int) else {
        tracing::warn!(%control, "control message without integer tag, dropping");
        return;
    };

    match (tag, items) {
        (ctrl::LINK, [_, Term::Pid(from), Term::Pid(to)]) => {
            node.add_remote_link(*from, *to);
        }
        (ctrl::EXIT, [_, Term::Pid(from), Term::Pid(to), reason]) => {
            node.exit_signal(
                *to,
                ExitReason::from_term(reason.clone()),
                true,
                Some(*from),
            );
        }
        (ctrl::EXIT2, [_, Term::Pid(from), Term::Pid(to), reason]) => {
            node.exit_signal(
                *to,
                ExitReason::from_term(reason.clone()),
                false,
                Some(*from),
            );
        }
        (ctrl::REG_SEND, [_, _from, _cookie, Term::Atom(to_name)]) => match payload {
            Some(message) => node.deliver_named(*to_name, message),
            None => tracing::warn!(name = %to_name, "REG_SEND without payload, dropping"),
        },
        (ctrl::SEND_SENDER, [_, _from, Term::Pid(to)]) => match payload {
            Some(message) => node.deliver_local(*to, message),
            None => tracing::warn!(to = %to, "SEND_SENDER without payload, dropping"),
        },
        (ctrl::UNLINK_ID, [_, id, Term::Pid(from), Term::Pid(to)]) => {
            match term_to_u64(id) {
                Some(id) => node.remote_unlink_request(conn, id, *from, *to),
                None => tracing::warn!(%control, "UNLINK_ID with bad id, dropping"),
            }
        }
        (ctrl::UNLINK_ID_ACC, [_, id, Term::Pid(from), Term::Pid(to)]) => {
            match term_to_u64(id) {
                Some(id) => node.remote_unlink_ack(id, *from, *to),
                None => tracing::warn!(%control, "UNLINK_ID_ACC with bad id, dropping"),
            }
        }
        _ => {
            // Forward compatibility: unknown control messages are dropped,
            // the connection stays up.
            tracing::warn!(tag, %control, "ignoring unhandled control message");
        }
    }
}

/// Unlink ids are unsigned 64-bit and may arrive as either integer shape.
fn term_to_u64(term: &Term) -> Option<u64> {
    match term {
        Term::Int(n) if *n >= 0 => Some(*n as u64),
        Term::BigInt(n) => u64::try_from(n).ok(),
        _ => None,
    }
}

/// The wire term for an unsigned 64-bit unlink id.
pub(crate) fn u64_to_term(id: u64) -> Term {
    match i64::try_from(id) {
        Ok(small) => Term::Int(small),
        Err(_) => Term::BigInt(Integer::from(id)),
    }
}
