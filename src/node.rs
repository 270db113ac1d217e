//! The local node: process runtime plus distribution, behind one handle.
//!
//! A [`Node`] owns everything that is mutable about this client: the
//! process table and name registry, the PID and reference counters, and
//! the table of established connections. A cloneable [`NodeHandle`] is the
//! capability every process and caller works through; there are no
//! process-wide globals apart from the atom table.
//!
//! # Example
//!
//! ```ignore
//! let node = NodeConfig::new().cookie("secret").start()?;
//! let handle = node.handle();
//!
//! let pid = handle.spawn(|mut ctx| async move {
//!     while let Ok(msg) = ctx.recv().await {
//!         tracing::info!(%msg, "got a message");
//!     }
//! });
//!
//! let reply = handle.rpc(atom!("peer@host"), atom!("erlang"), atom!("node"), Term::Nil).await?;
//! ```

use crate::atom::Atom;
use crate::config::{self, ConfigError};
use crate::core::{ExitReason, NodeName, Pid, Ref};
use crate::dist::connection::{self, ctrl, u64_to_term, ConnectionHandle};
use crate::dist::{epmd, DistError};
use crate::runtime::mailbox::Mailbox;
use crate::runtime::process::ProcessHandle;
use crate::runtime::registry::ProcessRegistry;
use crate::runtime::{Context, RuntimeError};
use crate::term::Term;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// A message destination, mirroring the addressing forms Erlang sends
/// accept.
#[derive(Clone, Debug, PartialEq)]
pub enum Dest {
    /// A process, local or remote.
    Pid(Pid),
    /// A locally registered name.
    Name(Atom),
    /// `{name, node}`: a name registered on a specific node.
    RemoteName(Atom, Atom),
}

impl From<Pid> for Dest {
    fn from(pid: Pid) -> Self {
        Dest::Pid(pid)
    }
}

impl From<Atom> for Dest {
    fn from(name: Atom) -> Self {
        Dest::Name(name)
    }
}

impl From<(Atom, Atom)> for Dest {
    fn from((name, node): (Atom, Atom)) -> Self {
        Dest::RemoteName(name, node)
    }
}

/// Configuration for starting a [`Node`].
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    name: Option<String>,
    cookie: Option<String>,
}

impl NodeConfig {
    /// Starts from defaults: a generated node name and the cookie file.
    pub fn new() -> Self {
        Self::default()
    }

    /// The node name to request in handshakes, `short@host`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The distribution cookie. Without this the standard cookie file
    /// locations are searched.
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Builds the node.
    pub fn start(self) -> Result<Node, ConfigError> {
        let name = self.name.unwrap_or_else(config::default_node_name);
        let name = NodeName::parse(&name)?;
        let cookie = match self.cookie {
            Some(cookie) => cookie,
            None => config::cookie()?,
        };
        tracing::info!(%name, "node starting");
        Ok(Node {
            handle: NodeHandle {
                shared: Arc::new(NodeShared {
                    name,
                    cookie,
                    registry: ProcessRegistry::new(),
                    connections: DashMap::new(),
                    pid_counter: AtomicU64::new(1),
                    ref_counter: AtomicU64::new(1),
                }),
            },
        })
    }
}

/// An Erlang-style client node.
pub struct Node {
    handle: NodeHandle,
}

impl Node {
    /// A cloneable handle to this node.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Closes every connection and terminates every process.
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}

struct NodeShared {
    name: NodeName,
    cookie: String,
    registry: ProcessRegistry,
    connections: DashMap<Atom, ConnectionHandle>,
    pid_counter: AtomicU64,
    ref_counter: AtomicU64,
}

/// A cloneable capability handle to a [`Node`].
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<NodeShared>,
}

impl NodeHandle {
    // === Identity ===

    /// The node name requested in handshakes.
    pub fn name(&self) -> &NodeName {
        &self.shared.name
    }

    pub(crate) fn node_name(&self) -> &NodeName {
        &self.shared.name
    }

    pub(crate) fn cookie(&self) -> &str {
        &self.shared.cookie
    }

    /// The root PID: the `From` identity of sends issued outside any
    /// process.
    pub fn root(&self) -> Pid {
        Pid::local(0)
    }

    /// A fresh unique reference.
    pub fn make_ref(&self) -> Ref {
        Ref::local(self.shared.ref_counter.fetch_add(1, Ordering::Relaxed))
    }

    // === Processes ===

    /// Spawns a process and returns its PID immediately.
    pub fn spawn<F, Fut>(&self, f: F) -> Pid
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let pid = Pid::local(self.shared.pid_counter.fetch_add(1, Ordering::Relaxed));
        let (mailbox, sender) = Mailbox::new();
        let ctx = Context::new(pid, mailbox, self.clone());
        let node = self.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            // The process must be visible in the table before its first
            // instruction runs.
            let _ = ready_rx.await;
            f(ctx).await;
            node.process_exited(pid);
        });

        self.shared
            .registry
            .insert(ProcessHandle::new(pid, sender, task.abort_handle()));
        let _ = ready_tx.send(());
        pid
    }

    /// Spawns a process linked to `parent`.
    pub fn spawn_linked_to<F, Fut>(&self, parent: Pid, f: F) -> Pid
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let child = self.spawn(f);
        if let (Some(parent_handle), Some(child_handle)) = (
            self.shared.registry.get(parent),
            self.shared.registry.get(child),
        ) {
            parent_handle.add_link(child);
            child_handle.add_link(parent);
        }
        child
    }

    /// Returns `true` while the process is in the table.
    pub fn alive(&self, pid: Pid) -> bool {
        self.shared.registry.contains(pid)
    }

    /// Sends an exit signal, as `exit/2` would.
    pub fn exit(&self, target: Pid, reason: ExitReason) {
        self.exit_signal(target, reason, false, None);
    }

    // === Registry ===

    /// Registers `name` for `pid`; `false` if the name is taken.
    pub fn register(&self, name: Atom, pid: Pid) -> bool {
        self.shared.registry.register_name(name, pid)
    }

    /// Drops a name registration, returning the PID it pointed at.
    pub fn unregister(&self, name: Atom) -> Option<Pid> {
        self.shared.registry.unregister_name(name)
    }

    /// Looks up a registered name.
    pub fn whereis(&self, name: Atom) -> Option<Pid> {
        self.shared.registry.whereis(name)
    }

    /// All currently registered names.
    pub fn registered(&self) -> Vec<Atom> {
        self.shared.registry.registered_names()
    }

    // === Messaging ===

    /// Sends a message from outside any process (the root PID is the
    /// sender).
    pub async fn send(&self, dest: impl Into<Dest>, message: Term) -> Result<(), RuntimeError> {
        self.route_send(self.root(), dest.into(), message).await
    }

    /// Routes a send to its destination, establishing a connection on
    /// demand for remote ones. Local destinations that do not exist
    /// swallow the message silently.
    pub(crate) async fn route_send(
        &self,
        from: Pid,
        dest: Dest,
        message: Term,
    ) -> Result<(), RuntimeError> {
        match dest {
            Dest::Pid(to) => match to.node() {
                None => {
                    self.deliver_local(to, message);
                    Ok(())
                }
                Some(node_atom) => {
                    let conn = self.ensure_connection(node_atom).await?;
                    let control = Term::tuple(vec![
                        Term::int(ctrl::SEND_SENDER),
                        Term::Pid(from),
                        Term::Pid(to),
                    ]);
                    conn.send_ctrl(&control, Some(&message))?;
                    Ok(())
                }
            },
            Dest::Name(name) => {
                self.deliver_named(name, message);
                Ok(())
            }
            Dest::RemoteName(name, node_atom) => {
                if self.is_local_node(node_atom) {
                    self.deliver_named(name, message);
                    return Ok(());
                }
                let conn = self.ensure_connection(node_atom).await?;
                let control = Term::tuple(vec![
                    Term::int(ctrl::REG_SEND),
                    Term::Pid(from),
                    Term::Atom(Atom::new("")),
                    Term::Atom(name),
                ]);
                conn.send_ctrl(&control, Some(&message))?;
                Ok(())
            }
        }
    }

    pub(crate) fn deliver_local(&self, to: Pid, message: Term) {
        match self.shared.registry.get(to) {
            Some(handle) => handle.deliver(message),
            None => tracing::trace!(%to, "dropping message for unknown pid"),
        }
    }

    pub(crate) fn deliver_named(&self, name: Atom, message: Term) {
        match self.shared.registry.whereis(name) {
            Some(pid) => self.deliver_local(pid, message),
            None => tracing::trace!(%name, "dropping message for unregistered name"),
        }
    }

    // === Links and exits ===

    /// Creates a link between `owner` (local) and `peer`.
    pub(crate) async fn link(&self, owner: Pid, peer: Pid) -> Result<(), RuntimeError> {
        let owner_handle = self
            .shared
            .registry
            .get(owner)
            .ok_or(RuntimeError::ProcessNotFound(owner))?;
        match peer.node() {
            None => {
                let peer_handle = self
                    .shared
                    .registry
                    .get(peer)
                    .ok_or(RuntimeError::ProcessNotFound(peer))?;
                owner_handle.add_link(peer);
                peer_handle.add_link(owner);
                Ok(())
            }
            Some(node_atom) => {
                let conn = self.ensure_connection(node_atom).await?;
                if owner_handle.add_link(peer) {
                    let control = Term::tuple(vec![
                        Term::int(ctrl::LINK),
                        Term::Pid(owner),
                        Term::Pid(peer),
                    ]);
                    conn.send_ctrl(&control, None)?;
                }
                Ok(())
            }
        }
    }

    /// Dissolves a link. Locally both halves go at once; for a remote
    /// peer the entry is only marked with a fresh unlink id and removed
    /// when the matching acknowledgement arrives.
    pub(crate) async fn unlink(&self, owner: Pid, peer: Pid) -> Result<(), RuntimeError> {
        let Some(owner_handle) = self.shared.registry.get(owner) else {
            return Ok(());
        };
        match peer.node() {
            None => {
                owner_handle.remove_link(peer);
                if let Some(peer_handle) = self.shared.registry.get(peer) {
                    peer_handle.remove_link(owner);
                }
                Ok(())
            }
            Some(node_atom) => {
                if owner_handle.link_state(peer) != Some(None) {
                    return Ok(());
                }
                let id = (rand::random::<u64>() >> 1).max(1);
                owner_handle.set_unlink_pending(peer, id);
                if let Some(conn) = self.connection(node_atom) {
                    let control = Term::tuple(vec![
                        Term::int(ctrl::UNLINK_ID),
                        u64_to_term(id),
                        Term::Pid(owner),
                        Term::Pid(peer),
                    ]);
                    conn.send_ctrl(&control, None)?;
                }
                Ok(())
            }
        }
    }

    /// Delivers an exit signal to `target`.
    ///
    /// `via_link` marks signals that travel a link (including the EXIT
    /// control message); `from` is the signalling process when there is
    /// one. Remote targets get the signal as a control message; unknown
    /// local targets are a no-op.
    pub(crate) fn exit_signal(
        &self,
        target: Pid,
        reason: ExitReason,
        via_link: bool,
        from: Option<Pid>,
    ) {
        if let Some(node_atom) = target.node() {
            let Some(conn) = self.connection(node_atom) else {
                tracing::trace!(node = %node_atom, "dropping exit signal to unconnected node");
                return;
            };
            let tag = if via_link { ctrl::EXIT } else { ctrl::EXIT2 };
            let from_pid = from.unwrap_or_else(|| self.root());
            let control = Term::tuple(vec![
                Term::int(tag),
                Term::Pid(from_pid),
                Term::Pid(target),
                reason.to_term(),
            ]);
            let _ = conn.send_ctrl(&control, None);
            return;
        }

        if target == self.root() {
            match (&reason, via_link) {
                (ExitReason::Normal, _) => {}
                (ExitReason::Kill, false) => {
                    tracing::error!("kill signal for the root process, shutting node down");
                    self.shutdown();
                }
                _ => tracing::warn!(%reason, "exit signal for the root process ignored"),
            }
            return;
        }

        let Some(handle) = self.shared.registry.get(target) else {
            return;
        };

        // A link we have already asked to dissolve delivers no signal.
        if via_link {
            if let Some(from) = from {
                if matches!(handle.link_state(from), Some(Some(_))) {
                    return;
                }
            }
        }

        // Normal exits terminate only the process that raised them.
        if reason.is_normal() && from != Some(target) {
            return;
        }

        let recorded = if reason.is_kill() {
            ExitReason::Killed
        } else {
            reason
        };
        self.terminate_process(target, recorded);
    }

    /// Normal completion of a process body.
    pub(crate) fn process_exited(&self, pid: Pid) {
        self.terminate_process(pid, ExitReason::Normal);
    }

    /// Terminates a process exactly once: the table entry goes first, so
    /// link cycles cannot signal back into a process that is already on
    /// its way out.
    pub(crate) fn terminate_process(&self, pid: Pid, reason: ExitReason) {
        let Some(handle) = self.shared.registry.remove(pid) else {
            return;
        };
        handle.mark_terminated(reason.clone());
        handle.abort_task();
        tracing::trace!(%pid, %reason, "process terminated");

        for (peer, pending) in handle.take_links() {
            // Links we already asked to dissolve carry no signal.
            if pending.is_some() {
                continue;
            }
            match peer.node() {
                Some(node_atom) => {
                    if let Some(conn) = self.connection(node_atom) {
                        let control = Term::tuple(vec![
                            Term::int(ctrl::EXIT),
                            Term::Pid(pid),
                            Term::Pid(peer),
                            reason.to_term(),
                        ]);
                        let _ = conn.send_ctrl(&control, None);
                    }
                }
                None => self.exit_signal(peer, reason.clone(), true, Some(pid)),
            }
        }
    }

    // === Inbound control plumbing ===

    /// LINK from a remote process: one-sided, our half of the mirror.
    pub(crate) fn add_remote_link(&self, from: Pid, to: Pid) {
        if let Some(handle) = self.shared.registry.get(to) {
            handle.add_link(from);
        }
    }

    /// UNLINK_ID from a remote process: remove our half unless we have an
    /// unlink of our own in flight, and acknowledge unconditionally.
    pub(crate) fn remote_unlink_request(
        &self,
        conn: &ConnectionHandle,
        id: u64,
        from: Pid,
        to: Pid,
    ) {
        if let Some(handle) = self.shared.registry.get(to) {
            if handle.link_state(from) == Some(None) {
                handle.remove_link(from);
            }
        }
        let ack = Term::tuple(vec![
            Term::int(ctrl::UNLINK_ID_ACC),
            u64_to_term(id),
            Term::Pid(to),
            Term::Pid(from),
        ]);
        let _ = conn.send_ctrl(&ack, None);
    }

    /// UNLINK_ID_ACC: the peer confirmed our unlink; the entry goes away
    /// only if it still waits for exactly this id.
    pub(crate) fn remote_unlink_ack(&self, id: u64, from: Pid, to: Pid) {
        if let Some(handle) = self.shared.registry.get(to) {
            handle.complete_unlink(from, id);
        }
    }

    // === Connections ===

    /// Connects to `node` (`short@host`) via EPMD, or returns at once if
    /// already connected.
    pub async fn connect(&self, node: &str) -> Result<Atom, DistError> {
        let name = NodeName::parse(node)?;
        let atom = name.as_atom();
        self.ensure_connection(atom).await?;
        Ok(atom)
    }

    /// Runs the handshake over an already-open byte stream and attaches
    /// the resulting connection to this node.
    pub async fn connect_stream<S>(&self, stream: S) -> Result<Atom, DistError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        connection::establish(self.clone(), stream).await
    }

    /// The peers this node is currently connected to.
    pub fn nodes(&self) -> Vec<Atom> {
        self.shared
            .connections
            .iter()
            .map(|entry| *entry.key())
            .collect()
    }

    /// Closes the connection to `node`.
    pub fn disconnect(&self, node: Atom) -> Result<(), DistError> {
        if self.shared.connections.contains_key(&node) {
            self.connection_closed(node);
            Ok(())
        } else {
            Err(DistError::NotConnected(node))
        }
    }

    pub(crate) fn connection(&self, peer: Atom) -> Option<ConnectionHandle> {
        self.shared
            .connections
            .get(&peer)
            .map(|entry| entry.value().clone())
    }

    pub(crate) fn insert_connection(&self, conn: ConnectionHandle) {
        self.shared.connections.insert(conn.peer_name, conn);
    }

    /// Removes a connection and lets linked local processes observe the
    /// loss as `noconnection` exit signals.
    pub(crate) fn connection_closed(&self, peer: Atom) {
        if let Some((_, conn)) = self.shared.connections.remove(&peer) {
            conn.close();
            tracing::info!(node = %peer, "disconnected");
        }

        for pid in self.shared.registry.pids() {
            let Some(handle) = self.shared.registry.get(pid) else {
                continue;
            };
            for (linked, pending) in handle.links() {
                if linked.node() != Some(peer) {
                    continue;
                }
                handle.remove_link(linked);
                if pending.is_none() {
                    self.exit_signal(
                        pid,
                        ExitReason::Other(Term::atom("noconnection")),
                        true,
                        Some(linked),
                    );
                }
            }
        }
    }

    /// Looks up, or establishes on demand, the connection to `node_atom`.
    /// Blocks the caller until the handshake completes or fails.
    pub(crate) async fn ensure_connection(
        &self,
        node_atom: Atom,
    ) -> Result<ConnectionHandle, DistError> {
        if let Some(conn) = self.connection(node_atom) {
            return Ok(conn);
        }

        let name = NodeName::parse_atom(node_atom)?;
        let entry = epmd::lookup(name.host(), name.short()).await?;
        let stream = TcpStream::connect((name.host(), entry.port)).await?;
        let peer = connection::establish(self.clone(), stream).await?;
        self.connection(peer).ok_or(DistError::NotConnected(peer))
    }

    /// Whether `node_atom` names this side of any of our connections.
    fn is_local_node(&self, node_atom: Atom) -> bool {
        if node_atom == self.shared.name.as_atom() {
            return true;
        }
        self.shared
            .connections
            .iter()
            .any(|entry| entry.value().local_name == node_atom)
    }

    // === Shutdown ===

    /// Closes every connection and terminates every process.
    pub fn shutdown(&self) {
        let peers: Vec<Atom> = self.nodes();
        for peer in peers {
            if let Some((_, conn)) = self.shared.connections.remove(&peer) {
                conn.close();
            }
        }
        for handle in self.shared.registry.drain() {
            handle.mark_terminated(ExitReason::Killed);
            handle.abort_task();
        }
        tracing::info!("node shut down");
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.shared.name)
            .field("processes", &self.shared.registry.len())
            .field("connections", &self.shared.connections.len())
            .finish()
    }
}
