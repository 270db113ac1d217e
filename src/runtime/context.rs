//! Process execution context.
//!
//! Every spawned process receives a [`Context`]: its own PID, its mailbox,
//! and the node services: sending, spawning, linking, registration and
//! reference creation. The context owns the receiving half of the mailbox,
//! so only the process itself can drain it.

use super::error::{ReceiveError, RuntimeError};
use super::mailbox::Mailbox;
use crate::core::{ExitReason, Pid, Ref};
use crate::node::{Dest, NodeHandle};
use crate::atom::Atom;
use crate::term::Term;
use std::future::Future;
use std::time::Duration;

/// The execution context of a process.
pub struct Context {
    pid: Pid,
    mailbox: Mailbox,
    node: NodeHandle,
}

impl Context {
    pub(crate) fn new(pid: Pid, mailbox: Mailbox, node: NodeHandle) -> Self {
        Self { pid, mailbox, node }
    }

    /// This process's own PID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The node this process runs on.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    /// A fresh unique reference.
    pub fn make_ref(&self) -> Ref {
        self.node.make_ref()
    }

    /// Sends a message. Local destinations that do not exist swallow the
    /// message, matching Erlang send semantics; remote destinations may
    /// fail while a connection is established on demand.
    pub async fn send(&self, dest: impl Into<Dest>, message: Term) -> Result<(), RuntimeError> {
        self.node.route_send(self.pid, dest.into(), message).await
    }

    /// Takes the oldest message regardless of shape.
    pub async fn recv(&mut self) -> Result<Term, ReceiveError> {
        self.mailbox.next().await.ok_or(ReceiveError::Closed)
    }

    /// Selective receive: blocks until a message satisfies `matcher`.
    ///
    /// The closure is the receive's pattern arms. It returns `Some` for
    /// the first message it wants, which is removed from the mailbox;
    /// everything it rejects stays queued in order for later receives.
    pub async fn receive<R>(
        &mut self,
        matcher: impl FnMut(&Term) -> Option<R>,
    ) -> Result<R, ReceiveError> {
        self.mailbox.select(matcher).await
    }

    /// Selective receive with an `after` clause: gives up with
    /// [`ReceiveError::Timeout`] once `after` has elapsed.
    pub async fn receive_timeout<R>(
        &mut self,
        after: Duration,
        matcher: impl FnMut(&Term) -> Option<R>,
    ) -> Result<R, ReceiveError> {
        self.mailbox.select_timeout(after, matcher).await
    }

    /// Spawns a sibling process.
    pub fn spawn<F, Fut>(&self, f: F) -> Pid
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.node.spawn(f)
    }

    /// Spawns a process linked to this one.
    pub fn spawn_link<F, Fut>(&self, f: F) -> Pid
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.node.spawn_linked_to(self.pid, f)
    }

    /// Links this process to `peer` (local or remote).
    pub async fn link(&self, peer: Pid) -> Result<(), RuntimeError> {
        self.node.link(self.pid, peer).await
    }

    /// Dissolves a link to `peer`. A local unlink takes effect on both
    /// sides immediately; a remote one completes when the peer
    /// acknowledges our unlink id.
    pub async fn unlink(&self, peer: Pid) -> Result<(), RuntimeError> {
        self.node.unlink(self.pid, peer).await
    }

    /// Sends an exit signal to `peer`.
    pub fn exit(&self, peer: Pid, reason: ExitReason) {
        self.node
            .exit_signal(peer, reason, false, Some(self.pid));
    }

    /// Registers a name for this process; `false` if the name is taken.
    pub fn register(&self, name: Atom) -> bool {
        self.node.register(name, self.pid)
    }

    /// Drops a name registration.
    pub fn unregister(&self, name: Atom) -> Option<Pid> {
        self.node.unregister(name)
    }

    /// Looks up a registered name.
    pub fn whereis(&self, name: Atom) -> Option<Pid> {
        self.node.whereis(name)
    }

    /// Hands the scheduler back; other runnable processes get a turn.
    pub async fn yield_now(&self) {
        tokio::task::yield_now().await;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("pid", &self.pid).finish()
    }
}
