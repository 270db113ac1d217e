//! Process handles and shared per-process state.
//!
//! A [`ProcessHandle`] is the cloneable outside view of a process: message
//! delivery, the link list, and the abort handle of the backing task. The
//! link list is the authoritative local half of every link this process
//! participates in; an entry carrying an unlink id is a link we asked to
//! tear down and are still awaiting the peer's acknowledgement for.

use super::mailbox::MailboxSender;
use crate::core::{ExitReason, Pid};
use crate::term::Term;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Mutable state shared between a process and its handles.
pub(crate) struct ProcessState {
    /// Linked peers, each with the id of an outstanding unlink request,
    /// if any.
    links: HashMap<Pid, Option<u64>>,
    /// Set once, when the process is taken out of the table.
    terminated: bool,
    exit_reason: Option<ExitReason>,
}

impl ProcessState {
    fn new() -> Self {
        Self {
            links: HashMap::new(),
            terminated: false,
            exit_reason: None,
        }
    }
}

/// A handle to a running process.
#[derive(Clone)]
pub(crate) struct ProcessHandle {
    pid: Pid,
    sender: MailboxSender,
    state: Arc<Mutex<ProcessState>>,
    abort: AbortHandle,
}

impl ProcessHandle {
    pub(crate) fn new(pid: Pid, sender: MailboxSender, abort: AbortHandle) -> Self {
        Self {
            pid,
            sender,
            state: Arc::new(Mutex::new(ProcessState::new())),
            abort,
        }
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    /// Appends a message to the mailbox; delivery to a terminated process
    /// is silently dropped.
    pub(crate) fn deliver(&self, message: Term) {
        let _ = self.sender.deliver(message);
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.state.lock().terminated
    }

    pub(crate) fn exit_reason(&self) -> Option<ExitReason> {
        self.state.lock().exit_reason.clone()
    }

    /// Adds a link entry; `false` if the peer was already linked.
    pub(crate) fn add_link(&self, peer: Pid) -> bool {
        let mut state = self.state.lock();
        match state.links.get(&peer) {
            // A stray LINK while an unlink is in flight reactivates the
            // entry; the pending ack will no longer remove it.
            Some(Some(_)) => {
                state.links.insert(peer, None);
                true
            }
            Some(None) => false,
            None => {
                state.links.insert(peer, None);
                true
            }
        }
    }

    /// Removes a link entry; `false` if there was none.
    pub(crate) fn remove_link(&self, peer: Pid) -> bool {
        self.state.lock().links.remove(&peer).is_some()
    }

    /// The pending-unlink state of a link: `None` when there is no entry,
    /// `Some(None)` for an active link, `Some(Some(id))` while an unlink
    /// awaits its acknowledgement.
    pub(crate) fn link_state(&self, peer: Pid) -> Option<Option<u64>> {
        self.state.lock().links.get(&peer).copied()
    }

    /// Marks a link as awaiting unlink acknowledgement `id`.
    pub(crate) fn set_unlink_pending(&self, peer: Pid, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.links.get_mut(&peer) {
            Some(pending) => {
                *pending = Some(id);
                true
            }
            None => false,
        }
    }

    /// Removes the link if it is waiting for exactly this unlink id.
    pub(crate) fn complete_unlink(&self, peer: Pid, id: u64) -> bool {
        let mut state = self.state.lock();
        if state.links.get(&peer) == Some(&Some(id)) {
            state.links.remove(&peer);
            true
        } else {
            false
        }
    }

    /// A snapshot of the link list.
    pub(crate) fn links(&self) -> Vec<(Pid, Option<u64>)> {
        self.state
            .lock()
            .links
            .iter()
            .map(|(pid, pending)| (*pid, *pending))
            .collect()
    }

    /// Drains the link list for exit propagation.
    pub(crate) fn take_links(&self) -> Vec<(Pid, Option<u64>)> {
        self.state.lock().links.drain().collect()
    }

    /// Records the exit reason; `true` only on the first call.
    pub(crate) fn mark_terminated(&self, reason: ExitReason) -> bool {
        let mut state = self.state.lock();
        if state.terminated {
            return false;
        }
        state.terminated = true;
        state.exit_reason = Some(reason);
        true
    }

    /// Cancels the backing task.
    pub(crate) fn abort_task(&self) {
        self.abort.abort();
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish()
    }
}
