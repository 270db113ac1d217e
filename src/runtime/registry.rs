//! The process table and name registry.
//!
//! Thread-safe maps from PID to process handle and from registered atom
//! name to PID. Removal from the table is the single point that makes a
//! process unreachable, so exit propagation takes a handle out *before*
//! signalling its links.

use super::process::ProcessHandle;
use crate::atom::Atom;
use crate::core::Pid;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of all live processes of this node.
#[derive(Clone, Default)]
pub(crate) struct ProcessRegistry {
    processes: Arc<DashMap<Pid, ProcessHandle>>,
    names: Arc<DashMap<Atom, Pid>>,
}

impl ProcessRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, handle: ProcessHandle) {
        self.processes.insert(handle.pid(), handle);
    }

    /// Removes a process and every name registered to it.
    pub(crate) fn remove(&self, pid: Pid) -> Option<ProcessHandle> {
        self.names.retain(|_, registered| *registered != pid);
        self.processes.remove(&pid).map(|(_, handle)| handle)
    }

    pub(crate) fn get(&self, pid: Pid) -> Option<ProcessHandle> {
        self.processes.get(&pid).map(|entry| entry.value().clone())
    }

    pub(crate) fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Registers `name` for `pid`; `false` if the name is taken.
    pub(crate) fn register_name(&self, name: Atom, pid: Pid) -> bool {
        if self.names.contains_key(&name) {
            return false;
        }
        self.names.insert(name, pid);
        true
    }

    pub(crate) fn whereis(&self, name: Atom) -> Option<Pid> {
        self.names.get(&name).map(|entry| *entry.value())
    }

    pub(crate) fn unregister_name(&self, name: Atom) -> Option<Pid> {
        self.names.remove(&name).map(|(_, pid)| pid)
    }

    pub(crate) fn registered_names(&self) -> Vec<Atom> {
        self.names.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn pids(&self) -> Vec<Pid> {
        self.processes.iter().map(|entry| *entry.key()).collect()
    }

    /// Empties the table, returning every handle; used at node shutdown.
    pub(crate) fn drain(&self) -> Vec<ProcessHandle> {
        let pids = self.pids();
        self.names.clear();
        pids.into_iter()
            .filter_map(|pid| self.processes.remove(&pid).map(|(_, handle)| handle))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.processes.len()
    }
}
