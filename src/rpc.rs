//! Synchronous RPC against remote nodes.
//!
//! Every distributed Erlang node runs a registered `rex` server that
//! executes `{call, Module, Function, Args, GroupLeader}` requests and
//! replies `{rex, Result}` to the caller. [`Context::rpc`] performs that
//! exchange inline from a process; [`NodeHandle::rpc`] wraps it in a
//! short-lived worker so that any caller gets a synchronous result with a
//! timeout; on expiry the worker is killed, taking any late reply down
//! with it.

use crate::atom;
use crate::atom::Atom;
use crate::core::ExitReason;
use crate::node::{Dest, NodeHandle};
use crate::runtime::{Context, ReceiveError, RuntimeError};
use crate::term::Term;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// How long [`NodeHandle::rpc`] waits before killing the worker.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from a remote call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No reply within the allowed time; the call may still have run on
    /// the remote node.
    #[error("rpc timed out")]
    Timeout,

    /// The worker process died before a reply arrived, for example when
    /// its connection closed.
    #[error("rpc worker terminated before replying")]
    Terminated,

    /// Routing the request failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Context {
    /// Calls `module:function(args)` on `node` and waits for the `rex`
    /// reply. `args` must be a proper list (use [`Term::Nil`] for no
    /// arguments).
    ///
    /// This blocks the calling process until the reply matches; callers
    /// that need a timeout should go through [`NodeHandle::rpc`].
    pub async fn rpc(
        &mut self,
        node: Atom,
        module: Atom,
        function: Atom,
        args: Term,
    ) -> Result<Term, RpcError> {
        let request = Term::tuple(vec![
            Term::Pid(self.pid()),
            Term::tuple(vec![
                Term::atom("call"),
                Term::Atom(module),
                Term::Atom(function),
                args,
                Term::atom("user"),
            ]),
        ]);
        self.send(Dest::RemoteName(atom!("rex"), node), request)
            .await?;

        let rex = atom!("rex");
        self.receive(move |t| match t.as_tuple() {
            Some([Term::Atom(tag), result]) if *tag == rex => Some(result.clone()),
            _ => None,
        })
        .await
        .map_err(|error: ReceiveError| match error {
            ReceiveError::Closed => RpcError::Terminated,
            ReceiveError::Timeout => RpcError::Timeout,
        })
    }
}

impl NodeHandle {
    /// Calls `module:function(args)` on `node` with the default timeout.
    pub async fn rpc(
        &self,
        node: Atom,
        module: Atom,
        function: Atom,
        args: Term,
    ) -> Result<Term, RpcError> {
        self.rpc_timeout(node, module, function, args, DEFAULT_RPC_TIMEOUT)
            .await
    }

    /// Calls `module:function(args)` on `node`, giving up after `timeout`.
    ///
    /// The exchange runs in a spawned worker process; on timeout the
    /// worker is killed so a late `{rex, _}` reply is discarded with its
    /// mailbox.
    pub async fn rpc_timeout(
        &self,
        node: Atom,
        module: Atom,
        function: Atom,
        args: Term,
        timeout: Duration,
    ) -> Result<Term, RpcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let worker = self.spawn(move |mut ctx| async move {
            let result = ctx.rpc(node, module, function, args).await;
            let _ = reply_tx.send(result);
        });

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Terminated),
            Err(_) => {
                self.exit(worker, ExitReason::Kill);
                Err(RpcError::Timeout)
            }
        }
    }
}
