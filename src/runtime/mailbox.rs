//! Process mailboxes with selective receive.
//!
//! Messages arrive through an unbounded channel in send order. A receive
//! walks the mailbox from the oldest message and hands each one to the
//! caller's match closure; the first message the closure accepts is
//! removed, everything else stays put in its original order, parked in a
//! private queue that the *next* receive will walk again from the top. A
//! single receive never re-examines a message it has already rejected.

use super::error::ReceiveError;
use crate::term::Term;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

/// The receiving half of a mailbox, owned by the process itself.
pub(crate) struct Mailbox {
    rx: mpsc::UnboundedReceiver<Term>,
    /// Messages rejected by earlier receives, still in arrival order.
    saved: VecDeque<Term>,
}

/// The sending half, cloned into every party that delivers to the process.
#[derive(Clone)]
pub(crate) struct MailboxSender {
    tx: mpsc::UnboundedSender<Term>,
}

impl Mailbox {
    pub(crate) fn new() -> (Self, MailboxSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                saved: VecDeque::new(),
            },
            MailboxSender { tx },
        )
    }

    /// Takes the oldest message regardless of its shape.
    pub(crate) async fn next(&mut self) -> Option<Term> {
        if let Some(message) = self.saved.pop_front() {
            return Some(message);
        }
        self.rx.recv().await
    }

    /// Blocks until a message matches, with no time limit.
    pub(crate) async fn select<R>(
        &mut self,
        mut matcher: impl FnMut(&Term) -> Option<R>,
    ) -> Result<R, ReceiveError> {
        if let Some(result) = self.scan_saved(&mut matcher) {
            return Ok(result);
        }
        loop {
            let message = self.rx.recv().await.ok_or(ReceiveError::Closed)?;
            match matcher(&message) {
                Some(result) => return Ok(result),
                None => self.saved.push_back(message),
            }
        }
    }

    /// Blocks until a message matches or `after` elapses. The timer is
    /// armed on entry, so time spent rejecting messages counts against it.
    pub(crate) async fn select_timeout<R>(
        &mut self,
        after: Duration,
        mut matcher: impl FnMut(&Term) -> Option<R>,
    ) -> Result<R, ReceiveError> {
        if let Some(result) = self.scan_saved(&mut matcher) {
            return Ok(result);
        }
        let deadline = Instant::now() + after;
        loop {
            let received = timeout_at(deadline, self.rx.recv())
                .await
                .map_err(|_| ReceiveError::Timeout)?;
            let message = received.ok_or(ReceiveError::Closed)?;
            match matcher(&message) {
                Some(result) => return Ok(result),
                None => self.saved.push_back(message),
            }
        }
    }

    /// One pass over the parked messages, oldest first.
    fn scan_saved<R>(&mut self, matcher: &mut impl FnMut(&Term) -> Option<R>) -> Option<R> {
        for i in 0..self.saved.len() {
            if let Some(result) = matcher(&self.saved[i]) {
                self.saved.remove(i);
                return Some(result);
            }
        }
        None
    }
}

impl MailboxSender {
    /// Appends a message; `false` if the owning process is gone.
    pub(crate) fn deliver(&self, message: Term) -> bool {
        self.tx.send(message).is_ok()
    }
}
