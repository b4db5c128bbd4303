use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

/// Lifecycle of a session.
///
/// `Created -> Running -> ShuttingDown -> Closed`, or `Running -> Failed`
/// when the stream breaks. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    Running,
    ShuttingDown,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus the subscribers to notify on every transition.
pub(crate) struct StateCell {
    current: SessionState,
    subscribers: Vec<Sender<SessionState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            current: SessionState::Created,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn current(&self) -> SessionState {
        self.current
    }

    /// Move to `next` and fan the new state out to subscribers.
    ///
    /// Disconnected subscribers are pruned. Reaching a terminal state drops
    /// every sender so receivers observe the end of the stream.
    pub(crate) fn set(&mut self, next: SessionState) {
        self.current = next;
        self.subscribers.retain(|tx| tx.send(next).is_ok());
        if next.is_terminal() {
            self.subscribers.clear();
        }
    }

    pub(crate) fn subscribe(&mut self) -> Receiver<SessionState> {
        let (tx, rx) = mpsc::channel();
        if !self.current.is_terminal() {
            self.subscribers.push(tx);
        }
        rx
    }
}
