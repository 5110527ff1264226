use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use super::{DecisionContext, DecisionSource};
use crate::action::Action;

/// Feeds a [`RemoteSource`] from outside the world, e.g. from a network listener.
#[derive(Debug, Clone, Default)]
pub struct RemoteControl {
    pending: Arc<Mutex<Option<Action>>>,
}

impl RemoteControl {
    /// Queue the action given by a two-character `code`, replacing any earlier submission
    /// not consumed yet.
    ///
    /// # Errors
    /// `code` is not part of the action vocabulary; the pending action is left untouched.
    pub fn submit(&self, code: &str) -> anyhow::Result<Action> {
        let action: Action = code.parse()?;
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(action);
        Ok(action)
    }

    fn take(&self) -> Option<Action> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Plays the latest action submitted through its [`RemoteControl`], idling otherwise.
#[derive(Debug, Default)]
pub struct RemoteSource {
    control: RemoteControl,
}

impl RemoteSource {
    /// A source with nothing submitted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Another handle on the control.
    pub fn control(&self) -> RemoteControl {
        self.control.clone()
    }
}

impl DecisionSource for RemoteSource {
    fn decide(&mut self, ctx: &DecisionContext) -> anyhow::Result<Action> {
        let action = self.control.take().unwrap_or_default();
        trace!(agent = ?ctx.agent, %action, "remote action consumed");
        Ok(action)
    }

    fn remote_control(&self) -> Option<RemoteControl> {
        Some(self.control())
    }
}
