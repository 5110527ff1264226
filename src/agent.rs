use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use anyhow::Context;
use slotmap::new_key_type;
use tracing::{debug, info, trace, warn};

use crate::{
    action::{Action, Team},
    barrier::{AgentLink, Barrier, Mailbox, Ready},
    decision_source::{DecisionContext, DecisionSource, Interrupter, RemoteControl, SourceFinished},
    grid::Position,
};

new_key_type! {
    /// Stable handle of a tank in the world's arena. Never reused within one world epoch.
    pub struct AgentId;
}

/// Coordinator-owned record of one tank.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    team: Team,
    position: Position,
    action: Action,
    alive: bool,
}

impl Agent {
    /// A live tank at `position` with no pending action.
    pub fn new(id: AgentId, team: Team, position: Position) -> Agent {
        Agent {
            id,
            team,
            position,
            action: Action::None,
            alive: true,
        }
    }

    /// Arena key.
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Team membership.
    pub fn team(&self) -> Team {
        self.team
    }

    /// Current cell. For a destroyed tank, the cell it died in.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Action collected for the round being resolved.
    pub fn action(&self) -> Action {
        self.action
    }

    /// False once destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Returns true the first time only.
    pub(crate) fn mark_destroyed(&mut self) -> bool {
        std::mem::replace(&mut self.alive, false)
    }
}

/// Coordinator-side proxy for the thread running one tank's decision source.
#[derive(Debug)]
pub(crate) struct AgentHandle {
    id: AgentId,
    alive: Arc<AtomicBool>,
    mailbox: Arc<Mailbox>,
    interrupter: Option<Interrupter>,
    remote: Option<RemoteControl>,
    thread: Option<JoinHandle<()>>,
}

impl AgentHandle {
    /// Start the decide loop of `source` on its own thread.
    ///
    /// The source is dropped if the thread cannot be spawned.
    pub(crate) fn spawn(
        id: AgentId,
        team: Team,
        source: Box<dyn DecisionSource>,
        barrier: &Barrier,
    ) -> anyhow::Result<AgentHandle> {
        let alive = Arc::new(AtomicBool::new(true));
        let mailbox = Arc::new(Mailbox::default());
        let interrupter = source.interrupter();
        let remote = source.remote_control();
        let link = barrier.link(id, mailbox.clone(), alive.clone());

        let thread = thread::Builder::new()
            .name(format!("tank-{team}-{id:?}"))
            .spawn(move || decide_loop(link, team, source))
            .context("could not spawn tank thread")?;

        Ok(AgentHandle {
            id,
            alive,
            mailbox,
            interrupter,
            remote,
            thread: Some(thread),
        })
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn remote_control(&self) -> Option<&RemoteControl> {
        self.remote.as_ref()
    }

    /// Mark the tank dead and unblock its source. The thread exits at the next broadcast.
    ///
    /// Idempotent.
    pub(crate) fn retire(&mut self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            trace!(agent = ?self.id, "retiring tank");
            if let Some(interrupter) = &self.interrupter {
                interrupter.interrupt();
            }
        }
    }

    /// Wait for the thread to finish. Only call after the barrier was shut down.
    pub(crate) fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(agent = ?self.id, "tank thread panicked");
            }
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.retire();
    }
}

fn decide_loop(link: AgentLink, team: Team, source: Box<dyn DecisionSource>) {
    let mut source = Some(source);
    let mut seen = 0;
    while let Some((sequence, view)) = link.signal.wait_next(seen) {
        seen = sequence;
        if !link.alive.load(Ordering::Acquire) {
            break;
        }
        let action = match (view.position_of(link.id), source.as_mut()) {
            (Some(position), Some(active)) => {
                let ctx = DecisionContext {
                    round: view.round(),
                    agent: link.id,
                    team,
                    position,
                    view: view.clone(),
                };
                match active.decide(&ctx) {
                    Ok(action) => action,
                    Err(e) if e.downcast_ref::<SourceFinished>().is_some() => {
                        info!(agent = ?link.id, "{e:#}, the tank idles from now on");
                        source = None;
                        Action::None
                    }
                    Err(e) => {
                        warn!(agent = ?link.id, "decision source failed: {e:#}");
                        Action::None
                    }
                }
            }
            // finished sources still answer, so rounds never wait on them
            _ => Action::None,
        };
        // a tank destroyed while deciding must not report anymore
        if !link.alive.load(Ordering::Acquire) {
            break;
        }
        link.mailbox.post(sequence, action);
        if link
            .ready
            .send(Ready {
                agent: link.id,
                sequence,
            })
            .is_err()
        {
            break;
        }
    }
    debug!(agent = ?link.id, "tank thread finished");
}
