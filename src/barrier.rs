//! Two-phase round synchronization between the coordinator and the agents.
//!
//! 1. [`Barrier::request_decisions`] publishes the round view and wakes every agent thread blocked
//!    in [`DecideSignal::wait_next`].
//! 2. Each agent computes one action, stores it in its single-slot [`Mailbox`] and then sends a
//!    [`Ready`] message on the readiness channel.
//! 3. [`Barrier::await_all_ready`] collects readiness messages until every expected agent has
//!    answered or the timeout elapses.
//!
//! Every broadcast carries a sequence number. Mailbox entries and readiness messages are tagged
//! with it, so an answer that arrives after the coordinator gave up on a round is discarded
//! instead of being read as the answer to the next one.

use std::{
    collections::HashSet,
    sync::{
        atomic::AtomicBool,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Condvar, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use tracing::{trace, warn};

use crate::{action::Action, agent::AgentId, decision_source::RoundView};

#[derive(Debug, Default)]
struct Broadcast {
    sequence: u64,
    view: Option<Arc<RoundView>>,
    closed: bool,
}

/// The "decide now" signal agents block on between rounds.
#[derive(Debug, Default)]
pub(crate) struct DecideSignal {
    state: Mutex<Broadcast>,
    wake: Condvar,
}

impl DecideSignal {
    fn publish(&self, view: Arc<RoundView>) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sequence += 1;
        state.view = Some(view);
        self.wake.notify_all();
        state.sequence
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        state.view = None;
        self.wake.notify_all();
    }

    /// Block until a broadcast newer than `seen` is published.
    ///
    /// Returns `None` once the signal is closed.
    pub(crate) fn wait_next(&self, seen: u64) -> Option<(u64, Arc<RoundView>)> {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self
            .wake
            .wait_while(guard, |s| !s.closed && s.sequence <= seen)
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.view.clone().map(|view| (state.sequence, view))
    }
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    sequence: u64,
    action: Action,
}

/// Single-slot storage for an agent's latest decision.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    slot: Mutex<Option<Decision>>,
}

impl Mailbox {
    /// Written by the agent thread, once per broadcast, before it signals readiness.
    pub(crate) fn post(&self, sequence: u64, action: Action) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Decision { sequence, action });
    }

    /// Read by the coordinator after it observed the matching readiness message.
    pub(crate) fn read(&self, sequence: u64) -> Option<Action> {
        let decision = *self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        decision
            .filter(|d| d.sequence == sequence)
            .map(|d| d.action)
    }
}

/// Readiness message sent by an agent thread after posting to its mailbox.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ready {
    pub agent: AgentId,
    pub sequence: u64,
}

/// Everything an agent thread needs to take part in the protocol.
#[derive(Debug)]
pub(crate) struct AgentLink {
    pub id: AgentId,
    pub signal: Arc<DecideSignal>,
    pub mailbox: Arc<Mailbox>,
    pub ready: Sender<Ready>,
    pub alive: Arc<AtomicBool>,
}

/// Outcome of [`Barrier::await_all_ready`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Agents whose answer for this round was observed.
    pub ready: Vec<AgentId>,
    /// Agents that did not answer within the timeout.
    pub missing: Vec<AgentId>,
}

/// Coordinator side of the round synchronization.
#[derive(Debug)]
pub struct Barrier {
    signal: Arc<DecideSignal>,
    ready_tx: Sender<Ready>,
    ready_rx: Receiver<Ready>,
    sequence: u64,
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Barrier {
    /// A barrier with no broadcast issued yet.
    pub fn new() -> Barrier {
        let (ready_tx, ready_rx) = mpsc::channel();
        Barrier {
            signal: Arc::new(DecideSignal::default()),
            ready_tx,
            ready_rx,
            sequence: 0,
        }
    }

    pub(crate) fn link(
        &self,
        id: AgentId,
        mailbox: Arc<Mailbox>,
        alive: Arc<AtomicBool>,
    ) -> AgentLink {
        AgentLink {
            id,
            signal: self.signal.clone(),
            mailbox,
            ready: self.ready_tx.clone(),
            alive,
        }
    }

    /// Sequence number of the latest broadcast (0 before the first one).
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wake every agent so it decides against `view`.
    pub fn request_decisions(&mut self, view: Arc<RoundView>) -> u64 {
        self.sequence = self.signal.publish(view);
        trace!(sequence = self.sequence, "decisions requested");
        self.sequence
    }

    /// Block until every agent in `expected` has signaled readiness for the latest broadcast, or
    /// until `timeout` elapses. `None` waits without bound.
    pub fn await_all_ready(
        &self,
        expected: impl IntoIterator<Item = AgentId>,
        timeout: Option<Duration>,
    ) -> Readiness {
        let expected: Vec<AgentId> = expected.into_iter().collect();
        let mut pending: HashSet<AgentId> = expected.iter().copied().collect();
        let deadline = timeout.map(|t| Instant::now() + t);

        while !pending.is_empty() {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match self.ready_rx.recv_timeout(remaining) {
                        Ok(ready) => ready,
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.ready_rx.recv() {
                    Ok(ready) => ready,
                    Err(_) => break,
                },
            };
            if received.sequence != self.sequence {
                trace!(agent = ?received.agent, sequence = received.sequence, "stale readiness ignored");
                continue;
            }
            pending.remove(&received.agent);
        }

        let (ready, missing): (Vec<_>, Vec<_>) =
            expected.into_iter().partition(|id| !pending.contains(id));
        for id in &missing {
            warn!(agent = ?id, sequence = self.sequence, "agent did not answer in time");
        }
        Readiness { ready, missing }
    }

    /// Close the decide signal for good, waking every agent so it can observe its death.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        self.signal.close();
    }
}
