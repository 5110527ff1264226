//! Where tanks get their actions from.
//!
//! Each tank owns one [`DecisionSource`], driven by its own thread: the thread waits for the
//! coordinator's decide broadcast, calls [`DecisionSource::decide`] once, and reports the result.
//! The built-in sources are picked through [`SourceKind`]:
//!
//! - [`RandomSource`]: thinks for a random while, then picks a random action.
//! - [`ProcessSource`]: asks an external program over its stdin/stdout.
//! - [`RemoteSource`]: replays whatever an outside sender last submitted through a
//!   [`RemoteControl`].
//!
//! Library users may implement [`DecisionSource`] and [`SourceFactory`] themselves.

use std::{fmt::Debug, path::PathBuf, sync::Arc, time::Duration};

use slotmap::SecondaryMap;
use thiserror::Error;

use crate::{
    action::{Action, Team},
    agent::AgentId,
    grid::Position,
    snapshot::Snapshot,
};

mod process;
mod random;
mod remote;

pub use process::{AgentProcess, ProcessSource};
pub use random::RandomSource;
pub use remote::{RemoteControl, RemoteSource};

/// The board as it was when a round's decisions were requested. Shared by every tank.
#[derive(Debug, Clone)]
pub struct RoundView {
    round: u64,
    board: Snapshot,
    positions: SecondaryMap<AgentId, Position>,
}

impl RoundView {
    /// View of round `round`.
    pub fn new(round: u64, board: Snapshot, positions: SecondaryMap<AgentId, Position>) -> Self {
        RoundView {
            round,
            board,
            positions,
        }
    }

    /// Round the decisions are made for.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Board content.
    pub fn board(&self) -> &Snapshot {
        &self.board
    }

    /// Where `agent` stands, if it is alive.
    pub fn position_of(&self, agent: AgentId) -> Option<Position> {
        self.positions.get(agent).copied()
    }
}

/// Input of one decision.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    /// Round being decided.
    pub round: u64,
    /// Deciding tank.
    pub agent: AgentId,
    /// Its team.
    pub team: Team,
    /// Its cell.
    pub position: Position,
    /// The whole board.
    pub view: Arc<RoundView>,
}

/// Unblocks a source stuck in I/O, from the coordinator thread.
pub struct Interrupter(Box<dyn Fn() + Send + Sync>);

impl Interrupter {
    /// Wrap `f`. It may be called more than once.
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Interrupter(Box::new(f))
    }

    /// Run the interruption.
    pub fn interrupt(&self) {
        (self.0)()
    }
}

impl Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interrupter")
    }
}

/// Marks an error from [`DecisionSource::decide`] as final: the source will never decide again,
/// e.g. because its agent program exited. It may be attached as context to the underlying error.
///
/// The tank thread then drops the source and idles every later round without consulting it.
#[derive(Debug, Clone, Copy, Error)]
#[error("decision source finished")]
pub struct SourceFinished;

/// One tank's brain.
pub trait DecisionSource: Send {
    /// Compute the action for the round described by `ctx`.
    ///
    /// # Errors
    /// Any failure; the tank idles for this round. Errors carrying [`SourceFinished`] make it
    /// idle for good.
    fn decide(&mut self, ctx: &DecisionContext) -> anyhow::Result<Action>;

    /// A way to unblock `decide` when the tank is destroyed or the world torn down.
    ///
    /// Sources whose `decide` always returns promptly do not need one.
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }

    /// Handle through which an outside sender feeds this source, if it accepts one.
    fn remote_control(&self) -> Option<RemoteControl> {
        None
    }
}

/// Creates one [`DecisionSource`] per tank.
pub trait SourceFactory {
    /// Build the source of tank `agent`. `seed` is drawn from the world's RNG.
    ///
    /// # Errors
    /// The tank cannot be created; world initialization aborts.
    fn create(&self, agent: AgentId, team: Team, seed: u64)
        -> anyhow::Result<Box<dyn DecisionSource>>;
}

impl<F> SourceFactory for F
where
    F: Fn(AgentId, Team, u64) -> anyhow::Result<Box<dyn DecisionSource>>,
{
    fn create(
        &self,
        agent: AgentId,
        team: Team,
        seed: u64,
    ) -> anyhow::Result<Box<dyn DecisionSource>> {
        self(agent, team, seed)
    }
}

/// Built-in source selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// [`RandomSource`] thinking for up to `max_think`.
    Random {
        /// Exclusive upper bound of the simulated think time.
        max_think: Duration,
    },
    /// [`ProcessSource`] running `command args...`.
    Process {
        /// Executable.
        command: PathBuf,
        /// Arguments.
        args: Vec<String>,
        /// Let the child write to our stderr.
        allow_stderr: bool,
    },
    /// [`RemoteSource`].
    Remote,
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Random {
            max_think: Duration::from_millis(100),
        }
    }
}

impl SourceFactory for SourceKind {
    fn create(
        &self,
        agent: AgentId,
        _team: Team,
        seed: u64,
    ) -> anyhow::Result<Box<dyn DecisionSource>> {
        Ok(match self {
            SourceKind::Random { max_think } => Box::new(RandomSource::new(seed, *max_think)),
            SourceKind::Process {
                command,
                args,
                allow_stderr,
            } => Box::new(ProcessSource::launch(command, args, *allow_stderr).map_err(|e| {
                e.context(format!("could not start agent process for {agent:?}"))
            })?),
            SourceKind::Remote => Box::new(RemoteSource::new()),
        })
    }
}
