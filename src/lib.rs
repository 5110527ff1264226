//! # Tank Arena
//!
//! A discrete-time grid arena where independently scheduled "tank" agents fight in synchronized
//! rounds.
//!
//! It provides:
//! - A coordinator ([`World`](crate::world::World)) driving rounds strictly one after the other
//! - A two-phase broadcast/readiness protocol ([`barrier`]) so that every tank decides exactly once
//!   per round against the same board
//! - Deterministic resolution of the collected actions ([`resolver`]): every beam first, then every
//!   move, in row-major order
//! - Pluggable decision sources ([`decision_source`]): in-process random tanks, external programs
//!   over a pipe, or actions submitted remotely
//! - A textual board feed ([`snapshot`]) that never blocks the coordinator
//!
//! Each tank runs on its own OS thread. A tank that does not answer within the round's decision
//! timeout simply idles for that round.
//!
//! # Documentation Overview
//!
//! - For the round loop, initialization and teardown, see [`World`](crate::world::World).
//! - For what a round does to the board, see [`resolver`].
//! - For the configuration and its environment variables, see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For writing your own tank, implement [`DecisionSource`](crate::decision_source::DecisionSource)
//!   and pass a [`SourceFactory`](crate::decision_source::SourceFactory) to the world.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tank_arena::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new()
//!         .with_dimensions(8, 8)
//!         .with_team_size(Team::Green, 4)
//!         .with_team_size(Team::Red, 4)
//!         .with_round_time(Duration::from_millis(200));
//!
//!     let (tx, rx) = std::sync::mpsc::sync_channel(16);
//!     let emitter = SnapshotEmitter::new(ChannelSink::new(tx));
//!     let mut world = World::new(&config, SourceKind::default(), emitter)?;
//!     world.init()?;
//!
//!     for _ in 0..10 {
//!         let report = world.perform_round();
//!         println!("round {}: {} destroyed", report.round, report.destroyed.len());
//!     }
//!     while let Ok(board) = rx.try_recv() {
//!         println!("{board}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Example Agent Program
//!
//! With [`SourceKind::Process`](crate::decision_source::SourceKind::Process), every tank runs
//! its own copy of an external program. Each round, the program receives one line on stdin:
//!
//! ```text
//! <round> <row> <col> <width>,<height>,<cell>,<cell>,...,
//! ```
//!
//! and answers with a two-character action code on stdout (`mu`, `md`, `ml`, `mr`, `fu`, `fd`,
//! `fl`, `fr`, or `no`), without a newline. Anything else counts as idling.
#![warn(missing_docs)]

pub use anyhow;

pub mod action;
mod agent;
pub mod barrier;
pub mod configuration;
pub mod control;
pub mod decision_source;
pub mod error;
pub mod grid;
pub mod logger;
pub mod resolver;
pub mod snapshot;
pub mod world;

pub use agent::{Agent, AgentId};

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use tank_arena::prelude::*;
/// ```
pub mod prelude {
    pub use crate::action::{Action, Direction, Team};
    pub use crate::agent::{Agent, AgentId};
    pub use crate::configuration::Configuration;
    pub use crate::control::{ControlFlags, PidLock};
    pub use crate::decision_source::{
        DecisionContext, DecisionSource, Interrupter, RemoteControl, SourceFactory,
        SourceFinished, SourceKind,
    };
    pub use crate::error::ArenaError;
    pub use crate::resolver::{Cause, RoundReport};
    pub use crate::snapshot::{ChannelSink, Snapshot, SnapshotEmitter, WriterSink};
    pub use crate::world::{Survivors, World};
}
