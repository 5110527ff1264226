//! Errors callers may want to match on.
//!
//! They are usually carried inside an [`anyhow::Error`]; use
//! `err.downcast_ref::<ArenaError>()` to recover them.

use std::path::PathBuf;

use thiserror::Error;

use crate::{action::Team, grid::Position};

/// Rejected configurations and grid misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// Width or height is zero.
    #[error("invalid board dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
    },
    /// A team size is negative.
    #[error("invalid tank count {count} for team {team}")]
    InvalidTeamCount {
        /// Offending team.
        team: Team,
        /// Requested count.
        count: i64,
    },
    /// More tanks requested than there are cells.
    #[error("{requested} tanks do not fit on a board of {capacity} cells")]
    Overcrowded {
        /// Total tanks requested.
        requested: usize,
        /// `width * height`.
        capacity: usize,
    },
    /// Position outside the board.
    #[error("position {position} is outside the board")]
    OutOfBounds {
        /// Offending position.
        position: Position,
    },
    /// Cell already holds a tank.
    #[error("cell {position} is already occupied")]
    CellOccupied {
        /// Offending position.
        position: Position,
    },
    /// Another coordinator holds the lock file.
    #[error("world pid {pid} is already running (lock file {path:?})")]
    AlreadyRunning {
        /// Pid recorded in the lock file.
        pid: u32,
        /// Lock file path.
        path: PathBuf,
    },
}
