//! Sparse position index of the board.
//!
//! The grid maps `row -> column -> AgentId`, both levels ordered, so iterating it visits cells
//! row-ascending then column-ascending. Round resolution depends on that order.

use std::{collections::BTreeMap, fmt::Display};

use rand::Rng;

use crate::{action::Direction, agent::AgentId, error::ArenaError};

/// Largest board, in cells, a world or a snapshot may have.
pub const MAX_CELLS: usize = 1 << 24;

/// A cell coordinate. Ordering is row first, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Row, 0 is the top edge.
    pub row: usize,
    /// Column, 0 is the left edge.
    pub col: usize,
}

impl Position {
    /// Shorthand constructor.
    pub const fn new(row: usize, col: usize) -> Position {
        Position { row, col }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}]", self.row, self.col)
    }
}

/// At most one agent per cell, every key inside `[0, height) x [0, width)`.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    rows: BTreeMap<usize, BTreeMap<usize, AgentId>>,
    len: usize,
}

impl Grid {
    /// An empty board.
    pub fn new(width: usize, height: usize) -> Grid {
        Grid {
            width,
            height,
            rows: BTreeMap::new(),
            len: 0,
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no cell is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `width * height`, saturating.
    pub fn capacity(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// True if `pos` lies on the board.
    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.row < self.height && pos.col < self.width
    }

    /// The agent at `pos`, if any.
    pub fn get(&self, pos: Position) -> Option<AgentId> {
        self.rows.get(&pos.row)?.get(&pos.col).copied()
    }

    /// Register `agent` at `pos`.
    pub fn place(&mut self, agent: AgentId, pos: Position) -> Result<(), ArenaError> {
        if !self.in_bounds(pos) {
            return Err(ArenaError::OutOfBounds { position: pos });
        }
        let row = self.rows.entry(pos.row).or_default();
        if row.contains_key(&pos.col) {
            return Err(ArenaError::CellOccupied { position: pos });
        }
        row.insert(pos.col, agent);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the agent at `pos`.
    pub fn remove(&mut self, pos: Position) -> Option<AgentId> {
        let row = self.rows.get_mut(&pos.row)?;
        let agent = row.remove(&pos.col)?;
        if row.is_empty() {
            self.rows.remove(&pos.row);
        }
        self.len -= 1;
        Some(agent)
    }

    /// Relocate the agent at `from` to the free cell `to`.
    pub fn move_to(&mut self, from: Position, to: Position) -> Result<AgentId, ArenaError> {
        if !self.in_bounds(to) {
            return Err(ArenaError::OutOfBounds { position: to });
        }
        if self.get(to).is_some() {
            return Err(ArenaError::CellOccupied { position: to });
        }
        let agent = self
            .remove(from)
            .ok_or(ArenaError::OutOfBounds { position: from })?;
        self.place(agent, to)?;
        Ok(agent)
    }

    /// The neighbour of `pos` in direction `dir`, or `None` past the board edge.
    pub fn step(&self, pos: Position, dir: Direction) -> Option<Position> {
        let next = match dir {
            Direction::Up => Position::new(pos.row.checked_sub(1)?, pos.col),
            Direction::Down => Position::new(pos.row + 1, pos.col),
            Direction::Left => Position::new(pos.row, pos.col.checked_sub(1)?),
            Direction::Right => Position::new(pos.row, pos.col + 1),
        };
        self.in_bounds(next).then_some(next)
    }

    /// Every cell strictly between `from` and the board edge in direction `dir`, nearest first.
    pub fn beam(&self, from: Position, dir: Direction) -> impl Iterator<Item = Position> + '_ {
        std::iter::successors(self.step(from, dir), move |p| self.step(*p, dir))
    }

    /// Occupied cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, AgentId)> + '_ {
        self.rows.iter().flat_map(|(row, cols)| {
            cols.iter()
                .map(move |(col, agent)| (Position::new(*row, *col), *agent))
        })
    }

    /// The first occupied cell strictly after `pos` in row-major order.
    ///
    /// Looked up against the current content, so cells filled since `pos` was visited are seen.
    pub fn next_after(&self, pos: Position) -> Option<(Position, AgentId)> {
        if let Some((col, agent)) = self
            .rows
            .get(&pos.row)
            .and_then(|cols| cols.range(pos.col + 1..).next())
        {
            return Some((Position::new(pos.row, *col), *agent));
        }
        self.rows
            .range(pos.row + 1..)
            .find_map(|(row, cols)| {
                cols.iter()
                    .next()
                    .map(|(col, agent)| (Position::new(*row, *col), *agent))
            })
    }

    /// The first occupied cell in row-major order.
    pub fn first(&self) -> Option<(Position, AgentId)> {
        self.iter().next()
    }

    /// Pick a free cell uniformly by rejection sampling: random row (retried while full), then
    /// random column (retried while occupied).
    ///
    /// Returns `None` only when the board is full.
    pub fn random_free_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Position> {
        if self.len >= self.capacity() {
            return None;
        }
        loop {
            let row = rng.random_range(0..self.height);
            let taken = self.rows.get(&row).map_or(0, BTreeMap::len);
            if taken >= self.width {
                continue;
            }
            let col = rng.random_range(0..self.width);
            let pos = Position::new(row, col);
            if self.get(pos).is_none() {
                return Some(pos);
            }
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.len = 0;
    }
}
