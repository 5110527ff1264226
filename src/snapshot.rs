//! Board snapshots and where they are published.
//!
//! The textual format is `<width>,<height>,` followed by one entry per cell in row-major order,
//! each entry followed by a comma: `0` for an empty cell, otherwise the team marker
//! (`g` or `r`, see [`Team::marker`]).
//!
//! ```
//! use tank_arena::snapshot::Snapshot;
//!
//! let snapshot: Snapshot = "2,2,g,0,0,0,".parse().unwrap();
//! assert_eq!(snapshot.width(), 2);
//! assert_eq!(snapshot.to_string(), "2,2,g,0,0,0,");
//! ```
//!
//! Publishing goes through a [`SnapshotEmitter`], which never blocks the coordinator: a sink that
//! is not ready drops the snapshot for that round.

use std::{
    fmt::Display,
    io::{self, Write},
    str::FromStr,
    sync::mpsc::{SyncSender, TrySendError},
};

use anyhow::{bail, Context};
use slotmap::SlotMap;
use tracing::{info, warn};

use crate::{
    action::Team,
    agent::{Agent, AgentId},
    grid::{Grid, Position, MAX_CELLS},
};

/// Content of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// No tank.
    Empty,
    /// A live tank of the given team.
    Tank(Team),
}

/// Read-only picture of the board at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Snapshot {
    /// An all-empty board.
    pub fn empty(width: usize, height: usize) -> Snapshot {
        Snapshot {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
        }
    }

    /// Picture of `grid`, with team membership taken from `agents`.
    pub fn capture(grid: &Grid, agents: &SlotMap<AgentId, Agent>) -> Snapshot {
        let mut snapshot = Snapshot::empty(grid.width(), grid.height());
        for (pos, id) in grid.iter() {
            if let Some(agent) = agents.get(id) {
                snapshot.cells[pos.row * grid.width() + pos.col] = Cell::Tank(agent.team());
            }
        }
        snapshot
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Content of the cell at `pos`, `None` outside the board.
    pub fn cell(&self, pos: Position) -> Option<Cell> {
        if pos.row >= self.height || pos.col >= self.width {
            return None;
        }
        self.cells.get(pos.row * self.width + pos.col).copied()
    }

    /// Number of tanks of `team` on the board.
    pub fn count(&self, team: Team) -> usize {
        self.cells
            .iter()
            .filter(|c| **c == Cell::Tank(team))
            .count()
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},", self.width, self.height)?;
        for cell in &self.cells {
            match cell {
                Cell::Empty => write!(f, "0,")?,
                Cell::Tank(team) => write!(f, "{},", team.marker())?,
            }
        }
        Ok(())
    }
}

impl FromStr for Snapshot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim_end()
            .strip_suffix(',')
            .context("snapshot must end with a comma")?;
        let mut fields = body.split(',');
        let width: usize = fields
            .next()
            .context("missing width")?
            .parse()
            .context("invalid width")?;
        let height: usize = fields
            .next()
            .context("missing height")?
            .parse()
            .context("invalid height")?;

        let expected = match width.checked_mul(height) {
            Some(cells) if cells > 0 && cells <= MAX_CELLS => cells,
            _ => bail!("invalid board dimensions {width}x{height}"),
        };

        let mut cells = Vec::new();
        for field in fields {
            if cells.len() == expected {
                bail!("more than {expected} cells for a {width}x{height} board");
            }
            let mut chars = field.chars();
            let cell = match (chars.next(), chars.next()) {
                (Some('0'), None) => Cell::Empty,
                (Some(marker), None) => Cell::Tank(
                    Team::from_marker(marker)
                        .with_context(|| format!("unknown cell marker '{marker}'"))?,
                ),
                _ => bail!("malformed cell '{field}'"),
            };
            cells.push(cell);
        }
        if cells.len() != expected {
            bail!(
                "expected {expected} cells for a {width}x{height} board, got {}",
                cells.len()
            );
        }
        Ok(Snapshot {
            width,
            height,
            cells,
        })
    }
}

/// What happened to a published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The sink accepted it.
    Delivered,
    /// The sink was not ready; the snapshot is lost.
    Dropped,
}

/// A consumer of snapshot text. Implementations must not block for long.
pub trait SnapshotSink: Send {
    /// Hand `text` to the consumer, or report that it was dropped.
    ///
    /// # Errors
    /// Unexpected I/O failures. The emitter logs them and counts the snapshot as dropped.
    fn try_publish(&mut self, text: &str) -> io::Result<Publish>;
}

/// Publishes into any writer, flushing after each snapshot.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        WriterSink { writer }
    }

    /// Give the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> SnapshotSink for WriterSink<W> {
    fn try_publish(&mut self, text: &str) -> io::Result<Publish> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;
        Ok(Publish::Delivered)
    }
}

/// Publishes into a bounded channel; a full or closed channel drops the snapshot.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: SyncSender<String>,
}

impl ChannelSink {
    /// Wrap the sending half of a `std::sync::mpsc::sync_channel`.
    pub fn new(tx: SyncSender<String>) -> Self {
        ChannelSink { tx }
    }
}

impl SnapshotSink for ChannelSink {
    fn try_publish(&mut self, text: &str) -> io::Result<Publish> {
        match self.tx.try_send(text.to_owned()) {
            Ok(()) => Ok(Publish::Delivered),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                Ok(Publish::Dropped)
            }
        }
    }
}

#[cfg(unix)]
pub use fifo::FifoSink;

#[cfg(unix)]
mod fifo {
    use std::{
        ffi::CString,
        fs::{File, OpenOptions},
        io::{self, ErrorKind, Write},
        os::unix::{ffi::OsStrExt, fs::OpenOptionsExt},
        path::{Path, PathBuf},
    };

    use anyhow::{anyhow, Context};
    use tracing::{info, warn};

    use super::{Publish, SnapshotSink};

    /// Publishes into a named pipe opened in non-blocking mode.
    ///
    /// With no reader attached, or with the pipe full, snapshots are dropped. A snapshot larger
    /// than the pipe's atomic write size may reach a slow reader cut short.
    #[derive(Debug)]
    pub struct FifoSink {
        path: PathBuf,
        file: Option<File>,
        created: bool,
    }

    impl FifoSink {
        /// Use the FIFO at `path`, creating it if it does not exist.
        pub fn open(path: impl AsRef<Path>) -> anyhow::Result<FifoSink> {
            let path = path.as_ref().to_path_buf();
            let mut created = false;
            if !path.exists() {
                let raw = CString::new(path.as_os_str().as_bytes())
                    .context("pipe path contains a NUL byte")?;
                // SAFETY: `raw` is a valid NUL-terminated string for the duration of the call.
                if unsafe { libc::mkfifo(raw.as_ptr(), 0o600) } != 0 {
                    return Err(anyhow!(io::Error::last_os_error()))
                        .with_context(|| format!("mkfifo() with name {path:?} failed"));
                }
                created = true;
                info!(?path, "created snapshot pipe");
            }
            Ok(FifoSink {
                path,
                file: None,
                created,
            })
        }

        fn connect(&mut self) -> io::Result<Option<&mut File>> {
            if self.file.is_none() {
                match OpenOptions::new()
                    .write(true)
                    .custom_flags(libc::O_NONBLOCK)
                    .open(&self.path)
                {
                    Ok(file) => self.file = Some(file),
                    // no reader yet
                    Err(e) if e.raw_os_error() == Some(libc::ENXIO) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
            Ok(self.file.as_mut())
        }
    }

    impl SnapshotSink for FifoSink {
        fn try_publish(&mut self, text: &str) -> io::Result<Publish> {
            let Some(file) = self.connect()? else {
                return Ok(Publish::Dropped);
            };
            match file.write_all(text.as_bytes()) {
                Ok(()) => Ok(Publish::Delivered),
                Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Publish::Dropped),
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    self.file = None;
                    Ok(Publish::Dropped)
                }
                Err(e) => Err(e),
            }
        }
    }

    impl Drop for FifoSink {
        fn drop(&mut self) {
            self.file = None;
            if self.created {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!("could not remove snapshot pipe {:?}: {e}", self.path);
                }
            }
        }
    }
}

/// Sends each round's snapshot to an optional sink, counting what got through.
pub struct SnapshotEmitter {
    sink: Option<Box<dyn SnapshotSink>>,
    delivered: u64,
    dropped: u64,
}

impl std::fmt::Debug for SnapshotEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotEmitter")
            .field("has_sink", &self.sink.is_some())
            .field("delivered", &self.delivered)
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl SnapshotEmitter {
    /// Publish into `sink`.
    pub fn new(sink: impl SnapshotSink + 'static) -> SnapshotEmitter {
        SnapshotEmitter {
            sink: Some(Box::new(sink)),
            delivered: 0,
            dropped: 0,
        }
    }

    /// Discard every snapshot.
    pub fn disabled() -> SnapshotEmitter {
        SnapshotEmitter {
            sink: None,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Publish `snapshot`. Never fails; problems are logged and counted as drops.
    pub fn emit(&mut self, snapshot: &Snapshot) -> Publish {
        let Some(sink) = self.sink.as_mut() else {
            return Publish::Dropped;
        };
        let outcome = match sink.try_publish(&snapshot.to_string()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("snapshot sink failed: {e}");
                Publish::Dropped
            }
        };
        match outcome {
            Publish::Delivered => self.delivered += 1,
            Publish::Dropped => {
                self.dropped += 1;
                info!(dropped = self.dropped, "Snapshot dropped, sink not ready.");
            }
        }
        outcome
    }

    /// Snapshots accepted by the sink so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Snapshots lost so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
