//! Config for the world behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive; set them to `"true"` to enable.
//!
//! - `ARENA_WIDTH`, `ARENA_HEIGHT`: board size (default: `10` x `10`)
//! - `ARENA_GREEN_TANKS`, `ARENA_RED_TANKS`: team sizes (default: `3` each)
//! - `ARENA_ROUND_TIME_MS`: pause after each round (default: `500`)
//! - `ARENA_DECISION_TIMEOUT_MS`: how long a round waits for answers; `none` waits forever
//!   (default: `1000`)
//! - `ARENA_SEED`: seed for placement and random tanks (default: drawn from the OS)
//! - `ARENA_SOURCE`: `random`, `process` or `remote` (default: `random`)
//! - `ARENA_MAX_THINK_MS`: upper bound of a random tank's think time (default: `100`)
//! - `ARENA_AGENT_COMMAND`, `ARENA_AGENT_ARGS`: program (and whitespace-separated arguments) run
//!   by every `process` tank
//! - `ARENA_PIPE`: named pipe receiving snapshots (default: none)
//! - `ARENA_PID_FILE`: singleton lock file (default: `arena.pid`)
//! - `ARENA_LOG`: log to a file instead of stderr (default: `false`)
//! - `ARENA_DEBUG_AGENT_STDERR`: let agent processes print to stderr (default: `false`)

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context};

use crate::{action::Team, decision_source::SourceKind, error::ArenaError, grid::MAX_CELLS};

/// Configuration for world behaviors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) green_tanks: i64,
    pub(crate) red_tanks: i64,
    pub(crate) round_time: Duration,
    pub(crate) decision_timeout: Option<Duration>,
    pub(crate) seed: Option<u64>,
    pub(crate) source: SourceKind,
    pub(crate) pipe: Option<PathBuf>,
    pub(crate) pid_file: PathBuf,
    pub(crate) log: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The board is 10x10 with three tanks per team.
    /// - Rounds are 500ms apart and wait at most one second for answers.
    /// - Tanks pick random actions after thinking for less than 100ms.
    /// - No snapshot pipe, and logs go to stderr.
    pub fn new() -> Self {
        Self {
            width: 10,
            height: 10,
            green_tanks: 3,
            red_tanks: 3,
            round_time: Duration::from_millis(500),
            decision_timeout: Some(Duration::from_secs(1)),
            seed: None,
            source: SourceKind::default(),
            pipe: None,
            pid_file: PathBuf::from("arena.pid"),
            log: false,
        }
    }

    /// Create configuration from environment variables (see the module documentation).
    ///
    /// # Errors
    /// A variable is set to a value that does not parse, or `ARENA_SOURCE=process` is given
    /// without `ARENA_AGENT_COMMAND`. Range checks are left to [`Configuration::validate`].
    pub fn from_env() -> anyhow::Result<Self> {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_parsed<T>(var: &str) -> anyhow::Result<Option<T>>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match env::var(var) {
                Ok(val) => val
                    .trim()
                    .parse()
                    .map(Some)
                    .with_context(|| format!("invalid value '{val}' for {var}")),
                Err(_) => Ok(None),
            }
        }

        let defaults = Self::new();
        let millis = |var: &str| -> anyhow::Result<Option<Duration>> {
            Ok(get_env_parsed::<u64>(var)?.map(Duration::from_millis))
        };

        let decision_timeout = match env::var("ARENA_DECISION_TIMEOUT_MS") {
            Ok(val) if val.trim().eq_ignore_ascii_case("none") => None,
            _ => millis("ARENA_DECISION_TIMEOUT_MS")?.or(defaults.decision_timeout),
        };

        let allow_stderr = get_env_flag("ARENA_DEBUG_AGENT_STDERR", false);
        let source = match env::var("ARENA_SOURCE")
            .unwrap_or_else(|_| "random".to_owned())
            .to_ascii_lowercase()
            .as_str()
        {
            "random" => SourceKind::Random {
                max_think: millis("ARENA_MAX_THINK_MS")?.unwrap_or(Duration::from_millis(100)),
            },
            "process" => {
                let Ok(command) = env::var("ARENA_AGENT_COMMAND") else {
                    bail!("ARENA_SOURCE=process requires ARENA_AGENT_COMMAND");
                };
                SourceKind::Process {
                    command: PathBuf::from(command),
                    args: env::var("ARENA_AGENT_ARGS")
                        .map(|args| args.split_whitespace().map(str::to_owned).collect())
                        .unwrap_or_default(),
                    allow_stderr,
                }
            }
            "remote" => SourceKind::Remote,
            other => bail!("unknown ARENA_SOURCE '{other}' (expected random, process or remote)"),
        };

        Ok(Self {
            width: get_env_parsed("ARENA_WIDTH")?.unwrap_or(defaults.width),
            height: get_env_parsed("ARENA_HEIGHT")?.unwrap_or(defaults.height),
            green_tanks: get_env_parsed("ARENA_GREEN_TANKS")?.unwrap_or(defaults.green_tanks),
            red_tanks: get_env_parsed("ARENA_RED_TANKS")?.unwrap_or(defaults.red_tanks),
            round_time: millis("ARENA_ROUND_TIME_MS")?.unwrap_or(defaults.round_time),
            decision_timeout,
            seed: get_env_parsed("ARENA_SEED")?,
            source,
            pipe: env::var_os("ARENA_PIPE").map(PathBuf::from),
            pid_file: env::var_os("ARENA_PID_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.pid_file),
            log: get_env_flag("ARENA_LOG", false),
        })
    }

    /// Check the board can be built: positive dimensions, at most [`MAX_CELLS`] cells,
    /// non-negative team sizes, and enough cells for every tank.
    pub fn validate(&self) -> Result<(), ArenaError> {
        let invalid = ArenaError::InvalidDimensions {
            width: self.width,
            height: self.height,
        };
        let capacity = match self.width.checked_mul(self.height) {
            Some(cells) if cells > 0 && cells <= MAX_CELLS => cells,
            _ => return Err(invalid),
        };
        for (team, count) in [(Team::Green, self.green_tanks), (Team::Red, self.red_tanks)] {
            if count < 0 {
                return Err(ArenaError::InvalidTeamCount { team, count });
            }
        }
        let requested = (self.green_tanks as u64).saturating_add(self.red_tanks as u64);
        if requested > capacity as u64 {
            return Err(ArenaError::Overcrowded {
                requested: usize::try_from(requested).unwrap_or(usize::MAX),
                capacity,
            });
        }
        Ok(())
    }

    /// Set the board size.
    pub fn with_dimensions(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the number of tanks of `team`.
    pub fn with_team_size(mut self, team: Team, count: i64) -> Self {
        match team {
            Team::Green => self.green_tanks = count,
            Team::Red => self.red_tanks = count,
        }
        self
    }

    /// Set the pause after each round.
    pub fn with_round_time(mut self, value: Duration) -> Self {
        self.round_time = value;
        self
    }

    /// Set how long a round waits for answers. `None` waits forever.
    pub fn with_decision_timeout(mut self, value: Option<Duration>) -> Self {
        self.decision_timeout = value;
        self
    }

    /// Fix the RNG seed, making placement and random tanks reproducible.
    pub fn with_seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    /// Select the built-in decision source used by the binary.
    pub fn with_source(mut self, value: SourceKind) -> Self {
        self.source = value;
        self
    }

    /// Publish snapshots to the named pipe at `path`.
    pub fn with_pipe(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipe = Some(path.into());
        self
    }

    /// Set the singleton lock file.
    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = path.into();
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Board width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Board height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of tanks in `team`. Negative until validated.
    pub fn team_size(&self, team: Team) -> i64 {
        match team {
            Team::Green => self.green_tanks,
            Team::Red => self.red_tanks,
        }
    }

    /// Selected decision source.
    pub fn source(&self) -> &SourceKind {
        &self.source
    }

    /// Snapshot pipe, if any.
    pub fn pipe(&self) -> Option<&PathBuf> {
        self.pipe.as_ref()
    }

    /// Singleton lock file.
    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    /// Whether logs go to a file.
    pub fn log(&self) -> bool {
        self.log
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Configuration::new();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.width(), 10);
        assert_eq!(config.team_size(Team::Red), 3);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let config = Configuration::new().with_dimensions(0, 5);
        assert_eq!(
            config.validate(),
            Err(ArenaError::InvalidDimensions {
                width: 0,
                height: 5
            })
        );
    }

    #[test]
    fn oversized_board_is_rejected() {
        let config = Configuration::new()
            .with_dimensions(1 << 33, 1 << 33)
            .with_team_size(Team::Green, 1)
            .with_team_size(Team::Red, 0);
        assert_eq!(
            config.validate(),
            Err(ArenaError::InvalidDimensions {
                width: 1 << 33,
                height: 1 << 33
            })
        );

        let wide = Configuration::new().with_dimensions(MAX_CELLS + 1, 1);
        assert!(matches!(
            wide.validate(),
            Err(ArenaError::InvalidDimensions { .. })
        ));
        let largest = Configuration::new().with_dimensions(MAX_CELLS, 1);
        assert_eq!(largest.validate(), Ok(()));
    }

    #[test]
    fn negative_team_is_rejected() {
        let config = Configuration::new().with_team_size(Team::Red, -1);
        assert_eq!(
            config.validate(),
            Err(ArenaError::InvalidTeamCount {
                team: Team::Red,
                count: -1
            })
        );
    }

    #[test]
    fn overcrowded_board_is_rejected() {
        let config = Configuration::new()
            .with_dimensions(2, 2)
            .with_team_size(Team::Green, 3)
            .with_team_size(Team::Red, 2);
        assert_eq!(
            config.validate(),
            Err(ArenaError::Overcrowded {
                requested: 5,
                capacity: 4
            })
        );
    }

    #[test]
    fn full_board_is_accepted() {
        let config = Configuration::new()
            .with_dimensions(2, 2)
            .with_team_size(Team::Green, 2)
            .with_team_size(Team::Red, 2);
        assert_eq!(config.validate(), Ok(()));
    }
}
