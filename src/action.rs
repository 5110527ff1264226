//! Actions a tank can choose each round, and the teams tanks belong to.
//!
//! External decision sources speak a two-character vocabulary:
//!
//! | code | action |
//! |------|--------|
//! | `mu` `md` `ml` `mr` | move up / down / left / right |
//! | `fu` `fd` `fl` `fr` | fire up / down / left / right |
//! | `no` | stay idle (also implied when nothing is received in time) |

use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;

/// One of the four cardinal directions. `Up` is towards row 0, `Left` towards column 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards row 0.
    Up,
    /// Towards the last row.
    Down,
    /// Towards column 0.
    Left,
    /// Towards the last column.
    Right,
}

impl Direction {
    fn code(self) -> char {
        match self {
            Direction::Up => 'u',
            Direction::Down => 'd',
            Direction::Left => 'l',
            Direction::Right => 'r',
        }
    }

    fn from_code(c: u8) -> Option<Direction> {
        match c {
            b'u' => Some(Direction::Up),
            b'd' => Some(Direction::Down),
            b'l' => Some(Direction::Left),
            b'r' => Some(Direction::Right),
            _ => None,
        }
    }
}

/// The action chosen by a tank for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    /// Stay in place.
    #[default]
    None,
    /// Move one cell in the given direction.
    Move(Direction),
    /// Fire a beam towards the board edge in the given direction.
    Fire(Direction),
}

impl Action {
    /// Every action except [`Action::None`], in a fixed order.
    pub const ACTIVE: [Action; 8] = [
        Action::Move(Direction::Up),
        Action::Move(Direction::Down),
        Action::Move(Direction::Right),
        Action::Move(Direction::Left),
        Action::Fire(Direction::Up),
        Action::Fire(Direction::Down),
        Action::Fire(Direction::Right),
        Action::Fire(Direction::Left),
    ];

    /// Parse a raw two-byte code. Anything unrecognised is [`Action::None`].
    pub fn from_code_lossy(code: &[u8]) -> Action {
        match code {
            [b'm', d] => Direction::from_code(*d).map_or(Action::None, Action::Move),
            [b'f', d] => Direction::from_code(*d).map_or(Action::None, Action::Fire),
            _ => Action::None,
        }
    }

    /// The two-character code of this action.
    pub fn code(self) -> String {
        self.to_string()
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "no"),
            Action::Move(d) => write!(f, "m{}", d.code()),
            Action::Fire(d) => write!(f, "f{}", d.code()),
        }
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    /// Strict parsing, used where a caller wants to reject garbage instead of idling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "no" {
            return Ok(Action::None);
        }
        match Action::from_code_lossy(s.as_bytes()) {
            Action::None => Err(anyhow!("unknown action code '{s}'")),
            action => Ok(action),
        }
    }
}

/// Team membership. Team A is green, team B is red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    /// Team A.
    Green,
    /// Team B.
    Red,
}

impl Team {
    /// Single-letter marker used in board snapshots.
    pub fn marker(self) -> char {
        match self {
            Team::Green => 'g',
            Team::Red => 'r',
        }
    }

    /// Inverse of [`Team::marker`].
    pub fn from_marker(c: char) -> Option<Team> {
        match c {
            'g' => Some(Team::Green),
            'r' => Some(Team::Red),
            _ => None,
        }
    }
}

impl Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::Green => write!(f, "green"),
            Team::Red => write!(f, "red"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_vocabulary() {
        let codes: Vec<String> = Action::ACTIVE.iter().map(|a| a.code()).collect();
        assert_eq!(codes, ["mu", "md", "mr", "ml", "fu", "fd", "fr", "fl"]);
        assert_eq!(Action::None.code(), "no");
    }

    #[test]
    fn lossy_parsing_idles_on_garbage() {
        assert_eq!(Action::from_code_lossy(b"fl"), Action::Fire(Direction::Left));
        assert_eq!(Action::from_code_lossy(b"mx"), Action::None);
        assert_eq!(Action::from_code_lossy(b"m"), Action::None);
        assert_eq!(Action::from_code_lossy(b"zz"), Action::None);
    }

    #[test]
    fn strict_parsing_rejects_garbage() {
        assert_eq!("md".parse::<Action>().unwrap(), Action::Move(Direction::Down));
        assert_eq!("no\n".parse::<Action>().unwrap(), Action::None);
        assert!("xx".parse::<Action>().is_err());
        assert!("".parse::<Action>().is_err());
    }

    #[test]
    fn team_markers() {
        assert_eq!(Team::from_marker(Team::Green.marker()), Some(Team::Green));
        assert_eq!(Team::from_marker(Team::Red.marker()), Some(Team::Red));
        assert_eq!(Team::from_marker('0'), None);
    }
}
