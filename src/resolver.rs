//! Deterministic resolution of one round.
//!
//! Resolution runs in two passes over the grid, both in row-major order:
//!
//! 1. **Fire.** Every beam is traced against the grid as it was at the start of the round, so
//!    tanks can destroy each other simultaneously. A beam destroys *every* tank between the
//!    shooter and the board edge, never the shooter itself. Victims are only flagged here.
//! 2. **Move and cleanup.** The grid is walked in place. Flagged tanks are removed. A mover
//!    leaving the board is destroyed; a mover whose destination is occupied (by a tank that moved
//!    there earlier in this pass, or one not visited yet) is destroyed together with the occupant,
//!    leaving the destination empty; otherwise it relocates and its action is cleared, so it idles
//!    if the walk reaches it again at its new cell.

use slotmap::SlotMap;
use tracing::info;

use crate::{
    action::{Action, Direction},
    agent::{Agent, AgentId},
    grid::{Grid, Position},
};

/// Why a tank was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Caught in the beam fired by the tank at `shooter`.
    Hit {
        /// Shooter's cell.
        shooter: Position,
    },
    /// Collided with the tank at `other` (either as the mover or as the occupant).
    Crash {
        /// The other tank's cell.
        other: Position,
    },
    /// Moved past the board edge.
    RolledOff,
}

/// A tank destroyed during the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destruction {
    /// Who.
    pub agent: AgentId,
    /// Where it was standing.
    pub position: Position,
    /// Why.
    pub cause: Cause,
}

/// A tank that changed cell during the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Who.
    pub agent: AgentId,
    /// Old cell.
    pub from: Position,
    /// New cell.
    pub to: Position,
}

/// Everything that happened in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Round number.
    pub round: u64,
    /// Destroyed tanks, each listed once, in the order they were destroyed.
    pub destroyed: Vec<Destruction>,
    /// Tanks that moved.
    pub moved: Vec<Relocation>,
    /// Tanks that did not answer in time and idled.
    pub unresponsive: Vec<AgentId>,
}

impl RoundReport {
    /// True if `agent` was destroyed this round.
    pub fn was_destroyed(&self, agent: AgentId) -> bool {
        self.destroyed.iter().any(|d| d.agent == agent)
    }
}

/// Apply every tank's pending action to `grid`.
///
/// Tanks in `agents` that are not on the grid are ignored. After the call, every tank left on the
/// grid is alive, stands where its record says, and has [`Action::None`] pending.
pub fn resolve(grid: &mut Grid, agents: &mut SlotMap<AgentId, Agent>, report: &mut RoundReport) {
    fire_phase(grid, agents, report);
    move_phase(grid, agents, report);
}

fn destroy(
    agents: &mut SlotMap<AgentId, Agent>,
    report: &mut RoundReport,
    agent: AgentId,
    position: Position,
    cause: Cause,
) {
    if let Some(a) = agents.get_mut(agent) {
        if a.mark_destroyed() {
            report.destroyed.push(Destruction {
                agent,
                position,
                cause,
            });
        }
    }
}

fn fire_phase(grid: &Grid, agents: &mut SlotMap<AgentId, Agent>, report: &mut RoundReport) {
    let shots: Vec<(Position, Direction)> = grid
        .iter()
        .filter_map(|(pos, id)| match agents.get(id).map(Agent::action) {
            Some(Action::Fire(dir)) => Some((pos, dir)),
            _ => None,
        })
        .collect();

    for (shooter, dir) in shots {
        for cell in grid.beam(shooter, dir) {
            if let Some(victim) = grid.get(cell) {
                info!("Aggressor at {shooter} destroys tank at {cell}.");
                destroy(agents, report, victim, cell, Cause::Hit { shooter });
            }
        }
    }
}

fn move_phase(grid: &mut Grid, agents: &mut SlotMap<AgentId, Agent>, report: &mut RoundReport) {
    let mut cursor = grid.first();
    while let Some((pos, id)) = cursor {
        step(grid, agents, report, pos, id);
        cursor = grid.next_after(pos);
    }
}

fn step(
    grid: &mut Grid,
    agents: &mut SlotMap<AgentId, Agent>,
    report: &mut RoundReport,
    pos: Position,
    id: AgentId,
) {
    let Some(agent) = agents.get_mut(id) else {
        grid.remove(pos);
        return;
    };
    if !agent.is_alive() {
        grid.remove(pos);
        return;
    }
    let action = agent.action();
    agent.set_action(Action::None);

    let Action::Move(dir) = action else {
        return;
    };

    let Some(dest) = grid.step(pos, dir) else {
        info!("Tank at {pos} rolled off the map.");
        grid.remove(pos);
        destroy(agents, report, id, pos, Cause::RolledOff);
        return;
    };

    if let Some(occupant) = grid.get(dest) {
        info!("Tank at {pos} crashed into tank at {dest}.");
        grid.remove(pos);
        grid.remove(dest);
        destroy(agents, report, id, pos, Cause::Crash { other: dest });
        destroy(agents, report, occupant, dest, Cause::Crash { other: pos });
        return;
    }

    if grid.move_to(pos, dest).is_ok() {
        if let Some(agent) = agents.get_mut(id) {
            agent.set_position(dest);
        }
        report.moved.push(Relocation {
            agent: id,
            from: pos,
            to: dest,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Team;

    struct Board {
        grid: Grid,
        agents: SlotMap<AgentId, Agent>,
    }

    impl Board {
        fn new(width: usize, height: usize) -> Board {
            Board {
                grid: Grid::new(width, height),
                agents: SlotMap::with_key(),
            }
        }

        fn tank(&mut self, row: usize, col: usize, action: Action) -> AgentId {
            let pos = Position::new(row, col);
            let id = self
                .agents
                .insert_with_key(|id| Agent::new(id, Team::Green, pos));
            self.agents[id].set_action(action);
            self.grid.place(id, pos).unwrap();
            id
        }

        fn resolve(&mut self) -> RoundReport {
            let mut report = RoundReport::default();
            resolve(&mut self.grid, &mut self.agents, &mut report);
            self.check_invariants();
            report
        }

        fn check_invariants(&self) {
            let mut seen = std::collections::HashSet::new();
            for (pos, id) in self.grid.iter() {
                assert!(self.grid.in_bounds(pos));
                assert!(seen.insert(id), "tank listed twice");
                let agent = &self.agents[id];
                assert!(agent.is_alive());
                assert_eq!(agent.position(), pos);
                assert_eq!(agent.action(), Action::None);
            }
            let live = self.agents.values().filter(|a| a.is_alive()).count();
            assert_eq!(live, self.grid.len());
        }

        fn at(&self, row: usize, col: usize) -> Option<AgentId> {
            self.grid.get(Position::new(row, col))
        }
    }

    use Direction::*;

    #[test]
    fn beam_up_destroys_target_not_shooter() {
        let mut b = Board::new(3, 3);
        let target = b.tank(0, 1, Action::None);
        let shooter = b.tank(1, 1, Action::Fire(Up));
        let report = b.resolve();
        assert_eq!(b.at(0, 1), None);
        assert_eq!(b.at(1, 1), Some(shooter));
        assert!(!b.agents[target].is_alive());
        assert_eq!(
            report.destroyed,
            vec![Destruction {
                agent: target,
                position: Position::new(0, 1),
                cause: Cause::Hit {
                    shooter: Position::new(1, 1)
                },
            }]
        );
    }

    #[test]
    fn beam_hits_every_tank_in_path() {
        let mut b = Board::new(5, 1);
        b.tank(0, 0, Action::Fire(Right));
        let first = b.tank(0, 2, Action::None);
        let second = b.tank(0, 4, Action::None);
        let report = b.resolve();
        assert!(report.was_destroyed(first));
        assert!(report.was_destroyed(second));
        assert_eq!(b.grid.len(), 1);
    }

    #[test]
    fn simultaneous_beams_destroy_each_other() {
        let mut b = Board::new(1, 4);
        let top = b.tank(0, 0, Action::Fire(Down));
        let bottom = b.tank(3, 0, Action::Fire(Up));
        let report = b.resolve();
        assert!(report.was_destroyed(top));
        assert!(report.was_destroyed(bottom));
        assert!(b.grid.is_empty());
    }

    #[test]
    fn victim_hit_twice_is_reported_once() {
        let mut b = Board::new(3, 3);
        let victim = b.tank(1, 1, Action::None);
        b.tank(1, 0, Action::Fire(Right));
        b.tank(0, 1, Action::Fire(Down));
        let report = b.resolve();
        assert_eq!(report.destroyed.len(), 1);
        assert_eq!(report.destroyed[0].agent, victim);
    }

    #[test]
    fn beams_left_and_down_reach_edges() {
        let mut b = Board::new(3, 3);
        let shooter = b.tank(2, 2, Action::Fire(Left));
        let left = b.tank(2, 0, Action::None);
        let top = b.tank(0, 0, Action::Fire(Down));
        let report = b.resolve();
        assert!(report.was_destroyed(left));
        assert!(!report.was_destroyed(shooter));
        assert!(!report.was_destroyed(top));
        assert_eq!(b.grid.len(), 2);
    }

    #[test]
    fn moving_off_left_edge_destroys() {
        let mut b = Board::new(3, 3);
        let id = b.tank(1, 0, Action::Move(Left));
        let report = b.resolve();
        assert_eq!(report.destroyed[0].cause, Cause::RolledOff);
        assert!(!b.agents[id].is_alive());
        assert!(b.grid.is_empty());
    }

    #[test]
    fn rolling_off_each_edge() {
        let mut b = Board::new(2, 2);
        b.tank(0, 0, Action::Move(Up));
        b.tank(0, 1, Action::Move(Right));
        b.tank(1, 0, Action::Move(Down));
        let report = b.resolve();
        assert_eq!(report.destroyed.len(), 3);
        assert!(report.destroyed.iter().all(|d| d.cause == Cause::RolledOff));
    }

    #[test]
    fn head_on_crash_empties_both_cells() {
        let mut b = Board::new(5, 5);
        let left = b.tank(2, 2, Action::Move(Right));
        let right = b.tank(2, 3, Action::Move(Left));
        let report = b.resolve();
        assert!(report.was_destroyed(left));
        assert!(report.was_destroyed(right));
        assert_eq!(b.at(2, 2), None);
        assert_eq!(b.at(2, 3), None);
        assert!(b.grid.is_empty());
    }

    #[test]
    fn crash_into_tank_that_moved_earlier() {
        let mut b = Board::new(3, 3);
        // (0,1) moves down into (1,1) first, then (1,0) moves right into it
        let first = b.tank(0, 1, Action::Move(Down));
        let second = b.tank(1, 0, Action::Move(Right));
        let report = b.resolve();
        assert!(report.was_destroyed(first));
        assert!(report.was_destroyed(second));
        assert_eq!(b.at(1, 1), None);
        assert_eq!(report.moved.len(), 1);
    }

    #[test]
    fn moved_tank_does_not_move_again() {
        let mut b = Board::new(4, 4);
        let down = b.tank(0, 0, Action::Move(Down));
        let right = b.tank(3, 0, Action::Move(Right));
        let report = b.resolve();
        assert_eq!(b.at(1, 0), Some(down));
        assert_eq!(b.at(3, 1), Some(right));
        assert_eq!(b.agents[down].position(), Position::new(1, 0));
        assert_eq!(report.moved.len(), 2);
    }

    #[test]
    fn following_tank_crashes_into_stationary_leader() {
        let mut b = Board::new(4, 1);
        // the leader at column 2 has not moved yet when column 1 is visited
        let follower = b.tank(0, 1, Action::Move(Right));
        let leader = b.tank(0, 2, Action::Move(Right));
        let report = b.resolve();
        assert!(report.was_destroyed(follower));
        assert!(report.was_destroyed(leader));
    }

    #[test]
    fn leader_moving_up_clears_way_for_follower() {
        let mut b = Board::new(1, 4);
        // rows are visited top-down: the leader leaves row 1 before the follower arrives
        let leader = b.tank(1, 0, Action::Move(Up));
        let follower = b.tank(2, 0, Action::Move(Up));
        b.resolve();
        assert_eq!(b.at(0, 0), Some(leader));
        assert_eq!(b.at(1, 0), Some(follower));
    }

    #[test]
    fn crash_into_hit_tank_reports_it_once() {
        let mut b = Board::new(3, 1);
        let shooter = b.tank(0, 0, Action::Fire(Right));
        let mover = b.tank(0, 1, Action::None);
        let victim = b.tank(0, 2, Action::None);
        b.agents[mover].set_action(Action::Move(Right));
        let report = b.resolve();
        // the beam hits both, nothing left to move
        assert!(report.was_destroyed(mover));
        assert!(report.was_destroyed(victim));
        assert!(!report.was_destroyed(shooter));
        assert_eq!(report.destroyed.len(), 2);
    }

    #[test]
    fn mover_crashing_into_hit_tank_is_destroyed() {
        let mut b = Board::new(3, 3);
        let mover = b.tank(0, 0, Action::Move(Down));
        let victim = b.tank(1, 0, Action::None);
        b.tank(1, 2, Action::Fire(Left));
        let report = b.resolve();
        assert!(report.was_destroyed(mover));
        let victim_reports: Vec<_> = report
            .destroyed
            .iter()
            .filter(|d| d.agent == victim)
            .collect();
        assert_eq!(victim_reports.len(), 1);
        assert!(matches!(victim_reports[0].cause, Cause::Hit { .. }));
        assert_eq!(b.grid.len(), 1);
    }

    #[test]
    fn idle_tanks_stay() {
        let mut b = Board::new(2, 2);
        let id = b.tank(1, 1, Action::None);
        let report = b.resolve();
        assert_eq!(b.at(1, 1), Some(id));
        assert!(report.destroyed.is_empty());
        assert!(report.moved.is_empty());
    }
}
