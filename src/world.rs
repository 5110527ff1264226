//! The coordinator.
//!
//! A [`World`] owns the board, the arena of tanks and one thread per tank. It drives rounds
//! strictly one after the other:
//!
//! 1. broadcast the board to every live tank and wait for their answers (bounded by the decision
//!    timeout; late tanks idle),
//! 2. resolve fire then moves (see [`resolver`](crate::resolver)),
//! 3. publish the new board through the [`SnapshotEmitter`],
//! 4. sleep for the round time.

use std::{fmt::Debug, sync::Arc, thread};

use anyhow::Context;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, info, instrument};

use crate::{
    action::{Action, Team},
    agent::{Agent, AgentHandle, AgentId},
    barrier::Barrier,
    configuration::Configuration,
    control::ControlFlags,
    decision_source::{RemoteControl, RoundView, SourceFactory},
    error::ArenaError,
    grid::Grid,
    resolver::{self, RoundReport},
    snapshot::{Snapshot, SnapshotEmitter},
};

/// Live tanks per team.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Survivors {
    /// Green tanks alive.
    pub green: usize,
    /// Red tanks alive.
    pub red: usize,
}

impl Survivors {
    /// Count for `team`.
    pub fn get(&self, team: Team) -> usize {
        match team {
            Team::Green => self.green,
            Team::Red => self.red,
        }
    }
}

/// Coordinator state: board, tanks, their threads and the synchronization barrier.
pub struct World {
    config: Configuration,
    factory: Box<dyn SourceFactory>,
    rng: SmallRng,
    round: u64,
    agents: SlotMap<AgentId, Agent>,
    handles: SecondaryMap<AgentId, AgentHandle>,
    grid: Grid,
    barrier: Barrier,
    emitter: SnapshotEmitter,
}

impl Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("round", &self.round)
            .field("width", &self.grid.width())
            .field("height", &self.grid.height())
            .field("live", &self.grid.len())
            .field("emitter", &self.emitter)
            .finish_non_exhaustive()
    }
}

impl World {
    /// An empty world (no tanks, round 0). Call [`World::init`] to populate it.
    ///
    /// # Errors
    /// The configuration is rejected by [`Configuration::validate`].
    pub fn new(
        config: &Configuration,
        factory: impl SourceFactory + 'static,
        emitter: SnapshotEmitter,
    ) -> anyhow::Result<World> {
        config.validate().context("invalid world configuration")?;
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Ok(World {
            config: config.clone(),
            factory: Box::new(factory),
            rng,
            round: 0,
            agents: SlotMap::with_key(),
            handles: SecondaryMap::new(),
            grid: Grid::new(config.width, config.height),
            barrier: Barrier::new(),
            emitter,
        })
    }

    /// Tear down any previous tanks, then create the green team and the red team at random free
    /// cells, each with its own thread, and publish the initial board.
    ///
    /// # Errors
    /// A tank's decision source or thread cannot be created. Every tank created so far is torn
    /// down again before returning.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> anyhow::Result<()> {
        self.shutdown();
        self.agents.clear();
        self.barrier = Barrier::new();
        self.round = 0;

        if let Err(e) = self.populate() {
            self.shutdown();
            return Err(e.context("World initialization failed"));
        }
        info!(
            green = self.config.green_tanks,
            red = self.config.red_tanks,
            "World initialized on a {}x{} board.",
            self.grid.width(),
            self.grid.height()
        );
        self.publish();
        Ok(())
    }

    fn populate(&mut self) -> anyhow::Result<()> {
        for team in [Team::Green, Team::Red] {
            for _ in 0..self.config.team_size(team) {
                self.create_agent(team)?;
            }
        }
        Ok(())
    }

    fn create_agent(&mut self, team: Team) -> anyhow::Result<AgentId> {
        let position = self
            .grid
            .random_free_cell(&mut self.rng)
            .ok_or(ArenaError::Overcrowded {
                requested: self.grid.len() + 1,
                capacity: self.grid.capacity(),
            })?;
        let seed: u64 = self.rng.random();
        let id = self
            .agents
            .insert_with_key(|id| Agent::new(id, team, position));

        let spawned = self
            .factory
            .create(id, team, seed)
            .and_then(|source| AgentHandle::spawn(id, team, source, &self.barrier));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.agents.remove(id);
                return Err(e.context(format!("could not create {team} tank at {position}")));
            }
        };
        self.handles.insert(id, handle);
        self.grid.place(id, position)?;
        debug!(agent = ?id, %team, %position, "tank created");
        Ok(id)
    }

    /// Play one round and return what happened.
    ///
    /// Tanks that do not answer within the decision timeout idle for the round and are listed in
    /// [`RoundReport::unresponsive`].
    #[instrument(skip(self), fields(round = self.round + 1))]
    pub fn perform_round(&mut self) -> RoundReport {
        self.round += 1;
        let round = self.round;
        info!("Round {round} starts.");

        let live: Vec<AgentId> = self.grid.iter().map(|(_, id)| id).collect();
        let view = Arc::new(self.round_view());
        let sequence = self.barrier.request_decisions(view);
        let readiness = self
            .barrier
            .await_all_ready(live, self.config.decision_timeout);

        for id in &readiness.ready {
            let action = self
                .handles
                .get(*id)
                .and_then(|handle| handle.mailbox().read(sequence))
                .unwrap_or_default();
            if let Some(agent) = self.agents.get_mut(*id) {
                agent.set_action(action);
            }
        }
        for id in &readiness.missing {
            info!(agent = ?id, round, "Tank did not answer in time, it idles this round.");
            if let Some(agent) = self.agents.get_mut(*id) {
                agent.set_action(Action::None);
            }
        }

        let mut report = RoundReport {
            round,
            unresponsive: readiness.missing,
            ..RoundReport::default()
        };
        resolver::resolve(&mut self.grid, &mut self.agents, &mut report);
        for destruction in &report.destroyed {
            if let Some(handle) = self.handles.get_mut(destruction.agent) {
                handle.retire();
            }
        }
        debug_assert!(self.invariants_hold(), "grid invariant broken after round {round}");

        if !report.destroyed.is_empty() {
            let survivors = self.survivors();
            debug!(green = survivors.green, red = survivors.red, "survivors");
        }
        self.publish();
        if !self.config.round_time.is_zero() {
            thread::sleep(self.config.round_time);
        }
        report
    }

    /// Shut down, then initialize again from round 0.
    ///
    /// # Errors
    /// See [`World::init`].
    pub fn restart(&mut self) -> anyhow::Result<()> {
        info!("Restarting world.");
        self.init()
    }

    /// Mark every tank dead, wake and join every tank thread, and empty the board.
    ///
    /// Idempotent.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) {
        for (_, handle) in self.handles.iter_mut() {
            handle.retire();
        }
        self.barrier.shutdown();
        for (_, handle) in self.handles.iter_mut() {
            handle.join();
        }
        if !self.handles.is_empty() {
            debug!(threads = self.handles.len(), "tank threads joined");
        }
        self.handles.clear();
        for agent in self.agents.values_mut() {
            agent.mark_destroyed();
        }
        self.grid.clear();
    }

    /// Play rounds until `control` requests termination, restarting when it requests a restart.
    /// The world is shut down when this returns.
    ///
    /// # Errors
    /// A restart failed.
    pub fn run(&mut self, control: &ControlFlags) -> anyhow::Result<()> {
        let result = self.run_rounds(control);
        self.shutdown();
        result
    }

    fn run_rounds(&mut self, control: &ControlFlags) -> anyhow::Result<()> {
        loop {
            if control.should_terminate() {
                info!("Termination requested after round {}.", self.round);
                return Ok(());
            }
            if control.take_restart() {
                self.restart().context("restart failed")?;
                continue;
            }
            self.perform_round();
        }
    }

    /// Handle feeding tank `id`, if its decision source accepts outside submissions.
    pub fn remote_control(&self, id: AgentId) -> Option<RemoteControl> {
        self.handles
            .get(id)
            .and_then(|handle| handle.remote_control().cloned())
    }

    /// Live tanks per team.
    pub fn survivors(&self) -> Survivors {
        let mut survivors = Survivors::default();
        for (_, id) in self.grid.iter() {
            match self.agents.get(id).map(Agent::team) {
                Some(Team::Green) => survivors.green += 1,
                Some(Team::Red) => survivors.red += 1,
                None => {}
            }
        }
        survivors
    }

    /// Current board.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.grid, &self.agents)
    }

    /// Record of tank `id`, dead or alive, if it belongs to the current epoch.
    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Live tanks in row-major order.
    pub fn live_agents(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.grid
            .iter()
            .filter_map(move |(_, id)| self.agents.get(id))
    }

    /// Rounds played since the last [`World::init`].
    pub fn round(&self) -> u64 {
        self.round
    }

    /// The board index.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Snapshots published and dropped so far, in that order.
    pub fn emitted(&self) -> (u64, u64) {
        (self.emitter.delivered(), self.emitter.dropped())
    }

    fn round_view(&self) -> RoundView {
        let mut positions = SecondaryMap::new();
        for (pos, id) in self.grid.iter() {
            positions.insert(id, pos);
        }
        RoundView::new(self.round, self.snapshot(), positions)
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.emitter.emit(&snapshot);
    }

    fn invariants_hold(&self) -> bool {
        let on_grid = self.grid.iter().all(|(pos, id)| {
            self.grid.in_bounds(pos)
                && self
                    .agents
                    .get(id)
                    .is_some_and(|a| a.is_alive() && a.position() == pos)
        });
        let live = self.agents.values().filter(|a| a.is_alive()).count();
        on_grid && live == self.grid.len()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown();
    }
}
