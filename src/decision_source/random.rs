use std::{thread, time::Duration};

use rand::{rngs::SmallRng, seq::IndexedRandom, Rng, SeedableRng};

use super::{DecisionContext, DecisionSource};
use crate::action::Action;

/// Sleeps a random think time, then picks one of the eight active actions uniformly.
#[derive(Debug)]
pub struct RandomSource {
    rng: SmallRng,
    max_think: Duration,
}

impl RandomSource {
    /// A source seeded with `seed`, thinking for less than `max_think` each round.
    pub fn new(seed: u64, max_think: Duration) -> Self {
        RandomSource {
            rng: SmallRng::seed_from_u64(seed),
            max_think,
        }
    }
}

// saturates instead of wrapping for durations beyond u64 microseconds
fn think_bound_micros(max_think: Duration) -> u64 {
    u64::try_from(max_think.as_micros()).unwrap_or(u64::MAX)
}

impl DecisionSource for RandomSource {
    fn decide(&mut self, _ctx: &DecisionContext) -> anyhow::Result<Action> {
        let max_micros = think_bound_micros(self.max_think);
        if max_micros > 0 {
            thread::sleep(Duration::from_micros(self.rng.random_range(0..max_micros)));
        }
        Ok(*Action::ACTIVE
            .choose(&mut self.rng)
            .unwrap_or(&Action::None))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use slotmap::{SecondaryMap, SlotMap};

    use super::*;
    use crate::{
        action::Team, agent::AgentId, decision_source::RoundView, grid::Position,
        snapshot::Snapshot,
    };

    #[test]
    fn same_seed_same_choices() {
        let mut keys: SlotMap<AgentId, ()> = SlotMap::with_key();
        let ctx = DecisionContext {
            round: 1,
            agent: keys.insert(()),
            team: Team::Red,
            position: Position::new(0, 0),
            view: Arc::new(RoundView::new(1, Snapshot::empty(1, 1), SecondaryMap::new())),
        };
        let mut a = RandomSource::new(42, Duration::ZERO);
        let mut b = RandomSource::new(42, Duration::ZERO);
        for _ in 0..20 {
            let action = a.decide(&ctx).unwrap();
            assert_ne!(action, Action::None);
            assert_eq!(action, b.decide(&ctx).unwrap());
        }
    }

    #[test]
    fn huge_think_time_saturates() {
        assert_eq!(think_bound_micros(Duration::from_millis(100)), 100_000);
        assert_eq!(think_bound_micros(Duration::MAX), u64::MAX);
        // 2^64 micros would wrap to zero and disable thinking
        let wrapping = Duration::from_micros(u64::MAX) + Duration::from_micros(1);
        assert_eq!(think_bound_micros(wrapping), u64::MAX);
    }
}
