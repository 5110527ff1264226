#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    thread,
    time::Duration,
};

use tank_arena::prelude::*;

/// Decides with a closure over the decision context.
pub struct Policy<F>(pub F);

impl<F> DecisionSource for Policy<F>
where
    F: FnMut(&DecisionContext) -> Action + Send,
{
    fn decide(&mut self, ctx: &DecisionContext) -> anyhow::Result<Action> {
        Ok((self.0)(ctx))
    }
}

/// Always idles, counting its decisions.
pub struct Counting(pub Arc<AtomicUsize>);

impl DecisionSource for Counting {
    fn decide(&mut self, _ctx: &DecisionContext) -> anyhow::Result<Action> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Action::None)
    }
}

/// Fails as finished on every call, counting its calls.
pub struct Finishing(pub Arc<AtomicUsize>);

impl DecisionSource for Finishing {
    fn decide(&mut self, _ctx: &DecisionContext) -> anyhow::Result<Action> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::Error::new(SourceFinished).context("agent went away"))
    }
}

/// Never answers until interrupted.
#[derive(Default)]
pub struct Unresponsive {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl DecisionSource for Unresponsive {
    fn decide(&mut self, _ctx: &DecisionContext) -> anyhow::Result<Action> {
        let (lock, wake) = &*self.state;
        let guard = lock.lock().unwrap();
        let _guard = wake.wait_while(guard, |interrupted| !*interrupted).unwrap();
        anyhow::bail!("interrupted")
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let state = self.state.clone();
        Some(Interrupter::new(move || {
            let (lock, wake) = &*state;
            *lock.lock().unwrap() = true;
            wake.notify_all();
        }))
    }
}

/// Answers `action`, but only after `delay`.
pub struct Slow {
    pub delay: Duration,
    pub action: Action,
}

impl DecisionSource for Slow {
    fn decide(&mut self, _ctx: &DecisionContext) -> anyhow::Result<Action> {
        thread::sleep(self.delay);
        Ok(self.action)
    }
}

/// Idles, and counts how many instances were dropped.
pub struct DropProbe(pub Arc<AtomicUsize>);

impl DecisionSource for DropProbe {
    fn decide(&mut self, _ctx: &DecisionContext) -> anyhow::Result<Action> {
        Ok(Action::None)
    }
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds green tanks with `green` and red tanks with `red`.
pub fn by_team<G, R>(
    green: G,
    red: R,
) -> impl Fn(AgentId, Team, u64) -> anyhow::Result<Box<dyn DecisionSource>>
where
    G: Fn() -> Box<dyn DecisionSource>,
    R: Fn() -> Box<dyn DecisionSource>,
{
    move |_id, team, _seed| {
        Ok(match team {
            Team::Green => green(),
            Team::Red => red(),
        })
    }
}

/// Idle tank.
pub fn idle() -> Box<dyn DecisionSource> {
    Box::new(Policy(|_: &DecisionContext| Action::None))
}
