use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};

use tank_arena::{
    configuration::Configuration,
    control::{ControlFlags, PidLock},
    error::ArenaError,
    logger::{init_logger, LogTarget},
    snapshot::{FifoSink, SnapshotEmitter},
    world::World,
};

fn main() -> ExitCode {
    let config = match Configuration::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tank-arena: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let target = if config.log() {
        LogTarget::File
    } else {
        LogTarget::Stderr
    };
    if let Err(e) = init_logger(target) {
        eprintln!("tank-arena: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ArenaError>() {
            Some(ArenaError::AlreadyRunning { pid, .. }) => {
                info!("Another world (pid {pid}) is already running, exiting.");
                ExitCode::SUCCESS
            }
            _ => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(config: &Configuration) -> anyhow::Result<()> {
    let _lock = PidLock::acquire(config.pid_file())?;

    let control = ControlFlags::new();
    control.register_signals()?;

    let emitter = match config.pipe() {
        Some(path) => SnapshotEmitter::new(FifoSink::open(path)?),
        None => SnapshotEmitter::disabled(),
    };
    let mut world = World::new(config, config.source().clone(), emitter)?;
    world.init().context("could not start the world")?;
    info!(pid = std::process::id(), "World running.");
    world.run(&control)
}
