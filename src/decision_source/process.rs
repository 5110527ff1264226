use std::{
    io::{self, BufWriter, ErrorKind, Read, Write},
    path::Path,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{anyhow, Context};
use tracing::{instrument, trace, warn};

use super::{DecisionContext, DecisionSource, Interrupter, SourceFinished};
use crate::action::Action;

/// A child process that is killed and reaped on drop.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    cleaned_up: bool,
}

impl AgentProcess {
    /// Spawn `command args...` with piped stdin and stdout.
    ///
    /// stderr is discarded unless `allow_stderr` is set.
    pub fn launch(
        command: &Path,
        args: &[String],
        allow_stderr: bool,
    ) -> anyhow::Result<(AgentProcess, ChildStdin, ChildStdout)> {
        let mut cmd = Command::new(command);
        cmd.args(args).stdin(Stdio::piped()).stdout(Stdio::piped());
        if !allow_stderr {
            cmd.stderr(Stdio::null());
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("command '{}' not found", command.display()))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("child process has no stdin/stdout pipe"));
        };
        Ok((
            AgentProcess {
                child,
                cleaned_up: false,
            },
            stdin,
            stdout,
        ))
    }

    /// OS pid of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Kill the child if it still runs, then reap it. Idempotent.
    pub fn try_kill(&mut self) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        if self
            .child
            .try_wait()
            .context("could not poll process")?
            .is_none()
        {
            self.child.kill().context("could not kill process")?;
        }
        self.child.wait().context("could not reap process")?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        if let Err(e) = self.try_kill() {
            warn!("could not clean up agent process {}: {e:#}", self.child.id());
        }
    }
}

/// Asks an external program for each decision.
///
/// Per round one request line is written to the program's stdin:
///
/// ```text
/// <round> <row> <col> <snapshot>\n
/// ```
///
/// and exactly two bytes, an action code, are read back from its stdout.
#[derive(Debug)]
pub struct ProcessSource {
    process: Arc<Mutex<AgentProcess>>,
    stdin: BufWriter<ChildStdin>,
    stdout: ChildStdout,
}

impl ProcessSource {
    /// Start the program.
    pub fn launch(
        command: &Path,
        args: &[String],
        allow_stderr: bool,
    ) -> anyhow::Result<ProcessSource> {
        let (process, stdin, stdout) = AgentProcess::launch(command, args, allow_stderr)?;
        trace!(pid = process.id(), "agent process started");
        Ok(ProcessSource {
            process: Arc::new(Mutex::new(process)),
            stdin: BufWriter::new(stdin),
            stdout,
        })
    }
}

// a closed pipe means the program is gone for good
fn pipe_error(e: io::Error, context: &'static str) -> anyhow::Error {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => anyhow::Error::new(e)
            .context("connection closed by agent")
            .context(SourceFinished),
        _ => anyhow::Error::new(e).context(context),
    }
}

impl DecisionSource for ProcessSource {
    #[instrument(skip_all, fields(round = ctx.round))]
    fn decide(&mut self, ctx: &DecisionContext) -> anyhow::Result<Action> {
        writeln!(
            self.stdin,
            "{} {} {} {}",
            ctx.round,
            ctx.position.row,
            ctx.position.col,
            ctx.view.board()
        )
        .and_then(|_| self.stdin.flush())
        .map_err(|e| pipe_error(e, "I/O error while sending request"))?;

        let mut code = [0u8; 2];
        self.stdout
            .read_exact(&mut code)
            .map_err(|e| pipe_error(e, "I/O error while reading answer"))?;
        Ok(Action::from_code_lossy(&code))
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let process = self.process.clone();
        Some(Interrupter::new(move || {
            let mut process = process.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = process.try_kill() {
                warn!("could not kill agent process {}: {e:#}", process.id());
            }
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use slotmap::{SecondaryMap, SlotMap};

    use super::*;
    use crate::{
        action::{Direction, Team},
        agent::AgentId,
        decision_source::RoundView,
        grid::Position,
        snapshot::Snapshot,
    };

    fn ctx(round: u64) -> DecisionContext {
        let mut keys: SlotMap<AgentId, ()> = SlotMap::with_key();
        DecisionContext {
            round,
            agent: keys.insert(()),
            team: Team::Green,
            position: Position::new(0, 1),
            view: Arc::new(RoundView::new(round, Snapshot::empty(2, 1), SecondaryMap::new())),
        }
    }

    fn sh(script: &str) -> ProcessSource {
        ProcessSource::launch(Path::new("sh"), &["-c".to_owned(), script.to_owned()], false)
            .unwrap()
    }

    #[test]
    fn reads_one_code_per_request() {
        let mut source = sh("while read -r round row col board; do printf fd; done");
        assert_eq!(source.decide(&ctx(1)).unwrap(), Action::Fire(Direction::Down));
        assert_eq!(source.decide(&ctx(2)).unwrap(), Action::Fire(Direction::Down));
    }

    #[test]
    fn request_line_carries_position_and_board() {
        let mut source = sh(
            "read -r round row col board; if [ \"$round $row $col $board\" = '7 0 1 2,1,0,0,' ]; then printf ml; else printf no; fi",
        );
        assert_eq!(source.decide(&ctx(7)).unwrap(), Action::Move(Direction::Left));
    }

    #[test]
    fn exited_program_finishes_source() {
        let mut source = sh("exit 0");
        let err = source.decide(&ctx(1)).unwrap_err();
        assert!(err.downcast_ref::<SourceFinished>().is_some(), "{err:#}");
    }

    #[test]
    fn interrupt_ends_blocked_read() {
        let mut source = sh("read -r line; exec sleep 30");
        let interrupter = source.interrupter().unwrap();
        let handle = std::thread::spawn(move || source.decide(&ctx(1)).is_err());
        std::thread::sleep(std::time::Duration::from_millis(50));
        interrupter.interrupt();
        interrupter.interrupt();
        assert!(handle.join().unwrap());
    }
}
