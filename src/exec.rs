use crate::builtin::{self, BuiltinId};
use crate::helper::syscall;
use crate::parser::{CommandChain, Stage};
use nix::{
    fcntl::{open, OFlag},
    libc,
    sys::{
        stat::Mode,
        wait::{waitpid, WaitStatus},
    },
    unistd::{close, dup, dup2, execvp, fork, pipe, ForkResult, Pid},
};
use std::{
    ffi::{CString, NulError},
    fmt,
    io::{self, Write},
    os::unix::io::RawFd,
    path::{Path, PathBuf},
    process::exit,
};

/// How one external stage (or a whole pipeline) terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own with this status.
    Completed(i32),
    /// The process was terminated by this signal.
    Signaled(i32),
    /// The process (or the pipeline's topology) could not be created.
    SpawnFailed,
}

impl ExitOutcome {
    /// The status the interpreter records, using the usual shell
    /// conventions (128 + signal for signal deaths).
    pub fn code(&self) -> i32 {
        match *self {
            ExitOutcome::Completed(n) => n,
            ExitOutcome::Signaled(sig) => sig + 128,
            ExitOutcome::SpawnFailed => 1,
        }
    }
}

/// What the main loop does after one execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    /// Keep reading lines. Carries the status of the cycle.
    Continue(i32),
    /// Terminate the interpreter with this exit code. Only the `exit`
    /// built-in, run as the sole stage of a chain, produces this.
    Quit(i32),
}

#[derive(Debug)]
pub enum ExecError {
    Spawn(nix::Error),
    PipeCreation(nix::Error),
    Io { path: PathBuf, err: nix::Error },
    BadArg(NulError),
}

impl From<NulError> for ExecError {
    fn from(e: NulError) -> ExecError {
        ExecError::BadArg(e)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::Spawn(e) => write!(f, "failed to fork: {e}"),
            ExecError::PipeCreation(e) => write!(f, "failed to create pipe: {e}"),
            ExecError::Io { path, err } => {
                write!(f, "cannot open {}: {err}", path.display())
            }
            ExecError::BadArg(e) => write!(f, "invalid argument: {e}"),
        }
    }
}

impl std::error::Error for ExecError {}

/// Run one chain and report what the main loop should do next.
///
/// A chain with exactly one stage naming a built-in runs in-process; any
/// other single stage is executed as an external program; longer chains
/// become pipelines. A built-in inside a multi-stage chain is not treated
/// specially, so only a solitary `exit` can terminate the interpreter.
pub fn execute(chain: &CommandChain) -> ExitSignal {
    let stages = chain.stages();
    if stages.len() == 1 {
        let stage = &stages[0];
        if let Some(id) = builtin::classify(stage.command()) {
            return run_builtin(id, stage);
        }
        ExitSignal::Continue(run_external(stage).code())
    } else {
        ExitSignal::Continue(run_pipeline(chain).code())
    }
}

fn open_input(path: &Path) -> Result<RawFd, ExecError> {
    syscall(|| open(path, OFlag::O_RDONLY, Mode::empty())).map_err(|err| ExecError::Io {
        path: path.to_owned(),
        err,
    })
}

fn open_output(path: &Path) -> Result<RawFd, ExecError> {
    // create-or-truncate with mode 0644
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    syscall(|| {
        open(
            path,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            mode,
        )
    })
    .map_err(|err| ExecError::Io {
        path: path.to_owned(),
        err,
    })
}

/// Replace the calling process's standard streams with the stage's file
/// redirections, if any.
///
/// Must run after any pipe ends have been installed on stdin/stdout, so
/// that an explicit file always wins over a pipe for the same direction.
/// The caller owns restoration when it is the interpreter itself rather
/// than a disposable child; see [`SavedStreams`].
pub fn apply_redirection(stage: &Stage) -> Result<(), ExecError> {
    if let Some(path) = &stage.input_file {
        let fd = open_input(path)?;
        syscall(|| dup2(fd, libc::STDIN_FILENO)).map_err(|err| ExecError::Io {
            path: path.clone(),
            err,
        })?;
        let _ = syscall(|| close(fd));
    }

    if let Some(path) = &stage.output_file {
        let fd = open_output(path)?;
        syscall(|| dup2(fd, libc::STDOUT_FILENO)).map_err(|err| ExecError::Io {
            path: path.clone(),
            err,
        })?;
        let _ = syscall(|| close(fd));
    }

    Ok(())
}

/// Convert a stage's argument list for execvp.
fn stage_argv(stage: &Stage) -> Result<(CString, Vec<CString>), ExecError> {
    let filename = CString::new(stage.command())?;
    let args = stage
        .args
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, NulError>>()?;
    Ok((filename, args))
}

/// Final step inside a forked child: wire the stage's file redirections,
/// then replace the process image. Never returns; a child that cannot
/// exec must not fall back into interpreter logic.
fn exec_stage(stage: &Stage, filename: &CString, args: &[CString]) -> ! {
    if let Err(e) = apply_redirection(stage) {
        eprintln!("pipesh: {e}");
        exit(1);
    }
    match execvp(filename, args) {
        Err(e) => {
            eprintln!("pipesh: {}: {e}", stage.command());
            exit(127);
        }
        Ok(_) => unreachable!(),
    }
}

fn wait_stage(pid: Pid) -> ExitOutcome {
    match syscall(|| waitpid(pid, None)) {
        Ok(WaitStatus::Exited(_, status)) => ExitOutcome::Completed(status),
        Ok(WaitStatus::Signaled(_, sig, _)) => ExitOutcome::Signaled(sig as i32),
        Ok(_) => ExitOutcome::Completed(1), // no WUNTRACED, so not expected
        Err(e) => {
            eprintln!("pipesh: wait failed: {e}");
            ExitOutcome::Completed(1)
        }
    }
}

/// Run one external-program stage: fork, redirect in the child, exec, and
/// wait in the parent. Fork failure is non-fatal to the interpreter.
pub fn run_external(stage: &Stage) -> ExitOutcome {
    let (filename, args) = match stage_argv(stage) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("pipesh: {}: {e}", stage.command());
            return ExitOutcome::SpawnFailed;
        }
    };

    match syscall(|| unsafe { fork() }) {
        Ok(ForkResult::Child) => exec_stage(stage, &filename, &args),
        Ok(ForkResult::Parent { child, .. }) => wait_stage(child),
        Err(e) => {
            eprintln!("pipesh: {}", ExecError::Spawn(e));
            ExitOutcome::SpawnFailed
        }
    }
}

/// Run a chain of two or more stages connected by pipes.
///
/// One pipe is created per adjacent pair, immediately before the writer's
/// fork. Every pipe fd is closed exactly once in each process that holds
/// it: the child closes both ends after dup2-ing what it needs onto its
/// standard streams, the parent closes the write end right after the fork
/// and the read end once the next stage has been forked. A write end left
/// open anywhere would keep the downstream reader blocked forever.
///
/// Construction failures (pipe or fork) abort spawning, but children
/// already running are still waited on so none are orphaned. The parent
/// waits in spawn order; the last stage's status is the pipeline's.
pub fn run_pipeline(chain: &CommandChain) -> ExitOutcome {
    let stages = chain.stages();
    debug_assert!(stages.len() >= 2);

    let mut children = Vec::with_capacity(stages.len());
    let mut prev_read: Option<RawFd> = None;
    let mut aborted = false;

    for (i, stage) in stages.iter().enumerate() {
        let argv = match stage_argv(stage) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("pipesh: {}: {e}", stage.command());
                aborted = true;
                break;
            }
        };

        let link = if i + 1 < stages.len() {
            match syscall(pipe) {
                Ok(fds) => Some(fds),
                Err(e) => {
                    eprintln!("pipesh: {}", ExecError::PipeCreation(e));
                    aborted = true;
                    break;
                }
            }
        } else {
            None
        };

        match syscall(|| unsafe { fork() }) {
            Ok(ForkResult::Child) => {
                if let Some(fd) = prev_read {
                    syscall(|| dup2(fd, libc::STDIN_FILENO)).unwrap();
                    syscall(|| close(fd)).unwrap();
                }
                if let Some((read, write)) = link {
                    syscall(|| close(read)).unwrap();
                    syscall(|| dup2(write, libc::STDOUT_FILENO)).unwrap();
                    syscall(|| close(write)).unwrap();
                }
                // file redirection last, so it wins over the pipe ends
                exec_stage(stage, &argv.0, &argv.1);
            }
            Ok(ForkResult::Parent { child, .. }) => {
                children.push(child);
                if let Some(fd) = prev_read.take() {
                    let _ = syscall(|| close(fd));
                }
                if let Some((read, write)) = link {
                    let _ = syscall(|| close(write));
                    prev_read = Some(read);
                }
            }
            Err(e) => {
                eprintln!("pipesh: {}", ExecError::Spawn(e));
                if let Some((read, write)) = link {
                    let _ = syscall(|| close(read));
                    let _ = syscall(|| close(write));
                }
                aborted = true;
                break;
            }
        }
    }

    // Only abort paths leave a read end behind; close it so the spawned
    // children observe end-of-stream and can terminate.
    if let Some(fd) = prev_read.take() {
        let _ = syscall(|| close(fd));
    }

    let mut last = ExitOutcome::SpawnFailed;
    for pid in children {
        last = wait_stage(pid);
    }

    if aborted {
        ExitOutcome::SpawnFailed
    } else {
        last
    }
}

/// Duplicates of the interpreter's live standard streams, taken before a
/// built-in mutates them and put back on drop. Dropping is the only way
/// out, so restoration happens on error paths too.
pub struct SavedStreams {
    stdin: RawFd,
    stdout: RawFd,
}

impl SavedStreams {
    pub fn save() -> Result<Self, nix::Error> {
        let stdin = syscall(|| dup(libc::STDIN_FILENO))?;
        let stdout = match syscall(|| dup(libc::STDOUT_FILENO)) {
            Ok(fd) => fd,
            Err(e) => {
                let _ = syscall(|| close(stdin));
                return Err(e);
            }
        };
        Ok(SavedStreams { stdin, stdout })
    }
}

impl Drop for SavedStreams {
    fn drop(&mut self) {
        let _ = syscall(|| dup2(self.stdin, libc::STDIN_FILENO));
        let _ = syscall(|| dup2(self.stdout, libc::STDOUT_FILENO));
        let _ = syscall(|| close(self.stdin));
        let _ = syscall(|| close(self.stdout));
    }
}

/// Run a built-in in the interpreter's own process.
///
/// No fork: a built-in must observe and mutate the interpreter's actual
/// state (a working-directory change, say). Its redirections are applied
/// to the interpreter's real streams, so they are saved first and the
/// [`SavedStreams`] guard restores them whatever the built-in does.
pub fn run_builtin(id: BuiltinId, stage: &Stage) -> ExitSignal {
    let saved = match SavedStreams::save() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("pipesh: failed to save standard streams: {e}");
            return ExitSignal::Continue(1);
        }
    };

    if let Err(e) = apply_redirection(stage) {
        eprintln!("pipesh: {e}");
        drop(saved);
        return ExitSignal::Continue(1);
    }

    let signal = builtin::invoke(id, stage);

    // flush before the guard swaps the real stdout back in
    let _ = io::stdout().flush();
    drop(saved);

    signal
}
