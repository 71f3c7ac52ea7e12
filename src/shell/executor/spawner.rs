use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::{debug, error};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, close, dup2, execve, fork, pipe, write, ForkResult, Pid};

use super::plan::{PipeEnd, Sink, Source, SpawnPlan};
use crate::shell::error::ShellError;
use crate::shell::signals;

/// Exit status reported when the program image could not be loaded.
pub const EXEC_FAILED: i32 = 127;

/// The OS-facing half of the executor.
pub trait Spawner {
    /// Creates pipe `id`; both ends stay with the spawner until handed off.
    fn open_pipe(&mut self, id: usize) -> Result<(), ShellError>;

    /// Starts a process wired as `plan` says and closes the launcher's copies
    /// of the pipe ends listed in `plan.handoffs()`.
    fn spawn(&mut self, plan: &SpawnPlan) -> Result<Pid, ShellError>;

    /// Blocks until `pid` terminates and returns its exit status.
    fn wait(&mut self, pid: Pid) -> Result<i32, ShellError>;

    /// Returns the exit status if `pid` has terminated, without blocking.
    fn try_wait(&mut self, pid: Pid) -> Result<Option<i32>, ShellError>;

    /// Closes every pipe end not yet handed off.
    fn release_pipes(&mut self);
}

#[derive(Default)]
struct PipeEnds {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

/// fork/exec based spawner.
#[derive(Default)]
pub struct OsSpawner {
    pipes: HashMap<usize, PipeEnds>,
}

impl OsSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_end(&mut self, id: usize, end: PipeEnd) -> Result<OwnedFd, ShellError> {
        let ends = self.pipes.get_mut(&id);
        let fd = match end {
            PipeEnd::Read => ends.and_then(|e| e.read.take()),
            PipeEnd::Write => ends.and_then(|e| e.write.take()),
        };
        fd.ok_or_else(|| {
            ShellError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("pipe {} has no {:?} end", id, end),
            ))
        })
    }

    fn open_source(&mut self, source: &Source) -> Result<Option<OwnedFd>, ShellError> {
        let fd = match source {
            Source::Inherit => return Ok(None),
            Source::File(path) => open_read(path)?,
            Source::Null => open_read(Path::new("/dev/null"))?,
            Source::Pipe(id) => self.take_end(*id, PipeEnd::Read)?,
        };
        Ok(Some(fd))
    }

    fn open_sink(&mut self, sink: &Sink) -> Result<Option<OwnedFd>, ShellError> {
        let fd = match sink {
            Sink::Inherit => return Ok(None),
            Sink::File(path) => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map(OwnedFd::from)
                .map_err(|e| ShellError::filesystem(path, e))?,
            Sink::Pipe(id) => self.take_end(*id, PipeEnd::Write)?,
        };
        Ok(Some(fd))
    }

    fn open_descriptors(&self) -> Vec<RawFd> {
        self.pipes
            .values()
            .flat_map(|ends| [ends.read.as_ref(), ends.write.as_ref()])
            .flatten()
            .map(AsRawFd::as_raw_fd)
            .collect()
    }
}

impl Spawner for OsSpawner {
    fn open_pipe(&mut self, id: usize) -> Result<(), ShellError> {
        let (read, write) = pipe()?;
        debug!("pipe {}: read={} write={}", id, read.as_raw_fd(), write.as_raw_fd());
        self.pipes.insert(
            id,
            PipeEnds {
                read: Some(read),
                write: Some(write),
            },
        );
        Ok(())
    }

    fn spawn(&mut self, plan: &SpawnPlan) -> Result<Pid, ShellError> {
        // Everything the child needs is prepared before fork.
        let program = to_cstring(plan.program.as_bytes())?;
        let argv = plan
            .argv
            .iter()
            .map(|arg| to_cstring(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let env = plan
            .env
            .iter()
            .map(|(k, v)| to_cstring(format!("{}={}", k, v).as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let cwd = to_cstring(plan.cwd.as_os_str().as_bytes())?;

        let stdin = self.open_source(&plan.stdin)?;
        let stdout = self.open_sink(&plan.stdout)?;
        let stray = self.open_descriptors();

        // SAFETY: the child only makes async-signal-safe calls on buffers
        // prepared above and ends in either execve or _exit.
        match unsafe { fork() }? {
            ForkResult::Child => {
                let rewire = || -> nix::Result<()> {
                    signals::restore_default_signals();
                    chdir(cwd.as_c_str())?;
                    if let Some(fd) = &stdin {
                        dup2(fd.as_raw_fd(), libc::STDIN_FILENO)?;
                    }
                    if let Some(fd) = &stdout {
                        dup2(fd.as_raw_fd(), libc::STDOUT_FILENO)?;
                    }
                    for fd in stray
                        .iter()
                        .copied()
                        .chain(stdin.as_ref().map(AsRawFd::as_raw_fd))
                        .chain(stdout.as_ref().map(AsRawFd::as_raw_fd))
                    {
                        if fd > libc::STDERR_FILENO {
                            let _ = close(fd);
                        }
                    }
                    execve(&program, &argv, &env).map(|_| ())
                };
                if let Err(err) = rewire() {
                    // No allocation between fork and _exit.
                    let stderr = io::stderr();
                    for part in [
                        b"psh: run error: ".as_slice(),
                        plan.program.as_bytes(),
                        b": ".as_slice(),
                        err.desc().as_bytes(),
                        b"\n".as_slice(),
                    ] {
                        let _ = write(&stderr, part);
                    }
                }
                // SAFETY: leave without running the shell's exit handlers.
                unsafe { libc::_exit(EXEC_FAILED) }
            }
            ForkResult::Parent { child } => {
                debug!(
                    "spawned stage {} as pid {}: {:?} stdin={:?} stdout={:?} handoffs={:?}",
                    plan.index,
                    child,
                    plan.argv,
                    plan.stdin,
                    plan.stdout,
                    plan.handoffs()
                );
                // Our copies of the handed-off ends and opened files close here.
                drop(stdin);
                drop(stdout);
                Ok(child)
            }
        }
    }

    fn wait(&mut self, pid: Pid) -> Result<i32, ShellError> {
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some(code) = status_code(status) {
                        return Ok(code);
                    }
                }
                Err(nix::Error::EINTR) => continue,
                Err(err) => {
                    error!("waitpid({}) failed: {}", pid, err);
                    return Err(err.into());
                }
            }
        }
    }

    fn try_wait(&mut self, pid: Pid) -> Result<Option<i32>, ShellError> {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(status_code(status)),
            Err(nix::Error::EINTR) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn release_pipes(&mut self) {
        if !self.pipes.is_empty() {
            debug!("closing {} leftover pipe(s)", self.pipes.len());
        }
        self.pipes.clear();
    }
}

/// Exit code for a terminated process, `None` if it is still running.
fn status_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

fn open_read(path: &Path) -> Result<OwnedFd, ShellError> {
    File::open(path)
        .map(OwnedFd::from)
        .map_err(|e| ShellError::filesystem(path, e))
}

fn to_cstring(bytes: &[u8]) -> Result<CString, ShellError> {
    CString::new(bytes).map_err(|e| ShellError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))
}
