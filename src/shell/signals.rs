use log::warn;
use nix::sys::signal::{signal, SigHandler, Signal};

const INTERACTIVE: [Signal; 2] = [Signal::SIGINT, Signal::SIGQUIT];

/// The Rust runtime starts with SIGPIPE ignored; children must not inherit that.
const RESTORED: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGPIPE];

/// Keeps Ctrl-C / Ctrl-\ aimed at a foreground program from killing the shell.
pub fn ignore_interactive_signals() {
    for sig in INTERACTIVE {
        // SAFETY: installs SIG_IGN, no handler code runs.
        if let Err(err) = unsafe { signal(sig, SigHandler::SigIgn) } {
            warn!("could not ignore {}: {}", sig, err);
        }
    }
}

/// Resets a freshly forked child to default dispositions, since ignored
/// signals survive execve. A writer whose reader went away dies of SIGPIPE.
pub fn restore_default_signals() {
    for sig in RESTORED {
        // SAFETY: installs SIG_DFL, no handler code runs.
        let _ = unsafe { signal(sig, SigHandler::SigDfl) };
    }
}
