use nix::unistd::{self, Pid};

use crate::history::History;

// Everything the shell process owns for its lifetime. The job table is
// not here: the signal handler needs it, so it lives behind the
// signal-safe facade in `job`.
pub struct State {
	pub history: History,
	pub shell_pgid: Pid,
}

impl State {
	pub fn new() -> State {
		// Claim a process group of our own before anything forks; fails
		// harmlessly when the shell is already a group leader.
		let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
		State {
			history: History::new(),
			shell_pgid: unistd::getpgrp(),
		}
	}
}
