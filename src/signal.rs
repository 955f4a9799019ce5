use nix::sys::signal::{killpg, sigaction, sigprocmask};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgid, getpgrp, Pid};

use crate::job::{self, JobStatus};

// Installed once at startup. SIGTSTP is ignored so Ctrl-Z only ever
// reaches the foreground child; SIGTTOU is ignored so the shell can
// reclaim the terminal with tcsetpgrp from a background group.
pub fn install() -> nix::Result<()> {
	let chld = SigAction::new(
		SigHandler::Handler(handle_sigchld),
		SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
		SigSet::empty(),
	);
	let int = SigAction::new(
		SigHandler::Handler(handle_sigint),
		SaFlags::SA_RESTART,
		SigSet::empty(),
	);
	let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
	unsafe {
		sigaction(Signal::SIGCHLD, &chld)?;
		sigaction(Signal::SIGINT, &int)?;
		sigaction(Signal::SIGTSTP, &ignore)?;
		sigaction(Signal::SIGTTOU, &ignore)?;
	}
	Ok(())
}

// Undo the shell's dispositions between fork and exec. An ignored
// SIGTSTP would survive execvp and the child could never be stopped
// from the keyboard.
pub fn reset_for_child() {
	let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	unsafe {
		let _ = sigaction(Signal::SIGINT, &default);
		let _ = sigaction(Signal::SIGTSTP, &default);
		let _ = sigaction(Signal::SIGTTOU, &default);
		let _ = sigaction(Signal::SIGCHLD, &default);
		// The Rust runtime ignores SIGPIPE; that disposition would
		// survive execvp.
		let _ = sigaction(Signal::SIGPIPE, &default);
	}
	let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
}

// The executor blocks SIGCHLD from fork until the foreground wait (or
// the job registration) is done, so the handler only ever sees children
// whose process group is already in the job table.
pub fn block_sigchld() {
	let mut set = SigSet::empty();
	set.add(Signal::SIGCHLD);
	let _ = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), None);
}

pub fn unblock_sigchld() {
	let mut set = SigSet::empty();
	set.add(Signal::SIGCHLD);
	let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None);
}

// Reap every ready child. Children of a foreground pipeline are never
// in the job table (the executor holds SIGCHLD blocked while they run),
// so an unmatched pgid is simply ignored here.
extern "C" fn handle_sigchld(_: libc::c_int) {
	loop {
		let status = match waitpid(
			Pid::from_raw(-1),
			Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
		) {
			Ok(WaitStatus::StillAlive) | Err(_) => break,
			Ok(status) => status,
		};
		let pid = match status.pid() {
			Some(pid) => pid,
			None => break,
		};
		// An exited child is already reaped by the waitpid above, so
		// getpgid fails for it; the group leader's own pid doubles as
		// the pgid then.
		let pgid = getpgid(Some(pid)).unwrap_or(pid);
		match status {
			WaitStatus::Stopped(..) => {
				if let Some(id) = job::update_status_by_pgid(pgid, JobStatus::Stopped) {
					write_stopped_notice(id);
				}
			},
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {
				let _ = job::update_status_by_pgid(pgid, JobStatus::Done);
			},
			_ => {},
		}
	}
}

// Relay Ctrl-C to the foreground process group; when the shell itself
// owns the terminal there is nothing to interrupt.
extern "C" fn handle_sigint(_: libc::c_int) {
	let fg = unsafe { libc::tcgetpgrp(libc::STDIN_FILENO) };
	if fg <= 0 {
		return;
	}
	let fg = Pid::from_raw(fg);
	if fg == getpgrp() {
		return;
	}
	let _ = killpg(fg, Signal::SIGINT);
}

// Everything below runs inside the SIGCHLD handler and sticks to raw
// write(2) on pre-sized stack buffers.

fn write_stopped_notice(id: i32) {
	let mut digits = [0u8; 12];
	let ndigits = format_u32(id as u32, &mut digits);
	write_bytes(b"\n[");
	write_bytes(&digits[..ndigits]);
	write_bytes(b"]+  Stopped    ");
	job::with_command(id, |bytes| write_bytes(bytes));
	write_bytes(b"\n");
}

fn write_bytes(bytes: &[u8]) {
	unsafe {
		let _ = libc::write(
			libc::STDOUT_FILENO,
			bytes.as_ptr() as *const libc::c_void,
			bytes.len(),
		);
	}
}

fn format_u32(mut n: u32, buf: &mut [u8; 12]) -> usize {
	if n == 0 {
		buf[0] = b'0';
		return 1;
	}
	let mut tmp = [0u8; 12];
	let mut len = 0;
	while n > 0 {
		tmp[len] = b'0' + (n % 10) as u8;
		n /= 10;
		len += 1;
	}
	for i in 0..len {
		buf[i] = tmp[len - 1 - i];
	}
	len
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_decimal() {
		let mut buf = [0u8; 12];
		let len = format_u32(0, &mut buf);
		assert_eq!(&buf[..len], b"0");
		let len = format_u32(7, &mut buf);
		assert_eq!(&buf[..len], b"7");
		let len = format_u32(1234, &mut buf);
		assert_eq!(&buf[..len], b"1234");
	}
}
