use std::ffi::{CString, NulError};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{BorrowedFd, IntoRawFd, RawFd};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::builtin;
use crate::global::State;
use crate::job::{self, JobStatus};
use crate::signal;
use crate::types::{Command, Pipeline, Redirection};

#[derive(Debug)]
pub enum ExecError {
	Nix(nix::Error),
	Io(io::Error),
	Nul(NulError),
}

impl From<nix::Error> for ExecError {
	fn from(e: nix::Error) -> ExecError {
		ExecError::Nix(e)
	}
}

impl From<io::Error> for ExecError {
	fn from(e: io::Error) -> ExecError {
		ExecError::Io(e)
	}
}

impl From<NulError> for ExecError {
	fn from(e: NulError) -> ExecError {
		ExecError::Nul(e)
	}
}

impl fmt::Display for ExecError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ExecError::Nix(ref e) => write!(f, "{}", e),
			ExecError::Io(ref e) => write!(f, "{}", e),
			ExecError::Nul(ref e) => write!(f, "{}", e),
		}
	}
}

fn terminal() -> BorrowedFd<'static> {
	unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }
}

// Both fail when stdin is not a terminal; an uncontrolled shell just
// runs on without job control niceties.
pub fn give_terminal_to(pgid: Pid) {
	let _ = unistd::tcsetpgrp(terminal(), pgid);
}

pub fn reclaim_terminal() {
	let _ = unistd::tcsetpgrp(terminal(), unistd::getpgrp());
}

// Synchronous for foreground pipelines, returning the status of the
// last command; returns 0 right after registering a background job.
pub fn execute(state: &mut State, pipeline: &Pipeline) -> i32 {
	match run_pipeline(state, pipeline) {
		Ok(status) => status,
		Err(e) => {
			let _ = writeln!(io::stderr(), "myshell: {}", e);
			-1
		},
	}
}

fn run_pipeline(state: &mut State, pipeline: &Pipeline) -> Result<i32, ExecError> {
	let commands = &pipeline.commands;
	assert!(!commands.is_empty());

	if commands.len() == 1 {
		let command = &commands[0];
		if !command.background && builtin::is_builtin(command.name()) {
			return run_builtin_in_shell(state, command);
		}
		signal::block_sigchld();
		let result = run_single(state, command);
		signal::unblock_sigchld();
		return result;
	}

	signal::block_sigchld();
	let result = run_piped(state, pipeline);
	signal::unblock_sigchld();
	result
}

// A built-in that is neither piped nor backgrounded runs in the shell
// itself, with stdin/stdout parked aside while redirections apply.
fn run_builtin_in_shell(state: &mut State, command: &Command) -> Result<i32, ExecError> {
	let saved_stdin = unistd::dup(libc::STDIN_FILENO)?;
	let saved_stdout = unistd::dup(libc::STDOUT_FILENO)?;
	let status = match apply_redirections(&command.redirect) {
		Ok(()) => builtin::run(state, &command.argv),
		Err(e) => {
			let _ = writeln!(io::stderr(), "myshell: {}", e);
			1
		},
	};
	let _ = unistd::dup2(saved_stdin, libc::STDIN_FILENO);
	let _ = unistd::dup2(saved_stdout, libc::STDOUT_FILENO);
	let _ = unistd::close(saved_stdin);
	let _ = unistd::close(saved_stdout);
	Ok(status)
}

fn run_single(state: &mut State, command: &Command) -> Result<i32, ExecError> {
	match unsafe { unistd::fork() }? {
		ForkResult::Child => {
			signal::reset_for_child();
			let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
			if command.background {
				let _ = null_stdin();
			}
			exec_in_child(state, command, &command.redirect)
		},
		ForkResult::Parent { child } => {
			// The child makes the same call; whichever runs first wins
			// and the other is a no-op.
			let _ = unistd::setpgid(child, child);
			if command.background {
				register_background(child, &command.text());
				Ok(0)
			} else {
				Ok(wait_foreground(child, child, &command.text()))
			}
		},
	}
}

fn run_piped(state: &mut State, pipeline: &Pipeline) -> Result<i32, ExecError> {
	let commands = &pipeline.commands;
	let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(commands.len() - 1);
	for _ in 1..commands.len() {
		match unistd::pipe() {
			Ok((read, write)) => pipes.push((read.into_raw_fd(), write.into_raw_fd())),
			Err(e) => {
				close_pipes(&pipes);
				return Err(e.into());
			},
		}
	}

	let mut pids: Vec<Pid> = Vec::with_capacity(commands.len());
	let mut pgid = Pid::from_raw(0);
	for (i, command) in commands.iter().enumerate() {
		match unsafe { unistd::fork() } {
			Ok(ForkResult::Child) => {
				signal::reset_for_child();
				let join = if i == 0 { Pid::from_raw(0) } else { pgid };
				let _ = unistd::setpgid(Pid::from_raw(0), join);
				setup_child_pipes(i, commands.len(), &pipes, pipeline, command);
				// Middle commands feed and drain their pipes; only the
				// edges honor file redirections.
				let redirect = Redirection {
					input: if i == 0 { command.redirect.input.clone() } else { None },
					output: if i == commands.len() - 1 {
						command.redirect.output.clone()
					} else {
						None
					},
					append: command.redirect.append,
				};
				exec_in_child(state, command, &redirect)
			},
			Ok(ForkResult::Parent { child }) => {
				if i == 0 {
					pgid = child;
				}
				let _ = unistd::setpgid(child, pgid);
				pids.push(child);
			},
			Err(e) => {
				// Abort the half-built pipeline: put down what was
				// already forked, then release the pipes.
				for pid in &pids {
					let _ = kill(*pid, Signal::SIGTERM);
				}
				close_pipes(&pipes);
				return Err(e.into());
			},
		}
	}
	close_pipes(&pipes);

	let text = pipeline.text();
	if pipeline.background {
		register_background(pgid, &text);
		return Ok(0);
	}

	let status = wait_foreground(pgid, *pids.last().unwrap(), &text);
	// The intermediates exit once their readers are gone; reap whatever
	// is ready without blocking on it.
	for pid in &pids[..pids.len() - 1] {
		let _ = waitpid(*pid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED));
	}
	Ok(status)
}

fn setup_child_pipes(
	i: usize,
	n: usize,
	pipes: &[(RawFd, RawFd)],
	pipeline: &Pipeline,
	command: &Command,
) {
	if i == 0 {
		if command.redirect.input.is_none() && pipeline.background {
			let _ = null_stdin();
		}
	} else {
		let _ = unistd::dup2(pipes[i - 1].0, libc::STDIN_FILENO);
	}
	if i < n - 1 {
		let _ = unistd::dup2(pipes[i].1, libc::STDOUT_FILENO);
	}
	// Close every descriptor of every pipe, both ends. A write end left
	// open anywhere keeps the downstream reader from ever seeing EOF.
	close_pipes(pipes);
}

fn close_pipes(pipes: &[(RawFd, RawFd)]) {
	for &(read, write) in pipes {
		let _ = unistd::close(read);
		let _ = unistd::close(write);
	}
}

// Never returns; the child either becomes the target program or exits
// with the built-in's (or the failure's) status.
fn exec_in_child(state: &mut State, command: &Command, redirect: &Redirection) -> ! {
	let status = do_exec(state, command, redirect).unwrap_or_else(|e| {
		let _ = writeln!(io::stderr(), "myshell: {}", e);
		1
	});
	unsafe { libc::_exit(status as libc::c_int) }
}

fn do_exec(state: &mut State, command: &Command, redirect: &Redirection) -> Result<i32, ExecError> {
	apply_redirections(redirect)?;
	if builtin::is_builtin(command.name()) {
		return Ok(builtin::run(state, &command.argv));
	}
	let program = CString::new(command.name())?;
	let argv: Result<Vec<CString>, NulError> =
		command.argv.iter().map(|a| CString::new(a.as_str())).collect();
	let argv = argv?;
	let _ = unistd::execvp(&program, &argv);
	let _ = writeln!(io::stderr(), "myshell: {}: command not found", command.name());
	Ok(1)
}

fn annotate(path: &str, e: io::Error) -> io::Error {
	io::Error::new(e.kind(), format!("{}: {}", path, e))
}

fn redirect_fd(fd: RawFd, target: RawFd) -> io::Result<()> {
	unistd::dup2(fd, target).map_err(io::Error::from)?;
	let _ = unistd::close(fd);
	Ok(())
}

fn apply_redirections(redirect: &Redirection) -> io::Result<()> {
	if let Some(ref path) = redirect.input {
		let file = File::open(path).map_err(|e| annotate(path, e))?;
		redirect_fd(file.into_raw_fd(), libc::STDIN_FILENO)?;
	}
	if let Some(ref path) = redirect.output {
		let mut opts = OpenOptions::new();
		opts.write(true).create(true).mode(0o644);
		if redirect.append {
			opts.append(true);
		} else {
			opts.truncate(true);
		}
		let file = opts.open(path).map_err(|e| annotate(path, e))?;
		redirect_fd(file.into_raw_fd(), libc::STDOUT_FILENO)?;
	}
	Ok(())
}

fn null_stdin() -> io::Result<()> {
	let file = File::open("/dev/null")?;
	redirect_fd(file.into_raw_fd(), libc::STDIN_FILENO)
}

fn register_background(pgid: Pid, text: &str) {
	match job::add(pgid, text, JobStatus::Running) {
		Ok(id) => {
			println!("[{}] {}", id, pgid);
			let _ = io::stdout().flush();
		},
		Err(e) => {
			let _ = writeln!(io::stderr(), "myshell: {}", e);
		},
	}
	reclaim_terminal();
}

// Hand the terminal to the pipeline, wait on its last process, and map
// what happened to an exit status. A stop turns the pipeline into a
// job; the terminal always comes back to the shell.
fn wait_foreground(pgid: Pid, last_pid: Pid, text: &str) -> i32 {
	give_terminal_to(pgid);
	let status = match waitpid(last_pid, Some(WaitPidFlag::WUNTRACED)) {
		Ok(WaitStatus::Exited(_, code)) => code,
		Ok(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
		Ok(WaitStatus::Stopped(..)) => {
			match job::add(pgid, text, JobStatus::Stopped) {
				Ok(id) => {
					println!("\n[{}]+  Stopped    {}", id, text);
					let _ = io::stdout().flush();
				},
				Err(e) => {
					let _ = writeln!(io::stderr(), "myshell: {}", e);
				},
			}
			0
		},
		Ok(_) => 0,
		Err(e) => {
			let _ = writeln!(io::stderr(), "myshell: waitpid: {}", e);
			-1
		},
	};
	reclaim_terminal();
	status
}
