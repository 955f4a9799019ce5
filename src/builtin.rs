use std::env;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;
use std::process;

use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::eval;
use crate::global::State;
use crate::job::{self, JobStatus};
use crate::signal;

pub type Builtin = fn(&mut State, &[String]) -> i32;

pub fn lookup(name: &str) -> Option<Builtin> {
	match name {
		"cd" => Some(builtin_cd),
		"pwd" => Some(builtin_pwd),
		"exit" => Some(builtin_exit),
		"echo" => Some(builtin_echo),
		"mkdir" => Some(builtin_mkdir),
		"rmdir" => Some(builtin_rmdir),
		"touch" => Some(builtin_touch),
		"rm" => Some(builtin_rm),
		"cat" => Some(builtin_cat),
		"ls" => Some(builtin_ls),
		"jobs" => Some(builtin_jobs),
		"fg" => Some(builtin_fg),
		"bg" => Some(builtin_bg),
		"history" => Some(builtin_history),
		"export" => Some(builtin_export),
		"unset" => Some(builtin_unset),
		_ => None,
	}
}

pub fn is_builtin(name: &str) -> bool {
	lookup(name).is_some()
}

pub fn run(state: &mut State, argv: &[String]) -> i32 {
	match lookup(&argv[0]) {
		Some(func) => func(state, argv),
		None => 1,
	}
}

fn builtin_cd(_: &mut State, argv: &[String]) -> i32 {
	let dir = match argv.get(1) {
		Some(dir) => dir.clone(),
		None => match env::var("HOME") {
			Ok(home) => home,
			Err(_) => {
				eprintln!("myshell: cd: HOME not set");
				return 1;
			},
		},
	};
	if let Err(e) = env::set_current_dir(&dir) {
		eprintln!("myshell: cd: {}: {}", dir, e);
		return 1;
	}
	0
}

fn builtin_pwd(_: &mut State, _: &[String]) -> i32 {
	match env::current_dir() {
		Ok(cwd) => {
			println!("{}", cwd.display());
			let _ = io::stdout().flush();
			0
		},
		Err(e) => {
			eprintln!("myshell: pwd: {}", e);
			1
		},
	}
}

fn builtin_exit(_: &mut State, argv: &[String]) -> i32 {
	let status = argv.get(1).and_then(|a| a.parse::<i32>().ok()).unwrap_or(0);
	process::exit(status);
}

fn builtin_echo(_: &mut State, argv: &[String]) -> i32 {
	let mut args = &argv[1..];
	let mut newline = true;
	if args.first().map(|a| a.as_str()) == Some("-n") {
		newline = false;
		args = &args[1..];
	}
	let mut out = io::stdout();
	let text = args.join(" ");
	let result = if newline {
		writeln!(out, "{}", text)
	} else {
		write!(out, "{}", text)
	};
	match result.and_then(|_| out.flush()) {
		Ok(()) => 0,
		Err(e) => {
			eprintln!("myshell: echo: {}", e);
			1
		},
	}
}

fn builtin_mkdir(_: &mut State, argv: &[String]) -> i32 {
	use std::os::unix::fs::DirBuilderExt;

	if argv.len() < 2 {
		eprintln!("myshell: mkdir: missing operand");
		return 1;
	}
	let mut status = 0;
	for dir in &argv[1..] {
		if let Err(e) = DirBuilder::new().mode(0o755).create(dir) {
			eprintln!("myshell: mkdir: cannot create directory '{}': {}", dir, e);
			status = 1;
		}
	}
	status
}

fn builtin_rmdir(_: &mut State, argv: &[String]) -> i32 {
	if argv.len() < 2 {
		eprintln!("myshell: rmdir: missing operand");
		return 1;
	}
	let mut status = 0;
	for dir in &argv[1..] {
		if let Err(e) = fs::remove_dir(dir) {
			eprintln!("myshell: rmdir: cannot remove '{}': {}", dir, e);
			status = 1;
		}
	}
	status
}

fn builtin_touch(_: &mut State, argv: &[String]) -> i32 {
	use std::os::unix::fs::OpenOptionsExt;

	if argv.len() < 2 {
		eprintln!("myshell: touch: missing file operand");
		return 1;
	}
	let mut status = 0;
	for path in &argv[1..] {
		let opened = OpenOptions::new()
			.create(true)
			.write(true)
			.mode(0o644)
			.open(path);
		if let Err(e) = opened {
			eprintln!("myshell: touch: cannot touch '{}': {}", path, e);
			status = 1;
		}
	}
	status
}

fn builtin_rm(_: &mut State, argv: &[String]) -> i32 {
	let mut recursive = false;
	let mut force = false;
	let mut idx = 1;
	while idx < argv.len() && argv[idx].starts_with('-') && argv[idx].len() > 1 {
		for flag in argv[idx][1..].chars() {
			match flag {
				'r' => recursive = true,
				'f' => force = true,
				other => {
					eprintln!("myshell: rm: invalid option -- '{}'", other);
					return 1;
				},
			}
		}
		idx += 1;
	}
	if idx == argv.len() {
		eprintln!("myshell: rm: missing operand");
		return 1;
	}

	let mut status = 0;
	for path in &argv[idx..] {
		let meta = match fs::symlink_metadata(path) {
			Ok(meta) => meta,
			Err(e) => {
				if !force {
					eprintln!("myshell: rm: cannot remove '{}': {}", path, e);
					status = 1;
				}
				continue;
			},
		};
		if meta.is_dir() {
			if !recursive {
				if !force {
					eprintln!("myshell: rm: '{}': is a directory", path);
				}
				status = 1;
			} else if remove_tree(Path::new(path.as_str()), force).is_err() {
				status = 1;
			}
		} else if let Err(e) = fs::remove_file(path) {
			if !force {
				eprintln!("myshell: rm: cannot remove '{}': {}", path, e);
				status = 1;
			}
		}
	}
	status
}

fn remove_tree(path: &Path, force: bool) -> io::Result<()> {
	let entries = fs::read_dir(path).map_err(|e| {
		if !force {
			eprintln!("myshell: rm: cannot remove '{}': {}", path.display(), e);
		}
		e
	})?;
	for entry in entries {
		let entry = entry?;
		let child = entry.path();
		let meta = match fs::symlink_metadata(&child) {
			Ok(meta) => meta,
			Err(_) => continue,
		};
		if meta.is_dir() {
			remove_tree(&child, force)?;
		} else if let Err(e) = fs::remove_file(&child) {
			if !force {
				eprintln!("myshell: rm: cannot remove '{}': {}", child.display(), e);
			}
		}
	}
	fs::remove_dir(path).map_err(|e| {
		if !force {
			eprintln!("myshell: rm: cannot remove '{}': {}", path.display(), e);
		}
		e
	})
}

// Reads the stdin descriptor directly. The buffered `io::stdin` handle
// would hand over lines the REPL has already read ahead of the current
// command.
struct RawStdin;

impl Read for RawStdin {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let n = unsafe {
			libc::read(
				libc::STDIN_FILENO,
				buf.as_mut_ptr() as *mut libc::c_void,
				buf.len(),
			)
		};
		if n < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(n as usize)
		}
	}
}

fn copy_stream(reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<()> {
	let mut buffer = [0u8; 4096];
	loop {
		let n = match reader.read(&mut buffer) {
			Ok(0) => {
				writer.flush()?;
				return Ok(());
			},
			Ok(n) => n,
			Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
			Err(e) => return Err(e),
		};
		writer.write_all(&buffer[..n])?;
	}
}

fn builtin_cat(_: &mut State, argv: &[String]) -> i32 {
	let mut out = io::stdout();
	if argv.len() < 2 {
		return match copy_stream(&mut RawStdin, &mut out) {
			Ok(()) => 0,
			Err(e) => {
				eprintln!("myshell: cat: {}", e);
				1
			},
		};
	}
	let mut status = 0;
	for path in &argv[1..] {
		match File::open(path) {
			Ok(mut file) => {
				if let Err(e) = copy_stream(&mut file, &mut out) {
					eprintln!("myshell: cat: {}: {}", path, e);
					status = 1;
				}
			},
			Err(e) => {
				eprintln!("myshell: cat: {}: {}", path, e);
				status = 1;
			},
		}
	}
	status
}

fn builtin_ls(_: &mut State, argv: &[String]) -> i32 {
	let mut show_all = false;
	let mut idx = 1;
	while idx < argv.len() && argv[idx].starts_with('-') {
		if argv[idx] == "-a" {
			show_all = true;
		} else {
			eprintln!("myshell: ls: invalid option -- '{}'", &argv[idx][1..]);
			return 1;
		}
		idx += 1;
	}
	let dirs: Vec<&str> = if idx == argv.len() {
		vec!["."]
	} else {
		argv[idx..].iter().map(|s| s.as_str()).collect()
	};

	let mut status = 0;
	let stdout = io::stdout();
	let mut out = stdout.lock();
	for (d, dir) in dirs.iter().enumerate() {
		if dirs.len() > 1 {
			let _ = writeln!(out, "{}:", dir);
		}
		match fs::read_dir(dir) {
			Ok(entries) => {
				for entry in entries.flatten() {
					let name = entry.file_name();
					let name = name.to_string_lossy();
					if !show_all && name.starts_with('.') {
						continue;
					}
					let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
					if is_dir {
						let _ = writeln!(out, "\x1b[34m{}\x1b[0m", name);
					} else {
						let _ = writeln!(out, "{}", name);
					}
				}
			},
			Err(e) => {
				eprintln!("myshell: ls: cannot access '{}': {}", dir, e);
				status = 1;
			},
		}
		if d < dirs.len() - 1 {
			let _ = writeln!(out);
		}
	}
	let _ = out.flush();
	status
}

fn builtin_jobs(_: &mut State, _: &[String]) -> i32 {
	let mut out = io::stdout();
	for job in job::list_active() {
		let _ = writeln!(out, "[{}] {} {}", job.id, job.status, job.command);
	}
	let _ = out.flush();
	0
}

fn parse_job_id(name: &str, arg: Option<&String>) -> Result<i32, i32> {
	let arg = match arg {
		Some(arg) => arg,
		None => {
			eprintln!("myshell: {}: usage: {} [job_id]", name, name);
			return Err(1);
		},
	};
	match arg.parse::<i32>() {
		Ok(id) if id > 0 => Ok(id),
		_ => {
			eprintln!("myshell: {}: {}: no such job", name, arg);
			Err(1)
		},
	}
}

// Resume (if stopped) and wait in the foreground: the terminal goes to
// the job's group, the wait drains the group until it stops again or
// every member is gone, and the terminal comes back to the shell.
fn builtin_fg(_: &mut State, argv: &[String]) -> i32 {
	let id = match parse_job_id("fg", argv.get(1)) {
		Ok(id) => id,
		Err(status) => return status,
	};
	let job = match job::find(id) {
		Some(job) => job,
		None => {
			eprintln!("myshell: fg: {}: no such job", id);
			return 1;
		},
	};

	signal::block_sigchld();
	eval::give_terminal_to(job.pgid);
	if job.status == JobStatus::Stopped {
		if let Err(e) = killpg(job.pgid, Signal::SIGCONT) {
			eprintln!("myshell: fg: kill: {}", e);
			eval::reclaim_terminal();
			signal::unblock_sigchld();
			return 1;
		}
		job::update_status(id, JobStatus::Running);
	}

	let mut stopped = false;
	loop {
		match waitpid(Pid::from_raw(-job.pgid.as_raw()), Some(WaitPidFlag::WUNTRACED)) {
			Ok(WaitStatus::Stopped(..)) => {
				job::update_status(id, JobStatus::Stopped);
				println!("\n[{}]+  Stopped    {}", id, job.command);
				let _ = io::stdout().flush();
				stopped = true;
				break;
			},
			Ok(_) => continue,
			Err(_) => break,
		}
	}
	if !stopped {
		job::remove(id);
	}
	signal::unblock_sigchld();
	eval::reclaim_terminal();
	0
}

fn builtin_bg(_: &mut State, argv: &[String]) -> i32 {
	let id = match parse_job_id("bg", argv.get(1)) {
		Ok(id) => id,
		Err(status) => return status,
	};
	let job = match job::find(id) {
		Some(job) => job,
		None => {
			eprintln!("myshell: bg: {}: no such job", id);
			return 1;
		},
	};
	if job.status != JobStatus::Stopped {
		eprintln!("myshell: bg: job {} is not stopped", id);
		return 1;
	}
	if let Err(e) = killpg(job.pgid, Signal::SIGCONT) {
		eprintln!("myshell: bg: kill: {}", e);
		return 1;
	}
	job::update_status(id, JobStatus::Running);
	println!("[{}]+ {} &", id, job.command);
	let _ = io::stdout().flush();
	0
}

fn builtin_history(state: &mut State, _: &[String]) -> i32 {
	let mut out = io::stdout();
	for (i, line) in state.history.iter().enumerate() {
		let _ = writeln!(out, "{:5}  {}", i + 1, line);
	}
	let _ = out.flush();
	0
}

fn valid_name(name: &str) -> bool {
	!name.is_empty() && !name.contains('\0')
}

fn builtin_export(_: &mut State, argv: &[String]) -> i32 {
	if argv.len() < 2 {
		let mut out = io::stdout();
		for (key, value) in env::vars() {
			let _ = writeln!(out, "declare -x {}={}", key, value);
		}
		let _ = out.flush();
		return 0;
	}
	let mut status = 0;
	for arg in &argv[1..] {
		match arg.find('=') {
			Some(pos) => {
				let name = &arg[..pos];
				let value = &arg[pos + 1..];
				if !valid_name(name) || value.contains('\0') {
					eprintln!("myshell: export: {}: not a valid identifier", arg);
					status = 1;
					continue;
				}
				env::set_var(name, value);
			},
			None => {
				if !valid_name(arg) {
					eprintln!("myshell: export: {}: not a valid identifier", arg);
					status = 1;
					continue;
				}
				match env::var(arg) {
					Ok(value) => env::set_var(arg, value),
					Err(_) => {
						eprintln!("myshell: export: {}: variable not set", arg);
						status = 1;
					},
				}
			},
		}
	}
	status
}

fn builtin_unset(_: &mut State, argv: &[String]) -> i32 {
	if argv.len() < 2 {
		eprintln!("myshell: unset: usage: unset [variable...]");
		return 1;
	}
	let mut status = 0;
	for name in &argv[1..] {
		if !valid_name(name) || name.contains('=') {
			eprintln!("myshell: unset: {}: not a valid identifier", name);
			status = 1;
			continue;
		}
		env::remove_var(name);
	}
	status
}
