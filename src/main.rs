mod builtin;
mod eval;
mod global;
mod history;
mod job;
mod lexer;
mod parser;
mod signal;
mod types;

use std::io;
use std::io::prelude::*;

const PROMPT: &str = "myshell> ";

fn main() {
	if let Err(e) = signal::install() {
		eprintln!("myshell: sigaction: {}", e);
	}
	let mut state = global::State::new();
	eval::give_terminal_to(state.shell_pgid);

	// No persistent stdin lock here: built-ins like `cat` read the
	// shell's own descriptors and must be able to take it.
	let stdin = io::stdin();
	let mut stdout = io::stdout();
	loop {
		// Retire finished jobs and make sure we own the terminal before
		// blocking on the next line.
		job::sweep_done();
		eval::give_terminal_to(state.shell_pgid);
		let _ = write!(stdout, "{}", PROMPT);
		let _ = stdout.flush();

		let mut line = String::new();
		match stdin.read_line(&mut line) {
			Ok(0) => {
				let _ = writeln!(stdout);
				return;
			},
			Ok(_) => {},
			Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => {
				eprintln!("myshell: read error: {}", e);
				continue;
			},
		}

		let line = line.trim_end_matches('\n');
		if line.is_empty() {
			continue;
		}
		state.history.add(line);

		let tokens = match lexer::tokenize(line) {
			Ok(tokens) => tokens,
			Err(e) => {
				eprintln!("myshell: error: {}", e);
				continue;
			},
		};
		if tokens.is_empty() {
			continue;
		}
		let pipeline = match parser::parse(&tokens) {
			Ok(pipeline) => pipeline,
			Err(e) => {
				eprintln!("myshell: {}", e);
				continue;
			},
		};
		eval::execute(&mut state, &pipeline);
	}
}
