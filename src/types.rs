pub const MAX_INPUT_SIZE: usize = 4096;

#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Redirection {
	pub input: Option<String>,
	pub output: Option<String>,
	pub append: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Command {
	pub argv: Vec<String>,
	pub redirect: Redirection,
	pub background: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Pipeline {
	pub commands: Vec<Command>,
	pub background: bool,
}

impl Command {
	pub fn name(&self) -> &str {
		&self.argv[0]
	}

	pub fn text(&self) -> String {
		self.argv.join(" ")
	}
}

impl Pipeline {
	pub fn text(&self) -> String {
		let parts: Vec<String> = self.commands.iter().map(|c| c.text()).collect();
		parts.join(" | ")
	}
}
