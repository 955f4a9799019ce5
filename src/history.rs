use std::collections::VecDeque;

pub const MAX_HISTORY: usize = 1000;

// Bounded ring of accepted command lines, oldest first. Consecutive
// duplicates and empty lines are not stored.
#[derive(Debug)]
pub struct History {
	entries: VecDeque<String>,
}

impl History {
	pub fn new() -> History {
		History { entries: VecDeque::with_capacity(MAX_HISTORY) }
	}

	pub fn add(&mut self, line: &str) {
		if line.is_empty() {
			return;
		}
		if self.entries.back().map(|s| s.as_str()) == Some(line) {
			return;
		}
		if self.entries.len() == MAX_HISTORY {
			self.entries.pop_front();
		}
		self.entries.push_back(line.to_string());
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|s| s.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stores_in_order() {
		let mut history = History::new();
		history.add("one");
		history.add("two");
		history.add("three");
		let lines: Vec<&str> = history.iter().collect();
		assert_eq!(lines, ["one", "two", "three"]);
	}

	#[test]
	fn skips_empty_lines() {
		let mut history = History::new();
		history.add("");
		assert_eq!(history.len(), 0);
	}

	#[test]
	fn suppresses_consecutive_duplicates() {
		let mut history = History::new();
		history.add("ls");
		history.add("ls");
		assert_eq!(history.len(), 1);
		history.add("pwd");
		history.add("ls");
		assert_eq!(history.len(), 3);
	}

	#[test]
	fn ring_drops_oldest_at_capacity() {
		let mut history = History::new();
		for i in 0..MAX_HISTORY + 1 {
			history.add(&format!("cmd {}", i));
		}
		assert_eq!(history.len(), MAX_HISTORY);
		assert_eq!(history.iter().next(), Some("cmd 1"));
		assert_eq!(history.iter().last(), Some(&format!("cmd {}", MAX_HISTORY)[..]));
	}
}
