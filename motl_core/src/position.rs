use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

/// A location in template source: 1-indexed line and column plus a 0-indexed
/// byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
	pub line: usize,
	pub column: usize,
	pub offset: usize,
}

impl Point {
	pub fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}

	/// The start of a source file.
	pub fn start() -> Self {
		Self::new(1, 1, 0)
	}

	/// Advance the point past a single character.
	pub fn advance(&mut self, ch: char) {
		self.offset += ch.len_utf8();
		if ch == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
	}

	/// Advance the point through an entire text slice.
	pub fn advance_str(&mut self, text: &str) {
		for ch in text.chars() {
			self.advance(ch);
		}
	}
}

impl Default for Point {
	fn default() -> Self {
		Self::start()
	}
}

impl Display for Point {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.line, self.column)
	}
}
