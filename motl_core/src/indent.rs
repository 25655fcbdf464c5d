use std::fmt::Display;

/// Default indentation unit: four spaces.
pub const DEFAULT_INDENT_UNIT: &str = "    ";

/// An immutable indentation level paired with its unit string.
///
/// `increment`/`decrement` return new values; decrementing at level zero is a
/// no-op. The rendered prefix is the unit repeated `level` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indentation {
	level: usize,
	unit: String,
}

impl Indentation {
	/// Create an indentation at the given level with the default unit.
	pub fn new(level: usize) -> Self {
		Self::with_unit(level, DEFAULT_INDENT_UNIT)
	}

	/// Create an indentation with an explicit unit. The unit must be
	/// non-empty; an empty unit falls back to the default.
	pub fn with_unit(level: usize, unit: impl Into<String>) -> Self {
		let unit: String = unit.into();
		let unit = if unit.is_empty() {
			DEFAULT_INDENT_UNIT.to_string()
		} else {
			unit
		};
		Self { level, unit }
	}

	pub fn level(&self) -> usize {
		self.level
	}

	pub fn unit(&self) -> &str {
		&self.unit
	}

	pub fn increment(&self) -> Self {
		Self {
			level: self.level + 1,
			unit: self.unit.clone(),
		}
	}

	pub fn decrement(&self) -> Self {
		Self {
			level: self.level.saturating_sub(1),
			unit: self.unit.clone(),
		}
	}

	/// The prefix string for the current level: `unit` repeated `level`
	/// times, empty at level zero.
	pub fn as_string(&self) -> String {
		self.unit.repeat(self.level)
	}
}

impl Default for Indentation {
	fn default() -> Self {
		Self::new(0)
	}
}

impl Display for Indentation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_string())
	}
}
