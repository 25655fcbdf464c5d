use crate::indent::Indentation;

/// A buffered text sink that applies the current indentation at the start of
/// each line.
///
/// The writer tracks whether it sits at a line start; the first
/// indent-eligible write after a newline emits the indentation prefix exactly
/// once. Writers are single-owner: one execution context mutates a writer at
/// a time.
#[derive(Debug, Clone)]
pub struct Writer {
	buffer: String,
	at_line_start: bool,
	indentation: Indentation,
}

impl Writer {
	pub fn new() -> Self {
		Self {
			buffer: String::new(),
			at_line_start: true,
			indentation: Indentation::default(),
		}
	}

	/// Append text. When at a line start and `apply_indent` is set, the
	/// indentation prefix is emitted first. Empty text is a no-op.
	pub fn write(&mut self, text: &str, apply_indent: bool) {
		if text.is_empty() {
			return;
		}
		if self.at_line_start && apply_indent {
			self.buffer.push_str(&self.indentation.as_string());
		}
		self.buffer.push_str(text);
		self.at_line_start = false;
	}

	/// Append text followed by a newline. An empty `text` at a line start
	/// still emits the indentation prefix when `apply_indent` is set, which
	/// preserves trailing blank indented lines.
	pub fn write_line(&mut self, text: &str, apply_indent: bool) {
		if text.is_empty() {
			if self.at_line_start && apply_indent {
				self.buffer.push_str(&self.indentation.as_string());
			}
		} else {
			self.write(text, apply_indent);
		}
		self.buffer.push('\n');
		self.at_line_start = true;
	}

	/// Append a bare newline. `apply_indent_next` controls whether the next
	/// line-start write is indent-eligible.
	pub fn new_line(&mut self, apply_indent_next: bool) {
		self.buffer.push('\n');
		self.at_line_start = apply_indent_next;
	}

	/// The accumulated buffer, non-destructively.
	pub fn content(&self) -> &str {
		&self.buffer
	}

	/// Consume the writer, returning its buffer.
	pub fn into_content(self) -> String {
		self.buffer
	}

	pub fn clear(&mut self) {
		self.buffer.clear();
		self.at_line_start = true;
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	pub fn at_line_start(&self) -> bool {
		self.at_line_start
	}

	pub fn indentation(&self) -> &Indentation {
		&self.indentation
	}

	pub fn set_indentation(&mut self, indentation: Indentation) {
		self.indentation = indentation;
	}
}

impl Default for Writer {
	fn default() -> Self {
		Self::new()
	}
}
