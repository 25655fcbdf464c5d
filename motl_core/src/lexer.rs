use logos::Logos;

use crate::MotlError;
use crate::MotlResult;
use crate::position::Point;
use crate::tokens::Keyword;
use crate::tokens::Token;
use crate::tokens::TokenKind;

/// Raw tokens produced by logos inside a directive (between `[` and `]`).
/// Text outside directives never reaches this lexer.
#[derive(Logos, Debug, PartialEq)]
enum RawDirective {
	#[regex(r"[ \t\r\n\f]+")]
	Whitespace,
	#[token("]")]
	RightBracket,
	#[regex(r"--[^\]\n\r]*")]
	Comment,
	#[regex(r"'([^'\\]|\\.|'')*'")]
	String,
	#[regex(r"[0-9]+(\.[0-9]+)?")]
	Number,
	#[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
	Ident,
	#[token("->")]
	Arrow,
	#[token("<>")]
	NotEquals,
	#[token("<=")]
	LessOrEqual,
	#[token(">=")]
	GreaterOrEqual,
	#[token("/")]
	Slash,
	#[token("(")]
	LeftParen,
	#[token(")")]
	RightParen,
	#[token(",")]
	Comma,
	#[token(":")]
	Colon,
	#[token(".")]
	Dot,
	#[token("|")]
	Pipe,
	#[token("?")]
	Question,
	#[token("+")]
	Plus,
	#[token("-")]
	Minus,
	#[token("*")]
	Star,
	#[token("=")]
	Equals,
	#[token("<")]
	Less,
	#[token(">")]
	Greater,
}

/// Walks the source with a two-state mode machine: text mode accumulates
/// literal content up to the next `[`; directive mode hands the remainder to
/// logos until the matching `]` returns control to text mode.
struct ModeWalker<'a> {
	rest: &'a str,
	point: Point,
	tokens: Vec<Token>,
}

impl<'a> ModeWalker<'a> {
	fn new(source: &'a str) -> Self {
		Self {
			rest: source,
			point: Point::start(),
			tokens: vec![],
		}
	}

	fn push(&mut self, kind: TokenKind, point: Point) {
		self.tokens.push(Token::new(kind, point));
	}

	/// Consume literal text up to (not including) the next `[`. Returns true
	/// when a `[` follows.
	fn process_text(&mut self) -> bool {
		match self.rest.find('[') {
			Some(index) => {
				if index > 0 {
					let text = &self.rest[..index];
					let point = self.point;
					self.point.advance_str(text);
					self.push(TokenKind::Text(text.to_string()), point);
				}
				self.push(TokenKind::LeftBracket, self.point);
				self.point.advance('[');
				self.rest = &self.rest[index + 1..];
				true
			}
			None => {
				if !self.rest.is_empty() {
					let point = self.point;
					self.push(TokenKind::Text(self.rest.to_string()), point);
					self.point.advance_str(self.rest);
					self.rest = "";
				}
				false
			}
		}
	}

	/// Consume directive tokens until the closing `]` (or end of input, which
	/// the parser reports as an unexpected end of directive).
	fn process_directive(&mut self) -> MotlResult<()> {
		let mut lexer = RawDirective::lexer(self.rest);
		// Byte offset of the end of the previous non-whitespace raw token,
		// for adjacency checks when folding negative numeric literals.
		let mut previous_end = 0usize;

		while let Some(result) = lexer.next() {
			let slice = lexer.slice();
			let point = self.point;
			self.point.advance_str(slice);

			let raw = match result {
				Ok(raw) => raw,
				Err(()) => {
					return Err(self.unexpected_character(slice, point));
				}
			};

			match raw {
				RawDirective::Whitespace => continue,
				RawDirective::RightBracket => {
					self.push(TokenKind::RightBracket, point);
					self.rest = lexer.remainder();
					return Ok(());
				}
				RawDirective::Comment => {
					let value = slice[2..].to_string();
					self.push(TokenKind::Comment(value), point);
				}
				RawDirective::String => {
					let inner = &slice[1..slice.len() - 1];
					self.push(TokenKind::String(unescape_literal(inner)), point);
				}
				RawDirective::Number => {
					let (kind, point) =
						self.numeric_token(slice, point, lexer.span().start, previous_end)?;
					self.push(kind, point);
				}
				RawDirective::Ident => {
					let kind = match slice {
						"true" => TokenKind::Boolean(true),
						"false" => TokenKind::Boolean(false),
						other => {
							match Keyword::from_ident(other) {
								Some(keyword) => TokenKind::Keyword(keyword),
								None => TokenKind::Identifier(other.to_string()),
							}
						}
					};
					self.push(kind, point);
				}
				RawDirective::Arrow => self.push(TokenKind::Arrow, point),
				RawDirective::NotEquals => self.push(TokenKind::NotEquals, point),
				RawDirective::LessOrEqual => self.push(TokenKind::LessOrEqual, point),
				RawDirective::GreaterOrEqual => self.push(TokenKind::GreaterOrEqual, point),
				RawDirective::Slash => self.push(TokenKind::Slash, point),
				RawDirective::LeftParen => self.push(TokenKind::LeftParen, point),
				RawDirective::RightParen => self.push(TokenKind::RightParen, point),
				RawDirective::Comma => self.push(TokenKind::Comma, point),
				RawDirective::Colon => self.push(TokenKind::Colon, point),
				RawDirective::Dot => self.push(TokenKind::Dot, point),
				RawDirective::Pipe => self.push(TokenKind::Pipe, point),
				RawDirective::Question => self.push(TokenKind::Question, point),
				RawDirective::Plus => self.push(TokenKind::Plus, point),
				RawDirective::Minus => self.push(TokenKind::Minus, point),
				RawDirective::Star => self.push(TokenKind::Star, point),
				RawDirective::Equals => self.push(TokenKind::Equals, point),
				RawDirective::Less => self.push(TokenKind::Less, point),
				RawDirective::Greater => self.push(TokenKind::Greater, point),
			}

			previous_end = lexer.span().end;
		}

		// End of input inside a directive: the parser reports the missing `]`.
		self.rest = "";
		Ok(())
	}

	/// Parse a numeric slice, folding a directly preceding `-` into a
	/// negative literal when the minus cannot be a binary operator (no
	/// operand precedes it). Returns the token kind and the point to anchor
	/// it at — the minus sign's point when folded.
	fn numeric_token(
		&mut self,
		slice: &str,
		point: Point,
		span_start: usize,
		previous_end: usize,
	) -> MotlResult<(TokenKind, Point)> {
		let negate = span_start == previous_end
			&& matches!(self.tokens.last().map(|token| &token.kind), Some(TokenKind::Minus))
			&& !self
				.tokens
				.iter()
				.rev()
				.nth(1)
				.is_some_and(|token| is_operand(&token.kind));

		let anchor = if negate {
			let minus = self
				.tokens
				.pop()
				.expect("minus token present when folding a negative literal");
			minus.point
		} else {
			point
		};

		let kind = if slice.contains('.') {
			let value = slice
				.parse::<f64>()
				.map_err(|_| self.invalid_number(slice, point))?;
			TokenKind::Real(if negate { -value } else { value })
		} else {
			let value = slice
				.parse::<i64>()
				.map_err(|_| self.invalid_number(slice, point))?;
			TokenKind::Integer(if negate { -value } else { value })
		};

		Ok((kind, anchor))
	}

	fn unexpected_character(&self, slice: &str, point: Point) -> MotlError {
		let first = slice.chars().next().unwrap_or('\0');
		if first == '\'' {
			MotlError::InvalidSyntax {
				line: point.line,
				column: point.column,
				message: "unterminated string literal".to_string(),
			}
		} else {
			MotlError::InvalidSyntax {
				line: point.line,
				column: point.column,
				message: format!("unexpected character `{first}` in directive"),
			}
		}
	}

	fn invalid_number(&self, slice: &str, point: Point) -> MotlError {
		MotlError::InvalidSyntax {
			line: point.line,
			column: point.column,
			message: format!("invalid numeric literal `{slice}`"),
		}
	}
}

/// True for tokens that can end an operand, making a following `-` a binary
/// operator rather than a sign.
fn is_operand(kind: &TokenKind) -> bool {
	matches!(
		kind,
		TokenKind::Identifier(_)
			| TokenKind::Keyword(_)
			| TokenKind::Integer(_)
			| TokenKind::Real(_)
			| TokenKind::String(_)
			| TokenKind::Boolean(_)
			| TokenKind::RightParen
	)
}

/// Resolve `''` doubling and backslash escapes inside a string literal body.
/// `\n`, `\t`, `\r`, `\\`, and `\'` are recognised; any other escaped
/// character is taken literally.
fn unescape_literal(inner: &str) -> String {
	let mut value = String::with_capacity(inner.len());
	let mut chars = inner.chars().peekable();

	while let Some(ch) = chars.next() {
		match ch {
			'\'' => {
				// Doubled quote; the lexer guarantees pairs.
				if chars.peek() == Some(&'\'') {
					chars.next();
				}
				value.push('\'');
			}
			'\\' => {
				match chars.next() {
					Some('n') => value.push('\n'),
					Some('t') => value.push('\t'),
					Some('r') => value.push('\r'),
					Some('\\') => value.push('\\'),
					Some('\'') => value.push('\''),
					Some(other) => value.push(other),
					None => value.push('\\'),
				}
			}
			other => value.push(other),
		}
	}

	value
}

/// Tokenize template source into a flat stream. Text outside directives
/// becomes `Text` tokens; `[` switches to directive mode until the matching
/// `]`. A terminal `Eof` token is always appended.
pub fn tokenize(source: &str) -> MotlResult<Vec<Token>> {
	let mut walker = ModeWalker::new(source);

	while walker.process_text() {
		walker.process_directive()?;
	}

	let end = walker.point;
	walker.push(TokenKind::Eof, end);
	Ok(walker.tokens)
}
