use crate::MotlError;
use crate::MotlResult;
use crate::ast::Binding;
use crate::ast::Block;
use crate::ast::FileMode;
use crate::ast::Macro;
use crate::ast::Module;
use crate::ast::Parameter;
use crate::ast::Query;
use crate::ast::Statement;
use crate::ast::Template;
use crate::ast::Visibility;
use crate::expr::BinaryOp;
use crate::expr::CollectionOp;
use crate::expr::ExprKind;
use crate::expr::Expression;
use crate::lexer::tokenize;
use crate::position::Point;
use crate::tokens::Keyword;
use crate::tokens::Token;
use crate::tokens::TokenKind;

/// Parse template source into a module.
pub fn parse(source: impl AsRef<str>) -> MotlResult<Module> {
	let tokens = tokenize(source.as_ref())?;
	Parser::new(tokens).parse_module()
}

/// What ends the block currently being parsed.
#[derive(Debug, Clone, PartialEq)]
enum BlockEnd {
	/// `[/keyword]`
	Keyword(Keyword),
	/// `[/name]` for invocations and trace blocks.
	Name(String),
}

struct Parser {
	tokens: Vec<Token>,
	cursor: usize,
}

impl Parser {
	fn new(tokens: Vec<Token>) -> Self {
		Self { tokens, cursor: 0 }
	}

	fn peek(&self) -> &TokenKind {
		self.nth(0)
	}

	fn nth(&self, n: usize) -> &TokenKind {
		static EOF: TokenKind = TokenKind::Eof;
		self.tokens
			.get(self.cursor + n)
			.map_or(&EOF, |token| &token.kind)
	}

	fn point(&self) -> Point {
		self.tokens
			.get(self.cursor)
			.map_or_else(Point::start, |token| token.point)
	}

	fn advance(&mut self) -> Token {
		let token = self
			.tokens
			.get(self.cursor)
			.cloned()
			.unwrap_or_else(|| Token::new(TokenKind::Eof, Point::start()));
		if self.cursor < self.tokens.len() {
			self.cursor += 1;
		}
		token
	}

	fn error_at(&self, point: Point, message: impl Into<String>) -> MotlError {
		MotlError::InvalidSyntax {
			line: point.line,
			column: point.column,
			message: message.into(),
		}
	}

	fn unexpected(&self, expected: &str) -> MotlError {
		self.error_at(
			self.point(),
			format!("expected {expected}, found {}", self.peek().describe()),
		)
	}

	fn expect(&mut self, kind: &TokenKind, expected: &str) -> MotlResult<Token> {
		if self.peek() == kind {
			Ok(self.advance())
		} else {
			Err(self.unexpected(expected))
		}
	}

	fn expect_keyword(&mut self, keyword: Keyword) -> MotlResult<Token> {
		self.expect(
			&TokenKind::Keyword(keyword),
			&format!("keyword `{keyword}`"),
		)
	}

	/// Consume a name. Keywords and boolean spellings are accepted wherever
	/// a name is expected, so models may use reserved vocabulary freely.
	fn expect_name(&mut self, what: &str) -> MotlResult<String> {
		match self.peek().ident_spelling() {
			Some(name) => {
				let name = name.to_string();
				self.advance();
				Ok(name)
			}
			None => Err(self.unexpected(what)),
		}
	}

	fn eat(&mut self, kind: &TokenKind) -> bool {
		if self.peek() == kind {
			self.advance();
			true
		} else {
			false
		}
	}

	// ---- module level -----------------------------------------------------

	fn parse_module(&mut self) -> MotlResult<Module> {
		let mut pending_doc: Vec<String> = vec![];

		// Free text before the header is insignificant; comments become the
		// module documentation.
		loop {
			match self.peek() {
				TokenKind::Text(_) => {
					self.advance();
				}
				TokenKind::LeftBracket if matches!(self.nth(1), TokenKind::Comment(_)) => {
					self.advance();
					if let TokenKind::Comment(value) = self.advance().kind {
						pending_doc.push(value.trim().to_string());
					}
					self.expect(&TokenKind::RightBracket, "`]`")?;
				}
				_ => break,
			}
		}

		self.expect(&TokenKind::LeftBracket, "`[module ...]` header")?;
		self.expect_keyword(Keyword::Module)?;
		let name = self.expect_name("module name")?;
		if name.is_empty() {
			return Err(self.error_at(self.point(), "module name must not be empty"));
		}

		let mut module = Module::new(name);
		if !pending_doc.is_empty() {
			module.documentation = Some(pending_doc.join("\n"));
			pending_doc = vec![];
		}

		self.expect(&TokenKind::LeftParen, "`(`")?;
		loop {
			let point = self.point();
			let TokenKind::String(uri) = self.peek().clone() else {
				return Err(self.unexpected("metamodel uri string"));
			};
			self.advance();
			let alias = metamodel_alias(&uri);
			let alias = if module.metamodels.contains_key(&alias) {
				uri.clone()
			} else {
				alias
			};
			if module.metamodels.insert(alias, uri).is_some() {
				return Err(self.error_at(point, "duplicate metamodel uri in module header"));
			}
			if !self.eat(&TokenKind::Comma) {
				break;
			}
		}
		self.expect(&TokenKind::RightParen, "`)`")?;
		self.expect(&TokenKind::RightBracket, "`]`")?;

		// Top-level declarations.
		loop {
			match self.peek() {
				TokenKind::Eof => break,
				TokenKind::Text(_) => {
					// Free text between declarations carries no meaning.
					self.advance();
				}
				TokenKind::LeftBracket => {
					self.advance();
					self.parse_top_declaration(&mut module, &mut pending_doc)?;
				}
				_ => return Err(self.unexpected("a top-level declaration")),
			}
		}

		Ok(module)
	}

	fn parse_top_declaration(
		&mut self,
		module: &mut Module,
		pending_doc: &mut Vec<String>,
	) -> MotlResult<()> {
		let documentation = if pending_doc.is_empty() {
			None
		} else {
			Some(std::mem::take(pending_doc).join("\n"))
		};

		match self.peek().clone() {
			TokenKind::Comment(value) => {
				self.advance();
				self.expect(&TokenKind::RightBracket, "`]`")?;
				pending_doc.push(value.trim().to_string());
				Ok(())
			}
			TokenKind::Keyword(Keyword::Template) => {
				self.advance();
				let template = self.parse_template(documentation)?;
				module.add_template(template)
			}
			TokenKind::Keyword(Keyword::Query) => {
				self.advance();
				let query = self.parse_query(documentation)?;
				module.add_query(query)
			}
			TokenKind::Keyword(Keyword::Macro) => {
				self.advance();
				let r#macro = self.parse_macro(documentation)?;
				module.add_macro(r#macro)
			}
			TokenKind::Identifier(name) if name == "import" => {
				self.advance();
				let imported = self.parse_qualified_name("imported module name")?;
				self.eat(&TokenKind::Slash);
				self.expect(&TokenKind::RightBracket, "`]`")?;
				module.imports.push(imported);
				Ok(())
			}
			TokenKind::Identifier(name) if name == "extends" => {
				self.advance();
				let parent = self.parse_qualified_name("parent module name")?;
				self.eat(&TokenKind::Slash);
				self.expect(&TokenKind::RightBracket, "`]`")?;
				module.extends = Some(parent);
				Ok(())
			}
			other => {
				let spelling = other
					.ident_spelling()
					.map_or_else(|| other.describe(), str::to_string);
				Err(MotlError::UnknownStatementType(spelling))
			}
		}
	}

	fn parse_qualified_name(&mut self, what: &str) -> MotlResult<String> {
		let mut name = self.expect_name(what)?;
		while self.eat(&TokenKind::Dot) {
			name.push('.');
			name.push_str(&self.expect_name(what)?);
		}
		Ok(name)
	}

	/// `visibility` only counts when a name still follows; `[template
	/// public()]` declares a template *named* public.
	fn parse_visibility(&mut self) -> Visibility {
		let candidate = match self.peek() {
			TokenKind::Keyword(Keyword::Public) => Visibility::Public,
			TokenKind::Keyword(Keyword::Private) => Visibility::Private,
			TokenKind::Keyword(Keyword::Protected) => Visibility::Protected,
			_ => return Visibility::Public,
		};
		if matches!(self.nth(1), TokenKind::LeftParen) {
			return Visibility::Public;
		}
		self.advance();
		candidate
	}

	fn parse_template(&mut self, documentation: Option<String>) -> MotlResult<Template> {
		let visibility = self.parse_visibility();

		let is_main = matches!(self.peek(), TokenKind::Keyword(Keyword::Main))
			&& !matches!(self.nth(1), TokenKind::LeftParen);
		if is_main {
			self.advance();
		}

		let name = self.expect_name("template name")?;
		let parameters = self.parse_parameters("template")?;

		let overrides = if self.eat(&TokenKind::Keyword(Keyword::Overrides)) {
			Some(self.expect_name("overridden template name")?)
		} else {
			None
		};

		let guard = if self.eat(&TokenKind::Keyword(Keyword::Guard))
			|| self.eat(&TokenKind::Question)
		{
			self.expect(&TokenKind::LeftParen, "`(`")?;
			let expr = self.parse_expression()?;
			self.expect(&TokenKind::RightParen, "`)`")?;
			Some(expr)
		} else {
			None
		};

		let post_condition = if self.eat(&TokenKind::Keyword(Keyword::Post)) {
			self.expect(&TokenKind::LeftParen, "`(`")?;
			let expr = self.parse_expression()?;
			self.expect(&TokenKind::RightParen, "`)`")?;
			Some(expr)
		} else {
			None
		};

		self.expect(&TokenKind::RightBracket, "`]`")?;

		let body = self.parse_statements(&BlockEnd::Keyword(Keyword::Template))?;
		self.consume_block_end(&BlockEnd::Keyword(Keyword::Template))?;

		Ok(Template {
			name,
			visibility,
			parameters,
			guard,
			post_condition,
			body,
			is_main,
			overrides,
			documentation,
		})
	}

	fn parse_query(&mut self, documentation: Option<String>) -> MotlResult<Query> {
		let visibility = self.parse_visibility();
		let name = self.expect_name("query name")?;
		let parameters = self.parse_parameters("query")?;
		self.expect(&TokenKind::Colon, "`:` before the return type")?;
		let return_type = self.parse_type_ref()?;
		self.expect(&TokenKind::Equals, "`=` before the query body")?;
		let body = self.parse_expression()?;
		self.eat(&TokenKind::Slash);
		self.expect(&TokenKind::RightBracket, "`]`")?;

		Ok(Query {
			name,
			visibility,
			parameters,
			return_type,
			body,
			documentation,
		})
	}

	fn parse_macro(&mut self, documentation: Option<String>) -> MotlResult<Macro> {
		let name = self.expect_name("macro name")?;

		self.expect(&TokenKind::LeftParen, "`(`")?;
		let mut parameters: Vec<Parameter> = vec![];
		let mut body_parameter = None;
		if !matches!(self.peek(), TokenKind::RightParen) {
			if !matches!(self.peek(), TokenKind::Pipe) {
				loop {
					let point = self.point();
					let parameter = self.parse_parameter()?;
					if parameters.iter().any(|p| p.name == parameter.name) {
						return Err(self.error_at(
							point,
							format!("duplicate parameter name `{}`", parameter.name),
						));
					}
					parameters.push(parameter);
					if !self.eat(&TokenKind::Comma) {
						break;
					}
				}
			}
			if self.eat(&TokenKind::Pipe) {
				let point = self.point();
				let body_name = self.expect_name("body parameter name")?;
				if parameters.iter().any(|p| p.name == body_name) {
					return Err(self.error_at(
						point,
						format!("body parameter `{body_name}` collides with a regular parameter"),
					));
				}
				body_parameter = Some(body_name);
			}
		}
		self.expect(&TokenKind::RightParen, "`)`")?;
		self.expect(&TokenKind::RightBracket, "`]`")?;

		let body = self.parse_statements(&BlockEnd::Keyword(Keyword::Macro))?;
		self.consume_block_end(&BlockEnd::Keyword(Keyword::Macro))?;

		Ok(Macro {
			name,
			parameters,
			body_parameter,
			body,
			documentation,
		})
	}

	fn parse_parameters(&mut self, owner: &str) -> MotlResult<Vec<Parameter>> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let mut parameters: Vec<Parameter> = vec![];
		if !matches!(self.peek(), TokenKind::RightParen) {
			loop {
				let point = self.point();
				let parameter = self.parse_parameter()?;
				if parameters.iter().any(|p| p.name == parameter.name) {
					return Err(self.error_at(
						point,
						format!(
							"duplicate parameter name `{}` in {owner} declaration",
							parameter.name
						),
					));
				}
				parameters.push(parameter);
				if !self.eat(&TokenKind::Comma) {
					break;
				}
			}
		}
		self.expect(&TokenKind::RightParen, "`)`")?;
		Ok(parameters)
	}

	fn parse_parameter(&mut self) -> MotlResult<Parameter> {
		let name = self.expect_name("parameter name")?;
		self.expect(&TokenKind::Colon, "`:` before the parameter type")?;
		let type_name = self.parse_type_ref()?;
		Ok(Parameter { name, type_name })
	}

	fn parse_type_ref(&mut self) -> MotlResult<String> {
		self.parse_qualified_name("type name")
	}

	// ---- statements -------------------------------------------------------

	/// True when the cursor sits on the directive that terminates the block
	/// being parsed: its close tag, or (inside `if`) an `elseif`/`else` arm.
	fn at_block_end(&self, end: &BlockEnd) -> bool {
		if !matches!(self.peek(), TokenKind::LeftBracket) {
			return false;
		}
		match self.nth(1) {
			TokenKind::Slash => {
				match (end, self.nth(2)) {
					(BlockEnd::Keyword(expected), TokenKind::Keyword(found)) => expected == found,
					(BlockEnd::Name(expected), found) => {
						found.ident_spelling() == Some(expected.as_str())
					}
					_ => false,
				}
			}
			TokenKind::Keyword(Keyword::ElseIf | Keyword::Else) => {
				matches!(end, BlockEnd::Keyword(Keyword::If))
			}
			_ => false,
		}
	}

	/// Consume `[/keyword]` or `[/name]`.
	fn consume_block_end(&mut self, end: &BlockEnd) -> MotlResult<()> {
		let what = match end {
			BlockEnd::Keyword(keyword) => format!("`[/{keyword}]`"),
			BlockEnd::Name(name) => format!("`[/{name}]`"),
		};
		self.expect(&TokenKind::LeftBracket, &what)?;
		self.expect(&TokenKind::Slash, &what)?;
		match end {
			BlockEnd::Keyword(keyword) => {
				self.expect_keyword(*keyword)?;
			}
			BlockEnd::Name(name) => {
				let found = self.expect_name("closing name")?;
				if &found != name {
					return Err(self.error_at(
						self.point(),
						format!("mismatched close tag: expected `[/{name}]`, found `[/{found}]`"),
					));
				}
			}
		}
		self.expect(&TokenKind::RightBracket, "`]`")?;
		Ok(())
	}

	/// Parse statements until the terminating directive for `end`, which is
	/// left unconsumed. Parsed blocks are inlined: the template text governs
	/// its own whitespace, and indentation levels only apply to blocks built
	/// programmatically.
	fn parse_statements(&mut self, end: &BlockEnd) -> MotlResult<Block> {
		let mut statements = vec![];

		loop {
			match self.peek().clone() {
				TokenKind::Eof => {
					let what = match end {
						BlockEnd::Keyword(keyword) => format!("[/{keyword}]"),
						BlockEnd::Name(name) => format!("[/{name}]"),
					};
					return Err(self.error_at(
						self.point(),
						format!("unexpected end of input, expected `{what}`"),
					));
				}
				TokenKind::Text(text) => {
					self.advance();
					push_text_statements(&mut statements, &text);
				}
				TokenKind::LeftBracket => {
					if self.at_block_end(end) {
						break;
					}
					self.advance();
					statements.push(self.parse_directive()?);
				}
				_ => return Err(self.unexpected("text or a directive")),
			}
		}

		Ok(Block::inlined(statements))
	}

	/// Parse one directive after its opening `[`.
	fn parse_directive(&mut self) -> MotlResult<Statement> {
		match self.peek().clone() {
			TokenKind::Slash => {
				let point = self.point();
				let tag = self
					.nth(1)
					.ident_spelling()
					.map_or_else(|| self.nth(1).describe(), str::to_string);
				Err(self.error_at(point, format!("unexpected close tag `[/{tag}]`")))
			}
			TokenKind::Comment(value) => {
				self.advance();
				self.expect(&TokenKind::RightBracket, "`]` closing the comment")?;
				Ok(Statement::Comment { value })
			}
			TokenKind::Keyword(Keyword::If) => {
				self.advance();
				self.parse_if()
			}
			TokenKind::Keyword(Keyword::For) => {
				self.advance();
				self.parse_for()
			}
			TokenKind::Keyword(Keyword::Let) => {
				self.advance();
				self.parse_let()
			}
			TokenKind::Keyword(Keyword::File) => {
				self.advance();
				self.parse_file()
			}
			TokenKind::Keyword(Keyword::Protected) => {
				self.advance();
				self.parse_protected_area()
			}
			TokenKind::Identifier(name)
				if name == "trace" && matches!(self.nth(1), TokenKind::LeftParen) =>
			{
				self.advance();
				self.parse_trace()
			}
			kind if is_invocation_head(&kind) && matches!(self.nth(1), TokenKind::LeftParen) => {
				let name = self.expect_name("invocation name")?;
				self.parse_invocation(name)
			}
			_ => self.parse_expression_statement(),
		}
	}

	fn parse_if(&mut self) -> MotlResult<Statement> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let condition = self.parse_expression()?;
		self.expect(&TokenKind::RightParen, "`)`")?;
		self.expect(&TokenKind::RightBracket, "`]`")?;

		let end = BlockEnd::Keyword(Keyword::If);
		let then_block = self.parse_statements(&end)?;

		let mut else_if_clauses = vec![];
		let mut else_block = None;

		loop {
			// parse_statements stops at `[elseif`, `[else`, or `[/if`.
			if matches!(self.nth(1), TokenKind::Slash) {
				self.consume_block_end(&end)?;
				break;
			}
			self.expect(&TokenKind::LeftBracket, "`[`")?;
			match self.peek().clone() {
				TokenKind::Keyword(Keyword::ElseIf) => {
					self.advance();
					self.expect(&TokenKind::LeftParen, "`(`")?;
					let clause_condition = self.parse_expression()?;
					self.expect(&TokenKind::RightParen, "`)`")?;
					self.expect(&TokenKind::RightBracket, "`]`")?;
					let clause_block = self.parse_statements(&end)?;
					else_if_clauses.push((clause_condition, clause_block));
				}
				TokenKind::Keyword(Keyword::Else) => {
					self.advance();
					self.expect(&TokenKind::RightBracket, "`]`")?;
					let block = self.parse_statements(&end)?;
					if else_block.replace(block).is_some() {
						return Err(
							self.error_at(self.point(), "an if statement allows one else arm")
						);
					}
				}
				_ => return Err(self.unexpected("`elseif`, `else`, or `[/if]`")),
			}
		}

		Ok(Statement::If {
			condition,
			then_block,
			else_if_clauses,
			else_block,
		})
	}

	fn parse_for(&mut self) -> MotlResult<Statement> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let variable = self.expect_name("loop variable")?;
		let type_name = if self.eat(&TokenKind::Colon) {
			Some(self.parse_type_ref()?)
		} else {
			None
		};
		self.expect(&TokenKind::Keyword(Keyword::In), "`in`")?;
		let collection = self.parse_expression()?;
		self.expect(&TokenKind::RightParen, "`)`")?;

		let separator = if self.eat(&TokenKind::Keyword(Keyword::Separator)) {
			self.expect(&TokenKind::LeftParen, "`(`")?;
			let expr = self.parse_expression()?;
			self.expect(&TokenKind::RightParen, "`)`")?;
			Some(expr)
		} else {
			None
		};

		self.expect(&TokenKind::RightBracket, "`]`")?;
		let end = BlockEnd::Keyword(Keyword::For);
		let body = self.parse_statements(&end)?;
		self.consume_block_end(&end)?;

		Ok(Statement::For {
			variable,
			type_name,
			collection,
			separator,
			body,
		})
	}

	fn parse_let(&mut self) -> MotlResult<Statement> {
		let mut bindings = vec![];
		loop {
			let point = self.point();
			let name = self.expect_name("binding name")?;
			let type_name = if self.eat(&TokenKind::Colon) {
				Some(self.parse_type_ref()?)
			} else {
				None
			};
			self.expect(&TokenKind::Equals, "`=`")?;
			let init = self.parse_expression()?;
			if bindings.iter().any(|binding: &Binding| binding.name == name) {
				return Err(self.error_at(point, format!("duplicate let binding `{name}`")));
			}
			bindings.push(Binding {
				name,
				type_name,
				init,
			});
			if !self.eat(&TokenKind::Comma) {
				break;
			}
		}
		self.expect(&TokenKind::RightBracket, "`]`")?;

		let end = BlockEnd::Keyword(Keyword::Let);
		let body = self.parse_statements(&end)?;
		self.consume_block_end(&end)?;

		Ok(Statement::Let { bindings, body })
	}

	fn parse_file(&mut self) -> MotlResult<Statement> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let url = self.parse_expression()?;
		let mut mode_expr = None;
		let mut charset = None;
		if self.eat(&TokenKind::Comma) {
			mode_expr = Some(self.parse_expression()?);
			if self.eat(&TokenKind::Comma) {
				charset = Some(self.parse_expression()?);
			}
		}
		self.expect(&TokenKind::RightParen, "`)`")?;
		self.expect(&TokenKind::RightBracket, "`]`")?;

		let mode = mode_expr.as_ref().map_or(FileMode::Overwrite, promote_mode);

		let end = BlockEnd::Keyword(Keyword::File);
		let body = self.parse_statements(&end)?;
		self.consume_block_end(&end)?;

		Ok(Statement::File {
			url,
			mode,
			charset,
			body,
		})
	}

	fn parse_protected_area(&mut self) -> MotlResult<Statement> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let id = self.parse_expression()?;
		let mut start_prefix = None;
		let mut end_prefix = None;
		if self.eat(&TokenKind::Comma) {
			start_prefix = Some(self.parse_expression()?);
			if self.eat(&TokenKind::Comma) {
				end_prefix = Some(self.parse_expression()?);
			}
		}
		self.expect(&TokenKind::RightParen, "`)`")?;
		self.expect(&TokenKind::RightBracket, "`]`")?;

		let end = BlockEnd::Keyword(Keyword::Protected);
		let body = self.parse_statements(&end)?;
		self.consume_block_end(&end)?;

		Ok(Statement::ProtectedArea {
			id,
			start_prefix,
			end_prefix,
			body,
		})
	}

	fn parse_trace(&mut self) -> MotlResult<Statement> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let source = self.parse_expression()?;
		self.expect(&TokenKind::RightParen, "`)`")?;
		self.expect(&TokenKind::RightBracket, "`]`")?;

		let end = BlockEnd::Name("trace".to_string());
		let body = self.parse_statements(&end)?;
		self.consume_block_end(&end)?;

		Ok(Statement::Trace { source, body })
	}

	fn parse_invocation(&mut self, name: String) -> MotlResult<Statement> {
		self.expect(&TokenKind::LeftParen, "`(`")?;
		let mut arguments = vec![];
		if !matches!(self.peek(), TokenKind::RightParen) {
			loop {
				arguments.push(self.parse_expression()?);
				if !self.eat(&TokenKind::Comma) {
					break;
				}
			}
		}
		self.expect(&TokenKind::RightParen, "`)`")?;

		// `[name(args)/]` has no body; `[name(args)]...[/name]` captures one.
		let body = if self.eat(&TokenKind::Slash) {
			self.expect(&TokenKind::RightBracket, "`]`")?;
			None
		} else {
			self.expect(&TokenKind::RightBracket, "`]`")?;
			let end = BlockEnd::Name(name.clone());
			let block = self.parse_statements(&end)?;
			self.consume_block_end(&end)?;
			Some(block)
		};

		Ok(Statement::MacroInvocation {
			name,
			arguments,
			body,
		})
	}

	fn parse_expression_statement(&mut self) -> MotlResult<Statement> {
		let expr = self.parse_expression()?;
		self.eat(&TokenKind::Slash);
		self.expect(&TokenKind::RightBracket, "`]` closing the expression")?;
		Ok(Statement::Expression {
			expr,
			multi_lines: false,
			new_line_needed: false,
		})
	}

	// ---- expressions ------------------------------------------------------

	fn parse_expression(&mut self) -> MotlResult<Expression> {
		self.parse_or()
	}

	fn parse_or(&mut self) -> MotlResult<Expression> {
		let mut left = self.parse_and()?;
		while self.eat(&TokenKind::Keyword(Keyword::Or)) {
			let right = self.parse_and()?;
			left = binary(BinaryOp::Or, left, right);
		}
		Ok(left)
	}

	fn parse_and(&mut self) -> MotlResult<Expression> {
		let mut left = self.parse_comparison()?;
		while self.eat(&TokenKind::Keyword(Keyword::And)) {
			let right = self.parse_comparison()?;
			left = binary(BinaryOp::And, left, right);
		}
		Ok(left)
	}

	fn parse_comparison(&mut self) -> MotlResult<Expression> {
		let mut left = self.parse_additive()?;
		loop {
			let op = match self.peek() {
				TokenKind::Equals => BinaryOp::Equals,
				TokenKind::NotEquals => BinaryOp::NotEquals,
				TokenKind::Less => BinaryOp::LessThan,
				TokenKind::Greater => BinaryOp::GreaterThan,
				TokenKind::LessOrEqual => BinaryOp::LessOrEqual,
				TokenKind::GreaterOrEqual => BinaryOp::GreaterOrEqual,
				_ => break,
			};
			self.advance();
			let right = self.parse_additive()?;
			left = binary(op, left, right);
		}
		Ok(left)
	}

	fn parse_additive(&mut self) -> MotlResult<Expression> {
		let mut left = self.parse_multiplicative()?;
		loop {
			let op = match self.peek() {
				TokenKind::Plus => BinaryOp::Add,
				TokenKind::Minus => BinaryOp::Subtract,
				_ => break,
			};
			self.advance();
			let right = self.parse_multiplicative()?;
			left = binary(op, left, right);
		}
		Ok(left)
	}

	fn parse_multiplicative(&mut self) -> MotlResult<Expression> {
		let mut left = self.parse_navigation()?;
		loop {
			let op = match self.peek() {
				TokenKind::Star => BinaryOp::Multiply,
				TokenKind::Slash => BinaryOp::Divide,
				_ => break,
			};
			// A trailing `/` closes a self-terminated directive rather than
			// dividing.
			if matches!(self.peek(), TokenKind::Slash)
				&& matches!(self.nth(1), TokenKind::RightBracket)
			{
				break;
			}
			self.advance();
			let right = self.parse_navigation()?;
			left = binary(op, left, right);
		}
		Ok(left)
	}

	fn parse_navigation(&mut self) -> MotlResult<Expression> {
		let mut source = self.parse_primary()?;
		loop {
			if self.eat(&TokenKind::Dot) {
				let property = self.expect_name("property name")?;
				let point = source.point;
				source = Expression::new(
					ExprKind::Navigation {
						source: Box::new(source),
						property,
					},
					point,
				);
			} else if self.eat(&TokenKind::Arrow) {
				let op_point = self.point();
				let op_name = self.expect_name("collection operation")?;
				let Some(op) = CollectionOp::from_name(&op_name) else {
					return Err(MotlError::MalformedExpression(format!(
						"unknown collection operation `{op_name}` at {op_point}"
					)));
				};
				let (iterator, body) = self.parse_collection_arguments(op, op_point)?;
				let point = source.point;
				source = Expression::new(
					ExprKind::CollectionCall {
						source: Box::new(source),
						op,
						iterator,
						body: body.map(Box::new),
					},
					point,
				);
			} else {
				break;
			}
		}
		Ok(source)
	}

	fn parse_collection_arguments(
		&mut self,
		op: CollectionOp,
		op_point: Point,
	) -> MotlResult<(Option<String>, Option<Expression>)> {
		if !op.takes_lambda() {
			// `size`, `isEmpty`, ...: optional empty argument list.
			if self.eat(&TokenKind::LeftParen) {
				if !self.eat(&TokenKind::RightParen) {
					return Err(MotlError::MalformedExpression(format!(
						"`{op}` takes no arguments (at {op_point})"
					)));
				}
			}
			return Ok((None, None));
		}

		self.expect(&TokenKind::LeftParen, &format!("`(` after `->{op}`"))?;

		// `(iterator | body)` or `(body)` with an implicit iterator.
		let iterator = if self.peek().ident_spelling().is_some()
			&& matches!(self.nth(1), TokenKind::Pipe)
		{
			let name = self.expect_name("iterator name")?;
			self.expect(&TokenKind::Pipe, "`|`")?;
			Some(name)
		} else {
			None
		};

		let body = self.parse_expression()?;
		self.expect(&TokenKind::RightParen, "`)`")?;
		Ok((iterator, Some(body)))
	}

	fn parse_primary(&mut self) -> MotlResult<Expression> {
		let point = self.point();
		match self.peek().clone() {
			TokenKind::Boolean(value) => {
				self.advance();
				Ok(Expression::new(ExprKind::Boolean(value), point))
			}
			TokenKind::Integer(value) => {
				self.advance();
				Ok(Expression::new(ExprKind::Integer(value), point))
			}
			TokenKind::Real(value) => {
				self.advance();
				Ok(Expression::new(ExprKind::Real(value), point))
			}
			TokenKind::String(value) => {
				self.advance();
				Ok(Expression::new(ExprKind::String(value), point))
			}
			TokenKind::Identifier(name) => {
				self.advance();
				Ok(Expression::new(ExprKind::Variable(name), point))
			}
			// Reserved spellings act as plain variables in operand position.
			TokenKind::Keyword(keyword) => {
				self.advance();
				Ok(Expression::new(
					ExprKind::Variable(keyword.as_str().to_string()),
					point,
				))
			}
			TokenKind::LeftParen => {
				self.advance();
				let expr = self.parse_expression()?;
				self.expect(&TokenKind::RightParen, "`)`")?;
				Ok(expr)
			}
			other => {
				Err(MotlError::MalformedExpression(format!(
					"expected an expression, found {} at {point}",
					other.describe()
				)))
			}
		}
	}
}

/// Derive the registry alias for a metamodel uri: the segment after the
/// last `/`, then after the last `#`. Falls back to the whole uri.
fn metamodel_alias(uri: &str) -> String {
	let tail = uri.rsplit('/').next().unwrap_or(uri);
	let tail = tail.rsplit('#').next().unwrap_or(tail);
	let alias = tail.trim();
	if alias.is_empty() {
		uri.to_string()
	} else {
		alias.to_string()
	}
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
	let point = left.point;
	Expression::new(
		ExprKind::Binary {
			op,
			left: Box::new(left),
			right: Box::new(right),
		},
		point,
	)
}

/// Keywords that can never begin an invocation; everything else with an
/// identifier spelling can name a macro, template, or query.
fn is_invocation_head(kind: &TokenKind) -> bool {
	match kind {
		TokenKind::Identifier(_) => true,
		TokenKind::Keyword(keyword) => {
			!matches!(
				keyword,
				Keyword::Module
					| Keyword::Template
					| Keyword::Query
					| Keyword::Macro
					| Keyword::If | Keyword::ElseIf
					| Keyword::Else | Keyword::For
					| Keyword::Let | Keyword::File
					| Keyword::Protected
			)
		}
		_ => false,
	}
}

/// Promote a mode expression to a concrete file mode: string literals (and
/// the append boolean shorthand) map to real modes, anything else collapses
/// to overwrite.
fn promote_mode(expr: &Expression) -> FileMode {
	if let Some(value) = expr.as_string_literal() {
		return FileMode::from_name(value).unwrap_or_default();
	}
	match &expr.kind {
		ExprKind::Boolean(true) => FileMode::Append,
		ExprKind::Variable(name) => FileMode::from_name(name).unwrap_or_default(),
		_ => FileMode::Overwrite,
	}
}

/// Split a raw text run into `Text` and `NewLine` statements. The run's
/// newlines become dedicated statements so the interpreter controls
/// indentation at each line start.
fn push_text_statements(statements: &mut Vec<Statement>, text: &str) {
	let multi_lines = text.contains('\n');
	let mut rest = text;

	while let Some(index) = rest.find('\n') {
		if index > 0 {
			statements.push(Statement::Text {
				value: rest[..index].to_string(),
				multi_lines,
				new_line_needed: false,
			});
		}
		statements.push(Statement::NewLine {
			indentation_needed: true,
			multi_lines,
			new_line_needed: false,
		});
		rest = &rest[index + 1..];
	}

	if !rest.is_empty() {
		statements.push(Statement::Text {
			value: rest.to_string(),
			multi_lines,
			new_line_needed: false,
		});
	}
}
