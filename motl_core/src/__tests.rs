use std::sync::Arc;

use rstest::rstest;
use similar_asserts::assert_eq;

use super::__fixtures::*;
use super::*;
use crate::lexer::tokenize;

// ---- lexer ---------------------------------------------------------------

#[test]
fn tokenize_text_only() -> MotlResult<()> {
	let tokens = tokenize("plain text, no directives")?;
	assert_eq!(tokens.len(), 2);
	assert_eq!(
		tokens[0].kind,
		TokenKind::Text("plain text, no directives".to_string())
	);
	assert_eq!(tokens[1].kind, TokenKind::Eof);

	Ok(())
}

#[test]
fn tokenize_switches_between_modes() -> MotlResult<()> {
	let tokens = tokenize("A[x]B")?;
	let kinds: Vec<TokenKind> = tokens.into_iter().map(|token| token.kind).collect();
	assert_eq!(
		kinds,
		vec![
			TokenKind::Text("A".to_string()),
			TokenKind::LeftBracket,
			TokenKind::Identifier("x".to_string()),
			TokenKind::RightBracket,
			TokenKind::Text("B".to_string()),
			TokenKind::Eof,
		]
	);

	Ok(())
}

#[test]
fn tokenize_tracks_positions_across_lines() -> MotlResult<()> {
	let tokens = tokenize("ab\ncd[x]")?;
	// Text spans two lines; the bracket sits on line 2.
	assert_eq!(tokens[0].point, Point::new(1, 1, 0));
	assert_eq!(tokens[1].kind, TokenKind::LeftBracket);
	assert_eq!(tokens[1].point, Point::new(2, 3, 5));
	assert_eq!(tokens[2].point, Point::new(2, 4, 6));

	Ok(())
}

#[rstest]
#[case::keyword("[if]", TokenKind::Keyword(Keyword::If))]
#[case::camel_keyword("[forAll]", TokenKind::Keyword(Keyword::ForAll))]
#[case::identifier("[widget]", TokenKind::Identifier("widget".to_string()))]
#[case::boolean_true("[true]", TokenKind::Boolean(true))]
#[case::boolean_false("[false]", TokenKind::Boolean(false))]
#[case::integer("[42]", TokenKind::Integer(42))]
#[case::real("[3.25]", TokenKind::Real(3.25))]
#[case::string("['hi']", TokenKind::String("hi".to_string()))]
#[case::arrow("[->]", TokenKind::Arrow)]
#[case::not_equals("[<>]", TokenKind::NotEquals)]
#[case::less_or_equal("[<=]", TokenKind::LessOrEqual)]
#[case::greater_or_equal("[>=]", TokenKind::GreaterOrEqual)]
#[case::comment("[-- note]", TokenKind::Comment(" note".to_string()))]
fn tokenize_directive_tokens(#[case] input: &str, #[case] expected: TokenKind) -> MotlResult<()> {
	let tokens = tokenize(input)?;
	assert_eq!(tokens[1].kind, expected);

	Ok(())
}

#[rstest]
#[case::doubled_quote(r"['it''s']", "it's")]
#[case::newline_escape(r"['a\nb']", "a\nb")]
#[case::tab_escape(r"['a\tb']", "a\tb")]
#[case::backslash_escape(r"['a\\b']", "a\\b")]
#[case::quote_escape(r"['a\'b']", "a'b")]
#[case::unknown_escape_is_literal(r"['a\qb']", "aqb")]
fn tokenize_string_escapes(#[case] input: &str, #[case] expected: &str) -> MotlResult<()> {
	let tokens = tokenize(input)?;
	assert_eq!(tokens[1].kind, TokenKind::String(expected.to_string()));

	Ok(())
}

#[test]
fn tokenize_folds_negative_literals_without_preceding_operand() -> MotlResult<()> {
	let tokens = tokenize("[-1]")?;
	assert_eq!(tokens[1].kind, TokenKind::Integer(-1));

	// After an operand the minus is a binary operator, even when adjacent.
	let tokens = tokenize("[x -1]")?;
	assert_eq!(tokens[2].kind, TokenKind::Minus);
	assert_eq!(tokens[3].kind, TokenKind::Integer(1));

	Ok(())
}

#[test]
fn tokenize_dot_needs_a_digit_to_be_a_real() -> MotlResult<()> {
	let tokens = tokenize("[1.x]")?;
	assert_eq!(tokens[1].kind, TokenKind::Integer(1));
	assert_eq!(tokens[2].kind, TokenKind::Dot);
	assert_eq!(tokens[3].kind, TokenKind::Identifier("x".to_string()));

	Ok(())
}

#[test]
fn tokenize_rejects_unexpected_characters() {
	let error = tokenize("[@]").unwrap_err();
	assert!(matches!(error, MotlError::InvalidSyntax { line: 1, column: 2, .. }));
}

#[test]
fn tokenize_rejects_unterminated_strings() {
	let error = tokenize("['oops").unwrap_err();
	assert!(matches!(error, MotlError::InvalidSyntax { .. }));
}

// ---- indentation (property 1) --------------------------------------------

#[rstest]
#[case(0, "  ", "")]
#[case(1, "  ", "  ")]
#[case(3, "\t", "\t\t\t")]
#[case(2, "....", "........")]
fn indentation_renders_unit_times_level(
	#[case] level: usize,
	#[case] unit: &str,
	#[case] expected: &str,
) {
	assert_eq!(Indentation::with_unit(level, unit).as_string(), expected);
}

#[test]
fn indentation_increment_decrement_laws() {
	let two = Indentation::with_unit(2, "  ");
	assert_eq!(two.decrement().increment(), two);

	let zero = Indentation::with_unit(0, "  ");
	assert_eq!(zero.decrement(), zero);
	assert_eq!(zero.decrement().decrement(), zero);
	assert_eq!(zero.increment().level(), 1);
}

// ---- writer (property 2) -------------------------------------------------

#[test]
fn writer_emits_one_indent_per_line() {
	let mut writer = Writer::new();
	writer.set_indentation(Indentation::with_unit(1, "  "));

	writer.write("a", true);
	writer.write("b", true);
	assert_eq!(writer.content(), "  ab");

	writer.write_line("", true);
	writer.write("c", true);
	assert_eq!(writer.content(), "  ab\n  c");
}

#[test]
fn writer_blank_line_keeps_indentation() {
	let mut writer = Writer::new();
	writer.set_indentation(Indentation::with_unit(2, "."));

	writer.write_line("", true);
	assert_eq!(writer.content(), "..\n");
}

#[test]
fn writer_new_line_controls_next_indent() {
	let mut writer = Writer::new();
	writer.set_indentation(Indentation::with_unit(1, "  "));

	writer.write("a", true);
	writer.new_line(false);
	writer.write("b", true);
	assert_eq!(writer.content(), "  a\nb");
}

#[test]
fn writer_skips_indent_when_disabled() {
	let mut writer = Writer::new();
	writer.set_indentation(Indentation::with_unit(1, "  "));

	writer.write("raw", false);
	assert_eq!(writer.content(), "raw");

	writer.clear();
	assert!(writer.is_empty());
	assert!(writer.at_line_start());
}

// ---- scopes (property 3) -------------------------------------------------

#[test]
fn scope_pop_restores_previous_binding() {
	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable("x", Value::from("before"));

	evaluator.push_scope();
	evaluator.set_variable("x", Value::from("inner"));
	assert_eq!(evaluator.get_variable("x"), Some(&Value::from("inner")));
	evaluator.pop_scope();

	assert_eq!(evaluator.get_variable("x"), Some(&Value::from("before")));
}

#[test]
fn scope_pop_restores_not_found() {
	let mut evaluator = ExpressionEvaluator::new();

	evaluator.push_scope();
	evaluator.set_variable("y", Value::from(1i64));
	evaluator.pop_scope();

	assert_eq!(evaluator.get_variable("y"), None);
}

#[test]
fn outer_bindings_stay_visible_in_inner_scopes() {
	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable("outer", Value::from(7i64));

	evaluator.push_scope();
	assert_eq!(evaluator.get_variable("outer"), Some(&Value::from(7i64)));

	let bindings = evaluator.visible_bindings();
	assert!(bindings.iter().any(|(name, _)| name == "outer"));
	evaluator.pop_scope();
}

// ---- expression evaluation -----------------------------------------------

fn eval_str(expr_source: &str) -> MotlResult<Value> {
	eval_with(expr_source, ExpressionEvaluator::new())
}

fn eval_with(expr_source: &str, mut evaluator: ExpressionEvaluator) -> MotlResult<Value> {
	// Wrap the expression in a query so the parser produces it verbatim.
	let source = format!("[module m('u')][query q() : T = {expr_source}/]");
	let module = crate::parse(source)?;
	evaluator.evaluate(&module.queries[0].body)
}

#[rstest]
#[case::add_integers("1 + 2", Value::Integer(3))]
#[case::add_mixed("1 + 0.5", Value::Real(1.5))]
#[case::concat_strings("'a' + 'b'", Value::from("ab"))]
#[case::concat_number("'n=' + 3", Value::from("n=3"))]
#[case::subtract("5 - 2", Value::Integer(3))]
#[case::multiply("4 * 3", Value::Integer(12))]
#[case::integer_division("7 / 2", Value::Integer(3))]
#[case::real_division("7.0 / 2", Value::Real(3.5))]
#[case::precedence("1 + 2 * 3", Value::Integer(7))]
#[case::parens("(1 + 2) * 3", Value::Integer(9))]
#[case::negative_literal("-4 + 1", Value::Integer(-3))]
#[case::compare_less("1 < 2", Value::Boolean(true))]
#[case::compare_cross("2 >= 2.0", Value::Boolean(true))]
#[case::compare_strings("'apple' < 'banana'", Value::Boolean(true))]
#[case::equals("1 = 1", Value::Boolean(true))]
#[case::equals_cross_numeric("1 = 1.0", Value::Boolean(true))]
#[case::equals_mismatched_types("1 = 'one'", Value::Boolean(false))]
#[case::not_equals("1 <> 2", Value::Boolean(true))]
#[case::and_true("true and true", Value::Boolean(true))]
#[case::and_false("true and false", Value::Boolean(false))]
#[case::or_true("false or true", Value::Boolean(true))]
fn evaluate_binary_expressions(
	#[case] source: &str,
	#[case] expected: Value,
) -> MotlResult<()> {
	assert_eq!(eval_str(source)?, expected);

	Ok(())
}

#[test]
fn evaluate_short_circuits_boolean_operators() -> MotlResult<()> {
	// The right side references an unbound variable; short-circuiting means
	// it is never evaluated.
	assert_eq!(eval_str("false and missing")?, Value::Boolean(false));
	assert_eq!(eval_str("true or missing")?, Value::Boolean(true));

	Ok(())
}

#[rstest]
#[case::division_by_zero("1 / 0")]
#[case::boolean_arithmetic("true + 1")]
#[case::and_non_boolean("1 and true")]
#[case::order_mismatched("'a' < 1")]
fn evaluate_type_errors(#[case] source: &str) {
	assert!(matches!(eval_str(source), Err(MotlError::TypeError(_))));
}

#[test]
fn evaluate_unbound_variable_fails() {
	assert!(matches!(
		eval_str("missing"),
		Err(MotlError::VariableNotFound(name)) if name == "missing"
	));
}

#[rstest]
#[case::size("seq->size()", Value::Integer(3))]
#[case::size_without_parens("seq->size", Value::Integer(3))]
#[case::is_empty("seq->isEmpty()", Value::Boolean(false))]
#[case::not_empty("seq->notEmpty()", Value::Boolean(true))]
#[case::first("seq->first()", Value::Integer(1))]
#[case::last("seq->last()", Value::Integer(3))]
#[case::select("seq->select(n | n > 1)", Value::from(vec![2i64, 3]))]
#[case::reject("seq->reject(n | n > 1)", Value::from(vec![1i64]))]
#[case::collect("seq->collect(n | n * 10)", Value::from(vec![10i64, 20, 30]))]
#[case::exists("seq->exists(n | n = 2)", Value::Boolean(true))]
#[case::for_all("seq->forAll(n | n > 0)", Value::Boolean(true))]
#[case::any("seq->any(n | n > 1)", Value::Integer(2))]
#[case::any_none("seq->any(n | n > 9)", Value::Null)]
#[case::implicit_iterator("seq->select(self > 2)", Value::from(vec![3i64]))]
fn evaluate_collection_operations(
	#[case] source: &str,
	#[case] expected: Value,
) -> MotlResult<()> {
	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable("seq", Value::from(vec![1i64, 2, 3]));
	assert_eq!(eval_with(source, evaluator)?, expected);

	Ok(())
}

#[test]
fn evaluate_collection_operations_wrap_scalars_and_null() -> MotlResult<()> {
	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable("one", Value::Integer(5));
	assert_eq!(eval_with("one->size()", evaluator)?, Value::Integer(1));

	assert_eq!(eval_str("''->first()")?, Value::from(""));

	Ok(())
}

#[test]
fn evaluate_collect_flattens_one_level() -> MotlResult<()> {
	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable(
		"nested",
		Value::Collection(vec![Value::from(vec![1i64, 2]), Value::from(vec![3i64])]),
	);
	assert_eq!(
		eval_with("nested->collect(n | n)", evaluator)?,
		Value::from(vec![1i64, 2, 3])
	);

	Ok(())
}

#[rstest]
#[case::explicit_property("self.kind", Value::from("root"))]
#[case::implicit_name("self.name", Value::from("order"))]
#[case::implicit_type("self.type", Value::from("Entity"))]
#[case::children_collection("self.children->size()", Value::Integer(1))]
#[case::child_property("self.children->first().name", Value::from("id"))]
#[case::missing_property("self.unknown", Value::Null)]
fn evaluate_navigation_on_model_objects(
	#[case] source: &str,
	#[case] expected: Value,
) -> MotlResult<()> {
	let resource = ModelResource::from_json_str(
		r#"{"type": "Entity", "name": "order", "kind": "root",
			"children": [{"type": "Field", "name": "id"}]}"#,
	)?;

	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable("self", Value::Object(resource.roots[0].clone()));
	assert_eq!(eval_with(source, evaluator)?, expected);

	Ok(())
}

#[test]
fn evaluate_navigation_propagates_null_and_rejects_scalars() {
	let mut evaluator = ExpressionEvaluator::new();
	evaluator.set_variable("nothing", Value::Null);
	assert_eq!(
		eval_with("nothing.name", evaluator).unwrap(),
		Value::Null
	);

	assert!(matches!(
		eval_str("1.name"),
		Err(MotlError::TypeError(_))
	));
}

#[test]
fn evaluate_rejects_unknown_collection_operations() {
	let source = "[module m('u')][query q() : T = seq->frobnicate(n | n)/]";
	assert!(matches!(
		crate::parse(source),
		Err(MotlError::MalformedExpression(_))
	));
}

// ---- values ---------------------------------------------------------------

#[rstest]
#[case::null(Value::Null, "")]
#[case::boolean(Value::Boolean(true), "true")]
#[case::integer(Value::Integer(-7), "-7")]
#[case::real(Value::Real(2.5), "2.5")]
#[case::integral_real(Value::Real(2.0), "2.0")]
#[case::string(Value::from("text"), "text")]
#[case::collection(Value::from(vec![1i64, 2]), "[1, 2]")]
fn value_canonical_strings(#[case] value: Value, #[case] expected: &str) {
	assert_eq!(value.canonical_string(), expected);
}

#[test]
fn value_sequences() {
	assert_eq!(Value::Null.into_sequence(), vec![]);
	assert_eq!(Value::Integer(1).into_sequence(), vec![Value::Integer(1)]);
	assert_eq!(
		Value::from(vec![1i64, 2]).into_sequence(),
		vec![Value::Integer(1), Value::Integer(2)]
	);
}

// ---- model loading --------------------------------------------------------

#[test]
fn model_resource_accepts_object_or_array_roots() -> MotlResult<()> {
	let single = ModelResource::from_json_str(r#"{"type": "A", "name": "one"}"#)?;
	assert_eq!(single.roots.len(), 1);
	assert_eq!(single.roots[0].identity(), "A#one");

	let several = ModelResource::from_json_str(r#"[{"type": "A"}, {"type": "B"}]"#)?;
	assert_eq!(several.roots.len(), 2);
	assert_eq!(several.roots[1].identity(), "B");

	let error = ModelResource::from_json_str("42");
	assert!(matches!(error, Err(MotlError::TypeError(_))));

	Ok(())
}

#[test]
fn model_explicit_properties_shadow_implicit_ones() -> MotlResult<()> {
	let resource = ModelResource::from_json_str(
		r#"{"type": "A", "name": "n", "properties": {"name": "explicit"}}"#,
	)?;
	let root = &resource.roots[0];

	let Some(PropertyValue::Json(value)) = root.property("name") else {
		panic!("expected a json property");
	};
	assert_eq!(value, serde_json::Value::String("explicit".to_string()));

	Ok(())
}

// ---- parser ---------------------------------------------------------------

#[test]
fn parse_module_header_and_metadata() -> MotlResult<()> {
	let module = crate::parse(
		"[-- Order generator]\n[module orders('http://example.org/shop#shop', 'demo')]\n\
		 [extends base.common/]\n[import util.strings/]\n[template t()]x[/template]",
	)?;

	assert_eq!(module.name, "orders");
	assert_eq!(module.documentation.as_deref(), Some("Order generator"));
	assert_eq!(module.metamodels.get("shop").map(String::as_str), Some("http://example.org/shop#shop"));
	assert_eq!(module.metamodels.get("demo").map(String::as_str), Some("demo"));
	assert_eq!(module.extends.as_deref(), Some("base.common"));
	assert_eq!(module.imports, vec!["util.strings".to_string()]);
	assert_eq!(module.encoding, DEFAULT_ENCODING);

	Ok(())
}

#[test]
fn parse_template_signature_flags() -> MotlResult<()> {
	let module = crate::parse(
		"[module m('u')][template private main render(e : Entity, depth : Integer) \
		 overrides base guard (depth < 3) post (true)]x[/template]",
	)?;

	let template = &module.templates[0];
	assert_eq!(template.name, "render");
	assert_eq!(template.visibility, Visibility::Private);
	assert!(template.is_main);
	assert_eq!(template.overrides.as_deref(), Some("base"));
	assert!(template.guard.is_some());
	assert!(template.post_condition.is_some());
	assert_eq!(
		template.parameters,
		vec![
			Parameter::new("e", "Entity"),
			Parameter::new("depth", "Integer"),
		]
	);

	Ok(())
}

#[test]
fn parse_accepts_keyword_spellings_as_names() -> MotlResult<()> {
	// `public` as a template name, `size` as a query name, `select` as a
	// parameter name.
	let module = crate::parse(
		"[module m('u')][template public(select : String)]x[/template]\
		 [query size(x : Integer) : Integer = x/]",
	)?;

	assert_eq!(module.templates[0].name, "public");
	assert_eq!(module.templates[0].parameters[0].name, "select");
	assert_eq!(module.queries[0].name, "size");

	Ok(())
}

#[test]
fn parse_duplicate_declarations_fail() {
	let error = crate::parse(
		"[module m('u')][template t()]a[/template][template t()]b[/template]",
	)
	.unwrap_err();
	assert!(matches!(
		error,
		MotlError::DuplicateName { kind, name } if kind == "template" && name == "t"
	));

	let error =
		crate::parse("[module m('u')][template t(a : T, a : T)]x[/template]").unwrap_err();
	assert!(matches!(error, MotlError::InvalidSyntax { .. }));
}

#[test]
fn parse_macro_with_body_parameter() -> MotlResult<()> {
	let module = crate::parse(
		"[module m('u')][macro wrap(tag : String | content)]x[/macro]",
	)?;

	let r#macro = &module.macros[0];
	assert_eq!(r#macro.name, "wrap");
	assert_eq!(r#macro.parameters, vec![Parameter::new("tag", "String")]);
	assert_eq!(r#macro.body_parameter.as_deref(), Some("content"));

	// A body parameter colliding with a regular parameter is rejected.
	let error = crate::parse("[module m('u')][macro m(a : T | a)]x[/macro]").unwrap_err();
	assert!(matches!(error, MotlError::InvalidSyntax { .. }));

	Ok(())
}

#[rstest]
#[case::explicit_overwrite("'overwrite'", FileMode::Overwrite)]
#[case::append_literal("'append'", FileMode::Append)]
#[case::create_literal("'create'", FileMode::Create)]
#[case::append_boolean("true", FileMode::Append)]
#[case::append_keyword("append", FileMode::Append)]
#[case::unknown_collapses("someVariable", FileMode::Overwrite)]
fn parse_promotes_file_modes(#[case] mode: &str, #[case] expected: FileMode) -> MotlResult<()> {
	let source = wrap(&format!("[template t()][file ('o.txt', {mode})]x[/file][/template]"));
	let module = crate::parse(source)?;

	let Statement::File { mode, .. } = &module.templates[0].body.statements[0] else {
		panic!("expected a file statement");
	};
	assert_eq!(*mode, expected);

	Ok(())
}

#[test]
fn parse_statement_shapes() -> MotlResult<()> {
	let module = crate::parse(wrap(
		"[template t()][-- note][if (true)]a[elseif (false)]b[else]c[/if]\
		 [for (x : Thing in xs) separator (', ')][x/][/for]\
		 [let a = 1, b : Integer = a + 1][b/][/let]\
		 [protected ('id', '//')]d[/protected]\
		 [trace (self)]e[/trace]\
		 [helper(1, 'two')/][boxed()]f[/boxed][/template]",
	))?;

	let statements = &module.templates[0].body.statements;
	assert!(matches!(&statements[0], Statement::Comment { value } if value == " note"));
	assert!(matches!(
		&statements[1],
		Statement::If { else_if_clauses, else_block: Some(_), .. } if else_if_clauses.len() == 1
	));
	assert!(matches!(
		&statements[2],
		Statement::For { variable, type_name: Some(t), separator: Some(_), .. }
			if variable == "x" && t == "Thing"
	));
	assert!(matches!(
		&statements[3],
		Statement::Let { bindings, .. } if bindings.len() == 2
	));
	assert!(matches!(
		&statements[4],
		Statement::ProtectedArea { start_prefix: Some(_), end_prefix: None, .. }
	));
	assert!(matches!(&statements[5], Statement::Trace { .. }));
	assert!(matches!(
		&statements[6],
		Statement::MacroInvocation { name, arguments, body: None }
			if name == "helper" && arguments.len() == 2
	));
	assert!(matches!(
		&statements[7],
		Statement::MacroInvocation { name, body: Some(_), .. } if name == "boxed"
	));

	Ok(())
}

#[rstest]
#[case::unclosed_template("[module m('u')][template t()]")]
#[case::missing_bracket("[module m('u')][template t()")]
#[case::mismatched_close("[module m('u')][template t()][box()]x[/other][/template]")]
#[case::missing_module_header("[template t()]x[/template]")]
#[case::bad_signature("[module m('u')][template t(]x[/template]")]
fn parse_errors_are_invalid_syntax(#[case] source: &str) {
	assert!(matches!(
		crate::parse(source),
		Err(MotlError::InvalidSyntax { .. })
	));
}

#[test]
fn parse_unknown_top_level_directive() {
	assert!(matches!(
		crate::parse("[module m('u')][frobnicate]"),
		Err(MotlError::UnknownStatementType(name)) if name == "frobnicate"
	));
}

// ---- printer (property 6) -------------------------------------------------

#[rstest]
#[case::hello("[module m('u')][template t()]Hello[/template]")]
#[case::signature(
	"[module m('u')][template private main t(a : Entity) overrides base guard (a.size > 1) \
	 post (true)]x[/template]"
)]
#[case::query("[module m('u')][query q(a : Integer) : String = 'n=' + a/]")]
#[case::macro_body("[module m('u')][macro wrap(tag : String | content)]<[tag/]>[content/][/macro]")]
#[case::control_flow(
	"[module m('u')][template t()][if (a)]x[elseif (b)]y[else]z[/if][for (i : Integer in xs) \
	 separator (', ')][i/][/for][/template]"
)]
#[case::let_file(
	"[module m('u')][template t()][let a = 1, b : Integer = 2][file ('o.txt', 'append', \
	 'UTF-8')][a/][b/][/file][/let][/template]"
)]
#[case::protected_trace(
	"[module m('u')][template t()][protected ('k', '//', '//')]d[/protected][trace \
	 (self)]x[/trace][/template]"
)]
#[case::invocations("[module m('u')][template t()][box(1, 'a')/][wrap('b')]body[/wrap][/template]")]
#[case::metadata("[-- docs][module m('http://x/y#z')][extends p.q/][import a.b/][template t()]x[/template]")]
#[case::expressions(
	"[module m('u')][query q() : T = (a + b * c - d / e <= f) and (g or h = i) or \
	 xs->select(n | n.name <> 'x')->size() > -2/]"
)]
#[case::multi_line_text("[module m('u')][template t()]line one\nline two\n[/template]")]
#[case::string_escapes("[module m('u')][template t()][let s = 'it''s\\n\\ttext'][s/][/let][/template]")]
fn printed_modules_reparse_equal(#[case] source: &str) -> MotlResult<()> {
	let first = crate::parse(source)?;
	let printed = print_module(&first);
	let second = crate::parse(&printed)
		.unwrap_or_else(|error| panic!("printed module must reparse: {error}\n{printed}"));
	assert_eq!(first, second);

	Ok(())
}

// ---- protected areas (property 5) -----------------------------------------

#[test]
fn protected_scan_round_trip() {
	let manager = ProtectedAreaManager::new();
	let content = "\
		// START PROTECTED REGION alpha\n\
		first body\n\
		// END PROTECTED REGION alpha\n\
		between\n\
		# START PROTECTED REGION beta\n\
		line one\n\
		line two\n\
		# END PROTECTED REGION beta\n";

	manager.scan_content(content);

	assert_eq!(manager.content("alpha").as_deref(), Some("first body"));
	assert_eq!(
		manager.content("beta").as_deref(),
		Some("line one\nline two")
	);
	assert_eq!(manager.len(), 2);

	let alpha = manager.get("alpha").unwrap();
	assert_eq!(alpha.start_line, "// START PROTECTED REGION alpha");
	assert_eq!(alpha.end_line, "// END PROTECTED REGION alpha");
}

#[test]
fn protected_scan_ignores_orphan_and_mismatched_ends() {
	let manager = ProtectedAreaManager::new();

	// An orphan end marker scans as nothing.
	manager.scan_content("// END PROTECTED REGION ghost\n");
	assert!(manager.is_empty());

	// A mismatched end marker stays inside the open region's content.
	manager.scan_content(
		"// START PROTECTED REGION a\nkeep\n// END PROTECTED REGION b\n// END PROTECTED REGION a\n",
	);
	assert_eq!(
		manager.content("a").as_deref(),
		Some("keep\n// END PROTECTED REGION b")
	);
	assert!(manager.content("b").is_none());
}

#[test]
fn protected_scan_abandons_unclosed_region_on_new_start() {
	let manager = ProtectedAreaManager::new();
	manager.scan_content(
		"// START PROTECTED REGION a\nlost\n// START PROTECTED REGION b\nkept\n\
		 // END PROTECTED REGION b\n",
	);

	assert!(manager.content("a").is_none());
	assert_eq!(manager.content("b").as_deref(), Some("kept"));
}

#[rstest]
#[case::with_prefix(Some("//"), "// START PROTECTED REGION id", "// END PROTECTED REGION id")]
#[case::without_prefix(None, "START PROTECTED REGION id", "END PROTECTED REGION id")]
#[case::empty_prefix(Some(""), "START PROTECTED REGION id", "END PROTECTED REGION id")]
fn protected_marker_composition(
	#[case] prefix: Option<&str>,
	#[case] start: &str,
	#[case] end: &str,
) {
	assert_eq!(
		generate_markers("id", prefix),
		(start.to_string(), end.to_string())
	);
}

#[test]
fn protected_set_remove_clear() {
	let manager = ProtectedAreaManager::new();
	manager.set("one", "body", None);

	let region = manager.get("one").unwrap();
	assert_eq!(region.start_line, "START PROTECTED REGION one");

	assert!(manager.remove("one").is_some());
	assert!(manager.is_empty());

	manager.set("two", "x", Some(("s".to_string(), "e".to_string())));
	assert_eq!(manager.all().len(), 1);
	manager.clear();
	assert!(manager.is_empty());
}

#[test]
fn protected_scan_file_tolerates_missing_paths() -> MotlResult<()> {
	let manager = ProtectedAreaManager::new();
	manager.scan_file("/nonexistent/definitely/missing.txt")?;
	assert!(manager.is_empty());

	Ok(())
}

#[test]
fn protected_scan_file_reads_real_files() -> MotlResult<()> {
	let tmp = tempfile::tempdir()?;
	let path = tmp.path().join("existing.txt");
	std::fs::write(
		&path,
		"// START PROTECTED REGION x\nkeep\n// END PROTECTED REGION x\n",
	)?;

	let manager = ProtectedAreaManager::new();
	manager.scan_file(&path)?;
	assert_eq!(manager.content("x").as_deref(), Some("keep"));

	Ok(())
}

// ---- file-system strategy -------------------------------------------------

#[test]
fn file_system_strategy_commits_through_nested_directories() -> MotlResult<()> {
	let tmp = tempfile::tempdir()?;
	let strategy = FileSystemStrategy::new(tmp.path());

	let mut writer = strategy.create_writer(
		"nested/dir/out.txt",
		FileMode::Overwrite,
		"UTF-8",
		Indentation::default(),
	)?;
	writer.write("content", true);
	strategy.finalize_writer("nested/dir/out.txt", writer, "UTF-8")?;

	let on_disk = std::fs::read_to_string(tmp.path().join("nested/dir/out.txt"))?;
	assert_eq!(on_disk, "content");
	assert_eq!(
		strategy.existing_content("nested/dir/out.txt")?,
		Some("content".to_string())
	);

	// `create` refuses an existing target.
	assert!(matches!(
		strategy.create_writer(
			"nested/dir/out.txt",
			FileMode::Create,
			"UTF-8",
			Indentation::default(),
		),
		Err(MotlError::FileError(_))
	));

	Ok(())
}

#[test]
fn file_system_strategy_rejects_escaping_urls() -> MotlResult<()> {
	let tmp = tempfile::tempdir()?;
	let strategy = FileSystemStrategy::new(tmp.path());

	assert!(matches!(
		strategy.existing_content("../escape.txt"),
		Err(MotlError::FileError(_))
	));
	assert!(matches!(
		strategy.existing_content("/absolute.txt"),
		Err(MotlError::FileError(_))
	));

	Ok(())
}

// ---- interpreter: concrete scenarios --------------------------------------

#[test]
fn scenario_hello() {
	let (result, _) = run("[module M('u')][template t()]Hello[/template]");
	assert_eq!(result.stdout, "Hello");
	assert_eq!(result.statistics.templates_executed, 1);
	assert!(result.statistics.successful);
}

#[test]
fn scenario_if_else() {
	let (result, _) = run("[module M('u')][template t()][if (true)]A[else]B[/if][/template]");
	assert_eq!(result.stdout, "A");

	let (result, _) = run("[module M('u')][template t()][if (false)]A[else]B[/if][/template]");
	assert_eq!(result.stdout, "B");

	let (result, _) = run(
		"[module M('u')][template t()][if (false)]A[elseif (true)]B[else]C[/if][/template]",
	);
	assert_eq!(result.stdout, "B");
}

#[rstest]
#[case::three(vec!["A", "B", "C"], "A, B, C")]
#[case::one(vec!["A"], "A")]
#[case::empty(vec![], "")]
fn scenario_for_separator(#[case] items: Vec<&str>, #[case] expected: &str) -> MotlResult<()> {
	let options = GenerateOptions::new().with_global("seq", Value::from(items));
	let (result, _) = run_with(
		"[module M('u')][template t()][for (x in seq) separator(', ')][x/][/for][/template]",
		options,
	)?;
	assert_eq!(result.stdout, expected);

	Ok(())
}

#[test]
fn scenario_let_restores_outer_binding() -> MotlResult<()> {
	let options = GenerateOptions::new().with_global("x", Value::from("Outer"));
	let (result, _) = run_with(
		"[module M('u')][template t()][let x = 'Hi'][x/][/let][x/][/template]",
		options,
	)?;
	assert_eq!(result.stdout, "HiOuter");

	Ok(())
}

#[test]
fn scenario_protected_area_preserves_user_content() -> MotlResult<()> {
	let options = GenerateOptions::new();
	options.protected.scan_content(
		"// START PROTECTED REGION k\nuser-kept\n// END PROTECTED REGION k\n",
	);

	let (result, _) = run_with(
		"[module M('u')][template t()][protected ('k', '//', '//')]DEFAULT[/protected][/template]",
		options,
	)?;

	assert_eq!(
		result.stdout,
		"// START PROTECTED REGION k\nuser-kept\n// END PROTECTED REGION k\n"
	);
	assert!(!result.stdout.contains("DEFAULT"));
	assert_eq!(result.statistics.protected_areas_restored, 1);

	Ok(())
}

#[test]
fn scenario_protected_area_default_body() {
	let (result, _) = run(
		"[module M('u')][template t()][protected ('k', '//', '//')]DEFAULT[/protected][/template]",
	);
	assert_eq!(
		result.stdout,
		"// START PROTECTED REGION k\nDEFAULT\n// END PROTECTED REGION k\n"
	);
	assert_eq!(result.statistics.protected_areas_restored, 0);
}

#[test]
fn scenario_file_block_writes_through_strategy() {
	let (result, strategy) =
		run("[module M('u')][template t()][file ('o.txt')]X[/file][/template]");

	assert_eq!(result.stdout, "");
	assert_eq!(strategy.content_of("o.txt").as_deref(), Some("X"));
	assert_eq!(result.statistics.files_generated, 1);
}

// ---- interpreter: templates, queries, macros ------------------------------

#[test]
fn guard_failure_is_silent() -> MotlResult<()> {
	let (result, _) = run_with(
		"[module M('u')][template t()][u('no')/][/template]\
		 [template u(s : String) guard (s = 'go')]YES[/template]",
		GenerateOptions::new(),
	)?;

	assert_eq!(result.stdout, "");
	// Only the outer template counts as executed.
	assert_eq!(result.statistics.templates_executed, 1);

	Ok(())
}

#[test]
fn post_condition_failure_raises() {
	let error = run_with(
		"[module M('u')][template t() post (false)]x[/template]",
		GenerateOptions::new(),
	)
	.unwrap_err();
	assert!(matches!(
		error,
		MotlError::PostConditionFailed(name) if name == "t"
	));
}

#[test]
fn template_invokes_template_with_arguments() -> MotlResult<()> {
	let (result, _) = run_with(
		"[module M('u')][template t()][greet('world')/][/template]\
		 [template greet(who : String)]Hello [who/]![/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "Hello world!");
	assert_eq!(result.statistics.templates_executed, 2);

	Ok(())
}

#[test]
fn query_invocation_writes_result() -> MotlResult<()> {
	let (result, _) = run_with(
		"[module M('u')][query double(n : Integer) : Integer = n * 2/]\
		 [template t()][double(21)/][/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "42");

	Ok(())
}

#[test]
fn macro_body_parameter_executes_at_reference() -> MotlResult<()> {
	let (result, _) = run_with(
		"[module M('u')][macro wrap(tag : String | body)]<[tag/]>[body/]</[tag/]>[/macro]\
		 [template t()][wrap('b')]Hi[/wrap][/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "<b>Hi</b>");

	Ok(())
}

#[test]
fn macro_body_sees_invocation_site_bindings() -> MotlResult<()> {
	// The macro binds its own `x`; the captured body must still see the
	// caller's `x`.
	let (result, _) = run_with(
		"[module M('u')][macro m(x : String | body)][body/][/macro]\
		 [template t()][let x = 'caller'][m('macro-arg')][x/][/m][/let][/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "caller");

	Ok(())
}

#[rstest]
#[case::unknown("[module M('u')][template t()][nothere()/][/template]")]
fn unknown_invocation_fails(#[case] source: &str) {
	let error = run_with(source, GenerateOptions::new()).unwrap_err();
	assert!(matches!(error, MotlError::MacroNotFound(name) if name == "nothere"));
}

#[rstest]
#[case::template_arity("[module M('u')][template t()][u(1)/][/template][template u()]x[/template]")]
#[case::macro_missing_body(
	"[module M('u')][macro m(| b)]x[/macro][template t()][m()/][/template]"
)]
#[case::macro_unexpected_body(
	"[module M('u')][macro m()]x[/macro][template t()][m()]y[/m][/template]"
)]
#[case::template_with_body(
	"[module M('u')][template u()]x[/template][template t()][u()]y[/u][/template]"
)]
fn invocation_shape_errors(#[case] source: &str) {
	let error = run_with(source, GenerateOptions::new()).unwrap_err();
	assert!(matches!(error, MotlError::InvalidOperation(_)));
}

#[test]
fn keyword_named_query_is_invocable() -> MotlResult<()> {
	let (result, _) = run_with(
		"[module M('u')][query size(x : Integer) : Integer = x/]\
		 [template t()][size(3)/][/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "3");

	Ok(())
}

// ---- interpreter: files, models, traces -----------------------------------

#[test]
fn file_append_preloads_existing_content() -> MotlResult<()> {
	let strategy = Arc::new(InMemoryStrategy::new());
	strategy.seed("log.txt", "pre|");

	run_against(
		"[module M('u')][template t()][file ('log.txt', 'append')]post[/file][/template]",
		GenerateOptions::new(),
		strategy.clone(),
	)?;

	assert_eq!(strategy.content_of("log.txt").as_deref(), Some("pre|post"));

	Ok(())
}

#[test]
fn file_create_fails_when_target_exists() {
	let strategy = Arc::new(InMemoryStrategy::new());
	strategy.seed("once.txt", "already");

	let error = run_against(
		"[module M('u')][template t()][file ('once.txt', 'create')]x[/file][/template]",
		GenerateOptions::new(),
		strategy,
	)
	.unwrap_err();
	assert!(matches!(error, MotlError::FileError(_)));
}

#[test]
fn file_url_must_be_a_string() {
	let error = run_with(
		"[module M('u')][template t()][file (42)]x[/file][/template]",
		GenerateOptions::new(),
	)
	.unwrap_err();
	assert!(matches!(error, MotlError::TypeError(_)));
}

#[test]
fn nested_file_blocks_write_independently() -> MotlResult<()> {
	let (result, strategy) = run_with(
		"[module M('u')][template t()]out[file ('a.txt')]A[file ('b.txt')]B[/file]A2[/file]out2[/template]",
		GenerateOptions::new(),
	)?;

	assert_eq!(result.stdout, "outout2");
	assert_eq!(strategy.content_of("a.txt").as_deref(), Some("AA2"));
	assert_eq!(strategy.content_of("b.txt").as_deref(), Some("B"));
	assert_eq!(result.statistics.files_generated, 2);

	Ok(())
}

#[test]
fn regeneration_preserves_protected_regions_in_files() -> MotlResult<()> {
	let strategy = Arc::new(InMemoryStrategy::new());
	strategy.seed(
		"out.txt",
		"// START PROTECTED REGION k\nedited by hand\n// END PROTECTED REGION k\n",
	);

	run_against(
		"[module M('u')][template t()][file ('out.txt')][protected ('k', '//', \
		 '//')]DEFAULT[/protected][/file][/template]",
		GenerateOptions::new(),
		strategy.clone(),
	)?;

	assert_eq!(
		strategy.content_of("out.txt").as_deref(),
		Some("// START PROTECTED REGION k\nedited by hand\n// END PROTECTED REGION k\n")
	);

	Ok(())
}

#[test]
fn duplicate_protected_ids_conflict() {
	let error = run_with(
		"[module M('u')][template t()][protected ('k')]a[/protected][protected \
		 ('k')]b[/protected][/template]",
		GenerateOptions::new(),
	)
	.unwrap_err();
	assert!(matches!(error, MotlError::ProtectedAreaConflict(_)));
}

#[test]
fn model_registration_binds_alias_and_self() -> MotlResult<()> {
	let resource = ModelResource::from_json_str(
		r#"{"type": "Entity", "name": "order",
			"children": [{"type": "Field", "name": "id"}, {"type": "Field", "name": "total"}]}"#,
	)?;
	let options = GenerateOptions::new().with_model("shop", resource);

	let (result, _) = run_with(
		"[module M('shop')][template t()][self.name/]: [for (f in self.children) separator \
		 (', ')][f.name/][/for][/template]",
		options,
	)?;
	assert_eq!(result.stdout, "order: id, total");

	Ok(())
}

#[test]
fn trace_records_source_and_placeholder_target() -> MotlResult<()> {
	let resource = ModelResource::from_json_str(r#"{"type": "Entity", "name": "order"}"#)?;
	let options = GenerateOptions::new().with_model("m", resource);

	let (result, _) = run_with(
		"[module M('u')][template t()][trace (self)]traced[/trace][/template]",
		options,
	)?;

	assert_eq!(result.stdout, "traced");
	assert_eq!(
		result.traces,
		vec![TraceLink {
			source: "Entity#order".to_string(),
			target: DEFAULT_TRACE_TARGET.to_string(),
		}]
	);

	Ok(())
}

// ---- interpreter: run control ---------------------------------------------

#[test]
fn main_template_auto_detection() -> MotlResult<()> {
	// `main` wins over declaration order.
	let (result, _) = run_with(
		"[module M('u')][template a()]first[/template][template main b()]chosen[/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "chosen");

	// Without a main flag the first template runs.
	let (result, _) = run_with(
		"[module M('u')][template a()]first[/template][template b()]second[/template]",
		GenerateOptions::new(),
	)?;
	assert_eq!(result.stdout, "first");

	// Explicit selection overrides both.
	let (result, _) = run_with(
		"[module M('u')][template a()]first[/template][template b()]second[/template]",
		GenerateOptions::new().with_main_template("b"),
	)?;
	assert_eq!(result.stdout, "second");

	Ok(())
}

#[test]
fn missing_main_template_fails() {
	let error = run_with(
		"[module M('u')][template a()]x[/template]",
		GenerateOptions::new().with_main_template("nope"),
	)
	.unwrap_err();
	assert!(matches!(error, MotlError::TemplateNotFound(name) if name == "nope"));

	let error = run_with("[module M('u')]", GenerateOptions::new()).unwrap_err();
	assert!(matches!(error, MotlError::InvalidOperation(_)));
}

#[test]
fn main_template_arguments_bind_parameters() -> MotlResult<()> {
	let options = GenerateOptions::new().with_argument("world");
	let (result, _) = run_with(
		"[module M('u')][template t(who : String)]Hello [who/][/template]",
		options,
	)?;
	assert_eq!(result.stdout, "Hello world");

	Ok(())
}

#[test]
fn cancellation_surfaces_cancelled_error() {
	let options = GenerateOptions::new();
	options.cancellation.cancel();

	let error = run_with(
		"[module M('u')][template t()]never[/template]",
		options,
	)
	.unwrap_err();
	assert!(matches!(error, MotlError::Cancelled));
}

#[test]
fn failed_runs_record_statistics() -> MotlResult<()> {
	let module = Arc::new(module("[module M('u')][template t()][missing/][/template]"));
	let strategy: Arc<dyn OutputStrategy> = Arc::new(InMemoryStrategy::new());

	let mut interpreter = Interpreter::new(module, GenerateOptions::new(), strategy);
	let error = interpreter.run().unwrap_err();
	assert!(matches!(error, MotlError::VariableNotFound(_)));

	let statistics = interpreter.statistics();
	assert!(!statistics.successful);
	assert!(statistics.last_error.as_deref().unwrap_or("").contains("missing"));

	Ok(())
}

#[test]
fn multi_line_templates_write_text_verbatim() {
	let (result, _) = run("[module M('u')][template t()]a\nb\n[/template]");
	assert_eq!(result.stdout, "a\nb\n");
}

#[test]
fn programmatic_blocks_indent_their_statements() -> MotlResult<()> {
	// Blocks built through the API (not the parser) push an indentation
	// level around their statements.
	let mut module = Module::new("m");
	module.add_template(Template {
		name: "t".to_string(),
		visibility: Visibility::Public,
		parameters: vec![],
		guard: None,
		post_condition: None,
		body: Block::new(vec![Statement::Text {
			value: "X".to_string(),
			multi_lines: false,
			new_line_needed: false,
		}]),
		is_main: true,
		overrides: None,
		documentation: None,
	})?;

	let strategy: Arc<dyn OutputStrategy> = Arc::new(InMemoryStrategy::new());
	let result = crate::generate(Arc::new(module), GenerateOptions::new(), strategy)?;
	assert_eq!(result.stdout, format!("{DEFAULT_INDENT_UNIT}X"));

	Ok(())
}

#[test]
fn module_ast_serializes_to_json() -> MotlResult<()> {
	let module = module("[module M('u')][template t(a : T)]x[a/][/template]");
	let json = serde_json::to_value(&module).expect("module serializes");
	assert_eq!(json["name"], "M");
	assert!(json["templates"].as_array().is_some_and(|t| t.len() == 1));

	Ok(())
}
