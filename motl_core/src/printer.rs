use std::fmt::Write as _;

use crate::ast::Block;
use crate::ast::FileMode;
use crate::ast::Macro;
use crate::ast::Module;
use crate::ast::Parameter;
use crate::ast::Query;
use crate::ast::Statement;
use crate::ast::Template;
use crate::ast::Visibility;

/// Serialise a module back to template source.
///
/// The printer is the inverse of the parser up to insignificant whitespace:
/// a parsed module printed and re-parsed yields an equal AST. Free text
/// between top-level declarations is not part of the module and is printed
/// as single newlines.
pub fn print_module(module: &Module) -> String {
	let mut out = String::new();

	if let Some(documentation) = &module.documentation {
		print_documentation(&mut out, documentation);
	}

	let _ = write!(out, "[module {}(", module.name);
	for (index, uri) in module.metamodels.values().enumerate() {
		if index > 0 {
			out.push_str(", ");
		}
		print_string_literal(&mut out, uri);
	}
	out.push_str(")]\n");

	if let Some(parent) = &module.extends {
		let _ = writeln!(out, "[extends {parent}/]");
	}
	for import in &module.imports {
		let _ = writeln!(out, "[import {import}/]");
	}

	for query in &module.queries {
		out.push('\n');
		print_query(&mut out, query);
	}
	for r#macro in &module.macros {
		out.push('\n');
		print_macro(&mut out, r#macro);
	}
	for template in &module.templates {
		out.push('\n');
		print_template(&mut out, template);
	}

	out
}

fn print_documentation(out: &mut String, documentation: &str) {
	for line in documentation.lines() {
		let _ = writeln!(out, "[-- {line}]");
	}
}

fn print_string_literal(out: &mut String, value: &str) {
	out.push('\'');
	for ch in value.chars() {
		match ch {
			'\'' => out.push_str("''"),
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\t' => out.push_str("\\t"),
			'\r' => out.push_str("\\r"),
			other => out.push(other),
		}
	}
	out.push('\'');
}

fn print_parameters(out: &mut String, parameters: &[Parameter]) {
	for (index, parameter) in parameters.iter().enumerate() {
		if index > 0 {
			out.push_str(", ");
		}
		let _ = write!(out, "{} : {}", parameter.name, parameter.type_name);
	}
}

fn print_visibility(out: &mut String, visibility: Visibility) {
	let _ = write!(out, "{visibility} ");
}

fn print_template(out: &mut String, template: &Template) {
	if let Some(documentation) = &template.documentation {
		print_documentation(out, documentation);
	}
	out.push_str("[template ");
	print_visibility(out, template.visibility);
	if template.is_main {
		out.push_str("main ");
	}
	let _ = write!(out, "{}(", template.name);
	print_parameters(out, &template.parameters);
	out.push(')');
	if let Some(overridden) = &template.overrides {
		let _ = write!(out, " overrides {overridden}");
	}
	if let Some(guard) = &template.guard {
		let _ = write!(out, " guard ({guard})");
	}
	if let Some(post_condition) = &template.post_condition {
		let _ = write!(out, " post ({post_condition})");
	}
	out.push(']');
	print_block(out, &template.body);
	out.push_str("[/template]\n");
}

fn print_query(out: &mut String, query: &Query) {
	if let Some(documentation) = &query.documentation {
		print_documentation(out, documentation);
	}
	out.push_str("[query ");
	print_visibility(out, query.visibility);
	let _ = write!(out, "{}(", query.name);
	print_parameters(out, &query.parameters);
	let _ = write!(out, ") : {} = {}/]\n", query.return_type, query.body);
}

fn print_macro(out: &mut String, r#macro: &Macro) {
	if let Some(documentation) = &r#macro.documentation {
		print_documentation(out, documentation);
	}
	let _ = write!(out, "[macro {}(", r#macro.name);
	print_parameters(out, &r#macro.parameters);
	if let Some(body_parameter) = &r#macro.body_parameter {
		if !r#macro.parameters.is_empty() {
			out.push(' ');
		}
		let _ = write!(out, "| {body_parameter}");
	}
	out.push_str(")]");
	print_block(out, &r#macro.body);
	out.push_str("[/macro]\n");
}

fn print_block(out: &mut String, block: &Block) {
	for statement in &block.statements {
		print_statement(out, statement);
	}
}

fn print_statement(out: &mut String, statement: &Statement) {
	match statement {
		Statement::Text { value, .. } => out.push_str(value),
		Statement::NewLine { .. } => out.push('\n'),
		Statement::Expression { expr, .. } => {
			let _ = write!(out, "[{expr}/]");
		}
		Statement::Comment { value } => {
			let _ = write!(out, "[--{value}]");
		}
		Statement::If {
			condition,
			then_block,
			else_if_clauses,
			else_block,
		} => {
			let _ = write!(out, "[if ({condition})]");
			print_block(out, then_block);
			for (clause_condition, clause_block) in else_if_clauses {
				let _ = write!(out, "[elseif ({clause_condition})]");
				print_block(out, clause_block);
			}
			if let Some(else_block) = else_block {
				out.push_str("[else]");
				print_block(out, else_block);
			}
			out.push_str("[/if]");
		}
		Statement::For {
			variable,
			type_name,
			collection,
			separator,
			body,
		} => {
			let _ = write!(out, "[for ({variable}");
			if let Some(type_name) = type_name {
				let _ = write!(out, " : {type_name}");
			}
			let _ = write!(out, " in {collection})");
			if let Some(separator) = separator {
				let _ = write!(out, " separator ({separator})");
			}
			out.push(']');
			print_block(out, body);
			out.push_str("[/for]");
		}
		Statement::Let { bindings, body } => {
			out.push_str("[let ");
			for (index, binding) in bindings.iter().enumerate() {
				if index > 0 {
					out.push_str(", ");
				}
				out.push_str(&binding.name);
				if let Some(type_name) = &binding.type_name {
					let _ = write!(out, " : {type_name}");
				}
				let _ = write!(out, " = {}", binding.init);
			}
			out.push(']');
			print_block(out, body);
			out.push_str("[/let]");
		}
		Statement::File {
			url,
			mode,
			charset,
			body,
		} => {
			let _ = write!(out, "[file ({url}");
			if charset.is_some() || *mode != FileMode::Overwrite {
				let _ = write!(out, ", '{mode}'");
			}
			if let Some(charset) = charset {
				let _ = write!(out, ", {charset}");
			}
			out.push_str(")]");
			print_block(out, body);
			out.push_str("[/file]");
		}
		Statement::ProtectedArea {
			id,
			start_prefix,
			end_prefix,
			body,
		} => {
			let _ = write!(out, "[protected ({id}");
			if let Some(start_prefix) = start_prefix {
				let _ = write!(out, ", {start_prefix}");
			}
			if let Some(end_prefix) = end_prefix {
				let _ = write!(out, ", {end_prefix}");
			}
			out.push_str(")]");
			print_block(out, body);
			out.push_str("[/protected]");
		}
		Statement::Trace { source, body } => {
			let _ = write!(out, "[trace ({source})]");
			print_block(out, body);
			out.push_str("[/trace]");
		}
		Statement::MacroInvocation {
			name,
			arguments,
			body,
		} => {
			let _ = write!(out, "[{name}(");
			for (index, argument) in arguments.iter().enumerate() {
				if index > 0 {
					out.push_str(", ");
				}
				let _ = write!(out, "{argument}");
			}
			out.push(')');
			match body {
				Some(body) => {
					out.push(']');
					print_block(out, body);
					let _ = write!(out, "[/{name}]");
				}
				None => out.push_str("/]"),
			}
		}
	}
}
