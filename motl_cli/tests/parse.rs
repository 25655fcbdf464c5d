mod common;

use predicates::prelude::PredicateBooleanExt;
use serde_json::Value;

type AnyEmptyResult = Result<(), Box<dyn std::error::Error>>;

const SAMPLE: &str = "[module sample('http://example.org/shop#shop')]\
	[query total(n : Integer) : Integer = n * 2/]\
	[macro wrap(tag : String | body)]<[tag/]>[body/]</[tag/]>[/macro]\
	[template main render(e : Entity)]x[/template]\
	[template helper()]y[/template]";

#[test]
fn parse_text_summary_lists_declarations() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("sample.mtl");
	std::fs::write(&template, SAMPLE)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("parse")
		.arg(&template)
		.assert()
		.success()
		.stdout(
			predicates::str::contains("module sample")
				.and(predicates::str::contains("metamodel shop"))
				.and(predicates::str::contains("render(e : Entity) [main]"))
				.and(predicates::str::contains("total(n : Integer) : Integer"))
				.and(predicates::str::contains("wrap(tag : String | body)"))
				.and(predicates::str::contains("2 template(s), 1 query, 1 macro(s)")),
		);

	Ok(())
}

#[test]
fn parse_json_emits_full_ast() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("sample.mtl");
	std::fs::write(&template, SAMPLE)?;

	let mut cmd = common::motl_cmd();
	let assert = cmd
		.arg("parse")
		.arg(&template)
		.arg("--format")
		.arg("json")
		.assert()
		.success();

	let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
	let ast: Value = serde_json::from_str(&stdout)?;
	assert_eq!(ast["name"], "sample");
	assert_eq!(ast["templates"].as_array().map(Vec::len), Some(2));
	assert_eq!(ast["queries"][0]["name"], "total");
	assert_eq!(ast["macros"][0]["body_parameter"], "body");

	Ok(())
}

#[test]
fn parse_reports_syntax_errors() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("broken.mtl");
	std::fs::write(&template, "[module m('u')][template t(]x[/template]")?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("parse")
		.arg(&template)
		.assert()
		.failure()
		.code(2);

	Ok(())
}
