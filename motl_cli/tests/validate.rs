mod common;

use predicates::prelude::PredicateBooleanExt;

type AnyEmptyResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn validate_passes_a_clean_module() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("clean.mtl");
	std::fs::write(
		&template,
		"[module clean('demo')][query q(n : Integer) : Integer = n/]\
		 [template t()][q(1)/][/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("validate")
		.arg(&template)
		.assert()
		.success()
		.stdout(predicates::str::contains("Validation passed"));

	Ok(())
}

#[test]
fn validate_flags_unknown_invocations() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("unknown.mtl");
	std::fs::write(
		&template,
		"[module unknown('demo')][template t()][ghost()/][/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("validate")
		.arg(&template)
		.assert()
		.failure()
		.code(1)
		.stderr(
			predicates::str::contains("ghost")
				.and(predicates::str::contains("matches no macro, template, or query")),
		);

	Ok(())
}

#[test]
fn validate_flags_arity_mismatches() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("arity.mtl");
	std::fs::write(
		&template,
		"[module arity('demo')][template u(a : T)]x[/template]\
		 [template t()][u()/][/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("validate")
		.arg(&template)
		.assert()
		.failure()
		.code(1)
		.stderr(predicates::str::contains("expects 1 argument(s), invoked with 0"));

	Ok(())
}

#[test]
fn validate_requires_a_main_template() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("empty.mtl");
	std::fs::write(&template, "[module empty('demo')]")?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("validate")
		.arg(&template)
		.assert()
		.failure()
		.code(1)
		.stderr(predicates::str::contains("declares no templates"));

	Ok(())
}

#[test]
fn validate_resolves_explicit_main_template() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("main.mtl");
	std::fs::write(
		&template,
		"[module main('demo')][template t()]x[/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("validate")
		.arg(&template)
		.arg("--main-template")
		.arg("nope")
		.assert()
		.failure()
		.code(1)
		.stderr(predicates::str::contains("not declared in this module"));

	Ok(())
}
