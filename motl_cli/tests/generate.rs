mod common;

use predicates::prelude::PredicateBooleanExt;

type AnyEmptyResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn generate_prints_stdout_buffer() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("hello.mtl");
	std::fs::write(
		&template,
		"[module hello('demo')][template greet()]Hello from motl[/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("Hello from motl"));

	Ok(())
}

#[test]
fn generate_writes_file_blocks_to_output_dir() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("files.mtl");
	std::fs::write(
		&template,
		"[module files('demo')][template t()][file ('gen/out.txt')]generated[/file][/template]",
	)?;

	let mut cmd = common::motl_cmd();
	cmd.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.assert()
		.success();

	let generated = std::fs::read_to_string(tmp.path().join("gen/out.txt"))?;
	assert_eq!(generated, "generated");

	Ok(())
}

#[test]
fn generate_preserves_protected_regions_across_runs() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("regen.mtl");
	std::fs::write(
		&template,
		"[module regen('demo')][template t()][file ('out.txt')][protected ('custom', '//', \
		 '//')]default body[/protected][/file][/template]",
	)?;

	// First run produces the default body.
	common::motl_cmd()
		.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.assert()
		.success();

	let out_path = tmp.path().join("out.txt");
	let first = std::fs::read_to_string(&out_path)?;
	assert!(first.contains("default body"));

	// Simulate a hand edit inside the protected region.
	let edited = first.replace("default body", "hand edited");
	std::fs::write(&out_path, &edited)?;

	// Regeneration keeps the edit.
	common::motl_cmd()
		.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.assert()
		.success();

	let second = std::fs::read_to_string(&out_path)?;
	assert!(second.contains("hand edited"));
	assert!(!second.contains("default body"));

	Ok(())
}

#[test]
fn generate_binds_models_from_json() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("model.mtl");
	std::fs::write(
		&template,
		"[module model('demo')][template t()][self.name/]: [for (f in self.children) separator \
		 (', ')][f.name/][/for][/template]",
	)?;
	let model = tmp.path().join("order.json");
	std::fs::write(
		&model,
		r#"{"type": "Entity", "name": "order",
			"children": [{"type": "Field", "name": "id"}, {"type": "Field", "name": "total"}]}"#,
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("generate")
		.arg(&template)
		.arg("--model")
		.arg(format!("shop={}", model.display()))
		.arg("--output-dir")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("order: id, total"));

	Ok(())
}

#[test]
fn generate_dry_run_lists_without_writing() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("dry.mtl");
	std::fs::write(
		&template,
		"[module dry('demo')][template t()][file ('never.txt')]x[/file][/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.arg("--dry-run")
		.assert()
		.success()
		.stdout(predicates::str::contains("never.txt"));

	assert!(!tmp.path().join("never.txt").exists());

	Ok(())
}

#[test]
fn generate_passes_arguments_and_globals() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("args.mtl");
	std::fs::write(
		&template,
		"[module args('demo')][template t(who : String)][greeting/] [who/][/template]",
	)?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.arg("--arg")
		.arg("world")
		.arg("--global")
		.arg("greeting=Hello")
		.assert()
		.success()
		.stdout(predicates::str::contains("Hello world"));

	Ok(())
}

#[test]
fn generate_fails_with_exit_code_two_on_bad_template() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("broken.mtl");
	std::fs::write(&template, "[module broken('demo')][template t()]unclosed")?;

	let mut cmd = common::motl_cmd();
	let _ = cmd
		.arg("generate")
		.arg(&template)
		.arg("--output-dir")
		.arg(tmp.path())
		.assert()
		.failure()
		.code(2)
		.stderr(
			predicates::str::contains("unexpected end of input")
				.or(predicates::str::contains("invalid_syntax")),
		);

	Ok(())
}
