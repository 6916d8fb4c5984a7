use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use ds_tool::{discover_cases, read_test_case, TESTCASE_FILE};

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
}

fn cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ds-cli"))
        .args(args)
        .output()
        .expect("cli should execute")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn field<'a>(lines: &'a [String], prefix: &str) -> Option<&'a str> {
    lines.iter().find_map(|line| line.strip_prefix(prefix))
}

#[test]
fn run_matches_every_fixture() {
    let cases = discover_cases(&fixtures_root()).expect("fixtures must exist");
    assert!(!cases.is_empty());

    for directory in cases {
        let case = read_test_case(&directory.join(TESTCASE_FILE)).expect("testcase");
        let script = directory.join(&case.script);
        let mut args = vec![
            "run".to_string(),
            "--file".to_string(),
            script.to_string_lossy().to_string(),
        ];
        if let Some(max_steps) = case.max_steps {
            args.push("--max-steps".to_string());
            args.push(max_steps.to_string());
        }
        if let Some(globals) = &case.globals {
            let path = std::env::temp_dir().join(format!(
                "ds-cli-smoke-{}.json",
                directory.file_name().unwrap_or_default().to_string_lossy()
            ));
            fs::write(&path, globals.to_string()).expect("globals should be written");
            args.push("--globals-json".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        let output = cli(&args.iter().map(String::as_str).collect::<Vec<_>>());
        let lines = stdout_lines(&output);
        let texts = lines
            .iter()
            .filter_map(|line| line.strip_prefix("TEXT_JSON:"))
            .map(|json| serde_json::from_str::<String>(json).expect("text json"))
            .collect::<Vec<_>>();
        assert_eq!(texts, case.expected_output, "{}", directory.display());

        match &case.expected_error {
            Some(kind) => {
                assert!(!output.status.success(), "{}", directory.display());
                assert_eq!(field(&lines, "RESULT:"), Some("ERROR"));
                assert_eq!(field(&lines, "ERROR_KIND:"), Some(kind.as_str()));
            }
            None => {
                assert!(
                    output.status.success(),
                    "fixture {} failed\nstdout:\n{}",
                    directory.display(),
                    lines.join("\n")
                );
                assert_eq!(field(&lines, "RESULT:"), Some("OK"));
            }
        }
    }
}

#[test]
fn check_compiles_all_fixtures() {
    let root = fixtures_root();
    let output = cli(&["check", "--scripts-dir", root.to_string_lossy().as_ref()]);
    let lines = stdout_lines(&output);
    assert!(output.status.success(), "{}", lines.join("\n"));
    assert_eq!(field(&lines, "FAILED:"), Some("0"));

    let filtered = cli(&[
        "check",
        "--scripts-dir",
        root.to_string_lossy().as_ref(),
        "--filter",
        "^hello/",
    ]);
    assert_eq!(field(&stdout_lines(&filtered), "CHECKED:"), Some("1"));
}

#[test]
fn uncaught_errors_report_kind_line_and_message() {
    let script = fixtures_root().join("uncaught").join("main.ds");
    let output = cli(&["run", "--file", script.to_string_lossy().as_ref()]);
    let lines = stdout_lines(&output);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(field(&lines, "ERROR_KIND:"), Some("NotFoundError"));
    assert_eq!(field(&lines, "ERROR_LINE:"), Some("2"));
    let message = field(&lines, "ERROR_MSG_JSON:").expect("message");
    assert!(message.contains("missing_name"), "{}", message);
}

#[test]
fn ir_and_tokens_emit_json() {
    let script = fixtures_root().join("hello").join("main.ds");
    let path = script.to_string_lossy().to_string();

    let ir = stdout_lines(&cli(&["ir", "--file", &path]));
    let program: serde_json::Value =
        serde_json::from_str(field(&ir, "IR_JSON:").expect("ir line")).expect("ir json");
    assert!(program["statements"].as_array().is_some_and(|all| all.len() == 4));

    let tokens = stdout_lines(&cli(&["tokens", "--file", &path]));
    assert_eq!(field(&tokens, "STATEMENTS:"), Some("4"));
}
