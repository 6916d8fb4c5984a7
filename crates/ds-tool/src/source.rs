use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{TestCase, ToolError, TESTCASE_FILE, TESTCASE_SCHEMA_V1};

/// Every directory under `root` holding a testcase file, sorted.
pub fn discover_cases(root: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let mut cases = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == TESTCASE_FILE)
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect::<Vec<_>>();
    cases.sort();

    if cases.is_empty() {
        return Err(ToolError::NoCases {
            file: TESTCASE_FILE.to_string(),
            path: root.to_path_buf(),
        });
    }
    Ok(cases)
}

pub fn read_script(case_dir: &Path, case: &TestCase) -> Result<String, ToolError> {
    let path = case_dir.join(&case.script);
    fs::read_to_string(&path).map_err(|source| ToolError::ReadFile { path, source })
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, ToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| ToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase = serde_json::from_str(&raw).map_err(|source| ToolError::ParseCase {
        path: case_path.to_path_buf(),
        source,
    })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(ToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod source_tests {
    use super::*;

    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("ds-tool-{}-{}", name, nanos))
    }

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }

    #[test]
    fn discover_cases_finds_nested_case_directories() {
        let root = temp_dir("discover");
        write_file(&root.join("b").join(TESTCASE_FILE), "{}");
        write_file(&root.join("a").join("inner").join(TESTCASE_FILE), "{}");
        write_file(&root.join("c").join("main.ds"), "print 1\n");

        let cases = discover_cases(&root).expect("cases");
        assert_eq!(
            cases,
            vec![root.join("a").join("inner"), root.join("b")]
        );
    }

    #[test]
    fn discover_cases_fails_on_empty_tree() {
        let root = temp_dir("discover-empty");
        fs::create_dir_all(&root).expect("root should be created");
        let error = discover_cases(&root).expect_err("no cases");
        assert!(matches!(error, ToolError::NoCases { .. }));
    }

    #[test]
    fn read_test_case_reports_parse_and_schema_errors() {
        let root = temp_dir("case-errors");
        let bad_json_path = root.join("bad.json");
        write_file(&bad_json_path, "{");
        let parse_error = read_test_case(&bad_json_path).expect_err("parse should fail");
        assert!(matches!(parse_error, ToolError::ParseCase { .. }));

        let bad_schema_path = root.join("bad-schema.json");
        write_file(&bad_schema_path, r#"{"schemaVersion":"v0"}"#);
        let schema_error = read_test_case(&bad_schema_path).expect_err("schema should fail");
        assert!(matches!(schema_error, ToolError::InvalidSchemaVersion { .. }));

        let missing = read_test_case(&root.join("missing.json")).expect_err("missing");
        assert!(matches!(missing, ToolError::ReadFile { .. }));
    }

    #[test]
    fn read_script_resolves_against_the_case_directory() {
        let root = temp_dir("script");
        write_file(&root.join("main.ds"), "print 1\n");
        let case: TestCase =
            serde_json::from_str(r#"{"schemaVersion":"ds-tool-case.v1"}"#).expect("case");
        assert_eq!(read_script(&root, &case).expect("script"), "print 1\n");

        let other = TestCase {
            script: "other.ds".to_string(),
            ..case
        };
        assert!(matches!(
            read_script(&root, &other).expect_err("missing script"),
            ToolError::ReadFile { .. }
        ));
    }
}
