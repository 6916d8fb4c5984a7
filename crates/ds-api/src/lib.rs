use ds_compiler::compile_source;
use ds_core::{Program, Record, RecordRef, ScriptError};
use ds_runtime::{NativeRegistry, Process, ProcessOptions};

#[derive(Default)]
pub struct CreateProcessOptions {
    pub source: String,
    pub natives: Option<NativeRegistry>,
    /// JSON object seeding the global namespace.
    pub globals_json: Option<serde_json::Value>,
    pub max_steps: Option<usize>,
    pub max_call_depth: Option<usize>,
}

/// Everything a finished run left behind.
#[derive(Debug)]
pub struct RunReport {
    pub output: Vec<String>,
    pub error: Option<ScriptError>,
    pub steps: usize,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub fn compile_script(source: &str) -> Result<Program, ScriptError> {
    compile_source(source)
}

/// Builds a global namespace from a JSON object: nested objects become
/// sub-records.
pub fn globals_from_json(json: &serde_json::Value) -> Result<RecordRef, ScriptError> {
    Ok(Record::from_json(json)?.into_ref())
}

pub fn create_process(options: CreateProcessOptions) -> Result<Process, ScriptError> {
    let program = compile_script(&options.source)?;
    let globals = options
        .globals_json
        .as_ref()
        .map(globals_from_json)
        .transpose()?;
    Ok(Process::new(
        program,
        ProcessOptions {
            natives: options.natives,
            globals,
            max_call_depth: options.max_call_depth,
            max_steps: options.max_steps,
        },
    ))
}

/// Compiles and runs `source` to completion with default options.
pub fn run_source(source: &str) -> RunReport {
    run(CreateProcessOptions {
        source: source.to_string(),
        ..CreateProcessOptions::default()
    })
}

pub fn run(options: CreateProcessOptions) -> RunReport {
    let mut process = match create_process(options) {
        Ok(process) => process,
        Err(error) => {
            return RunReport {
                output: Vec::new(),
                error: Some(error),
                steps: 0,
            }
        }
    };
    let error = process.run_to_completion().err();
    RunReport {
        output: process.take_output(),
        error,
        steps: process.steps(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::{ErrorKind, Value};
    use serde_json::json;

    #[test]
    fn run_source_collects_output() {
        let report = run_source("print \"hello\", 1 + 1\n");
        assert!(report.is_ok());
        assert_eq!(report.output, vec!["hello 2"]);
        assert!(report.steps > 0);
    }

    #[test]
    fn compile_errors_are_reported_without_running() {
        let report = run_source("if x\n");
        assert_eq!(report.error.expect("syntax").kind, ErrorKind::Syntax);
        assert_eq!(report.steps, 0);
    }

    #[test]
    fn runtime_errors_keep_earlier_output() {
        let report = run_source("print 1\nthrow \"stop\"\nprint 2\n");
        let error = report.error.expect("thrown");
        assert_eq!(error.kind, ErrorKind::Thrown);
        assert_eq!(error.message, "stop");
        assert_eq!(report.output, vec!["1"]);
    }

    #[test]
    fn globals_json_seeds_records() {
        let report = run(CreateProcessOptions {
            source: "print player.name, player.stats.hp, len(items)\n".to_string(),
            globals_json: Some(json!({
                "player": {"name": "Ann", "stats": {"hp": 12}},
                "items": [1, 2, 3]
            })),
            ..CreateProcessOptions::default()
        });
        assert!(report.is_ok(), "{:?}", report.error);
        assert_eq!(report.output, vec!["Ann 12 3"]);
    }

    #[test]
    fn globals_json_must_be_an_object() {
        let error = create_process(CreateProcessOptions {
            source: "pass\n".to_string(),
            globals_json: Some(json!([1, 2])),
            ..CreateProcessOptions::default()
        })
        .expect_err("array globals");
        assert_eq!(error.kind, ErrorKind::Type);
    }

    #[test]
    fn host_natives_are_callable() {
        let mut natives = NativeRegistry::new();
        natives
            .register("greet", &["name"], |_, args| {
                Ok(Value::text(format!("hi {}", args[0].as_text())))
            })
            .expect("register");
        let report = run(CreateProcessOptions {
            source: "print greet(\"Bo\")\n".to_string(),
            natives: Some(natives),
            ..CreateProcessOptions::default()
        });
        assert_eq!(report.output, vec!["hi Bo"]);
    }
}
