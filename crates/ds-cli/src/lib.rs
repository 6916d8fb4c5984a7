use std::ffi::OsString;
use std::path::Path;

use clap::Parser;
use ds_api::{create_process, CreateProcessOptions};
use ds_compiler::compile_source;
use ds_parser::tokenize;
use ds_runtime::RunStatus;
use regex::Regex;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod error_map;
mod source_loader;

pub use error_map::CliError;

pub(crate) use cli_args::{CheckArgs, Cli, FileArgs, Mode, RunArgs};
pub(crate) use error_map::{emit_error, json_string};
pub(crate) use source_loader::{collect_scripts, read_globals, read_source, resolve_scripts_dir};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_logging(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

/// Logs go to stderr so stdout stays line protocol only.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Run(args) => run_script(args),
        Mode::Check(args) => check_scripts(args),
        Mode::Tokens(args) => print_tokens(args),
        Mode::Ir(args) => print_ir(args),
    }
}

fn run_script(args: RunArgs) -> Result<i32, CliError> {
    let source = read_source(Path::new(&args.file))?;
    let globals_json = args
        .globals_json
        .as_deref()
        .map(|path| read_globals(Path::new(path)))
        .transpose()?;
    let mut process = create_process(CreateProcessOptions {
        source,
        globals_json,
        max_steps: args.max_steps,
        ..CreateProcessOptions::default()
    })?;

    let budget = args.steps_per_tick.max(1);
    let mut ticks = 0usize;
    loop {
        let status = process.execute(budget);
        ticks += 1;
        for text in process.take_output() {
            println!("TEXT_JSON:{}", json_string(&text));
        }
        match status? {
            RunStatus::Finished => break,
            RunStatus::Yielded => debug!(ticks, steps = process.steps(), "tick yielded"),
        }
    }

    println!("RESULT:OK");
    println!("STEPS:{}", process.steps());
    Ok(0)
}

fn check_scripts(args: CheckArgs) -> Result<i32, CliError> {
    let root = resolve_scripts_dir(&args.scripts_dir)?;
    let filter = args.filter.as_deref().map(Regex::new).transpose()?;
    let scripts = collect_scripts(&root, filter.as_ref())?;

    let mut failed = 0usize;
    for (name, path) in &scripts {
        let source = read_source(path)?;
        match compile_source(&source) {
            Ok(program) => {
                println!("CHECK_OK:{} statements={}", name, program.statements.len());
            }
            Err(error) => {
                failed += 1;
                let line = error
                    .span
                    .as_ref()
                    .map(|span| span.start.line.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "CHECK_ERROR:{} kind={} line={} msg={}",
                    name,
                    error.kind.name(),
                    line,
                    json_string(&error.message)
                );
            }
        }
    }

    println!("CHECKED:{}", scripts.len());
    println!("FAILED:{}", failed);
    if failed == 0 {
        println!("RESULT:OK");
        Ok(0)
    } else {
        println!("RESULT:ERROR");
        Ok(1)
    }
}

fn print_tokens(args: FileArgs) -> Result<i32, CliError> {
    let source = read_source(Path::new(&args.file))?;
    let statements = tokenize(&source)?;
    for statement in &statements {
        let encoded = serde_json::to_string(statement).map_err(CliError::Encode)?;
        println!("TOKENS_JSON:{}", encoded);
    }
    println!("RESULT:OK");
    println!("STATEMENTS:{}", statements.len());
    Ok(0)
}

fn print_ir(args: FileArgs) -> Result<i32, CliError> {
    let source = read_source(Path::new(&args.file))?;
    let program = compile_source(&source)?;
    let encoded = serde_json::to_string(&program).map_err(CliError::Encode)?;
    println!("IR_JSON:{}", encoded);
    println!("RESULT:OK");
    Ok(0)
}
