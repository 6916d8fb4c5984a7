use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ds-cli")]
#[command(about = "Runs and inspects descript scripts")]
pub(crate) struct Cli {
    /// Log runtime events to stderr.
    #[arg(long, global = true)]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Run a script to completion.
    Run(RunArgs),
    /// Compile every script under a directory.
    Check(CheckArgs),
    /// Print the token statements of a script.
    Tokens(FileArgs),
    /// Print the compiled statement graph as JSON.
    Ir(FileArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "file")]
    pub(crate) file: String,
    #[arg(long = "max-steps")]
    pub(crate) max_steps: Option<usize>,
    #[arg(long = "steps-per-tick", default_value_t = 1_000)]
    pub(crate) steps_per_tick: usize,
    /// JSON file with an object seeding the globals.
    #[arg(long = "globals-json")]
    pub(crate) globals_json: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    /// Only scripts whose relative path matches this regex.
    #[arg(long = "filter")]
    pub(crate) filter: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct FileArgs {
    #[arg(long = "file")]
    pub(crate) file: String,
}
