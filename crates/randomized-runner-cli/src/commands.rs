//! CLI command definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use randomized_runner::{RunnerConfig, SeedChain};

use crate::config::{CliConfig, ColorChoice, Verbosity};
use crate::error::{CliError, CliResult};

/// rrunner: worker process for the randomized test runner
#[derive(Parser, Debug)]
#[command(name = "rrunner")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (failures and summary only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run suites from the catalog
    Run(RunArgs),

    /// Print the description tree of catalog suites
    List(ListArgs),

    /// Validate and normalize a seed chain
    Seed(SeedArgs),
}

/// Arguments for the run command
#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Suites to run (all when empty); `@file` reads names from a file
    pub suites: Vec<String>,

    /// Also read suite names from standard input, one per line
    #[arg(long)]
    pub stdin: bool,

    /// Seed chain: RUNNER or RUNNER:METHOD (hex)
    #[arg(long, env = "TESTS_SEED")]
    pub seed: Option<String>,

    /// Repeat every test this many times
    #[arg(long = "iters", env = "TESTS_ITERS")]
    pub iterations: Option<u32>,

    /// Run only the suite with this exact name
    #[arg(long = "class", env = "TESTS_CLASS")]
    pub test_class: Option<String>,

    /// Run only tests with this exact method name
    #[arg(long = "method", env = "TESTS_METHOD")]
    pub test_method: Option<String>,

    /// Run only tests whose method name matches this glob
    #[arg(long)]
    pub method_glob: Option<String>,

    /// Default test timeout in milliseconds (0 = none)
    #[arg(long = "timeout", env = "TESTS_TIMEOUT")]
    pub timeout_ms: Option<u64>,

    /// Interrupt/stop attempts on a runaway thread
    #[arg(long, env = "TESTS_KILLATTEMPTS")]
    pub kill_attempts: Option<u32>,

    /// Wait between kill attempts in milliseconds
    #[arg(long = "kill-wait", env = "TESTS_KILLWAIT")]
    pub kill_wait_ms: Option<u64>,

    /// Enable the nightly test group
    #[arg(long, env = "TESTS_NIGHTLY")]
    pub nightly: bool,

    /// Disable stack trace filtering
    #[arg(long)]
    pub no_stack_filtering: bool,

    /// Switch a test group: NAME=true|false
    #[arg(long = "group", value_name = "NAME=BOOL")]
    pub groups: Vec<String>,

    /// Write the event stream as JSON lines to this file
    #[arg(long)]
    pub events_file: Option<PathBuf>,
}

/// Arguments for the list command
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Suites to list (all when empty)
    pub suites: Vec<String>,

    /// Seed chain used to expand candidates
    #[arg(long)]
    pub seed: Option<String>,
}

/// Arguments for the seed command
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Seed chain to normalize, e.g. `deadbeef:1F`
    pub chain: String,
}

/// Color argument for clap
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Colors when writing to a terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

impl Cli {
    /// Base configuration from the global flags
    #[must_use]
    pub fn base_config(&self) -> CliConfig {
        CliConfig::new()
            .with_verbosity(Verbosity::from_flags(self.verbose, self.quiet))
            .with_color(self.color.into())
    }
}

fn parse_seed(text: &str) -> CliResult<SeedChain> {
    SeedChain::parse(text).map_err(|e| CliError::config(e.to_string()))
}

impl RunArgs {
    /// Runner configuration selected by these flags
    pub fn runner_config(&self) -> CliResult<RunnerConfig> {
        let mut builder = RunnerConfig::builder()
            .nightly(self.nightly)
            .stack_filtering(!self.no_stack_filtering);
        if let Some(seed) = &self.seed {
            builder = builder.seed(parse_seed(seed)?);
        }
        if let Some(iterations) = self.iterations {
            builder = builder.iterations(iterations);
        }
        if let Some(class) = &self.test_class {
            builder = builder.test_class(class);
        }
        if let Some(method) = &self.test_method {
            builder = builder.test_method(method);
        }
        if let Some(glob) = &self.method_glob {
            builder = builder.method_glob(glob);
        }
        if let Some(timeout) = self.timeout_ms {
            builder = builder.timeout_ms(timeout);
        }
        if let Some(attempts) = self.kill_attempts {
            builder = builder.kill_attempts(attempts);
        }
        if let Some(wait) = self.kill_wait_ms {
            builder = builder.kill_wait_ms(wait);
        }
        for group in &self.groups {
            let (name, value) = group
                .split_once('=')
                .ok_or_else(|| CliError::invalid_argument(format!("Expected NAME=BOOL, got '{group}'")))?;
            let key = if name.starts_with("tests.") {
                name.to_string()
            } else {
                format!("tests.{name}")
            };
            builder = builder.property(key, value);
        }
        Ok(builder.build()?)
    }
}

impl ListArgs {
    /// Runner configuration used for listing
    pub fn runner_config(&self) -> CliResult<RunnerConfig> {
        let mut builder = RunnerConfig::builder();
        if let Some(seed) = &self.seed {
            builder = builder.seed(parse_seed(seed)?);
        }
        Ok(builder.build()?)
    }
}
