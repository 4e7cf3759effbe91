//! rrunner: worker CLI for the randomized test runner
//!
//! ## Usage
//!
//! ```bash
//! rrunner run demo.Arithmetic               # Run one suite
//! rrunner run --seed DEADBEEF @suites.txt   # Replay with a fixed seed
//! rrunner run --events-file out.jsonl demo.Failing
//! rrunner list demo.Repeated                # Show the test tree
//! rrunner seed "[a:b]"                      # Normalize a seed chain
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use randomized_runner::{RunNotifier, RunListener, SeedChain};
use rrunner::{
    catalog, collect_suite_names, prepare, render_tree, Cli, CliConfig, CliResult, Commands, ConsoleReporter,
    EventWriter, ListArgs, RunArgs, SeedArgs, Worker,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = cli.base_config();
    init_logging(&config);

    let outcome = match &cli.command {
        Commands::Run(args) => run_suites(config, args),
        Commands::List(args) => list_suites(args).map(|()| true),
        Commands::Seed(args) => normalize_seed(args).map(|()| true),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns whether every suite passed.
fn run_suites(config: CliConfig, args: &RunArgs) -> CliResult<bool> {
    let names = if args.suites.is_empty() && !args.stdin {
        catalog::names().into_iter().map(String::from).collect()
    } else {
        collect_suite_names(&args.suites, args.stdin)?
    };
    let mut config = config.with_runner(args.runner_config()?);
    if let Some(path) = &args.events_file {
        config = config.with_events_file(path);
    }

    let notifier = Arc::new(RunNotifier::new());
    notifier.add_listener(Arc::new(ConsoleReporter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
        config.runner.stack_filtering,
    )));
    let events = match &config.events_file {
        Some(path) => {
            let writer = Arc::new(EventWriter::create(
                path,
                config.runner.to_properties(),
                config.runner.stack_filtering,
            )?);
            notifier.add_listener(writer.clone() as Arc<dyn RunListener>);
            Some(writer)
        }
        None => None,
    };

    let result = Worker::new(notifier, config.runner).run_all(&names);
    if let Some(writer) = events {
        writer.finish()?;
    }
    if names.len() > 1 && !config.verbosity.is_quiet() {
        println!("Total: {}", rrunner::summary_line(&result));
    }
    Ok(result.was_successful())
}

fn list_suites(args: &ListArgs) -> CliResult<()> {
    let config = args.runner_config()?;
    let names = if args.suites.is_empty() {
        catalog::names().into_iter().map(String::from).collect()
    } else {
        args.suites.clone()
    };
    for name in &names {
        let runner = prepare(name, &config)?;
        print!("{}", render_tree(runner.description()));
    }
    Ok(())
}

fn normalize_seed(args: &SeedArgs) -> CliResult<()> {
    let chain = SeedChain::parse(&args.chain)?;
    println!("{chain}");
    Ok(())
}
