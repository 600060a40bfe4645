use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kestrel_v8::{runtime, Evaluator};
use simple_logger::SimpleLogger;

#[derive(Debug, Parser)]
#[clap(name = "kestrel", about = "Run JavaScript through the Kestrel evaluator")]
struct Cli {
    /// Script file to run first
    script: Option<PathBuf>,

    /// Inline expression to evaluate after the script file, if any
    #[clap(short = 'e', long = "eval")]
    expression: Option<String>,

    /// Global function to invoke once the sources have run
    #[clap(long = "call")]
    call: Option<String>,

    /// JSON argument array for --call
    #[clap(long = "args", default_value = "[]")]
    args: String,

    /// Engine flag string, forwarded before initialization
    #[clap(long = "flags")]
    flags: Option<String>,

    /// Print the isolate heap report after execution
    #[clap(long = "heap-report")]
    heap_report: bool,

    /// Verbose logging
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    if cli.script.is_none() && cli.expression.is_none() && cli.call.is_none() {
        bail!("nothing to do: pass a script file, --eval or --call");
    }

    if let Some(flags) = &cli.flags {
        runtime::set_flags(flags);
    }
    runtime::initialize();
    log::debug!("v8 {}", runtime::version());

    let evaluator = Evaluator::new();

    if let Some(path) = &cli.script {
        let code = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        println!("{}", evaluator.eval(&code));
    }

    if let Some(expression) = &cli.expression {
        println!("{}", evaluator.eval(expression));
    }

    if let Some(name) = &cli.call {
        println!("{}", evaluator.call(name, &cli.args));
    }

    if cli.heap_report {
        log::info!("heap: {}", evaluator.heap_report().to_json());
    }

    drop(evaluator);
    runtime::dispose();

    Ok(())
}
