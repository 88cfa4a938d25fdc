/// Stitch CLI

use std::path::PathBuf;
use std::process;

use clap::Parser;
use stitch_cli::{RunOptions, RunOutput, Runner};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stitch")]
#[command(about = "Stitch - load script units, splice their patches into targets and run them")]
#[command(version)]
struct Args {
    /// Host unit followed by any mod units, loaded in order
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Target to invoke once every unit is loaded
    #[arg(long, value_name = "NAME")]
    call: Option<String>,

    /// JSON argument for the invoked target (repeatable)
    #[arg(long = "arg", value_name = "JSON", value_parser = parse_json)]
    args: Vec<serde_json::Value>,

    /// Print the composed source of every target
    #[arg(long)]
    show: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_json(text: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut files = args.files.into_iter();
    let Some(first) = files.next() else {
        eprintln!("No input file");
        process::exit(2);
    };
    let mut options = RunOptions::new(first);
    for file in files {
        options = options.file(file);
    }
    if let Some(target) = args.call {
        options = options.call(target);
    }
    options = options.args(args.args).show(args.show);

    let runner = Runner::new(options);
    match runner.run().await {
        Ok(output) => print_output(&output, args.verbose),
        Err(e) => {
            eprintln!("stitch: {:#}", e);
            process::exit(1);
        }
    }
}

fn print_output(output: &RunOutput, verbose: bool) {
    if verbose {
        for (path, report) in &output.reports {
            println!("Loaded {}", path.display());
            println!("  Targets: {}", report.targets.join(", "));
            for patch in &report.patches {
                println!(
                    "  Patch: {} -> {} after line {} ({} lines)",
                    patch.patch, patch.target, patch.anchor, patch.lines
                );
            }
        }
    }

    for (name, source) in &output.composed {
        println!("--- {} ---", name);
        println!("{}", source);
    }

    if let Some(result) = &output.result {
        println!("{}", result);
    }
}
