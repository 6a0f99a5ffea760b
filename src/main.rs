//! jassplus - compile an indentation-based map script into vJASS.

use clap::Parser;
use jassplus::{build, Arguments, CompileOptions};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "jassplus")]
#[command(about = "Compile a jassplus program into a single vJASS file")]
struct Cli {
    /// Entry source file
    entry: PathBuf,

    /// Build flags (`DEBUG`) and named arguments (`MODE=release`)
    tokens: Vec<String>,

    /// Output path (defaults to the entry path with a .j extension)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write a JSON build report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jassplus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = CompileOptions {
        arguments: Arguments::parse(&cli.tokens),
        output: cli.output,
    };

    info!("compiling {}", cli.entry.display());
    let output = match build(&cli.entry, &options) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = cli.report {
        if let Err(e) = output.report.write(&path) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
