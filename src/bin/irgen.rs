//! Generate IR text from translation units encoded by the parser.

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use clap::Parser;
use tracing::info;

use minicc::{bytecode::generate, lang::program::decode_unit};

#[derive(Parser, Debug)]
#[command(name = "irgen", about = "Generate stack-machine IR from typed ASTs")]
struct Cli {
    /// Encoded translation units, in link order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write the IR here instead of standard output
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    minicc::logging::init_logging();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> minicc::Result<()> {
    let mut units = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let bytes = fs::read(path)?;
        units.push(decode_unit(&bytes)?);
        info!(file = %path.display(), "decoded translation unit");
    }

    let ir = generate(&units)?;

    match &cli.output {
        Some(path) => fs::write(path, ir)?,
        None => io::stdout().write_all(ir.as_bytes())?,
    }
    Ok(())
}
