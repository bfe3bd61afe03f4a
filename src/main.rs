use std::{
    fs,
    io::{self, BufReader, BufWriter, Read},
    path::{Path, PathBuf},
    process,
};

use clap::Parser;
use tracing::info;

use minicc::{
    Error,
    bytecode::disasm::render,
    runtime::{Vm, VmConfig, load},
};

#[derive(Parser, Debug)]
#[command(name = "stackvm", about = "Load and run stack-machine IR")]
struct Cli {
    /// IR file to run; standard input when omitted
    file: Option<PathBuf>,

    /// Print the loaded program before running it
    #[arg(long)]
    show_program: bool,

    /// Maximum nesting of function calls
    #[arg(long, default_value_t = VmConfig::default().max_call_depth)]
    max_call_depth: usize,
}

fn main() {
    minicc::logging::init_logging();

    let cli = Cli::parse();

    let source = match read_source(cli.file.as_deref()) {
        Ok(source) => source,
        Err(e) => {
            let name = cli
                .file
                .as_deref()
                .map_or("<stdin>".into(), |p| p.display().to_string());
            eprintln!("Failed to read '{}': {}", name, e);
            process::exit(1);
        }
    };

    match run(&cli, &source) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(e.exit_code());
        }
    }
}

fn read_source(file: Option<&Path>) -> io::Result<String> {
    match file {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(source)
        }
    }
}

fn run(cli: &Cli, source: &str) -> Result<i32, Error> {
    let program = load(source)?;
    info!(functions = program.functions.len(), "program loaded");

    if cli.show_program {
        print!("{}", render(&program));
    }

    let Some(entry) = program.entry_point() else {
        eprintln!("Error, no function named main to execute");
        return Ok(2);
    };

    let config = VmConfig {
        max_call_depth: cli.max_call_depth,
        ..VmConfig::default()
    };
    let mut vm = Vm::with_io(config, BufReader::new(io::stdin()), BufWriter::new(io::stdout()));
    let value = vm.run(&program, entry)?;
    drop(vm);

    println!("Function main returned: {}", value as i32);
    Ok(0)
}
