use std::io::{Read, Write};
use std::path::PathBuf;

use clap::Parser;

use wlp4gen::error::{CompileError, CompileResult, InternalError};

/// Expression nesting is checked and generated recursively, so the pipeline
/// runs on a thread with room for deeply nested input.
const PIPELINE_STACK_SIZE: usize = 256 << 20;

/// Generates assembly from a WLP4 derivation tree.
#[derive(Parser, Debug)]
#[command(name = "wlp4gen", version, about)]
struct Cli {
    /// Production-line input; read from stdin when omitted.
    input: Option<PathBuf>,

    /// Write the assembly here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the symbol table to stderr after checking.
    #[arg(long)]
    dump_symbols: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = std::thread::Builder::new()
        .name("wlp4gen".to_string())
        .stack_size(PIPELINE_STACK_SIZE)
        .spawn(move || run(&cli))
        .map_err(CompileError::from)
        .and_then(|worker| {
            worker.join().unwrap_or_else(|_| {
                Err(InternalError("compiler thread panicked".to_string()).into())
            })
        });
    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> CompileResult<()> {
    let src = match &cli.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s)?;
            s
        }
    };

    let unit = wlp4gen::compile_unit(&src)?;
    if cli.dump_symbols {
        eprint!("{}", unit.analysis.directory);
    }

    match &cli.output {
        Some(path) => std::fs::write(path, &unit.assembly)?,
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(unit.assembly.as_bytes())?;
            out.flush()?;
        }
    }
    Ok(())
}
