//! Lox CLI: run a script, start a REPL, or dump bytecode.
//!
//! Exit codes (sysexits):
//! - 0: Success
//! - 64: Usage error
//! - 65: Compile error
//! - 70: Runtime error
//! - 74: I/O error

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use lox_heap::GcConfig;
use lox_vm::VmConfig;

#[derive(Debug, Parser)]
#[command(name = "lox", version, about = "Run Lox programs")]
struct Cli {
    /// Script to run. Starts a REPL when omitted.
    path: Option<PathBuf>,

    /// Print the compiled bytecode instead of running it.
    #[arg(long, requires = "path")]
    disassemble: bool,

    /// Collect garbage before every allocation.
    #[arg(long)]
    stress_gc: bool,

    /// Heap size in bytes that triggers the first collection.
    #[arg(long, value_name = "BYTES")]
    gc_threshold: Option<usize>,

    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also land here.
            let code = if e.use_stderr() {
                commands::EX_USAGE
            } else {
                0
            };
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(cli.verbose);

    let mut gc = GcConfig {
        stress: cli.stress_gc,
        ..GcConfig::default()
    };
    if let Some(threshold) = cli.gc_threshold {
        gc.initial_threshold = threshold;
    }
    let config = VmConfig { gc };

    let result = match cli.path {
        Some(path) if cli.disassemble => commands::disassemble(&path, config),
        Some(path) => commands::run_file(&path, config),
        None => commands::repl(config),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}
