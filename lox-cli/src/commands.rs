//! CLI command implementations.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use log::debug;
use lox_heap::{Heap, NoRoots};
use lox_vm::{InterpretError, Vm, VmConfig};

/// Command line usage error.
pub const EX_USAGE: i32 = 64;
/// The input did not compile.
pub const EX_DATAERR: i32 = 65;
/// The program failed at runtime.
pub const EX_SOFTWARE: i32 = 70;
/// A file or stream could not be read.
pub const EX_IOERR: i32 = 74;

/// Compile and run a script file.
pub fn run_file(path: &Path, config: VmConfig) -> Result<(), i32> {
    let source = read_source(path)?;
    let mut vm = Vm::with_config(io::stdout(), config);
    let result = vm.interpret(&source).map_err(report);
    debug!(
        "heap after run: {} objects, {} bytes, {} collections",
        vm.heap().object_count(),
        vm.heap().bytes_allocated(),
        vm.heap().collections()
    );
    result
}

/// Read-eval-print loop over stdin. Globals persist between lines; errors
/// are reported and the loop continues.
pub fn repl(config: VmConfig) -> Result<(), i32> {
    let mut vm = Vm::with_config(io::stdout(), config);
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().map_err(|e| {
            eprintln!("error: cannot write prompt: {e}");
            EX_IOERR
        })?;

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                println!();
                return Ok(());
            }
            Ok(_) => {
                if let Err(e) = vm.interpret(&line) {
                    eprintln!("{e}");
                }
            }
            Err(e) => {
                eprintln!("error: cannot read input: {e}");
                return Err(EX_IOERR);
            }
        }
    }
}

/// Compile a script and print the bytecode of every function in it.
pub fn disassemble(path: &Path, config: VmConfig) -> Result<(), i32> {
    let source = read_source(path)?;
    let mut heap = Heap::new(config.gc);
    let function = lox_compiler::compile(&source, &mut heap, &NoRoots).map_err(|errors| {
        for e in &errors {
            eprintln!("{e}");
        }
        EX_DATAERR
    })?;
    print!(
        "{}",
        lox_disassembler::disassemble_function(&heap, function)
    );
    Ok(())
}

fn read_source(path: &Path) -> Result<String, i32> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", path.display());
        EX_IOERR
    })
}

/// Print an interpreter failure and pick the matching exit code.
fn report(error: InterpretError) -> i32 {
    eprintln!("{error}");
    match error {
        InterpretError::Compile(_) => EX_DATAERR,
        InterpretError::Runtime { .. } => EX_SOFTWARE,
    }
}
