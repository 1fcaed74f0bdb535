use std::io::{self, BufRead, Write as _};
use std::{env, fs, process::ExitCode};

use ember::Engine;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.get(1) {
        Some(path) => run_file(path),
        None => run_repl(),
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::new();
    match engine.eval_named(path, &source) {
        Ok(value) => {
            eprintln!("{value:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_repl() -> ExitCode {
    println!("ember {} -- type an expression, or \"quit\" to exit", env!("CARGO_PKG_VERSION"));
    let engine = Engine::new();
    let stdin = io::stdin();
    let mut line_no = 0usize;

    loop {
        print!("ember> ");
        if io::stdout().flush().is_err() {
            return ExitCode::FAILURE;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                return ExitCode::FAILURE;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            return ExitCode::SUCCESS;
        }

        line_no += 1;
        match engine.eval_named(&format!("<repl:{line_no}>"), line) {
            Ok(value) => println!("{value:?}"),
            Err(err) => eprintln!("error: {err}"),
        }
    }
}
