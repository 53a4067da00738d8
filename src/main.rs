use muscheme::config::{self, Config};
use muscheme::loader::{RunSummary, load_file, run_source};
use muscheme::{Environment, Span};
use std::io::Read;
use std::process::ExitCode;

fn usage() {
    eprintln!("usage: muscheme [-q|--quiet] [FILE...]");
}

fn main() -> ExitCode {
    config::init_logging();
    Config::from_env().install();

    let mut quiet = false;
    let mut files = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-q" | "--quiet" => quiet = true,
            "-h" | "--help" => {
                usage();
                return ExitCode::SUCCESS;
            }
            _ => files.push(arg),
        }
    }

    let env = Environment::new_global_populated();
    let mut total = RunSummary::default();

    if files.is_empty() {
        let mut input = String::new();
        if let Err(err) = std::io::stdin().read_to_string(&mut input) {
            eprintln!("muscheme: cannot read standard input: {}", err);
            return ExitCode::FAILURE;
        }
        total = run_source(&input, "<stdin>", &env, quiet);
    } else {
        for file in &files {
            match load_file(file, &env, quiet, Span::default()) {
                Ok(summary) => {
                    total.evaluated += summary.evaluated;
                    total.failed += summary.failed;
                }
                Err(err) => {
                    eprintln!("muscheme: {}", err);
                    total.failed += 1;
                }
            }
        }
    }

    tracing::debug!(evaluated = total.evaluated, failed = total.failed, "done");
    if total.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
