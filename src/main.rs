use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use gscheme::ast::Value;
use gscheme::evaluator::{self, Environment};
use gscheme::reader::{ReaderConfig, parse_program_with_config};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

#[derive(Parser)]
#[command(name = "gscheme")]
#[command(about = "Minimal Scheme interpreter")]
#[command(version)]
struct Args {
    /// Program to run; starts the interactive REPL when omitted
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Treat `;` as the start of a line comment
    #[arg(long)]
    comments: bool,

    /// Don't print results that are the empty value (e.g. from define)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let config = ReaderConfig {
        handle_comments: args.comments,
    };

    match &args.file {
        Some(path) => run_file(path, config, args.quiet),
        None => run_repl(config),
    }
}

/// Install a stderr subscriber only when RUST_LOG asks for one
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        let filter = EnvFilter::from_default_env();
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    }
}

fn run_file(path: &Path, config: ReaderConfig, quiet: bool) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let forms = match parse_program_with_config(&source, config) {
        Ok(forms) => forms,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Results are printed as each form finishes so output before an error is kept
    let env = evaluator::create_global_env();
    for form in &forms {
        match evaluator::eval(form, &env) {
            Ok(result) => {
                if !(quiet && matches!(result, Value::Nil)) {
                    println!("{result}");
                }
            }
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn run_repl(config: ReaderConfig) -> ExitCode {
    println!("gscheme - minimal Scheme interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Error: could not initialize REPL: {err}");
            return ExitCode::FAILURE;
        }
    };
    let env = evaluator::create_global_env();

    loop {
        match rl.readline("gscheme> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let result = parse_program_with_config(line, config)
                    .and_then(|forms| evaluator::eval_program(&forms, &env));

                match result {
                    Ok(results) => {
                        // Don't print Nil values (e.g., from define)
                        for result in results.iter().filter(|r| !matches!(r, Value::Nil)) {
                            println!("{result}");
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Special forms: quote, define, lambda, cond");
    println!("Primitives:    + - * / car cdr cons eq? null? atom? zero?");
    println!();
    println!("Examples:");
    println!("  (define square (lambda (x) (* x x)))");
    println!("  (square 7)");
    println!("  (cond ((zero? 0) \"zero\") (else \"other\"))");
    println!("  (car (cons 1 (quote (2 3))))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from user-defined values
    let mut primitives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Primitive { .. } => primitives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !primitives.is_empty() {
        println!("Primitives ({}):", primitives.len());
        // Print in columns for readability
        let mut col = 0;
        for name in primitives {
            print!("  {name:<10}");
            col += 1;
            if col % 6 == 0 {
                println!();
            }
        }
        if col % 6 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {}", value.to_source());
        }
        println!();
    }
}
