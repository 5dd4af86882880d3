use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use kernlisp::ast::Value;
use kernlisp::evaluator::Environment;
use kernlisp::{Config, Error, Interpreter, reader};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Run kernlisp scripts, evaluate an expression, or start an interactive session
#[derive(Parser, Debug)]
#[command(name = "kernlisp", version, about)]
struct Args {
    /// Script files to evaluate, in order
    files: Vec<PathBuf>,

    /// Evaluate EXPR after loading any files and print the result
    #[arg(short, long, value_name = "EXPR")]
    eval: Option<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Skip the core library and any configured prelude files
    #[arg(long)]
    no_prelude: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KERNLISP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => return report(&e),
        },
        None => Config::default(),
    };
    if args.no_prelude {
        config.core_library = false;
        config.prelude.clear();
    }

    // A larger initial stack means fewer on-demand stack segments for deep programs
    let stack_size = config.stack_size_mb.saturating_mul(1024 * 1024);
    let runner = thread::Builder::new()
        .name("kernlisp-eval".to_owned())
        .stack_size(stack_size)
        .spawn(move || run(&args, config));

    match runner.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: could not start the evaluator thread: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: Config) -> ExitCode {
    let interp = match Interpreter::with_config(config) {
        Ok(interp) => interp,
        Err(e) => return report(&e),
    };

    for file in &args.files {
        if let Err(e) = interp.load_file(file) {
            return report(&e);
        }
    }

    if let Some(expr) = &args.eval {
        match interp.eval_str(expr) {
            Ok(value) => print_value(&value),
            Err(e) => return report(&e),
        }
    }

    if args.files.is_empty() && args.eval.is_none() {
        run_repl(&interp)
    } else {
        ExitCode::SUCCESS
    }
}

fn report(error: &Error) -> ExitCode {
    eprintln!("Error: {error}");
    ExitCode::FAILURE
}

fn print_value(value: &Value) {
    match value {
        Value::Defined => println!("defined"),
        other => println!("{other}"),
    }
}

/// True when `source` is a prefix of a well-formed program, e.g. an open bracket.
fn needs_more_input(source: &str) -> bool {
    matches!(reader::parse_program(source, None), Err(e) if e.is_incomplete())
}

fn run_repl(interp: &Interpreter) -> ExitCode {
    println!("kernlisp {}", env!("CARGO_PKG_VERSION"));
    println!("Type :help for commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Error: could not initialize line editor: {e}");
            return ExitCode::FAILURE;
        }
    };

    let history = interp.config().history_file.clone();
    if let Some(path) = &history {
        // A missing history file is normal on first start
        let _ = rl.load_history(path);
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "kernlisp> " } else { "     ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    match line.trim() {
                        "" => continue,
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(interp.env());
                            continue;
                        }
                        ":quit" | ":exit" => break,
                        _ => {}
                    }
                }

                buffer.push_str(&line);
                buffer.push('\n');
                if needs_more_input(&buffer) {
                    continue;
                }

                let _ = rl.add_history_entry(buffer.trim_end());
                match interp.eval_str(&buffer) {
                    Ok(value) => print_value(&value),
                    Err(e) => println!("Error: {e}"),
                }
                buffer.clear();
            }
            // Ctrl+C abandons a partial entry, or leaves when there is none
            Err(ReadlineError::Interrupted) if !buffer.is_empty() => buffer.clear(),
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    if let Some(path) = &history
        && let Err(e) = rl.save_history(path)
    {
        warn!(path = %path.display(), error = %e, "could not save history");
    }
    println!("Goodbye!");
    ExitCode::SUCCESS
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote if fn def defmacro do load quasiquote unquote macroexpand");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (def square (fn [x] (* x x)))");
    println!("  (defmacro unless [test & body] `(if ~test nil ~(cons 'do body)))");
    println!("  (macroexpand '(unless false 1))");
    println!();
    println!("An unclosed bracket or string continues on the next line.");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::BuiltinFunction { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        for row in builtins.chunks(4) {
            for name in row {
                print!("  {name:<15}");
            }
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
