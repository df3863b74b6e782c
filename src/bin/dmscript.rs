use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args as ClapArgs, Parser, Subcommand};

use dmscript::{
    ExecutionContext, Interpreter, InterpreterConfig, OutputSinks, Repl, ReturnMode, ScriptError,
};

#[derive(Parser)]
#[command(author, version, about = "dmscript language interpreter")]
struct Args {
    #[command(flatten)]
    options: Options,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(ClapArgs)]
struct Options {
    /// `return` leaves the enclosing function instead of yielding a value
    #[arg(long, global = true)]
    early_return: bool,
    /// Do not echo `=> value` after each top-level statement
    #[arg(long, short, global = true)]
    quiet: bool,
    /// Start without the built-in native functions
    #[arg(long, global = true)]
    no_prelude: bool,
    /// Maximum nesting of function calls
    #[arg(long, value_name = "N", default_value_t = 256, global = true)]
    max_depth: usize,
    /// Log interpreter activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

impl Options {
    fn config(&self) -> InterpreterConfig {
        let mode = if self.early_return {
            ReturnMode::EarlyExit
        } else {
            ReturnMode::Expression
        };
        InterpreterConfig::default()
            .with_return_mode(mode)
            .with_echo(!self.quiet)
            .with_max_call_depth(self.max_depth)
            .with_prelude(!self.no_prelude)
    }

    fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.config(), OutputSinks::stdio())
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run a script file
    Run { script: PathBuf },
    /// Evaluate a snippet of source code
    Eval { source: String },
    /// Check that a script file parses
    Parse { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.options.verbose);
    let result = match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => read_script(&script)
            .and_then(|source| Interpreter::with_context(args.options.context()).run_source(&source))
            .map(drop),
        Command::Eval { source } => Interpreter::with_context(args.options.context())
            .run_source(&source)
            .map(drop),
        Command::Parse { script } => parse_script(&script),
        Command::Repl => Repl::with_context(args.options.context()).run(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        // Diagnostics have already been written to the error sink.
        Err(err) if err.diagnostic().is_some() => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read_script(path: &Path) -> Result<String, ScriptError> {
    Ok(fs::read_to_string(path)?)
}

fn parse_script(path: &Path) -> Result<(), ScriptError> {
    let source = read_script(path)?;
    match dmscript::parse(&source) {
        Ok(_) => {
            writeln!(std::io::stdout(), "Successfully parsed {}", path.display())?;
            Ok(())
        }
        Err(diag) => {
            eprintln!("{diag}");
            Err(diag.into())
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Only initialize if RUST_LOG is set or logging was asked for
    if !verbose && std::env::var("RUST_LOG").is_err() {
        return;
    }
    let filter = if verbose {
        EnvFilter::new("dmscript=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}
