use rustyline::{error::ReadlineError, DefaultEditor};
use tracing::debug;

use crate::{
    context::ExecutionContext,
    diagnostics::{Result, ScriptError},
    runtime::Interpreter,
};

/// Line-oriented session over one persistent interpreter. Every line is a
/// complete program; its echo and diagnostics go to the interpreter's sinks.
pub struct Repl {
    interpreter: Interpreter,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        Self::with_context(ExecutionContext::default())
    }

    pub fn with_context(context: ExecutionContext) -> Self {
        Self {
            interpreter: Interpreter::with_context(context),
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Feeds one line to the interpreter. Returns `false` once the session
    /// should end.
    pub fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed == ":quit" || trimmed == ":exit" {
            return false;
        }
        if trimmed.is_empty() {
            return true;
        }
        if let Err(err) = self.interpreter.run_source(trimmed) {
            debug!(error = %err, "line failed");
        }
        true
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline(">> ") {
                Ok(line) => {
                    editor.add_history_entry(line.trim()).ok();
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }
}

fn readline_error(err: ReadlineError) -> ScriptError {
    ScriptError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
