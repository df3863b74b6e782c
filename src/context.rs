use std::{
    cell::RefCell,
    fmt,
    io::{self, Write},
    rc::Rc,
};

/// How a `return` statement behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// `return e;` evaluates to `e` and execution carries on with the next
    /// statement of the enclosing block.
    #[default]
    Expression,
    /// `return` stops the enclosing blocks and loops and hands its value to
    /// the nearest call, or ends the program.
    EarlyExit,
}

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub return_mode: ReturnMode,
    pub echo_results: bool,
    /// Nested script calls allowed before `StackOverflow`.
    pub max_call_depth: usize,
    /// Nested node evaluations allowed before `StackOverflow`. Covers deep
    /// expressions as well as the bodies of nested calls.
    pub max_eval_depth: usize,
    pub prelude: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            return_mode: ReturnMode::Expression,
            echo_results: true,
            max_call_depth: 256,
            max_eval_depth: 8192,
            prelude: true,
        }
    }
}

impl InterpreterConfig {
    pub fn with_return_mode(mut self, mode: ReturnMode) -> Self {
        self.return_mode = mode;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_results = echo;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = depth;
        self
    }

    pub fn with_prelude(mut self, prelude: bool) -> Self {
        self.prelude = prelude;
        self
    }
}

/// In-memory sink whose contents stay readable after it has been handed to
/// an interpreter.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedBuffer").field(&self.contents()).finish()
    }
}

/// The "normal" and "error" text streams.
pub struct OutputSinks {
    pub out: Box<dyn Write>,
    pub err: Box<dyn Write>,
}

impl OutputSinks {
    pub fn new(out: impl Write + 'static, err: impl Write + 'static) -> Self {
        Self {
            out: Box::new(out),
            err: Box::new(err),
        }
    }

    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Sinks writing into fresh buffers, returned alongside for inspection.
    pub fn capture() -> (Self, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        (Self::new(out.clone(), err.clone()), out, err)
    }
}

impl Default for OutputSinks {
    fn default() -> Self {
        Self::stdio()
    }
}

impl fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSinks").finish_non_exhaustive()
    }
}

/// Services the evaluator consumes from its host, passed in explicitly.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub config: InterpreterConfig,
    pub sinks: OutputSinks,
}

impl ExecutionContext {
    pub fn new(config: InterpreterConfig, sinks: OutputSinks) -> Self {
        Self { config, sinks }
    }
}
