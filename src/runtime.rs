use std::{io::Write, rc::Rc};

use tracing::{debug, trace, warn};

use crate::{
    ast::{BinaryOp, FunctionDecl, Literal, Node, NodeKind, UnaryOp},
    context::{ExecutionContext, InterpreterConfig, OutputSinks, ReturnMode},
    diagnostics::{Diagnostic, DiagnosticKind, Location, Result, ScriptError},
    environment::ScopeChain,
    parser,
    stack::ensure_sufficient_stack,
    value::{Arity, Function, NativeCall, NativeFunction, Value},
};

/// Tree-walking evaluator bound to one global scope.
///
/// Calls are dynamically scoped: the scope of a call is parented on the
/// caller's current scope, not on the scope the function was declared in,
/// so a function body sees whatever names are visible at its call site.
pub struct Interpreter {
    scopes: ScopeChain,
    context: ExecutionContext,
    call_depth: usize,
    eval_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_context(ExecutionContext::default())
    }

    pub fn with_context(context: ExecutionContext) -> Self {
        let install_prelude = context.config.prelude;
        let mut interpreter = Self {
            scopes: ScopeChain::new(),
            context,
            call_depth: 0,
            eval_depth: 0,
        };
        if install_prelude {
            if let Err(err) = crate::stdlib::install(&mut interpreter) {
                warn!(error = %err, "prelude not installed");
            }
        }
        interpreter
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.context.config
    }

    pub fn sinks_mut(&mut self) -> &mut OutputSinks {
        &mut self.context.sinks
    }

    /// Number of live scopes, the global scope included. Back to 1 after
    /// every top-level evaluation, successful or not.
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Copy of a global binding.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.scopes.global().get(name).cloned()
    }

    /// Installs a host callback into the global scope. The evaluator applies
    /// the same arity and literal-argument checks as for script functions.
    pub fn register_native<F>(&mut self, name: &str, arity: Arity, callback: F) -> Result<()>
    where
        F: Fn(&mut NativeCall<'_>) -> Result<Value> + 'static,
    {
        let function = NativeFunction::new(name, arity, callback);
        self.scopes
            .global_mut()
            .define(name, &Value::Function(Function::Native(function)))?;
        debug!(name, %arity, "registered native function");
        Ok(())
    }

    pub fn parse(&self, source: &str) -> Result<Node> {
        parser::parse(source).map_err(ScriptError::from)
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let program = self.parse(source)?;
        self.evaluate(&program)
    }

    /// Like `eval_source`, but a syntax error is also reported on the error
    /// sink. Runtime errors are reported there by program evaluation itself.
    pub fn run_source(&mut self, source: &str) -> Result<Value> {
        let program = match self.parse(source) {
            Ok(program) => program,
            Err(err) => {
                writeln!(self.context.sinks.err, "{err}").ok();
                return Err(err);
            }
        };
        self.evaluate(&program)
    }

    /// Evaluates `node` against the current scope, normally the global one.
    pub fn evaluate(&mut self, node: &Node) -> Result<Value> {
        debug!(node = node.kind.name(), "evaluate");
        Ok(self.eval(node)?.into_value())
    }

    /// Every node evaluated counts one level against `max_eval_depth`; the
    /// level is released however the node completes.
    fn eval(&mut self, node: &Node) -> Result<Flow> {
        let limit = self.context.config.max_eval_depth;
        if self.eval_depth >= limit {
            return Err(Diagnostic::new(
                DiagnosticKind::StackOverflow,
                format!("evaluation nested deeper than {limit} levels"),
            )
            .with_span(node.span)
            .at(node.location)
            .into());
        }
        self.eval_depth += 1;
        let result = ensure_sufficient_stack(|| self.eval_node(node));
        self.eval_depth -= 1;
        result.map_err(|err| attach_location(err, node.location))
    }

    fn value(&mut self, node: &Node) -> Result<Value> {
        Ok(self.eval(node)?.into_value())
    }

    fn eval_node(&mut self, node: &Node) -> Result<Flow> {
        match &node.kind {
            NodeKind::Program(statements) => self.eval_program(statements),
            NodeKind::Literal(literal) => Ok(Flow::Normal(self.literal(literal))),
            NodeKind::Binary { op, left, right } => {
                Ok(Flow::Normal(self.eval_binary(*op, left, right)?))
            }
            NodeKind::Unary { op, operand } => {
                let value = self.value(operand)?;
                Ok(Flow::Normal(self.unary(*op, value)?))
            }
            NodeKind::Variable(name) => Ok(Flow::Normal(self.scopes.lookup(name)?)),
            NodeKind::Assignment {
                name,
                value,
                is_declaration,
            } => {
                let value = self.value(value)?;
                if !is_declaration && !self.scopes.resolves(name) {
                    return Err(Diagnostic::new(
                        DiagnosticKind::UndefinedVariable,
                        format!("cannot assign to undefined variable `{name}`"),
                    )
                    .into());
                }
                self.scopes.define(name, &value)?;
                Ok(Flow::Normal(value))
            }
            NodeKind::Block(statements) => self.eval_block(statements),
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.value(condition)?.is_truthy() {
                    self.eval(then_branch)
                } else if let Some(branch) = else_branch {
                    self.eval(branch)
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            NodeKind::While { condition, body } => {
                let mut last = Value::Null;
                while self.value(condition)?.is_truthy() {
                    match self.eval(body)? {
                        Flow::Normal(value) => last = value,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(last))
            }
            NodeKind::Call { name, args } => Ok(Flow::Normal(self.eval_call(name, args)?)),
            NodeKind::FunctionDecl(decl) => {
                self.scopes.define(
                    &decl.name,
                    &Value::Function(Function::Closure(Rc::clone(decl))),
                )?;
                Ok(Flow::Normal(Value::string(decl.name.clone())))
            }
            NodeKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.value(expr)?,
                    None => Value::Null,
                };
                match self.context.config.return_mode {
                    ReturnMode::Expression => Ok(Flow::Normal(value)),
                    ReturnMode::EarlyExit => Ok(Flow::Return(value)),
                }
            }
        }
    }

    fn eval_program(&mut self, statements: &[Node]) -> Result<Flow> {
        let mut last = Value::Null;
        for stmt in statements {
            let (value, stop) = match self.eval(stmt) {
                Ok(Flow::Normal(value)) => (value, false),
                Ok(Flow::Return(value)) => (value, true),
                Err(err) => {
                    debug!(error = %err, "program halted");
                    writeln!(self.context.sinks.err, "{err}").ok();
                    return Err(err);
                }
            };
            if self.context.config.echo_results && echoes(stmt) {
                writeln!(self.context.sinks.out, "=> {}", value.render())?;
            }
            last = value;
            if stop {
                break;
            }
        }
        debug!(statements = statements.len(), "program finished");
        Ok(Flow::Normal(last))
    }

    fn eval_block(&mut self, statements: &[Node]) -> Result<Flow> {
        self.in_child_scope(|interp| {
            let mut last = Value::Null;
            for stmt in statements {
                match interp.eval(stmt)? {
                    Flow::Normal(value) => last = value,
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            }
            Ok(Flow::Normal(last))
        })
    }

    /// Runs `body` inside a fresh child of the current scope. The child is
    /// released on every exit path before the result is handed back.
    fn in_child_scope<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push();
        let result = body(self);
        self.scopes.pop();
        result
    }

    fn eval_call(&mut self, name: &str, args: &[Node]) -> Result<Value> {
        let function = match self.scopes.lookup(name) {
            Ok(Value::Function(function)) => function,
            Ok(other) => {
                return Err(Diagnostic::type_mismatch(format!(
                    "`{name}` is not a function (found {})",
                    other.type_name()
                ))
                .into());
            }
            Err(err) if err.kind != DiagnosticKind::UndefinedVariable => return Err(err.into()),
            Err(_) => {
                return Err(Diagnostic::new(
                    DiagnosticKind::UndefinedVariable,
                    format!("function `{name}` is not defined"),
                )
                .into());
            }
        };

        let arity = function.arity();
        if !arity.accepts(args.len()) {
            return Err(Diagnostic::new(
                DiagnosticKind::InvalidArgument,
                format!(
                    "function `{name}` expects {arity} arguments, but got {}",
                    args.len()
                ),
            )
            .into());
        }
        if self.call_depth >= self.context.config.max_call_depth {
            return Err(Diagnostic::new(
                DiagnosticKind::StackOverflow,
                format!(
                    "call depth limit of {} exceeded in `{name}`",
                    self.context.config.max_call_depth
                ),
            )
            .into());
        }

        let mut values = Vec::with_capacity(args.len());
        for (idx, arg) in args.iter().enumerate() {
            let value = self.value(arg)?;
            if !value.is_literal() {
                return Err(Diagnostic::type_mismatch(format!(
                    "argument {} to `{name}` must be a literal value, found {}",
                    idx + 1,
                    value.type_name()
                ))
                .with_span(arg.span)
                .at(arg.location)
                .into());
            }
            values.push(value);
        }

        trace!(
            function = function.name(),
            binding = name,
            args = values.len(),
            depth = self.call_depth,
            "call"
        );
        self.call_depth += 1;
        let result = match &function {
            Function::Native(native) => {
                let mut call = NativeCall {
                    args: &values,
                    sinks: &mut self.context.sinks,
                };
                native.call(&mut call)
            }
            Function::Closure(decl) => self.call_closure(decl, &values),
        };
        self.call_depth -= 1;
        result
    }

    fn call_closure(&mut self, decl: &FunctionDecl, args: &[Value]) -> Result<Value> {
        self.in_child_scope(|interp| {
            for (param, value) in decl.params.iter().zip(args) {
                interp.scopes.define(param, value)?;
            }
            Ok(interp.eval(&decl.body)?.into_value())
        })
    }

    fn literal(&self, literal: &Literal) -> Value {
        match literal {
            Literal::Number(n) => Value::Float(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Node, right: &Node) -> Result<Value> {
        use BinaryOp::*;
        if let And | Or = op {
            let left_truth = self.value(left)?.is_truthy();
            if (op == And && !left_truth) || (op == Or && left_truth) {
                return Ok(Value::Bool(left_truth));
            }
            return Ok(Value::Bool(self.value(right)?.is_truthy()));
        }

        let left = self.value(left)?;
        let right = self.value(right)?;
        match op {
            Add => self.arithmetic(op, &left, &right, |a, b| a + b),
            Sub => self.arithmetic(op, &left, &right, |a, b| a - b),
            Mul => self.arithmetic(op, &left, &right, |a, b| a * b),
            Div => {
                self.divisor(op, &left, &right)?;
                self.arithmetic(op, &left, &right, |a, b| a / b)
            }
            Mod => {
                self.divisor(op, &left, &right)?;
                self.arithmetic(op, &left, &right, |a, b| a % b)
            }
            Equal => Ok(Value::Bool(left.loose_equals(&right))),
            NotEqual => Ok(Value::Bool(!left.loose_equals(&right))),
            Less => self.comparison(op, &left, &right, |a, b| a < b),
            LessEqual => self.comparison(op, &left, &right, |a, b| a <= b),
            Greater => self.comparison(op, &left, &right, |a, b| a > b),
            GreaterEqual => self.comparison(op, &left, &right, |a, b| a >= b),
            And | Or => unreachable!("logical operators short-circuit above"),
        }
    }

    fn operands(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<(f64, f64)> {
        match (left.as_arithmetic(), right.as_arithmetic()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(operand_mismatch(op, left, right)),
        }
    }

    fn divisor(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<()> {
        let (_, divisor) = self.operands(op, left, right)?;
        if divisor == 0.0 {
            let message = if op == BinaryOp::Mod {
                "modulo by zero"
            } else {
                "division by zero"
            };
            return Err(Diagnostic::new(DiagnosticKind::DivisionByZero, message).into());
        }
        Ok(())
    }

    fn arithmetic<F>(&self, op: BinaryOp, left: &Value, right: &Value, func: F) -> Result<Value>
    where
        F: Fn(f64, f64) -> f64,
    {
        let (a, b) = self.operands(op, left, right)?;
        Ok(Value::Float(func(a, b)))
    }

    fn comparison<F>(&self, op: BinaryOp, left: &Value, right: &Value, cmp: F) -> Result<Value>
    where
        F: Fn(f64, f64) -> bool,
    {
        match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Bool(cmp(a, b))),
            _ => Err(operand_mismatch(op, left, right)),
        }
    }

    fn unary(&self, op: UnaryOp, value: Value) -> Result<Value> {
        match (op, value) {
            (UnaryOp::Negate, Value::Int(n)) => Ok(n
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(n as f64)))),
            (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Negate, other) => Err(Diagnostic::type_mismatch(format!(
                "unary `-` expects a number, found {}",
                other.type_name()
            ))
            .into()),
            (UnaryOp::Not, other) => Err(Diagnostic::type_mismatch(format!(
                "unary `!` expects a bool, found {}",
                other.type_name()
            ))
            .into()),
        }
    }
}

/// Completion of a statement: either carry on, or unwind to the nearest
/// call because a `return` ran under `ReturnMode::EarlyExit`.
enum Flow {
    Normal(Value),
    Return(Value),
}

impl Flow {
    fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
        }
    }
}

/// Declarations are evaluated silently at program level.
fn echoes(stmt: &Node) -> bool {
    !matches!(
        stmt.kind,
        NodeKind::Assignment {
            is_declaration: true,
            ..
        } | NodeKind::FunctionDecl(_)
    )
}

fn operand_mismatch(op: BinaryOp, left: &Value, right: &Value) -> ScriptError {
    Diagnostic::type_mismatch(format!(
        "cannot apply `{op}` to {} and {}",
        left.type_name(),
        right.type_name()
    ))
    .into()
}

fn attach_location(err: ScriptError, location: Location) -> ScriptError {
    match err {
        ScriptError::Diagnostic(diag) => ScriptError::Diagnostic(diag.or_at(location)),
        other => other,
    }
}
