use std::{fmt, rc::Rc};

use crate::{
    ast::FunctionDecl,
    context::OutputSinks,
    diagnostics::{Diagnostic, Result},
};

/// Runtime value. Values move between scopes by copy: `deep_copy` is used at
/// every store and load so a scope entry never aliases the expression that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Matrix(Matrix),
    Object(ObjectHandle),
    Function(Function),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Matrix(_) => "matrix",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Literal values are the ones a script can spell directly: null,
    /// booleans, numbers and strings.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Matrix(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Arithmetic operand: numbers as-is, booleans as 0/1.
    pub fn as_arithmetic(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_number(),
        }
    }

    /// `==` semantics. Never fails: values of different kinds are unequal and
    /// non-literal values never compare equal.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (left, right) => match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Copies strings, arrays and matrix buffers into fresh allocations,
    /// reporting allocator refusal as `OutOfMemory`.
    pub fn deep_copy(&self) -> std::result::Result<Value, Diagnostic> {
        let copy = match self {
            Value::String(text) => {
                let mut owned = String::new();
                owned.try_reserve_exact(text.len())?;
                owned.push_str(text);
                Value::String(owned)
            }
            Value::Array(items) => {
                let mut owned = Vec::new();
                owned.try_reserve_exact(items.len())?;
                for item in items {
                    owned.push(item.deep_copy()?);
                }
                Value::Array(owned)
            }
            Value::Matrix(matrix) => Value::Matrix(matrix.deep_copy()?),
            other => other.clone(),
        };
        Ok(copy)
    }

    /// Rendering used for `=> value` echoes. String results are re-quoted so
    /// the text parses back to an equal literal, as do finite numbers.
    ///
    /// Non-finite floats have no literal form and render as `inf`, `-inf`
    /// and `NaN`. Those read back as identifiers, never as numbers.
    pub fn render(&self) -> String {
        match self {
            Value::String(text) => quote(text),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", rendered.join(", "))
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Matrix(matrix) => write!(
                f,
                "<matrix {}x{} {:?}>",
                matrix.rows, matrix.cols, matrix.elem_type
            ),
            Value::Object(handle) => write!(f, "<object #{}>", handle.0),
            Value::Function(Function::Closure(decl)) => write!(f, "<function {}>", decl.name),
            Value::Function(Function::Native(native)) => {
                write!(f, "<native function {}>", native.name)
            }
        }
    }
}

/// Wraps raw string text in whichever quote it does not contain unescaped.
/// String text keeps its escapes untranslated, so the result lexes back to
/// the same raw text.
fn quote(text: &str) -> String {
    let quote = if contains_unescaped(text, '"') { '\'' } else { '"' };
    format!("{quote}{text}{quote}")
}

fn contains_unescaped(text: &str, target: char) -> bool {
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == target {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int,
    Float,
    Bool,
}

/// Dense matrix buffer. The evaluator only stores and copies these.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub elem_type: ElementType,
    pub data: Vec<u8>,
}

impl Matrix {
    fn deep_copy(&self) -> std::result::Result<Matrix, Diagnostic> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())?;
        data.extend_from_slice(&self.data);
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            elem_type: self.elem_type,
            data,
        })
    }
}

/// Opaque host object handle; the core never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(expected) => *expected == count,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::Variadic => write!(f, "any number of"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Function {
    Native(NativeFunction),
    Closure(Rc<FunctionDecl>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Native(native) => &native.name,
            Function::Closure(decl) => &decl.name,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Function::Native(native) => native.arity,
            Function::Closure(decl) => Arity::Exact(decl.params.len()),
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(&a.callback, &b.callback),
            (Function::Closure(a), Function::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Arguments and output access handed to a native callback.
pub struct NativeCall<'a> {
    pub args: &'a [Value],
    pub sinks: &'a mut OutputSinks,
}

pub type NativeCallback = Rc<dyn Fn(&mut NativeCall<'_>) -> Result<Value>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub callback: NativeCallback,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, arity: Arity, callback: F) -> Self
    where
        F: Fn(&mut NativeCall<'_>) -> Result<Value> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            callback: Rc::new(callback),
        }
    }

    pub fn call(&self, call: &mut NativeCall<'_>) -> Result<Value> {
        (self.callback)(call)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
