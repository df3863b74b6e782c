use std::io::Write;

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind, Result},
    runtime::Interpreter,
    value::{Arity, NativeCall, Value},
};

type Callback = fn(&mut NativeCall<'_>) -> Result<Value>;

const PRELUDE: &[(&str, Arity, Callback)] = &[
    ("print", Arity::Variadic, io_print),
    ("len", Arity::Exact(1), string_len),
    ("type_of", Arity::Exact(1), core_type_of),
    ("to_string", Arity::Exact(1), core_to_string),
    ("to_number", Arity::Exact(1), core_to_number),
    ("to_int", Arity::Exact(1), core_to_int),
    ("abs", Arity::Exact(1), math_abs),
    ("sqrt", Arity::Exact(1), math_sqrt),
    ("floor", Arity::Exact(1), math_floor),
    ("pow", Arity::Exact(2), math_pow),
    ("range", Arity::Exact(2), collections_range),
];

/// Registers the prelude through the same registry a host uses.
pub fn install(interpreter: &mut Interpreter) -> Result<()> {
    for (name, arity, callback) in PRELUDE {
        interpreter.register_native(name, *arity, *callback)?;
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::InvalidArgument, message)
}

fn expect_number(value: &Value, name: &str) -> Result<f64> {
    value.as_number().ok_or_else(|| {
        Diagnostic::type_mismatch(format!(
            "`{name}` expected a number but found {}",
            value.type_name()
        ))
        .into()
    })
}

fn expect_string<'v>(value: &'v Value, name: &str) -> Result<&'v str> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(Diagnostic::type_mismatch(format!(
            "`{name}` expected a string but found {}",
            other.type_name()
        ))
        .into()),
    }
}

fn truncate(n: f64, name: &str) -> Result<i64> {
    if !n.is_finite() || n < i64::MIN as f64 || n >= i64::MAX as f64 {
        return Err(invalid(format!("`{name}` cannot represent {n} as an integer")).into());
    }
    Ok(n.trunc() as i64)
}

fn io_print(call: &mut NativeCall<'_>) -> Result<Value> {
    let line = call
        .args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(call.sinks.out, "{line}")?;
    Ok(Value::Null)
}

fn string_len(call: &mut NativeCall<'_>) -> Result<Value> {
    let text = expect_string(&call.args[0], "len")?;
    Ok(Value::Int(text.len() as i64))
}

fn core_type_of(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::string(call.args[0].type_name()))
}

fn core_to_string(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::string(call.args[0].to_string()))
}

fn core_to_number(call: &mut NativeCall<'_>) -> Result<Value> {
    match &call.args[0] {
        Value::String(text) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            Diagnostic::type_mismatch(format!("cannot convert \"{text}\" to a number")).into()
        }),
        other => match other.as_arithmetic() {
            Some(n) => Ok(Value::Float(n)),
            None => Err(Diagnostic::type_mismatch(format!(
                "cannot convert {} to a number",
                other.type_name()
            ))
            .into()),
        },
    }
}

fn core_to_int(call: &mut NativeCall<'_>) -> Result<Value> {
    match &call.args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        other => Ok(Value::Int(truncate(expect_number(other, "to_int")?, "to_int")?)),
    }
}

fn math_abs(call: &mut NativeCall<'_>) -> Result<Value> {
    match &call.args[0] {
        Value::Int(n) => Ok(n
            .checked_abs()
            .map(Value::Int)
            .unwrap_or(Value::Float((*n as f64).abs()))),
        other => Ok(Value::Float(expect_number(other, "abs")?.abs())),
    }
}

fn math_sqrt(call: &mut NativeCall<'_>) -> Result<Value> {
    let n = expect_number(&call.args[0], "sqrt")?;
    if n < 0.0 {
        return Err(invalid(format!("`sqrt` of negative number {n}")).into());
    }
    Ok(Value::Float(n.sqrt()))
}

fn math_floor(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::Float(expect_number(&call.args[0], "floor")?.floor()))
}

fn math_pow(call: &mut NativeCall<'_>) -> Result<Value> {
    let base = expect_number(&call.args[0], "pow")?;
    let exponent = expect_number(&call.args[1], "pow")?;
    Ok(Value::Float(base.powf(exponent)))
}

fn collections_range(call: &mut NativeCall<'_>) -> Result<Value> {
    let start = truncate(expect_number(&call.args[0], "range")?, "range")?;
    let end = truncate(expect_number(&call.args[1], "range")?, "range")?;
    let len = usize::try_from(end.saturating_sub(start)).unwrap_or(0);
    let mut items = Vec::new();
    items.try_reserve_exact(len)?;
    items.extend((start..end).map(Value::Int));
    Ok(Value::Array(items))
}
