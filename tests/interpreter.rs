use std::{cell::Cell, io::Write, rc::Rc};

use dmscript::{
    Arity, DiagnosticKind, ExecutionContext, Interpreter, InterpreterConfig, OutputSinks,
    ReturnMode, ScriptError, SharedBuffer, Value,
};

fn quiet() -> InterpreterConfig {
    InterpreterConfig::default().with_echo(false)
}

fn interpreter(config: InterpreterConfig) -> (Interpreter, SharedBuffer, SharedBuffer) {
    let (sinks, out, err) = OutputSinks::capture();
    let interpreter = Interpreter::with_context(ExecutionContext::new(config, sinks));
    (interpreter, out, err)
}

fn eval(source: &str) -> Value {
    let (mut interpreter, _, _) = interpreter(quiet());
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> ScriptError {
    let (mut interpreter, _, _) = interpreter(quiet());
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn expect_kind(source: &str, kind: DiagnosticKind) {
    let err = eval_error(source);
    assert_eq!(err.kind(), Some(kind), "unexpected error: {err}");
}

fn expect_number(value: &Value) -> f64 {
    value
        .as_number()
        .unwrap_or_else(|| panic!("expected number, found {}", value.type_name()))
}

fn expect_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => panic!("expected bool, found {}", other.type_name()),
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(expect_number(&eval("2 + 3 * 4;")), 14.0);
    assert_eq!(expect_number(&eval("(2 + 3) * 4;")), 20.0);
    assert_eq!(expect_number(&eval("10 - 4 - 3;")), 3.0);
    assert_eq!(expect_number(&eval("8 / 4 / 2;")), 1.0);
    assert_eq!(expect_number(&eval("7 % 4 * 2;")), 6.0);
}

#[test]
fn arithmetic_produces_floats() {
    assert_eq!(eval("1 + 1;"), Value::Float(2.0));
    assert_eq!(eval("7 / 2;"), Value::Float(3.5));
    assert_eq!(eval("true + true;"), Value::Float(2.0));
    assert_eq!(eval("-5 % 3;"), Value::Float(-2.0));
}

#[test]
fn division_and_modulo_by_zero_fail() {
    expect_kind("1 / 0;", DiagnosticKind::DivisionByZero);
    expect_kind("1 % 0;", DiagnosticKind::DivisionByZero);
    expect_kind("1 / false;", DiagnosticKind::DivisionByZero);
}

#[test]
fn arithmetic_rejects_non_numeric_operands() {
    expect_kind("\"a\" + 1;", DiagnosticKind::TypeMismatch);
    expect_kind("null * 2;", DiagnosticKind::TypeMismatch);
    expect_kind("range(0, 2) + 1;", DiagnosticKind::TypeMismatch);
}

#[test]
fn relational_operators_require_numbers() {
    assert!(expect_bool(&eval("1 < 2;")));
    assert!(expect_bool(&eval("2 <= 2;")));
    assert!(!expect_bool(&eval("1 > 2;")));
    assert!(expect_bool(&eval("3 >= 2.5;")));
    expect_kind("true < 2;", DiagnosticKind::TypeMismatch);
    expect_kind("\"a\" < \"b\";", DiagnosticKind::TypeMismatch);
}

#[test]
fn equality_never_errors() {
    assert!(expect_bool(&eval("\"a\" == \"a\";")));
    assert!(!expect_bool(&eval("\"a\" == 1;")));
    assert!(expect_bool(&eval("null == null;")));
    assert!(!expect_bool(&eval("null == false;")));
    assert!(!expect_bool(&eval("true == 1;")));
    assert!(expect_bool(&eval("1 != 2;")));
    assert!(expect_bool(&eval("to_int(3) == 3;")));
    assert!(!expect_bool(&eval("range(0, 1) == range(0, 1);")));
}

#[test]
fn logical_operators_short_circuit() {
    assert!(!expect_bool(&eval("false && (1 / 0 == 0);")));
    assert!(expect_bool(&eval("true || (1 / 0 == 0);")));
    expect_kind("true && (1 / 0 == 0);", DiagnosticKind::DivisionByZero);
}

#[test]
fn logical_operators_use_truthiness() {
    assert!(expect_bool(&eval("1 && \"text\";")));
    assert!(!expect_bool(&eval("0 || \"\";")));
    assert!(!expect_bool(&eval("null || false;")));
    assert!(expect_bool(&eval("range(0, 0) && true;")));
}

#[test]
fn unary_operators_are_strict() {
    assert_eq!(expect_number(&eval("-(2 + 3);")), -5.0);
    assert!(expect_bool(&eval("!false;")));
    assert!(expect_bool(&eval("!!true;")));
    expect_kind("!1;", DiagnosticKind::TypeMismatch);
    expect_kind("-\"a\";", DiagnosticKind::TypeMismatch);
}

#[test]
fn declared_variables_resolve_in_nested_blocks() {
    assert_eq!(expect_number(&eval("let x = 5; x;")), 5.0);
    assert_eq!(expect_number(&eval("let x = 5; { { x; } }")), 5.0);
}

#[test]
fn block_locals_do_not_leak() {
    expect_kind("{ let y = 1; } y;", DiagnosticKind::UndefinedVariable);
    assert_eq!(expect_number(&eval("let x = 1; { let x = 2; } x;")), 1.0);
}

#[test]
fn assignment_requires_an_existing_binding() {
    expect_kind("y = 3;", DiagnosticKind::UndefinedVariable);
    assert_eq!(expect_number(&eval("var y = 1; y = 3; y;")), 3.0);
}

#[test]
fn assignment_in_a_block_shadows_the_outer_binding() {
    assert_eq!(expect_number(&eval("let x = 1; { x = 2; x; }")), 2.0);
    assert_eq!(expect_number(&eval("let x = 1; { x = 2; } x;")), 1.0);
}

#[test]
fn empty_block_is_null() {
    assert_eq!(eval("{}"), Value::Null);
    assert_eq!(eval(""), Value::Null);
}

#[test]
fn if_and_while_follow_truthiness() {
    assert_eq!(expect_number(&eval("if (1) 10; else 20;")), 10.0);
    assert_eq!(expect_number(&eval("if (\"\") 10; else 20;")), 20.0);
    assert_eq!(eval("if (false) 10;"), Value::Null);

    let (mut interp, _, _) = interpreter(quiet());
    interp
        .eval_source("let i = 0; while (i < 4) i = i + 1;")
        .expect("loop should finish");
    assert_eq!(interp.global("i"), Some(Value::Float(4.0)));
}

#[test]
fn assignment_in_a_branch_block_does_not_reach_the_outer_binding() {
    let (mut interp, _, _) = interpreter(quiet());
    let value = interp
        .eval_source("let i = 0; if (true) { i = 9; }")
        .expect("evaluation should succeed");
    assert_eq!(value, Value::Float(9.0));
    assert_eq!(interp.global("i"), Some(Value::Float(0.0)));
}

#[test]
fn while_yields_its_last_body_value() {
    let value = eval(
        r#"
        var n = 3;
        while (n > 0) n = n - 1;
        "#,
    );
    assert_eq!(expect_number(&value), 0.0);
    assert_eq!(eval("while (false) 1;"), Value::Null);
}

#[test]
fn functions_are_called_with_exact_arity() {
    let source = "function add(a, b) return a + b;";
    assert_eq!(expect_number(&eval(&format!("{source} add(2, 3);"))), 5.0);
    expect_kind(&format!("{source} add(2);"), DiagnosticKind::InvalidArgument);
    expect_kind(&format!("{source} add(1, 2, 3);"), DiagnosticKind::InvalidArgument);
}

#[test]
fn function_declaration_yields_its_name() {
    assert_eq!(eval("function f() 1;"), Value::string("f"));
}

#[test]
fn call_targets_must_be_functions() {
    expect_kind("missing(1);", DiagnosticKind::UndefinedVariable);
    expect_kind("let f = 1; f();", DiagnosticKind::TypeMismatch);
}

#[test]
fn call_arguments_must_be_literals() {
    let err = eval_error("function id(v) v; id(range(0, 3));");
    assert_eq!(err.kind(), Some(DiagnosticKind::TypeMismatch));
    assert!(err.to_string().contains("argument 1"), "{err}");
}

#[test]
fn call_scope_is_parented_on_the_caller() {
    let value = eval(
        r#"
        function read() return secret;
        function outer() {
            let secret = 42;
            read();
        }
        outer();
        "#,
    );
    assert_eq!(expect_number(&value), 42.0);
    expect_kind("function read() secret; read();", DiagnosticKind::UndefinedVariable);
}

#[test]
fn call_locals_are_released_after_the_call() {
    expect_kind(
        "function f(p) { let inner = p; } f(1); inner;",
        DiagnosticKind::UndefinedVariable,
    );
    expect_kind("function f(p) p; f(1); p;", DiagnosticKind::UndefinedVariable);
}

#[test]
fn scopes_unwind_after_errors() {
    let (mut interp, _, _) = interpreter(quiet());
    let err = interp
        .eval_source("function f(x) { let local = x; { 1 / 0; } } f(1);")
        .expect_err("division should fail");
    assert_eq!(err.kind(), Some(DiagnosticKind::DivisionByZero));
    assert_eq!(interp.scope_depth(), 1);
    assert!(interp.global("local").is_none());
    assert!(interp.eval_source("local;").is_err());
    assert_eq!(
        interp.eval_source("f;").map(|v| v.type_name()).ok(),
        Some("function")
    );
}

#[test]
fn return_is_an_expression_by_default() {
    let value = eval(
        r#"
        function f() {
            return 1;
            2;
        }
        f();
        "#,
    );
    assert_eq!(expect_number(&value), 2.0);
}

#[test]
fn early_exit_return_unwinds_to_the_call() {
    let (mut interp, _, _) = interpreter(quiet().with_return_mode(ReturnMode::EarlyExit));
    let value = interp
        .eval_source(
            r#"
            function first_over(limit) {
                var i = 0;
                while (true)
                    if (i > limit) return i;
                    else i = i + 1;
            }
            first_over(3);
            "#,
        )
        .expect("evaluation should succeed");
    assert_eq!(expect_number(&value), 4.0);
}

#[test]
fn early_exit_return_stops_the_program() {
    let (mut interp, out, _) = interpreter(
        InterpreterConfig::default().with_return_mode(ReturnMode::EarlyExit),
    );
    let value = interp
        .eval_source("1; return 2; 3;")
        .expect("evaluation should succeed");
    assert_eq!(expect_number(&value), 2.0);
    assert_eq!(out.contents(), "=> 1\n=> 2\n");
}

#[test]
fn recursion_is_bounded() {
    let (mut interp, _, _) = interpreter(quiet().with_max_call_depth(16));
    let err = interp
        .eval_source("function down(n) down(n - 1); down(1);")
        .expect_err("recursion should overflow");
    assert_eq!(err.kind(), Some(DiagnosticKind::StackOverflow));
    assert_eq!(interp.scope_depth(), 1);
}

#[test]
fn default_call_limit_holds_on_a_spawned_thread() {
    let outcome = std::thread::spawn(|| {
        let (mut interp, _, _) = interpreter(InterpreterConfig::default());
        let err = interp
            .eval_source("function down(n) down(n - 1); down(1);")
            .expect_err("recursion should overflow");
        (err.kind(), err.to_string(), interp.scope_depth())
    })
    .join()
    .expect("interpreter thread should not crash");
    assert_eq!(outcome.0, Some(DiagnosticKind::StackOverflow));
    assert!(outcome.1.contains("call depth limit of 256"), "{}", outcome.1);
    assert_eq!(outcome.2, 1);
}

#[test]
fn evaluation_depth_is_bounded() {
    let (mut interp, _, _) = interpreter(quiet().with_max_eval_depth(32));
    let err = interp
        .eval_source(&format!("{}1;", "-".repeat(40)))
        .expect_err("expression is deeper than the limit");
    assert_eq!(err.kind(), Some(DiagnosticKind::StackOverflow));
    let diagnostic = err.diagnostic().expect("runtime diagnostic");
    assert_eq!(diagnostic.message, "evaluation nested deeper than 32 levels");

    let value = interp
        .eval_source(&format!("{}1;", "-".repeat(20)))
        .expect("depth is released after the error");
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn deep_source_fails_cleanly_instead_of_crashing() {
    let parens = format!("{}1{};", "(".repeat(10_000), ")".repeat(10_000));
    expect_kind(&parens, DiagnosticKind::Syntax);
    let blocks = format!("{}{}", "{".repeat(10_000), "}".repeat(10_000));
    expect_kind(&blocks, DiagnosticKind::Syntax);
}

#[test]
fn nested_expressions_within_the_limit_evaluate() {
    let source = format!("{}2{} * 3;", "(".repeat(200), ")".repeat(200));
    assert_eq!(expect_number(&eval(&source)), 6.0);
    let sum = format!("0{};", " + 1".repeat(500));
    assert_eq!(expect_number(&eval(&sum)), 500.0);
}

#[test]
fn functions_keep_their_declared_name() {
    let (mut interp, _, _) = interpreter(quiet());
    interp
        .eval_source("function area(w, h) w * h;")
        .expect("declaration");
    match interp.global("area") {
        Some(Value::Function(function)) => {
            assert_eq!(function.name(), "area");
            assert_eq!(function.arity(), Arity::Exact(2));
        }
        other => panic!("expected function, found {other:?}"),
    }
    match interp.global("sqrt") {
        Some(Value::Function(function)) => assert_eq!(function.name(), "sqrt"),
        other => panic!("expected native function, found {other:?}"),
    }
}

#[test]
fn recursion_within_the_limit_succeeds() {
    let (mut interp, _, _) = interpreter(quiet().with_return_mode(ReturnMode::EarlyExit));
    let value = interp
        .eval_source(
            r#"
            function fact(n) {
                if (n <= 1) return 1;
                return n * fact(n - 1);
            }
            fact(5);
            "#,
        )
        .expect("evaluation should succeed");
    assert_eq!(expect_number(&value), 120.0);
}

#[test]
fn program_echoes_results_except_declarations() {
    let (mut interp, out, err) = interpreter(InterpreterConfig::default());
    interp
        .eval_source("let x = 2 + 3 * 4; function f() 1; x; x = 1; \"hi\"; true; null;")
        .expect("evaluation should succeed");
    assert_eq!(out.contents(), "=> 14\n=> 1\n=> \"hi\"\n=> true\n=> null\n");
    assert_eq!(err.contents(), "");
}

#[test]
fn program_reports_errors_and_stops() {
    let (mut interp, out, err) = interpreter(InterpreterConfig::default());
    let result = interp.eval_source("1;\n2 / 0;\n3;");
    assert!(result.is_err());
    assert_eq!(out.contents(), "=> 1\n");
    assert_eq!(
        err.contents(),
        "DivisionByZero: division by zero (line 2, column 1)\n"
    );
}

#[test]
fn run_source_reports_syntax_errors() {
    let (mut interp, out, err) = interpreter(InterpreterConfig::default());
    let result = interp.run_source("let = 1;");
    assert_eq!(result.map_err(|e| e.kind()).err(), Some(Some(DiagnosticKind::Syntax)));
    assert_eq!(out.contents(), "");
    assert!(err.contents().starts_with("SyntaxError: expected variable name (line 1, column 5)"));
}

#[test]
fn globals_persist_between_evaluations() {
    let (mut interp, _, _) = interpreter(quiet());
    interp.eval_source("let total = 10;").expect("declare");
    interp.eval_source("total = total + 5;").expect("assign");
    assert_eq!(interp.global("total"), Some(Value::Float(15.0)));
}

#[test]
fn evaluate_runs_a_parsed_program() {
    let (mut interp, _, _) = interpreter(quiet());
    let program = interp.parse("let a = 4; a * a;").expect("parse");
    assert_eq!(interp.evaluate(&program).expect("evaluate"), Value::Float(16.0));
    assert_eq!(interp.evaluate(&program).expect("evaluate again"), Value::Float(16.0));
}

#[test]
fn print_writes_to_the_normal_sink() {
    let (mut interp, out, _) = interpreter(quiet());
    let value = interp
        .eval_source("print(\"sum:\", 1 + 2, true, null);")
        .expect("evaluation should succeed");
    assert_eq!(value, Value::Null);
    assert_eq!(out.contents(), "sum: 3 true null\n");
}

#[test]
fn prelude_natives() {
    assert_eq!(eval("len(\"hello\");"), Value::Int(5));
    assert_eq!(eval("type_of(1.5);"), Value::string("float"));
    assert_eq!(eval("type_of(to_int(1.5));"), Value::string("int"));
    assert_eq!(eval("to_string(2.5);"), Value::string("2.5"));
    assert_eq!(eval("to_number(\" 42 \");"), Value::Float(42.0));
    assert_eq!(eval("to_int(-3.7);"), Value::Int(-3));
    assert_eq!(eval("abs(-2);"), Value::Float(2.0));
    assert_eq!(eval("sqrt(16);"), Value::Float(4.0));
    assert_eq!(eval("floor(2.9);"), Value::Float(2.0));
    assert_eq!(eval("pow(2, 10);"), Value::Float(1024.0));
    assert_eq!(
        eval("range(1, 4);"),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    assert_eq!(eval("range(3, 1);"), Value::Array(vec![]));
}

#[test]
fn prelude_natives_validate_arguments() {
    expect_kind("sqrt(-1);", DiagnosticKind::InvalidArgument);
    expect_kind("to_number(\"abc\");", DiagnosticKind::TypeMismatch);
    expect_kind("len(3);", DiagnosticKind::TypeMismatch);
    expect_kind("len(\"a\", \"b\");", DiagnosticKind::InvalidArgument);
}

#[test]
fn prelude_can_be_disabled() {
    let (mut interp, _, _) = interpreter(quiet().with_prelude(false));
    let err = interp.eval_source("print(1);").expect_err("print is absent");
    assert_eq!(err.kind(), Some(DiagnosticKind::UndefinedVariable));
}

#[test]
fn host_natives_receive_literal_arguments() {
    let (mut interp, _, _) = interpreter(quiet().with_prelude(false));
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    interp
        .register_native("twice", Arity::Exact(1), move |call| {
            counter.set(counter.get() + 1);
            let n = call.args[0].as_number().unwrap_or_default();
            Ok(Value::Float(n * 2.0))
        })
        .expect("register");
    assert_eq!(interp.eval_source("twice(21);").expect("call"), Value::Float(42.0));
    let err = interp.eval_source("twice();").expect_err("arity");
    assert_eq!(err.kind(), Some(DiagnosticKind::InvalidArgument));
    assert_eq!(calls.get(), 1);
}

#[test]
fn host_natives_can_write_to_sinks() {
    let (mut interp, _, err) = interpreter(quiet());
    interp
        .register_native("warn", Arity::Variadic, |call| {
            for arg in call.args {
                writeln!(call.sinks.err, "warning: {arg}")?;
            }
            Ok(Value::Null)
        })
        .expect("register");
    interp.eval_source("warn(\"low\", 3);").expect("call");
    assert_eq!(err.contents(), "warning: low\nwarning: 3\n");
}

#[test]
fn host_writes_share_the_interpreter_sinks() {
    let (mut interp, out, _) = interpreter(quiet());
    assert_eq!(interp.config().return_mode, ReturnMode::Expression);
    writeln!(interp.sinks_mut().out, "banner").expect("write");
    assert_eq!(out.contents(), "banner\n");
    out.clear();
    interp.eval_source("print(1);").expect("print");
    assert_eq!(out.contents(), "1\n");
}
