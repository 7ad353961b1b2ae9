use std::rc::Rc;

use indoc::indoc;
use pretty_assertions::assert_eq;

use pyhost::host::{HostMethod, HostProperty, HostTypeDef, NativeObject, StaticType, TypeKey};
use pyhost::interpreter::loader::MemoryLoader;
use pyhost::runtime::RuntimeError;
use pyhost::{Config, Interpreter, Value};

fn interpreter() -> Interpreter {
    Interpreter::new(Config::captured()).expect("interpreter")
}

struct Tally {
    count: i64,
}

fn tally_count(receiver: &Value) -> Result<i64, RuntimeError> {
    match receiver {
        Value::Native(native) => native.with_state(|tally: &Tally| tally.count),
        _ => None,
    }
    .ok_or_else(|| RuntimeError::type_error("expected a Tally"))
}

fn bump(receiver: &Value, by: i64) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Native(native) => native.with_state_mut(|tally: &mut Tally| tally.count += by),
        _ => None,
    }
    .ok_or_else(|| RuntimeError::type_error("expected a Tally"))?;
    Ok(Value::None)
}

fn tally_type() -> HostTypeDef {
    HostTypeDef::new("Tally")
        .constructor(HostMethod::new("Tally", [StaticType::Int], StaticType::Dynamic, |_, receiver, args| {
            let Value::Type(ty) = receiver else {
                return Err(RuntimeError::type_error("Tally() needs its type"));
            };
            let count = args.first().and_then(Value::as_int).unwrap_or_default();
            Ok(Value::Native(NativeObject::new(ty.clone(), Tally { count })))
        }))
        .method(HostMethod::new("bump", [], StaticType::None, |_, receiver, _| bump(receiver, 1)))
        .method(HostMethod::new("bump", [StaticType::Int], StaticType::None, |_, receiver, args| {
            bump(receiver, args.first().and_then(Value::as_int).unwrap_or_default())
        }))
        .method(
            HostMethod::new("describe", [], StaticType::Str, |_, _, _| Ok(Value::str("counts things")))
                .statically(),
        )
        .property(HostProperty::read_only("count", StaticType::Int, |_, receiver| {
            Ok(Value::Int(tally_count(receiver)?))
        }))
}

#[test]
fn host_reads_and_writes_module_globals() {
    let rt = interpreter();
    let module = rt.run_source("settings", "limit = 10\nnames = ['a']").expect("run");
    assert_eq!(module.get("limit"), Some(Value::Int(10)));

    module.set("limit", Value::Int(25));
    let doubled = rt.eval_snippet(&module, "names.append('b')\nlimit * 2").expect("eval");
    assert_eq!(doubled, Value::Int(50));
    assert_eq!(
        module.get("names"),
        Some(Value::list(vec![Value::str("a"), Value::str("b")]))
    );
}

#[test]
fn host_calls_script_functions() {
    let rt = interpreter();
    let source = indoc! {"
        def describe(name, count=1):
            return f'{count} x {name}'
    "};
    let module = rt.run_source("shop", source).expect("run");
    let one = rt
        .call_function(&module, "describe", vec![Value::str("apple")])
        .expect("call");
    assert_eq!(one, Value::str("1 x apple"));
    let many = rt
        .call_function(&module, "describe", vec![Value::str("pear"), Value::Int(3)])
        .expect("call");
    assert_eq!(many, Value::str("3 x pear"));
}

#[test]
fn native_extensions_attach_to_builtin_types() {
    let rt = interpreter();
    rt.register_native_extension(TypeKey::named("int"), "clamp_to", |_, args| {
        let (Some(value), Some(limit)) = (
            args.first().and_then(Value::as_int),
            args.get(1).and_then(Value::as_int),
        ) else {
            return Err(RuntimeError::type_error("clamp_to(limit) expects ints"));
        };
        Ok(Value::Int(value.min(limit)))
    });
    let module = rt.run_source("demo", "small = (5).clamp_to(9)\nbig = (50).clamp_to(9)").expect("run");
    assert_eq!(module.get("small"), Some(Value::Int(5)));
    assert_eq!(module.get("big"), Some(Value::Int(9)));
}

#[test]
fn registered_host_types_resolve_overloads() {
    let rt = interpreter();
    rt.register_host_type(tally_type());
    let source = indoc! {"
        tally = Tally(3)
        tally.bump()
        tally.bump(10)
        seen = tally.count
        about = Tally.describe()

        def typed_bump(t: Tally, by: int) -> int:
            t.bump(by)
            return t.count
    "};
    let module = rt.run_source("tallies", source).expect("run");
    assert_eq!(module.get("seen"), Some(Value::Int(14)));
    assert_eq!(module.get("about"), Some(Value::str("counts things")));
    assert_eq!(rt.eval_snippet(&module, "typed_bump(tally, 6)").expect("eval"), Value::Int(20));

    let error = rt.eval_snippet(&module, "tally.bump('x')").expect_err("no overload");
    assert!(error.to_string().contains("bump"), "{error}");
}

#[test]
fn recursion_is_bounded_by_the_configured_depth() {
    let config = Config {
        max_call_depth: 25,
        ..Config::captured()
    };
    let rt = Interpreter::new(config).expect("interpreter");
    let source = indoc! {"
        def down(n):
            return down(n + 1)

        down(0)
    "};
    let error = rt.run_source("deep", source).expect_err("too deep");
    assert!(error.to_string().starts_with("RecursionError"), "{error}");
}

#[test]
fn output_is_captured_per_interpreter() {
    let first = interpreter();
    let second = interpreter();
    first.run_source("a", "print('from first')").expect("run");
    second.run_source("b", "print('from second', end='')").expect("run");
    assert_eq!(first.take_output(), "from first\n");
    assert_eq!(second.take_output(), "from second");
    assert_eq!(first.take_output(), "");
}

#[test]
fn custom_loaders_supply_modules() {
    let loader = MemoryLoader::new().with_module("config.defaults", "PORT = 8080\n_private = 1");
    let rt = interpreter().with_loader(loader);
    let module = rt
        .run_source("app", "from config.defaults import *\nport = PORT + 1")
        .expect("run");
    assert_eq!(module.get("port"), Some(Value::Int(8081)));
    assert!(!module.contains("_private"));
}

#[test]
fn errors_report_their_stage() {
    let rt = interpreter();
    let syntax = rt.run_source("bad", "x = (1,").expect_err("syntax");
    assert!(syntax.is_syntax_error());

    let runtime = rt.run_source("bad", "x = 1 / 0").expect_err("runtime");
    assert!(!runtime.is_syntax_error());
    assert_eq!(runtime.to_string(), "ZeroDivisionError: division by zero");
    assert!(runtime.report().ends_with("at <module>, line 1"), "{}", runtime.report());
}

#[test]
fn modules_share_one_prelude() {
    let rt = interpreter();
    let first = rt.run_source("first", "x = 1").expect("run");
    let second = rt.run_source("second", "x = 2").expect("run");
    assert_eq!(first.get("x"), Some(Value::Int(1)));
    assert_eq!(second.get("x"), Some(Value::Int(2)));
    assert!(matches!(first.get("str"), Some(Value::Type(_))));
    assert!(matches!(second.get("StringBuilder"), Some(Value::Type(_))));
    assert!(matches!(
        (first.get("ValueError"), second.get("ValueError")),
        (Some(Value::Class(a)), Some(Value::Class(b))) if Rc::ptr_eq(&a, &b)
    ));
}
