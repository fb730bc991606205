use std::cell::RefCell;
use std::rc::Rc;

use strangelybrown_bytecode::model::descriptor::FieldType;
use strangelybrown_bytecode::proxy::{
    self, ConstructorSpec, HandlerContract, MethodSpec, ProxySpec, DEFAULT_HANDLER_INTERFACE,
};
use strangelybrown_bytecode::vm::{self, ClassLoader, Value};

const HANDLER_CONSTRUCTOR: &str = "(Lstrangelybrown/bytecode/InvocationHandler;)V";

fn define(spec: &ProxySpec) -> ClassLoader {
    let mut loader = ClassLoader::new();
    loader.define_class(&proxy::generate_bytes(spec).unwrap()).unwrap();
    loader
}

fn handled(name: &str, methods: Vec<MethodSpec>) -> ProxySpec {
    methods.into_iter().fold(
        ProxySpec::new(name)
            .implements("java/util/function/Supplier")
            .handler(HandlerContract::default()),
        ProxySpec::method,
    )
}

#[test]
fn supplier_returns_what_the_handler_returns() {
    let spec = handled(
        "StringSupplier",
        vec![MethodSpec::handled("get", "()Ljava/lang/Object;")],
    );
    let loader = define(&spec);
    let handler = Value::handler(DEFAULT_HANDLER_INTERFACE, |_: &Value, _: &str, _: &[Value]| {
        Value::string("Stuff")
    });
    let supplier = loader.new_instance("StringSupplier", HANDLER_CONSTRUCTOR, vec![handler]).unwrap();

    assert!(loader.is_instance(&supplier, "java/util/function/Supplier"));
    let result = loader.invoke_virtual(&supplier, "get", "()Ljava/lang/Object;", vec![]).unwrap();
    assert_eq!(result.unwrap().as_str(), Some("Stuff"));
}

#[test]
fn supplier_returning_a_captured_field() {
    let spec = ProxySpec::new("FixedSupplier")
        .implements("java/util/function/Supplier")
        .capture("value", FieldType::object("java/lang/String"))
        .constructor(ConstructorSpec::forwarding(vec![], vec!["value"]))
        .method(MethodSpec::returning_field("get", "()Ljava/lang/Object;", "value"));
    let loader = define(&spec);
    let supplier = loader
        .new_instance("FixedSupplier", "(Ljava/lang/String;)V", vec![Value::string("Stuff")])
        .unwrap();
    let result = loader.invoke_virtual(&supplier, "get", "()Ljava/lang/Object;", vec![]).unwrap();
    assert_eq!(result.unwrap().as_str(), Some("Stuff"));
}

#[test]
fn handler_sees_the_proxy_the_method_and_boxed_arguments() {
    let spec = handled(
        "Recorder",
        vec![MethodSpec::handled("record", "(IJLjava/lang/String;)V")],
    );
    let loader = define(&spec);
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&calls);
    let handler = Value::handler(
        DEFAULT_HANDLER_INTERFACE,
        move |proxy: &Value, method: &str, args: &[Value]| {
            let args: Vec<String> = args.iter().map(|arg| format!("{}:{}", arg.class_name(), arg)).collect();
            seen.borrow_mut().push((proxy.class_name(), method.to_owned(), args));
            Value::NullReference
        },
    );
    let recorder = loader.new_instance("Recorder", HANDLER_CONSTRUCTOR, vec![handler]).unwrap();
    let result = loader
        .invoke_virtual(
            &recorder,
            "record",
            "(IJLjava/lang/String;)V",
            vec![Value::Int(7), Value::Long(1 << 33), Value::string("x")],
        )
        .unwrap();
    assert!(result.is_none());

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let (ref proxy, ref method, ref args) = calls[0];
    assert_eq!(proxy, "Recorder");
    assert_eq!(method, "record(IJLjava/lang/String;)V");
    assert_eq!(
        *args,
        vec![
            "java/lang/Integer:7".to_owned(),
            "java/lang/Long:8589934592".to_owned(),
            "java/lang/String:x".to_owned(),
        ]
    );
}

#[test]
fn primitive_results_are_unboxed_with_coercion() {
    let spec = handled(
        "Numbers",
        vec![
            MethodSpec::handled("getAsInt", "()I"),
            MethodSpec::handled("getAsLong", "()J"),
            MethodSpec::handled("getAsBoolean", "()Z"),
        ],
    );
    let loader = define(&spec);
    let handler = Value::handler(DEFAULT_HANDLER_INTERFACE, |_: &Value, method: &str, _: &[Value]| {
        match method {
            "getAsBoolean()Z" => Value::boxed("java/lang/Boolean", Value::Int(1)),
            // an Integer serves a long return too
            _ => Value::boxed("java/lang/Integer", Value::Int(42)),
        }
    });
    let numbers = loader.new_instance("Numbers", HANDLER_CONSTRUCTOR, vec![handler]).unwrap();

    let int = loader.invoke_virtual(&numbers, "getAsInt", "()I", vec![]).unwrap();
    assert_eq!(int.and_then(|value| value.as_int()), Some(42));
    let long = loader.invoke_virtual(&numbers, "getAsLong", "()J", vec![]).unwrap();
    assert_eq!(long.and_then(|value| value.as_long()), Some(42));
    let flag = loader.invoke_virtual(&numbers, "getAsBoolean", "()Z", vec![]).unwrap();
    assert_eq!(flag.and_then(|value| value.as_int()), Some(1));
}

#[test]
fn wrong_result_types_fail_the_cast() {
    let spec = handled("Strings", vec![MethodSpec::handled("name", "()Ljava/lang/String;")]);
    let loader = define(&spec);
    let handler = Value::handler(DEFAULT_HANDLER_INTERFACE, |_: &Value, _: &str, _: &[Value]| {
        Value::boxed("java/lang/Integer", Value::Int(1))
    });
    let strings = loader.new_instance("Strings", HANDLER_CONSTRUCTOR, vec![handler]).unwrap();
    match loader.invoke_virtual(&strings, "name", "()Ljava/lang/String;", vec![]) {
        Err(vm::Error::ClassCast { from, to }) => {
            assert_eq!(from, "java/lang/Integer");
            assert_eq!(to, "java/lang/String");
        }
        other => panic!("expected a class cast failure, got {:?}", other),
    }
}
