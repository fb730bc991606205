use strangelybrown_bytecode::bytecode::opcode;
use strangelybrown_bytecode::model::class_file::constant_pool::Literal;
use strangelybrown_bytecode::model::descriptor::FieldType;
use strangelybrown_bytecode::parser::parse_class_file;
use strangelybrown_bytecode::proxy::{self, Argument, ConstructorSpec, MethodSpec, ProxySpec};
use strangelybrown_bytecode::vm::{ClassLoader, Value};

const STRING_BUILDER: &str = "java/lang/StringBuilder";
const APPEND: &str = "(Ljava/lang/String;)Ljava/lang/StringBuilder;";

fn string() -> FieldType {
    FieldType::object("java/lang/String")
}

/// `Greeter()` is `this("Hello")`, and `greet(name)` is `greeting + " " + name + "!"`.
fn greeter() -> ProxySpec {
    ProxySpec::new("Greeter")
        .source_file("Greeter.java")
        .capture("greeting", string())
        .constructor(ConstructorSpec::forwarding(vec![], vec!["greeting"]))
        .constructor(ConstructorSpec::delegating(
            vec![],
            vec![string()],
            vec![Argument::Literal(Literal::String("Hello".to_owned()))],
        ))
        .method(MethodSpec::assembled("greet", "(Ljava/lang/String;)Ljava/lang/String;", |c| {
            c.new_object(STRING_BUILDER)?.dup();
            c.invoke_special(STRING_BUILDER, "<init>", "()V")?;
            c.load_this()?.get_field("Greeter", "greeting", &string())?;
            c.invoke_virtual(STRING_BUILDER, "append", APPEND)?;
            c.push_string(" ")?.invoke_virtual(STRING_BUILDER, "append", APPEND)?;
            c.load_param(0)?.invoke_virtual(STRING_BUILDER, "append", APPEND)?;
            c.push_string("!")?.invoke_virtual(STRING_BUILDER, "append", APPEND)?;
            c.invoke_virtual(STRING_BUILDER, "toString", "()Ljava/lang/String;")?;
            c.emit_return();
            Ok(())
        }))
}

fn load() -> ClassLoader {
    let mut loader = ClassLoader::new();
    loader.define_class(&proxy::generate_bytes(&greeter()).unwrap()).unwrap();
    loader
}

#[test]
fn default_constructor_delegates_to_its_sibling() {
    let class = parse_class_file(&proxy::generate_bytes(&greeter()).unwrap()).unwrap();
    let pool = &class.constant_pool;
    let code = class.find_method("<init>", "()V").unwrap().code().unwrap();

    let invoke = code.code.iter().position(|&op| op == opcode::INVOKESPECIAL).unwrap();
    let index = u16::from(code.code[invoke + 1]) << 8 | u16::from(code.code[invoke + 2]);
    let target = pool.member_ref_at(index).unwrap();
    assert_eq!(target.owner, "Greeter");
    assert_eq!(target.name, "<init>");
    assert_eq!(target.descriptor, "(Ljava/lang/String;)V");
}

#[test]
fn both_constructors_leave_the_same_state() {
    let loader = load();
    let defaulted = loader.new_instance("Greeter", "()V", vec![]).unwrap();
    let explicit = loader
        .new_instance("Greeter", "(Ljava/lang/String;)V", vec![Value::string("Hello")])
        .unwrap();

    let greeting = loader.get_field(&defaulted, "greeting").unwrap();
    assert_eq!(greeting.as_str(), Some("Hello"));
    assert_eq!(
        greeting.as_str(),
        loader.get_field(&explicit, "greeting").unwrap().as_str()
    );
}

#[test]
fn greets_by_name() {
    let loader = load();
    let greeter = loader.new_instance("Greeter", "()V", vec![]).unwrap();
    let greeting = loader
        .invoke_virtual(
            &greeter,
            "greet",
            "(Ljava/lang/String;)Ljava/lang/String;",
            vec![Value::string("Butch")],
        )
        .unwrap()
        .unwrap();
    assert_eq!(greeting.as_str(), Some("Hello Butch!"));

    let other = loader
        .new_instance("Greeter", "(Ljava/lang/String;)V", vec![Value::string("Howdy")])
        .unwrap();
    let greeting = loader
        .invoke_virtual(
            &other,
            "greet",
            "(Ljava/lang/String;)Ljava/lang/String;",
            vec![Value::string("Sundance")],
        )
        .unwrap()
        .unwrap();
    assert_eq!(greeting.as_str(), Some("Howdy Sundance!"));
}
