//! Generates classes that implement interfaces, or extend a superclass, by handing their work to
//! an invocation handler or to caller-assembled code.
//!
//! A `ProxySpec` names the class to produce, the state it captures through its constructors and
//! the methods it implements. `generate` turns it into a `ClassFile` with a `ClassBuilder`.
//!
//! ```
//! use strangelybrown_bytecode::proxy::{self, MethodSpec, ProxySpec};
//!
//! let spec = ProxySpec::new("pkg/StringSupplier")
//!     .implements("java/util/function/Supplier")
//!     .handler(Default::default())
//!     .method(MethodSpec::handled("get", "()Ljava/lang/Object;"));
//! let class = proxy::generate(&spec).unwrap();
//! assert!(class.find_field("handler").is_some());
//! ```

pub mod boxing;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::assembler::CodeBuilder;
use crate::builder::ClassBuilder;
use crate::error::{Error, Result};
use crate::model::class_file::access_flags::is_set;
use crate::model::class_file::constant_pool::Literal;
use crate::model::class_file::{field_access_flags, method_access_flags, ClassFile};
use crate::model::descriptor::{DescriptorCache, FieldType, MethodDescriptor};
use crate::writer::write_class_file;

use self::boxing::{box_value, unbox_value, OBJECT};

pub const DEFAULT_HANDLER_INTERFACE: &str = "strangelybrown/bytecode/InvocationHandler";
pub const DEFAULT_HANDLER_METHOD: &str = "invoke";
pub const DEFAULT_HANDLER_FIELD: &str = "handler";

/// `(proxy, method identifier, arguments) -> result`
pub const HANDLER_DESCRIPTOR: &str =
    "(Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;";

const CONSTRUCTOR: &str = "<init>";
const CLASS_INITIALIZER: &str = "<clinit>";
const STRING: &str = "java/lang/String";

/// The interface generated methods call into, and the field holding the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerContract {
    pub interface: String,
    pub method: String,
    pub field: String,
}

impl Default for HandlerContract {
    fn default() -> Self {
        HandlerContract {
            interface: DEFAULT_HANDLER_INTERFACE.to_owned(),
            method: DEFAULT_HANDLER_METHOD.to_owned(),
            field: DEFAULT_HANDLER_FIELD.to_owned(),
        }
    }
}

impl HandlerContract {
    fn field_type(&self) -> FieldType {
        FieldType::object(&self.interface)
    }
}

/// A value passed by a delegating constructor to its sibling.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// One of the delegating constructor's own parameters.
    Parameter(usize),
    Literal(Literal),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
enum ConstructorKind {
    Forwarding { super_params: Vec<FieldType>, captures: Vec<String> },
    Delegating { params: Vec<FieldType>, target: Vec<FieldType>, arguments: Vec<Argument> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorSpec {
    kind: ConstructorKind,
    access_flags: method_access_flags::t,
}

impl ConstructorSpec {
    /// A constructor taking `super_params` followed by one parameter per captured field. It
    /// passes the leading parameters to the superclass constructor, then stores the rest.
    pub fn forwarding(super_params: Vec<FieldType>, captures: Vec<&str>) -> Self {
        ConstructorSpec {
            kind: ConstructorKind::Forwarding {
                super_params,
                captures: captures.into_iter().map(str::to_owned).collect(),
            },
            access_flags: method_access_flags::ACC_PUBLIC,
        }
    }

    /// A constructor taking `params` that calls the sibling constructor whose parameters are
    /// `target`, passing `arguments`. Without a loaded class hierarchy, a parameter is accepted
    /// for a target of the same type, `java/lang/Object`, or a supertype of a `java/lang` value
    /// class such as `CharSequence` for `String`; anything else is `UnsupportedConstruct`.
    pub fn delegating(
        params: Vec<FieldType>,
        target: Vec<FieldType>,
        arguments: Vec<Argument>,
    ) -> Self {
        ConstructorSpec {
            kind: ConstructorKind::Delegating { params, target, arguments },
            access_flags: method_access_flags::ACC_PUBLIC,
        }
    }

    pub fn access(mut self, access_flags: method_access_flags::t) -> Self {
        self.access_flags = access_flags;
        self
    }
}

type Assembler = Box<dyn Fn(&mut CodeBuilder<'_>) -> Result<()>>;

pub enum MethodBody {
    /// Calls the handler with the boxed arguments and adapts what it returns.
    Handler,
    /// Returns the named captured field.
    ReturnField(String),
    Assembled(Assembler),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MethodBody::Handler => write!(f, "Handler"),
            MethodBody::ReturnField(ref field) => write!(f, "ReturnField({:?})", field),
            MethodBody::Assembled(_) => write!(f, "Assembled(..)"),
        }
    }
}

#[derive(Debug)]
pub struct MethodSpec {
    name: String,
    descriptor: String,
    access_flags: method_access_flags::t,
    body: MethodBody,
}

impl MethodSpec {
    fn new(name: &str, descriptor: &str, body: MethodBody) -> Self {
        MethodSpec {
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            access_flags: method_access_flags::ACC_PUBLIC,
            body,
        }
    }

    pub fn handled(name: &str, descriptor: &str) -> Self {
        MethodSpec::new(name, descriptor, MethodBody::Handler)
    }

    pub fn returning_field(name: &str, descriptor: &str, field: &str) -> Self {
        MethodSpec::new(name, descriptor, MethodBody::ReturnField(field.to_owned()))
    }

    pub fn assembled<F>(name: &str, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut CodeBuilder<'_>) -> Result<()> + 'static,
    {
        MethodSpec::new(name, descriptor, MethodBody::Assembled(Box::new(body)))
    }

    pub fn access(mut self, access_flags: method_access_flags::t) -> Self {
        self.access_flags = access_flags;
        self
    }
}

/// Everything `generate` needs to know about the class to produce.
#[derive(Debug)]
pub struct ProxySpec {
    name: String,
    super_name: String,
    interfaces: Vec<String>,
    captures: Vec<(String, FieldType)>,
    constructors: Vec<ConstructorSpec>,
    methods: Vec<MethodSpec>,
    handler: Option<HandlerContract>,
    version: (u16, u16),
    source_file: Option<String>,
    descriptors: Option<Arc<DescriptorCache>>,
}

impl ProxySpec {
    pub fn new(name: &str) -> Self {
        ProxySpec {
            name: name.replace('.', "/"),
            super_name: OBJECT.to_owned(),
            interfaces: Vec::new(),
            captures: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            handler: None,
            version: (crate::builder::DEFAULT_MAJOR_VERSION, 0),
            source_file: None,
            descriptors: None,
        }
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.super_name = name.replace('.', "/");
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(name.replace('.', "/"));
        self
    }

    /// Declares a private final field for constructors to fill.
    pub fn capture(mut self, name: &str, field_type: FieldType) -> Self {
        self.captures.push((name.to_owned(), field_type));
        self
    }

    pub fn constructor(mut self, constructor: ConstructorSpec) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Routes `MethodBody::Handler` methods through `contract`. Every constructor then takes the
    /// handler as its first parameter.
    pub fn handler(mut self, contract: HandlerContract) -> Self {
        self.handler = Some(contract);
        self
    }

    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.version = (major, minor);
        self
    }

    pub fn source_file(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_owned());
        self
    }

    pub fn descriptor_cache(mut self, descriptors: Arc<DescriptorCache>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn capture_type(&self, name: &str) -> Result<&FieldType> {
        self.captures
            .iter()
            .find(|&&(ref capture, _)| capture == name)
            .map(|&(_, ref field_type)| field_type)
            .ok_or_else(|| {
                Error::UnsupportedConstruct(format!("{} captures no field {:?}", self.name, name))
            })
    }

    /// The parameters a constructor actually declares, handler first.
    fn declared_params(&self, params: &[FieldType]) -> Vec<FieldType> {
        self.handler
            .iter()
            .map(HandlerContract::field_type)
            .chain(params.iter().cloned())
            .collect()
    }

    fn constructor_params(&self, constructor: &ConstructorSpec) -> Result<Vec<FieldType>> {
        let params = match constructor.kind {
            ConstructorKind::Forwarding { ref super_params, ref captures } => {
                let mut params = super_params.clone();
                for capture in captures {
                    params.push(self.capture_type(capture)?.clone());
                }
                params
            }
            ConstructorKind::Delegating { ref params, .. } => params.clone(),
        };
        Ok(self.declared_params(&params))
    }
}

fn constructor_descriptor(params: &[FieldType]) -> String {
    MethodDescriptor::new(params.to_vec(), None).descriptor()
}

/// Supertypes of the `java/lang` value classes. No class hierarchy is loaded while generating,
/// so these are the only subtype relations known besides `java/lang/Object`.
fn known_supertypes(class: &str) -> &'static [&'static str] {
    match class {
        STRING => &["java/lang/CharSequence", "java/lang/Comparable", "java/io/Serializable"],
        "java/lang/Byte" | "java/lang/Short" | "java/lang/Integer" | "java/lang/Long"
        | "java/lang/Float" | "java/lang/Double" => {
            &["java/lang/Number", "java/lang/Comparable", "java/io/Serializable"]
        }
        "java/lang/Number" => &["java/io/Serializable"],
        "java/lang/Boolean" | "java/lang/Character" => {
            &["java/lang/Comparable", "java/io/Serializable"]
        }
        _ => &[],
    }
}

/// Whether a value of type `from` may be passed where `to` is expected: the same type, any
/// reference as `java/lang/Object`, arrays as `Cloneable` or `Serializable`, and the value
/// classes as their known supertypes.
fn assignable(from: &FieldType, to: &FieldType) -> bool {
    match (from, to) {
        (_, &FieldType::Object(ref to)) if from.is_reference() && to == OBJECT => true,
        (&FieldType::Object(ref from), &FieldType::Object(ref to)) => {
            from == to || known_supertypes(from).contains(&to.as_str())
        }
        (&FieldType::Array(_), &FieldType::Object(ref to)) => {
            to == "java/lang/Cloneable" || to == "java/io/Serializable"
        }
        _ => from == to,
    }
}

fn literal_fits(literal: &Literal, to: &FieldType) -> bool {
    match (literal, to) {
        (&Literal::Int(_), _) => is_int_like(to),
        (&Literal::Long(_), &FieldType::Long)
        | (&Literal::Float(_), &FieldType::Float)
        | (&Literal::Double(_), &FieldType::Double) => true,
        (&Literal::String(_), _) => assignable(&FieldType::object(STRING), to),
        _ => false,
    }
}

/// Types an int constant can initialize.
fn is_int_like(field_type: &FieldType) -> bool {
    match *field_type {
        FieldType::Boolean | FieldType::Byte | FieldType::Char | FieldType::Short | FieldType::Int => {
            true
        }
        _ => false,
    }
}

/// Builds the class described by `spec`.
pub fn generate(spec: &ProxySpec) -> Result<ClassFile> {
    debug!(
        "generating {} extending {} implementing {:?}",
        spec.name, spec.super_name, spec.interfaces
    );
    let mut builder = ClassBuilder::new(&spec.name)
        .super_class(&spec.super_name)
        .version(spec.version.0, spec.version.1)
        .default_constructor(false);
    if let Some(ref descriptors) = spec.descriptors {
        builder = builder.with_descriptor_cache(Arc::clone(descriptors));
    }
    for interface in &spec.interfaces {
        builder = builder.implements(interface);
    }
    if let Some(ref file) = spec.source_file {
        builder = builder.source_file(file);
    }

    let private_final = field_access_flags::ACC_PRIVATE | field_access_flags::ACC_FINAL;
    if let Some(ref contract) = spec.handler {
        if spec.captures.iter().any(|&(ref name, _)| *name == contract.field) {
            return Err(Error::UnsupportedConstruct(format!(
                "captured field {:?} clashes with the handler field",
                contract.field
            )));
        }
        builder.field(private_final, &contract.field, &contract.field_type())?;
    }
    let mut captured = HashSet::new();
    for &(ref name, ref field_type) in &spec.captures {
        if !captured.insert(name.as_str()) {
            return Err(Error::UnsupportedConstruct(format!("field {:?} captured twice", name)));
        }
        builder.field(private_final, name, field_type)?;
    }

    generate_constructors(spec, &mut builder)?;

    let mut seen = HashSet::new();
    for method in &spec.methods {
        if !seen.insert((method.name.as_str(), method.descriptor.as_str())) {
            return Err(Error::UnsupportedConstruct(format!(
                "method {}{} declared twice",
                method.name, method.descriptor
            )));
        }
        generate_method(spec, &mut builder, method)?;
    }
    builder.build()
}

/// `generate`, then the class file bytes.
pub fn generate_bytes(spec: &ProxySpec) -> Result<Vec<u8>> {
    write_class_file(&generate(spec)?)
}

fn generate_constructors(spec: &ProxySpec, builder: &mut ClassBuilder) -> Result<()> {
    let default = [ConstructorSpec::forwarding(Vec::new(), Vec::new())];
    let constructors = if spec.constructors.is_empty() {
        &default[..]
    } else {
        &spec.constructors[..]
    };

    // check every signature before emitting anything, so delegation targets can be resolved
    let mut signatures = HashMap::new();
    for (index, constructor) in constructors.iter().enumerate() {
        let descriptor = constructor_descriptor(&spec.constructor_params(constructor)?);
        if signatures.insert(descriptor.clone(), index).is_some() {
            return Err(Error::UnsupportedConstruct(format!(
                "constructor {} declared twice",
                descriptor
            )));
        }
    }
    for (index, constructor) in constructors.iter().enumerate() {
        check_delegation(spec, constructors, &signatures, index)?;
        let params = spec.constructor_params(constructor)?;
        let descriptor = constructor_descriptor(&params);
        trace!("{}: constructor {}", spec.name, descriptor);
        let access_flags = constructor.access_flags;
        builder
            .method(CONSTRUCTOR, &descriptor)
            .access(access_flags)
            .code(|c| match constructor.kind {
                ConstructorKind::Forwarding { ref super_params, ref captures } => {
                    forwarding_body(spec, c, super_params, captures)
                }
                ConstructorKind::Delegating { ref params, ref target, ref arguments } => {
                    delegating_body(spec, c, params, target, arguments)
                }
            })?;
    }
    Ok(())
}

/// Follows the delegation chain starting at constructor `start`, rejecting chains that lead to
/// a missing constructor or back to one already visited.
fn check_delegation(
    spec: &ProxySpec,
    constructors: &[ConstructorSpec],
    signatures: &HashMap<String, usize>,
    start: usize,
) -> Result<()> {
    let mut visited = HashSet::new();
    let mut current = start;
    while let ConstructorKind::Delegating { ref target, .. } = constructors[current].kind {
        visited.insert(current);
        let descriptor = constructor_descriptor(&spec.declared_params(target));
        current = match signatures.get(&descriptor) {
            Some(&next) => next,
            None => {
                return Err(Error::UnsupportedConstruct(format!(
                    "{} delegates to missing constructor {}",
                    spec.name, descriptor
                )))
            }
        };
        if visited.contains(&current) {
            return Err(Error::UnsupportedConstruct(format!(
                "constructor delegation in {} loops back to {}",
                spec.name, descriptor
            )));
        }
    }
    Ok(())
}

fn forwarding_body(
    spec: &ProxySpec,
    c: &mut CodeBuilder<'_>,
    super_params: &[FieldType],
    captures: &[String],
) -> Result<()> {
    let first = if spec.handler.is_some() { 1 } else { 0 };
    c.load_this()?;
    for index in first..first + super_params.len() {
        c.load_param(index)?;
    }
    c.invoke_special(&spec.super_name, CONSTRUCTOR, &constructor_descriptor(super_params))?;
    if let Some(ref contract) = spec.handler {
        c.load_this()?.load_param(0)?;
        c.put_field(&spec.name, &contract.field, &contract.field_type())?;
    }
    for (offset, capture) in captures.iter().enumerate() {
        let field_type = spec.capture_type(capture)?;
        c.load_this()?.load_param(first + super_params.len() + offset)?;
        c.put_field(&spec.name, capture, field_type)?;
    }
    c.emit_return();
    Ok(())
}

fn delegating_body(
    spec: &ProxySpec,
    c: &mut CodeBuilder<'_>,
    params: &[FieldType],
    target: &[FieldType],
    arguments: &[Argument],
) -> Result<()> {
    if arguments.len() != target.len() {
        return Err(Error::UnsupportedConstruct(format!(
            "{} arguments for a constructor taking {}",
            arguments.len(),
            target.len()
        )));
    }
    let first = if spec.handler.is_some() { 1 } else { 0 };
    c.load_this()?;
    if spec.handler.is_some() {
        c.load_param(0)?;
    }
    for (argument, to) in arguments.iter().zip(target) {
        let fits = match *argument {
            Argument::Parameter(index) => match params.get(index) {
                Some(from) if assignable(from, to) => {
                    c.load_param(first + index)?;
                    true
                }
                _ => false,
            },
            Argument::Literal(ref literal) if literal_fits(literal, to) => {
                c.push_literal(literal)?;
                true
            }
            Argument::Null if to.is_reference() => {
                c.push_null();
                true
            }
            _ => false,
        };
        if !fits {
            return Err(Error::UnsupportedConstruct(format!(
                "argument {:?} cannot be passed as {}",
                argument, to
            )));
        }
    }
    let descriptor = constructor_descriptor(&spec.declared_params(target));
    c.invoke_special(&spec.name, CONSTRUCTOR, &descriptor)?;
    c.emit_return();
    Ok(())
}

fn generate_method(spec: &ProxySpec, builder: &mut ClassBuilder, method: &MethodSpec) -> Result<()> {
    if method.name == CONSTRUCTOR || method.name == CLASS_INITIALIZER {
        return Err(Error::UnsupportedConstruct(format!(
            "{} is not an ordinary method; declare constructors with ConstructorSpec",
            method.name
        )));
    }
    if is_set(method.access_flags, method_access_flags::ACC_BRIDGE) {
        return Err(Error::UnsupportedConstruct(format!(
            "bridge method {}{}",
            method.name, method.descriptor
        )));
    }
    let is_static = is_set(method.access_flags, method_access_flags::ACC_STATIC);
    trace!("{}: method {}{} ({:?})", spec.name, method.name, method.descriptor, method.body);
    let method_builder = builder.method(&method.name, &method.descriptor).access(method.access_flags);
    match method.body {
        MethodBody::Handler => {
            let contract = match spec.handler {
                Some(ref contract) if !is_static => contract,
                Some(_) => {
                    return Err(Error::UnsupportedConstruct(format!(
                        "static method {} cannot reach the handler",
                        method.name
                    )))
                }
                None => {
                    return Err(Error::UnsupportedConstruct(format!(
                        "method {} needs a handler contract",
                        method.name
                    )))
                }
            };
            method_builder.code(|c| handler_body(spec, contract, c, &method.name))
        }
        MethodBody::ReturnField(ref field) => {
            if is_static {
                return Err(Error::UnsupportedConstruct(format!(
                    "static method {} cannot read instance field {}",
                    method.name, field
                )));
            }
            let field_type = spec.capture_type(field)?;
            method_builder.code(|c| {
                let fits = match c.descriptor().return_type {
                    Some(ref return_type) => assignable(field_type, return_type),
                    None => false,
                };
                if !fits {
                    return Err(Error::UnsupportedConstruct(format!(
                        "field {} of type {} cannot be returned by {}",
                        field,
                        field_type,
                        c.descriptor()
                    )));
                }
                c.load_this()?.get_field(&spec.name, field, field_type)?;
                c.emit_return();
                Ok(())
            })
        }
        MethodBody::Assembled(ref body) => method_builder.code(|c| body(c)),
    }
}

fn handler_body(
    spec: &ProxySpec,
    contract: &HandlerContract,
    c: &mut CodeBuilder<'_>,
    name: &str,
) -> Result<()> {
    let descriptor = c.descriptor().clone();
    let object = FieldType::object(OBJECT);

    c.load_this()?.get_field(&spec.name, &contract.field, &contract.field_type())?;
    c.load_this()?;
    c.push_string(&format!("{}{}", name, descriptor))?;
    c.push_int(descriptor.params.len() as i32)?.new_array(&object)?;
    for (index, param) in descriptor.params.iter().enumerate() {
        c.dup().push_int(index as i32)?.load_param(index)?;
        box_value(c, param)?;
        c.array_store(&object);
    }
    c.invoke_interface(&contract.interface, &contract.method, HANDLER_DESCRIPTOR)?;
    match descriptor.return_type {
        None => {
            c.pop();
        }
        Some(ref return_type) => unbox_value(c, return_type)?,
    }
    c.emit_return();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::opcode;
    use crate::model::class_file::ConstantPoolInfo;
    use crate::parser::parse_class_file;

    fn string() -> FieldType {
        FieldType::object(STRING)
    }

    fn greeter() -> ProxySpec {
        ProxySpec::new("Greeter")
            .capture("greeting", string())
            .constructor(ConstructorSpec::forwarding(vec![], vec!["greeting"]))
            .constructor(ConstructorSpec::delegating(
                vec![],
                vec![string()],
                vec![Argument::Literal(Literal::String("Hello".to_owned()))],
            ))
    }

    #[test]
    fn delegating_constructor_calls_its_sibling() {
        let class = generate(&greeter()).unwrap();
        let code = class.find_method("<init>", "()V").unwrap().code().unwrap();
        let pool = &class.constant_pool;
        assert_eq!(code.code[0], opcode::ALOAD_0);
        assert_eq!(code.code[1], opcode::LDC);
        assert_eq!(pool.literal_at(code.code[2] as u16), Some(Literal::String("Hello".to_owned())));
        assert_eq!(code.code[3], opcode::INVOKESPECIAL);
        let target = pool.member_ref_at(u16::from(code.code[4]) << 8 | u16::from(code.code[5]));
        let target = target.unwrap();
        assert_eq!(target.owner, "Greeter");
        assert_eq!(target.descriptor, "(Ljava/lang/String;)V");
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn forwarding_constructor_stores_captures() {
        let class = generate(&greeter()).unwrap();
        let field = class.find_field("greeting").unwrap();
        assert_eq!(field.access_flags, 0x0012);
        let code = class.find_method("<init>", "(Ljava/lang/String;)V").unwrap().code().unwrap();
        assert_eq!(code.code[4], opcode::ALOAD_0);
        assert_eq!(code.code[5], opcode::ALOAD_1);
        assert_eq!(code.code[6], opcode::PUTFIELD);
        assert_eq!(code.max_locals, 2);
    }

    #[test]
    fn default_constructor_without_constructors() {
        let class = generate(&ProxySpec::new("Plain")).unwrap();
        assert!(class.find_method("<init>", "()V").is_some());
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn handler_constructor_takes_the_handler_first() {
        let spec = ProxySpec::new("Supplied")
            .implements("java/util/function/Supplier")
            .handler(HandlerContract::default())
            .method(MethodSpec::handled("get", "()Ljava/lang/Object;"));
        let class = generate(&spec).unwrap();
        let descriptor = format!("(L{};)V", DEFAULT_HANDLER_INTERFACE);
        assert!(class.find_method("<init>", &descriptor).is_some());
        let get = class.find_method("get", "()Ljava/lang/Object;").unwrap().code().unwrap();
        let invoke = class.constant_pool.find(&ConstantPoolInfo::Utf8 {
            bytes: HANDLER_DESCRIPTOR.as_bytes().to_vec(),
        });
        assert!(invoke.is_some());
        assert_eq!(*get.code.last().unwrap(), opcode::ARETURN);
        assert!(get.code.contains(&opcode::INVOKEINTERFACE));
    }

    #[test]
    fn handler_results_are_unboxed() {
        let spec = ProxySpec::new("Counter")
            .handler(HandlerContract::default())
            .method(MethodSpec::handled("next", "(J)J"))
            .method(MethodSpec::handled("reset", "()V"));
        let class = generate(&spec).unwrap();
        let next = class.find_method("next", "(J)J").unwrap().code().unwrap();
        assert_eq!(next.code[next.code.len() - 1], opcode::LRETURN);
        assert_eq!(next.code[next.code.len() - 4], opcode::INVOKEVIRTUAL);
        let reset = class.find_method("reset", "()V").unwrap().code().unwrap();
        assert_eq!(&reset.code[reset.code.len() - 2..], &[opcode::POP, opcode::RETURN]);
        let bytes = write_class_file(&class).unwrap();
        assert_eq!(parse_class_file(&bytes).unwrap(), class);
    }

    #[test]
    fn returning_field() {
        let spec = ProxySpec::new("Holder")
            .capture("value", string())
            .constructor(ConstructorSpec::forwarding(vec![], vec!["value"]))
            .method(MethodSpec::returning_field("get", "()Ljava/lang/Object;", "value"))
            .method(MethodSpec::returning_field("value", "()Ljava/lang/String;", "value"));
        let class = generate(&spec).unwrap();
        let get = class.find_method("get", "()Ljava/lang/Object;").unwrap().code().unwrap();
        assert_eq!(get.code[0], opcode::ALOAD_0);
        assert_eq!(get.code[1], opcode::GETFIELD);
        assert_eq!(get.code[4], opcode::ARETURN);
    }

    #[test]
    fn returning_field_of_the_wrong_type() {
        let spec = ProxySpec::new("Holder")
            .capture("value", string())
            .method(MethodSpec::returning_field("size", "()I", "value"));
        assert!(matches!(generate(&spec), Err(Error::UnsupportedConstruct(_))));
    }

    fn rejected(spec: ProxySpec) -> bool {
        matches!(generate(&spec), Err(Error::UnsupportedConstruct(_)))
    }

    #[test]
    fn unsupported_requests() {
        assert!(rejected(ProxySpec::new("A").method(MethodSpec::handled("run", "()V"))));
        assert!(rejected(
            ProxySpec::new("B")
                .handler(HandlerContract::default())
                .method(MethodSpec::handled("<init>", "()V"))
        ));
        assert!(rejected(
            ProxySpec::new("C")
                .handler(HandlerContract::default())
                .method(MethodSpec::handled("run", "()V").access(0x0041))
        ));
        assert!(rejected(
            ProxySpec::new("D")
                .handler(HandlerContract::default())
                .method(MethodSpec::handled("run", "()V").access(0x0009))
        ));
        assert!(rejected(
            ProxySpec::new("E").constructor(ConstructorSpec::forwarding(vec![], vec!["missing"]))
        ));
        assert!(rejected(
            ProxySpec::new("F")
                .constructor(ConstructorSpec::forwarding(vec![], vec![]))
                .constructor(ConstructorSpec::forwarding(vec![], vec![]))
        ));
    }

    #[test]
    fn delegation_must_reach_a_real_constructor() {
        let missing = ProxySpec::new("G").constructor(ConstructorSpec::delegating(
            vec![],
            vec![FieldType::Int],
            vec![Argument::Literal(Literal::Int(1))],
        ));
        assert!(rejected(missing));

        let cycle = ProxySpec::new("H")
            .constructor(ConstructorSpec::delegating(
                vec![],
                vec![FieldType::Int],
                vec![Argument::Literal(Literal::Int(1))],
            ))
            .constructor(ConstructorSpec::delegating(
                vec![FieldType::Int],
                vec![],
                vec![],
            ));
        assert!(rejected(cycle));

        let arity = greeter().constructor(ConstructorSpec::delegating(
            vec![FieldType::Int],
            vec![string()],
            vec![Argument::Parameter(0), Argument::Null],
        ));
        assert!(rejected(arity));

        let mismatch = greeter().constructor(ConstructorSpec::delegating(
            vec![FieldType::Int],
            vec![string()],
            vec![Argument::Parameter(0)],
        ));
        assert!(rejected(mismatch));
    }

    #[test]
    fn delegation_accepts_known_supertypes() {
        let char_sequence = FieldType::object("java/lang/CharSequence");
        let named = |param: FieldType, target: FieldType| {
            ProxySpec::new("Named")
                .capture("name", target.clone())
                .constructor(ConstructorSpec::forwarding(vec![], vec!["name"]))
                .constructor(ConstructorSpec::delegating(
                    vec![param],
                    vec![target],
                    vec![Argument::Parameter(0)],
                ))
        };
        assert!(generate(&named(string(), char_sequence.clone())).is_ok());
        assert!(generate(&named(string(), FieldType::object(OBJECT))).is_ok());
        assert!(generate(&named(
            FieldType::object("java/lang/Integer"),
            FieldType::object("java/lang/Number")
        ))
        .is_ok());
        assert!(generate(&named(
            FieldType::array_of(FieldType::Int),
            FieldType::object("java/io/Serializable")
        ))
        .is_ok());
        assert!(rejected(named(char_sequence.clone(), string())));
        assert!(rejected(named(FieldType::object(OBJECT), string())));
        assert!(rejected(named(FieldType::object("a/Thing"), char_sequence.clone())));

        let literal = ProxySpec::new("Named")
            .capture("name", char_sequence.clone())
            .constructor(ConstructorSpec::forwarding(vec![], vec!["name"]))
            .constructor(ConstructorSpec::delegating(
                vec![],
                vec![char_sequence],
                vec![Argument::Literal(Literal::String("anonymous".to_owned()))],
            ));
        assert!(generate(&literal).is_ok());
    }

    #[test]
    fn assembled_bodies() {
        let spec = ProxySpec::new("Answer").method(MethodSpec::assembled("answer", "()I", |c| {
            c.push_int(42)?.emit_return();
            Ok(())
        }));
        let class = generate(&spec).unwrap();
        let code = class.find_method("answer", "()I").unwrap().code().unwrap();
        assert_eq!(code.code, vec![opcode::BIPUSH, 42, opcode::IRETURN]);
    }
}
