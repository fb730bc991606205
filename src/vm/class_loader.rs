use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::model::descriptor::DescriptorCache;
use crate::parser::class_file::parse_class_file;
use crate::proxy::HANDLER_DESCRIPTOR;
use crate::vm::class::{Class, Method, OBJECT};
use crate::vm::frame::Frame;
use crate::vm::native;
use crate::vm::value::{Object, Value};
use crate::vm::Error;

/// Defines classes from their class file bytes and runs their methods.
#[derive(Debug)]
pub struct ClassLoader {
    classes: HashMap<String, Rc<Class>>,
    descriptors: Arc<DescriptorCache>,
}

impl Default for ClassLoader {
    fn default() -> Self {
        ClassLoader::new()
    }
}

impl ClassLoader {
    pub fn new() -> Self {
        ClassLoader::with_descriptor_cache(Arc::new(DescriptorCache::new()))
    }

    /// A loader sharing parsed method descriptors with the code that generated its classes.
    pub fn with_descriptor_cache(descriptors: Arc<DescriptorCache>) -> Self {
        let mut classes = HashMap::new();
        classes.insert(OBJECT.to_owned(), Rc::new(Class::object()));
        ClassLoader { classes, descriptors }
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    /// Parses `bytes` and defines the class they hold. The superclass must already be defined.
    pub fn define_class(&mut self, bytes: &[u8]) -> Result<Rc<Class>, Error> {
        let class_file = parse_class_file(bytes)?;
        let name = class_file
            .name()
            .ok_or_else(|| Error::Verify("unresolvable class name".to_owned()))?;
        if self.classes.contains_key(&name) {
            return Err(Error::DuplicateClass(name));
        }
        let superclass = match class_file.super_name() {
            Some(super_name) => Some(self.resolve_class(&super_name)?),
            None => return Err(Error::Verify(format!("{} has no superclass", name))),
        };
        let class = Rc::new(Class::new(class_file, superclass, &self.descriptors)?);
        debug!("defined class {}", name);
        self.classes.insert(name, Rc::clone(&class));
        Ok(class)
    }

    pub fn resolve_class(&self, name: &str) -> Result<Rc<Class>, Error> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoClassDefFound(name.to_owned()))
    }

    /// Runs `new`, then the constructor of `class` matching `descriptor`.
    pub fn new_instance(
        &self,
        class: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        let class = self.resolve_class(class)?;
        let method = class.declared_method("<init>", descriptor).ok_or_else(|| {
            Error::NoSuchMethod {
                class: class.name().to_owned(),
                name: "<init>".to_owned(),
                descriptor: descriptor.to_owned(),
            }
        })?;
        let object = Value::Reference(Rc::new(Object::new_scalar(Rc::clone(&class))));
        let mut full_args = vec![object.clone()];
        full_args.extend(args);
        self.call(&class, method, full_args)?;
        Ok(object)
    }

    /// Invokes an instance method on `receiver`, selecting the method by its runtime class.
    pub fn invoke_virtual(
        &self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let mut full_args = vec![receiver.clone()];
        full_args.extend(args);
        self.dispatch_virtual(name, descriptor, full_args)
    }

    pub fn invoke_static(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        self.dispatch_static(class, name, descriptor, args)
    }

    pub fn get_field(&self, object: &Value, name: &str) -> Result<Value, Error> {
        match **receiver_object(object)? {
            Object::Scalar { ref class, ref fields } => {
                fields.borrow().get(name).cloned().ok_or_else(|| Error::NoSuchField {
                    class: class.name().to_owned(),
                    name: name.to_owned(),
                })
            }
            ref other => Err(Error::NoSuchField { class: other.class_name(), name: name.to_owned() }),
        }
    }

    pub fn put_field(&self, object: &Value, name: &str, value: Value) -> Result<(), Error> {
        match **receiver_object(object)? {
            Object::Scalar { ref class, ref fields } => match fields.borrow_mut().get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => {
                    Err(Error::NoSuchField { class: class.name().to_owned(), name: name.to_owned() })
                }
            },
            ref other => Err(Error::NoSuchField { class: other.class_name(), name: name.to_owned() }),
        }
    }

    /// `instanceof`: false for `null`.
    pub fn is_instance(&self, value: &Value, class: &str) -> bool {
        let object = match *value {
            Value::Reference(ref object) => object,
            _ => return false,
        };
        if class == OBJECT {
            return true;
        }
        match **object {
            Object::Scalar { class: ref own, .. } => own.is_subclass_of(class),
            Object::Array { ref component, .. } => {
                let descriptor = format!("[{}", component.descriptor());
                descriptor == class || (class == "[Ljava/lang/Object;" && component.is_reference())
            }
            ref other => native::is_instance(other, class),
        }
    }

    /// Runs `method` of `class` with `args` as its first local variables.
    pub(super) fn call(
        &self,
        class: &Class,
        method: &Method,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let code = method.code.as_ref().ok_or_else(|| {
            Error::Verify(format!("{}.{} has no code", class.name(), method.name))
        })?;
        let mut locals = Vec::with_capacity(usize::from(code.max_locals));
        for arg in args {
            let wide = arg.slots() == 2;
            locals.push(Some(arg));
            if wide {
                locals.push(None);
            }
        }
        if locals.len() > usize::from(code.max_locals) {
            return Err(Error::Verify(format!(
                "{}.{} takes more arguments than it has locals",
                class.name(),
                method.name
            )));
        }
        locals.resize(usize::from(code.max_locals), None);
        trace!("calling {}.{}{}", class.name(), method.name, method.descriptor);
        Frame::new(class, code, locals).run(self)
    }

    /// `invokevirtual` and `invokeinterface`. `args[0]` is the receiver.
    pub(super) fn dispatch_virtual(
        &self,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let receiver = match args.first() {
            Some(receiver) => Rc::clone(receiver_object(receiver)?),
            None => return Err(Error::Verify("missing receiver".to_owned())),
        };
        match *receiver {
            Object::Scalar { ref class, .. } => match class.find_method(name, descriptor) {
                Some((owner, method)) => self.call(owner, method, args),
                None => Err(no_such_method(class.name(), name, descriptor)),
            },
            Object::Handler { ref interface, ref handler } => {
                if descriptor != HANDLER_DESCRIPTOR || args.len() != 4 {
                    return Err(no_such_method(interface, name, descriptor));
                }
                let method = args[2].as_str().ok_or(Error::NullPointer)?;
                let handler_args = match args[3] {
                    Value::Reference(ref array) => match **array {
                        Object::Array { ref values, .. } => values.borrow().clone(),
                        _ => return Err(Error::Verify("handler arguments are not an array".to_owned())),
                    },
                    _ => Vec::new(),
                };
                trace!("handler {} invoked for {}", interface, method);
                Ok(Some(handler.invoke(&args[1], method, &handler_args)))
            }
            ref other => native::invoke_virtual(&receiver, name, descriptor, &args[1..])
                .unwrap_or_else(|| Err(no_such_method(&other.class_name(), name, descriptor))),
        }
    }

    /// `invokespecial`: constructors and superclass calls. `args[0]` is the receiver.
    pub(super) fn dispatch_special(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        let receiver = match args.first() {
            Some(receiver) => Rc::clone(receiver_object(receiver)?),
            None => return Err(Error::Verify("missing receiver".to_owned())),
        };
        if owner == OBJECT && name == "<init>" && descriptor == "()V" {
            return Ok(None);
        }
        if native::is_native_class(owner) {
            return native::invoke_special(&receiver, name, descriptor, &args[1..])
                .unwrap_or_else(|| Err(no_such_method(owner, name, descriptor)));
        }
        let class = self.resolve_class(owner)?;
        let found = if name == "<init>" {
            class.declared_method(name, descriptor).map(|method| (&*class, method))
        } else {
            class.find_method(name, descriptor)
        };
        match found {
            Some((class, method)) => self.call(class, method, args),
            None => Err(no_such_method(owner, name, descriptor)),
        }
    }

    pub(super) fn dispatch_static(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>, Error> {
        if native::is_native_class(owner) {
            return native::invoke_static(owner, name, descriptor, &args)
                .unwrap_or_else(|| Err(no_such_method(owner, name, descriptor)));
        }
        let class = self.resolve_class(owner)?;
        match class.find_method(name, descriptor) {
            Some((class, method)) if method.is_static() => self.call(class, method, args),
            _ => Err(no_such_method(owner, name, descriptor)),
        }
    }
}

fn receiver_object(value: &Value) -> Result<&Rc<Object>, Error> {
    match *value {
        Value::Reference(ref object) => Ok(object),
        Value::NullReference => Err(Error::NullPointer),
        ref other => Err(Error::Verify(format!("{} is not a reference", other.class_name()))),
    }
}

fn no_such_method(class: &str, name: &str, descriptor: &str) -> Error {
    Error::NoSuchMethod {
        class: class.to_owned(),
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assembler::{Arithmetic, ValueKind};
    use crate::builder::ClassBuilder;
    use crate::model::class_file::method_access_flags;
    use crate::model::descriptor::FieldType;

    fn counter() -> Vec<u8> {
        let mut class = ClassBuilder::new("Counter");
        class.field(0x0002, "count", &FieldType::Int).unwrap();
        class
            .method("add", "(I)I")
            .code(|c| {
                c.load_this()?;
                c.load_this()?;
                c.get_field("Counter", "count", &FieldType::Int)?;
                c.load_param(0)?;
                c.arithmetic(ValueKind::Int, Arithmetic::Add)?;
                c.put_field("Counter", "count", &FieldType::Int)?;
                c.load_this()?;
                c.get_field("Counter", "count", &FieldType::Int)?;
                c.emit_return();
                Ok(())
            })
            .unwrap();
        class
            .method("twice", "(I)I")
            .access(method_access_flags::ACC_PUBLIC | method_access_flags::ACC_STATIC)
            .code(|c| {
                c.load_param(0)?;
                c.load_param(0)?;
                c.arithmetic(ValueKind::Int, Arithmetic::Add)?;
                c.emit_return();
                Ok(())
            })
            .unwrap();
        class.to_bytes().unwrap()
    }

    #[test]
    fn define_and_run() {
        let mut loader = ClassLoader::new();
        loader.define_class(&counter()).unwrap();
        let counter = loader.new_instance("Counter", "()V", vec![]).unwrap();
        loader.invoke_virtual(&counter, "add", "(I)I", vec![Value::Int(3)]).unwrap();
        let total = loader.invoke_virtual(&counter, "add", "(I)I", vec![Value::Int(4)]).unwrap();
        assert_eq!(total.and_then(|v| v.as_int()), Some(7));
        assert_eq!(loader.get_field(&counter, "count").unwrap().as_int(), Some(7));

        let twice = loader.invoke_static("Counter", "twice", "(I)I", vec![Value::Int(21)]).unwrap();
        assert_eq!(twice.and_then(|v| v.as_int()), Some(42));
    }

    #[test]
    fn duplicate_definitions() {
        let mut loader = ClassLoader::new();
        loader.define_class(&counter()).unwrap();
        match loader.define_class(&counter()) {
            Err(Error::DuplicateClass(name)) => assert_eq!(name, "Counter"),
            other => panic!("expected a duplicate class, got {:?}", other),
        }
    }

    #[test]
    fn superclass_must_be_defined() {
        let bytes = ClassBuilder::new("Child").super_class("Parent").to_bytes().unwrap();
        let mut loader = ClassLoader::new();
        match loader.define_class(&bytes) {
            Err(Error::NoClassDefFound(name)) => assert_eq!(name, "Parent"),
            other => panic!("expected a missing superclass, got {:?}", other),
        }
    }

    #[test]
    fn malformed_bytes() {
        let mut loader = ClassLoader::new();
        match loader.define_class(&[0xca, 0xfe]) {
            Err(Error::ClassFormat(_)) => {}
            other => panic!("expected a class format error, got {:?}", other),
        }
    }

    #[test]
    fn null_receivers() {
        let mut loader = ClassLoader::new();
        loader.define_class(&counter()).unwrap();
        match loader.invoke_virtual(&Value::NullReference, "add", "(I)I", vec![Value::Int(1)]) {
            Err(Error::NullPointer) => {}
            other => panic!("expected a null pointer, got {:?}", other),
        }
    }

    #[test]
    fn instances() {
        let mut loader = ClassLoader::new();
        loader.define_class(&counter()).unwrap();
        let counter = loader.new_instance("Counter", "()V", vec![]).unwrap();
        assert!(loader.is_instance(&counter, "Counter"));
        assert!(loader.is_instance(&counter, OBJECT));
        assert!(!loader.is_instance(&counter, "java/lang/String"));
        assert!(!loader.is_instance(&Value::NullReference, OBJECT));
        assert!(loader.is_instance(&Value::string("x"), "java/lang/String"));
    }
}
