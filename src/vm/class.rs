//! Internal JVM representations of classes and methods.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::model::class_file::access_flags::is_set;
use crate::model::class_file::constant_pool::{ConstantPool, Literal};
use crate::model::class_file::{field_access_flags, method_access_flags, ClassFile, Code};
use crate::model::descriptor::{DescriptorCache, FieldType, MethodDescriptor};
use crate::vm::value::Value;
use crate::vm::Error;

pub const OBJECT: &str = "java/lang/Object";

/// A JVM representation of a class that has been loaded.
#[derive(Debug)]
pub struct Class {
    name: String,
    pub access_flags: u16,
    /// The superclass extended by the class. If the class is `java/lang/Object`, this is `None`.
    pub superclass: Option<Rc<Class>>,
    interfaces: Vec<String>,
    constant_pool: ConstantPool,
    /// Declared fields with their access flags and types, static or not.
    fields: HashMap<String, (u16, FieldType)>,
    methods: HashMap<(String, String), Method>,
    /// Current values of the static fields, seeded from `ConstantValue` attributes.
    statics: RefCell<HashMap<String, Value>>,
}

impl Class {
    /// The built-in root of the class hierarchy. Its methods are native.
    pub fn object() -> Class {
        Class {
            name: OBJECT.to_owned(),
            access_flags: 0x0021,
            superclass: None,
            interfaces: Vec::new(),
            constant_pool: ConstantPool::new(),
            fields: HashMap::new(),
            methods: HashMap::new(),
            statics: RefCell::new(HashMap::new()),
        }
    }

    pub fn new(
        class_file: ClassFile,
        superclass: Option<Rc<Class>>,
        descriptors: &DescriptorCache,
    ) -> Result<Class, Error> {
        let malformed = |what: &str| Error::Verify(format!("unresolvable {}", what));
        let name = class_file.name().ok_or_else(|| malformed("class name"))?;
        let pool = &class_file.constant_pool;

        let mut fields = HashMap::new();
        let mut statics = HashMap::new();
        for field in &class_file.fields {
            let field_name = field.name(pool).ok_or_else(|| malformed("field name"))?;
            let descriptor = field.descriptor(pool).ok_or_else(|| malformed("field type"))?;
            let field_type = FieldType::decode(&descriptor)?;
            if is_set(field.access_flags, field_access_flags::ACC_STATIC) {
                let value = match field.constant_value_index().and_then(|i| pool.literal_at(i)) {
                    Some(literal) => literal_value(&literal),
                    None => Value::default_for(&field_type),
                };
                statics.insert(field_name.clone(), value);
            }
            fields.insert(field_name, (field.access_flags, field_type));
        }

        let mut methods = HashMap::new();
        for method in &class_file.methods {
            let method_name = method.name(pool).ok_or_else(|| malformed("method name"))?;
            let descriptor = method.descriptor(pool).ok_or_else(|| malformed("method type"))?;
            let parsed = descriptors.method(&descriptor)?;
            let is_static = is_set(method.access_flags, method_access_flags::ACC_STATIC);
            let code = method.code().cloned();
            if let Some(ref code) = code {
                let needed = parsed.param_slots() + if is_static { 0 } else { 1 };
                if code.max_locals < needed {
                    return Err(Error::Verify(format!(
                        "{}.{}{} declares {} locals but takes {} parameter slots",
                        name, method_name, descriptor, code.max_locals, needed
                    )));
                }
            }
            let key = (method_name.clone(), descriptor.clone());
            methods.insert(
                key,
                Method {
                    name: method_name,
                    descriptor: parsed,
                    access_flags: method.access_flags,
                    code,
                },
            );
        }

        let interfaces = class_file.interface_names();
        Ok(Class {
            name,
            access_flags: class_file.access_flags,
            superclass,
            interfaces,
            constant_pool: class_file.constant_pool,
            fields,
            methods,
            statics: RefCell::new(statics),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    /// Finds a method declared by this class itself.
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.get(&(name.to_owned(), descriptor.to_owned()))
    }

    /// Looks a method up in this class, then in its superclasses.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<(&Class, &Method)> {
        match self.declared_method(name, descriptor) {
            Some(method) => Some((self, method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name, descriptor)),
        }
    }

    /// True if instances of this class are instances of the class or interface `name`.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.name == name
            || self.interfaces.iter().any(|interface| interface == name)
            || self.superclass.as_ref().map_or(false, |superclass| superclass.is_subclass_of(name))
    }

    /// Names and types of the non-static fields of an instance, inherited ones included.
    pub fn instance_fields(&self) -> Vec<(String, FieldType)> {
        let mut fields =
            self.superclass.as_ref().map_or_else(Vec::new, |superclass| superclass.instance_fields());
        for (name, &(access_flags, ref field_type)) in &self.fields {
            if !is_set(access_flags, field_access_flags::ACC_STATIC) {
                fields.push((name.clone(), field_type.clone()));
            }
        }
        fields
    }

    pub fn get_static(&self, name: &str) -> Result<Value, Error> {
        if let Some(value) = self.statics.borrow().get(name) {
            return Ok(value.clone());
        }
        match self.superclass {
            Some(ref superclass) => superclass.get_static(name),
            None => Err(Error::NoSuchField { class: self.name.clone(), name: name.to_owned() }),
        }
    }

    pub fn put_static(&self, name: &str, value: Value) -> Result<(), Error> {
        if let Some(slot) = self.statics.borrow_mut().get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match self.superclass {
            Some(ref superclass) => superclass.put_static(name, value),
            None => Err(Error::NoSuchField { class: self.name.clone(), name: name.to_owned() }),
        }
    }
}

pub fn literal_value(literal: &Literal) -> Value {
    match *literal {
        Literal::Int(value) => Value::Int(value),
        Literal::Long(value) => Value::Long(value),
        Literal::Float(value) => Value::Float(value),
        Literal::Double(value) => Value::Double(value),
        Literal::String(ref value) => Value::string(value),
    }
}

/// A JVM representation of a method in a loaded class.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub descriptor: Arc<MethodDescriptor>,
    pub access_flags: u16,
    /// Not present for abstract and native methods.
    pub code: Option<Code>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        is_set(self.access_flags, method_access_flags::ACC_STATIC)
    }
}
