//! Internal representations of Java values.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::model::descriptor::FieldType;
use crate::vm::class::Class;

/// A value in the Java virtual machine.
#[derive(Debug, Clone)]
pub enum Value {
    /// A 32-bit signed integral type, representing the Java types `byte`, `char`, `short`, `int`,
    /// and `boolean`.
    Int(i32),
    /// A 32-bit floating-point type, representing the Java type `float`.
    Float(f32),
    /// A 64-bit signed integral type, representing the Java type `long`.
    Long(i64),
    /// A 64-bit floating-point type, representing the Java type `double`.
    Double(f64),
    /// A reference to a Java object in the heap.
    Reference(Rc<Object>),
    /// A reference to a Java object which is `null`.
    NullReference,
}

impl Value {
    /// The value a field or array element of type `field_type` starts with.
    pub fn default_for(field_type: &FieldType) -> Value {
        match *field_type {
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::NullReference,
            _ => Value::Int(0),
        }
    }

    pub fn string(value: &str) -> Value {
        Value::Reference(Rc::new(Object::String(value.to_owned())))
    }

    /// An object implementing `interface` by calling `handler`.
    pub fn handler<H>(interface: &str, handler: H) -> Value
    where
        H: InvocationHandler + 'static,
    {
        Value::Reference(Rc::new(Object::Handler {
            interface: interface.to_owned(),
            handler: Rc::new(handler),
        }))
    }

    /// Wraps a primitive in its boxing class, as `valueOf` does.
    pub fn boxed(class: &'static str, value: Value) -> Value {
        Value::Reference(Rc::new(Object::Boxed { class, value }))
    }

    pub fn array(component: FieldType, values: Vec<Value>) -> Value {
        Value::Reference(Rc::new(Object::Array { component, values: RefCell::new(values) }))
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Value::Long(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match *self {
            Value::Reference(ref object) => Some(object),
            _ => None,
        }
    }

    /// The contents of a `java/lang/String`.
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Value::Reference(ref object) => match **object {
                Object::String(ref value) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match *self {
            Value::NullReference => true,
            _ => false,
        }
    }

    /// Operand stack and local variable slots this value takes up.
    pub fn slots(&self) -> u16 {
        match *self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    /// Reference equality, as `if_acmpeq` tests it.
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (&Value::NullReference, &Value::NullReference) => true,
            (&Value::Reference(ref a), &Value::Reference(ref b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn class_name(&self) -> String {
        match *self {
            Value::Int(_) => "int".to_owned(),
            Value::Float(_) => "float".to_owned(),
            Value::Long(_) => "long".to_owned(),
            Value::Double(_) => "double".to_owned(),
            Value::Reference(ref object) => object.class_name(),
            Value::NullReference => "null".to_owned(),
        }
    }
}

/// What `String.valueOf` and `StringBuilder.append` make of a value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Long(value) => write!(f, "{}", value),
            Value::Double(value) => write!(f, "{:?}", value),
            Value::NullReference => write!(f, "null"),
            Value::Reference(ref object) => match **object {
                Object::String(ref value) => write!(f, "{}", value),
                Object::StringBuilder(ref value) => write!(f, "{}", value.borrow()),
                Object::Boxed { class: "java/lang/Boolean", ref value } => {
                    write!(f, "{}", value.as_int() != Some(0))
                }
                Object::Boxed { class: "java/lang/Character", ref value } => {
                    let c = value.as_int().and_then(|c| ::std::char::from_u32(c as u32));
                    write!(f, "{}", c.unwrap_or(::std::char::REPLACEMENT_CHARACTER))
                }
                Object::Boxed { ref value, .. } => write!(f, "{}", value),
                ref other => write!(f, "{}@{:p}", other.class_name(), object),
            },
        }
    }
}

/// The callback behind a generated proxy: receives the proxy, the method identifier
/// (`name + descriptor`) and the boxed arguments, and returns a boxed result.
pub trait InvocationHandler {
    fn invoke(&self, proxy: &Value, method: &str, args: &[Value]) -> Value;
}

impl<F> InvocationHandler for F
where
    F: Fn(&Value, &str, &[Value]) -> Value,
{
    fn invoke(&self, proxy: &Value, method: &str, args: &[Value]) -> Value {
        self(proxy, method, args)
    }
}

/// An object in the heap.
pub enum Object {
    /// An instance of a loaded class.
    Scalar { class: Rc<Class>, fields: RefCell<HashMap<String, Value>> },
    String(String),
    StringBuilder(RefCell<String>),
    /// An instance of one of the boxing classes.
    Boxed { class: &'static str, value: Value },
    Array { component: FieldType, values: RefCell<Vec<Value>> },
    Handler { interface: String, handler: Rc<dyn InvocationHandler> },
}

impl Object {
    /// A fresh instance of `class` with every instance field at its default value.
    pub fn new_scalar(class: Rc<Class>) -> Object {
        let fields = class
            .instance_fields()
            .into_iter()
            .map(|(name, field_type)| (name, Value::default_for(&field_type)))
            .collect();
        Object::Scalar { class, fields: RefCell::new(fields) }
    }

    /// The internal name of the object's class, or its descriptor for arrays.
    pub fn class_name(&self) -> String {
        match *self {
            Object::Scalar { ref class, .. } => class.name().to_owned(),
            Object::String(_) => "java/lang/String".to_owned(),
            Object::StringBuilder(_) => "java/lang/StringBuilder".to_owned(),
            Object::Boxed { class, .. } => class.to_owned(),
            Object::Array { ref component, .. } => format!("[{}", component.descriptor()),
            Object::Handler { ref interface, .. } => interface.clone(),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Object::Scalar { ref class, ref fields } => f
                .debug_struct("Scalar")
                .field("class", &class.name())
                .field("fields", &*fields.borrow())
                .finish(),
            Object::String(ref value) => write!(f, "String({:?})", value),
            Object::StringBuilder(ref value) => write!(f, "StringBuilder({:?})", value.borrow()),
            Object::Boxed { class, ref value } => write!(f, "{}({:?})", class, value),
            Object::Array { ref component, ref values } => f
                .debug_struct("Array")
                .field("component", component)
                .field("values", &*values.borrow())
                .finish(),
            Object::Handler { ref interface, .. } => write!(f, "Handler({})", interface),
        }
    }
}
