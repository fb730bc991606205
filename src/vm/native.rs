//! Native stand-ins for the few library classes generated code touches.

use std::cell::RefCell;
use std::rc::Rc;

use crate::vm::value::{Object, Value};
use crate::vm::Error;

type NativeResult = Result<Option<Value>, Error>;

const STRING: &str = "java/lang/String";
const STRING_BUILDER: &str = "java/lang/StringBuilder";

/// Boxing classes, the primitive descriptor each wraps, and whether it extends `Number`.
const WRAPPERS: &[(&str, &str, bool)] = &[
    ("java/lang/Boolean", "Z", false),
    ("java/lang/Character", "C", false),
    ("java/lang/Byte", "B", true),
    ("java/lang/Short", "S", true),
    ("java/lang/Integer", "I", true),
    ("java/lang/Long", "J", true),
    ("java/lang/Float", "F", true),
    ("java/lang/Double", "D", true),
];

fn wrapper(class: &str) -> Option<&'static (&'static str, &'static str, bool)> {
    WRAPPERS.iter().find(|&&(name, _, _)| name == class)
}

/// True for classes whose instances only exist natively.
pub fn is_native_class(class: &str) -> bool {
    class == STRING || class == STRING_BUILDER || wrapper(class).is_some()
}

/// Creates an uninitialized instance for `new`, if `class` is native.
pub fn new_object(class: &str) -> Option<Value> {
    if class == STRING_BUILDER {
        Some(Value::Reference(Rc::new(Object::StringBuilder(RefCell::new(String::new())))))
    } else {
        None
    }
}

/// Whether a native object is an instance of `class`.
pub fn is_instance(object: &Object, class: &str) -> bool {
    match *object {
        Object::String(_) => {
            ["java/lang/String", "java/lang/CharSequence", "java/lang/Comparable"].contains(&class)
        }
        Object::StringBuilder(_) => class == STRING_BUILDER || class == "java/lang/CharSequence",
        Object::Boxed { class: boxed, .. } => {
            boxed == class
                || (class == "java/lang/Number" && wrapper(boxed).map_or(false, |w| w.2))
        }
        Object::Handler { ref interface, .. } => interface == class,
        Object::Array { .. } | Object::Scalar { .. } => false,
    }
}

fn string_arg(args: &[Value], index: usize) -> Result<String, Error> {
    match args.get(index) {
        Some(&Value::NullReference) => Ok("null".to_owned()),
        Some(value) => Ok(value.to_string()),
        None => Err(Error::Verify("missing argument".to_owned())),
    }
}

/// Characters are passed as ints.
fn char_arg(args: &[Value], index: usize) -> Result<char, Error> {
    args.get(index)
        .and_then(Value::as_int)
        .and_then(|c| ::std::char::from_u32(c as u32))
        .ok_or_else(|| Error::Verify("expected a char argument".to_owned()))
}

/// `invokespecial`, which for natives only ever means a constructor.
pub fn invoke_special(receiver: &Object, name: &str, descriptor: &str, args: &[Value]) -> Option<NativeResult> {
    if name != "<init>" {
        return None;
    }
    match (receiver, descriptor) {
        (&Object::StringBuilder(_), "()V") => Some(Ok(None)),
        (&Object::StringBuilder(ref buffer), "(Ljava/lang/String;)V") => Some(
            string_arg(args, 0).map(|initial| {
                buffer.borrow_mut().push_str(&initial);
                None
            }),
        ),
        _ => None,
    }
}

pub fn invoke_virtual(
    receiver: &Rc<Object>,
    name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<NativeResult> {
    let this = Value::Reference(Rc::clone(receiver));
    match **receiver {
        Object::StringBuilder(ref buffer) => match (name, descriptor) {
            ("append", "(C)Ljava/lang/StringBuilder;") => Some(char_arg(args, 0).map(|c| {
                buffer.borrow_mut().push(c);
                Some(this)
            })),
            ("append", "(Z)Ljava/lang/StringBuilder;") => {
                let flag = args.get(0).and_then(Value::as_int).map_or(false, |b| b != 0);
                buffer.borrow_mut().push_str(if flag { "true" } else { "false" });
                Some(Ok(Some(this)))
            }
            ("append", _) if descriptor.ends_with(")Ljava/lang/StringBuilder;") => {
                Some(string_arg(args, 0).map(|text| {
                    buffer.borrow_mut().push_str(&text);
                    Some(this)
                }))
            }
            ("length", "()I") => Some(Ok(Some(Value::Int(buffer.borrow().chars().count() as i32)))),
            ("toString", "()Ljava/lang/String;") => Some(Ok(Some(Value::string(&buffer.borrow())))),
            _ => None,
        },
        Object::String(ref value) => match (name, descriptor) {
            ("length", "()I") => Some(Ok(Some(Value::Int(value.encode_utf16().count() as i32)))),
            ("toString", "()Ljava/lang/String;") => Some(Ok(Some(this))),
            ("concat", "(Ljava/lang/String;)Ljava/lang/String;") => {
                Some(match args.get(0).and_then(Value::as_str) {
                    Some(other) => Ok(Some(Value::string(&format!("{}{}", value, other)))),
                    None => Err(Error::NullPointer),
                })
            }
            ("equals", "(Ljava/lang/Object;)Z") => {
                let equal = args.get(0).and_then(Value::as_str) == Some(value.as_str());
                Some(Ok(Some(Value::Int(equal as i32))))
            }
            _ => None,
        },
        Object::Boxed { class, ref value } => unbox(class, value, name, descriptor),
        _ => None,
    }
}

/// `Number.xxxValue`, `Boolean.booleanValue` and `Character.charValue`, converting between
/// numeric types the way the wrappers do.
fn unbox(class: &str, value: &Value, name: &str, descriptor: &str) -> Option<NativeResult> {
    let (_, primitive, is_number) = *wrapper(class)?;
    if name == "toString" && descriptor == "()Ljava/lang/String;" {
        let text = Value::boxed(wrapper(class)?.0, value.clone()).to_string();
        return Some(Ok(Some(Value::string(&text))));
    }
    let converted = match (name, descriptor) {
        ("booleanValue", "()Z") if primitive == "Z" => value.clone(),
        ("charValue", "()C") if primitive == "C" => value.clone(),
        (_, _) if !is_number => return None,
        ("intValue", "()I") => Value::Int(as_i64(value) as i32),
        ("byteValue", "()B") => Value::Int(as_i64(value) as i8 as i32),
        ("shortValue", "()S") => Value::Int(as_i64(value) as i16 as i32),
        ("longValue", "()J") => Value::Long(as_i64(value)),
        ("floatValue", "()F") => Value::Float(as_f64(value) as f32),
        ("doubleValue", "()D") => Value::Double(as_f64(value)),
        _ => return None,
    };
    Some(Ok(Some(converted)))
}

fn as_i64(value: &Value) -> i64 {
    match *value {
        Value::Int(v) => i64::from(v),
        Value::Long(v) => v,
        Value::Float(v) => v as i64,
        Value::Double(v) => v as i64,
        _ => 0,
    }
}

fn as_f64(value: &Value) -> f64 {
    match *value {
        Value::Int(v) => f64::from(v),
        Value::Long(v) => v as f64,
        Value::Float(v) => f64::from(v),
        Value::Double(v) => v,
        _ => 0.0,
    }
}

pub fn invoke_static(class: &str, name: &str, descriptor: &str, args: &[Value]) -> Option<NativeResult> {
    if class == STRING && name == "valueOf" && descriptor.ends_with(")Ljava/lang/String;") {
        let text = if descriptor == "(C)Ljava/lang/String;" {
            char_arg(args, 0).map(|c| c.to_string())
        } else if descriptor == "(Z)Ljava/lang/String;" {
            Ok((args.get(0).and_then(Value::as_int) != Some(0)).to_string())
        } else {
            string_arg(args, 0)
        };
        return Some(text.map(|text| Some(Value::string(&text))));
    }
    let &(wrapper, primitive, _) = wrapper(class)?;
    if name == "valueOf" && descriptor == format!("({})L{};", primitive, wrapper) {
        return Some(match args.get(0) {
            Some(value) => Ok(Some(Value::boxed(wrapper, value.clone()))),
            None => Err(Error::Verify("missing argument".to_owned())),
        });
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn number_coercion() {
        let receiver = match Value::boxed("java/lang/Integer", Value::Int(7)) {
            Value::Reference(object) => object,
            _ => unreachable!(),
        };
        let long = invoke_virtual(&receiver, "longValue", "()J", &[]).unwrap().unwrap();
        assert_eq!(long.and_then(|v| v.as_long()), Some(7));
        assert!(invoke_virtual(&receiver, "booleanValue", "()Z", &[]).is_none());
    }

    #[test]
    fn value_of_boxes() {
        let boxed = invoke_static("java/lang/Long", "valueOf", "(J)Ljava/lang/Long;", &[Value::Long(3)]);
        let boxed = boxed.unwrap().unwrap().unwrap();
        assert_eq!(boxed.class_name(), "java/lang/Long");
        assert_eq!(boxed.to_string(), "3");
        assert!(invoke_static("java/lang/Long", "valueOf", "(I)Ljava/lang/Long;", &[]).is_none());
    }

    #[test]
    fn string_builder_appends() {
        let builder = new_object(STRING_BUILDER).unwrap();
        let object = builder.as_object().unwrap();
        invoke_special(object, "<init>", "(Ljava/lang/String;)V", &[Value::string("a")]).unwrap().unwrap();
        invoke_virtual(object, "append", "(I)Ljava/lang/StringBuilder;", &[Value::Int(1)]).unwrap().unwrap();
        invoke_virtual(object, "append", "(C)Ljava/lang/StringBuilder;", &[Value::Int(33)]).unwrap().unwrap();
        let result = invoke_virtual(object, "toString", "()Ljava/lang/String;", &[]).unwrap().unwrap();
        assert_eq!(result.unwrap().as_str(), Some("a1!"));
    }
}
