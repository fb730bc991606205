//! A small interpreting class loader, enough to load generated classes and run the code the
//! assembler produces.
//!
//! Classes are defined from bytes through the class file reader. Only `java/lang/Object` is
//! built in; `String`, `StringBuilder` and the boxing classes are native stand-ins, and
//! invocation handlers are Rust closures.

mod class;
mod class_loader;
mod frame;
mod native;
mod value;

use std::error;
use std::fmt;

pub use self::class::{Class, Method};
pub use self::class_loader::ClassLoader;
pub use self::value::{InvocationHandler, Object, Value};

/// Errors raised while defining classes or running their code. These correspond to the
/// `LinkageError`s and runtime exceptions a JVM would throw.
#[derive(Debug, Clone)]
pub enum Error {
    /// The bytes do not hold a well-formed class.
    ClassFormat(crate::Error),
    NoClassDefFound(String),
    /// A class of the same name has already been defined.
    DuplicateClass(String),
    NoSuchMethod { class: String, name: String, descriptor: String },
    NoSuchField { class: String, name: String },
    NullPointer,
    ClassCast { from: String, to: String },
    ArrayIndexOutOfBounds(i32),
    NegativeArraySize(i32),
    Arithmetic(&'static str),
    /// The code broke a rule the verifier would have enforced, like exceeding its declared
    /// `max_stack`.
    Verify(String),
    /// An exception left the outermost frame.
    Thrown(Value),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ClassFormat(ref error) => write!(f, "ClassFormatError: {}", error),
            Error::NoClassDefFound(ref name) => write!(f, "NoClassDefFoundError: {}", name),
            Error::DuplicateClass(ref name) => write!(f, "duplicate class definition: {}", name),
            Error::NoSuchMethod { ref class, ref name, ref descriptor } => {
                write!(f, "NoSuchMethodError: {}.{}{}", class, name, descriptor)
            }
            Error::NoSuchField { ref class, ref name } => {
                write!(f, "NoSuchFieldError: {}.{}", class, name)
            }
            Error::NullPointer => write!(f, "NullPointerException"),
            Error::ClassCast { ref from, ref to } => {
                write!(f, "ClassCastException: {} cannot be cast to {}", from, to)
            }
            Error::ArrayIndexOutOfBounds(index) => {
                write!(f, "ArrayIndexOutOfBoundsException: {}", index)
            }
            Error::NegativeArraySize(size) => write!(f, "NegativeArraySizeException: {}", size),
            Error::Arithmetic(reason) => write!(f, "ArithmeticException: {}", reason),
            Error::Verify(ref reason) => write!(f, "VerifyError: {}", reason),
            Error::Thrown(ref value) => write!(f, "uncaught exception {}", value.class_name()),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::ClassFormat(ref error) => Some(error),
            _ => None,
        }
    }
}

impl From<crate::Error> for Error {
    fn from(error: crate::Error) -> Self {
        Error::ClassFormat(error)
    }
}
