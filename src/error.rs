//! Errors reported by every stage of the engine.

use std::error;
use std::fmt;
use std::io;
use std::result;

use crate::parser::class_file;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The reader rejected its input. `offset` is the byte position where decoding failed.
    MalformedClass {
        offset: usize,
        reason: class_file::Error,
    },
    InvalidDescriptor {
        descriptor: String,
    },
    /// An instruction at byte `offset` needs more operands than the stack can hold on some path.
    StackUnderflow {
        offset: usize,
        depth: u16,
        required: u16,
    },
    /// Two control-flow paths reach byte `offset` with different stack depths, or a return
    /// leaves values behind.
    StackMismatch {
        offset: usize,
        expected: u16,
        actual: u16,
    },
    MaxStackExceeded {
        declared: u16,
        computed: u16,
    },
    InvalidBranchTarget {
        label: u32,
        reason: &'static str,
    },
    PoolOverflow {
        slots: usize,
    },
    EncodingError(String),
    UnsupportedConstruct(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::MalformedClass { offset, ref reason } => {
                write!(f, "malformed class file at byte {}: {}", offset, reason)
            }
            Error::InvalidDescriptor { ref descriptor } => {
                write!(f, "invalid descriptor {:?}", descriptor)
            }
            Error::StackUnderflow { offset, depth, required } => write!(
                f,
                "stack underflow at {}: {} value slot(s) required, {} available",
                offset, required, depth
            ),
            Error::StackMismatch { offset, expected, actual } => write!(
                f,
                "inconsistent stack depth at {}: expected {}, found {}",
                offset, expected, actual
            ),
            Error::MaxStackExceeded { declared, computed } => write!(
                f,
                "operand stack reaches {} slot(s) but max_stack is declared as {}",
                computed, declared
            ),
            Error::InvalidBranchTarget { label, reason } => {
                write!(f, "invalid branch target L{}: {}", label, reason)
            }
            Error::PoolOverflow { slots } => write!(
                f,
                "constant pool would need {} slots, more than a class file can index",
                slots
            ),
            Error::EncodingError(ref message) => write!(f, "cannot encode class: {}", message),
            Error::UnsupportedConstruct(ref message) => write!(f, "unsupported: {}", message),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::MalformedClass { ref reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::EncodingError(error.to_string())
    }
}
