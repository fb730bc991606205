//! Reading, assembling, writing and generating JVM class files.
//!
//! Classes are described by the model in `model`, read from bytes by `parser` and written back
//! by `writer`. `builder` and `assembler` construct new classes and method bodies, `proxy`
//! generates delegating subclasses and interface implementations, and `vm` loads and runs what
//! the other modules produce.

#[macro_use]
extern crate log;

pub mod assembler;
pub mod builder;
pub mod bytecode;
pub mod error;
pub mod logging;
pub mod model;
pub mod parser;
pub mod proxy;
pub mod util;
pub mod vm;
pub mod writer;

pub use crate::error::{Error, Result};
