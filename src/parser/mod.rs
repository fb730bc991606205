//! Contains a parser for a Java class file.
//!
//! # Examples
//!
//! ```
//! use strangelybrown_bytecode::builder::ClassBuilder;
//! use strangelybrown_bytecode::parser::class_file::parse_class_file;
//!
//! let bytes = ClassBuilder::new("Empty").to_bytes().unwrap();
//! let class = parse_class_file(&bytes).unwrap();
//! assert_eq!(class.name(), Some("Empty".to_owned()));
//! ```

pub mod class_file;

pub use self::class_file::parse_class_file;
