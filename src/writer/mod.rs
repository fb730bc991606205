//! Serializes class models back into the class file format.

pub mod class_file;

pub use self::class_file::write_class_file;
