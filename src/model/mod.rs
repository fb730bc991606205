//! Structures for the [JVM class file
//! format](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html), and the descriptor
//! grammar used throughout it.

pub mod class_file;
pub mod descriptor;
