//! Attributes of classes, fields, methods and `Code` (§4.7). Only the attributes the engine
//! produces or needs to understand are decoded; every other attribute is kept as raw bytes.

pub mod stack_map_frame;

use super::constant_pool_index;
use super::u1;
use super::u2;

pub use self::stack_map_frame::{StackMapFrame, VerificationTypeInfo};

/// Attribute names, as they appear in the constant pool.
pub mod names {
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const SYNTHETIC: &str = "Synthetic";
    pub const SIGNATURE: &str = "Signature";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const DEPRECATED: &str = "Deprecated";
}

/// Each `ExceptionTableEntry` describes one exception handler in the `code`
/// array. The order of the handlers in an `exception_table` array is
/// significant (§2.10).
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionTableEntry {
    /// The handler is active in the range `[start_pc, end_pc)`.
    pub start_pc: u2,
    pub end_pc: u2,
    /// Start of the exception handler; the index of the opcode of an instruction.
    pub handler_pc: u2,
    /// Zero, or the index of a `ConstantPoolInfo::Class` naming the exceptions
    /// this handler catches. Zero catches everything.
    pub catch_type: constant_pool_index,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineNumberInfo {
    pub start_pc: u2,
    pub line_number: u2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariableInfo {
    pub start_pc: u2,
    pub length: u2,
    pub name_index: constant_pool_index,
    pub descriptor_index: constant_pool_index,
    /// The local variable slot.
    pub index: u2,
}

/// The body of a method: its bytecode, the sizes of its frame, and its handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u2,
    pub max_locals: u2,
    pub code: Vec<u1>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

/// Attributes are used in the `ClassFile`, `FieldInfo`, `MethodInfo`, and
/// `AttributeInfo::Code` structures of the class file format (§4.1, §4.5, §4.6,
/// §4.7.3).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    ConstantValue { constant_value_index: constant_pool_index },
    Code(Code),
    StackMapTable {
        entries: Vec<StackMapFrame>,
    },
    Exceptions {
        /// Contains indices into the `constant_pool` table for the class type
        /// that the method is declared to throw.
        exception_index_table: Vec<constant_pool_index>,
    },
    Synthetic,
    Signature {
        /// A valid index into the `constant_pool` table for a `ConstantPoolInfo::Utf8` structure.
        signature_index: constant_pool_index,
    },
    SourceFile {
        sourcefile_index: constant_pool_index,
    },
    LineNumberTable {
        line_number_table: Vec<LineNumberInfo>,
    },
    LocalVariableTable {
        local_variable_table: Vec<LocalVariableInfo>,
    },
    Deprecated,
    Unknown {
        /// A valid index into the `constant_pool` table. The `constant_pool`
        /// entry at that index must be a valid `ConstantPoolInfo::Utf8`
        /// structure representing the name of the attribute.
        attribute_name_index: constant_pool_index,
        /// The data for this attribute.
        info: Vec<u1>,
    },
}

impl AttributeInfo {
    /// The attribute's name, or `None` for an unknown attribute (whose name lives in the pool).
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            AttributeInfo::ConstantValue { .. } => names::CONSTANT_VALUE,
            AttributeInfo::Code(_) => names::CODE,
            AttributeInfo::StackMapTable { .. } => names::STACK_MAP_TABLE,
            AttributeInfo::Exceptions { .. } => names::EXCEPTIONS,
            AttributeInfo::Synthetic => names::SYNTHETIC,
            AttributeInfo::Signature { .. } => names::SIGNATURE,
            AttributeInfo::SourceFile { .. } => names::SOURCE_FILE,
            AttributeInfo::LineNumberTable { .. } => names::LINE_NUMBER_TABLE,
            AttributeInfo::LocalVariableTable { .. } => names::LOCAL_VARIABLE_TABLE,
            AttributeInfo::Deprecated => names::DEPRECATED,
            AttributeInfo::Unknown { .. } => return None,
        })
    }

    /// Visits the names of this attribute and of any attributes nested inside it.
    pub fn for_each_name<F: FnMut(&'static str)>(&self, f: &mut F) {
        if let Some(name) = self.name() {
            f(name);
        }
        if let AttributeInfo::Code(ref code) = *self {
            for attribute in &code.attributes {
                attribute.for_each_name(f);
            }
        }
    }
}
