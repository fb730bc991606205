//! Structures for the [Java SE 8 JVM class file
//! format](https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html).

pub mod access_flags;
pub mod attribute;
pub mod constant_pool;

pub use self::access_flags::class_access_flags;
pub use self::access_flags::field_access_flags;
pub use self::access_flags::method_access_flags;
pub use self::attribute::AttributeInfo;
pub use self::attribute::Code;
pub use self::constant_pool::ConstantPool;
pub use self::constant_pool::ConstantPoolInfo;

/// The first four bytes of every class file.
pub const MAGIC: u4 = 0xCAFE_BABE;

/// Represents an unsigned one-byte quantity.
#[allow(non_camel_case_types)]
pub type u1 = u8;

/// Represents an unsigned two-byte quantity.
#[allow(non_camel_case_types)]
pub type u2 = u16;

/// Represents an unsigned four-byte quantity.
#[allow(non_camel_case_types)]
pub type u4 = u32;

/// Represents an index into the constant pool.
#[allow(non_camel_case_types)]
pub type constant_pool_index = constant_pool::constant_pool_index;

/// A field declared by a class. Names and descriptors live in the class's constant pool.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: field_access_flags::t,
    /// Utf8 entry holding the unqualified field name.
    pub name_index: constant_pool_index,
    /// Utf8 entry holding the field descriptor.
    pub descriptor_index: constant_pool_index,
    pub attributes: Vec<AttributeInfo>,
}

/// A method declared by a class. Constructors are named `<init>`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub access_flags: method_access_flags::t,
    pub name_index: constant_pool_index,
    /// Utf8 entry holding the method descriptor.
    pub descriptor_index: constant_pool_index,
    /// At most one `Code` attribute, and none for abstract or native methods.
    pub attributes: Vec<AttributeInfo>,
}

/// One class or interface, owning the constant pool every index in it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u2,
    pub major_version: u2,
    pub constant_pool: ConstantPool,
    pub access_flags: class_access_flags::t,
    /// Class entry naming this class.
    pub this_class: constant_pool_index,
    /// Class entry naming the direct superclass, or zero for `java/lang/Object`.
    pub super_class: constant_pool_index,
    /// Class entries for the direct superinterfaces, in declaration order.
    pub interfaces: Vec<constant_pool_index>,
    /// Declared fields only; inherited ones are not repeated.
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    pub fn name(&self, constant_pool: &ConstantPool) -> Option<String> {
        constant_pool.utf8_at(self.name_index)
    }

    pub fn descriptor(&self, constant_pool: &ConstantPool) -> Option<String> {
        constant_pool.utf8_at(self.descriptor_index)
    }

    /// The pool index of this field's `ConstantValue`, if it has one.
    pub fn constant_value_index(&self) -> Option<constant_pool_index> {
        self.attributes.iter().filter_map(|attribute| match *attribute {
            AttributeInfo::ConstantValue { constant_value_index } => Some(constant_value_index),
            _ => None,
        }).next()
    }
}

impl MethodInfo {
    pub fn name(&self, constant_pool: &ConstantPool) -> Option<String> {
        constant_pool.utf8_at(self.name_index)
    }

    pub fn descriptor(&self, constant_pool: &ConstantPool) -> Option<String> {
        constant_pool.utf8_at(self.descriptor_index)
    }

    /// The method body, absent for abstract and native methods.
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().filter_map(|attribute| match *attribute {
            AttributeInfo::Code(ref code) => Some(code),
            _ => None,
        }).next()
    }
}

impl ClassFile {
    /// The internal name of this class.
    pub fn name(&self) -> Option<String> {
        self.constant_pool.class_name_at(self.this_class)
    }

    /// The internal name of the superclass; `None` for `java/lang/Object`.
    pub fn super_name(&self) -> Option<String> {
        if self.super_class == 0 {
            None
        } else {
            self.constant_pool.class_name_at(self.super_class)
        }
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .filter_map(|&index| self.constant_pool.class_name_at(index))
            .collect()
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields
            .iter()
            .find(|field| field.name(&self.constant_pool).as_ref().map(String::as_str) == Some(name))
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        let pool = &self.constant_pool;
        self.methods.iter().find(|method| {
            method.name(pool).as_ref().map(String::as_str) == Some(name)
                && method.descriptor(pool).as_ref().map(String::as_str) == Some(descriptor)
        })
    }
}
