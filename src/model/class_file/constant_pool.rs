//! The constant pool table, and the manager that interns entries into it.

use std::collections::HashMap;

use super::u1;
use super::u2;
use super::u4;
use crate::error::{Error, Result};
use crate::util::modified_utf8::{from_modified_utf8, to_modified_utf8};
use crate::util::one_indexed_vec::OneIndexedVec;

#[allow(non_camel_case_types)]
pub type constant_pool_index = u2;

/// The largest number of slots a pool can occupy. `constant_pool_count` is a `u2` and counts
/// the reserved slot 0 as well.
pub const MAX_SLOTS: usize = 65534;

pub mod tags {
    use super::super::u1;
    pub const UTF_8: u1 = 1;
    pub const INTEGER: u1 = 3;
    pub const FLOAT: u1 = 4;
    pub const LONG: u1 = 5;
    pub const DOUBLE: u1 = 6;
    pub const CLASS: u1 = 7;
    pub const STRING: u1 = 8;
    pub const FIELD_REF: u1 = 9;
    pub const METHOD_REF: u1 = 10;
    pub const INTERFACE_METHOD_REF: u1 = 11;
    pub const NAME_AND_TYPE: u1 = 12;
    pub const METHOD_HANDLE: u1 = 15;
    pub const METHOD_TYPE: u1 = 16;
    pub const DYNAMIC: u1 = 17;
    pub const INVOKE_DYNAMIC: u1 = 18;
    pub const MODULE: u1 = 19;
    pub const PACKAGE: u1 = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Class,
    FieldRef,
    MethodRef,
    InterfaceMethodRef,
    String,
    Integer,
    Float,
    Long,
    Double,
    NameAndType,
    Utf8,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module,
    Package,
    Unknown(u1),
}

impl From<u1> for Tag {
    fn from(tag: u1) -> Self {
        match tag {
            tags::CLASS => Tag::Class,
            tags::FIELD_REF => Tag::FieldRef,
            tags::METHOD_REF => Tag::MethodRef,
            tags::INTERFACE_METHOD_REF => Tag::InterfaceMethodRef,
            tags::STRING => Tag::String,
            tags::INTEGER => Tag::Integer,
            tags::FLOAT => Tag::Float,
            tags::LONG => Tag::Long,
            tags::DOUBLE => Tag::Double,
            tags::NAME_AND_TYPE => Tag::NameAndType,
            tags::UTF_8 => Tag::Utf8,
            tags::METHOD_HANDLE => Tag::MethodHandle,
            tags::METHOD_TYPE => Tag::MethodType,
            tags::DYNAMIC => Tag::Dynamic,
            tags::INVOKE_DYNAMIC => Tag::InvokeDynamic,
            tags::MODULE => Tag::Module,
            tags::PACKAGE => Tag::Package,
            _ => Tag::Unknown(tag),
        }
    }
}

/// The kind of a `CONSTANT_MethodHandle`, which determines what its reference must point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl ReferenceKind {
    pub fn from_u1(kind: u1) -> Option<ReferenceKind> {
        Some(match kind {
            1 => ReferenceKind::GetField,
            2 => ReferenceKind::GetStatic,
            3 => ReferenceKind::PutField,
            4 => ReferenceKind::PutStatic,
            5 => ReferenceKind::InvokeVirtual,
            6 => ReferenceKind::InvokeStatic,
            7 => ReferenceKind::InvokeSpecial,
            8 => ReferenceKind::NewInvokeSpecial,
            9 => ReferenceKind::InvokeInterface,
            _ => return None,
        })
    }

    pub fn as_u1(self) -> u1 {
        self as u1
    }

    /// The tags a method handle of this kind may reference.
    fn referent_tags(self) -> &'static [Tag] {
        match self {
            ReferenceKind::GetField
            | ReferenceKind::GetStatic
            | ReferenceKind::PutField
            | ReferenceKind::PutStatic => &[Tag::FieldRef],
            ReferenceKind::InvokeVirtual | ReferenceKind::NewInvokeSpecial => &[Tag::MethodRef],
            ReferenceKind::InvokeStatic | ReferenceKind::InvokeSpecial => {
                &[Tag::MethodRef, Tag::InterfaceMethodRef]
            }
            ReferenceKind::InvokeInterface => &[Tag::InterfaceMethodRef],
        }
    }
}

/// One entry of the constant pool. Floating-point constants are kept as their raw bit patterns so
/// that two entries are equal exactly when their encodings are.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantPoolInfo {
    Class { name_index: constant_pool_index },
    FieldRef { class_index: constant_pool_index, name_and_type_index: constant_pool_index },
    MethodRef { class_index: constant_pool_index, name_and_type_index: constant_pool_index },
    InterfaceMethodRef {
        class_index: constant_pool_index,
        name_and_type_index: constant_pool_index,
    },
    String { string_index: constant_pool_index },
    Integer { bytes: u4 },
    Float { bytes: u4 },
    Long { high_bytes: u4, low_bytes: u4 },
    Double { high_bytes: u4, low_bytes: u4 },
    NameAndType {
        name_index: constant_pool_index,
        descriptor_index: constant_pool_index,
    },
    /// The raw modified UTF-8 bytes of the string.
    Utf8 { bytes: Vec<u1> },
    MethodHandle { reference_kind: ReferenceKind, reference_index: constant_pool_index },
    MethodType { descriptor_index: constant_pool_index },
    Dynamic {
        bootstrap_method_attr_index: u2,
        name_and_type_index: constant_pool_index,
    },
    InvokeDynamic {
        /// A valid index into the `bootstrap_methods` array of the bootstrap
        /// method table.
        bootstrap_method_attr_index: u2,
        name_and_type_index: constant_pool_index,
    },
    Module { name_index: constant_pool_index },
    Package { name_index: constant_pool_index },
}

impl ConstantPoolInfo {
    pub fn tag(&self) -> Tag {
        Tag::from(self.tag_byte())
    }

    pub fn tag_byte(&self) -> u1 {
        match *self {
            ConstantPoolInfo::Class { .. } => tags::CLASS,
            ConstantPoolInfo::FieldRef { .. } => tags::FIELD_REF,
            ConstantPoolInfo::MethodRef { .. } => tags::METHOD_REF,
            ConstantPoolInfo::InterfaceMethodRef { .. } => tags::INTERFACE_METHOD_REF,
            ConstantPoolInfo::String { .. } => tags::STRING,
            ConstantPoolInfo::Integer { .. } => tags::INTEGER,
            ConstantPoolInfo::Float { .. } => tags::FLOAT,
            ConstantPoolInfo::Long { .. } => tags::LONG,
            ConstantPoolInfo::Double { .. } => tags::DOUBLE,
            ConstantPoolInfo::NameAndType { .. } => tags::NAME_AND_TYPE,
            ConstantPoolInfo::Utf8 { .. } => tags::UTF_8,
            ConstantPoolInfo::MethodHandle { .. } => tags::METHOD_HANDLE,
            ConstantPoolInfo::MethodType { .. } => tags::METHOD_TYPE,
            ConstantPoolInfo::Dynamic { .. } => tags::DYNAMIC,
            ConstantPoolInfo::InvokeDynamic { .. } => tags::INVOKE_DYNAMIC,
            ConstantPoolInfo::Module { .. } => tags::MODULE,
            ConstantPoolInfo::Package { .. } => tags::PACKAGE,
        }
    }

    /// `Long` and `Double` entries take up two slots of the table.
    pub fn is_wide(&self) -> bool {
        match *self {
            ConstantPoolInfo::Long { .. } | ConstantPoolInfo::Double { .. } => true,
            _ => false,
        }
    }

    /// Every pool index this entry refers to, with the tags the referenced entry may have.
    pub fn references(&self) -> Vec<(constant_pool_index, &'static [Tag])> {
        const UTF8: &[Tag] = &[Tag::Utf8];
        const CLASS: &[Tag] = &[Tag::Class];
        const NAME_AND_TYPE: &[Tag] = &[Tag::NameAndType];
        match *self {
            ConstantPoolInfo::Class { name_index }
            | ConstantPoolInfo::Module { name_index }
            | ConstantPoolInfo::Package { name_index } => vec![(name_index, UTF8)],
            ConstantPoolInfo::FieldRef { class_index, name_and_type_index }
            | ConstantPoolInfo::MethodRef { class_index, name_and_type_index }
            | ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index } => {
                vec![(class_index, CLASS), (name_and_type_index, NAME_AND_TYPE)]
            }
            ConstantPoolInfo::String { string_index } => vec![(string_index, UTF8)],
            ConstantPoolInfo::NameAndType { name_index, descriptor_index } => {
                vec![(name_index, UTF8), (descriptor_index, UTF8)]
            }
            ConstantPoolInfo::MethodHandle { reference_kind, reference_index } => {
                vec![(reference_index, reference_kind.referent_tags())]
            }
            ConstantPoolInfo::MethodType { descriptor_index } => vec![(descriptor_index, UTF8)],
            ConstantPoolInfo::Dynamic { name_and_type_index, .. }
            | ConstantPoolInfo::InvokeDynamic { name_and_type_index, .. } => {
                vec![(name_and_type_index, NAME_AND_TYPE)]
            }
            ConstantPoolInfo::Integer { .. }
            | ConstantPoolInfo::Float { .. }
            | ConstantPoolInfo::Long { .. }
            | ConstantPoolInfo::Double { .. }
            | ConstantPoolInfo::Utf8 { .. } => Vec::new(),
        }
    }
}

/// A loadable constant value, as it appears in `ldc` operands and `ConstantValue` attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// A resolved field or method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// A cross reference that does not point at an entry of an acceptable tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkError {
    /// The entry holding the bad reference.
    pub referrer: constant_pool_index,
    /// The index it refers to.
    pub index: constant_pool_index,
    pub expected: Tag,
    /// The tag found at `index`, or `None` if nothing usable lives there.
    pub actual: Option<Tag>,
}

/// The constant pool of one class. Entries are deduplicated on insertion and never move once
/// they have been assigned an index.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// `None` marks the unusable slot following a `Long` or `Double`.
    entries: OneIndexedVec<Option<ConstantPoolInfo>>,
    lookup: HashMap<ConstantPoolInfo, constant_pool_index>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &ConstantPool) -> bool {
        self.entries == other.entries
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    /// Builds a pool from already laid-out slots, as read from a class file. Duplicate entries are
    /// tolerated; lookups find the first of them.
    pub fn from_entries(entries: Vec<Option<ConstantPoolInfo>>) -> Self {
        let entries = OneIndexedVec::from(entries);
        let mut lookup = HashMap::new();
        for (index, entry) in entries.indexed() {
            if let Some(ref entry) = *entry {
                lookup.entry(entry.clone()).or_insert(index as constant_pool_index);
            }
        }
        ConstantPool { entries, lookup }
    }

    /// The number of slots in use, not counting the reserved slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The value written as `constant_pool_count`.
    pub fn count(&self) -> usize {
        self.entries.len() + 1
    }

    /// Returns the entry at `index`, or `None` for slot 0, the second slot of a wide entry, or an
    /// index past the end.
    pub fn get(&self, index: constant_pool_index) -> Option<&ConstantPoolInfo> {
        self.entries.get(index as usize).and_then(|entry| entry.as_ref())
    }

    pub fn tag_at(&self, index: constant_pool_index) -> Option<Tag> {
        self.get(index).map(ConstantPoolInfo::tag)
    }

    pub fn find(&self, entry: &ConstantPoolInfo) -> Option<constant_pool_index> {
        self.lookup.get(entry).cloned()
    }

    /// Iterates over the occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (constant_pool_index, &ConstantPoolInfo)> {
        self.entries
            .indexed()
            .filter_map(|(index, entry)| entry.as_ref().map(|e| (index as constant_pool_index, e)))
    }

    /// Drops every slot past the first `len`, forgetting the entries in them. `len` should be a
    /// value `len()` returned earlier, so that no wide entry is split.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        self.entries.truncate(len);
        self.lookup.retain(|_, index| usize::from(*index) <= len);
        trace!("constant pool truncated to {} slots", len);
    }

    /// Returns the index of an entry equal to `entry`, appending it first if there is none.
    pub fn intern(&mut self, entry: ConstantPoolInfo) -> Result<constant_pool_index> {
        if let Some(&index) = self.lookup.get(&entry) {
            return Ok(index);
        }
        let width = if entry.is_wide() { 2 } else { 1 };
        if self.len() + width > MAX_SLOTS {
            return Err(Error::PoolOverflow { slots: self.len() + width });
        }
        let wide = entry.is_wide();
        let index = self.entries.push(Some(entry.clone())) as constant_pool_index;
        if wide {
            self.entries.push(None);
        }
        trace!("interned #{} {:?}", index, entry);
        self.lookup.insert(entry, index);
        Ok(index)
    }

    pub fn utf8(&mut self, string: &str) -> Result<constant_pool_index> {
        let bytes = to_modified_utf8(string);
        if bytes.len() > u2::max_value() as usize {
            return Err(Error::EncodingError(format!(
                "string of {} encoded bytes does not fit a Utf8 entry",
                bytes.len()
            )));
        }
        self.intern(ConstantPoolInfo::Utf8 { bytes })
    }

    /// Interns a class reference. Dotted names are accepted and stored in internal form.
    pub fn class(&mut self, name: &str) -> Result<constant_pool_index> {
        let name_index = self.utf8(&name.replace('.', "/"))?;
        self.intern(ConstantPoolInfo::Class { name_index })
    }

    pub fn string(&mut self, value: &str) -> Result<constant_pool_index> {
        let string_index = self.utf8(value)?;
        self.intern(ConstantPoolInfo::String { string_index })
    }

    pub fn integer(&mut self, value: i32) -> Result<constant_pool_index> {
        self.intern(ConstantPoolInfo::Integer { bytes: value as u4 })
    }

    pub fn float(&mut self, value: f32) -> Result<constant_pool_index> {
        self.intern(ConstantPoolInfo::Float { bytes: value.to_bits() })
    }

    pub fn long(&mut self, value: i64) -> Result<constant_pool_index> {
        let bits = value as u64;
        self.intern(ConstantPoolInfo::Long {
            high_bytes: (bits >> 32) as u4,
            low_bytes: bits as u4,
        })
    }

    pub fn double(&mut self, value: f64) -> Result<constant_pool_index> {
        let bits = value.to_bits();
        self.intern(ConstantPoolInfo::Double {
            high_bytes: (bits >> 32) as u4,
            low_bytes: bits as u4,
        })
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> Result<constant_pool_index> {
        let name_index = self.utf8(name)?;
        let descriptor_index = self.utf8(descriptor)?;
        self.intern(ConstantPoolInfo::NameAndType { name_index, descriptor_index })
    }

    pub fn field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.intern(ConstantPoolInfo::FieldRef { class_index, name_and_type_index })
    }

    pub fn method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.intern(ConstantPoolInfo::MethodRef { class_index, name_and_type_index })
    }

    pub fn interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<constant_pool_index> {
        let class_index = self.class(owner)?;
        let name_and_type_index = self.name_and_type(name, descriptor)?;
        self.intern(ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index })
    }

    pub fn method_type(&mut self, descriptor: &str) -> Result<constant_pool_index> {
        let descriptor_index = self.utf8(descriptor)?;
        self.intern(ConstantPoolInfo::MethodType { descriptor_index })
    }

    pub fn method_handle(
        &mut self,
        reference_kind: ReferenceKind,
        reference_index: constant_pool_index,
    ) -> Result<constant_pool_index> {
        match self.tag_at(reference_index) {
            Some(tag) if reference_kind.referent_tags().contains(&tag) => {}
            actual => {
                return Err(Error::EncodingError(format!(
                    "method handle of kind {:?} cannot refer to #{} ({:?})",
                    reference_kind, reference_index, actual
                )))
            }
        }
        self.intern(ConstantPoolInfo::MethodHandle { reference_kind, reference_index })
    }

    pub fn literal(&mut self, literal: &Literal) -> Result<constant_pool_index> {
        match *literal {
            Literal::Int(value) => self.integer(value),
            Literal::Long(value) => self.long(value),
            Literal::Float(value) => self.float(value),
            Literal::Double(value) => self.double(value),
            Literal::String(ref value) => self.string(value),
        }
    }

    /// Decodes the Utf8 entry at `index`.
    pub fn utf8_at(&self, index: constant_pool_index) -> Option<String> {
        match self.get(index) {
            Some(ConstantPoolInfo::Utf8 { bytes }) => from_modified_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Returns the internal name of the Class entry at `index`.
    pub fn class_name_at(&self, index: constant_pool_index) -> Option<String> {
        match *self.get(index)? {
            ConstantPoolInfo::Class { name_index } => self.utf8_at(name_index),
            _ => None,
        }
    }

    pub fn name_and_type_at(&self, index: constant_pool_index) -> Option<(String, String)> {
        match *self.get(index)? {
            ConstantPoolInfo::NameAndType { name_index, descriptor_index } => {
                Some((self.utf8_at(name_index)?, self.utf8_at(descriptor_index)?))
            }
            _ => None,
        }
    }

    /// Resolves a FieldRef, MethodRef or InterfaceMethodRef entry.
    pub fn member_ref_at(&self, index: constant_pool_index) -> Option<MemberRef> {
        let (class_index, name_and_type_index) = match *self.get(index)? {
            ConstantPoolInfo::FieldRef { class_index, name_and_type_index }
            | ConstantPoolInfo::MethodRef { class_index, name_and_type_index }
            | ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index } => {
                (class_index, name_and_type_index)
            }
            _ => return None,
        };
        let (name, descriptor) = self.name_and_type_at(name_and_type_index)?;
        Some(MemberRef { owner: self.class_name_at(class_index)?, name, descriptor })
    }

    pub fn literal_at(&self, index: constant_pool_index) -> Option<Literal> {
        Some(match *self.get(index)? {
            ConstantPoolInfo::Integer { bytes } => Literal::Int(bytes as i32),
            ConstantPoolInfo::Float { bytes } => Literal::Float(f32::from_bits(bytes)),
            ConstantPoolInfo::Long { high_bytes, low_bytes } => {
                Literal::Long(((high_bytes as u64) << 32 | low_bytes as u64) as i64)
            }
            ConstantPoolInfo::Double { high_bytes, low_bytes } => {
                Literal::Double(f64::from_bits((high_bytes as u64) << 32 | low_bytes as u64))
            }
            ConstantPoolInfo::String { string_index } => {
                Literal::String(self.utf8_at(string_index)?)
            }
            _ => return None,
        })
    }

    /// Checks that every cross reference between entries points at an entry of an acceptable
    /// tag. Forward references are fine, since the whole table is present by now.
    pub fn validate(&self) -> ::std::result::Result<(), LinkError> {
        for (referrer, entry) in self.iter() {
            for (index, expected) in entry.references() {
                let actual = self.tag_at(index);
                let accepted = match actual {
                    Some(tag) => expected.contains(&tag),
                    None => false,
                };
                if !accepted {
                    return Err(LinkError { referrer, index, expected: expected[0], actual });
                }
            }
        }
        Ok(())
    }
}
