use std::error;
use std::fmt;

use nom::bytes::complete::{tag, take};
use nom::error::ErrorKind;
use nom::multi::count;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::Offset;

use crate::model::class_file;
use crate::model::class_file::attribute::stack_map_frame;
use crate::model::class_file::attribute::{
    AttributeInfo, Code, ExceptionTableEntry, LineNumberInfo, LocalVariableInfo,
    StackMapFrame, VerificationTypeInfo,
};
use crate::model::class_file::constant_pool::{self, ConstantPool, ConstantPoolInfo, ReferenceKind, Tag};
use crate::model::class_file::{ClassFile, FieldInfo, MethodInfo};
use crate::model::descriptor::{FieldType, MethodDescriptor};
use crate::util::modified_utf8;

pub type Input<'a> = &'a [u8];
pub type ParseResult<'a, O> = nom::IResult<Input<'a>, O, ParseError<'a>>;
pub type ConstantPoolIndex = class_file::constant_pool_index;

/// The oldest and newest class file major versions the reader accepts.
pub const MIN_MAJOR_VERSION: u16 = 45;
pub const MAX_MAJOR_VERSION: u16 = 65;

/// Why a class file was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The input ended in the middle of a structure.
    Truncated,
    Magic { magic: u32 },
    UnsupportedVersion { major: u16, minor: u16 },
    ConstantPool { constant_pool_count: usize },
    UnknownConstantPoolTag { tag: u8 },
    ConstantPoolIndexOutOfBounds { index: usize },
    UnexpectedConstantPoolType {
        index: usize,
        expected: constant_pool::Tag,
        actual: constant_pool::Tag,
    },
    IllegalModifiedUtf8 { byte: u8 },
    /// A Utf8 entry used as a name or descriptor does not decode.
    ModifiedUtf8 { index: usize },
    UnknownConstantPoolMethodReferenceTag { tag: u8 },
    Descriptor { descriptor: String },
    /// The body of an attribute was not consumed exactly.
    AttributeLength {
        attribute_name: String,
        attribute_length: usize,
        consumed: usize,
    },
    CodeLength { code_length: usize },
    ExceptionTableEntry { start_pc: u16, end_pc: u16, handler_pc: u16 },
    ReservedStackMapFrameTag { tag: u8 },
    UnknownVerificationTypeInfoTag { tag: u8 },
    TrailingBytes { count: usize },
    /// A combinator failed without a more specific reason.
    Syntax(ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Truncated => write!(f, "unexpected end of input"),
            Error::Magic { magic } => write!(f, "bad magic number {:#010x}", magic),
            Error::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported class file version {}.{}", major, minor)
            }
            Error::ConstantPool { constant_pool_count } => {
                write!(f, "bad constant_pool_count {}", constant_pool_count)
            }
            Error::UnknownConstantPoolTag { tag } => write!(f, "unknown constant pool tag {}", tag),
            Error::ConstantPoolIndexOutOfBounds { index } => {
                write!(f, "constant pool index #{} does not name an entry", index)
            }
            Error::UnexpectedConstantPoolType { index, expected, actual } => write!(
                f,
                "constant pool entry #{} is {:?}, expected {:?}",
                index, actual, expected
            ),
            Error::IllegalModifiedUtf8 { byte } => {
                write!(f, "byte {:#04x} may not appear in modified UTF-8", byte)
            }
            Error::ModifiedUtf8 { index } => {
                write!(f, "constant pool entry #{} is not valid modified UTF-8", index)
            }
            Error::UnknownConstantPoolMethodReferenceTag { tag } => {
                write!(f, "unknown method handle reference kind {}", tag)
            }
            Error::Descriptor { ref descriptor } => write!(f, "invalid descriptor {:?}", descriptor),
            Error::AttributeLength { ref attribute_name, attribute_length, consumed } => write!(
                f,
                "attribute {} declares {} bytes but its contents take {}",
                attribute_name, attribute_length, consumed
            ),
            Error::CodeLength { code_length } => write!(f, "bad code_length {}", code_length),
            Error::ExceptionTableEntry { start_pc, end_pc, handler_pc } => write!(
                f,
                "exception handler [{}, {}) -> {} lies outside the code",
                start_pc, end_pc, handler_pc
            ),
            Error::ReservedStackMapFrameTag { tag } => {
                write!(f, "reserved stack map frame type {}", tag)
            }
            Error::UnknownVerificationTypeInfoTag { tag } => {
                write!(f, "unknown verification type tag {}", tag)
            }
            Error::TrailingBytes { count } => {
                write!(f, "{} byte(s) follow the end of the class", count)
            }
            Error::Syntax(kind) => write!(f, "parse error ({:?})", kind),
        }
    }
}

impl error::Error for Error {}

/// A parse failure, pointing at the input remaining where it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError<'a> {
    pub input: Input<'a>,
    pub error: Error,
}

impl<'a> nom::error::ParseError<Input<'a>> for ParseError<'a> {
    fn from_error_kind(input: Input<'a>, kind: ErrorKind) -> Self {
        let error = match kind {
            ErrorKind::Eof | ErrorKind::Complete => Error::Truncated,
            _ => Error::Syntax(kind),
        };
        ParseError { input, error }
    }

    fn append(_: Input<'a>, _: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Stops parsing with `error`, reported at the start of `input`.
fn fail<'a, O>(input: Input<'a>, error: Error) -> ParseResult<'a, O> {
    Err(nom::Err::Failure(ParseError { input, error }))
}

fn magic(input: Input) -> ParseResult<Input> {
    let matched: ParseResult<Input> = tag(&[0xCA, 0xFE, 0xBA, 0xBE][..])(input);
    matched.or_else(|_| {
        let (_, magic) = be_u32(input)?;
        fail(input, Error::Magic { magic })
    })
}

fn cp_index(input: Input) -> ParseResult<ConstantPoolIndex> {
    be_u16(input)
}

fn check_cp_index_tag<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
    index: ConstantPoolIndex,
    tag: Tag,
) -> ParseResult<'a, ()> {
    match constant_pool.get(index) {
        None => fail(input, Error::ConstantPoolIndexOutOfBounds { index: index as usize }),
        Some(entry) if entry.tag() == tag => Ok((input, ())),
        Some(entry) => fail(
            input,
            Error::UnexpectedConstantPoolType {
                index: index as usize,
                expected: tag,
                actual: entry.tag(),
            },
        ),
    }
}

/// Parses for a constant pool index and verifies that the entry in the
/// constant pool matches the specified tag.
fn cp_index_tag<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
    tag: Tag,
) -> ParseResult<'a, ConstantPoolIndex> {
    let (rest, index) = cp_index(input)?;
    check_cp_index_tag(input, constant_pool, index, tag)?;
    Ok((rest, index))
}

/// Parses for a constant pool index that might be zero and verifies that
/// the entry in the constant pool matches the specified tag.
fn maybe_cp_index_tag<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
    tag: Tag,
) -> ParseResult<'a, ConstantPoolIndex> {
    let (rest, index) = cp_index(input)?;
    if index != 0 {
        check_cp_index_tag(input, constant_pool, index, tag)?;
    }
    Ok((rest, index))
}

/// Parses a Utf8 index and decodes the string it names.
fn cp_utf8<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
) -> ParseResult<'a, (ConstantPoolIndex, String)> {
    let (rest, index) = cp_index_tag(input, constant_pool, Tag::Utf8)?;
    match constant_pool.utf8_at(index) {
        Some(string) => Ok((rest, (index, string))),
        None => fail(input, Error::ModifiedUtf8 { index: index as usize }),
    }
}

fn modified_utf8(input: Input) -> ParseResult<Vec<u8>> {
    let (rest, length) = be_u16(input)?;
    let (rest, bytes) = take(length as usize)(rest)?;
    if let Some(position) = bytes.iter().position(|&b| modified_utf8::is_forbidden_byte(b)) {
        return fail(&bytes[position..], Error::IllegalModifiedUtf8 { byte: bytes[position] });
    }
    Ok((rest, bytes.to_vec()))
}

fn reference_kind(input: Input) -> ParseResult<ReferenceKind> {
    let (rest, kind) = be_u8(input)?;
    match ReferenceKind::from_u1(kind) {
        Some(kind) => Ok((rest, kind)),
        None => fail(input, Error::UnknownConstantPoolMethodReferenceTag { tag: kind }),
    }
}

fn cp_info(input: Input) -> ParseResult<ConstantPoolInfo> {
    let (i, tag) = be_u8(input)?;
    match Tag::from(tag) {
        Tag::Class => {
            let (i, name_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::Class { name_index }))
        }
        Tag::FieldRef => {
            let (i, class_index) = cp_index(i)?;
            let (i, name_and_type_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::FieldRef { class_index, name_and_type_index }))
        }
        Tag::MethodRef => {
            let (i, class_index) = cp_index(i)?;
            let (i, name_and_type_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::MethodRef { class_index, name_and_type_index }))
        }
        Tag::InterfaceMethodRef => {
            let (i, class_index) = cp_index(i)?;
            let (i, name_and_type_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index }))
        }
        Tag::String => {
            let (i, string_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::String { string_index }))
        }
        Tag::Integer => {
            let (i, bytes) = be_u32(i)?;
            Ok((i, ConstantPoolInfo::Integer { bytes }))
        }
        Tag::Float => {
            let (i, bytes) = be_u32(i)?;
            Ok((i, ConstantPoolInfo::Float { bytes }))
        }
        Tag::Long => {
            let (i, high_bytes) = be_u32(i)?;
            let (i, low_bytes) = be_u32(i)?;
            Ok((i, ConstantPoolInfo::Long { high_bytes, low_bytes }))
        }
        Tag::Double => {
            let (i, high_bytes) = be_u32(i)?;
            let (i, low_bytes) = be_u32(i)?;
            Ok((i, ConstantPoolInfo::Double { high_bytes, low_bytes }))
        }
        Tag::NameAndType => {
            let (i, name_index) = cp_index(i)?;
            let (i, descriptor_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::NameAndType { name_index, descriptor_index }))
        }
        Tag::Utf8 => {
            let (i, bytes) = modified_utf8(i)?;
            Ok((i, ConstantPoolInfo::Utf8 { bytes }))
        }
        Tag::MethodHandle => {
            let (i, reference_kind) = reference_kind(i)?;
            let (i, reference_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::MethodHandle { reference_kind, reference_index }))
        }
        Tag::MethodType => {
            let (i, descriptor_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::MethodType { descriptor_index }))
        }
        Tag::Dynamic => {
            let (i, bootstrap_method_attr_index) = be_u16(i)?;
            let (i, name_and_type_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::Dynamic { bootstrap_method_attr_index, name_and_type_index }))
        }
        Tag::InvokeDynamic => {
            let (i, bootstrap_method_attr_index) = be_u16(i)?;
            let (i, name_and_type_index) = cp_index(i)?;
            Ok((
                i,
                ConstantPoolInfo::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index },
            ))
        }
        Tag::Module => {
            let (i, name_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::Module { name_index }))
        }
        Tag::Package => {
            let (i, name_index) = cp_index(i)?;
            Ok((i, ConstantPoolInfo::Package { name_index }))
        }
        Tag::Unknown(tag) => fail(input, Error::UnknownConstantPoolTag { tag }),
    }
}

/// Decodes every entry first, then links them, so entries may refer forward.
fn constant_pool(input: Input) -> ParseResult<ConstantPool> {
    let (mut i, constant_pool_count) = be_u16(input)?;
    if constant_pool_count == 0 {
        return fail(input, Error::ConstantPool { constant_pool_count: 0 });
    }
    let slots = constant_pool_count as usize - 1;
    let mut entries = Vec::with_capacity(slots);
    let mut positions = Vec::with_capacity(slots);
    while entries.len() < slots {
        let (rest, entry) = cp_info(i)?;
        let wide = entry.is_wide();
        positions.push(i);
        entries.push(Some(entry));
        if wide {
            if entries.len() == slots {
                // a long or double may not occupy the last slot
                return fail(i, Error::ConstantPool { constant_pool_count: slots + 1 });
            }
            positions.push(i);
            entries.push(None);
        }
        i = rest;
    }
    let pool = ConstantPool::from_entries(entries);
    if let Err(link) = pool.validate() {
        let at = positions[link.referrer as usize - 1];
        let error = match link.actual {
            None => Error::ConstantPoolIndexOutOfBounds { index: link.index as usize },
            Some(actual) => Error::UnexpectedConstantPoolType {
                index: link.index as usize,
                expected: link.expected,
                actual,
            },
        };
        return fail(at, error);
    }
    trace!("parsed {} constant pool slots", pool.len());
    Ok((i, pool))
}

fn exception_table_entry<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
    code_length: usize,
) -> ParseResult<'a, ExceptionTableEntry> {
    let (i, start_pc) = be_u16(input)?;
    let (i, end_pc) = be_u16(i)?;
    let (i, handler_pc) = be_u16(i)?;
    let (i, catch_type) = maybe_cp_index_tag(i, constant_pool, Tag::Class)?;
    if start_pc >= end_pc || end_pc as usize > code_length || handler_pc as usize >= code_length {
        return fail(input, Error::ExceptionTableEntry { start_pc, end_pc, handler_pc });
    }
    Ok((i, ExceptionTableEntry { start_pc, end_pc, handler_pc, catch_type }))
}

fn verification_type_info<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
) -> ParseResult<'a, VerificationTypeInfo> {
    let (i, tag) = be_u8(input)?;
    match tag {
        0 => Ok((i, VerificationTypeInfo::Top)),
        1 => Ok((i, VerificationTypeInfo::Integer)),
        2 => Ok((i, VerificationTypeInfo::Float)),
        3 => Ok((i, VerificationTypeInfo::Double)),
        4 => Ok((i, VerificationTypeInfo::Long)),
        5 => Ok((i, VerificationTypeInfo::Null)),
        6 => Ok((i, VerificationTypeInfo::UninitializedThis)),
        7 => {
            let (i, class_index) = cp_index_tag(i, constant_pool, Tag::Class)?;
            Ok((i, VerificationTypeInfo::Object { class_index }))
        }
        8 => {
            let (i, offset) = be_u16(i)?;
            Ok((i, VerificationTypeInfo::Uninitialized { offset }))
        }
        _ => fail(input, Error::UnknownVerificationTypeInfoTag { tag }),
    }
}

fn stack_map_frame<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
) -> ParseResult<'a, StackMapFrame> {
    use self::stack_map_frame::Tag;

    let (i, frame_type) = be_u8(input)?;
    let vti = |i| verification_type_info(i, constant_pool);
    match Tag::from(frame_type) {
        Tag::SameFrame(t) => Ok((i, StackMapFrame::SameFrame { offset_delta: t })),
        Tag::SameLocals1StackItemFrame(t) => {
            let (i, stack_item) = vti(i)?;
            Ok((i, StackMapFrame::SameLocals1StackItemFrame { offset_delta: t - 64, stack_item }))
        }
        Tag::SameLocals1StackItemFrameExtended => {
            let (i, offset_delta) = be_u16(i)?;
            let (i, stack_item) = vti(i)?;
            Ok((i, StackMapFrame::SameLocals1StackItemFrameExtended { offset_delta, stack_item }))
        }
        Tag::ChopFrame(t) => {
            let (i, offset_delta) = be_u16(i)?;
            Ok((i, StackMapFrame::ChopFrame { offset_delta, num_chopped: 251 - t }))
        }
        Tag::SameFrameExtended => {
            let (i, offset_delta) = be_u16(i)?;
            Ok((i, StackMapFrame::SameFrameExtended { offset_delta }))
        }
        Tag::AppendFrame(t) => {
            let (i, offset_delta) = be_u16(i)?;
            let (i, locals) = count(vti, t as usize - 251)(i)?;
            Ok((i, StackMapFrame::AppendFrame { offset_delta, locals }))
        }
        Tag::FullFrame => {
            let (i, offset_delta) = be_u16(i)?;
            let (i, number_of_locals) = be_u16(i)?;
            let (i, locals) = count(vti, number_of_locals as usize)(i)?;
            let (i, number_of_stack_items) = be_u16(i)?;
            let (i, stack) = count(vti, number_of_stack_items as usize)(i)?;
            Ok((i, StackMapFrame::FullFrame { offset_delta, locals, stack }))
        }
        Tag::Reserved(tag) => fail(input, Error::ReservedStackMapFrameTag { tag }),
    }
}

fn code<'a>(input: Input<'a>, constant_pool: &ConstantPool) -> ParseResult<'a, Code> {
    let (i, max_stack) = be_u16(input)?;
    let (i, max_locals) = be_u16(i)?;
    let (rest, code_length) = be_u32(i)?;
    if code_length == 0 || code_length > u16::max_value() as u32 {
        return fail(i, Error::CodeLength { code_length: code_length as usize });
    }
    let (i, code) = take(code_length as usize)(rest)?;
    let (i, exception_table_length) = be_u16(i)?;
    let (i, exception_table) = count(
        |i| exception_table_entry(i, constant_pool, code.len()),
        exception_table_length as usize,
    )(i)?;
    let (i, attributes) = attributes(i, constant_pool)?;
    Ok((
        i,
        Code { max_stack, max_locals, code: code.to_vec(), exception_table, attributes },
    ))
}

fn line_number_info(input: Input) -> ParseResult<LineNumberInfo> {
    let (i, start_pc) = be_u16(input)?;
    let (i, line_number) = be_u16(i)?;
    Ok((i, LineNumberInfo { start_pc, line_number }))
}

fn local_variable_info<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
) -> ParseResult<'a, LocalVariableInfo> {
    let (i, start_pc) = be_u16(input)?;
    let (i, length) = be_u16(i)?;
    let (i, name_index) = cp_index_tag(i, constant_pool, Tag::Utf8)?;
    let (i, descriptor_index) = cp_index_tag(i, constant_pool, Tag::Utf8)?;
    let (i, index) = be_u16(i)?;
    Ok((i, LocalVariableInfo { start_pc, length, name_index, descriptor_index, index }))
}

/// Decodes the body of an attribute, which must be exactly `info`.
fn attribute_info<'a>(
    info: Input<'a>,
    attribute_name: &[u8],
    attribute_name_index: ConstantPoolIndex,
    constant_pool: &ConstantPool,
) -> ParseResult<'a, AttributeInfo> {
    let pool = constant_pool;
    match attribute_name {
        b"ConstantValue" => {
            let (i, constant_value_index) = cp_index(info)?;
            match pool.tag_at(constant_value_index) {
                Some(Tag::Integer) | Some(Tag::Float) | Some(Tag::Long) | Some(Tag::Double)
                | Some(Tag::String) => {}
                Some(actual) => {
                    return fail(
                        info,
                        Error::UnexpectedConstantPoolType {
                            index: constant_value_index as usize,
                            expected: Tag::Integer,
                            actual,
                        },
                    )
                }
                None => {
                    return fail(
                        info,
                        Error::ConstantPoolIndexOutOfBounds { index: constant_value_index as usize },
                    )
                }
            }
            Ok((i, AttributeInfo::ConstantValue { constant_value_index }))
        }
        b"Code" => {
            let (i, code) = code(info, pool)?;
            Ok((i, AttributeInfo::Code(code)))
        }
        b"StackMapTable" => {
            let (i, number_of_entries) = be_u16(info)?;
            let (i, entries) = count(|i| stack_map_frame(i, pool), number_of_entries as usize)(i)?;
            Ok((i, AttributeInfo::StackMapTable { entries }))
        }
        b"Exceptions" => {
            let (i, number_of_exceptions) = be_u16(info)?;
            let (i, exception_index_table) =
                count(|i| cp_index_tag(i, pool, Tag::Class), number_of_exceptions as usize)(i)?;
            Ok((i, AttributeInfo::Exceptions { exception_index_table }))
        }
        b"Synthetic" => Ok((info, AttributeInfo::Synthetic)),
        b"Signature" => {
            let (i, signature_index) = cp_index_tag(info, pool, Tag::Utf8)?;
            Ok((i, AttributeInfo::Signature { signature_index }))
        }
        b"SourceFile" => {
            let (i, sourcefile_index) = cp_index_tag(info, pool, Tag::Utf8)?;
            Ok((i, AttributeInfo::SourceFile { sourcefile_index }))
        }
        b"LineNumberTable" => {
            let (i, table_length) = be_u16(info)?;
            let (i, line_number_table) = count(line_number_info, table_length as usize)(i)?;
            Ok((i, AttributeInfo::LineNumberTable { line_number_table }))
        }
        b"LocalVariableTable" => {
            let (i, table_length) = be_u16(info)?;
            let (i, local_variable_table) =
                count(|i| local_variable_info(i, pool), table_length as usize)(i)?;
            Ok((i, AttributeInfo::LocalVariableTable { local_variable_table }))
        }
        b"Deprecated" => Ok((info, AttributeInfo::Deprecated)),
        _ => Ok((
            &info[info.len()..],
            AttributeInfo::Unknown { attribute_name_index, info: info.to_vec() },
        )),
    }
}

fn attribute<'a>(input: Input<'a>, constant_pool: &ConstantPool) -> ParseResult<'a, AttributeInfo> {
    let (i, attribute_name_index) = cp_index_tag(input, constant_pool, Tag::Utf8)?;
    let attribute_name = match constant_pool.get(attribute_name_index) {
        Some(ConstantPoolInfo::Utf8 { bytes }) => bytes.as_slice(),
        _ => return fail(input, Error::ConstantPoolIndexOutOfBounds { index: attribute_name_index as usize }),
    };
    let (i, attribute_length) = be_u32(i)?;
    let (i, info) = take(attribute_length as usize)(i)?;
    let (rest, attribute) = attribute_info(info, attribute_name, attribute_name_index, constant_pool)?;
    if !rest.is_empty() {
        return fail(
            rest,
            Error::AttributeLength {
                attribute_name: String::from_utf8_lossy(attribute_name).into_owned(),
                attribute_length: info.len(),
                consumed: info.offset(rest),
            },
        );
    }
    trace!("parsed {} attribute ({} bytes)", String::from_utf8_lossy(attribute_name), info.len());
    Ok((i, attribute))
}

fn attributes<'a>(
    input: Input<'a>,
    constant_pool: &ConstantPool,
) -> ParseResult<'a, Vec<AttributeInfo>> {
    let (i, attributes_count) = be_u16(input)?;
    count(|i| attribute(i, constant_pool), attributes_count as usize)(i)
}

fn field_info<'a>(input: Input<'a>, constant_pool: &ConstantPool) -> ParseResult<'a, FieldInfo> {
    let (i, access_flags) = be_u16(input)?;
    let (i, (name_index, _)) = cp_utf8(i, constant_pool)?;
    let (rest, (descriptor_index, descriptor)) = cp_utf8(i, constant_pool)?;
    if FieldType::decode(&descriptor).is_err() {
        return fail(i, Error::Descriptor { descriptor });
    }
    let (i, attributes) = attributes(rest, constant_pool)?;
    Ok((i, FieldInfo { access_flags, name_index, descriptor_index, attributes }))
}

fn method_info<'a>(input: Input<'a>, constant_pool: &ConstantPool) -> ParseResult<'a, MethodInfo> {
    let (i, access_flags) = be_u16(input)?;
    let (i, (name_index, _)) = cp_utf8(i, constant_pool)?;
    let (rest, (descriptor_index, descriptor)) = cp_utf8(i, constant_pool)?;
    if MethodDescriptor::decode(&descriptor).is_err() {
        return fail(i, Error::Descriptor { descriptor });
    }
    let (i, attributes) = attributes(rest, constant_pool)?;
    Ok((i, MethodInfo { access_flags, name_index, descriptor_index, attributes }))
}

pub fn class_file(input: Input) -> ParseResult<ClassFile> {
    let (i, _) = magic(input)?;
    let (rest, minor_version) = be_u16(i)?;
    let (rest, major_version) = be_u16(rest)?;
    if major_version < MIN_MAJOR_VERSION || major_version > MAX_MAJOR_VERSION {
        return fail(
            i,
            Error::UnsupportedVersion { major: major_version, minor: minor_version },
        );
    }
    let (i, constant_pool) = constant_pool(rest)?;
    let pool = &constant_pool;
    let (i, access_flags) = be_u16(i)?;
    let (i, this_class) = cp_index_tag(i, pool, Tag::Class)?;
    let (i, super_class) = maybe_cp_index_tag(i, pool, Tag::Class)?;
    let (i, interfaces_count) = be_u16(i)?;
    let (i, interfaces) = count(|i| cp_index_tag(i, pool, Tag::Class), interfaces_count as usize)(i)?;
    let (i, fields_count) = be_u16(i)?;
    let (i, fields) = count(|i| field_info(i, pool), fields_count as usize)(i)?;
    let (i, methods_count) = be_u16(i)?;
    let (i, methods) = count(|i| method_info(i, pool), methods_count as usize)(i)?;
    let (i, attributes) = attributes(i, pool)?;
    Ok((
        i,
        ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        },
    ))
}

/// Parses a complete class file. The whole input must be consumed.
pub fn parse_class_file(bytes: &[u8]) -> crate::Result<ClassFile> {
    debug!("parsing class file of {} bytes", bytes.len());
    let malformed = |offset, reason| {
        warn!("rejected class file at byte {}: {}", offset, reason);
        crate::Error::MalformedClass { offset, reason }
    };
    match class_file(bytes) {
        Ok((rest, class)) => {
            if rest.is_empty() {
                debug!("parsed class {:?}", class.name());
                Ok(class)
            } else {
                Err(malformed(bytes.offset(rest), Error::TrailingBytes { count: rest.len() }))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(malformed(bytes.offset(e.input), e.error))
        }
        Err(nom::Err::Incomplete(_)) => Err(malformed(bytes.len(), Error::Truncated)),
    }
}
