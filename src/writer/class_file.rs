use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::model::class_file::attribute::{
    AttributeInfo, Code, StackMapFrame, VerificationTypeInfo,
};
use crate::model::class_file::constant_pool::{self, ConstantPool, ConstantPoolInfo, Tag};
use crate::model::class_file::{ClassFile, FieldInfo, MethodInfo, MAGIC};
use crate::util::modified_utf8::to_modified_utf8;

type ConstantPoolIndex = crate::model::class_file::constant_pool_index;

/// Serializes `class`. The model is only read: attribute names and every other referenced entry
/// must already be in its constant pool.
pub fn write_class_file(class: &ClassFile) -> Result<Vec<u8>> {
    let writer = ClassFileWriter { pool: &class.constant_pool };
    let mut out = Vec::new();
    writer.class_file(&mut out, class)?;
    debug!("wrote class {:?} ({} bytes)", class.name(), out.len());
    Ok(out)
}

struct ClassFileWriter<'a> {
    pool: &'a ConstantPool,
}

fn count(what: &str, n: usize) -> Result<u16> {
    if n > u16::max_value() as usize {
        return Err(Error::EncodingError(format!("too many {} ({})", what, n)));
    }
    Ok(n as u16)
}

impl<'a> ClassFileWriter<'a> {
    /// Checks that `index` names an entry with one of the given tags.
    fn check(&self, index: ConstantPoolIndex, tags: &[Tag]) -> Result<ConstantPoolIndex> {
        match self.pool.tag_at(index) {
            Some(tag) if tags.contains(&tag) => Ok(index),
            actual => Err(Error::EncodingError(format!(
                "constant pool index #{} should be {:?}, found {:?}",
                index, tags, actual
            ))),
        }
    }

    fn attribute_name_index(&self, name: &str) -> Result<ConstantPoolIndex> {
        let entry = ConstantPoolInfo::Utf8 { bytes: to_modified_utf8(name) };
        self.pool.find(&entry).ok_or_else(|| {
            Error::EncodingError(format!("attribute name {} is not in the constant pool", name))
        })
    }

    fn class_file(&self, out: &mut Vec<u8>, class: &ClassFile) -> Result<()> {
        out.write_u32::<BigEndian>(MAGIC)?;
        out.write_u16::<BigEndian>(class.minor_version)?;
        out.write_u16::<BigEndian>(class.major_version)?;
        self.constant_pool(out)?;
        out.write_u16::<BigEndian>(class.access_flags)?;
        out.write_u16::<BigEndian>(self.check(class.this_class, &[Tag::Class])?)?;
        if class.super_class == 0 {
            out.write_u16::<BigEndian>(0)?;
        } else {
            out.write_u16::<BigEndian>(self.check(class.super_class, &[Tag::Class])?)?;
        }
        out.write_u16::<BigEndian>(count("interfaces", class.interfaces.len())?)?;
        for &interface in &class.interfaces {
            out.write_u16::<BigEndian>(self.check(interface, &[Tag::Class])?)?;
        }
        out.write_u16::<BigEndian>(count("fields", class.fields.len())?)?;
        for field in &class.fields {
            self.field_info(out, field)?;
        }
        out.write_u16::<BigEndian>(count("methods", class.methods.len())?)?;
        for method in &class.methods {
            self.method_info(out, method)?;
        }
        self.attributes(out, &class.attributes)
    }

    fn constant_pool(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.pool.len() > constant_pool::MAX_SLOTS {
            return Err(Error::PoolOverflow { slots: self.pool.len() });
        }
        out.write_u16::<BigEndian>(self.pool.count() as u16)?;
        for (_, entry) in self.pool.iter() {
            self.cp_info(out, entry)?;
        }
        Ok(())
    }

    fn cp_info(&self, out: &mut Vec<u8>, entry: &ConstantPoolInfo) -> Result<()> {
        out.write_u8(entry.tag_byte())?;
        match *entry {
            ConstantPoolInfo::Class { name_index }
            | ConstantPoolInfo::Module { name_index }
            | ConstantPoolInfo::Package { name_index } => {
                out.write_u16::<BigEndian>(name_index)?;
            }
            ConstantPoolInfo::FieldRef { class_index, name_and_type_index }
            | ConstantPoolInfo::MethodRef { class_index, name_and_type_index }
            | ConstantPoolInfo::InterfaceMethodRef { class_index, name_and_type_index } => {
                out.write_u16::<BigEndian>(class_index)?;
                out.write_u16::<BigEndian>(name_and_type_index)?;
            }
            ConstantPoolInfo::String { string_index } => {
                out.write_u16::<BigEndian>(string_index)?;
            }
            ConstantPoolInfo::Integer { bytes } | ConstantPoolInfo::Float { bytes } => {
                out.write_u32::<BigEndian>(bytes)?;
            }
            ConstantPoolInfo::Long { high_bytes, low_bytes }
            | ConstantPoolInfo::Double { high_bytes, low_bytes } => {
                out.write_u32::<BigEndian>(high_bytes)?;
                out.write_u32::<BigEndian>(low_bytes)?;
            }
            ConstantPoolInfo::NameAndType { name_index, descriptor_index } => {
                out.write_u16::<BigEndian>(name_index)?;
                out.write_u16::<BigEndian>(descriptor_index)?;
            }
            ConstantPoolInfo::Utf8 { ref bytes } => {
                if bytes.len() > u16::max_value() as usize {
                    return Err(Error::EncodingError(format!(
                        "Utf8 entry of {} bytes is too long",
                        bytes.len()
                    )));
                }
                out.write_u16::<BigEndian>(bytes.len() as u16)?;
                out.extend_from_slice(bytes);
            }
            ConstantPoolInfo::MethodHandle { reference_kind, reference_index } => {
                out.write_u8(reference_kind.as_u1())?;
                out.write_u16::<BigEndian>(reference_index)?;
            }
            ConstantPoolInfo::MethodType { descriptor_index } => {
                out.write_u16::<BigEndian>(descriptor_index)?;
            }
            ConstantPoolInfo::Dynamic { bootstrap_method_attr_index, name_and_type_index }
            | ConstantPoolInfo::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
                out.write_u16::<BigEndian>(bootstrap_method_attr_index)?;
                out.write_u16::<BigEndian>(name_and_type_index)?;
            }
        }
        Ok(())
    }

    fn field_info(&self, out: &mut Vec<u8>, field: &FieldInfo) -> Result<()> {
        out.write_u16::<BigEndian>(field.access_flags)?;
        out.write_u16::<BigEndian>(self.check(field.name_index, &[Tag::Utf8])?)?;
        out.write_u16::<BigEndian>(self.check(field.descriptor_index, &[Tag::Utf8])?)?;
        self.attributes(out, &field.attributes)
    }

    fn method_info(&self, out: &mut Vec<u8>, method: &MethodInfo) -> Result<()> {
        out.write_u16::<BigEndian>(method.access_flags)?;
        out.write_u16::<BigEndian>(self.check(method.name_index, &[Tag::Utf8])?)?;
        out.write_u16::<BigEndian>(self.check(method.descriptor_index, &[Tag::Utf8])?)?;
        self.attributes(out, &method.attributes)
    }

    fn attributes(&self, out: &mut Vec<u8>, attributes: &[AttributeInfo]) -> Result<()> {
        out.write_u16::<BigEndian>(count("attributes", attributes.len())?)?;
        for attribute in attributes {
            self.attribute(out, attribute)?;
        }
        Ok(())
    }

    /// Writes the attribute header, then the body from a scratch buffer so its length is known.
    fn attribute(&self, out: &mut Vec<u8>, attribute: &AttributeInfo) -> Result<()> {
        let attribute_name_index = match *attribute {
            AttributeInfo::Unknown { attribute_name_index, .. } => {
                self.check(attribute_name_index, &[Tag::Utf8])?
            }
            _ => self.attribute_name_index(attribute.name().unwrap_or_default())?,
        };
        let mut info = Vec::new();
        self.attribute_info(&mut info, attribute)?;
        if info.len() > u32::max_value() as usize {
            return Err(Error::EncodingError(format!("attribute of {} bytes", info.len())));
        }
        out.write_u16::<BigEndian>(attribute_name_index)?;
        out.write_u32::<BigEndian>(info.len() as u32)?;
        out.extend_from_slice(&info);
        Ok(())
    }

    fn attribute_info(&self, out: &mut Vec<u8>, attribute: &AttributeInfo) -> Result<()> {
        match *attribute {
            AttributeInfo::ConstantValue { constant_value_index } => {
                let loadable = [Tag::Integer, Tag::Float, Tag::Long, Tag::Double, Tag::String];
                out.write_u16::<BigEndian>(self.check(constant_value_index, &loadable)?)?;
            }
            AttributeInfo::Code(ref code) => self.code(out, code)?,
            AttributeInfo::StackMapTable { ref entries } => {
                out.write_u16::<BigEndian>(count("stack map frames", entries.len())?)?;
                for frame in entries {
                    self.stack_map_frame(out, frame)?;
                }
            }
            AttributeInfo::Exceptions { ref exception_index_table } => {
                out.write_u16::<BigEndian>(count("exceptions", exception_index_table.len())?)?;
                for &index in exception_index_table {
                    out.write_u16::<BigEndian>(self.check(index, &[Tag::Class])?)?;
                }
            }
            AttributeInfo::Synthetic | AttributeInfo::Deprecated => {}
            AttributeInfo::Signature { signature_index: index }
            | AttributeInfo::SourceFile { sourcefile_index: index } => {
                out.write_u16::<BigEndian>(self.check(index, &[Tag::Utf8])?)?;
            }
            AttributeInfo::LineNumberTable { ref line_number_table } => {
                out.write_u16::<BigEndian>(count("line numbers", line_number_table.len())?)?;
                for line in line_number_table {
                    out.write_u16::<BigEndian>(line.start_pc)?;
                    out.write_u16::<BigEndian>(line.line_number)?;
                }
            }
            AttributeInfo::LocalVariableTable { ref local_variable_table } => {
                out.write_u16::<BigEndian>(count("local variables", local_variable_table.len())?)?;
                for local in local_variable_table {
                    out.write_u16::<BigEndian>(local.start_pc)?;
                    out.write_u16::<BigEndian>(local.length)?;
                    out.write_u16::<BigEndian>(self.check(local.name_index, &[Tag::Utf8])?)?;
                    out.write_u16::<BigEndian>(self.check(local.descriptor_index, &[Tag::Utf8])?)?;
                    out.write_u16::<BigEndian>(local.index)?;
                }
            }
            AttributeInfo::Unknown { ref info, .. } => out.extend_from_slice(info),
        }
        Ok(())
    }

    fn code(&self, out: &mut Vec<u8>, code: &Code) -> Result<()> {
        if code.code.is_empty() || code.code.len() > u16::max_value() as usize {
            return Err(Error::EncodingError(format!(
                "code length {} is outside 1..=65535",
                code.code.len()
            )));
        }
        out.write_u16::<BigEndian>(code.max_stack)?;
        out.write_u16::<BigEndian>(code.max_locals)?;
        out.write_u32::<BigEndian>(code.code.len() as u32)?;
        out.extend_from_slice(&code.code);
        out.write_u16::<BigEndian>(count("exception handlers", code.exception_table.len())?)?;
        for entry in &code.exception_table {
            out.write_u16::<BigEndian>(entry.start_pc)?;
            out.write_u16::<BigEndian>(entry.end_pc)?;
            out.write_u16::<BigEndian>(entry.handler_pc)?;
            if entry.catch_type == 0 {
                out.write_u16::<BigEndian>(0)?;
            } else {
                out.write_u16::<BigEndian>(self.check(entry.catch_type, &[Tag::Class])?)?;
            }
        }
        self.attributes(out, &code.attributes)
    }

    fn stack_map_frame(&self, out: &mut Vec<u8>, frame: &StackMapFrame) -> Result<()> {
        let frame_type = frame.frame_type().ok_or_else(|| {
            Error::EncodingError(format!("stack map frame {:?} is out of range", frame))
        })?;
        out.write_u8(frame_type)?;
        match *frame {
            StackMapFrame::SameFrame { .. } => {}
            StackMapFrame::SameLocals1StackItemFrame { ref stack_item, .. } => {
                self.verification_type_info(out, stack_item)?;
            }
            StackMapFrame::SameLocals1StackItemFrameExtended { offset_delta, ref stack_item } => {
                out.write_u16::<BigEndian>(offset_delta)?;
                self.verification_type_info(out, stack_item)?;
            }
            StackMapFrame::ChopFrame { offset_delta, .. }
            | StackMapFrame::SameFrameExtended { offset_delta } => {
                out.write_u16::<BigEndian>(offset_delta)?;
            }
            StackMapFrame::AppendFrame { offset_delta, ref locals } => {
                out.write_u16::<BigEndian>(offset_delta)?;
                for local in locals {
                    self.verification_type_info(out, local)?;
                }
            }
            StackMapFrame::FullFrame { offset_delta, ref locals, ref stack } => {
                out.write_u16::<BigEndian>(offset_delta)?;
                out.write_u16::<BigEndian>(count("frame locals", locals.len())?)?;
                for local in locals {
                    self.verification_type_info(out, local)?;
                }
                out.write_u16::<BigEndian>(count("frame stack items", stack.len())?)?;
                for item in stack {
                    self.verification_type_info(out, item)?;
                }
            }
        }
        Ok(())
    }

    fn verification_type_info(&self, out: &mut Vec<u8>, info: &VerificationTypeInfo) -> Result<()> {
        out.write_u8(info.tag())?;
        match *info {
            VerificationTypeInfo::Object { class_index } => {
                out.write_u16::<BigEndian>(self.check(class_index, &[Tag::Class])?)?;
            }
            VerificationTypeInfo::Uninitialized { offset } => {
                out.write_u16::<BigEndian>(offset)?;
            }
            _ => {}
        }
        Ok(())
    }
}
