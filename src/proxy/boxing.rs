//! Moving values between primitive form and the `Object`s a handler sees.

use crate::assembler::CodeBuilder;
use crate::error::Result;
use crate::model::descriptor::FieldType;

pub const OBJECT: &str = "java/lang/Object";
const NUMBER: &str = "java/lang/Number";
const BOOLEAN: &str = "java/lang/Boolean";
const CHARACTER: &str = "java/lang/Character";

/// The wrapper class for a primitive type.
pub fn wrapper(field_type: &FieldType) -> Option<&'static str> {
    Some(match *field_type {
        FieldType::Boolean => BOOLEAN,
        FieldType::Byte => "java/lang/Byte",
        FieldType::Char => CHARACTER,
        FieldType::Short => "java/lang/Short",
        FieldType::Int => "java/lang/Integer",
        FieldType::Long => "java/lang/Long",
        FieldType::Float => "java/lang/Float",
        FieldType::Double => "java/lang/Double",
        FieldType::Object(_) | FieldType::Array(_) => return None,
    })
}

/// The class and method that turn a wrapper back into `field_type`. Every numeric type goes
/// through `Number`, so an `Integer` result satisfies a `long` return.
fn unboxing_method(field_type: &FieldType) -> Option<(&'static str, &'static str)> {
    Some(match *field_type {
        FieldType::Boolean => (BOOLEAN, "booleanValue"),
        FieldType::Char => (CHARACTER, "charValue"),
        FieldType::Byte => (NUMBER, "byteValue"),
        FieldType::Short => (NUMBER, "shortValue"),
        FieldType::Int => (NUMBER, "intValue"),
        FieldType::Long => (NUMBER, "longValue"),
        FieldType::Float => (NUMBER, "floatValue"),
        FieldType::Double => (NUMBER, "doubleValue"),
        FieldType::Object(_) | FieldType::Array(_) => return None,
    })
}

/// Replaces a value of `field_type` on top of the stack with an object. References are left
/// alone.
pub fn box_value(code: &mut CodeBuilder<'_>, field_type: &FieldType) -> Result<()> {
    if let Some(wrapper) = wrapper(field_type) {
        let descriptor = format!("({})L{};", field_type.descriptor(), wrapper);
        code.invoke_static(wrapper, "valueOf", &descriptor)?;
    }
    Ok(())
}

/// Replaces the object on top of the stack with a value of `field_type`.
pub fn unbox_value(code: &mut CodeBuilder<'_>, field_type: &FieldType) -> Result<()> {
    match unboxing_method(field_type) {
        Some((owner, method)) => {
            let descriptor = format!("(){}", field_type.descriptor());
            code.check_cast(owner)?;
            code.invoke_virtual(owner, method, &descriptor)?;
        }
        None => match *field_type {
            FieldType::Object(ref class) if class == OBJECT => {}
            FieldType::Object(ref class) => {
                code.check_cast(class)?;
            }
            _ => {
                code.check_cast(&field_type.descriptor())?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::opcode;
    use crate::model::class_file::ConstantPool;
    use crate::model::descriptor::DescriptorCache;

    fn assemble<F>(descriptor: &str, body: F) -> (ConstantPool, Vec<u8>)
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let mut pool = ConstantPool::new();
        let descriptors = DescriptorCache::new();
        let code = {
            let mut code = CodeBuilder::new(&mut pool, &descriptors, descriptor, true).unwrap();
            body(&mut code).unwrap();
            code.finish().unwrap().code
        };
        (pool, code)
    }

    #[test]
    fn boxes_through_value_of() {
        let (pool, code) = assemble("(J)Ljava/lang/Object;", |c| {
            c.load_param(0)?;
            box_value(c, &FieldType::Long)?;
            c.emit_return();
            Ok(())
        });
        assert_eq!(code[1], opcode::INVOKESTATIC);
        let method = pool.member_ref_at(u16::from(code[2]) << 8 | u16::from(code[3])).unwrap();
        assert_eq!(method.owner, "java/lang/Long");
        assert_eq!(method.name, "valueOf");
        assert_eq!(method.descriptor, "(J)Ljava/lang/Long;");
    }

    #[test]
    fn references_are_not_boxed() {
        let (_, code) = assemble("(Ljava/lang/String;)Ljava/lang/Object;", |c| {
            c.load_param(0)?;
            box_value(c, &FieldType::object("java/lang/String"))?;
            c.emit_return();
            Ok(())
        });
        assert_eq!(code, vec![opcode::ALOAD_0, opcode::ARETURN]);
    }

    #[test]
    fn numbers_unbox_through_number() {
        let (pool, code) = assemble("(Ljava/lang/Object;)J", |c| {
            c.load_param(0)?;
            unbox_value(c, &FieldType::Long)?;
            c.emit_return();
            Ok(())
        });
        assert_eq!(code[1], opcode::CHECKCAST);
        let class = pool.class_name_at(u16::from(code[2]) << 8 | u16::from(code[3]));
        assert_eq!(class, Some(NUMBER.to_owned()));
        let method = pool.member_ref_at(u16::from(code[5]) << 8 | u16::from(code[6])).unwrap();
        assert_eq!((method.name.as_str(), method.descriptor.as_str()), ("longValue", "()J"));
    }

    #[test]
    fn arrays_cast_to_their_descriptor() {
        let (pool, code) = assemble("(Ljava/lang/Object;)[I", |c| {
            c.load_param(0)?;
            unbox_value(c, &FieldType::array_of(FieldType::Int))?;
            c.emit_return();
            Ok(())
        });
        let class = pool.class_name_at(u16::from(code[2]) << 8 | u16::from(code[3]));
        assert_eq!(class, Some("[I".to_owned()));
    }
}
