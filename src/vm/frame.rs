use std::rc::Rc;

use crate::bytecode::{array_type, opcode};
use crate::model::class_file::constant_pool::MemberRef;
use crate::model::class_file::Code;
use crate::model::descriptor::FieldType;
use crate::vm::class::{literal_value, Class};
use crate::vm::class_loader::ClassLoader;
use crate::vm::native;
use crate::vm::value::{Object, Value};
use crate::vm::Error;

/// What running one instruction did to the frame.
enum Flow {
    Continue,
    Return(Option<Value>),
}

/// A frame is used to store data and partial results, as well as to perform dynamic linking,
/// return values for methods, and dispatch exceptions.
#[derive(Debug)]
pub struct Frame<'a> {
    /// The class declaring the currently executing method.
    class: &'a Class,
    code: &'a Code,
    /// The current program counter.
    pc: usize,
    /// The local variables of the current method.
    /// Values that occupy two indices (`long` and `double`) are stored in one slot followed by a
    /// `None` value in the subsequent index.
    locals: Vec<Option<Value>>,
    /// The operand stack manipulated by the instructions of the current method.
    stack: Vec<Value>,
    /// Depth of the operand stack in slots, checked against `max_stack`.
    depth: u16,
}

fn verify<T>(reason: String) -> Result<T, Error> {
    Err(Error::Verify(reason))
}

impl<'a> Frame<'a> {
    pub fn new(class: &'a Class, code: &'a Code, locals: Vec<Option<Value>>) -> Self {
        Frame { class, code, pc: 0, locals, stack: Vec::new(), depth: 0 }
    }

    fn read_u1(&mut self) -> Result<u8, Error> {
        match self.code.code.get(self.pc) {
            Some(&byte) => {
                self.pc += 1;
                Ok(byte)
            }
            None => verify(format!("code ends inside the instruction at {}", self.pc)),
        }
    }

    fn read_u2(&mut self) -> Result<u16, Error> {
        Ok(u16::from(self.read_u1()?) << 8 | u16::from(self.read_u1()?))
    }

    fn read_i2(&mut self) -> Result<i16, Error> {
        Ok(self.read_u2()? as i16)
    }

    fn push(&mut self, value: Value) -> Result<(), Error> {
        self.depth += value.slots();
        if self.depth > self.code.max_stack {
            return verify(format!(
                "operand stack exceeds max_stack {} at {}",
                self.code.max_stack, self.pc
            ));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, Error> {
        match self.stack.pop() {
            Some(value) => {
                self.depth -= value.slots();
                Ok(value)
            }
            None => verify(format!("operand stack underflow at {}", self.pc)),
        }
    }

    fn pop_args(&mut self, count: usize) -> Result<Vec<Value>, Error> {
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            args.push(self.pop()?);
        }
        args.reverse();
        Ok(args)
    }

    fn load(&mut self, index: usize) -> Result<(), Error> {
        match self.locals.get(index) {
            Some(&Some(ref value)) => {
                let value = value.clone();
                self.push(value)
            }
            Some(&None) => verify(format!("local {} is not initialized", index)),
            None => verify(format!("local {} is out of range", index)),
        }
    }

    fn store(&mut self, index: usize) -> Result<(), Error> {
        let value = self.pop()?;
        let slots = usize::from(value.slots());
        if index + slots > self.locals.len() {
            return verify(format!("local {} is out of range", index));
        }
        // a category 2 value invalidates the slot after it
        if slots == 2 {
            self.locals[index + 1] = None;
        }
        self.locals[index] = Some(value);
        Ok(())
    }

    fn member(&self, index: u16) -> Result<MemberRef, Error> {
        self.class
            .constant_pool()
            .member_ref_at(index)
            .ok_or_else(|| Error::Verify(format!("constant {} is not a member reference", index)))
    }

    fn class_name(&self, index: u16) -> Result<String, Error> {
        self.class
            .constant_pool()
            .class_name_at(index)
            .ok_or_else(|| Error::Verify(format!("constant {} is not a class", index)))
    }

    /// Reads a branch offset and jumps if `condition` holds. Offsets are relative to the opcode
    /// at `start`.
    fn branch(&mut self, start: usize, condition: bool) -> Result<(), Error> {
        let offset = self.read_i2()?;
        if condition {
            let target = start as isize + isize::from(offset);
            if target < 0 || target as usize >= self.code.code.len() {
                return verify(format!("branch at {} leaves the code", start));
            }
            self.pc = target as usize;
        }
        Ok(())
    }

    /// Transfers control to the first handler covering `pc` that catches `exception`.
    fn catch(&mut self, loader: &ClassLoader, pc: usize, exception: Value) -> Result<(), Error> {
        let code = self.code;
        for entry in &code.exception_table {
            if pc < usize::from(entry.start_pc) || pc >= usize::from(entry.end_pc) {
                continue;
            }
            let caught = entry.catch_type == 0
                || loader.is_instance(&exception, &self.class_name(entry.catch_type)?);
            if caught {
                trace!("{} caught at {}", exception.class_name(), entry.handler_pc);
                self.stack.clear();
                self.depth = 0;
                self.push(exception)?;
                self.pc = usize::from(entry.handler_pc);
                return Ok(());
            }
        }
        Err(Error::Thrown(exception))
    }

    pub fn run(mut self, loader: &ClassLoader) -> Result<Option<Value>, Error> {
        loop {
            let start = self.pc;
            match self.step(loader, start) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return(value)) => return Ok(value),
                Err(Error::Thrown(exception)) => self.catch(loader, start, exception)?,
                Err(error) => return Err(error),
            }
        }
    }

    fn step(&mut self, loader: &ClassLoader, start: usize) -> Result<Flow, Error> {
        macro_rules! push {
            ($value:expr) => {{
                let value = $value;
                self.push(value)?;
            }};
        }

        macro_rules! pop {
            (Reference) => {{
                match self.pop()? {
                    value @ Value::Reference(_) | value @ Value::NullReference => value,
                    other => return verify(format!("expected a reference, found {:?}", other)),
                }
            }};
            ($kind:ident) => {{
                match self.pop()? {
                    Value::$kind(value) => value,
                    other => {
                        return verify(format!(
                            "expected {}, found {:?}",
                            stringify!($kind),
                            other
                        ))
                    }
                }
            }};
        }

        macro_rules! binary {
            ($kind:ident, |$a:ident, $b:ident| $result:expr) => {{
                let $b = pop!($kind);
                let $a = pop!($kind);
                push!(Value::$kind($result));
            }};
        }

        macro_rules! shift {
            ($kind:ident, |$a:ident, $b:ident| $result:expr) => {{
                let $b = pop!(Int);
                let $a = pop!($kind);
                push!(Value::$kind($result));
            }};
        }

        macro_rules! unary {
            ($from:ident => $to:ident, |$a:ident| $result:expr) => {{
                let $a = pop!($from);
                push!(Value::$to($result));
            }};
        }

        macro_rules! compare {
            ($kind:ident, $nan:expr) => {{
                let b = pop!($kind);
                let a = pop!($kind);
                push!(Value::Int(match a.partial_cmp(&b) {
                    Some(ordering) => ordering as i32,
                    None => $nan,
                }));
            }};
        }

        let op = self.read_u1()?;
        match op {
            opcode::NOP => {}
            opcode::ACONST_NULL => push!(Value::NullReference),
            opcode::ICONST_M1..=opcode::ICONST_5 => {
                push!(Value::Int(i32::from(op) - i32::from(opcode::ICONST_0)))
            }
            opcode::LCONST_0 | opcode::LCONST_1 => {
                push!(Value::Long(i64::from(op - opcode::LCONST_0)))
            }
            opcode::FCONST_0..=opcode::FCONST_2 => {
                push!(Value::Float(f32::from(op - opcode::FCONST_0)))
            }
            opcode::DCONST_0 | opcode::DCONST_1 => {
                push!(Value::Double(f64::from(op - opcode::DCONST_0)))
            }
            opcode::BIPUSH => {
                let value = self.read_u1()? as i8;
                push!(Value::Int(i32::from(value)))
            }
            opcode::SIPUSH => {
                let value = self.read_i2()?;
                push!(Value::Int(i32::from(value)))
            }
            opcode::LDC | opcode::LDC_W | opcode::LDC2_W => {
                let index = if op == opcode::LDC {
                    u16::from(self.read_u1()?)
                } else {
                    self.read_u2()?
                };
                match self.class.constant_pool().literal_at(index) {
                    Some(literal) => push!(literal_value(&literal)),
                    None => return verify(format!("constant {} cannot be loaded", index)),
                }
            }

            opcode::ILOAD..=opcode::ALOAD => {
                let index = self.read_u1()?;
                self.load(usize::from(index))?
            }
            opcode::ILOAD_0..=opcode::ALOAD_3 => {
                self.load(usize::from((op - opcode::ILOAD_0) % 4))?
            }
            opcode::ISTORE..=opcode::ASTORE => {
                let index = self.read_u1()?;
                self.store(usize::from(index))?
            }
            opcode::ISTORE_0..=opcode::ASTORE_3 => {
                self.store(usize::from((op - opcode::ISTORE_0) % 4))?
            }
            opcode::WIDE => {
                let widened = self.read_u1()?;
                let index = usize::from(self.read_u2()?);
                match widened {
                    opcode::ILOAD..=opcode::ALOAD => self.load(index)?,
                    opcode::ISTORE..=opcode::ASTORE => self.store(index)?,
                    opcode::IINC => {
                        let delta = self.read_i2()?;
                        self.increment(index, i32::from(delta))?;
                    }
                    _ => return verify(format!("wide {:#04x} at {}", widened, start)),
                }
            }
            opcode::IINC => {
                let index = self.read_u1()?;
                let delta = self.read_u1()? as i8;
                self.increment(usize::from(index), i32::from(delta))?;
            }

            opcode::IALOAD..=opcode::SALOAD => {
                let index = pop!(Int);
                let array = array_object(self.pop()?)?;
                if let Object::Array { ref values, .. } = *array {
                    let value = element(&values.borrow(), index)?.clone();
                    push!(value);
                }
            }
            opcode::IASTORE..=opcode::SASTORE => {
                let value = self.pop()?;
                let index = pop!(Int);
                let array = array_object(self.pop()?)?;
                if let Object::Array { ref values, ref component } = *array {
                    if op == opcode::AASTORE && !value.is_null() {
                        let expected = match *component {
                            FieldType::Object(ref class) => class.clone(),
                            ref other => other.descriptor(),
                        };
                        if !loader.is_instance(&value, &expected) {
                            return Err(Error::ClassCast {
                                from: value.class_name(),
                                to: expected,
                            });
                        }
                    }
                    let value = narrow(op, value);
                    let mut values = values.borrow_mut();
                    element(&values, index)?;
                    values[index as usize] = value;
                }
            }
            opcode::ARRAYLENGTH => {
                let array = array_object(self.pop()?)?;
                if let Object::Array { ref values, .. } = *array {
                    let length = values.borrow().len() as i32;
                    push!(Value::Int(length));
                }
            }
            opcode::NEWARRAY => {
                let component = match self.read_u1()? {
                    array_type::T_BOOLEAN => FieldType::Boolean,
                    array_type::T_CHAR => FieldType::Char,
                    array_type::T_FLOAT => FieldType::Float,
                    array_type::T_DOUBLE => FieldType::Double,
                    array_type::T_BYTE => FieldType::Byte,
                    array_type::T_SHORT => FieldType::Short,
                    array_type::T_INT => FieldType::Int,
                    array_type::T_LONG => FieldType::Long,
                    other => return verify(format!("unknown array type {}", other)),
                };
                let count = pop!(Int);
                push!(new_array(component, count)?);
            }
            opcode::ANEWARRAY => {
                let index = self.read_u2()?;
                let name = self.class_name(index)?;
                let component = if name.starts_with('[') {
                    FieldType::decode(&name)?
                } else {
                    FieldType::object(&name)
                };
                let count = pop!(Int);
                push!(new_array(component, count)?);
            }

            opcode::POP => {
                self.pop()?;
            }
            opcode::POP2 => {
                if self.pop()?.slots() == 1 {
                    self.pop()?;
                }
            }
            opcode::DUP => {
                let value = self.pop()?;
                push!(value.clone());
                push!(value);
            }
            opcode::DUP_X1 => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                push!(value1.clone());
                push!(value2);
                push!(value1);
            }
            opcode::DUP2 => {
                let value1 = self.pop()?;
                if value1.slots() == 2 {
                    push!(value1.clone());
                    push!(value1);
                } else {
                    let value2 = self.pop()?;
                    push!(value2.clone());
                    push!(value1.clone());
                    push!(value2);
                    push!(value1);
                }
            }
            opcode::SWAP => {
                let value1 = self.pop()?;
                let value2 = self.pop()?;
                push!(value1);
                push!(value2);
            }

            opcode::IADD => binary!(Int, |a, b| a.wrapping_add(b)),
            opcode::LADD => binary!(Long, |a, b| a.wrapping_add(b)),
            opcode::FADD => binary!(Float, |a, b| a + b),
            opcode::DADD => binary!(Double, |a, b| a + b),
            opcode::ISUB => binary!(Int, |a, b| a.wrapping_sub(b)),
            opcode::LSUB => binary!(Long, |a, b| a.wrapping_sub(b)),
            opcode::FSUB => binary!(Float, |a, b| a - b),
            opcode::DSUB => binary!(Double, |a, b| a - b),
            opcode::IMUL => binary!(Int, |a, b| a.wrapping_mul(b)),
            opcode::LMUL => binary!(Long, |a, b| a.wrapping_mul(b)),
            opcode::FMUL => binary!(Float, |a, b| a * b),
            opcode::DMUL => binary!(Double, |a, b| a * b),
            opcode::IDIV => binary!(Int, |a, b| a.wrapping_div(non_zero(i64::from(b), b)?)),
            opcode::LDIV => binary!(Long, |a, b| a.wrapping_div(non_zero(b, b)?)),
            opcode::FDIV => binary!(Float, |a, b| a / b),
            opcode::DDIV => binary!(Double, |a, b| a / b),
            opcode::IREM => binary!(Int, |a, b| a.wrapping_rem(non_zero(i64::from(b), b)?)),
            opcode::LREM => binary!(Long, |a, b| a.wrapping_rem(non_zero(b, b)?)),
            opcode::FREM => binary!(Float, |a, b| a % b),
            opcode::DREM => binary!(Double, |a, b| a % b),
            opcode::INEG => unary!(Int => Int, |a| a.wrapping_neg()),
            opcode::LNEG => unary!(Long => Long, |a| a.wrapping_neg()),
            opcode::FNEG => unary!(Float => Float, |a| -a),
            opcode::DNEG => unary!(Double => Double, |a| -a),
            opcode::ISHL => shift!(Int, |a, b| a.wrapping_shl(b as u32 & 0x1f)),
            opcode::LSHL => shift!(Long, |a, b| a.wrapping_shl(b as u32 & 0x3f)),
            opcode::ISHR => shift!(Int, |a, b| a.wrapping_shr(b as u32 & 0x1f)),
            opcode::LSHR => shift!(Long, |a, b| a.wrapping_shr(b as u32 & 0x3f)),
            opcode::IUSHR => shift!(Int, |a, b| ((a as u32) >> (b as u32 & 0x1f)) as i32),
            opcode::LUSHR => shift!(Long, |a, b| ((a as u64) >> (b as u32 & 0x3f)) as i64),
            opcode::IAND => binary!(Int, |a, b| a & b),
            opcode::LAND => binary!(Long, |a, b| a & b),
            opcode::IOR => binary!(Int, |a, b| a | b),
            opcode::LOR => binary!(Long, |a, b| a | b),
            opcode::IXOR => binary!(Int, |a, b| a ^ b),
            opcode::LXOR => binary!(Long, |a, b| a ^ b),

            opcode::I2L => unary!(Int => Long, |a| i64::from(a)),
            opcode::I2F => unary!(Int => Float, |a| a as f32),
            opcode::I2D => unary!(Int => Double, |a| f64::from(a)),
            opcode::L2I => unary!(Long => Int, |a| a as i32),
            opcode::L2F => unary!(Long => Float, |a| a as f32),
            opcode::L2D => unary!(Long => Double, |a| a as f64),
            opcode::F2I => unary!(Float => Int, |a| a as i32),
            opcode::F2L => unary!(Float => Long, |a| a as i64),
            opcode::F2D => unary!(Float => Double, |a| f64::from(a)),
            opcode::D2I => unary!(Double => Int, |a| a as i32),
            opcode::D2L => unary!(Double => Long, |a| a as i64),
            opcode::D2F => unary!(Double => Float, |a| a as f32),
            opcode::I2B => unary!(Int => Int, |a| i32::from(a as i8)),
            opcode::I2C => unary!(Int => Int, |a| i32::from(a as u16)),
            opcode::I2S => unary!(Int => Int, |a| i32::from(a as i16)),

            opcode::LCMP => compare!(Long, 0),
            opcode::FCMPL => compare!(Float, -1),
            opcode::FCMPG => compare!(Float, 1),
            opcode::DCMPL => compare!(Double, -1),
            opcode::DCMPG => compare!(Double, 1),

            opcode::IFEQ..=opcode::IFLE => {
                let value = pop!(Int);
                let taken = compare_int(op - opcode::IFEQ, value, 0);
                self.branch(start, taken)?;
            }
            opcode::IF_ICMPEQ..=opcode::IF_ICMPLE => {
                let b = pop!(Int);
                let a = pop!(Int);
                let taken = compare_int(op - opcode::IF_ICMPEQ, a, b);
                self.branch(start, taken)?;
            }
            opcode::IF_ACMPEQ | opcode::IF_ACMPNE => {
                let b = pop!(Reference);
                let a = pop!(Reference);
                let same = a.same_reference(&b);
                self.branch(start, same == (op == opcode::IF_ACMPEQ))?;
            }
            opcode::IFNULL | opcode::IFNONNULL => {
                let value = pop!(Reference);
                self.branch(start, value.is_null() == (op == opcode::IFNULL))?;
            }
            opcode::GOTO => self.branch(start, true)?,

            opcode::IRETURN..=opcode::ARETURN => {
                let value = self.pop()?;
                return Ok(Flow::Return(Some(value)));
            }
            opcode::RETURN => return Ok(Flow::Return(None)),

            opcode::GETSTATIC => {
                let index = self.read_u2()?;
                let field = self.member(index)?;
                let value = loader.resolve_class(&field.owner)?.get_static(&field.name)?;
                push!(value);
            }
            opcode::PUTSTATIC => {
                let index = self.read_u2()?;
                let field = self.member(index)?;
                let value = self.pop()?;
                loader.resolve_class(&field.owner)?.put_static(&field.name, value)?;
            }
            opcode::GETFIELD => {
                let index = self.read_u2()?;
                let field = self.member(index)?;
                let object = pop!(Reference);
                push!(loader.get_field(&object, &field.name)?);
            }
            opcode::PUTFIELD => {
                let index = self.read_u2()?;
                let field = self.member(index)?;
                let value = self.pop()?;
                let object = pop!(Reference);
                loader.put_field(&object, &field.name, value)?;
            }

            opcode::INVOKEVIRTUAL
            | opcode::INVOKESPECIAL
            | opcode::INVOKESTATIC
            | opcode::INVOKEINTERFACE => {
                let index = self.read_u2()?;
                if op == opcode::INVOKEINTERFACE {
                    self.read_u2()?;
                }
                let method = self.member(index)?;
                let descriptor = loader.descriptors().method(&method.descriptor)?;
                let receiver = if op == opcode::INVOKESTATIC { 0 } else { 1 };
                let args = self.pop_args(descriptor.params.len() + receiver)?;
                let result = match op {
                    opcode::INVOKESTATIC => {
                        loader.dispatch_static(&method.owner, &method.name, &method.descriptor, args)
                    }
                    opcode::INVOKESPECIAL => loader.dispatch_special(
                        &method.owner,
                        &method.name,
                        &method.descriptor,
                        args,
                    ),
                    _ => loader.dispatch_virtual(&method.name, &method.descriptor, args),
                }?;
                if let Some(value) = result {
                    push!(value);
                }
            }

            opcode::NEW => {
                let index = self.read_u2()?;
                let name = self.class_name(index)?;
                match native::new_object(&name) {
                    Some(object) => push!(object),
                    None => {
                        let class = loader.resolve_class(&name)?;
                        push!(Value::Reference(Rc::new(Object::new_scalar(class))));
                    }
                }
            }
            opcode::ATHROW => match pop!(Reference) {
                Value::NullReference => return Err(Error::NullPointer),
                exception => return Err(Error::Thrown(exception)),
            },
            opcode::CHECKCAST => {
                let index = self.read_u2()?;
                let name = self.class_name(index)?;
                let value = pop!(Reference);
                if !value.is_null() && !loader.is_instance(&value, &name) {
                    return Err(Error::ClassCast { from: value.class_name(), to: name });
                }
                push!(value);
            }
            opcode::INSTANCEOF => {
                let index = self.read_u2()?;
                let name = self.class_name(index)?;
                let value = pop!(Reference);
                push!(Value::Int(loader.is_instance(&value, &name) as i32));
            }

            _ => return verify(format!("unsupported opcode {:#04x} at {}", op, start)),
        }
        Ok(Flow::Continue)
    }

    fn increment(&mut self, index: usize, delta: i32) -> Result<(), Error> {
        match self.locals.get_mut(index) {
            Some(&mut Some(Value::Int(ref mut value))) => {
                *value = value.wrapping_add(delta);
                Ok(())
            }
            _ => verify(format!("iinc of local {}, which is not an int", index)),
        }
    }
}

/// `ifeq` through `ifle` and `if_icmpeq` through `if_icmple` share an order.
fn compare_int(condition: u8, a: i32, b: i32) -> bool {
    match condition {
        0 => a == b,
        1 => a != b,
        2 => a < b,
        3 => a >= b,
        4 => a > b,
        _ => a <= b,
    }
}

fn non_zero<T>(divisor: i64, value: T) -> Result<T, Error> {
    if divisor == 0 {
        Err(Error::Arithmetic("/ by zero"))
    } else {
        Ok(value)
    }
}

fn element(values: &[Value], index: i32) -> Result<&Value, Error> {
    if index < 0 {
        return Err(Error::ArrayIndexOutOfBounds(index));
    }
    values.get(index as usize).ok_or(Error::ArrayIndexOutOfBounds(index))
}

/// `bastore`, `castore` and `sastore` truncate the int they store.
fn narrow(op: u8, value: Value) -> Value {
    match (op, value) {
        (opcode::BASTORE, Value::Int(value)) => Value::Int(i32::from(value as i8)),
        (opcode::CASTORE, Value::Int(value)) => Value::Int(i32::from(value as u16)),
        (opcode::SASTORE, Value::Int(value)) => Value::Int(i32::from(value as i16)),
        (_, value) => value,
    }
}

fn array_object(value: Value) -> Result<Rc<Object>, Error> {
    match value {
        Value::Reference(object) => {
            let is_array = match *object {
                Object::Array { .. } => true,
                _ => false,
            };
            if is_array {
                Ok(object)
            } else {
                verify(format!("{} is not an array", object.class_name()))
            }
        }
        Value::NullReference => Err(Error::NullPointer),
        other => verify(format!("expected an array, found {:?}", other)),
    }
}

fn new_array(component: FieldType, count: i32) -> Result<Value, Error> {
    if count < 0 {
        return Err(Error::NegativeArraySize(count));
    }
    let values = vec![Value::default_for(&component); count as usize];
    Ok(Value::array(component, values))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assembler::{Arithmetic, Condition, CodeBuilder, ValueKind};
    use crate::builder::ClassBuilder;
    use crate::model::class_file::method_access_flags;

    const STATIC: u16 = method_access_flags::ACC_PUBLIC | method_access_flags::ACC_STATIC;

    /// Defines a class `T` with one static method `run` and calls it.
    fn run<F>(descriptor: &str, args: Vec<Value>, body: F) -> Result<Option<Value>, Error>
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> crate::Result<()>,
    {
        let mut class = ClassBuilder::new("T").version(49, 0);
        class.method("run", descriptor).access(STATIC).code(body).unwrap();
        let mut loader = ClassLoader::new();
        loader.define_class(&class.to_bytes().unwrap()).unwrap();
        loader.invoke_static("T", "run", descriptor, args)
    }

    fn int(result: Result<Option<Value>, Error>) -> i32 {
        result.unwrap().and_then(|value| value.as_int()).unwrap()
    }

    #[test]
    fn loops_with_branches() {
        // sum of 1..=n
        let sum = |n| {
            int(run("(I)I", vec![Value::Int(n)], |c| {
                let total = c.new_local(&FieldType::Int);
                let top = c.new_label();
                let done = c.new_label();
                c.push_int(0)?;
                c.store(ValueKind::Int, total);
                c.place(top);
                c.load_param(0)?;
                c.branch(Condition::Le, done);
                c.load(ValueKind::Int, total);
                c.load_param(0)?;
                c.arithmetic(ValueKind::Int, Arithmetic::Add)?;
                c.store(ValueKind::Int, total);
                c.iinc(0, -1);
                c.goto(top);
                c.place(done);
                c.load(ValueKind::Int, total);
                c.emit_return();
                Ok(())
            }))
        };
        assert_eq!(sum(0), 0);
        assert_eq!(sum(10), 55);
    }

    #[test]
    fn long_arithmetic() {
        let result = run("(JJ)J", vec![Value::Long(1 << 40), Value::Long(3)], |c| {
            c.load_param(0)?;
            c.load_param(1)?;
            c.arithmetic(ValueKind::Long, Arithmetic::Mul)?;
            c.emit_return();
            Ok(())
        });
        assert_eq!(result.unwrap().and_then(|value| value.as_long()), Some(3 << 40));
    }

    #[test]
    fn division_by_zero() {
        let result = run("(II)I", vec![Value::Int(1), Value::Int(0)], |c| {
            c.load_param(0)?;
            c.load_param(1)?;
            c.arithmetic(ValueKind::Int, Arithmetic::Div)?;
            c.emit_return();
            Ok(())
        });
        match result {
            Err(Error::Arithmetic(_)) => {}
            other => panic!("expected an arithmetic error, got {:?}", other),
        }
    }

    #[test]
    fn arrays() {
        let result = run("(I)I", vec![Value::Int(4)], |c| {
            let array = c.new_local(&FieldType::array_of(FieldType::Int));
            c.load_param(0)?;
            c.new_array(&FieldType::Int)?;
            c.store(ValueKind::Reference, array);
            c.load(ValueKind::Reference, array);
            c.push_int(3)?;
            c.push_int(7)?;
            c.array_store(&FieldType::Int);
            c.load(ValueKind::Reference, array);
            c.push_int(3)?;
            c.array_load(&FieldType::Int);
            c.load(ValueKind::Reference, array);
            c.array_length();
            c.arithmetic(ValueKind::Int, Arithmetic::Mul)?;
            c.emit_return();
            Ok(())
        });
        assert_eq!(int(result), 28);

        let result = run("(I)I", vec![Value::Int(2)], |c| {
            c.load_param(0)?;
            c.new_array(&FieldType::Int)?;
            c.push_int(2)?;
            c.array_load(&FieldType::Int);
            c.emit_return();
            Ok(())
        });
        match result {
            Err(Error::ArrayIndexOutOfBounds(2)) => {}
            other => panic!("expected an index error, got {:?}", other),
        }
    }

    #[test]
    fn handlers_catch_thrown_values() {
        let result = run("(Ljava/lang/String;)I", vec![Value::string("boom")], |c| {
            let start = c.new_label();
            let end = c.new_label();
            let handler = c.new_label();
            c.place(start);
            c.load_param(0)?;
            c.throw();
            c.place(end);
            c.place(handler);
            c.pop();
            c.push_int(1)?;
            c.emit_return();
            c.try_catch(start, end, handler, Some("java/lang/String"))?;
            Ok(())
        });
        assert_eq!(int(result), 1);

        let result = run("(Ljava/lang/String;)V", vec![Value::string("boom")], |c| {
            c.load_param(0)?;
            c.throw();
            Ok(())
        });
        match result {
            Err(Error::Thrown(value)) => assert_eq!(value.as_str(), Some("boom")),
            other => panic!("expected the value to be thrown, got {:?}", other),
        }
    }

    #[test]
    fn failed_casts() {
        let result = run("(Ljava/lang/Object;)Ljava/lang/Object;", vec![Value::string("x")], |c| {
            c.load_param(0)?;
            c.check_cast("java/lang/Integer")?;
            c.emit_return();
            Ok(())
        });
        match result {
            Err(Error::ClassCast { from, to }) => {
                assert_eq!((from.as_str(), to.as_str()), ("java/lang/String", "java/lang/Integer"))
            }
            other => panic!("expected a class cast error, got {:?}", other),
        }
    }
}
