//! Assembles method bodies from high-level operations.
//!
//! Instructions are recorded symbolically first, with branches pointing at `Label`s. `finish`
//! then lays the code out, patches branch offsets, and follows every control-flow path to
//! compute the operand stack depth, rejecting code that would underflow the stack or reach an
//! instruction with two different depths.

mod analysis;

use std::sync::Arc;

use crate::bytecode::{array_type, opcode};
use crate::error::{Error, Result};
use crate::model::class_file::constant_pool::{ConstantPool, Literal};
use crate::model::class_file::constant_pool_index;
use crate::model::class_file::Code;
use crate::model::descriptor::{DescriptorCache, FieldType, MethodDescriptor};

/// A position in the code, placed with `CodeBuilder::place`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// The computational type of a value on the operand stack or in a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// `boolean`, `byte`, `char` and `short` are all ints to the JVM.
    pub fn of(field_type: &FieldType) -> ValueKind {
        match *field_type {
            FieldType::Long => ValueKind::Long,
            FieldType::Float => ValueKind::Float,
            FieldType::Double => ValueKind::Double,
            FieldType::Object(_) | FieldType::Array(_) => ValueKind::Reference,
            _ => ValueKind::Int,
        }
    }

    pub fn slots(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// Distance of this kind's variant from the int variant in the opcode table.
    fn opcode_offset(self) -> u8 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        }
    }
}

/// Branch conditions. The plain variants compare an int against zero; the `Int` variants compare
/// two ints, and the `Ref` variants two references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    IntEq,
    IntNe,
    IntLt,
    IntGe,
    IntGt,
    IntLe,
    RefEq,
    RefNe,
    Null,
    NonNull,
}

impl Condition {
    fn opcode(self) -> u8 {
        match self {
            Condition::Eq => opcode::IFEQ,
            Condition::Ne => opcode::IFNE,
            Condition::Lt => opcode::IFLT,
            Condition::Ge => opcode::IFGE,
            Condition::Gt => opcode::IFGT,
            Condition::Le => opcode::IFLE,
            Condition::IntEq => opcode::IF_ICMPEQ,
            Condition::IntNe => opcode::IF_ICMPNE,
            Condition::IntLt => opcode::IF_ICMPLT,
            Condition::IntGe => opcode::IF_ICMPGE,
            Condition::IntGt => opcode::IF_ICMPGT,
            Condition::IntLe => opcode::IF_ICMPLE,
            Condition::RefEq => opcode::IF_ACMPEQ,
            Condition::RefNe => opcode::IF_ACMPNE,
            Condition::Null => opcode::IFNULL,
            Condition::NonNull => opcode::IFNONNULL,
        }
    }

    fn operands(self) -> u16 {
        match self {
            Condition::Eq
            | Condition::Ne
            | Condition::Lt
            | Condition::Ge
            | Condition::Gt
            | Condition::Le
            | Condition::Null
            | Condition::NonNull => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// What follows an instruction's opcode byte.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operands {
    None,
    U1(u8),
    U2(u16),
    /// A local variable index too large for one byte; the instruction gets a `wide` prefix.
    Wide(u16),
    Iinc { index: u16, delta: i16 },
    Interface { index: constant_pool_index, count: u8 },
    Branch(Label),
}

#[derive(Debug, Clone, PartialEq)]
struct Instruction {
    opcode: u8,
    operands: Operands,
    /// Operand stack slots consumed.
    pops: u16,
    /// Operand stack slots produced.
    pushes: u16,
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Instruction(Instruction),
    Place(Label),
    Line(u16),
}

#[derive(Debug, Clone)]
struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: constant_pool_index,
}

#[derive(Debug, Clone)]
struct LocalVariable {
    start: Label,
    end: Label,
    name_index: constant_pool_index,
    descriptor_index: constant_pool_index,
    slot: u16,
}

/// Builds the `Code` of one method. Constant pool entries are interned as instructions are
/// emitted; everything else is resolved by `finish`.
pub struct CodeBuilder<'a> {
    constant_pool: &'a mut ConstantPool,
    descriptors: &'a DescriptorCache,
    descriptor: Arc<MethodDescriptor>,
    is_static: bool,
    items: Vec<Item>,
    next_label: u32,
    handlers: Vec<Handler>,
    local_variables: Vec<LocalVariable>,
    /// One past the highest slot any instruction, allocation or debug entry has touched.
    max_locals: u16,
    declared_max_stack: Option<u16>,
}

impl<'a> CodeBuilder<'a> {
    /// Starts the body of a method with the given descriptor. Slot 0 holds `this` unless the
    /// method is static; the parameters follow it.
    pub fn new(
        constant_pool: &'a mut ConstantPool,
        descriptors: &'a DescriptorCache,
        descriptor: &str,
        is_static: bool,
    ) -> Result<Self> {
        let descriptor = descriptors.method(descriptor)?;
        let this_slots = if is_static { 0 } else { 1 };
        let max_locals = this_slots + descriptor.param_slots();
        Ok(CodeBuilder {
            constant_pool,
            descriptors,
            descriptor,
            is_static,
            items: Vec::new(),
            next_label: 0,
            handlers: Vec::new(),
            local_variables: Vec::new(),
            max_locals,
            declared_max_stack: None,
        })
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// The pool being filled, for bodies that need entries of their own.
    pub fn constant_pool(&mut self) -> &mut ConstantPool {
        &mut *self.constant_pool
    }

    fn emit(&mut self, opcode: u8, operands: Operands, pops: u16, pushes: u16) -> &mut Self {
        self.items.push(Item::Instruction(Instruction { opcode, operands, pops, pushes }));
        self
    }

    fn emit_simple(&mut self, opcode: u8, pops: u16, pushes: u16) -> &mut Self {
        self.emit(opcode, Operands::None, pops, pushes)
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Binds `label` to the position of the next instruction.
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.items.push(Item::Place(label));
        self
    }

    /// Attributes the following instructions to a source line.
    pub fn line_number(&mut self, line: u16) -> &mut Self {
        self.items.push(Item::Line(line));
        self
    }

    pub fn declare_max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.declared_max_stack = Some(max_stack);
        self
    }

    // Constants

    pub fn push_null(&mut self) -> &mut Self {
        self.emit_simple(opcode::ACONST_NULL, 0, 1)
    }

    pub fn push_int(&mut self, value: i32) -> Result<&mut Self> {
        Ok(match value {
            -1..=5 => self.emit_simple((opcode::ICONST_0 as i32 + value) as u8, 0, 1),
            -128..=127 => self.emit(opcode::BIPUSH, Operands::U1(value as i8 as u8), 0, 1),
            -32768..=32767 => self.emit(opcode::SIPUSH, Operands::U2(value as i16 as u16), 0, 1),
            _ => {
                let index = self.constant_pool.integer(value)?;
                self.ldc(index)
            }
        })
    }

    pub fn push_long(&mut self, value: i64) -> Result<&mut Self> {
        Ok(match value {
            0 => self.emit_simple(opcode::LCONST_0, 0, 2),
            1 => self.emit_simple(opcode::LCONST_1, 0, 2),
            _ => {
                let index = self.constant_pool.long(value)?;
                self.emit(opcode::LDC2_W, Operands::U2(index), 0, 2)
            }
        })
    }

    pub fn push_float(&mut self, value: f32) -> Result<&mut Self> {
        // compare bit patterns so that -0.0 still goes through the pool
        Ok(if value.to_bits() == 0.0f32.to_bits() {
            self.emit_simple(opcode::FCONST_0, 0, 1)
        } else if value == 1.0 {
            self.emit_simple(opcode::FCONST_1, 0, 1)
        } else if value == 2.0 {
            self.emit_simple(opcode::FCONST_2, 0, 1)
        } else {
            let index = self.constant_pool.float(value)?;
            self.ldc(index)
        })
    }

    pub fn push_double(&mut self, value: f64) -> Result<&mut Self> {
        Ok(if value.to_bits() == 0.0f64.to_bits() {
            self.emit_simple(opcode::DCONST_0, 0, 2)
        } else if value == 1.0 {
            self.emit_simple(opcode::DCONST_1, 0, 2)
        } else {
            let index = self.constant_pool.double(value)?;
            self.emit(opcode::LDC2_W, Operands::U2(index), 0, 2)
        })
    }

    pub fn push_string(&mut self, value: &str) -> Result<&mut Self> {
        let index = self.constant_pool.string(value)?;
        Ok(self.ldc(index))
    }

    pub fn push_literal(&mut self, literal: &Literal) -> Result<&mut Self> {
        match *literal {
            Literal::Int(value) => self.push_int(value),
            Literal::Long(value) => self.push_long(value),
            Literal::Float(value) => self.push_float(value),
            Literal::Double(value) => self.push_double(value),
            Literal::String(ref value) => self.push_string(value),
        }
    }

    /// Pushes a single-slot constant, using the short form when the index allows it.
    fn ldc(&mut self, index: constant_pool_index) -> &mut Self {
        if index <= u8::max_value() as u16 {
            self.emit(opcode::LDC, Operands::U1(index as u8), 0, 1)
        } else {
            self.emit(opcode::LDC_W, Operands::U2(index), 0, 1)
        }
    }

    // Local variables

    fn touch_local(&mut self, slot: u16, kind: ValueKind) {
        let end = slot.saturating_add(kind.slots());
        if end > self.max_locals {
            self.max_locals = end;
        }
    }

    fn local_instruction(&mut self, short_base: u8, base: u8, kind: ValueKind, slot: u16) -> (u8, Operands) {
        self.touch_local(slot, kind);
        let offset = kind.opcode_offset();
        if slot <= 3 {
            (short_base + offset * 4 + slot as u8, Operands::None)
        } else if slot <= u8::max_value() as u16 {
            (base + offset, Operands::U1(slot as u8))
        } else {
            (base + offset, Operands::Wide(slot))
        }
    }

    pub fn load(&mut self, kind: ValueKind, slot: u16) -> &mut Self {
        let (opcode, operands) = self.local_instruction(opcode::ILOAD_0, opcode::ILOAD, kind, slot);
        self.emit(opcode, operands, 0, kind.slots())
    }

    pub fn store(&mut self, kind: ValueKind, slot: u16) -> &mut Self {
        let (opcode, operands) =
            self.local_instruction(opcode::ISTORE_0, opcode::ISTORE, kind, slot);
        self.emit(opcode, operands, kind.slots(), 0)
    }

    pub fn load_this(&mut self) -> Result<&mut Self> {
        if self.is_static {
            return Err(Error::UnsupportedConstruct("`this` is not available in a static method".to_owned()));
        }
        Ok(self.load(ValueKind::Reference, 0))
    }

    /// The local variable slot holding parameter `index`.
    pub fn param_slot(&self, index: usize) -> Result<u16> {
        if index >= self.descriptor.params.len() {
            return Err(Error::UnsupportedConstruct(format!(
                "parameter {} of a method taking {}",
                index,
                self.descriptor.params.len()
            )));
        }
        let this_slots = if self.is_static { 0 } else { 1 };
        Ok(this_slots + self.descriptor.params[..index].iter().map(FieldType::slots).sum::<u16>())
    }

    pub fn load_param(&mut self, index: usize) -> Result<&mut Self> {
        let slot = self.param_slot(index)?;
        let kind = ValueKind::of(&self.descriptor.params[index]);
        Ok(self.load(kind, slot))
    }

    /// Loads every parameter, in order.
    pub fn load_params(&mut self) -> Result<&mut Self> {
        for index in 0..self.descriptor.params.len() {
            self.load_param(index)?;
        }
        Ok(self)
    }

    /// Allocates fresh local variable slots for a value of the given type, above every slot
    /// used so far, including those written by `store` to slots chosen by hand.
    pub fn new_local(&mut self, field_type: &FieldType) -> u16 {
        let slot = self.max_locals;
        self.touch_local(slot, ValueKind::of(field_type));
        slot
    }

    pub fn iinc(&mut self, slot: u16, delta: i16) -> &mut Self {
        self.touch_local(slot, ValueKind::Int);
        self.emit(opcode::IINC, Operands::Iinc { index: slot, delta }, 0, 0)
    }

    /// Records a `LocalVariableTable` entry for `slot` between two labels.
    pub fn local_variable(
        &mut self,
        name: &str,
        field_type: &FieldType,
        slot: u16,
        start: Label,
        end: Label,
    ) -> Result<&mut Self> {
        let name_index = self.constant_pool.utf8(name)?;
        let descriptor_index = self.constant_pool.utf8(&field_type.descriptor())?;
        self.touch_local(slot, ValueKind::of(field_type));
        self.local_variables.push(LocalVariable { start, end, name_index, descriptor_index, slot });
        Ok(self)
    }

    // Fields

    pub fn get_field(&mut self, owner: &str, name: &str, field_type: &FieldType) -> Result<&mut Self> {
        let index = self.constant_pool.field_ref(owner, name, &field_type.descriptor())?;
        Ok(self.emit(opcode::GETFIELD, Operands::U2(index), 1, field_type.slots()))
    }

    pub fn put_field(&mut self, owner: &str, name: &str, field_type: &FieldType) -> Result<&mut Self> {
        let index = self.constant_pool.field_ref(owner, name, &field_type.descriptor())?;
        Ok(self.emit(opcode::PUTFIELD, Operands::U2(index), 1 + field_type.slots(), 0))
    }

    pub fn get_static(&mut self, owner: &str, name: &str, field_type: &FieldType) -> Result<&mut Self> {
        let index = self.constant_pool.field_ref(owner, name, &field_type.descriptor())?;
        Ok(self.emit(opcode::GETSTATIC, Operands::U2(index), 0, field_type.slots()))
    }

    pub fn put_static(&mut self, owner: &str, name: &str, field_type: &FieldType) -> Result<&mut Self> {
        let index = self.constant_pool.field_ref(owner, name, &field_type.descriptor())?;
        Ok(self.emit(opcode::PUTSTATIC, Operands::U2(index), field_type.slots(), 0))
    }

    // Invocations

    fn invoke(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        let method = self.descriptors.method(descriptor)?;
        let receiver = if opcode == opcode::INVOKESTATIC { 0 } else { 1 };
        let pops = receiver + method.param_slots();
        let pushes = method.return_slots();
        let operands = if opcode == opcode::INVOKEINTERFACE {
            let index = self.constant_pool.interface_method_ref(owner, name, descriptor)?;
            if pops > u8::max_value() as u16 {
                return Err(Error::EncodingError(format!("too many arguments for {}{}", name, descriptor)));
            }
            Operands::Interface { index, count: pops as u8 }
        } else {
            Operands::U2(self.constant_pool.method_ref(owner, name, descriptor)?)
        };
        Ok(self.emit(opcode, operands, pops, pushes))
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcode::INVOKEVIRTUAL, owner, name, descriptor)
    }

    /// Invokes a constructor, a private method, or a superclass method.
    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcode::INVOKESPECIAL, owner, name, descriptor)
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcode::INVOKESTATIC, owner, name, descriptor)
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(opcode::INVOKEINTERFACE, owner, name, descriptor)
    }

    // Objects and arrays

    pub fn new_object(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.constant_pool.class(class)?;
        Ok(self.emit(opcode::NEW, Operands::U2(index), 0, 1))
    }

    /// Pops a length and pushes a new one-dimensional array of `component`.
    pub fn new_array(&mut self, component: &FieldType) -> Result<&mut Self> {
        let atype = match *component {
            FieldType::Boolean => array_type::T_BOOLEAN,
            FieldType::Char => array_type::T_CHAR,
            FieldType::Float => array_type::T_FLOAT,
            FieldType::Double => array_type::T_DOUBLE,
            FieldType::Byte => array_type::T_BYTE,
            FieldType::Short => array_type::T_SHORT,
            FieldType::Int => array_type::T_INT,
            FieldType::Long => array_type::T_LONG,
            FieldType::Object(ref name) => {
                let index = self.constant_pool.class(name)?;
                return Ok(self.emit(opcode::ANEWARRAY, Operands::U2(index), 1, 1));
            }
            FieldType::Array(_) => {
                let index = self.constant_pool.class(&component.descriptor())?;
                return Ok(self.emit(opcode::ANEWARRAY, Operands::U2(index), 1, 1));
            }
        };
        Ok(self.emit(opcode::NEWARRAY, Operands::U1(atype), 1, 1))
    }

    pub fn array_length(&mut self) -> &mut Self {
        self.emit_simple(opcode::ARRAYLENGTH, 1, 1)
    }

    fn array_opcode_offset(component: &FieldType) -> u8 {
        match *component {
            FieldType::Int => 0,
            FieldType::Long => 1,
            FieldType::Float => 2,
            FieldType::Double => 3,
            FieldType::Object(_) | FieldType::Array(_) => 4,
            FieldType::Byte | FieldType::Boolean => 5,
            FieldType::Char => 6,
            FieldType::Short => 7,
        }
    }

    /// Pops an array and an index, and pushes the element.
    pub fn array_load(&mut self, component: &FieldType) -> &mut Self {
        let opcode = opcode::IALOAD + Self::array_opcode_offset(component);
        self.emit_simple(opcode, 2, component.slots())
    }

    /// Pops an array, an index and a value, and stores the value.
    pub fn array_store(&mut self, component: &FieldType) -> &mut Self {
        let opcode = opcode::IASTORE + Self::array_opcode_offset(component);
        self.emit_simple(opcode, 2 + component.slots(), 0)
    }

    /// Takes an internal class name, or an array descriptor.
    pub fn check_cast(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.constant_pool.class(class)?;
        Ok(self.emit(opcode::CHECKCAST, Operands::U2(index), 1, 1))
    }

    pub fn instance_of(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.constant_pool.class(class)?;
        Ok(self.emit(opcode::INSTANCEOF, Operands::U2(index), 1, 1))
    }

    // Stack manipulation. These work on slots, so `dup2` duplicates one long or two ints.

    pub fn dup(&mut self) -> &mut Self {
        self.emit_simple(opcode::DUP, 1, 2)
    }

    pub fn dup_x1(&mut self) -> &mut Self {
        self.emit_simple(opcode::DUP_X1, 2, 3)
    }

    pub fn dup2(&mut self) -> &mut Self {
        self.emit_simple(opcode::DUP2, 2, 4)
    }

    pub fn pop(&mut self) -> &mut Self {
        self.emit_simple(opcode::POP, 1, 0)
    }

    pub fn pop2(&mut self) -> &mut Self {
        self.emit_simple(opcode::POP2, 2, 0)
    }

    /// Pops a value of the given kind.
    pub fn discard(&mut self, kind: ValueKind) -> &mut Self {
        if kind.slots() == 2 {
            self.pop2()
        } else {
            self.pop()
        }
    }

    pub fn swap(&mut self) -> &mut Self {
        self.emit_simple(opcode::SWAP, 2, 2)
    }

    // Arithmetic

    pub fn arithmetic(&mut self, kind: ValueKind, operation: Arithmetic) -> Result<&mut Self> {
        if kind == ValueKind::Reference {
            return Err(Error::UnsupportedConstruct("arithmetic on references".to_owned()));
        }
        let base = match operation {
            Arithmetic::Add => opcode::IADD,
            Arithmetic::Sub => opcode::ISUB,
            Arithmetic::Mul => opcode::IMUL,
            Arithmetic::Div => opcode::IDIV,
            Arithmetic::Rem => opcode::IREM,
        };
        let slots = kind.slots();
        Ok(self.emit_simple(base + kind.opcode_offset(), 2 * slots, slots))
    }

    pub fn negate(&mut self, kind: ValueKind) -> Result<&mut Self> {
        if kind == ValueKind::Reference {
            return Err(Error::UnsupportedConstruct("arithmetic on references".to_owned()));
        }
        let slots = kind.slots();
        Ok(self.emit_simple(opcode::INEG + kind.opcode_offset(), slots, slots))
    }

    /// Converts between primitive kinds (`i2l`, `d2f`, ...). Converting a kind to itself emits
    /// nothing.
    pub fn convert(&mut self, from: ValueKind, to: ValueKind) -> Result<&mut Self> {
        use self::ValueKind::*;
        let opcode = match (from, to) {
            _ if from == to && from != Reference => return Ok(self),
            (Int, Long) => opcode::I2L,
            (Int, Float) => opcode::I2F,
            (Int, Double) => opcode::I2D,
            (Long, Int) => opcode::L2I,
            (Long, Float) => opcode::L2F,
            (Long, Double) => opcode::L2D,
            (Float, Int) => opcode::F2I,
            (Float, Long) => opcode::F2L,
            (Float, Double) => opcode::F2D,
            (Double, Int) => opcode::D2I,
            (Double, Long) => opcode::D2L,
            (Double, Float) => opcode::D2F,
            _ => {
                return Err(Error::UnsupportedConstruct(format!(
                    "conversion from {:?} to {:?}",
                    from, to
                )))
            }
        };
        Ok(self.emit_simple(opcode, from.slots(), to.slots()))
    }

    // Control flow

    pub fn branch(&mut self, condition: Condition, target: Label) -> &mut Self {
        self.emit(condition.opcode(), Operands::Branch(target), condition.operands(), 0)
    }

    pub fn goto(&mut self, target: Label) -> &mut Self {
        self.emit(opcode::GOTO, Operands::Branch(target), 0, 0)
    }

    /// Returns from the method with the return type of its descriptor; the stack must hold
    /// exactly the return value.
    pub fn emit_return(&mut self) -> &mut Self {
        let (opcode, slots) = match self.descriptor.return_type {
            None => (opcode::RETURN, 0),
            Some(ref return_type) => {
                let kind = ValueKind::of(return_type);
                (opcode::IRETURN + kind.opcode_offset(), kind.slots())
            }
        };
        self.emit_simple(opcode, slots, 0)
    }

    pub fn throw(&mut self) -> &mut Self {
        self.emit_simple(opcode::ATHROW, 1, 0)
    }

    /// Protects `[start, end)` with a handler at `handler`. A `catch_type` of `None` catches
    /// everything.
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<&mut Self> {
        let catch_type = match catch_type {
            Some(class) => self.constant_pool.class(class)?,
            None => 0,
        };
        self.handlers.push(Handler { start, end, handler, catch_type });
        Ok(self)
    }

    /// True when the code branches or has handlers, which class files from version 50 on must
    /// describe with a `StackMapTable`.
    pub fn needs_stack_map(&self) -> bool {
        !self.handlers.is_empty()
            || self.items.iter().any(|item| match *item {
                Item::Instruction(Instruction { operands: Operands::Branch(_), .. }) => true,
                _ => false,
            })
    }

    /// Lays out the code and checks its stack discipline.
    pub fn finish(self) -> Result<Code> {
        analysis::assemble(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::class_file::{AttributeInfo, ConstantPoolInfo};

    fn assemble<F>(descriptor: &str, is_static: bool, body: F) -> (ConstantPool, Result<Code>)
    where
        F: FnOnce(&mut CodeBuilder<'_>) -> Result<()>,
    {
        let mut pool = ConstantPool::new();
        let descriptors = DescriptorCache::new();
        let result = {
            let mut builder = CodeBuilder::new(&mut pool, &descriptors, descriptor, is_static)
                .unwrap();
            match body(&mut builder) {
                Ok(()) => builder.finish(),
                Err(e) => Err(e),
            }
        };
        (pool, result)
    }

    #[test]
    fn constructor_body() {
        let (pool, code) = assemble("()V", false, |c| {
            c.load_this()?.invoke_special("java/lang/Object", "<init>", "()V")?;
            c.emit_return();
            Ok(())
        });
        let code = code.unwrap();
        let init = pool.find(&ConstantPoolInfo::MethodRef {
            class_index: 2,
            name_and_type_index: 5,
        });
        assert_eq!(code.max_stack, 1);
        assert_eq!(code.max_locals, 1);
        assert_eq!(code.code[0], opcode::ALOAD_0);
        assert_eq!(code.code[1], opcode::INVOKESPECIAL);
        assert_eq!(init, Some(6));
        assert_eq!(&code.code[2..], &[0, 6, opcode::RETURN]);
    }

    #[test]
    fn max_stack_counts_wide_values() {
        let (_, code) = assemble("(JJ)J", true, |c| {
            c.load_params()?;
            c.arithmetic(ValueKind::Long, Arithmetic::Add)?;
            c.emit_return();
            Ok(())
        });
        let code = code.unwrap();
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.max_locals, 4);
        assert_eq!(code.code, vec![opcode::LLOAD_0, opcode::LLOAD_2, opcode::LADD, opcode::LRETURN]);
    }

    #[test]
    fn param_slots_skip_wide_params() {
        let (_, code) = assemble("(JI)I", true, |c| {
            assert_eq!(c.param_slot(1)?, 2);
            c.load_param(1)?;
            c.emit_return();
            Ok(())
        });
        let code = code.unwrap();
        assert_eq!(code.code, vec![opcode::ILOAD_2, opcode::IRETURN]);
        assert_eq!(code.max_locals, 3);
    }

    #[test]
    fn this_in_static_method() {
        let (_, code) = assemble("()V", true, |c| {
            c.load_this()?;
            Ok(())
        });
        assert!(matches!(code, Err(Error::UnsupportedConstruct(_))));
    }

    #[test]
    fn wide_local_index() {
        let (_, code) = assemble("()I", true, |c| {
            c.load(ValueKind::Int, 300);
            c.iinc(300, 1000);
            c.emit_return();
            Ok(())
        });
        let code = code.unwrap();
        assert_eq!(
            code.code,
            vec![
                opcode::WIDE,
                opcode::ILOAD,
                1,
                44,
                opcode::WIDE,
                opcode::IINC,
                1,
                44,
                0x03,
                0xe8,
                opcode::IRETURN,
            ]
        );
        assert_eq!(code.max_locals, 301);
    }

    #[test]
    fn new_locals_skip_slots_stored_by_hand() {
        let (_, code) = assemble("(I)V", true, |c| {
            c.push_long(7)?;
            c.store(ValueKind::Long, 2);
            let fresh = c.new_local(&FieldType::Int);
            assert_eq!(fresh, 4);
            assert_eq!(c.new_local(&FieldType::Double), 5);
            c.load_param(0)?;
            c.store(ValueKind::Int, fresh);
            c.emit_return();
            Ok(())
        });
        assert_eq!(code.unwrap().max_locals, 7);
    }

    #[test]
    fn push_int_picks_shortest_form() {
        let (pool, code) = assemble("()V", true, |c| {
            c.push_int(-1)?.push_int(100)?.push_int(1000)?.push_int(100_000)?;
            c.pop2().pop2().emit_return();
            Ok(())
        });
        let code = code.unwrap();
        let index = pool.find(&ConstantPoolInfo::Integer { bytes: 100_000 }).unwrap();
        assert_eq!(
            code.code,
            vec![
                opcode::ICONST_M1,
                opcode::BIPUSH,
                100,
                opcode::SIPUSH,
                0x03,
                0xe8,
                opcode::LDC,
                index as u8,
                opcode::POP2,
                opcode::POP2,
                opcode::RETURN,
            ]
        );
        assert_eq!(code.max_stack, 4);
    }

    #[test]
    fn forward_branch_offset() {
        let (_, code) = assemble("()V", true, |c| {
            let end = c.new_label();
            c.push_int(0)?.branch(Condition::Eq, end).place(end).emit_return();
            assert!(c.needs_stack_map());
            Ok(())
        });
        assert_eq!(
            code.unwrap().code,
            vec![opcode::ICONST_0, opcode::IFEQ, 0, 3, opcode::RETURN]
        );
    }

    #[test]
    fn backward_branch_offset() {
        let (_, code) = assemble("(I)V", true, |c| {
            let top = c.new_label();
            c.place(top).iinc(0, -1).load(ValueKind::Int, 0).branch(Condition::Gt, top);
            c.emit_return();
            Ok(())
        });
        let code = code.unwrap();
        // iinc(3) iload_0(1) ifgt back to 0 from offset 4
        assert_eq!(&code.code[4..], &[opcode::IFGT, 0xff, 0xfc, opcode::RETURN]);
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn underflow() {
        let (_, code) = assemble("()V", true, |c| {
            c.pop().emit_return();
            Ok(())
        });
        assert_eq!(code, Err(Error::StackUnderflow { offset: 0, depth: 0, required: 1 }));
    }

    #[test]
    fn merge_with_different_depths() {
        let (_, code) = assemble("(I)V", true, |c| {
            let join = c.new_label();
            c.load(ValueKind::Int, 0).branch(Condition::Eq, join);
            c.push_int(1)?.place(join).emit_return();
            Ok(())
        });
        assert_eq!(code, Err(Error::StackMismatch { offset: 5, expected: 0, actual: 1 }));
    }

    #[test]
    fn return_with_extra_values() {
        let (_, code) = assemble("()V", true, |c| {
            c.push_int(1)?.emit_return();
            Ok(())
        });
        assert_eq!(code, Err(Error::StackMismatch { offset: 1, expected: 0, actual: 1 }));
    }

    #[test]
    fn falling_off_the_end() {
        let (_, code) = assemble("()V", true, |c| {
            c.push_int(1)?.pop();
            Ok(())
        });
        assert!(matches!(code, Err(Error::EncodingError(_))));
    }

    #[test]
    fn empty_body() {
        let (_, code) = assemble("()V", true, |_| Ok(()));
        assert!(matches!(code, Err(Error::EncodingError(_))));
    }

    #[test]
    fn label_never_placed() {
        let (_, code) = assemble("()V", true, |c| {
            let nowhere = c.new_label();
            c.goto(nowhere);
            Ok(())
        });
        assert_eq!(code, Err(Error::InvalidBranchTarget { label: 0, reason: "never placed" }));
    }

    #[test]
    fn label_placed_twice() {
        let (_, code) = assemble("()V", true, |c| {
            let label = c.new_label();
            c.place(label).emit_return().place(label);
            Ok(())
        });
        assert!(matches!(code, Err(Error::InvalidBranchTarget { label: 0, .. })));
    }

    #[test]
    fn declared_max_stack_too_small() {
        let (_, code) = assemble("()I", true, |c| {
            c.declare_max_stack(1);
            c.push_int(2)?.push_int(3)?;
            c.arithmetic(ValueKind::Int, Arithmetic::Mul)?;
            c.emit_return();
            Ok(())
        });
        assert_eq!(code, Err(Error::MaxStackExceeded { declared: 1, computed: 2 }));
    }

    #[test]
    fn declared_max_stack_is_kept() {
        let (_, code) = assemble("()V", true, |c| {
            c.declare_max_stack(5).emit_return();
            Ok(())
        });
        assert_eq!(code.unwrap().max_stack, 5);
    }

    #[test]
    fn exception_handler() {
        let (pool, code) = assemble("()V", true, |c| {
            let (start, end, handler) = (c.new_label(), c.new_label(), c.new_label());
            c.place(start).push_null().throw().place(end);
            c.place(handler).pop().emit_return();
            c.try_catch(start, end, handler, Some("java/lang/Throwable"))?;
            Ok(())
        });
        let code = code.unwrap();
        let catch_type = pool.class_name_at(code.exception_table[0].catch_type);
        assert_eq!(code.max_stack, 1);
        assert_eq!(code.exception_table[0].start_pc, 0);
        assert_eq!(code.exception_table[0].end_pc, 2);
        assert_eq!(code.exception_table[0].handler_pc, 2);
        assert_eq!(catch_type, Some("java/lang/Throwable".to_owned()));
    }

    #[test]
    fn line_numbers_and_locals() {
        let (pool, code) = assemble("()I", true, |c| {
            let (start, end) = (c.new_label(), c.new_label());
            let slot = c.new_local(&FieldType::Int);
            c.line_number(10).place(start).push_int(7)?.store(ValueKind::Int, slot);
            c.line_number(11).load(ValueKind::Int, slot).place(end).emit_return();
            c.local_variable("answer", &FieldType::Int, slot, start, end)?;
            Ok(())
        });
        let code = code.unwrap();
        match code.attributes[0] {
            AttributeInfo::LineNumberTable { ref line_number_table } => {
                assert_eq!(line_number_table.len(), 2);
                assert_eq!(line_number_table[1].start_pc, 3);
                assert_eq!(line_number_table[1].line_number, 11);
            }
            ref other => panic!("expected a line number table, got {:?}", other),
        }
        match code.attributes[1] {
            AttributeInfo::LocalVariableTable { ref local_variable_table } => {
                let local = &local_variable_table[0];
                assert_eq!((local.start_pc, local.length, local.index), (0, 4, 0));
                assert_eq!(pool.utf8_at(local.name_index), Some("answer".to_owned()));
            }
            ref other => panic!("expected a local variable table, got {:?}", other),
        }
    }

    #[test]
    fn interface_call_counts_arguments() {
        let (_, code) = assemble("(Ljava/lang/Runnable;J)V", true, |c| {
            c.load_param(0)?.load_param(1)?;
            c.invoke_interface("pkg/Sink", "accept", "(J)V")?;
            c.emit_return();
            Ok(())
        });
        let code = code.unwrap();
        assert_eq!(code.code[2], opcode::INVOKEINTERFACE);
        assert_eq!(&code.code[5..], &[3, 0, opcode::RETURN]);
        assert_eq!(code.max_stack, 3);
    }
}
