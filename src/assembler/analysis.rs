//! Layout, branch patching and stack depth analysis for `CodeBuilder::finish`.

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

use super::{CodeBuilder, Instruction, Item, Label, Operands};
use crate::bytecode::opcode;
use crate::error::{Error, Result};
use crate::model::class_file::attribute::{
    AttributeInfo, Code, ExceptionTableEntry, LineNumberInfo, LocalVariableInfo,
};

/// The instructions of a method with their byte offsets and label positions.
struct Layout<'a> {
    instructions: Vec<&'a Instruction>,
    /// Byte offset of each instruction, followed by the code length.
    offsets: Vec<usize>,
    /// Index of the instruction each label was placed before.
    labels: HashMap<Label, usize>,
    lines: Vec<(usize, u16)>,
}

fn fits_i8(value: i16) -> bool {
    value >= i8::min_value() as i16 && value <= i8::max_value() as i16
}

fn size(instruction: &Instruction) -> usize {
    1 + match instruction.operands {
        Operands::None => 0,
        Operands::U1(_) => 1,
        Operands::U2(_) | Operands::Branch(_) => 2,
        Operands::Wide(_) => 3,
        Operands::Iinc { index, delta } => {
            if index <= u8::max_value() as u16 && fits_i8(delta) {
                2
            } else {
                5
            }
        }
        Operands::Interface { .. } => 4,
    }
}

fn is_return(opcode: u8) -> bool {
    opcode >= opcode::IRETURN && opcode <= opcode::RETURN
}

impl<'a> Layout<'a> {
    fn new(items: &'a [Item]) -> Result<Self> {
        let mut layout = Layout {
            instructions: Vec::new(),
            offsets: Vec::new(),
            labels: HashMap::new(),
            lines: Vec::new(),
        };
        let mut offset = 0;
        for item in items {
            match *item {
                Item::Instruction(ref instruction) => {
                    layout.offsets.push(offset);
                    layout.instructions.push(instruction);
                    offset += size(instruction);
                }
                Item::Place(label) => {
                    if layout.labels.insert(label, layout.instructions.len()).is_some() {
                        return Err(Error::InvalidBranchTarget {
                            label: label.id(),
                            reason: "placed more than once",
                        });
                    }
                }
                Item::Line(line) => layout.lines.push((layout.instructions.len(), line)),
            }
        }
        layout.offsets.push(offset);
        if layout.instructions.is_empty() {
            return Err(Error::EncodingError("method body has no instructions".to_owned()));
        }
        if offset > u16::max_value() as usize {
            return Err(Error::EncodingError(format!("{} bytes of code is too long", offset)));
        }
        Ok(layout)
    }

    fn len(&self) -> usize {
        self.instructions.len()
    }

    /// The instruction a label marks. Labels placed after the last instruction mark nothing.
    fn instruction_at(&self, label: Label) -> Result<usize> {
        match self.labels.get(&label) {
            None => Err(Error::InvalidBranchTarget { label: label.id(), reason: "never placed" }),
            Some(&index) if index >= self.len() => Err(Error::InvalidBranchTarget {
                label: label.id(),
                reason: "placed after the last instruction",
            }),
            Some(&index) => Ok(index),
        }
    }

    /// The byte offset a label marks, which may be the end of the code.
    fn offset_of(&self, label: Label) -> Result<u16> {
        match self.labels.get(&label) {
            None => Err(Error::InvalidBranchTarget { label: label.id(), reason: "never placed" }),
            Some(&index) => Ok(self.offsets[index] as u16),
        }
    }

    fn merge(
        &self,
        depths: &mut [Option<u16>],
        work: &mut Vec<usize>,
        index: usize,
        depth: u16,
    ) -> Result<()> {
        if index >= self.len() {
            return Err(Error::EncodingError(
                "execution can run past the end of the code".to_owned(),
            ));
        }
        match depths[index] {
            None => {
                depths[index] = Some(depth);
                work.push(index);
                Ok(())
            }
            Some(existing) if existing == depth => Ok(()),
            Some(existing) => Err(Error::StackMismatch {
                offset: self.offsets[index],
                expected: existing,
                actual: depth,
            }),
        }
    }

    /// Follows every path through the code, from the entry point and from each handler, and
    /// returns the deepest the operand stack gets.
    fn max_stack(&self, handlers: &[usize]) -> Result<u16> {
        let mut depths = vec![None; self.len()];
        let mut work = Vec::new();
        let mut peak = 0;
        self.merge(&mut depths, &mut work, 0, 0)?;
        for &handler in handlers {
            // the handler starts with just the exception on the stack
            self.merge(&mut depths, &mut work, handler, 1)?;
            peak = 1;
        }
        while let Some(index) = work.pop() {
            let instruction = self.instructions[index];
            let offset = self.offsets[index];
            let depth = match depths[index] {
                Some(depth) => depth,
                None => continue,
            };
            if depth < instruction.pops {
                return Err(Error::StackUnderflow { offset, depth, required: instruction.pops });
            }
            let after = (depth - instruction.pops) as u32 + instruction.pushes as u32;
            if after > u16::max_value() as u32 {
                return Err(Error::EncodingError(format!("operand stack overflows at {}", offset)));
            }
            let after = after as u16;
            if after > peak {
                peak = after;
            }
            match (instruction.opcode, instruction.operands) {
                (op, _) if is_return(op) => {
                    if depth != instruction.pops {
                        return Err(Error::StackMismatch {
                            offset,
                            expected: instruction.pops,
                            actual: depth,
                        });
                    }
                }
                (opcode::ATHROW, _) => {}
                (opcode::GOTO, Operands::Branch(target)) => {
                    let target = self.instruction_at(target)?;
                    self.merge(&mut depths, &mut work, target, after)?;
                }
                (_, Operands::Branch(target)) => {
                    let target = self.instruction_at(target)?;
                    self.merge(&mut depths, &mut work, target, after)?;
                    self.merge(&mut depths, &mut work, index + 1, after)?;
                }
                _ => self.merge(&mut depths, &mut work, index + 1, after)?,
            }
        }
        let unreachable = depths.iter().filter(|depth| depth.is_none()).count();
        if unreachable > 0 {
            trace!("{} unreachable instruction(s)", unreachable);
        }
        Ok(peak)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut code = Vec::with_capacity(self.offsets[self.len()]);
        for (index, instruction) in self.instructions.iter().enumerate() {
            let op = instruction.opcode;
            match instruction.operands {
                Operands::None => code.write_u8(op)?,
                Operands::U1(value) => {
                    code.write_u8(op)?;
                    code.write_u8(value)?;
                }
                Operands::U2(value) => {
                    code.write_u8(op)?;
                    code.write_u16::<BigEndian>(value)?;
                }
                Operands::Wide(slot) => {
                    code.write_u8(opcode::WIDE)?;
                    code.write_u8(op)?;
                    code.write_u16::<BigEndian>(slot)?;
                }
                Operands::Iinc { index: slot, delta } => {
                    if slot <= u8::max_value() as u16 && fits_i8(delta) {
                        code.write_u8(op)?;
                        code.write_u8(slot as u8)?;
                        code.write_i8(delta as i8)?;
                    } else {
                        code.write_u8(opcode::WIDE)?;
                        code.write_u8(op)?;
                        code.write_u16::<BigEndian>(slot)?;
                        code.write_i16::<BigEndian>(delta)?;
                    }
                }
                Operands::Interface { index: method, count } => {
                    code.write_u8(op)?;
                    code.write_u16::<BigEndian>(method)?;
                    code.write_u8(count)?;
                    code.write_u8(0)?;
                }
                Operands::Branch(label) => {
                    let target = self.offsets[self.instruction_at(label)?] as i64;
                    let delta = target - self.offsets[index] as i64;
                    if delta < i16::min_value() as i64 || delta > i16::max_value() as i64 {
                        return Err(Error::EncodingError(format!(
                            "branch to L{} spans {} bytes",
                            label.id(),
                            delta
                        )));
                    }
                    code.write_u8(op)?;
                    code.write_i16::<BigEndian>(delta as i16)?;
                }
            }
        }
        Ok(code)
    }
}

pub(super) fn assemble(builder: CodeBuilder) -> Result<Code> {
    let layout = Layout::new(&builder.items)?;

    let mut exception_table = Vec::with_capacity(builder.handlers.len());
    let mut handler_entries = Vec::with_capacity(builder.handlers.len());
    for handler in &builder.handlers {
        let start_pc = layout.offset_of(handler.start)?;
        let end_pc = layout.offset_of(handler.end)?;
        let handler_index = layout.instruction_at(handler.handler)?;
        if start_pc >= end_pc {
            return Err(Error::InvalidBranchTarget {
                label: handler.end.id(),
                reason: "protected range is empty",
            });
        }
        handler_entries.push(handler_index);
        exception_table.push(ExceptionTableEntry {
            start_pc,
            end_pc,
            handler_pc: layout.offsets[handler_index] as u16,
            catch_type: handler.catch_type,
        });
    }

    let computed = layout.max_stack(&handler_entries)?;
    let max_stack = match builder.declared_max_stack {
        Some(declared) if computed > declared => {
            return Err(Error::MaxStackExceeded { declared, computed })
        }
        Some(declared) => declared,
        None => computed,
    };
    let code = layout.encode()?;

    let mut attributes = Vec::new();
    let mut line_number_table: Vec<LineNumberInfo> = Vec::new();
    for &(index, line_number) in &layout.lines {
        if index >= layout.len() {
            continue;
        }
        let start_pc = layout.offsets[index] as u16;
        match line_number_table.last_mut() {
            Some(last) if last.start_pc == start_pc => last.line_number = line_number,
            _ => line_number_table.push(LineNumberInfo { start_pc, line_number }),
        }
    }
    if !line_number_table.is_empty() {
        attributes.push(AttributeInfo::LineNumberTable { line_number_table });
    }
    let mut local_variable_table = Vec::with_capacity(builder.local_variables.len());
    for local in &builder.local_variables {
        let start_pc = layout.offset_of(local.start)?;
        let end_pc = layout.offset_of(local.end)?;
        if end_pc < start_pc {
            return Err(Error::InvalidBranchTarget {
                label: local.end.id(),
                reason: "local variable scope ends before it starts",
            });
        }
        local_variable_table.push(LocalVariableInfo {
            start_pc,
            length: end_pc - start_pc,
            name_index: local.name_index,
            descriptor_index: local.descriptor_index,
            index: local.slot,
        });
    }
    if !local_variable_table.is_empty() {
        attributes.push(AttributeInfo::LocalVariableTable { local_variable_table });
    }

    debug!(
        "assembled {} bytes of code (max_stack {}, max_locals {})",
        code.len(),
        max_stack,
        builder.max_locals
    );
    Ok(Code {
        max_stack,
        max_locals: builder.max_locals,
        code,
        exception_table,
        attributes,
    })
}
