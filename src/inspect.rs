//! Decoding and stack replay of emitted code.
//!
//! Used to check generated methods against the bytes actually written: every
//! branch must land on an instruction, the operand stack must never underflow,
//! and paths that merge must agree on the stack depth.

use std::fmt;

use crate::constant_pool::{CpInfo, cp_member_descriptor};
use crate::error::InspectError;
use crate::method::ExceptionTableEntry;
use crate::opcodes;
use crate::types::FieldType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    I1(i8),
    I2(i16),
    U1(u8),
    U2(u16),
    Jump(i16),
    JumpWide(i32),
    TableSwitch {
        default_offset: i32,
        low: i32,
        high: i32,
        offsets: Vec<i32>,
    },
    LookupSwitch {
        default_offset: i32,
        pairs: Vec<(i32, i32)>,
    },
    Iinc {
        index: u16,
        increment: i16,
    },
    InvokeInterface {
        index: u16,
        count: u8,
    },
    InvokeDynamic {
        index: u16,
    },
    MultiANewArray {
        index: u16,
        dims: u8,
    },
    Wide {
        opcode: u8,
        index: u16,
        increment: Option<i16>,
    },
}

impl Instruction {
    pub fn length(&self) -> usize {
        match &self.operand {
            Operand::None => 1,
            Operand::I1(_) | Operand::U1(_) => 2,
            Operand::I2(_) | Operand::U2(_) | Operand::Jump(_) => 3,
            Operand::JumpWide(_) => 5,
            Operand::Iinc { .. } => 3,
            Operand::InvokeInterface { .. } | Operand::InvokeDynamic { .. } => 5,
            Operand::MultiANewArray { .. } => 4,
            Operand::Wide { increment, .. } => {
                if increment.is_some() {
                    6
                } else {
                    4
                }
            }
            Operand::TableSwitch { offsets, .. } => {
                1 + switch_padding(self.offset) + 12 + offsets.len() * 4
            }
            Operand::LookupSwitch { pairs, .. } => 1 + switch_padding(self.offset) + 8 + pairs.len() * 8,
        }
    }

    /// Absolute target of a jump, `None` for other instructions.
    pub fn jump_target(&self) -> Option<i64> {
        match self.operand {
            Operand::Jump(offset) => Some(self.offset as i64 + offset as i64),
            Operand::JumpWide(offset) => Some(self.offset as i64 + offset as i64),
            _ => None,
        }
    }

    /// Offsets control can reach next, including fall-through.
    pub fn successors(&self) -> Vec<i64> {
        let next = (self.offset + self.length()) as i64;
        let base = self.offset as i64;
        let mut successors = Vec::new();
        match self.opcode {
            opcodes::GOTO | opcodes::GOTO_W => successors.extend(self.jump_target()),
            opcodes::JSR | opcodes::JSR_W => {
                successors.extend(self.jump_target());
                successors.push(next);
            }
            opcodes::IFEQ..=opcodes::IF_ACMPNE | opcodes::IFNULL | opcodes::IFNONNULL => {
                successors.extend(self.jump_target());
                successors.push(next);
            }
            opcodes::TABLESWITCH => {
                if let Operand::TableSwitch {
                    default_offset,
                    offsets,
                    ..
                } = &self.operand
                {
                    successors.push(base + *default_offset as i64);
                    successors.extend(offsets.iter().map(|offset| base + *offset as i64));
                }
            }
            opcodes::LOOKUPSWITCH => {
                if let Operand::LookupSwitch {
                    default_offset,
                    pairs,
                } = &self.operand
                {
                    successors.push(base + *default_offset as i64);
                    successors.extend(pairs.iter().map(|(_, offset)| base + *offset as i64));
                }
            }
            opcodes::RET | opcodes::IRETURN..=opcodes::RETURN | opcodes::ATHROW => {}
            opcodes::WIDE if matches!(self.operand, Operand::Wide { opcode: opcodes::RET, .. }) => {}
            _ => successors.push(next),
        }
        successors
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = opcodes::mnemonic(self.opcode).unwrap_or("???");
        write!(f, "{:>5}: {name}", self.offset)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::I1(value) => write!(f, " {value}"),
            Operand::I2(value) => write!(f, " {value}"),
            Operand::U1(value) => write!(f, " {value}"),
            Operand::U2(value) => write!(f, " #{value}"),
            Operand::Jump(_) | Operand::JumpWide(_) => match self.jump_target() {
                Some(target) => write!(f, " {target}"),
                None => Ok(()),
            },
            Operand::TableSwitch { low, high, .. } => write!(f, " {low}..={high}"),
            Operand::LookupSwitch { pairs, .. } => write!(f, " ({} pairs)", pairs.len()),
            Operand::Iinc { index, increment } => write!(f, " {index} {increment}"),
            Operand::InvokeInterface { index, count } => write!(f, " #{index} {count}"),
            Operand::InvokeDynamic { index } => write!(f, " #{index}"),
            Operand::MultiANewArray { index, dims } => write!(f, " #{index} {dims}"),
            Operand::Wide {
                opcode,
                index,
                increment,
            } => {
                write!(f, " {} {index}", opcodes::mnemonic(*opcode).unwrap_or("???"))?;
                match increment {
                    Some(increment) => write!(f, " {increment}"),
                    None => Ok(()),
                }
            }
        }
    }
}

fn switch_padding(offset: usize) -> usize {
    let pos = (offset + 1) % 4;
    (4 - pos) % 4
}

/// Decodes a code array into instructions.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, InspectError> {
    let mut insns = Vec::new();
    let mut pos = 0usize;
    while pos < code.len() {
        let offset = pos;
        let opcode = code[pos];
        pos += 1;
        if opcodes::mnemonic(opcode).is_none() {
            return Err(InspectError::InvalidOpcode { opcode, offset });
        }
        let operand = match opcode {
            opcodes::BIPUSH => Operand::I1(read_i1(code, &mut pos)?),
            opcodes::SIPUSH => Operand::I2(read_i2(code, &mut pos)?),
            opcodes::LDC => Operand::U1(read_u1(code, &mut pos)?),
            opcodes::LDC_W | opcodes::LDC2_W => Operand::U2(read_u2(code, &mut pos)?),
            opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
                Operand::U1(read_u1(code, &mut pos)?)
            }
            opcodes::IINC => {
                let index = read_u1(code, &mut pos)? as u16;
                let increment = read_i1(code, &mut pos)? as i16;
                Operand::Iinc { index, increment }
            }
            opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
                Operand::Jump(read_i2(code, &mut pos)?)
            }
            opcodes::GOTO_W | opcodes::JSR_W => Operand::JumpWide(read_i4(code, &mut pos)?),
            opcodes::TABLESWITCH => {
                pos += switch_padding(offset);
                let default_offset = read_i4(code, &mut pos)?;
                let low = read_i4(code, &mut pos)?;
                let high = read_i4(code, &mut pos)?;
                let count = if high < low {
                    0
                } else {
                    (high as i64 - low as i64 + 1) as usize
                };
                if pos + count * 4 > code.len() {
                    return Err(InspectError::UnexpectedEof(code.len()));
                }
                let mut offsets = Vec::with_capacity(count);
                for _ in 0..count {
                    offsets.push(read_i4(code, &mut pos)?);
                }
                Operand::TableSwitch {
                    default_offset,
                    low,
                    high,
                    offsets,
                }
            }
            opcodes::LOOKUPSWITCH => {
                pos += switch_padding(offset);
                let default_offset = read_i4(code, &mut pos)?;
                let npairs = read_i4(code, &mut pos)?.max(0) as usize;
                if pos + npairs * 8 > code.len() {
                    return Err(InspectError::UnexpectedEof(code.len()));
                }
                let mut pairs = Vec::with_capacity(npairs);
                for _ in 0..npairs {
                    let key = read_i4(code, &mut pos)?;
                    let value = read_i4(code, &mut pos)?;
                    pairs.push((key, value));
                }
                Operand::LookupSwitch {
                    default_offset,
                    pairs,
                }
            }
            opcodes::GETSTATIC..=opcodes::INVOKESTATIC
            | opcodes::NEW
            | opcodes::ANEWARRAY
            | opcodes::CHECKCAST
            | opcodes::INSTANCEOF => Operand::U2(read_u2(code, &mut pos)?),
            opcodes::INVOKEINTERFACE => {
                let index = read_u2(code, &mut pos)?;
                let count = read_u1(code, &mut pos)?;
                let _ = read_u1(code, &mut pos)?;
                Operand::InvokeInterface { index, count }
            }
            opcodes::INVOKEDYNAMIC => {
                let index = read_u2(code, &mut pos)?;
                let _ = read_u2(code, &mut pos)?;
                Operand::InvokeDynamic { index }
            }
            opcodes::NEWARRAY => Operand::U1(read_u1(code, &mut pos)?),
            opcodes::WIDE => {
                let wide_opcode = read_u1(code, &mut pos)?;
                match wide_opcode {
                    opcodes::ILOAD..=opcodes::ALOAD | opcodes::ISTORE..=opcodes::ASTORE | opcodes::RET => {
                        let index = read_u2(code, &mut pos)?;
                        Operand::Wide {
                            opcode: wide_opcode,
                            index,
                            increment: None,
                        }
                    }
                    opcodes::IINC => {
                        let index = read_u2(code, &mut pos)?;
                        let increment = read_i2(code, &mut pos)?;
                        Operand::Wide {
                            opcode: wide_opcode,
                            index,
                            increment: Some(increment),
                        }
                    }
                    _ => {
                        return Err(InspectError::InvalidOpcode {
                            opcode: wide_opcode,
                            offset: pos - 1,
                        });
                    }
                }
            }
            opcodes::MULTIANEWARRAY => {
                let index = read_u2(code, &mut pos)?;
                let dims = read_u1(code, &mut pos)?;
                Operand::MultiANewArray { index, dims }
            }
            _ => Operand::None,
        };
        insns.push(Instruction {
            offset,
            opcode,
            operand,
        });
    }
    Ok(insns)
}

/// Result of [`replay_stack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackReport {
    pub max_stack: u16,
    /// `(offset, depth before the instruction)` for every reachable
    /// return-family instruction, by offset.
    pub return_depths: Vec<(usize, u16)>,
}

/// Slots taken by a long or double local for the `xload`/`xstore` family
/// member at `kind` (0 int, 1 long, 2 float, 3 double, 4 reference).
fn local_slots(kind: u8) -> u16 {
    if kind == 1 || kind == 3 { 2 } else { 1 }
}

fn descriptor_of(cp: &[CpInfo], index: u16) -> Result<&str, InspectError> {
    cp_member_descriptor(cp, index).ok_or(InspectError::InvalidIndex(index))
}

fn field_slots(cp: &[CpInfo], index: u16) -> Result<u16, InspectError> {
    let descriptor = descriptor_of(cp, index)?;
    FieldType::parse(descriptor)
        .map(|field_type| field_type.slots())
        .map_err(|_| InspectError::InvalidDescriptor(descriptor.to_string()))
}

fn invoke_slots(cp: &[CpInfo], index: u16) -> Result<(u16, u16), InspectError> {
    let descriptor = descriptor_of(cp, index)?;
    let (parameters, return_type) = FieldType::parse_method(descriptor)
        .map_err(|_| InspectError::InvalidDescriptor(descriptor.to_string()))?;
    let arguments = parameters.iter().map(FieldType::slots).sum();
    Ok((arguments, return_type.slots()))
}

/// `(popped, pushed)` slot counts of one instruction.
fn stack_effect(insn: &Instruction, cp: &[CpInfo]) -> Result<(u16, u16), InspectError> {
    let opcode = insn.opcode;
    let effect = match opcode {
        opcodes::NOP | opcodes::IINC | opcodes::GOTO | opcodes::GOTO_W | opcodes::RET => (0, 0),
        opcodes::ACONST_NULL..=opcodes::ICONST_5
        | opcodes::FCONST_0..=opcodes::FCONST_2
        | opcodes::BIPUSH
        | opcodes::SIPUSH
        | opcodes::LDC
        | opcodes::LDC_W => (0, 1),
        opcodes::LCONST_0 | opcodes::LCONST_1 | opcodes::DCONST_0 | opcodes::DCONST_1 | opcodes::LDC2_W => {
            (0, 2)
        }
        opcodes::ILOAD..=opcodes::ALOAD => (0, local_slots(opcode - opcodes::ILOAD)),
        opcodes::ILOAD_0..=opcodes::ALOAD_3 => (0, local_slots((opcode - opcodes::ILOAD_0) / 4)),
        opcodes::LALOAD | opcodes::DALOAD => (2, 2),
        opcodes::IALOAD..=opcodes::SALOAD => (2, 1),
        opcodes::ISTORE..=opcodes::ASTORE => (local_slots(opcode - opcodes::ISTORE), 0),
        opcodes::ISTORE_0..=opcodes::ASTORE_3 => (local_slots((opcode - opcodes::ISTORE_0) / 4), 0),
        opcodes::LASTORE | opcodes::DASTORE => (4, 0),
        opcodes::IASTORE..=opcodes::SASTORE => (3, 0),
        opcodes::POP => (1, 0),
        opcodes::POP2 => (2, 0),
        opcodes::DUP => (1, 2),
        opcodes::DUP_X1 => (2, 3),
        opcodes::DUP_X2 => (3, 4),
        opcodes::DUP2 => (2, 4),
        opcodes::DUP2_X1 => (3, 5),
        opcodes::DUP2_X2 => (4, 6),
        opcodes::SWAP => (2, 2),
        opcodes::IADD..=opcodes::DREM => match (opcode - opcodes::IADD) % 4 {
            1 | 3 => (4, 2),
            _ => (2, 1),
        },
        opcodes::INEG..=opcodes::DNEG => match opcode - opcodes::INEG {
            1 | 3 => (2, 2),
            _ => (1, 1),
        },
        opcodes::LSHL | opcodes::LSHR | opcodes::LUSHR => (3, 2),
        opcodes::ISHL | opcodes::ISHR | opcodes::IUSHR => (2, 1),
        opcodes::LAND | opcodes::LOR | opcodes::LXOR => (4, 2),
        opcodes::IAND | opcodes::IOR | opcodes::IXOR => (2, 1),
        opcodes::I2L | opcodes::I2D | opcodes::F2L | opcodes::F2D => (1, 2),
        opcodes::I2F | opcodes::F2I | opcodes::I2B | opcodes::I2C | opcodes::I2S => (1, 1),
        opcodes::L2I | opcodes::L2F | opcodes::D2I | opcodes::D2F => (2, 1),
        opcodes::L2D | opcodes::D2L => (2, 2),
        opcodes::LCMP | opcodes::DCMPL | opcodes::DCMPG => (4, 1),
        opcodes::FCMPL | opcodes::FCMPG => (2, 1),
        opcodes::IFEQ..=opcodes::IFLE | opcodes::IFNULL | opcodes::IFNONNULL => (1, 0),
        opcodes::IF_ICMPEQ..=opcodes::IF_ACMPNE => (2, 0),
        opcodes::JSR | opcodes::JSR_W => (0, 1),
        opcodes::TABLESWITCH | opcodes::LOOKUPSWITCH => (1, 0),
        opcodes::IRETURN | opcodes::FRETURN | opcodes::ARETURN => (1, 0),
        opcodes::LRETURN | opcodes::DRETURN => (2, 0),
        opcodes::RETURN => (0, 0),
        opcodes::GETSTATIC..=opcodes::PUTFIELD => {
            let Operand::U2(index) = insn.operand else {
                return Err(InspectError::InvalidOpcode { opcode, offset: insn.offset });
            };
            let slots = field_slots(cp, index)?;
            match opcode {
                opcodes::GETSTATIC => (0, slots),
                opcodes::PUTSTATIC => (slots, 0),
                opcodes::GETFIELD => (1, slots),
                _ => (slots + 1, 0),
            }
        }
        opcodes::INVOKEVIRTUAL..=opcodes::INVOKEINTERFACE => {
            let index = match insn.operand {
                Operand::U2(index) | Operand::InvokeInterface { index, .. } => index,
                _ => return Err(InspectError::InvalidOpcode { opcode, offset: insn.offset }),
            };
            let (arguments, returned) = invoke_slots(cp, index)?;
            let receiver = if opcode == opcodes::INVOKESTATIC { 0 } else { 1 };
            (arguments + receiver, returned)
        }
        opcodes::INVOKEDYNAMIC => {
            return Err(InspectError::InvalidOpcode { opcode, offset: insn.offset });
        }
        opcodes::NEW => (0, 1),
        opcodes::NEWARRAY
        | opcodes::ANEWARRAY
        | opcodes::ARRAYLENGTH
        | opcodes::CHECKCAST
        | opcodes::INSTANCEOF => (1, 1),
        opcodes::ATHROW | opcodes::MONITORENTER | opcodes::MONITOREXIT => (1, 0),
        opcodes::MULTIANEWARRAY => match insn.operand {
            Operand::MultiANewArray { dims, .. } => (dims as u16, 1),
            _ => return Err(InspectError::InvalidOpcode { opcode, offset: insn.offset }),
        },
        opcodes::WIDE => match insn.operand {
            Operand::Wide {
                opcode: inner @ opcodes::ILOAD..=opcodes::ALOAD,
                ..
            } => (0, local_slots(inner - opcodes::ILOAD)),
            Operand::Wide {
                opcode: inner @ opcodes::ISTORE..=opcodes::ASTORE,
                ..
            } => (local_slots(inner - opcodes::ISTORE), 0),
            _ => (0, 0),
        },
        _ => return Err(InspectError::InvalidOpcode { opcode, offset: insn.offset }),
    };
    Ok(effect)
}

fn is_return(opcode: u8) -> bool {
    (opcodes::IRETURN..=opcodes::RETURN).contains(&opcode)
}

fn index_of(insns: &[Instruction], offset: i64) -> Option<usize> {
    let offset = usize::try_from(offset).ok()?;
    insns.binary_search_by_key(&offset, |insn| insn.offset).ok()
}

fn merge(
    depths: &mut [Option<u16>],
    worklist: &mut Vec<usize>,
    insns: &[Instruction],
    index: usize,
    incoming: u16,
) -> Result<(), InspectError> {
    match depths[index] {
        None => {
            depths[index] = Some(incoming);
            worklist.push(index);
            Ok(())
        }
        Some(existing) if existing == incoming => Ok(()),
        Some(existing) => Err(InspectError::InconsistentDepth {
            offset: insns[index].offset,
            existing,
            incoming,
        }),
    }
}

/// Propagates operand stack depths (in slots) over every path from the
/// method entry and the exception handlers.
pub fn replay_stack(
    code: &[u8],
    cp: &[CpInfo],
    handlers: &[ExceptionTableEntry],
) -> Result<StackReport, InspectError> {
    let insns = decode(code)?;
    let mut depths = vec![None; insns.len()];
    let mut worklist = Vec::new();
    let mut max_stack = 0u16;
    let mut return_depths = Vec::new();

    if !insns.is_empty() {
        merge(&mut depths, &mut worklist, &insns, 0, 0)?;
    }
    for handler in handlers {
        let target = handler.handler_pc as i64;
        let index = index_of(&insns, target).ok_or(InspectError::InvalidBranchTarget {
            offset: handler.start_pc as usize,
            target,
        })?;
        merge(&mut depths, &mut worklist, &insns, index, 1)?;
        max_stack = max_stack.max(1);
    }

    while let Some(index) = worklist.pop() {
        let insn = &insns[index];
        let depth = depths[index].unwrap_or_default();
        let (popped, pushed) = stack_effect(insn, cp)?;
        if depth < popped {
            return Err(InspectError::StackUnderflow(insn.offset));
        }
        let after = depth - popped + pushed;
        max_stack = max_stack.max(after).max(depth);
        if is_return(insn.opcode) {
            return_depths.push((insn.offset, depth));
        }
        let fall_through = (insn.offset + insn.length()) as i64;
        for target in insn.successors() {
            let next = index_of(&insns, target).ok_or(InspectError::InvalidBranchTarget {
                offset: insn.offset,
                target,
            })?;
            // A subroutine call returns with the address popped again.
            let incoming = if matches!(insn.opcode, opcodes::JSR | opcodes::JSR_W) && target == fall_through {
                depth
            } else {
                after
            };
            merge(&mut depths, &mut worklist, &insns, next, incoming)?;
        }
    }
    return_depths.sort_unstable();
    log::trace!(
        "replayed {} instructions, max stack {max_stack}",
        insns.len()
    );
    Ok(StackReport {
        max_stack,
        return_depths,
    })
}

fn read_u1(code: &[u8], pos: &mut usize) -> Result<u8, InspectError> {
    if *pos >= code.len() {
        return Err(InspectError::UnexpectedEof(*pos));
    }
    let value = code[*pos];
    *pos += 1;
    Ok(value)
}

fn read_i1(code: &[u8], pos: &mut usize) -> Result<i8, InspectError> {
    Ok(read_u1(code, pos)? as i8)
}

fn read_u2(code: &[u8], pos: &mut usize) -> Result<u16, InspectError> {
    if *pos + 2 > code.len() {
        return Err(InspectError::UnexpectedEof(*pos));
    }
    let value = u16::from_be_bytes([code[*pos], code[*pos + 1]]);
    *pos += 2;
    Ok(value)
}

fn read_i2(code: &[u8], pos: &mut usize) -> Result<i16, InspectError> {
    Ok(read_u2(code, pos)? as i16)
}

fn read_i4(code: &[u8], pos: &mut usize) -> Result<i32, InspectError> {
    if *pos + 4 > code.len() {
        return Err(InspectError::UnexpectedEof(*pos));
    }
    let value = i32::from_be_bytes([code[*pos], code[*pos + 1], code[*pos + 2], code[*pos + 3]]);
    *pos += 4;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::{ConstantPool, ConstantPoolBuilder};

    #[test]
    fn test_decode_wide_and_switch_forms() {
        let code = vec![
            opcodes::WIDE, opcodes::IINC, 0x01, 0x00, 0xFF, 0x38,
            opcodes::ILOAD_0,
            opcodes::LOOKUPSWITCH, // at 7, no padding needed
            0, 0, 0, 13,
            0, 0, 0, 1,
            0, 0, 0, 4, 0, 0, 0, 13,
            opcodes::RETURN,
        ];
        let insns = decode(&code).unwrap();
        assert_eq!(insns.len(), 4);
        assert_eq!(
            insns[0].operand,
            Operand::Wide {
                opcode: opcodes::IINC,
                index: 256,
                increment: Some(-200),
            }
        );
        assert_eq!(insns[2].length(), 17);
        assert_eq!(insns[2].successors(), vec![20, 20]);
        assert_eq!(insns[3].offset, 24);
        assert_eq!(format!("{}", insns[1]), "    6: iload_0");
    }

    #[test]
    fn test_decode_rejects_truncated_and_reserved() {
        assert_eq!(decode(&[opcodes::SIPUSH, 0]), Err(InspectError::UnexpectedEof(1)));
        assert!(matches!(
            decode(&[0xFE]),
            Err(InspectError::InvalidOpcode { opcode: 0xFE, offset: 0 })
        ));
    }

    #[test]
    fn test_replay_detects_underflow() {
        let result = replay_stack(&[opcodes::IADD, opcodes::IRETURN], &[], &[]);
        assert_eq!(result, Err(InspectError::StackUnderflow(0)));
    }

    #[test]
    fn test_replay_detects_inconsistent_merge() {
        // iload_0; ifeq L; iconst_1; L: ireturn
        let code = vec![
            opcodes::ILOAD_0,
            opcodes::IFEQ, 0, 4,
            opcodes::ICONST_1,
            opcodes::IRETURN,
        ];
        assert!(matches!(
            replay_stack(&code, &[], &[]),
            Err(InspectError::InconsistentDepth { offset: 5, .. })
        ));
    }

    #[test]
    fn test_replay_uses_constant_pool_descriptors() {
        let mut pool = ConstantPoolBuilder::new();
        let index = pool.method_ref("demo/Math", "max", "(JJ)J");
        let [high, low] = index.to_be_bytes();
        let code = vec![
            opcodes::LLOAD_0,
            opcodes::LLOAD_2,
            opcodes::INVOKESTATIC, high, low,
            opcodes::LRETURN,
        ];
        let report = replay_stack(&code, pool.entries(), &[]).unwrap();
        assert_eq!(report.max_stack, 4);
        assert_eq!(report.return_depths, vec![(5, 2)]);
    }

    #[test]
    fn test_replay_rejects_branch_into_instruction() {
        let code = vec![opcodes::GOTO, 0, 2, opcodes::RETURN];
        assert_eq!(
            replay_stack(&code, &[], &[]),
            Err(InspectError::InvalidBranchTarget { offset: 0, target: 2 })
        );
    }

    #[test]
    fn test_replay_handler_starts_at_depth_one() {
        let code = vec![opcodes::RETURN, opcodes::ATHROW];
        let handlers = [ExceptionTableEntry {
            start_pc: 0,
            end_pc: 1,
            handler_pc: 1,
            catch_type: 0,
        }];
        let report = replay_stack(&code, &[], &handlers).unwrap();
        assert_eq!(report.max_stack, 1);
        assert_eq!(report.return_depths, vec![(0, 0)]);
    }
}
