//! Linear instruction stream decoder
//!
//! Walks a method body one instruction at a time using the compile-time opcode
//! tables. Decoding stops at the first byte sequence that is not a valid
//! instruction, since the width of anything after it is unknown.

use thiserror::Error;

use super::opcodes::{self, OpCode, OperandType, TWO_BYTE_PREFIX};
use crate::module::metadata::Token;

/// Instruction stream decoding errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode 0x{value:02X} at IL_{offset:04X}")]
    UnknownOpcode { offset: usize, value: u16 },

    #[error("truncated {opcode} operand at IL_{offset:04X}")]
    Truncated { offset: usize, opcode: &'static str },

    #[error("{opcode} at IL_{offset:04X} targets IL_{target:04X} outside the {len}-byte body")]
    BranchOutOfRange {
        offset: usize,
        opcode: &'static str,
        target: i64,
        len: usize,
    },
}

/// Decoded operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Raw little-endian immediate (variable index, constant, float bits)
    Immediate(u64),
    /// Metadata token (member, user string or signature)
    Token(Token),
    /// Absolute branch target offset
    Branch(usize),
    /// Absolute switch target offsets
    Switch(Vec<usize>),
}

/// A decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first opcode byte
    pub offset: usize,
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    /// Token operand, if any
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }
}

/// Iterator over the instructions of a method body
pub struct InstructionReader<'a> {
    code: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> InstructionReader<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pos: 0,
            failed: false,
        }
    }

    fn take(&mut self, width: usize, offset: usize, opcode: &OpCode) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(width)
            .filter(|&end| end <= self.code.len())
            .ok_or(DecodeError::Truncated {
                offset,
                opcode: opcode.name,
            })?;
        let code: &'a [u8] = self.code;
        let bytes = &code[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u32(&mut self, offset: usize, opcode: &OpCode) -> Result<u32, DecodeError> {
        let bytes = self.take(4, offset, opcode)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn branch_target(
        &self,
        base: usize,
        delta: i64,
        offset: usize,
        opcode: &OpCode,
    ) -> Result<usize, DecodeError> {
        let target = base as i64 + delta;
        if target < 0 || target >= self.code.len() as i64 {
            return Err(DecodeError::BranchOutOfRange {
                offset,
                opcode: opcode.name,
                target,
                len: self.code.len(),
            });
        }
        Ok(target as usize)
    }

    fn read_opcode(&mut self) -> Result<OpCode, DecodeError> {
        let offset = self.pos;
        let first = self.code[self.pos];
        self.pos += 1;
        if first != TWO_BYTE_PREFIX {
            return opcodes::one_byte(first).ok_or(DecodeError::UnknownOpcode {
                offset,
                value: first as u16,
            });
        }
        let second = *self.code.get(self.pos).ok_or(DecodeError::Truncated {
            offset,
            opcode: "two-byte opcode",
        })?;
        self.pos += 1;
        opcodes::two_byte(second).ok_or(DecodeError::UnknownOpcode {
            offset,
            value: ((TWO_BYTE_PREFIX as u16) << 8) | second as u16,
        })
    }

    fn read_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.pos;
        let opcode = self.read_opcode()?;

        let operand = match opcode.operand {
            OperandType::InlineNone => Operand::None,
            OperandType::ShortInlineBrTarget => {
                let delta = self.take(1, offset, &opcode)?[0] as i8 as i64;
                Operand::Branch(self.branch_target(self.pos, delta, offset, &opcode)?)
            }
            OperandType::InlineBrTarget => {
                let delta = self.read_u32(offset, &opcode)? as i32 as i64;
                Operand::Branch(self.branch_target(self.pos, delta, offset, &opcode)?)
            }
            OperandType::InlineSwitch => {
                let count = self.read_u32(offset, &opcode)? as usize;
                let table_len = count.checked_mul(4).ok_or(DecodeError::Truncated {
                    offset,
                    opcode: opcode.name,
                })?;
                let table = self.take(table_len, offset, &opcode)?;
                // Targets are relative to the end of the whole switch instruction
                let base = self.pos;
                let mut targets = Vec::with_capacity(count);
                for chunk in table.chunks_exact(4) {
                    let delta = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as i64;
                    targets.push(self.branch_target(base, delta, offset, &opcode)?);
                }
                Operand::Switch(targets)
            }
            OperandType::InlineString
            | OperandType::InlineSig
            | OperandType::InlineMethod
            | OperandType::InlineField
            | OperandType::InlineType
            | OperandType::InlineTok => Operand::Token(Token(self.read_u32(offset, &opcode)?)),
            other => {
                let width = other.fixed_width().unwrap_or(0);
                let bytes = self.take(width, offset, &opcode)?;
                let mut raw = [0u8; 8];
                raw[..bytes.len()].copy_from_slice(bytes);
                Operand::Immediate(u64::from_le_bytes(raw))
            }
        };

        Ok(Instruction {
            offset,
            opcode,
            operand,
        })
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.code.len() {
            return None;
        }
        let result = self.read_instruction();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Decode a whole body, stopping at the first error
pub fn decode_all(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    InstructionReader::new(code).collect()
}
