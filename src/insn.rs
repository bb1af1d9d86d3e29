//! Operand handling for machine instructions.

use crate::asm::Asm;
use crate::error::AsmError;
use crate::instab::____;
use crate::line::{LineId, Mode};
use crate::operand;

fn opcode_len(op: u16) -> usize {
    if op > 0xFF {
        2
    } else {
        1
    }
}

fn push_opcode(out: &mut Vec<u8>, op: u16) {
    if op > 0xFF {
        out.push((op >> 8) as u8);
    }
    out.push(op as u8);
}

/// Rejects values that do not fit `width` bytes, signed or unsigned.
pub fn check_width(value: i32, width: usize) -> Result<(), AsmError> {
    let fits = match width {
        1 => (-128..=255).contains(&value),
        2 => (-32768..=65535).contains(&value),
        _ => true,
    };
    if fits {
        Ok(())
    } else {
        Err(AsmError::ByteOverflow(value))
    }
}

/// Appends the low `width` bytes of `value`, big endian.
pub fn push_value(out: &mut Vec<u8>, value: i32, width: usize) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[bytes.len() - width.min(bytes.len())..]);
}

pub fn parse_inherent(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let line = &mut asm.lines[id];
    line.opcode = insn.ops[0];
    line.mode = Some(Mode::Inherent);
    line.len = Some(opcode_len(insn.ops[0]));
    // anything after an inherent instruction is commentary
    *p = "";
}

pub fn emit_inherent(asm: &mut Asm, id: LineId) {
    let line = &mut asm.lines[id];
    let mut out = Vec::new();
    push_opcode(&mut out, line.opcode);
    line.output = out;
}

pub fn parse_general(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let text = *p;
    let (mode, mut cursor) = if let Some(rest) = text.strip_prefix('#') {
        (Mode::Immediate, rest)
    } else if let Some(rest) = text.strip_prefix('<') {
        (Mode::Direct, rest)
    } else if let Some(rest) = text.strip_prefix('>') {
        (Mode::Extended, rest)
    } else {
        (Mode::Auto, text)
    };
    let op = match mode {
        Mode::Immediate => insn.ops[0],
        Mode::Direct => insn.ops[1],
        _ => insn.ops[2],
    };
    if op == ____ {
        asm.register_error(id, AsmError::BadOperand(text.to_string()));
        return;
    }
    let expr = match operand::parse_expr(&mut cursor, id) {
        Ok(expr) => expr,
        Err(e) => {
            asm.register_error(id, e);
            return;
        }
    };
    *p = cursor;
    let line = &mut asm.lines[id];
    line.save_expr(0, expr);
    line.mode = Some(mode);
    line.len = match mode {
        Mode::Immediate => Some(opcode_len(op) + insn.width as usize),
        Mode::Direct => Some(opcode_len(op) + 1),
        Mode::Extended => Some(opcode_len(op) + 2),
        _ => None,
    };
    if line.len.is_some() {
        line.opcode = op;
    }
}

/// Picks direct addressing when the operand lands in the direct page.
pub fn resolve_general(asm: &mut Asm, id: LineId, force: bool) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let line = &asm.lines[id];
    if line.len.is_some() || line.mode != Some(Mode::Auto) {
        return;
    }
    let dp = line.dpval & 0xFF;
    let mode = match asm.eval_slot(id, 0) {
        Ok(value) if insn.ops[1] != ____ && ((value >> 8) & 0xFF) == dp => Mode::Direct,
        Ok(_) => Mode::Extended,
        Err(_) if force => Mode::Extended,
        Err(_) => return,
    };
    let (op, size) = match mode {
        Mode::Direct => (insn.ops[1], 1),
        _ => (insn.ops[2], 2),
    };
    tracing::trace!("line {id}: {} resolved to {mode:?}", insn.name);
    let line = &mut asm.lines[id];
    line.mode = Some(mode);
    line.opcode = op;
    line.len = Some(opcode_len(op) + size);
}

pub fn emit_general(asm: &mut Asm, id: LineId) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let value = match asm.eval_slot(id, 0) {
        Ok(value) => value,
        Err(e) => {
            asm.register_error(id, e);
            return;
        }
    };
    let (mode, opcode) = (asm.lines[id].mode, asm.lines[id].opcode);
    let width = match mode {
        Some(Mode::Immediate) => insn.width as usize,
        Some(Mode::Direct) => 1,
        _ => 2,
    };
    let value = match mode {
        // only the low byte of a direct page address is encoded
        Some(Mode::Direct) => value & 0xFF,
        _ => value,
    };
    if let Err(e) = check_width(value, width) {
        asm.register_error(id, e);
        return;
    }
    let mut out = Vec::new();
    push_opcode(&mut out, opcode);
    push_value(&mut out, value, width);
    asm.lines[id].output = out;
}

pub fn parse_relative(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let expr = match operand::parse_expr(p, id) {
        Ok(expr) => expr,
        Err(e) => {
            asm.register_error(id, e);
            return;
        }
    };
    let line = &mut asm.lines[id];
    line.save_expr(0, expr);
    line.mode = Some(Mode::Relative);
    line.opcode = insn.ops[0];
    line.len = Some(opcode_len(insn.ops[0]) + insn.width as usize);
}

pub fn emit_relative(asm: &mut Asm, id: LineId) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let line = &asm.lines[id];
    let addr = line.addr.clone();
    let len = line.len.unwrap_or_default() as i32;
    let result = asm
        .eval_slot(id, 0)
        .and_then(|target| Ok(target.wrapping_sub(asm.eval(id, &addr)?.wrapping_add(len))));
    let offset = match result {
        Ok(offset) => offset,
        Err(e) => {
            asm.register_error(id, e);
            return;
        }
    };
    let width = insn.width as usize;
    let fits = match width {
        1 => (-128..=127).contains(&offset),
        _ => (-32768..=32767).contains(&offset),
    };
    if !fits {
        asm.register_error(id, AsmError::ByteOverflow(offset));
        return;
    }
    let mut out = Vec::new();
    push_opcode(&mut out, asm.lines[id].opcode);
    push_value(&mut out, offset, width);
    asm.lines[id].output = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert!(check_width(255, 1).is_ok());
        assert!(check_width(-128, 1).is_ok());
        assert_eq!(check_width(256, 1), Err(AsmError::ByteOverflow(256)));
        assert!(check_width(-32768, 2).is_ok());
        assert!(check_width(65536, 2).is_err());
        assert!(check_width(i32::MIN, 4).is_ok());
    }

    #[test]
    fn big_endian_values() {
        let mut out = Vec::new();
        push_opcode(&mut out, 0x108E);
        push_value(&mut out, 0x1234, 2);
        push_value(&mut out, -1, 1);
        assert_eq!(out, vec![0x10, 0x8E, 0x12, 0x34, 0xFF]);
    }
}
