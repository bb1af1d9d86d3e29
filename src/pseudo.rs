//! Assembler directives.

use std::fs;
use std::path::PathBuf;

use crate::asm::Asm;
use crate::error::AsmError;
use crate::expr::Expr;
use crate::input::{directive, SETCONTEXT, SETLINENO};
use crate::insn::{check_width, push_value};
use crate::line::LineId;
use crate::macros;
use crate::operand;
use crate::pragma::Pragma;
use crate::symtab::SymFlags;

/// Largest reservation or structure, in bytes: the whole address space.
pub const MAX_RESERVE: i32 = 0x10000;

/// `count` items of `width` bytes, if that is a sane size.
fn reserve_size(count: i32, width: u8) -> Option<i32> {
    count
        .checked_mul(i32::from(width))
        .filter(|size| (0..=MAX_RESERVE).contains(size))
}

fn bad_operand(asm: &mut Asm, id: LineId, msg: &str) {
    asm.register_error(id, AsmError::BadOperand(msg.to_string()));
}

fn parse_operand(asm: &mut Asm, id: LineId, p: &mut &str) -> Option<Expr> {
    match operand::parse_expr(p, id) {
        Ok(expr) => Some(expr),
        Err(e) => {
            asm.register_error(id, e);
            None
        }
    }
}

fn define(asm: &mut Asm, id: LineId, p: &mut &str, flags: u8) {
    let Some(label) = asm.lines[id].label.clone() else {
        bad_operand(asm, id, "symbol required");
        return;
    };
    asm.lines[id].symset = true;
    let Some(expr) = parse_operand(asm, id, p) else {
        return;
    };
    let value = asm.reduce(id, &expr);
    asm.lines[id].save_expr(0, value.clone());
    asm.register_symbol(id, &label, value, flags);
}

pub fn parse_equ(asm: &mut Asm, id: LineId, p: &mut &str) {
    define(asm, id, p, SymFlags::NONE);
}

pub fn parse_set(asm: &mut Asm, id: LineId, p: &mut &str) {
    define(asm, id, p, SymFlags::SET);
}

pub fn parse_org(asm: &mut Asm, id: LineId, p: &mut &str) {
    if let Some(expr) = parse_operand(asm, id, p) {
        let addr = asm.reduce(id, &expr);
        asm.lines[id].addr = addr;
    }
}

pub fn parse_setdp(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(expr) = parse_operand(asm, id, p) else {
        return;
    };
    match asm.eval(id, &expr) {
        Ok(dp) => asm.lines[id].dpval = dp & 0xFF,
        Err(_) => bad_operand(asm, id, "SETDP must be constant"),
    }
}

/// `fcb` and `fdb`: comma separated values.
pub fn parse_data(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let mut slot = 0u8;
    loop {
        let Some(expr) = parse_operand(asm, id, p) else {
            return;
        };
        asm.lines[id].save_expr(slot, expr);
        slot = slot.wrapping_add(1);
        let text: &str = *p;
        match text.strip_prefix(',') {
            Some(rest) => *p = rest,
            None => break,
        }
    }
    asm.lines[id].len = Some(asm.lines[id].exprs.len() * insn.width as usize);
}

pub fn emit_data(asm: &mut Asm, id: LineId) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    let width = insn.width as usize;
    let slots: Vec<u8> = asm.lines[id].exprs.iter().map(|(slot, _)| *slot).collect();
    let mut out = Vec::with_capacity(slots.len() * width);
    for slot in slots {
        let value = asm
            .eval_slot(id, slot)
            .and_then(|value| check_width(value, width).map(|_| value));
        match value {
            Ok(value) => push_value(&mut out, value, width),
            Err(e) => asm.register_error(id, e),
        }
    }
    asm.lines[id].output = out;
}

pub fn parse_fcc(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(text) = operand::parse_delimited(p) else {
        bad_operand(asm, id, "bad string constant");
        return;
    };
    let line = &mut asm.lines[id];
    line.data = if line.pragmas.contains(Pragma::CESCAPES) {
        operand::unescape(text)
    } else {
        text.as_bytes().to_vec()
    };
    line.len = Some(line.data.len());
}

pub fn emit_bytes(asm: &mut Asm, id: LineId) {
    let line = &mut asm.lines[id];
    line.output = line.data.clone();
}

/// `rmb`, `rmd` and `zmb`.
pub fn parse_reserve(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(expr) = parse_operand(asm, id, p) else {
        return;
    };
    if asm.instruct {
        let Some(insn) = asm.insn(id) else {
            return;
        };
        match asm.eval(id, &expr) {
            Ok(count) => match reserve_size(count, insn.width) {
                Some(size) => macros::add_struct_field(asm, id, size),
                None => bad_operand(asm, id, "structure field size out of range"),
            },
            Err(_) => bad_operand(asm, id, "structure field size must be constant"),
        }
        asm.lines[id].len = Some(0);
        return;
    }
    asm.lines[id].save_expr(0, expr);
}

pub fn resolve_reserve(asm: &mut Asm, id: LineId, _force: bool) {
    let Some(insn) = asm.insn(id) else {
        return;
    };
    if asm.lines[id].len.is_some() {
        return;
    }
    match asm.eval_slot(id, 0) {
        Ok(count) => match reserve_size(count, insn.width) {
            Some(size) => asm.lines[id].len = Some(size as usize),
            None => {
                bad_operand(asm, id, "reservation out of range");
                asm.lines[id].len = Some(0);
            }
        },
        Err(_) => {}
    }
}

pub fn emit_zeros(asm: &mut Asm, id: LineId) {
    let line = &mut asm.lines[id];
    line.output = vec![0; line.len.unwrap_or_default()];
}

pub fn parse_end(asm: &mut Asm, id: LineId, p: &mut &str) {
    asm.endseen = true;
    if p.is_empty() {
        return;
    }
    if let Some(expr) = parse_operand(asm, id, p) {
        asm.lines[id].save_expr(0, expr);
        asm.end_line = Some(id);
    }
}

pub fn parse_pragma(asm: &mut Asm, id: LineId, p: &mut &str) {
    let text: &str = *p;
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    let list = &text[..end];
    *p = &text[end..];
    if list.is_empty() {
        bad_operand(asm, id, "pragma list required");
        return;
    }
    let mut pragmas = asm.pragmas;
    match pragmas.apply(list) {
        Ok(()) => {
            asm.pragmas = pragmas;
            asm.lines[id].pragmas = pragmas;
        }
        Err(e) => asm.register_error(id, e),
    }
}

/// Finds the file named by the operand. `None` means there is nothing more
/// to do for the line, either because an error was registered or because a
/// tolerant dependency scan skips the file.
fn include_path(asm: &mut Asm, id: LineId, p: &mut &str) -> Option<PathBuf> {
    let Some(name) = operand::parse_filename(p) else {
        bad_operand(asm, id, "file name required");
        return None;
    };
    match asm.input.resolve(name) {
        Some(path) => {
            asm.input.discover(&path);
            Some(path)
        }
        None if asm.is_depend_noerr() => {
            tracing::debug!("skipping missing file {name}");
            None
        }
        None => {
            asm.register_error(id, AsmError::Include(name.to_string()));
            None
        }
    }
}

pub fn parse_include(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(path) = include_path(asm, id, p) else {
        return;
    };
    let epilogue = vec![
        directive(SETCONTEXT, asm.context),
        directive(SETLINENO, asm.lines[id].lineno + 1),
    ];
    match asm.input.open(&path, epilogue) {
        Ok(()) => asm.context = asm.new_context(),
        Err(e) => asm.register_error(id, e),
    }
}

pub fn parse_includebin(asm: &mut Asm, id: LineId, p: &mut &str) {
    let Some(path) = include_path(asm, id, p) else {
        return;
    };
    match fs::read(&path) {
        Ok(data) => {
            let line = &mut asm.lines[id];
            line.len = Some(data.len());
            line.data = data;
        }
        Err(e) => asm.register_error(id, AsmError::Include(format!("{}: {e}", path.display()))),
    }
}

pub fn parse_error(asm: &mut Asm, id: LineId, p: &mut &str) {
    let msg = p.trim().to_string();
    *p = "";
    asm.register_error(id, AsmError::UserError(msg));
}

fn parse_cond(asm: &mut Asm, id: LineId, p: &mut &str, test: fn(i32) -> bool) {
    if asm.skipcond {
        asm.skipcount += 1;
        *p = "";
        return;
    }
    let Some(expr) = parse_operand(asm, id, p) else {
        return;
    };
    let result = expr.evaluate(&asm.cond_resolver(id));
    match result {
        Ok(value) => {
            if !test(value) {
                asm.skipcond = true;
                asm.skipcount = 1;
            }
        }
        Err(_) => bad_operand(asm, id, "conditions must be constant"),
    }
}

pub fn parse_ifne(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_cond(asm, id, p, |v| v != 0);
}

pub fn parse_ifeq(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_cond(asm, id, p, |v| v == 0);
}

pub fn parse_iflt(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_cond(asm, id, p, |v| v < 0);
}

pub fn parse_ifle(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_cond(asm, id, p, |v| v <= 0);
}

pub fn parse_ifgt(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_cond(asm, id, p, |v| v > 0);
}

pub fn parse_ifge(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_cond(asm, id, p, |v| v >= 0);
}

fn parse_ifdef_common(asm: &mut Asm, id: LineId, p: &mut &str, want: bool) {
    if asm.skipcond {
        asm.skipcount += 1;
        *p = "";
        return;
    }
    let text: &str = *p;
    let end = text
        .find(|c: char| !operand::is_symbol_char(c))
        .unwrap_or(text.len());
    let name = &text[..end];
    *p = &text[end..];
    if name.is_empty() {
        bad_operand(asm, id, "symbol required");
        return;
    }
    let context = asm.lines[id].context;
    let defined = asm.syms.lookup(name, context).is_ok();
    if defined != want {
        asm.skipcond = true;
        asm.skipcount = 1;
    }
}

pub fn parse_ifdef(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_ifdef_common(asm, id, p, true);
}

pub fn parse_ifndef(asm: &mut Asm, id: LineId, p: &mut &str) {
    parse_ifdef_common(asm, id, p, false);
}

pub fn parse_else(asm: &mut Asm, _id: LineId, p: &mut &str) {
    *p = "";
    if asm.skipcond {
        if asm.skipcount == 1 {
            asm.skipcond = false;
            asm.skipcount = 0;
        }
    } else {
        asm.skipcond = true;
        asm.skipcount = 1;
    }
}

pub fn parse_endc(asm: &mut Asm, _id: LineId, p: &mut &str) {
    *p = "";
    if asm.skipcond {
        asm.skipcount = asm.skipcount.saturating_sub(1);
        if asm.skipcount == 0 {
            asm.skipcond = false;
        }
    }
}
