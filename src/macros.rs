//! Macro and structure definitions, and expanding them when their name
//! turns up where an opcode was expected.

use crate::asm::Asm;
use crate::error::AsmError;
use crate::expr::{Expr, Op};
use crate::input::{directive, SETCONTEXT, SETLINENO, SETNOEXPANDEND, SETNOEXPANDSTART};
use crate::line::LineId;
use crate::pseudo::MAX_RESERVE;
use crate::symtab::SymFlags;

const MAX_MACRO_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub lines: Vec<String>,
    /// Expansion lines are hidden from listings.
    pub noexpand: bool,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<String>,
    pub offset: i32,
    pub size: i32,
    /// Index of the structure this field is an instance of.
    pub substruct: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Struct {
    pub name: String,
    pub fields: Vec<Field>,
    pub size: i32,
}

/// Outcome of offering an unknown opcode to a fallback handler.
#[derive(Debug)]
pub enum Expansion {
    Handled,
    NotApplicable,
    Failed(AsmError),
}

pub type ExpandFn = fn(&mut Asm, LineId, &str, &mut &str) -> Expansion;

/// Tried in order for opcodes missing from the instruction table.
pub const EXPANDERS: &[ExpandFn] = &[expand_macro, expand_struct];

pub fn parse_macro(asm: &mut Asm, id: LineId, p: &mut &str) {
    let options = std::mem::take(p);
    let Some(name) = asm.lines[id].label.clone() else {
        asm.register_error(id, AsmError::BadOperand("macro name required".into()));
        return;
    };
    if asm.macros.iter().any(|mac| mac.name == name) {
        asm.register_error(id, AsmError::DuplicateSymbol(name));
        return;
    }
    let noexpand = options
        .split_whitespace()
        .next()
        .is_some_and(|opt| opt.eq_ignore_ascii_case("noexpand"));
    tracing::trace!("defining macro {name}");
    asm.cur_macro = Some(Macro {
        name,
        lines: Vec::new(),
        noexpand,
    });
    asm.inmacro = true;
}

pub fn add_macro_line(asm: &mut Asm, line: &str) {
    if let Some(mac) = asm.cur_macro.as_mut() {
        mac.lines.push(line.to_string());
    }
}

pub fn parse_endm(asm: &mut Asm, id: LineId, _p: &mut &str) {
    if !asm.inmacro {
        asm.register_error(id, AsmError::BadOperand("ENDM without MACRO".into()));
        return;
    }
    asm.inmacro = false;
    if let Some(mac) = asm.cur_macro.take() {
        asm.macros.push(mac);
    }
}

fn macro_args(text: &str) -> Vec<&str> {
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    let text = &text[..end];
    if text.is_empty() {
        return Vec::new();
    }
    text.split(',').collect()
}

/// Replaces `\1` through `\9` with arguments and `\0` with their count.
fn substitute(line: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                chars.next();
                match digit {
                    0 => out.push_str(&args.len().to_string()),
                    n => out.push_str(args.get(n as usize - 1).copied().unwrap_or("")),
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

pub fn expand_macro(asm: &mut Asm, id: LineId, opc: &str, p: &mut &str) -> Expansion {
    let Some(index) = asm.macros.iter().position(|mac| mac.name == opc) else {
        return Expansion::NotApplicable;
    };
    if asm.input.macro_depth() >= MAX_MACRO_DEPTH {
        return Expansion::Failed(AsmError::BadOperand("macro expansion too deep".into()));
    }
    let operand = std::mem::take(p);
    let args = macro_args(operand);
    let mac = &asm.macros[index];
    let mut lines = Vec::with_capacity(mac.lines.len() + 4);
    if mac.noexpand {
        lines.push(directive(SETNOEXPANDSTART, ""));
    }
    lines.extend(mac.lines.iter().map(|line| substitute(line, &args)));
    if mac.noexpand {
        lines.push(directive(SETNOEXPANDEND, ""));
    }
    lines.push(directive(SETCONTEXT, asm.context));
    lines.push(directive(SETLINENO, asm.lines[id].lineno + 1));
    let name = mac.name.clone();
    tracing::trace!("expanding macro {name} with {} args", args.len());
    asm.context = asm.new_context();
    asm.input.push_macro(&name, lines);
    Expansion::Handled
}

pub fn parse_struct(asm: &mut Asm, id: LineId, _p: &mut &str) {
    asm.lines[id].symset = true;
    let Some(name) = asm.lines[id].label.clone() else {
        asm.register_error(id, AsmError::BadOperand("structure name required".into()));
        return;
    };
    if asm.instruct {
        asm.register_error(
            id,
            AsmError::StructureMismatch(format!("{name} defined inside another structure")),
        );
        return;
    }
    if asm.structs.iter().any(|s| s.name == name) {
        asm.register_error(id, AsmError::DuplicateSymbol(name));
        return;
    }
    asm.cur_struct = Some(Struct {
        name,
        fields: Vec::new(),
        size: 0,
    });
    asm.instruct = true;
}

/// Appends a field to the structure being defined, reporting a structure
/// that grows past the address space.
fn push_field(asm: &mut Asm, id: LineId, name: Option<String>, size: i32, substruct: Option<usize>) {
    let Some(s) = asm.cur_struct.as_mut() else {
        return;
    };
    let Some(total) = s.size.checked_add(size).filter(|total| *total <= MAX_RESERVE) else {
        let msg = format!("structure {} too large", s.name);
        asm.register_error(id, AsmError::BadOperand(msg));
        return;
    };
    s.fields.push(Field {
        name,
        offset: s.size,
        size,
        substruct,
    });
    s.size = total;
}

/// Adds a field of `size` bytes named by the line's label.
pub fn add_struct_field(asm: &mut Asm, id: LineId, size: i32) {
    asm.lines[id].symset = true;
    let name = asm.lines[id].label.clone();
    push_field(asm, id, name, size, None);
}

/// Collects `prefix.field` symbols for every named field, recursing into
/// nested instances.
fn field_symbols(structs: &[Struct], s: &Struct, prefix: &str, base: &Expr, out: &mut Vec<(String, Expr)>) {
    for field in &s.fields {
        let Some(name) = &field.name else {
            continue;
        };
        let name = format!("{prefix}.{name}");
        let value = Expr::binary(Op::Plus, base.clone(), Expr::Int(field.offset));
        if let Some(sub) = field.substruct.and_then(|index| structs.get(index)) {
            field_symbols(structs, sub, &name, &value, out);
        }
        out.push((name, value));
    }
}

pub fn parse_endstruct(asm: &mut Asm, id: LineId, _p: &mut &str) {
    asm.instruct = false;
    let Some(s) = asm.cur_struct.take() else {
        return;
    };
    tracing::trace!("structure {} is {} bytes", s.name, s.size);
    let mut syms = vec![(s.name.clone(), Expr::Int(s.size))];
    field_symbols(&asm.structs, &s, &s.name, &Expr::Int(0), &mut syms);
    for (name, value) in syms {
        asm.register_symbol(id, &name, value, SymFlags::NONE);
    }
    asm.structs.push(s);
}

pub fn expand_struct(asm: &mut Asm, id: LineId, opc: &str, _p: &mut &str) -> Expansion {
    let Some(index) = asm.structs.iter().position(|s| s.name == opc) else {
        return Expansion::NotApplicable;
    };
    let size = asm.structs[index].size;
    let Some(label) = asm.lines[id].label.clone() else {
        return Expansion::Failed(AsmError::BadOperand(
            "structure instance needs a name".into(),
        ));
    };
    if asm.instruct {
        asm.lines[id].symset = true;
        asm.lines[id].len = Some(0);
        push_field(asm, id, Some(label), size, Some(index));
        return Expansion::Handled;
    }
    let base = asm.lines[id].addr.clone();
    let mut syms = Vec::new();
    field_symbols(&asm.structs, &asm.structs[index], &label, &base, &mut syms);
    for (name, value) in syms {
        asm.register_symbol(id, &name, value, SymFlags::NONE);
    }
    asm.lines[id].len = Some(size as usize);
    Expansion::Handled
}
