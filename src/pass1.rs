//! First pass: read every source line, build the line chain, and record
//! what each line says.

use crate::asm::{Asm, Target};
use crate::error::AsmError;
use crate::expr::{Expr, Op, Special};
use crate::input::{
    DIRECTIVE_PREFIX, SETCONTEXT, SETLINENO, SETNOEXPANDEND, SETNOEXPANDSTART,
};
use crate::instab;
use crate::line::{InsnSel, Line, LineId};
use crate::macros::{self, Expansion, EXPANDERS};
use crate::symtab::SymFlags;

fn is_comment_start(c: char) -> bool {
    matches!(c, ';' | '*' | '#')
}

pub fn parse(asm: &mut Asm) {
    let mut lineno: Option<usize> = Some(1);
    while let Some(text) = asm.input.read_line() {
        tracing::trace!("read line: {text}");
        if let Some(rest) = text.strip_prefix(DIRECTIVE_PREFIX) {
            directive(asm, rest, &mut lineno);
            continue;
        }
        let id = new_line(asm, &text, lineno.take());
        parse_line(asm, id);
        if asm.endseen {
            break;
        }
    }
    let Some(tail) = asm.lines.tail() else {
        return;
    };
    if asm.instruct {
        asm.register_error(tail, AsmError::StructureMismatch("missing ENDSTRUCT".into()));
    }
    if asm.inmacro {
        asm.register_error(tail, AsmError::BadOperand("missing ENDM".into()));
    }
}

/// Handles one out-of-band line. These never become line records.
fn directive(asm: &mut Asm, text: &str, lineno: &mut Option<usize>) {
    let (name, arg) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    match name {
        SETCONTEXT => match arg.trim().parse() {
            Ok(context) => asm.context = context,
            Err(_) => tracing::warn!("bad context in directive: {text}"),
        },
        SETLINENO => match arg.trim().parse::<usize>() {
            Ok(n) => *lineno = Some(n.max(1)),
            Err(_) => tracing::warn!("bad line number in directive: {text}"),
        },
        SETNOEXPANDSTART => {
            if let Some(tail) = asm.lines.tail() {
                asm.lines[tail].noexpand_start = true;
            }
        }
        SETNOEXPANDEND => {
            if let Some(tail) = asm.lines.tail() {
                asm.lines[tail].noexpand_end = true;
            }
        }
        _ => tracing::warn!("unknown directive: {name}"),
    }
}

/// Appends a record for `text`, inheriting state from the previous line.
fn new_line(asm: &mut Asm, text: &str, lineno: Option<usize>) -> LineId {
    let spec = asm.input.current_spec().to_string();
    let mut line = Line::new(text, &spec, asm.context, asm.pragmas);
    if let Some(prev) = asm.lines.tail() {
        let prev_line = &asm.lines[prev];
        line.dpval = prev_line.dpval;
        line.lineno = if prev_line.spec == spec {
            prev_line.lineno + 1
        } else {
            1
        };
        line.addr = Expr::binary(
            Op::Plus,
            prev_line.addr.clone(),
            Expr::special(Special::LineLength, prev),
        );
    }
    if let Some(lineno) = lineno {
        line.lineno = lineno;
    }
    let id = asm.lines.push(line);
    let addr = asm.reduce(id, &asm.lines[id].addr);
    asm.lines[id].addr = addr;
    id
}

/// Starts a new local scope. Blank lines do this.
fn context_break(asm: &mut Asm, id: LineId) {
    asm.context = asm.new_context();
    asm.lines[id].insn = InsnSel::None;
}

fn parse_line(asm: &mut Asm, id: LineId) {
    let text = asm.lines[id].text.clone();
    asm.lines[id].insn = InsnSel::None;

    if text.is_empty() {
        context_break(asm, id);
        return;
    }
    if text.starts_with(is_comment_start) {
        return;
    }

    // a leading line number is skipped along with one following space
    let mut p = text.as_str();
    let digits = p.find(|c: char| !c.is_ascii_digit()).unwrap_or(p.len());
    if digits > 0 {
        let rest = &p[digits..];
        match rest.chars().next() {
            Some(c) if c.is_whitespace() => p = &rest[c.len_utf8()..],
            // digits alone or glued to text are not a line number
            _ => {}
        }
    }
    if p.is_empty() {
        context_break(asm, id);
        return;
    }
    if p.starts_with(is_comment_start) {
        return;
    }

    let stspace = p.starts_with(char::is_whitespace);
    p = p.trim_start();
    if p.is_empty() {
        context_break(asm, id);
        return;
    }
    if p.starts_with(is_comment_start) {
        return;
    }

    // the first token is a symbol if it ends in ':' or '=', or starts the line
    let end = p
        .find(|c: char| c.is_whitespace() || c == ':' || c == '=')
        .unwrap_or(p.len());
    let mut tok = &p[..end];
    let mut rest = &p[end..];
    let mut sym = None;
    if rest.starts_with([':', '=']) || !stspace {
        sym = Some(tok);
        rest = rest.strip_prefix(':').unwrap_or(rest).trim_start();
        if let Some(after) = rest.strip_prefix('=') {
            tok = "=";
            rest = after;
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            tok = &rest[..end];
            rest = &rest[end..];
        }
    }
    match sym {
        Some("!") => asm.lines[id].breakpoint = true,
        Some(name) if !name.is_empty() => asm.lines[id].label = Some(name.to_string()),
        _ => {}
    }

    if !tok.is_empty() || asm.inmacro {
        parse_opcode(asm, id, &text, tok, rest.trim_start());
    }

    if asm.skipcond || asm.inmacro {
        return;
    }
    let line = &asm.lines[id];
    if line.symset {
        return;
    }
    if let Some(label) = line.label.clone() {
        tracing::trace!("register symbol {label}: {}", line.addr);
        let addr = line.addr.clone();
        asm.register_symbol(id, &label, addr, SymFlags::NONE);
    }
}

fn parse_opcode(asm: &mut Asm, id: LineId, text: &str, opc: &str, operand: &str) {
    let instab = asm.instab;
    let index = if opc.is_empty() {
        None
    } else {
        instab::lookup(instab, opc)
    };
    let insn = index.map(|index| &instab[index]);

    // a macro body is stored verbatim until its terminator
    if asm.inmacro && !insn.is_some_and(|insn| insn.ends_macro()) {
        macros::add_macro_line(asm, text);
        return;
    }
    if opc.is_empty() {
        return;
    }
    // skipped conditional blocks only look at nested conditionals
    if asm.skipcond && !insn.is_some_and(|insn| insn.is_conditional()) {
        return;
    }

    let (Some(index), Some(insn)) = (index, insn) else {
        // a comment straight after a label
        if opc.starts_with(is_comment_start) {
            return;
        }
        let mut cursor = operand;
        for expand in EXPANDERS {
            match expand(asm, id, opc, &mut cursor) {
                Expansion::Handled => return,
                Expansion::Failed(e) => {
                    asm.register_error(id, e);
                    return;
                }
                Expansion::NotApplicable => {}
            }
        }
        asm.register_error(id, AsmError::BadOpcode(opc.to_string()));
        return;
    };
    asm.lines[id].insn = InsnSel::Index(index);

    if insn.is_6309() && asm.target == Target::M6809 {
        asm.register_error(id, AsmError::IllegalInstruction);
        return;
    }
    if insn.full_assembly_only() && asm.is_depend() {
        return;
    }
    let Some(parse_fn) = insn.parse else {
        return;
    };
    if (insn.struct_only() && !asm.instruct) || (asm.instruct && !insn.allowed_in_struct()) {
        asm.register_error(id, AsmError::BadOperand(format!("{opc} {operand}")));
        return;
    }

    asm.lines[id].len = None;
    let mut cursor = operand;
    parse_fn(asm, id, &mut cursor);
    if cursor.starts_with(|c: char| !c.is_whitespace()) {
        asm.register_error(id, AsmError::BadOperand(cursor.to_string()));
    }
    asm.reduce_line(id);
    match insn.resolve {
        Some(resolve) => resolve(asm, id, false),
        // without a resolver the parser alone decides the length
        None => {
            let line = &mut asm.lines[id];
            line.len = line.len.or(Some(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;

    fn run(src: &str) -> Asm {
        let mut asm = Asm::new(Input::from_str("test.asm", src));
        parse(&mut asm);
        asm
    }

    #[test]
    fn symbol_detection() {
        let asm = run("start lda #1\n  nop\nloop: bra loop\n x=5\n");
        assert_eq!(asm.lines[LineId(0)].label.as_deref(), Some("start"));
        assert_eq!(asm.lines[LineId(1)].label, None);
        assert_eq!(asm.lines[LineId(2)].label.as_deref(), Some("loop"));
        assert_eq!(asm.lines[LineId(3)].label.as_deref(), Some("x"));
        assert_eq!(asm.syms.lookup("x", 0).unwrap().value, Expr::Int(5));
        assert_eq!(asm.error_count, 0);
    }

    #[test]
    fn leading_line_numbers_are_skipped() {
        let asm = run("10 start nop\n20  nop\n");
        assert_eq!(asm.lines[LineId(0)].label.as_deref(), Some("start"));
        assert_eq!(asm.lines[LineId(1)].label, None);
        assert_eq!(asm.lines[LineId(1)].len, Some(1));
    }

    #[test]
    fn comments_and_blank_lines() {
        let asm = run("* header\n; note\n\n   \n  ; indented\n");
        assert_eq!(asm.lines.len(), 5);
        assert_eq!(asm.error_count, 0);
        assert!(asm.lines.iter().all(|(_, line)| line.insn == InsnSel::None));
        // one context per blank line
        assert_eq!(asm.context, 2);
    }

    #[test]
    fn breakpoint_marker() {
        let asm = run("! nop\n");
        assert!(asm.lines[LineId(0)].breakpoint);
        assert_eq!(asm.lines[LineId(0)].label, None);
        assert!(asm.syms.is_empty());
    }

    #[test]
    fn unknown_opcode() {
        let asm = run(" fnord 1\n");
        assert_eq!(asm.error_count, 1);
        assert_eq!(
            asm.lines[LineId(0)].errors,
            vec![AsmError::BadOpcode("fnord".into())]
        );
    }

    #[test]
    fn trailing_garbage_is_a_bad_operand() {
        let asm = run(" lda #1)\n");
        assert_eq!(asm.lines[LineId(0)].errors, vec![AsmError::BadOperand(")".into())]);
    }

    #[test]
    fn addresses_follow_lengths() {
        let asm = run(" org $100\na nop\nb lda #1\nc ldx #2\n");
        let addr = |name| asm.syms.lookup(name, 0).unwrap().value.clone();
        assert_eq!(addr("a"), Expr::Int(0x100));
        assert_eq!(addr("b"), Expr::Int(0x101));
        assert_eq!(addr("c"), Expr::Int(0x103));
    }

    #[test]
    fn line_numbers_and_directives() {
        let src = "a nop\n\x01\x01SETLINENO 0\nb nop\n\x01\x01SETLINENO 40\nc nop\nd nop\n";
        let asm = run(src);
        let numbers: Vec<_> = asm.lines.iter().map(|(_, line)| line.lineno).collect();
        assert_eq!(numbers, vec![1, 1, 40, 41]);
    }

    #[test]
    fn directives_split_at_any_whitespace() {
        let asm = run("a nop\n\x01\x01SETLINENO\t20\nb nop\n");
        assert_eq!(asm.lines[LineId(1)].lineno, 20);
    }

    #[test]
    fn context_directive() {
        let asm = run("\n\n\x01\x01SETCONTEXT 0\nx@ nop\n");
        assert_eq!(asm.lines[LineId(2)].context, 0);
        assert!(asm.syms.lookup("x@", 0).is_ok());
        assert!(asm.syms.lookup("x@", 2).is_err());
    }

    #[test]
    fn noexpand_markers() {
        let src = "a nop\n\x01\x01SETNOEXPANDSTART \nb nop\n\x01\x01SETNOEXPANDEND \n";
        let asm = run(src);
        assert!(asm.lines[LineId(0)].noexpand_start);
        assert!(asm.lines[LineId(1)].noexpand_end);
    }

    #[test]
    fn end_stops_reading() {
        let asm = run(" nop\n end\n fnord\n");
        assert_eq!(asm.lines.len(), 2);
        assert_eq!(asm.error_count, 0);
    }

    #[test]
    fn hd6309_only_in_6309_mode() {
        let mut asm = Asm::new(Input::from_str("t", " clrd\n"));
        asm.target = Target::M6809;
        parse(&mut asm);
        assert_eq!(asm.lines[LineId(0)].errors, vec![AsmError::IllegalInstruction]);

        let asm = run(" clrd\n");
        assert_eq!(asm.error_count, 0);
        assert_eq!(asm.lines[LineId(0)].len, Some(2));
    }
}
