use std::fs;

use hdasm::{
    line::LineId, output, symtab::Scope, Asm, AsmError, AsmFlags, Expr, Input, OutputFormat,
    PipelineError,
};

fn assemble(src: &str) -> (Asm, Result<(), PipelineError>) {
    let mut asm = Asm::new(Input::from_str("test.asm", src));
    asm.set_format(OutputFormat::Raw);
    let result = hdasm::run(&mut asm);
    (asm, result)
}

fn image(asm: &Asm) -> Vec<u8> {
    let mut out = Vec::new();
    output::write_output(asm, &mut out).unwrap();
    out
}

fn value(asm: &Asm, name: &str) -> Expr {
    asm.syms.lookup(name, 0).unwrap().value.clone()
}

#[test]
fn global_symbols_cross_blank_lines() {
    let (asm, result) = assemble("A equ 5\nB equ A+1\n\nC equ A+1\n");
    assert_eq!(result, Ok(()));
    assert_eq!(value(&asm, "B"), Expr::Int(6));
    assert_eq!(value(&asm, "C"), Expr::Int(6));
}

#[test]
fn local_symbols_end_at_blank_lines() {
    let (asm, result) = assemble("A@ equ 5\nB equ A@+1\n\nC equ A@+1\n");
    assert_eq!(
        result,
        Err(PipelineError::Aborted {
            pass: "symcheck",
            errors: 1
        })
    );
    assert_eq!(value(&asm, "B"), Expr::Int(6));
    assert_eq!(
        asm.lines[LineId(3)].errors,
        vec![AsmError::UnresolvedReference("A@".into())]
    );
}

#[test]
fn unknown_opcode_counts_once() {
    let (asm, result) = assemble(" fnord 1,2\n nop\n");
    assert_eq!(
        result,
        Err(PipelineError::Aborted {
            pass: "parse",
            errors: 1
        })
    );
    assert_eq!(asm.error_count, 1);
    assert_eq!(
        asm.lines[LineId(0)].errors,
        vec![AsmError::BadOpcode("fnord".into())]
    );
    assert!(asm.lines[LineId(1)].errors.is_empty());
}

#[test]
fn forward_references_pick_direct_or_extended() {
    let (asm, result) = assemble(" lda later\nlater equ $10\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![0x96, 0x10]);

    let (asm, result) = assemble(" lda later\nlater equ $1234\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![0xB6, 0x12, 0x34]);
}

#[test]
fn setdp_moves_the_direct_page() {
    let (asm, result) = assemble(" setdp $20\n lda $2010\n lda $10\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![0x96, 0x10, 0xB6, 0x00, 0x10]);
}

#[test]
fn unknown_lengths_are_forced_long() {
    let (asm, result) = assemble(" org $2000\n jmp there\n nop\nthere nop\n");
    assert_eq!(result, Ok(()));
    assert_eq!(value(&asm, "there"), Expr::Int(0x2004));
    assert_eq!(image(&asm), vec![0x7E, 0x20, 0x04, 0x12, 0x12]);
}

#[test]
fn branches() {
    let (asm, result) = assemble("top nop\n bra top\n lbra top\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![0x12, 0x20, 0xFD, 0x16, 0xFF, 0xFA]);
}

#[test]
fn division_by_zero_is_reported_at_finalize() {
    let (asm, result) = assemble(" fcb 1/0\n");
    assert_eq!(
        result,
        Err(PipelineError::Aborted {
            pass: "finalize",
            errors: 1
        })
    );
    assert_eq!(asm.lines[LineId(0)].errors, vec![AsmError::DivisionByZero]);
}

#[test]
fn zero_divisions_are_not_cancelled() {
    let (asm, result) = assemble(" fcb (1/0)*0\n fcb 1/0-1/0\n");
    assert_eq!(
        result,
        Err(PipelineError::Aborted {
            pass: "finalize",
            errors: 2
        })
    );
    assert_eq!(asm.lines[LineId(0)].errors, vec![AsmError::DivisionByZero]);
    assert_eq!(asm.lines[LineId(1)].errors, vec![AsmError::DivisionByZero]);
}

#[test]
fn byte_overflow_is_reported_at_emit() {
    let (asm, result) = assemble(" fcb 300\n");
    assert_eq!(
        result,
        Err(PipelineError::Aborted {
            pass: "emit",
            errors: 1
        })
    );
    assert_eq!(asm.lines[LineId(0)].errors, vec![AsmError::ByteOverflow(300)]);
}

#[test]
fn duplicate_labels() {
    let (asm, result) = assemble("x nop\nx nop\n");
    assert!(result.is_err());
    assert_eq!(
        asm.lines[LineId(1)].errors,
        vec![AsmError::DuplicateSymbol("x".into())]
    );
}

#[test]
fn set_may_be_redefined() {
    let (asm, result) = assemble("v set 1\n fcb v\nv set 2\n fcb v\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![1, 2]);
}

#[test]
fn conditionals() {
    let src = "\
DEBUG equ 1
 ifne DEBUG
 fcb 1
 else
 fcb 2
 endc
 ifdef NOPE
 fcb 3
 error not reached
 endc
 ifndef NOPE
 fcb 4
 endc
 ifeq 1
 ifne 1
 fcb 9
 endc
 fcb 8
 endc
 fcb 7
";
    let (asm, result) = assemble(src);
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![1, 4, 7]);
}

#[test]
fn undefined_symbols_in_conditions() {
    let (_, result) = assemble(" ifne MISSING\n fcb 1\n endc\n");
    assert!(result.is_err());

    let (asm, result) = assemble(" pragma condundefzero\n ifne MISSING\n fcb 1\n endc\n fcb 2\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![2]);
}

#[test]
fn user_errors() {
    let (asm, result) = assemble(" error stop here\n");
    assert!(result.is_err());
    assert_eq!(
        asm.lines[LineId(0)].errors,
        vec![AsmError::UserError("stop here".into())]
    );
}

#[test]
fn macros_expand_with_arguments() {
    let src = "\
load macro
lp@ lda \\1
 bra lp@
 endm
 load #1
 load #2
";
    let (asm, result) = assemble(src);
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![0x86, 0x01, 0x20, 0xFC, 0x86, 0x02, 0x20, 0xFC]);
}

#[test]
fn macro_body_labels_are_not_defined_by_the_definition() {
    let (asm, result) = assemble("m macro\ninner nop\n endm\n");
    assert_eq!(result, Ok(()));
    assert!(asm.syms.lookup("inner", 0).is_err());
    assert!(asm.syms.is_empty());
    assert!(image(&asm).is_empty());
}

#[test]
fn unterminated_macro() {
    let (asm, result) = assemble("m macro\n nop\n");
    assert!(result.is_err());
    assert!(matches!(
        asm.lines[LineId(1)].errors[..],
        [AsmError::BadOperand(_)]
    ));
}

#[test]
fn structures() {
    let src = "\
point struct
x rmb 1
y rmd 1
 endstruct
 org $100
p1 point
 lda p1.y
";
    let (asm, result) = assemble(src);
    assert_eq!(result, Ok(()));
    assert_eq!(value(&asm, "point"), Expr::Int(3));
    assert_eq!(value(&asm, "point.y"), Expr::Int(1));
    assert_eq!(value(&asm, "p1"), Expr::Int(0x100));
    assert_eq!(value(&asm, "p1.y"), Expr::Int(0x101));
    assert_eq!(image(&asm), vec![0xB6, 0x01, 0x01]);
}

#[test]
fn structure_errors() {
    let (asm, _) = assemble(" endstruct\n");
    assert!(matches!(
        asm.lines[LineId(0)].errors[..],
        [AsmError::BadOperand(_)]
    ));

    let (asm, _) = assemble("s struct\nx rmb 1\n");
    assert!(matches!(
        asm.lines[LineId(1)].errors[..],
        [AsmError::StructureMismatch(_)]
    ));

    let (asm, _) = assemble("s struct\n fcb 1\n endstruct\n");
    assert!(matches!(
        asm.lines[LineId(1)].errors[..],
        [AsmError::BadOperand(_)]
    ));

    let (asm, _) = assemble("a struct\nb struct\n endstruct\n");
    assert!(matches!(
        asm.lines[LineId(1)].errors[..],
        [AsmError::StructureMismatch(_)]
    ));
}

#[test]
fn oversized_structure_fields() {
    let (asm, result) = assemble("s struct\nx rmd $7fffffff\n endstruct\n");
    assert!(result.is_err());
    assert!(matches!(
        asm.lines[LineId(1)].errors[..],
        [AsmError::BadOperand(_)]
    ));

    // each field fits but the total does not
    let (asm, result) = assemble("s struct\nx rmb $8000\ny rmd $4000\nz rmb 1\n endstruct\n");
    assert!(result.is_err());
    assert!(asm.lines[LineId(2)].errors.is_empty());
    assert!(matches!(
        asm.lines[LineId(3)].errors[..],
        [AsmError::BadOperand(_)]
    ));

    let (asm, result) = assemble("s struct\nx rmb $c000\n endstruct\nt struct\na s\nb s\n endstruct\n");
    assert!(result.is_err());
    assert!(matches!(
        asm.lines[LineId(5)].errors[..],
        [AsmError::BadOperand(_)]
    ));
}

#[test]
fn oversized_reservations() {
    let (asm, result) = assemble(" rmb $40000000\n rmb $40000000\nafter nop\n");
    assert!(result.is_err());
    assert!(matches!(
        asm.lines[LineId(0)].errors[..],
        [AsmError::BadOperand(_)]
    ));
    assert!(matches!(
        asm.lines[LineId(1)].errors[..],
        [AsmError::BadOperand(_)]
    ));

    let (asm, result) = assemble(" rmb -1\n");
    assert!(result.is_err());
    assert!(matches!(
        asm.lines[LineId(0)].errors[..],
        [AsmError::BadOperand(_)]
    ));

    let (asm, result) = assemble(" rmd $8000\nafter nop\n");
    assert_eq!(result, Ok(()));
    assert_eq!(value(&asm, "after"), Expr::Int(0x10000));
}

#[test]
fn blank_lines_open_new_contexts() {
    let src = "a nop\n\nb nop\n* comment\nc nop\n   \nd nop\n; note\ne nop\n\t\nf nop\n";
    let (asm, result) = assemble(src);
    assert_eq!(result, Ok(()));
    let lines: Vec<_> = asm.lines.iter().map(|(_, line)| line).collect();
    for pair in lines.windows(2) {
        let (this, next) = (pair[0], pair[1]);
        if this.text.trim().is_empty() {
            assert!(next.context > this.context, "after {:?}", this.text);
        } else {
            assert_eq!(next.context, this.context, "after {:?}", this.text);
        }
    }
    assert_eq!(lines.first().unwrap().context, 0);
    assert!(lines.last().unwrap().context >= 3);
}

#[test]
fn decb_blocks_and_exec_address() {
    let mut asm = Asm::new(Input::from_str(
        "test.asm",
        " org $e00\nstart lda #1\n rts\n org $f00\n fcb 7\n end start\n",
    ));
    hdasm::run(&mut asm).unwrap();
    assert_eq!(asm.execaddr, Some(0xE00));
    assert_eq!(
        image(&asm),
        vec![
            0x00, 0x00, 0x03, 0x0E, 0x00, 0x86, 0x01, 0x39, //
            0x00, 0x00, 0x01, 0x0F, 0x00, 0x07, //
            0xFF, 0x00, 0x00, 0x0E, 0x00,
        ]
    );
}

#[test]
fn hd6309_instructions_need_6309_mode() {
    let mut asm = Asm::new(Input::from_str("test.asm", " ldq #1\n"));
    asm.target = hdasm::Target::M6809;
    assert!(hdasm::run(&mut asm).is_err());
    assert_eq!(asm.lines[LineId(0)].errors, vec![AsmError::IllegalInstruction]);

    let (asm, result) = assemble(" ldq #$01020304\n");
    assert_eq!(result, Ok(()));
    assert_eq!(image(&asm), vec![0xCD, 0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn dependency_scan_only_parses() {
    let mut asm = Asm::new(Input::from_str("test.asm", " fcb undefined\n error boom\n"));
    asm.flags |= AsmFlags::DEPEND;
    assert_eq!(hdasm::run(&mut asm), Ok(()));
    assert!(asm.lines.iter().all(|(_, line)| line.output.is_empty()));
    assert_eq!(asm.passno, 0);
}

#[test]
fn included_files_share_globals_but_not_locals() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("defs.asm"), "val equ 7\nx@ equ 1\n").unwrap();
    fs::write(
        dir.path().join("main.asm"),
        "x@ equ 2\n include defs.asm\n fcb val,x@\n",
    )
    .unwrap();

    let mut asm = Asm::new(Input::new(Vec::new()));
    asm.set_format(OutputFormat::Raw);
    asm.input.open(&dir.path().join("main.asm"), Vec::new()).unwrap();
    assert_eq!(hdasm::run(&mut asm), Ok(()));
    assert_eq!(image(&asm), vec![7, 2]);
    assert_eq!(asm.input.discovered(), &[dir.path().join("defs.asm")]);

    // the line after the include carries on the including file's numbering
    let last = asm.lines.tail().unwrap();
    assert_eq!(asm.lines[last].lineno, 3);
    assert!(asm
        .syms
        .iter()
        .any(|sym| sym.name == "x@" && sym.scope != Scope::Local(0)));
}

#[test]
fn includebin_copies_bytes() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("blob.bin"), [1u8, 2, 3]).unwrap();
    fs::write(dir.path().join("main.asm"), " includebin blob.bin\n fcb 4\n").unwrap();

    let mut asm = Asm::new(Input::new(Vec::new()));
    asm.set_format(OutputFormat::Raw);
    asm.input.open(&dir.path().join("main.asm"), Vec::new()).unwrap();
    assert_eq!(hdasm::run(&mut asm), Ok(()));
    assert_eq!(image(&asm), vec![1, 2, 3, 4]);
}
