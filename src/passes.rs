//! The pass list and the passes after parsing.

use thiserror::Error;

use crate::asm::Asm;
use crate::error::AsmError;
use crate::expr::Expr;
use crate::pass1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("assembly stopped after pass {pass} with {errors} error(s)")]
    Aborted { pass: &'static str, errors: usize },
}

pub struct Pass {
    pub name: &'static str,
    pub run: fn(&mut Asm),
    /// Also runs in a dependency scan.
    pub for_depend: bool,
}

pub const PASSES: &[Pass] = &[
    Pass {
        name: "parse",
        run: pass1::parse,
        for_depend: true,
    },
    Pass {
        name: "symcheck",
        run: symcheck,
        for_depend: false,
    },
    Pass {
        name: "resolve1",
        run: resolve1,
        for_depend: false,
    },
    Pass {
        name: "resolve2",
        run: resolve2,
        for_depend: false,
    },
    Pass {
        name: "addressresolve",
        run: address_resolve,
        for_depend: false,
    },
    Pass {
        name: "finalize",
        run: finalize,
        for_depend: false,
    },
    Pass {
        name: "emit",
        run: emit,
        for_depend: false,
    },
];

/// Runs the passes in order, stopping after the first one that leaves
/// errors behind.
pub fn run(asm: &mut Asm) -> Result<(), PipelineError> {
    for (passno, pass) in PASSES.iter().enumerate() {
        if asm.is_depend() && !pass.for_depend {
            continue;
        }
        asm.passno = passno;
        tracing::debug!("doing pass {passno} ({})", pass.name);
        (pass.run)(asm);
        tracing::debug!(
            "pass {} done: {} lines, {} symbols, {} errors",
            pass.name,
            asm.lines.len(),
            asm.syms.len(),
            asm.error_count
        );
        if asm.error_count > 0 {
            return Err(PipelineError::Aborted {
                pass: pass.name,
                errors: asm.error_count,
            });
        }
    }
    Ok(())
}

/// Every symbol still named after reduction is one nobody defined.
fn symcheck(asm: &mut Asm) {
    for id in asm.lines.ids() {
        asm.reduce_line(id);
        let mut missing: Vec<String> = Vec::new();
        {
            let line = &asm.lines[id];
            let mut note = |name: &str| {
                if !missing.iter().any(|known| known == name) {
                    missing.push(name.to_string());
                }
            };
            line.addr.for_each_symbol(&mut note);
            for (_, expr) in &line.exprs {
                expr.for_each_symbol(&mut note);
            }
        }
        for name in missing {
            asm.register_error(id, AsmError::UnresolvedReference(name));
        }
    }
}

/// Repeats speculative length resolution until nothing changes.
fn resolve_until_stable(asm: &mut Asm) {
    loop {
        let mut changed = false;
        for id in asm.lines.ids() {
            asm.reduce_line(id);
            if asm.lines[id].len.is_some() {
                continue;
            }
            if let Some(resolve) = asm.insn(id).and_then(|insn| insn.resolve) {
                resolve(asm, id, false);
                changed |= asm.lines[id].len.is_some();
            }
        }
        if !changed {
            break;
        }
    }
}

fn resolve1(asm: &mut Asm) {
    resolve_until_stable(asm);
}

/// Forces the first undecided line to its longest form, then lets the
/// rest settle again, until every length is known.
fn resolve2(asm: &mut Asm) {
    loop {
        let Some(id) = asm.lines.ids().into_iter().find(|id| asm.lines[*id].len.is_none()) else {
            break;
        };
        if let Some(resolve) = asm.insn(id).and_then(|insn| insn.resolve) {
            resolve(asm, id, true);
        }
        if asm.lines[id].len.is_none() {
            asm.register_error(id, AsmError::UnresolvedReference("instruction size".into()));
            asm.lines[id].len = Some(0);
        }
        resolve_until_stable(asm);
    }
}

fn address_resolve(asm: &mut Asm) {
    for id in asm.lines.ids() {
        asm.reduce_line(id);
        let addr = &asm.lines[id].addr;
        if !addr.is_constant() {
            let msg = format!("address {addr}");
            asm.register_error(id, AsmError::UnresolvedReference(msg));
        }
    }
}

/// Pins every expression and symbol to a number.
fn finalize(asm: &mut Asm) {
    for id in asm.lines.ids() {
        asm.reduce_line(id);
        let results: Vec<_> = asm.lines[id]
            .exprs
            .iter()
            .map(|(slot, expr)| (*slot, expr.clone(), asm.eval(id, expr)))
            .collect();
        let mut exprs = Vec::with_capacity(results.len());
        for (slot, expr, result) in results {
            match result {
                Ok(value) => exprs.push((slot, Expr::Int(value))),
                Err(e) => {
                    exprs.push((slot, expr));
                    asm.register_error(id, e);
                }
            }
        }
        asm.lines[id].exprs = exprs;
    }

    // symbols are reduced as seen from the line that defined them
    let values: Vec<Expr> = asm
        .syms
        .iter()
        .map(|sym| match sym.line {
            Some(id) => asm.reduce(id, &sym.value),
            None => sym.value.clone(),
        })
        .collect();
    for (sym, value) in asm.syms.iter_mut().zip(values) {
        sym.value = value;
    }

    if let Some(id) = asm.end_line {
        match asm.eval_slot(id, 0) {
            Ok(addr) => asm.execaddr = Some(addr),
            Err(e) => asm.register_error(id, e),
        }
    }
}

fn emit(asm: &mut Asm) {
    for id in asm.lines.ids() {
        if let Some(emit) = asm.insn(id).and_then(|insn| insn.emit) {
            emit(asm, id);
        }
    }
}
