use std::fmt::{self, Display, Formatter};
use std::ops::{Index, IndexMut};

use crate::error::AsmError;
use crate::expr::Expr;
use crate::pragma::Pragma;
use crate::symtab::ContextId;

/// Position of a line in the chain. Lines are never removed, so an id
/// stays valid for the whole assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(pub usize);

impl Display for LineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which instruction handles a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnSel {
    /// Blank, comment, label-only or expansion lines.
    None,
    /// Not tokenized yet.
    Pending,
    Index(usize),
}

/// Addressing mode picked for an instruction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Inherent,
    Immediate,
    Direct,
    Extended,
    /// Direct or extended, decided once the operand is known.
    Auto,
    Relative,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub lineno: usize,
    pub text: String,
    /// Name of the file or macro the line came from.
    pub spec: String,
    pub label: Option<String>,
    /// The instruction bound the label itself, so it is not an address.
    pub symset: bool,
    pub insn: InsnSel,
    pub addr: Expr,
    /// Operand expressions, keyed by slot.
    pub exprs: Vec<(u8, Expr)>,
    pub pragmas: Pragma,
    pub context: ContextId,
    pub dpval: i32,
    /// Encoded length. `None` until it can be determined.
    pub len: Option<usize>,
    pub mode: Option<Mode>,
    pub opcode: u16,
    /// Bytes captured while parsing (string constants, binary includes).
    pub data: Vec<u8>,
    pub output: Vec<u8>,
    pub errors: Vec<AsmError>,
    pub breakpoint: bool,
    pub noexpand_start: bool,
    pub noexpand_end: bool,
}

impl Line {
    pub fn new(text: &str, spec: &str, context: ContextId, pragmas: Pragma) -> Self {
        Self {
            lineno: 1,
            text: text.to_string(),
            spec: spec.to_string(),
            label: None,
            symset: false,
            insn: InsnSel::Pending,
            addr: Expr::Int(0),
            exprs: Vec::new(),
            pragmas,
            context,
            dpval: 0,
            len: Some(0),
            mode: None,
            opcode: 0,
            data: Vec::new(),
            output: Vec::new(),
            errors: Vec::new(),
            breakpoint: false,
            noexpand_start: false,
            noexpand_end: false,
        }
    }

    pub fn expr(&self, slot: u8) -> Option<&Expr> {
        self.exprs
            .iter()
            .find(|(id, _)| *id == slot)
            .map(|(_, expr)| expr)
    }

    pub fn save_expr(&mut self, slot: u8, expr: Expr) {
        if let Some(entry) = self.exprs.iter_mut().find(|(id, _)| *id == slot) {
            entry.1 = expr;
        } else {
            self.exprs.push((slot, expr));
        }
    }
}

/// The ordered chain of line records.
#[derive(Debug, Default)]
pub struct Lines {
    lines: Vec<Line>,
}

impl Lines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push(&mut self, line: Line) -> LineId {
        self.lines.push(line);
        LineId(self.lines.len() - 1)
    }

    pub fn get(&self, id: LineId) -> Option<&Line> {
        self.lines.get(id.0)
    }

    pub fn tail(&self) -> Option<LineId> {
        self.lines.len().checked_sub(1).map(LineId)
    }

    pub fn prev(&self, id: LineId) -> Option<LineId> {
        id.0.checked_sub(1).map(LineId)
    }

    pub fn next(&self, id: LineId) -> Option<LineId> {
        let next = id.0 + 1;
        (next < self.lines.len()).then_some(LineId(next))
    }

    /// Ids in chain order. Collected so the chain can be mutated while
    /// walking it.
    pub fn ids(&self) -> Vec<LineId> {
        (0..self.lines.len()).map(LineId).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LineId, &Line)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(index, line)| (LineId(index), line))
    }
}

impl Index<LineId> for Lines {
    type Output = Line;

    fn index(&self, id: LineId) -> &Line {
        &self.lines[id.0]
    }
}

impl IndexMut<LineId> for Lines {
    fn index_mut(&mut self, id: LineId) -> &mut Line {
        &mut self.lines[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_navigation() {
        let mut lines = Lines::new();
        assert_eq!(lines.tail(), None);
        let a = lines.push(Line::new("a", "t.asm", 0, Pragma::NONE));
        let b = lines.push(Line::new("b", "t.asm", 0, Pragma::NONE));
        assert_eq!(lines.tail(), Some(b));
        assert_eq!(lines.prev(b), Some(a));
        assert_eq!(lines.prev(a), None);
        assert_eq!(lines.next(a), Some(b));
        assert_eq!(lines.next(b), None);
        assert_eq!(lines[b].text, "b");
    }

    #[test]
    fn expression_slots() {
        let mut line = Line::new("", "", 0, Pragma::NONE);
        line.save_expr(0, Expr::int(1));
        line.save_expr(3, Expr::int(2));
        line.save_expr(0, Expr::int(5));
        assert_eq!(line.expr(0), Some(&Expr::int(5)));
        assert_eq!(line.expr(3), Some(&Expr::int(2)));
        assert_eq!(line.expr(1), None);
    }
}
