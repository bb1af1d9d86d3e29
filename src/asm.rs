use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde_derive::Deserialize;

use crate::error::AsmError;
use crate::expr::{Expr, Resolver, Special};
use crate::input::Input;
use crate::instab::{Insn, INSTAB};
use crate::line::{InsnSel, Line, LineId, Lines};
use crate::macros::{Macro, Struct};
use crate::pragma::Pragma;
use crate::symtab::{ContextId, Scope, SymFlags, SymbolTable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Target {
    #[serde(rename = "6809")]
    M6809,
    #[default]
    #[serde(rename = "6309")]
    H6309,
}

impl FromStr for Target {
    type Err = AsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6809" => Ok(Target::M6809),
            "6309" => Ok(Target::H6309),
            _ => Err(AsmError::Config(format!("Invalid target: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Decb,
    Raw,
    Obj,
    Os9,
}

impl FromStr for OutputFormat {
    type Err = AsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "decb" => Ok(OutputFormat::Decb),
            "raw" => Ok(OutputFormat::Raw),
            "obj" => Ok(OutputFormat::Obj),
            "os9" => Ok(OutputFormat::Os9),
            _ => Err(AsmError::Config(format!("Invalid output format: {s}"))),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Decb => "decb",
            OutputFormat::Raw => "raw",
            OutputFormat::Obj => "obj",
            OutputFormat::Os9 => "os9",
        };
        write!(f, "{name}")
    }
}

pub struct AsmFlags;

impl AsmFlags {
    /// Only scan for dependencies.
    pub const DEPEND: u8 = 1 << 0;
    /// While scanning, skip include files that cannot be found.
    pub const DEPENDNOERR: u8 = 1 << 1;
}

/// Evaluation view of the assembler state from one line's context.
pub struct Eval<'a> {
    lines: &'a Lines,
    syms: &'a SymbolTable,
    context: ContextId,
    undef_zero: bool,
}

impl Resolver for Eval<'_> {
    fn symbol(&self, name: &str) -> Option<Expr> {
        match self.syms.lookup(name, self.context) {
            Ok(sym) => Some(sym.value.clone()),
            Err(_) if self.undef_zero => Some(Expr::Int(0)),
            Err(_) => None,
        }
    }

    fn special(&self, kind: Special, line: LineId) -> Option<Expr> {
        let line = self.lines.get(line)?;
        match kind {
            Special::LineLength => line
                .len
                .and_then(|len| i32::try_from(len).ok())
                .map(Expr::Int),
            Special::LineAddress => Some(line.addr.clone()),
        }
    }
}

/// Everything one assembly run works on.
pub struct Asm {
    pub target: Target,
    pub format: OutputFormat,
    pub pragmas: Pragma,
    pub flags: u8,
    pub input: Input,
    pub lines: Lines,
    pub syms: SymbolTable,
    pub instab: &'static [Insn],
    pub passno: usize,
    pub error_count: usize,
    pub context: ContextId,
    next_context: ContextId,
    pub inmacro: bool,
    pub skipcond: bool,
    pub skipcount: usize,
    pub instruct: bool,
    pub endseen: bool,
    pub end_line: Option<LineId>,
    pub execaddr: Option<i32>,
    pub macros: Vec<Macro>,
    pub cur_macro: Option<Macro>,
    pub structs: Vec<Struct>,
    pub cur_struct: Option<Struct>,
}

impl Asm {
    pub fn new(input: Input) -> Self {
        Self {
            target: Target::default(),
            format: OutputFormat::default(),
            pragmas: Pragma::NONE,
            flags: 0,
            input,
            lines: Lines::new(),
            syms: SymbolTable::new(),
            instab: INSTAB,
            passno: 0,
            error_count: 0,
            context: 0,
            next_context: 1,
            inmacro: false,
            skipcond: false,
            skipcount: 0,
            instruct: false,
            endseen: false,
            end_line: None,
            execaddr: None,
            macros: Vec::new(),
            cur_macro: None,
            structs: Vec::new(),
            cur_struct: None,
        }
    }

    pub fn is_depend(&self) -> bool {
        (self.flags & AsmFlags::DEPEND) != 0
    }

    pub fn is_depend_noerr(&self) -> bool {
        self.is_depend() && (self.flags & AsmFlags::DEPENDNOERR) != 0
    }

    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
        if format == OutputFormat::Os9 {
            self.pragmas.insert(Pragma::DOLLARNOTLOCAL);
        }
    }

    /// Allocates a fresh local scope.
    pub fn new_context(&mut self) -> ContextId {
        let context = self.next_context;
        self.next_context += 1;
        context
    }

    pub fn register_error(&mut self, id: LineId, err: AsmError) {
        let line = &mut self.lines[id];
        tracing::trace!("{}:{}: {err}", line.spec, line.lineno);
        line.errors.push(err);
        self.error_count += 1;
    }

    /// Every registered error with the line it belongs to, in line order.
    pub fn errors(&self) -> impl Iterator<Item = (&Line, &AsmError)> {
        self.lines
            .iter()
            .flat_map(|(_, line)| line.errors.iter().map(move |err| (line, err)))
    }

    pub fn insn(&self, id: LineId) -> Option<&'static Insn> {
        let instab = self.instab;
        match self.lines[id].insn {
            InsnSel::Index(index) => instab.get(index),
            InsnSel::None | InsnSel::Pending => None,
        }
    }

    pub fn resolver(&self, id: LineId) -> Eval<'_> {
        Eval {
            lines: &self.lines,
            syms: &self.syms,
            context: self.lines[id].context,
            undef_zero: false,
        }
    }

    /// Like [`Asm::resolver`], but undefined symbols read as zero when the
    /// line asks for it. Used by conditionals.
    pub fn cond_resolver(&self, id: LineId) -> Eval<'_> {
        Eval {
            undef_zero: self.lines[id].pragmas.contains(Pragma::CONDUNDEFZERO),
            ..self.resolver(id)
        }
    }

    pub fn reduce(&self, id: LineId, expr: &Expr) -> Expr {
        expr.reduce(&self.resolver(id))
    }

    pub fn eval(&self, id: LineId, expr: &Expr) -> Result<i32, AsmError> {
        Ok(expr.evaluate(&self.resolver(id))?)
    }

    pub fn eval_slot(&self, id: LineId, slot: u8) -> Result<i32, AsmError> {
        let line = &self.lines[id];
        let expr = line
            .expr(slot)
            .ok_or_else(|| AsmError::BadOperand(line.text.clone()))?;
        self.eval(id, expr)
    }

    /// Reduces the address and operand expressions of a line in place.
    pub fn reduce_line(&mut self, id: LineId) {
        let (addr, exprs) = {
            let eval = self.resolver(id);
            let line = &self.lines[id];
            let addr = line.addr.reduce(&eval);
            let exprs: Vec<_> = line
                .exprs
                .iter()
                .map(|(slot, expr)| (*slot, expr.reduce(&eval)))
                .collect();
            (addr, exprs)
        };
        let line = &mut self.lines[id];
        line.addr = addr;
        line.exprs = exprs;
    }

    /// Names containing `@` or `?` are local to their context, and so are
    /// names containing `$` unless `dollarnotlocal` is on.
    pub fn is_local(name: &str, pragmas: Pragma) -> bool {
        name.contains(['@', '?'])
            || (!pragmas.contains(Pragma::DOLLARNOTLOCAL) && name.contains('$'))
    }

    /// Binds a symbol defined on line `id`, reporting a clash on that line.
    pub fn register_symbol(&mut self, id: LineId, name: &str, value: Expr, flags: u8) -> bool {
        let line = &self.lines[id];
        let scope = if Self::is_local(name, line.pragmas) {
            Scope::Local(line.context)
        } else {
            Scope::Global
        };
        let value = value.reduce(&self.resolver(id));
        match self.syms.register(name, scope, value, flags, Some(id)) {
            Ok(()) => true,
            Err(e) => {
                self.register_error(id, e.into());
                false
            }
        }
    }

    /// Predefines a global symbol that source code may override with `set`.
    pub fn define(&mut self, name: &str, value: i32) {
        // nocheck replaces any earlier definition, so this cannot fail
        let _ = self.syms.register(
            name,
            Scope::Global,
            Expr::Int(value),
            SymFlags::NOCHECK | SymFlags::SET,
            None,
        );
    }
}
