use thiserror::Error;

use crate::expr::ExprError;
use crate::symtab::SymbolError;

/// Problems attached to individual lines. Registering one never stops the
/// current pass; the driver stops between passes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("Bad opcode ({0})")]
    BadOpcode(String),

    #[error("Bad operand ({0})")]
    BadOperand(String),

    #[error("Multiply defined symbol ({0})")]
    DuplicateSymbol(String),

    #[error("Undefined symbol ({0})")]
    UnresolvedReference(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unrecognized pragma ({0})")]
    InvalidPragma(String),

    #[error("Structure error ({0})")]
    StructureMismatch(String),

    #[error("Illegal use of 6309 instruction in 6809 mode")]
    IllegalInstruction,

    #[error("Byte overflow ({0})")]
    ByteOverflow(i32),

    #[error("Cannot open file ({0})")]
    Include(String),

    #[error("User error ({0})")]
    UserError(String),

    #[error("{0}")]
    Config(String),
}

impl From<ExprError> for AsmError {
    fn from(err: ExprError) -> Self {
        match err {
            ExprError::UnresolvedReference(name) => AsmError::UnresolvedReference(name),
            ExprError::DivisionByZero => AsmError::DivisionByZero,
        }
    }
}

impl From<SymbolError> for AsmError {
    fn from(err: SymbolError) -> Self {
        match err {
            SymbolError::DuplicateSymbol(name) => AsmError::DuplicateSymbol(name),
            SymbolError::NotFound(name) => AsmError::UnresolvedReference(name),
        }
    }
}
