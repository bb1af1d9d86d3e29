//! Core of a multi-pass 6809/6309 cross-assembler.
//!
//! Source is parsed into a chain of [`line::Line`] records whose addresses
//! and operands are symbolic [`expr::Expr`] trees. Later passes in
//! [`passes::PASSES`] reduce those trees as lengths and symbols become
//! known, until every address is a number and bytes can be emitted.

use std::error::Error;

pub mod asm;
pub mod config;
pub mod error;
pub mod expr;
pub mod input;
pub mod insn;
pub mod instab;
pub mod line;
pub mod macros;
pub mod operand;
pub mod output;
pub mod pass1;
pub mod passes;
pub mod pragma;
pub mod pseudo;
pub mod symtab;

pub use asm::{Asm, AsmFlags, OutputFormat, Target};
pub use error::AsmError;
pub use expr::{Expr, ExprError, Resolver};
pub use input::Input;
pub use passes::{run, PipelineError};
pub use symtab::{SymFlags, SymbolError, SymbolTable};

/// Parses `$hex`, `0xhex`, `%binary`, `@octal` or decimal, with an
/// optional leading minus.
pub fn parse_number(s: &str) -> Option<i32> {
    let s = s.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = if let Some(hex) = s.strip_prefix('$').or_else(|| s.strip_prefix("0x")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = s.strip_prefix('%') {
        u32::from_str_radix(bin, 2).ok()?
    } else if let Some(oct) = s.strip_prefix('@') {
        u32::from_str_radix(oct, 8).ok()?
    } else {
        s.parse::<u32>().ok()?
    };
    let value = value as i32;
    Some(if neg { value.wrapping_neg() } else { value })
}

/// Parses a `SYMBOL[=value]` definition. A bare symbol is defined as 1.
pub fn parse_defines(s: &str) -> Result<(String, i32), Box<dyn Error + Send + Sync + 'static>> {
    let Some((name, value)) = s.split_once('=') else {
        return Ok((s.to_string(), 1));
    };
    if name.is_empty() {
        return Err(format!("invalid SYMBOL=value: no symbol in `{s}`").into());
    }
    let value = parse_number(value).ok_or_else(|| format!("invalid value in `{s}`"))?;
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("$ff"), Some(255));
        assert_eq!(parse_number("0x10"), Some(16));
        assert_eq!(parse_number("%11"), Some(3));
        assert_eq!(parse_number("@10"), Some(8));
        assert_eq!(parse_number("-5"), Some(-5));
        assert_eq!(parse_number("five"), None);
    }

    #[test]
    fn defines() {
        assert_eq!(parse_defines("DEBUG").unwrap(), ("DEBUG".to_string(), 1));
        assert_eq!(parse_defines("BASE=$e00").unwrap(), ("BASE".to_string(), 0xE00));
        assert!(parse_defines("=3").is_err());
        assert!(parse_defines("X=oops").is_err());
    }
}
