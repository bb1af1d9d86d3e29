use indexmap::IndexMap;
use thiserror::Error;

use crate::expr::Expr;
use crate::line::LineId;

/// Identifies a local symbol scope. A fresh one starts at every blank
/// line, include file and macro expansion.
pub type ContextId = usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("multiply defined symbol {0}")]
    DuplicateSymbol(String),

    #[error("undefined symbol {0}")]
    NotFound(String),
}

pub struct SymFlags;

impl SymFlags {
    pub const NONE: u8 = 0;
    /// Replace any existing binding without complaint.
    pub const NOCHECK: u8 = 1 << 0;
    /// Binding may be redefined by another `SET` binding.
    pub const SET: u8 = 1 << 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Local(ContextId),
}

#[derive(Debug, Clone)]
pub struct Sym {
    pub name: String,
    pub scope: Scope,
    pub value: Expr,
    pub flags: u8,
    pub line: Option<LineId>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    syms: IndexMap<(Scope, String), Sym>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    pub fn register(
        &mut self,
        name: &str,
        scope: Scope,
        value: Expr,
        flags: u8,
        line: Option<LineId>,
    ) -> Result<(), SymbolError> {
        let key = (scope, name.to_string());
        if let Some(existing) = self.syms.get_mut(&key) {
            let replace = (flags & SymFlags::NOCHECK) != 0
                || ((flags & SymFlags::SET) != 0 && (existing.flags & SymFlags::SET) != 0);
            if !replace {
                return Err(SymbolError::DuplicateSymbol(name.to_string()));
            }
            tracing::trace!("redefining symbol {name}: {value}");
            existing.value = value;
            existing.flags = flags;
            existing.line = line;
            return Ok(());
        }
        tracing::trace!("defining symbol {name}: {value}");
        self.syms.insert(
            key,
            Sym {
                name: name.to_string(),
                scope,
                value,
                flags,
                line,
            },
        );
        Ok(())
    }

    /// Finds `name` as seen from `context`: the local binding wins over a
    /// global one of the same name.
    pub fn lookup(&self, name: &str, context: ContextId) -> Result<&Sym, SymbolError> {
        self.get(name, Scope::Local(context))
            .or_else(|| self.get(name, Scope::Global))
            .ok_or_else(|| SymbolError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str, scope: Scope) -> Option<&Sym> {
        self.syms.get(&(scope, name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sym> {
        self.syms.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sym> {
        self.syms.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_is_rejected() {
        let mut syms = SymbolTable::new();
        syms.register("start", Scope::Global, Expr::int(1), SymFlags::NONE, None)
            .unwrap();
        assert_eq!(
            syms.register("start", Scope::Global, Expr::int(2), SymFlags::NONE, None),
            Err(SymbolError::DuplicateSymbol("start".into()))
        );
        assert_eq!(syms.lookup("start", 0).unwrap().value, Expr::int(1));
    }

    #[test]
    fn nocheck_replaces() {
        let mut syms = SymbolTable::new();
        syms.register("x", Scope::Global, Expr::int(1), SymFlags::NONE, None)
            .unwrap();
        syms.register("x", Scope::Global, Expr::int(9), SymFlags::NOCHECK, None)
            .unwrap();
        assert_eq!(syms.lookup("x", 0).unwrap().value, Expr::int(9));
        assert_eq!(syms.len(), 1);
    }

    #[test]
    fn set_symbols_can_be_redefined_by_set() {
        let mut syms = SymbolTable::new();
        syms.register("n", Scope::Global, Expr::int(1), SymFlags::SET, None)
            .unwrap();
        syms.register("n", Scope::Global, Expr::int(2), SymFlags::SET, None)
            .unwrap();
        assert_eq!(syms.lookup("n", 3).unwrap().value, Expr::int(2));
        assert!(syms
            .register("n", Scope::Global, Expr::int(3), SymFlags::NONE, None)
            .is_err());
    }

    #[test]
    fn local_shadows_global_only_in_its_context() {
        let mut syms = SymbolTable::new();
        syms.register("loop@", Scope::Global, Expr::int(1), SymFlags::NONE, None)
            .unwrap();
        syms.register("loop@", Scope::Local(4), Expr::int(2), SymFlags::NONE, None)
            .unwrap();
        assert_eq!(syms.lookup("loop@", 4).unwrap().value, Expr::int(2));
        assert_eq!(syms.lookup("loop@", 5).unwrap().value, Expr::int(1));
    }

    #[test]
    fn local_is_invisible_elsewhere() {
        let mut syms = SymbolTable::new();
        syms.register("a?", Scope::Local(1), Expr::int(5), SymFlags::NONE, None)
            .unwrap();
        assert!(syms.lookup("a?", 1).is_ok());
        assert_eq!(
            syms.lookup("a?", 2).unwrap_err(),
            SymbolError::NotFound("a?".into())
        );
        // same name in another context is a different symbol
        syms.register("a?", Scope::Local(2), Expr::int(6), SymFlags::NONE, None)
            .unwrap();
        assert_eq!(syms.lookup("a?", 2).unwrap().value, Expr::int(6));
    }
}
