use crate::error::AsmError;

/// Set of assembler behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pragma(pub u32);

impl Pragma {
    pub const NONE: Self = Self(0);
    pub const INDEX0TONONE: Self = Self(1 << 0);
    pub const UNDEFEXTERN: Self = Self(1 << 1);
    pub const CESCAPES: Self = Self(1 << 2);
    pub const IMPORTUNDEFEXPORT: Self = Self(1 << 3);
    pub const PCASPCR: Self = Self(1 << 4);
    pub const SHADOW: Self = Self(1 << 5);
    pub const NOLIST: Self = Self(1 << 6);
    pub const AUTOBRANCHLENGTH: Self = Self(1 << 7);
    pub const EXPORT: Self = Self(1 << 8);
    pub const SYMBOLNOCASE: Self = Self(1 << 9);
    pub const CONDUNDEFZERO: Self = Self(1 << 10);
    pub const DOLLARNOTLOCAL: Self = Self(1 << 11);

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Applies a comma separated list such as `cescapes,nodollarlocal`.
    /// A `no` prefix clears the named switch.
    pub fn apply(&mut self, list: &str) -> Result<(), AsmError> {
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            self.apply_one(item)?;
        }
        Ok(())
    }

    fn apply_one(&mut self, item: &str) -> Result<(), AsmError> {
        let lower = item.to_ascii_lowercase();
        if let Some((flag, invert)) = lookup(&lower) {
            self.set(flag, !invert);
            return Ok(());
        }
        if let Some(rest) = lower.strip_prefix("no") {
            if let Some((flag, invert)) = lookup(rest) {
                self.set(flag, invert);
                return Ok(());
            }
        }
        Err(AsmError::InvalidPragma(item.to_string()))
    }

    fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }
}

/// Name, flag, and whether naming it clears the flag.
const NAMES: &[(&str, Pragma, bool)] = &[
    ("index0tonone", Pragma::INDEX0TONONE, false),
    ("undefextern", Pragma::UNDEFEXTERN, false),
    ("cescapes", Pragma::CESCAPES, false),
    ("importundefexport", Pragma::IMPORTUNDEFEXPORT, false),
    ("pcaspcr", Pragma::PCASPCR, false),
    ("shadow", Pragma::SHADOW, false),
    ("nolist", Pragma::NOLIST, false),
    ("autobranchlength", Pragma::AUTOBRANCHLENGTH, false),
    ("export", Pragma::EXPORT, false),
    ("symbolnocase", Pragma::SYMBOLNOCASE, false),
    ("condundefzero", Pragma::CONDUNDEFZERO, false),
    ("dollarnotlocal", Pragma::DOLLARNOTLOCAL, false),
    ("dollarlocal", Pragma::DOLLARNOTLOCAL, true),
];

fn lookup(name: &str) -> Option<(Pragma, bool)> {
    NAMES
        .iter()
        .find(|(n, ..)| *n == name)
        .map(|(_, flag, invert)| (*flag, *invert))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_and_clears() {
        let mut pragmas = Pragma::NONE;
        pragmas.apply("cescapes, Export").unwrap();
        assert!(pragmas.contains(Pragma::CESCAPES));
        assert!(pragmas.contains(Pragma::EXPORT));
        pragmas.apply("nocescapes").unwrap();
        assert!(!pragmas.contains(Pragma::CESCAPES));
        assert!(pragmas.contains(Pragma::EXPORT));
    }

    #[test]
    fn dollarlocal_is_the_inverse() {
        let mut pragmas = Pragma::NONE;
        pragmas.apply("dollarnotlocal").unwrap();
        assert!(pragmas.contains(Pragma::DOLLARNOTLOCAL));
        pragmas.apply("dollarlocal").unwrap();
        assert!(!pragmas.contains(Pragma::DOLLARNOTLOCAL));
        pragmas.apply("nodollarlocal").unwrap();
        assert!(pragmas.contains(Pragma::DOLLARNOTLOCAL));
    }

    #[test]
    fn unknown_name_is_rejected() {
        let mut pragmas = Pragma::NONE;
        assert_eq!(
            pragmas.apply("shadow,bogus"),
            Err(AsmError::InvalidPragma("bogus".into()))
        );
    }
}
