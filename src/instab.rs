//! The opcode table: directives, 6809 instructions and the 6309 extras.

use crate::asm::Asm;
use crate::insn;
use crate::line::LineId;
use crate::macros;
use crate::pseudo;

/// Parses the operand at `p`, advancing it past what was consumed.
pub type ParseFn = fn(&mut Asm, LineId, &mut &str);
/// Tries to fix the line's length. With `force`, picks the longest
/// encoding when the operand is still unknown.
pub type ResolveFn = fn(&mut Asm, LineId, bool);
pub type EmitFn = fn(&mut Asm, LineId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Terminates a macro definition.
    EndMacro,
    /// Processed even while a false conditional is skipping lines.
    Conditional,
    StructAllowed,
    StructOnly,
    /// Meaningless in a dependency scan.
    FullAssembly,
    Is6309,
}

/// Marks an addressing mode an instruction does not have.
pub const ____: u16 = 0xFFFF;

pub struct Insn {
    pub name: &'static str,
    pub caps: &'static [Capability],
    pub parse: Option<ParseFn>,
    pub resolve: Option<ResolveFn>,
    pub emit: Option<EmitFn>,
    /// Immediate, direct and extended opcodes. Inherent and relative
    /// instructions use only the first.
    pub ops: [u16; 3],
    /// Operand width in bytes.
    pub width: u8,
}

impl Insn {
    pub fn has(&self, cap: Capability) -> bool {
        self.caps.contains(&cap)
    }

    pub fn ends_macro(&self) -> bool {
        self.has(Capability::EndMacro)
    }

    pub fn is_conditional(&self) -> bool {
        self.has(Capability::Conditional)
    }

    pub fn struct_only(&self) -> bool {
        self.has(Capability::StructOnly)
    }

    pub fn allowed_in_struct(&self) -> bool {
        self.has(Capability::StructAllowed) || self.struct_only()
    }

    pub fn full_assembly_only(&self) -> bool {
        self.has(Capability::FullAssembly)
    }

    pub fn is_6309(&self) -> bool {
        self.has(Capability::Is6309)
    }
}

/// Finds an opcode, ignoring case.
pub fn lookup(table: &[Insn], name: &str) -> Option<usize> {
    table
        .iter()
        .position(|insn| insn.name.eq_ignore_ascii_case(name))
}

const NONE: &[Capability] = &[];
const COND: &[Capability] = &[Capability::Conditional, Capability::StructAllowed];
const STRUCT: &[Capability] = &[Capability::StructAllowed];
const H6309: &[Capability] = &[Capability::Is6309];

const fn directive(
    name: &'static str,
    caps: &'static [Capability],
    parse: Option<ParseFn>,
    resolve: Option<ResolveFn>,
    emit: Option<EmitFn>,
    width: u8,
) -> Insn {
    Insn {
        name,
        caps,
        parse,
        resolve,
        emit,
        ops: [____; 3],
        width,
    }
}

const fn inh(name: &'static str, caps: &'static [Capability], op: u16) -> Insn {
    Insn {
        name,
        caps,
        parse: Some(insn::parse_inherent),
        resolve: None,
        emit: Some(insn::emit_inherent),
        ops: [op, ____, ____],
        width: 0,
    }
}

const fn general(name: &'static str, caps: &'static [Capability], ops: [u16; 3], width: u8) -> Insn {
    Insn {
        name,
        caps,
        parse: Some(insn::parse_general),
        resolve: Some(insn::resolve_general),
        emit: Some(insn::emit_general),
        ops,
        width,
    }
}

const fn rel(name: &'static str, op: u16, width: u8) -> Insn {
    Insn {
        name,
        caps: NONE,
        parse: Some(insn::parse_relative),
        resolve: None,
        emit: Some(insn::emit_relative),
        ops: [op, ____, ____],
        width,
    }
}

#[rustfmt::skip]
pub static INSTAB: &[Insn] = &[
    directive("equ",        NONE,   Some(pseudo::parse_equ),        None,                       None,                           0),
    directive("=",          NONE,   Some(pseudo::parse_equ),        None,                       None,                           0),
    directive("set",        NONE,   Some(pseudo::parse_set),        None,                       None,                           0),
    directive("org",        NONE,   Some(pseudo::parse_org),        None,                       None,                           0),
    directive("setdp",      NONE,   Some(pseudo::parse_setdp),      None,                       None,                           0),
    directive("fcb",        NONE,   Some(pseudo::parse_data),       None,                       Some(pseudo::emit_data),        1),
    directive("fdb",        NONE,   Some(pseudo::parse_data),       None,                       Some(pseudo::emit_data),        2),
    directive("fcc",        NONE,   Some(pseudo::parse_fcc),        None,                       Some(pseudo::emit_bytes),       0),
    directive("rmb",        STRUCT, Some(pseudo::parse_reserve),    Some(pseudo::resolve_reserve), None,                        1),
    directive("rmd",        STRUCT, Some(pseudo::parse_reserve),    Some(pseudo::resolve_reserve), None,                        2),
    directive("zmb",        NONE,   Some(pseudo::parse_reserve),    Some(pseudo::resolve_reserve), Some(pseudo::emit_zeros),    1),
    directive("end",        NONE,   Some(pseudo::parse_end),        None,                       None,                           0),
    directive("pragma",     NONE,   Some(pseudo::parse_pragma),     None,                       None,                           0),
    directive("include",    NONE,   Some(pseudo::parse_include),    None,                       None,                           0),
    directive("use",        NONE,   Some(pseudo::parse_include),    None,                       None,                           0),
    directive("includebin", NONE,   Some(pseudo::parse_includebin), None,                       Some(pseudo::emit_bytes),       0),
    directive("macro",      NONE,   Some(macros::parse_macro),      None,                       None,                           0),
    directive("endm",       &[Capability::EndMacro], Some(macros::parse_endm), None,            None,                           0),
    directive("struct",     STRUCT, Some(macros::parse_struct),     None,                       None,                           0),
    directive("endstruct",  &[Capability::StructOnly], Some(macros::parse_endstruct), None,     None,                           0),
    directive("ends",       &[Capability::StructOnly], Some(macros::parse_endstruct), None,     None,                           0),
    directive("if",         COND,   Some(pseudo::parse_ifne),       None,                       None,                           0),
    directive("ifne",       COND,   Some(pseudo::parse_ifne),       None,                       None,                           0),
    directive("ifeq",       COND,   Some(pseudo::parse_ifeq),       None,                       None,                           0),
    directive("iflt",       COND,   Some(pseudo::parse_iflt),       None,                       None,                           0),
    directive("ifle",       COND,   Some(pseudo::parse_ifle),       None,                       None,                           0),
    directive("ifgt",       COND,   Some(pseudo::parse_ifgt),       None,                       None,                           0),
    directive("ifge",       COND,   Some(pseudo::parse_ifge),       None,                       None,                           0),
    directive("ifdef",      COND,   Some(pseudo::parse_ifdef),      None,                       None,                           0),
    directive("ifndef",     COND,   Some(pseudo::parse_ifndef),     None,                       None,                           0),
    directive("else",       COND,   Some(pseudo::parse_else),       None,                       None,                           0),
    directive("endc",       COND,   Some(pseudo::parse_endc),       None,                       None,                           0),
    directive("endif",      COND,   Some(pseudo::parse_endc),       None,                       None,                           0),
    directive("error",      &[Capability::FullAssembly], Some(pseudo::parse_error), None,      None,                           0),

    general("adda", NONE,  [0x008B, 0x009B, 0x00BB], 1),
    general("addb", NONE,  [0x00CB, 0x00DB, 0x00FB], 1),
    general("addd", NONE,  [0x00C3, 0x00D3, 0x00F3], 2),
    general("anda", NONE,  [0x0084, 0x0094, 0x00B4], 1),
    general("andb", NONE,  [0x00C4, 0x00D4, 0x00F4], 1),
    general("bita", NONE,  [0x0085, 0x0095, 0x00B5], 1),
    general("bitb", NONE,  [0x00C5, 0x00D5, 0x00F5], 1),
    general("cmpa", NONE,  [0x0081, 0x0091, 0x00B1], 1),
    general("cmpb", NONE,  [0x00C1, 0x00D1, 0x00F1], 1),
    general("cmpd", NONE,  [0x1083, 0x1093, 0x10B3], 2),
    general("cmpx", NONE,  [0x008C, 0x009C, 0x00BC], 2),
    general("cmpy", NONE,  [0x108C, 0x109C, 0x10BC], 2),
    general("eora", NONE,  [0x0088, 0x0098, 0x00B8], 1),
    general("eorb", NONE,  [0x00C8, 0x00D8, 0x00F8], 1),
    general("lda",  NONE,  [0x0086, 0x0096, 0x00B6], 1),
    general("ldb",  NONE,  [0x00C6, 0x00D6, 0x00F6], 1),
    general("ldd",  NONE,  [0x00CC, 0x00DC, 0x00FC], 2),
    general("lds",  NONE,  [0x10CE, 0x10DE, 0x10FE], 2),
    general("ldu",  NONE,  [0x00CE, 0x00DE, 0x00FE], 2),
    general("ldx",  NONE,  [0x008E, 0x009E, 0x00BE], 2),
    general("ldy",  NONE,  [0x108E, 0x109E, 0x10BE], 2),
    general("ora",  NONE,  [0x008A, 0x009A, 0x00BA], 1),
    general("orb",  NONE,  [0x00CA, 0x00DA, 0x00FA], 1),
    general("suba", NONE,  [0x0080, 0x0090, 0x00B0], 1),
    general("subb", NONE,  [0x00C0, 0x00D0, 0x00F0], 1),
    general("subd", NONE,  [0x0083, 0x0093, 0x00B3], 2),
    general("sta",  NONE,  [____,   0x0097, 0x00B7], 1),
    general("stb",  NONE,  [____,   0x00D7, 0x00F7], 1),
    general("std",  NONE,  [____,   0x00DD, 0x00FD], 2),
    general("sts",  NONE,  [____,   0x10DF, 0x10FF], 2),
    general("stu",  NONE,  [____,   0x00DF, 0x00FF], 2),
    general("stx",  NONE,  [____,   0x009F, 0x00BF], 2),
    general("sty",  NONE,  [____,   0x109F, 0x10BF], 2),
    general("jmp",  NONE,  [____,   0x000E, 0x007E], 0),
    general("jsr",  NONE,  [____,   0x009D, 0x00BD], 0),
    general("clr",  NONE,  [____,   0x000F, 0x007F], 0),
    general("com",  NONE,  [____,   0x0003, 0x0073], 0),
    general("dec",  NONE,  [____,   0x000A, 0x007A], 0),
    general("inc",  NONE,  [____,   0x000C, 0x007C], 0),
    general("neg",  NONE,  [____,   0x0000, 0x0070], 0),
    general("tst",  NONE,  [____,   0x000D, 0x007D], 0),
    general("ldq",  H6309, [0x00CD, 0x10DC, 0x10FC], 4),
    general("stq",  H6309, [____,   0x10DD, 0x10FD], 4),

    inh("abx",  NONE,  0x003A),
    inh("asla", NONE,  0x0048),
    inh("aslb", NONE,  0x0058),
    inh("asra", NONE,  0x0047),
    inh("asrb", NONE,  0x0057),
    inh("clra", NONE,  0x004F),
    inh("clrb", NONE,  0x005F),
    inh("coma", NONE,  0x0043),
    inh("comb", NONE,  0x0053),
    inh("daa",  NONE,  0x0019),
    inh("deca", NONE,  0x004A),
    inh("decb", NONE,  0x005A),
    inh("inca", NONE,  0x004C),
    inh("incb", NONE,  0x005C),
    inh("lsla", NONE,  0x0048),
    inh("lslb", NONE,  0x0058),
    inh("lsra", NONE,  0x0044),
    inh("lsrb", NONE,  0x0054),
    inh("mul",  NONE,  0x003D),
    inh("nega", NONE,  0x0040),
    inh("negb", NONE,  0x0050),
    inh("nop",  NONE,  0x0012),
    inh("rola", NONE,  0x0049),
    inh("rolb", NONE,  0x0059),
    inh("rora", NONE,  0x0046),
    inh("rorb", NONE,  0x0056),
    inh("rti",  NONE,  0x003B),
    inh("rts",  NONE,  0x0039),
    inh("sex",  NONE,  0x001D),
    inh("swi",  NONE,  0x003F),
    inh("swi2", NONE,  0x103F),
    inh("swi3", NONE,  0x113F),
    inh("sync", NONE,  0x0013),
    inh("tsta", NONE,  0x004D),
    inh("tstb", NONE,  0x005D),
    inh("clrd", H6309, 0x104F),
    inh("comd", H6309, 0x1043),
    inh("decd", H6309, 0x104A),
    inh("incd", H6309, 0x104C),
    inh("negd", H6309, 0x1040),
    inh("tstd", H6309, 0x104D),

    rel("bcc",  0x0024, 1),
    rel("bcs",  0x0025, 1),
    rel("beq",  0x0027, 1),
    rel("bge",  0x002C, 1),
    rel("bgt",  0x002E, 1),
    rel("bhi",  0x0022, 1),
    rel("bhs",  0x0024, 1),
    rel("ble",  0x002F, 1),
    rel("blo",  0x0025, 1),
    rel("bls",  0x0023, 1),
    rel("blt",  0x002D, 1),
    rel("bmi",  0x002B, 1),
    rel("bne",  0x0026, 1),
    rel("bpl",  0x002A, 1),
    rel("bra",  0x0020, 1),
    rel("brn",  0x0021, 1),
    rel("bsr",  0x008D, 1),
    rel("bvc",  0x0028, 1),
    rel("bvs",  0x0029, 1),
    rel("lbcc", 0x1024, 2),
    rel("lbcs", 0x1025, 2),
    rel("lbeq", 0x1027, 2),
    rel("lbge", 0x102C, 2),
    rel("lbgt", 0x102E, 2),
    rel("lbhi", 0x1022, 2),
    rel("lbhs", 0x1024, 2),
    rel("lble", 0x102F, 2),
    rel("lblo", 0x1025, 2),
    rel("lbls", 0x1023, 2),
    rel("lblt", 0x102D, 2),
    rel("lbmi", 0x102B, 2),
    rel("lbne", 0x1026, 2),
    rel("lbpl", 0x102A, 2),
    rel("lbra", 0x0016, 2),
    rel("lbrn", 0x1021, 2),
    rel("lbsr", 0x0017, 2),
    rel("lbvc", 0x1028, 2),
    rel("lbvs", 0x1029, 2),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let lda = lookup(INSTAB, "LDA").unwrap();
        assert_eq!(INSTAB[lda].name, "lda");
        assert_eq!(lookup(INSTAB, "Lda"), Some(lda));
        assert_eq!(lookup(INSTAB, "fnord"), None);
    }

    #[test]
    fn capabilities() {
        let get = |name| &INSTAB[lookup(INSTAB, name).unwrap()];
        assert!(get("endm").ends_macro());
        assert!(get("else").is_conditional());
        assert!(get("rmb").allowed_in_struct());
        // so a nested definition reaches the structure check
        assert!(get("struct").allowed_in_struct());
        assert!(get("endstruct").allowed_in_struct());
        assert!(get("endstruct").struct_only());
        assert!(!get("fcb").allowed_in_struct());
        assert!(get("error").full_assembly_only());
        assert!(get("clrd").is_6309());
        assert!(!get("clra").is_6309());
    }

    #[test]
    fn names_are_unique() {
        for (index, insn) in INSTAB.iter().enumerate() {
            assert_eq!(lookup(INSTAB, insn.name), Some(index), "{}", insn.name);
        }
    }
}
