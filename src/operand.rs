//! Operand text scanning: expressions, filenames and string constants.

use crate::error::AsmError;
use crate::expr::{Expr, Op, Special, UnOp};
use crate::line::LineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackOp {
    Binary(Op),
    Unary(UnOp),
    LParen,
}

fn expr_precedence(op: StackOp) -> u8 {
    match op {
        StackOp::LParen => 0xFF, // lparen is lowest precedence
        StackOp::Unary(_) => 0,  // other unary is highest precedence
        StackOp::Binary(Op::Times | Op::Divide | Op::Modulus) => 1,
        StackOp::Binary(Op::Plus | Op::Minus) => 2,
        StackOp::Binary(Op::Shl | Op::Shr) => 3,
        StackOp::Binary(Op::Lt | Op::Le | Op::Gt | Op::Ge) => 4,
        StackOp::Binary(Op::Eq | Op::Ne) => 5,
        StackOp::Binary(Op::And) => 6,
        StackOp::Binary(Op::Xor) => 7,
        StackOp::Binary(Op::Or) => 8,
        StackOp::Binary(Op::LogicalAnd) => 9,
        StackOp::Binary(Op::LogicalOr) => 10,
    }
}

pub fn is_symbol_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '_' | '.' | '@' | '?' | '$')
}

pub fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '?' | '$')
}

struct ExprParser<'a> {
    text: &'a str,
    pos: usize,
    line: LineId,
    expr_buffer: Vec<Expr>,
    operator_buffer: Vec<StackOp>,
}

impl<'a> ExprParser<'a> {
    fn err(&self) -> AsmError {
        AsmError::BadOperand(self.text.to_string())
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(offset)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn apply(&mut self, op: StackOp) -> Result<(), AsmError> {
        let expr = match op {
            StackOp::Binary(op) => {
                let rhs = self.expr_buffer.pop().ok_or_else(|| self.err())?;
                let lhs = self.expr_buffer.pop().ok_or_else(|| self.err())?;
                Expr::binary(op, lhs, rhs)
            }
            StackOp::Unary(op) => {
                let operand = self.expr_buffer.pop().ok_or_else(|| self.err())?;
                Expr::unary(op, operand)
            }
            StackOp::LParen => return Err(self.err()),
        };
        self.expr_buffer.push(expr);
        Ok(())
    }

    fn expr_push_apply(&mut self, op: StackOp) -> Result<(), AsmError> {
        // prefix operators bind to the value that follows them
        if !matches!(op, StackOp::Unary(_)) {
            while let Some(top) = self.operator_buffer.last().copied() {
                if expr_precedence(top) > expr_precedence(op) {
                    break;
                }
                self.operator_buffer.pop();
                self.apply(top)?;
            }
        }
        self.operator_buffer.push(op);
        Ok(())
    }

    fn binary_op(&self) -> Option<(Op, usize)> {
        let rest = self.rest();
        const TWO: &[(&str, Op)] = &[
            ("<<", Op::Shl),
            (">>", Op::Shr),
            ("<=", Op::Le),
            (">=", Op::Ge),
            ("==", Op::Eq),
            ("!=", Op::Ne),
            ("&&", Op::LogicalAnd),
            ("||", Op::LogicalOr),
        ];
        if let Some((s, op)) = TWO.iter().find(|(s, _)| rest.starts_with(s)) {
            return Some((*op, s.len()));
        }
        let op = match rest.chars().next()? {
            '+' => Op::Plus,
            '-' => Op::Minus,
            '*' => Op::Times,
            '/' => Op::Divide,
            '%' => Op::Modulus,
            '&' => Op::And,
            '|' => Op::Or,
            '^' => Op::Xor,
            '<' => Op::Lt,
            '>' => Op::Gt,
            '=' => Op::Eq,
            _ => return None,
        };
        Some((op, 1))
    }

    fn number(&mut self, radix: u32, prefix: usize) -> Result<Expr, AsmError> {
        let digits = &self.rest()[prefix..];
        let end = digits
            .find(|c: char| !c.is_digit(radix))
            .unwrap_or(digits.len());
        if end == 0 {
            return Err(self.err());
        }
        let value = u32::from_str_radix(&digits[..end], radix).map_err(|_| self.err())?;
        self.pos += prefix + end;
        Ok(Expr::Int(value as i32))
    }

    fn value(&mut self) -> Result<Expr, AsmError> {
        let c = self.peek().ok_or_else(|| self.err())?;
        let next = self.peek_at(1);
        match c {
            '0' if matches!(next, Some('x' | 'X')) => self.number(16, 2),
            '0'..='9' => self.number(10, 0),
            '$' if next.is_some_and(|c| c.is_ascii_hexdigit()) => self.number(16, 1),
            '%' if next.is_some_and(|c| c == '0' || c == '1') => self.number(2, 1),
            '@' if next.is_some_and(|c| c.is_digit(8)) => self.number(8, 1),
            '\'' => {
                let ch = next.ok_or_else(|| self.err())?;
                self.pos += 1 + ch.len_utf8();
                if self.peek() == Some('\'') {
                    self.pos += 1;
                }
                Ok(Expr::Int(ch as i32))
            }
            c if is_symbol_start(c) => {
                let rest = self.rest();
                let end = rest.find(|c: char| !is_symbol_char(c)).unwrap_or(rest.len());
                self.pos += end;
                Ok(Expr::symbol(&rest[..end]))
            }
            _ => Err(self.err()),
        }
    }

    fn parse(&mut self) -> Result<Expr, AsmError> {
        let mut seen_val = false;
        let mut paren_depth = 0;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                break;
            }
            if seen_val {
                if c == ')' {
                    // an unmatched rparen belongs to the caller
                    if paren_depth == 0 {
                        break;
                    }
                    paren_depth -= 1;
                    loop {
                        match self.operator_buffer.pop() {
                            Some(StackOp::LParen) => break,
                            Some(op) => self.apply(op)?,
                            None => return Err(self.err()),
                        }
                    }
                    self.pos += 1;
                    continue;
                }
                let Some((op, len)) = self.binary_op() else {
                    break;
                };
                self.expr_push_apply(StackOp::Binary(op))?;
                self.pos += len;
                seen_val = false;
                continue;
            }
            match c {
                '(' => {
                    paren_depth += 1;
                    self.operator_buffer.push(StackOp::LParen);
                    self.pos += 1;
                }
                // star is the address of the current line
                '*' => {
                    self.expr_buffer
                        .push(Expr::special(Special::LineAddress, self.line));
                    self.pos += 1;
                    seen_val = true;
                }
                '+' => self.pos += 1,
                '-' | '~' | '!' => {
                    let op = match c {
                        '-' => UnOp::Neg,
                        '~' => UnOp::Com,
                        _ => UnOp::Not,
                    };
                    self.expr_push_apply(StackOp::Unary(op))?;
                    self.pos += 1;
                }
                _ => {
                    let value = self.value()?;
                    self.expr_buffer.push(value);
                    seen_val = true;
                }
            }
        }
        if !seen_val || paren_depth != 0 {
            return Err(self.err());
        }
        while let Some(top) = self.operator_buffer.pop() {
            self.apply(top)?;
        }
        match (self.expr_buffer.pop(), self.expr_buffer.is_empty()) {
            (Some(expr), true) => Ok(expr),
            _ => Err(self.err()),
        }
    }
}

/// Parses an expression at the front of `p` and advances `p` past it.
/// The expression ends at whitespace, a comma, an unmatched `)` or the end
/// of the text.
pub fn parse_expr(p: &mut &str, line: LineId) -> Result<Expr, AsmError> {
    let mut parser = ExprParser {
        text: *p,
        pos: 0,
        line,
        expr_buffer: Vec::new(),
        operator_buffer: Vec::new(),
    };
    let expr = parser.parse()?;
    *p = &parser.text[parser.pos..];
    Ok(expr)
}

/// A file name, either quoted or running to the next whitespace.
pub fn parse_filename<'a>(p: &mut &'a str) -> Option<&'a str> {
    let text = *p;
    if let Some(quoted) = text.strip_prefix('"') {
        let end = quoted.find('"')?;
        *p = &quoted[end + 1..];
        return (end > 0).then(|| &quoted[..end]);
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    *p = &text[end..];
    (end > 0).then(|| &text[..end])
}

/// A string between a pair of identical delimiters, as in `/hello/`.
pub fn parse_delimited<'a>(p: &mut &'a str) -> Option<&'a str> {
    let text = *p;
    let delim = text.chars().next()?;
    let body = &text[delim.len_utf8()..];
    let end = body.find(delim)?;
    *p = &body[end + delim.len_utf8()..];
    Some(&body[..end])
}

/// Expands the C style escapes used under the `cescapes` pragma.
pub fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some(c) => {
                let mut buf = [0; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NoResolver;

    fn eval(text: &str) -> i32 {
        let mut p = text;
        parse_expr(&mut p, LineId(0))
            .unwrap()
            .evaluate(&NoResolver)
            .unwrap()
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("1+2*3"), 7);
        assert_eq!(eval("(1+2)*3"), 9);
        assert_eq!(eval("10-4-3"), 3);
        assert_eq!(eval("1<<4|1"), 17);
        assert_eq!(eval("2+3==5&&1"), 1);
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(eval("-2*3"), -6);
        assert_eq!(eval("2*-3"), -6);
        assert_eq!(eval("~0"), -1);
        assert_eq!(eval("!5+1"), 1);
        assert_eq!(eval("--4"), 4);
    }

    #[test]
    fn number_forms() {
        assert_eq!(eval("$ff"), 255);
        assert_eq!(eval("0x10"), 16);
        assert_eq!(eval("%101"), 5);
        assert_eq!(eval("@17"), 15);
        assert_eq!(eval("'A"), 65);
        assert_eq!(eval("'A'+1"), 66);
        assert_eq!(eval("7%4"), 3);
    }

    #[test]
    fn stops_at_delimiters() {
        let mut p = "foo+1,x";
        let expr = parse_expr(&mut p, LineId(0)).unwrap();
        assert_eq!(expr.to_string(), "(foo+1)");
        assert_eq!(p, ",x");

        let mut p = "5 comment";
        parse_expr(&mut p, LineId(0)).unwrap();
        assert_eq!(p, " comment");

        let mut p = "3)";
        parse_expr(&mut p, LineId(0)).unwrap();
        assert_eq!(p, ")");
    }

    #[test]
    fn star_is_line_address() {
        let mut p = "*+2";
        let expr = parse_expr(&mut p, LineId(7)).unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Op::Plus,
                Expr::special(Special::LineAddress, LineId(7)),
                Expr::int(2)
            )
        );
    }

    #[test]
    fn symbols_allow_local_markers() {
        let mut p = "loop@";
        assert_eq!(parse_expr(&mut p, LineId(0)).unwrap(), Expr::symbol("loop@"));
        let mut p = "$main";
        assert_eq!(parse_expr(&mut p, LineId(0)).unwrap(), Expr::symbol("$main"));
    }

    #[test]
    fn malformed() {
        for text in ["", "(1+2", "1+", "/2", "#5"] {
            let mut p = text;
            assert!(parse_expr(&mut p, LineId(0)).is_err(), "{text}");
        }
    }

    #[test]
    fn filenames_and_strings() {
        let mut p = "\"my file.bin\" rest";
        assert_eq!(parse_filename(&mut p), Some("my file.bin"));
        assert_eq!(p, " rest");
        let mut p = "data.bin";
        assert_eq!(parse_filename(&mut p), Some("data.bin"));
        let mut p = "/hi there/ x";
        assert_eq!(parse_delimited(&mut p), Some("hi there"));
        assert_eq!(p, " x");
        assert_eq!(unescape("a\\n\\\\"), b"a\n\\".to_vec());
    }
}
