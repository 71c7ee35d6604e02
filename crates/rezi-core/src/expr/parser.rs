//! Recursive-descent parser for sizing expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! ternary    := compare ('?' ternary ':' ternary)?
//! compare    := additive (('<' | '<=' | '>' | '>=' | '==' | '!=') additive)*
//! additive   := mult (('+' | '-') mult)*
//! mult       := unary (('*' | '/' | '%') unary)*
//! unary      := '-' unary | primary
//! primary    := number | scope ('.' prop)? | '#' id ('.' prop)?
//!             | name '(' args ')' | '(' ternary ')'
//! ```
//!
//! `steps()` takes a scrutinee followed by `threshold: value` pairs.

use super::{
    BinaryOp, CompareOp, Expr, Func, ParsedExpr, Ref, RefProp, RefScope, SyntaxError, UnaryOp,
};

/// Parse an expression source string into a frozen [`ParsedExpr`].
///
/// Parsing is a pure function: equal sources produce structurally equal
/// results. Errors carry the character offset and the offending source for
/// caret diagnostics.
pub fn parse_expression(source: &str) -> Result<ParsedExpr, SyntaxError> {
    let chars: Vec<char> = source.chars().collect();
    let mut parser = Parser {
        source,
        chars,
        pos: 0,
    };
    parser.skip_ws();
    let root = parser.ternary()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error(parser.pos, "unexpected trailing input"));
    }
    Ok(ParsedExpr::new(source.to_owned(), root))
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, position: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            position,
            source_text: self.source.to_owned(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char, context: &str) -> Result<(), SyntaxError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(self.pos, format!("expected '{c}' {context}")))
        }
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.compare()?;
        self.skip_ws();
        if self.eat('?') {
            self.skip_ws();
            let then = self.ternary()?;
            self.skip_ws();
            self.expect(':', "in ternary")?;
            self.skip_ws();
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn compare(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.additive()?;
        loop {
            self.skip_ws();
            let op = match (self.peek(), self.peek_at(1)) {
                (Some('<'), Some('=')) => {
                    self.pos += 2;
                    CompareOp::Le
                }
                (Some('>'), Some('=')) => {
                    self.pos += 2;
                    CompareOp::Ge
                }
                (Some('='), Some('=')) => {
                    self.pos += 2;
                    CompareOp::Eq
                }
                (Some('!'), Some('=')) => {
                    self.pos += 2;
                    CompareOp::Ne
                }
                (Some('<'), _) => {
                    self.pos += 1;
                    CompareOp::Lt
                }
                (Some('>'), _) => {
                    self.pos += 1;
                    CompareOp::Gt
                }
                _ => return Ok(lhs),
            };
            self.skip_ws();
            let rhs = self.additive()?;
            lhs = Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.mult()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.skip_ws();
            let rhs = self.mult()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn mult(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                Some('%') => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.skip_ws();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        self.skip_ws();
        if self.eat('-') {
            self.skip_ws();
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error(self.pos, "unexpected end of input")),
            Some('(') => {
                self.pos += 1;
                let inner = self.ternary()?;
                self.skip_ws();
                self.expect(')', "to close group")?;
                Ok(inner)
            }
            Some('#') => self.widget_ref(),
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.ident_or_call(),
            Some(c) => Err(self.error(self.pos, format!("unexpected character '{c}'"))),
        }
    }

    fn number(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.pos;
        let mut text = String::new();
        let mut saw_digit = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            saw_digit = true;
            text.push(self.bump().unwrap_or('0'));
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap_or('.'));
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                saw_digit = true;
                text.push(self.bump().unwrap_or('0'));
            }
        }
        if !saw_digit {
            return Err(self.error(start, "expected number"));
        }
        text.parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| self.error(start, "malformed number"))
    }

    fn ident(&mut self) -> String {
        let mut name = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            name.push(self.bump().unwrap_or('_'));
        }
        name
    }

    /// Widget id after `#`. Unicode letters are allowed; whitespace and `.`
    /// terminate the id (`.` selects the property).
    fn widget_id(&mut self) -> String {
        let mut id = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '-') {
            id.push(self.bump().unwrap_or('_'));
        }
        id
    }

    fn ref_prop(&mut self) -> Result<RefProp, SyntaxError> {
        if !self.eat('.') {
            // Bare refs select the width.
            return Ok(RefProp::Width);
        }
        let start = self.pos;
        let name = self.ident();
        match name.as_str() {
            "w" => Ok(RefProp::Width),
            "h" => Ok(RefProp::Height),
            "min_w" => Ok(RefProp::MinWidth),
            "min_h" => Ok(RefProp::MinHeight),
            "" => Err(self.error(start, "expected property after '.'")),
            other => Err(self.error(
                start,
                format!("unknown property '{other}' (expected w, h, min_w, min_h)"),
            )),
        }
    }

    fn widget_ref(&mut self) -> Result<Expr, SyntaxError> {
        let hash = self.pos;
        self.expect('#', "before widget id")?;
        let id = self.widget_id();
        if id.is_empty() {
            return Err(self.error(hash + 1, "expected widget id after '#'"));
        }
        let prop = self.ref_prop()?;
        Ok(Expr::Ref(Ref {
            scope: RefScope::Widget(id),
            prop,
        }))
    }

    fn ident_or_call(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.pos;
        let name = self.ident();
        self.skip_ws();
        if self.peek() == Some('(') {
            let Some(func) = Func::from_name(&name) else {
                return Err(self.error(start, format!("unknown function '{name}'")));
            };
            return self.call(func, start);
        }
        let scope = match name.as_str() {
            "viewport" => RefScope::Viewport,
            "parent" => RefScope::Parent,
            "intrinsic" => RefScope::Intrinsic,
            other => {
                return Err(self.error(
                    start,
                    format!("unknown scope '{other}' (expected viewport, parent, intrinsic)"),
                ));
            }
        };
        let prop = self.ref_prop()?;
        Ok(Expr::Ref(Ref { scope, prop }))
    }

    fn call(&mut self, func: Func, name_start: usize) -> Result<Expr, SyntaxError> {
        self.expect('(', "to open argument list")?;
        self.skip_ws();
        let mut args = Vec::new();
        if func == Func::Steps {
            // steps(x, t1: v1, t2: v2, …)
            args.push(self.ternary()?);
            self.skip_ws();
            while self.eat(',') {
                self.skip_ws();
                let threshold = self.ternary()?;
                self.skip_ws();
                if !self.eat(':') {
                    return Err(self.error(
                        self.pos,
                        "malformed steps() pair: expected ':' between threshold and value",
                    ));
                }
                self.skip_ws();
                let value = self.ternary()?;
                args.push(threshold);
                args.push(value);
                self.skip_ws();
            }
            self.expect(')', "to close steps()")?;
            if args.len() < 3 {
                return Err(self.error(name_start, "steps() requires at least one threshold:value pair"));
            }
        } else {
            if !self.eat(')') {
                loop {
                    args.push(self.ternary()?);
                    self.skip_ws();
                    if self.eat(',') {
                        self.skip_ws();
                        continue;
                    }
                    self.expect(')', "to close argument list")?;
                    break;
                }
            }
            self.check_arity(func, &args, name_start)?;
        }
        Ok(Expr::Call { func, args })
    }

    fn check_arity(&self, func: Func, args: &[Expr], at: usize) -> Result<(), SyntaxError> {
        let ok = match func {
            Func::Clamp => args.len() == 3,
            Func::Max | Func::Min => args.len() >= 2,
            Func::Floor | Func::Ceil | Func::Abs => args.len() == 1,
            Func::MaxSibling | Func::SumSibling => {
                args.len() == 1
                    && matches!(
                        &args[0],
                        Expr::Ref(Ref {
                            scope: RefScope::Widget(_),
                            ..
                        })
                    )
            }
            Func::Steps => true,
        };
        if ok {
            Ok(())
        } else {
            Err(self.error(
                at,
                format!("invalid arguments for {}()", func.as_str()),
            ))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParsedExpr {
        match parse_expression(src) {
            Ok(e) => e,
            Err(e) => panic!("parse of {src:?} failed: {e}\n{}", e.caret()),
        }
    }

    fn roundtrip(src: &str) {
        let first = parse(src);
        let printed = first.to_string();
        let second = parse(&printed);
        assert_eq!(first, second, "print/parse mismatch: {src:?} -> {printed:?}");
    }

    #[test]
    fn number_literal() {
        let e = parse("42");
        assert_eq!(*e.root(), Expr::Number(42.0));
    }

    #[test]
    fn decimal_literal() {
        let e = parse("2.5");
        assert_eq!(*e.root(), Expr::Number(2.5));
    }

    #[test]
    fn parent_ref() {
        let e = parse("parent.w");
        assert_eq!(
            *e.root(),
            Expr::Ref(Ref {
                scope: RefScope::Parent,
                prop: RefProp::Width,
            })
        );
    }

    #[test]
    fn widget_ref_with_prop() {
        let e = parse("#sidebar.min_h");
        assert_eq!(
            *e.root(),
            Expr::Ref(Ref {
                scope: RefScope::Widget("sidebar".into()),
                prop: RefProp::MinHeight,
            })
        );
    }

    #[test]
    fn bare_widget_ref_defaults_to_width() {
        let e = parse("#sidebar");
        assert_eq!(
            *e.root(),
            Expr::Ref(Ref {
                scope: RefScope::Widget("sidebar".into()),
                prop: RefProp::Width,
            })
        );
    }

    #[test]
    fn unicode_widget_id() {
        let e = parse("#läufer.w");
        assert!(e.refs().contains("läufer"));
    }

    #[test]
    fn precedence_mul_binds_tighter() {
        let e = parse("1 + 2 * 3");
        match e.root() {
            Expr::Binary {
                op: BinaryOp::Add,
                rhs,
                ..
            } => {
                assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn parens_override_precedence() {
        let e = parse("(1 + 2) * 3");
        match e.root() {
            Expr::Binary {
                op: BinaryOp::Mul,
                lhs,
                ..
            } => {
                assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn ternary_with_comparison() {
        let e = parse("viewport.w < 100 ? 20 : 40");
        assert!(matches!(e.root(), Expr::Ternary { .. }));
    }

    #[test]
    fn nested_ternary() {
        let e = parse("viewport.w < 80 ? 10 : viewport.w < 120 ? 20 : 30");
        match e.root() {
            Expr::Ternary { otherwise, .. } => {
                assert!(matches!(**otherwise, Expr::Ternary { .. }));
            }
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn steps_pairs_flattened() {
        let e = parse("steps(viewport.w, 80: 10, 120: 20)");
        match e.root() {
            Expr::Call {
                func: Func::Steps,
                args,
            } => assert_eq!(args.len(), 5),
            other => panic!("unexpected AST: {other:?}"),
        }
    }

    #[test]
    fn steps_missing_colon_fails() {
        let err = parse_expression("steps(viewport.w, 80 10)").unwrap_err();
        assert!(err.message.contains("steps"));
    }

    #[test]
    fn steps_without_pairs_fails() {
        assert!(parse_expression("steps(viewport.w)").is_err());
    }

    #[test]
    fn sibling_aggregation_requires_widget_ref() {
        assert!(parse_expression("max_sibling(parent.w)").is_err());
        assert!(parse_expression("max_sibling(#col.w)").is_ok());
    }

    #[test]
    fn unknown_function_fails() {
        let err = parse_expression("frobnicate(1)").unwrap_err();
        assert!(err.message.contains("unknown function"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn unknown_scope_fails() {
        let err = parse_expression("window.w").unwrap_err();
        assert!(err.message.contains("unknown scope"));
    }

    #[test]
    fn unknown_property_fails() {
        let err = parse_expression("parent.depth").unwrap_err();
        assert!(err.message.contains("unknown property"));
    }

    #[test]
    fn unexpected_end_of_input() {
        let err = parse_expression("1 +").unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
        assert_eq!(err.position, 3);
    }

    #[test]
    fn caret_marks_offending_character() {
        let err = parse_expression("parent.w @ 3").unwrap_err();
        let caret = err.caret();
        let lines: Vec<&str> = caret.lines().collect();
        assert_eq!(lines[0], "parent.w @ 3");
        assert_eq!(lines[1].len(), err.position + 1);
    }

    #[test]
    fn whitespace_tolerant() {
        let tight = parse("clamp(parent.w/3,20,60)");
        let loose = parse("clamp( parent.w / 3 , 20 , 60 )");
        assert_eq!(tight, loose);
    }

    #[test]
    fn clamp_arity_checked() {
        assert!(parse_expression("clamp(1, 2)").is_err());
    }

    #[test]
    fn print_parse_roundtrip() {
        for src in [
            "1 + 2 * 3",
            "(1 + 2) * 3",
            "1 - (2 - 3)",
            "-viewport.w",
            "-(1 + 2)",
            "parent.w - #sidebar.w",
            "viewport.w < 100 ? 20 : 40",
            "viewport.w < 80 ? 10 : viewport.w < 120 ? 20 : 30",
            "clamp(parent.w / 3, 20, 60)",
            "steps(viewport.w, 80: 10, 120: 20)",
            "max_sibling(#col.w) + sum_sibling(#col.w)",
            "intrinsic.h % 2 == 0 ? intrinsic.h : intrinsic.h + 1",
            "max(min(1, 2), abs(-3), floor(2.5), ceil(0.5))",
        ] {
            roundtrip(src);
        }
    }
}
