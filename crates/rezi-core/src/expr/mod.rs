//! Sizing expressions.
//!
//! Widget dimensions may be given as expression source text
//! (`"parent.w - #sidebar.w"`, `"clamp(viewport.w / 3, 20, 60)"`). Parsing
//! produces a frozen [`ParsedExpr`]: the AST plus precomputed facts the
//! constraint graph needs (referenced widget ids, intrinsic usage, sibling
//! aggregation usage). Evaluation lives in the constraint resolver.

mod parser;

pub use parser::parse_expression;

use std::collections::BTreeSet;
use std::fmt;

/// Scope of a reference inside an expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefScope {
    /// The terminal viewport.
    Viewport,
    /// The parent container's content area.
    Parent,
    /// The widget's own intrinsic (content-measured) size.
    Intrinsic,
    /// Another widget, by id (`#sidebar`).
    Widget(String),
}

/// Property selected by a reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefProp {
    /// `w` — width.
    Width,
    /// `h` — height.
    Height,
    /// `min_w` — minimum width.
    MinWidth,
    /// `min_h` — minimum height.
    MinHeight,
}

impl RefProp {
    /// Source-text spelling of the property.
    pub const fn as_str(self) -> &'static str {
        match self {
            RefProp::Width => "w",
            RefProp::Height => "h",
            RefProp::MinWidth => "min_w",
            RefProp::MinHeight => "min_h",
        }
    }
}

/// A scoped property reference, e.g. `parent.w` or `#editor.min_h`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ref {
    /// Reference scope.
    pub scope: RefScope,
    /// Referenced property.
    pub prop: RefProp,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
}

/// Binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division. Division by zero evaluates to 0.
    Div,
    /// Remainder. Remainder by zero evaluates to 0.
    Rem,
}

/// Comparison operators. Comparisons evaluate to 1 or 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    const fn as_str(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

/// Built-in functions callable from expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    /// `clamp(x, lo, hi)`
    Clamp,
    /// `max(a, b, …)`
    Max,
    /// `min(a, b, …)`
    Min,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `abs(x)`
    Abs,
    /// `max_sibling(#id.prop)` — maximum over all widgets sharing the id.
    MaxSibling,
    /// `sum_sibling(#id.prop)` — sum over all widgets sharing the id.
    SumSibling,
    /// `steps(x, t1: v1, t2: v2, …)` — stepwise lookup by threshold.
    Steps,
}

impl Func {
    /// Source-text spelling of the function name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Func::Clamp => "clamp",
            Func::Max => "max",
            Func::Min => "min",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Abs => "abs",
            Func::MaxSibling => "max_sibling",
            Func::SumSibling => "sum_sibling",
            Func::Steps => "steps",
        }
    }

    /// Look up a function by its source spelling.
    pub fn from_name(name: &str) -> Option<Func> {
        Some(match name {
            "clamp" => Func::Clamp,
            "max" => Func::Max,
            "min" => Func::Min,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "abs" => Func::Abs,
            "max_sibling" => Func::MaxSibling,
            "sum_sibling" => Func::SumSibling,
            "steps" => Func::Steps,
            _ => return None,
        })
    }
}

/// An expression AST node.
///
/// `steps()` stores its arguments flattened: the scrutinee followed by
/// alternating threshold and value expressions.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A numeric literal.
    Number(f64),
    /// A scoped property reference.
    Ref(Ref),
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<Expr>,
    },
    /// A binary arithmetic operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A comparison producing 1 or 0.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A ternary conditional.
    Ternary {
        /// Condition; nonzero selects `then`.
        cond: Box<Expr>,
        /// Value when the condition is nonzero.
        then: Box<Expr>,
        /// Value when the condition is zero.
        otherwise: Box<Expr>,
    },
    /// A function call.
    Call {
        /// Function.
        func: Func,
        /// Arguments (flattened pairs for `steps`).
        args: Vec<Expr>,
    },
}

/// A parse error with position and caret diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at {position}: {message}")]
pub struct SyntaxError {
    /// Human-readable description.
    pub message: String,
    /// Character offset into the source where the error was detected.
    pub position: usize,
    /// The offending source text.
    pub source_text: String,
}

impl SyntaxError {
    /// Render the source with a caret pointing at the error position.
    pub fn caret(&self) -> String {
        let mut out = String::with_capacity(self.source_text.len() * 2 + 2);
        out.push_str(&self.source_text);
        out.push('\n');
        for _ in 0..self.position {
            out.push(' ');
        }
        out.push('^');
        out
    }
}

/// A frozen, parsed sizing expression.
///
/// Structurally equal for equal source strings. Carries the facts the
/// constraint graph builder consults without re-walking the AST.
#[derive(Clone, Debug)]
pub struct ParsedExpr {
    source: String,
    root: Expr,
    refs: BTreeSet<String>,
    has_intrinsic: bool,
    has_sibling_aggregation: bool,
}

impl ParsedExpr {
    pub(crate) fn new(source: String, root: Expr) -> Self {
        let mut refs = BTreeSet::new();
        let mut has_intrinsic = false;
        let mut has_sibling_aggregation = false;
        collect_facts(
            &root,
            &mut refs,
            &mut has_intrinsic,
            &mut has_sibling_aggregation,
        );
        Self {
            source,
            root,
            refs,
            has_intrinsic,
            has_sibling_aggregation,
        }
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root AST node.
    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Widget ids referenced anywhere in the expression.
    pub fn refs(&self) -> &BTreeSet<String> {
        &self.refs
    }

    /// Whether the expression reads `intrinsic.*`.
    pub fn has_intrinsic(&self) -> bool {
        self.has_intrinsic
    }

    /// Whether the expression uses `max_sibling` or `sum_sibling`.
    pub fn has_sibling_aggregation(&self) -> bool {
        self.has_sibling_aggregation
    }
}

impl PartialEq for ParsedExpr {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

fn collect_facts(
    expr: &Expr,
    refs: &mut BTreeSet<String>,
    has_intrinsic: &mut bool,
    has_aggregation: &mut bool,
) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref(r) => match &r.scope {
            RefScope::Widget(id) => {
                refs.insert(id.clone());
            }
            RefScope::Intrinsic => *has_intrinsic = true,
            RefScope::Viewport | RefScope::Parent => {}
        },
        Expr::Unary { expr, .. } => collect_facts(expr, refs, has_intrinsic, has_aggregation),
        Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
            collect_facts(lhs, refs, has_intrinsic, has_aggregation);
            collect_facts(rhs, refs, has_intrinsic, has_aggregation);
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            collect_facts(cond, refs, has_intrinsic, has_aggregation);
            collect_facts(then, refs, has_intrinsic, has_aggregation);
            collect_facts(otherwise, refs, has_intrinsic, has_aggregation);
        }
        Expr::Call { func, args } => {
            if matches!(func, Func::MaxSibling | Func::SumSibling) {
                *has_aggregation = true;
            }
            for arg in args {
                collect_facts(arg, refs, has_intrinsic, has_aggregation);
            }
        }
    }
}

// Printer precedence levels, lowest first.
const PREC_TERNARY: u8 = 1;
const PREC_COMPARE: u8 = 2;
const PREC_ADD: u8 = 3;
const PREC_MUL: u8 = 4;
const PREC_UNARY: u8 = 5;
const PREC_PRIMARY: u8 = 6;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Ternary { .. } => PREC_TERNARY,
        Expr::Compare { .. } => PREC_COMPARE,
        Expr::Binary { op, .. } => match op {
            BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => PREC_MUL,
        },
        Expr::Unary { .. } => PREC_UNARY,
        Expr::Number(_) | Expr::Ref(_) | Expr::Call { .. } => PREC_PRIMARY,
    }
}

fn fmt_child(f: &mut fmt::Formatter<'_>, child: &Expr, min_prec: u8) -> fmt::Result {
    if precedence(child) < min_prec {
        write!(f, "({child})")
    } else {
        write!(f, "{child}")
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            RefScope::Viewport => write!(f, "viewport.{}", self.prop.as_str()),
            RefScope::Parent => write!(f, "parent.{}", self.prop.as_str()),
            RefScope::Intrinsic => write!(f, "intrinsic.{}", self.prop.as_str()),
            RefScope::Widget(id) => write!(f, "#{}.{}", id, self.prop.as_str()),
        }
    }
}

/// Canonical printing. `parse_expression(expr.to_string())` recovers a
/// structurally equal AST.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Ref(r) => write!(f, "{r}"),
            Expr::Unary { op: UnaryOp::Neg, expr } => {
                write!(f, "-")?;
                fmt_child(f, expr, PREC_UNARY)
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = precedence(self);
                fmt_child(f, lhs, prec)?;
                let sym = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                    BinaryOp::Rem => "%",
                };
                write!(f, " {sym} ")?;
                // Left-associative: an equal-precedence rhs needs parens.
                fmt_child(f, rhs, prec + 1)
            }
            Expr::Compare { op, lhs, rhs } => {
                fmt_child(f, lhs, PREC_COMPARE)?;
                write!(f, " {} ", op.as_str())?;
                fmt_child(f, rhs, PREC_COMPARE + 1)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                fmt_child(f, cond, PREC_COMPARE)?;
                write!(f, " ? ")?;
                fmt_child(f, then, PREC_COMPARE)?;
                write!(f, " : ")?;
                fmt_child(f, otherwise, PREC_TERNARY)
            }
            Expr::Call { func, args } => {
                write!(f, "{}(", func.as_str())?;
                if *func == Func::Steps {
                    for (i, arg) in args.iter().enumerate() {
                        if i == 0 {
                            write!(f, "{arg}")?;
                        } else if i % 2 == 1 {
                            write!(f, ", {arg}")?;
                        } else {
                            write!(f, ": {arg}")?;
                        }
                    }
                } else {
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for ParsedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
