//! Expression tree consumed by the compiler
//!
//! The parser lives elsewhere; this is the subset of its output the binding
//! compiler reads. Syntax the compiler never handles is carried as
//! [`NodeKind::Unsupported`] so it can be rejected with a reason.

use std::fmt;

/// Position of a node in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl SourceLocation {
    /// Create a location
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Packed exception-table entry
    #[inline]
    pub const fn packed(self) -> u64 {
        ((self.line as u64) << 32) | self.column as u64
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Binary operators the parser produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Ge,
    Lt,
    Le,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    And,
    Or,
}

impl BinaryOp {
    /// Source spelling
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::StrictEqual => "===",
            Self::StrictNotEqual => "!==",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Bare name
    Identifier(String),
    /// `base.name`
    FieldMember {
        /// Object expression
        base: Box<Node>,
        /// Member name
        name: String,
    },
    /// `lhs op rhs`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Node>,
        /// Right operand
        rhs: Box<Node>,
    },
    /// `test ? ok : ko`
    Conditional {
        /// Condition
        test: Box<Node>,
        /// Value when true
        ok: Box<Node>,
        /// Value when false
        ko: Box<Node>,
    },
    /// Parenthesized expression
    Nested(Box<Node>),
    /// `true`
    True,
    /// `false`
    False,
    /// Numeric literal
    Numeric(f64),
    /// String literal
    StringLiteral(String),
    /// `callee(args...)`
    Call {
        /// Called expression
        callee: Box<Node>,
        /// Arguments
        args: Vec<Node>,
    },
    /// Any other syntax, named by its node kind
    Unsupported(String),
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Payload
    pub kind: NodeKind,
    /// Source position
    pub loc: SourceLocation,
}

impl Node {
    /// Create a node at the default location
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            loc: SourceLocation::default(),
        }
    }

    /// Set the source location
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.loc = SourceLocation::new(line, column);
        self
    }

    /// Bare name
    pub fn ident(name: &str) -> Self {
        Self::new(NodeKind::Identifier(name.to_string()))
    }

    /// `base.name`
    pub fn member(base: Node, name: &str) -> Self {
        let loc = base.loc;
        Self {
            kind: NodeKind::FieldMember {
                base: Box::new(base),
                name: name.to_string(),
            },
            loc,
        }
    }

    /// Dotted name chain, e.g. `"a.b.c"`
    pub fn path(dotted: &str) -> Self {
        let mut parts = dotted.split('.');
        let first = Self::ident(parts.next().unwrap_or_default());
        parts.fold(first, Self::member)
    }

    /// Binary expression located at its left operand
    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        let loc = lhs.loc;
        Self {
            kind: NodeKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            loc,
        }
    }

    /// Conditional expression located at its test
    pub fn conditional(test: Node, ok: Node, ko: Node) -> Self {
        let loc = test.loc;
        Self {
            kind: NodeKind::Conditional {
                test: Box::new(test),
                ok: Box::new(ok),
                ko: Box::new(ko),
            },
            loc,
        }
    }

    /// Parenthesized expression
    pub fn nested(inner: Node) -> Self {
        let loc = inner.loc;
        Self {
            kind: NodeKind::Nested(Box::new(inner)),
            loc,
        }
    }

    /// Boolean literal
    pub fn boolean(value: bool) -> Self {
        Self::new(if value { NodeKind::True } else { NodeKind::False })
    }

    /// Numeric literal
    pub fn number(value: f64) -> Self {
        Self::new(NodeKind::Numeric(value))
    }

    /// String literal
    pub fn string(value: &str) -> Self {
        Self::new(NodeKind::StringLiteral(value.to_string()))
    }

    /// Call expression
    pub fn call(callee: Node, args: Vec<Node>) -> Self {
        let loc = callee.loc;
        Self {
            kind: NodeKind::Call {
                callee: Box::new(callee),
                args,
            },
            loc,
        }
    }

    /// Syntax outside the supported grammar
    pub fn unsupported(kind: &str) -> Self {
        Self::new(NodeKind::Unsupported(kind.to_string()))
    }
}
