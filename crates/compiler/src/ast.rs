//! Abstract syntax for MOO verbs
//!
//! Plain enums, one node per grammar production. Statements carry the
//! 1-based source line they started on; tracebacks and `callers()` report
//! these.

use byre_core::Var;

/// A parsed verb body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// 1-based source line.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `if` with its `elseif` arms; the final `else` body may be empty.
    Cond {
        arms: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Vec<Stmt>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// `for v [, i] in (expr)`: lists bind value/position, maps value/key.
    ForList {
        label: Option<String>,
        value: String,
        index: Option<String>,
        expr: Expr,
        body: Vec<Stmt>,
    },
    /// `for v in [a..b]`.
    ForRange {
        label: Option<String>,
        var: String,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
    },
    Fork {
        var: Option<String>,
        delay: Expr,
        body: Vec<Stmt>,
    },
    TryExcept {
        body: Vec<Stmt>,
        excepts: Vec<ExceptArm>,
    },
    TryFinally {
        body: Vec<Stmt>,
        handler: Vec<Stmt>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Return(Option<Expr>),
    Expr(Expr),
}

/// One `except [v] (codes)` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptArm {
    pub id: Option<String>,
    pub codes: Codes,
    pub body: Vec<Stmt>,
}

/// The codes of an `except` arm or catch expression: `ANY` or a list of
/// expressions evaluating to error values.
#[derive(Debug, Clone, PartialEq)]
pub enum Codes {
    Any,
    List(Vec<Arg>),
}

/// An element of a list literal or argument list; `@expr` splices.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Normal(Expr),
    Splice(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value (INT, FLOAT, STR, OBJ, ERR, BOOL).
    Value(Var),
    /// Variable read.
    Id(String),
    /// `$name`, sugar for `#0.name`.
    Sysprop(String),
    List(Vec<Arg>),
    Map(Vec<(Expr, Expr)>),
    /// Short-circuit `&&` / `||`; yield the last-evaluated operand.
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `base[index]`.
    Index(Box<Expr>, Box<Expr>),
    /// `base[from..to]`.
    Range {
        base: Box<Expr>,
        from: Box<Expr>,
        to: Box<Expr>,
    },
    /// `^` inside an index: resolves to 1.
    RangeStart,
    /// `$` inside an index: resolves to the container's length.
    RangeEnd,
    /// `cond ? yes | no`.
    Cond {
        cond: Box<Expr>,
        yes: Box<Expr>,
        no: Box<Expr>,
    },
    /// `` `expr ! codes => default` ``.
    Catch {
        expr: Box<Expr>,
        codes: Codes,
        except: Option<Box<Expr>>,
    },
    /// `obj.name` / `obj.(expr)`.
    Prop {
        obj: Box<Expr>,
        name: Box<Expr>,
    },
    /// `obj:name(args)` / `obj:(expr)(args)`.
    Verb {
        obj: Box<Expr>,
        name: Box<Expr>,
        args: Vec<Arg>,
    },
    /// Builtin call `name(args)`.
    Call {
        func: String,
        args: Vec<Arg>,
    },
    /// `lhs = rhs` where lhs is Id, Prop, Index or Range.
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `{a, ?b = d, @rest} = rhs`.
    Scatter {
        targets: Vec<ScatterTarget>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterTarget {
    pub name: String,
    pub kind: ScatterKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScatterKind {
    Required,
    /// Default expression is evaluated only when no value was supplied.
    Optional(Option<Expr>),
    Rest,
}
