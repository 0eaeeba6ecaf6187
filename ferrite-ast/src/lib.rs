#![forbid(unsafe_code)]

mod lines;

pub use lines::{LineCol, LineIndex};

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

/// Smallest span covering both `a` and `b`.
pub fn join(a: Span, b: Span) -> Span {
    let start = a.offset().min(b.offset());
    let end = (a.offset() + a.len()).max(b.offset() + b.len());
    span_between(start, end)
}

pub type Ident = Spanned<String>;

/// One translation input: the top-level items of a single script file, in
/// source order.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Interface(InterfaceDecl),
    Class(ClassDecl),
    Function(FunctionDecl),
    /// A statement at unit scope.
    Stmt(Stmt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDecl {
    pub span: Span,
    pub exported: bool,
    pub name: Ident,
    pub fields: Vec<FieldDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDecl {
    pub span: Span,
    pub name: Ident,
    pub optional: bool,
    pub ty: TypeAnn,
    /// Class fields only: `count: number = 0;`
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub span: Span,
    pub exported: bool,
    pub name: Ident,
    pub fields: Vec<FieldDecl>,
    pub constructor: Option<Constructor>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constructor {
    pub span: Span,
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDecl {
    pub span: Span,
    pub name: Ident,
    pub is_async: bool,
    pub params: Vec<Param>,
    pub ret: Option<TypeAnn>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub span: Span,
    pub exported: bool,
    pub name: Ident,
    pub is_async: bool,
    pub params: Vec<Param>,
    pub ret: Option<TypeAnn>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub span: Span,
    pub name: Ident,
    pub optional: bool,
    pub ty: Option<TypeAnn>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAnn {
    pub span: Span,
    pub kind: TypeAnnKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeAnnKind {
    /// `number`, `User`, `Promise<T>`, `Array<T>`
    Named { name: Ident, args: Vec<TypeAnn> },
    /// `T[]`
    Array(Box<TypeAnn>),
    /// `T | null`, `T | undefined`
    Nullable(Box<TypeAnn>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let(LetStmt),
    Assign(AssignStmt),
    If(IfStmt),
    While(WhileStmt),
    Return(ReturnStmt),
    Block(Block),
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Block(b) => b.span,
            Stmt::Expr(e) => e.span,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LetStmt {
    pub span: Span,
    pub kind: DeclKind,
    pub name: Ident,
    pub ty: Option<TypeAnn>,
    pub init: Option<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

/// `target op value;` where `target` is an identifier, member or index
/// expression. `x++` is parsed as `x += 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Expr,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_block: Block,
    pub else_branch: Option<Box<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub value: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(Ident),
    This,
    NumberLit(f64),
    StringLit(String),
    BoolLit(bool),
    Null,
    Undefined,
    /// `` `a${x}b` ``: `quasis.len() == exprs.len() + 1`.
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    ArrayLit(Vec<Expr>),
    /// `{ key: value, ... }`; shorthand `{ id }` is expanded by the parser.
    ObjectLit(Vec<(Ident, Expr)>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: Ident,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        class: Ident,
        args: Vec<Expr>,
    },
    Await(Box<Expr>),
    /// `(a, b) => expr`
    Arrow {
        params: Vec<Param>,
        body: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    /// `==` and `===`
    Eq,
    /// `!=` and `!==`
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_covers_both_spans() {
        let a = span(4, 3);
        let b = span(10, 2);
        let j = join(a, b);
        assert_eq!(j.offset(), 4);
        assert_eq!(j.len(), 8);
        assert_eq!(join(b, a), j);
    }
}
