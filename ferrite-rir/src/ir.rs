#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use ferrite_ast::Span;
use serde::Deserialize;

/// Crates the generated program links against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dependency {
    Serde,
    SerdeJson,
    Reqwest,
    Tokio,
    Rand,
    Futures,
}

impl Dependency {
    pub fn crate_name(self) -> &'static str {
        match self {
            Dependency::Serde => "serde",
            Dependency::SerdeJson => "serde_json",
            Dependency::Reqwest => "reqwest",
            Dependency::Tokio => "tokio",
            Dependency::Rand => "rand",
            Dependency::Futures => "futures",
        }
    }
}

/// Support code emitted once per unit in the private `ferrite_rt` module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeHelper {
    /// Rounds half-way cases toward positive infinity.
    RoundHalfUp,
    /// JSON-over-HTTP request helpers.
    Http,
    /// Text splitting where an empty separator yields single characters.
    Split,
    /// `Math.max`/`Math.min` that propagate NaN.
    MinMax,
    /// Renders JSON values the way the source prints them.
    JsonText,
}

/// One lowered unit, ready for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    /// Items in source order.
    pub items: Vec<Item>,
    pub helpers: BTreeSet<RuntimeHelper>,
    pub dependencies: BTreeSet<Dependency>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, dep: Dependency) {
        self.dependencies.insert(dep);
    }

    pub fn require_helper(&mut self, helper: RuntimeHelper) {
        self.helpers.insert(helper);
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.items.iter().filter_map(|item| match item {
            Item::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn impl_for(&self, ty: &str) -> Option<&ImplBlock> {
        self.items.iter().find_map(|item| match item {
            Item::Impl(block) if block.self_ty == ty => Some(block),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions().find(|f| f.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs().find(|s| s.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Struct(StructDef),
    Impl(ImplBlock),
    Function(Function),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub span: Span,
    pub public: bool,
    /// Derive `Serialize`/`Deserialize` (data-transfer records).
    pub serializable: bool,
    pub fields: Vec<FieldDef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImplBlock {
    pub self_ty: String,
    pub functions: Vec<Function>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Receiver {
    /// `&self`
    Shared,
    /// `&mut self`
    Exclusive,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub span: Span,
    pub public: bool,
    pub is_async: bool,
    /// Outer attributes without `#[...]`, e.g. `tokio::main`.
    pub attrs: Vec<String>,
    pub receiver: Option<Receiver>,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Block,
}

/// How a parameter receives its argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Passing {
    /// Moved or copied in.
    Value,
    /// `&T`
    Shared,
    /// `&mut T`
    Exclusive,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    /// `mut name: T`; only meaningful for `Passing::Value`.
    pub mutable: bool,
    pub passing: Passing,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Unit,
    Bool,
    F64,
    String,
    /// `serde_json::Value`
    Json,
    Named(String),
    Option(Box<Type>),
    Vec(Box<Type>),
}

impl Type {
    /// Values of this type are copied rather than moved.
    pub fn is_copy(&self) -> bool {
        matches!(self, Type::Unit | Type::Bool | Type::F64)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        mutable: bool,
        ty: Option<Type>,
        init: Option<Expr>,
    },
    /// `target = value` or `target op= value`.
    Assign {
        target: Expr,
        op: Option<BinOp>,
        value: Expr,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<Else>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Return(Option<Expr>),
    /// A nested `{ .. }` scope.
    Block(Block),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Else {
    If(Box<Stmt>),
    Block(Block),
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

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// Binding strength, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Rem => 10,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 7,
            BinOp::And => 6,
            BinOp::Or => 5,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 7
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    F64(f64),
    /// A borrowed `"..."` literal (`&'static str`).
    Str(String),
    Bool(bool),
    Unit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatKind {
    /// `format!`
    Format,
    /// `println!`
    Println,
    /// `eprintln!`
    Eprintln,
}

impl FormatKind {
    pub fn macro_name(self) -> &'static str {
        match self {
            FormatKind::Format => "format",
            FormatKind::Println => "println",
            FormatKind::Eprintln => "eprintln",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpVerb {
    pub fn method_const(self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit(Lit),
    Local(String),
    /// A path to a constant, e.g. `std::f64::consts::PI`.
    Path(String),
    /// `self`
    SelfValue,
    Field {
        base: Box<Expr>,
        name: String,
    },
    /// `base[index as usize]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `path(args..)`: free functions and associated functions (`Counter::new`).
    Call {
        func: String,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// A mapping-table call template with `{recv}` and `{N}` holes.
    Template {
        template: String,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    /// `format!`/`println!`/`eprintln!` with a literal format string.
    Format {
        kind: FormatKind,
        template: String,
        args: Vec<Expr>,
    },
    /// `vec![..]`
    VecLit(Vec<Expr>),
    /// `Name { field: value, .. }`; `Self` inside constructors.
    StructLit {
        name: String,
        fields: Vec<(String, Expr)>,
    },
    /// `serde_json::json!(expr)`
    Json(Box<Expr>),
    /// `serde_json::json!({ "key": value, .. })`
    JsonObject(Vec<(String, Expr)>),
    /// `|a, b| body`; `by_ref` closures receive references and clone them
    /// into owned parameters first.
    Closure {
        params: Vec<String>,
        by_ref: bool,
        body: Box<Expr>,
    },
    /// `if cond { a } else { b }` in value position.
    IfElse {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `&expr`
    Ref(Box<Expr>),
    /// `&mut expr`
    RefMut(Box<Expr>),
    /// `expr.clone()`
    Clone(Box<Expr>),
    /// `String::from(expr)`
    OwnedText(Box<Expr>),
    /// `Some(expr)`
    Some(Box<Expr>),
    None,
    /// `expr.await`
    Await(Box<Expr>),
    /// `futures::executor::block_on(expr)`
    BlockOn(Box<Expr>),
    /// A JSON-over-HTTP request through the runtime helpers, decoding the
    /// response into `response`.
    Http {
        verb: HttpVerb,
        url: Box<Expr>,
        body: Option<Box<Expr>>,
        response: Type,
    },
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn str_lit(s: impl Into<String>) -> Self {
        Expr::Lit(Lit::Str(s.into()))
    }

    pub fn f64_lit(n: f64) -> Self {
        Expr::Lit(Lit::F64(n))
    }

    /// Place expressions name storage (locals, fields, elements).
    pub fn is_place(&self) -> bool {
        matches!(
            self,
            Expr::Local(_) | Expr::SelfValue | Expr::Field { .. } | Expr::Index { .. }
        )
    }
}
