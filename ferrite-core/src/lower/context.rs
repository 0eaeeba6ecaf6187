#![forbid(unsafe_code)]

use std::collections::HashMap;

use ferrite_rir as rir;

use crate::types::TargetType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FnKind {
    Function,
    Method { class: String },
    Constructor { class: String },
    /// The generated `main` holding unit-scope statements.
    Main,
}

#[derive(Clone, Debug)]
pub(crate) struct Binding {
    pub rust_name: String,
    pub ty: TargetType,
    /// `Shared`/`Exclusive` for parameters that borrow the caller's value.
    pub passing: rir::Passing,
    /// Declared `mut`.
    pub mutable: bool,
    /// Written through somewhere in its scope.
    pub written: bool,
}

impl Binding {
    /// A binding that owns its value.
    pub fn owned(rust_name: String, ty: TargetType, mutable: bool, written: bool) -> Self {
        Self {
            rust_name,
            ty,
            passing: rir::Passing::Value,
            mutable,
            written,
        }
    }

    pub fn is_borrowed(&self) -> bool {
        self.passing != rir::Passing::Value
    }
}

/// A class field held in a local while its constructor runs.
#[derive(Clone, Debug)]
pub(crate) struct CtorField {
    pub local: String,
    pub ty: TargetType,
    pub initialized: bool,
}

/// Per-function lowering state. Dropped when the function is finished.
pub(crate) struct FnCtx {
    pub kind: FnKind,
    pub is_async: bool,
    /// Declared return payload (`AsyncResult` already unwrapped).
    pub ret: TargetType,
    pub ret_declared: bool,
    /// Set when the body emits a `.await`.
    pub awaited: bool,
    /// The method takes `&mut self`.
    pub self_written: bool,
    scopes: Vec<HashMap<String, Binding>>,
    pub ctor_fields: HashMap<String, CtorField>,
}

impl FnCtx {
    pub fn new(kind: FnKind, is_async: bool, ret: TargetType, ret_declared: bool) -> Self {
        Self {
            kind,
            is_async,
            ret,
            ret_declared,
            awaited: false,
            self_written: false,
            scopes: vec![HashMap::new()],
            ctor_fields: HashMap::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn bind(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// The class whose members `this` refers to.
    pub fn class(&self) -> Option<&str> {
        match &self.kind {
            FnKind::Method { class } | FnKind::Constructor { class } => Some(class),
            FnKind::Function | FnKind::Main => None,
        }
    }
}

/// A lowered expression and its source-level type.
#[derive(Clone, Debug)]
pub(crate) struct Typed {
    pub expr: rir::Expr,
    pub ty: TargetType,
}

impl Typed {
    pub fn new(expr: rir::Expr, ty: TargetType) -> Self {
        Self { expr, ty }
    }

    pub fn is_str_literal(&self) -> bool {
        matches!(self.expr, rir::Expr::Lit(rir::Lit::Str(_)))
    }
}
