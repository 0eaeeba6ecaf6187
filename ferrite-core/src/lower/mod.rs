#![forbid(unsafe_code)]

//! Lowering from the source tree to `ferrite-rir`.
//!
//! Every top-level declaration and every statement is lowered on its own;
//! an error is recorded and lowering moves on to the next sibling, so one
//! pass reports as many problems as it can. The caller discards the module
//! if any error was recorded.

mod call;
mod context;
mod decl;
mod expr;
mod format;
mod stmt;

use ferrite_ast::{Item, Program};
use ferrite_rir as rir;
use tracing::debug;

use crate::error::TranslateError;
use crate::mapping::ApiTable;
use crate::mutability::MutabilityTable;
use crate::options::TranslateOptions;
use crate::symbols::SymbolTable;

pub(crate) use context::{Binding, FnCtx, FnKind, Typed};

pub(crate) struct Lowerer<'u> {
    pub symbols: &'u SymbolTable,
    pub mutability: &'u MutabilityTable,
    pub api: &'u ApiTable,
    pub options: &'u TranslateOptions,
    module: rir::Module,
    errors: Vec<TranslateError>,
}

impl<'u> Lowerer<'u> {
    pub fn new(
        symbols: &'u SymbolTable,
        mutability: &'u MutabilityTable,
        api: &'u ApiTable,
        options: &'u TranslateOptions,
    ) -> Self {
        Self {
            symbols,
            mutability,
            api,
            options,
            module: rir::Module::new(),
            errors: Vec::new(),
        }
    }

    pub fn report(&mut self, err: TranslateError) {
        debug!(kind = ?err.kind(), "{err}");
        self.errors.push(err);
    }

    pub fn require(&mut self, dep: rir::Dependency) {
        self.module.require(dep);
    }

    pub fn require_helper(&mut self, helper: rir::RuntimeHelper) {
        self.module.require_helper(helper);
    }

    pub fn lower_program(mut self, program: &Program) -> (rir::Module, Vec<TranslateError>) {
        let mut main_stmts = Vec::new();
        for item in &program.items {
            match item {
                Item::Interface(decl) => {
                    if let Some(def) = self.interface(decl) {
                        self.module.items.push(rir::Item::Struct(def));
                    }
                }
                Item::Class(decl) => {
                    if let Some((def, block)) = self.class(decl) {
                        self.module.items.push(rir::Item::Struct(def));
                        self.module.items.push(rir::Item::Impl(block));
                    }
                }
                Item::Function(decl) => {
                    if let Some(func) = self.function(decl) {
                        self.module.items.push(rir::Item::Function(func));
                    }
                }
                Item::Stmt(stmt) => main_stmts.push(stmt),
            }
        }

        if !main_stmts.is_empty() {
            let main = self.main(&main_stmts);
            self.module.items.push(rir::Item::Function(main));
        }

        (self.module, self.errors)
    }

    /// Is `name` a library namespace here? Declarations and bindings shadow
    /// namespaces.
    pub(crate) fn is_namespace(&self, cx: &FnCtx, name: &str) -> bool {
        cx.lookup(name).is_none() && self.symbols.get(name).is_none() && self.api.is_namespace(name)
    }

    pub(crate) fn is_global(&self, cx: &FnCtx, name: &str) -> bool {
        cx.lookup(name).is_none() && self.symbols.get(name).is_none() && self.api.is_global(name)
    }
}
