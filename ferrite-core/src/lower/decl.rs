#![forbid(unsafe_code)]

use std::collections::HashMap;

use ferrite_ast::{self as ast, AssignOp, ExprKind};
use ferrite_rir as rir;
use tracing::debug;

use super::context::CtorField;
use super::{Binding, FnCtx, FnKind, Lowerer};
use crate::error::TranslateError;
use crate::mutability::ReceiverAccess;
use crate::naming::{snake_case, value_name};
use crate::symbols::{FieldSig, FnSig, ParamSig, Symbol};
use crate::types::TargetType;

impl<'u> Lowerer<'u> {
    /// The declaration's own symbol, or `None` for a rejected duplicate.
    fn own_symbol(&self, name: &ast::Ident) -> Option<&'u Symbol> {
        let symbols = self.symbols;
        symbols.get(&name.node).filter(|s| s.span == name.span)
    }

    pub(crate) fn interface(&mut self, decl: &ast::InterfaceDecl) -> Option<rir::StructDef> {
        let symbols = self.symbols;
        let symbol = self.own_symbol(&decl.name)?;
        let record = symbols.record(&decl.name.node)?;
        self.require(rir::Dependency::Serde);

        debug!(name = %decl.name.node, fields = record.fields.len(), "lowering interface");
        Some(rir::StructDef {
            name: symbol.rust_name.clone(),
            span: decl.span,
            public: symbol.exported,
            serializable: true,
            fields: struct_fields(&record.fields),
        })
    }

    pub(crate) fn class(
        &mut self,
        decl: &ast::ClassDecl,
    ) -> Option<(rir::StructDef, rir::ImplBlock)> {
        let symbols = self.symbols;
        let symbol = self.own_symbol(&decl.name)?;
        let sig = symbols.class(&decl.name.node)?;

        debug!(name = %decl.name.node, methods = decl.methods.len(), "lowering class");
        let def = rir::StructDef {
            name: symbol.rust_name.clone(),
            span: decl.span,
            public: symbol.exported,
            serializable: false,
            fields: struct_fields(&sig.fields),
        };

        let mut functions = Vec::with_capacity(decl.methods.len() + 1);
        functions.push(self.constructor(decl, symbol));
        for method in &decl.methods {
            // Rejected duplicates have no signature.
            let Some(msig) = sig.methods.iter().find(|m| m.span == method.name.span) else {
                continue;
            };
            functions.push(self.method(decl, symbol, method, &msig.rust_name, &msig.sig));
        }

        Some((
            def,
            rir::ImplBlock {
                self_ty: symbol.rust_name.clone(),
                functions,
            },
        ))
    }

    pub(crate) fn function(&mut self, decl: &ast::FunctionDecl) -> Option<rir::Function> {
        let symbols = self.symbols;
        let symbol = self.own_symbol(&decl.name)?;
        let sig = symbols.function(&decl.name.node)?;

        debug!(name = %decl.name.node, is_async = sig.is_async, "lowering function");
        let mut cx = FnCtx::new(
            FnKind::Function,
            sig.is_async,
            sig.ret.payload().clone(),
            sig.ret_declared,
        );
        let params = self.params(&mut cx, &decl.params, &sig.params);
        let stmts = self.stmts(&mut cx, &decl.body.stmts);

        Some(rir::Function {
            name: symbol.rust_name.clone(),
            span: decl.span,
            public: symbol.exported,
            is_async: sig.is_async,
            attrs: Vec::new(),
            receiver: None,
            params,
            ret: cx.ret.to_rir(),
            body: rir::Block { stmts },
        })
    }

    fn method(
        &mut self,
        class: &ast::ClassDecl,
        symbol: &Symbol,
        decl: &ast::MethodDecl,
        rust_name: &str,
        sig: &FnSig,
    ) -> rir::Function {
        let mut cx = FnCtx::new(
            FnKind::Method {
                class: class.name.node.clone(),
            },
            sig.is_async,
            sig.ret.payload().clone(),
            sig.ret_declared,
        );
        let receiver = match self.mutability.receiver(&class.name.node, &decl.name.node) {
            ReceiverAccess::Shared => rir::Receiver::Shared,
            ReceiverAccess::Exclusive => rir::Receiver::Exclusive,
        };
        cx.self_written = receiver == rir::Receiver::Exclusive;
        let params = self.params(&mut cx, &decl.params, &sig.params);
        let stmts = self.stmts(&mut cx, &decl.body.stmts);

        rir::Function {
            name: rust_name.to_string(),
            span: decl.span,
            public: symbol.exported,
            is_async: sig.is_async,
            attrs: Vec::new(),
            receiver: Some(receiver),
            params,
            ret: cx.ret.to_rir(),
            body: rir::Block { stmts },
        }
    }

    /// `new`: every field lives in a `this_*` local until the instance is
    /// assembled at the end.
    fn constructor(&mut self, class: &ast::ClassDecl, symbol: &Symbol) -> rir::Function {
        let symbols = self.symbols;
        let class_name = class.name.node.as_str();
        let (fields, param_sigs) = match symbols.class(class_name) {
            Some(sig) => (sig.fields.as_slice(), sig.ctor_params.as_slice()),
            None => (&[][..], &[][..]),
        };
        let span = class.constructor.as_ref().map_or(class.span, |c| c.span);

        let mut cx = FnCtx::new(
            FnKind::Constructor {
                class: class_name.to_string(),
            },
            false,
            TargetType::UNIT,
            false,
        );
        let no_params = Vec::new();
        let ast_params = class.constructor.as_ref().map_or(&no_params, |c| &c.params);
        let params = self.params(&mut cx, ast_params, param_sigs);

        let mut ctor_fields = HashMap::with_capacity(fields.len());
        for field in fields {
            ctor_fields.insert(
                field.name.clone(),
                CtorField {
                    local: format!("this_{}", snake_case(&field.name)),
                    ty: field.ty.clone(),
                    initialized: false,
                },
            );
        }
        cx.ctor_fields = ctor_fields;

        let mut stmts = Vec::new();

        // Initializers and optional fields seed their locals up front.
        for decl in &class.fields {
            let Some(field) = fields.iter().find(|f| f.span == decl.name.span) else {
                continue;
            };
            let init = match &decl.init {
                Some(init) => match self.value(&mut cx, init, &field.ty) {
                    Ok(v) => Some(v),
                    Err(err) => {
                        self.report(err);
                        None
                    }
                },
                None if field.optional => Some(rir::Expr::None),
                None => continue,
            };
            let local = self.init_ctor_field(&mut cx, &field.name);
            if let Some(init) = init {
                stmts.push(self.ctor_let(class_name, field, local, init));
            }
        }

        if let Some(ctor) = &class.constructor {
            for stmt in &ctor.body.stmts {
                let lowered = match first_field_write(&cx, stmt) {
                    Some((property, value)) => {
                        self.ctor_field_write(&mut cx, class_name, fields, property, value)
                    }
                    None => self.stmt(&mut cx, stmt),
                };
                match lowered {
                    Ok(s) => stmts.push(s),
                    Err(err) => self.report(err),
                }
            }
        }

        let mut lit_fields = Vec::with_capacity(fields.len());
        for field in fields {
            match cx.ctor_fields.get(&field.name) {
                Some(f) if f.initialized => {
                    lit_fields.push((field.rust_name.clone(), rir::Expr::local(f.local.clone())));
                }
                _ => self.report(TranslateError::MissingField {
                    ty: class_name.to_string(),
                    field: field.name.clone(),
                    span: field.span,
                }),
            }
        }
        stmts.push(rir::Stmt::Return(Some(rir::Expr::StructLit {
            name: "Self".to_string(),
            fields: lit_fields,
        })));

        rir::Function {
            name: "new".to_string(),
            span,
            public: symbol.exported,
            is_async: false,
            attrs: Vec::new(),
            receiver: None,
            params,
            ret: rir::Type::Named(symbol.rust_name.clone()),
            body: rir::Block { stmts },
        }
    }

    /// `this.f = value;` for a field that has no local yet.
    fn ctor_field_write(
        &mut self,
        cx: &mut FnCtx,
        class: &str,
        fields: &[FieldSig],
        property: &ast::Ident,
        value: &ast::Expr,
    ) -> Result<rir::Stmt, TranslateError> {
        let Some(field) = fields.iter().find(|f| f.name == property.node) else {
            return Err(TranslateError::ExtraField {
                ty: class.to_string(),
                field: property.node.clone(),
                span: property.span,
            });
        };
        let lowered = self.value(cx, value, &field.ty);
        // Mark the field even on failure so it is not also reported missing.
        let local = self.init_ctor_field(cx, &field.name);
        Ok(self.ctor_let(class, field, local, lowered?))
    }

    fn init_ctor_field(&mut self, cx: &mut FnCtx, field: &str) -> String {
        match cx.ctor_fields.get_mut(field) {
            Some(f) => {
                f.initialized = true;
                f.local.clone()
            }
            None => format!("this_{}", snake_case(field)),
        }
    }

    fn ctor_let(&self, class: &str, field: &FieldSig, local: String, init: rir::Expr) -> rir::Stmt {
        rir::Stmt::Let {
            name: local,
            mutable: self.mutability.ctor_field(class, &field.name).is_mutable(),
            ty: Some(field.ty.to_rir()),
            init: Some(init),
        }
    }

    /// Binds parameters in `cx`. Parameters rejected as duplicates during
    /// resolution have no signature and are dropped.
    fn params(
        &mut self,
        cx: &mut FnCtx,
        params: &[ast::Param],
        sigs: &[ParamSig],
    ) -> Vec<rir::Param> {
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            let Some(sig) = sigs.iter().find(|s| s.span == param.name.span) else {
                continue;
            };
            let rust_name = value_name(&param.name.node);
            let passing = self.passing(sig);
            // Reassigning a borrowed parameter is rejected where it happens.
            let mutable = passing == rir::Passing::Value
                && self.mutability.binding(&param.name).is_mutable();
            cx.bind(
                &param.name.node,
                Binding {
                    rust_name: rust_name.clone(),
                    ty: sig.ty.clone(),
                    passing,
                    mutable,
                    written: self.mutability.mutated_in_place(param.name.span),
                },
            );
            out.push(rir::Param {
                name: rust_name,
                mutable,
                passing,
                ty: sig.ty.to_rir(),
            });
        }
        out
    }

    /// Records, instances and arrays are borrowed so that writes through the
    /// parameter reach the caller's value.
    pub(crate) fn passing(&self, param: &ParamSig) -> rir::Passing {
        if !param.ty.is_object() {
            rir::Passing::Value
        } else if self.mutability.mutated_in_place(param.span) {
            rir::Passing::Exclusive
        } else {
            rir::Passing::Shared
        }
    }

    /// The generated entry point holding unit-scope statements.
    pub(crate) fn main(&mut self, stmts: &[&ast::Stmt]) -> rir::Function {
        let mut cx = FnCtx::new(FnKind::Main, true, TargetType::UNIT, false);
        let mut body = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match self.stmt(&mut cx, stmt) {
                Ok(s) => body.push(s),
                Err(err) => self.report(err),
            }
        }

        let mut attrs = Vec::new();
        if cx.awaited {
            self.require(rir::Dependency::Tokio);
            attrs.push("tokio::main".to_string());
        }
        debug!(stmts = stmts.len(), is_async = cx.awaited, "lowering unit statements");

        let span = match (stmts.first(), stmts.last()) {
            (Some(first), Some(last)) => ast::join(first.span(), last.span()),
            _ => ast::span(0, 0),
        };
        rir::Function {
            name: "main".to_string(),
            span,
            public: false,
            is_async: cx.awaited,
            attrs,
            receiver: None,
            params: Vec::new(),
            ret: rir::Type::Unit,
            body: rir::Block { stmts: body },
        }
    }
}

fn struct_fields(fields: &[FieldSig]) -> Vec<rir::FieldDef> {
    fields
        .iter()
        .map(|f| rir::FieldDef {
            name: f.rust_name.clone(),
            ty: f.ty.to_rir(),
        })
        .collect()
}

/// A top-level `this.f = value;` that initializes `f`.
fn first_field_write<'a>(
    cx: &FnCtx,
    stmt: &'a ast::Stmt,
) -> Option<(&'a ast::Ident, &'a ast::Expr)> {
    let ast::Stmt::Assign(s) = stmt else {
        return None;
    };
    if s.op != AssignOp::Assign {
        return None;
    }
    let ExprKind::Member { object, property } = &s.target.kind else {
        return None;
    };
    if !matches!(object.kind, ExprKind::This) {
        return None;
    }
    match cx.ctor_fields.get(&property.node) {
        Some(f) if f.initialized => None,
        // Unknown fields go through the write path too, which reports them.
        _ => Some((property, &s.value)),
    }
}
