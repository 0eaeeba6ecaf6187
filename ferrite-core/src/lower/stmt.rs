#![forbid(unsafe_code)]

use ferrite_ast::{self as ast, AssignOp, ExprKind};
use ferrite_rir as rir;

use super::expr::callee_text;
use super::format::FormatBuilder;
use super::{Binding, FnCtx, FnKind, Lowerer, Typed};
use crate::error::TranslateError;
use crate::naming::value_name;
use crate::types::{TargetType, TypeMapper, TypePosition};

impl Lowerer<'_> {
    pub(crate) fn block(&mut self, cx: &mut FnCtx, block: &ast::Block) -> rir::Block {
        cx.push_scope();
        let stmts = self.stmts(cx, &block.stmts);
        cx.pop_scope();
        rir::Block { stmts }
    }

    /// Lowers statements in the current scope. A failing statement is
    /// reported and skipped.
    pub(crate) fn stmts(&mut self, cx: &mut FnCtx, stmts: &[ast::Stmt]) -> Vec<rir::Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match self.stmt(cx, stmt) {
                Ok(s) => out.push(s),
                Err(err) => self.report(err),
            }
        }
        out
    }

    pub(crate) fn stmt(
        &mut self,
        cx: &mut FnCtx,
        stmt: &ast::Stmt,
    ) -> Result<rir::Stmt, TranslateError> {
        match stmt {
            ast::Stmt::Let(s) => self.let_stmt(cx, s),
            ast::Stmt::Assign(s) => self.assign(cx, s),
            ast::Stmt::If(s) => self.if_stmt(cx, s),
            ast::Stmt::While(s) => {
                let cond = self.condition(cx, &s.cond)?;
                let body = self.block(cx, &s.body);
                Ok(rir::Stmt::While { cond, body })
            }
            ast::Stmt::Return(s) => self.return_stmt(cx, s),
            ast::Stmt::Block(b) => Ok(rir::Stmt::Block(self.block(cx, b))),
            ast::Stmt::Expr(e) => {
                let t = self.operand(cx, e, None)?;
                Ok(rir::Stmt::Expr(t.expr))
            }
        }
    }

    fn let_stmt(&mut self, cx: &mut FnCtx, s: &ast::LetStmt) -> Result<rir::Stmt, TranslateError> {
        let rust_name = value_name(&s.name.node);
        let mutable = self.mutability.binding(&s.name).is_mutable();
        let written = self.mutability.mutated_in_place(s.name.span);

        let lowered = self.let_value(cx, s);
        // Bind even on failure so later uses do not cascade into more errors.
        let ty = match &lowered {
            Ok((_, ty, _)) => ty.clone(),
            Err(_) => TargetType::Dynamic,
        };
        let aliasing = match (&lowered, &s.init) {
            (Ok(_), Some(init)) => self.second_name(cx, &s.name.node, written, &ty, init),
            _ => Ok(()),
        };
        cx.bind(&s.name.node, Binding::owned(rust_name.clone(), ty, mutable, written));
        aliasing?;

        let (init, _, declared) = lowered?;
        Ok(rir::Stmt::Let {
            name: rust_name,
            mutable,
            ty: declared.map(|t| t.to_rir()),
            init,
        })
    }

    /// `name = source` where `source` names an existing record, instance or
    /// array. The source shares one value between both names; the Rust copy
    /// is only faithful if neither name is written through.
    fn second_name(
        &self,
        cx: &FnCtx,
        name: &str,
        written: bool,
        ty: &TargetType,
        source: &ast::Expr,
    ) -> Result<(), TranslateError> {
        if !ty.is_object() {
            return Ok(());
        }
        let source_written = match place_root(source) {
            Some(ExprKind::Ident(id)) => cx.lookup(&id.node).is_some_and(|b| b.written),
            Some(ExprKind::This) => match (&cx.kind, this_field(source)) {
                (FnKind::Constructor { class }, Some(field)) => {
                    self.mutability.ctor_field(class, field).is_mutable()
                }
                _ => cx.self_written,
            },
            _ => return Ok(()),
        };
        if !written && !source_written {
            return Ok(());
        }
        let source_text = callee_text(source);
        Err(TranslateError::unsupported(
            format!(
                "`{name}` would be a copy of `{source_text}`, \
                 and one of them is modified in place; use `{source_text}` directly"
            ),
            source.span,
        ))
    }

    /// Initializer, binding type and annotated type of a declaration.
    fn let_value(
        &mut self,
        cx: &mut FnCtx,
        s: &ast::LetStmt,
    ) -> Result<(Option<rir::Expr>, TargetType, Option<TargetType>), TranslateError> {
        let declared = match &s.ty {
            Some(ann) => Some(TypeMapper::new(self.symbols).map(ann, TypePosition::Value)?),
            None => None,
        };
        match (&s.init, declared) {
            (Some(init), Some(ty)) => {
                let v = self.value(cx, init, &ty)?;
                Ok((Some(v), ty.clone(), Some(ty)))
            }
            (Some(init), None) => {
                let t = self.value_any(cx, init)?;
                Ok((Some(t.expr), t.ty, None))
            }
            (None, Some(ty)) => Ok((None, ty.clone(), Some(ty))),
            (None, None) => Err(TranslateError::unsupported(
                format!("`{}` needs a type annotation or an initializer", s.name.node),
                s.span,
            )),
        }
    }

    fn assign(&mut self, cx: &mut FnCtx, s: &ast::AssignStmt) -> Result<rir::Stmt, TranslateError> {
        if let ExprKind::Ident(id) = &s.target.kind {
            if cx.lookup(&id.node).is_some_and(Binding::is_borrowed) {
                return Err(TranslateError::unsupported(
                    format!(
                        "cannot reassign parameter `{}`: it refers to the caller's value; \
                         declare a new local instead",
                        id.node
                    ),
                    s.target.span,
                ));
            }
        }
        let target = self.place(cx, &s.target)?;
        let op = match s.op {
            AssignOp::Assign => None,
            AssignOp::Add => Some(rir::BinOp::Add),
            AssignOp::Sub => Some(rir::BinOp::Sub),
            AssignOp::Mul => Some(rir::BinOp::Mul),
            AssignOp::Div => Some(rir::BinOp::Div),
        };

        let value = match op {
            None => {
                if let ExprKind::Ident(id) = &s.target.kind {
                    let written = cx.lookup(&id.node).is_some_and(|b| b.written);
                    self.second_name(cx, &id.node, written, &target.ty, &s.value)?;
                }
                self.value(cx, &s.value, &target.ty)?
            }
            Some(rir::BinOp::Add) if target.ty.is_text() => {
                // `s += &rhs`
                let v = self.operand(cx, &s.value, Some(&TargetType::TEXT))?;
                if v.is_str_literal() {
                    v.expr
                } else if v.ty.is_text() {
                    rir::Expr::Ref(Box::new(v.expr))
                } else if v.ty == TargetType::NUMBER || v.ty == TargetType::BOOLEAN {
                    let mut f = FormatBuilder::new();
                    f.value(v);
                    rir::Expr::Ref(Box::new(f.finish(rir::FormatKind::Format)))
                } else {
                    return Err(TranslateError::mismatch(TargetType::TEXT, &v.ty, s.value.span));
                }
            }
            Some(_) => {
                if target.ty != TargetType::NUMBER {
                    let span = s.target.span;
                    return Err(TranslateError::mismatch(TargetType::NUMBER, &target.ty, span));
                }
                self.value(cx, &s.value, &TargetType::NUMBER)?
            }
        };

        Ok(rir::Stmt::Assign {
            target: target.expr,
            op,
            value,
        })
    }

    /// An assignable location.
    fn place(&mut self, cx: &mut FnCtx, e: &ast::Expr) -> Result<Typed, TranslateError> {
        let typed = match &e.kind {
            ExprKind::Ident(id) => match cx.lookup(&id.node) {
                Some(b) => Typed::new(rir::Expr::local(b.rust_name.clone()), b.ty.clone()),
                None if self.symbols.get(&id.node).is_some() => {
                    return Err(TranslateError::unsupported(
                        format!("cannot assign to declaration `{}`", id.node),
                        e.span,
                    ));
                }
                None => {
                    return Err(TranslateError::UnresolvedName {
                        name: id.node.clone(),
                        span: id.span,
                    });
                }
            },
            ExprKind::Member { object, property } if matches!(object.kind, ExprKind::This) => {
                self.this_field(cx, property)?
            }
            ExprKind::Member { object, property } => {
                let base = self.place(cx, object)?;
                self.property_of(cx, base, property, e.span)?
            }
            ExprKind::Index { object, index } => {
                let base = self.place(cx, object)?;
                let elem = match base.ty {
                    TargetType::Sequence(elem) => *elem,
                    other => return Err(TranslateError::mismatch("an array", other, object.span)),
                };
                let i = self.value(cx, index, &TargetType::NUMBER)?;
                Typed::new(
                    rir::Expr::Index {
                        base: Box::new(base.expr),
                        index: Box::new(i),
                    },
                    elem,
                )
            }
            _ => return Err(TranslateError::unsupported("invalid assignment target", e.span)),
        };
        if !typed.expr.is_place() {
            return Err(TranslateError::unsupported("invalid assignment target", e.span));
        }
        Ok(typed)
    }

    fn if_stmt(&mut self, cx: &mut FnCtx, s: &ast::IfStmt) -> Result<rir::Stmt, TranslateError> {
        let cond = self.condition(cx, &s.cond)?;
        let then_block = self.block(cx, &s.then_block);
        let else_branch = match s.else_branch.as_deref() {
            None => None,
            Some(ast::Stmt::If(inner)) => Some(rir::Else::If(Box::new(self.if_stmt(cx, inner)?))),
            Some(ast::Stmt::Block(b)) => Some(rir::Else::Block(self.block(cx, b))),
            Some(other) => {
                cx.push_scope();
                let lowered = self.stmt(cx, other);
                cx.pop_scope();
                Some(rir::Else::Block(rir::Block {
                    stmts: vec![lowered?],
                }))
            }
        };
        Ok(rir::Stmt::If {
            cond,
            then_block,
            else_branch,
        })
    }

    fn return_stmt(
        &mut self,
        cx: &mut FnCtx,
        s: &ast::ReturnStmt,
    ) -> Result<rir::Stmt, TranslateError> {
        match cx.kind {
            FnKind::Constructor { .. } => {
                return Err(TranslateError::unsupported(
                    "`return` inside a constructor is not supported",
                    s.span,
                ));
            }
            FnKind::Main if s.value.is_some() => {
                return Err(TranslateError::unsupported(
                    "top-level code cannot return a value",
                    s.span,
                ));
            }
            _ => {}
        }

        let Some(value) = &s.value else {
            if cx.ret != TargetType::UNIT {
                return Err(TranslateError::mismatch(&cx.ret, TargetType::UNIT, s.span));
            }
            return Ok(rir::Stmt::Return(None));
        };
        if !cx.ret_declared {
            return Err(TranslateError::unsupported(
                "a function that returns a value must declare its return type",
                s.span,
            ));
        }

        let ret = cx.ret.clone();
        let v = self.value(cx, value, &ret)?;
        // An owned local is dead after `return`; move it instead of cloning.
        let owned_local = match &value.kind {
            ExprKind::Ident(id) => cx.lookup(&id.node).is_some_and(|b| !b.is_borrowed()),
            _ => false,
        };
        let v = match v {
            rir::Expr::Clone(inner) if owned_local && matches!(*inner, rir::Expr::Local(_)) => {
                *inner
            }
            other => other,
        };
        Ok(rir::Stmt::Return(Some(v)))
    }
}

/// The variable or `this` a place expression starts from.
fn place_root(e: &ast::Expr) -> Option<&ExprKind> {
    match &e.kind {
        kind @ (ExprKind::Ident(_) | ExprKind::This) => Some(kind),
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => place_root(object),
        _ => None,
    }
}

/// `this.f`, `this.f.g`, `this.f[i]` → `f`.
pub(super) fn this_field(e: &ast::Expr) -> Option<&str> {
    match &e.kind {
        ExprKind::Member { object, property } if matches!(object.kind, ExprKind::This) => {
            Some(&property.node)
        }
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => this_field(object),
        _ => None,
    }
}
