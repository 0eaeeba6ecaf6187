#![forbid(unsafe_code)]

use std::collections::HashMap;

use ferrite_ast::{BinOp, Expr, ExprKind, Ident, Span, UnaryOp};
use ferrite_rir as rir;
use tracing::trace;

use super::format::FormatBuilder;
use super::{FnCtx, FnKind, Lowerer, Typed};
use crate::error::TranslateError;
use crate::mapping::{ReceiverPattern, RuleMatch};
use crate::options::AsyncFallback;
use crate::types::TargetType;

/// Turns a borrowed literal or a place into an owned value.
pub(crate) fn owned(typed: Typed) -> Typed {
    let Typed { expr, ty } = typed;
    let expr = match expr {
        rir::Expr::Lit(rir::Lit::Str(_)) => rir::Expr::OwnedText(Box::new(expr)),
        place if place.is_place() && !ty.is_copy() => rir::Expr::Clone(Box::new(place)),
        other => other,
    };
    Typed { expr, ty }
}

fn method(receiver: rir::Expr, name: &str) -> rir::Expr {
    rir::Expr::MethodCall {
        receiver: Box::new(receiver),
        method: name.to_string(),
        args: Vec::new(),
    }
}

pub(crate) fn receiver_patterns(ty: &TargetType) -> Vec<ReceiverPattern> {
    match ty {
        TargetType::Primitive(_) if ty.is_text() => vec![ReceiverPattern::Text],
        TargetType::Primitive(_) if *ty == TargetType::NUMBER => vec![ReceiverPattern::Number],
        TargetType::Sequence(elem) if elem.is_text() => {
            vec![ReceiverPattern::TextSequence, ReceiverPattern::Sequence]
        }
        TargetType::Sequence(_) => vec![ReceiverPattern::Sequence],
        _ => Vec::new(),
    }
}

/// Dotted source text of a callee, for diagnostics.
pub(crate) fn callee_text(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(id) => id.node.clone(),
        ExprKind::This => "this".to_string(),
        ExprKind::Member { object, property } => {
            format!("{}.{}", callee_text(object), property.node)
        }
        ExprKind::Index { object, .. } => format!("{}[..]", callee_text(object)),
        ExprKind::Call { callee, .. } => format!("{}(..)", callee_text(callee)),
        _ => "<expression>".to_string(),
    }
}

impl Lowerer<'_> {
    /// Lowers `e` as written. `expected` only steers literals whose type
    /// cannot be read off the expression itself.
    pub(crate) fn expr(
        &mut self,
        cx: &mut FnCtx,
        e: &Expr,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        match &e.kind {
            ExprKind::NumberLit(n) => Ok(Typed::new(rir::Expr::f64_lit(*n), TargetType::NUMBER)),
            ExprKind::StringLit(s) => {
                Ok(Typed::new(rir::Expr::str_lit(s.clone()), TargetType::TEXT))
            }
            ExprKind::BoolLit(b) => {
                Ok(Typed::new(rir::Expr::Lit(rir::Lit::Bool(*b)), TargetType::BOOLEAN))
            }
            ExprKind::Null | ExprKind::Undefined => {
                Ok(Typed::new(rir::Expr::None, TargetType::Null))
            }
            ExprKind::Ident(id) => self.ident(cx, id),
            ExprKind::This => match &cx.kind {
                FnKind::Method { class } => {
                    Ok(Typed::new(rir::Expr::SelfValue, TargetType::Named(class.clone())))
                }
                FnKind::Constructor { .. } => Err(TranslateError::unsupported(
                    "inside a constructor `this` can only be used to access fields",
                    e.span,
                )),
                _ => Err(TranslateError::unsupported("`this` outside of a class", e.span)),
            },
            ExprKind::Template { quasis, exprs } => {
                let mut b = FormatBuilder::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    b.text(quasi);
                    if let Some(arg) = exprs.get(i) {
                        let v = self.format_arg(cx, arg)?;
                        b.value(v);
                    }
                }
                Ok(Typed::new(b.finish(rir::FormatKind::Format), TargetType::TEXT))
            }
            ExprKind::ArrayLit(items) => self.array(cx, items, expected, e.span),
            ExprKind::ObjectLit(fields) => self.object(cx, fields, expected, e.span),
            ExprKind::Unary { op, expr } => match op {
                UnaryOp::Neg => {
                    let v = self.value(cx, expr, &TargetType::NUMBER)?;
                    Ok(Typed::new(
                        rir::Expr::Unary {
                            op: rir::UnaryOp::Neg,
                            expr: Box::new(v),
                        },
                        TargetType::NUMBER,
                    ))
                }
                UnaryOp::Not => {
                    let v = self.condition(cx, expr)?;
                    Ok(Typed::new(
                        rir::Expr::Unary {
                            op: rir::UnaryOp::Not,
                            expr: Box::new(v),
                        },
                        TargetType::BOOLEAN,
                    ))
                }
            },
            ExprKind::Binary { left, op, right } => self.binary(cx, left, *op, right, e.span),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.condition(cx, cond)?;
                let (then_v, else_v, ty) = match expected {
                    Some(ty) => (
                        self.value(cx, then_expr, ty)?,
                        self.value(cx, else_expr, ty)?,
                        ty.clone(),
                    ),
                    None => {
                        let then_t = self.value_any(cx, then_expr)?;
                        let else_v = self.value(cx, else_expr, &then_t.ty)?;
                        (then_t.expr, else_v, then_t.ty)
                    }
                };
                Ok(Typed::new(
                    rir::Expr::IfElse {
                        cond: Box::new(cond),
                        then_expr: Box::new(then_v),
                        else_expr: Box::new(else_v),
                    },
                    ty,
                ))
            }
            ExprKind::Member { object, property } => self.member(cx, object, property, e.span),
            ExprKind::Index { object, index } => self.index(cx, object, index, e.span),
            ExprKind::Call { callee, args } => self.call(cx, callee, args, e.span, expected),
            ExprKind::New { class, args } => self.new_instance(cx, class, args, e.span),
            ExprKind::Await(inner) => {
                if !cx.is_async {
                    return Err(TranslateError::unsupported(
                        "`await` is only allowed inside async functions",
                        e.span,
                    ));
                }
                let typed = self.expr(cx, inner, expected)?;
                match typed.ty {
                    TargetType::AsyncResult(payload) => {
                        cx.awaited = true;
                        Ok(Typed::new(rir::Expr::Await(Box::new(typed.expr)), *payload))
                    }
                    // Awaiting a plain value yields the value.
                    ty => Ok(Typed::new(typed.expr, ty)),
                }
            }
            ExprKind::Arrow { .. } => Err(TranslateError::unsupported(
                "arrow functions are only supported as callbacks of mapped library calls",
                e.span,
            )),
        }
    }

    /// Resolves a pending asynchronous result that was not awaited.
    pub(crate) fn settle(
        &mut self,
        cx: &FnCtx,
        typed: Typed,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let Typed { expr, ty } = typed;
        let payload = match ty {
            TargetType::AsyncResult(payload) => payload,
            ty => return Ok(Typed::new(expr, ty)),
        };
        if cx.is_async {
            return Err(TranslateError::unsupported(
                "the result of an asynchronous call must be awaited where it is produced",
                span,
            ));
        }
        match self.options.async_fallback {
            AsyncFallback::BlockOn => {
                self.require(rir::Dependency::Futures);
                Ok(Typed::new(rir::Expr::BlockOn(Box::new(expr)), *payload))
            }
            AsyncFallback::Reject => Err(TranslateError::unsupported(
                "asynchronous call from a synchronous function \
                 (set `async_fallback = \"block-on\"` to wait on it)",
                span,
            )),
        }
    }

    /// Lowers an operand that is read in place: no cloning, no adaptation.
    pub(crate) fn operand(
        &mut self,
        cx: &mut FnCtx,
        e: &Expr,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        let typed = self.expr(cx, e, expected)?;
        self.settle(cx, typed, e.span)
    }

    /// Lowers a consumed value of type `expected`.
    pub(crate) fn value(
        &mut self,
        cx: &mut FnCtx,
        e: &Expr,
        expected: &TargetType,
    ) -> Result<rir::Expr, TranslateError> {
        let typed = self.operand(cx, e, Some(expected))?;
        self.coerce(typed, expected, e.span)
    }

    /// Lowers a consumed value whose type is whatever the expression has.
    pub(crate) fn value_any(&mut self, cx: &mut FnCtx, e: &Expr) -> Result<Typed, TranslateError> {
        let typed = self.operand(cx, e, None)?;
        if typed.ty == TargetType::Null {
            return Err(TranslateError::unsupported(
                "cannot infer a type for `null` here; add a type annotation",
                e.span,
            ));
        }
        Ok(owned(typed))
    }

    pub(crate) fn coerce(
        &mut self,
        typed: Typed,
        expected: &TargetType,
        span: Span,
    ) -> Result<rir::Expr, TranslateError> {
        if typed.ty == *expected {
            return Ok(owned(typed).expr);
        }
        match expected {
            TargetType::Dynamic => {
                self.require(rir::Dependency::SerdeJson);
                if typed.ty == TargetType::Null {
                    Ok(rir::Expr::Path("serde_json::Value::Null".to_string()))
                } else {
                    Ok(rir::Expr::Json(Box::new(typed.expr)))
                }
            }
            TargetType::Optional(_) if typed.ty == TargetType::Null => Ok(rir::Expr::None),
            TargetType::Optional(inner) => {
                let v = self.coerce(typed, inner, span)?;
                Ok(rir::Expr::Some(Box::new(v)))
            }
            _ => Err(TranslateError::mismatch(expected, &typed.ty, span)),
        }
    }

    /// A boolean test. Optional values test for presence.
    pub(crate) fn condition(
        &mut self,
        cx: &mut FnCtx,
        e: &Expr,
    ) -> Result<rir::Expr, TranslateError> {
        let t = self.operand(cx, e, Some(&TargetType::BOOLEAN))?;
        match t.ty {
            ty if ty == TargetType::BOOLEAN => Ok(t.expr),
            TargetType::Optional(_) => Ok(method(t.expr, "is_some")),
            other => Err(TranslateError::mismatch(TargetType::BOOLEAN, other, e.span)),
        }
    }

    /// A value passed to a formatting macro, which only borrows it.
    pub(crate) fn format_arg(&mut self, cx: &mut FnCtx, e: &Expr) -> Result<Typed, TranslateError> {
        let t = self.operand(cx, e, None)?;
        if t.ty == TargetType::Null {
            return Ok(Typed::new(rir::Expr::str_lit("null"), TargetType::TEXT));
        }
        Ok(self.displayed(t))
    }

    /// Untyped values print as the source would: strings without quotes and
    /// whole numbers without a fraction.
    pub(crate) fn displayed(&mut self, t: Typed) -> Typed {
        if t.ty != TargetType::Dynamic {
            return t;
        }
        self.require_helper(rir::RuntimeHelper::JsonText);
        let expr = rir::Expr::Template {
            template: "ferrite_rt::display(&{0})".into(),
            receiver: None,
            args: vec![t.expr],
        };
        Typed::new(expr, TargetType::TEXT)
    }

    /// Text borrowed as `&str`.
    pub(crate) fn borrowed_text(
        &mut self,
        cx: &mut FnCtx,
        e: &Expr,
    ) -> Result<rir::Expr, TranslateError> {
        let t = self.operand(cx, e, Some(&TargetType::TEXT))?;
        if !t.ty.is_text() {
            return Err(TranslateError::mismatch(TargetType::TEXT, &t.ty, e.span));
        }
        if t.is_str_literal() {
            Ok(t.expr)
        } else {
            Ok(method(t.expr, "as_str"))
        }
    }

    fn ident(&mut self, cx: &FnCtx, id: &Ident) -> Result<Typed, TranslateError> {
        if let Some(b) = cx.lookup(&id.node) {
            return Ok(Typed::new(rir::Expr::local(b.rust_name.clone()), b.ty.clone()));
        }
        if self.symbols.get(&id.node).is_some() {
            return Err(TranslateError::unsupported(
                format!("`{}` names a declaration and cannot be used as a value", id.node),
                id.span,
            ));
        }
        if self.api.is_namespace(&id.node) || self.api.is_global(&id.node) {
            return Err(TranslateError::unsupported(
                format!("library name `{}` cannot be used as a value", id.node),
                id.span,
            ));
        }
        Err(TranslateError::UnresolvedName {
            name: id.node.clone(),
            span: id.span,
        })
    }

    fn array(
        &mut self,
        cx: &mut FnCtx,
        items: &[Expr],
        expected: Option<&TargetType>,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let elem = match expected {
            Some(TargetType::Sequence(elem)) => (**elem).clone(),
            _ => {
                let Some(first) = items.first() else {
                    return Err(TranslateError::unsupported(
                        "cannot infer the element type of an empty array; add a type annotation",
                        span,
                    ));
                };
                // Resolved again below; lowering is pure.
                self.value_any(cx, first)?.ty
            }
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.value(cx, item, &elem)?);
        }
        Ok(Typed::new(rir::Expr::VecLit(out), TargetType::sequence(elem)))
    }

    fn object(
        &mut self,
        cx: &mut FnCtx,
        fields: &[(Ident, Expr)],
        expected: Option<&TargetType>,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let target = match expected {
            Some(TargetType::Optional(inner)) => Some(&**inner),
            other => other,
        };
        match target {
            Some(TargetType::Named(name)) => self.struct_literal(cx, name, fields, span),
            Some(TargetType::Dynamic) | None => self.json_object(cx, fields),
            Some(other) => Err(TranslateError::mismatch(other, "object literal", span)),
        }
    }

    fn struct_literal(
        &mut self,
        cx: &mut FnCtx,
        name: &str,
        fields: &[(Ident, Expr)],
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let symbols = self.symbols;
        let (Some(symbol), Some(declared)) = (symbols.get(name), symbols.fields_of(name)) else {
            return Err(TranslateError::mismatch(name, "object literal", span));
        };

        let mut seen: HashMap<&str, Span> = HashMap::new();
        let mut out = Vec::with_capacity(declared.len());
        for (key, value) in fields {
            if let Some(&first) = seen.get(key.node.as_str()) {
                return Err(TranslateError::DuplicateDeclaration {
                    name: key.node.clone(),
                    span: key.span,
                    first,
                });
            }
            seen.insert(&key.node, key.span);
            let Some(field) = declared.iter().find(|f| f.name == key.node) else {
                return Err(TranslateError::ExtraField {
                    ty: name.to_string(),
                    field: key.node.clone(),
                    span: key.span,
                });
            };
            out.push((field.rust_name.clone(), self.value(cx, value, &field.ty)?));
        }

        for field in declared {
            if seen.contains_key(field.name.as_str()) {
                continue;
            }
            if !field.optional {
                return Err(TranslateError::MissingField {
                    ty: name.to_string(),
                    field: field.name.clone(),
                    span,
                });
            }
            out.push((field.rust_name.clone(), rir::Expr::None));
        }

        Ok(Typed::new(
            rir::Expr::StructLit {
                name: symbol.rust_name.clone(),
                fields: out,
            },
            TargetType::Named(name.to_string()),
        ))
    }

    fn json_object(
        &mut self,
        cx: &mut FnCtx,
        fields: &[(Ident, Expr)],
    ) -> Result<Typed, TranslateError> {
        self.require(rir::Dependency::SerdeJson);
        let mut seen: HashMap<&str, Span> = HashMap::new();
        let mut out = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            if let Some(&first) = seen.get(key.node.as_str()) {
                return Err(TranslateError::DuplicateDeclaration {
                    name: key.node.clone(),
                    span: key.span,
                    first,
                });
            }
            seen.insert(&key.node, key.span);
            let v = match value.kind {
                ExprKind::Null | ExprKind::Undefined => {
                    rir::Expr::Path("serde_json::Value::Null".to_string())
                }
                _ => self.value_any(cx, value)?.expr,
            };
            out.push((key.node.clone(), v));
        }
        Ok(Typed::new(rir::Expr::JsonObject(out), TargetType::Dynamic))
    }

    fn binary(
        &mut self,
        cx: &mut FnCtx,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let bin = |op: rir::BinOp, l: rir::Expr, r: rir::Expr| rir::Expr::Binary {
            op,
            left: Box::new(l),
            right: Box::new(r),
        };

        match op {
            BinOp::And | BinOp::Or => {
                let l = self.condition(cx, left)?;
                let r = self.condition(cx, right)?;
                let op = if op == BinOp::And { rir::BinOp::And } else { rir::BinOp::Or };
                Ok(Typed::new(bin(op, l, r), TargetType::BOOLEAN))
            }
            BinOp::Add => {
                let l = self.operand(cx, left, None)?;
                let r = self.operand(cx, right, None)?;
                let (lt, rt) = (l.ty.clone(), r.ty.clone());
                match (&lt, &rt) {
                    (a, b) if *a == TargetType::NUMBER && *b == TargetType::NUMBER => {
                        Ok(Typed::new(bin(rir::BinOp::Add, l.expr, r.expr), TargetType::NUMBER))
                    }
                    (a, b) if a.is_text() && b.is_text() && !l.is_str_literal() => {
                        // `String + &str`
                        let rhs = if r.is_str_literal() {
                            r.expr
                        } else {
                            rir::Expr::Ref(Box::new(r.expr))
                        };
                        let lhs = owned(l).expr;
                        Ok(Typed::new(bin(rir::BinOp::Add, lhs, rhs), TargetType::TEXT))
                    }
                    (a, b)
                        if (a.is_text() || b.is_text()) && is_displayable(a) && is_displayable(b) =>
                    {
                        let mut f = FormatBuilder::new();
                        f.value(self.displayed(l));
                        f.value(self.displayed(r));
                        Ok(Typed::new(f.finish(rir::FormatKind::Format), TargetType::TEXT))
                    }
                    (a, b) => Err(TranslateError::mismatch(a, b, span)),
                }
            }
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                let l = self.value(cx, left, &TargetType::NUMBER)?;
                let r = self.value(cx, right, &TargetType::NUMBER)?;
                let op = match op {
                    BinOp::Sub => rir::BinOp::Sub,
                    BinOp::Mul => rir::BinOp::Mul,
                    BinOp::Div => rir::BinOp::Div,
                    _ => rir::BinOp::Rem,
                };
                Ok(Typed::new(bin(op, l, r), TargetType::NUMBER))
            }
            BinOp::Eq | BinOp::Ne => self.equality(cx, left, op == BinOp::Eq, right, span),
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                let l = self.operand(cx, left, None)?;
                let r = self.operand(cx, right, Some(&l.ty))?;
                let op = match op {
                    BinOp::Lt => rir::BinOp::Lt,
                    BinOp::Gt => rir::BinOp::Gt,
                    BinOp::Le => rir::BinOp::Le,
                    _ => rir::BinOp::Ge,
                };
                if l.ty == TargetType::NUMBER && r.ty == TargetType::NUMBER {
                    return Ok(Typed::new(bin(op, l.expr, r.expr), TargetType::BOOLEAN));
                }
                if l.ty.is_text() && r.ty.is_text() {
                    let as_str = |t: Typed| {
                        if t.is_str_literal() { t.expr } else { method(t.expr, "as_str") }
                    };
                    return Ok(Typed::new(bin(op, as_str(l), as_str(r)), TargetType::BOOLEAN));
                }
                Err(TranslateError::mismatch(&l.ty, &r.ty, span))
            }
        }
    }

    fn equality(
        &mut self,
        cx: &mut FnCtx,
        left: &Expr,
        eq: bool,
        right: &Expr,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let is_null = |e: &Expr| matches!(e.kind, ExprKind::Null | ExprKind::Undefined);
        if is_null(left) || is_null(right) {
            let other = if is_null(left) { right } else { left };
            let t = self.operand(cx, other, None)?;
            let test = match t.ty {
                TargetType::Optional(_) => method(t.expr, if eq { "is_none" } else { "is_some" }),
                TargetType::Dynamic => {
                    let test = method(t.expr, "is_null");
                    if eq {
                        test
                    } else {
                        rir::Expr::Unary {
                            op: rir::UnaryOp::Not,
                            expr: Box::new(test),
                        }
                    }
                }
                TargetType::Null => rir::Expr::Lit(rir::Lit::Bool(eq)),
                other => return Err(TranslateError::mismatch("an optional value", other, span)),
            };
            return Ok(Typed::new(test, TargetType::BOOLEAN));
        }

        let l = self.operand(cx, left, None)?;
        let r = self.operand(cx, right, Some(&l.ty))?;
        if l.ty.is_object() || r.ty.is_object() {
            return Err(TranslateError::unsupported(
                "`===` on records, instances or arrays compares identity, \
                 which owned values do not have",
                span,
            ));
        }
        let op = if eq { rir::BinOp::Eq } else { rir::BinOp::Ne };
        let (lhs, rhs) = if l.ty == r.ty {
            (l.expr, r.expr)
        } else if matches!(l.ty, TargetType::Optional(_)) {
            let ty = l.ty.clone();
            (l.expr, self.coerce(r, &ty, span)?)
        } else if matches!(r.ty, TargetType::Optional(_)) {
            let ty = r.ty.clone();
            (self.coerce(l, &ty, span)?, r.expr)
        } else if (l.ty == TargetType::Dynamic && is_displayable(&r.ty))
            || (r.ty == TargetType::Dynamic && is_displayable(&l.ty))
        {
            // `serde_json::Value` compares directly against primitives.
            (l.expr, r.expr)
        } else {
            return Err(TranslateError::mismatch(&l.ty, &r.ty, span));
        };
        Ok(Typed::new(
            rir::Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            },
            TargetType::BOOLEAN,
        ))
    }

    fn member(
        &mut self,
        cx: &mut FnCtx,
        object: &Expr,
        property: &Ident,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        match &object.kind {
            ExprKind::Ident(id) if self.is_namespace(cx, &id.node) => {
                let api = self.api;
                let receivers = [ReceiverPattern::Namespace(id.node.clone())];
                return match api.lookup(&receivers, &property.node, true, 0) {
                    RuleMatch::Found(rule) => self.apply_rule(cx, rule, None, &[], span, None),
                    _ => Err(TranslateError::unsupported(
                        format!("no mapping for `{}.{}`", id.node, property.node),
                        span,
                    )),
                };
            }
            ExprKind::This => return self.this_field(cx, property),
            _ => {}
        }
        let recv = self.operand(cx, object, None)?;
        self.property_of(cx, recv, property, span)
    }

    pub(crate) fn this_field(
        &mut self,
        cx: &FnCtx,
        property: &Ident,
    ) -> Result<Typed, TranslateError> {
        match &cx.kind {
            FnKind::Method { class } => {
                let fields = self.symbols.fields_of(class).unwrap_or_default();
                match fields.iter().find(|f| f.name == property.node) {
                    Some(f) => Ok(Typed::new(
                        rir::Expr::Field {
                            base: Box::new(rir::Expr::SelfValue),
                            name: f.rust_name.clone(),
                        },
                        f.ty.clone(),
                    )),
                    None => Err(TranslateError::ExtraField {
                        ty: class.clone(),
                        field: property.node.clone(),
                        span: property.span,
                    }),
                }
            }
            FnKind::Constructor { class } => match cx.ctor_fields.get(&property.node) {
                Some(f) if f.initialized => {
                    Ok(Typed::new(rir::Expr::local(f.local.clone()), f.ty.clone()))
                }
                Some(_) => Err(TranslateError::unsupported(
                    format!("`this.{}` is read before it is initialized", property.node),
                    property.span,
                )),
                None => Err(TranslateError::ExtraField {
                    ty: class.clone(),
                    field: property.node.clone(),
                    span: property.span,
                }),
            },
            _ => Err(TranslateError::unsupported("`this` outside of a class", property.span)),
        }
    }

    pub(crate) fn property_of(
        &mut self,
        cx: &mut FnCtx,
        recv: Typed,
        property: &Ident,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        match &recv.ty {
            TargetType::Named(name) => {
                let fields = self.symbols.fields_of(name).unwrap_or_default();
                match fields.iter().find(|f| f.name == property.node) {
                    Some(f) => Ok(Typed::new(
                        rir::Expr::Field {
                            base: Box::new(recv.expr),
                            name: f.rust_name.clone(),
                        },
                        f.ty.clone(),
                    )),
                    None => Err(TranslateError::ExtraField {
                        ty: name.clone(),
                        field: property.node.clone(),
                        span: property.span,
                    }),
                }
            }
            TargetType::Dynamic => {
                trace!(property = %property.node, "dynamic member read");
                Ok(Typed::new(
                    rir::Expr::Template {
                        template: format!("{{recv}}[{:?}].clone()", property.node),
                        receiver: Some(Box::new(recv.expr)),
                        args: Vec::new(),
                    },
                    TargetType::Dynamic,
                ))
            }
            TargetType::Optional(_) => Err(TranslateError::unsupported(
                format!("value may be null; check it before reading `.{}`", property.node),
                span,
            )),
            ty => {
                let receivers = receiver_patterns(ty);
                let api = self.api;
                match api.lookup(&receivers, &property.node, true, 0) {
                    RuleMatch::Found(rule) => {
                        self.apply_rule(cx, rule, Some(recv), &[], span, None)
                    }
                    _ => Err(TranslateError::unsupported(
                        format!("no mapping for property `{}` on {ty}", property.node),
                        span,
                    )),
                }
            }
        }
    }

    fn index(
        &mut self,
        cx: &mut FnCtx,
        object: &Expr,
        index: &Expr,
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let recv = self.operand(cx, object, None)?;
        match recv.ty {
            TargetType::Sequence(elem) => {
                let i = self.value(cx, index, &TargetType::NUMBER)?;
                Ok(Typed::new(
                    rir::Expr::Index {
                        base: Box::new(recv.expr),
                        index: Box::new(i),
                    },
                    *elem,
                ))
            }
            TargetType::Dynamic => {
                let i = self.value(cx, index, &TargetType::NUMBER)?;
                Ok(Typed::new(
                    rir::Expr::Template {
                        template: "{recv}[{0} as usize].clone()".to_string(),
                        receiver: Some(Box::new(recv.expr)),
                        args: vec![i],
                    },
                    TargetType::Dynamic,
                ))
            }
            other => Err(TranslateError::mismatch("an array", other, span)),
        }
    }
}

fn is_displayable(ty: &TargetType) -> bool {
    *ty == TargetType::NUMBER
        || *ty == TargetType::BOOLEAN
        || ty.is_text()
        || *ty == TargetType::Dynamic
}
