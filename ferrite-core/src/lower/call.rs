#![forbid(unsafe_code)]

//! Call resolution. Library calls are table lookups; user functions and
//! methods are the only hard-coded case.

use ferrite_ast::{Expr, ExprKind, Ident, Span};
use ferrite_rir as rir;
use tracing::trace;

use super::expr::{callee_text, receiver_patterns};
use super::format::FormatBuilder;
use super::stmt::this_field;
use super::{Binding, FnCtx, FnKind, Lowerer, Typed};
use crate::error::TranslateError;
use crate::mapping::{ArgTransform, MappingRule, ReceiverPattern, ResultType, Rewrite, RuleMatch};
use crate::mutability::ReceiverAccess;
use crate::naming::value_name;
use crate::symbols::{FnSig, Signature, SymbolKind};
use crate::types::{TargetType, TypeMapper, TypePosition};

impl Lowerer<'_> {
    pub(crate) fn call(
        &mut self,
        cx: &mut FnCtx,
        callee: &Expr,
        args: &[Expr],
        span: Span,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        match &callee.kind {
            ExprKind::Member { object, property } => {
                self.method_call(cx, object, property, args, span, expected)
            }
            ExprKind::Ident(id) => self.function_call(cx, id, args, span, expected),
            _ => Err(TranslateError::UnsupportedCall {
                callee: callee_text(callee),
                span,
            }),
        }
    }

    /// Arguments for a user function, constructor or method. Omitted
    /// trailing optional parameters are passed as `None`; records, instances
    /// and arrays are borrowed. `receiver` is the method receiver and whether
    /// the method writes through it.
    pub(crate) fn call_args(
        &mut self,
        cx: &mut FnCtx,
        callee: &str,
        sig: &FnSig,
        receiver: Option<(&Expr, bool)>,
        args: &[Expr],
        span: Span,
    ) -> Result<Vec<rir::Expr>, TranslateError> {
        if !sig.accepts(args.len()) {
            return Err(TranslateError::ArityMismatch {
                callee: callee.to_string(),
                expected: sig.arity_text(),
                found: args.len(),
                span,
            });
        }
        let mut borrows = Vec::new();
        if let Some((object, exclusive)) = receiver {
            borrows.extend(Borrow::of(object, exclusive));
        }
        let mut out = Vec::with_capacity(sig.params.len());
        for (i, param) in sig.params.iter().enumerate() {
            let Some(arg) = args.get(i) else {
                out.push(rir::Expr::None);
                continue;
            };
            let v = match self.passing(param) {
                rir::Passing::Value => self.value(cx, arg, &param.ty)?,
                passing => {
                    let exclusive = passing == rir::Passing::Exclusive;
                    borrows.extend(Borrow::of(arg, exclusive));
                    self.borrowed(cx, arg, &param.ty, exclusive)?
                }
            };
            out.push(v);
        }
        check_borrows(callee, &borrows)?;
        Ok(out)
    }

    /// `&arg` or `&mut arg` for a parameter that borrows the caller's value.
    fn borrowed(
        &mut self,
        cx: &mut FnCtx,
        arg: &Expr,
        ty: &TargetType,
        exclusive: bool,
    ) -> Result<rir::Expr, TranslateError> {
        let t = self.operand(cx, arg, Some(ty))?;
        if t.ty != *ty {
            return Err(TranslateError::mismatch(ty, &t.ty, arg.span));
        }
        if exclusive {
            self.writable(cx, arg)?;
        }
        // `self` and borrowed parameters are references already.
        let reference = match &arg.kind {
            ExprKind::This => true,
            ExprKind::Ident(id) => cx.lookup(&id.node).is_some_and(Binding::is_borrowed),
            _ => false,
        };
        Ok(match (reference, exclusive) {
            (true, _) => t.expr,
            (false, true) => rir::Expr::RefMut(Box::new(t.expr)),
            (false, false) => rir::Expr::Ref(Box::new(t.expr)),
        })
    }

    /// Checks that `e` may be written through.
    fn writable(&self, cx: &FnCtx, e: &Expr) -> Result<(), TranslateError> {
        let Some(id) = root_ident(e) else {
            return Ok(());
        };
        match cx.lookup(&id.node) {
            Some(b) if b.passing == rir::Passing::Shared => Err(TranslateError::unsupported(
                format!("parameter `{}` is borrowed read-only here", id.node),
                e.span,
            )),
            Some(b) if b.passing == rir::Passing::Value && !b.mutable => {
                Err(TranslateError::unsupported(
                    format!(
                        "`{}` holds a copy of an array element; \
                         writing through it would not change the array",
                        id.node
                    ),
                    e.span,
                ))
            }
            _ => Ok(()),
        }
    }

    fn function_call(
        &mut self,
        cx: &mut FnCtx,
        id: &Ident,
        args: &[Expr],
        span: Span,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        let unsupported = || TranslateError::UnsupportedCall {
            callee: id.node.clone(),
            span,
        };
        if cx.lookup(&id.node).is_some() {
            return Err(unsupported());
        }

        let symbols = self.symbols;
        if let Some(symbol) = symbols.get(&id.node) {
            return match &symbol.signature {
                Signature::Function(sig) => {
                    let args = self.call_args(cx, &id.node, sig, None, args, span)?;
                    trace!(callee = %id.node, "user function call");
                    Ok(Typed::new(
                        rir::Expr::Call {
                            func: symbol.rust_name.clone(),
                            args,
                        },
                        sig.ret.clone(),
                    ))
                }
                _ if symbol.kind == SymbolKind::Class => Err(TranslateError::unsupported(
                    format!("class `{}` must be constructed with `new`", id.node),
                    span,
                )),
                _ => Err(unsupported()),
            };
        }

        if self.is_global(cx, &id.node) {
            let api = self.api;
            return match api.lookup(&[ReceiverPattern::Global], &id.node, false, args.len()) {
                RuleMatch::Found(rule) => self.apply_rule(cx, rule, None, args, span, expected),
                RuleMatch::WrongArity(rule) => Err(TranslateError::ArityMismatch {
                    callee: id.node.clone(),
                    expected: rule.arity_text(),
                    found: args.len(),
                    span,
                }),
                RuleMatch::NotFound => Err(unsupported()),
            };
        }

        Err(unsupported())
    }

    fn method_call(
        &mut self,
        cx: &mut FnCtx,
        object: &Expr,
        property: &Ident,
        args: &[Expr],
        span: Span,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        let symbols = self.symbols;
        let name = property.node.as_str();

        match &object.kind {
            ExprKind::Ident(id) if self.is_namespace(cx, &id.node) => {
                let receivers = [ReceiverPattern::Namespace(id.node.clone())];
                let callee = format!("{}.{name}", id.node);
                return self.table_call(cx, &receivers, &callee, name, None, args, span, expected);
            }
            // An undeclared receiver that no row knows: an unmapped library.
            ExprKind::Ident(id)
                if cx.lookup(&id.node).is_none() && symbols.get(&id.node).is_none() =>
            {
                return Err(TranslateError::UnsupportedCall {
                    callee: format!("{}.{name}", id.node),
                    span,
                });
            }
            ExprKind::This => return self.self_method_call(cx, property, args, span),
            _ => {}
        }

        let recv = self.operand(cx, object, None)?;
        if let TargetType::Named(class) = &recv.ty {
            let callee = format!("{class}.{name}");
            let Some(method) = symbols.method(class, name) else {
                return Err(TranslateError::UnsupportedCall { callee, span });
            };
            let exclusive = self.mutability.receiver(class, name) == ReceiverAccess::Exclusive;
            if exclusive {
                self.writable(cx, object)?;
            }
            let receiver = Some((object, exclusive));
            let args = self.call_args(cx, &callee, &method.sig, receiver, args, span)?;
            return Ok(Typed::new(
                rir::Expr::MethodCall {
                    receiver: Box::new(recv.expr),
                    method: method.rust_name.clone(),
                    args,
                },
                method.sig.ret.clone(),
            ));
        }

        let receivers = receiver_patterns(&recv.ty);
        let callee = format!("{}.{name}", callee_text(object));
        if receivers.is_empty() {
            return Err(TranslateError::UnsupportedCall { callee, span });
        }
        self.table_call(cx, &receivers, &callee, name, Some((object, recv)), args, span, expected)
    }

    #[allow(clippy::too_many_arguments)]
    fn table_call(
        &mut self,
        cx: &mut FnCtx,
        receivers: &[ReceiverPattern],
        callee: &str,
        name: &str,
        receiver: Option<(&Expr, Typed)>,
        args: &[Expr],
        span: Span,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        let api = self.api;
        match api.lookup(receivers, name, false, args.len()) {
            RuleMatch::Found(rule) => {
                let receiver = match receiver {
                    Some((object, recv)) => {
                        if rule.mutates_receiver {
                            self.writable(cx, object)?;
                        }
                        Some(recv)
                    }
                    None => None,
                };
                self.apply_rule(cx, rule, receiver, args, span, expected)
            }
            RuleMatch::WrongArity(rule) => Err(TranslateError::ArityMismatch {
                callee: callee.to_string(),
                expected: rule.arity_text(),
                found: args.len(),
                span,
            }),
            RuleMatch::NotFound => Err(TranslateError::UnsupportedCall {
                callee: callee.to_string(),
                span,
            }),
        }
    }

    fn self_method_call(
        &mut self,
        cx: &mut FnCtx,
        property: &Ident,
        args: &[Expr],
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let class = match &cx.kind {
            FnKind::Method { class } => class.clone(),
            FnKind::Constructor { .. } => {
                return Err(TranslateError::unsupported(
                    "calling methods on `this` inside a constructor is not supported",
                    span,
                ));
            }
            _ => return Err(TranslateError::unsupported("`this` outside of a class", span)),
        };
        let symbols = self.symbols;
        let callee = format!("this.{}", property.node);
        let Some(method) = symbols.method(&class, &property.node) else {
            return Err(TranslateError::UnsupportedCall { callee, span });
        };
        let exclusive =
            self.mutability.receiver(&class, &property.node) == ReceiverAccess::Exclusive;
        let this = Expr {
            kind: ExprKind::This,
            span: property.span,
        };
        let args = self.call_args(cx, &callee, &method.sig, Some((&this, exclusive)), args, span)?;
        Ok(Typed::new(
            rir::Expr::MethodCall {
                receiver: Box::new(rir::Expr::SelfValue),
                method: method.rust_name.clone(),
                args,
            },
            method.sig.ret.clone(),
        ))
    }

    pub(crate) fn new_instance(
        &mut self,
        cx: &mut FnCtx,
        class: &Ident,
        args: &[Expr],
        span: Span,
    ) -> Result<Typed, TranslateError> {
        let symbols = self.symbols;
        let Some(symbol) = symbols.get(&class.node) else {
            return Err(TranslateError::UnsupportedCall {
                callee: format!("new {}", class.node),
                span,
            });
        };
        let Some(sig) = symbols.class(&class.node) else {
            return Err(TranslateError::unsupported(
                format!("`{}` is not a class", class.node),
                class.span,
            ));
        };
        let ctor = sig.ctor_sig();
        let callee = format!("new {}", class.node);
        let args = self.call_args(cx, &callee, &ctor, None, args, span)?;
        Ok(Typed::new(
            rir::Expr::Call {
                func: format!("{}::new", symbol.rust_name),
                args,
            },
            TargetType::Named(class.node.clone()),
        ))
    }

    /// Rewrites a call (or property read) through a mapping-table row.
    pub(crate) fn apply_rule(
        &mut self,
        cx: &mut FnCtx,
        rule: &MappingRule,
        receiver: Option<Typed>,
        args: &[Expr],
        span: Span,
        expected: Option<&TargetType>,
    ) -> Result<Typed, TranslateError> {
        trace!(rule = %rule.display_name(), "mapping rule matched");
        for dep in &rule.crates {
            self.require(*dep);
        }
        if let Some(helper) = rule.helper {
            self.require_helper(helper);
        }

        let (expr, ty) = match &rule.rewrite {
            Rewrite::Stdout | Rewrite::Stderr => {
                let mut b = FormatBuilder::new();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        b.text(" ");
                    }
                    let v = self.format_arg(cx, arg)?;
                    b.value(v);
                }
                let kind = if rule.rewrite == Rewrite::Stdout {
                    rir::FormatKind::Println
                } else {
                    rir::FormatKind::Eprintln
                };
                (b.finish(kind), TargetType::UNIT)
            }
            Rewrite::Template(template) => {
                let elem = receiver.as_ref().and_then(|r| r.ty.element().cloned());
                let mut lowered = Vec::with_capacity(args.len());
                let mut closure_ty = None;
                for (i, arg) in args.iter().enumerate() {
                    let v = match rule.arg_transform(i) {
                        ArgTransform::Number => self.value(cx, arg, &TargetType::NUMBER)?,
                        ArgTransform::Text => self.value(cx, arg, &TargetType::TEXT)?,
                        ArgTransform::Str => self.borrowed_text(cx, arg)?,
                        ArgTransform::Element => {
                            let Some(elem) = &elem else {
                                return Err(TranslateError::unsupported(
                                    format!("`{}` needs an array receiver", rule.display_name()),
                                    arg.span,
                                ));
                            };
                            self.value(cx, arg, elem)?
                        }
                        t @ (ArgTransform::Closure | ArgTransform::ClosureByRef) => {
                            let by_ref = t == ArgTransform::ClosureByRef;
                            let (closure, ty) = self.callback(cx, arg, elem.as_ref(), by_ref)?;
                            closure_ty = Some(ty);
                            closure
                        }
                        ArgTransform::Value => self.value_any(cx, arg)?.expr,
                    };
                    lowered.push(v);
                }
                let recv_ty = receiver.as_ref().map(|r| r.ty.clone());
                let ty = rule_result(rule.result, recv_ty, closure_ty, expected);
                let expr = rir::Expr::Template {
                    template: template.clone(),
                    receiver: receiver.map(|r| Box::new(r.expr)),
                    args: lowered,
                };
                (expr, ty)
            }
            Rewrite::Http(verb) => {
                let Some(url) = args.first() else {
                    return Err(TranslateError::unsupported(
                        format!("`{}` needs a URL argument", rule.display_name()),
                        span,
                    ));
                };
                let url = self.borrowed_text(cx, url)?;
                let body = match args.get(1) {
                    Some(arg) => Some(Box::new(self.value_any(cx, arg)?.expr)),
                    None => None,
                };
                let response = rule_result(rule.result, None, None, expected);
                if response == TargetType::Dynamic {
                    self.require(rir::Dependency::SerdeJson);
                }
                let expr = rir::Expr::Http {
                    verb: *verb,
                    url: Box::new(url),
                    body,
                    response: response.to_rir(),
                };
                (expr, response)
            }
        };

        let ty = if rule.asynchronous {
            TargetType::AsyncResult(Box::new(ty))
        } else {
            ty
        };
        Ok(Typed::new(expr, ty))
    }

    /// A single-parameter arrow function over sequence elements.
    fn callback(
        &mut self,
        cx: &mut FnCtx,
        arg: &Expr,
        elem: Option<&TargetType>,
        by_ref: bool,
    ) -> Result<(rir::Expr, TargetType), TranslateError> {
        let ExprKind::Arrow { params, body } = &arg.kind else {
            return Err(TranslateError::unsupported("expected an arrow function", arg.span));
        };
        let Some(elem) = elem else {
            return Err(TranslateError::unsupported("callbacks need an array receiver", arg.span));
        };
        let [param] = params.as_slice() else {
            return Err(TranslateError::unsupported(
                "callbacks must take exactly one parameter",
                arg.span,
            ));
        };
        let ty = match &param.ty {
            Some(ann) => TypeMapper::new(self.symbols).map(ann, TypePosition::Value)?,
            None => elem.clone(),
        };
        if ty != *elem {
            return Err(TranslateError::mismatch(elem, &ty, param.span));
        }

        let rust_name = value_name(&param.name.node);
        cx.push_scope();
        let written = self.mutability.mutated_in_place(param.name.span);
        cx.bind(&param.name.node, Binding::owned(rust_name.clone(), ty, false, written));
        let lowered = self.value_any(cx, body);
        cx.pop_scope();
        let lowered = lowered?;

        Ok((
            rir::Expr::Closure {
                params: vec![rust_name],
                by_ref,
                body: Box::new(lowered.expr),
            },
            lowered.ty,
        ))
    }
}

fn rule_result(
    result: ResultType,
    receiver: Option<TargetType>,
    closure: Option<TargetType>,
    expected: Option<&TargetType>,
) -> TargetType {
    match result {
        ResultType::Number => TargetType::NUMBER,
        ResultType::Text => TargetType::TEXT,
        ResultType::Boolean => TargetType::BOOLEAN,
        ResultType::Unit => TargetType::UNIT,
        ResultType::Dynamic => TargetType::Dynamic,
        ResultType::TextSequence => TargetType::sequence(TargetType::TEXT),
        ResultType::Receiver => receiver.unwrap_or(TargetType::Dynamic),
        ResultType::MappedSequence => TargetType::sequence(closure.unwrap_or(TargetType::Dynamic)),
        ResultType::Expected => match expected.map(TargetType::payload) {
            Some(TargetType::Null) | None => TargetType::Dynamic,
            Some(ty) => ty.clone(),
        },
    }
}

/// A variable borrowed for the duration of one call.
struct Borrow {
    /// `x`, `this` or `this.f`.
    root: String,
    exclusive: bool,
    span: Span,
}

impl Borrow {
    fn of(e: &Expr, exclusive: bool) -> Option<Self> {
        let root = match &e.kind {
            ExprKind::This => "this".to_string(),
            _ => match this_field(e) {
                Some(field) => format!("this.{field}"),
                None => root_ident(e)?.node.clone(),
            },
        };
        Some(Borrow {
            root,
            exclusive,
            span: e.span,
        })
    }

    /// Disjoint fields of `this` may be borrowed side by side.
    fn overlaps(&self, other: &Borrow) -> bool {
        let nested = |outer: &str, inner: &str| {
            inner.strip_prefix(outer).is_some_and(|rest| rest.starts_with('.'))
        };
        self.root == other.root
            || nested(&self.root, &other.root)
            || nested(&other.root, &self.root)
    }
}

/// Rust rejects a call that borrows one variable twice when either borrow
/// writes through it.
fn check_borrows(callee: &str, borrows: &[Borrow]) -> Result<(), TranslateError> {
    for (i, first) in borrows.iter().enumerate() {
        for second in &borrows[i + 1..] {
            if first.overlaps(second) && (first.exclusive || second.exclusive) {
                return Err(TranslateError::unsupported(
                    format!(
                        "`{callee}` would borrow `{}` twice while writing through it",
                        first.root
                    ),
                    second.span,
                ));
            }
        }
    }
    Ok(())
}

/// The variable a place expression starts from.
fn root_ident(e: &Expr) -> Option<&Ident> {
    match &e.kind {
        ExprKind::Ident(id) => Some(id),
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => root_ident(object),
        _ => None,
    }
}
