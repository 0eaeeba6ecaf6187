#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::template::{TemplatePiece, template_pieces};
use crate::{Block, Else, Expr, Function, Item, Module, Passing, RuntimeHelper, Stmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

fn fail<T>(message: String) -> Result<T, ValidationError> {
    Err(ValidationError { message })
}

/// Structural sanity check run on every lowered module before it is handed
/// to a renderer. This is not a Rust type checker.
pub fn validate_module(module: &Module) -> Result<(), ValidationError> {
    let mut type_names = BTreeSet::new();
    let mut fn_names = BTreeSet::new();

    for item in &module.items {
        match item {
            Item::Struct(s) => {
                if !type_names.insert(s.name.as_str()) {
                    return fail(format!("duplicate struct `{}`", s.name));
                }
                let mut fields = BTreeSet::new();
                for field in &s.fields {
                    if !fields.insert(field.name.as_str()) {
                        return fail(format!("struct `{}` repeats field `{}`", s.name, field.name));
                    }
                }
            }
            Item::Function(f) => {
                if !fn_names.insert(f.name.as_str()) {
                    return fail(format!("duplicate function `{}`", f.name));
                }
                if f.receiver.is_some() {
                    return fail(format!("free function `{}` takes a receiver", f.name));
                }
            }
            Item::Impl(_) => {}
        }
    }

    let mut impls = BTreeSet::new();
    for item in &module.items {
        let Item::Impl(block) = item else { continue };
        if !type_names.contains(block.self_ty.as_str()) {
            return fail(format!("impl block for unknown type `{}`", block.self_ty));
        }
        if !impls.insert(block.self_ty.as_str()) {
            return fail(format!("more than one impl block for `{}`", block.self_ty));
        }
        let mut methods = BTreeSet::new();
        for f in &block.functions {
            if !methods.insert(f.name.as_str()) {
                return fail(format!("`{}` defines `{}` twice", block.self_ty, f.name));
            }
        }
    }

    let mut uses = Uses::default();
    for item in &module.items {
        match item {
            Item::Function(f) => validate_function(f, &mut uses)?,
            Item::Impl(block) => {
                for f in &block.functions {
                    validate_function(f, &mut uses)?;
                }
            }
            Item::Struct(_) => {}
        }
    }

    if uses.http && !module.helpers.contains(&RuntimeHelper::Http) {
        return fail("HTTP request emitted without the HTTP runtime helper".to_string());
    }

    Ok(())
}

#[derive(Default)]
struct Uses {
    http: bool,
}

struct FnCtx<'a> {
    func: &'a Function,
}

fn validate_function(f: &Function, uses: &mut Uses) -> Result<(), ValidationError> {
    let mut params = BTreeSet::new();
    for p in &f.params {
        if !params.insert(p.name.as_str()) {
            return fail(format!("function `{}` repeats parameter `{}`", f.name, p.name));
        }
        if p.mutable && p.passing != Passing::Value {
            return fail(format!("function `{}` rebinds borrowed parameter `{}`", f.name, p.name));
        }
    }
    let ctx = FnCtx { func: f };
    validate_block(&ctx, &f.body, uses)
}

fn validate_block(ctx: &FnCtx<'_>, block: &Block, uses: &mut Uses) -> Result<(), ValidationError> {
    for stmt in &block.stmts {
        validate_stmt(ctx, stmt, uses)?;
    }
    Ok(())
}

fn validate_stmt(ctx: &FnCtx<'_>, stmt: &Stmt, uses: &mut Uses) -> Result<(), ValidationError> {
    match stmt {
        Stmt::Let { init, .. } => {
            if let Some(init) = init {
                validate_expr(ctx, init, uses)?;
            }
        }
        Stmt::Assign { target, value, .. } => {
            if !target.is_place() {
                return fail(format!(
                    "function `{}` assigns to a non-place expression",
                    ctx.func.name
                ));
            }
            validate_expr(ctx, target, uses)?;
            validate_expr(ctx, value, uses)?;
        }
        Stmt::If {
            cond,
            then_block,
            else_branch,
        } => {
            validate_expr(ctx, cond, uses)?;
            validate_block(ctx, then_block, uses)?;
            match else_branch {
                Some(Else::If(stmt)) => validate_stmt(ctx, stmt, uses)?,
                Some(Else::Block(block)) => validate_block(ctx, block, uses)?,
                None => {}
            }
        }
        Stmt::While { cond, body } => {
            validate_expr(ctx, cond, uses)?;
            validate_block(ctx, body, uses)?;
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                validate_expr(ctx, value, uses)?;
            }
        }
        Stmt::Block(block) => validate_block(ctx, block, uses)?,
        Stmt::Expr(expr) => validate_expr(ctx, expr, uses)?,
    }
    Ok(())
}

fn validate_expr(ctx: &FnCtx<'_>, expr: &Expr, uses: &mut Uses) -> Result<(), ValidationError> {
    match expr {
        Expr::Lit(_) | Expr::Local(_) | Expr::Path(_) | Expr::None => {}
        Expr::SelfValue => {
            if ctx.func.receiver.is_none() {
                return fail(format!("`self` used in `{}` without a receiver", ctx.func.name));
            }
        }
        Expr::Field { base, .. } => validate_expr(ctx, base, uses)?,
        Expr::Index { base, index } => {
            validate_expr(ctx, base, uses)?;
            validate_expr(ctx, index, uses)?;
        }
        Expr::Unary { expr, .. }
        | Expr::Json(expr)
        | Expr::Ref(expr)
        | Expr::RefMut(expr)
        | Expr::Clone(expr)
        | Expr::OwnedText(expr)
        | Expr::Some(expr)
        | Expr::BlockOn(expr) => validate_expr(ctx, expr, uses)?,
        Expr::Await(inner) => {
            if !ctx.func.is_async {
                return fail(format!("`.await` inside non-async `{}`", ctx.func.name));
            }
            validate_expr(ctx, inner, uses)?;
        }
        Expr::Binary { left, right, .. } => {
            validate_expr(ctx, left, uses)?;
            validate_expr(ctx, right, uses)?;
        }
        Expr::Call { args, .. } | Expr::VecLit(args) => {
            for arg in args {
                validate_expr(ctx, arg, uses)?;
            }
        }
        Expr::MethodCall { receiver, args, .. } => {
            validate_expr(ctx, receiver, uses)?;
            for arg in args {
                validate_expr(ctx, arg, uses)?;
            }
        }
        Expr::Template {
            template,
            receiver,
            args,
        } => {
            let pieces = template_pieces(template).map_err(|message| ValidationError { message })?;
            for piece in &pieces {
                match piece {
                    TemplatePiece::Receiver if receiver.is_none() => {
                        return fail(format!(
                            "template `{template}` uses `{{recv}}` without a receiver"
                        ));
                    }
                    TemplatePiece::Arg(i) if *i >= args.len() => {
                        let supplied = args.len();
                        return fail(format!(
                            "template `{template}` references argument {i} \
                             but only {supplied} were supplied"
                        ));
                    }
                    _ => {}
                }
            }
            if let Some(receiver) = receiver {
                validate_expr(ctx, receiver, uses)?;
            }
            for arg in args {
                validate_expr(ctx, arg, uses)?;
            }
        }
        Expr::Format { template, args, .. } => {
            let holes = count_format_holes(template);
            if holes != args.len() {
                return fail(format!(
                    "format string `{template}` has {holes} placeholders but {} arguments",
                    args.len()
                ));
            }
            for arg in args {
                validate_expr(ctx, arg, uses)?;
            }
        }
        Expr::StructLit { fields, .. } | Expr::JsonObject(fields) => {
            let mut seen = BTreeSet::new();
            for (name, value) in fields {
                if !seen.insert(name.as_str()) {
                    return fail(format!("literal repeats field `{name}`"));
                }
                validate_expr(ctx, value, uses)?;
            }
        }
        Expr::Closure { body, .. } => validate_expr(ctx, body, uses)?,
        Expr::IfElse {
            cond,
            then_expr,
            else_expr,
        } => {
            validate_expr(ctx, cond, uses)?;
            validate_expr(ctx, then_expr, uses)?;
            validate_expr(ctx, else_expr, uses)?;
        }
        Expr::Http { url, body, .. } => {
            uses.http = true;
            validate_expr(ctx, url, uses)?;
            if let Some(body) = body {
                validate_expr(ctx, body, uses)?;
            }
        }
    }
    Ok(())
}

/// Counts `{}`/`{:?}` placeholders, skipping `{{` and `}}` escapes.
pub fn count_format_holes(template: &str) -> usize {
    let mut count = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '{' => count += 1,
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FormatKind, Type};
    use ferrite_ast::span;

    fn func(name: &str, body: Vec<Stmt>) -> Function {
        Function {
            name: name.to_string(),
            span: span(0, 0),
            public: false,
            is_async: false,
            attrs: Vec::new(),
            receiver: None,
            params: Vec::new(),
            ret: Type::Unit,
            body: Block { stmts: body },
        }
    }

    #[test]
    fn duplicate_functions_are_rejected() {
        let mut module = Module::new();
        module.items.push(Item::Function(func("a", vec![])));
        module.items.push(Item::Function(func("a", vec![])));
        let err = validate_module(&module).unwrap_err();
        assert!(err.message.contains("duplicate function"));
    }

    #[test]
    fn format_placeholders_must_match_arguments() {
        let mut module = Module::new();
        module.items.push(Item::Function(func(
            "main",
            vec![Stmt::Expr(Expr::Format {
                kind: FormatKind::Println,
                template: "{} {{}} {:?}".to_string(),
                args: vec![Expr::f64_lit(1.0)],
            })],
        )));
        let err = validate_module(&module).unwrap_err();
        assert!(err.message.contains("2 placeholders"), "{}", err.message);
    }

    #[test]
    fn await_requires_async_function() {
        let mut module = Module::new();
        module.items.push(Item::Function(func(
            "f",
            vec![Stmt::Expr(Expr::Await(Box::new(Expr::Call {
                func: "g".into(),
                args: vec![],
            })))],
        )));
        let err = validate_module(&module).unwrap_err();
        assert!(err.message.contains(".await"));
    }

    #[test]
    fn borrowed_parameters_cannot_be_mut() {
        let mut module = Module::new();
        let mut f = func("f", vec![]);
        f.params.push(crate::Param {
            name: "items".into(),
            mutable: true,
            passing: Passing::Exclusive,
            ty: Type::Vec(Box::new(Type::F64)),
        });
        module.items.push(Item::Function(f));
        let err = validate_module(&module).unwrap_err();
        assert!(err.message.contains("borrowed parameter `items`"), "{}", err.message);
    }

    #[test]
    fn http_needs_helper() {
        let mut module = Module::new();
        let mut f = func(
            "f",
            vec![Stmt::Expr(Expr::Await(Box::new(Expr::Http {
                verb: crate::HttpVerb::Get,
                url: Box::new(Expr::str_lit("https://example.com")),
                body: None,
                response: Type::Json,
            })))],
        );
        f.is_async = true;
        module.items.push(Item::Function(f));
        assert!(validate_module(&module).is_err());
        module.require_helper(RuntimeHelper::Http);
        assert!(validate_module(&module).is_ok());
    }
}
