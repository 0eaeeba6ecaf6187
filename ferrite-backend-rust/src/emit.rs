#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use ferrite_rir::{
    BinOp, Block, Dependency, Else, Expr, Function, HttpVerb, ImplBlock, Item, Lit, Module, Param,
    Passing, Receiver, Stmt, StructDef, TemplatePiece, Type, UnaryOp, template_pieces,
};
use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use crate::runtime;

#[derive(Debug, Error, Diagnostic)]
#[error("Rust backend error: {message}")]
#[diagnostic(code(ferrite::backend_rust))]
pub struct RustBackendError {
    pub message: String,
}

/// One rendered unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RustArtifacts {
    pub source: String,
    /// Crates the source links against.
    pub dependencies: BTreeSet<Dependency>,
    /// The unit defines `fn main` and can be built as a binary.
    pub has_main: bool,
}

const INDENT: &str = "    ";

pub fn emit_module(module: &Module) -> Result<RustArtifacts, RustBackendError> {
    if let Err(e) = ferrite_rir::validate_module(module) {
        return Err(RustBackendError {
            message: format!("IR validation failed before Rust emission: {e}"),
        });
    }

    let source = emit_source(module)?;
    debug!(
        items = module.items.len(),
        helpers = module.helpers.len(),
        bytes = source.len(),
        "rendered unit"
    );
    Ok(RustArtifacts {
        source,
        dependencies: module.dependencies.clone(),
        has_main: module.function("main").is_some(),
    })
}

fn emit_source(module: &Module) -> Result<String, RustBackendError> {
    let mut out = String::new();
    out.push_str("// Generated by ferrite. Edits are overwritten on the next build.\n");
    out.push_str("#![allow(dead_code, unused_mut, unused_variables)]\n");

    for item in &module.items {
        out.push('\n');
        match item {
            Item::Struct(def) => emit_struct(&mut out, def),
            Item::Impl(block) => emit_impl(&mut out, block)?,
            Item::Function(f) => emit_function(&mut out, 0, f)?,
        }
    }

    if !module.helpers.is_empty() {
        out.push('\n');
        runtime::emit_runtime(&mut out, &module.helpers);
    }
    Ok(out)
}

fn visibility(public: bool) -> &'static str {
    if public { "pub " } else { "" }
}

fn emit_struct(out: &mut String, def: &StructDef) {
    out.push_str("#[derive(Debug, Clone, PartialEq");
    if def.serializable {
        out.push_str(", serde::Serialize, serde::Deserialize");
    }
    out.push_str(")]\n");
    // Record fields keep their wire names.
    if def.fields.iter().any(|f| f.name.chars().any(|c| c.is_ascii_uppercase())) {
        out.push_str("#[allow(non_snake_case)]\n");
    }

    out.push_str(visibility(def.public));
    out.push_str("struct ");
    out.push_str(&def.name);
    if def.fields.is_empty() {
        out.push_str(" {}\n");
        return;
    }
    out.push_str(" {\n");
    for field in &def.fields {
        out.push_str(INDENT);
        out.push_str(visibility(def.public));
        out.push_str(&field.name);
        out.push_str(": ");
        out.push_str(&rust_type(&field.ty));
        out.push_str(",\n");
    }
    out.push_str("}\n");
}

fn emit_impl(out: &mut String, block: &ImplBlock) -> Result<(), RustBackendError> {
    out.push_str("impl ");
    out.push_str(&block.self_ty);
    out.push_str(" {\n");
    for (i, f) in block.functions.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        emit_function(out, 1, f)?;
    }
    out.push_str("}\n");
    Ok(())
}

fn emit_function(out: &mut String, depth: usize, f: &Function) -> Result<(), RustBackendError> {
    let pad = INDENT.repeat(depth);
    for attr in &f.attrs {
        out.push_str(&pad);
        out.push_str("#[");
        out.push_str(attr);
        out.push_str("]\n");
    }

    out.push_str(&pad);
    out.push_str(visibility(f.public));
    if f.is_async {
        out.push_str("async ");
    }
    out.push_str("fn ");
    out.push_str(&f.name);
    out.push('(');
    out.push_str(&param_list(f.receiver, &f.params));
    out.push(')');
    if f.ret != Type::Unit {
        out.push_str(" -> ");
        out.push_str(&rust_type(&f.ret));
    }
    out.push_str(" {\n");
    emit_stmts(out, depth + 1, &f.body.stmts, true)?;
    out.push_str(&pad);
    out.push_str("}\n");
    Ok(())
}

fn param_list(receiver: Option<Receiver>, params: &[Param]) -> String {
    let mut parts = Vec::with_capacity(params.len() + 1);
    match receiver {
        Some(Receiver::Shared) => parts.push("&self".to_string()),
        Some(Receiver::Exclusive) => parts.push("&mut self".to_string()),
        None => {}
    }
    for p in params {
        let ty = rust_type(&p.ty);
        parts.push(match p.passing {
            Passing::Value if p.mutable => format!("mut {}: {ty}", p.name),
            Passing::Value => format!("{}: {ty}", p.name),
            Passing::Shared => format!("{}: &{ty}", p.name),
            Passing::Exclusive => format!("{}: &mut {ty}", p.name),
        });
    }
    parts.join(", ")
}

fn rust_type(ty: &Type) -> String {
    match ty {
        Type::Unit => "()".to_string(),
        Type::Bool => "bool".to_string(),
        Type::F64 => "f64".to_string(),
        Type::String => "String".to_string(),
        Type::Json => "serde_json::Value".to_string(),
        Type::Named(name) => name.clone(),
        Type::Option(inner) => format!("Option<{}>", rust_type(inner)),
        Type::Vec(inner) => format!("Vec<{}>", rust_type(inner)),
    }
}

/// `tail`: a trailing `return value;` becomes the block's tail expression.
fn emit_stmts(
    out: &mut String,
    depth: usize,
    stmts: &[Stmt],
    tail: bool,
) -> Result<(), RustBackendError> {
    for (i, stmt) in stmts.iter().enumerate() {
        match stmt {
            Stmt::Return(Some(value)) if tail && i + 1 == stmts.len() => {
                out.push_str(&INDENT.repeat(depth));
                out.push_str(&expr(value)?);
                out.push('\n');
            }
            _ => emit_stmt(out, depth, stmt)?,
        }
    }
    Ok(())
}

fn emit_stmt(out: &mut String, depth: usize, stmt: &Stmt) -> Result<(), RustBackendError> {
    let pad = INDENT.repeat(depth);
    out.push_str(&pad);
    match stmt {
        Stmt::Let { name, mutable, ty, init } => {
            out.push_str("let ");
            if *mutable {
                out.push_str("mut ");
            }
            out.push_str(name);
            if let Some(ty) = ty {
                out.push_str(": ");
                out.push_str(&rust_type(ty));
            }
            if let Some(init) = init {
                out.push_str(" = ");
                out.push_str(&expr(init)?);
            }
            out.push_str(";\n");
        }
        Stmt::Assign { target, op, value } => {
            out.push_str(&expr(target)?);
            out.push(' ');
            if let Some(op) = op {
                out.push_str(op.symbol());
            }
            out.push_str("= ");
            out.push_str(&expr(value)?);
            out.push_str(";\n");
        }
        Stmt::If {
            cond,
            then_block,
            else_branch,
        } => {
            emit_if(out, depth, cond, then_block, else_branch.as_ref())?;
            out.push('\n');
        }
        Stmt::While { cond, body } => {
            out.push_str("while ");
            out.push_str(&expr(cond)?);
            out.push_str(" {\n");
            emit_stmts(out, depth + 1, &body.stmts, false)?;
            out.push_str(&pad);
            out.push_str("}\n");
        }
        Stmt::Return(None) => out.push_str("return;\n"),
        Stmt::Return(Some(value)) => {
            out.push_str("return ");
            out.push_str(&expr(value)?);
            out.push_str(";\n");
        }
        Stmt::Block(block) => {
            out.push_str("{\n");
            emit_stmts(out, depth + 1, &block.stmts, false)?;
            out.push_str(&pad);
            out.push_str("}\n");
        }
        Stmt::Expr(e) => {
            out.push_str(&expr(e)?);
            out.push_str(";\n");
        }
    }
    Ok(())
}

/// Writes `if .. { .. } else ..` without leading indentation or a trailing newline.
fn emit_if(
    out: &mut String,
    depth: usize,
    cond: &Expr,
    then_block: &Block,
    else_branch: Option<&Else>,
) -> Result<(), RustBackendError> {
    let pad = INDENT.repeat(depth);
    out.push_str("if ");
    out.push_str(&expr(cond)?);
    out.push_str(" {\n");
    emit_stmts(out, depth + 1, &then_block.stmts, false)?;
    out.push_str(&pad);
    out.push('}');

    match else_branch {
        None => {}
        Some(Else::If(stmt)) => match stmt.as_ref() {
            Stmt::If {
                cond,
                then_block,
                else_branch,
            } => {
                out.push_str(" else ");
                emit_if(out, depth, cond, then_block, else_branch.as_ref())?;
            }
            other => {
                out.push_str(" else {\n");
                emit_stmt(out, depth + 1, other)?;
                out.push_str(&pad);
                out.push('}');
            }
        },
        Some(Else::Block(block)) => {
            out.push_str(" else {\n");
            emit_stmts(out, depth + 1, &block.stmts, false)?;
            out.push_str(&pad);
            out.push('}');
        }
    }
    Ok(())
}

/// How tightly a rendered expression holds together as an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tightness {
    /// Safe anywhere, including before `.method()`.
    Atom,
    /// Starts with a prefix operator: `-x`, `!x`, `&x`.
    Prefix,
    /// Needs parentheses inside any larger expression.
    Loose,
}

fn tightness(e: &Expr, text: &str) -> Tightness {
    match e {
        Expr::Binary { .. } | Expr::IfElse { .. } | Expr::Closure { .. } => Tightness::Loose,
        Expr::Unary { .. } | Expr::Ref(_) | Expr::RefMut(_) => Tightness::Prefix,
        Expr::Lit(Lit::F64(n)) if n.is_sign_negative() => Tightness::Prefix,
        Expr::Template { .. } => text_tightness(text),
        _ => Tightness::Atom,
    }
}

/// Classifies template output: any space outside brackets and string
/// literals (`x.len() as f64`) makes it loose.
fn text_tightness(text: &str) -> Tightness {
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_str {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_str = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ' ' if depth == 0 => return Tightness::Loose,
            _ => {}
        }
    }
    if text.starts_with(['-', '!', '&', '*']) {
        Tightness::Prefix
    } else {
        Tightness::Atom
    }
}

fn parenthesize(text: String, parens: bool) -> String {
    if parens { format!("({text})") } else { text }
}

/// Receiver of `.method()`, `.field`, `.await` or `[index]`.
fn postfix_operand(e: &Expr) -> Result<String, RustBackendError> {
    // A bare float literal receiver has an ambiguous numeric type.
    if let Expr::Lit(Lit::F64(n)) = e {
        return Ok(parenthesize(format!("{n:?}_f64"), n.is_sign_negative()));
    }
    let text = expr(e)?;
    let parens = tightness(e, &text) != Tightness::Atom;
    Ok(parenthesize(text, parens))
}

/// Operand of a prefix operator or of `as`.
fn prefix_operand(e: &Expr) -> Result<String, RustBackendError> {
    let text = expr(e)?;
    let parens = tightness(e, &text) == Tightness::Loose;
    Ok(parenthesize(text, parens))
}

fn binary(op: BinOp, left: &Expr, right: &Expr) -> Result<String, RustBackendError> {
    let l = binary_operand(op, left, false)?;
    let r = binary_operand(op, right, true)?;
    Ok(format!("{l} {} {r}", op.symbol()))
}

fn binary_operand(parent: BinOp, child: &Expr, right: bool) -> Result<String, RustBackendError> {
    let text = expr(child)?;
    let parens = match child {
        Expr::Binary { op, .. } => {
            let (outer, inner) = (parent.precedence(), op.precedence());
            // Rust rejects chained comparisons outright.
            inner < outer
                || (right && inner == outer)
                || (parent.is_comparison() && op.is_comparison())
        }
        _ => tightness(child, &text) == Tightness::Loose,
    };
    Ok(parenthesize(text, parens))
}

fn expr_list(items: &[Expr]) -> Result<String, RustBackendError> {
    let parts = items.iter().map(expr).collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(", "))
}

fn literal(lit: &Lit) -> String {
    match lit {
        Lit::F64(n) => format!("{n:?}"),
        Lit::Str(s) => format!("{s:?}"),
        Lit::Bool(b) => b.to_string(),
        Lit::Unit => "()".to_string(),
    }
}

fn expr(e: &Expr) -> Result<String, RustBackendError> {
    Ok(match e {
        Expr::Lit(lit) => literal(lit),
        Expr::Local(name) | Expr::Path(name) => name.clone(),
        Expr::SelfValue => "self".to_string(),
        Expr::Field { base, name } => format!("{}.{name}", postfix_operand(base)?),
        Expr::Index { base, index } => {
            format!("{}[{} as usize]", postfix_operand(base)?, prefix_operand(index)?)
        }
        Expr::Unary { op, expr: inner } => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            };
            format!("{symbol}{}", prefix_operand(inner)?)
        }
        Expr::Binary { op, left, right } => binary(*op, left, right)?,
        Expr::Call { func, args } => format!("{func}({})", expr_list(args)?),
        Expr::MethodCall {
            receiver,
            method,
            args,
        } => format!("{}.{method}({})", postfix_operand(receiver)?, expr_list(args)?),
        Expr::Template {
            template,
            receiver,
            args,
        } => render_template(template, receiver.as_deref(), args)?,
        Expr::Format { kind, template, args } => {
            let mut text = format!("{}!({template:?}", kind.macro_name());
            for arg in args {
                text.push_str(", ");
                text.push_str(&expr(arg)?);
            }
            text.push(')');
            text
        }
        Expr::VecLit(items) => format!("vec![{}]", expr_list(items)?),
        Expr::StructLit { name, fields } => struct_lit(name, fields)?,
        Expr::Json(inner) => format!("serde_json::json!({})", expr(inner)?),
        Expr::JsonObject(fields) => {
            if fields.is_empty() {
                "serde_json::json!({})".to_string()
            } else {
                let mut parts = Vec::with_capacity(fields.len());
                for (key, value) in fields {
                    parts.push(format!("{key:?}: {}", expr(value)?));
                }
                format!("serde_json::json!({{ {} }})", parts.join(", "))
            }
        }
        Expr::Closure { params, by_ref, body } => closure(params, *by_ref, body)?,
        Expr::IfElse {
            cond,
            then_expr,
            else_expr,
        } => format!(
            "if {} {{ {} }} else {{ {} }}",
            expr(cond)?,
            expr(then_expr)?,
            expr(else_expr)?
        ),
        Expr::Ref(inner) => format!("&{}", prefix_operand(inner)?),
        Expr::RefMut(inner) => format!("&mut {}", prefix_operand(inner)?),
        Expr::Clone(inner) => format!("{}.clone()", postfix_operand(inner)?),
        Expr::OwnedText(inner) => format!("String::from({})", expr(inner)?),
        Expr::Some(inner) => format!("Some({})", expr(inner)?),
        Expr::None => "None".to_string(),
        Expr::Await(inner) => format!("{}.await", postfix_operand(inner)?),
        Expr::BlockOn(inner) => format!("futures::executor::block_on({})", expr(inner)?),
        Expr::Http {
            verb,
            url,
            body,
            response,
        } => http(*verb, url, body.as_deref(), response)?,
    })
}

fn struct_lit(name: &str, fields: &[(String, Expr)]) -> Result<String, RustBackendError> {
    if fields.is_empty() {
        return Ok(format!("{name} {{}}"));
    }
    let mut parts = Vec::with_capacity(fields.len());
    for (field, value) in fields {
        match value {
            Expr::Local(local) if local == field => parts.push(field.clone()),
            _ => parts.push(format!("{field}: {}", expr(value)?)),
        }
    }
    Ok(format!("{name} {{ {} }}", parts.join(", ")))
}

fn closure(params: &[String], by_ref: bool, body: &Expr) -> Result<String, RustBackendError> {
    let list = params.join(", ");
    let body = expr(body)?;
    if !by_ref {
        return Ok(format!("|{list}| {body}"));
    }
    let mut text = format!("|{list}| {{ ");
    for p in params {
        text.push_str(&format!("let {p} = {p}.clone(); "));
    }
    text.push_str(&body);
    text.push_str(" }");
    Ok(text)
}

fn render_template(
    template: &str,
    receiver: Option<&Expr>,
    args: &[Expr],
) -> Result<String, RustBackendError> {
    let pieces = template_pieces(template).map_err(|message| RustBackendError { message })?;
    let missing = |hole: String| RustBackendError {
        message: format!("template `{template}` has no value for `{hole}`"),
    };

    let mut out = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        let value = match piece {
            TemplatePiece::Text(text) => {
                out.push_str(text);
                continue;
            }
            TemplatePiece::Receiver => receiver.ok_or_else(|| missing("{recv}".to_string()))?,
            TemplatePiece::Arg(n) => args.get(*n).ok_or_else(|| missing(format!("{{{n}}}")))?,
        };

        let after = match pieces.get(i + 1) {
            Some(TemplatePiece::Text(text)) => text.chars().next(),
            _ => None,
        };
        let before = out.chars().last();
        let rendered = match (before, after) {
            (_, Some('.' | '[')) => postfix_operand(value)?,
            // `{0} as usize`
            (_, Some(' ')) | (Some('&' | '*' | '!' | '-'), _) => prefix_operand(value)?,
            _ => expr(value)?,
        };
        out.push_str(&rendered);
    }
    Ok(out)
}

fn http(
    verb: HttpVerb,
    url: &Expr,
    body: Option<&Expr>,
    response: &Type,
) -> Result<String, RustBackendError> {
    let method = format!("reqwest::Method::{}", verb.method_const());
    let url = expr(url)?;
    let body = match body {
        Some(body) => Some(prefix_operand(body)?),
        None => None,
    };
    Ok(match (response, body) {
        (Type::Unit, None) => format!("ferrite_rt::http_send({method}, {url})"),
        (Type::Unit, Some(body)) => {
            format!("ferrite_rt::http_send_with_body({method}, {url}, &{body})")
        }
        (ty, None) => format!(
            "ferrite_rt::http_request::<{}>({method}, {url})",
            rust_type(ty)
        ),
        (ty, Some(body)) => format!(
            "ferrite_rt::http_request_with_body::<{}, _>({method}, {url}, &{body})",
            rust_type(ty)
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_ast::span;
    use ferrite_rir::{FieldDef, FormatKind, RuntimeHelper};

    fn func(name: &str, ret: Type, stmts: Vec<Stmt>) -> Function {
        Function {
            name: name.to_string(),
            span: span(0, 0),
            public: false,
            is_async: false,
            attrs: Vec::new(),
            receiver: None,
            params: Vec::new(),
            ret,
            body: Block { stmts },
        }
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn precedence_adds_only_needed_parentheses() {
        let a = Expr::local("a");
        let b = Expr::local("b");
        let c = Expr::local("c");

        let sum_times = binary(BinOp::Mul, binary(BinOp::Add, a.clone(), b.clone()), c.clone());
        assert_eq!(expr(&sum_times).unwrap(), "(a + b) * c");

        let left_assoc = binary(BinOp::Sub, binary(BinOp::Sub, a.clone(), b.clone()), c.clone());
        assert_eq!(expr(&left_assoc).unwrap(), "a - b - c");

        let right_nested = binary(BinOp::Sub, a.clone(), binary(BinOp::Sub, b.clone(), c.clone()));
        assert_eq!(expr(&right_nested).unwrap(), "a - (b - c)");

        let chained = binary(BinOp::Eq, binary(BinOp::Lt, a.clone(), b), c);
        assert_eq!(expr(&chained).unwrap(), "(a < b) == c");

        let negated = Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(binary(BinOp::And, a.clone(), Expr::local("d"))),
        };
        assert_eq!(expr(&negated).unwrap(), "!(a && d)");
    }

    #[test]
    fn templates_fill_holes_and_guard_receivers() {
        let len = Expr::Template {
            template: "{recv}.len() as f64".into(),
            receiver: Some(Box::new(Expr::local("items"))),
            args: vec![],
        };
        assert_eq!(expr(&len).unwrap(), "items.len() as f64");

        let compared = binary(BinOp::Lt, len.clone(), Expr::f64_lit(3.0));
        assert_eq!(expr(&compared).unwrap(), "(items.len() as f64) < 3.0");

        let on_sum = Expr::Template {
            template: "{recv}.to_string()".into(),
            receiver: Some(Box::new(binary(BinOp::Add, Expr::local("a"), Expr::f64_lit(1.0)))),
            args: vec![],
        };
        assert_eq!(expr(&on_sum).unwrap(), "(a + 1.0).to_string()");

        let on_literal = Expr::Template {
            template: "{recv}.to_string()".into(),
            receiver: Some(Box::new(Expr::f64_lit(5.0))),
            args: vec![],
        };
        assert_eq!(expr(&on_literal).unwrap(), "5.0_f64.to_string()");

        let fixed = Expr::Template {
            template: "format!(\"{{:.*}}\", {0} as usize, {recv})".into(),
            receiver: Some(Box::new(Expr::local("x"))),
            args: vec![binary(BinOp::Add, Expr::local("n"), Expr::f64_lit(1.0))],
        };
        assert_eq!(expr(&fixed).unwrap(), "format!(\"{:.*}\", (n + 1.0) as usize, x)");

        let max = Expr::Template {
            template: "f64::max({0}, {1})".into(),
            receiver: None,
            args: vec![binary(BinOp::Add, Expr::local("a"), Expr::local("b")), Expr::f64_lit(0.5)],
        };
        assert_eq!(expr(&max).unwrap(), "f64::max(a + b, 0.5)");
    }

    #[test]
    fn string_literals_are_escaped() {
        assert_eq!(expr(&Expr::str_lit("say \"hi\"\n")).unwrap(), r#""say \"hi\"\n""#);
        let format = Expr::Format {
            kind: FormatKind::Println,
            template: "{} said \"{}\"".into(),
            args: vec![Expr::local("a"), Expr::local("b")],
        };
        assert_eq!(expr(&format).unwrap(), r#"println!("{} said \"{}\"", a, b)"#);
    }

    #[test]
    fn closures_taking_references_clone_their_parameters() {
        let c = Expr::Closure {
            params: vec!["p".into()],
            by_ref: true,
            body: Box::new(binary(BinOp::Gt, Expr::local("p"), Expr::f64_lit(2.0))),
        };
        assert_eq!(expr(&c).unwrap(), "|p| { let p = p.clone(); p > 2.0 }");
    }

    #[test]
    fn trailing_return_becomes_tail_expression() {
        let mut module = Module::new();
        module.items.push(Item::Function(func(
            "answer",
            Type::F64,
            vec![
                Stmt::If {
                    cond: Expr::Lit(Lit::Bool(true)),
                    then_block: Block {
                        stmts: vec![Stmt::Return(Some(Expr::f64_lit(1.0)))],
                    },
                    else_branch: None,
                },
                Stmt::Return(Some(Expr::f64_lit(42.0))),
            ],
        )));
        let source = emit_module(&module).unwrap().source;
        assert!(
            source.contains(
                "fn answer() -> f64 {\n    if true {\n        return 1.0;\n    }\n    42.0\n}\n"
            ),
            "{source}"
        );
    }

    #[test]
    fn records_derive_serde_and_allow_wire_names() {
        let mut module = Module::new();
        module.items.push(Item::Struct(StructDef {
            name: "User".into(),
            span: span(0, 0),
            public: true,
            serializable: true,
            fields: vec![
                FieldDef {
                    name: "id".into(),
                    ty: Type::F64,
                },
                FieldDef {
                    name: "isActive".into(),
                    ty: Type::Option(Box::new(Type::Bool)),
                },
            ],
        }));
        let source = emit_module(&module).unwrap().source;
        assert!(source.contains(
            "#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]\n\
             #[allow(non_snake_case)]\n\
             pub struct User {\n    pub id: f64,\n    pub isActive: Option<bool>,\n}\n"
        ));
    }

    #[test]
    fn http_without_payload_uses_send() {
        let delete = Expr::Http {
            verb: HttpVerb::Delete,
            url: Box::new(Expr::str_lit("https://example.com/1")),
            body: None,
            response: Type::Unit,
        };
        assert_eq!(
            expr(&Expr::Await(Box::new(delete))).unwrap(),
            "ferrite_rt::http_send(reqwest::Method::DELETE, \"https://example.com/1\").await"
        );

        let post = Expr::Http {
            verb: HttpVerb::Post,
            url: Box::new(Expr::local("url")),
            body: Some(Box::new(Expr::local("user"))),
            response: Type::Named("User".into()),
        };
        assert_eq!(
            expr(&post).unwrap(),
            "ferrite_rt::http_request_with_body::<User, _>(reqwest::Method::POST, url, &user)"
        );
    }

    #[test]
    fn invalid_modules_are_refused() {
        let mut module = Module::new();
        module.items.push(Item::Function(func("a", Type::Unit, vec![])));
        module.items.push(Item::Function(func("a", Type::Unit, vec![])));
        let err = emit_module(&module).unwrap_err();
        assert!(err.message.contains("IR validation failed"), "{}", err.message);
    }

    #[test]
    fn helpers_are_emitted_once_at_the_end() {
        let mut module = Module::new();
        module.require_helper(RuntimeHelper::RoundHalfUp);
        module.items.push(Item::Function(func(
            "r",
            Type::F64,
            vec![Stmt::Return(Some(Expr::Template {
                template: "ferrite_rt::round_half_up({0})".into(),
                receiver: None,
                args: vec![Expr::f64_lit(2.5)],
            }))],
        )));
        let artifacts = emit_module(&module).unwrap();
        assert_eq!(artifacts.source.matches("mod ferrite_rt").count(), 1);
        assert!(artifacts.source.find("fn r()") < artifacts.source.find("mod ferrite_rt"));
        assert!(!artifacts.has_main);
    }
}
