#![forbid(unsafe_code)]

use std::mem;

use ferrite_ast::{
    AssignOp, AssignStmt, BinOp, Block, ClassDecl, Constructor, DeclKind, Expr, ExprKind,
    FieldDecl, FunctionDecl, Ident, IfStmt, InterfaceDecl, Item, LetStmt, MethodDecl, Param,
    Program, ReturnStmt, Span, Stmt, TypeAnn, TypeAnnKind, UnaryOp, WhileStmt, join, span_between,
};
use ferrite_lex::{Lexer, TemplatePart, Token, TokenKind};

use crate::error::ParseError;

const ACCESS_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly"];

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

/// One member of a `A | B` type annotation.
enum UnionMember {
    Type(TypeAnn),
    Null(Span),
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semi) {
                continue;
            }
            items.push(self.parse_item()?);
        }
        Ok(Program { items })
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let start = self.peek_span_or_end();
        match self.peek_kind() {
            Some(TokenKind::KwImport) => Err(self.error_here(
                "import declarations are not supported; each unit is translated on its own",
            )),
            Some(TokenKind::At) => Err(self.error_here("decorators are not supported")),
            Some(TokenKind::KwExport) => {
                self.next();
                self.parse_declaration(start, true)
            }
            Some(TokenKind::KwInterface | TokenKind::KwClass | TokenKind::KwFunction) => {
                self.parse_declaration(start, false)
            }
            Some(TokenKind::KwAsync)
                if matches!(self.peek_kind_n(1), Some(TokenKind::KwFunction)) =>
            {
                self.parse_declaration(start, false)
            }
            _ => Ok(Item::Stmt(self.parse_stmt()?)),
        }
    }

    fn parse_declaration(&mut self, start: Span, exported: bool) -> Result<Item, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KwInterface) => {
                Ok(Item::Interface(self.parse_interface(start, exported)?))
            }
            Some(TokenKind::KwClass) => Ok(Item::Class(self.parse_class(start, exported)?)),
            Some(TokenKind::KwFunction | TokenKind::KwAsync) => {
                Ok(Item::Function(self.parse_function(start, exported)?))
            }
            _ => Err(self.error_here("only interfaces, classes and functions can be exported")),
        }
    }

    fn parse_interface(
        &mut self,
        start: Span,
        exported: bool,
    ) -> Result<InterfaceDecl, ParseError> {
        self.expect(TokenKind::KwInterface)?;
        let name = self.expect_ident()?;
        self.reject_type_params()?;
        if self.at(TokenKind::KwExtends) {
            return Err(self.error_here("interface inheritance is not supported"));
        }
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let fname = self.expect_property_name()?;
            let optional = self.eat(TokenKind::Question);
            if self.at(TokenKind::LParen) {
                return Err(self.error_here("interface methods are not supported"));
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            fields.push(FieldDecl {
                span: join(fname.span, ty.span),
                name: fname,
                optional,
                ty,
                init: None,
            });
            if !self.eat(TokenKind::Semi) && !self.eat(TokenKind::Comma) {
                self.expect_member_end()?;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(InterfaceDecl {
            span: join(start, end),
            exported,
            name,
            fields,
        })
    }

    fn parse_class(&mut self, start: Span, exported: bool) -> Result<ClassDecl, ParseError> {
        self.expect(TokenKind::KwClass)?;
        let name = self.expect_ident()?;
        self.reject_type_params()?;
        if self.at(TokenKind::KwExtends) {
            return Err(self.error_here("class inheritance is not supported"));
        }
        if self.at(TokenKind::KwImplements) {
            return Err(self.error_here("`implements` clauses are not supported"));
        }
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        let mut constructor: Option<Constructor> = None;
        let mut methods = Vec::new();

        while !self.at(TokenKind::RBrace) {
            if self.eat(TokenKind::Semi) {
                continue;
            }
            if self.at(TokenKind::At) {
                return Err(self.error_here("decorators are not supported"));
            }
            self.skip_access_modifiers();
            if matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s == "static") {
                return Err(self.error_here("static members are not supported"));
            }

            let member_start = self.peek_span_or_end();

            if matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s == "constructor")
                && matches!(self.peek_kind_n(1), Some(TokenKind::LParen))
            {
                self.next();
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                if constructor.is_some() {
                    return Err(ParseError {
                        message: "a class may only have one constructor".to_string(),
                        span: member_start,
                    });
                }
                constructor = Some(Constructor {
                    span: join(member_start, body.span),
                    params,
                    body,
                });
                continue;
            }

            let is_async = self.eat(TokenKind::KwAsync);
            let mname = self.expect_property_name()?;

            if self.at(TokenKind::LParen) || self.at(TokenKind::Lt) {
                self.reject_type_params()?;
                let params = self.parse_params()?;
                let ret = self.parse_return_annotation()?;
                let body = self.parse_block()?;
                methods.push(MethodDecl {
                    span: join(member_start, body.span),
                    name: mname,
                    is_async,
                    params,
                    ret,
                    body,
                });
                continue;
            }

            if is_async {
                return Err(ParseError {
                    message: "`async` applies only to methods".to_string(),
                    span: member_start,
                });
            }

            let optional = self.eat(TokenKind::Question);
            if !self.at(TokenKind::Colon) {
                return Err(self.error_here("class fields need a type annotation"));
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            let init = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let end = init.as_ref().map(|e| e.span).unwrap_or(ty.span);
            fields.push(FieldDecl {
                span: join(member_start, end),
                name: mname,
                optional,
                ty,
                init,
            });
            if !self.eat(TokenKind::Semi) {
                self.expect_member_end()?;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(ClassDecl {
            span: join(start, end),
            exported,
            name,
            fields,
            constructor,
            methods,
        })
    }

    fn parse_function(&mut self, start: Span, exported: bool) -> Result<FunctionDecl, ParseError> {
        let is_async = self.eat(TokenKind::KwAsync);
        self.expect(TokenKind::KwFunction)?;
        let name = self.expect_ident()?;
        self.reject_type_params()?;
        let params = self.parse_params()?;
        let ret = self.parse_return_annotation()?;
        let body = self.parse_block()?;

        Ok(FunctionDecl {
            span: join(start, body.span),
            exported,
            name,
            is_async,
            params,
            ret,
            body,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) {
            if self.at_access_modifier()
                && matches!(self.peek_kind_n(1), Some(TokenKind::Ident(_)))
            {
                return Err(self.error_here("constructor parameter properties are not supported"));
            }
            if self.at(TokenKind::LBrace) || self.at(TokenKind::LBracket) {
                return Err(self.error_here("destructuring parameters are not supported"));
            }
            let name = self.expect_ident()?;
            let optional = self.eat(TokenKind::Question);
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            if self.at(TokenKind::Eq) {
                return Err(self.error_here("default parameter values are not supported"));
            }
            let end = ty.as_ref().map(|t| t.span).unwrap_or(name.span);
            params.push(Param {
                span: join(name.span, end),
                name,
                optional,
                ty,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_return_annotation(&mut self) -> Result<Option<TypeAnn>, ParseError> {
        if self.eat(TokenKind::Colon) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    fn reject_type_params(&self) -> Result<(), ParseError> {
        if self.at(TokenKind::Lt) {
            return Err(self.error_here("generic declarations are not supported"));
        }
        Ok(())
    }

    fn skip_access_modifiers(&mut self) {
        while self.at_access_modifier()
            && !matches!(
                self.peek_kind_n(1),
                Some(TokenKind::LParen | TokenKind::Colon | TokenKind::Question)
            )
        {
            self.next();
        }
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    pub fn parse_type(&mut self) -> Result<TypeAnn, ParseError> {
        // A leading `|` is allowed, as in multi-line unions.
        self.eat(TokenKind::Pipe);

        let mut members = vec![self.parse_union_member()?];
        while self.eat(TokenKind::Pipe) {
            members.push(self.parse_union_member()?);
        }

        let mut nullable = false;
        let mut concrete: Vec<TypeAnn> = Vec::new();
        let mut whole: Option<Span> = None;
        for member in members {
            let span = match member {
                UnionMember::Null(span) => {
                    nullable = true;
                    span
                }
                UnionMember::Type(ty) => {
                    let span = ty.span;
                    concrete.push(ty);
                    span
                }
            };
            whole = Some(whole.map_or(span, |w| join(w, span)));
        }
        let whole = whole.unwrap_or_else(|| self.peek_span_or_end());

        if concrete.len() > 1 {
            return Err(ParseError {
                message: "union types are not supported (only `T | null` and `T | undefined`)"
                    .to_string(),
                span: whole,
            });
        }
        let Some(ty) = concrete.pop() else {
            return Err(ParseError {
                message: "`null` and `undefined` are not usable as types on their own".to_string(),
                span: whole,
            });
        };

        if nullable {
            Ok(TypeAnn {
                span: whole,
                kind: TypeAnnKind::Nullable(Box::new(ty)),
            })
        } else {
            Ok(ty)
        }
    }

    fn parse_union_member(&mut self) -> Result<UnionMember, ParseError> {
        if let Some(tok) = self.eat_any(&[TokenKind::KwNull, TokenKind::KwUndefined]) {
            return Ok(UnionMember::Null(tok.span));
        }

        let mut ty = if self.eat(TokenKind::LParen) {
            let inner = self.parse_type()?;
            self.expect(TokenKind::RParen)?;
            inner
        } else if self.at(TokenKind::LBrace) {
            return Err(self.error_here(
                "inline object types are not supported; declare an interface instead",
            ));
        } else {
            let name = self.expect_ident()?;
            let mut args = Vec::new();
            let mut span = name.span;
            if self.eat(TokenKind::Lt) {
                loop {
                    args.push(self.parse_type()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                span = join(span, self.expect(TokenKind::Gt)?.span);
            }
            TypeAnn {
                span,
                kind: TypeAnnKind::Named { name, args },
            }
        };

        while self.at(TokenKind::LBracket)
            && matches!(self.peek_kind_n(1), Some(TokenKind::RBracket))
        {
            self.next();
            let end = self.expect(TokenKind::RBracket)?.span;
            ty = TypeAnn {
                span: join(ty.span, end),
                kind: TypeAnnKind::Array(Box::new(ty)),
            };
        }

        Ok(UnionMember::Type(ty))
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    pub fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KwLet | TokenKind::KwConst | TokenKind::KwVar) => self.parse_let(),
            Some(TokenKind::KwIf) => Ok(Stmt::If(self.parse_if()?)),
            Some(TokenKind::KwWhile) => self.parse_while(),
            Some(TokenKind::KwReturn) => self.parse_return(),
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            Some(TokenKind::PlusPlus | TokenKind::MinusMinus) => self.parse_prefix_update(),
            Some(
                TokenKind::KwFunction
                | TokenKind::KwClass
                | TokenKind::KwInterface
                | TokenKind::KwExport,
            ) => Err(self.error_here("declarations are only supported at the top level")),
            Some(TokenKind::KwImport) => {
                Err(self.error_here("import declarations are not supported"))
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.error_here("unterminated block; expected `}`"));
            }
            if self.eat(TokenKind::Semi) {
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Block {
            span: join(start, end),
            stmts,
        })
    }

    /// `if`/`while` bodies: a block, or a single statement wrapped in one.
    fn parse_body(&mut self) -> Result<Block, ParseError> {
        if self.at(TokenKind::LBrace) {
            return self.parse_block();
        }
        let stmt = self.parse_stmt()?;
        Ok(Block {
            span: stmt.span(),
            stmts: vec![stmt],
        })
    }

    fn parse_let(&mut self) -> Result<Stmt, ParseError> {
        let tok = self.expect_any()?;
        let kind = match tok.kind {
            TokenKind::KwLet => DeclKind::Let,
            TokenKind::KwConst => DeclKind::Const,
            _ => DeclKind::Var,
        };
        if self.at(TokenKind::LBrace) || self.at(TokenKind::LBracket) {
            return Err(self.error_here("destructuring declarations are not supported"));
        }
        let name = self.expect_ident()?;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if kind == DeclKind::Const && init.is_none() {
            return Err(ParseError {
                message: format!("`const {}` needs an initializer", name.node),
                span: name.span,
            });
        }
        if self.at(TokenKind::Comma) {
            return Err(self.error_here("multiple declarators in one statement are not supported"));
        }

        let end = init
            .as_ref()
            .map(|e| e.span)
            .or(ty.as_ref().map(|t| t.span))
            .unwrap_or(name.span);
        self.expect_terminator()?;

        Ok(Stmt::Let(LetStmt {
            span: join(tok.span, end),
            kind,
            name,
            ty,
            init,
        }))
    }

    fn parse_if(&mut self) -> Result<IfStmt, ParseError> {
        let start = self.expect(TokenKind::KwIf)?.span;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_body()?;
        let mut end = then_block.span;

        let else_branch = if self.eat(TokenKind::KwElse) {
            let stmt = if self.at(TokenKind::KwIf) {
                Stmt::If(self.parse_if()?)
            } else {
                Stmt::Block(self.parse_body()?)
            };
            end = stmt.span();
            Some(Box::new(stmt))
        } else {
            None
        };

        Ok(IfStmt {
            span: join(start, end),
            cond,
            then_block,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwWhile)?.span;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_body()?;
        Ok(Stmt::While(WhileStmt {
            span: join(start, body.span),
            cond,
            body,
        }))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect(TokenKind::KwReturn)?.span;
        let bare = self.at(TokenKind::Semi)
            || self.at(TokenKind::RBrace)
            || self.at(TokenKind::Eof)
            || self.peek_newline_before();
        let value = if bare { None } else { Some(self.parse_expr()?) };
        let end = value.as_ref().map(|e| e.span).unwrap_or(start);
        self.expect_terminator()?;
        Ok(Stmt::Return(ReturnStmt {
            span: join(start, end),
            value,
        }))
    }

    fn parse_prefix_update(&mut self) -> Result<Stmt, ParseError> {
        let tok = self.expect_any()?;
        let op = if tok.kind == TokenKind::PlusPlus {
            AssignOp::Add
        } else {
            AssignOp::Sub
        };
        let target = self.parse_unary()?;
        check_assign_target(&target)?;
        let span = join(tok.span, target.span);
        self.expect_terminator()?;
        Ok(Stmt::Assign(AssignStmt {
            span,
            target,
            op,
            value: Expr {
                span: tok.span,
                kind: ExprKind::NumberLit(1.0),
            },
        }))
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expr()?;

        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => Some(AssignOp::Assign),
            Some(TokenKind::PlusEq) => Some(AssignOp::Add),
            Some(TokenKind::MinusEq) => Some(AssignOp::Sub),
            Some(TokenKind::StarEq) => Some(AssignOp::Mul),
            Some(TokenKind::SlashEq) => Some(AssignOp::Div),
            _ => None,
        };
        if let Some(op) = op {
            check_assign_target(&expr)?;
            self.next();
            let value = self.parse_expr()?;
            let span = join(expr.span, value.span);
            self.expect_terminator()?;
            return Ok(Stmt::Assign(AssignStmt {
                span,
                target: expr,
                op,
                value,
            }));
        }

        if (self.at(TokenKind::PlusPlus) || self.at(TokenKind::MinusMinus))
            && !self.peek_newline_before()
        {
            let tok = self.expect_any()?;
            check_assign_target(&expr)?;
            let op = if tok.kind == TokenKind::PlusPlus {
                AssignOp::Add
            } else {
                AssignOp::Sub
            };
            let span = join(expr.span, tok.span);
            self.expect_terminator()?;
            return Ok(Stmt::Assign(AssignStmt {
                span,
                target: expr,
                op,
                value: Expr {
                    span: tok.span,
                    kind: ExprKind::NumberLit(1.0),
                },
            }));
        }

        self.expect_terminator()?;
        Ok(Stmt::Expr(expr))
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at_arrow() {
            return self.parse_arrow();
        }
        self.parse_conditional()
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(TokenKind::Eof) {
            return Err(self.error_here("expected end of expression"));
        }
        Ok(expr)
    }

    fn at_arrow(&self) -> bool {
        match self.peek_kind() {
            Some(TokenKind::Ident(_)) => matches!(self.peek_kind_n(1), Some(TokenKind::FatArrow)),
            Some(TokenKind::KwAsync) => matches!(
                self.peek_kind_n(1),
                Some(TokenKind::Ident(_) | TokenKind::LParen)
            ),
            Some(TokenKind::LParen) => {
                let mut depth = 0usize;
                for (offset, tok) in self.tokens[self.idx..].iter().enumerate() {
                    match tok.kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(
                                    self.peek_kind_n(offset + 1),
                                    Some(TokenKind::FatArrow)
                                );
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                }
                false
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::KwAsync) {
            return Err(self.error_here("async arrow functions are not supported"));
        }
        let start = self.peek_span_or_end();
        let params = if self.at(TokenKind::LParen) {
            self.parse_params()?
        } else {
            let name = self.expect_ident()?;
            vec![Param {
                span: name.span,
                name,
                optional: false,
                ty: None,
            }]
        };
        self.expect(TokenKind::FatArrow)?;
        if self.at(TokenKind::LBrace) {
            return Err(self.error_here(
                "arrow functions with a block body are not supported; use a single expression",
            ));
        }
        let body = self.parse_expr()?;
        Ok(Expr {
            span: join(start, body.span),
            kind: ExprKind::Arrow {
                params,
                body: Box::new(body),
            },
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let else_expr = self.parse_expr()?;
        Ok(Expr {
            span: join(cond.span, else_expr.span),
            kind: ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
        })
    }

    fn binop_at(&self, level: usize) -> Option<BinOp> {
        let kind = self.peek_kind()?;
        let op = match (level, kind) {
            (0, TokenKind::OrOr) => BinOp::Or,
            (1, TokenKind::AndAnd) => BinOp::And,
            (2, TokenKind::EqEq | TokenKind::EqEqEq) => BinOp::Eq,
            (2, TokenKind::Neq | TokenKind::NotEqEq) => BinOp::Ne,
            (3, TokenKind::Lt) => BinOp::Lt,
            (3, TokenKind::Gt) => BinOp::Gt,
            (3, TokenKind::Le) => BinOp::Le,
            (3, TokenKind::Ge) => BinOp::Ge,
            (4, TokenKind::Plus) => BinOp::Add,
            (4, TokenKind::Minus) => BinOp::Sub,
            (5, TokenKind::Star) => BinOp::Mul,
            (5, TokenKind::Slash) => BinOp::Div,
            (5, TokenKind::Percent) => BinOp::Rem,
            _ => return None,
        };
        Some(op)
    }

    /// Left-associative binary operators, lowest precedence at level 0.
    fn parse_binary(&mut self, level: usize) -> Result<Expr, ParseError> {
        const LEVELS: usize = 6;
        if level == LEVELS {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = self.binop_at(level) {
            self.next();
            let right = self.parse_binary(level + 1)?;
            left = Expr {
                span: join(left.span, right.span),
                kind: ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Plus) => {
                return Err(self.error_here("unary `+` is not supported"));
            }
            Some(TokenKind::KwAwait) => {
                let start = self.expect_any()?.span;
                let inner = self.parse_unary()?;
                return Ok(Expr {
                    span: join(start, inner.span),
                    kind: ExprKind::Await(Box::new(inner)),
                });
            }
            _ => None,
        };

        let Some(op) = op else {
            return self.parse_postfix();
        };
        let start = self.expect_any()?.span;
        let inner = self.parse_unary()?;
        Ok(Expr {
            span: join(start, inner.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(inner),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(TokenKind::Dot) {
                let property = self.expect_property_name()?;
                expr = Expr {
                    span: join(expr.span, property.span),
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    },
                };
            } else if self.at(TokenKind::LBracket) {
                self.next();
                let index = self.parse_expr()?;
                let end = self.expect(TokenKind::RBracket)?.span;
                expr = Expr {
                    span: join(expr.span, end),
                    kind: ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.at(TokenKind::LParen) {
                let (args, end) = self.parse_args()?;
                expr = Expr {
                    span: join(expr.span, end),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// `( a, b, )`; returns the arguments and the span of the closing paren.
    fn parse_args(&mut self) -> Result<(Vec<Expr>, Span), ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RParen)?.span;
        Ok((args, end))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.expect_any()?;
        let span = tok.span;
        let kind = match tok.kind {
            TokenKind::Number(n) => ExprKind::NumberLit(n),
            TokenKind::String(s) => ExprKind::StringLit(s),
            TokenKind::Template(parts) => return self.parse_template(&parts, span),
            TokenKind::KwTrue => ExprKind::BoolLit(true),
            TokenKind::KwFalse => ExprKind::BoolLit(false),
            TokenKind::KwNull => ExprKind::Null,
            TokenKind::KwUndefined => ExprKind::Undefined,
            TokenKind::KwThis => ExprKind::This,
            TokenKind::Ident(name) => ExprKind::Ident(Ident { span, node: name }),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let end = self.expect(TokenKind::RParen)?.span;
                return Ok(Expr {
                    span: join(span, end),
                    kind: inner.kind,
                });
            }
            TokenKind::LBracket => {
                let mut elems = Vec::new();
                while !self.at(TokenKind::RBracket) {
                    elems.push(self.parse_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RBracket)?.span;
                return Ok(Expr {
                    span: join(span, end),
                    kind: ExprKind::ArrayLit(elems),
                });
            }
            TokenKind::LBrace => return self.parse_object_lit(span),
            TokenKind::KwNew => {
                let class = self.expect_ident()?;
                self.reject_type_params()?;
                let (args, end) = if self.at(TokenKind::LParen) {
                    self.parse_args()?
                } else {
                    (Vec::new(), class.span)
                };
                return Ok(Expr {
                    span: join(span, end),
                    kind: ExprKind::New { class, args },
                });
            }
            TokenKind::KwFunction => {
                return Err(ParseError {
                    message: "function expressions are not supported; use an arrow function"
                        .to_string(),
                    span,
                });
            }
            other => {
                return Err(ParseError {
                    message: format!("expected expression, found {}", other.describe()),
                    span,
                });
            }
        };
        Ok(Expr { span, kind })
    }

    /// Called after the opening `{`.
    fn parse_object_lit(&mut self, start: Span) -> Result<Expr, ParseError> {
        let mut entries: Vec<(Ident, Expr)> = Vec::new();
        while !self.at(TokenKind::RBrace) {
            let key = match self.peek_kind() {
                Some(TokenKind::String(s)) => {
                    let s = s.clone();
                    let tok = self.expect_any()?;
                    Ident {
                        span: tok.span,
                        node: s,
                    }
                }
                _ => self.expect_property_name()?,
            };

            let value = if self.eat(TokenKind::Colon) {
                self.parse_expr()?
            } else if self.at(TokenKind::LParen) {
                return Err(self.error_here("object literal methods are not supported"));
            } else {
                // `{ id }` is `{ id: id }`.
                Expr {
                    span: key.span,
                    kind: ExprKind::Ident(key.clone()),
                }
            };
            entries.push((key, value));

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Expr {
            span: join(start, end),
            kind: ExprKind::ObjectLit(entries),
        })
    }

    fn parse_template(&self, parts: &[TemplatePart], span: Span) -> Result<Expr, ParseError> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        for part in parts {
            match part {
                TemplatePart::Str(s) => quasis.push(s.clone()),
                TemplatePart::Expr { src, start } => {
                    let tokens = Lexer::with_offset(src, span.offset() + start).lex()?;
                    let mut sub = Parser::new(&tokens);
                    exprs.push(sub.parse_expr_eof()?);
                }
            }
        }
        Ok(Expr {
            span,
            kind: ExprKind::Template { quasis, exprs },
        })
    }

    // ---------------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------------

    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        if self.eat(TokenKind::Semi)
            || self.at(TokenKind::RBrace)
            || self.at(TokenKind::Eof)
            || self.peek_newline_before()
        {
            Ok(())
        } else {
            Err(self.unexpected("`;`"))
        }
    }

    fn expect_member_end(&self) -> Result<(), ParseError> {
        if self.at(TokenKind::RBrace) || self.peek_newline_before() {
            Ok(())
        } else {
            Err(self.unexpected("`;`"))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident {
                span: tok.span,
                node: name,
            }),
            other => Err(ParseError {
                message: format!("expected identifier, found {}", other.describe()),
                span: tok.span,
            }),
        }
    }

    /// Like `expect_ident`, but keywords are accepted as plain names.
    fn expect_property_name(&mut self) -> Result<Ident, ParseError> {
        if let Some(word) = self.peek_kind().and_then(TokenKind::keyword_text) {
            let tok = self.expect_any()?;
            return Ok(Ident {
                span: tok.span,
                node: word.to_string(),
            });
        }
        self.expect_ident()
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.expect_any()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError {
                message: format!("expected {}, found {}", expected.describe(), tok.kind.describe()),
                span: tok.span,
            })
        }
    }

    fn expect_any(&mut self) -> Result<Token, ParseError> {
        let end = self.peek_span_or_end();
        self.next().ok_or_else(|| ParseError {
            message: "unexpected end of input".to_string(),
            span: end,
        })
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn eat_any(&mut self, kinds: &[TokenKind]) -> Option<Token> {
        let hit = kinds.iter().any(|k| self.at(k.clone()));
        if hit { self.next() } else { None }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx)?.clone();
        // Never step past the trailing Eof.
        if tok.kind != TokenKind::Eof {
            self.idx += 1;
        }
        Some(tok)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn at_access_modifier(&self) -> bool {
        match self.peek_kind() {
            Some(TokenKind::Ident(s)) => ACCESS_MODIFIERS.contains(&s.as_str()),
            _ => false,
        }
    }

    fn peek_newline_before(&self) -> bool {
        self.tokens.get(self.idx).is_some_and(|t| t.newline_before)
    }

    fn peek_span_or_end(&self) -> Span {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| span_between(0, 0))
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        let found = self
            .peek_kind()
            .map(TokenKind::describe)
            .unwrap_or_else(|| "end of input".to_string());
        ParseError {
            message: format!("expected {wanted}, found {found}"),
            span: self.peek_span_or_end(),
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            span: self.peek_span_or_end(),
        }
    }
}

fn check_assign_target(expr: &Expr) -> Result<(), ParseError> {
    match expr.kind {
        ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => Ok(()),
        _ => Err(ParseError {
            message: "invalid assignment target".to_string(),
            span: expr.span,
        }),
    }
}
