#![forbid(unsafe_code)]

mod error;
mod parser;

use ferrite_lex::Lexer;

pub use error::ParseError;
pub use parser::Parser;

/// Lexes and parses one translation unit.
///
/// Lexer and parser failures are both reported as diagnostics with a source
/// label; either one is fatal for the unit.
pub fn parse_source(src: &str) -> miette::Result<ferrite_ast::Program> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    Ok(parser.parse_program()?)
}

pub fn parse_expr(src: &str) -> miette::Result<ferrite_ast::Expr> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    Ok(parser.parse_expr_eof()?)
}
