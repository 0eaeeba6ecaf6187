#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{LexError, Lexer};
pub use token::{TemplatePart, Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_number_literals() {
        let nums: Vec<f64> = kinds("1 2.5 1_000 0xff .5 1e3")
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Number(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![1.0, 2.5, 1000.0, 255.0, 0.5, 1000.0]);
    }

    #[test]
    fn lex_rejects_bad_underscore_placement() {
        let err = Lexer::new("let x = 1__0;").lex().unwrap_err();
        assert!(err.message.contains("invalid number literal"));
    }

    #[test]
    fn lex_keywords_and_strict_equality() {
        assert_eq!(
            kinds("if (a === null) return"),
            vec![
                TokenKind::KwIf,
                TokenKind::LParen,
                TokenKind::Ident("a".into()),
                TokenKind::EqEqEq,
                TokenKind::KwNull,
                TokenKind::RParen,
                TokenKind::KwReturn,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_string_escapes() {
        let s = kinds(r#"'it\'s' "a\n\tb" "A\u{42}""#)
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::String(s) => Some(s),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(s, vec!["it's", "a\n\tb", "AB"]);
    }

    #[test]
    fn lex_unknown_escape_keeps_character() {
        let s = kinds(r#""\q""#);
        assert_eq!(s[0], TokenKind::String("q".into()));
    }

    #[test]
    fn lex_template_parts() {
        let toks = kinds("`Hello, ${user.name}!`");
        let TokenKind::Template(parts) = &toks[0] else {
            panic!("expected template, got {:?}", toks[0]);
        };
        assert_eq!(
            parts,
            &vec![
                TemplatePart::Str("Hello, ".into()),
                TemplatePart::Expr {
                    src: "user.name".into(),
                    start: 10,
                },
                TemplatePart::Str("!".into()),
            ]
        );
    }

    #[test]
    fn lex_template_with_nested_braces() {
        let toks = kinds("`${ f({ a: 1 }) }`");
        let TokenKind::Template(parts) = &toks[0] else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[1], TemplatePart::Expr { src, .. } if src == " f({ a: 1 }) "));
    }

    #[test]
    fn lex_skips_comments() {
        assert_eq!(
            kinds("a // line\n/* block\n */ b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_tracks_newline_before() {
        let toks = Lexer::new("a\nb c").lex().unwrap();
        assert!(!toks[0].newline_before);
        assert!(toks[1].newline_before);
        assert!(!toks[2].newline_before);
    }

    #[test]
    fn lex_with_offset_shifts_spans() {
        let toks = Lexer::with_offset("x", 40).lex().unwrap();
        assert_eq!(toks[0].span.offset(), 40);
    }

    #[test]
    fn lex_reports_unterminated_string() {
        let err = Lexer::new("let s = \"abc").lex().unwrap_err();
        assert!(err.message.contains("unterminated string"), "{}", err.message);
    }
}
