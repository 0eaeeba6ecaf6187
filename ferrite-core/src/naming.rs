#![forbid(unsafe_code)]

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "abstract", "become", "box", "do", "final", "gen", "macro", "override", "priv", "try",
    "typeof", "unsized", "virtual", "yield",
];

/// Keywords that cannot be written as raw identifiers.
const NON_RAW_KEYWORDS: &[&str] = &["self", "Self", "super", "crate", "_"];

/// `calculateTotal` → `calculate_total`, `HTTPRequest` → `http_request`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '$' {
            out.push('_');
            continue;
        }
        if !c.is_uppercase() {
            out.push(c);
            continue;
        }

        if i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Escapes Rust keywords: `type` → `r#type`, `self` → `self_`.
pub fn rust_ident(name: &str) -> String {
    if NON_RAW_KEYWORDS.contains(&name) {
        format!("{name}_")
    } else if RUST_KEYWORDS.contains(&name) {
        format!("r#{name}")
    } else {
        name.replace('$', "_")
    }
}

/// Emitted name for functions, methods, locals and parameters.
pub fn value_name(name: &str) -> String {
    rust_ident(&snake_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn camel_case_becomes_snake_case() {
        assert_eq!(snake_case("calculateTotal"), "calculate_total");
        assert_eq!(snake_case("getWithAxios"), "get_with_axios");
        assert_eq!(snake_case("HTTPRequest"), "http_request");
        assert_eq!(snake_case("processData2"), "process_data2");
        assert_eq!(snake_case("calculate_age"), "calculate_age");
        assert_eq!(snake_case("userID"), "user_id");
    }

    #[test]
    fn keywords_are_escaped() {
        assert_eq!(value_name("type"), "r#type");
        assert_eq!(value_name("match"), "r#match");
        assert_eq!(value_name("self"), "self_");
        assert_eq!(value_name("total"), "total");
    }

    proptest! {
        #[test]
        fn snake_case_is_idempotent_and_lowercase(name in "[a-z][a-zA-Z0-9]{0,12}") {
            let once = snake_case(&name);
            prop_assert_eq!(snake_case(&once), once.clone());
            let snake = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_';
            prop_assert!(once.chars().all(snake));
        }
    }
}
