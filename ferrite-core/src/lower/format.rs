#![forbid(unsafe_code)]

use ferrite_rir as rir;

use super::Typed;
use crate::types::{PrimitiveType, TargetType};

/// Accumulates a `format!`-family template and its arguments.
#[derive(Default)]
pub(crate) struct FormatBuilder {
    template: String,
    args: Vec<rir::Expr>,
}

impl FormatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '{' => self.template.push_str("{{"),
                '}' => self.template.push_str("}}"),
                other => self.template.push(other),
            }
        }
    }

    /// Literal text is inlined and nested `format!` calls are spliced.
    pub fn value(&mut self, value: Typed) {
        match value.expr {
            rir::Expr::Lit(rir::Lit::Str(s)) => self.text(&s),
            rir::Expr::Format {
                kind: rir::FormatKind::Format,
                template,
                args,
            } => {
                self.template.push_str(&template);
                self.args.extend(args);
            }
            expr => {
                self.template.push_str(placeholder(&value.ty));
                self.args.push(expr);
            }
        }
    }

    pub fn finish(self, kind: rir::FormatKind) -> rir::Expr {
        rir::Expr::Format {
            kind,
            template: self.template,
            args: self.args,
        }
    }
}

fn placeholder(ty: &TargetType) -> &'static str {
    match ty {
        TargetType::Primitive(PrimitiveType::Number | PrimitiveType::Text | PrimitiveType::Boolean)
        | TargetType::Dynamic => "{}",
        _ => "{:?}",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_inlined_and_braces_escaped() {
        let mut b = FormatBuilder::new();
        b.text("{total}: ");
        b.value(Typed::new(rir::Expr::local("total"), TargetType::NUMBER));
        b.value(Typed::new(rir::Expr::str_lit("!"), TargetType::TEXT));
        let rir::Expr::Format { template, args, .. } = b.finish(rir::FormatKind::Println) else {
            panic!("format");
        };
        assert_eq!(template, "{{total}}: {}!");
        assert_eq!(args, vec![rir::Expr::local("total")]);
    }

    #[test]
    fn structured_values_use_debug() {
        let mut b = FormatBuilder::new();
        b.value(Typed::new(rir::Expr::local("items"), TargetType::sequence(TargetType::NUMBER)));
        let rir::Expr::Format { template, .. } = b.finish(rir::FormatKind::Format) else {
            panic!("format");
        };
        assert_eq!(template, "{:?}");
    }
}
