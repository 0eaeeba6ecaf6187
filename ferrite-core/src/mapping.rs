#![forbid(unsafe_code)]

//! The API mapping table: library calls the engine knows how to rewrite.
//!
//! Rows are data. Lowering asks the table for a row matching a call shape and
//! then interprets the row; adding a library mapping never touches lowering
//! control flow. Custom rows (from `ferrite.toml`) are consulted before the
//! standard ones, so a project can override any of them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ferrite_rir::{Dependency, HttpVerb, RuntimeHelper};
use serde::Deserialize;

use crate::options::{Rounding, TextLength, TranslateOptions};

/// What a row's receiver must be.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ReceiverPattern {
    /// A library namespace identifier, e.g. `Math`, `console`, `axios`.
    Namespace(String),
    /// A receiver-less call such as `fetch(url)`.
    Global,
    Text,
    Number,
    /// Any sequence.
    Sequence,
    /// A sequence of text.
    TextSequence,
}

impl FromStr for ReceiverPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "global" => ReceiverPattern::Global,
            "text" => ReceiverPattern::Text,
            "number" => ReceiverPattern::Number,
            "sequence" => ReceiverPattern::Sequence,
            "text-sequence" => ReceiverPattern::TextSequence,
            other => match other.strip_prefix("namespace:") {
                Some(ns) if !ns.is_empty() => ReceiverPattern::Namespace(ns.to_string()),
                _ => {
                    return Err(format!(
                        "unknown receiver `{other}` (expected global, text, number, sequence, \
                         text-sequence or namespace:<Name>)"
                    ));
                }
            },
        })
    }
}

impl TryFrom<String> for ReceiverPattern {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ReceiverPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverPattern::Namespace(ns) => write!(f, "{ns}"),
            ReceiverPattern::Global => write!(f, "<global>"),
            ReceiverPattern::Text => write!(f, "<text>"),
            ReceiverPattern::Number => write!(f, "<number>"),
            ReceiverPattern::Sequence => write!(f, "<sequence>"),
            ReceiverPattern::TextSequence => write!(f, "<text sequence>"),
        }
    }
}

/// How the matched call is rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rewrite {
    /// A call template with `{recv}` and `{N}` holes.
    Template(String),
    /// `println!` with every argument as a format parameter.
    Stdout,
    /// `eprintln!` with every argument as a format parameter.
    Stderr,
    /// A JSON-over-HTTP request: URL first, optional body second.
    Http(HttpVerb),
}

/// How each positional argument is lowered before it fills its hole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgTransform {
    /// A number value.
    Number,
    /// An owned text value.
    Text,
    /// Borrowed text (`&str`).
    Str,
    /// A value of the receiver sequence's element type.
    Element,
    /// A single-expression arrow function over the receiver's elements.
    Closure,
    /// As `Closure`, but the closure is handed references.
    ClosureByRef,
    /// Any value, lowered without an expected type.
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultType {
    Number,
    Text,
    Boolean,
    Unit,
    Dynamic,
    TextSequence,
    /// Same type as the receiver.
    Receiver,
    /// A sequence of the closure argument's result type.
    MappedSequence,
    /// Whatever the call site expects, `Dynamic` if nothing is expected.
    Expected,
}

fn default_args() -> Vec<ArgTransform> {
    Vec::new()
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingRule {
    pub receiver: ReceiverPattern,
    /// Method, function or property name as written in the source.
    pub name: String,
    /// Matches a property read (`s.length`) instead of a call.
    #[serde(default)]
    pub property: bool,
    #[serde(default)]
    pub arity: usize,
    /// Accept `arity` or more arguments.
    #[serde(default)]
    pub variadic: bool,
    pub rewrite: Rewrite,
    /// Per-argument transforms; missing entries default to `Value`.
    #[serde(default = "default_args")]
    pub args: Vec<ArgTransform>,
    pub result: ResultType,
    #[serde(default)]
    pub asynchronous: bool,
    #[serde(default)]
    pub mutates_receiver: bool,
    #[serde(default)]
    pub crates: Vec<Dependency>,
    #[serde(default)]
    pub helper: Option<RuntimeHelper>,
}

impl MappingRule {
    fn new(
        receiver: ReceiverPattern,
        name: &str,
        arity: usize,
        rewrite: Rewrite,
        result: ResultType,
    ) -> Self {
        Self {
            receiver,
            name: name.to_string(),
            property: false,
            arity,
            variadic: false,
            rewrite,
            args: Vec::new(),
            result,
            asynchronous: false,
            mutates_receiver: false,
            crates: Vec::new(),
            helper: None,
        }
    }

    fn template(
        receiver: ReceiverPattern,
        name: &str,
        arity: usize,
        template: &str,
        result: ResultType,
    ) -> Self {
        Self::new(receiver, name, arity, Rewrite::Template(template.to_string()), result)
    }

    fn property(receiver: ReceiverPattern, name: &str, template: &str, result: ResultType) -> Self {
        let mut rule = Self::template(receiver, name, 0, template, result);
        rule.property = true;
        rule
    }

    fn with_args(mut self, args: &[ArgTransform]) -> Self {
        self.args = args.to_vec();
        self
    }

    fn with_crate(mut self, dep: Dependency) -> Self {
        self.crates.push(dep);
        self
    }

    fn with_helper(mut self, helper: RuntimeHelper) -> Self {
        self.helper = Some(helper);
        self
    }

    fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    fn mutating(mut self) -> Self {
        self.mutates_receiver = true;
        self
    }

    fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn accepts(&self, found: usize) -> bool {
        if self.variadic {
            found >= self.arity
        } else {
            found == self.arity
        }
    }

    pub fn arity_text(&self) -> String {
        if self.variadic {
            format!("at least {}", self.arity)
        } else {
            self.arity.to_string()
        }
    }

    pub fn arg_transform(&self, index: usize) -> ArgTransform {
        self.args.get(index).copied().unwrap_or(ArgTransform::Value)
    }

    /// Callee text for diagnostics, e.g. `Math.max` or `<text>.split`.
    pub fn display_name(&self) -> String {
        match &self.receiver {
            ReceiverPattern::Global => self.name.clone(),
            other => format!("{other}.{}", self.name),
        }
    }
}

#[derive(Debug)]
pub enum RuleMatch<'a> {
    Found(&'a MappingRule),
    /// Receiver and name matched but no row takes this many arguments.
    WrongArity(&'a MappingRule),
    NotFound,
}

#[derive(Clone, Debug, Default)]
pub struct ApiTable {
    custom: Vec<MappingRule>,
    standard: Vec<MappingRule>,
}

impl ApiTable {
    /// A table with no rows; every library call is unsupported.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard(options: &TranslateOptions) -> Self {
        Self {
            custom: Vec::new(),
            standard: standard_rows(options),
        }
    }

    /// Adds a row that takes precedence over every standard row.
    pub fn insert(&mut self, rule: MappingRule) {
        self.custom.push(rule);
    }

    pub fn rules(&self) -> impl Iterator<Item = &MappingRule> {
        self.custom.iter().chain(self.standard.iter())
    }

    pub fn len(&self) -> usize {
        self.custom.len() + self.standard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First row whose receiver is one of `receivers` (earlier entries win)
    /// and whose name, kind and arity match.
    pub fn lookup(
        &self,
        receivers: &[ReceiverPattern],
        name: &str,
        property: bool,
        arity: usize,
    ) -> RuleMatch<'_> {
        let mut wrong_arity = None;
        for receiver in receivers {
            for rule in self.rules() {
                if rule.receiver != *receiver || rule.name != name || rule.property != property {
                    continue;
                }
                if property || rule.accepts(arity) {
                    return RuleMatch::Found(rule);
                }
                wrong_arity.get_or_insert(rule);
            }
        }
        match wrong_arity {
            Some(rule) => RuleMatch::WrongArity(rule),
            None => RuleMatch::NotFound,
        }
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.rules()
            .any(|r| matches!(&r.receiver, ReceiverPattern::Namespace(ns) if ns == name))
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.rules()
            .any(|r| r.receiver == ReceiverPattern::Global && r.name == name)
    }

    /// Method names that mutate a value receiver (`push`).
    pub fn mutating_methods(&self) -> BTreeSet<&str> {
        self.rules()
            .filter(|r| r.mutates_receiver && !r.property)
            .map(|r| r.name.as_str())
            .collect()
    }
}

fn standard_rows(options: &TranslateOptions) -> Vec<MappingRule> {
    use ArgTransform as A;
    use ReceiverPattern as R;
    use ResultType as T;

    let math = || R::Namespace("Math".to_string());
    let console = || R::Namespace("console".to_string());
    let axios = || R::Namespace("axios".to_string());
    let json = || R::Namespace("JSON".to_string());

    let round = match options.rounding {
        Rounding::HalfUp => {
            MappingRule::template(math(), "round", 1, "ferrite_rt::round_half_up({0})", T::Number)
                .with_helper(RuntimeHelper::RoundHalfUp)
        }
        Rounding::HalfAwayFromZero => {
            MappingRule::template(math(), "round", 1, "f64::round({0})", T::Number)
        }
    };

    let text_length = match options.text_length {
        TextLength::Utf16 => "{recv}.encode_utf16().count() as f64",
        TextLength::Chars => "{recv}.chars().count() as f64",
        TextLength::Bytes => "{recv}.len() as f64",
    };

    let http = |name: &str, verb: HttpVerb, arity: usize, args: &[ArgTransform]| {
        MappingRule::new(axios(), name, arity, Rewrite::Http(verb), T::Expected)
            .with_args(args)
            .asynchronous()
            .with_crate(Dependency::Reqwest)
            .with_crate(Dependency::SerdeJson)
            .with_crate(Dependency::Serde)
            .with_helper(RuntimeHelper::Http)
    };

    vec![
        MappingRule::template(math(), "max", 2, "ferrite_rt::max({0}, {1})", T::Number)
            .with_args(&[A::Number, A::Number])
            .with_helper(RuntimeHelper::MinMax),
        MappingRule::template(math(), "min", 2, "ferrite_rt::min({0}, {1})", T::Number)
            .with_args(&[A::Number, A::Number])
            .with_helper(RuntimeHelper::MinMax),
        round.with_args(&[A::Number]),
        MappingRule::template(math(), "floor", 1, "f64::floor({0})", T::Number)
            .with_args(&[A::Number]),
        MappingRule::template(math(), "ceil", 1, "f64::ceil({0})", T::Number)
            .with_args(&[A::Number]),
        MappingRule::template(math(), "abs", 1, "f64::abs({0})", T::Number).with_args(&[A::Number]),
        MappingRule::template(math(), "sqrt", 1, "f64::sqrt({0})", T::Number)
            .with_args(&[A::Number]),
        MappingRule::template(math(), "pow", 2, "f64::powf({0}, {1})", T::Number)
            .with_args(&[A::Number, A::Number]),
        MappingRule::template(math(), "random", 0, "rand::random::<f64>()", T::Number)
            .with_crate(Dependency::Rand),
        MappingRule::property(math(), "PI", "std::f64::consts::PI", T::Number),
        MappingRule::property(math(), "E", "std::f64::consts::E", T::Number),
        MappingRule::new(console(), "log", 0, Rewrite::Stdout, T::Unit).variadic(),
        MappingRule::new(console(), "info", 0, Rewrite::Stdout, T::Unit).variadic(),
        MappingRule::new(console(), "error", 0, Rewrite::Stderr, T::Unit).variadic(),
        MappingRule::new(console(), "warn", 0, Rewrite::Stderr, T::Unit).variadic(),
        MappingRule::template(R::Text, "toUpperCase", 0, "{recv}.to_uppercase()", T::Text),
        MappingRule::template(R::Text, "toLowerCase", 0, "{recv}.to_lowercase()", T::Text),
        MappingRule::template(R::Text, "includes", 1, "{recv}.contains({0})", T::Boolean)
            .with_args(&[A::Str]),
        MappingRule::template(R::Text, "startsWith", 1, "{recv}.starts_with({0})", T::Boolean)
            .with_args(&[A::Str]),
        MappingRule::template(R::Text, "endsWith", 1, "{recv}.ends_with({0})", T::Boolean)
            .with_args(&[A::Str]),
        MappingRule::template(
            R::Text,
            "split",
            1,
            "ferrite_rt::split(&{recv}, {0})",
            T::TextSequence,
        )
        .with_args(&[A::Str])
            .with_helper(RuntimeHelper::Split),
        MappingRule::template(R::Text, "trim", 0, "{recv}.trim().to_string()", T::Text),
        MappingRule::template(R::Text, "replace", 2, "{recv}.replacen({0}, {1}, 1)", T::Text)
            .with_args(&[A::Str, A::Str]),
        MappingRule::property(R::Text, "length", text_length, T::Number),
        MappingRule::template(R::Number, "toString", 0, "{recv}.to_string()", T::Text),
        MappingRule::template(
            R::Number,
            "toFixed",
            1,
            "format!(\"{{:.*}}\", {0} as usize, {recv})",
            T::Text,
        )
        .with_args(&[A::Number]),
        MappingRule::template(R::Sequence, "push", 1, "{recv}.push({0})", T::Unit)
            .with_args(&[A::Element])
            .mutating(),
        MappingRule::template(
            R::Sequence,
            "map",
            1,
            "{recv}.iter().cloned().map({0}).collect::<Vec<_>>()",
            T::MappedSequence,
        )
        .with_args(&[A::Closure]),
        MappingRule::template(
            R::Sequence,
            "filter",
            1,
            "{recv}.iter().cloned().filter({0}).collect::<Vec<_>>()",
            T::Receiver,
        )
        .with_args(&[A::ClosureByRef]),
        MappingRule::template(R::Sequence, "includes", 1, "{recv}.contains(&{0})", T::Boolean)
            .with_args(&[A::Element]),
        MappingRule::template(R::TextSequence, "join", 1, "{recv}.join({0})", T::Text)
            .with_args(&[A::Str]),
        MappingRule::property(R::Sequence, "length", "{recv}.len() as f64", T::Number),
        http("get", HttpVerb::Get, 1, &[A::Str]),
        http("delete", HttpVerb::Delete, 1, &[A::Str]),
        http("post", HttpVerb::Post, 2, &[A::Str, A::Value]),
        http("put", HttpVerb::Put, 2, &[A::Str, A::Value]),
        MappingRule::new(R::Global, "fetch", 1, Rewrite::Http(HttpVerb::Get), T::Expected)
            .with_args(&[A::Str])
            .asynchronous()
            .with_crate(Dependency::Reqwest)
            .with_crate(Dependency::SerdeJson)
            .with_crate(Dependency::Serde)
            .with_helper(RuntimeHelper::Http),
        MappingRule::template(
            json(),
            "stringify",
            1,
            "ferrite_rt::stringify(serde_json::to_value(&{0}).unwrap_or_default())",
            T::Text,
        )
        .with_crate(Dependency::SerdeJson)
        .with_helper(RuntimeHelper::JsonText),
        MappingRule::template(
            json(),
            "parse",
            1,
            "serde_json::from_str::<serde_json::Value>({0}).unwrap_or_default()",
            T::Dynamic,
        )
        .with_args(&[A::Str])
        .with_crate(Dependency::SerdeJson),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ApiTable {
        ApiTable::standard(&TranslateOptions::default())
    }

    #[test]
    fn math_rows_match_by_arity() {
        let table = table();
        let ns = [ReceiverPattern::Namespace("Math".into())];
        assert!(matches!(table.lookup(&ns, "max", false, 2), RuleMatch::Found(_)));
        assert!(matches!(
            table.lookup(&ns, "max", false, 3),
            RuleMatch::WrongArity(r) if r.arity == 2
        ));
        assert!(matches!(table.lookup(&ns, "hypot", false, 2), RuleMatch::NotFound));
    }

    #[test]
    fn console_is_variadic() {
        let table = table();
        let ns = [ReceiverPattern::Namespace("console".into())];
        for n in [0, 1, 5] {
            let RuleMatch::Found(rule) = table.lookup(&ns, "log", false, n) else {
                panic!("console.log/{n} should match");
            };
            assert_eq!(rule.rewrite, Rewrite::Stdout);
        }
    }

    #[test]
    fn rounding_option_selects_the_row() {
        let ns = [ReceiverPattern::Namespace("Math".into())];
        let half_up = table();
        let RuleMatch::Found(rule) = half_up.lookup(&ns, "round", false, 1) else { panic!() };
        assert_eq!(rule.helper, Some(RuntimeHelper::RoundHalfUp));

        let opts = TranslateOptions {
            rounding: Rounding::HalfAwayFromZero,
            ..TranslateOptions::default()
        };
        let plain = ApiTable::standard(&opts);
        let RuleMatch::Found(rule) = plain.lookup(&ns, "round", false, 1) else { panic!() };
        assert_eq!(rule.rewrite, Rewrite::Template("f64::round({0})".into()));
        assert_eq!(rule.helper, None);
    }

    #[test]
    fn custom_rows_take_precedence() {
        let mut table = table();
        let mut rule = MappingRule::template(
            ReceiverPattern::Namespace("Math".into()),
            "max",
            2,
            "my_max({0}, {1})",
            ResultType::Number,
        );
        rule.args = vec![ArgTransform::Number, ArgTransform::Number];
        table.insert(rule);
        let ns = [ReceiverPattern::Namespace("Math".into())];
        let RuleMatch::Found(found) = table.lookup(&ns, "max", false, 2) else { panic!() };
        assert_eq!(found.rewrite, Rewrite::Template("my_max({0}, {1})".into()));
    }

    #[test]
    fn earlier_receiver_patterns_win() {
        let table = table();
        let both = [ReceiverPattern::Sequence, ReceiverPattern::Text];
        let RuleMatch::Found(rule) = table.lookup(&both, "length", true, 0) else { panic!() };
        assert_eq!(rule.receiver, ReceiverPattern::Sequence);
    }

    #[test]
    fn rows_deserialize_from_toml() {
        let rule: MappingRule = toml::from_str(
            r#"
            receiver = "namespace:lodash"
            name = "clamp"
            arity = 3
            rewrite = { template = "f64::clamp({0}, {1}, {2})" }
            args = ["number", "number", "number"]
            result = "number"
            "#,
        )
        .expect("rule");
        assert_eq!(rule.receiver, ReceiverPattern::Namespace("lodash".into()));
        assert_eq!(rule.arg_transform(2), ArgTransform::Number);
        assert_eq!(rule.arg_transform(7), ArgTransform::Value);

        let http: MappingRule = toml::from_str(
            r#"
            receiver = "namespace:client"
            name = "fetchJson"
            arity = 1
            rewrite = { http = "get" }
            result = "expected"
            asynchronous = true
            crates = ["reqwest", "serde-json", "serde"]
            helper = "http"
            "#,
        )
        .expect("rule");
        assert_eq!(http.rewrite, Rewrite::Http(HttpVerb::Get));
        assert!(http.crates.contains(&Dependency::SerdeJson));

        let bad = toml::from_str::<MappingRule>(
            "receiver = \"somewhere\"\nname = \"x\"\nrewrite = \"stdout\"\nresult = \"unit\"\n",
        );
        assert!(bad.is_err());
    }

    #[test]
    fn namespaces_and_mutators_are_known() {
        let table = table();
        assert!(table.is_namespace("axios"));
        assert!(!table.is_namespace("fetch"));
        assert!(table.is_global("fetch"));
        assert!(table.mutating_methods().contains("push"));
    }
}
