#![forbid(unsafe_code)]

use ferrite_core::{
    ApiTable, AsyncFallback, DiagnosticKind, MappingRule, TranslateError, TranslateOptions,
    UnitFailed, translate_unit,
};
use ferrite_rir::{self as rir, Dependency, Expr, Receiver, Stmt, Type};

fn translate_with(
    src: &str,
    options: &TranslateOptions,
    api: &ApiTable,
) -> Result<rir::Module, UnitFailed> {
    let program = ferrite_parse::parse_source(src).expect("parse");
    translate_unit(&program, options, api)
}

fn translate(src: &str) -> Result<rir::Module, UnitFailed> {
    let options = TranslateOptions::default();
    translate_with(src, &options, &ApiTable::standard(&options))
}

fn ok(src: &str) -> rir::Module {
    translate(src).unwrap_or_else(|err| panic!("unexpected errors: {:?}", err.errors))
}

fn kinds(src: &str) -> Vec<DiagnosticKind> {
    match translate(src) {
        Ok(_) => panic!("expected the unit to fail"),
        Err(err) => err.kinds(),
    }
}

fn returned<'m>(module: &'m rir::Module, func: &str) -> &'m Expr {
    let f = module.function(func).expect("function");
    match f.body.stmts.last() {
        Some(Stmt::Return(Some(e))) => e,
        other => panic!("`{func}` does not end in a return: {other:?}"),
    }
}

#[test]
fn unmapped_library_call_is_reported_at_the_call() {
    let src = "function f(): void {\n    lodash.chunk([1, 2], 1);\n}\n";
    let err = translate(src).unwrap_err();
    assert_eq!(err.errors.len(), 1);
    match &err.errors[0] {
        TranslateError::UnsupportedCall { callee, span } => {
            assert_eq!(callee, "lodash.chunk");
            assert_eq!(span.offset(), src.find("lodash").expect("offset"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn wrong_argument_counts_are_arity_mismatches() {
    let src = "function add(a: number, b: number): number { return a + b; }\nconst x = add(1);\n";
    let err = translate(src).unwrap_err();
    assert!(matches!(
        &err.errors[..],
        [TranslateError::ArityMismatch { expected, found: 1, .. }] if expected == "2"
    ));

    assert_eq!(kinds("const m = Math.max(1, 2, 3);\n"), vec![DiagnosticKind::ArityMismatch]);
}

#[test]
fn object_literals_are_checked_against_records() {
    assert_eq!(
        kinds(
            "interface User { id: number; }\n\
             function make(): User { return { id: 1, nickname: \"x\" }; }\n"
        ),
        vec![DiagnosticKind::ExtraField]
    );
    assert_eq!(
        kinds(
            "interface User { id: number; name: string; }\n\
             function make(): User { return { id: 1 }; }\n"
        ),
        vec![DiagnosticKind::MissingField]
    );

    let module = ok("interface User { id: number; email?: string; }\n\
                     function make(): User { return { id: 1 }; }\n");
    assert_eq!(
        returned(&module, "make"),
        &Expr::StructLit {
            name: "User".into(),
            fields: vec![("id".into(), Expr::f64_lit(1.0)), ("email".into(), Expr::None)],
        }
    );
}

#[test]
fn duplicate_declarations_are_reported_once() {
    assert_eq!(
        kinds("function a(): void {}\nfunction a(): void {}\n"),
        vec![DiagnosticKind::DuplicateDeclaration]
    );
    assert_eq!(
        kinds("function main(): void {}\nconsole.log(\"hi\");\n"),
        vec![DiagnosticKind::DuplicateDeclaration]
    );
}

#[test]
fn uninitialized_class_fields_are_missing() {
    let src = "class A {\n  x: number;\n  y: number;\n  constructor() { this.x = 1; }\n}\n";
    let err = translate(src).unwrap_err();
    assert!(matches!(
        &err.errors[..],
        [TranslateError::MissingField { ty, field, .. }] if ty == "A" && field == "y"
    ));
}

#[test]
fn field_initializers_seed_the_constructor() {
    let module = ok("class Counter {
  count: number = 0;
  label?: string;
  increment(): void { this.count += 1; }
}
const c = new Counter();
c.increment();
");
    let block = module.impl_for("Counter").expect("impl");
    let new = &block.functions[0];
    assert_eq!(new.name, "new");
    assert_eq!(
        new.body.stmts,
        vec![
            Stmt::Let {
                name: "this_count".into(),
                mutable: false,
                ty: Some(Type::F64),
                init: Some(Expr::f64_lit(0.0)),
            },
            Stmt::Let {
                name: "this_label".into(),
                mutable: false,
                ty: Some(Type::Option(Box::new(Type::String))),
                init: Some(Expr::None),
            },
            Stmt::Return(Some(Expr::StructLit {
                name: "Self".into(),
                fields: vec![
                    ("count".into(), Expr::local("this_count")),
                    ("label".into(), Expr::local("this_label")),
                ],
            })),
        ]
    );
    assert_eq!(block.functions[1].receiver, Some(Receiver::Exclusive));

    let main = module.function("main").expect("main");
    assert!(matches!(
        main.body.stmts.first(),
        Some(Stmt::Let { name, mutable: true, .. }) if name == "c"
    ));
}

#[test]
fn omitted_optional_arguments_are_none() {
    let module = ok("function greet(name: string, title?: string): string {
  if (title === undefined) { return name; }
  return name + \"!\";
}
const a = greet(\"x\");
");
    let main = module.function("main").expect("main");
    let Some(Stmt::Let { init: Some(init), .. }) = main.body.stmts.first() else {
        panic!("no binding");
    };
    assert_eq!(
        init,
        &Expr::Call {
            func: "greet".into(),
            args: vec![Expr::OwnedText(Box::new(Expr::str_lit("x"))), Expr::None],
        }
    );

    let greet = module.function("greet").expect("greet");
    let Some(Stmt::If { cond, .. }) = greet.body.stmts.first() else {
        panic!("no if");
    };
    assert!(matches!(cond, Expr::MethodCall { method, .. } if method == "is_none"));
}

#[test]
fn synchronous_callers_of_async_functions_follow_the_fallback() {
    let src = "async function load(): Promise<number> { return 1; }\n\
               function useIt(): number { return load(); }\n";
    assert_eq!(kinds(src), vec![DiagnosticKind::UnsupportedConstruct]);

    let options = TranslateOptions {
        async_fallback: AsyncFallback::BlockOn,
        ..TranslateOptions::default()
    };
    let module = translate_with(src, &options, &ApiTable::standard(&options)).expect("block-on");
    assert_eq!(
        returned(&module, "use_it"),
        &Expr::BlockOn(Box::new(Expr::Call {
            func: "load".into(),
            args: vec![],
        }))
    );
    assert!(module.dependencies.contains(&Dependency::Futures));
}

#[test]
fn async_results_must_be_awaited_in_async_code() {
    assert_eq!(
        kinds(
            "async function load(): Promise<number> { return 1; }\n\
             async function run(): Promise<void> { const x = load(); }\n"
        ),
        vec![DiagnosticKind::UnsupportedConstruct]
    );
    assert_eq!(
        kinds("function f(): void { await g(); }\nasync function g(): Promise<void> {}\n"),
        vec![DiagnosticKind::UnsupportedConstruct]
    );
}

#[test]
fn top_level_await_makes_main_async() {
    let module = ok("async function load(): Promise<number> { return 1; }\n\
                     const x = await load();\nconsole.log(x);\n");
    let main = module.function("main").expect("main");
    assert!(main.is_async);
    assert_eq!(main.attrs, vec!["tokio::main".to_string()]);
    assert!(module.dependencies.contains(&Dependency::Tokio));
}

#[test]
fn user_declarations_shadow_library_globals() {
    let module = ok("function fetch(url: string): string { return url; }\n\
                     function g(): string { return fetch(\"a\"); }\n");
    assert_eq!(
        returned(&module, "g"),
        &Expr::Call {
            func: "fetch".into(),
            args: vec![Expr::OwnedText(Box::new(Expr::str_lit("a")))],
        }
    );
    assert!(module.helpers.is_empty());
}

#[test]
fn dynamic_values_never_narrow_implicitly() {
    assert_eq!(
        kinds("function f(data: any): number { return data; }\n"),
        vec![DiagnosticKind::TypeMismatch]
    );
    let module = ok("function f(): any { return 1; }\n");
    assert_eq!(returned(&module, "f"), &Expr::Json(Box::new(Expr::f64_lit(1.0))));
}

#[test]
fn loops_and_compound_assignment_mark_bindings_mutable() {
    let module = ok("function sum(n: number): number {
  let total = 0;
  let i = 0;
  while (i < n) { total += i; i++; }
  return total;
}
");
    let f = module.function("sum").expect("sum");
    assert!(matches!(&f.body.stmts[0], Stmt::Let { name, mutable: true, .. } if name == "total"));
    assert!(matches!(&f.body.stmts[1], Stmt::Let { name, mutable: true, .. } if name == "i"));
    let Stmt::While { body, .. } = &f.body.stmts[2] else {
        panic!("no loop");
    };
    assert_eq!(
        body.stmts[1],
        Stmt::Assign {
            target: Expr::local("i"),
            op: Some(rir::BinOp::Add),
            value: Expr::f64_lit(1.0),
        }
    );
    assert_eq!(f.body.stmts[3], Stmt::Return(Some(Expr::local("total"))));
}

#[test]
fn text_values_are_cloned_not_moved() {
    let module = ok("function f(s: string): string { const t = s; return s; }\n");
    let f = module.function("f").expect("f");
    assert!(matches!(
        &f.body.stmts[0],
        Stmt::Let { init: Some(Expr::Clone(inner)), .. } if **inner == Expr::local("s")
    ));
}

#[test]
fn custom_rows_extend_the_table() {
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
    let options = TranslateOptions::default();
    let mut api = ApiTable::standard(&options);
    api.insert(rule);

    let src = "function f(x: number): number { return lodash.clamp(x, 0, 10); }\n";
    let module = translate_with(src, &options, &api).expect("translate");
    assert_eq!(
        returned(&module, "f"),
        &Expr::Template {
            template: "f64::clamp({0}, {1}, {2})".into(),
            receiver: None,
            args: vec![Expr::local("x"), Expr::f64_lit(0.0), Expr::f64_lit(10.0)],
        }
    );
}

#[test]
fn null_literals_fill_optionals() {
    let module = ok("function f(): string | null { return null; }\n");
    assert_eq!(returned(&module, "f"), &Expr::None);
    let f = module.function("f").expect("f");
    assert_eq!(f.ret, Type::Option(Box::new(Type::String)));
}

const COUNTER: &str = "class Counter {
  count: number = 0;
  increment(): void { this.count += 1; }
}
";

fn call_args<'m>(module: &'m rir::Module, caller: &str, callee: &str) -> &'m [Expr] {
    let f = module.function(caller).expect("caller");
    f.body
        .stmts
        .iter()
        .find_map(|stmt| match stmt {
            Stmt::Expr(Expr::Call { func, args }) if func == callee => Some(args.as_slice()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("`{caller}` never calls `{callee}`"))
}

#[test]
fn instances_handed_to_writers_are_borrowed_mutably() {
    let module = ok(&format!(
        "{COUNTER}function bump(c: Counter): void {{ c.increment(); }}
function peek(c: Counter): number {{ return c.count; }}
const c = new Counter();
bump(c);
console.log(peek(c));
"
    ));
    let bump = module.function("bump").expect("bump");
    assert_eq!(bump.params[0].passing, rir::Passing::Exclusive);
    assert!(!bump.params[0].mutable);
    let peek = module.function("peek").expect("peek");
    assert_eq!(peek.params[0].passing, rir::Passing::Shared);

    assert_eq!(call_args(&module, "main", "bump"), [Expr::RefMut(Box::new(Expr::local("c")))]);
    let main = module.function("main").expect("main");
    assert!(matches!(
        main.body.stmts.first(),
        Some(Stmt::Let { name, mutable: true, .. }) if name == "c"
    ));
}

#[test]
fn array_writes_propagate_through_helpers() {
    let module = ok("function add(xs: number[], x: number): void { xs.push(x); }
function relay(xs: number[]): void { add(xs, 1); }
function size(xs: number[]): number { return xs.length; }
let items: number[] = [];
relay(items);
console.log(size(items));
");
    for name in ["add", "relay"] {
        let f = module.function(name).expect(name);
        assert_eq!(f.params[0].passing, rir::Passing::Exclusive, "{name}");
    }
    assert_eq!(
        module.function("size").expect("size").params[0].passing,
        rir::Passing::Shared
    );
    // Already a reference inside `relay`.
    assert_eq!(call_args(&module, "relay", "add")[0], Expr::local("xs"));
    assert_eq!(
        call_args(&module, "main", "relay"),
        [Expr::RefMut(Box::new(Expr::local("items")))]
    );
}

#[test]
fn second_names_for_written_objects_are_rejected() {
    let aliased = format!("{COUNTER}const a = new Counter();\nconst b = a;\nb.increment();\n");
    assert_eq!(kinds(&aliased), vec![DiagnosticKind::UnsupportedConstruct]);

    let field = "class Bag {
  items: number[] = [];
  add(x: number): void {
    const it = this.items;
    it.push(x);
  }
}
";
    assert_eq!(kinds(field), vec![DiagnosticKind::UnsupportedConstruct]);

    // Neither name is written through, so the copy is indistinguishable.
    ok(&format!("{COUNTER}const a = new Counter();\nconst b = a;\nconsole.log(b.count);\n"));
}

#[test]
fn borrowed_parameters_are_not_reassigned() {
    let src = format!("{COUNTER}function reset(c: Counter): void {{ c = new Counter(); }}\n");
    assert_eq!(kinds(&src), vec![DiagnosticKind::UnsupportedConstruct]);

    // Writing a field through the parameter is fine.
    let module = ok(&format!(
        "{COUNTER}function zero(c: Counter): void {{ c.count = 0; }}
const c = new Counter();
zero(c);
"
    ));
    let zero = module.function("zero").expect("zero");
    assert_eq!(zero.params[0].passing, rir::Passing::Exclusive);
}

#[test]
fn conflicting_borrows_in_one_call_are_rejected() {
    let src = format!(
        "{COUNTER}function merge(a: Counter, b: Counter): void {{ a.increment(); }}
const c = new Counter();
merge(c, c);
"
    );
    assert_eq!(kinds(&src), vec![DiagnosticKind::UnsupportedConstruct]);
}

#[test]
fn instance_identity_is_not_compared() {
    let src = format!(
        "{COUNTER}const a = new Counter();
const b = new Counter();
const same = a === b;
"
    );
    assert_eq!(kinds(&src), vec![DiagnosticKind::UnsupportedConstruct]);
}

#[test]
fn untyped_values_print_like_the_source() {
    let module = ok("function show(data: any): string { return `got ${data}`; }
function dump(data: any): string { return JSON.stringify(data); }
");
    let Expr::Format { template, args, .. } = returned(&module, "show") else {
        panic!("template literal was not formatted");
    };
    assert_eq!(template, "got {}");
    assert!(matches!(
        args.as_slice(),
        [Expr::Template { template, .. }] if template == "ferrite_rt::display(&{0})"
    ));
    let Expr::Template { template, .. } = returned(&module, "dump") else {
        panic!("stringify was not mapped");
    };
    assert!(template.starts_with("ferrite_rt::stringify("), "{template}");
    assert!(module.helpers.contains(&rir::RuntimeHelper::JsonText));
}

#[test]
fn self_containing_records_fail_the_unit() {
    assert_eq!(
        kinds("interface Node { value: number; next?: Node; }\n"),
        vec![DiagnosticKind::UnsupportedConstruct]
    );
}

proptest::proptest! {
    #[test]
    fn translation_is_deterministic(
        name in "v[a-z]{0,5}",
        values in proptest::collection::vec(0u16..1000, 1..6),
    ) {
        let body: Vec<String> =
            values.iter().map(|v| format!("    {name} = {name} + {v};\n")).collect();
        let src = format!(
            "function total(): number {{\n    let {name} = 0;\n{}    return {name};\n}}\n\
             console.log(total());\n",
            body.concat()
        );
        let first = translate(&src).map_err(|e| format!("{:?}", e.errors));
        let second = translate(&src).map_err(|e| format!("{:?}", e.errors));
        proptest::prop_assert!(first.is_ok(), "{first:?}");
        proptest::prop_assert_eq!(first, second);
    }
}
