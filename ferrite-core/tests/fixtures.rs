#![forbid(unsafe_code)]

use std::path::PathBuf;

use ferrite_core::{ApiTable, TranslateOptions, translate_unit};
use ferrite_rir::{
    self as rir, Dependency, Expr, FormatKind, HttpVerb, Receiver, RuntimeHelper, Stmt, Type,
};

const FIXTURES: &[&str] = &[
    "class_state",
    "e2e_complex",
    "e2e_full_stack",
    "e2e_real_api",
    "exec_class",
    "modules_export",
    "test_http",
    "test_stdlib",
    "test_stdlib_simple",
];

fn source(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{name}.ts"));
    std::fs::read_to_string(&path).expect("read fixture")
}

fn translate(name: &str) -> rir::Module {
    let program = ferrite_parse::parse_source(&source(name)).expect("parse");
    let options = TranslateOptions::default();
    translate_unit(&program, &options, &ApiTable::standard(&options))
        .unwrap_or_else(|err| panic!("{name} failed: {:?}", err.errors))
}

fn method<'m>(module: &'m rir::Module, ty: &str, name: &str) -> &'m rir::Function {
    module
        .impl_for(ty)
        .and_then(|block| block.functions.iter().find(|f| f.name == name))
        .unwrap_or_else(|| panic!("no method {ty}::{name}"))
}

/// The expression returned by a function whose body is a single `return`.
fn returned(func: &rir::Function) -> &Expr {
    match func.body.stmts.last() {
        Some(Stmt::Return(Some(e))) => e,
        other => panic!("`{}` does not end in a return: {other:?}", func.name),
    }
}

fn awaited_http(func: &rir::Function) -> (&HttpVerb, &Expr, Option<&Expr>, &Type) {
    match returned(func) {
        Expr::Await(inner) => match inner.as_ref() {
            Expr::Http {
                verb,
                url,
                body,
                response,
            } => (verb, url.as_ref(), body.as_deref(), response),
            other => panic!("not an HTTP request: {other:?}"),
        },
        other => panic!("not awaited: {other:?}"),
    }
}

fn let_init<'m>(func: &'m rir::Function, local: &str) -> &'m Expr {
    func.body
        .stmts
        .iter()
        .find_map(|stmt| match stmt {
            Stmt::Let {
                name, init: Some(init), ..
            } if name == local => Some(init),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no `let {local}` in `{}`", func.name))
}

#[test]
fn every_fixture_translates() {
    for name in FIXTURES {
        let module = translate(name);
        assert!(!module.items.is_empty(), "{name} produced nothing");
    }
}

#[test]
fn translation_is_deterministic() {
    for name in FIXTURES {
        assert_eq!(translate(name), translate(name), "{name}");
    }
}

#[test]
fn exported_items_are_public_and_private_ones_are_kept() {
    let module = translate("modules_export");
    let add = module.function("add").expect("add");
    assert!(add.public);
    assert_eq!(add.params.len(), 2);
    assert_eq!(add.ret, Type::F64);

    let helper = module.function("private_helper").expect("private helper is emitted");
    assert!(!helper.public);
    let Some(Stmt::Expr(Expr::Format { kind, template, .. })) = helper.body.stmts.first() else {
        panic!("console.log was not lowered: {:?}", helper.body.stmts);
    };
    assert_eq!(*kind, FormatKind::Println);
    assert_eq!(template, "Internal");

    assert!(module.struct_def("Calculator").expect("struct").public);
}

#[test]
fn writing_methods_take_self_exclusively() {
    let module = translate("modules_export");
    assert_eq!(method(&module, "Calculator", "add").receiver, Some(Receiver::Exclusive));

    let module = translate("exec_class");
    for name in ["add", "multiply", "get_value"] {
        assert_eq!(method(&module, "Calculator", name).receiver, Some(Receiver::Shared), "{name}");
    }
    let new = method(&module, "Calculator", "new");
    assert_eq!(new.receiver, None);
    assert_eq!(new.ret, Type::Named("Calculator".into()));
}

#[test]
fn unit_statements_become_main() {
    let module = translate("class_state");
    let main = module.function("main").expect("main");
    assert!(!main.is_async);
    assert!(main.attrs.is_empty());

    let mutability: Vec<(&str, bool)> = main
        .body
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Let { name, mutable, .. } => Some((name.as_str(), *mutable)),
            _ => None,
        })
        .collect();
    assert_eq!(mutability, vec![("total", true), ("c", false)]);

    assert_eq!(
        main.body.stmts.last(),
        Some(&Stmt::Expr(Expr::Format {
            kind: FormatKind::Println,
            template: "Final: {}".into(),
            args: vec![Expr::local("total")],
        }))
    );
    assert_eq!(method(&module, "Counter", "add").receiver, Some(Receiver::Shared));
}

#[test]
fn math_calls_go_through_nan_aware_helpers() {
    let module = translate("test_stdlib_simple");
    let test_math = module.function("test_math").expect("test_math");
    assert_eq!(
        let_init(test_math, "max"),
        &Expr::Template {
            template: "ferrite_rt::max({0}, {1})".into(),
            receiver: None,
            args: vec![Expr::f64_lit(10.0), Expr::f64_lit(20.0)],
        }
    );
    assert!(module.helpers.contains(&RuntimeHelper::RoundHalfUp));
    assert!(module.helpers.contains(&RuntimeHelper::MinMax));

    let test_string = module.function("test_string").expect("test_string");
    let Expr::Template { template, .. } = let_init(test_string, "has_error") else {
        panic!("includes was not mapped");
    };
    assert_eq!(template, "{recv}.contains({0})");
}

#[test]
fn callbacks_become_closures() {
    let module = translate("test_stdlib");
    let f = module.function("process_data2").expect("process_data2");
    let Expr::Template { args, .. } = let_init(f, "upper") else {
        panic!("map was not mapped");
    };
    assert!(matches!(
        args.as_slice(),
        [Expr::Closure { by_ref: false, params, .. }] if params == &["p".to_string()]
    ));
    assert!(module.dependencies.contains(&Dependency::Rand));
}

#[test]
fn http_calls_keep_their_urls_and_bodies() {
    let module = translate("test_http");

    let (verb, url, body, response) = awaited_http(module.function("get_with_axios").expect("get"));
    assert_eq!(*verb, HttpVerb::Get);
    assert!(body.is_none());
    assert_eq!(*response, Type::Named("User".into()));
    let Expr::MethodCall { receiver, .. } = url else {
        panic!("url is not borrowed: {url:?}");
    };
    assert!(matches!(
        receiver.as_ref(),
        Expr::Format { template, .. } if template == "https://api.com/users/{}"
    ));

    let (verb, _, body, response) = awaited_http(module.function("post_with_axios").expect("post"));
    assert_eq!(*verb, HttpVerb::Post);
    assert!(body.is_some());
    assert_eq!(*response, Type::Named("ApiResponse".into()));

    let delete = module.function("delete_with_axios").expect("delete");
    let (verb, _, _, response) = awaited_http(delete);
    assert_eq!(*verb, HttpVerb::Delete);
    assert_eq!(*response, Type::Unit);

    let (_, url, _, response) = awaited_http(module.function("fetch_users").expect("fetch"));
    assert_eq!(url, &Expr::str_lit("https://api.com/users"));
    assert_eq!(*response, Type::Json);

    assert!(module.helpers.contains(&RuntimeHelper::Http));
    for dep in [Dependency::Reqwest, Dependency::SerdeJson, Dependency::Serde] {
        assert!(module.dependencies.contains(&dep), "{dep:?}");
    }
}

#[test]
fn async_functions_stay_async() {
    let module = translate("e2e_complex");
    let fetch_user = module.function("fetch_user").expect("fetch_user");
    assert!(fetch_user.is_async);
    assert!(fetch_user.public);
    assert_eq!(fetch_user.ret, Type::Named("User".into()));
    assert!(matches!(
        fetch_user.body.stmts.first(),
        Some(Stmt::Expr(Expr::Await(call)))
            if matches!(call.as_ref(), Expr::Call { func, .. } if func == "dummy_async")
    ));

    let process = module.function("process_user").expect("process_user");
    assert!(!process.is_async);

    let user = module.struct_def("User").expect("User");
    assert!(!user.public);
    assert!(user.serializable);
    let names: Vec<&str> = user.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["id", "name", "isActive"]);
    assert!(module.struct_def("ApiResponse").expect("ApiResponse").public);
}

#[test]
fn service_classes_mix_async_and_sync_methods() {
    let module = translate("e2e_full_stack");
    assert!(method(&module, "UserService", "fetch_user").is_async);
    assert!(method(&module, "UserService", "save_user").is_async);
    let get = method(&module, "UserService", "get_base_url");
    assert!(!get.is_async);
    assert_eq!(get.receiver, Some(Receiver::Shared));
    assert!(!module.struct_def("UserService").expect("struct").serializable);

    let module = translate("e2e_real_api");
    let (verb, _, body, response) = awaited_http(method(&module, "ApiService", "update_post"));
    assert_eq!(*verb, HttpVerb::Put);
    assert!(body.is_some());
    assert_eq!(*response, Type::Named("Post".into()));
}
