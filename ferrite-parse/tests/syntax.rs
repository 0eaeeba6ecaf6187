use ferrite_ast::{AssignOp, BinOp, ExprKind, Item, Stmt, TypeAnnKind};
use ferrite_parse::{parse_expr, parse_source};

#[test]
fn interface_fields_keep_declared_order() {
    let src = "interface User {\n    id: number;\n    name: string;\n    tags?: string[];\n}\n";
    let program = parse_source(src).expect("parse");
    let Item::Interface(decl) = &program.items[0] else {
        panic!("expected interface");
    };
    let names: Vec<&str> = decl.fields.iter().map(|f| f.name.node.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "tags"]);
    assert!(decl.fields[2].optional);
    assert!(matches!(decl.fields[2].ty.kind, TypeAnnKind::Array(_)));
}

#[test]
fn class_with_constructor_and_methods_parses() {
    let src = r#"
export class Counter {
    count: number;
    constructor(start: number) { this.count = start; }

    add(amount: number): number {
        return this.count + amount;
    }

    async load(): Promise<void> {}
}
"#;
    let program = parse_source(src).expect("parse");
    let Item::Class(class) = &program.items[0] else {
        panic!("expected class");
    };
    assert!(class.exported);
    assert_eq!(class.fields.len(), 1);
    assert!(class.constructor.is_some());
    assert_eq!(class.methods.len(), 2);
    assert!(class.methods[1].is_async);
}

#[test]
fn semicolons_are_optional_at_line_ends() {
    let src = "let total = 10\ntotal = total + 20\nconsole.log(total)\n";
    let program = parse_source(src).expect("parse");
    assert_eq!(program.items.len(), 3);
    assert!(matches!(program.items[1], Item::Stmt(Stmt::Assign(_))));
}

#[test]
fn two_statements_on_one_line_need_a_semicolon() {
    let err = parse_source("let a = 1 let b = 2").expect_err("expected parse error");
    let msg = err.to_string();
    assert!(msg.contains("expected `;`"), "unexpected error message: {msg}");
}

#[test]
fn increment_becomes_compound_assignment() {
    let program = parse_source("let i = 0;\ni++;\n").expect("parse");
    let Item::Stmt(Stmt::Assign(assign)) = &program.items[1] else {
        panic!("expected assignment");
    };
    assert_eq!(assign.op, AssignOp::Add);
    assert_eq!(assign.value.kind, ExprKind::NumberLit(1.0));
}

#[test]
fn strict_equality_parses_as_equality() {
    let expr = parse_expr("a === null").expect("parse");
    let ExprKind::Binary { op, right, .. } = expr.kind else {
        panic!("expected binary");
    };
    assert_eq!(op, BinOp::Eq);
    assert_eq!(right.kind, ExprKind::Null);
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let expr = parse_expr("a + b * c").expect("parse");
    let ExprKind::Binary { op, right, .. } = expr.kind else {
        panic!("expected binary");
    };
    assert_eq!(op, BinOp::Add);
    assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
}

#[test]
fn template_substitutions_are_parsed_with_absolute_spans() {
    let src = "let s = `Final: ${total}`;";
    let program = parse_source(src).expect("parse");
    let Item::Stmt(Stmt::Let(decl)) = &program.items[0] else {
        panic!("expected let");
    };
    let Some(init) = &decl.init else {
        panic!("expected initializer");
    };
    let ExprKind::Template { quasis, exprs } = &init.kind else {
        panic!("expected template");
    };
    assert_eq!(quasis, &vec!["Final: ".to_string(), String::new()]);
    assert_eq!(exprs[0].span.offset(), src.find("total").unwrap());
}

#[test]
fn arrow_functions_parse_as_call_arguments() {
    let expr = parse_expr("parts.map(p => p.toUpperCase())").expect("parse");
    let ExprKind::Call { args, .. } = expr.kind else {
        panic!("expected call");
    };
    assert!(matches!(args[0].kind, ExprKind::Arrow { .. }));
}

#[test]
fn object_shorthand_expands_to_named_value() {
    let expr = parse_expr("{ id, name: \"x\" }").expect("parse");
    let ExprKind::ObjectLit(entries) = expr.kind else {
        panic!("expected object literal");
    };
    assert_eq!(entries[0].0.node, "id");
    assert!(matches!(&entries[0].1.kind, ExprKind::Ident(id) if id.node == "id"));
}

#[test]
fn keyword_property_names_are_allowed() {
    let expr = parse_expr("axios.delete(url)").expect("parse");
    let ExprKind::Call { callee, .. } = expr.kind else {
        panic!("expected call");
    };
    assert!(matches!(&callee.kind, ExprKind::Member { property, .. } if property.node == "delete"));
}

#[test]
fn nullable_union_becomes_nullable_type() {
    let program = parse_source("let x: string | null = null;").expect("parse");
    let Item::Stmt(Stmt::Let(decl)) = &program.items[0] else {
        panic!("expected let");
    };
    let ty = decl.ty.as_ref().expect("annotation");
    assert!(matches!(ty.kind, TypeAnnKind::Nullable(_)));
}

#[test]
fn general_unions_are_rejected() {
    let err = parse_source("let x: string | number = 1;").expect_err("expected parse error");
    assert!(err.to_string().contains("union types"), "{err}");
}

#[test]
fn inheritance_is_rejected() {
    let err = parse_source("class A extends B {}").expect_err("expected parse error");
    assert!(err.to_string().contains("inheritance"), "{err}");
}

#[test]
fn generics_are_rejected() {
    let err =
        parse_source("function id<T>(x: T): T { return x; }").expect_err("expected parse error");
    assert!(err.to_string().contains("generic"), "{err}");
}

#[test]
fn decorators_are_rejected() {
    let err = parse_source("@Injectable()\nclass A {}").expect_err("expected parse error");
    assert!(err.to_string().contains("decorators"), "{err}");
}

#[test]
fn return_on_its_own_line_has_no_value() {
    let program = parse_source("function f(): void {\n    return\n    g();\n}\n").expect("parse");
    let Item::Function(func) = &program.items[0] else {
        panic!("expected function");
    };
    assert!(matches!(&func.body.stmts[0], Stmt::Return(r) if r.value.is_none()));
    assert_eq!(func.body.stmts.len(), 2);
}
