#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use ferrite_ast::{
    ClassDecl, FieldDecl, FunctionDecl, InterfaceDecl, Item, Param, Program, Span, TypeAnn,
};
use tracing::debug;

use crate::error::TranslateError;
use crate::naming::{rust_ident, value_name};
use crate::types::{TargetType, TypeMapper, TypePosition};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Interface,
    Class,
    Function,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSig {
    /// Source name, emitted verbatim apart from keyword escaping.
    pub name: String,
    pub rust_name: String,
    /// Already `Optional` when the field is declared with `?`.
    pub ty: TargetType,
    pub optional: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: TargetType,
    pub optional: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FnSig {
    pub params: Vec<ParamSig>,
    /// `AsyncResult(T)` for async functions.
    pub ret: TargetType,
    pub is_async: bool,
    /// The source spelled out a return type.
    pub ret_declared: bool,
}

impl FnSig {
    pub fn required_params(&self) -> usize {
        self.params.iter().take_while(|p| !p.optional).count()
    }

    pub fn arity_text(&self) -> String {
        let required = self.required_params();
        if required == self.params.len() {
            required.to_string()
        } else {
            format!("{required} to {}", self.params.len())
        }
    }

    pub fn accepts(&self, found: usize) -> bool {
        found >= self.required_params() && found <= self.params.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodSig {
    pub name: String,
    pub rust_name: String,
    pub sig: FnSig,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordSig {
    pub fields: Vec<FieldSig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassSig {
    pub fields: Vec<FieldSig>,
    pub ctor_params: Vec<ParamSig>,
    pub methods: Vec<MethodSig>,
}

impl ClassSig {
    pub fn ctor_sig(&self) -> FnSig {
        FnSig {
            params: self.ctor_params.clone(),
            ret: TargetType::UNIT,
            is_async: false,
            ret_declared: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Signature {
    /// Registered in the first pass, not yet resolved.
    Pending,
    Record(RecordSig),
    Class(ClassSig),
    Function(FnSig),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub exported: bool,
    pub span: Span,
    /// Name of the generated item.
    pub rust_name: String,
    pub signature: Signature,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name).map(|&i| &self.symbols[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn function(&self, name: &str) -> Option<&FnSig> {
        match &self.get(name)?.signature {
            Signature::Function(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassSig> {
        match &self.get(name)?.signature {
            Signature::Class(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn record(&self, name: &str) -> Option<&RecordSig> {
        match &self.get(name)?.signature {
            Signature::Record(sig) => Some(sig),
            _ => None,
        }
    }

    /// Fields of an interface or class.
    pub fn fields_of(&self, name: &str) -> Option<&[FieldSig]> {
        match &self.get(name)?.signature {
            Signature::Record(sig) => Some(&sig.fields),
            Signature::Class(sig) => Some(&sig.fields),
            _ => None,
        }
    }

    pub fn method(&self, class: &str, method: &str) -> Option<&MethodSig> {
        self.class(class)?.methods.iter().find(|m| m.name == method)
    }

    fn insert(&mut self, symbol: Symbol) {
        self.by_name.insert(symbol.name.clone(), self.symbols.len());
        self.symbols.push(symbol);
    }
}

/// Builds the unit's symbol table.
///
/// Every top-level name is registered before any signature is resolved, so
/// declarations may refer to names declared later in the file.
pub fn resolve(program: &Program) -> (SymbolTable, Vec<TranslateError>) {
    let mut table = SymbolTable::default();
    let mut errors = Vec::new();

    // Rust keeps types and values in separate namespaces.
    let mut emitted_types: HashMap<String, Span> = HashMap::new();
    let mut emitted_fns: HashMap<String, Span> = HashMap::new();

    for item in &program.items {
        let (name, kind, exported) = match item {
            Item::Interface(d) => (&d.name, SymbolKind::Interface, d.exported),
            Item::Class(d) => (&d.name, SymbolKind::Class, d.exported),
            Item::Function(d) => (&d.name, SymbolKind::Function, d.exported),
            Item::Stmt(_) => continue,
        };

        if let Some(first) = table.get(&name.node) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: name.node.clone(),
                span: name.span,
                first: first.span,
            });
            continue;
        }

        let rust_name = match kind {
            SymbolKind::Function => value_name(&name.node),
            _ => rust_ident(&name.node),
        };
        let emitted = match kind {
            SymbolKind::Function => &mut emitted_fns,
            _ => &mut emitted_types,
        };
        if let Some(&first) = emitted.get(&rust_name) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: rust_name.clone(),
                span: name.span,
                first,
            });
            continue;
        }
        emitted.insert(rust_name.clone(), name.span);

        table.insert(Symbol {
            name: name.node.clone(),
            kind,
            exported,
            span: name.span,
            rust_name,
            signature: Signature::Pending,
        });
    }

    // Unit-scope statements become the generated `main`.
    let first_stmt = program.items.iter().find_map(|item| match item {
        Item::Stmt(stmt) => Some(stmt.span()),
        _ => None,
    });
    if let (Some(stmt_span), Some(&main_span)) = (first_stmt, emitted_fns.get("main")) {
        errors.push(TranslateError::DuplicateDeclaration {
            name: "main".to_string(),
            span: main_span,
            first: stmt_span,
        });
    }

    debug!(symbols = table.len(), "registered top-level names");

    let mut resolved = Vec::with_capacity(table.len());
    {
        let mapper = TypeMapper::new(&table);
        for item in &program.items {
            let (name, signature) = match item {
                Item::Interface(d) => {
                    (&d.name, Signature::Record(interface_sig(&mapper, d, &mut errors)))
                }
                Item::Class(d) => (&d.name, Signature::Class(class_sig(&mapper, d, &mut errors))),
                Item::Function(d) => {
                    (&d.name, Signature::Function(function_sig(&mapper, d, &mut errors)))
                }
                Item::Stmt(_) => continue,
            };
            // Skipped duplicates keep the first declaration's signature.
            let first = table.get(&name.node).is_some_and(|s| s.span == name.span);
            if first {
                resolved.push((name.node.clone(), signature));
            }
        }
    }

    for (name, signature) in resolved {
        if let Some(&i) = table.by_name.get(&name) {
            table.symbols[i].signature = signature;
        }
    }
    errors.extend(inline_cycles(&table));

    (table, errors)
}

/// `T` and `Option<T>` fields are stored inline, so a type that reaches
/// itself through them has no finite size. Arrays live on the heap.
fn inline_cycles(table: &SymbolTable) -> Vec<TranslateError> {
    let mut errors = Vec::new();
    for symbol in table.iter() {
        let Some(fields) = table.fields_of(&symbol.name) else {
            continue;
        };
        let cycle = fields.iter().find_map(|field| {
            let next = inline_named(&field.ty)?;
            reaches(table, next, &symbol.name, &mut HashSet::new()).then_some((field, next))
        });
        if let Some((field, next)) = cycle {
            errors.push(TranslateError::unsupported(
                format!(
                    "`{}.{}` makes every `{}` contain another; \
                     hold it in an array (`{next}[]`) instead",
                    symbol.name, field.name, symbol.name
                ),
                field.span,
            ));
        }
    }
    errors
}

fn inline_named(ty: &TargetType) -> Option<&str> {
    match ty {
        TargetType::Named(name) => Some(name.as_str()),
        TargetType::Optional(inner) => inline_named(inner),
        _ => None,
    }
}

fn reaches<'t>(
    table: &'t SymbolTable,
    from: &'t str,
    goal: &str,
    seen: &mut HashSet<&'t str>,
) -> bool {
    if from == goal {
        return true;
    }
    if !seen.insert(from) {
        return false;
    }
    table
        .fields_of(from)
        .into_iter()
        .flatten()
        .filter_map(|field| inline_named(&field.ty))
        .any(|next| reaches(table, next, goal, seen))
}

fn map_or_dynamic(
    mapper: &TypeMapper<'_>,
    ann: &TypeAnn,
    pos: TypePosition,
    errors: &mut Vec<TranslateError>,
) -> TargetType {
    mapper.map(ann, pos).unwrap_or_else(|err| {
        errors.push(err);
        TargetType::Dynamic
    })
}

fn field_sigs(
    mapper: &TypeMapper<'_>,
    owner: &str,
    fields: &[FieldDecl],
    errors: &mut Vec<TranslateError>,
) -> Vec<FieldSig> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        if let Some(&first) = seen.get(field.name.node.as_str()) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: format!("{owner}.{}", field.name.node),
                span: field.name.span,
                first,
            });
            continue;
        }
        seen.insert(&field.name.node, field.name.span);

        let ty = map_or_dynamic(mapper, &field.ty, TypePosition::Value, errors);
        let ty = if field.optional {
            TargetType::optional(ty)
        } else {
            ty
        };
        out.push(FieldSig {
            name: field.name.node.clone(),
            rust_name: rust_ident(&field.name.node),
            optional: matches!(ty, TargetType::Optional(_)),
            ty,
            span: field.name.span,
        });
    }
    out
}

fn param_sigs(
    mapper: &TypeMapper<'_>,
    owner: &str,
    params: &[Param],
    errors: &mut Vec<TranslateError>,
) -> Vec<ParamSig> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    let mut emitted: HashMap<String, Span> = HashMap::new();
    let mut out = Vec::with_capacity(params.len());
    let mut saw_optional: Option<Span> = None;

    for param in params {
        if let Some(&first) = seen.get(param.name.node.as_str()) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: format!("{owner}({})", param.name.node),
                span: param.name.span,
                first,
            });
            continue;
        }
        seen.insert(&param.name.node, param.name.span);
        let rust = value_name(&param.name.node);
        if let Some(&first) = emitted.get(&rust) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: rust,
                span: param.name.span,
                first,
            });
            continue;
        }
        emitted.insert(rust, param.name.span);

        if param.optional {
            saw_optional = Some(param.span);
        } else if let Some(opt_span) = saw_optional {
            errors.push(TranslateError::unsupported(
                "a required parameter cannot follow an optional one",
                opt_span,
            ));
        }

        // Untyped parameters carry dynamic values.
        let ty = match &param.ty {
            Some(ann) => map_or_dynamic(mapper, ann, TypePosition::Value, errors),
            None => TargetType::Dynamic,
        };
        let ty = if param.optional {
            TargetType::optional(ty)
        } else {
            ty
        };
        out.push(ParamSig {
            name: param.name.node.clone(),
            optional: param.optional,
            ty,
            span: param.name.span,
        });
    }
    out
}

fn fn_sig(
    mapper: &TypeMapper<'_>,
    owner: &str,
    params: &[Param],
    ret: Option<&TypeAnn>,
    is_async: bool,
    errors: &mut Vec<TranslateError>,
) -> FnSig {
    let params = param_sigs(mapper, owner, params, errors);
    let ret_ty = mapper.map_return(ret, is_async).unwrap_or_else(|err| {
        errors.push(err);
        if is_async {
            TargetType::AsyncResult(Box::new(TargetType::Dynamic))
        } else {
            TargetType::Dynamic
        }
    });
    FnSig {
        params,
        ret: ret_ty,
        is_async,
        ret_declared: ret.is_some(),
    }
}

fn interface_sig(
    mapper: &TypeMapper<'_>,
    decl: &InterfaceDecl,
    errors: &mut Vec<TranslateError>,
) -> RecordSig {
    RecordSig {
        fields: field_sigs(mapper, &decl.name.node, &decl.fields, errors),
    }
}

fn function_sig(
    mapper: &TypeMapper<'_>,
    decl: &FunctionDecl,
    errors: &mut Vec<TranslateError>,
) -> FnSig {
    fn_sig(
        mapper,
        &decl.name.node,
        &decl.params,
        decl.ret.as_ref(),
        decl.is_async,
        errors,
    )
}

fn class_sig(
    mapper: &TypeMapper<'_>,
    decl: &ClassDecl,
    errors: &mut Vec<TranslateError>,
) -> ClassSig {
    let class = decl.name.node.as_str();
    let fields = field_sigs(mapper, class, &decl.fields, errors);

    let ctor_params = match &decl.constructor {
        Some(ctor) => param_sigs(mapper, &format!("{class}.constructor"), &ctor.params, errors),
        None => Vec::new(),
    };

    let mut methods: Vec<MethodSig> = Vec::with_capacity(decl.methods.len());
    let mut emitted: HashMap<String, Span> = HashMap::new();
    for method in &decl.methods {
        if let Some(first) = methods.iter().find(|m| m.name == method.name.node) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: format!("{class}.{}", method.name.node),
                span: method.name.span,
                first: first.span,
            });
            continue;
        }
        let rust_name = value_name(&method.name.node);
        if rust_name == "new" {
            errors.push(TranslateError::DuplicateDeclaration {
                name: format!("{class}::new"),
                span: method.name.span,
                first: decl
                    .constructor
                    .as_ref()
                    .map(|c| c.span)
                    .unwrap_or(decl.name.span),
            });
            continue;
        }
        if let Some(&first) = emitted.get(&rust_name) {
            errors.push(TranslateError::DuplicateDeclaration {
                name: format!("{class}::{rust_name}"),
                span: method.name.span,
                first,
            });
            continue;
        }
        emitted.insert(rust_name.clone(), method.name.span);

        let owner = format!("{class}.{}", method.name.node);
        methods.push(MethodSig {
            name: method.name.node.clone(),
            rust_name,
            sig: fn_sig(
                mapper,
                &owner,
                &method.params,
                method.ret.as_ref(),
                method.is_async,
                errors,
            ),
            span: method.name.span,
        });
    }

    ClassSig {
        fields,
        ctor_params,
        methods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;

    fn parse(src: &str) -> Program {
        ferrite_parse::parse_source(src).expect("parse")
    }

    #[test]
    fn forward_references_resolve() {
        let program = parse(
            "function make(): User { return { id: 1 }; }\ninterface User { id: number; }\n",
        );
        let (table, errors) = resolve(&program);
        assert!(errors.is_empty(), "{errors:?}");
        let sig = table.function("make").expect("function");
        assert_eq!(sig.ret, TargetType::Named("User".into()));
    }

    #[test]
    fn duplicate_top_level_names_are_reported() {
        let program = parse("function a(): void {}\nfunction a(): void {}\n");
        let (_, errors) = resolve(&program);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), DiagnosticKind::DuplicateDeclaration);
    }

    #[test]
    fn snake_case_collisions_are_duplicates() {
        let program = parse("function getUser(): void {}\nfunction get_user(): void {}\n");
        let (_, errors) = resolve(&program);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            TranslateError::DuplicateDeclaration { name, .. } if name == "get_user"
        ));
    }

    #[test]
    fn duplicate_fields_and_params_are_reported() {
        let program = parse(
            "interface P { x: number; x: string; }\nfunction f(a: number, a: number): void {}\n",
        );
        let (_, errors) = resolve(&program);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind() == DiagnosticKind::DuplicateDeclaration));
    }

    #[test]
    fn main_collides_with_unit_statements() {
        let program = parse("function main(): void {}\nlet x = 1;\n");
        let (_, errors) = resolve(&program);
        assert!(matches!(
            &errors[0],
            TranslateError::DuplicateDeclaration { name, .. } if name == "main"
        ));
    }

    #[test]
    fn optional_params_and_fields_are_optional_types() {
        let program =
            parse("interface U { nick?: string; }\nfunction greet(name?: string): void {}\n");
        let (table, errors) = resolve(&program);
        assert!(errors.is_empty(), "{errors:?}");
        let field = &table.record("U").unwrap().fields[0];
        assert_eq!(field.ty, TargetType::optional(TargetType::TEXT));
        let sig = table.function("greet").unwrap();
        assert_eq!(sig.required_params(), 0);
        assert!(sig.accepts(0) && sig.accepts(1) && !sig.accepts(2));
    }

    #[test]
    fn exported_flag_is_recorded() {
        let program = parse(
            "export function add(a: number, b: number): number { return a + b; }\n\
             function helper(): void {}\n",
        );
        let (table, _) = resolve(&program);
        assert!(table.get("add").unwrap().exported);
        assert!(!table.get("helper").unwrap().exported);
    }

    #[test]
    fn records_that_contain_themselves_are_rejected() {
        let program = parse("interface Node { value: number; next?: Node; }\n");
        let (_, errors) = resolve(&program);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            TranslateError::UnsupportedConstruct { message, .. }
                if message.starts_with("`Node.next`")
        ));

        let program = parse("class A { b?: B; }\ninterface B { a: A; }\n");
        let (_, errors) = resolve(&program);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind() == DiagnosticKind::UnsupportedConstruct));
    }

    #[test]
    fn arrays_break_self_reference() {
        let program = parse("interface Tree { label: string; children: Tree[]; }\n");
        let (_, errors) = resolve(&program);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn unknown_field_types_are_reported() {
        let program = parse("interface A { b: Missing; }\n");
        let (_, errors) = resolve(&program);
        assert_eq!(errors[0].kind(), DiagnosticKind::UnknownType);
    }
}
