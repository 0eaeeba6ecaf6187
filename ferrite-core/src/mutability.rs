#![forbid(unsafe_code)]

//! Decides, before any lowering, which bindings need `mut`, which methods
//! need `&mut self` and which object parameters need `&mut T`.
//!
//! The analysis is scope-wide rather than flow-sensitive: a binding that is
//! reassigned anywhere in its scope is mutable, even if that assignment sits
//! on a branch that never runs. It can over-tag mutability but never
//! under-tags it.
//!
//! Call sites cannot see the class of a method receiver, so a method name
//! that writes through an argument in any class does so everywhere.

use std::collections::{BTreeSet, HashMap, HashSet};

use ferrite_ast::{Block, ClassDecl, Expr, ExprKind, Ident, Item, Param, Program, Span, Stmt};
use tracing::{debug, trace, warn};

use crate::mapping::ApiTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutability {
    Mutable,
    Immutable,
}

impl Mutability {
    pub fn is_mutable(self) -> bool {
        self == Mutability::Mutable
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverAccess {
    Shared,
    Exclusive,
}

#[derive(Clone, Debug, Default)]
pub struct MutabilityTable {
    receivers: HashMap<(String, String), ReceiverAccess>,
    /// Keyed by the offset of the binding's declaring identifier.
    bindings: HashMap<usize, Mutability>,
    /// Bindings whose value is changed through them: a field or element
    /// write, a mutating call or an exclusive borrow. Same keys as
    /// `bindings`.
    in_place: HashSet<usize>,
    ctor_fields: HashMap<(String, String), Mutability>,
}

impl MutabilityTable {
    pub fn receiver(&self, class: &str, method: &str) -> ReceiverAccess {
        match self.receivers.get(&(class.to_string(), method.to_string())) {
            Some(access) => *access,
            None => {
                warn!(class, method, "method was not analyzed; assuming exclusive receiver");
                ReceiverAccess::Exclusive
            }
        }
    }

    pub fn binding(&self, name: &Ident) -> Mutability {
        match self.bindings.get(&name.span.offset()) {
            Some(m) => *m,
            None => {
                warn!(name = %name.node, "binding was not analyzed; assuming mutable");
                Mutability::Mutable
            }
        }
    }

    /// Is the binding declared at `at` written through anywhere in its
    /// scope? Reassigning the binding itself does not count.
    pub fn mutated_in_place(&self, at: Span) -> bool {
        self.in_place.contains(&at.offset())
    }

    /// Mutability of the constructor local that holds `field` while the
    /// instance is being built.
    pub fn ctor_field(&self, class: &str, field: &str) -> Mutability {
        self.ctor_fields
            .get(&(class.to_string(), field.to_string()))
            .copied()
            .unwrap_or(Mutability::Mutable)
    }
}

pub fn analyze(program: &Program, table: &ApiTable) -> MutabilityTable {
    let rule_mutators = table.mutating_methods();
    let classes: Vec<&ClassDecl> = program
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Class(c) => Some(c),
            _ => None,
        })
        .collect();
    let callables = Callables::collect(program);

    // Writing through a parameter can make a method exclusive, which makes
    // more parameters written through; iterate until nothing changes.
    let mut written = HashSet::new();
    let mut rounds = 0;
    let (exclusive, scan, mutators) = loop {
        rounds += 1;
        let writers = Writers {
            callables: &callables,
            params: &written,
        };
        let exclusive = analyze_receivers(&classes, &rule_mutators, &writers);
        let mut mutators: HashSet<String> = rule_mutators.iter().map(|s| s.to_string()).collect();
        mutators.extend(exclusive.iter().map(|(_, method)| method.clone()));
        let scan = scan_bindings(program, &mutators, &writers);

        let grown: HashSet<usize> = callables
            .params
            .iter()
            .copied()
            .filter(|offset| scan.in_place.contains(offset))
            .collect();
        if grown.is_subset(&written) {
            break (exclusive, scan, mutators);
        }
        written.extend(grown);
    };

    let mut out = MutabilityTable::default();
    for class in &classes {
        for method in &class.methods {
            let key = (class.name.node.clone(), method.name.node.clone());
            let access = if exclusive.contains(&key) {
                ReceiverAccess::Exclusive
            } else {
                ReceiverAccess::Shared
            };
            out.receivers.insert(key, access);
        }
        let writers = Writers {
            callables: &callables,
            params: &written,
        };
        ctor_fields(class, &mutators, &writers, &mut out.ctor_fields);
    }
    out.bindings = scan.marks;
    out.in_place = scan.in_place;

    debug!(
        methods = out.receivers.len(),
        exclusive = exclusive.len(),
        bindings = out.bindings.len(),
        written_params = written.len(),
        rounds,
        "mutability analysis finished"
    );
    out
}

struct BindingMarks {
    marks: HashMap<usize, Mutability>,
    in_place: HashSet<usize>,
}

fn scan_bindings(
    program: &Program,
    mutators: &HashSet<String>,
    writers: &Writers<'_>,
) -> BindingMarks {
    let mut bindings = BindingScan::new(mutators, writers);
    let mut main_stmts = Vec::new();
    for item in &program.items {
        match item {
            Item::Function(f) => bindings.function(&f.params, &f.body),
            Item::Class(c) => {
                if let Some(ctor) = &c.constructor {
                    bindings.function(&ctor.params, &ctor.body);
                }
                for m in &c.methods {
                    bindings.function(&m.params, &m.body);
                }
                for field in &c.fields {
                    if let Some(init) = &field.init {
                        walk_expr(&mut bindings, init);
                    }
                }
            }
            Item::Stmt(stmt) => main_stmts.push(stmt),
            Item::Interface(_) => {}
        }
    }
    bindings.push_scope();
    for stmt in main_stmts {
        walk_stmt(&mut bindings, stmt);
    }
    bindings.pop_scope();
    BindingMarks {
        marks: bindings.marks,
        in_place: bindings.in_place,
    }
}

/// What a call expression names.
#[derive(Clone, Copy)]
enum Callee<'a> {
    /// `f(..)`
    Function(&'a str),
    /// `receiver.name(..)`
    Method { receiver: &'a Expr, name: &'a str },
    /// `new C(..)`
    Constructor(&'a str),
}

/// Parameter offsets of every user callable, by the name call sites use.
#[derive(Default)]
struct Callables {
    functions: HashMap<String, Vec<usize>>,
    /// Every class's method of that name.
    methods: HashMap<String, Vec<Vec<usize>>>,
    constructors: HashMap<String, Vec<usize>>,
    params: HashSet<usize>,
}

impl Callables {
    fn collect(program: &Program) -> Self {
        let mut out = Callables::default();
        let mut offsets = |params: &[Param]| -> Vec<usize> {
            let list: Vec<usize> = params.iter().map(|p| p.name.span.offset()).collect();
            out.params.extend(list.iter().copied());
            list
        };
        let mut functions = HashMap::new();
        let mut methods: HashMap<String, Vec<Vec<usize>>> = HashMap::new();
        let mut constructors = HashMap::new();
        for item in &program.items {
            match item {
                Item::Function(f) => {
                    functions.insert(f.name.node.clone(), offsets(&f.params));
                }
                Item::Class(c) => {
                    if let Some(ctor) = &c.constructor {
                        constructors.insert(c.name.node.clone(), offsets(&ctor.params));
                    }
                    for m in &c.methods {
                        methods.entry(m.name.node.clone()).or_default().push(offsets(&m.params));
                    }
                }
                Item::Interface(_) | Item::Stmt(_) => {}
            }
        }
        out.functions = functions;
        out.methods = methods;
        out.constructors = constructors;
        out
    }
}

/// Answers "does this call write through its argument?" for one round of
/// the analysis.
struct Writers<'a> {
    callables: &'a Callables,
    /// Parameters known to be written through so far.
    params: &'a HashSet<usize>,
}

impl Writers<'_> {
    fn writes(&self, callee: Callee<'_>, index: usize) -> bool {
        let written = |list: &Vec<usize>| list.get(index).is_some_and(|p| self.params.contains(p));
        let c = self.callables;
        match callee {
            Callee::Function(name) => c.functions.get(name).is_some_and(written),
            Callee::Method { name, .. } => {
                c.methods.get(name).is_some_and(|all| all.iter().any(written))
            }
            Callee::Constructor(class) => c.constructors.get(class).is_some_and(written),
        }
    }
}

/// Walk callbacks. Scopes follow the source's block structure.
trait Visitor<'a> {
    fn assign(&mut self, _target: &'a Expr) {}
    /// Called after the receiver and arguments were walked.
    fn call(&mut self, _callee: Callee<'a>, _args: &'a [Expr]) {}
    fn declare(&mut self, _name: &'a Ident) {}
    fn push_scope(&mut self) {}
    fn pop_scope(&mut self) {}
}

fn walk_block<'a, V: Visitor<'a>>(v: &mut V, block: &'a Block) {
    v.push_scope();
    for stmt in &block.stmts {
        walk_stmt(v, stmt);
    }
    v.pop_scope();
}

fn walk_stmt<'a, V: Visitor<'a>>(v: &mut V, stmt: &'a Stmt) {
    match stmt {
        Stmt::Let(s) => {
            if let Some(init) = &s.init {
                walk_expr(v, init);
            }
            v.declare(&s.name);
        }
        Stmt::Assign(s) => {
            walk_place(v, &s.target);
            walk_expr(v, &s.value);
            v.assign(&s.target);
        }
        Stmt::If(s) => {
            walk_expr(v, &s.cond);
            walk_block(v, &s.then_block);
            if let Some(else_branch) = &s.else_branch {
                walk_stmt(v, else_branch);
            }
        }
        Stmt::While(s) => {
            walk_expr(v, &s.cond);
            walk_block(v, &s.body);
        }
        Stmt::Return(s) => {
            if let Some(value) = &s.value {
                walk_expr(v, value);
            }
        }
        Stmt::Block(b) => walk_block(v, b),
        Stmt::Expr(e) => walk_expr(v, e),
    }
}

/// Sub-expressions of an assignment target that are evaluated, not written.
fn walk_place<'a, V: Visitor<'a>>(v: &mut V, target: &'a Expr) {
    match &target.kind {
        ExprKind::Member { object, .. } => walk_place(v, object),
        ExprKind::Index { object, index } => {
            walk_place(v, object);
            walk_expr(v, index);
        }
        _ => {}
    }
}

fn walk_expr<'a, V: Visitor<'a>>(v: &mut V, expr: &'a Expr) {
    match &expr.kind {
        ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::NumberLit(_)
        | ExprKind::StringLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::Null
        | ExprKind::Undefined => {}
        ExprKind::Template { exprs, .. } | ExprKind::ArrayLit(exprs) => {
            for e in exprs {
                walk_expr(v, e);
            }
        }
        ExprKind::ObjectLit(fields) => {
            for (_, e) in fields {
                walk_expr(v, e);
            }
        }
        ExprKind::Unary { expr, .. } | ExprKind::Await(expr) => walk_expr(v, expr),
        ExprKind::Binary { left, right, .. } => {
            walk_expr(v, left);
            walk_expr(v, right);
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            walk_expr(v, cond);
            walk_expr(v, then_expr);
            walk_expr(v, else_expr);
        }
        ExprKind::Member { object, .. } => walk_expr(v, object),
        ExprKind::Index { object, index } => {
            walk_expr(v, object);
            walk_expr(v, index);
        }
        ExprKind::Call { callee, args } => {
            let target = match &callee.kind {
                ExprKind::Member { object, property } => {
                    walk_expr(v, object);
                    Some(Callee::Method {
                        receiver: object,
                        name: &property.node,
                    })
                }
                ExprKind::Ident(id) => Some(Callee::Function(&id.node)),
                _ => {
                    walk_expr(v, callee);
                    None
                }
            };
            for a in args {
                walk_expr(v, a);
            }
            if let Some(target) = target {
                v.call(target, args);
            }
        }
        ExprKind::New { class, args } => {
            for a in args {
                walk_expr(v, a);
            }
            v.call(Callee::Constructor(&class.node), args);
        }
        ExprKind::Arrow { params, body } => {
            v.push_scope();
            for p in params {
                v.declare(&p.name);
            }
            walk_expr(v, body);
            v.pop_scope();
        }
    }
}

enum Root<'a> {
    Ident(&'a Ident),
    This,
    Other,
}

/// The variable or `this` a place expression ultimately names.
fn root(expr: &Expr) -> Root<'_> {
    match &expr.kind {
        ExprKind::Ident(id) => Root::Ident(id),
        ExprKind::This => Root::This,
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => root(object),
        _ => Root::Other,
    }
}

/// `this.f`, `this.f.g`, `this.f[i]` → `f`.
fn this_field(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Member { object, property } if matches!(object.kind, ExprKind::This) => {
            Some(&property.node)
        }
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => this_field(object),
        _ => None,
    }
}

#[derive(Default)]
struct ReceiverScan<'a> {
    writes: bool,
    /// `this.m(..)`
    self_calls: Vec<&'a str>,
    /// `this.f.m(..)`
    field_calls: Vec<&'a str>,
}

struct ReceiverVisitor<'a, 'r> {
    scan: ReceiverScan<'a>,
    rule_mutators: &'r BTreeSet<&'r str>,
    writers: &'r Writers<'r>,
}

impl<'a> Visitor<'a> for ReceiverVisitor<'a, '_> {
    fn assign(&mut self, target: &'a Expr) {
        if matches!(root(target), Root::This) {
            self.scan.writes = true;
        }
    }

    fn call(&mut self, callee: Callee<'a>, args: &'a [Expr]) {
        if let Callee::Method { receiver, name } = callee {
            match (&receiver.kind, root(receiver)) {
                (ExprKind::This, _) => self.scan.self_calls.push(name),
                (_, Root::This) => {
                    if self.rule_mutators.contains(name) {
                        self.scan.writes = true;
                    }
                    self.scan.field_calls.push(name);
                }
                _ => {}
            }
        }
        // `f(this)`, `f(this.items)` with `f` writing through its argument.
        for (i, arg) in args.iter().enumerate() {
            if matches!(root(arg), Root::This) && self.writers.writes(callee, i) {
                self.scan.writes = true;
            }
        }
    }
}

/// `(class, method)` pairs that need `&mut self`.
fn analyze_receivers(
    classes: &[&ClassDecl],
    rule_mutators: &BTreeSet<&str>,
    writers: &Writers<'_>,
) -> HashSet<(String, String)> {
    let mut scans: Vec<(&str, &str, ReceiverScan<'_>)> = Vec::new();
    for class in classes {
        for method in &class.methods {
            let mut visitor = ReceiverVisitor {
                scan: ReceiverScan::default(),
                rule_mutators,
                writers,
            };
            walk_block(&mut visitor, &method.body);
            scans.push((&class.name.node, &method.name.node, visitor.scan));
        }
    }

    let mut exclusive: HashSet<(String, String)> = scans
        .iter()
        .filter(|(_, _, scan)| scan.writes)
        .map(|(c, m, _)| (c.to_string(), m.to_string()))
        .collect();

    // Calling a mutating method through `this` mutates `this`.
    loop {
        let mutating_names: HashSet<&str> = exclusive.iter().map(|(_, m)| m.as_str()).collect();
        let newly: Vec<(String, String)> = scans
            .iter()
            .filter(|(c, m, _)| !exclusive.contains(&(c.to_string(), m.to_string())))
            .filter(|(c, _, scan)| {
                scan.self_calls
                    .iter()
                    .any(|callee| exclusive.contains(&(c.to_string(), callee.to_string())))
                    || scan.field_calls.iter().any(|callee| mutating_names.contains(callee))
            })
            .map(|(c, m, _)| (c.to_string(), m.to_string()))
            .collect();
        if newly.is_empty() {
            break;
        }
        exclusive.extend(newly);
    }

    exclusive
}

struct BindingScan<'m> {
    scopes: Vec<HashMap<String, usize>>,
    marks: HashMap<usize, Mutability>,
    in_place: HashSet<usize>,
    mutators: &'m HashSet<String>,
    writers: &'m Writers<'m>,
}

impl<'m> BindingScan<'m> {
    fn new(mutators: &'m HashSet<String>, writers: &'m Writers<'m>) -> Self {
        Self {
            scopes: Vec::new(),
            marks: HashMap::new(),
            in_place: HashSet::new(),
            mutators,
            writers,
        }
    }

    fn function(&mut self, params: &[Param], body: &Block) {
        self.push_scope();
        for p in params {
            self.declare(&p.name);
        }
        walk_block(self, body);
        self.pop_scope();
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn mark(&mut self, name: &str) {
        if let Some(offset) = self.resolve(name) {
            self.marks.insert(offset, Mutability::Mutable);
        }
    }

    /// The value `place` names is changed through it.
    fn write_through(&mut self, place: &Expr) {
        if let Root::Ident(id) = root(place) {
            if let Some(offset) = self.resolve(&id.node) {
                trace!(name = %id.node, "written in place");
                self.marks.insert(offset, Mutability::Mutable);
                self.in_place.insert(offset);
            }
        }
    }
}

impl<'a> Visitor<'a> for BindingScan<'_> {
    fn assign(&mut self, target: &'a Expr) {
        match &target.kind {
            ExprKind::Ident(id) => self.mark(&id.node),
            _ => self.write_through(target),
        }
    }

    fn call(&mut self, callee: Callee<'a>, args: &'a [Expr]) {
        if let Callee::Method { receiver, name } = callee {
            if self.mutators.contains(name) {
                self.write_through(receiver);
            }
        }
        for (i, arg) in args.iter().enumerate() {
            if self.writers.writes(callee, i) {
                self.write_through(arg);
            }
        }
    }

    fn declare(&mut self, name: &'a Ident) {
        let offset = name.span.offset();
        self.marks.entry(offset).or_insert(Mutability::Immutable);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.node.clone(), offset);
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

struct CtorVisitor<'a, 'm> {
    writes: HashMap<&'a str, usize>,
    mutated: HashSet<&'a str>,
    mutators: &'m HashSet<String>,
    writers: &'m Writers<'m>,
}

impl<'a> Visitor<'a> for CtorVisitor<'a, '_> {
    fn assign(&mut self, target: &'a Expr) {
        match &target.kind {
            ExprKind::Member { object, property } if matches!(object.kind, ExprKind::This) => {
                *self.writes.entry(&property.node).or_default() += 1;
            }
            _ => {
                if let Some(field) = this_field(target) {
                    self.mutated.insert(field);
                }
            }
        }
    }

    fn call(&mut self, callee: Callee<'a>, args: &'a [Expr]) {
        if let Callee::Method { receiver, name } = callee {
            if self.mutators.contains(name) {
                if let Some(field) = this_field(receiver) {
                    self.mutated.insert(field);
                }
            }
        }
        for (i, arg) in args.iter().enumerate() {
            if let Some(field) = this_field(arg) {
                if self.writers.writes(callee, i) {
                    self.mutated.insert(field);
                }
            }
        }
    }
}

/// Each field lives in a local while the constructor runs. The local needs
/// `mut` when it is written more than once or mutated in place.
fn ctor_fields(
    class: &ClassDecl,
    mutators: &HashSet<String>,
    writers: &Writers<'_>,
    out: &mut HashMap<(String, String), Mutability>,
) {
    let mut visitor = CtorVisitor {
        writes: HashMap::new(),
        mutated: HashSet::new(),
        mutators,
        writers,
    };
    if let Some(ctor) = &class.constructor {
        walk_block(&mut visitor, &ctor.body);
    }

    for field in &class.fields {
        let seeded = usize::from(field.init.is_some() || field.optional);
        let writes = seeded + visitor.writes.get(field.name.node.as_str()).copied().unwrap_or(0);
        let m = if writes > 1 || visitor.mutated.contains(field.name.node.as_str()) {
            Mutability::Mutable
        } else {
            Mutability::Immutable
        };
        out.insert((class.name.node.clone(), field.name.node.clone()), m);
    }
}
