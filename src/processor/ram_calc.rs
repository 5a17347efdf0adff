//! Static RAM cost of a script.
//!
//! The analysis interprets the syntax tree abstractly. A value is tracked
//! only when it can lead to a cost: the capability handle and its
//! namespaces, closures, classes, objects that may hold any of those, and
//! module namespaces of imported siblings. Everything else evaluates to the
//! empty set. Bindings and object fields only ever grow, so a variable that
//! may hold the handle on any path is treated as holding it.
//!
//! Scopes and objects are keyed by the syntax node that creates them and the
//! scope it runs in, so every call of one closure shares a single scope.
//! The program is analysed again until a pass adds no binding, field,
//! return value or charge. An alias created after the code that reads it is
//! therefore still seen.
//!
//! Analysis starts from the exported `main` of the entry script, called with
//! the handle as its first argument, and follows calls into local functions,
//! methods and imported bindings. Reading a function off the handle charges
//! it, whether or not the result is called afterwards.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::ast::*;
use super::lookup;
use super::script_parser;
use crate::error::RamCalcError;
use crate::model::{CostNode, CostTable, RamCostEntry, ScriptMap};

/// Times one function may appear on the abstract call stack.
const MAX_RECURSION: usize = 2;
const MAX_CALL_DEPTH: usize = 200;
/// Upper bound on analysed calls for one script.
const MAX_CALLS: usize = 50_000;
const MAX_PROPERTY_DEPTH: usize = 64;
/// Upper bound on whole-program passes before giving up on a fixed point.
const MAX_PASSES: usize = 64;

/// Scope slot for the class whose method is running; not a valid identifier.
const SUPER: &str = "%super";
/// Scope slot for the iterator object a generator yields into.
const YIELD: &str = "%yield";

#[derive(Debug, Clone, PartialEq)]
pub struct RamCalculation {
    /// 0 when nothing chargeable is reachable, else base plus every distinct
    /// function cost, clamped to the table's max and rounded to 2 decimals.
    pub cost: f64,
    /// Contributing functions in the order they were first reached.
    pub entries: Vec<RamCostEntry>,
}

/// Compute the RAM cost of `code`, resolving imports against `scripts`.
pub fn calculate_ram_usage(
    code: &str,
    filename: &str,
    scripts: &ScriptMap,
    costs: &CostTable,
) -> Result<RamCalculation, RamCalcError> {
    let mut analyzer = Analyzer::new(filename, code, scripts, costs);
    analyzer.run();
    if let Some(err) = analyzer.error.take() {
        return Err(err);
    }
    let calculation = analyzer.finish();
    debug!(
        filename,
        cost = calculation.cost,
        entries = calculation.entries.len(),
        calls = analyzer.calls,
        "calculated RAM usage"
    );
    Ok(calculation)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ─────────────────────────────────────────────────────
// Abstract values
// ─────────────────────────────────────────────────────

#[derive(Clone)]
enum Value {
    /// The handle (empty path) or one of its namespaces.
    Api(Rc<[String]>),
    Closure(Rc<Closure>),
    Bound(Rc<BoundFunction>),
    Class(Rc<ClassValue>),
    Object(Rc<ObjectValue>),
    /// Namespace object of an imported sibling, by filename.
    Module(Rc<str>),
    /// Import binding, resolved against the exporting module when read.
    Import(Rc<ImportBinding>),
    /// `super` inside a method of the given class.
    Super(Rc<ClassValue>, bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ValueId {
    Api(Rc<[String]>),
    Function(usize, usize),
    Bound(Vec<ValueId>, Vec<ValueId>, Vec<Vec<ValueId>>),
    Ptr(usize),
    Module(Rc<str>),
    Import(Rc<str>, String),
    Super(usize, bool),
}

impl Value {
    fn id(&self) -> ValueId {
        match self {
            Value::Api(path) => ValueId::Api(path.clone()),
            Value::Closure(c) => {
                ValueId::Function(Rc::as_ptr(&c.func) as usize, Rc::as_ptr(&c.env) as usize)
            }
            Value::Bound(b) => ValueId::Bound(
                b.target.ids(),
                b.this.ids(),
                b.args.iter().map(Values::ids).collect(),
            ),
            Value::Class(c) => ValueId::Ptr(Rc::as_ptr(c) as usize),
            Value::Object(o) => ValueId::Ptr(Rc::as_ptr(o) as usize),
            Value::Module(m) => ValueId::Module(m.clone()),
            Value::Import(i) => ValueId::Import(i.module.clone(), i.name.clone()),
            Value::Super(c, is_static) => ValueId::Super(Rc::as_ptr(c) as usize, *is_static),
        }
    }
}

/// Every value an expression may evaluate to.
#[derive(Clone, Default)]
struct Values(Vec<Value>);

impl Values {
    fn one(value: Value) -> Self {
        Values(vec![value])
    }

    fn push(&mut self, value: Value) {
        let id = value.id();
        if !self.0.iter().any(|v| v.id() == id) {
            self.0.push(value);
        }
    }

    fn merge(&mut self, other: Values) {
        for value in other.0 {
            self.push(value);
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    fn ids(&self) -> Vec<ValueId> {
        let mut ids: Vec<_> = self.0.iter().map(Value::id).collect();
        ids.sort();
        ids
    }
}

struct Closure {
    func: Rc<Function>,
    env: Rc<Scope>,
    /// Class (and whether the static side) a method was defined on.
    home: Option<(Rc<ClassValue>, bool)>,
}

struct BoundFunction {
    target: Values,
    this: Values,
    args: Vec<Values>,
}

struct ClassValue {
    class: Rc<Class>,
    env: Rc<Scope>,
    parents: RefCell<Values>,
    statics: Rc<ObjectValue>,
}

#[derive(Default)]
struct ObjectValue {
    fields: RefCell<HashMap<PropName, Values>>,
    getters: RefCell<HashMap<PropName, Values>>,
    setters: RefCell<HashMap<PropName, Values>>,
    /// Values stored under keys that are not statically known.
    unknown: RefCell<Values>,
    /// Sources of `...spread` properties.
    spreads: RefCell<Values>,
    class: Option<Rc<ClassValue>>,
}

impl ObjectValue {
    fn set(&self, name: Option<PropName>, values: Values) {
        match name {
            Some(name) => self
                .fields
                .borrow_mut()
                .entry(name)
                .or_default()
                .merge(values),
            None => self.unknown.borrow_mut().merge(values),
        }
    }

    fn clear(&self) {
        self.fields.borrow_mut().clear();
        self.getters.borrow_mut().clear();
        self.setters.borrow_mut().clear();
        self.unknown.borrow_mut().0.clear();
        self.spreads.borrow_mut().0.clear();
    }

    /// Number of values held, which only grows.
    fn size(&self) -> usize {
        let count = |map: &RefCell<HashMap<PropName, Values>>| -> usize {
            map.borrow().values().map(|v| v.len() + 1).sum()
        };
        count(&self.fields)
            + count(&self.getters)
            + count(&self.setters)
            + self.unknown.borrow().len()
            + self.spreads.borrow().len()
    }
}

struct ImportBinding {
    module: Rc<str>,
    name: String,
}

struct Scope {
    vars: RefCell<HashMap<String, Values>>,
    parent: Option<Rc<Scope>>,
    /// Filename of the module this scope belongs to.
    module: Rc<str>,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<Values> {
        if let Some(values) = self.vars.borrow().get(name) {
            return Some(values.clone());
        }
        self.parent.as_ref()?.lookup(name)
    }

    fn size(&self) -> usize {
        self.vars.borrow().values().map(|v| v.len() + 1).sum()
    }

    fn declare(&self, name: &str) {
        self.vars.borrow_mut().entry(name.to_string()).or_default();
    }

    fn define(&self, name: &str, values: Values) {
        self.vars
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .merge(values);
    }

    /// Add to the nearest binding of `name`, or to the module scope.
    fn assign(&self, name: &str, values: Values) {
        if self.vars.borrow().contains_key(name) {
            self.define(name, values);
            return;
        }
        match &self.parent {
            Some(parent) => parent.assign(name, values),
            None => self.define(name, values),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Binding {
    Declare,
    Assign,
}

#[derive(Clone)]
enum Export {
    Local(String),
    Values(Values),
    Reexport(Rc<str>, String),
    Namespace(Rc<str>),
}

struct ModuleInstance {
    program: Program,
    scope: Rc<Scope>,
    exports: RefCell<IndexMap<String, Export>>,
    /// Targets of `export * from`.
    star_exports: RefCell<Vec<Rc<str>>>,
}

type CallKey = (usize, usize, Vec<ValueId>, Vec<Vec<ValueId>>);

/// Syntax node that allocates a scope or an object, by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Site {
    Block(usize),
    Loop(usize),
    Catch(usize),
    Switch(usize),
    Call(usize),
    NamedFunction(usize),
    ClassBody(usize),
    StaticInit(usize),
    StaticBlock(usize),
    Fields(usize),
    Literal(usize),
    Rest(usize),
    /// `new` expression and the class or function it constructed.
    Instance(usize, usize),
    Arguments,
    Statics,
    Generator,
}

fn addr<T>(node: &T) -> usize {
    node as *const T as usize
}

// ─────────────────────────────────────────────────────
// Analyzer
// ─────────────────────────────────────────────────────

struct Analyzer<'a> {
    entry: Rc<str>,
    entry_code: &'a str,
    scripts: &'a ScriptMap,
    costs: &'a CostTable,
    /// `None` marks a module that failed to parse.
    modules: HashMap<Rc<str>, Option<Rc<ModuleInstance>>>,
    /// Modules in the order they were first evaluated.
    loaded: Vec<Rc<ModuleInstance>>,
    memo: HashMap<CallKey, Values>,
    /// Everything each closure has returned so far, by (function, env).
    returns: HashMap<(usize, usize), Values>,
    active: HashSet<CallKey>,
    stack: Vec<usize>,
    calls: usize,
    property_depth: usize,
    export_guard: HashSet<(Rc<str>, String)>,
    charged: IndexMap<(String, String), f64>,
    error: Option<RamCalcError>,
    scopes: Vec<Rc<Scope>>,
    scope_sites: HashMap<(Site, usize), Rc<Scope>>,
    objects: Vec<Rc<ObjectValue>>,
    object_sites: HashMap<(Site, usize), Rc<ObjectValue>>,
    classes: HashMap<(usize, usize), Rc<ClassValue>>,
}

impl Drop for Analyzer<'_> {
    // Scopes and objects refer to each other through closures; clearing them
    // breaks the reference cycles.
    fn drop(&mut self) {
        for scope in &self.scopes {
            scope.vars.borrow_mut().clear();
        }
        for object in &self.objects {
            object.clear();
        }
        for class in self.classes.values() {
            class.parents.borrow_mut().0.clear();
        }
    }
}

impl<'a> Analyzer<'a> {
    fn new(filename: &str, code: &'a str, scripts: &'a ScriptMap, costs: &'a CostTable) -> Self {
        Self {
            entry: filename.into(),
            entry_code: code,
            scripts,
            costs,
            modules: HashMap::new(),
            loaded: Vec::new(),
            memo: HashMap::new(),
            returns: HashMap::new(),
            active: HashSet::new(),
            stack: Vec::new(),
            calls: 0,
            property_depth: 0,
            export_guard: HashSet::new(),
            charged: IndexMap::new(),
            error: None,
            scopes: Vec::new(),
            scope_sites: HashMap::new(),
            objects: Vec::new(),
            object_sites: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    /// Analyse `main` and every loaded module body until a whole pass
    /// learns nothing new.
    fn run(&mut self) {
        let entry = self.entry.clone();
        let handle = Values::one(Value::Api(Vec::new().into()));
        let mut last = None;
        for pass in 0..MAX_PASSES {
            self.memo.clear();
            for module in self.loaded.clone() {
                self.evaluate_module(&module);
            }
            let mains = self.export_values(&entry, "main");
            if pass == 0 && mains.is_empty() {
                debug!(filename = %entry, "no exported main");
            }
            self.call_values(&mains, &Values::default(), &[handle.clone()]);
            if self.error.is_some() || self.calls >= MAX_CALLS {
                return;
            }
            let size = self.state_size();
            if last == Some(size) {
                trace!(filename = %entry, passes = pass + 1, "analysis converged");
                return;
            }
            last = Some(size);
        }
        warn!(filename = %entry, "analysis did not converge, RAM usage may be underestimated");
    }

    /// Total number of bindings, fields, return values and charges. Every
    /// one of these only grows, so an unchanged size means a fixed point.
    fn state_size(&self) -> usize {
        let scopes: usize = self.scopes.iter().map(|s| s.size()).sum();
        let objects: usize = self.objects.iter().map(|o| o.size()).sum();
        let parents: usize = self.classes.values().map(|c| c.parents.borrow().len()).sum();
        let returns: usize = self.returns.values().map(Values::len).sum();
        scopes
            + objects
            + parents
            + returns
            + self.returns.len()
            + self.scopes.len()
            + self.objects.len()
            + self.charged.len()
            + self.modules.len()
    }

    fn finish(&self) -> RamCalculation {
        let entries: Vec<RamCostEntry> = self
            .charged
            .iter()
            .filter(|(_, cost)| **cost > 0.0)
            .map(|((namespace, name), cost)| RamCostEntry {
                namespace: namespace.clone(),
                name: name.clone(),
                cost: *cost,
            })
            .collect();
        let contribution: f64 = entries.iter().map(|e| e.cost).sum();
        let cost = if contribution > 0.0 {
            (self.costs.base + contribution).min(self.costs.max)
        } else {
            0.0
        };
        RamCalculation {
            cost: round2(cost),
            entries,
        }
    }

    fn charge(&mut self, namespace: &[String], name: &str, cost: f64) {
        let key = (namespace.join("."), name.to_string());
        if !self.charged.contains_key(&key) {
            trace!(namespace = %key.0, name, cost, "charging API function");
            self.charged.insert(key, cost);
        }
    }

    // ── allocation ───────────────────────────────────────────────────

    /// The scope `site` opens inside `parent`, shared by every pass.
    fn scope_at(&mut self, site: Site, parent: &Rc<Scope>) -> Rc<Scope> {
        let key = (site, Rc::as_ptr(parent) as usize);
        if let Some(scope) = self.scope_sites.get(&key) {
            return scope.clone();
        }
        let scope = Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(parent.clone()),
            module: parent.module.clone(),
        });
        self.scopes.push(scope.clone());
        self.scope_sites.insert(key, scope.clone());
        scope
    }

    /// The object `site` allocates while running in `scope`.
    fn object_at(&mut self, site: Site, scope: &Rc<Scope>, class: Option<Rc<ClassValue>>) -> Rc<ObjectValue> {
        let key = (site, Rc::as_ptr(scope) as usize);
        if let Some(object) = self.object_sites.get(&key) {
            return object.clone();
        }
        let object = Rc::new(ObjectValue {
            class,
            ..ObjectValue::default()
        });
        self.objects.push(object.clone());
        self.object_sites.insert(key, object.clone());
        object
    }

    fn array_of(&mut self, site: Site, scope: &Rc<Scope>, items: impl IntoIterator<Item = Values>) -> Value {
        let array = self.object_at(site, scope, None);
        for (i, item) in items.into_iter().enumerate() {
            array.set(Some(PropName::Public(i.to_string())), item);
        }
        Value::Object(array)
    }

    fn closure(&self, func: &Rc<Function>, env: &Rc<Scope>) -> Value {
        Value::Closure(Rc::new(Closure {
            func: func.clone(),
            env: env.clone(),
            home: None,
        }))
    }

    fn method(&self, func: &Rc<Function>, class: &Rc<ClassValue>, is_static: bool) -> Value {
        Value::Closure(Rc::new(Closure {
            func: func.clone(),
            env: class.env.clone(),
            home: Some((class.clone(), is_static)),
        }))
    }

    // ── modules ──────────────────────────────────────────────────────

    fn module(&mut self, filename: &Rc<str>) -> Option<Rc<ModuleInstance>> {
        if let Some(module) = self.modules.get(filename) {
            return module.clone();
        }
        let code = if *filename == self.entry {
            self.entry_code.to_string()
        } else {
            let script = self.scripts.get(filename.as_ref())?;
            let script = script.try_borrow().ok()?;
            script.code().to_string()
        };
        let program = match script_parser::parse_module(&code) {
            Ok(program) => program,
            Err(err) => {
                self.modules.insert(filename.clone(), None);
                self.error.get_or_insert(RamCalcError {
                    filename: filename.to_string(),
                    source: err,
                });
                return None;
            }
        };

        let scope = Rc::new(Scope {
            vars: RefCell::default(),
            parent: None,
            module: filename.clone(),
        });
        self.scopes.push(scope.clone());
        let module = Rc::new(ModuleInstance {
            program,
            scope,
            exports: RefCell::default(),
            star_exports: RefCell::default(),
        });
        self.modules.insert(filename.clone(), Some(module.clone()));
        self.loaded.push(module.clone());
        trace!(filename = %filename, "evaluating module");
        self.evaluate_module(&module);
        Some(module)
    }

    fn resolve_specifier(&self, importer: &str, specifier: &str) -> Option<Rc<str>> {
        let (name, _) = lookup::find_imported_script(self.scripts, importer, specifier)?;
        Some(name.into())
    }

    fn evaluate_module(&mut self, module: &Rc<ModuleInstance>) {
        let program = &module.program;
        let scope = module.scope.clone();
        scope.declare("this");
        scope.declare(SUPER);

        for stmt in &program.body {
            match stmt {
                Stmt::Import(import) => self.bind_import(&scope, import),
                Stmt::Export(export) => self.record_export(module, export),
                _ => {}
            }
        }

        self.hoist(&program.body, &scope, Some(&scope));
        let mut ignored = Values::default();
        for stmt in &program.body {
            if let Stmt::Export(ExportDecl::Default(default)) = stmt {
                let values = match default {
                    DefaultExport::Function(f) => match &f.name {
                        Some(name) => self.read_var(&scope, name),
                        None => Values::one(self.closure(f, &scope)),
                    },
                    DefaultExport::Class(c) => {
                        let class = self.make_class(c, &scope);
                        if let Some(name) = &c.name {
                            scope.define(name, Values::one(class.clone()));
                        }
                        Values::one(class)
                    }
                    DefaultExport::Expr(expr) => self.eval(expr, &scope),
                };
                let mut exports = module.exports.borrow_mut();
                match exports.get_mut("default") {
                    Some(Export::Values(existing)) => existing.merge(values),
                    _ => {
                        exports.insert("default".to_string(), Export::Values(values));
                    }
                }
                continue;
            }
            self.exec(stmt, &scope, &mut ignored);
        }
    }

    fn bind_import(&mut self, scope: &Rc<Scope>, import: &ImportDecl) {
        let target = self.resolve_specifier(&scope.module, &import.source.value);
        if target.is_none() {
            trace!(specifier = %import.source.value, "import does not name a sibling script");
        }
        for specifier in &import.specifiers {
            let (local, value) = match specifier {
                ImportSpecifier::Default { local } => (
                    local,
                    target.clone().map(|module| {
                        Value::Import(Rc::new(ImportBinding {
                            module,
                            name: "default".to_string(),
                        }))
                    }),
                ),
                ImportSpecifier::Named { imported, local } => (
                    local,
                    target.clone().map(|module| {
                        Value::Import(Rc::new(ImportBinding {
                            module,
                            name: imported.clone(),
                        }))
                    }),
                ),
                ImportSpecifier::Namespace { local } => (local, target.clone().map(Value::Module)),
            };
            scope.declare(local);
            if let Some(value) = value {
                scope.define(local, Values::one(value));
            }
        }
    }

    fn record_export(&mut self, module: &Rc<ModuleInstance>, export: &ExportDecl) {
        let importer = module.scope.module.clone();
        let mut exports = module.exports.borrow_mut();
        match export {
            ExportDecl::Decl(decl) => {
                let mut names = Vec::new();
                match decl.as_ref() {
                    Stmt::Function(f) => names.extend(f.name.clone()),
                    Stmt::Class(c) => names.extend(c.name.clone()),
                    Stmt::Var(var) => {
                        for declarator in &var.declarations {
                            declarator.target.bound_names(&mut names);
                        }
                    }
                    _ => {}
                }
                for name in names {
                    exports.insert(name.clone(), Export::Local(name));
                }
            }
            ExportDecl::Default(_) => {}
            ExportDecl::Named {
                specifiers,
                source: None,
            } => {
                for spec in specifiers {
                    exports.insert(spec.exported.clone(), Export::Local(spec.local.clone()));
                }
            }
            ExportDecl::Named {
                specifiers,
                source: Some(source),
            } => {
                let Some(target) = self.resolve_specifier(&importer, &source.value) else {
                    return;
                };
                for spec in specifiers {
                    exports.insert(
                        spec.exported.clone(),
                        Export::Reexport(target.clone(), spec.local.clone()),
                    );
                }
            }
            ExportDecl::All { exported, source } => {
                let Some(target) = self.resolve_specifier(&importer, &source.value) else {
                    return;
                };
                match exported {
                    Some(name) => {
                        exports.insert(name.clone(), Export::Namespace(target));
                    }
                    None => module.star_exports.borrow_mut().push(target),
                }
            }
        }
    }

    /// Values of export `name` of `filename`, evaluating the module on first use.
    fn export_values(&mut self, filename: &Rc<str>, name: &str) -> Values {
        let key = (filename.clone(), name.to_string());
        if !self.export_guard.insert(key.clone()) {
            return Values::default();
        }
        let values = self.lookup_export(filename, name);
        self.export_guard.remove(&key);
        values
    }

    fn lookup_export(&mut self, filename: &Rc<str>, name: &str) -> Values {
        let Some(module) = self.module(filename) else {
            return Values::default();
        };
        let export = module.exports.borrow().get(name).cloned();
        match export {
            Some(Export::Local(local)) => self.read_var(&module.scope, &local),
            Some(Export::Values(values)) => values,
            Some(Export::Reexport(from, imported)) => self.export_values(&from, &imported),
            Some(Export::Namespace(from)) => Values::one(Value::Module(from)),
            None if name == "default" => Values::default(),
            None => {
                let stars = module.star_exports.borrow().clone();
                let mut values = Values::default();
                for star in stars {
                    values.merge(self.export_values(&star, name));
                }
                values
            }
        }
    }

    fn all_exports(&mut self, filename: &Rc<str>) -> Values {
        let Some(module) = self.module(filename) else {
            return Values::default();
        };
        let names: Vec<String> = module.exports.borrow().keys().cloned().collect();
        let mut values = Values::default();
        for name in names {
            values.merge(self.export_values(filename, &name));
        }
        values
    }

    // ── variables ────────────────────────────────────────────────────

    fn read_var(&mut self, scope: &Rc<Scope>, name: &str) -> Values {
        match scope.lookup(name) {
            Some(values) => self.expand(values),
            None => Values::default(),
        }
    }

    /// Replace import bindings by the values they currently export.
    fn expand(&mut self, values: Values) -> Values {
        if !values.iter().any(|v| matches!(v, Value::Import(_))) {
            return values;
        }
        let mut out = Values::default();
        for value in values.0 {
            match value {
                Value::Import(binding) => {
                    out.merge(self.export_values(&binding.module, &binding.name))
                }
                other => out.push(other),
            }
        }
        out
    }

    /// Declare block-scoped names and define hoisted functions. `vars` is
    /// the function scope `var` declarations belong to, if this block
    /// starts a function body.
    fn hoist(&mut self, stmts: &[Stmt], scope: &Rc<Scope>, vars: Option<&Rc<Scope>>) {
        for stmt in stmts {
            let decl = match stmt {
                Stmt::Export(ExportDecl::Decl(decl)) => decl.as_ref(),
                Stmt::Export(ExportDecl::Default(DefaultExport::Function(f))) => {
                    if let Some(name) = &f.name {
                        scope.define(name, Values::one(self.closure(f, scope)));
                    }
                    continue;
                }
                Stmt::Export(ExportDecl::Default(DefaultExport::Class(c))) => {
                    if let Some(name) = &c.name {
                        scope.declare(name);
                    }
                    continue;
                }
                other => other,
            };
            match decl {
                Stmt::Function(f) => {
                    if let Some(name) = &f.name {
                        scope.define(name, Values::one(self.closure(f, scope)));
                    }
                }
                Stmt::Class(c) => {
                    if let Some(name) = &c.name {
                        scope.declare(name);
                    }
                }
                Stmt::Var(var) if var.kind != VarKind::Var => {
                    let mut names = Vec::new();
                    for declarator in &var.declarations {
                        declarator.target.bound_names(&mut names);
                    }
                    for name in names {
                        scope.declare(&name);
                    }
                }
                _ => {}
            }
            if let Some(vars) = vars {
                let mut names = Vec::new();
                collect_var_names(decl, &mut names);
                for name in names {
                    vars.declare(&name);
                }
            }
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern, values: Values, scope: &Rc<Scope>, mode: Binding) {
        match pattern {
            Pattern::Ident(name) => match mode {
                Binding::Declare => scope.define(name, values),
                Binding::Assign => scope.assign(name, values),
            },
            Pattern::Default { target, default } => {
                let mut values = values;
                values.merge(self.eval(default, scope));
                self.bind_pattern(target, values, scope, mode);
            }
            Pattern::Object { props, rest } => {
                for prop in props {
                    let name = self.prop_key_name(&prop.key, scope);
                    let property = self.property_of_all(&values, name.as_ref());
                    self.bind_pattern(&prop.value, property, scope, mode);
                }
                if let Some(rest) = rest {
                    self.bind_pattern(rest, values, scope, mode);
                }
            }
            Pattern::Array { elements, rest } => {
                let items = self.elements(&values);
                for element in elements.iter().flatten() {
                    self.bind_pattern(element, items.clone(), scope, mode);
                }
                if let Some(rest) = rest {
                    let array = self.array_of(Site::Rest(addr(pattern)), scope, [items]);
                    self.bind_pattern(rest, Values::one(array), scope, mode);
                }
            }
            Pattern::Expr(target) => self.assign_to(target, values, scope),
        }
    }

    fn assign_to(&mut self, target: &Expr, values: Values, scope: &Rc<Scope>) {
        match target {
            Expr::Ident(name) => scope.assign(name, values),
            Expr::Member {
                object, property, ..
            } => {
                let name = self.member_name(property, scope);
                let objects = self.eval(object, scope);
                for object in objects.iter() {
                    let setters = match object {
                        Value::Object(o) => {
                            o.set(name.clone(), values.clone());
                            let mut setters = Values::default();
                            if let Some(name) = &name {
                                if let Some(own) = o.setters.borrow().get(name) {
                                    setters.merge(own.clone());
                                }
                                if let Some(class) = &o.class {
                                    setters.merge(self.class_setters(class, name, false));
                                }
                            }
                            setters
                        }
                        Value::Class(c) => {
                            c.statics.set(name.clone(), values.clone());
                            match &name {
                                Some(name) => self.class_setters(c, name, true),
                                None => Values::default(),
                            }
                        }
                        _ => Values::default(),
                    };
                    if !setters.is_empty() {
                        let this = Values::one(object.clone());
                        self.call_values(&setters, &this, &[values.clone()]);
                    }
                }
            }
            other => {
                self.eval(other, scope);
            }
        }
    }

    // ── statements ───────────────────────────────────────────────────

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>, ret: &mut Values) {
        let inner = self.scope_at(Site::Block(body.as_ptr() as usize), scope);
        self.hoist(body, &inner, None);
        for stmt in body {
            self.exec(stmt, &inner, ret);
        }
    }

    fn exec_var(&mut self, decl: &VarDecl, scope: &Rc<Scope>) {
        let mode = if decl.kind == VarKind::Var {
            Binding::Assign
        } else {
            Binding::Declare
        };
        for declarator in &decl.declarations {
            let values = match &declarator.init {
                Some(init) => self.eval(init, scope),
                None => Values::default(),
            };
            self.bind_pattern(&declarator.target, values, scope, mode);
        }
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>, ret: &mut Values) {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope);
            }
            Stmt::Var(decl) => self.exec_var(decl, scope),
            Stmt::Function(_) => {}
            Stmt::Class(class) => {
                let value = self.make_class(class, scope);
                if let Some(name) = &class.name {
                    scope.define(name, Values::one(value));
                }
            }
            Stmt::Return(arg) => {
                if let Some(arg) = arg {
                    let values = self.eval(arg, scope);
                    ret.merge(values);
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.eval(test, scope);
                self.exec(consequent, scope, ret);
                if let Some(alternate) = alternate {
                    self.exec(alternate, scope, ret);
                }
            }
            Stmt::Block(body) => self.exec_block(body, scope, ret),
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let inner = self.scope_at(Site::Loop(addr(stmt)), scope);
                match init {
                    Some(ForInit::Var(decl)) => {
                        if decl.kind != VarKind::Var {
                            declare_all(decl, &inner);
                        }
                        self.exec_var(decl, &inner);
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.eval(expr, &inner);
                    }
                    None => {}
                }
                if let Some(test) = test {
                    self.eval(test, &inner);
                }
                self.exec(body, &inner, ret);
                if let Some(update) = update {
                    self.eval(update, &inner);
                }
            }
            Stmt::ForEach {
                kind,
                left,
                right,
                body,
            } => {
                let inner = self.scope_at(Site::Loop(addr(stmt)), scope);
                let collection = self.eval(right, scope);
                let items = match kind {
                    ForEachKind::In => Values::default(),
                    ForEachKind::Of | ForEachKind::AwaitOf => self.elements(&collection),
                };
                match left {
                    ForHead::Var(decl) => {
                        let mode = if decl.kind == VarKind::Var {
                            Binding::Assign
                        } else {
                            Binding::Declare
                        };
                        for declarator in &decl.declarations {
                            self.bind_pattern(&declarator.target, items.clone(), &inner, mode);
                        }
                    }
                    ForHead::Pattern(pattern) => {
                        self.bind_pattern(pattern, items, &inner, Binding::Assign)
                    }
                }
                self.exec(body, &inner, ret);
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.eval(test, scope);
                self.exec(body, scope, ret);
            }
            Stmt::Throw(expr) => {
                self.eval(expr, scope);
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                self.exec_block(block, scope, ret);
                if let Some(handler) = handler {
                    let inner = self.scope_at(Site::Catch(addr(handler)), scope);
                    if let Some(param) = &handler.param {
                        self.bind_pattern(param, Values::default(), &inner, Binding::Declare);
                    }
                    self.exec_block(&handler.body, &inner, ret);
                }
                if let Some(finalizer) = finalizer {
                    self.exec_block(finalizer, scope, ret);
                }
            }
            Stmt::Switch {
                discriminant,
                cases,
            } => {
                self.eval(discriminant, scope);
                let inner = self.scope_at(Site::Switch(addr(stmt)), scope);
                for case in cases {
                    self.hoist(&case.body, &inner, None);
                }
                for case in cases {
                    if let Some(test) = &case.test {
                        self.eval(test, &inner);
                    }
                    for stmt in &case.body {
                        self.exec(stmt, &inner, ret);
                    }
                }
            }
            Stmt::Labeled { body, .. } => self.exec(body, scope, ret),
            Stmt::Export(ExportDecl::Decl(decl)) => self.exec(decl, scope, ret),
            Stmt::Export(ExportDecl::Default(DefaultExport::Expr(expr))) => {
                self.eval(expr, scope);
            }
            Stmt::Export(_)
            | Stmt::Import(_)
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Empty
            | Stmt::Debugger => {}
        }
    }

    // ── functions and classes ────────────────────────────────────────

    fn call_values(&mut self, callees: &Values, this: &Values, args: &[Values]) -> Values {
        if callees.is_empty() {
            self.call_unknown(args, &Values::default());
            return Values::default();
        }
        let mut out = Values::default();
        for callee in callees.iter() {
            match callee {
                Value::Closure(closure) => out.merge(self.call_closure(closure, this, args)),
                Value::Bound(bound) => {
                    let mut full = bound.args.clone();
                    full.extend(args.iter().cloned());
                    let bound = bound.clone();
                    out.merge(self.call_values(&bound.target, &bound.this, &full));
                }
                Value::Class(_) => {}
                _ => self.call_unknown(args, &Values::default()),
            }
        }
        out
    }

    /// A callee we cannot see into may call any function it is handed.
    fn call_unknown(&mut self, args: &[Values], receiver: &Values) {
        let callback_args = [receiver.clone()];
        for arg in args {
            for value in arg.iter() {
                if let Value::Closure(closure) = value {
                    self.call_closure(closure, &Values::default(), &callback_args);
                }
            }
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: &Values, args: &[Values]) -> Values {
        let func_ptr = Rc::as_ptr(&closure.func) as usize;
        let key: CallKey = (
            func_ptr,
            Rc::as_ptr(&closure.env) as usize,
            this.ids(),
            args.iter().map(Values::ids).collect(),
        );
        if let Some(result) = self.memo.get(&key) {
            return result.clone();
        }
        let summary = (key.0, key.1);
        if self.active.contains(&key)
            || self.stack.len() >= MAX_CALL_DEPTH
            || self.stack.iter().filter(|&&f| f == func_ptr).count() >= MAX_RECURSION
        {
            return self.returns.get(&summary).cloned().unwrap_or_default();
        }
        if self.calls >= MAX_CALLS {
            if self.calls == MAX_CALLS {
                warn!(filename = %self.entry, "call budget exhausted, RAM usage may be underestimated");
                self.calls += 1;
            }
            return self.returns.get(&summary).cloned().unwrap_or_default();
        }
        self.calls += 1;

        self.active.insert(key.clone());
        self.stack.push(func_ptr);
        let result = self.run_function(closure, this, args);
        self.stack.pop();
        self.active.remove(&key);

        self.returns.entry(summary).or_default().merge(result.clone());
        self.memo.insert(key, result.clone());
        result
    }

    fn run_function(&mut self, closure: &Rc<Closure>, this: &Values, args: &[Values]) -> Values {
        let func = closure.func.clone();
        let scope = self.scope_at(Site::Call(Rc::as_ptr(&func) as usize), &closure.env);
        let mut generator = None;
        if !func.is_arrow {
            scope.define("this", this.clone());
            let arguments = self.array_of(Site::Arguments, &scope, args.iter().cloned());
            scope.define("arguments", Values::one(arguments));
            match &closure.home {
                Some((home, is_static)) => {
                    scope.define(SUPER, Values::one(Value::Super(home.clone(), *is_static)))
                }
                None => scope.declare(SUPER),
            }
            if func.is_generator {
                let iterator = Value::Object(self.object_at(Site::Generator, &scope, None));
                scope.define(YIELD, Values::one(iterator.clone()));
                generator = Some(iterator);
            } else {
                scope.declare(YIELD);
            }
        }
        for (i, param) in func.params.iter().enumerate() {
            let values = if param.rest {
                let rest = self.array_of(Site::Rest(addr(param)), &scope, args.iter().skip(i).cloned());
                Values::one(rest)
            } else {
                args.get(i).cloned().unwrap_or_default()
            };
            self.bind_pattern(&param.pattern, values, &scope, Binding::Declare);
        }
        let returned = match &func.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist(body, &scope, Some(&scope));
                let mut ret = Values::default();
                for stmt in body {
                    self.exec(stmt, &scope, &mut ret);
                }
                ret
            }
        };
        match generator {
            Some(iterator) => Values::one(iterator),
            None => returned,
        }
    }

    fn make_class(&mut self, class: &Rc<Class>, scope: &Rc<Scope>) -> Value {
        let parents = match &class.super_class {
            Some(expr) => self.eval(expr, scope),
            None => Values::default(),
        };
        let key = (Rc::as_ptr(class) as usize, Rc::as_ptr(scope) as usize);
        let class_value = match self.classes.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let env = self.scope_at(Site::ClassBody(key.0), scope);
                let statics = self.object_at(Site::Statics, &env, None);
                let created = Rc::new(ClassValue {
                    class: class.clone(),
                    env,
                    parents: RefCell::default(),
                    statics,
                });
                self.classes.insert(key, created.clone());
                created
            }
        };
        class_value.parents.borrow_mut().merge(parents);
        let env = class_value.env.clone();
        let value = Value::Class(class_value.clone());
        if let Some(name) = &class.name {
            env.define(name, Values::one(value.clone()));
        }

        let static_scope = self.scope_at(Site::StaticInit(key.0), &env);
        static_scope.define("this", Values::one(value.clone()));
        static_scope.define(SUPER, Values::one(Value::Super(class_value.clone(), true)));
        for member in &class.members {
            match member {
                ClassMember::Field {
                    key,
                    is_static: true,
                    value: init,
                } => {
                    let name = self.prop_key_name(key, &static_scope);
                    let values = match init {
                        Some(init) => self.eval(init, &static_scope),
                        None => Values::default(),
                    };
                    class_value.statics.set(name, values);
                }
                ClassMember::StaticBlock(body) => {
                    let block_scope = self.scope_at(Site::StaticBlock(body.as_ptr() as usize), &static_scope);
                    self.hoist(body, &block_scope, Some(&block_scope));
                    let mut ignored = Values::default();
                    for stmt in body {
                        self.exec(stmt, &block_scope, &mut ignored);
                    }
                }
                _ => {}
            }
        }
        value
    }

    /// Instances created by the `new` expression at `site` in `scope`.
    fn construct(&mut self, site: usize, scope: &Rc<Scope>, callees: &Values, args: &[Values]) -> Values {
        if callees.is_empty() {
            self.call_unknown(args, &Values::default());
            return Values::default();
        }
        let mut out = Values::default();
        for callee in callees.iter() {
            match callee {
                Value::Class(class) => {
                    let site = Site::Instance(site, Rc::as_ptr(class) as usize);
                    let instance = Value::Object(self.object_at(site, scope, Some(class.clone())));
                    self.run_constructor(class, &Values::one(instance.clone()), args);
                    out.push(instance);
                }
                Value::Closure(closure) if !closure.func.is_arrow => {
                    let site = Site::Instance(site, Rc::as_ptr(&closure.func) as usize);
                    let instance = Value::Object(self.object_at(site, scope, None));
                    let returned = self.call_closure(closure, &Values::one(instance.clone()), args);
                    out.push(instance);
                    out.merge(returned);
                }
                _ => self.call_unknown(args, &Values::default()),
            }
        }
        out
    }

    /// Initialise `class`'s instance fields on `this` and run its
    /// constructor, or the parent's when it declares none.
    fn run_constructor(&mut self, class: &Rc<ClassValue>, this: &Values, args: &[Values]) {
        let field_scope = self.scope_at(Site::Fields(Rc::as_ptr(&class.class) as usize), &class.env);
        field_scope.define("this", this.clone());
        field_scope.define(SUPER, Values::one(Value::Super(class.clone(), false)));
        for member in &class.class.members {
            if let ClassMember::Field {
                key,
                is_static: false,
                value,
            } = member
            {
                let name = self.prop_key_name(key, &field_scope);
                let values = match value {
                    Some(init) => self.eval(init, &field_scope),
                    None => Values::default(),
                };
                for target in this.iter() {
                    if let Value::Object(o) = target {
                        o.set(name.clone(), values.clone());
                    }
                }
            }
        }

        match class.class.constructor() {
            Some(ctor) => {
                let ctor = self.method(ctor, class, false);
                self.call_values(&Values::one(ctor), this, args);
            }
            None => self.construct_parents(class, this, args),
        }
    }

    fn construct_parents(&mut self, class: &Rc<ClassValue>, this: &Values, args: &[Values]) {
        let parents = class.parents.borrow().clone();
        for parent in parents.iter() {
            match parent {
                Value::Class(parent) => self.run_constructor(parent, this, args),
                Value::Closure(_) | Value::Bound(_) => {
                    self.call_values(&Values::one(parent.clone()), this, args);
                }
                _ => {}
            }
        }
    }

    fn instance_member(&mut self, class: &Rc<ClassValue>, name: &PropName, this: &Values) -> Values {
        let mut out = Values::default();
        let mut found = false;
        for member in &class.class.members {
            let ClassMember::Method {
                key,
                kind,
                is_static: false,
                function,
            } = member
            else {
                continue;
            };
            if *kind == MethodKind::Constructor || key.name().as_ref() != Some(name) {
                continue;
            }
            found = true;
            let method = self.method(function, class, false);
            match kind {
                MethodKind::Getter => {
                    let values = self.call_values(&Values::one(method), this, &[]);
                    out.merge(values);
                }
                MethodKind::Setter => {}
                _ => out.push(method),
            }
        }
        if !found {
            let parents = class.parents.borrow().clone();
            for parent in parents.iter() {
                if let Value::Class(parent) = parent {
                    out.merge(self.instance_member(parent, name, this));
                }
            }
        }
        out
    }

    fn static_member(&mut self, class: &Rc<ClassValue>, name: Option<&PropName>, this: &Values) -> Values {
        let mut out = Values::default();
        let Some(name) = name else {
            for values in class.statics.fields.borrow().values() {
                out.merge(values.clone());
            }
            return out;
        };
        let field = class.statics.fields.borrow().get(name).cloned();
        if let Some(values) = field {
            out.merge(values);
        }
        for member in &class.class.members {
            let ClassMember::Method {
                key,
                kind,
                is_static: true,
                function,
            } = member
            else {
                continue;
            };
            if key.name().as_ref() != Some(name) {
                continue;
            }
            let method = self.method(function, class, true);
            match kind {
                MethodKind::Getter => {
                    let values = self.call_values(&Values::one(method), this, &[]);
                    out.merge(values);
                }
                MethodKind::Setter => {}
                _ => out.push(method),
            }
        }
        if out.is_empty() {
            let parents = class.parents.borrow().clone();
            for parent in parents.iter() {
                if let Value::Class(parent) = parent {
                    out.merge(self.static_member(parent, Some(name), this));
                }
            }
        }
        out
    }

    /// `set` accessors for `name` on `class` or the nearest parent declaring one.
    fn class_setters(&mut self, class: &Rc<ClassValue>, name: &PropName, is_static: bool) -> Values {
        let mut out = Values::default();
        for member in &class.class.members {
            if let ClassMember::Method {
                key,
                kind: MethodKind::Setter,
                is_static: member_static,
                function,
            } = member
            {
                if *member_static == is_static && key.name().as_ref() == Some(name) {
                    out.push(self.method(function, class, is_static));
                }
            }
        }
        if out.is_empty() {
            let parents = class.parents.borrow().clone();
            for parent in parents.iter() {
                if let Value::Class(parent) = parent {
                    out.merge(self.class_setters(parent, name, is_static));
                }
            }
        }
        out
    }

    // ── properties ───────────────────────────────────────────────────

    fn prop_key_name(&mut self, key: &PropKey, scope: &Rc<Scope>) -> Option<PropName> {
        if let PropKey::Computed(expr) = key {
            if key.name().is_none() {
                self.eval(expr, scope);
            }
        }
        key.name()
    }

    fn member_name(&mut self, property: &MemberProp, scope: &Rc<Scope>) -> Option<PropName> {
        if let MemberProp::Computed(expr) = property {
            if property.name().is_none() {
                self.eval(expr, scope);
            }
        }
        property.name()
    }

    fn property_of_all(&mut self, objects: &Values, name: Option<&PropName>) -> Values {
        let mut out = Values::default();
        for object in objects.iter() {
            out.merge(self.property(object, name));
        }
        out
    }

    /// Every value an iteration over `values` may produce.
    fn elements(&mut self, values: &Values) -> Values {
        let mut out = Values::default();
        for value in values.iter() {
            if let Value::Object(_) = value {
                out.merge(self.property(value, None));
            }
        }
        out
    }

    /// Read `name` (or any property when unknown) from `target`.
    fn property(&mut self, target: &Value, name: Option<&PropName>) -> Values {
        if self.property_depth >= MAX_PROPERTY_DEPTH {
            return Values::default();
        }
        self.property_depth += 1;
        let values = self.read_property(target, name);
        self.property_depth -= 1;
        values
    }

    fn read_property(&mut self, target: &Value, name: Option<&PropName>) -> Values {
        match target {
            Value::Api(path) => {
                let Some(PropName::Public(name)) = name else {
                    return Values::default();
                };
                let costs = self.costs;
                match costs.member(path, name) {
                    Some(CostNode::Namespace(_)) => {
                        let mut child = path.to_vec();
                        child.push(name.clone());
                        Values::one(Value::Api(child.into()))
                    }
                    Some(CostNode::Cost(cost)) => {
                        self.charge(path, name, *cost);
                        Values::default()
                    }
                    None => Values::default(),
                }
            }
            Value::Object(object) => self.object_property(target, object, name),
            Value::Class(class) => {
                let this = Values::one(target.clone());
                self.static_member(class, name, &this)
            }
            Value::Module(filename) => match name {
                Some(PropName::Public(name)) => self.export_values(filename, name),
                _ => self.all_exports(filename),
            },
            Value::Import(_) => {
                let expanded = self.expand(Values::one(target.clone()));
                self.property_of_all(&expanded, name)
            }
            Value::Super(home, is_static) => {
                let Some(name) = name else {
                    return Values::default();
                };
                let mut out = Values::default();
                let parents = home.parents.borrow().clone();
                for parent in parents.iter() {
                    if let Value::Class(parent) = parent {
                        let this = Values::default();
                        if *is_static {
                            out.merge(self.static_member(parent, Some(name), &this));
                        } else {
                            out.merge(self.instance_member(parent, name, &this));
                        }
                    }
                }
                out
            }
            Value::Closure(_) | Value::Bound(_) => Values::default(),
        }
    }

    fn object_property(&mut self, target: &Value, object: &Rc<ObjectValue>, name: Option<&PropName>) -> Values {
        let mut out = Values::default();
        match name {
            Some(name) => {
                let field = object.fields.borrow().get(name).cloned();
                if let Some(values) = field {
                    out.merge(values);
                }
                let getters = object.getters.borrow().get(name).cloned();
                if let Some(getters) = getters {
                    let this = Values::one(target.clone());
                    out.merge(self.call_values(&getters, &this, &[]));
                }
                if let Some(class) = &object.class {
                    let this = Values::one(target.clone());
                    out.merge(self.instance_member(class, name, &this));
                }
            }
            None => {
                let fields: Vec<Values> = object.fields.borrow().values().cloned().collect();
                for values in fields {
                    out.merge(values);
                }
            }
        }
        out.merge(object.unknown.borrow().clone());
        let spreads = object.spreads.borrow().clone();
        for source in spreads.iter() {
            out.merge(self.property(source, name));
        }
        out
    }

    // ── expressions ──────────────────────────────────────────────────

    fn eval_args(&mut self, args: &[Arg], scope: &Rc<Scope>) -> Vec<Values> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Expr(expr) => out.push(self.eval(expr, scope)),
                Arg::Spread(expr) => {
                    let values = self.eval(expr, scope);
                    out.push(self.elements(&values));
                }
            }
        }
        out
    }

    fn super_member(&mut self, scope: &Rc<Scope>, name: Option<PropName>) -> (Values, Values) {
        let this = self.read_var(scope, "this");
        let supers = scope.lookup(SUPER).unwrap_or_default();
        let targets = self.property_of_all(&supers, name.as_ref());
        (targets, this)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg], scope: &Rc<Scope>) -> Values {
        match callee {
            Expr::Super => {
                let args = self.eval_args(args, scope);
                let this = self.read_var(scope, "this");
                let supers = scope.lookup(SUPER).unwrap_or_default();
                for value in supers.iter() {
                    if let Value::Super(home, false) = value {
                        self.construct_parents(home, &this, &args);
                    }
                }
                Values::default()
            }
            Expr::Member {
                object, property, ..
            } => {
                let name = self.member_name(property, scope);
                if let Expr::Super = object.as_ref() {
                    let args = self.eval_args(args, scope);
                    let (targets, this) = self.super_member(scope, name);
                    return self.call_values(&targets, &this, &args);
                }
                let objects = self.eval(object, scope);
                let args = self.eval_args(args, scope);
                if let Some(PropName::Public(method)) = &name {
                    if matches!(method.as_str(), "call" | "apply" | "bind")
                        && objects
                            .iter()
                            .any(|o| matches!(o, Value::Closure(_) | Value::Bound(_)))
                    {
                        return self.call_indirect(method, &objects, &args);
                    }
                }

                let mut out = Values::default();
                if objects.is_empty() {
                    self.call_unknown(&args, &Values::default());
                }
                for object in objects.iter() {
                    let targets = self.property(object, name.as_ref());
                    if targets.is_empty() {
                        let receiver = match object {
                            Value::Object(_) => self.elements(&Values::one(object.clone())),
                            other => Values::one(other.clone()),
                        };
                        self.call_unknown(&args, &receiver);
                        continue;
                    }
                    let this = Values::one(object.clone());
                    out.merge(self.call_values(&targets, &this, &args));
                }
                out
            }
            _ => {
                let callees = self.eval(callee, scope);
                let args = self.eval_args(args, scope);
                self.call_values(&callees, &Values::default(), &args)
            }
        }
    }

    /// `f.call(this, ...)`, `f.apply(this, args)` and `f.bind(this, ...)`.
    fn call_indirect(&mut self, method: &str, functions: &Values, args: &[Values]) -> Values {
        let this = args.first().cloned().unwrap_or_default();
        let rest: Vec<Values> = args.iter().skip(1).cloned().collect();
        match method {
            "call" => self.call_values(functions, &this, &rest),
            "apply" => {
                let items = match rest.first() {
                    Some(array) => self.elements(array),
                    None => Values::default(),
                };
                let arity = functions
                    .iter()
                    .map(|f| match f {
                        Value::Closure(c) => c.func.params.len(),
                        _ => 1,
                    })
                    .max()
                    .unwrap_or(1)
                    .max(1);
                self.call_values(functions, &this, &vec![items; arity])
            }
            _ => Values::one(Value::Bound(Rc::new(BoundFunction {
                target: functions.clone(),
                this,
                args: rest,
            }))),
        }
    }

    fn eval_object(&mut self, site: usize, props: &[Prop], scope: &Rc<Scope>) -> Values {
        let object = self.object_at(Site::Literal(site), scope, None);
        for prop in props {
            match prop {
                Prop::KeyValue { key, value } => {
                    let name = self.prop_key_name(key, scope);
                    let values = self.eval(value, scope);
                    object.set(name, values);
                }
                Prop::Shorthand(name) => {
                    let values = self.read_var(scope, name);
                    object.set(Some(PropName::Public(name.clone())), values);
                }
                Prop::ShorthandDefault { name, default } => {
                    let mut values = self.read_var(scope, name);
                    values.merge(self.eval(default, scope));
                    object.set(Some(PropName::Public(name.clone())), values);
                }
                Prop::Method {
                    key,
                    kind,
                    function,
                } => {
                    let name = self.prop_key_name(key, scope);
                    let method = Values::one(self.closure(function, scope));
                    match (kind, name) {
                        (MethodKind::Getter, Some(name)) => object
                            .getters
                            .borrow_mut()
                            .entry(name)
                            .or_default()
                            .merge(method),
                        (MethodKind::Setter, Some(name)) => object
                            .setters
                            .borrow_mut()
                            .entry(name)
                            .or_default()
                            .merge(method),
                        (MethodKind::Setter, None) => {}
                        (_, name) => object.set(name, method),
                    }
                }
                Prop::Spread(expr) => {
                    let values = self.eval(expr, scope);
                    object.spreads.borrow_mut().merge(values);
                }
            }
        }
        Values::one(Value::Object(object))
    }

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Values {
        match expr {
            Expr::Ident(name) => self.read_var(scope, name),
            Expr::This => self.read_var(scope, "this"),
            Expr::Super
            | Expr::Null
            | Expr::Bool(_)
            | Expr::Num(_)
            | Expr::BigInt(_)
            | Expr::Str(_)
            | Expr::Regex { .. }
            | Expr::MetaProperty { .. } => Values::default(),
            Expr::Template { exprs, .. } => {
                for expr in exprs {
                    self.eval(expr, scope);
                }
                Values::default()
            }
            Expr::TaggedTemplate { tag, exprs } => {
                let mut args = vec![Values::default()];
                for expr in exprs {
                    args.push(self.eval(expr, scope));
                }
                let callees = self.eval(tag, scope);
                self.call_values(&callees, &Values::default(), &args)
            }
            Expr::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        ArrayElement::Hole => items.push(Values::default()),
                        ArrayElement::Expr(expr) => items.push(self.eval(expr, scope)),
                        ArrayElement::Spread(expr) => {
                            let values = self.eval(expr, scope);
                            items.push(self.elements(&values));
                        }
                    }
                }
                Values::one(self.array_of(Site::Literal(addr(expr)), scope, items))
            }
            Expr::Object(props) => self.eval_object(addr(expr), props, scope),
            Expr::Function(func) => match (&func.name, func.is_arrow) {
                (Some(name), false) => {
                    let own = self.scope_at(Site::NamedFunction(Rc::as_ptr(func) as usize), scope);
                    let closure = self.closure(func, &own);
                    own.define(name, Values::one(closure.clone()));
                    Values::one(closure)
                }
                _ => Values::one(self.closure(func, scope)),
            },
            Expr::Class(class) => Values::one(self.make_class(class, scope)),
            Expr::Unary { arg, .. } | Expr::Update { arg, .. } => {
                self.eval(arg, scope);
                Values::default()
            }
            Expr::Binary { left, right, .. } => {
                self.eval(left, scope);
                self.eval(right, scope);
                Values::default()
            }
            Expr::Logical { left, right, .. } => {
                let mut values = self.eval(left, scope);
                values.merge(self.eval(right, scope));
                values
            }
            Expr::Assign { op, target, value } => {
                let values = self.eval(value, scope);
                match *op {
                    "=" | "||=" | "&&=" | "??=" => {
                        self.bind_pattern(target, values.clone(), scope, Binding::Assign);
                        values
                    }
                    _ => {
                        if let Pattern::Expr(target) = target.as_ref() {
                            self.eval(target, scope);
                        }
                        Values::default()
                    }
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.eval(test, scope);
                let mut values = self.eval(consequent, scope);
                values.merge(self.eval(alternate, scope));
                values
            }
            Expr::Call { callee, args, .. } => self.eval_call(callee, args, scope),
            Expr::New { callee, args } => {
                let callees = self.eval(callee, scope);
                let args = self.eval_args(args, scope);
                self.construct(addr(expr), scope, &callees, &args)
            }
            Expr::Member {
                object, property, ..
            } => {
                let name = self.member_name(property, scope);
                if let Expr::Super = object.as_ref() {
                    return self.super_member(scope, name).0;
                }
                let objects = self.eval(object, scope);
                self.property_of_all(&objects, name.as_ref())
            }
            Expr::Sequence(exprs) => {
                let mut last = Values::default();
                for expr in exprs {
                    last = self.eval(expr, scope);
                }
                last
            }
            Expr::Await(arg) => self.eval(arg, scope),
            Expr::Yield { arg, delegate } => {
                if let Some(arg) = arg {
                    let mut values = self.eval(arg, scope);
                    if *delegate {
                        values = self.elements(&values);
                    }
                    let iterators = scope.lookup(YIELD).unwrap_or_default();
                    for iterator in iterators.iter() {
                        if let Value::Object(o) = iterator {
                            o.set(None, values.clone());
                        }
                    }
                }
                Values::default()
            }
            Expr::ImportCall(specifier) => {
                self.eval(specifier, scope);
                let Expr::Str(specifier) = specifier.as_ref() else {
                    return Values::default();
                };
                match self.resolve_specifier(&scope.module, specifier) {
                    Some(target) => Values::one(Value::Module(target)),
                    None => Values::default(),
                }
            }
        }
    }
}

fn declare_all(decl: &VarDecl, scope: &Rc<Scope>) {
    let mut names = Vec::new();
    for declarator in &decl.declarations {
        declarator.target.bound_names(&mut names);
    }
    for name in names {
        scope.declare(&name);
    }
}

/// `var` names declared anywhere in `stmt` outside nested functions.
fn collect_var_names(stmt: &Stmt, out: &mut Vec<String>) {
    let var_names = |decl: &VarDecl, out: &mut Vec<String>| {
        if decl.kind == VarKind::Var {
            for declarator in &decl.declarations {
                declarator.target.bound_names(out);
            }
        }
    };
    match stmt {
        Stmt::Var(decl) => var_names(decl, out),
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_var_names(consequent, out);
            if let Some(alternate) = alternate {
                collect_var_names(alternate, out);
            }
        }
        Stmt::Block(body) => body.iter().for_each(|s| collect_var_names(s, out)),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Var(decl)) = init {
                var_names(decl, out);
            }
            collect_var_names(body, out);
        }
        Stmt::ForEach { left, body, .. } => {
            if let ForHead::Var(decl) = left {
                var_names(decl, out);
            }
            collect_var_names(body, out);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_var_names(body, out)
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            block.iter().for_each(|s| collect_var_names(s, out));
            if let Some(handler) = handler {
                handler.body.iter().for_each(|s| collect_var_names(s, out));
            }
            if let Some(finalizer) = finalizer {
                finalizer.iter().for_each(|s| collect_var_names(s, out));
            }
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                case.body.iter().for_each(|s| collect_var_names(s, out));
            }
        }
        Stmt::Export(ExportDecl::Decl(decl)) => collect_var_names(decl, out),
        _ => {}
    }
}
