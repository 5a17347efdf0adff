//! Syntax tree for one script *before* it is analysed or rewritten.
//!
//! Functions and classes are reference counted so the analyzer can keep a
//! closure (`Rc<Function>` + environment) around without borrowing the tree.

use std::rc::Rc;

use super::lexer::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Var(VarDecl),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (… in …)` and `for [await] (… of …)`.
    ForEach {
        kind: ForEachKind,
        left: ForHead,
        right: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Import(ImportDecl),
    Export(ExportDecl),
    Empty,
    Debugger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarations: Vec<VarDeclarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachKind {
    In,
    Of,
    AwaitOf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    Var(VarDecl),
    Pattern(Pattern),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

// ─────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────

/// The string literal naming another module, e.g. `"./lib.js"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSource {
    pub value: String,
    /// Span of the literal *including* its quotes.
    pub span: Span,
}

impl ModuleSource {
    /// Span of the literal's contents, i.e. without the quotes.
    pub fn inner_span(&self) -> Span {
        Span::new(self.span.start + 1, self.span.end.saturating_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub specifiers: Vec<ImportSpecifier>,
    pub source: ModuleSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportSpecifier {
    /// `import local from "…"`
    Default { local: String },
    /// `import * as local from "…"`
    Namespace { local: String },
    /// `import { imported as local } from "…"`
    Named { imported: String, local: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDecl {
    /// `export function f() {}`, `export const a = …`, `export class C {}`
    Decl(Box<Stmt>),
    Default(DefaultExport),
    /// `export { a, b as c }` optionally re-exported `from "…"`.
    Named {
        specifiers: Vec<ExportSpecifier>,
        source: Option<ModuleSource>,
    },
    /// `export * from "…"` / `export * as name from "…"`
    All {
        exported: Option<String>,
        source: ModuleSource,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultExport {
    Function(Rc<Function>),
    Class(Rc<Class>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpecifier {
    pub local: String,
    pub exported: String,
}

impl Program {
    /// Every statement that names a source module, paired with that source.
    pub fn module_sources(&self) -> Vec<&ModuleSource> {
        self.body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Import(import) => Some(&import.source),
                Stmt::Export(ExportDecl::Named {
                    source: Some(source),
                    ..
                }) => Some(source),
                Stmt::Export(ExportDecl::All { source, .. }) => Some(source),
                _ => None,
            })
            .collect()
    }

    /// Names this module exports, not counting `export * from` re-exports.
    pub fn exported_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for stmt in &self.body {
            let Stmt::Export(export) = stmt else {
                continue;
            };
            match export {
                ExportDecl::Decl(decl) => match decl.as_ref() {
                    Stmt::Function(f) => names.extend(f.name.clone()),
                    Stmt::Class(c) => names.extend(c.name.clone()),
                    Stmt::Var(var) => {
                        for declarator in &var.declarations {
                            declarator.target.bound_names(&mut names);
                        }
                    }
                    _ => {}
                },
                ExportDecl::Default(_) => names.push("default".to_string()),
                ExportDecl::Named { specifiers, .. } => {
                    names.extend(specifiers.iter().map(|s| s.exported.clone()));
                }
                ExportDecl::All {
                    exported: Some(name),
                    ..
                } => names.push(name.clone()),
                ExportDecl::All { exported: None, .. } => {}
            }
        }
        names
    }
}

// ─────────────────────────────────────────────────────
// Functions and classes
// ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub pattern: Pattern,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// Concise arrow body: `x => x + 1`.
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: Option<String>,
    pub super_class: Option<Box<Expr>>,
    pub members: Vec<ClassMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
    Constructor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Method {
        key: PropKey,
        kind: MethodKind,
        is_static: bool,
        function: Rc<Function>,
    },
    Field {
        key: PropKey,
        is_static: bool,
        value: Option<Expr>,
    },
    StaticBlock(Vec<Stmt>),
}

impl Class {
    pub fn constructor(&self) -> Option<&Rc<Function>> {
        self.members.iter().find_map(|m| match m {
            ClassMember::Method {
                kind: MethodKind::Constructor,
                function,
                ..
            } => Some(function),
            _ => None,
        })
    }

    /// Method (or accessor) by name; `is_static` selects class vs prototype side.
    pub fn method(&self, name: &PropName, is_static: bool) -> Option<&Rc<Function>> {
        self.members.iter().find_map(|m| match m {
            ClassMember::Method {
                key,
                kind,
                is_static: s,
                function,
            } if *s == is_static
                && *kind != MethodKind::Constructor
                && key.name().as_ref() == Some(name) =>
            {
                Some(function)
            }
            _ => None,
        })
    }
}

/// Property key as written in an object literal, class body or pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    /// Identifier, string or numeric key, normalised to its string form.
    Named(String),
    /// `#field`
    Private(String),
    Computed(Box<Expr>),
}

/// A statically known property name; public and private names never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropName {
    Public(String),
    Private(String),
}

impl PropKey {
    pub fn name(&self) -> Option<PropName> {
        match self {
            PropKey::Named(n) => Some(PropName::Public(n.clone())),
            PropKey::Private(n) => Some(PropName::Private(n.clone())),
            PropKey::Computed(expr) => match expr.as_ref() {
                Expr::Str(s) => Some(PropName::Public(s.clone())),
                _ => None,
            },
        }
    }
}

// ─────────────────────────────────────────────────────
// Expressions and patterns
// ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    This,
    Super,
    Null,
    Bool(bool),
    Num(f64),
    BigInt(String),
    Str(String),
    Regex {
        pattern: String,
        flags: String,
    },
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    TaggedTemplate {
        tag: Box<Expr>,
        exprs: Vec<Expr>,
    },
    Array(Vec<ArrayElement>),
    Object(Vec<Prop>),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Unary {
        op: &'static str,
        arg: Box<Expr>,
    },
    Update {
        op: &'static str,
        prefix: bool,
        arg: Box<Expr>,
    },
    Binary {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: &'static str,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
    Yield {
        arg: Option<Box<Expr>>,
        delegate: bool,
    },
    /// `import("…")`
    ImportCall(Box<Expr>),
    /// `new.target`, `import.meta`
    MetaProperty {
        meta: &'static str,
        property: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    Ident(String),
    Private(String),
    Computed(Box<Expr>),
}

impl MemberProp {
    pub fn name(&self) -> Option<PropName> {
        match self {
            MemberProp::Ident(n) => Some(PropName::Public(n.clone())),
            MemberProp::Private(n) => Some(PropName::Private(n.clone())),
            MemberProp::Computed(expr) => match expr.as_ref() {
                Expr::Str(s) => Some(PropName::Public(s.clone())),
                Expr::Template { quasis, exprs } if exprs.is_empty() => {
                    Some(PropName::Public(quasis.concat()))
                }
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Hole,
    Expr(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Expr(Expr),
    Spread(Expr),
}

impl Arg {
    pub fn expr(&self) -> &Expr {
        match self {
            Arg::Expr(e) | Arg::Spread(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    KeyValue {
        key: PropKey,
        value: Expr,
    },
    Shorthand(String),
    /// `{ a = 1 }`, only meaningful once the literal becomes a pattern.
    ShorthandDefault {
        name: String,
        default: Expr,
    },
    Method {
        key: PropKey,
        kind: MethodKind,
        function: Rc<Function>,
    },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    /// Target with a default value: `a = 1` inside a pattern or parameter list.
    Default {
        target: Box<Pattern>,
        default: Box<Expr>,
    },
    /// Member expression target such as `this.#ns` or `obj[key]`.
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProp {
    pub key: PropKey,
    pub value: Pattern,
}

impl Pattern {
    /// Every identifier this pattern declares, in source order.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Ident(name) => out.push(name.clone()),
            Pattern::Object { props, rest } => {
                for prop in props {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Array { elements, rest } => {
                for element in elements.iter().flatten() {
                    element.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Default { target, .. } => target.bound_names(out),
            Pattern::Expr(_) => {}
        }
    }
}
