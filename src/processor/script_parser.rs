//! Recursive-descent parser that consumes the lexer and builds a `Program`.
//!
//! Scripts are always parsed as ES modules (strict mode, top-level
//! `await`, `import`/`export`). Arrow functions are recognised by
//! speculatively parsing a parameter list and rewinding when no `=>`
//! follows, which is cheap because the whole token stream is buffered.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{Lexer, Span, Token, TokenKind};
use crate::error::SyntaxError;

type PResult<T> = Result<T, SyntaxError>;

/// Words that can never be used as an identifier reference in module code.
const RESERVED: &[&str] = &[
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "import",
    "in",
    "instanceof",
    "new",
    "null",
    "return",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
];

/// Deepest statement and expression nesting accepted.
const MAX_NESTING: usize = 128;

const ASSIGN_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "&&=",
    "||=", "??=",
];

/// Parse a whole script as an ES module.
pub fn parse_module(src: &str) -> Result<Program, SyntaxError> {
    let tokens = Lexer::new(src).tokenize().map_err(|e| e.locate(src))?;
    Parser::new(tokens).parse_program().map_err(|e| e.locate(src))
}

fn binary_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "??" | "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" | "===" | "!==" => 6,
        "<" | ">" | "<=" | ">=" | "instanceof" | "in" => 7,
        "<<" | ">>" | ">>>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        "**" => 11,
        _ => return None,
    })
}

fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Inside a `for (…;` head, where `in` is not a binary operator.
    no_in: bool,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            no_in: false,
            depth: 0,
        }
    }

    // ── token helpers ────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
    }

    fn is_punct_at(&self, n: usize, p: &str) -> bool {
        matches!(&self.peek_at(n).kind, TokenKind::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> PResult<Span> {
        if self.is_punct(p) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&format!("expected `{p}`")))
        }
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(id) if id == w)
    }

    fn is_word_at(&self, n: usize, w: &str) -> bool {
        matches!(&self.peek_at(n).kind, TokenKind::Ident(id) if id == w)
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.is_word(w) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, w: &str) -> PResult<()> {
        if self.eat_word(w) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected `{w}`")))
        }
    }

    fn unexpected(&self, context: &str) -> SyntaxError {
        let tok = self.peek();
        let found = match &tok.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident(id) => format!("`{id}`"),
            TokenKind::Punct(p) => format!("`{p}`"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Number(_) | TokenKind::BigInt(_) => "number".to_string(),
            TokenKind::PrivateName(n) => format!("`#{n}`"),
            TokenKind::Regex { .. } => "regular expression".to_string(),
            _ => "template literal".to_string(),
        };
        SyntaxError::new(format!("{context}, found {found}"), tok.span)
    }

    /// Any identifier-like word, including reserved words (property names).
    fn ident_name(&mut self) -> PResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(id) => {
                let id = id.clone();
                self.advance();
                Ok(id)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn is_binding_ident(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(id) if !RESERVED.contains(&id.as_str()))
    }

    fn binding_ident(&mut self) -> PResult<String> {
        if self.is_binding_ident() {
            self.ident_name()
        } else {
            Err(self.unexpected("expected identifier"))
        }
    }

    /// Automatic semicolon insertion.
    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(";") {
            return Ok(());
        }
        if self.is_punct("}") || self.at_eof() || self.peek().newline_before {
            return Ok(());
        }
        Err(self.unexpected("expected `;`"))
    }

    /// Run `f` one level deeper, failing once nesting exceeds `MAX_NESTING`.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::new("nesting too deep", self.peek().span));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn allow_in<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = self.no_in;
        self.no_in = false;
        let res = f(self);
        self.no_in = saved;
        res
    }

    // ── statements ───────────────────────────────────────────────────

    fn parse_program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement_list_item()?);
        }
        Ok(Program { body })
    }

    fn is_let_declaration(&self) -> bool {
        self.is_word("let")
            && (self.is_punct_at(1, "[")
                || self.is_punct_at(1, "{")
                || matches!(&self.peek_at(1).kind, TokenKind::Ident(_)))
    }

    fn is_async_function(&self) -> bool {
        self.is_word("async") && self.is_word_at(1, "function") && !self.peek_at(1).newline_before
    }

    fn parse_statement_list_item(&mut self) -> PResult<Stmt> {
        if self.is_word("import") && !self.is_punct_at(1, "(") && !self.is_punct_at(1, ".") {
            return self.parse_import();
        }
        if self.is_word("export") {
            return self.parse_export();
        }
        if self.is_word("function") {
            return Ok(Stmt::Function(self.parse_function(false, true)?));
        }
        if self.is_async_function() {
            self.advance();
            return Ok(Stmt::Function(self.parse_function(true, true)?));
        }
        if self.is_word("class") {
            return Ok(Stmt::Class(self.parse_class(true)?));
        }
        if self.is_word("const") || self.is_word("var") || self.is_let_declaration() {
            let decl = self.parse_var_decl()?;
            self.consume_semicolon()?;
            return Ok(Stmt::Var(decl));
        }
        self.parse_statement()
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.nested(Self::statement)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if let TokenKind::Punct(p) = self.peek().kind {
            match p {
                "{" => return Ok(Stmt::Block(self.parse_block()?)),
                ";" => {
                    self.advance();
                    return Ok(Stmt::Empty);
                }
                _ => {}
            }
        }
        if let TokenKind::Ident(word) = &self.peek().kind {
            match word.as_str() {
                "if" => return self.parse_if(),
                "for" => return self.parse_for(),
                "while" => {
                    self.advance();
                    let test = self.parse_paren_expression()?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::While { test, body });
                }
                "do" => {
                    self.advance();
                    let body = Box::new(self.parse_statement()?);
                    self.expect_word("while")?;
                    let test = self.parse_paren_expression()?;
                    self.eat_punct(";");
                    return Ok(Stmt::DoWhile { body, test });
                }
                "return" => {
                    self.advance();
                    let arg = if self.is_punct(";")
                        || self.is_punct("}")
                        || self.at_eof()
                        || self.peek().newline_before
                    {
                        None
                    } else {
                        Some(self.parse_expression()?)
                    };
                    self.consume_semicolon()?;
                    return Ok(Stmt::Return(arg));
                }
                "break" | "continue" => {
                    let is_break = word == "break";
                    self.advance();
                    let label = if self.is_binding_ident() && !self.peek().newline_before {
                        Some(self.ident_name()?)
                    } else {
                        None
                    };
                    self.consume_semicolon()?;
                    return Ok(if is_break {
                        Stmt::Break(label)
                    } else {
                        Stmt::Continue(label)
                    });
                }
                "throw" => {
                    self.advance();
                    if self.peek().newline_before {
                        return Err(self.unexpected("illegal newline after throw"));
                    }
                    let arg = self.parse_expression()?;
                    self.consume_semicolon()?;
                    return Ok(Stmt::Throw(arg));
                }
                "try" => return self.parse_try(),
                "switch" => return self.parse_switch(),
                "debugger" => {
                    self.advance();
                    self.consume_semicolon()?;
                    return Ok(Stmt::Debugger);
                }
                "with" => {
                    return Err(self.unexpected("`with` is not allowed in module code"));
                }
                "function" | "class" | "export" | "const" => {
                    return self.parse_statement_list_item();
                }
                _ => {}
            }
            if self.is_binding_ident() && self.is_punct_at(1, ":") {
                let label = self.ident_name()?;
                self.advance();
                let body = Box::new(self.parse_statement()?);
                return Ok(Stmt::Labeled { label, body });
            }
            if self.is_async_function() || self.is_let_declaration() || self.is_word("var") {
                return self.parse_statement_list_item();
            }
        }

        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        self.allow_in(|p| {
            let mut body = Vec::new();
            while !p.is_punct("}") {
                if p.at_eof() {
                    return Err(p.unexpected("expected `}`"));
                }
                body.push(p.parse_statement_list_item()?);
            }
            p.advance();
            Ok(body)
        })
    }

    fn parse_paren_expression(&mut self) -> PResult<Expr> {
        self.expect_punct("(")?;
        let expr = self.allow_in(|p| p.parse_expression())?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect_word("if")?;
        let test = self.parse_paren_expression()?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_word("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_var_kind(&mut self) -> PResult<VarKind> {
        let kind = match &self.peek().kind {
            TokenKind::Ident(w) if w == "var" => VarKind::Var,
            TokenKind::Ident(w) if w == "let" => VarKind::Let,
            TokenKind::Ident(w) if w == "const" => VarKind::Const,
            _ => return Err(self.unexpected("expected declaration")),
        };
        self.advance();
        Ok(kind)
    }

    fn parse_var_decl(&mut self) -> PResult<VarDecl> {
        let kind = self.parse_var_kind()?;
        let mut declarations = Vec::new();
        loop {
            let target = self.parse_binding_target()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(VarDeclarator { target, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(VarDecl { kind, declarations })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect_word("for")?;
        let is_await = self.eat_word("await");
        self.expect_punct("(")?;

        let saved = self.no_in;
        self.no_in = true;
        let init = if self.is_punct(";") {
            None
        } else if self.is_word("const") || self.is_word("var") || self.is_let_declaration() {
            Some(ForInit::Var(self.parse_var_decl()?))
        } else {
            Some(ForInit::Expr(self.parse_expression()?))
        };
        self.no_in = saved;

        let each_kind = if self.eat_word("of") {
            Some(if is_await {
                ForEachKind::AwaitOf
            } else {
                ForEachKind::Of
            })
        } else if self.eat_word("in") {
            Some(ForEachKind::In)
        } else {
            None
        };

        if let Some(kind) = each_kind {
            let left = match init {
                Some(ForInit::Var(decl)) => ForHead::Var(decl),
                Some(ForInit::Expr(expr)) => ForHead::Pattern(self.expr_to_pattern(expr)?),
                None => return Err(self.unexpected("expected loop variable")),
            };
            let right = self.allow_in(|p| {
                if kind == ForEachKind::In {
                    p.parse_expression()
                } else {
                    p.parse_assignment()
                }
            })?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::ForEach {
                kind,
                left,
                right,
                body,
            });
        }

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.allow_in(|p| p.parse_expression())?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.allow_in(|p| p.parse_expression())?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        self.expect_word("try")?;
        let block = self.parse_block()?;
        let handler = if self.eat_word("catch") {
            let param = if self.eat_punct("(") {
                let param = self.parse_binding_target()?;
                self.expect_punct(")")?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat_word("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("expected `catch` or `finally`"));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.expect_word("switch")?;
        let discriminant = self.parse_paren_expression()?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_word("case") {
                Some(self.allow_in(|p| p.parse_expression())?)
            } else if self.eat_word("default") {
                None
            } else {
                return Err(self.unexpected("expected `case` or `default`"));
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_word("case") && !self.is_word("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected("expected `}`"));
                }
                body.push(self.parse_statement_list_item()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    // ── modules ──────────────────────────────────────────────────────

    fn parse_module_source(&mut self) -> PResult<ModuleSource> {
        match &self.peek().kind {
            TokenKind::Str(value) => {
                let value = value.clone();
                let span = self.advance().span;
                Ok(ModuleSource { value, span })
            }
            _ => Err(self.unexpected("expected module specifier")),
        }
    }

    /// Identifier or string literal used as an import/export name.
    fn module_export_name(&mut self) -> PResult<String> {
        if let TokenKind::Str(s) = &self.peek().kind {
            let s = s.clone();
            self.advance();
            return Ok(s);
        }
        self.ident_name()
    }

    /// `with { type: "json" }` / `assert { … }` import attributes are skipped.
    fn skip_import_attributes(&mut self) -> PResult<()> {
        if (self.is_word("with") || self.is_word("assert")) && self.is_punct_at(1, "{") {
            self.advance();
            self.parse_object_literal()?;
        }
        Ok(())
    }

    fn parse_import(&mut self) -> PResult<Stmt> {
        self.expect_word("import")?;
        let mut specifiers = Vec::new();

        if matches!(self.peek().kind, TokenKind::Str(_)) {
            let source = self.parse_module_source()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            return Ok(Stmt::Import(ImportDecl { specifiers, source }));
        }

        if self.is_binding_ident() {
            let local = self.ident_name()?;
            specifiers.push(ImportSpecifier::Default { local });
            if !self.eat_punct(",") {
                return self.finish_import(specifiers);
            }
        }

        if self.eat_punct("*") {
            self.expect_word("as")?;
            let local = self.binding_ident()?;
            specifiers.push(ImportSpecifier::Namespace { local });
        } else if self.eat_punct("{") {
            while !self.eat_punct("}") {
                let imported = self.module_export_name()?;
                let local = if self.eat_word("as") {
                    self.binding_ident()?
                } else {
                    imported.clone()
                };
                specifiers.push(ImportSpecifier::Named { imported, local });
                if !self.eat_punct(",") {
                    self.expect_punct("}")?;
                    break;
                }
            }
        } else {
            return Err(self.unexpected("expected import specifiers"));
        }
        self.finish_import(specifiers)
    }

    fn finish_import(&mut self, specifiers: Vec<ImportSpecifier>) -> PResult<Stmt> {
        self.expect_word("from")?;
        let source = self.parse_module_source()?;
        self.skip_import_attributes()?;
        self.consume_semicolon()?;
        Ok(Stmt::Import(ImportDecl { specifiers, source }))
    }

    fn parse_export(&mut self) -> PResult<Stmt> {
        self.expect_word("export")?;

        if self.eat_word("default") {
            let default = if self.is_word("function") {
                DefaultExport::Function(self.parse_function(false, false)?)
            } else if self.is_async_function() {
                self.advance();
                DefaultExport::Function(self.parse_function(true, false)?)
            } else if self.is_word("class") {
                DefaultExport::Class(self.parse_class(false)?)
            } else {
                let expr = self.parse_assignment()?;
                self.consume_semicolon()?;
                DefaultExport::Expr(expr)
            };
            return Ok(Stmt::Export(ExportDecl::Default(default)));
        }

        if self.eat_punct("*") {
            let exported = if self.eat_word("as") {
                Some(self.module_export_name()?)
            } else {
                None
            };
            self.expect_word("from")?;
            let source = self.parse_module_source()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            return Ok(Stmt::Export(ExportDecl::All { exported, source }));
        }

        if self.eat_punct("{") {
            let mut specifiers = Vec::new();
            while !self.eat_punct("}") {
                let local = self.module_export_name()?;
                let exported = if self.eat_word("as") {
                    self.module_export_name()?
                } else {
                    local.clone()
                };
                specifiers.push(ExportSpecifier { local, exported });
                if !self.eat_punct(",") {
                    self.expect_punct("}")?;
                    break;
                }
            }
            let source = if self.eat_word("from") {
                let source = self.parse_module_source()?;
                self.skip_import_attributes()?;
                Some(source)
            } else {
                None
            };
            self.consume_semicolon()?;
            return Ok(Stmt::Export(ExportDecl::Named { specifiers, source }));
        }

        let decl = self.parse_statement_list_item()?;
        match decl {
            Stmt::Var(_) | Stmt::Function(_) | Stmt::Class(_) => {
                Ok(Stmt::Export(ExportDecl::Decl(Box::new(decl))))
            }
            _ => Err(SyntaxError::new(
                "expected declaration after `export`",
                self.prev_span(),
            )),
        }
    }

    // ── functions and classes ────────────────────────────────────────

    /// `function [*] name? (params) { body }`; `async` already consumed.
    fn parse_function(&mut self, is_async: bool, require_name: bool) -> PResult<Rc<Function>> {
        self.expect_word("function")?;
        let is_generator = self.eat_punct("*");
        let name = if self.is_binding_ident() {
            Some(self.ident_name()?)
        } else if require_name {
            return Err(self.unexpected("expected function name"));
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = FunctionBody::Block(self.parse_block()?);
        Ok(Rc::new(Function {
            name,
            params,
            body,
            is_async,
            is_generator,
            is_arrow: false,
        }))
    }

    /// `(a, {b}, [c] = d, ...rest)`
    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect_punct("(")?;
        self.allow_in(|p| {
            let mut params = Vec::new();
            while !p.eat_punct(")") {
                let rest = p.eat_punct("...");
                let pattern = p.parse_binding_element()?;
                params.push(Param { pattern, rest });
                if !p.eat_punct(",") {
                    p.expect_punct(")")?;
                    break;
                }
            }
            Ok(params)
        })
    }

    fn parse_method(
        &mut self,
        is_async: bool,
        is_generator: bool,
        name: Option<String>,
    ) -> PResult<Rc<Function>> {
        let params = self.parse_params()?;
        let body = FunctionBody::Block(self.parse_block()?);
        Ok(Rc::new(Function {
            name,
            params,
            body,
            is_async,
            is_generator,
            is_arrow: false,
        }))
    }

    fn parse_class(&mut self, require_name: bool) -> PResult<Rc<Class>> {
        self.expect_word("class")?;
        let name = if self.is_binding_ident() && !self.is_word("extends") {
            Some(self.ident_name()?)
        } else if require_name {
            return Err(self.unexpected("expected class name"));
        } else {
            None
        };
        let super_class = if self.eat_word("extends") {
            Some(Box::new(self.parse_lhs_expression()?))
        } else {
            None
        };
        self.expect_punct("{")?;
        let members = self.allow_in(|p| {
            let mut members = Vec::new();
            while !p.eat_punct("}") {
                if p.eat_punct(";") {
                    continue;
                }
                if p.at_eof() {
                    return Err(p.unexpected("expected `}`"));
                }
                members.push(p.parse_class_member()?);
            }
            Ok(members)
        })?;
        Ok(Rc::new(Class {
            name,
            super_class,
            members,
        }))
    }

    /// True when the current word is a modifier rather than a member name,
    /// i.e. `static x` vs. a member literally called `static`.
    fn is_modifier(&self) -> bool {
        let next = self.peek_at(1);
        !matches!(&next.kind, TokenKind::Punct("(" | "=" | ";" | "}" | "," | ":"))
            && next.kind != TokenKind::Eof
    }

    fn parse_class_member(&mut self) -> PResult<ClassMember> {
        let mut is_static = false;
        if self.is_word("static") && self.is_modifier() {
            self.advance();
            if self.is_punct("{") {
                return Ok(ClassMember::StaticBlock(self.parse_block()?));
            }
            is_static = true;
        }
        let (is_async, is_generator, accessor) = self.parse_method_modifiers();
        let key = self.parse_prop_key(true)?;

        if self.is_punct("(") {
            let name = match &key {
                PropKey::Named(n) | PropKey::Private(n) => Some(n.clone()),
                PropKey::Computed(_) => None,
            };
            let kind = match accessor {
                Some(kind) => kind,
                None if !is_static && key == PropKey::Named("constructor".into()) => {
                    MethodKind::Constructor
                }
                None => MethodKind::Method,
            };
            let function = self.parse_method(is_async, is_generator, name)?;
            return Ok(ClassMember::Method {
                key,
                kind,
                is_static,
                function,
            });
        }

        if is_async || is_generator || accessor.is_some() {
            return Err(self.unexpected("expected `(`"));
        }
        let value = if self.eat_punct("=") {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        self.consume_semicolon()?;
        Ok(ClassMember::Field {
            key,
            is_static,
            value,
        })
    }

    /// `async`, `*`, `get`, `set` prefixes shared by class and object methods.
    fn parse_method_modifiers(&mut self) -> (bool, bool, Option<MethodKind>) {
        let mut is_async = false;
        let mut accessor = None;
        if self.is_word("async") && self.is_modifier() && !self.peek_at(1).newline_before {
            self.advance();
            is_async = true;
        }
        let is_generator = self.eat_punct("*");
        if !is_async && !is_generator && self.is_modifier() {
            if self.is_word("get") {
                self.advance();
                accessor = Some(MethodKind::Getter);
            } else if self.is_word("set") {
                self.advance();
                accessor = Some(MethodKind::Setter);
            }
        }
        (is_async, is_generator, accessor)
    }

    fn parse_prop_key(&mut self, allow_private: bool) -> PResult<PropKey> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Ident(name) | TokenKind::Str(name) => {
                self.advance();
                Ok(PropKey::Named(name))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(PropKey::Named(format_number_key(n)))
            }
            TokenKind::BigInt(n) => {
                self.advance();
                Ok(PropKey::Named(n))
            }
            TokenKind::PrivateName(name) if allow_private => {
                self.advance();
                Ok(PropKey::Private(name))
            }
            TokenKind::Punct("[") => {
                self.advance();
                let expr = self.allow_in(|p| p.parse_assignment())?;
                self.expect_punct("]")?;
                Ok(PropKey::Computed(Box::new(expr)))
            }
            _ => Err(self.unexpected("expected property name")),
        }
    }

    // ── patterns ─────────────────────────────────────────────────────

    fn parse_binding_target(&mut self) -> PResult<Pattern> {
        if self.is_punct("[") {
            return self.nested(Self::parse_array_pattern);
        }
        if self.is_punct("{") {
            return self.nested(Self::parse_object_pattern);
        }
        Ok(Pattern::Ident(self.binding_ident()?))
    }

    fn parse_binding_element(&mut self) -> PResult<Pattern> {
        let target = self.parse_binding_target()?;
        if self.eat_punct("=") {
            let default = self.allow_in(|p| p.parse_assignment())?;
            return Ok(Pattern::Default {
                target: Box::new(target),
                default: Box::new(default),
            });
        }
        Ok(target)
    }

    fn parse_array_pattern(&mut self) -> PResult<Pattern> {
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        let mut rest = None;
        while !self.eat_punct("]") {
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            if self.eat_punct("...") {
                rest = Some(Box::new(self.parse_binding_target()?));
                self.eat_punct(",");
                self.expect_punct("]")?;
                break;
            }
            elements.push(Some(self.parse_binding_element()?));
            if !self.eat_punct(",") {
                self.expect_punct("]")?;
                break;
            }
        }
        Ok(Pattern::Array { elements, rest })
    }

    fn parse_object_pattern(&mut self) -> PResult<Pattern> {
        self.expect_punct("{")?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                rest = Some(Box::new(Pattern::Ident(self.binding_ident()?)));
                self.eat_punct(",");
                self.expect_punct("}")?;
                break;
            }
            let key = self.parse_prop_key(false)?;
            let value = if self.eat_punct(":") {
                self.parse_binding_element()?
            } else {
                let PropKey::Named(name) = &key else {
                    return Err(self.unexpected("expected `:`"));
                };
                let target = Pattern::Ident(name.clone());
                if self.eat_punct("=") {
                    let default = self.allow_in(|p| p.parse_assignment())?;
                    Pattern::Default {
                        target: Box::new(target),
                        default: Box::new(default),
                    }
                } else {
                    target
                }
            };
            props.push(ObjectPatternProp { key, value });
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Pattern::Object { props, rest })
    }

    /// Reinterpret an already parsed expression as an assignment target.
    fn expr_to_pattern(&self, expr: Expr) -> PResult<Pattern> {
        let invalid = || SyntaxError::new("invalid assignment target", self.prev_span());
        Ok(match expr {
            Expr::Ident(name) => Pattern::Ident(name),
            member @ Expr::Member { optional: false, .. } => Pattern::Expr(Box::new(member)),
            Expr::Assign {
                op: "=",
                target,
                value,
            } => Pattern::Default {
                target,
                default: value,
            },
            Expr::Array(items) => {
                let mut elements = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        ArrayElement::Hole => elements.push(None),
                        ArrayElement::Expr(e) => elements.push(Some(self.expr_to_pattern(e)?)),
                        ArrayElement::Spread(e) if i + 1 == count => {
                            rest = Some(Box::new(self.expr_to_pattern(e)?));
                        }
                        ArrayElement::Spread(_) => return Err(invalid()),
                    }
                }
                Pattern::Array { elements, rest }
            }
            Expr::Object(items) => {
                let mut props = Vec::new();
                let mut rest = None;
                for item in items {
                    match item {
                        Prop::KeyValue { key, value } => props.push(ObjectPatternProp {
                            key,
                            value: self.expr_to_pattern(value)?,
                        }),
                        Prop::Shorthand(name) => props.push(ObjectPatternProp {
                            key: PropKey::Named(name.clone()),
                            value: Pattern::Ident(name),
                        }),
                        Prop::ShorthandDefault { name, default } => {
                            props.push(ObjectPatternProp {
                                key: PropKey::Named(name.clone()),
                                value: Pattern::Default {
                                    target: Box::new(Pattern::Ident(name)),
                                    default: Box::new(default),
                                },
                            })
                        }
                        Prop::Spread(e) => rest = Some(Box::new(self.expr_to_pattern(e)?)),
                        Prop::Method { .. } => return Err(invalid()),
                    }
                }
                Pattern::Object { props, rest }
            }
            _ => return Err(invalid()),
        })
    }

    // ── expressions ──────────────────────────────────────────────────

    fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat_punct(",") {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(exprs))
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        if self.is_word("yield") {
            self.advance();
            let delegate = self.eat_punct("*");
            let starts_operand = !self.peek().newline_before
                && !matches!(
                    &self.peek().kind,
                    TokenKind::Punct(")" | "]" | "}" | "," | ";" | ":")
                        | TokenKind::Eof
                        | TokenKind::TemplateMiddle(_)
                        | TokenKind::TemplateTail(_)
                );
            let arg = if delegate || starts_operand {
                Some(Box::new(self.parse_assignment()?))
            } else {
                None
            };
            return Ok(Expr::Yield { arg, delegate });
        }

        let left = self.parse_conditional()?;
        let op = match &self.peek().kind {
            TokenKind::Punct(p) if ASSIGN_OPS.contains(p) => *p,
            _ => return Ok(left),
        };
        self.advance();
        let target = if op == "=" {
            self.expr_to_pattern(left)?
        } else {
            match left {
                Expr::Ident(name) => Pattern::Ident(name),
                member @ Expr::Member { optional: false, .. } => Pattern::Expr(Box::new(member)),
                _ => {
                    return Err(SyntaxError::new(
                        "invalid assignment target",
                        self.prev_span(),
                    ));
                }
            }
        };
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// Recognises `x => …`, `(…) => …`, `async x => …` and `async (…) => …`,
    /// rewinding and returning `None` for anything else.
    fn try_parse_arrow(&mut self) -> PResult<Option<Expr>> {
        let start = self.pos;
        let mut is_async = false;
        if self.is_word("async")
            && !self.peek_at(1).newline_before
            && (self.is_punct_at(1, "(")
                || (matches!(&self.peek_at(1).kind, TokenKind::Ident(_))
                    && self.is_punct_at(2, "=>")))
        {
            self.advance();
            is_async = true;
        }

        let params = if self.is_binding_ident() && self.is_punct_at(1, "=>") {
            let name = self.ident_name()?;
            vec![Param {
                pattern: Pattern::Ident(name),
                rest: false,
            }]
        } else if self.is_punct("(") {
            match self.parse_params() {
                Ok(params) if self.is_punct("=>") => params,
                _ => {
                    self.pos = start;
                    return Ok(None);
                }
            }
        } else {
            self.pos = start;
            return Ok(None);
        };

        if !self.is_punct("=>") || self.peek().newline_before {
            self.pos = start;
            return Ok(None);
        }
        self.advance();

        let body = if self.is_punct("{") {
            FunctionBody::Block(self.parse_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Some(Expr::Function(Rc::new(Function {
            name: None,
            params,
            body,
            is_async,
            is_generator: false,
            is_arrow: true,
        }))))
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.allow_in(|p| p.parse_assignment())?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn current_binary_op(&self) -> Option<(&'static str, u8)> {
        let op: &'static str = match &self.peek().kind {
            TokenKind::Punct(p) => *p,
            TokenKind::Ident(w) if w == "instanceof" => "instanceof",
            TokenKind::Ident(w) if w == "in" && !self.no_in => "in",
            _ => return None,
        };
        binary_precedence(op).map(|prec| (op, prec))
    }

    /// Precedence climbing; `**` is right associative.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((op, prec)) = self.current_binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if op == "**" { prec } else { prec + 1 };
            let right = self.nested(|p| p.parse_binary(next_min))?;
            left = if matches!(op, "&&" | "||" | "??") {
                Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            } else {
                Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op: Option<&'static str> = match &self.peek().kind {
            TokenKind::Punct(p @ ("!" | "~" | "+" | "-")) => Some(*p),
            TokenKind::Ident(w) => match w.as_str() {
                "typeof" => Some("typeof"),
                "void" => Some("void"),
                "delete" => Some("delete"),
                "await" => Some("await"),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = Box::new(self.parse_unary()?);
            return Ok(if op == "await" {
                Expr::Await(arg)
            } else {
                Expr::Unary { op, arg }
            });
        }
        if let TokenKind::Punct(op @ ("++" | "--")) = self.peek().kind {
            self.advance();
            let arg = Box::new(self.parse_unary()?);
            return Ok(Expr::Update {
                op,
                prefix: true,
                arg,
            });
        }

        let expr = self.parse_lhs_expression()?;
        if let TokenKind::Punct(op @ ("++" | "--")) = self.peek().kind {
            if !self.peek().newline_before {
                self.advance();
                return Ok(Expr::Update {
                    op,
                    prefix: false,
                    arg: Box::new(expr),
                });
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Arg>> {
        self.expect_punct("(")?;
        self.allow_in(|p| {
            let mut args = Vec::new();
            while !p.eat_punct(")") {
                if p.eat_punct("...") {
                    args.push(Arg::Spread(p.parse_assignment()?));
                } else {
                    args.push(Arg::Expr(p.parse_assignment()?));
                }
                if !p.eat_punct(",") {
                    p.expect_punct(")")?;
                    break;
                }
            }
            Ok(args)
        })
    }

    fn parse_member_name(&mut self) -> PResult<MemberProp> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(MemberProp::Ident(name))
            }
            TokenKind::PrivateName(name) => {
                self.advance();
                Ok(MemberProp::Private(name))
            }
            _ => Err(self.unexpected("expected property name")),
        }
    }

    fn parse_computed_member(&mut self) -> PResult<MemberProp> {
        self.expect_punct("[")?;
        let expr = self.allow_in(|p| p.parse_expression())?;
        self.expect_punct("]")?;
        Ok(MemberProp::Computed(Box::new(expr)))
    }

    /// Member accesses, calls, optional chains and tagged templates.
    fn parse_lhs_expression(&mut self) -> PResult<Expr> {
        let mut expr = if self.is_word("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match &self.peek().kind {
                TokenKind::Punct(".") => {
                    self.advance();
                    let property = self.parse_member_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                TokenKind::Punct("?.") => {
                    self.advance();
                    if self.is_punct("(") {
                        let args = self.parse_arguments()?;
                        expr = Expr::Call {
                            callee: Box::new(expr),
                            args,
                            optional: true,
                        };
                    } else {
                        let property = if self.is_punct("[") {
                            self.parse_computed_member()?
                        } else {
                            self.parse_member_name()?
                        };
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property,
                            optional: true,
                        };
                    }
                }
                TokenKind::Punct("[") => {
                    let property = self.parse_computed_member()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                TokenKind::Punct("(") => {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: false,
                    };
                }
                TokenKind::Template(_) | TokenKind::TemplateHead(_) => {
                    let (_, exprs) = self.parse_template_parts()?;
                    expr = Expr::TaggedTemplate {
                        tag: Box::new(expr),
                        exprs,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> PResult<Expr> {
        self.expect_word("new")?;
        if self.eat_punct(".") {
            let property = self.ident_name()?;
            return Ok(Expr::MetaProperty {
                meta: "new",
                property,
            });
        }
        let mut callee = if self.is_word("new") {
            self.nested(Self::parse_new)?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let property = self.parse_member_name()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                };
            } else if self.is_punct("[") {
                let property = self.parse_computed_member()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                };
            } else {
                break;
            }
        }
        let args = if self.is_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_template(&mut self) -> PResult<Expr> {
        let (quasis, exprs) = self.parse_template_parts()?;
        Ok(Expr::Template { quasis, exprs })
    }

    /// Cooked text chunks and the substitutions between them.
    fn parse_template_parts(&mut self) -> PResult<(Vec<String>, Vec<Expr>)> {
        let tok = self.advance();
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        match tok.kind {
            TokenKind::Template(text) => quasis.push(text),
            TokenKind::TemplateHead(text) => {
                quasis.push(text);
                loop {
                    exprs.push(self.allow_in(|p| p.parse_expression())?);
                    match self.advance().kind {
                        TokenKind::TemplateMiddle(text) => quasis.push(text),
                        TokenKind::TemplateTail(text) => {
                            quasis.push(text);
                            break;
                        }
                        _ => {
                            return Err(SyntaxError::new(
                                "expected `}` in template literal",
                                self.prev_span(),
                            ));
                        }
                    }
                }
            }
            _ => return Err(SyntaxError::new("expected template literal", tok.span)),
        }
        Ok((quasis, exprs))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            TokenKind::BigInt(n) => {
                self.advance();
                Ok(Expr::BigInt(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(Expr::Regex { pattern, flags })
            }
            TokenKind::Template(_) | TokenKind::TemplateHead(_) => self.parse_template(),
            TokenKind::Punct("(") => self.parse_paren_expression(),
            TokenKind::Punct("[") => self.parse_array_literal(),
            TokenKind::Punct("{") => self.parse_object_literal(),
            TokenKind::Ident(word) => match word.as_str() {
                "this" => {
                    self.advance();
                    Ok(Expr::This)
                }
                "super" => {
                    self.advance();
                    Ok(Expr::Super)
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Null)
                }
                "true" | "false" => {
                    self.advance();
                    Ok(Expr::Bool(word == "true"))
                }
                "function" => Ok(Expr::Function(self.parse_function(false, false)?)),
                "async" if self.is_async_function() => {
                    self.advance();
                    Ok(Expr::Function(self.parse_function(true, false)?))
                }
                "class" => Ok(Expr::Class(self.parse_class(false)?)),
                "import" => {
                    self.advance();
                    if self.eat_punct(".") {
                        let property = self.ident_name()?;
                        return Ok(Expr::MetaProperty {
                            meta: "import",
                            property,
                        });
                    }
                    let mut args = self.parse_arguments()?;
                    if args.is_empty() {
                        return Err(SyntaxError::new(
                            "import() requires a specifier",
                            self.prev_span(),
                        ));
                    }
                    let specifier = match args.swap_remove(0) {
                        Arg::Expr(e) | Arg::Spread(e) => e,
                    };
                    Ok(Expr::ImportCall(Box::new(specifier)))
                }
                _ if RESERVED.contains(&word.as_str()) => {
                    Err(self.unexpected("unexpected keyword"))
                }
                _ => {
                    self.advance();
                    Ok(Expr::Ident(word))
                }
            },
            _ => Err(self.unexpected("expected expression")),
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        self.expect_punct("[")?;
        self.allow_in(|p| {
            let mut elements = Vec::new();
            while !p.eat_punct("]") {
                if p.eat_punct(",") {
                    elements.push(ArrayElement::Hole);
                    continue;
                }
                if p.eat_punct("...") {
                    elements.push(ArrayElement::Spread(p.parse_assignment()?));
                } else {
                    elements.push(ArrayElement::Expr(p.parse_assignment()?));
                }
                if !p.eat_punct(",") {
                    p.expect_punct("]")?;
                    break;
                }
            }
            Ok(Expr::Array(elements))
        })
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        self.expect_punct("{")?;
        self.allow_in(|p| {
            let mut props = Vec::new();
            while !p.eat_punct("}") {
                props.push(p.parse_object_prop()?);
                if !p.eat_punct(",") {
                    p.expect_punct("}")?;
                    break;
                }
            }
            Ok(Expr::Object(props))
        })
    }

    fn parse_object_prop(&mut self) -> PResult<Prop> {
        if self.eat_punct("...") {
            return Ok(Prop::Spread(self.parse_assignment()?));
        }
        let (is_async, is_generator, accessor) = self.parse_method_modifiers();
        let is_plain_ident = matches!(self.peek().kind, TokenKind::Ident(_));
        let key = self.parse_prop_key(false)?;

        if self.is_punct("(") {
            let name = match &key {
                PropKey::Named(n) => Some(n.clone()),
                _ => None,
            };
            let function = self.parse_method(is_async, is_generator, name)?;
            return Ok(Prop::Method {
                key,
                kind: accessor.unwrap_or(MethodKind::Method),
                function,
            });
        }
        if is_async || is_generator || accessor.is_some() {
            return Err(self.unexpected("expected `(`"));
        }
        if self.eat_punct(":") {
            let value = self.parse_assignment()?;
            return Ok(Prop::KeyValue { key, value });
        }
        match key {
            PropKey::Named(name) if is_plain_ident => {
                if self.eat_punct("=") {
                    let default = self.parse_assignment()?;
                    Ok(Prop::ShorthandDefault { name, default })
                } else {
                    Ok(Prop::Shorthand(name))
                }
            }
            _ => Err(self.unexpected("expected `:`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        match parse_module(src) {
            Ok(p) => p,
            Err(e) => panic!("failed to parse {src:?}: {e}"),
        }
    }

    fn single_expr(src: &str) -> Expr {
        match parse(src).body.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn test_parse_imports() {
        let program = parse(
            r#"import def, { a, b as c } from "./lib.js";
               import * as ns from 'other.js'
               import "side-effect.js";"#,
        );
        assert_eq!(program.body.len(), 3);
        let Stmt::Import(first) = &program.body[0] else {
            panic!("expected import");
        };
        assert_eq!(
            first.specifiers,
            vec![
                ImportSpecifier::Default {
                    local: "def".into()
                },
                ImportSpecifier::Named {
                    imported: "a".into(),
                    local: "a".into()
                },
                ImportSpecifier::Named {
                    imported: "b".into(),
                    local: "c".into()
                },
            ]
        );
        assert_eq!(first.source.value, "./lib.js");
        assert_eq!(first.source.span, Span::new(31, 41));
        let sources: Vec<_> = program
            .module_sources()
            .into_iter()
            .map(|s| s.value.as_str())
            .collect();
        assert_eq!(sources, vec!["./lib.js", "other.js", "side-effect.js"]);
    }

    #[test]
    fn test_parse_exports() {
        let program = parse(
            "export async function main(ns) {}\n\
             export const a = 1, b = 2;\n\
             export { a as x, b };\n\
             export { y } from './y.js';\n\
             export * from './all.js';\n\
             export * as spaced from './ns.js';\n\
             export default class {}",
        );
        assert_eq!(program.body.len(), 7);
        assert!(matches!(
            &program.body[0],
            Stmt::Export(ExportDecl::Decl(decl)) if matches!(decl.as_ref(), Stmt::Function(f) if f.is_async)
        ));
        assert_eq!(program.module_sources().len(), 3);
        assert!(matches!(
            &program.body[6],
            Stmt::Export(ExportDecl::Default(DefaultExport::Class(_)))
        ));
    }

    #[test]
    fn test_parse_member_calls() {
        let test_cases = vec![
            (
                "ns.hack(target);",
                Expr::Call {
                    callee: Box::new(Expr::Member {
                        object: ident("ns"),
                        property: MemberProp::Ident("hack".into()),
                        optional: false,
                    }),
                    args: vec![Arg::Expr(Expr::Ident("target".into()))],
                    optional: false,
                },
            ),
            (
                "this.#ns?.grow",
                Expr::Member {
                    object: Box::new(Expr::Member {
                        object: Box::new(Expr::This),
                        property: MemberProp::Private("ns".into()),
                        optional: false,
                    }),
                    property: MemberProp::Ident("grow".into()),
                    optional: true,
                },
            ),
            (
                "ns['weaken']",
                Expr::Member {
                    object: ident("ns"),
                    property: MemberProp::Computed(Box::new(Expr::Str("weaken".into()))),
                    optional: false,
                },
            ),
        ];

        for (input, expected) in test_cases {
            assert_eq!(single_expr(input), expected, "source: {input}");
        }
    }

    #[test]
    fn test_parse_precedence() {
        let expr = single_expr("a + b * c ** d ** e");
        let Expr::Binary { op: "+", right, .. } = expr else {
            panic!("expected + at the root");
        };
        let Expr::Binary { op: "*", right, .. } = *right else {
            panic!("expected * below +");
        };
        let Expr::Binary {
            op: "**", right, ..
        } = *right
        else {
            panic!("expected ** below *");
        };
        assert!(matches!(*right, Expr::Binary { op: "**", .. }));
    }

    #[test]
    fn test_parse_arrows() {
        for src in [
            "const f = x => x + 1;",
            "const f = async (a, {b}, [c] = [], ...d) => { await a; };",
            "const f = async x => x;",
            "list.forEach((item) => ns.print(item));",
            "const g = () => ({ value: 1 });",
        ] {
            parse(src);
        }
        let expr = single_expr("(a, b)");
        assert!(matches!(expr, Expr::Sequence(items) if items.len() == 2));
        let expr = single_expr("async(a)");
        assert!(matches!(expr, Expr::Call { .. }));
    }

    #[test]
    fn test_parse_destructuring_assignment() {
        let expr = single_expr("[this.#ns, { b = 2 }] = pair;");
        let Expr::Assign { target, .. } = expr else {
            panic!("expected assignment");
        };
        let Pattern::Array { elements, rest } = *target else {
            panic!("expected array pattern");
        };
        assert!(rest.is_none());
        assert!(matches!(elements[0], Some(Pattern::Expr(_))));
        assert!(matches!(elements[1], Some(Pattern::Object { .. })));
    }

    #[test]
    fn test_parse_class_members() {
        let program = parse(
            r#"class Runner extends Base {
                #ns;
                static count = 0;
                static { Runner.count = 1; }
                constructor(ns) { super(); this.#ns = ns; }
                get ns() { return this.#ns; }
                async *gen() {}
                static async run(ns) { return new Runner(ns); }
                ['computed']() {}
            }"#,
        );
        let Stmt::Class(class) = &program.body[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name.as_deref(), Some("Runner"));
        assert!(class.super_class.is_some());
        assert_eq!(class.members.len(), 8);
        assert!(class.constructor().is_some());
        assert!(class.method(&PropName::Public("run".into()), true).is_some());
        assert!(class.method(&PropName::Public("run".into()), false).is_none());
        assert!(class.method(&PropName::Public("computed".into()), false).is_some());
    }

    #[test]
    fn test_parse_statements() {
        let program = parse(
            r#"
            outer: for (let i = 0; i < 10; i++) {
                for (const key in obj) { continue outer; }
                for await (const x of gen()) break;
            }
            while (true) { if (a) break; else b(); }
            do { x-- } while (x > 0)
            try { risky() } catch { } finally { done() }
            try { risky() } catch ({ message }) { log(message) }
            switch (v) { case 1: a(); break; default: b() }
            label: { }
            const re = /ab+c/i, t = `x${1 + 2}y`, tagged = tag`a${b}`;
            "#,
        );
        assert_eq!(program.body.len(), 8);
    }

    #[test]
    fn test_asi() {
        let program = parse("let a = 1\nlet b = a\n++b\nreturn_value()\n");
        assert_eq!(program.body.len(), 4);
        let program = parse("function f() { return\n42 }");
        let Stmt::Function(f) = &program.body[0] else {
            panic!("expected function");
        };
        let FunctionBody::Block(body) = &f.body else {
            panic!("expected block body");
        };
        assert_eq!(body.len(), 2);
        assert_eq!(body[0], Stmt::Return(None));
    }

    #[test]
    fn test_for_in_head_excludes_in_operator() {
        let program = parse("for (const k in obj) {}\nfor (x of [1, 2]) {}");
        assert!(matches!(
            &program.body[0],
            Stmt::ForEach {
                kind: ForEachKind::In,
                ..
            }
        ));
        assert!(matches!(
            &program.body[1],
            Stmt::ForEach {
                kind: ForEachKind::Of,
                left: ForHead::Pattern(Pattern::Ident(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_syntax_errors_have_locations() {
        let test_cases = vec![
            ("export async function main(ns) {\n  ns.hack(\n}", 3, 1),
            ("let 1 = 2;", 1, 5),
            ("const x = {a b};", 1, 14),
            ("with (a) {}", 1, 1),
        ];
        for (src, line, column) in test_cases {
            let err = parse_module(src).unwrap_err();
            assert_eq!((err.line, err.column), (line, column), "source: {src}: {err}");
        }
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let nested = |open: &str, close: &str, depth: usize| {
            format!("const x = {}1{};", open.repeat(depth), close.repeat(depth))
        };
        assert!(parse_module(&nested("(", ")", 40)).is_ok());
        assert!(parse_module(&nested("[", "]", 40)).is_ok());

        let test_cases = vec![
            nested("(", ")", 150),
            nested("(", ")", 5000),
            nested("[", "]", 300),
            nested("!", "", 300),
            format!("const x = 2{};", " ** 2".repeat(300)),
            format!("{}{}", "{".repeat(300), "}".repeat(300)),
            format!("let {}a{} = y;", "[".repeat(300), "]".repeat(300)),
        ];
        for src in test_cases {
            let err = parse_module(&src).unwrap_err();
            assert_eq!(err.message, "nesting too deep");
        }
    }
}
