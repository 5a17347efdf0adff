//! Hand-written lexer for the script dialect (modern JavaScript modules).
//!
//! Keywords are *not* recognised here: `function`, `import`, `class`, …
//! all come out as `Ident`. The parser decides what they mean from
//! context, which keeps contextual words (`of`, `as`, `from`, `async`,
//! `get`, `set`, `static`) simple.
//
//  Lexical items (informal):
//
//      Ident     ::= [A-Za-z_$][A-Za-z0-9_$]*        (plus non-ASCII letters)
//      Private   ::= '#' Ident
//      Number    ::= decimal | 0x.. | 0o.. | 0b..    ('_' separators, 'n' suffix)
//      Str       ::= '"' .. '"' | '\'' .. '\''
//      Template  ::= '`' .. ( '${' expr '}' .. )* '`'
//      Regex     ::= '/' .. '/' flags                (only where an operand may start)
//      Punct     ::= longest match from PUNCTUATORS
//
//  Whitespace and comments are discarded; a line break inside either is
//  remembered on the next token for automatic semicolon insertion.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::SyntaxError;

/// Byte range inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn range(self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    PrivateName(String),
    Number(f64),
    BigInt(String),
    /// Cooked string value; the raw text is recoverable from the span.
    Str(String),
    /// `` `abc` `` with no substitutions.
    Template(String),
    /// `` `abc${ ``
    TemplateHead(String),
    /// `` }abc${ ``
    TemplateMiddle(String),
    /// `` }abc` ``
    TemplateTail(String),
    Regex {
        pattern: String,
        flags: String,
    },
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

/// Longest punctuators first so a linear scan yields the longest match.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@",
];

/// Words after which a `/` starts a regular expression rather than a division.
const REGEX_PREFIX_WORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

#[derive(Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    finished: bool,
    /// Kind of the last emitted token, used to disambiguate `/`.
    last: Option<TokenKind>,
    brace_depth: usize,
    /// Brace depth at each open `${` of an enclosing template literal.
    template_stack: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            finished: false,
            last: None,
            brace_depth: 0,
            template_stack: Vec::new(),
        }
    }

    /// Lex the whole input; the final token is always `Eof`.
    pub fn tokenize(self) -> Result<Vec<Token>, SyntaxError> {
        self.collect()
    }

    fn next_char(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn pos(&mut self) -> usize {
        self.chars.peek().map(|&(i, _)| i).unwrap_or(self.src.len())
    }

    fn rest(&mut self) -> &'a str {
        let pos = self.pos();
        &self.src[pos..]
    }

    fn consume_while<F: Fn(char) -> bool>(&mut self, pred: F, buf: &mut String) {
        while let Some(c) = self.peek_char() {
            if pred(c) {
                buf.push(c);
                self.next_char();
            } else {
                break;
            }
        }
    }

    /// Skip whitespace and comments; returns whether a line break was seen.
    fn skip_trivia(&mut self) -> Result<bool, SyntaxError> {
        let mut newline = false;
        if self.pos() == 0 && self.rest().starts_with("#!") {
            while let Some(c) = self.peek_char() {
                if c == '\n' {
                    break;
                }
                self.next_char();
            }
        }
        loop {
            match self.peek_char() {
                Some('\n') | Some('\u{2028}') | Some('\u{2029}') => {
                    newline = true;
                    self.next_char();
                }
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.next_char();
                }
                Some('/') if self.rest().starts_with("//") => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.next_char();
                    }
                }
                Some('/') if self.rest().starts_with("/*") => {
                    let start = self.pos();
                    self.next_char();
                    self.next_char();
                    let mut closed = false;
                    while let Some(c) = self.next_char() {
                        if c == '\n' {
                            newline = true;
                        }
                        if c == '*' && self.peek_char() == Some('/') {
                            self.next_char();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(SyntaxError::new(
                            "unterminated comment",
                            Span::new(start, self.pos()),
                        ));
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        match &self.last {
            None => true,
            Some(TokenKind::Punct(p)) => !matches!(*p, ")" | "]" | "}"),
            Some(TokenKind::Ident(word)) => REGEX_PREFIX_WORDS.contains(&word.as_str()),
            Some(TokenKind::TemplateHead(_)) | Some(TokenKind::TemplateMiddle(_)) => true,
            Some(_) => false,
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut id = String::new();
        id.push(first);
        self.consume_while(is_ident_part, &mut id);
        id
    }

    fn read_number(&mut self, first: char, start: usize) -> Result<TokenKind, SyntaxError> {
        let mut raw = String::new();
        raw.push(first);
        let radix = match (first, self.peek_char()) {
            ('0', Some('x' | 'X')) => 16,
            ('0', Some('o' | 'O')) => 8,
            ('0', Some('b' | 'B')) => 2,
            _ => 10,
        };
        if radix != 10 {
            self.next_char();
            let mut digits = String::new();
            self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_', &mut digits);
            let digits: String = digits.chars().filter(|&c| c != '_').collect();
            if let Some(big) = digits.strip_suffix('n') {
                return Ok(TokenKind::BigInt(format!("{raw}{big}")));
            }
            return u64::from_str_radix(&digits, radix)
                .map(|v| TokenKind::Number(v as f64))
                .map_err(|_| {
                    SyntaxError::new(
                        format!("invalid number literal `0{digits}`"),
                        Span::new(start, self.pos()),
                    )
                });
        }

        self.consume_while(|c| c.is_ascii_digit() || c == '_', &mut raw);
        if self.peek_char() == Some('n') {
            self.next_char();
            return Ok(TokenKind::BigInt(raw.replace('_', "")));
        }
        if first != '.' && self.peek_char() == Some('.') {
            raw.push('.');
            self.next_char();
            self.consume_while(|c| c.is_ascii_digit() || c == '_', &mut raw);
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let next = lookahead.next().map(|(_, c)| c);
            let exponent_follows = match next {
                Some('+' | '-') => lookahead.next().is_some_and(|(_, c)| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                raw.push('e');
                self.next_char();
                if let Some(sign @ ('+' | '-')) = self.peek_char() {
                    raw.push(sign);
                    self.next_char();
                }
                self.consume_while(|c| c.is_ascii_digit(), &mut raw);
            }
        }
        let cleaned = raw.replace('_', "");
        cleaned.parse::<f64>().map(TokenKind::Number).map_err(|_| {
            SyntaxError::new(
                format!("invalid number literal `{raw}`"),
                Span::new(start, self.pos()),
            )
        })
    }

    fn read_escape(&mut self, buf: &mut String, start: usize) -> Result<(), SyntaxError> {
        let bad = |lexer: &mut Self| {
            SyntaxError::new("invalid escape sequence", Span::new(start, lexer.pos()))
        };
        let Some(c) = self.next_char() else {
            return Err(bad(self));
        };
        match c {
            'n' => buf.push('\n'),
            't' => buf.push('\t'),
            'r' => buf.push('\r'),
            'b' => buf.push('\u{8}'),
            'f' => buf.push('\u{c}'),
            'v' => buf.push('\u{b}'),
            '0' if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) => buf.push('\0'),
            '\r' => {
                if self.peek_char() == Some('\n') {
                    self.next_char();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            'x' => {
                let mut hex = String::new();
                for _ in 0..2 {
                    match self.next_char() {
                        Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                        _ => return Err(bad(self)),
                    }
                }
                let code = u32::from_str_radix(&hex, 16).map_err(|_| bad(self))?;
                buf.push(char::from_u32(code).ok_or_else(|| bad(self))?);
            }
            'u' => {
                let mut hex = String::new();
                if self.peek_char() == Some('{') {
                    self.next_char();
                    loop {
                        match self.next_char() {
                            Some('}') => break,
                            Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                            _ => return Err(bad(self)),
                        }
                    }
                } else {
                    for _ in 0..4 {
                        match self.next_char() {
                            Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                            _ => return Err(bad(self)),
                        }
                    }
                }
                let code = u32::from_str_radix(&hex, 16).map_err(|_| bad(self))?;
                // Lone surrogates cannot live in a Rust string.
                buf.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            other => buf.push(other),
        }
        Ok(())
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<String, SyntaxError> {
        let mut txt = String::new();
        while let Some(c) = self.next_char() {
            match c {
                c if c == quote => return Ok(txt),
                '\\' => self.read_escape(&mut txt, start)?,
                '\n' => break,
                c => txt.push(c),
            }
        }
        Err(SyntaxError::new(
            "unterminated string literal",
            Span::new(start, self.pos()),
        ))
    }

    /// Reads template characters after '`' or '}' up to '`' or '${'.
    /// Returns the cooked text and whether the literal ended.
    fn read_template_chunk(&mut self, start: usize) -> Result<(String, bool), SyntaxError> {
        let mut txt = String::new();
        while let Some(c) = self.next_char() {
            match c {
                '`' => return Ok((txt, true)),
                '$' if self.peek_char() == Some('{') => {
                    self.next_char();
                    return Ok((txt, false));
                }
                '\\' => self.read_escape(&mut txt, start)?,
                c => txt.push(c),
            }
        }
        Err(SyntaxError::new(
            "unterminated template literal",
            Span::new(start, self.pos()),
        ))
    }

    fn read_regex(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.next_char() {
                None | Some('\n') => {
                    return Err(SyntaxError::new(
                        "unterminated regular expression",
                        Span::new(start, self.pos()),
                    ));
                }
                Some('\\') => {
                    pattern.push('\\');
                    if let Some(c) = self.next_char() {
                        pattern.push(c);
                    }
                }
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('/') if !in_class => break,
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        self.consume_while(is_ident_part, &mut flags);
        Ok(TokenKind::Regex { pattern, flags })
    }

    fn read_punct(&mut self, start: usize) -> Result<&'static str, SyntaxError> {
        let rest = &self.src[start..];
        let punct = PUNCTUATORS
            .iter()
            .copied()
            // `?.` followed by a digit is a conditional, not optional chaining.
            .find(|p| {
                rest.starts_with(p)
                    && !(*p == "?." && rest[2..].starts_with(|c: char| c.is_ascii_digit()))
            })
            .ok_or_else(|| {
                let c = rest.chars().next().unwrap_or('\0');
                SyntaxError::new(
                    format!("unexpected character `{c}`"),
                    Span::new(start, start + c.len_utf8()),
                )
            })?;
        for _ in 0..punct.chars().count() {
            self.next_char();
        }
        Ok(punct)
    }

    fn lex_token(&mut self) -> Result<Token, SyntaxError> {
        let newline_before = self.skip_trivia()?;
        let start = self.pos();
        let Some(ch) = self.peek_char() else {
            if !self.template_stack.is_empty() {
                return Err(SyntaxError::new(
                    "unterminated template literal",
                    Span::new(start, start),
                ));
            }
            self.finished = true;
            return Ok(Token {
                kind: TokenKind::Eof,
                span: Span::new(start, start),
                newline_before,
            });
        };

        let kind = match ch {
            '"' | '\'' => {
                self.next_char();
                TokenKind::Str(self.read_string(ch, start)?)
            }
            '`' => {
                self.next_char();
                let (txt, ended) = self.read_template_chunk(start)?;
                if ended {
                    TokenKind::Template(txt)
                } else {
                    self.template_stack.push(self.brace_depth);
                    TokenKind::TemplateHead(txt)
                }
            }
            '}' if self.template_stack.last() == Some(&self.brace_depth) => {
                self.next_char();
                let (txt, ended) = self.read_template_chunk(start)?;
                if ended {
                    self.template_stack.pop();
                    TokenKind::TemplateTail(txt)
                } else {
                    TokenKind::TemplateMiddle(txt)
                }
            }
            '#' => {
                self.next_char();
                match self.peek_char() {
                    Some(c) if is_ident_start(c) => {
                        self.next_char();
                        TokenKind::PrivateName(self.read_identifier(c))
                    }
                    _ => {
                        return Err(SyntaxError::new(
                            "unexpected character `#`",
                            Span::new(start, start + 1),
                        ));
                    }
                }
            }
            c if c.is_ascii_digit() => {
                self.next_char();
                self.read_number(c, start)?
            }
            '.' if self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) => {
                self.next_char();
                self.read_number('.', start)?
            }
            '/' if self.regex_allowed() => {
                self.next_char();
                self.read_regex(start)?
            }
            c if is_ident_start(c) => {
                self.next_char();
                TokenKind::Ident(self.read_identifier(c))
            }
            _ => {
                let punct = self.read_punct(start)?;
                match punct {
                    "{" => self.brace_depth += 1,
                    "}" => self.brace_depth = self.brace_depth.saturating_sub(1),
                    _ => {}
                }
                TokenKind::Punct(punct)
            }
        };

        let end = self.pos();
        self.last = Some(kind.clone());
        Ok(Token {
            kind,
            span: Span::new(start, end),
            newline_before,
        })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || (!c.is_ascii() && c.is_alphabetic())
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        || c == '$'
        || (!c.is_ascii() && c.is_alphanumeric())
        || c == '\u{200c}'
        || c == '\u{200d}'
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tok = self.lex_token();
        if tok.is_err() {
            self.finished = true;
        }
        Some(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::{Lexer, TokenKind};

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.into())
    }

    #[test]
    fn test_tokenisation() {
        let test_cases = vec![
            (
                "ns.hack(\"n00dles\");",
                vec![
                    ident("ns"),
                    TokenKind::Punct("."),
                    ident("hack"),
                    TokenKind::Punct("("),
                    TokenKind::Str("n00dles".into()),
                    TokenKind::Punct(")"),
                    TokenKind::Punct(";"),
                    TokenKind::Eof,
                ],
            ),
            (
                "a >>>= 0x1F ?? .5",
                vec![
                    ident("a"),
                    TokenKind::Punct(">>>="),
                    TokenKind::Number(31.0),
                    TokenKind::Punct("??"),
                    TokenKind::Number(0.5),
                    TokenKind::Eof,
                ],
            ),
            (
                "this.#ns = 1_000n",
                vec![
                    ident("this"),
                    TokenKind::Punct("."),
                    TokenKind::PrivateName("ns".into()),
                    TokenKind::Punct("="),
                    TokenKind::BigInt("1000".into()),
                    TokenKind::Eof,
                ],
            ),
        ];

        for (src, expected) in test_cases {
            assert_eq!(kinds(src), expected, "source: {src}");
        }
    }

    #[test]
    fn test_regex_versus_division() {
        assert_eq!(
            kinds("a / b / c"),
            vec![
                ident("a"),
                TokenKind::Punct("/"),
                ident("b"),
                TokenKind::Punct("/"),
                ident("c"),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("x = /a[/]b/gi"),
            vec![
                ident("x"),
                TokenKind::Punct("="),
                TokenKind::Regex {
                    pattern: "a[/]b".into(),
                    flags: "gi".into()
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_nested_template_tokens() {
        assert_eq!(
            kinds("`a${ {b: `c${d}`}.b }e`"),
            vec![
                TokenKind::TemplateHead("a".into()),
                TokenKind::Punct("{"),
                ident("b"),
                TokenKind::Punct(":"),
                TokenKind::TemplateHead("c".into()),
                ident("d"),
                TokenKind::TemplateTail("".into()),
                TokenKind::Punct("}"),
                TokenKind::Punct("."),
                ident("b"),
                TokenKind::TemplateTail("e".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = Lexer::new("a // one\n/* two\n */ b").tokenize().unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].span.start, 20);
    }

    #[test]
    fn test_string_escapes_and_spans() {
        let tokens = Lexer::new(r#"import x from './lib\x2ejs';"#).tokenize().unwrap();
        assert_eq!(tokens[3].kind, TokenKind::Str("./lib.js".into()));
        assert_eq!((tokens[3].span.start, tokens[3].span.end), (14, 27));
    }

    #[test]
    fn test_errors() {
        for src in ["'open", "a = `x${y", "/* never", "a ¤ b"] {
            assert!(Lexer::new(src).tokenize().is_err(), "source: {src}");
        }
    }
}
