//! Lexer for JavaScript source code
//!
//! Converts source text into a stream of tokens.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::value::JsString;

/// Source span information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

/// Token types
///
/// Contextual words (`of`, `get`, `set`, `async`, `static`, `from`, `as`)
/// are plain identifiers; the parser recognizes them by name.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(JsString),
    True,
    False,
    Null,

    Identifier(JsString),

    // Keywords
    Let,
    Const,
    Var,
    Function,
    Return,
    If,
    Else,
    For,
    While,
    Do,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    Try,
    Catch,
    Finally,
    Throw,
    New,
    This,
    Super,
    Class,
    Extends,
    Import,
    Export,
    Typeof,
    Instanceof,
    In,
    Void,
    Delete,
    Yield,
    Await,
    With,
    Debugger,

    // Operators
    Plus,             // +
    Minus,            // -
    Star,             // *
    Slash,            // /
    Percent,          // %
    StarStar,         // **
    PlusPlus,         // ++
    MinusMinus,       // --
    Eq,               // =
    EqEq,             // ==
    EqEqEq,           // ===
    BangEq,           // !=
    BangEqEq,         // !==
    Lt,               // <
    LtEq,             // <=
    Gt,               // >
    GtEq,             // >=
    LtLt,             // <<
    GtGt,             // >>
    GtGtGt,           // >>>
    Amp,              // &
    AmpAmp,           // &&
    Pipe,             // |
    PipePipe,         // ||
    Caret,            // ^
    Tilde,            // ~
    Bang,             // !
    Question,         // ?
    QuestionQuestion, // ??
    QuestionDot,      // ?.

    // Assignment operators
    PlusEq,             // +=
    MinusEq,            // -=
    StarEq,             // *=
    SlashEq,            // /=
    PercentEq,          // %=
    StarStarEq,         // **=
    AmpEq,              // &=
    PipeEq,             // |=
    CaretEq,            // ^=
    LtLtEq,             // <<=
    GtGtEq,             // >>=
    GtGtGtEq,           // >>>=
    AmpAmpEq,           // &&=
    PipePipeEq,         // ||=
    QuestionQuestionEq, // ??=

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Dot,       // .
    DotDotDot, // ...
    Comma,     // ,
    Colon,     // :
    Semicolon, // ;
    Arrow,     // =>

    // Template literals
    TemplateHead(JsString),   // `...${
    TemplateMiddle(JsString), // }...${
    TemplateTail(JsString),   // }...`
    TemplateNoSub(JsString),  // `...`

    Eof,
    Invalid(char),
}

/// A token with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator precedes this token (drives ASI and restricted productions)
    pub newline_before: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, newline_before: bool) -> Self {
        Self {
            kind,
            span,
            newline_before,
        }
    }

    pub fn eof(pos: usize, line: u32, column: u32) -> Self {
        Self {
            kind: TokenKind::Eof,
            span: Span::new(pos, pos, line, column),
            newline_before: true,
        }
    }
}

/// Lexer state checkpoint for one-token lookahead
#[derive(Clone)]
pub struct LexerCheckpoint {
    current_pos: usize,
    line: u32,
    column: u32,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    /// Offset of `chars` within `source` after a reset
    chars_base_offset: usize,
    current_pos: usize,
    line: u32,
    column: u32,
    start_pos: usize,
    start_line: u32,
    start_column: u32,
    saw_newline: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            chars_base_offset: 0,
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            saw_newline: false,
        }
    }

    pub fn checkpoint(&self) -> LexerCheckpoint {
        LexerCheckpoint {
            current_pos: self.current_pos,
            line: self.line,
            column: self.column,
        }
    }

    pub fn restore(&mut self, checkpoint: LexerCheckpoint) {
        self.reset_to(checkpoint.current_pos, checkpoint.line, checkpoint.column);
    }

    fn reset_to(&mut self, pos: usize, line: u32, column: u32) {
        self.current_pos = pos;
        self.line = line;
        self.column = column;
        self.chars_base_offset = pos;
        self.chars = self
            .source
            .get(pos..)
            .unwrap_or("")
            .char_indices()
            .peekable();
    }

    /// Get the next token from the source
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
        let newline_before = self.saw_newline;

        let Some((_, ch)) = self.advance() else {
            return Token::eof(self.current_pos, self.line, self.column);
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,

            '.' => self.scan_dot(),
            '+' => self.scan_compound('+', TokenKind::Plus, TokenKind::PlusPlus, TokenKind::PlusEq),
            '-' => self.scan_compound(
                '-',
                TokenKind::Minus,
                TokenKind::MinusMinus,
                TokenKind::MinusEq,
            ),
            '*' => self.scan_star(),
            '/' => self.scan_with_eq(TokenKind::Slash, TokenKind::SlashEq),
            '%' => self.scan_with_eq(TokenKind::Percent, TokenKind::PercentEq),
            '^' => self.scan_with_eq(TokenKind::Caret, TokenKind::CaretEq),
            '=' => self.scan_equals(),
            '!' => self.scan_bang(),
            '<' => self.scan_less_than(),
            '>' => self.scan_greater_than(),
            '&' => self.scan_logical('&', TokenKind::Amp, TokenKind::AmpEq, TokenKind::AmpAmp, TokenKind::AmpAmpEq),
            '|' => self.scan_logical(
                '|',
                TokenKind::Pipe,
                TokenKind::PipeEq,
                TokenKind::PipePipe,
                TokenKind::PipePipeEq,
            ),
            '?' => self.scan_question(),

            '"' | '\'' => self.scan_string(ch),
            '`' => self.scan_template(true),
            '0'..='9' => self.scan_number(ch),
            c if is_id_start(c) => self.scan_identifier(c),
            c => TokenKind::Invalid(c),
        };

        Token::new(kind, self.make_span(), newline_before)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = self.chars_base_offset + pos + ch.len_utf8();
            if is_line_terminator(ch) {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source.get(self.current_pos..)?.chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn make_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn skip_whitespace_and_comments(&mut self) {
        self.saw_newline = false;

        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\u{000B}' | '\u{000C}' | '\u{00A0}' | '\u{FEFF}') => {
                    self.advance();
                }
                Some(c) if is_line_terminator(c) => {
                    self.saw_newline = true;
                    self.advance();
                }
                Some('/') => match self.peek_next() {
                    Some('/') => {
                        while let Some(ch) = self.peek() {
                            if is_line_terminator(ch) {
                                break;
                            }
                            self.advance();
                        }
                    }
                    Some('*') => {
                        self.advance();
                        self.advance();
                        loop {
                            match self.advance() {
                                Some((_, '*')) if self.peek() == Some('/') => {
                                    self.advance();
                                    break;
                                }
                                Some((_, c)) if is_line_terminator(c) => self.saw_newline = true,
                                Some(_) => {}
                                None => break,
                            }
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
        }
    }

    fn scan_dot(&mut self) -> TokenKind {
        if self.peek() == Some('.') && self.peek_next() == Some('.') {
            self.advance();
            self.advance();
            TokenKind::DotDotDot
        } else if matches!(self.peek(), Some('0'..='9')) {
            self.scan_number('.')
        } else {
            TokenKind::Dot
        }
    }

    /// `+`, `++`, `+=` and the `-` family
    fn scan_compound(
        &mut self,
        ch: char,
        single: TokenKind,
        double: TokenKind,
        assign: TokenKind,
    ) -> TokenKind {
        if self.match_char(ch) {
            double
        } else if self.match_char('=') {
            assign
        } else {
            single
        }
    }

    fn scan_with_eq(&mut self, plain: TokenKind, assign: TokenKind) -> TokenKind {
        if self.match_char('=') { assign } else { plain }
    }

    /// `&`, `&=`, `&&`, `&&=` and the `|` family
    fn scan_logical(
        &mut self,
        ch: char,
        single: TokenKind,
        single_eq: TokenKind,
        double: TokenKind,
        double_eq: TokenKind,
    ) -> TokenKind {
        if self.match_char(ch) {
            if self.match_char('=') { double_eq } else { double }
        } else if self.match_char('=') {
            single_eq
        } else {
            single
        }
    }

    fn scan_star(&mut self) -> TokenKind {
        if self.match_char('*') {
            if self.match_char('=') {
                TokenKind::StarStarEq
            } else {
                TokenKind::StarStar
            }
        } else if self.match_char('=') {
            TokenKind::StarEq
        } else {
            TokenKind::Star
        }
    }

    fn scan_equals(&mut self) -> TokenKind {
        if self.match_char('=') {
            if self.match_char('=') {
                TokenKind::EqEqEq
            } else {
                TokenKind::EqEq
            }
        } else if self.match_char('>') {
            TokenKind::Arrow
        } else {
            TokenKind::Eq
        }
    }

    fn scan_bang(&mut self) -> TokenKind {
        if self.match_char('=') {
            if self.match_char('=') {
                TokenKind::BangEqEq
            } else {
                TokenKind::BangEq
            }
        } else {
            TokenKind::Bang
        }
    }

    fn scan_less_than(&mut self) -> TokenKind {
        if self.match_char('<') {
            if self.match_char('=') {
                TokenKind::LtLtEq
            } else {
                TokenKind::LtLt
            }
        } else if self.match_char('=') {
            TokenKind::LtEq
        } else {
            TokenKind::Lt
        }
    }

    fn scan_greater_than(&mut self) -> TokenKind {
        if self.match_char('>') {
            if self.match_char('>') {
                if self.match_char('=') {
                    TokenKind::GtGtGtEq
                } else {
                    TokenKind::GtGtGt
                }
            } else if self.match_char('=') {
                TokenKind::GtGtEq
            } else {
                TokenKind::GtGt
            }
        } else if self.match_char('=') {
            TokenKind::GtEq
        } else {
            TokenKind::Gt
        }
    }

    fn scan_question(&mut self) -> TokenKind {
        if self.match_char('?') {
            if self.match_char('=') {
                TokenKind::QuestionQuestionEq
            } else {
                TokenKind::QuestionQuestion
            }
        } else if self.peek() == Some('.') && !matches!(self.peek_next(), Some('0'..='9')) {
            // `a?.5:b` is a conditional, not an optional chain
            self.advance();
            TokenKind::QuestionDot
        } else {
            TokenKind::Question
        }
    }

    /// Shared escape handling for strings and templates.
    /// Returns false when the escape is malformed.
    fn scan_escape(&mut self, value: &mut String) -> bool {
        match self.advance() {
            Some((_, 'n')) => value.push('\n'),
            Some((_, 'r')) => value.push('\r'),
            Some((_, 't')) => value.push('\t'),
            Some((_, 'b')) => value.push('\x08'),
            Some((_, 'f')) => value.push('\x0C'),
            Some((_, 'v')) => value.push('\x0B'),
            Some((_, '0')) if !matches!(self.peek(), Some('0'..='9')) => value.push('\0'),
            Some((_, '0'..='9')) => return false,
            Some((_, 'x')) => match self.scan_hex_digits(2).and_then(char::from_u32) {
                Some(ch) => value.push(ch),
                None => return false,
            },
            Some((_, 'u')) => {
                let code = if self.match_char('{') {
                    let mut hex = String::new();
                    while let Some(ch) = self.peek() {
                        if !ch.is_ascii_hexdigit() {
                            break;
                        }
                        hex.push(ch);
                        self.advance();
                    }
                    if !self.match_char('}') {
                        return false;
                    }
                    u32::from_str_radix(&hex, 16).ok()
                } else {
                    self.scan_hex_digits(4)
                };
                // Lone surrogates have no `char`; U+FFFD stands in for them
                match code {
                    Some(code) => value.push(char::from_u32(code).unwrap_or('\u{FFFD}')),
                    None => return false,
                }
            }
            // Line continuation
            Some((_, '\r')) => {
                self.match_char('\n');
            }
            Some((_, c)) if is_line_terminator(c) => {}
            Some((_, c)) => value.push(c),
            None => return false,
        }
        true
    }

    fn scan_hex_digits(&mut self, count: usize) -> Option<u32> {
        let mut hex = String::with_capacity(count);
        for _ in 0..count {
            match self.peek() {
                Some(ch) if ch.is_ascii_hexdigit() => {
                    hex.push(ch);
                    self.advance();
                }
                _ => return None,
            }
        }
        u32::from_str_radix(&hex, 16).ok()
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();

        loop {
            match self.advance() {
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => {
                    if !self.scan_escape(&mut value) {
                        return TokenKind::Invalid('\\');
                    }
                }
                Some((_, '\n')) | None => return TokenKind::Invalid(quote),
                Some((_, c)) => value.push(c),
            }
        }

        TokenKind::String(JsString::from(value))
    }

    /// Scan template characters up to `${` or the closing backtick.
    /// `head` selects Head/NoSub kinds (after a backtick) or Middle/Tail (after `}`).
    fn scan_template(&mut self, head: bool) -> TokenKind {
        let mut value = String::new();

        loop {
            match self.advance() {
                Some((_, '`')) => {
                    let s = JsString::from(value);
                    return if head {
                        TokenKind::TemplateNoSub(s)
                    } else {
                        TokenKind::TemplateTail(s)
                    };
                }
                Some((_, '$')) if self.peek() == Some('{') => {
                    self.advance();
                    let s = JsString::from(value);
                    return if head {
                        TokenKind::TemplateHead(s)
                    } else {
                        TokenKind::TemplateMiddle(s)
                    };
                }
                Some((_, '\\')) => {
                    if !self.scan_escape(&mut value) {
                        return TokenKind::Invalid('\\');
                    }
                }
                // Template values normalize CRLF to LF
                Some((_, '\r')) => {
                    self.match_char('\n');
                    value.push('\n');
                }
                Some((_, c)) => value.push(c),
                None => return TokenKind::Invalid('`'),
            }
        }
    }

    /// Resume a template after the `}` that closed a substitution.
    pub fn rescan_template_continuation(&mut self, rbrace_span: Span) -> Token {
        self.reset_to(rbrace_span.end, rbrace_span.line, rbrace_span.column + 1);
        self.start_pos = rbrace_span.start;
        self.start_line = rbrace_span.line;
        self.start_column = rbrace_span.column;
        let kind = self.scan_template(false);
        Token::new(kind, self.make_span(), false)
    }

    fn scan_digits(&mut self, radix: u32, out: &mut String) {
        while let Some(ch) = self.peek() {
            if ch.is_digit(radix) {
                out.push(ch);
                self.advance();
            } else if ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        let mut num_str = String::new();

        if first == '0' {
            let radix = match self.peek() {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.scan_digits(radix, &mut num_str);
                if num_str.is_empty() {
                    return TokenKind::Invalid('0');
                }
                let value = num_str.chars().fold(0.0_f64, |acc, c| {
                    acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0))
                });
                return TokenKind::Number(value);
            }
            if matches!(self.peek(), Some('0'..='9')) {
                // Legacy octal literals are not supported
                return TokenKind::Invalid('0');
            }
        }

        if first == '.' {
            num_str.push_str("0.");
        } else {
            num_str.push(first);
            self.scan_digits(10, &mut num_str);
            if self.peek() == Some('.') {
                self.advance();
                num_str.push('.');
            }
        }
        self.scan_digits(10, &mut num_str);

        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            num_str.push('e');
            if let Some(sign @ ('+' | '-')) = self.peek() {
                self.advance();
                num_str.push(sign);
            }
            self.scan_digits(10, &mut num_str);
        }

        if self.peek().is_some_and(is_id_start) {
            // `3in x` and similar
            return TokenKind::Invalid(first);
        }

        TokenKind::Number(num_str.parse().unwrap_or(f64::NAN))
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::new();
        name.push(first);

        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        keyword(&name).unwrap_or_else(|| TokenKind::Identifier(JsString::from(name)))
    }
}

fn keyword(name: &str) -> Option<TokenKind> {
    Some(match name {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "var" => TokenKind::Var,
        "function" => TokenKind::Function,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "finally" => TokenKind::Finally,
        "throw" => TokenKind::Throw,
        "new" => TokenKind::New,
        "this" => TokenKind::This,
        "super" => TokenKind::Super,
        "class" => TokenKind::Class,
        "extends" => TokenKind::Extends,
        "import" => TokenKind::Import,
        "export" => TokenKind::Export,
        "typeof" => TokenKind::Typeof,
        "instanceof" => TokenKind::Instanceof,
        "in" => TokenKind::In,
        "void" => TokenKind::Void,
        "delete" => TokenKind::Delete,
        "yield" => TokenKind::Yield,
        "await" => TokenKind::Await,
        "with" => TokenKind::With,
        "debugger" => TokenKind::Debugger,
        _ => return None,
    })
}

/// ECMAScript line terminators: LF, CR, LS, PS
fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> JsString {
        JsString::from(value)
    }

    fn lex(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut tokens = vec![];
        loop {
            let token = lexer.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push(token.kind);
        }
        tokens
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex("42"), vec![TokenKind::Number(42.0)]);
        assert_eq!(lex("3.25"), vec![TokenKind::Number(3.25)]);
        assert_eq!(lex(".5"), vec![TokenKind::Number(0.5)]);
        assert_eq!(lex("1e3"), vec![TokenKind::Number(1000.0)]);
        assert_eq!(lex("0xff"), vec![TokenKind::Number(255.0)]);
        assert_eq!(lex("0b1010"), vec![TokenKind::Number(10.0)]);
        assert_eq!(lex("1_000"), vec![TokenKind::Number(1000.0)]);
    }

    #[test]
    fn test_number_followed_by_member_access() {
        assert_eq!(
            lex("1..toString"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Dot,
                TokenKind::Identifier(s("toString"))
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(lex(r#""hello""#), vec![TokenKind::String(s("hello"))]);
        assert_eq!(lex(r#"'a\tb'"#), vec![TokenKind::String(s("a\tb"))]);
        assert_eq!(lex(r#""A\x42""#), vec![TokenKind::String(s("AB"))]);
        assert_eq!(lex(r#""\u{1F600}""#), vec![TokenKind::String(s("\u{1F600}"))]);
    }

    #[test]
    fn test_unterminated_string_is_invalid() {
        assert_eq!(lex("\"abc"), vec![TokenKind::Invalid('"')]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("=== !== => ** **= >>>= ??= ?. ?"),
            vec![
                TokenKind::EqEqEq,
                TokenKind::BangEqEq,
                TokenKind::Arrow,
                TokenKind::StarStar,
                TokenKind::StarStarEq,
                TokenKind::GtGtGtEq,
                TokenKind::QuestionQuestionEq,
                TokenKind::QuestionDot,
                TokenKind::Question,
            ]
        );
        assert_eq!(
            lex("&& &&= || ||= & |"),
            vec![
                TokenKind::AmpAmp,
                TokenKind::AmpAmpEq,
                TokenKind::PipePipe,
                TokenKind::PipePipeEq,
                TokenKind::Amp,
                TokenKind::Pipe,
            ]
        );
    }

    #[test]
    fn test_conditional_with_decimal_is_not_optional_chain() {
        assert_eq!(
            lex("a?.5:b"),
            vec![
                TokenKind::Identifier(s("a")),
                TokenKind::Question,
                TokenKind::Number(0.5),
                TokenKind::Colon,
                TokenKind::Identifier(s("b")),
            ]
        );
    }

    #[test]
    fn test_keywords_and_contextual_words() {
        assert_eq!(
            lex("let yield await of async"),
            vec![
                TokenKind::Let,
                TokenKind::Yield,
                TokenKind::Await,
                TokenKind::Identifier(s("of")),
                TokenKind::Identifier(s("async")),
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let mut lexer = Lexer::new("a // line\n/* block */ b");
        let a = lexer.next_token();
        let b = lexer.next_token();
        assert!(!a.newline_before);
        assert_eq!(b.kind, TokenKind::Identifier(s("b")));
        assert!(b.newline_before);
        assert_eq!(b.span.line, 2);
    }

    #[test]
    fn test_template_pieces() {
        let mut lexer = Lexer::new("`a${x}b${y}c`");
        assert_eq!(lexer.next_token().kind, TokenKind::TemplateHead(s("a")));
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier(s("x")));
        let rbrace = lexer.next_token();
        assert_eq!(rbrace.kind, TokenKind::RBrace);
        assert_eq!(
            lexer.rescan_template_continuation(rbrace.span).kind,
            TokenKind::TemplateMiddle(s("b"))
        );
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier(s("y")));
        let rbrace = lexer.next_token();
        assert_eq!(
            lexer.rescan_template_continuation(rbrace.span).kind,
            TokenKind::TemplateTail(s("c"))
        );
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut lexer = Lexer::new("a b c");
        lexer.next_token();
        let cp = lexer.checkpoint();
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier(s("b")));
        lexer.restore(cp);
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier(s("b")));
    }
}
