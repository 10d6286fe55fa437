// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::error::Error;

/// A lexed token. Every token carries the 1-based line number it started
/// on; the parser threads these into all error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self { kind, line }
    }
}

/// Token kinds, partitioned into template-level kinds produced by
/// [`tokenize`] and expression-level kinds produced by [`lex_expression`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Template level.
    Literal(String),
    StatementStart,
    TagStart,
    TagName(String),
    Expression(String),
    Eof,
    // Expression level.
    Identifier(String),
    StringLiteral(String),
    IntegerLiteral(String),
    FloatLiteral(String),
    RangeOp,
    Pipe,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Assign,
    Minus,
    Operator(Operator),
    Keyword(Keyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    Nil,
    Empty,
    Blank,
    Continue,
    And,
    Or,
    In,
    Limit,
    Offset,
    Cols,
    Reversed,
    With,
    As,
    For,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Nil => "nil",
            Keyword::Empty => "empty",
            Keyword::Blank => "blank",
            Keyword::Continue => "continue",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::In => "in",
            Keyword::Limit => "limit",
            Keyword::Offset => "offset",
            Keyword::Cols => "cols",
            Keyword::Reversed => "reversed",
            Keyword::With => "with",
            Keyword::As => "as",
            Keyword::For => "for",
        }
    }
}

/// Delimiter and whitespace-handling options consumed by the template
/// lexer. Owned by the environment; the defaults match stock Liquid.
#[derive(Debug, Clone)]
pub struct LexerOptions {
    pub statement_start: String,
    pub statement_end: String,
    pub tag_start: String,
    pub tag_end: String,
    pub strip_tags: bool,
    pub trim_blocks: bool,
    pub lstrip_blocks: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self {
            statement_start: "{{".to_string(),
            statement_end: "}}".to_string(),
            tag_start: "{%".to_string(),
            tag_end: "%}".to_string(),
            strip_tags: false,
            trim_blocks: false,
            lstrip_blocks: false,
        }
    }
}

/// Pending whitespace handling for the literal that follows a closed
/// statement or tag region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTrim {
    None,
    /// `-%}` / `-}}` / `strip_tags`: strip all leading whitespace.
    All,
    /// `trim_blocks`: strip a single trailing newline after a tag.
    Newline,
}

/// Tokenizes template source into the template-level token stream.
///
/// Output regions become `StatementStart` + `Expression`, tags become
/// `TagStart` + `TagName` (+ `Expression` when a body follows the name) and
/// everything else becomes `Literal`. `{% raw %}` short-circuits scanning
/// until its closing tag. The stream always ends with `Eof`.
pub fn tokenize(source: &str, options: &LexerOptions) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    let mut line = 1usize;
    let mut pending = PendingTrim::None;

    while pos < source.len() {
        let rest = &source[pos..];
        let next_statement = rest.find(&options.statement_start);
        let next_tag = rest.find(&options.tag_start);

        let (offset, is_tag) = match (next_statement, next_tag) {
            (None, None) => {
                push_literal(&mut tokens, rest, &mut line, pending, false, false);
                break;
            }
            (Some(s), None) => (s, false),
            (None, Some(t)) => (t, true),
            (Some(s), Some(t)) => {
                if t < s {
                    (t, true)
                } else {
                    (s, false)
                }
            }
        };

        let delim_start = pos + offset;
        let delim = if is_tag {
            &options.tag_start
        } else {
            &options.statement_start
        };
        let end_delim = if is_tag {
            &options.tag_end
        } else {
            &options.statement_end
        };

        let mut body_open = delim_start + delim.len();
        let trim_left = source[body_open..].starts_with('-');
        if trim_left {
            body_open += 1;
        }

        // Emit the literal preceding this region, honouring trim markers
        // and the block-stripping options.
        let literal = &source[pos..delim_start];
        let strip_all = trim_left || (is_tag && options.strip_tags);
        let lstrip = is_tag && options.lstrip_blocks;
        push_literal(&mut tokens, literal, &mut line, pending, strip_all, lstrip);

        let region_line = line;
        let body_close = match find_region_end(source, body_open, end_delim) {
            Some(index) => index,
            None => {
                let what = if is_tag { "tag" } else { "output statement" };
                return Err(Error::syntax(format!("unterminated {what}"), region_line));
            }
        };

        let mut body_end = body_close;
        let trim_right = body_end > body_open && source.as_bytes()[body_end - 1] == b'-';
        if trim_right {
            body_end -= 1;
        }

        let raw_body = &source[body_open..body_end];
        let lead = raw_body.len() - raw_body.trim_start().len();
        let body_line = region_line + count_newlines(&raw_body[..lead]);
        let body = raw_body.trim();

        let region_close = body_close + end_delim.len();

        if is_tag {
            let name_len = body
                .char_indices()
                .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '_')
                .map_or(body.len(), |(idx, _)| idx);
            if name_len == 0 {
                return Err(Error::syntax("missing tag name", region_line));
            }
            let name = &body[..name_len];

            if name == "raw" {
                line += count_newlines(&source[delim_start..region_close]);
                let (next_pos, trim_after) = lex_raw(
                    &mut tokens,
                    source,
                    region_close,
                    trim_right,
                    region_line,
                    &mut line,
                    options,
                )?;
                pos = next_pos;
                pending = if trim_after {
                    PendingTrim::All
                } else {
                    PendingTrim::None
                };
                continue;
            }

            tokens.push(Token::new(TokenKind::TagStart, region_line));
            tokens.push(Token::new(TokenKind::TagName(name.to_string()), body_line));

            let rest_body = &body[name_len..];
            let rest_lead = rest_body.len() - rest_body.trim_start().len();
            let expr = rest_body.trim();
            if !expr.is_empty() {
                let expr_line = body_line + count_newlines(&rest_body[..rest_lead]);
                tokens.push(Token::new(TokenKind::Expression(expr.to_string()), expr_line));
            }
        } else {
            tokens.push(Token::new(TokenKind::StatementStart, region_line));
            if !body.is_empty() {
                tokens.push(Token::new(TokenKind::Expression(body.to_string()), body_line));
            }
        }

        line += count_newlines(&source[delim_start..region_close]);
        pos = region_close;

        pending = if trim_right || (is_tag && options.strip_tags) {
            PendingTrim::All
        } else if is_tag && options.trim_blocks {
            PendingTrim::Newline
        } else {
            PendingTrim::None
        };
    }

    tokens.push(Token::new(TokenKind::Eof, line));
    Ok(tokens)
}

/// Scans `{% raw %}` content without interpreting nested delimiters and
/// emits the raw/endraw tag tokens around a single literal. Returns the
/// position just past the closing tag plus whether the closing tag asked
/// for a right trim.
#[allow(clippy::too_many_arguments)]
fn lex_raw(
    tokens: &mut Vec<Token>,
    source: &str,
    content_start: usize,
    open_trim_right: bool,
    open_line: usize,
    line: &mut usize,
    options: &LexerOptions,
) -> Result<(usize, bool), Error> {
    let mut search = content_start;
    loop {
        let Some(found) = source[search..].find(&options.tag_start) else {
            return Err(Error::syntax("raw tag never closed", open_line));
        };
        let tag_at = search + found;
        let mut inner = tag_at + options.tag_start.len();
        let close_trim_left = source[inner..].starts_with('-');
        if close_trim_left {
            inner += 1;
        }
        let Some(close) = find_region_end(source, inner, &options.tag_end) else {
            return Err(Error::syntax("raw tag never closed", open_line));
        };
        let mut inner_end = close;
        let close_trim_right = inner_end > inner && source.as_bytes()[inner_end - 1] == b'-';
        if close_trim_right {
            inner_end -= 1;
        }

        if source[inner..inner_end].trim() != "endraw" {
            search = tag_at + options.tag_start.len();
            continue;
        }

        let mut content = &source[content_start..tag_at];
        if open_trim_right {
            content = content.trim_start();
        }
        if close_trim_left || options.strip_tags {
            content = content.trim_end();
        }

        let content_line = *line;
        tokens.push(Token::new(TokenKind::TagStart, open_line));
        tokens.push(Token::new(TokenKind::TagName("raw".to_string()), open_line));
        if !content.is_empty() {
            tokens.push(Token::new(TokenKind::Literal(content.to_string()), content_line));
        }
        *line += count_newlines(&source[content_start..tag_at]);
        let end_line = *line;
        tokens.push(Token::new(TokenKind::TagStart, end_line));
        tokens.push(Token::new(TokenKind::TagName("endraw".to_string()), end_line));

        let region_close = close + options.tag_end.len();
        *line += count_newlines(&source[tag_at..region_close]);
        return Ok((region_close, close_trim_right || options.strip_tags));
    }
}

fn push_literal(
    tokens: &mut Vec<Token>,
    text: &str,
    line: &mut usize,
    pending: PendingTrim,
    strip_trailing: bool,
    lstrip: bool,
) {
    let token_line = *line;
    let newlines = count_newlines(text);

    let mut value = text;
    match pending {
        PendingTrim::All => value = value.trim_start(),
        PendingTrim::Newline => {
            value = value
                .strip_prefix("\r\n")
                .or_else(|| value.strip_prefix('\n'))
                .unwrap_or(value);
        }
        PendingTrim::None => {}
    }

    if strip_trailing {
        value = value.trim_end();
    } else if lstrip {
        // Strip spaces and tabs back to the start of the line, but only
        // when the tag is the first thing on that line.
        let stripped = value.trim_end_matches([' ', '\t']);
        if stripped.len() < value.len() && (stripped.is_empty() || stripped.ends_with('\n')) {
            value = stripped;
        }
    }

    if !value.is_empty() {
        tokens.push(Token::new(TokenKind::Literal(value.to_string()), token_line));
    }
    *line += newlines;
}

/// Finds the start of `end_delim`, skipping matches inside single- or
/// double-quoted strings so `{{ "}}" }}` closes where the author intended.
fn find_region_end(source: &str, from: usize, end_delim: &str) -> Option<usize> {
    let mut in_string: Option<char> = None;
    let mut index = from;
    let bytes = source.as_bytes();

    while index < source.len() {
        if let Some(quote) = in_string {
            if bytes[index] == quote as u8 {
                in_string = None;
            }
            index += 1;
            continue;
        }
        match bytes[index] {
            b'\'' => in_string = Some('\''),
            b'"' => in_string = Some('"'),
            _ => {
                if source[index..].starts_with(end_delim) {
                    return Some(index);
                }
            }
        }
        index += 1;
    }
    None
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// Keyword set recognised by the expression sub-lexer. The reserved words
/// of the loop and inclusion grammars are plain identifiers everywhere
/// else, so callers pick the mode matching the grammar they parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    Default,
    Loop,
    Inclusion,
}

fn lookup_keyword(word: &str, mode: LexMode) -> Option<TokenKind> {
    let base = match word {
        "true" => Some(TokenKind::Keyword(Keyword::True)),
        "false" => Some(TokenKind::Keyword(Keyword::False)),
        "nil" | "null" => Some(TokenKind::Keyword(Keyword::Nil)),
        "empty" => Some(TokenKind::Keyword(Keyword::Empty)),
        "blank" => Some(TokenKind::Keyword(Keyword::Blank)),
        "and" => Some(TokenKind::Keyword(Keyword::And)),
        "or" => Some(TokenKind::Keyword(Keyword::Or)),
        "contains" => Some(TokenKind::Operator(Operator::Contains)),
        _ => None,
    };
    if base.is_some() {
        return base;
    }
    match mode {
        LexMode::Default => None,
        LexMode::Loop => match word {
            "in" => Some(TokenKind::Keyword(Keyword::In)),
            "limit" => Some(TokenKind::Keyword(Keyword::Limit)),
            "offset" => Some(TokenKind::Keyword(Keyword::Offset)),
            "cols" => Some(TokenKind::Keyword(Keyword::Cols)),
            "reversed" => Some(TokenKind::Keyword(Keyword::Reversed)),
            "continue" => Some(TokenKind::Keyword(Keyword::Continue)),
            _ => None,
        },
        LexMode::Inclusion => match word {
            "with" => Some(TokenKind::Keyword(Keyword::With)),
            "as" => Some(TokenKind::Keyword(Keyword::As)),
            "for" => Some(TokenKind::Keyword(Keyword::For)),
            _ => None,
        },
    }
}

/// Tokenizes the body of an `Expression` token. `line` is the 1-based
/// template line the body starts on; newlines inside the body advance it.
pub fn lex_expression(source: &str, line: usize, mode: LexMode) -> Result<Vec<Token>, Error> {
    let mut lexer = ExprLexer {
        chars: source.chars().collect(),
        pos: 0,
        line,
        mode,
        last_was_operand: false,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct ExprLexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    mode: LexMode,
    last_was_operand: bool,
}

impl ExprLexer {
    fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.skip_whitespace();
        let Some(ch) = self.peek(0) else {
            return Ok(None);
        };
        let line = self.line;

        let kind = match ch {
            '\'' | '"' => {
                self.bump();
                TokenKind::StringLiteral(self.read_string(ch, line)?)
            }
            '0'..='9' => self.read_number(),
            '-' => {
                if matches!(self.peek(1), Some(next) if next.is_ascii_digit())
                    && !self.last_was_operand
                {
                    self.read_number()
                } else {
                    self.bump();
                    TokenKind::Minus
                }
            }
            c if is_identifier_start(c) => {
                let word = self.read_identifier();
                lookup_keyword(&word, self.mode).unwrap_or(TokenKind::Identifier(word))
            }
            '.' => {
                self.bump();
                if self.peek(0) == Some('.') {
                    self.bump();
                    TokenKind::RangeOp
                } else {
                    TokenKind::Dot
                }
            }
            '|' => {
                self.bump();
                TokenKind::Pipe
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            '(' => {
                self.bump();
                TokenKind::LParen
            }
            ')' => {
                self.bump();
                TokenKind::RParen
            }
            '[' => {
                self.bump();
                TokenKind::LBracket
            }
            ']' => {
                self.bump();
                TokenKind::RBracket
            }
            '=' => {
                self.bump();
                if self.peek(0) == Some('=') {
                    self.bump();
                    TokenKind::Operator(Operator::Equal)
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                self.bump();
                if self.peek(0) == Some('=') {
                    self.bump();
                    TokenKind::Operator(Operator::NotEqual)
                } else {
                    return Err(Error::syntax("unexpected '!' without '='", line));
                }
            }
            '<' => {
                self.bump();
                match self.peek(0) {
                    Some('=') => {
                        self.bump();
                        TokenKind::Operator(Operator::LessOrEqual)
                    }
                    Some('>') => {
                        self.bump();
                        TokenKind::Operator(Operator::NotEqual)
                    }
                    _ => TokenKind::Operator(Operator::Less),
                }
            }
            '>' => {
                self.bump();
                if self.peek(0) == Some('=') {
                    self.bump();
                    TokenKind::Operator(Operator::GreaterOrEqual)
                } else {
                    TokenKind::Operator(Operator::Greater)
                }
            }
            other => {
                return Err(Error::syntax(
                    format!("unexpected character '{other}' in expression"),
                    line,
                ));
            }
        };

        self.last_was_operand = matches!(
            kind,
            TokenKind::Identifier(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::IntegerLiteral(_)
                | TokenKind::FloatLiteral(_)
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::Keyword(
                    Keyword::True | Keyword::False | Keyword::Nil | Keyword::Empty | Keyword::Blank
                )
        );

        Ok(Some(Token::new(kind, line)))
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek(0) {
            if ch == '\n' {
                self.line += 1;
                self.bump();
            } else if ch.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote: char, line: usize) -> Result<String, Error> {
        let mut literal = String::new();
        while let Some(ch) = self.peek(0) {
            self.bump();
            if ch == quote {
                return Ok(literal);
            }
            if ch == '\n' {
                self.line += 1;
            }
            literal.push(ch);
        }
        Err(Error::syntax("unterminated string literal", line))
    }

    fn read_number(&mut self) -> TokenKind {
        let mut literal = String::new();
        if self.peek(0) == Some('-') {
            literal.push('-');
            self.bump();
        }
        while let Some(ch) = self.peek(0) {
            if ch.is_ascii_digit() {
                literal.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        // A single dot followed by a digit makes this a float; `1..` is an
        // integer abutting a range operator.
        if self.peek(0) == Some('.') && matches!(self.peek(1), Some(next) if next.is_ascii_digit())
        {
            literal.push('.');
            self.bump();
            while let Some(ch) = self.peek(0) {
                if ch.is_ascii_digit() {
                    literal.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            TokenKind::FloatLiteral(literal)
        } else {
            TokenKind::IntegerLiteral(literal)
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.peek(0) {
            if is_identifier_part(ch) {
                word.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit() || ch == '-'
}

/// Cursor over a token vector. Always terminated by `Eof`; reading past
/// the end keeps returning the final `Eof` token.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        let line = tokens.last().map_or(1, |token| token.line);
        if !matches!(tokens.last().map(|token| &token.kind), Some(TokenKind::Eof)) {
            tokens.push(Token::new(TokenKind::Eof, line));
        }
        Self { tokens, pos: 0 }
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    pub fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.current().clone();
        self.advance();
        token
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn tokenizes_literals_and_statements() {
        let tokens = tokenize("Hello {{ name }}!", &LexerOptions::default()).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Literal("Hello ".into()),
                TokenKind::StatementStart,
                TokenKind::Expression("name".into()),
                TokenKind::Literal("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_tags_with_bodies() {
        let tokens = tokenize("{% if user %}hi{% endif %}", &LexerOptions::default()).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::TagStart,
                TokenKind::TagName("if".into()),
                TokenKind::Expression("user".into()),
                TokenKind::Literal("hi".into()),
                TokenKind::TagStart,
                TokenKind::TagName("endif".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn whitespace_markers_trim_adjacent_literals() {
        let tokens = tokenize("a \n{%- if x -%}\n b{% endif %}", &LexerOptions::default()).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Literal("a".into()));
        assert_eq!(tokens[4].kind, TokenKind::Literal("b".into()));
    }

    #[test]
    fn raw_blocks_suppress_scanning() {
        let tokens =
            tokenize("{% raw %}{{ not parsed }}{% endraw %}", &LexerOptions::default()).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::TagStart,
                TokenKind::TagName("raw".into()),
                TokenKind::Literal("{{ not parsed }}".into()),
                TokenKind::TagStart,
                TokenKind::TagName("endraw".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn line_numbers_advance_through_literals() {
        let tokens = tokenize("a\nb\n{{ x }}", &LexerOptions::default()).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::StatementStart);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn unterminated_statement_reports_line() {
        let err = tokenize("one\n{{ broken", &LexerOptions::default()).unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn delimiters_inside_strings_do_not_close_regions() {
        let tokens = tokenize("{{ \"}}\" }}", &LexerOptions::default()).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Expression("\"}}\"".into()));
    }

    #[test]
    fn custom_delimiters_are_honoured() {
        let options = LexerOptions {
            statement_start: "<<".into(),
            statement_end: ">>".into(),
            tag_start: "<#".into(),
            tag_end: "#>".into(),
            ..LexerOptions::default()
        };
        let tokens = tokenize("<< name >> <# assign x = 1 #>", &options).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StatementStart);
        assert_eq!(tokens[1].kind, TokenKind::Expression("name".into()));
        assert_eq!(tokens[3].kind, TokenKind::TagStart);
        assert_eq!(tokens[4].kind, TokenKind::TagName("assign".into()));
    }

    #[test]
    fn lexes_expression_operators_and_keywords() {
        let tokens = lex_expression("a.b == 'x' and c", 1, LexMode::Default).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Dot,
                TokenKind::Identifier("b".into()),
                TokenKind::Operator(Operator::Equal),
                TokenKind::StringLiteral("x".into()),
                TokenKind::Keyword(Keyword::And),
                TokenKind::Identifier("c".into()),
            ]
        );
    }

    #[test]
    fn loop_keywords_require_loop_mode() {
        let default = lex_expression("limit", 1, LexMode::Default).unwrap();
        assert_eq!(default[0].kind, TokenKind::Identifier("limit".into()));

        let loop_mode = lex_expression("limit", 1, LexMode::Loop).unwrap();
        assert_eq!(loop_mode[0].kind, TokenKind::Keyword(Keyword::Limit));
    }

    #[test]
    fn range_form_does_not_eat_the_dots() {
        let tokens = lex_expression("(1..3)", 1, LexMode::Default).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::LParen,
                TokenKind::IntegerLiteral("1".into()),
                TokenKind::RangeOp,
                TokenKind::IntegerLiteral("3".into()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn negative_numbers_fold_after_separators() {
        let tokens = lex_expression("plus: -2", 1, LexMode::Default).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Identifier("plus".into()),
                TokenKind::Colon,
                TokenKind::IntegerLiteral("-2".into()),
            ]
        );
    }

    #[test]
    fn floats_and_integers_are_distinct() {
        let tokens = lex_expression("1.5 2", 1, LexMode::Default).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FloatLiteral("1.5".into()));
        assert_eq!(tokens[1].kind, TokenKind::IntegerLiteral("2".into()));
    }

    #[test]
    fn unterminated_string_errors() {
        let err = lex_expression("'open", 4, LexMode::Default).unwrap_err();
        assert_eq!(err.line(), Some(4));
    }
}
