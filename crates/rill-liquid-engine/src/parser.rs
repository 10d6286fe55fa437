// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::ast::{BlockNode, IllegalNode, LiteralNode, Node, ParseTree, StatementNode};
use crate::environment::{Environment, Mode};
use crate::error::Error;
use crate::expression::{
    AssignmentExpression, Expression, FilterCall, FilteredExpression, IdentifierPath,
    InfixOperator, LoopExpression, LoopOffset, PathElement, PrefixOperator,
};
use crate::lexer::{
    lex_expression, tokenize, Keyword, LexMode, Operator, Token, TokenKind, TokenStream,
};

/// Parses template source into a tree, collecting the warnings produced
/// by warn-mode recovery.
pub fn parse_template(
    source: &str,
    env: &Environment,
) -> Result<(ParseTree, Vec<String>), Error> {
    let tokens = tokenize(source, env.lexer_options())?;
    let mut stream = TokenStream::new(tokens);
    let mut parser = Parser::new(env);
    let tree = parser.parse(&mut stream)?;
    Ok((tree, parser.warnings))
}

/// Recursive-descent parser over the template token stream. Tag bodies
/// are parsed by the registered tags, which call back into
/// [`Parser::parse_block`] for their blocks.
pub struct Parser<'a> {
    env: &'a Environment,
    pub warnings: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            warnings: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        self.env
    }

    pub fn parse(&mut self, stream: &mut TokenStream) -> Result<ParseTree, Error> {
        let block = self.parse_block(stream, &[])?;
        Ok(ParseTree {
            statements: block.statements,
        })
    }

    /// Accumulates statements until the current token opens one of the
    /// `ends` tags (left unconsumed for the caller) or, with an empty end
    /// set, until end of input.
    pub fn parse_block(
        &mut self,
        stream: &mut TokenStream,
        ends: &[&str],
    ) -> Result<BlockNode, Error> {
        let mut statements = Vec::new();
        loop {
            match &stream.current().kind {
                TokenKind::Eof => {
                    if ends.is_empty() {
                        break;
                    }
                    return Err(Error::syntax(
                        format!(
                            "unexpected end of template; expected one of: {}",
                            ends.join(", ")
                        ),
                        stream.current().line,
                    ));
                }
                TokenKind::TagStart => {
                    if let TokenKind::TagName(name) = &stream.peek().kind {
                        if ends.contains(&name.as_str()) {
                            break;
                        }
                    }
                    statements.push(self.parse_statement(stream)?);
                }
                _ => statements.push(self.parse_statement(stream)?),
            }
        }
        Ok(BlockNode::new(statements))
    }

    pub fn parse_statement(&mut self, stream: &mut TokenStream) -> Result<Node, Error> {
        let token = stream.current().clone();
        match &token.kind {
            TokenKind::Literal(text) => {
                stream.advance();
                Ok(Node::Literal(LiteralNode::new(token.clone(), text.clone())))
            }
            TokenKind::StatementStart => {
                stream.advance();
                let (body, line) = require_expression(stream, "output statement")?;
                let expression = parse_filtered_expression(&body, line)?;
                Ok(Node::Statement(StatementNode::new(token, expression)))
            }
            TokenKind::TagStart => {
                stream.advance();
                let name_token = stream.current().clone();
                let TokenKind::TagName(name) = &name_token.kind else {
                    return Err(Error::syntax("expected a tag name", name_token.line));
                };
                match self.env.tags().get(name) {
                    Some(tag) => tag.parse(stream, self),
                    None => self.recover_unknown_tag(stream, name_token.clone()),
                }
            }
            TokenKind::Eof => Err(Error::syntax("unexpected end of template", token.line)),
            other => Err(Error::syntax(
                format!("unexpected {} at statement level", describe(other)),
                token.line,
            )),
        }
    }

    /// Unknown-tag recovery: strict raises, warn records and skips, lax
    /// skips silently. Block-shaped unknown tags are skipped through
    /// their matching `end` tag when one exists.
    fn recover_unknown_tag(
        &mut self,
        stream: &mut TokenStream,
        token: Token,
    ) -> Result<Node, Error> {
        let TokenKind::TagName(name) = token.kind.clone() else {
            return Err(Error::syntax("expected a tag name", token.line));
        };
        match self.env.mode {
            Mode::Strict => {
                return Err(Error::syntax(
                    format!("unknown tag '{name}'"),
                    token.line,
                ));
            }
            Mode::Warn => {
                self.warnings
                    .push(format!("unknown tag '{name}' (line {})", token.line));
            }
            Mode::Lax => {}
        }
        stream.advance();
        if matches!(stream.current().kind, TokenKind::Expression(_)) {
            stream.advance();
        }
        skip_unknown_block(stream, &name);
        Ok(Node::Illegal(IllegalNode::new(token)))
    }
}

/// Consumes through `end<name>` when the stream contains one, restoring
/// the position otherwise so inline unknown tags skip nothing.
fn skip_unknown_block(stream: &mut TokenStream, name: &str) {
    let end_name = format!("end{name}");
    let start = stream.position();
    let mut depth = 1usize;
    loop {
        match &stream.current().kind {
            TokenKind::Eof => {
                stream.set_position(start);
                return;
            }
            TokenKind::TagName(tag) => {
                if tag == name {
                    depth += 1;
                } else if *tag == end_name {
                    depth -= 1;
                    if depth == 0 {
                        stream.advance();
                        if matches!(stream.current().kind, TokenKind::Expression(_)) {
                            stream.advance();
                        }
                        return;
                    }
                }
                stream.advance();
            }
            _ => stream.advance(),
        }
    }
}

// ---------------------------------------------------------------------
// Token-stream helpers shared with the tag implementations.
// ---------------------------------------------------------------------

/// Consumes the current `Expression` token, if any.
pub fn take_expression(stream: &mut TokenStream) -> Option<(String, usize)> {
    if let TokenKind::Expression(body) = &stream.current().kind {
        let body = body.clone();
        let line = stream.current().line;
        stream.advance();
        return Some((body, line));
    }
    None
}

/// Consumes the current `Expression` token or fails naming the construct
/// that required one.
pub fn require_expression(
    stream: &mut TokenStream,
    what: &str,
) -> Result<(String, usize), Error> {
    let line = stream.current().line;
    take_expression(stream).ok_or_else(|| Error::syntax(format!("missing expression in {what}"), line))
}

/// Consumes a closing tag (`TagStart` + `TagName`), validating its name.
pub fn expect_end_tag(stream: &mut TokenStream, name: &str) -> Result<Token, Error> {
    if !matches!(stream.current().kind, TokenKind::TagStart) {
        return Err(Error::syntax(
            format!("expected closing tag '{name}'"),
            stream.current().line,
        ));
    }
    stream.advance();
    let token = stream.next_token();
    match &token.kind {
        TokenKind::TagName(tag) if tag == name => {
            if matches!(stream.current().kind, TokenKind::Expression(_)) {
                return Err(Error::syntax(
                    format!("unexpected expression after '{name}'"),
                    token.line,
                ));
            }
            Ok(token)
        }
        _ => Err(Error::syntax(
            format!("expected closing tag '{name}'"),
            token.line,
        )),
    }
}

pub(crate) fn expect_kind(
    stream: &mut TokenStream,
    kind: &TokenKind,
    what: &str,
) -> Result<Token, Error> {
    let token = stream.next_token();
    if token.kind == *kind {
        Ok(token)
    } else {
        Err(Error::syntax(
            format!("expected {what}, found {}", describe(&token.kind)),
            token.line,
        ))
    }
}

pub(crate) fn expect_eof(stream: &TokenStream) -> Result<(), Error> {
    let token = stream.current();
    if matches!(token.kind, TokenKind::Eof) {
        Ok(())
    } else {
        Err(Error::syntax(
            format!("unexpected {} after expression", describe(&token.kind)),
            token.line,
        ))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Literal(_) => "template text".to_string(),
        TokenKind::StatementStart => "'{{'".to_string(),
        TokenKind::TagStart => "'{%'".to_string(),
        TokenKind::TagName(name) => format!("tag '{name}'"),
        TokenKind::Expression(_) => "expression".to_string(),
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Identifier(name) => format!("'{name}'"),
        TokenKind::StringLiteral(_) => "string literal".to_string(),
        TokenKind::IntegerLiteral(_) | TokenKind::FloatLiteral(_) => "number literal".to_string(),
        TokenKind::RangeOp => "'..'".to_string(),
        TokenKind::Pipe => "'|'".to_string(),
        TokenKind::Colon => "':'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Dot => "'.'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Assign => "'='".to_string(),
        TokenKind::Minus => "'-'".to_string(),
        TokenKind::Operator(_) => "comparison operator".to_string(),
        TokenKind::Keyword(keyword) => format!("'{}'", keyword.as_str()),
    }
}

// ---------------------------------------------------------------------
// Expression sub-parsers (Pratt).
// ---------------------------------------------------------------------

const PRECEDENCE_OR: u8 = 1;
const PRECEDENCE_AND: u8 = 2;
const PRECEDENCE_RELATIONAL: u8 = 3;
const PRECEDENCE_PREFIX: u8 = 4;

fn precedence_of(kind: &TokenKind) -> u8 {
    match kind {
        TokenKind::Keyword(Keyword::Or) => PRECEDENCE_OR,
        TokenKind::Keyword(Keyword::And) => PRECEDENCE_AND,
        TokenKind::Operator(_) => PRECEDENCE_RELATIONAL,
        _ => 0,
    }
}

/// Parses the body of an output statement: a primary followed by a
/// filter pipeline. Comparisons are not part of this grammar.
pub fn parse_filtered_expression(source: &str, line: usize) -> Result<FilteredExpression, Error> {
    let tokens = lex_expression(source, line, LexMode::Default)?;
    let mut stream = TokenStream::new(tokens);
    let expression = parse_prefix(&mut stream)?;
    let filters = parse_filters(&mut stream)?;
    expect_eof(&stream)?;
    Ok(FilteredExpression::new(expression, filters))
}

/// Parses a condition: comparisons and logical combinations over
/// primaries. Filters are not allowed here.
pub fn parse_boolean_expression(source: &str, line: usize) -> Result<Expression, Error> {
    let tokens = lex_expression(source, line, LexMode::Default)?;
    let mut stream = TokenStream::new(tokens);
    let expression = parse_expression(&mut stream, 0)?;
    expect_eof(&stream)?;
    Ok(Expression::BooleanExpr(Box::new(expression)))
}

/// Parses the expression region of an `assign` tag.
pub fn parse_assignment_expression(
    source: &str,
    line: usize,
) -> Result<AssignmentExpression, Error> {
    let tokens = lex_expression(source, line, LexMode::Default)?;
    let mut stream = TokenStream::new(tokens);
    let name_token = stream.next_token();
    let TokenKind::Identifier(name) = &name_token.kind else {
        return Err(Error::syntax(
            "expected a variable name in assignment",
            name_token.line,
        ));
    };
    let name = name.clone();
    expect_kind(&mut stream, &TokenKind::Assign, "'='")?;
    let expression = parse_prefix(&mut stream)?;
    let filters = parse_filters(&mut stream)?;
    expect_eof(&stream)?;
    Ok(AssignmentExpression {
        name,
        expression: FilteredExpression::new(expression, filters),
    })
}

/// Parses the expression region of a `for` or `tablerow` tag:
/// `name in iterable (limit:N)? (offset:N|continue)? (cols:N)? reversed?`
/// with the arguments accepted in any order and duplicates rejected.
pub fn parse_loop_expression(source: &str, line: usize) -> Result<LoopExpression, Error> {
    let tokens = lex_expression(source, line, LexMode::Loop)?;
    let mut stream = TokenStream::new(tokens);

    let name_token = stream.next_token();
    let TokenKind::Identifier(name) = &name_token.kind else {
        return Err(Error::syntax(
            "expected a loop variable name",
            name_token.line,
        ));
    };
    let name = name.clone();
    expect_kind(&mut stream, &TokenKind::Keyword(Keyword::In), "'in'")?;
    let iterable = parse_primary(&mut stream)?;

    let mut expression = LoopExpression {
        name,
        iterable,
        limit: None,
        offset: None,
        cols: None,
        reversed: false,
    };

    loop {
        let token = stream.current().clone();
        match &token.kind {
            TokenKind::Eof => break,
            TokenKind::Comma => stream.advance(),
            TokenKind::Keyword(Keyword::Limit) => {
                if expression.limit.is_some() {
                    return Err(Error::syntax("duplicate loop argument 'limit'", token.line));
                }
                stream.advance();
                expect_kind(&mut stream, &TokenKind::Colon, "':'")?;
                expression.limit = Some(parse_primary(&mut stream)?);
            }
            TokenKind::Keyword(Keyword::Offset) => {
                if expression.offset.is_some() {
                    return Err(Error::syntax(
                        "duplicate loop argument 'offset'",
                        token.line,
                    ));
                }
                stream.advance();
                expect_kind(&mut stream, &TokenKind::Colon, "':'")?;
                if matches!(stream.current().kind, TokenKind::Keyword(Keyword::Continue)) {
                    stream.advance();
                    expression.offset = Some(LoopOffset::Continue);
                } else {
                    expression.offset = Some(LoopOffset::Expression(parse_primary(&mut stream)?));
                }
            }
            TokenKind::Keyword(Keyword::Cols) => {
                if expression.cols.is_some() {
                    return Err(Error::syntax("duplicate loop argument 'cols'", token.line));
                }
                stream.advance();
                expect_kind(&mut stream, &TokenKind::Colon, "':'")?;
                expression.cols = Some(parse_primary(&mut stream)?);
            }
            TokenKind::Keyword(Keyword::Reversed) => {
                if expression.reversed {
                    return Err(Error::syntax(
                        "duplicate loop argument 'reversed'",
                        token.line,
                    ));
                }
                stream.advance();
                expression.reversed = true;
            }
            other => {
                return Err(Error::syntax(
                    format!("unexpected {} in loop expression", describe(other)),
                    token.line,
                ));
            }
        }
    }

    Ok(expression)
}

pub(crate) fn parse_expression(
    stream: &mut TokenStream,
    precedence: u8,
) -> Result<Expression, Error> {
    let mut left = parse_prefix(stream)?;
    while precedence < precedence_of(&stream.current().kind) {
        left = parse_infix(stream, left)?;
    }
    Ok(left)
}

fn parse_prefix(stream: &mut TokenStream) -> Result<Expression, Error> {
    if matches!(stream.current().kind, TokenKind::Minus) {
        stream.advance();
        let right = parse_expression(stream, PRECEDENCE_PREFIX)?;
        return Ok(Expression::Prefix {
            operator: PrefixOperator::Minus,
            right: Box::new(right),
        });
    }
    parse_primary(stream)
}

fn parse_infix(stream: &mut TokenStream, left: Expression) -> Result<Expression, Error> {
    let token = stream.next_token();
    let (operator, precedence) = match &token.kind {
        TokenKind::Keyword(Keyword::Or) => (InfixOperator::Or, PRECEDENCE_OR),
        TokenKind::Keyword(Keyword::And) => (InfixOperator::And, PRECEDENCE_AND),
        TokenKind::Operator(op) => {
            let operator = match op {
                Operator::Equal => InfixOperator::Equal,
                Operator::NotEqual => InfixOperator::NotEqual,
                Operator::Less => InfixOperator::Less,
                Operator::LessOrEqual => InfixOperator::LessOrEqual,
                Operator::Greater => InfixOperator::Greater,
                Operator::GreaterOrEqual => InfixOperator::GreaterOrEqual,
                Operator::Contains => InfixOperator::Contains,
            };
            (operator, PRECEDENCE_RELATIONAL)
        }
        other => {
            return Err(Error::syntax(
                format!("unexpected {} in expression", describe(other)),
                token.line,
            ));
        }
    };
    let right = parse_expression(stream, precedence)?;
    Ok(Expression::Infix {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    })
}

/// Parses a single value-producing term: a literal, an identifier path
/// or a range.
pub fn parse_primary(stream: &mut TokenStream) -> Result<Expression, Error> {
    let token = stream.current().clone();
    match &token.kind {
        TokenKind::StringLiteral(text) => {
            stream.advance();
            Ok(Expression::StringLiteral(text.clone()))
        }
        TokenKind::IntegerLiteral(text) => {
            stream.advance();
            text.parse::<i64>()
                .map(Expression::IntegerLiteral)
                .map_err(|_| {
                    Error::syntax(format!("integer literal '{text}' out of range"), token.line)
                })
        }
        TokenKind::FloatLiteral(text) => {
            stream.advance();
            text.parse::<f64>().map(Expression::FloatLiteral).map_err(|_| {
                Error::syntax(format!("invalid float literal '{text}'"), token.line)
            })
        }
        TokenKind::Keyword(Keyword::True) => {
            stream.advance();
            Ok(Expression::Boolean(true))
        }
        TokenKind::Keyword(Keyword::False) => {
            stream.advance();
            Ok(Expression::Boolean(false))
        }
        TokenKind::Keyword(Keyword::Nil) => {
            stream.advance();
            Ok(Expression::Nil)
        }
        TokenKind::Keyword(Keyword::Empty) => {
            stream.advance();
            Ok(Expression::Empty)
        }
        TokenKind::Keyword(Keyword::Blank) => {
            stream.advance();
            Ok(Expression::Blank)
        }
        TokenKind::Keyword(Keyword::Continue) => {
            stream.advance();
            Ok(Expression::Continue)
        }
        TokenKind::Identifier(_) => parse_identifier(stream),
        TokenKind::LParen => {
            stream.advance();
            let start = parse_primary(stream)?;
            expect_kind(stream, &TokenKind::RangeOp, "'..'")?;
            let stop = parse_primary(stream)?;
            expect_kind(stream, &TokenKind::RParen, "')'")?;
            Ok(Expression::RangeLiteral(Box::new(start), Box::new(stop)))
        }
        TokenKind::Minus => parse_prefix(stream),
        other => Err(Error::syntax(
            format!("unexpected {} in expression", describe(other)),
            token.line,
        )),
    }
}

fn parse_identifier(stream: &mut TokenStream) -> Result<Expression, Error> {
    let token = stream.next_token();
    let TokenKind::Identifier(name) = &token.kind else {
        return Err(Error::syntax("expected an identifier", token.line));
    };
    let mut path = IdentifierPath::new();
    path.push(PathElement::Key(name.clone()));

    loop {
        match &stream.current().kind {
            TokenKind::Dot => {
                stream.advance();
                let segment = stream.next_token();
                match &segment.kind {
                    TokenKind::Identifier(key) => path.push(PathElement::Key(key.clone())),
                    TokenKind::IntegerLiteral(text) => {
                        let index = text.parse::<i64>().map_err(|_| {
                            Error::syntax(
                                format!("integer index '{text}' out of range"),
                                segment.line,
                            )
                        })?;
                        path.push(PathElement::Index(index));
                    }
                    // Reserved words are plain keys after a dot: `a.first`.
                    TokenKind::Keyword(keyword) => {
                        path.push(PathElement::Key(keyword.as_str().to_string()));
                    }
                    other => {
                        return Err(Error::syntax(
                            format!("expected a name after '.', found {}", describe(other)),
                            segment.line,
                        ));
                    }
                }
            }
            TokenKind::LBracket => {
                stream.advance();
                let inner = stream.current().clone();
                match &inner.kind {
                    TokenKind::StringLiteral(key) => {
                        stream.advance();
                        path.push(PathElement::Key(key.clone()));
                    }
                    TokenKind::IntegerLiteral(text) => {
                        let index = text.parse::<i64>().map_err(|_| {
                            Error::syntax(
                                format!("integer index '{text}' out of range"),
                                inner.line,
                            )
                        })?;
                        stream.advance();
                        path.push(PathElement::Index(index));
                    }
                    TokenKind::Identifier(_) => {
                        let nested = parse_identifier(stream)?;
                        path.push(PathElement::Nested(Box::new(nested)));
                    }
                    other => {
                        return Err(Error::syntax(
                            format!(
                                "expected a string, integer or identifier inside '[]', found {}",
                                describe(other)
                            ),
                            inner.line,
                        ));
                    }
                }
                expect_kind(stream, &TokenKind::RBracket, "']'")?;
            }
            _ => break,
        }
    }
    Ok(Expression::Identifier(path))
}

/// Parses a `| name: arg, key: value` pipeline. Keyword arguments must
/// follow positional ones.
pub fn parse_filters(stream: &mut TokenStream) -> Result<Vec<FilterCall>, Error> {
    let mut filters = Vec::new();
    while matches!(stream.current().kind, TokenKind::Pipe) {
        stream.advance();
        let name_token = stream.next_token();
        let TokenKind::Identifier(name) = &name_token.kind else {
            return Err(Error::syntax(
                "expected a filter name after '|'",
                name_token.line,
            ));
        };
        let mut call = FilterCall::new(name.clone());

        if matches!(stream.current().kind, TokenKind::Colon) {
            stream.advance();
            loop {
                if let TokenKind::Identifier(key) = &stream.current().kind {
                    if matches!(stream.peek().kind, TokenKind::Colon) {
                        let key = key.clone();
                        stream.advance();
                        stream.advance();
                        let value = parse_primary(stream)?;
                        call.kwargs.push((key, value));
                        if matches!(stream.current().kind, TokenKind::Comma) {
                            stream.advance();
                            continue;
                        }
                        break;
                    }
                }
                if !call.kwargs.is_empty() {
                    return Err(Error::syntax(
                        "positional filter arguments must precede keyword arguments",
                        stream.current().line,
                    ));
                }
                call.args.push(parse_primary(stream)?);
                if matches!(stream.current().kind, TokenKind::Comma) {
                    stream.advance();
                    continue;
                }
                break;
            }
        }
        filters.push(call);
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn env() -> Environment {
        Environment::builder().build()
    }

    #[test]
    fn parses_literals_and_statements() {
        let (tree, _) = parse_template("hello {{ name }}!", &env()).unwrap();
        assert_eq!(tree.statements.len(), 3);
        assert!(matches!(tree.statements[0], Node::Literal(_)));
        assert!(matches!(tree.statements[1], Node::Statement(_)));
    }

    #[test]
    fn parses_filter_pipelines_with_arguments() {
        let expr = parse_filtered_expression("name | default: 'anon' | append: '!'", 1).unwrap();
        assert_eq!(expr.filters.len(), 2);
        assert_eq!(expr.filters[0].name, "default");
        assert_eq!(
            expr.filters[0].args,
            vec![Expression::StringLiteral("anon".into())]
        );
    }

    #[test]
    fn keyword_arguments_follow_positional() {
        let expr = parse_filtered_expression("x | slice: 1, count: 2", 1).unwrap();
        assert_eq!(expr.filters[0].args.len(), 1);
        assert_eq!(expr.filters[0].kwargs[0].0, "count");

        let err = parse_filtered_expression("x | slice: count: 2, 1", 1).unwrap_err();
        assert!(err.to_string().contains("positional"));
    }

    #[test]
    fn boolean_expressions_honour_precedence() {
        let expr = parse_boolean_expression("a == 1 or b == 2 and c == 3", 1).unwrap();
        // `and` binds tighter than `or`.
        let Expression::BooleanExpr(inner) = expr else {
            panic!("expected boolean wrapper");
        };
        let Expression::Infix { operator, .. } = *inner else {
            panic!("expected infix expression");
        };
        assert_eq!(operator, InfixOperator::Or);
    }

    #[test]
    fn filters_are_rejected_in_conditions() {
        let err = parse_boolean_expression("a | upcase", 1).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn parses_bracketed_identifier_paths() {
        let expr = parse_filtered_expression("a[b.c][0].d", 1).unwrap();
        let Expression::Identifier(path) = &expr.expression else {
            panic!("expected identifier");
        };
        assert_eq!(path.len(), 4);
        assert!(matches!(path[1], PathElement::Nested(_)));
        assert!(matches!(path[2], PathElement::Index(0)));
        assert!(matches!(path[3], PathElement::Key(ref key) if key == "d"));
    }

    #[test]
    fn parses_loop_expressions_in_any_argument_order() {
        let expr = parse_loop_expression("i in arr reversed limit:2 offset:1", 1).unwrap();
        assert!(expr.reversed);
        assert!(expr.limit.is_some());
        assert!(matches!(expr.offset, Some(LoopOffset::Expression(_))));

        let expr = parse_loop_expression("i in arr offset:continue", 1).unwrap();
        assert!(matches!(expr.offset, Some(LoopOffset::Continue)));
    }

    #[test]
    fn duplicate_loop_arguments_error() {
        let err = parse_loop_expression("i in arr limit:1 limit:2", 1).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn unknown_tags_error_in_strict_mode() {
        let err = parse_template("{% nosuch %}", &env()).unwrap_err();
        assert!(err.to_string().contains("unknown tag 'nosuch'"));
    }

    #[test]
    fn unknown_tags_become_illegal_nodes_in_lax_mode() {
        let env = Environment::builder().mode(Mode::Lax).build();
        let (tree, warnings) = parse_template("a{% nosuch %}b", &env).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(tree.statements.len(), 3);
        assert!(matches!(tree.statements[1], Node::Illegal(_)));
    }

    #[test]
    fn warn_mode_records_unknown_tags() {
        let env = Environment::builder().mode(Mode::Warn).build();
        let (_, warnings) = parse_template("{% nosuch %}", &env).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("nosuch"));
    }

    #[test]
    fn unknown_block_tags_skip_to_their_end_tag() {
        let env = Environment::builder().mode(Mode::Lax).build();
        let (tree, _) = parse_template("a{% widget %}inner{% endwidget %}b", &env).unwrap();
        let rendered: Vec<bool> = tree
            .statements
            .iter()
            .map(|node| matches!(node, Node::Literal(_)))
            .collect();
        assert_eq!(rendered, vec![true, false, true]);
    }

    #[test]
    fn assignment_expressions_carry_filters() {
        let assignment = parse_assignment_expression("total = price | times: 2", 1).unwrap();
        assert_eq!(assignment.name, "total");
        assert_eq!(assignment.expression.filters.len(), 1);
    }

    #[test]
    fn negative_literal_in_statement_position() {
        let expr = parse_filtered_expression("-5", 1).unwrap();
        assert_eq!(expr.expression, Expression::IntegerLiteral(-5));
    }
}
