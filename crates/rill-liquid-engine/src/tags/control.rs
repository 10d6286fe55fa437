// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Control-flow tags: `if`, `unless`, `case`, `break` and `continue`.

use crate::ast::{BlockNode, ConditionalBlockNode, Control, Node};
use crate::context::Context;
use crate::error::Error;
use crate::expression::{Expression, InfixOperator};
use crate::lexer::{lex_expression, Keyword, LexMode, Token, TokenKind, TokenStream};
use crate::parser::{
    expect_end_tag, expect_eof, parse_boolean_expression, parse_primary, require_expression,
    Parser,
};
use crate::value::is_truthy;

/// `{% if %}` with any number of `elsif` branches and an optional `else`.
#[derive(Debug, Clone)]
pub struct IfNode {
    pub token: Token,
    pub condition: Expression,
    pub consequence: BlockNode,
    pub alternatives: Vec<ConditionalBlockNode>,
    pub default: Option<BlockNode>,
}

impl IfNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        let value = self
            .condition
            .evaluate(ctx)
            .map_err(|err| err.with_line(line))?;
        if is_truthy(&value) {
            return self.consequence.render(ctx, buffer);
        }
        for alternative in &self.alternatives {
            if let Some(control) = alternative.render(ctx, buffer, line)? {
                return Ok(control);
            }
        }
        if let Some(default) = &self.default {
            return default.render(ctx, buffer);
        }
        Ok(Control::Normal)
    }
}

pub struct IfTag;

impl super::Tag for IfTag {
    fn name(&self) -> &'static str {
        "if"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endif")
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "if tag")?;
        let condition = parse_boolean_expression(&body, line)?;
        let consequence = parser.parse_block(stream, &["elsif", "else", "endif"])?;

        let mut alternatives = Vec::new();
        let mut default = None;
        loop {
            let TokenKind::TagName(next) = &stream.peek().kind else {
                break;
            };
            match next.as_str() {
                "elsif" => {
                    stream.advance();
                    stream.advance();
                    let (body, line) = require_expression(stream, "elsif tag")?;
                    let condition = parse_boolean_expression(&body, line)?;
                    let block = parser.parse_block(stream, &["elsif", "else", "endif"])?;
                    alternatives.push(ConditionalBlockNode::new(condition, block));
                }
                "else" => {
                    stream.advance();
                    let else_token = stream.next_token();
                    if matches!(stream.current().kind, TokenKind::Expression(_)) {
                        return Err(Error::syntax(
                            "unexpected expression after 'else'",
                            else_token.line,
                        ));
                    }
                    default = Some(parser.parse_block(stream, &["endif"])?);
                }
                _ => break,
            }
        }

        expect_end_tag(stream, "endif")?;
        Ok(Node::If(IfNode {
            token,
            condition,
            consequence,
            alternatives,
            default,
        }))
    }
}

/// `{% unless %}`: renders its block when the condition is falsy.
#[derive(Debug, Clone)]
pub struct UnlessNode {
    pub token: Token,
    pub condition: Expression,
    pub consequence: BlockNode,
}

impl UnlessNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let value = self
            .condition
            .evaluate(ctx)
            .map_err(|err| err.with_line(self.token.line))?;
        if is_truthy(&value) {
            Ok(Control::Normal)
        } else {
            self.consequence.render(ctx, buffer)
        }
    }
}

pub struct UnlessTag;

impl super::Tag for UnlessTag {
    fn name(&self) -> &'static str {
        "unless"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endunless")
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "unless tag")?;
        let condition = parse_boolean_expression(&body, line)?;
        let consequence = parser.parse_block(stream, &["endunless"])?;
        expect_end_tag(stream, "endunless")?;
        Ok(Node::Unless(UnlessNode {
            token,
            condition,
            consequence,
        }))
    }
}

/// `{% case %}` with `when` branches built as equality conditions against
/// the case subject. The first matching branch renders.
#[derive(Debug, Clone)]
pub struct CaseNode {
    pub token: Token,
    pub whens: Vec<ConditionalBlockNode>,
    pub default: Option<BlockNode>,
}

impl CaseNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        for when in &self.whens {
            if let Some(control) = when.render(ctx, buffer, line)? {
                return Ok(control);
            }
        }
        if let Some(default) = &self.default {
            return default.render(ctx, buffer);
        }
        Ok(Control::Normal)
    }
}

pub struct CaseTag;

impl super::Tag for CaseTag {
    fn name(&self) -> &'static str {
        "case"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endcase")
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "case tag")?;
        let tokens = lex_expression(&body, line, LexMode::Default)?;
        let mut subject_stream = TokenStream::new(tokens);
        let subject = parse_primary(&mut subject_stream)?;
        expect_eof(&subject_stream)?;

        // Anything between `case` and the first `when` is discarded.
        parser.parse_block(stream, &["when", "else", "endcase"])?;

        let mut whens = Vec::new();
        let mut default = None;
        loop {
            let TokenKind::TagName(next) = &stream.peek().kind else {
                break;
            };
            match next.as_str() {
                "when" => {
                    stream.advance();
                    stream.advance();
                    let (body, line) = require_expression(stream, "when tag")?;
                    let values = parse_when_values(&body, line)?;
                    let block = parser.parse_block(stream, &["when", "else", "endcase"])?;
                    for value in values {
                        whens.push(ConditionalBlockNode::new(
                            Expression::Infix {
                                left: Box::new(subject.clone()),
                                operator: InfixOperator::Equal,
                                right: Box::new(value),
                            },
                            block.clone(),
                        ));
                    }
                }
                "else" => {
                    stream.advance();
                    stream.advance();
                    default = Some(parser.parse_block(stream, &["endcase"])?);
                }
                _ => break,
            }
        }

        expect_end_tag(stream, "endcase")?;
        Ok(Node::Case(CaseNode {
            token,
            whens,
            default,
        }))
    }
}

/// Parses the value list of a `when` tag: primaries separated by commas
/// or the `or` keyword.
fn parse_when_values(source: &str, line: usize) -> Result<Vec<Expression>, Error> {
    let tokens = lex_expression(source, line, LexMode::Default)?;
    let mut stream = TokenStream::new(tokens);
    let mut values = vec![parse_primary(&mut stream)?];
    loop {
        match &stream.current().kind {
            TokenKind::Comma | TokenKind::Keyword(Keyword::Or) => {
                stream.advance();
                values.push(parse_primary(&mut stream)?);
            }
            TokenKind::Eof => break,
            other => {
                return Err(Error::syntax(
                    format!("unexpected token in when tag: {other:?}"),
                    stream.current().line,
                ));
            }
        }
    }
    Ok(values)
}

/// `{% break %}`: stops the innermost loop.
#[derive(Debug, Clone)]
pub struct BreakNode {
    pub token: Token,
}

pub struct BreakTag;

impl super::Tag for BreakTag {
    fn name(&self) -> &'static str {
        "break"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        if matches!(stream.current().kind, TokenKind::Expression(_)) {
            return Err(Error::syntax("unexpected expression after 'break'", token.line));
        }
        Ok(Node::Break(BreakNode { token }))
    }
}

/// `{% continue %}`: skips to the next loop iteration.
#[derive(Debug, Clone)]
pub struct ContinueNode {
    pub token: Token,
}

pub struct ContinueTag;

impl super::Tag for ContinueTag {
    fn name(&self) -> &'static str {
        "continue"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        if matches!(stream.current().kind, TokenKind::Expression(_)) {
            return Err(Error::syntax(
                "unexpected expression after 'continue'",
                token.line,
            ));
        }
        Ok(Node::Continue(ContinueNode { token }))
    }
}
