// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Assignment tags: `assign`, `capture`, `increment` and `decrement`.

use crate::ast::{BlockNode, Control, Node};
use crate::context::Context;
use crate::error::Error;
use crate::expression::AssignmentExpression;
use crate::lexer::{lex_expression, LexMode, Token, TokenKind, TokenStream};
use crate::parser::{
    expect_end_tag, expect_eof, parse_assignment_expression, require_expression, Parser,
};
use crate::value::Value;

/// `{% assign name = expression | filters %}`. The result is stored in
/// the render-global scope, so an assign inside a loop body survives the
/// loop.
#[derive(Debug, Clone)]
pub struct AssignNode {
    pub token: Token,
    pub expression: AssignmentExpression,
}

impl AssignNode {
    pub(crate) fn render(&self, ctx: &mut Context, _buffer: &mut String) -> Result<Control, Error> {
        self.expression
            .evaluate(ctx)
            .map_err(|err| err.with_line(self.token.line))?;
        Ok(Control::Normal)
    }
}

pub struct AssignTag;

impl super::Tag for AssignTag {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "assign tag")?;
        let expression = parse_assignment_expression(&body, line)?;
        Ok(Node::Assign(AssignNode { token, expression }))
    }
}

/// `{% capture name %}...{% endcapture %}`: renders its block into a
/// string and assigns it.
#[derive(Debug, Clone)]
pub struct CaptureNode {
    pub token: Token,
    pub name: String,
    pub block: BlockNode,
}

impl CaptureNode {
    pub(crate) fn render(&self, ctx: &mut Context, _buffer: &mut String) -> Result<Control, Error> {
        let mut captured = String::new();
        let control = self.block.render(ctx, &mut captured)?;
        ctx.assign(&self.name, Value::String(captured));
        Ok(control)
    }
}

pub struct CaptureTag;

impl super::Tag for CaptureTag {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endcapture")
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "capture tag")?;
        let name = parse_counter_name(&body, line)?;
        let block = parser.parse_block(stream, &["endcapture"])?;
        expect_end_tag(stream, "endcapture")?;
        Ok(Node::Capture(CaptureNode { token, name, block }))
    }
}

/// `{% increment name %}`: writes the pre-increment counter value,
/// starting at zero. Counters are independent of `assign` variables.
#[derive(Debug, Clone)]
pub struct IncrementNode {
    pub token: Token,
    pub name: String,
}

impl IncrementNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let value = ctx.increment(&self.name);
        ctx.write(buffer, &value.to_string())?;
        Ok(Control::Normal)
    }
}

pub struct IncrementTag;

impl super::Tag for IncrementTag {
    fn name(&self) -> &'static str {
        "increment"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "increment tag")?;
        let name = parse_counter_name(&body, line)?;
        Ok(Node::Increment(IncrementNode { token, name }))
    }
}

/// `{% decrement name %}`: writes the post-decrement counter value, so
/// the first call yields -1. Shares its counters with `increment`.
#[derive(Debug, Clone)]
pub struct DecrementNode {
    pub token: Token,
    pub name: String,
}

impl DecrementNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let value = ctx.decrement(&self.name);
        ctx.write(buffer, &value.to_string())?;
        Ok(Control::Normal)
    }
}

pub struct DecrementTag;

impl super::Tag for DecrementTag {
    fn name(&self) -> &'static str {
        "decrement"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "decrement tag")?;
        let name = parse_counter_name(&body, line)?;
        Ok(Node::Decrement(DecrementNode { token, name }))
    }
}

/// Parses a bare identifier used as a capture or counter name.
fn parse_counter_name(source: &str, line: usize) -> Result<String, Error> {
    let tokens = lex_expression(source, line, LexMode::Default)?;
    let mut stream = TokenStream::new(tokens);
    let token = stream.next_token();
    let TokenKind::Identifier(name) = &token.kind else {
        return Err(Error::syntax("expected a variable name", token.line));
    };
    let name = name.clone();
    expect_eof(&stream)?;
    Ok(name)
}
