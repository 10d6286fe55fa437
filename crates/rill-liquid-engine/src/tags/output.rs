// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Output-adjacent tags: `echo`, `liquid`, `raw` and `comment`.

use crate::ast::{render_output, BlockNode, Control, Node};
use crate::context::Context;
use crate::error::Error;
use crate::expression::{Expression, FilteredExpression};
use crate::lexer::{Token, TokenKind, TokenStream};
use crate::parser::{expect_end_tag, parse_filtered_expression, take_expression, Parser};

/// `{% echo expression %}`: an output statement usable inside `liquid`
/// tag sequences.
#[derive(Debug, Clone)]
pub struct EchoNode {
    pub token: Token,
    pub expression: FilteredExpression,
}

impl EchoNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        render_output(&self.expression, &self.token, ctx, buffer)
    }
}

pub struct EchoTag;

impl super::Tag for EchoTag {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let expression = match take_expression(stream) {
            Some((body, line)) => parse_filtered_expression(&body, line)?,
            None => FilteredExpression::new(Expression::Nil, Vec::new()),
        };
        Ok(Node::Echo(EchoNode { token, expression }))
    }
}

/// `{% liquid %}`: a line-oriented sequence of tags without `{% %}`
/// delimiters. Each non-blank line opens a tag; block tags span lines
/// until their end line.
#[derive(Debug, Clone)]
pub struct LiquidNode {
    pub token: Token,
    pub block: BlockNode,
}

impl LiquidNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        self.block.render(ctx, buffer)
    }
}

pub struct LiquidTag;

impl super::Tag for LiquidTag {
    fn name(&self) -> &'static str {
        "liquid"
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let block = match take_expression(stream) {
            Some((body, line)) => {
                let tokens = tokenize_lines(&body, line)?;
                let mut inner = TokenStream::new(tokens);
                parser.parse_block(&mut inner, &[])?
            }
            None => BlockNode::default(),
        };
        Ok(Node::Liquid(LiquidNode { token, block }))
    }
}

/// Re-tokenizes the body of a `liquid` tag: each non-blank line becomes
/// `TagStart` + `TagName` (+ `Expression`), after which the ordinary tag
/// parsers take over.
fn tokenize_lines(body: &str, base_line: usize) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    for (offset, raw_line) in body.lines().enumerate() {
        let line = base_line + offset;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let name_len = trimmed
            .char_indices()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '_')
            .map_or(trimmed.len(), |(index, _)| index);
        if name_len == 0 {
            return Err(Error::syntax("expected a tag name", line));
        }
        tokens.push(Token::new(TokenKind::TagStart, line));
        tokens.push(Token::new(
            TokenKind::TagName(trimmed[..name_len].to_string()),
            line,
        ));
        let rest = trimmed[name_len..].trim();
        if !rest.is_empty() {
            tokens.push(Token::new(TokenKind::Expression(rest.to_string()), line));
        }
    }
    Ok(tokens)
}

/// `{% raw %}...{% endraw %}`: the body is emitted verbatim. The lexer
/// already collapsed the body into a single literal token.
#[derive(Debug, Clone)]
pub struct RawNode {
    pub token: Token,
    pub text: String,
}

impl RawNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        ctx.write(buffer, &self.text)?;
        Ok(Control::Normal)
    }
}

pub struct RawTag;

impl super::Tag for RawTag {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endraw")
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let text = if let TokenKind::Literal(text) = &stream.current().kind {
            let text = text.clone();
            stream.advance();
            text
        } else {
            String::new()
        };
        expect_end_tag(stream, "endraw")?;
        Ok(Node::Raw(RawNode { token, text }))
    }
}

/// `{% comment %}...{% endcomment %}`: the enclosed tokens are consumed
/// and dropped without being parsed as tags.
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub token: Token,
}

pub struct CommentTag;

impl super::Tag for CommentTag {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endcomment")
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        if matches!(stream.current().kind, TokenKind::Expression(_)) {
            stream.advance();
        }
        loop {
            match &stream.current().kind {
                TokenKind::Eof => {
                    return Err(Error::syntax("comment tag never closed", token.line));
                }
                TokenKind::TagStart => {
                    if matches!(&stream.peek().kind, TokenKind::TagName(name) if name == "endcomment")
                    {
                        stream.advance();
                        stream.advance();
                        break;
                    }
                    stream.advance();
                }
                _ => stream.advance(),
            }
        }
        Ok(Node::Comment(CommentNode { token }))
    }
}
