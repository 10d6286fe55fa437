// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Iteration tags: `for`, `tablerow` and `cycle`.

use crate::ast::{BlockNode, Control, Node};
use crate::context::{forloop_object, tablerowloop_object, Context};
use crate::error::Error;
use crate::expression::{Expression, LoopExpression};
use crate::lexer::{lex_expression, LexMode, Token, TokenKind, TokenStream};
use crate::parser::{
    expect_end_tag, expect_eof, parse_loop_expression, parse_primary, require_expression, Parser,
};
use crate::value::{escape_html, require_defined, to_output_string};

/// `{% for %}` with an optional `{% else %}` branch for empty iterables.
#[derive(Debug, Clone)]
pub struct ForNode {
    pub token: Token,
    pub expression: LoopExpression,
    pub block: BlockNode,
    pub default: Option<BlockNode>,
}

impl ForNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        let (items, length) = self
            .expression
            .evaluate(ctx)
            .map_err(|err| err.with_line(line))?;

        if items.is_empty() {
            if let Some(default) = &self.default {
                default.render(ctx, buffer)?;
            }
            return Ok(Control::Normal);
        }

        let parent = ctx.resolve_name("forloop");
        ctx.push_scope();
        let result = (|| -> Result<(), Error> {
            for (index, item) in items.into_iter().enumerate() {
                ctx.tick_loop().map_err(|err| err.with_line(line))?;
                ctx.set_local(&self.expression.name, item);
                ctx.set_local("forloop", forloop_object(index, length, parent.clone()));
                match self.block.render(ctx, buffer)? {
                    Control::Break => break,
                    Control::Continue | Control::Normal => {}
                }
            }
            Ok(())
        })();
        ctx.pop_scope();
        result?;
        Ok(Control::Normal)
    }
}

pub struct ForTag;

impl super::Tag for ForTag {
    fn name(&self) -> &'static str {
        "for"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endfor")
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "for tag")?;
        let expression = parse_loop_expression(&body, line)?;
        let block = parser.parse_block(stream, &["else", "endfor"])?;

        let mut default = None;
        if let TokenKind::TagName(next) = &stream.peek().kind {
            if next == "else" {
                stream.advance();
                stream.advance();
                default = Some(parser.parse_block(stream, &["endfor"])?);
            }
        }
        expect_end_tag(stream, "endfor")?;
        Ok(Node::For(ForNode {
            token,
            expression,
            block,
            default,
        }))
    }
}

/// `{% tablerow %}`: iterates like `for` while wrapping the cells in
/// `<tr>`/`<td>` markup and exposing a `tablerowloop` drop.
#[derive(Debug, Clone)]
pub struct TableRowNode {
    pub token: Token,
    pub expression: LoopExpression,
    pub block: BlockNode,
}

impl TableRowNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        let (items, length) = self
            .expression
            .evaluate(ctx)
            .map_err(|err| err.with_line(line))?;
        let cols = self
            .expression
            .columns(ctx)
            .map_err(|err| err.with_line(line))?
            .unwrap_or_else(|| length.max(1));

        ctx.push_scope();
        let result = (|| -> Result<(), Error> {
            ctx.write(buffer, "<tr class=\"row1\">\n")?;
            for (index, item) in items.into_iter().enumerate() {
                ctx.tick_loop().map_err(|err| err.with_line(line))?;
                let row = index / cols + 1;
                let col = index % cols + 1;
                if col == 1 && index > 0 {
                    ctx.write(buffer, &format!("</tr>\n<tr class=\"row{row}\">"))?;
                }
                ctx.set_local(&self.expression.name, item);
                ctx.set_local(
                    "tablerowloop",
                    tablerowloop_object(index, length, cols, row),
                );
                ctx.write(buffer, &format!("<td class=\"col{col}\">"))?;
                let control = self.block.render(ctx, buffer)?;
                ctx.write(buffer, "</td>")?;
                if control == Control::Break {
                    break;
                }
            }
            ctx.write(buffer, "</tr>\n")?;
            Ok(())
        })();
        ctx.pop_scope();
        result?;
        Ok(Control::Normal)
    }
}

pub struct TableRowTag;

impl super::Tag for TableRowTag {
    fn name(&self) -> &'static str {
        "tablerow"
    }

    fn end(&self) -> Option<&'static str> {
        Some("endtablerow")
    }

    fn parse(&self, stream: &mut TokenStream, parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "tablerow tag")?;
        let expression = parse_loop_expression(&body, line)?;
        let block = parser.parse_block(stream, &["endtablerow"])?;
        expect_end_tag(stream, "endtablerow")?;
        Ok(Node::TableRow(TableRowNode {
            token,
            expression,
            block,
        }))
    }
}

/// `{% cycle %}`: emits the next value of a rotating group. Counters are
/// keyed per group name and value shape and live for one render.
#[derive(Debug, Clone)]
pub struct CycleNode {
    pub token: Token,
    pub group: Option<Expression>,
    pub args: Vec<Expression>,
}

impl CycleNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        let mut values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            let value = require_defined(arg.evaluate(ctx)?).map_err(|err| err.with_line(line))?;
            values.push(value);
        }

        let group = match &self.group {
            Some(expr) => {
                let value = expr.evaluate(ctx).map_err(|err| err.with_line(line))?;
                to_output_string(&value).map_err(|err| err.with_line(line))?
            }
            None => String::new(),
        };
        let shape: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        let key = format!("{group}:{}", shape.join(","));

        let index = ctx.cycle(&key, values.len());
        let text = to_output_string(&values[index]).map_err(|err| err.with_line(line))?;
        if ctx.autoescape() {
            ctx.write(buffer, &escape_html(&text))?;
        } else {
            ctx.write(buffer, &text)?;
        }
        Ok(Control::Normal)
    }
}

pub struct CycleTag;

impl super::Tag for CycleTag {
    fn name(&self) -> &'static str {
        "cycle"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "cycle tag")?;
        let tokens = lex_expression(&body, line, LexMode::Default)?;
        let mut args_stream = TokenStream::new(tokens);

        let first = parse_primary(&mut args_stream)?;
        let mut group = None;
        let mut args = Vec::new();

        if matches!(args_stream.current().kind, TokenKind::Colon) {
            args_stream.advance();
            group = Some(first);
        } else {
            args.push(first);
            if matches!(args_stream.current().kind, TokenKind::Comma) {
                args_stream.advance();
            } else if !args_stream.is_eof() {
                return Err(Error::syntax(
                    "expected ',' between cycle values",
                    args_stream.current().line,
                ));
            }
        }

        while !args_stream.is_eof() {
            args.push(parse_primary(&mut args_stream)?);
            if matches!(args_stream.current().kind, TokenKind::Comma) {
                args_stream.advance();
            } else {
                break;
            }
        }
        expect_eof(&args_stream)?;

        if args.is_empty() {
            return Err(Error::syntax("cycle tag requires at least one value", line));
        }
        Ok(Node::Cycle(CycleNode { token, group, args }))
    }
}
