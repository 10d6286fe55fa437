// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt;

use crate::context::Context;
use crate::environment::Mode;
use crate::error::Error;
use crate::expression::{Expression, FilteredExpression};
use crate::lexer::{Token, TokenKind};
use crate::tags::assignment::{AssignNode, CaptureNode, DecrementNode, IncrementNode};
use crate::tags::control::{BreakNode, CaseNode, ContinueNode, IfNode, UnlessNode};
use crate::tags::inclusion::{IncludeNode, RenderNode};
use crate::tags::iteration::{CycleNode, ForNode, TableRowNode};
use crate::tags::output::{CommentNode, EchoNode, LiquidNode, RawNode};
use crate::value::{escape_html, is_truthy, to_output_string};

/// Result of rendering a node. `Break` and `Continue` are sentinels
/// raised by the loop-interrupt tags and consumed one frame up by the
/// loop driver; they are not user-visible errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Normal,
    Break,
    Continue,
}

/// The root of a parsed template.
#[derive(Debug, Clone, Default)]
pub struct ParseTree {
    pub statements: Vec<Node>,
}

impl ParseTree {
    /// Renders every top-level statement, applying the environment's
    /// error-mode policy: strict aborts on the first error, warn records
    /// recoverable errors and continues, lax absorbs them silently.
    pub fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<(), Error> {
        for statement in &self.statements {
            match statement.render(ctx, buffer) {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => match ctx.mode() {
                    Mode::Strict => return Err(err),
                    Mode::Warn => ctx.warn(err),
                    Mode::Lax => {}
                },
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Statement-level nodes recognised by the parser.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Node {
    Literal(LiteralNode),
    Statement(StatementNode),
    Illegal(IllegalNode),
    If(IfNode),
    Unless(UnlessNode),
    Case(CaseNode),
    For(ForNode),
    TableRow(TableRowNode),
    Cycle(CycleNode),
    Assign(AssignNode),
    Capture(CaptureNode),
    Increment(IncrementNode),
    Decrement(DecrementNode),
    Include(IncludeNode),
    Render(RenderNode),
    Echo(EchoNode),
    Liquid(LiquidNode),
    Raw(RawNode),
    Comment(CommentNode),
    Break(BreakNode),
    Continue(ContinueNode),
}

impl Node {
    /// The token that started this node.
    pub fn token(&self) -> &Token {
        match self {
            Node::Literal(node) => &node.token,
            Node::Statement(node) => &node.token,
            Node::Illegal(node) => &node.token,
            Node::If(node) => &node.token,
            Node::Unless(node) => &node.token,
            Node::Case(node) => &node.token,
            Node::For(node) => &node.token,
            Node::TableRow(node) => &node.token,
            Node::Cycle(node) => &node.token,
            Node::Assign(node) => &node.token,
            Node::Capture(node) => &node.token,
            Node::Increment(node) => &node.token,
            Node::Decrement(node) => &node.token,
            Node::Include(node) => &node.token,
            Node::Render(node) => &node.token,
            Node::Echo(node) => &node.token,
            Node::Liquid(node) => &node.token,
            Node::Raw(node) => &node.token,
            Node::Comment(node) => &node.token,
            Node::Break(node) => &node.token,
            Node::Continue(node) => &node.token,
        }
    }

    /// Checks the disabled-tag set before delegating to the node's own
    /// render logic.
    pub fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        self.check_disabled(ctx)?;
        match self {
            Node::Literal(node) => node.render(ctx, buffer),
            Node::Statement(node) => node.render(ctx, buffer),
            Node::Illegal(_) | Node::Comment(_) => Ok(Control::Normal),
            Node::If(node) => node.render(ctx, buffer),
            Node::Unless(node) => node.render(ctx, buffer),
            Node::Case(node) => node.render(ctx, buffer),
            Node::For(node) => node.render(ctx, buffer),
            Node::TableRow(node) => node.render(ctx, buffer),
            Node::Cycle(node) => node.render(ctx, buffer),
            Node::Assign(node) => node.render(ctx, buffer),
            Node::Capture(node) => node.render(ctx, buffer),
            Node::Increment(node) => node.render(ctx, buffer),
            Node::Decrement(node) => node.render(ctx, buffer),
            Node::Include(node) => node.render(ctx, buffer),
            Node::Render(node) => node.render(ctx, buffer),
            Node::Echo(node) => node.render(ctx, buffer),
            Node::Liquid(node) => node.render(ctx, buffer),
            Node::Raw(node) => node.render(ctx, buffer),
            Node::Break(_) => Ok(Control::Break),
            Node::Continue(_) => Ok(Control::Continue),
        }
    }

    /// Child statement nodes, exposed for template analyzers.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::If(node) => {
                let mut children: Vec<&Node> = node.consequence.statements.iter().collect();
                for alternative in &node.alternatives {
                    children.extend(alternative.block.statements.iter());
                }
                if let Some(default) = &node.default {
                    children.extend(default.statements.iter());
                }
                children
            }
            Node::Unless(node) => node.consequence.statements.iter().collect(),
            Node::Case(node) => {
                let mut children: Vec<&Node> = Vec::new();
                for when in &node.whens {
                    children.extend(when.block.statements.iter());
                }
                if let Some(default) = &node.default {
                    children.extend(default.statements.iter());
                }
                children
            }
            Node::For(node) => {
                let mut children: Vec<&Node> = node.block.statements.iter().collect();
                if let Some(default) = &node.default {
                    children.extend(default.statements.iter());
                }
                children
            }
            Node::TableRow(node) => node.block.statements.iter().collect(),
            Node::Capture(node) => node.block.statements.iter().collect(),
            Node::Liquid(node) => node.block.statements.iter().collect(),
            _ => Vec::new(),
        }
    }

    fn check_disabled(&self, ctx: &Context) -> Result<(), Error> {
        let token = self.token();
        if let TokenKind::TagName(name) = &token.kind {
            if ctx.tag_disabled(name) {
                return Err(Error::disabled_tag(name.clone(), token.line));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(node) => write!(f, "Literal({:?})", node.text),
            Node::Statement(node) => write!(f, "Statement({})", node.expression),
            Node::Illegal(_) => f.write_str("Illegal"),
            other => {
                if let TokenKind::TagName(name) = &other.token().kind {
                    write!(f, "Tag({name})")
                } else {
                    f.write_str("Node")
                }
            }
        }
    }
}

/// Raw template text, written verbatim.
#[derive(Debug, Clone)]
pub struct LiteralNode {
    pub token: Token,
    pub text: String,
}

impl LiteralNode {
    pub fn new(token: Token, text: impl Into<String>) -> Self {
        Self {
            token,
            text: text.into(),
        }
    }

    fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        ctx.write(buffer, &self.text)?;
        Ok(Control::Normal)
    }
}

/// An output statement: `{{ expression | filters }}`.
#[derive(Debug, Clone)]
pub struct StatementNode {
    pub token: Token,
    pub expression: FilteredExpression,
}

impl StatementNode {
    pub fn new(token: Token, expression: FilteredExpression) -> Self {
        Self { token, expression }
    }

    fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        render_output(&self.expression, &self.token, ctx, buffer)
    }
}

/// Shared by `{{ ... }}` statements and the `echo` tag: evaluates the
/// pipeline, coerces to text and applies the autoescape policy.
pub(crate) fn render_output(
    expression: &FilteredExpression,
    token: &Token,
    ctx: &mut Context,
    buffer: &mut String,
) -> Result<Control, Error> {
    let line = token.line;
    let value = expression
        .evaluate(ctx)
        .map_err(|err| err.with_line(line))?;
    let text = to_output_string(&value).map_err(|err| err.with_line(line))?;
    if expression.is_markup_safe(ctx.autoescape()) {
        ctx.write(buffer, &text)?;
    } else {
        ctx.write(buffer, &escape_html(&text))?;
    }
    Ok(Control::Normal)
}

/// Placeholder for an unrecognised tag kept under warn or lax mode.
#[derive(Debug, Clone)]
pub struct IllegalNode {
    pub token: Token,
}

impl IllegalNode {
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

/// A sequence of statements rendered through an intermediate buffer.
///
/// A block whose rendered output is whitespace-only writes nothing to the
/// parent buffer; this suppresses blank tag blocks. When a statement
/// inside the block fails, any non-whitespace prefix is flushed before
/// the error propagates so warn/lax callers keep the partial output.
#[derive(Debug, Clone, Default)]
pub struct BlockNode {
    pub statements: Vec<Node>,
}

impl BlockNode {
    pub fn new(statements: Vec<Node>) -> Self {
        Self { statements }
    }

    pub fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let mut intermediate = String::new();
        let mut control = Control::Normal;
        let mut failure: Option<Error> = None;

        for statement in &self.statements {
            match statement.render(ctx, &mut intermediate) {
                Ok(Control::Normal) => {}
                Ok(interrupt) => {
                    control = interrupt;
                    break;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if !intermediate.trim().is_empty() {
            ctx.write(buffer, &intermediate)?;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(control),
        }
    }
}

/// A condition paired with a block; reports whether it fired so parents
/// can chain `elsif`/`when` branches.
#[derive(Debug, Clone)]
pub struct ConditionalBlockNode {
    pub condition: Expression,
    pub block: BlockNode,
}

impl ConditionalBlockNode {
    pub fn new(condition: Expression, block: BlockNode) -> Self {
        Self { condition, block }
    }

    /// `Some(control)` when the condition fired and the block rendered.
    pub fn render(
        &self,
        ctx: &mut Context,
        buffer: &mut String,
        line: usize,
    ) -> Result<Option<Control>, Error> {
        let value = self
            .condition
            .evaluate(ctx)
            .map_err(|err| err.with_line(line))?;
        if is_truthy(&value) {
            Ok(Some(self.block.render(ctx, buffer)?))
        } else {
            Ok(None)
        }
    }
}
