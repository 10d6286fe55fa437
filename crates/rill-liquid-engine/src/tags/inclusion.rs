// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Template inclusion tags.
//!
//! `include` shares the caller's scope chain; `render` evaluates the
//! partial in a fresh, isolated context holding only the explicitly
//! passed parameters, with `include` disabled inside it.

use crate::ast::{Control, Node};
use crate::context::{forloop_object, Context};
use crate::error::Error;
use crate::expression::Expression;
use crate::lexer::{lex_expression, Keyword, LexMode, Token, TokenKind, TokenStream};
use crate::parser::{parse_primary, require_expression, Parser};
use crate::value::{require_defined, to_output_string, Object, Value};

/// How a single value is bound into the partial's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    /// `with expr (as name)?` — bind one value.
    With,
    /// `for expr (as name)?` — render once per element with a `forloop`.
    For,
}

#[derive(Debug, Clone)]
pub struct IncludeBinding {
    pub kind: BindKind,
    pub value: Expression,
    pub alias: Option<String>,
}

/// `{% include "name" %}` with optional binding and keyword arguments.
#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub token: Token,
    pub name: Expression,
    pub binding: Option<IncludeBinding>,
    pub kwargs: Vec<(String, Expression)>,
}

impl IncludeNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        let name_value = require_defined(self.name.evaluate(ctx)?)
            .map_err(|err| err.with_line(line))?;
        let name = to_output_string(&name_value).map_err(|err| err.with_line(line))?;
        let template = ctx.get_template(&name).map_err(|err| err.with_line(line))?;

        ctx.enter_partial().map_err(|err| err.with_line(line))?;
        ctx.push_scope();
        let result = (|| -> Result<(), Error> {
            for (key, expr) in &self.kwargs {
                let value = expr.evaluate(ctx)?;
                ctx.set_local(key, value);
            }
            match &self.binding {
                None => template.tree().render(ctx, buffer)?,
                Some(binding) => {
                    let alias = binding
                        .alias
                        .clone()
                        .unwrap_or_else(|| template_stem(&name));
                    let value = binding.value.evaluate(ctx)?;
                    match (binding.kind, value) {
                        (BindKind::For, Value::Array(items)) => {
                            let length = items.len();
                            for (index, item) in items.into_iter().enumerate() {
                                ctx.tick_loop()?;
                                ctx.set_local(&alias, item);
                                ctx.set_local("forloop", forloop_object(index, length, None));
                                template.tree().render(ctx, buffer)?;
                            }
                        }
                        (_, value) => {
                            ctx.set_local(&alias, value);
                            template.tree().render(ctx, buffer)?;
                        }
                    }
                }
            }
            Ok(())
        })();
        ctx.pop_scope();
        ctx.leave_partial();
        result.map_err(|err| err.with_line(line))?;
        Ok(Control::Normal)
    }
}

pub struct IncludeTag;

impl super::Tag for IncludeTag {
    fn name(&self) -> &'static str {
        "include"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "include tag")?;
        let (name, binding, kwargs) = parse_inclusion_args(&body, line)?;
        Ok(Node::Include(IncludeNode {
            token,
            name,
            binding,
            kwargs,
        }))
    }
}

/// `{% render "name" %}`: isolated-scope inclusion. The template name
/// must be a string literal so renders are statically analysable.
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub token: Token,
    pub name: String,
    pub binding: Option<IncludeBinding>,
    pub kwargs: Vec<(String, Expression)>,
}

impl RenderNode {
    pub(crate) fn render(&self, ctx: &mut Context, buffer: &mut String) -> Result<Control, Error> {
        let line = self.token.line;
        let template = ctx
            .get_template(&self.name)
            .map_err(|err| err.with_line(line))?;
        ctx.enter_partial().map_err(|err| err.with_line(line))?;

        let result = (|| -> Result<(), Error> {
            let mut namespace = Object::new();
            for (key, expr) in &self.kwargs {
                namespace.insert(key.clone(), expr.evaluate(ctx)?);
            }

            match &self.binding {
                None => {
                    let mut sub = ctx.spawn_isolated(namespace);
                    let rendered = template.tree().render(&mut sub, buffer);
                    ctx.absorb(sub);
                    rendered?;
                }
                Some(binding) => {
                    let alias = binding
                        .alias
                        .clone()
                        .unwrap_or_else(|| template_stem(&self.name));
                    let value = binding.value.evaluate(ctx)?;
                    match (binding.kind, value) {
                        (BindKind::For, Value::Array(items)) => {
                            let length = items.len();
                            for (index, item) in items.into_iter().enumerate() {
                                ctx.tick_loop()?;
                                let mut scope = namespace.clone();
                                scope.insert(alias.clone(), item);
                                scope.insert(
                                    "forloop".to_string(),
                                    forloop_object(index, length, None),
                                );
                                let mut sub = ctx.spawn_isolated(scope);
                                let rendered = template.tree().render(&mut sub, buffer);
                                ctx.absorb(sub);
                                rendered?;
                            }
                        }
                        (_, value) => {
                            let mut scope = namespace;
                            scope.insert(alias, value);
                            let mut sub = ctx.spawn_isolated(scope);
                            let rendered = template.tree().render(&mut sub, buffer);
                            ctx.absorb(sub);
                            rendered?;
                        }
                    }
                }
            }
            Ok(())
        })();

        ctx.leave_partial();
        result.map_err(|err| err.with_line(line))?;
        Ok(Control::Normal)
    }
}

pub struct RenderTag;

impl super::Tag for RenderTag {
    fn name(&self) -> &'static str {
        "render"
    }

    fn parse(&self, stream: &mut TokenStream, _parser: &mut Parser<'_>) -> Result<Node, Error> {
        let token = stream.next_token();
        let (body, line) = require_expression(stream, "render tag")?;
        let (name, binding, kwargs) = parse_inclusion_args(&body, line)?;
        let Expression::StringLiteral(name) = name else {
            return Err(Error::syntax(
                "render requires a string literal template name",
                line,
            ));
        };
        Ok(Node::Render(RenderNode {
            token,
            name,
            binding,
            kwargs,
        }))
    }
}

type InclusionArgs = (Expression, Option<IncludeBinding>, Vec<(String, Expression)>);

/// Parses `"name" (with|for expr (as alias)?)? (, key: value)*`.
fn parse_inclusion_args(source: &str, line: usize) -> Result<InclusionArgs, Error> {
    let tokens = lex_expression(source, line, LexMode::Inclusion)?;
    let mut stream = TokenStream::new(tokens);

    let name = parse_primary(&mut stream)?;

    let binding = match &stream.current().kind {
        TokenKind::Keyword(Keyword::With) => {
            stream.advance();
            Some(parse_binding(&mut stream, BindKind::With)?)
        }
        TokenKind::Keyword(Keyword::For) => {
            stream.advance();
            Some(parse_binding(&mut stream, BindKind::For)?)
        }
        _ => None,
    };

    let mut kwargs = Vec::new();
    loop {
        match &stream.current().kind {
            TokenKind::Eof => break,
            TokenKind::Comma => stream.advance(),
            TokenKind::Identifier(key) => {
                let key = key.clone();
                stream.advance();
                crate::parser::expect_kind(&mut stream, &TokenKind::Colon, "':'")?;
                let value = parse_primary(&mut stream)?;
                kwargs.push((key, value));
            }
            other => {
                return Err(Error::syntax(
                    format!("unexpected token in template arguments: {other:?}"),
                    stream.current().line,
                ));
            }
        }
    }

    Ok((name, binding, kwargs))
}

fn parse_binding(stream: &mut TokenStream, kind: BindKind) -> Result<IncludeBinding, Error> {
    let value = parse_primary(stream)?;
    let alias = if matches!(stream.current().kind, TokenKind::Keyword(Keyword::As)) {
        stream.advance();
        let token = stream.next_token();
        let TokenKind::Identifier(alias) = &token.kind else {
            return Err(Error::syntax("expected a name after 'as'", token.line));
        };
        Some(alias.clone())
    } else {
        None
    };
    Ok(IncludeBinding { kind, value, alias })
}

/// Default binding name for `with`/`for` without `as`: the template's
/// base name without directories or extension.
fn template_stem(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_stem_strips_directories_and_extensions() {
        assert_eq!(template_stem("product.html"), "product");
        assert_eq!(template_stem("partials/card.liquid"), "card");
        assert_eq!(template_stem("plain"), "plain");
    }

    #[test]
    fn parses_with_binding_and_kwargs() {
        let (name, binding, kwargs) =
            parse_inclusion_args("'card' with user as person, title: 'hi'", 1).unwrap();
        assert_eq!(name, Expression::StringLiteral("card".into()));
        let binding = binding.unwrap();
        assert_eq!(binding.kind, BindKind::With);
        assert_eq!(binding.alias.as_deref(), Some("person"));
        assert_eq!(kwargs.len(), 1);
        assert_eq!(kwargs[0].0, "title");
    }

    #[test]
    fn parses_for_binding_without_alias() {
        let (_, binding, _) = parse_inclusion_args("'row' for items", 1).unwrap();
        let binding = binding.unwrap();
        assert_eq!(binding.kind, BindKind::For);
        assert!(binding.alias.is_none());
    }
}
