// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::fmt;

use smallvec::SmallVec;

use crate::context::{Context, PathSegment};
use crate::error::Error;
use crate::filters::FilterKwargs;
use crate::value::{
    coerce_i64, compare, is_blank, is_empty, is_truthy, require_defined, Value,
};

/// Ordered path of an identifier. Almost every real-world path has four
/// or fewer segments, so the elements live inline.
pub type IdentifierPath = SmallVec<[PathElement; 4]>;

/// One element of an identifier path: a literal key or index, or a
/// bracketed sub-expression resolved at render time (`a[b.c]`).
#[derive(Debug, Clone, PartialEq)]
pub enum PathElement {
    Key(String),
    Index(i64),
    Nested(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
    And,
    Or,
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            InfixOperator::Equal => "==",
            InfixOperator::NotEqual => "!=",
            InfixOperator::Less => "<",
            InfixOperator::LessOrEqual => "<=",
            InfixOperator::Greater => ">",
            InfixOperator::GreaterOrEqual => ">=",
            InfixOperator::Contains => "contains",
            InfixOperator::And => "and",
            InfixOperator::Or => "or",
        };
        f.write_str(symbol)
    }
}

/// Value-producing expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Nil,
    Empty,
    Blank,
    Continue,
    Boolean(bool),
    StringLiteral(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    RangeLiteral(Box<Expression>, Box<Expression>),
    Identifier(IdentifierPath),
    Prefix {
        operator: PrefixOperator,
        right: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        operator: InfixOperator,
        right: Box<Expression>,
    },
    /// Wraps a condition so its result is the Liquid-truthy projection.
    BooleanExpr(Box<Expression>),
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        let mut path = IdentifierPath::new();
        path.push(PathElement::Key(name.into()));
        Expression::Identifier(path)
    }

    pub fn evaluate(&self, ctx: &mut Context) -> Result<Value, Error> {
        match self {
            Expression::Nil | Expression::Empty | Expression::Blank => Ok(Value::Nil),
            Expression::Continue => Ok(Value::Int(0)),
            Expression::Boolean(flag) => Ok(Value::Bool(*flag)),
            Expression::StringLiteral(text) => Ok(Value::String(text.clone())),
            Expression::IntegerLiteral(value) => Ok(Value::Int(*value)),
            Expression::FloatLiteral(value) => Ok(Value::Float(*value)),
            Expression::RangeLiteral(start, stop) => {
                let start = coerce_i64(&start.evaluate(ctx)?);
                let stop = coerce_i64(&stop.evaluate(ctx)?);
                Ok(Value::Range(start, stop))
            }
            Expression::Identifier(path) => self.evaluate_identifier(path, ctx),
            Expression::Prefix { operator, right } => {
                let value = require_defined(right.evaluate(ctx)?)?;
                match (operator, value) {
                    (PrefixOperator::Minus, Value::Int(i)) => Ok(Value::Int(-i)),
                    (PrefixOperator::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (PrefixOperator::Minus, other) => Err(Error::type_error(format!(
                        "unknown operator -{}",
                        other.type_name()
                    ))),
                }
            }
            Expression::Infix {
                left,
                operator,
                right,
            } => self.evaluate_infix(left, *operator, right, ctx),
            Expression::BooleanExpr(inner) => {
                let value = require_defined(inner.evaluate(ctx)?)?;
                Ok(Value::Bool(is_truthy(&value)))
            }
        }
    }

    fn evaluate_infix(
        &self,
        left: &Expression,
        operator: InfixOperator,
        right: &Expression,
        ctx: &mut Context,
    ) -> Result<Value, Error> {
        match operator {
            InfixOperator::And => {
                let lhs = is_truthy(&require_defined(left.evaluate(ctx)?)?);
                let rhs = is_truthy(&require_defined(right.evaluate(ctx)?)?);
                Ok(Value::Bool(lhs && rhs))
            }
            InfixOperator::Or => {
                let lhs = is_truthy(&require_defined(left.evaluate(ctx)?)?);
                let rhs = is_truthy(&require_defined(right.evaluate(ctx)?)?);
                Ok(Value::Bool(lhs || rhs))
            }
            _ => {
                // `empty` and `blank` compare structure, not values, so
                // they are resolved before their operand is projected.
                if let Some(result) = keyword_compare(left, operator, right, ctx)? {
                    return Ok(result);
                }
                let lhs = require_defined(left.evaluate(ctx)?)?;
                let rhs = require_defined(right.evaluate(ctx)?)?;
                compare(&lhs, &operator, &rhs)
            }
        }
    }

    fn evaluate_identifier(
        &self,
        path: &IdentifierPath,
        ctx: &mut Context,
    ) -> Result<Value, Error> {
        let mut segments: SmallVec<[PathSegment; 4]> = SmallVec::new();
        for element in path {
            match element {
                PathElement::Key(key) => segments.push(PathSegment::Key(key.clone())),
                PathElement::Index(index) => segments.push(PathSegment::Index(*index)),
                PathElement::Nested(expr) => match expr.evaluate(ctx)? {
                    Value::String(key) => segments.push(PathSegment::Key(key)),
                    Value::Int(index) => segments.push(PathSegment::Index(index)),
                    Value::Undefined(undefined) => {
                        undefined.check()?;
                        return Ok(ctx.undefined(&self.to_string()));
                    }
                    other => {
                        return Err(Error::type_error(format!(
                            "cannot index with a {}",
                            other.type_name()
                        )));
                    }
                },
            }
        }
        ctx.get(&segments, &self.to_string())
    }
}

/// Resolves comparisons against the `empty`/`blank` keywords. Returns
/// `None` when neither operand is one of them.
fn keyword_compare(
    left: &Expression,
    operator: InfixOperator,
    right: &Expression,
    ctx: &mut Context,
) -> Result<Option<Value>, Error> {
    let (keyword, operand) = match (left, right) {
        (Expression::Empty | Expression::Blank, Expression::Empty | Expression::Blank) => {
            let same = std::mem::discriminant(left) == std::mem::discriminant(right);
            return match operator {
                InfixOperator::Equal => Ok(Some(Value::Bool(same))),
                InfixOperator::NotEqual => Ok(Some(Value::Bool(!same))),
                _ => Err(Error::type_error("invalid comparison with 'empty'")),
            };
        }
        (Expression::Empty | Expression::Blank, other) => (left, other),
        (other, Expression::Empty | Expression::Blank) => (right, other),
        _ => return Ok(None),
    };

    let value = require_defined(operand.evaluate(ctx)?)?;
    let matched = match keyword {
        Expression::Empty => is_empty(&value),
        _ => is_blank(&value),
    };
    match operator {
        InfixOperator::Equal => Ok(Some(Value::Bool(matched))),
        InfixOperator::NotEqual => Ok(Some(Value::Bool(!matched))),
        _ => Err(Error::type_error(format!(
            "invalid operator '{operator}' for 'empty' or 'blank'"
        ))),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Nil => f.write_str("nil"),
            Expression::Empty => f.write_str("empty"),
            Expression::Blank => f.write_str("blank"),
            Expression::Continue => f.write_str("continue"),
            Expression::Boolean(flag) => write!(f, "{flag}"),
            Expression::StringLiteral(text) => write!(f, "'{text}'"),
            Expression::IntegerLiteral(value) => write!(f, "{value}"),
            Expression::FloatLiteral(value) => write!(f, "{value}"),
            Expression::RangeLiteral(start, stop) => write!(f, "({start}..{stop})"),
            Expression::Identifier(path) => {
                for (index, element) in path.iter().enumerate() {
                    if index > 0 {
                        f.write_str(".")?;
                    }
                    match element {
                        PathElement::Key(key) => f.write_str(key)?,
                        PathElement::Index(i) => write!(f, "{i}")?,
                        PathElement::Nested(expr) => write!(f, "[{expr}]")?,
                    }
                }
                Ok(())
            }
            Expression::Prefix { right, .. } => write!(f, "(-{right})"),
            Expression::Infix {
                left,
                operator,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Expression::BooleanExpr(inner) => write!(f, "{inner}"),
        }
    }
}

/// A single filter application within a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub kwargs: Vec<(String, Expression)>,
}

impl FilterCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: Vec::new(),
        }
    }
}

impl fmt::Display for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        let mut parts: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        parts.extend(self.kwargs.iter().map(|(key, value)| format!("{key}: {value}")));
        if !parts.is_empty() {
            write!(f, ": {}", parts.join(", "))?;
        }
        Ok(())
    }
}

/// The output filters considered HTML-producing for autoescape purposes.
/// When the last applied filter is one of these, the rendered string is
/// written without further escaping.
const MARKUP_SAFE_FILTERS: &[&str] = &["escape", "escape_once", "newline_to_br", "strip_html"];

/// An expression followed by a filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredExpression {
    pub expression: Expression,
    pub filters: Vec<FilterCall>,
}

impl FilteredExpression {
    pub fn new(expression: Expression, filters: Vec<FilterCall>) -> Self {
        Self {
            expression,
            filters,
        }
    }

    /// Whether an autoescaping output statement may trust the result as
    /// already-safe markup.
    pub fn is_markup_safe(&self, autoescape: bool) -> bool {
        if !autoescape {
            return true;
        }
        match self.filters.last() {
            Some(filter) => MARKUP_SAFE_FILTERS.contains(&filter.name.as_str()),
            None => matches!(self.expression, Expression::StringLiteral(_)),
        }
    }

    pub fn evaluate(&self, ctx: &mut Context) -> Result<Value, Error> {
        let mut value = self.expression.evaluate(ctx)?;

        if let Value::Undefined(undefined) = &value {
            // The strict-default policy permits exactly one escape hatch:
            // flowing straight into a `default` filter.
            let into_default = self
                .filters
                .first()
                .is_some_and(|filter| filter.name == "default");
            if !(into_default
                && matches!(
                    undefined.policy,
                    crate::value::UndefinedPolicy::StrictDefault
                ))
            {
                undefined.check()?;
            }
        }

        for filter in &self.filters {
            let Some(func) = ctx.filter(&filter.name) else {
                if ctx.strict_filters() {
                    return Err(Error::unknown_filter(&filter.name));
                }
                continue;
            };

            let mut args = Vec::with_capacity(filter.args.len());
            for arg in &filter.args {
                args.push(arg.evaluate(ctx)?);
            }
            let mut kwargs = FilterKwargs::new();
            for (key, expr) in &filter.kwargs {
                kwargs.insert(key.clone(), expr.evaluate(ctx)?);
            }

            match func(&value, &args, &kwargs) {
                Ok(result) => value = result,
                // A value-typed failure skips this filter only.
                Err(Error::FilterValue { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(value)
    }
}

impl fmt::Display for FilteredExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)?;
        for filter in &self.filters {
            write!(f, " | {filter}")?;
        }
        Ok(())
    }
}

/// The expression region of an `assign` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    pub name: String,
    pub expression: FilteredExpression,
}

impl AssignmentExpression {
    pub fn evaluate(&self, ctx: &mut Context) -> Result<Value, Error> {
        let value = self.expression.evaluate(ctx)?;
        ctx.assign(&self.name, value);
        Ok(Value::Nil)
    }
}

impl fmt::Display for AssignmentExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.expression)
    }
}

/// Offset argument of a loop expression; `continue` resumes from the
/// stop-index left by the previous loop over the same iterable.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOffset {
    Expression(Expression),
    Continue,
}

/// Iteration descriptor shared by the `for` and `tablerow` tags.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopExpression {
    pub name: String,
    pub iterable: Expression,
    pub limit: Option<Expression>,
    pub offset: Option<LoopOffset>,
    pub cols: Option<Expression>,
    pub reversed: bool,
}

impl LoopExpression {
    /// Evaluates the iterable and applies limit/offset/reversed, returning
    /// the concrete items plus the loop length exposed to `forloop`.
    pub fn evaluate(&self, ctx: &mut Context) -> Result<(Vec<Value>, usize), Error> {
        let value = self.iterable.evaluate(ctx)?;
        let mut items = self.expand_iterable(value, ctx)?;
        let size = items.len();

        // Stop indexes are keyed on the loop variable and the iterable's
        // textual form, matching the reference implementation.
        let offset_key = format!("{}-{}", self.name, self.iterable);

        let limit = match &self.limit {
            Some(expr) => {
                let value = expr.evaluate(ctx)?;
                Some(coerce_i64(&value).max(0) as usize)
            }
            None => None,
        };
        let offset = match &self.offset {
            None => None,
            Some(LoopOffset::Continue) => Some(ctx.stop_index(&offset_key)),
            Some(LoopOffset::Expression(expr)) => {
                let value = expr.evaluate(ctx)?;
                Some(coerce_i64(&value).max(0) as usize)
            }
        };

        if limit.is_none() && offset.is_none() {
            ctx.set_stop_index(&offset_key, size);
            if self.reversed {
                items.reverse();
            }
            return Ok((items, size));
        }

        let start = offset.unwrap_or(0);
        let mut length = size.saturating_sub(start);
        if let Some(limit) = limit {
            length = length.min(limit);
        }
        ctx.set_stop_index(&offset_key, start + length);

        let mut window: Vec<Value> = if start >= size {
            Vec::new()
        } else {
            items[start..(start + length).min(size)].to_vec()
        };
        if self.reversed {
            window.reverse();
        }
        Ok((window, length))
    }

    /// Evaluates the `cols` argument for `tablerow`.
    pub fn columns(&self, ctx: &mut Context) -> Result<Option<usize>, Error> {
        match &self.cols {
            Some(expr) => {
                let value = expr.evaluate(ctx)?;
                Ok(Some(coerce_i64(&value).max(1) as usize))
            }
            None => Ok(None),
        }
    }

    fn expand_iterable(&self, value: Value, ctx: &Context) -> Result<Vec<Value>, Error> {
        match value {
            Value::Array(items) => Ok(items),
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| Value::Array(vec![Value::String(key), value]))
                .collect()),
            Value::Range(start, stop) => {
                if start > stop {
                    return Ok(Vec::new());
                }
                let span = (stop as i128) - (start as i128) + 1;
                if let Some(budget) = ctx.remaining_loop_budget() {
                    if span > budget as i128 {
                        return Err(Error::loop_limit(format!(
                            "range ({start}..{stop}) exceeds the loop iteration limit"
                        )));
                    }
                }
                Ok((start..=stop).map(Value::Int).collect())
            }
            Value::Drop(drop) => match drop.to_liquid() {
                Some(projected) => self.expand_iterable(projected, ctx),
                None => Err(Error::type_error(format!(
                    "expected array or hash at '{}', found a drop",
                    self.iterable
                ))),
            },
            Value::Undefined(undefined) => {
                undefined.check()?;
                Ok(Vec::new())
            }
            other => Err(Error::type_error(format!(
                "expected array or hash at '{}', found '{}'",
                self.iterable,
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for LoopExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.name, self.iterable)?;
        if let Some(limit) = &self.limit {
            write!(f, " limit:{limit}")?;
        }
        match &self.offset {
            Some(LoopOffset::Expression(offset)) => write!(f, " offset:{offset}")?,
            Some(LoopOffset::Continue) => write!(f, " offset:continue")?,
            None => {}
        }
        if let Some(cols) = &self.cols {
            write!(f, " cols:{cols}")?;
        }
        if self.reversed {
            write!(f, " reversed")?;
        }
        Ok(())
    }
}
