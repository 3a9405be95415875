use crate::ast::Expression;
use crate::error::EvaluationError;
use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;
use serde_json::{Number, Value};
use std::sync::LazyLock;

#[derive(Parser)]
#[grammar = "expression/grammar.pest"]
struct ExpressionParser;

/// Longest expression source accepted, in bytes.
pub const MAX_EXPRESSION_LENGTH: usize = 4096;
/// Deepest bracket nesting accepted.
pub const MAX_NESTING_DEPTH: usize = 64;
/// Most operators accepted in one expression. Every operator adds a level to
/// the tree, so this also bounds recursion while building, evaluating and
/// dropping it.
pub const MAX_OPERATOR_COUNT: usize = 256;

// Lowest binding power first.
static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op))
        .op(Op::infix(Rule::eq_op, Assoc::Left)
            | Op::infix(Rule::ne_op, Assoc::Left)
            | Op::infix(Rule::lt_op, Assoc::Left)
            | Op::infix(Rule::le_op, Assoc::Left)
            | Op::infix(Rule::gt_op, Assoc::Left)
            | Op::infix(Rule::ge_op, Assoc::Left)
            | Op::infix(Rule::in_op, Assoc::Left)
            | Op::infix(Rule::not_in_op, Assoc::Left))
        .op(Op::infix(Rule::add_op, Assoc::Left) | Op::infix(Rule::sub_op, Assoc::Left))
        .op(Op::infix(Rule::mul_op, Assoc::Left)
            | Op::infix(Rule::div_op, Assoc::Left)
            | Op::infix(Rule::floordiv_op, Assoc::Left)
            | Op::infix(Rule::mod_op, Assoc::Left))
        .op(Op::prefix(Rule::neg_op) | Op::prefix(Rule::pos_op))
        .op(Op::infix(Rule::pow_op, Assoc::Right))
        .op(Op::postfix(Rule::attribute) | Op::postfix(Rule::index) | Op::postfix(Rule::call))
});

/// Parses expression source text into an AST.
///
/// Only syntax is checked here. Disallowed constructs that are syntactically
/// valid (calls, dunder attributes) are rejected by the engine.
pub fn parse(source: &str) -> Result<Expression, EvaluationError> {
    check_limits(source)?;

    let mut pairs = ExpressionParser::parse(Rule::expression, source).map_err(|e| {
        let position = match e.location {
            InputLocation::Pos(p) => p,
            InputLocation::Span((start, _)) => start,
        };
        invalid(
            source,
            format!("{} at position {}", e.variant.message(), position),
        )
    })?;

    let expr = pairs
        .next()
        .and_then(|expression| expression.into_inner().next())
        .ok_or_else(|| invalid(source, "empty expression"))?;
    check_operator_count(&expr, source)?;
    build_expr(expr.into_inner(), source)
}

fn check_limits(source: &str) -> Result<(), EvaluationError> {
    if source.len() > MAX_EXPRESSION_LENGTH {
        return Err(invalid(
            source,
            format!("expression exceeds {} bytes", MAX_EXPRESSION_LENGTH),
        ));
    }

    let mut depth = 0usize;
    for c in source.chars() {
        match c {
            '(' | '[' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(invalid(
                        source,
                        format!("nesting deeper than {} levels", MAX_NESTING_DEPTH),
                    ));
                }
            }
            ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn check_operator_count(expr: &Pair<'_, Rule>, source: &str) -> Result<(), EvaluationError> {
    let operators = expr
        .clone()
        .into_inner()
        .flatten()
        .filter(|pair| is_operator(pair.as_rule()))
        .count();
    if operators > MAX_OPERATOR_COUNT {
        return Err(invalid(
            source,
            format!(
                "{} operators exceed the limit of {}",
                operators, MAX_OPERATOR_COUNT
            ),
        ));
    }
    Ok(())
}

fn is_operator(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::or_op
            | Rule::and_op
            | Rule::in_op
            | Rule::not_in_op
            | Rule::eq_op
            | Rule::ne_op
            | Rule::le_op
            | Rule::ge_op
            | Rule::lt_op
            | Rule::gt_op
            | Rule::add_op
            | Rule::sub_op
            | Rule::pow_op
            | Rule::mul_op
            | Rule::floordiv_op
            | Rule::div_op
            | Rule::mod_op
            | Rule::not_op
            | Rule::neg_op
            | Rule::pos_op
            | Rule::attribute
            | Rule::index
            | Rule::call
    )
}

fn build_expr(pairs: Pairs<'_, Rule>, source: &str) -> Result<Expression, EvaluationError> {
    PRATT
        .map_primary(|primary| build_primary(primary, source))
        .map_prefix(|op, rhs| {
            let rhs = Box::new(rhs?);
            match op.as_rule() {
                Rule::not_op => Ok(Expression::Not(rhs)),
                Rule::neg_op => Ok(Expression::Negate(rhs)),
                Rule::pos_op => Ok(Expression::Positive(rhs)),
                rule => Err(unexpected(source, rule)),
            }
        })
        .map_postfix(|lhs, op| {
            let lhs = Box::new(lhs?);
            match op.as_rule() {
                Rule::attribute => {
                    let name = op
                        .into_inner()
                        .next()
                        .map(|p| p.as_str().to_string())
                        .ok_or_else(|| invalid(source, "attribute access without a name"))?;
                    Ok(Expression::Attribute(lhs, name))
                }
                Rule::index => {
                    let inner = op
                        .into_inner()
                        .next()
                        .ok_or_else(|| invalid(source, "empty subscript"))?;
                    let index = build_expr(inner.into_inner(), source)?;
                    Ok(Expression::Index(lhs, Box::new(index)))
                }
                Rule::call => {
                    let args = op
                        .into_inner()
                        .map(|arg| build_expr(arg.into_inner(), source))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Expression::Call(lhs, args))
                }
                rule => Err(unexpected(source, rule)),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let (l, r) = (Box::new(lhs?), Box::new(rhs?));
            match op.as_rule() {
                Rule::or_op => Ok(Expression::Or(l, r)),
                Rule::and_op => Ok(Expression::And(l, r)),
                Rule::eq_op => Ok(Expression::Equal(l, r)),
                Rule::ne_op => Ok(Expression::NotEqual(l, r)),
                Rule::lt_op => Ok(Expression::SmallerThan(l, r)),
                Rule::le_op => Ok(Expression::SmallerThanOrEqual(l, r)),
                Rule::gt_op => Ok(Expression::GreaterThan(l, r)),
                Rule::ge_op => Ok(Expression::GreaterThanOrEqual(l, r)),
                Rule::in_op => Ok(Expression::In(l, r)),
                Rule::not_in_op => Ok(Expression::NotIn(l, r)),
                Rule::add_op => Ok(Expression::Sum(l, r)),
                Rule::sub_op => Ok(Expression::Subtract(l, r)),
                Rule::mul_op => Ok(Expression::Multiply(l, r)),
                Rule::div_op => Ok(Expression::Divide(l, r)),
                Rule::floordiv_op => Ok(Expression::FloorDivide(l, r)),
                Rule::mod_op => Ok(Expression::Modulo(l, r)),
                Rule::pow_op => Ok(Expression::Power(l, r)),
                rule => Err(unexpected(source, rule)),
            }
        })
        .parse(pairs)
}

fn build_primary(pair: Pair<'_, Rule>, source: &str) -> Result<Expression, EvaluationError> {
    match pair.as_rule() {
        Rule::integer => pair
            .as_str()
            .parse::<i64>()
            .map(Expression::literal)
            .map_err(|_| {
                invalid(
                    source,
                    format!("integer literal '{}' is out of range", pair.as_str()),
                )
            }),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(|n| Expression::Literal(Value::Number(n)))
            .ok_or_else(|| {
                invalid(
                    source,
                    format!("float literal '{}' is not representable", pair.as_str()),
                )
            }),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expression::Literal(Value::String(unescape(raw))))
        }
        Rule::true_lit => Ok(Expression::literal(true)),
        Rule::false_lit => Ok(Expression::literal(false)),
        Rule::none_lit => Ok(Expression::Literal(Value::Null)),
        Rule::identifier => Ok(Expression::name(pair.as_str())),
        Rule::list => pair
            .into_inner()
            .map(|item| build_expr(item.into_inner(), source))
            .collect::<Result<Vec<_>, _>>()
            .map(Expression::List),
        Rule::expr => build_expr(pair.into_inner(), source),
        rule => Err(unexpected(source, rule)),
    }
}

/// Resolves backslash escapes. Unknown escapes are kept verbatim.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn invalid(source: &str, message: impl Into<String>) -> EvaluationError {
    EvaluationError::InvalidExpression {
        expression: source.to_string(),
        message: message.into(),
    }
}

fn unexpected(source: &str, rule: Rule) -> EvaluationError {
    invalid(source, format!("unexpected token {:?}", rule))
}
