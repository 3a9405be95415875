use serde_json::Value;
use std::fmt;

/// The Abstract Syntax Tree of a workflow expression.
///
/// Trees come from two places: the text parser (`crate::expression::parser`) and
/// the branch compiler, which builds them directly from declarative comparisons.
/// `IsEmpty`, `StartsWith` and `EndsWith` have no surface syntax and are only
/// produced by the branch compiler. `Call` is parsed so the engine can reject it.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // Arithmetic
    Sum(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    FloorDivide(Box<Expression>, Box<Expression>),
    Modulo(Box<Expression>, Box<Expression>),
    Power(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
    Positive(Box<Expression>),

    // Logical
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),

    // Comparison
    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    SmallerThan(Box<Expression>, Box<Expression>),
    SmallerThanOrEqual(Box<Expression>, Box<Expression>),

    // Membership: `In(needle, haystack)`
    In(Box<Expression>, Box<Expression>),
    NotIn(Box<Expression>, Box<Expression>),

    // Predicates
    IsEmpty(Box<Expression>),
    StartsWith(Box<Expression>, Box<Expression>),
    EndsWith(Box<Expression>, Box<Expression>),

    // Access
    Attribute(Box<Expression>, String),
    Index(Box<Expression>, Box<Expression>),
    Call(Box<Expression>, Vec<Expression>),

    // Leaf nodes
    List(Vec<Expression>),
    Literal(Value),
    Name(String),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Expression::Name(name.into())
    }

    /// Gets the precedence level for an expression type. Higher numbers bind more tightly.
    fn precedence(&self) -> u8 {
        match self {
            Expression::Or(_, _) => 1,
            Expression::And(_, _) => 2,
            Expression::Not(_) => 3,
            Expression::Equal(_, _)
            | Expression::NotEqual(_, _)
            | Expression::GreaterThan(_, _)
            | Expression::GreaterThanOrEqual(_, _)
            | Expression::SmallerThan(_, _)
            | Expression::SmallerThanOrEqual(_, _)
            | Expression::In(_, _)
            | Expression::NotIn(_, _) => 4,
            Expression::Sum(_, _) | Expression::Subtract(_, _) => 5,
            Expression::Multiply(_, _)
            | Expression::Divide(_, _)
            | Expression::FloorDivide(_, _)
            | Expression::Modulo(_, _) => 6,
            Expression::Negate(_) | Expression::Positive(_) => 7,
            Expression::Power(_, _) => 8,
            Expression::Attribute(_, _) | Expression::Index(_, _) | Expression::Call(_, _) => 9,
            Expression::IsEmpty(_)
            | Expression::StartsWith(_, _)
            | Expression::EndsWith(_, _)
            | Expression::List(_)
            | Expression::Literal(_)
            | Expression::Name(_) => 10,
        }
    }

    /// Recursively formats the expression, adding parentheses only when necessary.
    fn fmt_with_precedence(&self, f: &mut fmt::Formatter<'_>, parent_precedence: u8) -> fmt::Result {
        let current = self.precedence();
        let needs_parens = current < parent_precedence;

        if needs_parens {
            write!(f, "(")?;
        }

        match self {
            Expression::Or(l, r) => Self::fmt_left_assoc(f, "or", l, r, current)?,
            Expression::And(l, r) => Self::fmt_left_assoc(f, "and", l, r, current)?,
            Expression::Sum(l, r) => Self::fmt_left_assoc(f, "+", l, r, current)?,
            Expression::Subtract(l, r) => Self::fmt_left_assoc(f, "-", l, r, current)?,
            Expression::Multiply(l, r) => Self::fmt_left_assoc(f, "*", l, r, current)?,
            Expression::Divide(l, r) => Self::fmt_left_assoc(f, "/", l, r, current)?,
            Expression::FloorDivide(l, r) => Self::fmt_left_assoc(f, "//", l, r, current)?,
            Expression::Modulo(l, r) => Self::fmt_left_assoc(f, "%", l, r, current)?,
            Expression::Power(l, r) => {
                l.fmt_with_precedence(f, current + 1)?;
                write!(f, " ** ")?;
                r.fmt_with_precedence(f, current)?;
            }

            // Comparisons do not chain, so both sides bind tighter.
            Expression::Equal(l, r) => Self::fmt_non_assoc(f, "==", l, r, current)?,
            Expression::NotEqual(l, r) => Self::fmt_non_assoc(f, "!=", l, r, current)?,
            Expression::GreaterThan(l, r) => Self::fmt_non_assoc(f, ">", l, r, current)?,
            Expression::GreaterThanOrEqual(l, r) => Self::fmt_non_assoc(f, ">=", l, r, current)?,
            Expression::SmallerThan(l, r) => Self::fmt_non_assoc(f, "<", l, r, current)?,
            Expression::SmallerThanOrEqual(l, r) => Self::fmt_non_assoc(f, "<=", l, r, current)?,
            Expression::In(l, r) => Self::fmt_non_assoc(f, "in", l, r, current)?,
            Expression::NotIn(l, r) => Self::fmt_non_assoc(f, "not in", l, r, current)?,

            Expression::Not(v) => {
                write!(f, "not ")?;
                v.fmt_with_precedence(f, current)?;
            }
            Expression::Negate(v) => {
                write!(f, "-")?;
                v.fmt_with_precedence(f, current)?;
            }
            Expression::Positive(v) => {
                write!(f, "+")?;
                v.fmt_with_precedence(f, current)?;
            }

            Expression::IsEmpty(v) => write!(f, "empty({})", v)?,
            Expression::StartsWith(l, r) => write!(f, "startswith({}, {})", l, r)?,
            Expression::EndsWith(l, r) => write!(f, "endswith({}, {})", l, r)?,

            Expression::Attribute(v, attr) => {
                v.fmt_with_precedence(f, current)?;
                write!(f, ".{}", attr)?;
            }
            Expression::Index(v, idx) => {
                v.fmt_with_precedence(f, current)?;
                write!(f, "[{}]", idx)?;
            }
            Expression::Call(callee, args) => {
                callee.fmt_with_precedence(f, current)?;
                write!(f, "(")?;
                Self::fmt_list(f, args)?;
                write!(f, ")")?;
            }

            // Leaf nodes
            Expression::List(items) => {
                write!(f, "[")?;
                Self::fmt_list(f, items)?;
                write!(f, "]")?;
            }
            Expression::Literal(v) => write!(f, "{}", v)?,
            Expression::Name(n) => write!(f, "{}", n)?,
        }

        if needs_parens {
            write!(f, ")")?;
        }
        Ok(())
    }

    fn fmt_left_assoc(
        f: &mut fmt::Formatter<'_>,
        op: &str,
        l: &Expression,
        r: &Expression,
        current: u8,
    ) -> fmt::Result {
        l.fmt_with_precedence(f, current)?;
        write!(f, " {} ", op)?;
        r.fmt_with_precedence(f, current + 1)
    }

    fn fmt_non_assoc(
        f: &mut fmt::Formatter<'_>,
        op: &str,
        l: &Expression,
        r: &Expression,
        current: u8,
    ) -> fmt::Result {
        l.fmt_with_precedence(f, current + 1)?;
        write!(f, " {} ", op)?;
        r.fmt_with_precedence(f, current + 1)
    }

    fn fmt_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Start the recursive formatting with the lowest parent precedence.
        self.fmt_with_precedence(f, 0)
    }
}
