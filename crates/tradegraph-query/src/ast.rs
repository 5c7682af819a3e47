//! Abstract syntax tree for the Cypher subset.
//!
//! The tree is built by [`crate::parser`] and rendered back to text via
//! `Display`. Rendering is precedence-aware: an operand is parenthesized
//! exactly when its operator binds looser than the surrounding one, so a
//! rewritten tree round-trips to text with the same meaning it was built
//! with. Rendering does not otherwise preserve the original formatting;
//! callers that need byte identity for untouched queries keep the source
//! text instead of re-rendering.

use std::fmt::{self, Display, Write as _};

/// A parsed read query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// MATCH and WITH clauses in source order.
    pub clauses: Vec<Clause>,
    /// The final projection, if present.
    pub ret: Option<ReturnClause>,
    /// ORDER BY items following the projection.
    pub order_by: Vec<OrderItem>,
    /// SKIP expression.
    pub skip: Option<Expr>,
    /// LIMIT expression.
    pub limit: Option<Expr>,
}

/// A reading clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(MatchClause),
    With(WithClause),
}

/// `MATCH` or `OPTIONAL MATCH` with its attached `WHERE`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<PathPattern>,
    pub where_clause: Option<Expr>,
}

impl MatchClause {
    /// AND-appends `predicate` to this clause's WHERE.
    pub fn and_where(&mut self, predicate: Expr) {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => Expr::And(Box::new(existing), Box::new(predicate)),
            None => predicate,
        });
    }
}

/// `WITH` projection with its optional `WHERE`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
    pub where_clause: Option<Expr>,
}

/// `RETURN` projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
}

/// One projected expression, with an optional `AS` alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

/// A linear path: a start node followed by relationship/node segments.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    pub start: NodePattern,
    pub segments: Vec<(RelPattern, NodePattern)>,
}

impl PathPattern {
    /// Iterates over every node pattern in the path.
    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.segments.iter().map(|(_, n)| n))
    }

    /// Mutable variant of [`Self::nodes`].
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodePattern> {
        std::iter::once(&mut self.start).chain(self.segments.iter_mut().map(|(_, n)| n))
    }
}

/// `(variable:Label {key: value})`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

/// Relationship direction relative to pattern order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
}

/// `-[variable:TYPE*1..2 {key: value}]->` and its directional variants.
#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub variable: Option<String>,
    pub types: Vec<String>,
    pub properties: Vec<(String, Expr)>,
    pub direction: Direction,
    /// Variable-length bounds: `*` is `(None, None)`, `*2` is
    /// `(Some(2), Some(2))`, `*1..3` is `(Some(1), Some(3))`.
    pub var_length: Option<(Option<i64>, Option<i64>)>,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A literal value in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        list: Box<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// `base.name` property access.
    Property {
        base: Box<Expr>,
        name: String,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    Ident(String),
    Param(String),
    Literal(Literal),
    List(Vec<Expr>),
    /// `*`, valid only inside projections and `count(*)`.
    Star,
}

impl Expr {
    /// Convenience constructor for `variable.property`.
    pub fn property(variable: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Property {
            base: Box::new(Expr::Ident(variable.into())),
            name: name.into(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Not(_) => 3,
            Expr::Compare { .. } | Expr::In { .. } | Expr::IsNull { .. } => 4,
            _ => 5,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            f.write_char('(')?;
            self.fmt_prec(f, 0)?;
            return f.write_char(')');
        }
        match self {
            Expr::Or(l, r) => {
                l.fmt_prec(f, 1)?;
                f.write_str(" OR ")?;
                r.fmt_prec(f, 1)
            }
            Expr::And(l, r) => {
                l.fmt_prec(f, 2)?;
                f.write_str(" AND ")?;
                r.fmt_prec(f, 2)
            }
            Expr::Not(inner) => {
                f.write_str("NOT ")?;
                inner.fmt_prec(f, 4)
            }
            Expr::Compare { op, left, right } => {
                left.fmt_prec(f, 5)?;
                write!(f, " {} ", op.as_str())?;
                right.fmt_prec(f, 5)
            }
            Expr::In { expr, list, negated } => {
                expr.fmt_prec(f, 5)?;
                f.write_str(if *negated { " NOT IN " } else { " IN " })?;
                list.fmt_prec(f, 5)
            }
            Expr::IsNull { expr, negated } => {
                expr.fmt_prec(f, 5)?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
            Expr::Property { base, name } => {
                base.fmt_prec(f, 5)?;
                write!(f, ".{name}")
            }
            Expr::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt_prec(f, 0)?;
                }
                f.write_char(')')
            }
            Expr::Ident(name) => f.write_str(name),
            Expr::Param(name) => write!(f, "${name}"),
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_prec(f, 0)?;
                }
                f.write_char(']')
            }
            Expr::Star => f.write_char('*'),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Text(s) => {
                f.write_char('\'')?;
                for ch in s.chars() {
                    match ch {
                        '\'' => f.write_str("\\'")?,
                        '\\' => f.write_str("\\\\")?,
                        other => f.write_char(other)?,
                    }
                }
                f.write_char('\'')
            }
        }
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for clause in &self.clauses {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{clause}")?;
        }
        if let Some(ret) = &self.ret {
            if !first {
                f.write_char(' ')?;
            }
            write!(f, "{ret}")?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, item) in self.order_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", item.expr)?;
                if item.descending {
                    f.write_str(" DESC")?;
                }
            }
        }
        if let Some(skip) = &self.skip {
            write!(f, " SKIP {skip}")?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Match(m) => write!(f, "{m}"),
            Clause::With(w) => write!(f, "{w}"),
        }
    }
}

impl Display for MatchClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            f.write_str("OPTIONAL ")?;
        }
        f.write_str("MATCH ")?;
        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{pattern}")?;
        }
        if let Some(cond) = &self.where_clause {
            write!(f, " WHERE {cond}")?;
        }
        Ok(())
    }
}

impl Display for WithClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WITH ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        fmt_items(f, &self.items)?;
        if let Some(cond) = &self.where_clause {
            write!(f, " WHERE {cond}")?;
        }
        Ok(())
    }
}

impl Display for ReturnClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RETURN ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        fmt_items(f, &self.items)
    }
}

fn fmt_items(f: &mut fmt::Formatter<'_>, items: &[ProjectionItem]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item.expr)?;
        if let Some(alias) = &item.alias {
            write!(f, " AS {alias}")?;
        }
    }
    Ok(())
}

impl Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for (rel, node) in &self.segments {
            write!(f, "{rel}{node}")?;
        }
        Ok(())
    }
}

impl Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('(')?;
        if let Some(var) = &self.variable {
            f.write_str(var)?;
        }
        for label in &self.labels {
            write!(f, ":{label}")?;
        }
        if !self.properties.is_empty() {
            if self.variable.is_some() || !self.labels.is_empty() {
                f.write_char(' ')?;
            }
            fmt_properties(f, &self.properties)?;
        }
        f.write_char(')')
    }
}

impl Display for RelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.direction == Direction::Incoming {
            f.write_str("<-")?;
        } else {
            f.write_char('-')?;
        }
        let has_detail = self.variable.is_some()
            || !self.types.is_empty()
            || !self.properties.is_empty()
            || self.var_length.is_some();
        if has_detail {
            f.write_char('[')?;
            if let Some(var) = &self.variable {
                f.write_str(var)?;
            }
            for (i, ty) in self.types.iter().enumerate() {
                f.write_char(if i == 0 { ':' } else { '|' })?;
                f.write_str(ty)?;
            }
            if let Some((min, max)) = self.var_length {
                f.write_char('*')?;
                match (min, max) {
                    (Some(a), Some(b)) if a == b => write!(f, "{a}")?,
                    (a, b) => {
                        if let Some(a) = a {
                            write!(f, "{a}")?;
                        }
                        f.write_str("..")?;
                        if let Some(b) = b {
                            write!(f, "{b}")?;
                        }
                    }
                }
            }
            if !self.properties.is_empty() {
                f.write_char(' ')?;
                fmt_properties(f, &self.properties)?;
            }
            f.write_char(']')?;
        }
        if self.direction == Direction::Outgoing {
            f.write_str("->")
        } else {
            f.write_char('-')
        }
    }
}

fn fmt_properties(f: &mut fmt::Formatter<'_>, properties: &[(String, Expr)]) -> fmt::Result {
    f.write_char('{')?;
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key}: {value}")?;
    }
    f.write_char('}')
}
