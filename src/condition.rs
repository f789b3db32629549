//! Abstract conditions, joins and queries
//!
//! The engine describes what it needs from storage as structured predicates.
//! A record store either translates them into its own dialect or runs them
//! through the reference interpreter in [`crate::store::execute`].

use std::collections::HashMap;
use std::fmt;

use crate::record::{Record, Value};

/// Either a column of an aliased table or a literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Column { alias: String, field: String },
    Literal(Value),
}

/// Shorthand for a column operand
pub fn col(alias: &str, field: &str) -> Operand {
    Operand::Column { alias: alias.to_string(), field: field.to_string() }
}

/// Shorthand for a literal operand
pub fn lit(v: impl Into<Value>) -> Operand {
    Operand::Literal(v.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A structured predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    True,
    False,
    Compare { left: Operand, op: CmpOp, right: Operand },
    In { operand: Operand, values: Vec<Value> },
    /// Text operand begins with the text of `prefix`
    StartsWith { operand: Operand, prefix: Operand },
    IsNull(Operand),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn cmp(left: Operand, op: CmpOp, right: Operand) -> Self {
        Condition::Compare { left, op, right }
    }

    pub fn eq(left: Operand, right: Operand) -> Self {
        Self::cmp(left, CmpOp::Eq, right)
    }

    /// An empty value list selects nothing
    pub fn is_in(operand: Operand, values: Vec<Value>) -> Self {
        if values.is_empty() {
            Condition::False
        } else {
            Condition::In { operand, values }
        }
    }

    pub fn starts_with(operand: Operand, prefix: Operand) -> Self {
        Condition::StartsWith { operand, prefix }
    }

    /// Conjunction that folds away `True` and short-circuits on `False`
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::True, c) | (c, Condition::True) => c,
            (Condition::False, _) | (_, Condition::False) => Condition::False,
            (Condition::And(mut a), Condition::And(b)) => {
                a.extend(b);
                Condition::And(a)
            }
            (Condition::And(mut a), c) => {
                a.push(c);
                Condition::And(a)
            }
            (c, Condition::And(mut b)) => {
                b.insert(0, c);
                Condition::And(b)
            }
            (a, b) => Condition::And(vec![a, b]),
        }
    }

    /// Disjunction that folds away `False` and short-circuits on `True`
    pub fn or(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::False, c) | (c, Condition::False) => c,
            (Condition::True, _) | (_, Condition::True) => Condition::True,
            (Condition::Or(mut a), Condition::Or(b)) => {
                a.extend(b);
                Condition::Or(a)
            }
            (Condition::Or(mut a), c) => {
                a.push(c);
                Condition::Or(a)
            }
            (a, b) => Condition::Or(vec![a, b]),
        }
    }

    pub fn all(conds: impl IntoIterator<Item = Condition>) -> Self {
        conds.into_iter().fold(Condition::True, Condition::and)
    }

    pub fn any(conds: impl IntoIterator<Item = Condition>) -> Self {
        conds.into_iter().fold(Condition::False, Condition::or)
    }

    /// Evaluate against rows bound to aliases. Comparisons involving NULL or
    /// an unbound alias are false.
    pub fn evaluate(&self, rows: &Bindings<'_>) -> bool {
        match self {
            Condition::True => true,
            Condition::False => false,
            Condition::Compare { left, op, right } => {
                let (l, r) = (rows.value(left), rows.value(right));
                if l.is_null() || r.is_null() {
                    return false;
                }
                match (l, r) {
                    (Value::Int(a), Value::Int(b)) => compare(a, b, *op),
                    (Value::Text(a), Value::Text(b)) => compare(a, b, *op),
                    (Value::Bool(a), Value::Bool(b)) => compare(a, b, *op),
                    _ => *op == CmpOp::Ne,
                }
            }
            Condition::In { operand, values } => {
                let v = rows.value(operand);
                !v.is_null() && values.contains(v)
            }
            Condition::StartsWith { operand, prefix } => {
                match (rows.value(operand), rows.value(prefix)) {
                    (Value::Text(s), Value::Text(p)) => s.starts_with(p.as_str()),
                    _ => false,
                }
            }
            Condition::IsNull(operand) => rows.value(operand).is_null(),
            Condition::And(cs) => cs.iter().all(|c| c.evaluate(rows)),
            Condition::Or(cs) => cs.iter().any(|c| c.evaluate(rows)),
            Condition::Not(c) => !c.evaluate(rows),
        }
    }
}

fn compare<T: Ord + ?Sized>(a: &T, b: &T, op: CmpOp) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column { alias, field } => write!(f, "{}.{}", alias, field),
            Operand::Literal(v) => write!(f, "{}", v),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, cs: &[Condition], sep: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, c) in cs.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, ")")
        };
        match self {
            Condition::True => write!(f, "TRUE"),
            Condition::False => write!(f, "FALSE"),
            Condition::Compare { left, op, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Condition::In { operand, values } => {
                let vs: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN ({})", operand, vs.join(", "))
            }
            Condition::StartsWith { operand, prefix } => write!(f, "{} STARTS WITH {}", operand, prefix),
            Condition::IsNull(o) => write!(f, "{} IS NULL", o),
            Condition::And(cs) => join(f, cs, "AND"),
            Condition::Or(cs) => join(f, cs, "OR"),
            Condition::Not(c) => write!(f, "NOT {}", c),
        }
    }
}

/// Rows bound to table aliases while evaluating a query
#[derive(Debug, Default)]
pub struct Bindings<'a> {
    rows: HashMap<&'a str, &'a Record>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, alias: &'a str, row: &'a Record) {
        self.rows.insert(alias, row);
    }

    pub fn unbind(&mut self, alias: &str) {
        self.rows.remove(alias);
    }

    pub fn row(&self, alias: &str) -> Option<&'a Record> {
        self.rows.get(alias).copied()
    }

    fn value<'b>(&'b self, operand: &'b Operand) -> &'b Value {
        const NULL: &Value = &Value::Null;
        match operand {
            Operand::Literal(v) => v,
            Operand::Column { alias, field } => match self.rows.get(alias.as_str()) {
                Some(r) => r.get(field),
                None => NULL,
            },
        }
    }
}

/// Inner join of `table AS alias ON on`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: Condition,
}

impl Join {
    pub fn inner(table: &str, alias: &str, on: Condition) -> Self {
        Join { table: table.to_string(), alias: alias.to_string(), on }
    }
}

/// Output column of a projected query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub alias: String,
    pub field: String,
    pub name: String,
}

/// A read against one base table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub alias: String,
    pub joins: Vec<Join>,
    pub condition: Condition,
    /// Collapse identical output rows
    pub distinct: bool,
    /// Empty means "the base row"
    pub select: Vec<Projection>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self::aliased(table, crate::constants::ENTITY_ALIAS)
    }

    pub fn aliased(table: &str, alias: &str) -> Self {
        Query {
            table: table.to_string(),
            alias: alias.to_string(),
            joins: Vec::new(),
            condition: Condition::True,
            distinct: false,
            select: Vec::new(),
            limit: None,
        }
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// ANDs onto the existing condition
    pub fn filter(mut self, cond: Condition) -> Self {
        self.condition = std::mem::replace(&mut self.condition, Condition::True).and(cond);
        self
    }

    /// Match on base-table field equality
    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        let alias = self.alias.clone();
        self.filter(Condition::eq(col(&alias, field), lit(value)))
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn select(mut self, alias: &str, field: &str, name: &str) -> Self {
        self.select.push(Projection {
            alias: alias.to_string(),
            field: field.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}
