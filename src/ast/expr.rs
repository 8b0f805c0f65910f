use std::sync::Arc;

use crate::ast::{
    CaseExpr, CompareOp, FieldMeta, MappingType, Over, Predicate, Query, Value, WindowSpec,
};

/// Binary operators for expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    /// Modulo (%)
    Rem,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Concat => write!(f, "||"),
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Rem => write!(f, "%"),
        }
    }
}

/// What a column reference resolved to.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Qualifier emitted in SQL text; `None` renders the bare column name.
    pub qualifier: Option<String>,
    /// Physical column, when the source is a mapped table.
    pub field: Option<Arc<FieldMeta>>,
    /// Bound against an enclosing scope.
    pub outer: bool,
}

/// A column reference as written, plus its resolution.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub binding: Option<Binding>,
}

impl ColumnRef {
    /// Parse `name` or `qualifier.name`.
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((q, n)) => Self {
                qualifier: Some(q.to_string()),
                name: n.to_string(),
                binding: None,
            },
            None => Self {
                qualifier: None,
                name: path.to_string(),
                binding: None,
            },
        }
    }

    pub fn field(&self) -> Option<&Arc<FieldMeta>> {
        self.binding.as_ref().and_then(|b| b.field.as_ref())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

/// A host value with the codec it is rendered through.
///
/// The mapping is inferred from the column the value is compared with or
/// assigned to; values that never meet a column render by their natural type.
#[derive(Debug, Clone)]
pub struct Typed {
    pub value: Value,
    pub mapping: Option<Arc<dyn MappingType>>,
    /// Column the value is bound to, when known.
    pub column: Option<String>,
}

impl Typed {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            mapping: None,
            column: None,
        }
    }

    pub(crate) fn infer_from(&mut self, field: &FieldMeta) {
        if self.mapping.is_none() {
            self.mapping = Some(Arc::clone(&field.mapping));
        }
        if self.column.is_none() {
            self.column = Some(field.name.clone());
        }
    }
}

/// Function call, e.g. `count(DISTINCT x)`.
#[derive(Debug, Clone)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub distinct: bool,
}

impl FuncCall {
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Window function over an inline spec.
    pub fn over(self, spec: WindowSpec) -> Expr {
        Expr::Window(Box::new(WindowCall {
            func: self,
            over: Over::Spec(spec),
        }))
    }

    /// Window function over a window declared with `WINDOW name AS (...)`.
    pub fn over_named(self, name: &str) -> Expr {
        Expr::Window(Box::new(WindowCall {
            func: self,
            over: Over::Named(name.to_string()),
        }))
    }
}

impl From<FuncCall> for Expr {
    fn from(f: FuncCall) -> Self {
        Expr::Func(f)
    }
}

#[derive(Debug, Clone)]
pub struct WindowCall {
    pub func: FuncCall,
    pub over: Over,
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    Column(ColumnRef),
    /// `*` or `alias.*`
    Star(Option<String>),
    /// Inlined into SQL text.
    Literal(Typed),
    /// Passed out-of-band behind a placeholder.
    Param(Typed),
    /// `DEFAULT`, or the dialect's default function over a column.
    Default(Option<ColumnRef>),
    Func(FuncCall),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Case(Box<CaseExpr>),
    Window(Box<WindowCall>),
    /// Scalar subquery.
    Subquery(Box<Query>),
    /// Row constructor `(a, b)`.
    Row(Vec<Expr>),
    /// Boolean-valued predicate in expression position.
    Predicate(Box<Predicate>),
}

impl Expr {
    fn compare(self, op: CompareOp, rhs: impl Into<Expr>) -> Predicate {
        Predicate::Compare {
            left: self,
            op,
            right: rhs.into(),
        }
    }

    pub fn eq(self, rhs: impl Into<Expr>) -> Predicate {
        self.compare(CompareOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Expr>) -> Predicate {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Predicate {
        self.compare(CompareOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Predicate {
        self.compare(CompareOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Predicate {
        self.compare(CompareOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Predicate {
        self.compare(CompareOp::Ge, rhs)
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull {
            expr: self,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNull {
            expr: self,
            negated: true,
        }
    }

    pub fn in_list<I, E>(self, list: I) -> Predicate
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Predicate::InList {
            expr: self,
            list: list.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<I, E>(self, list: I) -> Predicate
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        Predicate::InList {
            expr: self,
            list: list.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// `self IN (query)` for an already-built query.
    pub fn in_query(self, query: Query) -> Predicate {
        Predicate::InQuery {
            expr: self,
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Predicate {
        Predicate::Between {
            expr: self,
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn not_between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Predicate {
        Predicate::Between {
            expr: self,
            low: low.into(),
            high: high.into(),
            negated: true,
        }
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Predicate {
        Predicate::Like {
            expr: self,
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Predicate {
        Predicate::Like {
            expr: self,
            pattern: pattern.into(),
            negated: true,
        }
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Expr>) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(rhs.into()),
        }
    }

    pub fn plus(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn minus(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn times(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn divided_by(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn modulo(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Rem, rhs)
    }

    pub fn concat(self, rhs: impl Into<Expr>) -> Expr {
        self.binary(BinaryOp::Concat, rhs)
    }

    pub fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }

    /// `expr AS alias` in a projection.
    pub fn alias(self, alias: &str) -> SelectItem {
        SelectItem {
            expr: self,
            alias: Some(alias.to_string()),
        }
    }

    pub fn asc(self) -> OrderItem {
        OrderItem {
            expr: self,
            desc: false,
            nulls: None,
        }
    }

    pub fn desc(self) -> OrderItem {
        OrderItem {
            expr: self,
            desc: true,
            nulls: None,
        }
    }

    /// Name this expression exposes as a projected column.
    pub(crate) fn output_name(&self) -> Option<&str> {
        match self {
            Expr::Column(c) => Some(&c.name),
            _ => None,
        }
    }
}

impl From<Predicate> for Expr {
    fn from(p: Predicate) -> Self {
        Expr::Predicate(Box::new(p))
    }
}

impl From<ColumnRef> for Expr {
    fn from(c: ColumnRef) -> Self {
        Expr::Column(c)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Param(Typed::new(v))
    }
}

// Host values become bound parameters unless wrapped in `lit()`.
macro_rules! expr_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Param(Typed::new(Value::from(v)))
                }
            }
        )*
    };
}

expr_from_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    &str,
    String,
    Vec<u8>,
    rust_decimal::Decimal,
    uuid::Uuid,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::FixedOffset>,
    chrono::DateTime<chrono::Utc>,
    serde_json::Value,
);

/// One projected column.
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub(crate) fn output_name(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.expr.output_name())
    }
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        SelectItem { expr, alias: None }
    }
}

impl From<FuncCall> for SelectItem {
    fn from(f: FuncCall) -> Self {
        SelectItem {
            expr: Expr::Func(f),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: Expr,
    pub desc: bool,
    pub nulls: Option<NullsOrder>,
}

impl OrderItem {
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }
}

impl From<Expr> for OrderItem {
    fn from(expr: Expr) -> Self {
        expr.asc()
    }
}
