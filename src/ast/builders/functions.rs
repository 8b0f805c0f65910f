//! Function-call builders.

use crate::ast::{Expr, FuncCall};

/// Call any function by name; the name is validated at render time.
pub fn func<I, E>(name: &str, args: I) -> FuncCall
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    FuncCall {
        name: name.to_string(),
        args: args.into_iter().map(Into::into).collect(),
        distinct: false,
    }
}

fn unary(name: &str, arg: impl Into<Expr>) -> FuncCall {
    func(name, [arg.into()])
}

fn nullary(name: &str) -> FuncCall {
    func(name, Vec::<Expr>::new())
}

/// `COUNT(*)`
pub fn count_star() -> FuncCall {
    unary("COUNT", Expr::Star(None))
}

pub fn count(arg: impl Into<Expr>) -> FuncCall {
    unary("COUNT", arg)
}

pub fn sum(arg: impl Into<Expr>) -> FuncCall {
    unary("SUM", arg)
}

pub fn avg(arg: impl Into<Expr>) -> FuncCall {
    unary("AVG", arg)
}

pub fn min(arg: impl Into<Expr>) -> FuncCall {
    unary("MIN", arg)
}

pub fn max(arg: impl Into<Expr>) -> FuncCall {
    unary("MAX", arg)
}

pub fn coalesce<I, E>(args: I) -> FuncCall
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    func("COALESCE", args)
}

pub fn row_number() -> FuncCall {
    nullary("ROW_NUMBER")
}

pub fn rank() -> FuncCall {
    nullary("RANK")
}

pub fn dense_rank() -> FuncCall {
    nullary("DENSE_RANK")
}

pub fn lag(arg: impl Into<Expr>) -> FuncCall {
    unary("LAG", arg)
}

pub fn lead(arg: impl Into<Expr>) -> FuncCall {
    unary("LEAD", arg)
}
