//! SELECT grammar positions and the transitions allowed from each.
//!
//! A builder's position is a zero-sized type parameter. Each clause method is
//! implemented for the positions listed against its capability trait below,
//! so an out-of-order clause does not type-check.

mod sealed {
    pub trait Sealed {}
}

/// A grammar position of [`SelectBuilder`](super::SelectBuilder).
pub trait Position: sealed::Sealed {}

macro_rules! positions {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name;
            impl sealed::Sealed for $name {}
            impl Position for $name {}
        )*
    };
}

positions! {
    /// After `SELECT items`.
    Projection,
    /// After `FROM` or a join.
    Sourced,
    /// After `WHERE`.
    Filtered,
    /// After `GROUP BY`.
    Grouped,
    /// After `HAVING`.
    HavingPos,
    /// After `WINDOW name AS (...)`.
    Windowed,
    /// After `ORDER BY`.
    Ordered,
    /// After `LIMIT`/`OFFSET`.
    Limited,
    /// After `FOR UPDATE`/`FOR SHARE`.
    Locked,
}

pub trait CanFrom: Position {}
pub trait CanJoin: Position {}
pub trait CanWhere: Position {}
pub trait CanGroup: Position {}
pub trait CanHaving: Position {}
pub trait CanWindow: Position {}
pub trait CanOrder: Position {}
pub trait CanLimit: Position {}
pub trait CanLock: Position {}
pub trait CanUnion: Position {}

macro_rules! transitions {
    ($($cap:ident: $($pos:ident),+;)*) => {
        $($(impl $cap for $pos {})+)*
    };
}

transitions! {
    CanFrom: Projection;
    CanJoin: Sourced;
    CanWhere: Sourced;
    CanGroup: Sourced, Filtered;
    CanHaving: Grouped;
    CanWindow: Sourced, Filtered, Grouped, HavingPos, Windowed;
    CanOrder: Projection, Sourced, Filtered, Grouped, HavingPos, Windowed, Ordered;
    CanLimit: Projection, Sourced, Filtered, Grouped, HavingPos, Windowed, Ordered, Limited;
    CanLock: Sourced, Filtered, Ordered, Limited;
    CanUnion: Projection, Sourced, Filtered, Grouped, HavingPos, Windowed, Ordered, Limited;
}
