//! Window specifications: `OVER (PARTITION BY .. ORDER BY .. frame)`.

use crate::ast::{Expr, OrderItem};
use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnits {
    Rows,
    Range,
}

/// Window frame boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    fn rank(&self) -> u8 {
        match self {
            FrameBound::UnboundedPreceding => 0,
            FrameBound::Preceding(_) => 1,
            FrameBound::CurrentRow => 2,
            FrameBound::Following(_) => 3,
            FrameBound::UnboundedFollowing => 4,
        }
    }
}

impl std::fmt::Display for FrameBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameBound::UnboundedPreceding => write!(f, "UNBOUNDED PRECEDING"),
            FrameBound::Preceding(n) => write!(f, "{} PRECEDING", n),
            FrameBound::CurrentRow => write!(f, "CURRENT ROW"),
            FrameBound::Following(n) => write!(f, "{} FOLLOWING", n),
            FrameBound::UnboundedFollowing => write!(f, "UNBOUNDED FOLLOWING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub units: FrameUnits,
    pub start: FrameBound,
    /// `None` renders the short form `ROWS start`.
    pub end: Option<FrameBound>,
}

impl WindowFrame {
    pub fn validate(&self) -> Result<(), BuildError> {
        let invalid = |msg: &str| Err(BuildError::InvalidFrame(msg.to_string()));
        if self.start == FrameBound::UnboundedFollowing {
            return invalid("frame cannot start at UNBOUNDED FOLLOWING");
        }
        let Some(end) = self.end else {
            if matches!(self.start, FrameBound::Following(_)) {
                return invalid("frame without an end cannot start after the current row");
            }
            return Ok(());
        };
        if end == FrameBound::UnboundedPreceding {
            return invalid("frame cannot end at UNBOUNDED PRECEDING");
        }
        let ordered = match (self.start, end) {
            (FrameBound::Preceding(a), FrameBound::Preceding(b)) => a >= b,
            (FrameBound::Following(a), FrameBound::Following(b)) => a <= b,
            (s, e) => s.rank() <= e.rank(),
        };
        if !ordered {
            return invalid("frame start is after frame end");
        }
        Ok(())
    }
}

impl std::fmt::Display for WindowFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = match self.units {
            FrameUnits::Rows => "ROWS",
            FrameUnits::Range => "RANGE",
        };
        match self.end {
            Some(end) => write!(f, "{} BETWEEN {} AND {}", units, self.start, end),
            None => write!(f, "{} {}", units, self.start),
        }
    }
}

/// Inline window definition, optionally refining a named window.
#[derive(Debug, Clone, Default)]
pub struct WindowSpec {
    pub base: Option<String>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub frame: Option<WindowFrame>,
}

impl WindowSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refine the window declared under `name`.
    pub fn based_on(name: &str) -> Self {
        Self {
            base: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn partition_by(mut self, expr: impl Into<Expr>) -> Self {
        self.partition_by.push(expr.into());
        self
    }

    pub fn order_by(mut self, item: impl Into<OrderItem>) -> Self {
        self.order_by.push(item.into());
        self
    }

    pub fn rows(mut self, start: FrameBound, end: FrameBound) -> Self {
        self.frame = Some(WindowFrame {
            units: FrameUnits::Rows,
            start,
            end: Some(end),
        });
        self
    }

    pub fn range(mut self, start: FrameBound, end: FrameBound) -> Self {
        self.frame = Some(WindowFrame {
            units: FrameUnits::Range,
            start,
            end: Some(end),
        });
        self
    }

    pub fn frame(mut self, frame: WindowFrame) -> Self {
        self.frame = Some(frame);
        self
    }
}

#[derive(Debug, Clone)]
pub enum Over {
    Named(String),
    Spec(WindowSpec),
}

/// `WINDOW name AS (spec)`
#[derive(Debug, Clone)]
pub struct NamedWindow {
    pub name: String,
    pub spec: WindowSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(start: FrameBound, end: FrameBound) -> WindowFrame {
        WindowFrame {
            units: FrameUnits::Rows,
            start,
            end: Some(end),
        }
    }

    #[test]
    fn test_frame_order() {
        assert!(rows(FrameBound::Preceding(3), FrameBound::CurrentRow).validate().is_ok());
        assert!(rows(FrameBound::Preceding(1), FrameBound::Preceding(3)).validate().is_err());
        assert!(rows(FrameBound::Following(1), FrameBound::Following(3)).validate().is_ok());
        assert!(rows(FrameBound::CurrentRow, FrameBound::Preceding(1)).validate().is_err());
        assert!(
            rows(FrameBound::UnboundedFollowing, FrameBound::UnboundedFollowing)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_frame_display() {
        let frame = rows(FrameBound::UnboundedPreceding, FrameBound::CurrentRow);
        assert_eq!(
            frame.to_string(),
            "ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW"
        );
    }
}
