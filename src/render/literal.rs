//! Per-type value coercion and literal formatting.
//!
//! Rendering dispatches on the column's [`SqlType`]; the host value must be
//! of a kind that type accepts, otherwise the compile fails with
//! [`RenderError::TypeMismatch`].

use chrono::{NaiveTime, SubsecRound, Timelike};
use rust_decimal::Decimal;

use crate::ast::{SqlType, Value};
use crate::dialect::{BinaryStyle, Dialect, Engine};
use crate::error::RenderError;

fn mismatch(ty: SqlType, value: &Value) -> RenderError {
    RenderError::TypeMismatch {
        column_type: ty.to_string(),
        value: value.kind(),
    }
}

fn out_of_range(ty: SqlType, value: impl ToString) -> RenderError {
    RenderError::OutOfRange {
        column_type: ty.to_string(),
        value: value.to_string(),
    }
}

/// Fractional-second digits a temporal literal carries.
pub(crate) fn time_digits(ty: SqlType, dialect: &Dialect) -> u16 {
    let declared = match ty {
        SqlType::Time { precision }
        | SqlType::Timestamp { precision }
        | SqlType::TimestampTz { precision } => precision,
        _ => 0,
    };
    declared.min(dialect.max_time_precision).min(9) as u16
}

/// Check `value` against `ty` and normalize it to the form it is rendered
/// or bound in.
pub fn coerce(value: Value, ty: SqlType, dialect: &Dialect) -> Result<Value, RenderError> {
    if value.is_null() {
        return Ok(value);
    }
    match ty {
        SqlType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        t if t.is_signed_integer() || t.is_unsigned_integer() => coerce_integer(value, ty),
        SqlType::Decimal { precision, scale } => {
            let d = match value {
                Value::Decimal(d) => d,
                Value::Int(i) => Decimal::from(i),
                Value::UInt(u) => Decimal::from(u),
                other => return Err(mismatch(ty, &other)),
            };
            coerce_decimal(d, ty, precision, scale).map(Value::Decimal)
        }
        SqlType::Real | SqlType::Double => match value {
            Value::Float(_) => Ok(value),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::UInt(u) => Ok(Value::Float(u as f64)),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Char(n) | SqlType::Varchar(n) => match value {
            Value::Text(s) if n > 0 && s.chars().count() > n as usize => {
                Err(out_of_range(ty, format!("'{}'", s)))
            }
            Value::Text(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Text => match value {
            Value::Text(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Binary(n) | SqlType::VarBinary(n) => match value {
            Value::Bytes(b) if n > 0 && b.len() > n as usize => {
                Err(out_of_range(ty, format!("{} bytes", b.len())))
            }
            Value::Bytes(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Blob => match value {
            Value::Bytes(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Date => match value {
            Value::Date(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Time { .. } => match value {
            Value::Time(t) => Ok(Value::Time(t.trunc_subsecs(time_digits(ty, dialect)))),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Timestamp { .. } => match value {
            Value::DateTime(t) => Ok(Value::DateTime(t.trunc_subsecs(time_digits(ty, dialect)))),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::TimestampTz { .. } => match value {
            Value::DateTimeTz(t) => {
                Ok(Value::DateTimeTz(t.trunc_subsecs(time_digits(ty, dialect))))
            }
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Uuid => match value {
            Value::Uuid(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        SqlType::Json => match value {
            Value::Json(_) => Ok(value),
            other => Err(mismatch(ty, &other)),
        },
        _ => Err(RenderError::UnsupportedType(ty.to_string())),
    }
}

/// Range-check an integer. Unsigned values above `i64::MAX` widen to
/// `Decimal`; everything else travels as `Int`.
fn coerce_integer(value: Value, ty: SqlType) -> Result<Value, RenderError> {
    let n: i128 = match value {
        Value::Int(i) => i as i128,
        Value::UInt(u) => u as i128,
        other => return Err(mismatch(ty, &other)),
    };
    let Some((lo, hi)) = ty.integer_range() else {
        return Err(RenderError::UnsupportedType(ty.to_string()));
    };
    if n < lo || n > hi {
        return Err(out_of_range(ty, n));
    }
    match i64::try_from(n) {
        Ok(i) => Ok(Value::Int(i)),
        Err(_) => Ok(Value::Decimal(Decimal::from_i128_with_scale(n, 0))),
    }
}

/// Fit a decimal to `DECIMAL(precision, scale)` without rounding.
///
/// Trailing zeros beyond the scale are dropped; significant digits beyond it
/// are a [`RenderError::Precision`]. Missing fractional digits are padded.
fn coerce_decimal(d: Decimal, ty: SqlType, precision: u8, scale: u8) -> Result<Decimal, RenderError> {
    let precision_err = || RenderError::Precision {
        column_type: ty.to_string(),
        value: d.to_string(),
    };
    let mut fitted = if d.scale() > scale as u32 { d.normalize() } else { d };
    if fitted.scale() > scale as u32 {
        return Err(precision_err());
    }
    fitted.rescale(scale as u32);
    if fitted.scale() != scale as u32 {
        return Err(precision_err());
    }
    let digits = fitted.mantissa().unsigned_abs().to_string().len();
    if fitted.mantissa() != 0 && digits > precision as usize {
        return Err(precision_err());
    }
    Ok(fitted)
}

/// Values that must travel as bound parameters even when written as literals.
pub(crate) fn must_bind(value: &Value, ty: SqlType, dialect: &Dialect) -> bool {
    match value {
        Value::Bytes(b) => ty == SqlType::Blob || b.len() > dialect.max_binary_literal,
        _ => false,
    }
}

fn quote_text(out: &mut String, s: &str, dialect: &Dialect) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' if dialect.backslash_escapes => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn fraction(out: &mut String, t: &impl Timelike, digits: u16) {
    if digits == 0 {
        return;
    }
    // Leap seconds carry nanos above 1e9; they render as the last fraction.
    let nanos = t.nanosecond().min(999_999_999);
    let scaled = nanos / 10u32.pow(9 - digits as u32);
    out.push_str(&format!(".{:0width$}", scaled, width = digits as usize));
}

fn typed_prefix(out: &mut String, keyword: &str, dialect: &Dialect) {
    if dialect.typed_temporal_literals {
        out.push_str(keyword);
        out.push(' ');
    }
}

fn time_text(t: &NaiveTime, digits: u16) -> String {
    let mut s = t.format("%H:%M:%S").to_string();
    fraction(&mut s, t, digits);
    s
}

/// Append the SQL literal for an already coerced value.
pub fn write_literal(
    out: &mut String,
    value: &Value,
    ty: SqlType,
    dialect: &Dialect,
) -> Result<(), RenderError> {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(b) => out.push_str(dialect.bool_literal(*b)),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::UInt(u) => out.push_str(&u.to_string()),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(RenderError::UnsupportedValue(format!(
                    "non-finite float {}",
                    f
                )));
            }
            out.push_str(&f.to_string());
        }
        Value::Decimal(d) => out.push_str(&d.to_string()),
        Value::Text(s) => quote_text(out, s, dialect),
        Value::Bytes(b) => match dialect.binary_style {
            BinaryStyle::HexString => {
                out.push_str("X'");
                for byte in b {
                    out.push_str(&format!("{:02X}", byte));
                }
                out.push('\'');
            }
            BinaryStyle::EscapedHex => {
                out.push_str("'\\x");
                for byte in b {
                    out.push_str(&format!("{:02x}", byte));
                }
                out.push('\'');
            }
        },
        Value::Uuid(u) => quote_text(out, &u.hyphenated().to_string(), dialect),
        Value::Date(d) => {
            typed_prefix(out, "DATE", dialect);
            quote_text(out, &d.format("%Y-%m-%d").to_string(), dialect);
        }
        Value::Time(t) => {
            typed_prefix(out, "TIME", dialect);
            quote_text(out, &time_text(t, time_digits(ty, dialect)), dialect);
        }
        Value::DateTime(dt) => {
            typed_prefix(out, "TIMESTAMP", dialect);
            let text = format!(
                "{} {}",
                dt.date().format("%Y-%m-%d"),
                time_text(&dt.time(), time_digits(ty, dialect))
            );
            quote_text(out, &text, dialect);
        }
        Value::DateTimeTz(dt) => {
            let keyword = if dialect.engine == Engine::MySql {
                "TIMESTAMP"
            } else {
                "TIMESTAMP WITH TIME ZONE"
            };
            typed_prefix(out, keyword, dialect);
            let text = format!(
                "{} {}{}",
                dt.date_naive().format("%Y-%m-%d"),
                time_text(&dt.time(), time_digits(ty, dialect)),
                dt.format("%:z")
            );
            quote_text(out, &text, dialect);
        }
        Value::Json(j) => {
            let text = serde_json::to_string(j)
                .map_err(|e| RenderError::UnsupportedValue(e.to_string()))?;
            quote_text(out, &text, dialect);
        }
    }
    Ok(())
}
