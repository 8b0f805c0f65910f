use serde::{Deserialize, Serialize};

/// Normalized SQL column type.
///
/// Literal and parameter rendering dispatches on this, never on the host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    UnsignedTinyInt,
    UnsignedSmallInt,
    UnsignedInteger,
    UnsignedBigInt,
    Decimal { precision: u8, scale: u8 },
    Real,
    Double,
    Char(u32),
    Varchar(u32),
    Text,
    Binary(u32),
    VarBinary(u32),
    /// Long-form binary; always travels as a bound parameter.
    Blob,
    Date,
    Time { precision: u8 },
    Timestamp { precision: u8 },
    TimestampTz { precision: u8 },
    Uuid,
    Json,
    Geometry,
}

impl SqlType {
    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            SqlType::UnsignedTinyInt
                | SqlType::UnsignedSmallInt
                | SqlType::UnsignedInteger
                | SqlType::UnsignedBigInt
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            SqlType::Binary(_) | SqlType::VarBinary(_) | SqlType::Blob
        )
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SqlType::Char(_) | SqlType::Varchar(_) | SqlType::Text)
    }

    /// Inclusive value range of an integer type.
    pub(crate) fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            SqlType::TinyInt => (i8::MIN as i128, i8::MAX as i128),
            SqlType::SmallInt => (i16::MIN as i128, i16::MAX as i128),
            SqlType::Integer => (i32::MIN as i128, i32::MAX as i128),
            SqlType::BigInt => (i64::MIN as i128, i64::MAX as i128),
            SqlType::UnsignedTinyInt => (0, u8::MAX as i128),
            SqlType::UnsignedSmallInt => (0, u16::MAX as i128),
            SqlType::UnsignedInteger => (0, u32::MAX as i128),
            SqlType::UnsignedBigInt => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::TinyInt => write!(f, "TINYINT"),
            SqlType::SmallInt => write!(f, "SMALLINT"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::UnsignedTinyInt => write!(f, "TINYINT UNSIGNED"),
            SqlType::UnsignedSmallInt => write!(f, "SMALLINT UNSIGNED"),
            SqlType::UnsignedInteger => write!(f, "INTEGER UNSIGNED"),
            SqlType::UnsignedBigInt => write!(f, "BIGINT UNSIGNED"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({}, {})", precision, scale),
            SqlType::Real => write!(f, "REAL"),
            SqlType::Double => write!(f, "DOUBLE"),
            SqlType::Char(n) => write!(f, "CHAR({})", n),
            SqlType::Varchar(n) => write!(f, "VARCHAR({})", n),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Binary(n) => write!(f, "BINARY({})", n),
            SqlType::VarBinary(n) => write!(f, "VARBINARY({})", n),
            SqlType::Blob => write!(f, "BLOB"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Time { precision } => write!(f, "TIME({})", precision),
            SqlType::Timestamp { precision } => write!(f, "TIMESTAMP({})", precision),
            SqlType::TimestampTz { precision } => {
                write!(f, "TIMESTAMP({}) WITH TIME ZONE", precision)
            }
            SqlType::Uuid => write!(f, "UUID"),
            SqlType::Json => write!(f, "JSON"),
            SqlType::Geometry => write!(f, "GEOMETRY"),
        }
    }
}
