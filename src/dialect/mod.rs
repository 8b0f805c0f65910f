//! Dialect capability descriptors.
//!
//! A `Dialect` is a plain value selected once per target and passed to the
//! renderer. Engine differences are flags and small formatting choices, not
//! subclasses.

pub mod keywords;

use serde::{Deserialize, Serialize};

use crate::error::{QailError, QailResult};
pub use keywords::KeywordSet;

/// Target engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Standard,
    Sql92,
    Postgres,
    #[serde(alias = "mysql")]
    MySql,
    Sqlite,
}

/// MySQL major versions with distinct keyword sets and feature levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MySqlVersion {
    #[serde(rename = "5.7")]
    V57,
    #[serde(rename = "8.0")]
    V80,
}

impl MySqlVersion {
    pub fn parse(version: &str) -> Option<Self> {
        match version.trim() {
            "5.7" | "57" => Some(Self::V57),
            "8" | "8.0" | "80" => Some(Self::V80),
            _ => None,
        }
    }
}

/// Parameter placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?`
    Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolStyle {
    /// `TRUE` / `FALSE`
    Keyword,
    /// `1` / `0`
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryStyle {
    /// `X'0AFF'`
    HexString,
    /// `'\x0aff'`
    EscapedHex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH FIRST n ROWS ONLY`
    FetchFirst,
}

/// Order of the two physical statements of a split UPDATE/DELETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitOrder {
    ChildFirst,
    ParentFirst,
}

/// Clause availability, consulted by builders at build time and by the
/// renderer at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub cte: bool,
    pub recursive_cte: bool,
    pub window: bool,
    pub only_modifier: bool,
    pub returning: bool,
    pub multi_table_update: bool,
    pub multi_table_delete: bool,
    pub row_constructor_set: bool,
    pub full_join: bool,
    pub nulls_ordering: bool,
    pub parenthesized_set_ops: bool,
}

impl Capabilities {
    /// Everything enabled; used by builders created without a dialect.
    pub const fn all() -> Self {
        Self {
            cte: true,
            recursive_cte: true,
            window: true,
            only_modifier: true,
            returning: true,
            multi_table_update: true,
            multi_table_delete: true,
            row_constructor_set: true,
            full_join: true,
            nulls_ordering: true,
            parenthesized_set_ops: true,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Capability descriptor for one engine/version.
#[derive(Debug, Clone, PartialEq)]
pub struct Dialect {
    pub name: &'static str,
    pub engine: Engine,
    pub quote: char,
    pub keywords: KeywordSet,
    pub capabilities: Capabilities,
    /// Emit `t AS a` rather than `t a`.
    pub table_alias_as: bool,
    /// `DATE '...'` / `TIMESTAMP '...'` rather than bare strings.
    pub typed_temporal_literals: bool,
    /// Backslash is an escape character inside string literals.
    pub backslash_escapes: bool,
    /// Unquoted identifiers fold to lowercase, so mixed case must be quoted.
    pub quote_mixed_case: bool,
    pub quote_all_identifiers: bool,
    /// Function that reads a column default, e.g. MySQL `DEFAULT(col)`.
    pub default_function: Option<&'static str>,
    /// `CONCAT(a, b)` instead of `a || b`.
    pub concat_function: bool,
    pub placeholder: Placeholder,
    pub bool_style: BoolStyle,
    pub binary_style: BinaryStyle,
    pub limit_style: LimitStyle,
    /// LIMIT value meaning "no limit" when only OFFSET is given.
    pub unbounded_limit: Option<&'static str>,
    pub update_lock: bool,
    pub share_lock: Option<&'static str>,
    /// Maximum fractional-second digits for TIME/TIMESTAMP literals.
    pub max_time_precision: u8,
    /// Binary values longer than this are bound instead of inlined.
    pub max_binary_literal: usize,
    pub split_order: SplitOrder,
}

impl Dialect {
    /// SQL:2003-level standard profile.
    pub fn standard() -> Self {
        Self {
            name: "Standard SQL",
            engine: Engine::Standard,
            quote: '"',
            keywords: KeywordSet::layered(keywords::SQL92, keywords::SQL2003_ADDED),
            capabilities: Capabilities {
                only_modifier: false,
                returning: false,
                multi_table_update: false,
                multi_table_delete: false,
                ..Capabilities::all()
            },
            table_alias_as: true,
            typed_temporal_literals: true,
            backslash_escapes: false,
            quote_mixed_case: false,
            quote_all_identifiers: false,
            default_function: None,
            concat_function: false,
            placeholder: Placeholder::Question,
            bool_style: BoolStyle::Keyword,
            binary_style: BinaryStyle::HexString,
            limit_style: LimitStyle::FetchFirst,
            unbounded_limit: None,
            update_lock: true,
            share_lock: None,
            max_time_precision: 9,
            max_binary_literal: 4096,
            split_order: SplitOrder::ChildFirst,
        }
    }

    /// SQL-92 entry level: no CTEs, no window functions, no NULLS ordering.
    pub fn sql92() -> Self {
        Self {
            name: "SQL-92",
            engine: Engine::Sql92,
            keywords: KeywordSet::new(keywords::SQL92),
            capabilities: Capabilities {
                cte: false,
                recursive_cte: false,
                window: false,
                nulls_ordering: false,
                ..Self::standard().capabilities
            },
            ..Self::standard()
        }
    }

    pub fn postgres() -> Self {
        Self {
            name: "PostgreSQL",
            engine: Engine::Postgres,
            quote: '"',
            keywords: KeywordSet::new(keywords::POSTGRES),
            capabilities: Capabilities {
                multi_table_update: false,
                multi_table_delete: false,
                ..Capabilities::all()
            },
            table_alias_as: true,
            typed_temporal_literals: true,
            backslash_escapes: false,
            quote_mixed_case: true,
            quote_all_identifiers: false,
            default_function: None,
            concat_function: false,
            placeholder: Placeholder::Dollar,
            bool_style: BoolStyle::Keyword,
            binary_style: BinaryStyle::EscapedHex,
            limit_style: LimitStyle::LimitOffset,
            unbounded_limit: None,
            update_lock: true,
            share_lock: Some("FOR SHARE"),
            max_time_precision: 6,
            max_binary_literal: 4096,
            split_order: SplitOrder::ChildFirst,
        }
    }

    pub fn mysql(version: MySqlVersion) -> Self {
        let modern = version == MySqlVersion::V80;
        Self {
            name: if modern { "MySQL 8.0" } else { "MySQL 5.7" },
            engine: Engine::MySql,
            quote: '`',
            keywords: if modern {
                KeywordSet::layered(keywords::MYSQL57, keywords::MYSQL80_ADDED)
            } else {
                KeywordSet::new(keywords::MYSQL57)
            },
            capabilities: Capabilities {
                cte: modern,
                recursive_cte: modern,
                window: modern,
                only_modifier: false,
                returning: false,
                multi_table_update: true,
                multi_table_delete: true,
                row_constructor_set: false,
                full_join: false,
                nulls_ordering: false,
                parenthesized_set_ops: true,
            },
            table_alias_as: true,
            typed_temporal_literals: true,
            backslash_escapes: true,
            quote_mixed_case: false,
            quote_all_identifiers: false,
            default_function: Some("DEFAULT"),
            concat_function: true,
            placeholder: Placeholder::Question,
            bool_style: BoolStyle::Keyword,
            binary_style: BinaryStyle::HexString,
            limit_style: LimitStyle::LimitOffset,
            unbounded_limit: Some("18446744073709551615"),
            update_lock: true,
            share_lock: Some(if modern {
                "FOR SHARE"
            } else {
                "LOCK IN SHARE MODE"
            }),
            max_time_precision: 6,
            max_binary_literal: 4096,
            split_order: SplitOrder::ChildFirst,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            name: "SQLite",
            engine: Engine::Sqlite,
            quote: '"',
            keywords: KeywordSet::new(keywords::SQLITE),
            capabilities: Capabilities {
                only_modifier: false,
                multi_table_update: false,
                multi_table_delete: false,
                parenthesized_set_ops: false,
                ..Capabilities::all()
            },
            table_alias_as: true,
            typed_temporal_literals: false,
            backslash_escapes: false,
            quote_mixed_case: false,
            quote_all_identifiers: false,
            default_function: None,
            concat_function: false,
            placeholder: Placeholder::Question,
            bool_style: BoolStyle::Numeric,
            binary_style: BinaryStyle::HexString,
            limit_style: LimitStyle::LimitOffset,
            unbounded_limit: Some("-1"),
            update_lock: false,
            share_lock: None,
            max_time_precision: 3,
            max_binary_literal: 4096,
            split_order: SplitOrder::ChildFirst,
        }
    }

    /// Build a dialect from deserialized configuration.
    pub fn from_config(config: &DialectConfig) -> QailResult<Self> {
        let mut dialect = match config.engine {
            Engine::Standard => Self::standard(),
            Engine::Sql92 => Self::sql92(),
            Engine::Postgres => Self::postgres(),
            Engine::Sqlite => Self::sqlite(),
            Engine::MySql => {
                let version = match config.version.as_deref() {
                    None => MySqlVersion::V80,
                    Some(v) => MySqlVersion::parse(v).ok_or_else(|| {
                        QailError::Config(format!("unsupported MySQL version '{}'", v))
                    })?,
                };
                Self::mysql(version)
            }
        };
        if let Some(quote_all) = config.quote_all_identifiers {
            dialect.quote_all_identifiers = quote_all;
        }
        if let Some(order) = config.split_order {
            dialect.split_order = order;
        }
        if let Some(limit) = config.max_binary_literal {
            dialect.max_binary_literal = limit;
        }
        Ok(dialect)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn bool_literal(&self, val: bool) -> &'static str {
        match (self.bool_style, val) {
            (BoolStyle::Keyword, true) => "TRUE",
            (BoolStyle::Keyword, false) => "FALSE",
            (BoolStyle::Numeric, true) => "1",
            (BoolStyle::Numeric, false) => "0",
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self.placeholder {
            Placeholder::Dollar => format!("${}", index),
            Placeholder::Question => "?".to_string(),
        }
    }

    pub fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        match self.limit_style {
            LimitStyle::LimitOffset => {
                match (limit, self.unbounded_limit) {
                    (Some(n), _) => sql.push_str(&format!(" LIMIT {}", n)),
                    (None, Some(all)) if offset.is_some() => {
                        sql.push_str(&format!(" LIMIT {}", all))
                    }
                    _ => {}
                }
                if let Some(n) = offset {
                    sql.push_str(&format!(" OFFSET {}", n));
                }
            }
            LimitStyle::FetchFirst => {
                if let Some(n) = offset {
                    sql.push_str(&format!(" OFFSET {} ROWS", n));
                }
                if let Some(n) = limit {
                    sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", n));
                }
            }
        }
        sql
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Serializable dialect selection.
///
/// ```
/// use qail_criteria::dialect::{Dialect, DialectConfig};
///
/// let config: DialectConfig =
///     serde_json::from_str(r#"{"engine": "mysql", "version": "5.7"}"#).unwrap();
/// let dialect = Dialect::from_config(&config).unwrap();
/// assert!(!dialect.capabilities.cte);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    pub engine: Engine,
    pub version: Option<String>,
    pub quote_all_identifiers: Option<bool>,
    pub split_order: Option<SplitOrder>,
    pub max_binary_literal: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset_styles() {
        assert_eq!(
            Dialect::postgres().limit_offset(Some(10), Some(5)),
            " LIMIT 10 OFFSET 5"
        );
        assert_eq!(Dialect::sqlite().limit_offset(None, Some(5)), " LIMIT -1 OFFSET 5");
        assert_eq!(
            Dialect::standard().limit_offset(Some(10), Some(5)),
            " OFFSET 5 ROWS FETCH FIRST 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_config_overrides() {
        let config: DialectConfig = serde_json::from_str(
            r#"{"engine": "postgres", "quote_all_identifiers": true, "split_order": "parent_first"}"#,
        )
        .unwrap();
        let dialect = Dialect::from_config(&config).unwrap();
        assert_eq!(dialect.engine, Engine::Postgres);
        assert!(dialect.quote_all_identifiers);
        assert_eq!(dialect.split_order, SplitOrder::ParentFirst);
    }

    #[test]
    fn test_config_rejects_unknown_version() {
        let config = DialectConfig {
            engine: Engine::MySql,
            version: Some("4.1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Dialect::from_config(&config),
            Err(QailError::Config(_))
        ));
    }

    #[test]
    fn test_sql92_disallows_cte() {
        let d = Dialect::sql92();
        assert!(!d.capabilities.cte);
        assert!(!d.capabilities.window);
        assert!(Dialect::standard().capabilities.cte);
    }
}
