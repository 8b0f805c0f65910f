//! Reserved keyword sets, one per engine version.
//!
//! Words are lowercase; lookups are case-insensitive.

/// A reserved-word set, optionally layered over a base set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordSet {
    base: &'static [&'static str],
    extra: &'static [&'static str],
}

impl KeywordSet {
    pub const fn new(base: &'static [&'static str]) -> Self {
        Self { base, extra: &[] }
    }

    pub const fn layered(base: &'static [&'static str], extra: &'static [&'static str]) -> Self {
        Self { base, extra }
    }

    pub fn contains(&self, word: &str) -> bool {
        let lower = word.to_ascii_lowercase();
        self.base.contains(&lower.as_str()) || self.extra.contains(&lower.as_str())
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub const SQL92: &[&str] = &[
    "absolute", "action", "add", "all", "allocate", "alter", "and", "any", "are", "as", "asc",
    "assertion", "at", "authorization", "avg", "begin", "between", "bit", "bit_length", "both",
    "by", "cascade", "cascaded", "case", "cast", "catalog", "char", "character", "char_length",
    "character_length", "check", "close", "coalesce", "collate", "collation", "column", "commit",
    "connect", "connection", "constraint", "constraints", "continue", "convert", "corresponding",
    "count", "create", "cross", "current", "current_date", "current_time", "current_timestamp",
    "current_user", "cursor", "date", "day", "deallocate", "dec", "decimal", "declare", "default",
    "deferrable", "deferred", "delete", "desc", "describe", "descriptor", "diagnostics",
    "disconnect", "distinct", "domain", "double", "drop", "else", "end", "escape", "except",
    "exception", "exec", "execute", "exists", "external", "extract", "false", "fetch", "first",
    "float", "for", "foreign", "found", "from", "full", "get", "global", "go", "goto", "grant",
    "group", "having", "hour", "identity", "immediate", "in", "indicator", "initially", "inner",
    "input", "insensitive", "insert", "int", "integer", "intersect", "interval", "into", "is",
    "isolation", "join", "key", "language", "last", "leading", "left", "level", "like", "local",
    "lower", "match", "max", "min", "minute", "module", "month", "names", "national", "natural",
    "nchar", "next", "no", "not", "null", "nullif", "numeric", "octet_length", "of", "on", "only",
    "open", "option", "or", "order", "outer", "output", "overlaps", "pad", "partial", "position",
    "precision", "prepare", "preserve", "primary", "prior", "privileges", "procedure", "public",
    "read", "real", "references", "relative", "restrict", "revoke", "right", "rollback", "rows",
    "schema", "scroll", "second", "section", "select", "session", "session_user", "set", "size",
    "smallint", "some", "space", "sql", "sqlcode", "sqlerror", "sqlstate", "substring", "sum",
    "system_user", "table", "temporary", "then", "time", "timestamp", "timezone_hour",
    "timezone_minute", "to", "trailing", "transaction", "translate", "translation", "trim",
    "true", "union", "unique", "unknown", "update", "upper", "usage", "user", "using", "value",
    "values", "varchar", "varying", "view", "when", "whenever", "where", "with", "work", "write",
    "year", "zone",
];

/// Words reserved by SQL:2003 on top of SQL-92.
pub const SQL2003_ADDED: &[&str] = &[
    "array", "asymmetric", "atomic", "bigint", "binary", "blob", "boolean", "call", "called",
    "clob", "cube", "current_role", "cycle", "dynamic", "each", "element", "filter", "function",
    "grouping", "hold", "large", "lateral", "localtime", "localtimestamp", "member", "merge",
    "method", "modifies", "multiset", "new", "none", "old", "over", "parameter", "partition",
    "range", "recursive", "ref", "referencing", "release", "return", "returns", "rollup", "row",
    "savepoint", "scope", "search", "sensitive", "similar", "specific", "start", "static",
    "symmetric", "system", "tablesample", "treat", "trigger", "under", "unnest", "window",
    "within", "without",
];

pub const POSTGRES: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation", "column",
    "concurrently", "constraint", "create", "cross", "current_catalog", "current_date",
    "current_role", "current_schema", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch",
    "for", "foreign", "freeze", "from", "full", "grant", "group", "having", "ilike", "in",
    "initially", "inner", "intersect", "into", "is", "isnull", "join", "lateral", "leading",
    "left", "like", "limit", "localtime", "localtimestamp", "natural", "not", "notnull", "null",
    "offset", "on", "only", "or", "order", "outer", "overlaps", "placing", "primary",
    "references", "returning", "right", "select", "session_user", "similar", "some",
    "symmetric", "system_user", "table", "tablesample", "then", "to", "trailing", "true",
    "union", "unique", "user", "using", "variadic", "verbose", "when", "where", "window", "with",
];

pub const MYSQL57: &[&str] = &[
    "accessible", "add", "all", "alter", "analyze", "and", "as", "asc", "asensitive", "before",
    "between", "bigint", "binary", "blob", "both", "by", "call", "cascade", "case", "change",
    "char", "character", "check", "collate", "column", "condition", "constraint", "continue",
    "convert", "create", "cross", "current_date", "current_time", "current_timestamp",
    "current_user", "cursor", "database", "databases", "day_hour", "day_microsecond",
    "day_minute", "day_second", "dec", "decimal", "declare", "default", "delayed", "delete",
    "desc", "describe", "deterministic", "distinct", "distinctrow", "div", "double", "drop",
    "dual", "each", "else", "elseif", "enclosed", "escaped", "exists", "exit", "explain", "false",
    "fetch", "float", "float4", "float8", "for", "force", "foreign", "from", "fulltext",
    "generated", "get", "grant", "group", "having", "high_priority", "hour_microsecond",
    "hour_minute", "hour_second", "if", "ignore", "in", "index", "infile", "inner", "inout",
    "insensitive", "insert", "int", "int1", "int2", "int3", "int4", "int8", "integer", "interval",
    "into", "io_after_gtids", "io_before_gtids", "is", "iterate", "join", "key", "keys", "kill",
    "leading", "leave", "left", "like", "limit", "linear", "lines", "load", "localtime",
    "localtimestamp", "lock", "long", "longblob", "longtext", "loop", "low_priority",
    "master_bind", "master_ssl_verify_server_cert", "match", "maxvalue", "mediumblob",
    "mediumint", "mediumtext", "middleint", "minute_microsecond", "minute_second", "mod",
    "modifies", "natural", "not", "no_write_to_binlog", "null", "numeric", "on", "optimize",
    "optimizer_costs", "option", "optionally", "or", "order", "out", "outer", "outfile",
    "partition", "precision", "primary", "procedure", "purge", "range", "read", "reads",
    "read_write", "real", "references", "regexp", "release", "rename", "repeat", "replace",
    "require", "resignal", "restrict", "return", "revoke", "right", "rlike", "schema", "schemas",
    "second_microsecond", "select", "sensitive", "separator", "set", "show", "signal",
    "smallint", "spatial", "specific", "sql", "sqlexception", "sqlstate", "sqlwarning",
    "sql_big_result", "sql_calc_found_rows", "sql_small_result", "ssl", "starting", "stored",
    "straight_join", "table", "terminated", "then", "tinyblob", "tinyint", "tinytext", "to",
    "trailing", "trigger", "true", "undo", "union", "unique", "unlock", "unsigned", "update",
    "usage", "use", "using", "utc_date", "utc_time", "utc_timestamp", "values", "varbinary",
    "varchar", "varcharacter", "varying", "virtual", "when", "where", "while", "with", "write",
    "xor", "year_month", "zerofill",
];

/// Words MySQL 8.0 reserves beyond 5.7 (window functions, CTEs, JSON_TABLE).
pub const MYSQL80_ADDED: &[&str] = &[
    "cube", "cume_dist", "dense_rank", "empty", "except", "first_value", "function", "grouping",
    "groups", "json_table", "lag", "last_value", "lateral", "lead", "nth_value", "ntile", "of",
    "over", "percent_rank", "rank", "recursive", "row", "rows", "row_number", "system", "window",
];

pub const SQLITE: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross",
    "current", "current_date", "current_time", "current_timestamp", "database", "default",
    "deferrable", "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each",
    "else", "end", "escape", "except", "exclude", "exclusive", "exists", "explain", "fail",
    "filter", "first", "following", "for", "foreign", "from", "full", "generated", "glob",
    "group", "groups", "having", "if", "ignore", "immediate", "in", "index", "indexed",
    "initially", "inner", "insert", "instead", "intersect", "into", "is", "isnull", "join",
    "key", "last", "left", "like", "limit", "match", "materialized", "natural", "no", "not",
    "nothing", "notnull", "null", "nulls", "of", "offset", "on", "or", "order", "others",
    "outer", "over", "partition", "plan", "pragma", "preceding", "primary", "query", "raise",
    "range", "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "returning", "right", "rollback", "row", "rows", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "ties", "to", "transaction", "trigger", "unbounded",
    "union", "unique", "update", "using", "vacuum", "values", "view", "virtual", "when", "where",
    "window", "with", "without",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_versions_differ() {
        let v57 = KeywordSet::new(MYSQL57);
        let v80 = KeywordSet::layered(MYSQL57, MYSQL80_ADDED);
        assert!(!v57.contains("rank"));
        assert!(v80.contains("RANK"));
        assert!(v57.contains("Select"));
    }
}
