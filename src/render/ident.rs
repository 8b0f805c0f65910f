//! Identifier quoting.

use crate::dialect::Dialect;
use crate::error::RenderError;

/// Quote `name` if the dialect requires it.
///
/// Identifiers are left bare unless they are reserved words, contain unsafe
/// characters, need case preserved, or the dialect quotes everything. A name
/// containing the dialect's own quote character is rejected, never escaped.
pub fn quote_ident(dialect: &Dialect, name: &str) -> Result<String, RenderError> {
    if name.is_empty() {
        return Err(RenderError::EmptyIdentifier);
    }
    if name.contains(dialect.quote) {
        return Err(RenderError::IdentifierQuote {
            ident: name.to_string(),
            quote: dialect.quote,
        });
    }
    let unsafe_chars = name.chars().any(|c| !c.is_ascii_alphanumeric() && c != '_')
        || name.starts_with(|c: char| c.is_ascii_digit());
    let needs_quote = dialect.quote_all_identifiers
        || unsafe_chars
        || dialect.keywords.contains(name)
        || (dialect.quote_mixed_case && name.chars().any(|c| c.is_ascii_uppercase()));
    if needs_quote {
        Ok(format!("{q}{name}{q}", q = dialect.quote))
    } else {
        Ok(name.to_string())
    }
}

/// Function names are emitted verbatim, so only plain (optionally
/// schema-qualified) names are accepted.
pub fn check_function_name(name: &str) -> Result<(), RenderError> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            part.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(RenderError::InvalidFunctionName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MySqlVersion;

    #[test]
    fn test_plain_identifier_unquoted() {
        assert_eq!(quote_ident(&Dialect::standard(), "users").unwrap(), "users");
    }

    #[test]
    fn test_keyword_quoted_per_dialect() {
        assert_eq!(quote_ident(&Dialect::postgres(), "order").unwrap(), "\"order\"");
        assert_eq!(
            quote_ident(&Dialect::mysql(MySqlVersion::V80), "order").unwrap(),
            "`order`"
        );
    }

    #[test]
    fn test_version_dependent_keyword() {
        // RANK became reserved in MySQL 8.0.
        assert_eq!(quote_ident(&Dialect::mysql(MySqlVersion::V57), "rank").unwrap(), "rank");
        assert_eq!(
            quote_ident(&Dialect::mysql(MySqlVersion::V80), "rank").unwrap(),
            "`rank`"
        );
    }

    #[test]
    fn test_mixed_case_on_postgres() {
        assert_eq!(quote_ident(&Dialect::postgres(), "tableX").unwrap(), "\"tableX\"");
        assert_eq!(quote_ident(&Dialect::standard(), "tableX").unwrap(), "tableX");
    }

    #[test]
    fn test_quote_char_is_error() {
        let err = quote_ident(&Dialect::postgres(), "we\"ird").unwrap_err();
        assert_eq!(
            err,
            RenderError::IdentifierQuote {
                ident: "we\"ird".to_string(),
                quote: '"'
            }
        );
    }

    #[test]
    fn test_unsafe_chars_quoted() {
        assert_eq!(quote_ident(&Dialect::sqlite(), "my col").unwrap(), "\"my col\"");
        assert_eq!(quote_ident(&Dialect::sqlite(), "1st").unwrap(), "\"1st\"");
    }

    #[test]
    fn test_function_name_validation() {
        assert!(check_function_name("COUNT").is_ok());
        assert!(check_function_name("pg_catalog.now").is_ok());
        assert!(check_function_name("drop table x; --").is_err());
    }
}
