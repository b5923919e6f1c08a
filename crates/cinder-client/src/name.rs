//! Table identifier normalization.
//!
//! Identifiers have the form `SCHEMA.NAME`. When the schema is omitted the
//! configured default schema (normally [`DEFAULT_SCHEMA`]) is used.
//!
//! The catalog's canonical case is **upper case**:
//!
//! - unquoted components are folded to upper case (`pub.tbl1` → `PUB.TBL1`)
//! - quoted components keep their exact characters (`PUB."tbl1"` → `PUB` /
//!   `tbl1`); a doubled quote inside quotes stands for one quote character
//! - quoted components may contain dots; only unquoted dots separate
//!
//! ```rust
//! use cinder_client::QualifiedName;
//!
//! let name = QualifiedName::parse("pub.tbl1").unwrap();
//! assert_eq!(name.canonical(), "PUB.TBL1");
//!
//! let quoted = QualifiedName::parse(r#"PUB."MixedCase""#).unwrap();
//! assert_eq!(quoted.name(), "MixedCase");
//! assert_eq!(quoted.quoted(), r#"PUB."MixedCase""#);
//! ```

use std::fmt;
use std::str::FromStr;

use cinder_proto::TableName;

use crate::error::{ClientError, ClientResult};

/// Schema assumed when an identifier has no schema part.
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

const QUOTE: char = '"';
const SEPARATOR: char = '.';

/// A normalized `(schema, name)` pair.
///
/// Equality is componentwise exact string equality; both components are
/// stored in their post-fold form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    schema: String,
    name: String,
}

impl QualifiedName {
    /// Parses and normalizes an identifier, defaulting the schema to
    /// [`DEFAULT_SCHEMA`].
    pub fn parse(input: &str) -> ClientResult<Self> {
        Self::parse_with_schema(input, DEFAULT_SCHEMA)
    }

    /// Parses and normalizes an identifier.
    ///
    /// `default_schema` must already be in canonical form; it is used
    /// verbatim when `input` has no schema part.
    pub fn parse_with_schema(input: &str, default_schema: &str) -> ClientResult<Self> {
        let mut parts = split_components(input)?;
        match parts.len() {
            1 => Ok(Self {
                schema: default_schema.to_string(),
                name: parts.remove(0),
            }),
            2 => {
                let name = parts.remove(1);
                let schema = parts.remove(0);
                Ok(Self { schema, name })
            }
            _ => Err(ClientError::invalid_identifier(
                input,
                "more than one unquoted dot",
            )),
        }
    }

    /// Builds a name from components that are already canonical.
    ///
    /// No folding or validation is applied.
    pub fn from_parts(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Schema component.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical string form: `SCHEMA.NAME`, components printed unquoted.
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.schema, SEPARATOR, self.name)
    }

    /// String form that parses back to an equal name.
    ///
    /// Components that would change under folding, or that contain dots,
    /// quotes or whitespace, are printed quoted.
    pub fn quoted(&self) -> String {
        format!(
            "{}{}{}",
            quote_if_needed(&self.schema),
            SEPARATOR,
            quote_if_needed(&self.name)
        )
    }

    /// Converts to the wire representation.
    pub fn to_wire(&self) -> TableName {
        TableName::new(self.schema.clone(), self.name.clone())
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.schema, SEPARATOR, self.name)
    }
}

impl FromStr for QualifiedName {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<TableName> for QualifiedName {
    fn from(name: TableName) -> Self {
        Self {
            schema: name.schema,
            name: name.name,
        }
    }
}

/// Parses a single identifier component (no separator allowed).
pub(crate) fn parse_component(component: &str, input: &str) -> ClientResult<String> {
    let mut parts = split_components(component)?;
    if parts.len() != 1 {
        return Err(ClientError::invalid_identifier(
            input,
            "expected a single identifier component",
        ));
    }
    Ok(parts.remove(0))
}

/// Splits an identifier at unquoted dots and normalizes each component.
fn split_components(input: &str) -> ClientResult<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid_identifier(input, "empty identifier"));
    }

    let mut parts = Vec::with_capacity(2);
    let mut chars = trimmed.chars().peekable();

    loop {
        let component = if chars.peek() == Some(&QUOTE) {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == QUOTE {
                    if chars.peek() == Some(&QUOTE) {
                        chars.next();
                        text.push(QUOTE);
                    } else {
                        closed = true;
                        break;
                    }
                } else {
                    text.push(c);
                }
            }
            if !closed {
                return Err(ClientError::invalid_identifier(input, "unmatched quote"));
            }
            text
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c == SEPARATOR {
                    break;
                }
                if c == QUOTE {
                    return Err(ClientError::invalid_identifier(
                        input,
                        "quote inside an unquoted component",
                    ));
                }
                if c.is_whitespace() {
                    return Err(ClientError::invalid_identifier(
                        input,
                        "whitespace inside an unquoted component",
                    ));
                }
                text.push(c);
                chars.next();
            }
            text.to_uppercase()
        };

        if component.is_empty() {
            return Err(ClientError::invalid_identifier(input, "empty component"));
        }
        parts.push(component);

        match chars.next() {
            None => break,
            Some(SEPARATOR) => continue,
            Some(c) => {
                return Err(ClientError::invalid_identifier(
                    input,
                    format!("unexpected character {c:?} after a quoted component"),
                ))
            }
        }
    }

    Ok(parts)
}

fn quote_if_needed(component: &str) -> String {
    let plain = !component.is_empty()
        && component.to_uppercase() == component
        && !component
            .chars()
            .any(|c| c == SEPARATOR || c == QUOTE || c.is_whitespace());

    if plain {
        component.to_string()
    } else {
        let escaped = component.replace(QUOTE, "\"\"");
        format!("{QUOTE}{escaped}{QUOTE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn parse(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    fn reason(s: &str) -> String {
        match QualifiedName::parse(s).unwrap_err() {
            ClientError::InvalidIdentifier { reason, .. } => reason,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unquoted_folds_to_upper() {
        let name = parse("pub.tbl1");
        assert_eq!(name.schema(), "PUB");
        assert_eq!(name.name(), "TBL1");
        assert_eq!(name.canonical(), "PUB.TBL1");
        assert_eq!(parse("PUB.tbl1"), parse("pub.TBL1"));
    }

    #[test]
    fn test_default_schema() {
        assert_eq!(parse("orders").canonical(), "PUBLIC.ORDERS");
        let name = QualifiedName::parse_with_schema("orders", "PUB").unwrap();
        assert_eq!(name.canonical(), "PUB.ORDERS");
    }

    #[test]
    fn test_quoted_components_keep_case() {
        let name = parse(r#""Sales"."tbl1""#);
        assert_eq!(name.schema(), "Sales");
        assert_eq!(name.name(), "tbl1");
        assert_eq!(name.canonical(), "Sales.tbl1");
        assert_ne!(name, parse("Sales.tbl1"));
    }

    #[test]
    fn test_quoted_dot_and_escaped_quote() {
        let name = parse(r#"PUB."a.b""c""#);
        assert_eq!(name.schema(), "PUB");
        assert_eq!(name.name(), "a.b\"c");
        assert_eq!(name.quoted(), r#"PUB."a.b""c""#);
        assert_eq!(parse(&name.quoted()), name);
    }

    #[test]
    fn test_quoted_upper_equals_unquoted() {
        assert_eq!(parse(r#"PUB."TBL1""#), parse("pub.tbl1"));
    }

    #[test]
    fn test_canonical_reparses_for_plain_names() {
        let name = parse("pub.tbl1");
        assert_eq!(parse(&name.canonical()), name);
        assert_eq!(name.quoted(), "PUB.TBL1");
    }

    #[test]
    fn test_outer_whitespace_ignored() {
        assert_eq!(parse("  pub.tbl1 "), parse("PUB.TBL1"));
    }

    #[test]
    fn test_malformed_identifiers() {
        assert_eq!(reason(""), "empty identifier");
        assert_eq!(reason("PUB..bad"), "empty component");
        assert_eq!(reason(".tbl"), "empty component");
        assert_eq!(reason("PUB."), "empty component");
        assert_eq!(reason(r#"PUB."""#), "empty component");
        assert_eq!(reason(r#"PUB."tbl"#), "unmatched quote");
        assert_eq!(reason("a.b.c"), "more than one unquoted dot");
        assert_eq!(reason("PUB.my table"), "whitespace inside an unquoted component");
        assert_eq!(reason(r#"PUB.ab"c""#), "quote inside an unquoted component");
        assert!(reason(r#""a"b.c"#).starts_with("unexpected character"));
    }

    #[test]
    fn test_errors_are_invalid_argument() {
        let err = QualifiedName::parse("PUB..bad").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("PUB..bad"));
    }

    #[test]
    fn test_from_str_and_wire() {
        let name: QualifiedName = "pub.tbl1".parse().unwrap();
        let wire = name.to_wire();
        assert_eq!(wire, TableName::new("PUB", "TBL1"));
        assert_eq!(QualifiedName::from(wire), name);
    }

    #[test]
    fn test_parse_component() {
        assert_eq!(parse_component("pub", "pub").unwrap(), "PUB");
        assert_eq!(parse_component(r#""Pub""#, "x").unwrap(), "Pub");
        assert!(parse_component("a.b", "a.b").is_err());
    }
}
