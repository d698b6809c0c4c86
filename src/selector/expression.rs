//! Selector expression parsing.
//!
//! Grammar: `[<selector>:] <key> <operator> [(<v1>,<v2>,...) | <value>]`.
//! One string may hold several conditions, separated by whitespace or
//! commas. A condition using a value-less operator (e.g. `Exists`) must be
//! followed by a comma when another condition comes after it, otherwise the
//! next key is read as its value.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::SelectorError;

/// A single parsed selector condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorExpression {
    /// The condition text as written.
    pub raw: String,
    /// Matching strategy name, when given as a `name:` prefix.
    pub selector: Option<String>,
    /// Field path, label key or annotation key the condition applies to.
    pub key: String,
    /// Operator name as written.
    pub operator: String,
    /// Literal values.
    pub values: Vec<String>,
}

static CONDITION: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:(?P<selector>[A-Za-z][A-Za-z0-9_-]*):)?
        (?P<key>[A-Za-z0-9_][A-Za-z0-9_./@\-\[\]]*)
        \s+
        (?P<operator>[A-Za-z]+)
        (?:
            \s*\((?P<list>[^()]*)\)
          | \s+(?P<single>[^\s(),]+)
        )?",
    )
});

/// Parses an expression string into its conditions.
///
/// # Errors
///
/// Returns [`SelectorError::Parse`] if the string is blank, if no condition
/// can be matched, or if text that is not a separator remains between or
/// around the matched conditions.
pub fn parse_expression_string(expr: &str) -> Result<Vec<SelectorExpression>, SelectorError> {
    if expr.trim().is_empty() {
        return Err(SelectorError::parse(expr, "expression is blank"));
    }

    let regex = CONDITION
        .as_ref()
        .map_err(|e| SelectorError::parse(expr, format!("condition grammar failed to compile: {e}")))?;

    let mut expressions = Vec::new();
    let mut cursor = 0;

    for captures in regex.captures_iter(expr) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        check_separator(&expr[cursor..whole.start()])?;
        cursor = whole.end();

        let values = captures.name("list").map_or_else(
            || {
                captures
                    .name("single")
                    .map(|m| vec![unquote(m.as_str())])
                    .unwrap_or_default()
            },
            |m| split_values(m.as_str()),
        );

        expressions.push(SelectorExpression {
            raw: whole.as_str().trim().to_string(),
            selector: captures.name("selector").map(|m| m.as_str().to_string()),
            key: captures
                .name("key")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            operator: captures
                .name("operator")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            values,
        });
    }

    if expressions.is_empty() {
        return Err(SelectorError::parse(
            expr,
            "expected '[selector:]<key> <operator> [values]'",
        ));
    }
    check_separator(&expr[cursor..])?;

    debug!("Parsed {} selector condition(s) from '{expr}'", expressions.len());
    Ok(expressions)
}

/// Rejects anything but whitespace and commas between conditions.
fn check_separator(gap: &str) -> Result<(), SelectorError> {
    if gap.chars().all(|c| c.is_whitespace() || c == ',') {
        Ok(())
    } else {
        Err(SelectorError::parse(
            gap.trim(),
            "unexpected text outside of a condition",
        ))
    }
}

/// Splits a parenthesized value list.
fn split_values(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(unquote)
        .collect()
}

/// Strips one pair of matching surrounding quotes.
fn unquote(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    value.to_string()
}

impl std::fmt::Display for SelectorExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_selector_with_list() {
        let parsed = parse_expression_string("status:key In (a,b,c)").unwrap();
        assert_eq!(
            parsed,
            vec![SelectorExpression {
                raw: String::from("status:key In (a,b,c)"),
                selector: Some(String::from("status")),
                key: String::from("key"),
                operator: String::from("In"),
                values: vec![String::from("a"), String::from("b"), String::from("c")],
            }]
        );
    }

    #[test]
    fn test_parse_single_value_and_dotted_key() {
        let parsed = parse_expression_string("spec.partitions In 3").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].selector, None);
        assert_eq!(parsed[0].key, "spec.partitions");
        assert_eq!(parsed[0].values, vec![String::from("3")]);
    }

    #[test]
    fn test_parse_multiple_conditions() {
        let parsed =
            parse_expression_string("label:team In (payments, 'billing') metadata.name Exists, kind In Topic")
                .unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].values, vec![String::from("payments"), String::from("billing")]);
        assert_eq!(parsed[1].operator, "Exists");
        assert!(parsed[1].values.is_empty());
        assert_eq!(parsed[2].key, "kind");
        assert_eq!(parsed[2].values, vec![String::from("Topic")]);
    }

    #[test]
    fn test_parse_quoted_single_value() {
        let parsed = parse_expression_string("metadata.name Matches \"orders-.*\"").unwrap();
        assert_eq!(parsed[0].values, vec![String::from("orders-.*")]);
    }

    #[test]
    fn test_blank_is_error() {
        assert!(matches!(
            parse_expression_string("   "),
            Err(SelectorError::Parse { .. })
        ));
    }

    #[test]
    fn test_unmatchable_is_error() {
        assert!(matches!(
            parse_expression_string("???"),
            Err(SelectorError::Parse { .. })
        ));
    }

    #[test]
    fn test_trailing_garbage_names_substring() {
        let err = parse_expression_string("kind In (Topic) !!").unwrap_err();
        match err {
            SelectorError::Parse { expression, .. } => assert_eq!(expression, "!!"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
