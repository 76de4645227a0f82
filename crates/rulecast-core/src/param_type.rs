//! Rule parameter types and value validation.
//!
//! Types are written in their textual form, e.g. `INTEGER` or
//! `SINGLE_SELECT_LIST,values="foo,bar"`.

use facet::Facet;
use std::fmt::{Display, Formatter};

/// The type of a rule parameter.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum ParamType {
    /// Single-line string (`STRING`).
    Str,
    /// Multi-line string (`TEXT`).
    Text,
    Boolean,
    Integer,
    Float,
    SingleSelectList { values: Vec<String> },
}

impl ParamType {
    /// Parse the textual form, returning the type and whether it allows
    /// multiple comma-separated values.
    pub fn parse(text: &str) -> Result<(ParamType, bool), String> {
        let text = text.trim();
        let (head, options) = match text.split_once(',') {
            Some((head, rest)) => (head.trim(), rest),
            None => (text, ""),
        };

        let mut multiple = false;
        let mut values: Option<Vec<String>> = None;
        for (name, value) in parse_options(options)? {
            match name.as_str() {
                "multiple" => multiple = value.eq_ignore_ascii_case("true"),
                "values" => {
                    values = Some(
                        value
                            .split(',')
                            .map(|v| v.trim().to_string())
                            .filter(|v| !v.is_empty())
                            .collect(),
                    )
                }
                other => return Err(format!("Unknown parameter type option '{other}'")),
            }
        }

        let param_type = match head.to_ascii_uppercase().as_str() {
            "STRING" => ParamType::Str,
            "TEXT" => ParamType::Text,
            "BOOLEAN" => ParamType::Boolean,
            "INTEGER" => ParamType::Integer,
            "FLOAT" => ParamType::Float,
            "SINGLE_SELECT_LIST" => ParamType::SingleSelectList {
                values: values.unwrap_or_default(),
            },
            _ => return Err(format!("Unknown parameter type '{head}'")),
        };
        Ok((param_type, multiple))
    }

    /// Check a value against this type. With `multiple`, the value is split
    /// on commas and every entry is checked.
    pub fn validate(&self, value: &str, multiple: bool) -> Result<(), String> {
        if multiple {
            value
                .split(',')
                .map(str::trim)
                .try_for_each(|entry| self.validate_one(entry))
        } else {
            self.validate_one(value)
        }
    }

    fn validate_one(&self, value: &str) -> Result<(), String> {
        match self {
            ParamType::Str | ParamType::Text => Ok(()),
            ParamType::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(format!("Value '{value}' must be one of : true, false.")),
            },
            ParamType::Integer => value
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("Value '{value}' must be an integer.")),
            ParamType::Float => value
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("Value '{value}' must be a floating point number.")),
            ParamType::SingleSelectList { values } => {
                if values.iter().any(|allowed| allowed == value) {
                    Ok(())
                } else {
                    Err(format!(
                        "Value '{value}' must be one of : {}.",
                        values.join(", ")
                    ))
                }
            }
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::Str => f.write_str("STRING"),
            ParamType::Text => f.write_str("TEXT"),
            ParamType::Boolean => f.write_str("BOOLEAN"),
            ParamType::Integer => f.write_str("INTEGER"),
            ParamType::Float => f.write_str("FLOAT"),
            ParamType::SingleSelectList { values } => {
                write!(f, "SINGLE_SELECT_LIST,values=\"{}\"", values.join(","))
            }
        }
    }
}

/// Split `name=value` options separated by commas. Values may be quoted, in
/// which case they can contain commas.
fn parse_options(input: &str) -> Result<Vec<(String, String)>, String> {
    let mut options = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let Some((name, after)) = rest.split_once('=') else {
            return Err(format!("Malformed parameter type option '{rest}'"));
        };
        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            let end = quoted
                .find('"')
                .ok_or_else(|| format!("Unterminated quote in '{after}'"))?;
            (&quoted[..end], &quoted[end + 1..])
        } else {
            match after.split_once(',') {
                Some((value, remaining)) => (value, remaining),
                None => (after, ""),
            }
        };
        options.push((name.trim().to_string(), value.to_string()));
        rest = remaining.trim_start().trim_start_matches(',').trim();
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_types() {
        assert_eq!(ParamType::parse("INTEGER"), Ok((ParamType::Integer, false)));
        assert_eq!(ParamType::parse("string"), Ok((ParamType::Str, false)));
        assert_eq!(ParamType::parse("TEXT"), Ok((ParamType::Text, false)));
        assert!(ParamType::parse("DATE").is_err());
    }

    #[test]
    fn parses_single_select_list_with_quoted_values() {
        let (param_type, multiple) =
            ParamType::parse("SINGLE_SELECT_LIST,multiple=true,values=\"foo,bar,baz\"")
                .expect("must parse");
        assert!(multiple);
        assert_eq!(
            param_type,
            ParamType::SingleSelectList {
                values: vec!["foo".into(), "bar".into(), "baz".into()]
            }
        );
        assert_eq!(
            param_type.to_string(),
            "SINGLE_SELECT_LIST,values=\"foo,bar,baz\""
        );
    }

    #[test]
    fn validates_numbers() {
        assert!(ParamType::Integer.validate("42", false).is_ok());
        assert_eq!(
            ParamType::Integer.validate("foo", false),
            Err("Value 'foo' must be an integer.".to_string())
        );
        assert!(ParamType::Float.validate("4.2", false).is_ok());
        assert!(ParamType::Float.validate("four", false).is_err());
    }

    #[test]
    fn validates_booleans_strictly() {
        assert!(ParamType::Boolean.validate("true", false).is_ok());
        assert!(ParamType::Boolean.validate("yes", false).is_err());
    }

    #[test]
    fn multiple_values_are_checked_one_by_one() {
        let list = ParamType::SingleSelectList {
            values: vec!["a".into(), "b".into()],
        };
        assert!(list.validate("a, b", true).is_ok());
        assert_eq!(
            list.validate("a,c", true),
            Err("Value 'c' must be one of : a, b.".to_string())
        );
        // Without `multiple` the whole string must match
        assert!(list.validate("a,b", false).is_err());
    }
}
