//! Runtime `{{var}}` interpolation.
//!
//! Template substitution is a *second* pass applied after expression
//! evaluation, over the resulting values — never over the expression
//! tree. Any string flowing into a directive, path, or print argument
//! has its placeholders replaced with the stringified variable; arrays
//! and objects are rewritten recursively.

use crate::value::Value;
use pipetest_base::template::placeholders;

/// Substitutes every `{{name}}` in `text`. The resolver returns the
/// replacement string, or `None` for unknown names, which aborts the
/// whole substitution with the offending name.
pub fn interpolate_str(
    text: &str,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<String, String> {
    let found = placeholders(text);
    if found.is_empty() {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for placeholder in found {
        out.push_str(&text[cursor..placeholder.start]);
        match resolve(placeholder.name) {
            Some(replacement) => out.push_str(&replacement),
            None => return Err(placeholder.name.to_string()),
        }
        cursor = placeholder.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

/// Recursively interpolates every string inside `value`.
pub fn interpolate_value(
    value: &Value,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<Value, String> {
    match value {
        Value::Str(text) => Ok(Value::Str(interpolate_str(text, resolve)?)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate_value(item, resolve)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate_value(item, resolve)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(name: &str) -> Option<String> {
        match name {
            "token" => Some("abc".to_string()),
            "n" => Some("42".to_string()),
            _ => None,
        }
    }

    #[test]
    fn replaces_placeholders_in_place() {
        assert_eq!(
            interpolate_str("Bearer {{token}}/{{n}}", &resolver).unwrap(),
            "Bearer abc/42"
        );
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(interpolate_str("plain", &resolver).unwrap(), "plain");
    }

    #[test]
    fn unknown_name_reports_the_name() {
        assert_eq!(
            interpolate_str("x{{ghost}}y", &resolver).unwrap_err(),
            "ghost"
        );
    }

    #[test]
    fn values_interpolate_recursively() {
        let value = Value::object([
            (
                "auth".to_string(),
                Value::Str("Bearer {{token}}".to_string()),
            ),
            (
                "list".to_string(),
                Value::Array(vec![Value::Str("{{n}}".to_string()), Value::Number(1.0)]),
            ),
        ]);
        let out = interpolate_value(&value, &resolver).unwrap();
        let Value::Object(map) = out else { panic!() };
        assert_eq!(map["auth"], Value::Str("Bearer abc".into()));
        let Value::Array(items) = &map["list"] else { panic!() };
        assert_eq!(items[0], Value::Str("42".into()));
    }
}
