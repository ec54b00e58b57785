//! Uniform template variable schema.
//!
//! Template providers describe their placeholders in several shapes: HeyGen
//! returns a map keyed by variable name, stored fallbacks are plain rows, and
//! older integrations send arrays of strings or objects using `variable_name`,
//! `key`, `label` and so on. Everything is folded into [`TemplateVariable`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use ts_rs::TS;

/// Limit applied to text variables whose source does not state one.
pub const DEFAULT_TEXT_CHAR_LIMIT: u32 = 100;

const NAME_KEYS: &[&str] = &["name", "variable_name", "variableName", "key", "id", "label"];
const TYPE_KEYS: &[&str] = &["type", "variable_type", "variableType", "kind"];
const LIMIT_KEYS: &[&str] = &["charLimit", "char_limit", "max_length", "maxLength", "limit"];

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    TS,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VariableType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
}

impl VariableType {
    /// Map a provider-specific type label onto the four supported kinds.
    pub fn from_loose(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" | "photo" | "picture" => VariableType::Image,
            "video" => VariableType::Video,
            "audio" | "voice" | "character" => VariableType::Audio,
            _ => VariableType::Text,
        }
    }

    pub fn default_char_limit(self) -> Option<u32> {
        match self {
            VariableType::Text => Some(DEFAULT_TEXT_CHAR_LIMIT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: VariableType,
    pub char_limit: Option<u32>,
}

impl TemplateVariable {
    pub fn new(name: impl Into<String>, variable_type: VariableType, char_limit: Option<u32>) -> Self {
        Self {
            name: name.into(),
            variable_type,
            char_limit: char_limit.or_else(|| variable_type.default_char_limit()),
        }
    }

    pub fn text(name: impl Into<String>, char_limit: Option<u32>) -> Self {
        Self::new(name, VariableType::Text, char_limit)
    }
}

/// A value supplied for a template that does not fit its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct VariableViolation {
    pub variable: String,
    pub message: String,
}

/// Strip whitespace and `{{ }}` placeholder braces from a variable name.
pub fn clean_variable_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed);
    unwrapped.trim().to_string()
}

/// Normalize any supported variable description into the uniform schema.
/// Unrecognized shapes yield an empty list.
pub fn normalize_variables(raw: &Value) -> Vec<TemplateVariable> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |variable: Option<TemplateVariable>| {
        if let Some(variable) = variable
            && seen.insert(variable.name.clone())
        {
            out.push(variable);
        }
    };

    match raw {
        Value::Object(map) => {
            for (key, value) in map {
                push(variable_from_entry(Some(key.as_str()), value));
            }
        }
        Value::Array(items) => {
            for item in items {
                push(variable_from_entry(None, item));
            }
        }
        _ => {}
    }

    out
}

fn variable_from_entry(key: Option<&str>, value: &Value) -> Option<TemplateVariable> {
    let (raw_name, variable_type, char_limit) = match value {
        Value::Object(obj) => {
            let name = first_str(obj, NAME_KEYS).or(key)?;
            let variable_type = first_str(obj, TYPE_KEYS)
                .map(VariableType::from_loose)
                .unwrap_or_default();
            let char_limit = first_limit(obj, LIMIT_KEYS).or_else(|| {
                obj.get("properties")
                    .and_then(Value::as_object)
                    .and_then(|props| first_limit(props, LIMIT_KEYS))
            });
            (name, variable_type, char_limit)
        }
        Value::String(s) => match key {
            // `{"headline": "text"}`: the value is the type label.
            Some(k) => (k, VariableType::from_loose(s), None),
            None => (s.as_str(), VariableType::Text, None),
        },
        _ => (key?, VariableType::Text, None),
    };

    let name = clean_variable_name(raw_name);
    if name.is_empty() {
        return None;
    }
    Some(TemplateVariable::new(name, variable_type, char_limit))
}

fn first_str<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty()))
}

fn first_limit(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u32> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Check supplied values against a template's variables. Text variables must
/// be present and non-blank; any value longer than its limit is rejected.
/// Keys the template does not declare are left for the caller to drop.
pub fn validate_values(
    variables: &[TemplateVariable],
    values: &HashMap<String, String>,
) -> Vec<VariableViolation> {
    let mut violations = Vec::new();

    for variable in variables {
        match values.get(&variable.name) {
            None => {
                if variable.variable_type == VariableType::Text {
                    violations.push(VariableViolation {
                        variable: variable.name.clone(),
                        message: "value is required".to_string(),
                    });
                }
            }
            Some(value) if value.trim().is_empty() && variable.variable_type == VariableType::Text => {
                violations.push(VariableViolation {
                    variable: variable.name.clone(),
                    message: "value is required".to_string(),
                });
            }
            Some(value) => {
                if let Some(limit) = variable.char_limit {
                    let len = value.chars().count();
                    if len > limit as usize {
                        violations.push(VariableViolation {
                            variable: variable.name.clone(),
                            message: format!("{len} characters exceeds the limit of {limit}"),
                        });
                    }
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn heygen_map_shape() {
        let raw = json!({
            "product_name": { "name": "product_name", "type": "text", "properties": { "content": "", "max_length": 40 } },
            "hero_shot": { "name": "hero_shot", "type": "image", "properties": { "url": "" } },
            "narrator": { "name": "narrator", "type": "character" }
        });

        assert_eq!(
            normalize_variables(&raw),
            vec![
                TemplateVariable::text("product_name", Some(40)),
                TemplateVariable::new("hero_shot", VariableType::Image, None),
                TemplateVariable::new("narrator", VariableType::Audio, None),
            ]
        );
    }

    #[test]
    fn string_arrays_and_braces() {
        let raw = json!(["{{ headline }}", "cta", "  ", "cta"]);
        let vars = normalize_variables(&raw);
        assert_eq!(
            vars,
            vec![
                TemplateVariable::text("headline", Some(DEFAULT_TEXT_CHAR_LIMIT)),
                TemplateVariable::text("cta", Some(DEFAULT_TEXT_CHAR_LIMIT)),
            ]
        );
    }

    #[test]
    fn object_arrays_with_mixed_conventions() {
        let raw = json!([
            { "variable_name": "price", "char_limit": "12" },
            { "variableName": "logo", "variableType": "Photo" },
            { "key": "tagline", "maxLength": 60 },
            { "label": "{{outro}}", "kind": "VIDEO" },
            { "unrelated": true }
        ]);

        let vars = normalize_variables(&raw);
        assert_eq!(vars.len(), 4);
        assert_eq!(vars[0], TemplateVariable::text("price", Some(12)));
        assert_eq!(vars[1].variable_type, VariableType::Image);
        assert_eq!(vars[1].char_limit, None);
        assert_eq!(vars[2].char_limit, Some(60));
        assert_eq!(vars[3], TemplateVariable::new("outro", VariableType::Video, None));
    }

    #[test]
    fn map_with_scalar_values_uses_keys() {
        let raw = json!({ "headline": "text", "background": "image", "count": 3 });
        let names: Vec<_> = normalize_variables(&raw)
            .into_iter()
            .map(|v| (v.name, v.variable_type))
            .collect();
        assert_eq!(
            names,
            vec![
                ("headline".to_string(), VariableType::Text),
                ("background".to_string(), VariableType::Image),
                ("count".to_string(), VariableType::Text),
            ]
        );
    }

    #[test]
    fn unsupported_shapes_are_empty() {
        assert!(normalize_variables(&json!(null)).is_empty());
        assert!(normalize_variables(&json!("product_name")).is_empty());
    }

    #[test]
    fn serializes_with_camel_case_limit() {
        let json = serde_json::to_value(TemplateVariable::text("headline", Some(80))).unwrap();
        assert_eq!(json, json!({ "name": "headline", "type": "text", "charLimit": 80 }));
    }

    #[test]
    fn validation_reports_missing_and_long_values() {
        let variables = vec![
            TemplateVariable::text("headline", Some(10)),
            TemplateVariable::text("cta", None),
            TemplateVariable::new("logo", VariableType::Image, None),
        ];
        let values = HashMap::from([
            ("headline".to_string(), "far too long a headline".to_string()),
            ("cta".to_string(), "   ".to_string()),
            ("extra".to_string(), "x".to_string()),
        ]);

        let violations = validate_values(&variables, &values);
        let flagged: Vec<_> = violations.iter().map(|v| v.variable.as_str()).collect();
        assert_eq!(flagged, vec!["headline", "cta"]);
        assert!(violations[0].message.contains("limit of 10"));
    }

    #[test]
    fn undeclared_keys_are_not_violations() {
        let variables = vec![TemplateVariable::text("headline", Some(40))];
        let values = HashMap::from([
            ("headline".to_string(), "Summer sale".to_string()),
            ("subtitle".to_string(), "not in the fallback list".to_string()),
        ]);
        assert!(validate_values(&variables, &values).is_empty());
    }

    #[test]
    fn variable_types_order_for_sorting() {
        let mut kinds = vec![VariableType::Audio, VariableType::Text, VariableType::Video];
        kinds.sort();
        assert_eq!(kinds, vec![VariableType::Text, VariableType::Video, VariableType::Audio]);
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let variables = vec![TemplateVariable::text("headline", Some(5))];
        let values = HashMap::from([("headline".to_string(), "héllo".to_string())]);
        assert!(validate_values(&variables, &values).is_empty());
    }
}
