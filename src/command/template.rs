//! # Command Templates
//!
//! Renders operator-supplied command templates against a parameter struct.
//!
//! Placeholders use the `{{.Field}}` form, where `Field` is the serialized
//! (PascalCase) name of a parameter. Templates are parsed and checked against
//! the parameter type once, when configuration is loaded. Values are
//! substituted verbatim with no shell escaping: template authorship is an
//! operator responsibility.

use crate::command::error::TemplateError;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.(?P<field>[A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .expect("placeholder regex is valid")
});

/// Parameter set a template can be rendered against
pub trait TemplateParams: Serialize {
    /// Serialized field names available as placeholders
    const FIELDS: &'static [&'static str];
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed command template
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    name: String,
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    /// Parse `text` and check every placeholder against `P::FIELDS`
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Syntax`] for unbalanced or malformed `{{ }}`
    /// markers and [`TemplateError::UnknownField`] for placeholders naming a
    /// field `P` does not have.
    pub fn parse<P: TemplateParams>(name: &str, text: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut cursor = 0;

        for captures in PLACEHOLDER.captures_iter(text) {
            let (Some(whole), Some(field)) = (captures.get(0), captures.name("field")) else {
                continue;
            };
            let literal = &text[cursor..whole.start()];
            check_literal(name, literal, cursor)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(literal.to_string()));
            }

            let field = field.as_str();
            if !P::FIELDS.contains(&field) {
                return Err(TemplateError::UnknownField {
                    template: name.to_string(),
                    field: field.to_string(),
                });
            }
            segments.push(Segment::Field(field.to_string()));
            cursor = whole.end();
        }

        let tail = &text[cursor..];
        check_literal(name, tail, cursor)?;
        if !tail.is_empty() {
            segments.push(Segment::Literal(tail.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            source: text.to_string(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fields referenced by this template, in order of appearance
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(field) => Some(field.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template into a single command line.
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Render`] if the parameters fail to serialize,
    /// [`TemplateError::UnknownField`] if they serialize without a referenced
    /// field, and [`TemplateError::Empty`] if nothing but whitespace remains.
    pub fn expand<P: TemplateParams>(&self, params: &P) -> Result<String, TemplateError> {
        let values = serde_json::to_value(params).map_err(|source| TemplateError::Render {
            template: self.name.clone(),
            source,
        })?;

        let mut rendered = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Field(field) => {
                    let value = values.get(field).ok_or_else(|| TemplateError::UnknownField {
                        template: self.name.clone(),
                        field: field.clone(),
                    })?;
                    push_value(&mut rendered, value);
                }
            }
        }

        let command = rendered.trim();
        if command.is_empty() {
            return Err(TemplateError::Empty {
                template: self.name.clone(),
            });
        }
        Ok(command.to_string())
    }
}

/// Literal text must not contain stray template markers
fn check_literal(name: &str, literal: &str, base: usize) -> Result<(), TemplateError> {
    let stray = [literal.find("{{"), literal.find("}}")]
        .into_iter()
        .flatten()
        .min();
    match stray {
        Some(at) => Err(TemplateError::Syntax {
            template: name.to_string(),
            offset: base + at,
            snippet: literal[at..].chars().take(24).collect(),
        }),
        None => Ok(()),
    }
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct Params {
        name: String,
        group: Option<String>,
        days: u32,
    }

    impl TemplateParams for Params {
        const FIELDS: &'static [&'static str] = &["Name", "Group", "Days"];
    }

    fn params() -> Params {
        Params {
            name: "DB_PASSWORD".to_string(),
            group: Some("PAYMENTS".to_string()),
            days: 365,
        }
    }

    #[test]
    fn test_expand_substitutes_fields_verbatim() {
        let template =
            CommandTemplate::parse::<Params>("fetch", "keychain get {{.Name}} {{ .Group }} {{.Days}}")
                .unwrap();
        assert_eq!(
            template.expand(&params()).unwrap(),
            "keychain get DB_PASSWORD PAYMENTS 365"
        );
    }

    #[test]
    fn test_missing_optional_renders_empty() {
        let template = CommandTemplate::parse::<Params>("fetch", "get {{.Name}}{{.Group}}").unwrap();
        let mut p = params();
        p.group = None;
        assert_eq!(template.expand(&p).unwrap(), "get DB_PASSWORD");
    }

    #[test]
    fn test_unknown_field_fails_at_parse() {
        let err = CommandTemplate::parse::<Params>("fetch", "get {{.Secret}}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownField { ref field, .. } if field == "Secret"));
    }

    #[test]
    fn test_unbalanced_braces_fail_at_parse() {
        let err = CommandTemplate::parse::<Params>("fetch", "get {{.Name").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { offset: 4, .. }));

        let err = CommandTemplate::parse::<Params>("fetch", "get {{.Name}} }}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[test]
    fn test_non_field_action_is_rejected() {
        let err = CommandTemplate::parse::<Params>("fetch", "{{if .Name}}x{{end}}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { offset: 0, .. }));
    }

    #[test]
    fn test_template_without_placeholders() {
        let template = CommandTemplate::parse::<Params>("static", "openssl version").unwrap();
        assert_eq!(template.fields().count(), 0);
        assert_eq!(template.expand(&params()).unwrap(), "openssl version");
    }

    #[test]
    fn test_blank_expansion_is_an_error() {
        let template = CommandTemplate::parse::<Params>("blank", "  {{.Group}} ").unwrap();
        let mut p = params();
        p.group = None;
        assert!(matches!(template.expand(&p), Err(TemplateError::Empty { .. })));
    }

    #[test]
    fn test_fields_in_order() {
        let template =
            CommandTemplate::parse::<Params>("fetch", "{{.Group}}/{{.Name}}/{{.Group}}").unwrap();
        assert_eq!(template.fields().collect::<Vec<_>>(), vec!["Group", "Name", "Group"]);
        assert_eq!(template.name(), "fetch");
        assert_eq!(template.source(), "{{.Group}}/{{.Name}}/{{.Group}}");
    }
}
