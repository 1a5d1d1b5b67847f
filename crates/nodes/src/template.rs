//! Template resolution for node configuration strings.
//!
//! Configuration values such as URLs and prompts may reference earlier node
//! output with `{{path.to.value}}`. `{{json path}}` renders the referenced
//! value as JSON text. Unresolved references render as an empty string.

use serde_json::Value;

use crate::Context;

/// Resolves templated configuration strings against the run context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Context) -> String;
}

/// Default renderer for `{{ ... }}` placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct BraceRenderer;

impl TemplateRenderer for BraceRenderer {
    fn render(&self, template: &str, context: &Context) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after_open = &rest[start..];

            // `{{{expr}}}` is accepted as an unescaped form of `{{expr}}`.
            let (open, close) = if after_open.starts_with("{{{") {
                ("{{{", "}}}")
            } else {
                ("{{", "}}")
            };

            let body = &after_open[open.len()..];
            match body.find(close) {
                Some(end) => {
                    out.push_str(&resolve(body[..end].trim(), context));
                    rest = &body[end + close.len()..];
                }
                None => {
                    out.push_str(after_open);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

fn resolve(expr: &str, context: &Context) -> String {
    if let Some(path) = expr.strip_prefix("json ") {
        return lookup(path.trim(), context)
            .map(|v| v.to_string())
            .unwrap_or_default();
    }
    match lookup(expr, context) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn lookup<'a>(path: &str, context: &'a Context) -> Option<&'a Value> {
    let mut segments = path.split('.').filter(|s| !s.is_empty());
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether `s` contains a placeholder.
pub fn is_templated(s: &str) -> bool {
    s.contains("{{")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::from_value(json!({
            "user": { "name": "Ada", "tags": ["a", "b"], "age": 36 },
            "todo": { "httpResponse": { "data": { "id": 7 } } }
        }))
        .unwrap()
    }

    #[test]
    fn resolves_nested_paths() {
        let r = BraceRenderer;
        assert_eq!(r.render("Hi {{user.name}}!", &ctx()), "Hi Ada!");
        assert_eq!(r.render("{{ user.tags.1 }}", &ctx()), "b");
        assert_eq!(
            r.render("https://x/{{todo.httpResponse.data.id}}", &ctx()),
            "https://x/7"
        );
    }

    #[test]
    fn non_string_values_render_as_json() {
        let r = BraceRenderer;
        assert_eq!(r.render("{{user.age}}", &ctx()), "36");
        assert_eq!(r.render("{{json user.tags}}", &ctx()), r#"["a","b"]"#);
        assert_eq!(r.render("{{{json user.name}}}", &ctx()), r#""Ada""#);
    }

    #[test]
    fn unresolved_references_render_empty() {
        let r = BraceRenderer;
        assert_eq!(r.render("[{{missing.path}}]", &ctx()), "[]");
        assert_eq!(r.render("[{{json nope}}]", &ctx()), "[]");
    }

    #[test]
    fn unclosed_placeholder_is_left_alone() {
        let r = BraceRenderer;
        assert_eq!(r.render("value: {{user.name", &ctx()), "value: {{user.name");
    }
}
