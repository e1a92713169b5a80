use std::collections::HashMap;

use anyhow::{anyhow, Error, Result};
use tracing::debug;

const GENERIC_TEMPLATE: &str = "<p>{{title}}</p><p>{{body}}</p>";

/// In-process template catalog. Rendering is pure `{{key}}` substitution:
/// unknown keys expand to empty, an unknown template code falls back to the
/// generic template.
pub struct TemplateCatalog {
    templates: HashMap<&'static str, &'static str>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            "welcome_v1",
            "<p>Hi {{name}},</p><p>Welcome aboard! Get started here: \
             <a href=\"{{link}}\">{{link}}</a></p>",
        );
        templates.insert(
            "password_reset_v1",
            "<p>Hi {{name}},</p><p>Reset your password within {{expiry_minutes}} minutes: \
             <a href=\"{{link}}\">{{link}}</a></p>",
        );
        templates.insert(
            "order_shipped_v1",
            "<p>Hi {{name}},</p><p>Your order {{order_id}} is on its way. \
             Track it here: <a href=\"{{link}}\">{{link}}</a></p>",
        );

        Self { templates }
    }
}

impl TemplateCatalog {
    pub fn render(
        &self,
        template_code: &str,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Result<String, Error> {
        let template = match self.templates.get(template_code) {
            Some(template) => template,
            None => {
                debug!(template_code, "Unknown template code, using generic template");
                GENERIC_TEMPLATE
            }
        };

        expand(template, variables)
    }
}

fn expand(
    template: &str,
    variables: &HashMap<String, serde_json::Value>,
) -> Result<String, Error> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);

        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| anyhow!("Malformed template: unterminated placeholder"))?;

        let key = after[..end].trim();
        result.push_str(&scalar_to_string(variables.get(key)));

        rest = &after[end + 2..];
    }

    result.push_str(rest);

    Ok(result)
}

fn scalar_to_string(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn substitutes_known_variables() {
        let catalog = TemplateCatalog::default();
        let vars = variables(&[
            ("name", serde_json::json!("Ada")),
            ("link", serde_json::json!("https://x")),
        ]);

        let body = catalog.render("welcome_v1", &vars).unwrap();
        assert!(body.contains("Ada"));
        assert!(body.contains("https://x"));
        assert!(!body.contains("{{"));
    }

    #[test]
    fn unknown_keys_expand_to_empty() {
        let body = expand("Hello {{name}}!", &HashMap::new()).unwrap();
        assert_eq!(body, "Hello !");
    }

    #[test]
    fn unknown_template_code_falls_back_to_generic() {
        let catalog = TemplateCatalog::default();
        let vars = variables(&[
            ("title", serde_json::json!("Heads up")),
            ("body", serde_json::json!("Something happened")),
        ]);

        let body = catalog.render("no_such_template", &vars).unwrap();
        assert_eq!(body, "<p>Heads up</p><p>Something happened</p>");
    }

    #[test]
    fn numbers_and_bools_render_as_text() {
        let vars = variables(&[
            ("count", serde_json::json!(3)),
            ("ok", serde_json::json!(true)),
        ]);
        assert_eq!(expand("{{count}}/{{ok}}", &vars).unwrap(), "3/true");
    }

    #[test]
    fn composite_values_expand_to_empty() {
        let vars = variables(&[("items", serde_json::json!(["a", "b"]))]);
        assert_eq!(expand("[{{items}}]", &vars).unwrap(), "[]");
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        assert!(expand("Hello {{name", &HashMap::new()).is_err());
    }
}
