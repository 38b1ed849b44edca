//! Tera template engine wrapper.
//!
//! Built-in templates are compiled into the binary; a templates directory
//! can override any of them by name.

use std::collections::HashMap;
use std::path::Path;

use tera::{Context, Tera, Value};
use tracing::{debug, info};

use crate::error::ConvergeError;

/// Built-in templates, keyed by name.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "rabbitmq-env.conf.tera",
        include_str!("../../templates/rabbitmq-env.conf.tera"),
    ),
    (
        "rabbitmq.config.tera",
        include_str!("../../templates/rabbitmq.config.tera"),
    ),
    (
        "erlang.cookie.tera",
        include_str!("../../templates/erlang.cookie.tera"),
    ),
];

/// Template engine for rendering configuration files.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Create an engine holding only the built-in templates.
    pub fn builtin() -> Result<Self, ConvergeError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(BUILTIN_TEMPLATES.iter().copied())
            .map_err(|e| ConvergeError::Template {
                message: format!("Failed to load built-in templates: {}", e),
            })?;

        tera.register_filter("shell_escape", shell_escape_filter);

        Ok(Self { tera })
    }

    /// Create an engine from `template_dir`, falling back to the built-ins
    /// for any template the directory does not provide.
    ///
    /// Templates are loaded recursively from the directory with `.tera` extension.
    pub fn with_overrides(template_dir: &Path) -> Result<Self, ConvergeError> {
        let pattern = template_dir.join("**/*.tera");
        let pattern_str = pattern.to_string_lossy();

        debug!(pattern = %pattern_str, "Loading templates");

        let mut tera = Tera::new(&pattern_str).map_err(|e| ConvergeError::Template {
            message: format!(
                "Failed to load templates from '{}': {}",
                template_dir.display(),
                e
            ),
        })?;

        let overrides = tera.get_template_names().count();

        // extend() keeps templates already present, so directory copies win.
        let builtin = Self::builtin()?;
        tera.extend(&builtin.tera).map_err(|e| ConvergeError::Template {
            message: format!("Failed to merge built-in templates: {}", e),
        })?;

        tera.register_filter("shell_escape", shell_escape_filter);

        info!(
            directory = %template_dir.display(),
            overrides,
            "Template engine initialized"
        );

        Ok(Self { tera })
    }

    /// Render a template with the given context.
    pub fn render(
        &self,
        template_name: &str,
        context: &serde_json::Value,
    ) -> Result<String, ConvergeError> {
        let tera_context = Context::from_serialize(context).map_err(|e| ConvergeError::Template {
            message: format!("Invalid template context: {}", e),
        })?;

        self.tera
            .render(template_name, &tera_context)
            .map_err(|e| ConvergeError::Template {
                message: format!("Failed to render template '{}': {}", template_name, e),
            })
    }
}

/// Escape a value for use between double quotes in a shell-sourced file.
fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '$' | '`' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn shell_escape_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(escape_double_quoted(s))),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        other => Err(tera::Error::msg(format!(
            "shell_escape expects a string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_builtin_templates_present() {
        let engine = TemplateEngine::builtin().unwrap();
        let mut names: Vec<&str> = engine.tera.get_template_names().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["erlang.cookie.tera", "rabbitmq-env.conf.tera", "rabbitmq.config.tera"]
        );
    }

    #[test]
    fn test_cookie_renders_verbatim() {
        let engine = TemplateEngine::builtin().unwrap();
        let rendered = engine
            .render(
                "erlang.cookie.tera",
                &serde_json::json!({ "erlang_cookie": "SECRETCOOKIE" }),
            )
            .unwrap();
        assert_eq!(rendered, "SECRETCOOKIE");
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        // write avoids format string interpretation of {{
        fs::write(
            dir.path().join("rabbitmq-env.conf.tera"),
            b"NODENAME={{ nodename }}\n",
        )
        .unwrap();

        let engine = TemplateEngine::with_overrides(dir.path()).unwrap();
        let rendered = engine
            .render(
                "rabbitmq-env.conf.tera",
                &serde_json::json!({ "nodename": "rabbit@override" }),
            )
            .unwrap();
        assert_eq!(rendered, "NODENAME=rabbit@override\n");
        assert!(engine
            .tera
            .get_template_names()
            .any(|n| n == "rabbitmq.config.tera"));
    }

    #[test]
    fn test_escape_double_quoted() {
        assert_eq!(escape_double_quoted("+K true"), "+K true");
        assert_eq!(
            escape_double_quoted(r#"a"b$c`d\e"#),
            r#"a\"b\$c\`d\\e"#
        );
    }

    #[test]
    fn test_missing_template() {
        let engine = TemplateEngine::builtin().unwrap();
        let result = engine.render("nonexistent.tera", &serde_json::json!({}));
        assert!(matches!(result, Err(ConvergeError::Template { .. })));
    }
}
