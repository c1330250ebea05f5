//! Placeholder resolution through a fixed priority chain:
//!
//! 1. local bindings of the current step (path-parameter overrides,
//!    cached alias hits)
//! 2. exact context variable
//! 3. context variable under an alternative spelling of the name
//!    (`event_id` / `eventId` / ...), cached into the local bindings
//! 4. the configured default pool
//!
//! Unresolved placeholders are left verbatim and reported as a
//! warning.

use crate::context::ExecutionContext;
use crate::template::{tokenize, Segment};
use crate::value::ParamString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Values bound for a single step invocation only.
pub type LocalBindings = HashMap<String, Value>;

/// An alternative rendering of a placeholder name.
pub trait NameTransform: Send + Sync + fmt::Debug {
    fn apply(&self, name: &str) -> String;
}

/// `event_id` -> `eventId`
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCase;

/// `eventId` -> `event_id`
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCase;

/// `eventId` / `event_id` -> `event-id`
#[derive(Debug, Clone, Copy, Default)]
pub struct KebabCase;

impl NameTransform for CamelCase {
    fn apply(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        let mut upper_next = false;
        for c in name.chars() {
            if c == '_' || c == '-' {
                upper_next = !out.is_empty();
                continue;
            }
            if upper_next {
                out.extend(c.to_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl NameTransform for SnakeCase {
    fn apply(&self, name: &str) -> String {
        split_words(name, '_')
    }
}

impl NameTransform for KebabCase {
    fn apply(&self, name: &str) -> String {
        split_words(name, '-')
    }
}

/// Lowercase `name`, separating words with `sep`. A word starts at
/// an uppercase letter following a lowercase letter or digit, or at
/// the last capital of an acronym (`HTTPServer` -> `http_server`).
fn split_words(name: &str, sep: char) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            out.push(sep);
            continue;
        }
        if !c.is_uppercase() {
            out.push(c);
            continue;
        }
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        let boundary = match prev {
            Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
            Some(p) if p.is_uppercase() => {
                next.is_some_and(|n| n.is_lowercase())
            }
            _ => false,
        };
        if boundary {
            out.push(sep);
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Name styles selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    Camel,
    Snake,
    Kebab,
}

impl NameStyle {
    pub fn transform(self) -> Box<dyn NameTransform> {
        match self {
            Self::Camel => Box::new(CamelCase),
            Self::Snake => Box::new(SnakeCase),
            Self::Kebab => Box::new(KebabCase),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::Camel, Self::Snake]
    }
}

/// Last-resort literal values for common parameter names.
#[derive(Debug, Clone, Default)]
pub struct DefaultPool {
    values: HashMap<String, Value>,
}

impl DefaultPool {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Used when the configuration supplies no pool of its own.
    pub fn builtin() -> Self {
        let values = [
            ("id", "1"),
            ("page", "1"),
            ("limit", "10"),
            ("offset", "0"),
            ("token", "test-token"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Which tier produced a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local,
    Context,
    Alias(String),
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub source: Source,
}

/// Result of substituting every placeholder in a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    pub text: String,
    /// Names left verbatim in `text`.
    pub unresolved: Vec<String>,
}

#[derive(Debug)]
pub struct VariableResolver {
    transforms: Vec<Box<dyn NameTransform>>,
    defaults: DefaultPool,
}

impl Default for VariableResolver {
    fn default() -> Self {
        Self::new(DefaultPool::builtin())
    }
}

impl VariableResolver {
    /// Camel-case then snake-case alternatives, in that order.
    pub fn new(defaults: DefaultPool) -> Self {
        Self::with_styles(&NameStyle::defaults(), defaults)
    }

    pub fn with_styles(styles: &[NameStyle], defaults: DefaultPool) -> Self {
        Self::with_transforms(
            styles.iter().map(|s| s.transform()).collect(),
            defaults,
        )
    }

    pub fn with_transforms(
        transforms: Vec<Box<dyn NameTransform>>,
        defaults: DefaultPool,
    ) -> Self {
        Self {
            transforms,
            defaults,
        }
    }

    pub fn defaults(&self) -> &DefaultPool {
        &self.defaults
    }

    /// Resolve one placeholder name. `None` when no tier has it.
    pub fn resolve(
        &self,
        name: &str,
        locals: &mut LocalBindings,
        ctx: &ExecutionContext,
    ) -> Option<Resolved> {
        if let Some(value) = locals.get(name) {
            debug!("'{}' resolved from step bindings", name);
            return Some(Resolved {
                value: value.clone(),
                source: Source::Local,
            });
        }

        if let Some(value) = ctx.variable(name) {
            debug!("'{}' resolved from context", name);
            return Some(Resolved {
                value: value.clone(),
                source: Source::Context,
            });
        }

        for transform in &self.transforms {
            let alt = transform.apply(name);
            if alt == name {
                continue;
            }
            if let Some(value) = ctx.variable(&alt) {
                debug!("'{}' resolved from context as '{}'", name, alt);
                locals.insert(name.to_string(), value.clone());
                return Some(Resolved {
                    value: value.clone(),
                    source: Source::Alias(alt),
                });
            }
        }

        if let Some(value) = self.defaults.get(name) {
            debug!("'{}' resolved from default pool", name);
            return Some(Resolved {
                value: value.clone(),
                source: Source::Default,
            });
        }

        None
    }

    /// Replace every placeholder in `template`, leaving unresolved
    /// ones as written.
    pub fn substitute(
        &self,
        template: &str,
        locals: &mut LocalBindings,
        ctx: &ExecutionContext,
    ) -> Substitution {
        let mut out = Substitution::default();

        for segment in tokenize(template) {
            match segment {
                Segment::Literal(text) => out.text.push_str(text),
                Segment::Placeholder { name, raw, .. } => {
                    match self.resolve(name, locals, ctx) {
                        Some(resolved) => out
                            .text
                            .push_str(&resolved.value.to_param_string()),
                        None => {
                            warn!(
                                "Unresolved placeholder {} left as is",
                                raw
                            );
                            out.text.push_str(raw);
                            out.unresolved.push(name.to_string());
                        }
                    }
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(vars: &[(&str, Value)]) -> ExecutionContext {
        ExecutionContext::with_variables(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn pool(vars: &[(&str, &str)]) -> DefaultPool {
        DefaultPool::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect(),
        )
    }

    // ── name transforms ─────────────────────────────────

    #[test]
    fn test_camel_case() {
        assert_eq!(CamelCase.apply("event_id"), "eventId");
        assert_eq!(CamelCase.apply("relationship_type_id"), "relationshipTypeId");
        assert_eq!(CamelCase.apply("event-id"), "eventId");
        assert_eq!(CamelCase.apply("eventId"), "eventId");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(SnakeCase.apply("eventId"), "event_id");
        assert_eq!(SnakeCase.apply("eventID"), "event_id");
        assert_eq!(SnakeCase.apply("HTTPServer"), "http_server");
        assert_eq!(SnakeCase.apply("event_id"), "event_id");
        assert_eq!(SnakeCase.apply("page2Size"), "page2_size");
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(KebabCase.apply("eventId"), "event-id");
        assert_eq!(KebabCase.apply("event_id"), "event-id");
    }

    // ── priority chain ──────────────────────────────────

    #[test]
    fn test_local_binding_wins() {
        let resolver = VariableResolver::new(pool(&[("event_id", "1")]));
        let ctx = ctx_with(&[("event_id", json!(42))]);
        let mut locals = LocalBindings::from([(
            "event_id".to_string(),
            json!("override"),
        )]);

        let resolved = resolver.resolve("event_id", &mut locals, &ctx).unwrap();
        assert_eq!(resolved.value, json!("override"));
        assert_eq!(resolved.source, Source::Local);
    }

    #[test]
    fn test_context_beats_default_pool() {
        let resolver = VariableResolver::new(pool(&[("event_id", "1")]));
        let ctx = ctx_with(&[("event_id", json!(42))]);
        let mut locals = LocalBindings::new();

        let resolved = resolver.resolve("event_id", &mut locals, &ctx).unwrap();
        assert_eq!(resolved.value, json!(42));
        assert_eq!(resolved.source, Source::Context);
    }

    #[test]
    fn test_alias_hit_is_cached_for_the_step() {
        let resolver = VariableResolver::new(DefaultPool::default());
        let ctx = ctx_with(&[("eventId", json!(7))]);
        let mut locals = LocalBindings::new();

        let first = resolver.resolve("event_id", &mut locals, &ctx).unwrap();
        assert_eq!(first.value, json!(7));
        assert_eq!(first.source, Source::Alias("eventId".into()));
        assert_eq!(locals.get("event_id"), Some(&json!(7)));

        let second = resolver.resolve("event_id", &mut locals, &ctx).unwrap();
        assert_eq!(second.value, json!(7));
        assert_eq!(second.source, Source::Local);
    }

    #[test]
    fn test_snake_alias_for_camel_placeholder() {
        let resolver = VariableResolver::new(DefaultPool::default());
        let ctx = ctx_with(&[("table_id", json!("t-9"))]);
        let mut locals = LocalBindings::new();

        let resolved = resolver.resolve("tableId", &mut locals, &ctx).unwrap();
        assert_eq!(resolved.value, json!("t-9"));
        assert_eq!(resolved.source, Source::Alias("table_id".into()));
    }

    #[test]
    fn test_extra_style_is_pluggable() {
        let ctx = ctx_with(&[("event-id", json!(3))]);
        let mut locals = LocalBindings::new();

        let default = VariableResolver::new(DefaultPool::default());
        assert!(default.resolve("eventId", &mut locals, &ctx).is_none());

        let kebab = VariableResolver::with_styles(
            &[NameStyle::Camel, NameStyle::Snake, NameStyle::Kebab],
            DefaultPool::default(),
        );
        let resolved = kebab.resolve("eventId", &mut locals, &ctx).unwrap();
        assert_eq!(resolved.value, json!(3));
    }

    #[test]
    fn test_default_pool_is_last() {
        let resolver = VariableResolver::default();
        let ctx = ExecutionContext::new();
        let mut locals = LocalBindings::new();

        let resolved = resolver.resolve("page", &mut locals, &ctx).unwrap();
        assert_eq!(resolved.value, json!("1"));
        assert_eq!(resolved.source, Source::Default);
        assert!(resolver.resolve("nope", &mut locals, &ctx).is_none());
    }

    // ── substitution ────────────────────────────────────

    #[test]
    fn test_unresolved_placeholder_left_verbatim() {
        let resolver = VariableResolver::new(DefaultPool::default());
        let ctx = ExecutionContext::new();
        let mut locals = LocalBindings::new();

        let out =
            resolver.substitute("/items/{unknown_var}", &mut locals, &ctx);
        assert_eq!(out.text, "/items/{unknown_var}");
        assert_eq!(out.unresolved, vec!["unknown_var".to_string()]);
    }

    #[test]
    fn test_both_syntaxes_share_the_chain() {
        let resolver = VariableResolver::new(pool(&[("token", "t0")]));
        let ctx = ctx_with(&[("userId", json!(5)), ("active", json!(true))]);
        let mut locals = LocalBindings::new();

        let out = resolver.substitute(
            r#"{"user":{{.user_id}},"active":{active},"auth":"{{ .token }}"}"#,
            &mut locals,
            &ctx,
        );
        assert_eq!(out.text, r#"{"user":5,"active":true,"auth":"t0"}"#);
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_substituted_value_is_not_rescanned() {
        let resolver = VariableResolver::new(DefaultPool::default());
        let ctx = ctx_with(&[("a", json!("{b}")), ("b", json!("nope"))]);
        let mut locals = LocalBindings::new();

        let out = resolver.substitute("x{a}y", &mut locals, &ctx);
        assert_eq!(out.text, "x{b}y");
    }

    #[test]
    fn test_structured_value_stringified_as_compact_json() {
        let resolver = VariableResolver::new(DefaultPool::default());
        let ctx = ctx_with(&[("tags", json!(["a", "b"]))]);
        let mut locals = LocalBindings::new();

        let out = resolver.substitute("{tags}", &mut locals, &ctx);
        assert_eq!(out.text, r#"["a","b"]"#);
    }
}
