//! Pulls values out of a JSON response body into context variables.
//!
//! Path expressions are JSON-path-like (`$.data.id`, `items[0].id`,
//! `items.0.id`). Each rule is tried against a fixed list of
//! rewrites, stopping at the first hit; a rule that matches nothing
//! leaves its variable unset without affecting the other rules.

use crate::context::ExecutionContext;
use crate::error::ExtractionError;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

static BRACKET_INDEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+)\]").expect("failed to compile index regex")
});

/// Which rewrite of the path expression found the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The `$.`-anchored expression as given.
    Direct,
    /// Every segment taken literally, for keys that themselves start
    /// with `$` (`$oid`).
    Unanchored,
    /// With `[n]` rewritten to `.n`.
    DotIndex,
    /// `<first segment>.0.id`, the id of the first list item.
    FirstItemId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    /// Variable name and the rewrite that found it.
    pub extracted: Vec<(String, Strategy)>,
    /// Variables whose path matched nothing.
    pub missing: Vec<String>,
}

/// Walk a dot-separated path. A leading `$` segment denotes the root;
/// objects are indexed by key and arrays by numeric segment.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = match path.split_once('.') {
        Some(("$", rest)) => rest,
        _ if path == "$" => "",
        _ => path,
    };
    walk(root, path)
}

/// Walk every segment literally, `$` included.
fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;

    for part in path.split('.').filter(|part| !part.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Strict anchored lookup: the path must be `$` or start with `$.`.
fn lookup_anchored<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let rest = if path == "$" {
        ""
    } else {
        path.strip_prefix("$.")?
    };
    walk(root, rest)
}

/// Root-anchored canonical form: `id` -> `$.id`, `$.id` unchanged.
fn canonical(path: &str) -> String {
    if path.starts_with('$') {
        path.to_string()
    } else {
        format!("$.{path}")
    }
}

/// Find `path_expr` in `root`, trying each rewrite in turn.
pub fn find<'a>(
    root: &'a Value,
    path_expr: &str,
) -> Option<(&'a Value, Strategy)> {
    let anchored = canonical(path_expr.trim());
    if let Some(v) = lookup_anchored(root, &anchored) {
        return Some((v, Strategy::Direct));
    }

    let unanchored = anchored.strip_prefix("$.").unwrap_or(&anchored);
    if let Some(v) = walk(root, unanchored) {
        return Some((v, Strategy::Unanchored));
    }

    let dotted = BRACKET_INDEX_RE.replace_all(unanchored, ".$1");
    if let Some(v) = lookup(root, &dotted) {
        return Some((v, Strategy::DotIndex));
    }

    let collection = unanchored
        .split('.')
        .next()
        .map(|seg| seg.split('[').next().unwrap_or(seg))
        .filter(|seg| !seg.is_empty() && *seg != "$")?;
    lookup(root, &format!("{collection}.0.id"))
        .map(|v| (v, Strategy::FirstItemId))
}

/// Apply every rule to `body`, storing hits in the context with their
/// JSON type intact. Invalid JSON skips all rules.
pub fn extract(
    rules: &HashMap<String, String>,
    body: &str,
    ctx: &mut ExecutionContext,
) -> Result<ExtractionReport, ExtractionError> {
    let json: Value = serde_json::from_str(body)?;
    let mut report = ExtractionReport::default();

    for (name, path) in rules {
        match find(&json, path) {
            Some((value, strategy)) => {
                debug!(
                    "Extracted '{}' = {} from '{}' ({:?})",
                    name, value, path, strategy
                );
                ctx.set_variable(name.clone(), value.clone());
                report.extracted.push((name.clone(), strategy));
            }
            None => {
                warn!("Could not extract '{}' from path '{}'", name, path);
                report.missing.push(name.clone());
            }
        }
    }

    Ok(report)
}
