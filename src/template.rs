//! Placeholder scanning for `{name}` and `{{.name}}` templates.
//!
//! Input is split into literal and placeholder segments in one pass.
//! Substitution then joins the segments, so replaced text is never
//! scanned again and a value containing `{...}` is not substituted a
//! second time.

use regex::Regex;
use std::sync::LazyLock;

// The template form is tried first so `{{.id}}` is not read as a
// brace placeholder named `.id` inside literal braces.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{\{\s*\.([A-Za-z0-9_]+)\s*\}\}|\{([A-Za-z_][A-Za-z0-9_.\-]*)\}",
    )
    .expect("failed to compile placeholder regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// `{name}`
    Brace,
    /// `{{.name}}`
    DotTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder {
        name: &'a str,
        /// The placeholder exactly as written, kept for unresolved
        /// output.
        raw: &'a str,
        syntax: Syntax,
    },
}

pub fn tokenize(input: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            segments.push(Segment::Literal(&input[last..whole.start()]));
        }
        let (name, syntax) = match (caps.get(1), caps.get(2)) {
            (Some(name), _) => (name.as_str(), Syntax::DotTemplate),
            (None, Some(name)) => (name.as_str(), Syntax::Brace),
            (None, None) => continue,
        };
        segments.push(Segment::Placeholder {
            name,
            raw: whole.as_str(),
            syntax,
        });
        last = whole.end();
    }

    if last < input.len() {
        segments.push(Segment::Literal(&input[last..]));
    }
    segments
}

/// Names of all placeholders in `input`, in order of appearance.
pub fn placeholder_names(input: &str) -> Vec<&str> {
    tokenize(input)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brace_placeholders_in_path() {
        let segments = tokenize("/events/{event_id}/tables/{tableId}");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("/events/"),
                Segment::Placeholder {
                    name: "event_id",
                    raw: "{event_id}",
                    syntax: Syntax::Brace,
                },
                Segment::Literal("/tables/"),
                Segment::Placeholder {
                    name: "tableId",
                    raw: "{tableId}",
                    syntax: Syntax::Brace,
                },
            ]
        );
    }

    #[test]
    fn test_dot_template_with_spaces() {
        let segments = tokenize("Bearer {{ .token }}");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("Bearer "),
                Segment::Placeholder {
                    name: "token",
                    raw: "{{ .token }}",
                    syntax: Syntax::DotTemplate,
                },
            ]
        );
    }

    #[test]
    fn test_json_object_braces_are_literal() {
        let body = r#"{"event":"{event_id}","n":1}"#;
        assert_eq!(placeholder_names(body), vec!["event_id"]);
        let joined: String = tokenize(body)
            .into_iter()
            .map(|s| match s {
                Segment::Literal(text) => text,
                Segment::Placeholder { raw, .. } => raw,
            })
            .collect();
        assert_eq!(joined, body);
    }

    #[test]
    fn test_mixed_syntaxes() {
        assert_eq!(
            placeholder_names("{{.a}}-{b}-{{.c}}"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(tokenize("plain"), vec![Segment::Literal("plain")]);
        assert!(tokenize("").is_empty());
    }
}
