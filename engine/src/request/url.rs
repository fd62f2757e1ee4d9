// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! URL grammar (spec §6.1): `/<resource-path>/<id>?.<format>?`.
//!
//! This is the one slice of the HTTP collaborator's job that the core owns
//! directly, because spec §8's round-trip law and scenario 6 test it.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ErrorKind;
use crate::Result;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/(.+)/([^/.]*)(?:\.([a-z]+))?$").expect("static pattern"))
}

/// The parsed path portion of a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPath {
    pub resource: String,
    /// Empty string means "list" (no id given).
    pub id: Option<String>,
    /// The effective format, defaulting to `"json"` when the URL carried no
    /// `.<format>` suffix at all.
    pub format: String,
    /// Whether `path` actually carried a `.<format>` suffix. `format_url`
    /// only re-emits the suffix when this is true, so an explicit `.json`
    /// round-trips distinctly from an omitted one even though both resolve
    /// to the same effective `format`.
    pub format_given: bool,
}

/// Parses `path` per the grammar `^/(.+)/([^/.]*)(?:\.([a-z]+))?$`.
///
/// An empty id segment means "list"; a missing format defaults to `"json"`.
pub fn parse_url(path: &str) -> Result<UrlPath> {
    let captures = url_pattern()
        .captures(path)
        .ok_or_else(|| ErrorKind::InvalidPayload.with_message(format!("malformed URL path '{path}'")))?;

    let resource = captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
    let id_segment = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    let format_segment = captures.get(3).map(|m| m.as_str().to_string());
    let format_given = format_segment.is_some();
    let format = format_segment.unwrap_or_else(|| "json".to_string());

    Ok(UrlPath {
        resource,
        id: if id_segment.is_empty() {
            None
        } else {
            Some(id_segment.to_string())
        },
        format,
        format_given,
    })
}

/// Re-serializes a [`UrlPath`] back to its wire form, the inverse of
/// [`parse_url`] (spec §8 "Parse-then-serialize of the URL grammar is the
/// identity on legal URLs").
pub fn format_url(path: &UrlPath) -> String {
    let id = path.id.as_deref().unwrap_or("");
    if path.format_given {
        format!("/{}/{}.{}", path.resource, id, path.format)
    } else {
        format!("/{}/{}", path.resource, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_request_with_default_format() {
        let parsed = parse_url("/article/").unwrap();
        assert_eq!(parsed.resource, "article");
        assert_eq!(parsed.id, None);
        assert_eq!(parsed.format, "json");
    }

    #[test]
    fn parses_single_item_request_with_format() {
        let parsed = parse_url("/article/42.xml").unwrap();
        assert_eq!(parsed.resource, "article");
        assert_eq!(parsed.id.as_deref(), Some("42"));
        assert_eq!(parsed.format, "xml");
    }

    #[test]
    fn parses_nested_resource_path() {
        let parsed = parse_url("/article/comments/7").unwrap();
        assert_eq!(parsed.resource, "article/comments");
        assert_eq!(parsed.id.as_deref(), Some("7"));
    }

    #[test]
    fn rejects_malformed_path() {
        assert!(parse_url("no-leading-slash").is_err());
    }

    #[test]
    fn round_trips_through_parse_and_format() {
        for raw in [
            "/article/",
            "/article/42.xml",
            "/article/comments/7",
            "/article/42.json",
        ] {
            let parsed = parse_url(raw).unwrap();
            assert_eq!(format_url(&parsed), raw);
        }
    }

    #[test]
    fn explicit_json_suffix_is_distinct_from_an_omitted_one() {
        let explicit = parse_url("/article/42.json").unwrap();
        let omitted = parse_url("/article/42").unwrap();
        assert_eq!(explicit.format, omitted.format);
        assert!(explicit.format_given);
        assert!(!omitted.format_given);
        assert_eq!(format_url(&explicit), "/article/42.json");
        assert_eq!(format_url(&omitted), "/article/42");
    }
}
