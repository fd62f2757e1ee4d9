// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C2: the validated client request model (spec §3.2) and the thin slice of
//! the HTTP wire surface (spec §6.1) the core owns directly: URL grammar and
//! reserved-key/duplicate-parameter handling.

mod select;
mod url;

pub use select::{FilterDnf, FilterEntry, OrderList, OrderRequestEntry, SelectOptions, SelectTree};
pub use url::{format_url, parse_url, UrlPath};

use serde_json::{Map, Value as JsonValue};

use crate::error::ErrorKind;
use crate::Result;

/// Query/body keys that never land in [`Request::extra`] because they're
/// already typed fields on [`Request`] (spec §6.1).
pub const RESERVED_KEYS: &[&str] = &[
    "resource",
    "id",
    "action",
    "format",
    "select",
    "filter",
    "order",
    "limit",
    "page",
    "search",
    "_status",
    "_httpRequest",
    "_auth",
];

/// Validated client intent (spec §3.2).
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub resource: String,
    pub id: Option<String>,
    pub action: String,
    pub format: String,
    pub select: Option<SelectTree>,
    pub filter: Option<FilterDnf>,
    pub order: Option<OrderList>,
    pub limit: Option<u64>,
    pub page: Option<u64>,
    pub search: Option<String>,
    pub data: Option<JsonValue>,
    /// The opaque auth token (`_auth`), propagated but never inspected by the
    /// core (spec §1 "the core only propagates an opaque auth token").
    pub auth: Option<String>,
    /// Client-supplied query/body keys that aren't one of the typed fields
    /// above (spec §9 "dynamic extra fields... kept as a side map").
    pub extra: Map<String, JsonValue>,
}

impl Request {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: "retrieve".to_string(),
            format: "json".to_string(),
            ..Default::default()
        }
    }

    /// Builds a [`Request`] from a parsed URL path plus the raw query string
    /// pairs and (for POST) a body, per spec §6.1.
    ///
    /// `content_type` and `body` should both be `None` for a plain GET.
    pub fn from_http(
        url_path: &UrlPath,
        query_pairs: &[(String, String)],
        content_type: Option<&str>,
        body: Option<&[u8]>,
    ) -> Result<Self> {
        let mut request = Self::new(url_path.resource.clone());
        request.id = url_path.id.clone();
        request.format = url_path.format.clone();

        let mut seen = std::collections::HashSet::new();
        for (key, value) in query_pairs {
            if !seen.insert(key.clone()) {
                return Err(ErrorKind::DuplicateParameter
                    .with_message(format!("Duplicate parameter \"{key}\" in URL")));
            }
            apply_option(&mut request, key, JsonValue::String(value.clone()))?;
        }

        if let Some(body) = body {
            let content_type = content_type
                .ok_or_else(|| ErrorKind::InvalidPayload.with_message("missing Content-Type on POST body"))?;
            if content_type.starts_with("application/json") {
                let parsed: JsonValue = serde_json::from_slice(body).map_err(|_| {
                    ErrorKind::InvalidPayload.with_message("Invalid payload, must be valid JSON")
                })?;
                request.data = Some(parsed);
            } else if content_type.starts_with("application/x-www-form-urlencoded") {
                let text = std::str::from_utf8(body)
                    .map_err(|e| ErrorKind::InvalidPayload.with_source(e))?;
                for pair in text.split('&').filter(|p| !p.is_empty()) {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    let key = urlencoding_decode(key);
                    let value = urlencoding_decode(value);
                    apply_option(&mut request, &key, JsonValue::String(value))?;
                }
            } else {
                return Err(ErrorKind::InvalidPayload
                    .with_message(format!("unsupported Content-Type '{content_type}'")));
            }
        }

        Ok(request)
    }
}

/// Applies one raw `key=value` pair to `request`, routing it to a typed field
/// when `key` is reserved, stripping every underscore-prefixed key from
/// client input (spec §6.1 "to prevent privilege escalation") — including
/// `_auth`, which only the HTTP collaborator may set directly on the struct
/// after authenticating the request — and otherwise stashing it in
/// [`Request::extra`].
fn apply_option(request: &mut Request, key: &str, value: JsonValue) -> Result<()> {
    let as_str = || value.as_str().unwrap_or_default().to_string();

    match key {
        "resource" | "id" | "format" => {
            // Already taken from the URL path; a client trying to override
            // them through the query string is silently ignored, matching
            // the grammar's precedence (the URL is authoritative).
            Ok(())
        }
        "action" => {
            request.action = as_str();
            Ok(())
        }
        "select" => {
            request.select = Some(
                serde_json::from_str(&as_str())
                    .map_err(|e| ErrorKind::InvalidPayload.with_source(e))?,
            );
            Ok(())
        }
        "filter" => {
            request.filter = Some(
                serde_json::from_str(&as_str())
                    .map_err(|e| ErrorKind::InvalidPayload.with_source(e))?,
            );
            Ok(())
        }
        "order" => {
            request.order = Some(
                serde_json::from_str(&as_str())
                    .map_err(|e| ErrorKind::InvalidPayload.with_source(e))?,
            );
            Ok(())
        }
        "limit" => {
            request.limit = Some(
                as_str()
                    .parse()
                    .map_err(|_| ErrorKind::InvalidLimit.with_message("limit must be an integer"))?,
            );
            Ok(())
        }
        "page" => {
            request.page = Some(
                as_str()
                    .parse()
                    .map_err(|_| ErrorKind::InvalidLimit.with_message("page must be an integer"))?,
            );
            Ok(())
        }
        "search" => {
            request.search = Some(as_str());
            Ok(())
        }
        _ if key.starts_with('_') => {
            // Reserved for internal use (`_status`, `_httpRequest`, `_auth`,
            // or any other underscore-prefixed key) — dropped from client
            // input. `auth` is only ever set by the HTTP collaborator
            // directly on the struct after authentication, never through here.
            Ok(())
        }
        _ => {
            request.extra.insert(key.to_string(), value);
            Ok(())
        }
    }
}

fn urlencoding_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '+' => out.push(' '),
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                        out.push(byte as char);
                        continue;
                    }
                }
                out.push('%');
            }
            other => out.push(other),
        }
    }
    out
}
