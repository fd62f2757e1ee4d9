// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Pluggable `config.<ext>` parsers (spec §6.2, §9 "pluggable parsers").
//!
//! The core only knows how to turn source text into a [`serde_json::Value`];
//! deserializing that value into an [`AttrNode`](crate::config::AttrNode) tree
//! happens uniformly afterwards, regardless of which parser produced it.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::ErrorKind;
use crate::Result;

/// Parses the text of one `config.<ext>` file into a JSON value.
pub trait ConfigParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<JsonValue>;
}

/// Built-in parser for `config.json`.
#[derive(Debug, Default)]
pub struct JsonConfigParser;

impl ConfigParser for JsonConfigParser {
    fn parse(&self, source: &str) -> Result<JsonValue> {
        serde_json::from_str(source).map_err(|e| ErrorKind::InvalidPayload.with_source(e))
    }
}

/// Built-in parser for `config.xml`, using `roxmltree` to walk the document
/// and re-expressing it as the same `serde_json::Value` shape a hand-written
/// `config.json` would produce: element attributes become `"@name"` keys,
/// text-only elements become string values, and repeated child element names
/// become a JSON array.
#[derive(Debug, Default)]
pub struct XmlConfigParser;

impl ConfigParser for XmlConfigParser {
    fn parse(&self, source: &str) -> Result<JsonValue> {
        let doc =
            roxmltree::Document::parse(source).map_err(|e| ErrorKind::InvalidPayload.with_source(e))?;
        Ok(element_to_value(doc.root_element()))
    }
}

fn element_to_value(node: roxmltree::Node) -> JsonValue {
    let mut map = serde_json::Map::new();

    for attr in node.attributes() {
        map.insert(format!("@{}", attr.name()), JsonValue::String(attr.value().to_string()));
    }

    let children: Vec<_> = node.children().filter(|c| c.is_element()).collect();
    if children.is_empty() {
        if let Some(text) = node.text().map(str::trim).filter(|t| !t.is_empty()) {
            if map.is_empty() {
                return JsonValue::String(text.to_string());
            }
            map.insert("#text".into(), JsonValue::String(text.to_string()));
        }
        return JsonValue::Object(map);
    }

    let mut grouped: HashMap<&str, Vec<JsonValue>> = HashMap::new();
    for child in &children {
        grouped
            .entry(child.tag_name().name())
            .or_default()
            .push(element_to_value(*child));
    }
    for (name, mut values) in grouped {
        let value = if values.len() == 1 {
            values.pop().unwrap()
        } else {
            JsonValue::Array(values)
        };
        map.insert(name.to_string(), value);
    }

    JsonValue::Object(map)
}

/// `{extension -> parser}`, keyed by lowercase file extension without the dot.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn ConfigParser>>,
}

impl ParserRegistry {
    /// A registry with the built-in `json` and `xml` parsers already
    /// registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register("json", JsonConfigParser);
        registry.register("xml", XmlConfigParser);
        registry
    }

    pub fn register(&mut self, extension: &str, parser: impl ConfigParser + 'static) {
        self.parsers.insert(extension.to_lowercase(), Box::new(parser));
    }

    pub fn get(&self, extension: &str) -> Option<&dyn ConfigParser> {
        self.parsers.get(&extension.to_lowercase()).map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_parser_parses_plain_json() {
        let parser = JsonConfigParser;
        let value = parser.parse(r#"{"primaryKey": [["id"]]}"#).unwrap();
        assert_eq!(value["primaryKey"][0][0], "id");
    }

    #[test]
    fn xml_parser_lifts_attributes_and_text() {
        let parser = XmlConfigParser;
        let value = parser
            .parse(r#"<resource><attributes><id type="int">pk</id></attributes></resource>"#)
            .unwrap();
        assert_eq!(value["attributes"]["id"]["@type"], "int");
        assert_eq!(value["attributes"]["id"]["#text"], "pk");
    }

    #[test]
    fn registry_resolves_by_lowercase_extension() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.get("JSON").is_some());
        assert!(registry.get("yaml").is_none());
    }
}
