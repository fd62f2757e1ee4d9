// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! `<resourcesPath>/<resource-name>/config.<ext>` directory walk (spec §6.2).
//!
//! `index.<native>` (the per-resource action/extension entry point) is out of
//! scope here — see SPEC_FULL.md §10.3. Callers that want actions/extensions
//! attach them to the loaded [`AttrNode`]s themselves, e.g. via
//! [`ResourceMap`] post-processing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::node::{AttrNode, ResourceMap};
use crate::config::parser::ParserRegistry;
use crate::config::validate::validate_node;
use crate::error::ErrorKind;
use crate::Result;

/// Walks `resources_path`, parsing one resource per directory that contains a
/// `config.<ext>` file. Nested directories produce slash-separated resource
/// names (spec §6.2 "nested dirs produce slash-separated names"). Directories
/// with no `config.*` are ignored (but still walked, since a directory with no
/// config of its own may contain resources nested underneath it).
pub fn load_resources(resources_path: &Path, parsers: &ParserRegistry) -> Result<ResourceMap> {
    let mut resources = HashMap::new();
    walk(resources_path, "", parsers, &mut resources)?;
    for (name, node) in &resources {
        validate_node(name, node)?;
    }
    Ok(resources)
}

fn walk(
    dir: &Path,
    name_prefix: &str,
    parsers: &ParserRegistry,
    out: &mut ResourceMap,
) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| ErrorKind::ConfigInvariantViolated.with_source(e))?;
    let mut subdirs = Vec::new();
    let mut config_file = None;

    for entry in entries {
        let entry = entry.map_err(|e| ErrorKind::ConfigInvariantViolated.with_source(e))?;
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
            continue;
        }
        if path.file_stem().and_then(|s| s.to_str()) == Some("config") {
            config_file = Some(path);
        }
    }

    if let Some(config_path) = config_file {
        let resource_name = name_prefix.trim_start_matches('/');
        if resource_name.is_empty() {
            return Err(ErrorKind::ConfigInvariantViolated
                .with_message("config file found at the resources root, outside any resource directory"));
        }
        let node = parse_config_file(&config_path, parsers)?;
        out.insert(resource_name.to_string(), Arc::new(node));
    }

    for subdir in subdirs {
        let Some(dir_name) = subdir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let child_prefix = if name_prefix.is_empty() {
            dir_name.to_string()
        } else {
            format!("{name_prefix}/{dir_name}")
        };
        walk(&subdir, &child_prefix, parsers, out)?;
    }

    Ok(())
}

fn parse_config_file(path: &Path, parsers: &ParserRegistry) -> Result<AttrNode> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let parser = parsers.get(extension).ok_or_else(|| {
        ErrorKind::ConfigInvariantViolated
            .with_message(format!("no parser registered for extension '{extension}'"))
    })?;
    let source = fs::read_to_string(path).map_err(|e| ErrorKind::ConfigInvariantViolated.with_source(e))?;
    let value = parser.parse(&source)?;
    serde_json::from_value(value).map_err(|e| ErrorKind::ConfigInvariantViolated.with_source(e))
}
