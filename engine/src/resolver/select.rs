// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Selection tree building (spec §4.1.2) and `depends` closure (spec §4.1.4).

use std::collections::HashSet;

use crate::config::AttrNode;
use crate::error::ErrorKind;
use crate::request::{SelectOptions, SelectTree};
use crate::Result;

/// Distinguishes a client-driven selection from one pulled in by `depends`:
/// depends may reach hidden attributes and references config bugs as
/// [`ErrorKind::ConfigInvariantViolated`] rather than a client-facing
/// [`ErrorKind::UnknownAttribute`], and only marks `internal: true` on
/// attributes that weren't already selected.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Origin {
    Client,
    Depends,
}

/// Marks `node`'s primary-key attributes selected (spec §4.1.2 "Implicitly
/// mark the primaryKey attributes at every resource level"), then applies the
/// client's `select` tree (if any) recursively, and finally computes
/// `response_order`. `depends` closure is a separate pass — see
/// [`resolve_depends`] — since it must run across the *whole* tree, not just
/// one node's subtree, after every node's explicit selection is settled.
pub fn mark_selection(node: &mut AttrNode, select: Option<&SelectTree>, path: &str) -> Result<()> {
    mark_primary_key(node);

    if let Some(select) = select {
        for (name, options) in select {
            apply_one(node, name, options, Origin::Client, path)?;
        }
    }

    finalize_order(node);
    Ok(())
}

fn mark_primary_key(node: &mut AttrNode) {
    if !node.is_resource() {
        return;
    }
    for attr_name in node.flat_primary_key() {
        if let Some(attr) = node.attributes.get_mut(&attr_name) {
            attr.selected = true;
        }
    }
}

fn apply_one(
    node: &mut AttrNode,
    name: &str,
    options: &SelectOptions,
    origin: Origin,
    path: &str,
) -> Result<()> {
    let child_path = if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    };

    let Some(attr) = node.attributes.get_mut(name) else {
        return Err(unknown_attribute_error(origin, &child_path, false));
    };

    if attr.hidden && origin == Origin::Client {
        return Err(unknown_attribute_error(origin, &child_path, true));
    }

    let is_sub_resource = attr.is_resource();
    if (options.filter.is_some() || options.order.is_some() || options.limit.is_some() || options.page.is_some())
        && !is_sub_resource
    {
        return Err(ErrorKind::InvalidSelectOption
            .with_message(format!("Invalid selection option on non-resource attribute {child_path}")));
    }

    let was_selected = attr.selected;
    attr.selected = true;
    if origin == Origin::Client {
        attr.internal = false;
    } else if !was_selected {
        attr.internal = true;
    }

    if origin == Origin::Client {
        if !node.select_order.iter().any(|n| n == name) {
            node.select_order.push(name.to_string());
        }
        if options.filter.is_some() {
            attr.request_filter = options.filter.clone();
        }
        if options.order.is_some() {
            attr.request_order = options.order.clone();
        }
        if options.limit.is_some() {
            attr.request_limit = options.limit;
        }
        if options.page.is_some() {
            attr.request_page = options.page;
        }
    }

    if !attr.attributes.is_empty() {
        if let Some(nested) = &options.select {
            for (nested_name, nested_options) in nested {
                apply_one(attr, nested_name, nested_options, origin, &child_path)?;
            }
        }
        finalize_order(attr);
    }

    Ok(())
}

fn unknown_attribute_error(origin: Origin, path: &str, hidden: bool) -> crate::Error {
    match origin {
        Origin::Client if hidden => {
            ErrorKind::UnknownAttribute.with_message(format!("Unknown attribute (hidden) {path}"))
        }
        Origin::Client => ErrorKind::UnknownAttribute.with_message(format!("Unknown attribute {path}")),
        Origin::Depends => ErrorKind::ConfigInvariantViolated
            .with_message(format!("depends references unknown attribute {path}")),
    }
}

fn finalize_order(node: &mut AttrNode) {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    for name in node.flat_primary_key() {
        if node.attributes.contains_key(&name) && seen.insert(name.clone()) {
            order.push(name);
        }
    }
    for name in &node.select_order {
        if seen.insert(name.clone()) {
            order.push(name.clone());
        }
    }
    node.response_order = order;
}

/// Runs the `depends` fixed-point closure across the whole resolved tree
/// rooted at `root` (spec §4.1.4). Cycles terminate naturally: each round can
/// only flip more attributes from unselected to selected, and there are
/// finitely many attributes, so the loop converges in at most that many
/// rounds.
pub fn resolve_depends(root: &mut AttrNode) -> Result<()> {
    loop {
        let pending = collect_pending_depends(root, &mut Vec::new());
        if pending.is_empty() {
            return Ok(());
        }
        let mut changed = false;
        for (path, tree) in pending {
            let target = if path.is_empty() {
                &mut *root
            } else {
                node_at_path_mut(root, &path)
                    .ok_or_else(|| ErrorKind::ConfigInvariantViolated.with_message("depends path vanished"))?
            };
            for (name, options) in &tree {
                let before = target.attributes.get(name).map(|a| a.selected).unwrap_or(false);
                apply_one(target, name, options, Origin::Depends, "")?;
                let after = target.attributes.get(name).map(|a| a.selected).unwrap_or(false);
                changed |= !before && after;
            }
            finalize_order(target);
        }
        if !changed {
            return Ok(());
        }
    }
}

/// Every `(declaring_path, depends_tree)` pair still pending application,
/// collected by walking the whole tree for selected attributes that declare
/// `depends`. `{root}` branches are split out with `declaring_path = []` so
/// the caller applies them against `root` directly, and local branches keep
/// the path to their declaring node.
fn collect_pending_depends(
    node: &AttrNode,
    path: &mut Vec<String>,
) -> Vec<(Vec<String>, SelectTree)> {
    let mut out = Vec::new();
    for (name, attr) in &node.attributes {
        if attr.selected {
            if let Some(depends) = &attr.depends {
                let mut root_tree = SelectTree::new();
                let mut local_tree = SelectTree::new();
                for (key, opts) in depends {
                    if key == "{root}" {
                        if let Some(nested) = &opts.select {
                            for (n, o) in nested {
                                root_tree.insert(n.clone(), o.clone());
                            }
                        }
                    } else {
                        local_tree.insert(key.clone(), opts.clone());
                    }
                }
                if !root_tree.is_empty() {
                    out.push((Vec::new(), root_tree));
                }
                if !local_tree.is_empty() {
                    out.push((path.clone(), local_tree));
                }
            }
        }
        if !attr.attributes.is_empty() {
            path.push(name.clone());
            out.extend(collect_pending_depends(attr, path));
            path.pop();
        }
    }
    out
}

/// Walks `.attributes[name]` through `path`, starting from `root`.
pub fn node_at_path_mut<'a>(root: &'a mut AttrNode, path: &[String]) -> Option<&'a mut AttrNode> {
    let mut current = root;
    for segment in path {
        current = current.attributes.get_mut(segment)?;
    }
    Some(current)
}

pub fn node_at_path<'a>(root: &'a AttrNode, path: &[String]) -> Option<&'a AttrNode> {
    let mut current = root;
    for segment in path {
        current = current.attributes.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceConfig;
    use crate::request::SelectOptions;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;

    fn leaf(ds: &str, column: &str) -> AttrNode {
        let mut node = AttrNode::default();
        let mut map = StdHashMap::new();
        map.insert(ds.to_string(), column.to_string());
        node.map.insert("default".into(), map);
        node
    }

    fn resource() -> AttrNode {
        let mut node = AttrNode::default();
        node.primary_key = vec![vec!["id".into()]];
        node.data_sources.insert(
            "primary".into(),
            DataSourceConfig {
                ds_type: "mysql".into(),
                primary: true,
                inherit: None,
                options: Arc::new(serde_json::json!({})),
            },
        );
        node.attributes.insert("id".into(), leaf("primary", "id"));
        node.attributes.insert("title".into(), leaf("primary", "title"));
        let mut hidden_attr = leaf("primary", "secret");
        hidden_attr.hidden = true;
        node.attributes.insert("secret".into(), hidden_attr);
        node
    }

    #[test]
    fn implicit_primary_key_is_always_selected() {
        let mut node = resource();
        mark_selection(&mut node, None, "").unwrap();
        assert!(node.attributes["id"].selected);
        assert!(!node.attributes["title"].selected);
        assert_eq!(node.response_order, vec!["id".to_string()]);
    }

    #[test]
    fn explicit_select_marks_attribute() {
        let mut node = resource();
        let mut select = SelectTree::new();
        select.insert("title".into(), SelectOptions::default());
        mark_selection(&mut node, Some(&select), "").unwrap();
        assert!(node.attributes["title"].selected);
        assert_eq!(node.response_order, vec!["id".to_string(), "title".to_string()]);
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let mut node = resource();
        let mut select = SelectTree::new();
        select.insert("nope".into(), SelectOptions::default());
        let err = mark_selection(&mut node, Some(&select), "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAttribute);
    }

    #[test]
    fn hidden_attribute_reports_as_unknown() {
        let mut node = resource();
        let mut select = SelectTree::new();
        select.insert("secret".into(), SelectOptions::default());
        let err = mark_selection(&mut node, Some(&select), "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAttribute);
        assert!(err.to_string().contains("hidden"));
    }

    #[test]
    fn depends_pulls_in_sibling_and_flags_internal() {
        let mut node = resource();
        node.attributes.get_mut("title").unwrap().hidden = false;
        let mut depends = SelectTree::new();
        depends.insert("secret".into(), SelectOptions::default());
        node.attributes.get_mut("title").unwrap().depends = Some(depends);

        let mut select = SelectTree::new();
        select.insert("title".into(), SelectOptions::default());
        mark_selection(&mut node, Some(&select), "").unwrap();
        resolve_depends(&mut node).unwrap();

        assert!(node.attributes["secret"].selected);
        assert!(node.attributes["secret"].internal);
        // Internal attributes never make it into response_order.
        assert!(!node.response_order.contains(&"secret".to_string()));
    }

    #[test]
    fn explicitly_selected_dependency_is_not_internal() {
        let mut node = resource();
        node.attributes.get_mut("title").unwrap().hidden = false;
        let mut depends = SelectTree::new();
        depends.insert("secret".into(), SelectOptions::default());
        node.attributes.get_mut("title").unwrap().depends = Some(depends);
        node.attributes.get_mut("secret").unwrap().hidden = false;

        let mut select = SelectTree::new();
        select.insert("title".into(), SelectOptions::default());
        select.insert("secret".into(), SelectOptions::default());
        mark_selection(&mut node, Some(&select), "").unwrap();
        resolve_depends(&mut node).unwrap();

        assert!(!node.attributes["secret"].internal);
    }

    #[test]
    fn cyclic_depends_terminate() {
        let mut node = resource();
        for name in ["title", "secret"] {
            node.attributes.get_mut(name).unwrap().hidden = false;
        }
        let mut depends_title = SelectTree::new();
        depends_title.insert("secret".into(), SelectOptions::default());
        node.attributes.get_mut("title").unwrap().depends = Some(depends_title);
        let mut depends_secret = SelectTree::new();
        depends_secret.insert("title".into(), SelectOptions::default());
        node.attributes.get_mut("secret").unwrap().depends = Some(depends_secret);

        let mut select = SelectTree::new();
        select.insert("title".into(), SelectOptions::default());
        mark_selection(&mut node, Some(&select), "").unwrap();
        resolve_depends(&mut node).unwrap();

        assert!(node.attributes["title"].selected);
        assert!(node.attributes["secret"].selected);
    }
}
