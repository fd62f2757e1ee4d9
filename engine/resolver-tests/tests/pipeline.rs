// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! End-to-end coverage of resolve -> execute -> build against an in-memory
//! fake adapter (mirrors the six scenarios in spec §8).

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{resources, FakeAdapter};
use conflux_engine::executor::{execute, AdapterRegistry, ExecutionContext};
use conflux_engine::request::{FilterEntry, Request, SelectOptions, SelectTree};
use conflux_engine::resolver::{resolve, FilterValueSource};
use conflux_engine::result::build;
use conflux_engine::ErrorKind;
use serde_json::json;

fn adapters(tables: HashMap<&str, Vec<serde_json::Value>>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.insert("fake".into(), Arc::new(FakeAdapter::new(tables)) as _);
    registry
}

/// Scenario 1 (spec §8): a bare list request gets the default page size and
/// a `cursor.totalCount` even when the adapter reports none.
#[tokio::test]
async fn minimal_list_returns_every_row_with_a_cursor() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}},
                "title": {"map": {"default": {"primary": "title"}}}
            }
        }),
    );
    let adapters = adapters(HashMap::from([(
        "articles",
        vec![json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})],
    )]));

    let mut request = Request::new("article");
    request.select = Some(select(&[("title", SelectOptions::default())]));

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    let ctx = ExecutionContext::default();
    let raw_results = execute(&tree, &adapters, &ctx).await.unwrap();
    let response = build(&request, &resolved, &raw_results).unwrap();

    assert_eq!(
        response.to_json(),
        json!({
            "data": [
                {"id": 1, "title": "a"},
                {"id": 2, "title": "b"}
            ],
            "cursor": {"totalCount": null}
        })
    );
}

/// Scenario 2 (spec §8): an `id` lookup for a row the adapter doesn't have
/// surfaces as `NotFound`, not an empty item.
#[tokio::test]
async fn single_item_lookup_reports_not_found() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}, "filter": ["equal"]},
                "title": {"map": {"default": {"primary": "title"}}}
            }
        }),
    );
    let adapters = adapters(HashMap::from([("articles", vec![json!({"id": 1, "title": "a"})])]));

    let mut request = Request::new("article");
    request.id = Some("99999".into());
    // This core doesn't translate `request.id` into a key filter itself
    // (spec §9 open question territory); the caller is expected to narrow
    // the query itself, the same way `filter` would for any other lookup.
    request.filter = Some(vec![vec![conflux_engine::request::FilterEntry {
        attribute: vec!["id".into()],
        operator: "equal".into(),
        value: json!("99999"),
    }]]);

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    let ctx = ExecutionContext::default();
    let raw_results = execute(&tree, &adapters, &ctx).await.unwrap();
    let err = build(&request, &resolved, &raw_results).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Scenario 3 (spec §8): a client filter on `author.id` is rewritten to a
/// local `authorId` filter via a `subFilters` `rewriteTo` rule, rather than
/// spawning a separate sub-filter data-source node.
#[tokio::test]
async fn sub_filter_with_rewrite_avoids_a_separate_subfilter_node() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "subFilters": [{"attribute": "author.id", "rewriteTo": "authorId"}],
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}},
                "title": {"map": {"default": {"primary": "title"}}},
                "authorId": {"map": {"default": {"primary": "authorId"}}, "filter": ["equal"]},
                "author": {
                    "primaryKey": [["id"]],
                    "parentKey": [["authorId"]],
                    "childKey": [["id"]],
                    "dataSources": {"primary": {"type": "fake", "primary": true, "table": "authors"}},
                    "attributes": {
                        "id": {"map": {"default": {"primary": "id"}}}
                    }
                }
            }
        }),
    );
    let adapters = adapters(HashMap::from([(
        "articles",
        vec![json!({"id": 1, "title": "a", "authorId": 11})],
    )]));

    let mut request = Request::new("article");
    request.filter = Some(vec![vec![FilterEntry {
        attribute: vec!["author".into(), "id".into()],
        operator: "equal".into(),
        value: json!([11, 12, 13]),
    }]]);

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    assert!(tree.root.sub_filters.is_empty());
    let filter = tree.root.request.filter.as_ref().unwrap();
    assert_eq!(filter[0][0].column, "authorId");
    assert_eq!(filter[0][0].operator, "equal");
    match &filter[0][0].value {
        FilterValueSource::Literal(value) => assert_eq!(value, &json!([11, 12, 13])),
        other => panic!("expected a literal value, got {other:?}"),
    }

    let ctx = ExecutionContext::default();
    let raw_results = execute(&tree, &adapters, &ctx).await.unwrap();
    let response = build(&request, &resolved, &raw_results).unwrap();
    assert_eq!(
        response.to_json(),
        json!({"data": [{"id": 1}], "cursor": {"totalCount": null}})
    );
}

/// Scenario 4 (spec §8): a three-level selection (`versions.versioninfo.modified`)
/// builds a three-level data-source tree, with the inner `versions` ->
/// `versioninfo` join keyed on the composite `["articleId", "versionId"]`.
#[tokio::test]
async fn composite_parent_key_builds_a_three_level_tree() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}},
                "versions": {
                    "primaryKey": [["articleId", "versionId"]],
                    "parentKey": [["id"]],
                    "childKey": [["articleId"]],
                    "many": true,
                    "dataSources": {"primary": {"type": "fake", "primary": true, "table": "versions"}},
                    "attributes": {
                        "articleId": {"map": {"default": {"primary": "articleId"}}},
                        "versionId": {"map": {"default": {"primary": "versionId"}}},
                        "versioninfo": {
                            "primaryKey": [["articleId", "versionId"]],
                            "parentKey": [["articleId", "versionId"]],
                            "childKey": [["articleId", "versionId"]],
                            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "versioninfo"}},
                            "attributes": {
                                "articleId": {"map": {"default": {"primary": "articleId"}}},
                                "versionId": {"map": {"default": {"primary": "versionId"}}},
                                "modified": {"map": {"default": {"primary": "modified"}}}
                            }
                        }
                    }
                }
            }
        }),
    );
    let adapters = adapters(HashMap::from([
        ("articles", vec![json!({"id": 1})]),
        (
            "versions",
            vec![
                json!({"articleId": 1, "versionId": 10}),
                json!({"articleId": 1, "versionId": 11}),
            ],
        ),
        (
            "versioninfo",
            vec![
                json!({"articleId": 1, "versionId": 10, "modified": "2020-01-01"}),
                json!({"articleId": 1, "versionId": 11, "modified": "2020-02-02"}),
            ],
        ),
    ]));

    let mut request = Request::new("article");
    request.select = Some(select(&[(
        "versions",
        SelectOptions {
            select: Some(select(&[(
                "versioninfo",
                SelectOptions {
                    select: Some(select(&[("modified", SelectOptions::default())])),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        },
    )]));

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    let versions_node = tree.root.sub_requests.iter().find(|s| s.resource_name == "versions").unwrap();
    let versioninfo_node = versions_node
        .sub_requests
        .iter()
        .find(|s| s.resource_name == "versioninfo")
        .unwrap();
    assert_eq!(
        versioninfo_node.parent_key.as_deref(),
        Some(&["articleId".to_string(), "versionId".to_string()][..])
    );
    assert_eq!(
        versioninfo_node.child_key.as_deref(),
        Some(&["articleId".to_string(), "versionId".to_string()][..])
    );

    let ctx = ExecutionContext::default();
    let raw_results = execute(&tree, &adapters, &ctx).await.unwrap();
    let response = build(&request, &resolved, &raw_results).unwrap();

    assert_eq!(
        response.to_json(),
        json!({
            "data": [{
                "id": 1,
                "versions": [
                    {"articleId": 1, "versionId": 10, "versioninfo": {"modified": "2020-01-01"}},
                    {"articleId": 1, "versionId": 11, "versioninfo": {"modified": "2020-02-02"}}
                ]
            }],
            "cursor": {"totalCount": null}
        })
    );
}

/// Scenario 6 (spec §8): a duplicate query-string key is rejected end to end,
/// at the HTTP-collaborator boundary this crate owns directly, before any
/// resource is ever resolved.
#[test]
fn duplicate_query_parameter_is_rejected_end_to_end() {
    let url = conflux_engine::request::parse_url("/article/").unwrap();
    let pairs = vec![
        ("width".to_string(), "100".to_string()),
        ("width".to_string(), "200".to_string()),
    ];
    let err = Request::from_http(&url, &pairs, None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateParameter);
    assert!(err.to_string().contains("width"));
}

/// A 1:n sub-resource joins back through `parentKey`/`childKey` end to end,
/// grouping child rows under their parent (spec §4.1.6, §4.3).
#[tokio::test]
async fn one_to_many_sub_resource_groups_rows_by_parent() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}},
                "title": {"map": {"default": {"primary": "title"}}},
                "comments": {
                    "primaryKey": [["id"]],
                    "parentKey": [["id"]],
                    "childKey": [["articleId"]],
                    "many": true,
                    "dataSources": {"primary": {"type": "fake", "primary": true, "table": "comments"}},
                    "attributes": {
                        "id": {"map": {"default": {"primary": "id"}}},
                        "articleId": {"map": {"default": {"primary": "articleId"}}},
                        "body": {"map": {"default": {"primary": "body"}}}
                    }
                }
            }
        }),
    );
    let adapters = adapters(HashMap::from([
        ("articles", vec![json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})]),
        (
            "comments",
            vec![
                json!({"id": 10, "articleId": 1, "body": "hi"}),
                json!({"id": 11, "articleId": 1, "body": "yo"}),
                json!({"id": 12, "articleId": 2, "body": "sup"}),
            ],
        ),
    ]));

    let mut request = Request::new("article");
    request.select = Some(select(&[(
        "comments",
        SelectOptions {
            select: Some(select(&[("body", SelectOptions::default())])),
            ..Default::default()
        },
    )]));

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    let ctx = ExecutionContext::default();
    let raw_results = execute(&tree, &adapters, &ctx).await.unwrap();
    let response = build(&request, &resolved, &raw_results).unwrap();

    assert_eq!(
        response.to_json(),
        json!({
            "data": [
                {"id": 1, "comments": [
                    {"id": 10, "body": "hi"},
                    {"id": 11, "body": "yo"}
                ]},
                {"id": 2, "comments": [
                    {"id": 12, "body": "sup"}
                ]}
            ],
            "cursor": {"totalCount": null}
        })
    );
}

/// Scenario 5 (spec §8): a sub-resource attribute's `depends: {"{root}": ...}`
/// pulls a hidden root attribute into selection - the executor fetches it
/// (it's needed for the item to resolve) but the builder still strips it
/// from the response since it only ever became `internal`, never `selected`
/// by the client (spec §4.1.4, §4.3 "internal stripping").
#[tokio::test]
async fn root_depends_is_fetched_internally_but_not_exposed() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}},
                "title": {"map": {"default": {"primary": "title"}}, "hidden": true},
                "author": {
                    "primaryKey": [["id"]],
                    "parentKey": [["id"]],
                    "childKey": [["id"]],
                    "dataSources": {"primary": {"type": "fake", "primary": true, "table": "authors"}},
                    "attributes": {
                        "id": {"map": {"default": {"primary": "id"}}},
                        "name": {"map": {"default": {"primary": "name"}}},
                        "bio": {
                            "map": {"default": {"primary": "bio"}},
                            "depends": {"{root}": {"select": {"title": {}}}}
                        }
                    }
                }
            }
        }),
    );
    let adapters = adapters(HashMap::from([
        ("articles", vec![json!({"id": 1, "title": "Secret Title"})]),
        ("authors", vec![json!({"id": 1, "name": "Ada", "bio": "loves code"})]),
    ]));

    let mut request = Request::new("article");
    request.select = Some(select(&[(
        "author",
        SelectOptions {
            select: Some(select(&[
                ("name", SelectOptions::default()),
                ("bio", SelectOptions::default()),
            ])),
            ..Default::default()
        },
    )]));

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    assert!(resolved.root.attributes["title"].selected);
    assert!(resolved.root.attributes["title"].internal);

    let ctx = ExecutionContext::default();
    let raw_results = execute(&tree, &adapters, &ctx).await.unwrap();
    let response = build(&request, &resolved, &raw_results).unwrap();

    assert_eq!(
        response.to_json(),
        json!({
            "data": [
                {"id": 1, "author": {"id": 1, "name": "Ada", "bio": "loves code"}}
            ],
            "cursor": {"totalCount": null}
        })
    );
}

/// Resolving a request never mutates the shared parsed config (spec §4.1.1
/// "deep clone"), checked here at the full-pipeline level rather than just
/// on the resolver's own unit tests.
#[tokio::test]
async fn resolving_and_executing_never_mutates_the_shared_config() {
    let resources = resources(
        "article",
        json!({
            "primaryKey": [["id"]],
            "dataSources": {"primary": {"type": "fake", "primary": true, "table": "articles"}},
            "attributes": {
                "id": {"map": {"default": {"primary": "id"}}},
                "title": {"map": {"default": {"primary": "title"}}}
            }
        }),
    );
    let adapters = adapters(HashMap::from([("articles", vec![json!({"id": 1, "title": "a"})])]));

    let mut request = Request::new("article");
    request.select = Some(select(&[("title", SelectOptions::default())]));

    let (resolved, tree) = resolve(&request, &resources).unwrap();
    let ctx = ExecutionContext::default();
    let _ = execute(&tree, &adapters, &ctx).await.unwrap();
    let _ = build(&request, &resolved, &execute(&tree, &adapters, &ctx).await.unwrap()).unwrap();

    assert!(!resources.get("article").unwrap().attributes["title"].selected);
}

fn select(entries: &[(&str, SelectOptions)]) -> SelectTree {
    let mut tree = SelectTree::new();
    for (name, options) in entries {
        tree.insert((*name).to_string(), options.clone());
    }
    tree
}
