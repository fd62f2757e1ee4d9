// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! Request-planning and result-assembly engine for a declaratively-configured
//! read-only REST API framework.
//!
//! The pipeline: a client [`request::Request`] is resolved against a parsed
//! [`config::AttrNode`] resource tree ([`resolver::resolve`]) into a
//! `resolvedConfig`/`dataSourceTree` pair, the tree is executed against
//! pluggable [`executor::DataSourceAdapter`]s ([`executor::execute`]), and the
//! flat raw results are stitched back into a nested [`result::Response`]
//! ([`result::build`]). [`facade`] wires the three stages together behind a
//! hot-reloadable resource map and an event bus; [`processor`] dispatches a
//! resource's configured actions to that pipeline.

pub mod config;
pub mod error;
pub mod executor;
pub mod facade;
pub mod key;
pub mod processor;
pub mod request;
pub mod resolver;
pub mod result;

pub use error::{Error, ErrorCategory, ErrorKind, Result};
