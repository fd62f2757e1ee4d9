// Copyright (c) the conflux_engine authors.
// Licensed under the MIT License.

//! C1: the parsed resource config model (spec §3.1) and its filesystem loader
//! (spec §6.2).

mod loader;
mod node;
mod parser;
mod validate;

pub use loader::load_resources;
pub use node::{
    ActionFn, ActionHandler, AttrNode, DataSourceConfig, Direction, Extensions, Inherit, KeyGroup,
    OrderEntry, OrderSpec, ResolvedKey, ResourceMap, SubFilterSpec,
};
pub use parser::{ConfigParser, JsonConfigParser, ParserRegistry, XmlConfigParser};
pub use validate::validate_node;
