//! Integration flows across the transport's layers.

pub mod support;

mod provisioning;
mod query_flow;
mod streaming;
mod write_path;
