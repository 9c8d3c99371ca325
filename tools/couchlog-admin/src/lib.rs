//! Couchlog admin: an operator CLI over the CouchDB log transport.

pub mod cli;
pub mod commands;
