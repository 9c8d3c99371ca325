//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - API for logging front-ends
//! - Driven Ports (outbound) - The document store

pub mod inbound;
pub mod outbound;

pub use inbound::LogTransport;
pub use outbound::{ChangeFeed, DocumentReceipt, DocumentStore, DocumentStoreFactory};
