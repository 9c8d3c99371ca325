//! Service Layer
//!
//! The four request paths the facade composes:
//! - `IndexProvisioner` - once-only database and view provisioning
//! - `LogWriter` - the write path
//! - `query` - range-query translation and result projection
//! - `LogStream` - change feed to live log stream

pub mod provisioner;
pub mod query;
pub mod stream;
pub mod writer;

pub use provisioner::{IndexProvisioner, ProvisioningState};
pub use stream::{LogStream, StreamEvent};
pub use writer::LogWriter;
