//! # Couchlog Test Suite
//!
//! Cross-crate integration flows. Every flow runs the public facade against
//! `InMemoryDocumentStore`, so no CouchDB server is needed.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs        # Fixtures: transports, clocks, recording store
//!     ├── write_path.rs     # Decycling, silence, timestamps, error events
//!     ├── provisioning.rs   # Once-only database and view creation
//!     ├── query_flow.rs     # Range inversion, paging, projection
//!     ├── streaming.rs      # Tip start, resume, destroy
//!     └── wire.rs           # Connection resolution, change-feed lines
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p couchlog-tests
//! cargo test -p couchlog-tests integration::streaming::
//! ```

pub mod integration;
