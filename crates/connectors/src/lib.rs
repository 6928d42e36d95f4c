//! External collaborators consumed by the Quarry pipeline.
//!
//! Quarry treats everything beyond the templating/execution pipeline as a
//! pluggable collaborator behind an async trait:
//!
//! | Seam | Trait | Implementations |
//! |------|-------|-----------------|
//! | Analytics warehouse | [`warehouse::Warehouse`] | [`warehouse::rest::RestWarehouse`] |
//! | Session credentials | [`credentials::CredentialsProvider`] | static token, OAuth client credentials |
//! | Result archival | [`storage::ObjectStore`] | HTTP PUT, local filesystem |
//!
//! Bound query parameters always travel out-of-band in the request body; no
//! collaborator ever interpolates caller values into SQL text.
pub mod credentials;
pub mod storage;
pub mod warehouse;
