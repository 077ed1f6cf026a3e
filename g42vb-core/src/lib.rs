//! g42vbcloud Core
//!
//! Core library for the g42vbcloud infrastructure provider: the `Provider`
//! trait resource handlers are dispatched through, the resource/state model
//! exchanged with the host, attribute schemas, and the composite identifier
//! codec used by relationship resources.

pub mod identifier;
pub mod provider;
pub mod resource;
pub mod schema;
