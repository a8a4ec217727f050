//! Core data model types: headers, policies, addresses, and attachments.

pub mod address;
pub mod attachment;
pub mod header;
pub mod policy;
