//! `mailie`: compose MIME email messages and dispatch them over SMTP.
//!
//! Messages are assembled with [`message::EmailBuilder`] from plain data
//! (addresses, subject, bodies, extra headers, attachment paths) and sent
//! with a [`client::SyncClient`] or [`client::AsyncClient`].

pub mod attach;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod mime;
pub mod model;
pub mod utility;

pub use client::{AsyncClient, ClientConfig, SyncClient};
pub use error::{MailieError, Result};
pub use message::{Email, EmailBuilder};
pub use model::policy::Policy;
