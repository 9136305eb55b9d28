//! # Mail
//!
//! The two outbound capabilities the executor depends on, plus composition:
//!
//! - [`EmailTransport`] delivers a fully composed [`EmailMessage`]
//! - [`TemplateRenderer`] turns a [`TemplateId`] and its fields into HTML
//! - [`MessageComposer`] picks template, sender, recipient and subject for a
//!   (recipient, event) pair
//!
//! Delivery is not idempotent; callers must hold a ledger claim before
//! calling [`EmailTransport::send`].

pub mod compose;
pub mod http;
pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifierResult;

pub use compose::MessageComposer;
pub use http::HttpMailTransport;
pub use templates::{BuiltinTemplateRenderer, TemplateFields, TemplateId, TemplateRenderer};

/// An address with an optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn named(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync + 'static {
    /// Deliver one message; any error means the send may or may not have happened
    async fn send(&self, message: &EmailMessage) -> NotifierResult<()>;

    fn transport_name(&self) -> &'static str;
}
