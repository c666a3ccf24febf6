//! Provider policies and the MX failover/retry controller built on the SMTP client.

pub mod policy;
pub mod probe;

pub use policy::{PolicyResolver, Provider, ProviderPolicy};
pub use probe::MailboxProber;
