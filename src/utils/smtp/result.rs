// src/utils/smtp/result.rs
//! Defines the outcome type for SMTP probe attempts.

use serde::{Deserialize, Serialize};

/// Represents the outcome of an SMTP probe for an email address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpOutcome {
    /// The dialogue reached a usable verdict.
    pub success: bool,
    /// Whether the recipient is believed to exist.
    pub mailbox_exists: bool,
    /// The server advertised STARTTLS.
    pub supports_tls: bool,
    /// Reply code of the RCPT TO command, 0 if never reached.
    pub reply_code: u16,
    /// Text of the last reply received.
    pub message: String,
    /// Description of the failure, if any.
    pub error: Option<String>,
    /// The verdict relies on the temporary-failure heuristic for
    /// non-reliable providers and may be a false positive.
    pub protected: bool,
    /// The MX host that produced this outcome.
    pub mx_host: Option<String>,
}

impl SmtpOutcome {
    /// RCPT TO was answered; `mailbox_exists` follows the raw 250 rule.
    pub fn answered(reply_code: u16, message: String, supports_tls: bool) -> Self {
        Self {
            success: true,
            mailbox_exists: reply_code == 250,
            supports_tls,
            reply_code,
            message,
            error: None,
            protected: false,
            mx_host: None,
        }
    }

    /// The attempt was aborted before a recipient verdict.
    pub fn aborted(error: impl Into<String>, supports_tls: bool) -> Self {
        Self {
            success: false,
            mailbox_exists: false,
            supports_tls,
            reply_code: 0,
            message: String::new(),
            error: Some(error.into()),
            protected: false,
            mx_host: None,
        }
    }

    /// A decisive classification made by the retry controller.
    pub fn conclusive(mut self, mailbox_exists: bool, protected: bool, host: &str) -> Self {
        self.success = true;
        self.mailbox_exists = mailbox_exists;
        self.protected = protected;
        self.error = None;
        self.mx_host = Some(host.to_string());
        self
    }

    /// Every host and attempt was exhausted without a decisive reply.
    pub fn exhausted(last: Option<SmtpOutcome>) -> Self {
        let mut outcome = last.unwrap_or_default();
        let detail = outcome
            .error
            .take()
            .unwrap_or_else(|| "no mail server responded".to_string());
        outcome.success = false;
        outcome.mailbox_exists = false;
        outcome.protected = false;
        outcome.error = Some(format!("Maximum retry attempts exceeded: {}", detail));
        outcome
    }
}
