//! Drives SMTP probes across a domain's MX hosts and classifies the replies.

use super::policy::ProviderPolicy;
use crate::core::config::Config;
use crate::core::models::MxRecord;
use crate::utils::smtp::{probe_once, Connector, SmtpOutcome};

use std::time::Duration;

/// How a completed `RCPT TO` reply is read under a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Exists,
    Missing,
    /// Temporary failure from a non-reliable provider, optimistically "exists".
    Protected,
    Ambiguous,
}

fn classify(policy: &ProviderPolicy, reply_code: u16) -> Verdict {
    if policy.accept_codes.contains(&reply_code) {
        Verdict::Exists
    } else if policy.reject_codes.contains(&reply_code) {
        Verdict::Missing
    } else if !policy.reliable && policy.temp_codes.contains(&reply_code) {
        Verdict::Protected
    } else {
        Verdict::Ambiguous
    }
}

/// Sequential MX failover with a per-host retry budget.
pub struct MailboxProber<C> {
    connector: C,
    port: u16,
    backoff: Duration,
}

impl<C: Connector> MailboxProber<C> {
    pub fn new(connector: C, config: &Config) -> Self {
        Self {
            connector,
            port: config.smtp_port,
            backoff: config.retry_backoff,
        }
    }

    /// Probes `address` on each host in ascending priority until one gives a
    /// decisive answer. Hosts are never contacted concurrently.
    pub async fn probe(
        &self,
        mx_records: &[MxRecord],
        address: &str,
        domain: &str,
        policy: &ProviderPolicy,
    ) -> SmtpOutcome {
        let mut hosts: Vec<&MxRecord> = mx_records.iter().collect();
        hosts.sort();

        let attempts = policy.retry_attempts.max(1);
        let mut last: Option<SmtpOutcome> = None;

        for mx in hosts {
            for attempt in 1..=attempts {
                if attempt > 1 {
                    tokio::time::sleep(self.backoff).await;
                }
                tracing::debug!(target: "smtp_task",
                    "Probing <{}> via {} (attempt {}/{}, policy {})",
                    address, mx.exchange, attempt, attempts, policy.name);

                let outcome = probe_once(
                    &self.connector,
                    &mx.exchange,
                    self.port,
                    address,
                    domain,
                    policy,
                )
                .await;

                if !outcome.success {
                    tracing::debug!(target: "smtp_task", "[{}] Attempt {} failed: {}",
                        mx.exchange, attempt, outcome.error.as_deref().unwrap_or("unknown error"));
                    last = Some(outcome);
                    continue;
                }

                match classify(policy, outcome.reply_code) {
                    Verdict::Exists => return outcome.conclusive(true, false, &mx.exchange),
                    Verdict::Missing => return outcome.conclusive(false, false, &mx.exchange),
                    Verdict::Protected => {
                        tracing::info!(target: "smtp_task",
                            "[{}] Temporary reply {} from non-reliable provider, presuming <{}> exists",
                            mx.exchange, outcome.reply_code, address);
                        return outcome.conclusive(true, true, &mx.exchange);
                    }
                    Verdict::Ambiguous => {
                        tracing::debug!(target: "smtp_task", "[{}] Ambiguous reply {} {}",
                            mx.exchange, outcome.reply_code, outcome.message);
                        let mut outcome = outcome;
                        outcome.error = Some(format!(
                            "Unexpected reply {} from {}: {}",
                            outcome.reply_code, mx.exchange, outcome.message
                        ));
                        outcome.mx_host = Some(mx.exchange.clone());
                        last = Some(outcome);
                    }
                }
            }
        }

        tracing::warn!(target: "smtp_task", "No decisive SMTP answer for <{}>", address);
        SmtpOutcome::exhausted(last)
    }
}
