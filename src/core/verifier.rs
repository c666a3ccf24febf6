//! The per-address validation pipeline.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::{Checks, MxRecord, ValidationResult};
use crate::utils::address::parse_address;
use crate::utils::dns::{create_resolver, find_spf_record, DnsResolver, SystemResolver};
use crate::utils::smtp::{Connector, SmtpOutcome, TcpConnector};
use crate::verification::{MailboxProber, PolicyResolver};

/// Runs format, DNS, MX, SPF and mailbox checks for single addresses.
///
/// Holds only immutable state, so one instance is shared across a whole batch.
pub struct EmailVerifier<R = SystemResolver, C = TcpConnector> {
    resolver: R,
    prober: MailboxProber<C>,
    policies: PolicyResolver,
    batch_size: usize,
}

impl EmailVerifier<SystemResolver, TcpConnector> {
    /// Creates a verifier that resolves through the configured name servers
    /// and probes over plain TCP.
    pub fn new(config: &Config) -> Result<Self> {
        tracing::debug!("Initializing EmailVerifier components...");
        let resolver = create_resolver(config)?;
        tracing::debug!("DNS resolver initialized.");
        Ok(Self::with_parts(config, resolver, TcpConnector))
    }
}

impl<R, C> EmailVerifier<R, C>
where
    R: DnsResolver,
    C: Connector,
{
    /// Assembles a verifier from explicit collaborators.
    pub fn with_parts(config: &Config, resolver: R, connector: C) -> Self {
        Self {
            resolver,
            prober: MailboxProber::new(connector, config),
            policies: PolicyResolver::new(config),
            batch_size: config.batch_size.max(1),
        }
    }

    /// Number of records validated concurrently by [`crate::validate_batch`].
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Validates one address. Every failure is reported inside the result.
    pub async fn validate(&self, email: &str) -> ValidationResult {
        let parsed = match parse_address(email) {
            Ok(parsed) => parsed,
            Err(reason) => {
                tracing::debug!(target: "verify_task", "Format check failed for '{}': {}", email, reason);
                return ValidationResult::failed(email.trim(), reason);
            }
        };
        let domain = parsed.domain.as_str();
        let mut result = ValidationResult::failed(parsed.address.as_str(), "");
        result.checks.format = true;

        if !self.domain_exists(domain).await {
            result.reason = "Domain does not exist".to_string();
            return result;
        }
        result.checks.dns = true;

        let mx_records = match self.mail_servers(domain).await {
            Ok(records) => records,
            Err(e) => {
                tracing::debug!(target: "verify_task", "[{}] MX stage failed: {}", domain, e);
                result.reason = "No mail servers found for domain".to_string();
                return result;
            }
        };
        result.checks.mx = true;
        result.details.mx_records = mx_records;

        result.details.spf_record = self.spf_record(domain).await;
        result.checks.spf = result.details.spf_record.is_some();

        let policy = self
            .policies
            .resolve_with_mx(domain, &result.details.mx_records);
        tracing::debug!(target: "verify_task", "[{}] Using '{}' policy", domain, policy.name);
        let outcome = self
            .prober
            .probe(&result.details.mx_records, &parsed.address, domain, policy)
            .await;

        result.checks.smtp = outcome.success;
        result.checks.mailbox = outcome.mailbox_exists;
        result.valid = verdict(&result.checks);
        result.reason = reason(&result.checks, &outcome);
        result.details.smtp_response = Some(outcome);

        tracing::info!(target: "verify_task", "<{}> valid={} ({})", result.email, result.valid, result.reason);
        result
    }

    /// A, AAAA and CNAME are queried together; any answer counts.
    async fn domain_exists(&self, domain: &str) -> bool {
        let (a, aaaa, cname) = tokio::join!(
            self.resolver.lookup_a(domain),
            self.resolver.lookup_aaaa(domain),
            self.resolver.lookup_cname(domain),
        );
        [("A", a), ("AAAA", aaaa), ("CNAME", cname)]
            .into_iter()
            .any(|(kind, lookup)| match lookup {
                Ok(records) => !records.is_empty(),
                Err(e) => {
                    tracing::debug!(target: "dns_task", "[{}] {} lookup failed: {}", domain, kind, e);
                    false
                }
            })
    }

    /// MX hosts sorted by ascending priority; empty is an error. A null MX
    /// (RFC 7505, exchange `.`) declares that the domain takes no mail.
    async fn mail_servers(&self, domain: &str) -> Result<Vec<MxRecord>> {
        let mut records = self.resolver.lookup_mx(domain).await?;
        let before = records.len();
        records.retain(|mx| !mx.exchange.trim_end_matches('.').is_empty());
        if records.len() < before {
            tracing::debug!(target: "dns_task", "[{}] Ignoring {} null MX record(s)", domain, before - records.len());
        }
        if records.is_empty() {
            return Err(AppError::NoDnsRecords(format!("No MX records for {}", domain)));
        }
        records.sort();
        tracing::debug!(target: "dns_task", "[{}] {} MX record(s), preferred {}",
            domain, records.len(), records[0].exchange);
        Ok(records)
    }

    async fn spf_record(&self, domain: &str) -> Option<String> {
        match self.resolver.lookup_txt(domain).await {
            Ok(records) => find_spf_record(&records),
            Err(e) => {
                tracing::debug!(target: "dns_task", "[{}] TXT lookup failed, skipping SPF: {}", domain, e);
                None
            }
        }
    }
}

fn verdict(checks: &Checks) -> bool {
    checks.format && checks.dns && checks.mx && checks.mailbox
}

/// Reason once the mailbox stage ran. Earlier stages return their own
/// reasons before getting here.
fn reason(checks: &Checks, outcome: &SmtpOutcome) -> String {
    if verdict(checks) {
        if outcome.protected {
            return "Email address is valid (provider masks unknown recipients; mailbox presumed to exist)"
                .to_string();
        }
        return "Email address is valid".to_string();
    }
    match (outcome.success, outcome.error.as_deref()) {
        (true, _) => "Mailbox does not exist".to_string(),
        (false, Some(error)) => format!("Mailbox verification failed: {}", error),
        (false, None) => "Mailbox verification failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_prefers_mailbox_failure() {
        let checks = Checks {
            format: true,
            dns: true,
            mx: true,
            spf: false,
            smtp: true,
            mailbox: false,
        };
        let outcome = SmtpOutcome::answered(550, "no such user".into(), false);
        assert_eq!(reason(&checks, &outcome), "Mailbox does not exist");

        let checks = Checks { smtp: false, ..checks };
        let outcome = SmtpOutcome::exhausted(Some(SmtpOutcome::aborted("timed out", false)));
        assert_eq!(
            reason(&checks, &outcome),
            "Mailbox verification failed: Maximum retry attempts exceeded: timed out"
        );
    }

    #[test]
    fn verdict_ignores_spf_and_smtp_flags() {
        let checks = Checks {
            format: true,
            dns: true,
            mx: true,
            spf: false,
            smtp: false,
            mailbox: true,
        };
        assert!(verdict(&checks));
        assert!(!verdict(&Checks { dns: false, ..checks }));
    }

    #[test]
    fn protected_success_is_annotated() {
        let checks = Checks {
            format: true,
            dns: true,
            mx: true,
            spf: true,
            smtp: true,
            mailbox: true,
        };
        let outcome = SmtpOutcome::answered(451, "greylisted".into(), false).conclusive(true, true, "mx.test");
        assert!(reason(&checks, &outcome).starts_with("Email address is valid ("));
    }
}
