//! DNS lookups used by the validation pipeline.
//!
//! The pipeline talks to [`DnsResolver`] so that lookups can be replaced in
//! tests; [`SystemResolver`] is the production implementation.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::MxRecord;

use async_trait::async_trait;
use std::net::IpAddr;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::TokioAsyncResolver;

/// The record lookups the pipeline needs. Each may fail independently.
///
/// "No records" is reported as an empty `Vec`, not an error.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup_a(&self, name: &str) -> Result<Vec<String>>;
    async fn lookup_aaaa(&self, name: &str) -> Result<Vec<String>>;
    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>>;
    async fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>>;
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// Resolver backed by `trust-dns-resolver`.
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new(inner: TokioAsyncResolver) -> Self {
        Self { inner }
    }
}

/// Builds the resolver from configuration: explicit name servers when
/// configured, the system configuration otherwise.
pub(crate) fn create_resolver(config: &Config) -> Result<SystemResolver> {
    let mut opts = ResolverOpts::default();
    opts.timeout = config.dns_timeout;
    opts.attempts = 2;

    let resolver = if config.dns_servers.is_empty() {
        tracing::debug!(target: "dns_task", "Using system DNS configuration.");
        let (system_config, mut system_opts) =
            trust_dns_resolver::system_conf::read_system_conf().map_err(|e| {
                AppError::Initialization(format!("Failed to read system DNS configuration: {}", e))
            })?;
        system_opts.timeout = config.dns_timeout;
        TokioAsyncResolver::tokio(system_config, system_opts)
    } else {
        let ips = config
            .dns_servers
            .iter()
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|e| AppError::Config(format!("Invalid DNS server '{}': {}", s, e)))
            })
            .collect::<Result<Vec<IpAddr>>>()?;
        tracing::debug!(target: "dns_task", "Using {} configured DNS servers.", ips.len());
        let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
        TokioAsyncResolver::tokio(ResolverConfig::from_parts(None, vec![], group), opts)
    };
    Ok(SystemResolver::new(resolver))
}

fn is_no_records(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Maps "no records" to an empty list and keeps every other failure.
fn empty_on_no_records<T>(result: std::result::Result<Vec<T>, ResolveError>) -> Result<Vec<T>> {
    match result {
        Ok(values) => Ok(values),
        Err(e) if is_no_records(&e) => Ok(Vec::new()),
        Err(e) => Err(AppError::Dns(e)),
    }
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup_a(&self, name: &str) -> Result<Vec<String>> {
        empty_on_no_records(
            self.inner
                .ipv4_lookup(name)
                .await
                .map(|lookup| lookup.iter().map(|a| a.to_string()).collect()),
        )
    }

    async fn lookup_aaaa(&self, name: &str) -> Result<Vec<String>> {
        empty_on_no_records(
            self.inner
                .ipv6_lookup(name)
                .await
                .map(|lookup| lookup.iter().map(|aaaa| aaaa.to_string()).collect()),
        )
    }

    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>> {
        empty_on_no_records(
            self.inner
                .lookup(name, RecordType::CNAME)
                .await
                .map(|lookup| {
                    lookup
                        .iter()
                        .filter(|rdata| rdata.record_type() == RecordType::CNAME)
                        .map(|rdata| normalize_exchange(&rdata.to_string()))
                        .collect()
                }),
        )
    }

    async fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>> {
        empty_on_no_records(self.inner.mx_lookup(name).await.map(|lookup| {
            lookup
                .iter()
                .map(|mx| {
                    MxRecord::new(mx.preference(), normalize_exchange(&mx.exchange().to_utf8()))
                })
                .collect()
        }))
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        empty_on_no_records(self.inner.txt_lookup(name).await.map(|lookup| {
            lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|piece| String::from_utf8_lossy(piece).into_owned())
                        .collect::<String>()
                })
                .collect()
        }))
    }
}

/// Returns the first TXT record that declares SPF (`v=spf1`, any case).
pub(crate) fn find_spf_record(records: &[String]) -> Option<String> {
    records
        .iter()
        .map(|record| record.trim())
        .find(|record| {
            record
                .get(..6)
                .map(|head| head.eq_ignore_ascii_case("v=spf1"))
                .unwrap_or(false)
        })
        .map(str::to_string)
}
