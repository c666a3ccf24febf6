//! Per-provider probing behaviour.
//!
//! Large mailbox providers treat unauthenticated probes differently: some
//! answer honestly, some accept everything, some throttle. The table below is
//! where that knowledge lives; the pipeline only ever sees a [`ProviderPolicy`].

use crate::core::config::Config;
use crate::core::models::MxRecord;

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Mail providers with known probing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gmail,
    Microsoft,
    Yahoo,
    Icloud,
    Zoho,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Gmail,
        Provider::Microsoft,
        Provider::Yahoo,
        Provider::Icloud,
        Provider::Zoho,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Microsoft => "microsoft",
            Provider::Yahoo => "yahoo",
            Provider::Icloud => "icloud",
            Provider::Zoho => "zoho",
        }
    }

    /// Consumer domains served by the provider.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Provider::Gmail => &["gmail.com", "googlemail.com"],
            Provider::Microsoft => &["outlook.com", "hotmail.com", "live.com", "msn.com"],
            Provider::Yahoo => &["yahoo.com", "ymail.com", "rocketmail.com", "aol.com"],
            Provider::Icloud => &["icloud.com", "me.com", "mac.com"],
            Provider::Zoho => &["zoho.com", "zohomail.com"],
        }
    }

    /// Fragments of the provider's MX host names, e.g. for hosted custom domains.
    pub fn mx_patterns(self) -> &'static [&'static str] {
        match self {
            Provider::Gmail => &["google.com", "googlemail.com"],
            Provider::Microsoft => &["protection.outlook.com", "outlook.com", "hotmail.com"],
            Provider::Yahoo => &["yahoodns.net", "mx.aol.com"],
            Provider::Icloud => &["mail.icloud.com", "icloud.com"],
            Provider::Zoho => &["zoho.com", "zoho.eu", "zohomail.com"],
        }
    }

    /// Alias match first, then MX pattern match against the domain and the
    /// given exchange names.
    pub fn identify<'a, I>(domain: &str, mx_hosts: I) -> Option<Provider>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if let Some(provider) = Provider::ALL
            .into_iter()
            .find(|p| p.aliases().iter().any(|alias| *alias == domain))
        {
            return Some(provider);
        }

        let mut names = vec![domain];
        names.extend(
            mx_hosts
                .into_iter()
                .map(|host| host.trim_end_matches('.').to_ascii_lowercase()),
        );
        Provider::ALL.into_iter().find(|p| {
            p.mx_patterns()
                .iter()
                .any(|pattern| names.iter().any(|name| name.contains(pattern)))
        })
    }
}

/// How to probe one provider. Never mutated after the resolver is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPolicy {
    pub name: String,
    /// Whether a temporary failure can be taken at face value.
    pub reliable: bool,
    pub helo_host: String,
    /// Per-command reply deadline.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub accept_codes: HashSet<u16>,
    pub reject_codes: HashSet<u16>,
    pub temp_codes: HashSet<u16>,
    /// Attempts per MX host.
    pub retry_attempts: u32,
    pub from_addresses: Vec<String>,
    pub require_tls: bool,
}

fn codes(list: &[u16]) -> HashSet<u16> {
    list.iter().copied().collect()
}

/// The EHLO identity a provider wants to see from an unknown client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeloIdentity {
    /// The configured `helo_host`.
    Configured,
    /// The domain of the configured sender, so HELO and `MAIL FROM` align.
    SenderDomain,
}

/// Static probing knowledge for one provider, before configuration is applied.
#[derive(Debug)]
struct Profile {
    reliable: bool,
    helo: HeloIdentity,
    timeout: Duration,
    connect_timeout: Duration,
    accept_codes: HashSet<u16>,
    reject_codes: HashSet<u16>,
    temp_codes: HashSet<u16>,
    retry_attempts: u32,
    /// Preferred `MAIL FROM` local parts, tried at the sender domain.
    sender_locals: &'static [&'static str],
    require_tls: bool,
}

static KNOWN_PROFILES: Lazy<HashMap<Provider, Profile>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        Provider::Gmail,
        Profile {
            reliable: true,
            helo: HeloIdentity::SenderDomain,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            accept_codes: codes(&[250]),
            reject_codes: codes(&[550, 551, 553]),
            temp_codes: codes(&[421, 450, 451, 452]),
            retry_attempts: 2,
            sender_locals: &["postmaster", "verify"],
            require_tls: true,
        },
    );
    table.insert(
        Provider::Microsoft,
        Profile {
            reliable: true,
            helo: HeloIdentity::SenderDomain,
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(8),
            accept_codes: codes(&[250]),
            reject_codes: codes(&[550, 551, 553]),
            temp_codes: codes(&[421, 450, 451, 452]),
            retry_attempts: 1,
            sender_locals: &["postmaster", "noreply"],
            require_tls: true,
        },
    );
    // Yahoo answers 250 for most recipients and throttles aggressively.
    table.insert(
        Provider::Yahoo,
        Profile {
            reliable: false,
            helo: HeloIdentity::Configured,
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            accept_codes: codes(&[250]),
            reject_codes: codes(&[550, 553, 554]),
            temp_codes: codes(&[421, 451]),
            retry_attempts: 1,
            sender_locals: &["noreply", "postmaster"],
            require_tls: false,
        },
    );
    table.insert(
        Provider::Icloud,
        Profile {
            reliable: true,
            helo: HeloIdentity::SenderDomain,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            accept_codes: codes(&[250]),
            reject_codes: codes(&[550, 553]),
            temp_codes: codes(&[421, 450, 451]),
            retry_attempts: 2,
            sender_locals: &["postmaster"],
            require_tls: true,
        },
    );
    table.insert(
        Provider::Zoho,
        Profile {
            reliable: true,
            helo: HeloIdentity::Configured,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(8),
            accept_codes: codes(&[250]),
            reject_codes: codes(&[550, 551, 553]),
            temp_codes: codes(&[421, 450, 451, 452]),
            retry_attempts: 2,
            sender_locals: &["verify", "postmaster"],
            require_tls: false,
        },
    );
    table
});

/// Domain part of the configured sender, else the configured HELO host.
fn sender_domain(config: &Config) -> String {
    config
        .smtp_sender_email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim())
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| config.helo_host.trim())
        .to_ascii_lowercase()
}

impl Profile {
    fn policy(&self, provider: Provider, config: &Config) -> ProviderPolicy {
        let domain = sender_domain(config);
        let helo_host = match self.helo {
            HeloIdentity::Configured => config.helo_host.clone(),
            HeloIdentity::SenderDomain => domain.clone(),
        };
        ProviderPolicy {
            name: provider.name().to_string(),
            reliable: self.reliable,
            helo_host,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            accept_codes: self.accept_codes.clone(),
            reject_codes: self.reject_codes.clone(),
            temp_codes: self.temp_codes.clone(),
            retry_attempts: self.retry_attempts,
            from_addresses: self
                .sender_locals
                .iter()
                .map(|local| format!("{}@{}", local, domain))
                .collect(),
            require_tls: self.require_tls,
        }
    }
}

/// Maps domains to policies. Pure lookups, no I/O.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    known: HashMap<Provider, ProviderPolicy>,
    generic: ProviderPolicy,
}

impl PolicyResolver {
    /// Builds the per-run policies, prepending the configured sender to
    /// every candidate sender list.
    pub fn new(config: &Config) -> Self {
        let with_sender = |mut policy: ProviderPolicy| {
            let sender = config.smtp_sender_email.trim();
            if !sender.is_empty() {
                policy.from_addresses.retain(|a| !a.eq_ignore_ascii_case(sender));
                policy.from_addresses.insert(0, sender.to_string());
            }
            policy
        };

        let generic = ProviderPolicy {
            name: "generic".to_string(),
            reliable: false,
            helo_host: config.helo_host.clone(),
            timeout: config.smtp_timeout,
            connect_timeout: config.smtp_connect_timeout,
            accept_codes: codes(&[250, 251]),
            reject_codes: codes(&[550, 551, 553]),
            temp_codes: codes(&[421, 450, 451, 452]),
            retry_attempts: config.max_verification_attempts.max(1),
            from_addresses: Vec::new(),
            require_tls: false,
        };

        let known = KNOWN_PROFILES
            .iter()
            .map(|(provider, profile)| {
                (*provider, with_sender(profile.policy(*provider, config)))
            })
            .collect();

        Self {
            known,
            generic: with_sender(generic),
        }
    }

    /// Policy for `domain` by alias or MX naming pattern, else the generic one.
    pub fn resolve(&self, domain: &str) -> &ProviderPolicy {
        self.resolve_with_mx(domain, &[])
    }

    /// Like [`Self::resolve`], also matching MX naming patterns against the
    /// domain's exchange hosts.
    pub fn resolve_with_mx(&self, domain: &str, mx_records: &[MxRecord]) -> &ProviderPolicy {
        let hosts = mx_records.iter().map(|mx| mx.exchange.as_str());
        match Provider::identify(domain, hosts).and_then(|p| self.known.get(&p)) {
            Some(policy) => policy,
            None => &self.generic,
        }
    }
}
