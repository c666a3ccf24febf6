#![allow(dead_code)]

use async_trait::async_trait;
use email_verifier_core::{Config, Connector, DnsResolver, EmailVerifier, MxRecord, Result};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

/// Answers lookups from fixed tables and counts every query.
#[derive(Default)]
pub struct StubResolver {
    pub a: HashMap<String, Vec<String>>,
    pub mx: HashMap<String, Vec<MxRecord>>,
    pub txt: HashMap<String, Vec<String>>,
    pub queries: Arc<AtomicUsize>,
}

impl StubResolver {
    pub fn with_domain(mut self, domain: &str, mx: Vec<MxRecord>, txt: Vec<&str>) -> Self {
        self.a.insert(domain.to_string(), vec!["192.0.2.10".to_string()]);
        self.mx.insert(domain.to_string(), mx);
        self.txt
            .insert(domain.to_string(), txt.into_iter().map(String::from).collect());
        self
    }

    fn hit(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DnsResolver for StubResolver {
    async fn lookup_a(&self, name: &str) -> Result<Vec<String>> {
        self.hit();
        Ok(self.a.get(name).cloned().unwrap_or_default())
    }
    async fn lookup_aaaa(&self, _name: &str) -> Result<Vec<String>> {
        self.hit();
        Ok(Vec::new())
    }
    async fn lookup_cname(&self, _name: &str) -> Result<Vec<String>> {
        self.hit();
        Ok(Vec::new())
    }
    async fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>> {
        self.hit();
        Ok(self.mx.get(name).cloned().unwrap_or_default())
    }
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        self.hit();
        Ok(self.txt.get(name).cloned().unwrap_or_default())
    }
}

/// Opens in-memory SMTP servers whose RCPT reply depends on the recipient.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    /// Local part to RCPT reply; anything else gets `550`.
    pub mailboxes: Arc<HashMap<String, String>>,
    pub connects: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn accepting(local_parts: &[&str]) -> Self {
        Self {
            mailboxes: Arc::new(
                local_parts
                    .iter()
                    .map(|l| (l.to_string(), "250 2.1.5 OK\r\n".to_string()))
                    .collect(),
            ),
            connects: Arc::default(),
        }
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

async fn serve(stream: DuplexStream, mailboxes: Arc<HashMap<String, String>>) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    if write_half.write_all(b"220 mx.test ESMTP\r\n").await.is_err() {
        return;
    }
    let mut line = String::new();
    while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
        let command = line.trim_end().to_string();
        line.clear();
        let reply = if command.starts_with("EHLO") {
            "250-mx.test\r\n250 SIZE 1000000\r\n".to_string()
        } else if command.starts_with("MAIL FROM") {
            "250 OK\r\n".to_string()
        } else if let Some(rest) = command.strip_prefix("RCPT TO:<") {
            let local = rest.split('@').next().unwrap_or("");
            mailboxes
                .get(local)
                .cloned()
                .unwrap_or_else(|| "550 5.1.1 user unknown\r\n".to_string())
        } else if command == "QUIT" {
            "221 bye\r\n".to_string()
        } else {
            "502 not implemented\r\n".to_string()
        };
        if write_half.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self, host: &str, _port: u16) -> io::Result<DuplexStream> {
        self.connects.lock().unwrap().push(host.to_string());
        let (client, server) = tokio::io::duplex(8192);
        tokio::spawn(serve(server, Arc::clone(&self.mailboxes)));
        Ok(client)
    }
}

pub fn test_config() -> Config {
    Config {
        smtp_timeout: Duration::from_secs(2),
        smtp_connect_timeout: Duration::from_secs(2),
        retry_backoff: Duration::from_millis(1),
        batch_size: 2,
        ..Config::default()
    }
}

pub fn verifier(
    resolver: StubResolver,
    connector: ScriptedConnector,
) -> EmailVerifier<StubResolver, ScriptedConnector> {
    EmailVerifier::with_parts(&test_config(), resolver, connector)
}
