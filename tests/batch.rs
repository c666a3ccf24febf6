mod common;

use async_trait::async_trait;
use common::{test_config, verifier, ScriptedConnector, StubResolver};
use email_verifier_core::{
    validate_batch, BatchEvent, DnsResolver, EmailVerifier, MxRecord, Record, RecordSource, Result,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn records(values: Vec<serde_json::Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn acme_verifier() -> Arc<email_verifier_core::EmailVerifier<StubResolver, ScriptedConnector>> {
    let resolver = StubResolver::default().with_domain(
        "acme.test",
        vec![MxRecord::new(10, "mx.acme.test")],
        vec![],
    );
    Arc::new(verifier(resolver, ScriptedConnector::accepting(&["ada", "bob"])))
}

#[tokio::test]
async fn empty_input_yields_single_error() {
    let events: Vec<BatchEvent> = validate_batch(acme_verifier(), Vec::<Record>::new())
        .collect()
        .await;
    assert_eq!(
        events,
        vec![BatchEvent::Error {
            message: "No records found in input".to_string()
        }]
    );
}

#[tokio::test]
async fn every_record_comes_back_in_order() {
    let input = records(vec![
        json!({"name": "Ada", "email": "ada@acme.test"}),
        json!({"name": "Bob", "Email": "bob@acme.test"}),
        json!({"name": "Ghost", "EMAIL": "ghost@acme.test"}),
        json!({"name": "Nobody"}),
        json!({"name": "Typo", "e-mail": "not an address"}),
    ]);
    let events: Vec<BatchEvent> = validate_batch(acme_verifier(), input).collect().await;

    match &events[0] {
        BatchEvent::Init {
            total_records,
            field_names,
        } => {
            assert_eq!(*total_records, 5);
            assert_eq!(field_names, &vec!["name".to_string(), "email".to_string()]);
        }
        other => panic!("expected init, got {:?}", other),
    }
    assert_eq!(events.last(), Some(&BatchEvent::Complete));

    let mut percents = Vec::new();
    let mut out = Vec::new();
    for event in &events[1..events.len() - 1] {
        match event {
            BatchEvent::Progress { percent, records } => {
                percents.push(*percent);
                out.extend(records.iter().cloned());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    // Groups of two: 2, 4, 5 records processed.
    assert_eq!(percents, vec![40, 80, 100]);
    assert_eq!(out.len(), 5);

    let names: Vec<&str> = out.iter().map(|r| r.fields["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Ada", "Bob", "Ghost", "Nobody", "Typo"]);
    assert!(out[0].validation.valid);
    assert!(out[1].validation.valid);
    assert_eq!(out[2].validation.reason, "Mailbox does not exist");
    assert_eq!(out[3].validation.reason, "No email address found");
    assert_eq!(out[4].validation.reason, "Invalid email format");
}

fn acme_parts() -> (StubResolver, ScriptedConnector) {
    let resolver = StubResolver::default().with_domain(
        "acme.test",
        vec![MxRecord::new(10, "mx.acme.test")],
        vec![],
    );
    (resolver, ScriptedConnector::accepting(&["ada", "bob"]))
}

fn numbered(count: usize) -> Vec<Record> {
    records((0..count).map(|i| json!({"email": format!("user{}@acme.test", i)})).collect())
}

#[tokio::test]
async fn dropping_the_stream_stops_early() {
    let (resolver, connector) = acme_parts();
    let connects = connector.clone();
    let verifier = Arc::new(verifier(resolver, connector));

    let mut events = Box::pin(validate_batch(verifier, numbered(20)));
    assert!(matches!(events.next().await, Some(BatchEvent::Init { .. })));
    drop(events);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = connects.connects().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(connects.connects().len(), settled);
    assert!(settled < 20, "{} SMTP sessions opened after the stream was dropped", settled);
}

#[tokio::test]
async fn nothing_runs_before_first_poll() {
    let (resolver, connector) = acme_parts();
    let connects = connector.clone();
    let verifier = Arc::new(verifier(resolver, connector));

    let events = validate_batch(verifier, numbered(4));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(connects.connects().is_empty());

    let events: Vec<BatchEvent> = events.collect().await;
    assert_eq!(events.last(), Some(&BatchEvent::Complete));
    assert_eq!(connects.connects().len(), 4);
}

#[test]
fn building_the_stream_needs_no_runtime() {
    let stream = validate_batch(acme_verifier(), numbered(2));
    drop(stream);
}

/// Counts the records handed out after the counting pass.
struct CountingSource {
    records: Vec<Record>,
    opens: Arc<AtomicUsize>,
    read: Arc<AtomicUsize>,
}

impl RecordSource for CountingSource {
    fn open(&self) -> Result<Box<dyn Iterator<Item = Result<Record>> + Send + '_>> {
        let pass = self.opens.fetch_add(1, Ordering::SeqCst);
        let read = Arc::clone(&self.read);
        Ok(Box::new(self.records.iter().cloned().map(move |record| {
            if pass > 0 {
                read.fetch_add(1, Ordering::SeqCst);
            }
            Ok(record)
        })))
    }
}

#[tokio::test]
async fn reading_stays_one_group_ahead() {
    let read = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        records: numbered(20),
        opens: Arc::default(),
        read: Arc::clone(&read),
    };
    let mut events = Box::pin(validate_batch(acme_verifier(), source));
    assert!(matches!(events.next().await, Some(BatchEvent::Init { .. })));

    // With the consumer idle: one progress event queued, the next group
    // validated and waiting, one group buffered, one record in hand.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let group = test_config().batch_size;
    let in_flight = read.load(Ordering::SeqCst);
    assert!(in_flight <= 3 * group + 1, "read {} records ahead", in_flight);

    let mut progress = 0;
    while let Some(event) = events.next().await {
        if let BatchEvent::Progress { .. } = event {
            progress += 1;
        }
    }
    assert_eq!(progress, 10);
    assert_eq!(read.load(Ordering::SeqCst), 20);
}

/// Panics for one domain, answers like the stub everywhere else.
struct ExplodingResolver(StubResolver);

#[async_trait]
impl DnsResolver for ExplodingResolver {
    async fn lookup_a(&self, name: &str) -> Result<Vec<String>> {
        if name == "boom.test" {
            panic!("resolver exploded");
        }
        self.0.lookup_a(name).await
    }
    async fn lookup_aaaa(&self, name: &str) -> Result<Vec<String>> {
        self.0.lookup_aaaa(name).await
    }
    async fn lookup_cname(&self, name: &str) -> Result<Vec<String>> {
        self.0.lookup_cname(name).await
    }
    async fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>> {
        self.0.lookup_mx(name).await
    }
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        self.0.lookup_txt(name).await
    }
}

#[tokio::test]
async fn panicking_validation_becomes_processing_error() {
    let (resolver, connector) = acme_parts();
    let verifier = Arc::new(EmailVerifier::with_parts(
        &test_config(),
        ExplodingResolver(resolver),
        connector,
    ));
    let input = records(vec![
        json!({"email": "ada@acme.test"}),
        json!({"email": "x@boom.test"}),
    ]);

    let events: Vec<BatchEvent> = validate_batch(verifier, input).collect().await;
    assert_eq!(events.last(), Some(&BatchEvent::Complete));
    let out = match &events[1] {
        BatchEvent::Progress { percent, records } => {
            assert_eq!(*percent, 100);
            records.clone()
        }
        other => panic!("expected progress, got {:?}", other),
    };
    assert!(out[0].validation.valid);
    assert!(!out[1].validation.valid);
    assert_eq!(out[1].validation.email, "x@boom.test");
    assert_eq!(out[1].validation.reason, "Processing error: resolver exploded");
}
