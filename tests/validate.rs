mod common;

use common::{verifier, ScriptedConnector, StubResolver};
use email_verifier_core::MxRecord;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn domain_without_records_does_not_exist() {
    let v = verifier(StubResolver::default(), ScriptedConnector::default());
    let result = v.validate("user@example.com").await;

    assert!(!result.valid);
    assert!(result.checks.format);
    assert!(!result.checks.dns);
    assert!(!result.checks.mx && !result.checks.smtp && !result.checks.mailbox);
    assert_eq!(result.reason, "Domain does not exist");
}

#[tokio::test]
async fn bad_format_never_touches_dns() {
    let resolver = StubResolver::default();
    let queries = resolver.queries.clone();
    let v = verifier(resolver, ScriptedConnector::default());

    let result = v.validate("bad-format").await;
    assert!(!result.valid);
    assert!(!result.checks.format);
    assert_eq!(result.reason, "Invalid email format");
    assert_eq!(queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn accepted_recipient_is_valid() {
    let resolver = StubResolver::default().with_domain(
        "acme.test",
        vec![MxRecord::new(10, "mx1.acme.test")],
        vec!["v=spf1 mx -all"],
    );
    let v = verifier(resolver, ScriptedConnector::accepting(&["ada"]));

    let result = v.validate("ada@acme.test").await;
    assert!(result.valid, "{:?}", result);
    assert_eq!(result.reason, "Email address is valid");
    assert!(result.checks.spf && result.checks.smtp && result.checks.mailbox);
    assert_eq!(result.details.spf_record.as_deref(), Some("v=spf1 mx -all"));

    let outcome = result.details.smtp_response.unwrap();
    assert_eq!(outcome.reply_code, 250);
    assert_eq!(outcome.mx_host.as_deref(), Some("mx1.acme.test"));
}

#[tokio::test]
async fn rejected_recipient_is_decisive() {
    let resolver = StubResolver::default().with_domain(
        "acme.test",
        vec![MxRecord::new(10, "mx1.acme.test"), MxRecord::new(20, "mx2.acme.test")],
        vec![],
    );
    let connector = ScriptedConnector::accepting(&["ada"]);
    let v = verifier(resolver, connector.clone());

    let result = v.validate("ghost@acme.test").await;
    assert!(!result.valid);
    assert!(result.checks.smtp);
    assert!(!result.checks.mailbox);
    assert_eq!(result.reason, "Mailbox does not exist");
    assert_eq!(connector.connects(), vec!["mx1.acme.test"]);
}

#[tokio::test]
async fn missing_mx_fails_later_checks() {
    let resolver = StubResolver::default().with_domain("nomail.test", vec![], vec![]);
    let connector = ScriptedConnector::accepting(&["ada"]);
    let v = verifier(resolver, connector.clone());

    let result = v.validate("ada@nomail.test").await;
    assert!(result.checks.dns);
    assert!(!result.checks.mx && !result.checks.smtp && !result.checks.mailbox);
    assert_eq!(result.reason, "No mail servers found for domain");
    assert!(connector.connects().is_empty());
}

#[tokio::test]
async fn null_mx_means_no_mail_servers() {
    let resolver = StubResolver::default().with_domain(
        "parked.test",
        vec![MxRecord::new(0, ""), MxRecord::new(0, ".")],
        vec![],
    );
    let connector = ScriptedConnector::accepting(&["ada"]);
    let v = verifier(resolver, connector.clone());

    let result = v.validate("ada@parked.test").await;
    assert!(result.checks.dns);
    assert!(!result.checks.mx);
    assert_eq!(result.reason, "No mail servers found for domain");
    assert!(result.details.mx_records.is_empty());
    assert!(connector.connects().is_empty());
}

#[tokio::test]
async fn mx_records_come_back_sorted() {
    let resolver = StubResolver::default().with_domain(
        "acme.test",
        vec![
            MxRecord::new(30, "c.acme.test"),
            MxRecord::new(10, "a.acme.test"),
            MxRecord::new(20, "b.acme.test"),
        ],
        vec![],
    );
    let connector = ScriptedConnector::accepting(&["ada"]);
    let v = verifier(resolver, connector.clone());

    let result = v.validate("ada@acme.test").await;
    let priorities: Vec<u16> = result.details.mx_records.iter().map(|m| m.priority).collect();
    assert_eq!(priorities, vec![10, 20, 30]);
    assert_eq!(connector.connects(), vec!["a.acme.test"]);
}

#[tokio::test]
async fn spf_presence_does_not_change_verdict() {
    let with_spf = StubResolver::default().with_domain(
        "acme.test",
        vec![MxRecord::new(10, "mx.acme.test")],
        vec!["v=spf1 -all"],
    );
    let without_spf = StubResolver::default().with_domain(
        "acme.test",
        vec![MxRecord::new(10, "mx.acme.test")],
        vec!["some-verification=abc"],
    );

    let a = verifier(with_spf, ScriptedConnector::accepting(&["ada"]))
        .validate("ada@acme.test")
        .await;
    let b = verifier(without_spf, ScriptedConnector::accepting(&["ada"]))
        .validate("ada@acme.test")
        .await;

    assert!(a.checks.spf);
    assert!(!b.checks.spf);
    assert_eq!(a.valid, b.valid);
    assert_eq!(a.reason, b.reason);
}
