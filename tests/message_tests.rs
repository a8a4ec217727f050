//! Integration tests for message assembly and serialization.

use assert_fs::prelude::*;
use mail_parser::{MessageParser, MimeHeaders};
use predicates::prelude::*;

use mailie::message::Email;
use mailie::model::header::EmailHeader;
use mailie::model::policy::Policy;

#[test]
fn test_subject_converges_across_inputs() {
    let via_param = Email::builder("a@b.com", "c@d.com")
        .subject("X")
        .build()
        .unwrap();
    let via_string = Email::builder("a@b.com", "c@d.com")
        .header("Subject:X")
        .build()
        .unwrap();
    let via_pair = Email::builder("a@b.com", "c@d.com")
        .email_header(EmailHeader::try_from(("Subject", "X")).unwrap())
        .build()
        .unwrap();

    for email in [&via_param, &via_string, &via_pair] {
        assert_eq!(email.get("Subject"), Some("X"));
        assert_eq!(email.get_all("Subject").len(), 1);
    }
}

#[test]
fn test_serialization_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("notes.txt").write_str("some notes").unwrap();

    let email = Email::builder("a@b.com", ["c@d.com", "e@f.com"])
        .subject("Idempotent")
        .text("body")
        .html("<p>body</p>")
        .attachment(temp.child("notes.txt").path())
        .build()
        .unwrap();
    assert_eq!(email.to_text(), email.to_text());
    assert_eq!(email.to_wire_bytes(), email.to_wire_bytes());
}

#[test]
fn test_round_trip_through_parser() {
    let temp = assert_fs::TempDir::new().unwrap();
    let pdf = temp.child("résumé.pdf");
    pdf.write_binary(b"%PDF-1.4 fake").unwrap();

    let email = Email::builder("Sender <sender@example.com>", "recip@example.com")
        .subject("Grüße from the test suite")
        .text("plaintext content")
        .html("<b> html content </b>")
        .attachment(pdf.path())
        .build()
        .unwrap();
    let wire = email.to_wire_bytes();

    let parsed = MessageParser::default().parse(wire.as_slice()).unwrap();
    assert_eq!(parsed.subject(), Some("Grüße from the test suite"));
    assert_eq!(
        parsed.body_text(0).unwrap().trim_end(),
        "plaintext content"
    );
    assert_eq!(
        parsed.body_html(0).unwrap().trim_end(),
        "<b> html content </b>"
    );
    assert_eq!(parsed.attachment_count(), 1);
    let attachment = parsed.attachment(0).unwrap();
    assert_eq!(attachment.attachment_name(), Some("résumé.pdf"));
    assert_eq!(attachment.contents(), b"%PDF-1.4 fake");
}

#[test]
fn test_non_ascii_display_names_round_trip() {
    let email = Email::builder(
        "\"Müller, Hans\" <hans@example.com>",
        ["Zoë Ågren <zoe@example.com>", "plain@example.com"],
    )
    .subject("Hallo")
    .build()
    .unwrap();
    let wire = email.to_wire_bytes();
    let text = String::from_utf8_lossy(&wire);
    assert!(text.is_ascii());
    assert!(!text.contains("Hans\""));

    let parsed = MessageParser::default().parse(wire.as_slice()).unwrap();
    let from = parsed.from().unwrap().first().unwrap();
    assert_eq!(from.name(), Some("Müller, Hans"));
    assert_eq!(from.address(), Some("hans@example.com"));
    let to = parsed.to().unwrap().first().unwrap();
    assert_eq!(to.name(), Some("Zoë Ågren"));
    assert_eq!(to.address(), Some("zoe@example.com"));

    let utf8 = Email::builder("\"Müller, Hans\" <hans@example.com>", "c@d.com")
        .policy(Policy::SmtpUtf8)
        .build()
        .unwrap();
    assert!(utf8
        .to_text()
        .starts_with("From: \"Müller, Hans\" <hans@example.com>\r\n"));
}

#[test]
fn test_latin1_round_trip() {
    let email = Email::builder("a@b.com", "c@d.com")
        .charset("iso-8859-1")
        .text("Crème brûlée")
        .build()
        .unwrap();
    let bytes = email.to_bytes();
    let parsed = MessageParser::default().parse(bytes.as_slice()).unwrap();
    assert_eq!(parsed.body_text(0).unwrap().trim_end(), "Crème brûlée");
}

#[test]
fn test_long_lines_are_encoded() {
    let long = "word ".repeat(400);
    let email = Email::builder("a@b.com", "c@d.com")
        .text(long.trim_end())
        .build()
        .unwrap();
    let text = email.to_text();
    assert!(text.lines().all(|line| line.len() <= 998));
    assert!(predicate::str::contains("Content-Transfer-Encoding: quoted-printable").eval(&text));
}

#[test]
fn test_long_subject_is_folded() {
    let subject = "a rather long subject line ".repeat(6);
    let email = Email::builder("a@b.com", "c@d.com")
        .subject(subject.trim_end())
        .build()
        .unwrap();
    let text = email.to_text();
    let header_block = text.split("\n\n").next().unwrap();
    assert!(header_block.lines().all(|line| line.len() <= 78));
    assert!(header_block.lines().any(|line| line.starts_with(' ')));

    let http = Email::builder("a@b.com", "c@d.com")
        .policy(Policy::Http)
        .subject(subject.trim_end())
        .build()
        .unwrap();
    assert!(http.to_text().contains(&format!("Subject: {}\r\n", subject.trim_end())));
}

#[test]
fn test_preamble_and_epilogue() {
    let email = Email::builder("a@b.com", "c@d.com")
        .text("t")
        .html("<i>h</i>")
        .preamble("This is a multi-part message in MIME format.")
        .epilogue("End of message.")
        .build()
        .unwrap();
    let text = email.to_text();
    let body = text.split_once("\n\n").unwrap().1;
    assert!(body.starts_with("This is a multi-part message in MIME format.\n--"));
    assert!(text.ends_with("--\nEnd of message.\n"));
}

#[test]
fn test_mime_version_written_once() {
    let email = Email::builder("a@b.com", "c@d.com")
        .header("MIME-Version: 1.0")
        .build()
        .unwrap();
    assert_eq!(email.to_text().matches("MIME-Version:").count(), 1);

    let email = Email::builder("a@b.com", "c@d.com").build().unwrap();
    let text = email.to_text();
    let mime = text.find("MIME-Version: 1.0").unwrap();
    let content_type = text.find("Content-Type:").unwrap();
    assert!(mime < content_type);
}

#[test]
fn test_unknown_policy_falls_back_to_default() {
    let email = Email::builder("a@b.com", "c@d.com")
        .policy_name("nonsense")
        .build()
        .unwrap();
    assert_eq!(email.policy(), Policy::Default);
}

#[test]
fn test_bcc_in_free_headers_does_not_reach_envelope() {
    let email = Email::builder("a@b.com", "c@d.com")
        .header("Bcc: hidden@d.com")
        .build()
        .unwrap();
    assert_eq!(email.rcpt_to(), ["c@d.com"]);
    assert_eq!(email.get("Bcc"), Some("hidden@d.com"));
}
