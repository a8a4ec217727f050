//! Transfer encodings and header encoding.
//!
//! Body encodings follow RFC 2045 (7bit / 8bit / quoted-printable / base64),
//! header text uses RFC 2047 `B` encoded words, and non-ASCII filename
//! parameters use RFC 2231.

use std::fmt;

use data_encoding::BASE64;

use crate::error::{MailieError, Result};
use crate::model::address::EmailAddress;
use crate::model::policy::Policy;

/// Hard RFC 5322 line limit, used when the policy sets none.
const HARD_LINE_LIMIT: usize = 998;

/// Base64 output line width.
const BASE64_LINE: usize = 76;

/// Headers whose value is a comma-separated list of mailboxes.
const ADDRESS_HEADERS: [&str; 6] = ["from", "to", "cc", "bcc", "reply-to", "sender"];

/// Raw bytes per encoded word (45 bytes → 60 base64 chars, 72 with framing).
const ENCODED_WORD_CHUNK: usize = 45;

/// A `Content-Transfer-Encoding` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text converted to the bytes of a target charset.
#[derive(Debug, Clone)]
pub struct EncodedText {
    /// Charset parameter to advertise.
    pub charset: String,
    /// Encoded body bytes, line breaks normalized to `\n`.
    pub bytes: Vec<u8>,
}

/// Encode `text` in the charset named by `label`.
///
/// Fails when the label is unknown or the text holds characters the
/// charset cannot represent.
pub fn transcode(text: &str, label: &str) -> Result<EncodedText> {
    let normalized = normalize_newlines(text);
    let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| MailieError::UnsupportedCharset(label.to_string()))?;

    let (bytes, output, had_errors) = encoding.encode(&normalized);
    if had_errors {
        return Err(MailieError::UnsupportedCharset(format!(
            "{label}: text contains characters the charset cannot represent"
        )));
    }

    let label = label.trim().to_lowercase();
    let charset = if output == encoding && label_covers(&label, encoding, &bytes) {
        label
    } else {
        output.name().to_lowercase()
    };
    Ok(EncodedText {
        charset,
        bytes: bytes.into_owned(),
    })
}

/// Whether `bytes` stay inside the repertoire `label` promises.
///
/// Several labels resolve to a superset encoding (`us-ascii` and the
/// `iso-8859-1` aliases to windows-1252, for instance). Output that uses the
/// extra code points must be labelled with the encoding actually used.
fn label_covers(label: &str, encoding: &'static encoding_rs::Encoding, bytes: &[u8]) -> bool {
    if label.eq_ignore_ascii_case(encoding.name()) || bytes.is_ascii() {
        return true;
    }
    match label {
        "ascii" | "us-ascii" | "ansi_x3.4-1968" => false,
        "cp1252" | "x-cp1252" => encoding == encoding_rs::WINDOWS_1252,
        // Latin-1 aliases: windows-1252 only adds printable characters in 0x80..=0x9F.
        _ if encoding == encoding_rs::WINDOWS_1252 => {
            !bytes.iter().any(|b| (0x80..=0x9F).contains(b))
        }
        _ => false,
    }
}

/// Pick the transfer encoding for a text body.
///
/// ASCII within the line limit stays 7bit; valid UTF-8 within the limit goes
/// out as 8bit; anything else uses whichever of quoted-printable and base64
/// is shorter.
pub fn choose_text_encoding(bytes: &[u8], policy: Policy) -> TransferEncoding {
    let limit = policy.max_line_length().unwrap_or(HARD_LINE_LIMIT);
    let fits = bytes.split(|&b| b == b'\n').all(|line| line.len() <= limit);

    if fits && bytes.is_ascii() {
        return TransferEncoding::SevenBit;
    }
    if fits && std::str::from_utf8(bytes).is_ok() {
        return TransferEncoding::EightBit;
    }

    let qp_len: usize = bytes
        .split(|&b| b == b'\n')
        .map(|line| quoted_printable::encode(line).len() + 2)
        .sum();
    let b64_len = BASE64.encode_len(bytes.len());
    if qp_len <= b64_len {
        TransferEncoding::QuotedPrintable
    } else {
        TransferEncoding::Base64
    }
}

/// Render a text body with the given transfer encoding.
///
/// `bytes` must use `\n` line breaks. The result ends with `linesep`.
pub fn encode_text_body(bytes: &[u8], encoding: TransferEncoding, linesep: &str) -> String {
    let trimmed = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    match encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit => {
            let text = String::from_utf8_lossy(trimmed);
            let mut out = text.split('\n').collect::<Vec<_>>().join(linesep);
            out.push_str(linesep);
            out
        }
        TransferEncoding::QuotedPrintable => {
            let mut out = String::new();
            for line in trimmed.split(|&b| b == b'\n') {
                let encoded = quoted_printable::encode(line);
                let encoded = String::from_utf8_lossy(&encoded);
                out.push_str(&encoded.replace("\r\n", linesep));
                out.push_str(linesep);
            }
            out
        }
        TransferEncoding::Base64 => {
            // Canonical form for encoded text is CRLF.
            let canonical: Vec<u8> = trimmed
                .split(|&b| b == b'\n')
                .collect::<Vec<_>>()
                .join(&b"\r\n"[..]);
            let mut canonical = canonical;
            canonical.extend_from_slice(b"\r\n");
            encode_base64_lines(&canonical, linesep)
        }
    }
}

/// Base64 wrapped at 76 columns, every line terminated by `linesep`.
pub fn encode_base64_lines(data: &[u8], linesep: &str) -> String {
    let encoded = BASE64.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str(linesep);
    }
    out
}

/// Encode non-ASCII header text as RFC 2047 words unless the policy allows UTF-8.
///
/// Runs of adjacent non-ASCII words are encoded together so the spaces
/// between them survive decoding. ASCII words are left untouched.
pub fn encode_header_value(value: &str, policy: Policy) -> String {
    if policy.utf8() || value.is_ascii() {
        return value.to_string();
    }

    let mut out: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    for word in value.split(' ') {
        if word.is_ascii() {
            if !run.is_empty() {
                out.push(encoded_words(&run.join(" ")));
                run.clear();
            }
            out.push(word.to_string());
        } else {
            run.push(word);
        }
    }
    if !run.is_empty() {
        out.push(encoded_words(&run.join(" ")));
    }
    out.join(" ")
}

/// Encode the value of header `name` for output under `policy`.
///
/// Address headers go through [`encode_address_list`]; everything else
/// through [`encode_header_value`].
pub fn encode_header(name: &str, value: &str, policy: Policy) -> String {
    if ADDRESS_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
        encode_address_list(value, policy)
    } else {
        encode_header_value(value, policy)
    }
}

/// Encode the display names of a mailbox list.
///
/// Encoded words may not appear inside a quoted string, so each non-ASCII
/// display name is unquoted and encoded as one unit. The `<addr-spec>` and
/// any mailbox with an ASCII name are written unchanged.
pub fn encode_address_list(value: &str, policy: Policy) -> String {
    if policy.utf8() || value.is_ascii() {
        return value.to_string();
    }
    split_mailboxes(value)
        .into_iter()
        .map(|mailbox| {
            let parsed = EmailAddress::parse(mailbox);
            if parsed.display_name.is_ascii() {
                mailbox.trim().to_string()
            } else {
                format!("{} <{}>", encoded_words(&parsed.display_name), parsed.address)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a mailbox list on commas outside quoted strings and angle brackets.
fn split_mailboxes(value: &str) -> Vec<&str> {
    let mut mailboxes = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    let mut in_angle = false;
    for (idx, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => in_angle = true,
            '>' if !quoted => in_angle = false,
            ',' if !quoted && !in_angle => {
                mailboxes.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    mailboxes.push(&value[start..]);
    mailboxes.retain(|m| !m.trim().is_empty());
    mailboxes
}

/// `=?utf-8?b?…?=` words, split on character boundaries.
fn encoded_words(text: &str) -> String {
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (idx, ch) in text.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > ENCODED_WORD_CHUNK && end > start {
            words.push(format!("=?utf-8?b?{}?=", BASE64.encode(&text.as_bytes()[start..end])));
            start = end;
        }
        end = next;
    }
    if end > start {
        words.push(format!("=?utf-8?b?{}?=", BASE64.encode(&text.as_bytes()[start..end])));
    }
    words.join(" ")
}

/// Render `name: value`, folding at spaces when the line exceeds the policy limit.
///
/// The returned string carries no trailing line separator.
pub fn fold_header(name: &str, value: &str, policy: Policy) -> String {
    let mut out = format!("{name}:");
    let Some(max) = policy.max_line_length() else {
        out.push(' ');
        out.push_str(value);
        return out;
    };

    let linesep = policy.linesep();
    let mut line_len = out.len();
    let mut words_on_line = 0;
    for word in value.split(' ') {
        if words_on_line > 0 && line_len + 1 + word.len() > max {
            out.push_str(linesep);
            line_len = 0;
        }
        out.push(' ');
        out.push_str(word);
        line_len += 1 + word.len();
        words_on_line += 1;
    }
    out
}

/// A `filename` parameter, RFC 2231 encoded when the name is not ASCII.
pub fn filename_param(name: &str) -> String {
    if name.is_ascii() {
        format!("filename=\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        format!("filename*=utf-8''{}", percent_encode(name))
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Convert `\r\n` and lone `\r` to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_short_is_7bit() {
        assert_eq!(
            choose_text_encoding(b"hello\nworld\n", Policy::Default),
            TransferEncoding::SevenBit
        );
    }

    #[test]
    fn test_utf8_short_is_8bit() {
        assert_eq!(
            choose_text_encoding("Café con leña".as_bytes(), Policy::Smtp),
            TransferEncoding::EightBit
        );
    }

    #[test]
    fn test_long_ascii_line_is_qp() {
        let line = "a ".repeat(60);
        assert_eq!(
            choose_text_encoding(line.as_bytes(), Policy::Default),
            TransferEncoding::QuotedPrintable
        );
        // No line limit under http.
        assert_eq!(
            choose_text_encoding(line.as_bytes(), Policy::Http),
            TransferEncoding::SevenBit
        );
    }

    #[test]
    fn test_binary_text_prefers_base64() {
        let bytes: Vec<u8> = (0x80u8..=0xFF).cycle().take(400).collect();
        assert_eq!(
            choose_text_encoding(&bytes, Policy::Default),
            TransferEncoding::Base64
        );
    }

    #[test]
    fn test_plain_body_uses_linesep() {
        let body = encode_text_body(b"one\ntwo", TransferEncoding::SevenBit, "\r\n");
        assert_eq!(body, "one\r\ntwo\r\n");
    }

    #[test]
    fn test_qp_body_round_trips() {
        let body = encode_text_body("naïve\n".as_bytes(), TransferEncoding::QuotedPrintable, "\n");
        assert_eq!(body, "na=C3=AFve\n");
    }

    #[test]
    fn test_base64_lines_wrap() {
        let data = vec![0u8; 100];
        let out = encode_base64_lines(&data, "\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0].len(), 76);
        assert!(out.ends_with('\n'));
        assert_eq!(lines.concat(), BASE64.encode(&data));
    }

    #[test]
    fn test_header_ascii_untouched() {
        assert_eq!(encode_header_value("Hello there", Policy::Default), "Hello there");
    }

    #[test]
    fn test_header_non_ascii_encoded() {
        let out = encode_header_value("Hi Café leña!", Policy::Default);
        assert_eq!(out, format!("Hi {}", encoded_words("Café leña!")));
        assert!(out.contains("=?utf-8?b?"));
        assert_eq!(
            encode_header_value("Hi Café", Policy::SmtpUtf8),
            "Hi Café"
        );
    }

    #[test]
    fn test_address_display_name_encoded_whole() {
        let out = encode_address_list(
            "\"Müller, Hans\" <hans@example.com>, bob@example.com",
            Policy::Default,
        );
        assert_eq!(
            out,
            format!("{} <hans@example.com>, bob@example.com", encoded_words("Müller, Hans"))
        );
        assert!(!out.contains('"'));
    }

    #[test]
    fn test_address_headers_pick_mailbox_encoding() {
        let value = "José <jose@example.com>";
        assert_eq!(
            encode_header("Reply-To", value, Policy::Default),
            format!("{} <jose@example.com>", encoded_words("José"))
        );
        assert_eq!(encode_header("FROM", value, Policy::SmtpUtf8), value);
        assert_eq!(
            encode_header("X-Note", value, Policy::Default),
            encode_header_value(value, Policy::Default)
        );
    }

    #[test]
    fn test_split_mailboxes_respects_quotes() {
        assert_eq!(
            split_mailboxes("\"a, \\\"b\" <a@x.com>, <c,d@x.com>, e@x.com,"),
            vec!["\"a, \\\"b\" <a@x.com>", " <c,d@x.com>", " e@x.com"]
        );
    }

    #[test]
    fn test_encoded_words_split_on_char_boundaries() {
        let text = "é".repeat(40);
        let words = encoded_words(&text);
        let decoded: Vec<u8> = words
            .split(' ')
            .flat_map(|w| {
                let inner = w.trim_start_matches("=?utf-8?b?").trim_end_matches("?=");
                BASE64.decode(inner.as_bytes()).unwrap()
            })
            .collect();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
        assert!(words.split(' ').count() > 1);
    }

    #[test]
    fn test_fold_long_header() {
        let value = "word ".repeat(30);
        let folded = fold_header("Subject", value.trim_end(), Policy::Default);
        for line in folded.split('\n') {
            assert!(line.len() <= 78, "line too long: {line}");
        }
        let unfolded = folded.replace('\n', "");
        assert_eq!(unfolded, format!("Subject: {}", value.trim_end()));
    }

    #[test]
    fn test_no_fold_under_http() {
        let value = "word ".repeat(30);
        let folded = fold_header("Subject", &value, Policy::Http);
        assert!(!folded.contains('\n'));
    }

    #[test]
    fn test_filename_params() {
        assert_eq!(filename_param("image.png"), "filename=\"image.png\"");
        assert_eq!(filename_param("ñ.txt"), "filename*=utf-8''%C3%B1.txt");
    }

    #[test]
    fn test_transcode_latin1() {
        let encoded = transcode("Café", "iso-8859-1").unwrap();
        assert_eq!(encoded.charset, "iso-8859-1");
        assert_eq!(encoded.bytes, vec![b'C', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_transcode_superset_labels() {
        let encoded = transcode("Café", "us-ascii").unwrap();
        assert_eq!(encoded.charset, "windows-1252");
        assert_eq!(encoded.bytes, vec![b'C', b'a', b'f', 0xE9]);

        assert_eq!(transcode("plain", "US-ASCII").unwrap().charset, "us-ascii");
        assert_eq!(transcode("5 €", "iso-8859-1").unwrap().charset, "windows-1252");
        assert_eq!(transcode("Grüße", "latin1").unwrap().charset, "latin1");
        assert_eq!(transcode("Şişli", "iso-8859-9").unwrap().charset, "windows-1254");
        assert_eq!(transcode("Grüße", "utf8").unwrap().charset, "utf-8");
    }

    #[test]
    fn test_transcode_unknown_label() {
        assert!(matches!(
            transcode("x", "klingon-8"),
            Err(MailieError::UnsupportedCharset(_))
        ));
    }

    #[test]
    fn test_transcode_unrepresentable() {
        assert!(transcode("日本", "us-ascii").is_err());
    }
}
