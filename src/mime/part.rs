//! The MIME content tree.
//!
//! A [`MimePart`] is either a leaf (text or binary payload) or a multipart
//! container holding child parts. Transfer encodings are chosen when the tree
//! is rendered, so the same tree can be written under any [`Policy`].

use crate::mime::encoding::{
    choose_text_encoding, encode_base64_lines, encode_text_body, filename_param, fold_header,
    TransferEncoding,
};
use crate::model::attachment::FileAttachment;
use crate::model::policy::Policy;

/// Payload of a single MIME node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Encoded text with `\n` line breaks and its charset.
    Text { bytes: Vec<u8>, charset: String },
    /// Opaque bytes, always sent as base64.
    Binary(Vec<u8>),
    /// Child parts separated by `boundary`.
    Multipart {
        boundary: String,
        parts: Vec<MimePart>,
        preamble: Option<String>,
        epilogue: Option<String>,
    },
}

/// One node of the content tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    maintype: String,
    subtype: String,
    disposition: Option<String>,
    content: Content,
}

impl MimePart {
    /// A `text/<subtype>` leaf. `bytes` must already be in `charset`.
    pub fn text(subtype: &str, bytes: Vec<u8>, charset: impl Into<String>) -> Self {
        Self {
            maintype: "text".into(),
            subtype: subtype.to_lowercase(),
            disposition: None,
            content: Content::Text {
                bytes,
                charset: charset.into(),
            },
        }
    }

    /// A leaf carrying a file, typed from its extension and marked as an attachment.
    pub fn attachment(file: &FileAttachment) -> Self {
        let (maintype, subtype) = file.mime_types();
        Self {
            maintype,
            subtype,
            disposition: Some(format!("attachment; {}", filename_param(&file.file_name))),
            content: Content::Binary(file.data.clone()),
        }
    }

    /// A `multipart/<subtype>` container with a fresh boundary.
    pub fn multipart(subtype: &str, parts: Vec<MimePart>) -> Self {
        Self {
            maintype: "multipart".into(),
            subtype: subtype.to_lowercase(),
            disposition: None,
            content: Content::Multipart {
                boundary: new_boundary(),
                parts,
                preamble: None,
                epilogue: None,
            },
        }
    }

    /// `maintype/subtype`.
    pub fn content_type(&self) -> String {
        format!("{}/{}", self.maintype, self.subtype)
    }

    pub fn maintype(&self) -> &str {
        &self.maintype
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn disposition(&self) -> Option<&str> {
        self.disposition.as_deref()
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.content, Content::Multipart { .. })
    }

    /// `true` when this part is a multipart of the given subtype.
    pub fn is_multipart_of(&self, subtype: &str) -> bool {
        self.is_multipart() && self.subtype.eq_ignore_ascii_case(subtype)
    }

    /// Child parts (empty for leaves).
    pub fn parts(&self) -> &[MimePart] {
        match &self.content {
            Content::Multipart { parts, .. } => parts,
            _ => &[],
        }
    }

    /// Mutable children, `None` for leaves.
    pub fn parts_mut(&mut self) -> Option<&mut Vec<MimePart>> {
        match &mut self.content {
            Content::Multipart { parts, .. } => Some(parts),
            _ => None,
        }
    }

    /// Payload size in bytes before transfer encoding; zero for multiparts.
    pub fn payload_len(&self) -> usize {
        match &self.content {
            Content::Text { bytes, .. } => bytes.len(),
            Content::Binary(data) => data.len(),
            Content::Multipart { .. } => 0,
        }
    }

    /// Set the text written before the first boundary. Ignored on leaves.
    pub fn set_preamble(&mut self, text: Option<String>) {
        if let Content::Multipart { preamble, .. } = &mut self.content {
            *preamble = text;
        }
    }

    /// Set the text written after the closing boundary. Ignored on leaves.
    pub fn set_epilogue(&mut self, text: Option<String>) {
        if let Content::Multipart { epilogue, .. } = &mut self.content {
            *epilogue = text;
        }
    }

    /// Wrap `self` as the first child of a new `multipart/<subtype>`.
    pub fn wrap(self, subtype: &str) -> MimePart {
        MimePart::multipart(subtype, vec![self])
    }

    /// The transfer encoding this part will be written with under `policy`.
    pub fn transfer_encoding(&self, policy: Policy) -> Option<TransferEncoding> {
        match &self.content {
            Content::Text { bytes, .. } => Some(choose_text_encoding(bytes, policy)),
            Content::Binary(_) => Some(TransferEncoding::Base64),
            Content::Multipart { .. } => None,
        }
    }

    /// The `Content-*` headers of this part, in emission order.
    pub fn content_headers(&self, policy: Policy) -> Vec<(&'static str, String)> {
        let content_type = match &self.content {
            Content::Text { charset, .. } => {
                format!("{}; charset=\"{}\"", self.content_type(), charset)
            }
            Content::Binary(_) => self.content_type(),
            Content::Multipart { boundary, .. } => {
                format!("{}; boundary=\"{}\"", self.content_type(), boundary)
            }
        };

        let mut headers = vec![("Content-Type", content_type)];
        if let Some(cte) = self.transfer_encoding(policy) {
            headers.push(("Content-Transfer-Encoding", cte.as_str().to_string()));
        }
        if let Some(disposition) = &self.disposition {
            headers.push(("Content-Disposition", disposition.clone()));
        }
        headers
    }

    /// Write this part's headers, the separating blank line, and its body.
    pub fn write(&self, out: &mut String, policy: Policy) {
        let linesep = policy.linesep();
        for (name, value) in self.content_headers(policy) {
            out.push_str(&fold_header(name, &value, policy));
            out.push_str(linesep);
        }
        out.push_str(linesep);
        self.write_body(out, policy);
    }

    /// Write only the body. Every body ends with the policy line separator.
    pub fn write_body(&self, out: &mut String, policy: Policy) {
        let linesep = policy.linesep();
        match &self.content {
            Content::Text { bytes, .. } => {
                let cte = choose_text_encoding(bytes, policy);
                out.push_str(&encode_text_body(bytes, cte, linesep));
            }
            Content::Binary(data) => {
                out.push_str(&encode_base64_lines(data, linesep));
            }
            Content::Multipart {
                boundary,
                parts,
                preamble,
                epilogue,
            } => {
                if let Some(preamble) = preamble {
                    push_lines(out, preamble, linesep);
                }
                for part in parts {
                    out.push_str("--");
                    out.push_str(boundary);
                    out.push_str(linesep);
                    part.write(out, policy);
                }
                out.push_str("--");
                out.push_str(boundary);
                out.push_str("--");
                out.push_str(linesep);
                if let Some(epilogue) = epilogue {
                    push_lines(out, epilogue, linesep);
                }
            }
        }
    }

    /// One line per part, depth-first, each prefixed by one `-` per nesting level.
    pub fn structure(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.collect_structure(0, &mut lines);
        lines
    }

    fn collect_structure(&self, depth: usize, lines: &mut Vec<String>) {
        lines.push(format!("{}{}", "-".repeat(depth), self.content_type()));
        for part in self.parts() {
            part.collect_structure(depth + 1, lines);
        }
    }

    /// Every leaf part, depth-first.
    pub fn leaves(&self) -> Vec<&MimePart> {
        if self.is_multipart() {
            self.parts().iter().flat_map(|p| p.leaves()).collect()
        } else {
            vec![self]
        }
    }
}

fn new_boundary() -> String {
    format!("==============={}==", uuid::Uuid::new_v4().simple())
}

fn push_lines(out: &mut String, text: &str, linesep: &str) {
    for line in text.lines() {
        out.push_str(line);
        out.push_str(linesep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> MimePart {
        MimePart::text("plain", text.as_bytes().to_vec(), "utf-8")
    }

    #[test]
    fn test_leaf_headers() {
        let part = plain("hello");
        let headers = part.content_headers(Policy::Default);
        assert_eq!(headers[0], ("Content-Type", "text/plain; charset=\"utf-8\"".to_string()));
        assert_eq!(headers[1], ("Content-Transfer-Encoding", "7bit".to_string()));
    }

    #[test]
    fn test_attachment_headers() {
        let file = FileAttachment::from_bytes("image.png", vec![1, 2, 3]);
        let part = MimePart::attachment(&file);
        assert_eq!(part.content_type(), "image/png");
        assert_eq!(part.disposition(), Some("attachment; filename=\"image.png\""));
        assert_eq!(part.transfer_encoding(Policy::Default), Some(TransferEncoding::Base64));
    }

    #[test]
    fn test_structure_depths() {
        let alt = MimePart::multipart(
            "alternative",
            vec![plain("a"), MimePart::text("html", b"<b>a</b>".to_vec(), "utf-8")],
        );
        let mixed = alt.wrap("mixed");
        assert_eq!(
            mixed.structure(),
            vec!["multipart/mixed", "-multipart/alternative", "--text/plain", "--text/html"]
        );
        assert_eq!(mixed.leaves().len(), 2);
    }

    #[test]
    fn test_multipart_body_layout() {
        let mut alt = MimePart::multipart("alternative", vec![plain("one"), plain("two")]);
        alt.set_preamble(Some("This is a multi-part message in MIME format.".into()));
        alt.set_epilogue(Some("bye".into()));
        let Content::Multipart { boundary, .. } = alt.content().clone() else {
            panic!("expected multipart");
        };

        let mut out = String::new();
        alt.write_body(&mut out, Policy::Smtp);
        let expected = format!(
            "This is a multi-part message in MIME format.\r\n\
             --{b}\r\n\
             Content-Type: text/plain; charset=\"utf-8\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             one\r\n\
             --{b}\r\n\
             Content-Type: text/plain; charset=\"utf-8\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             two\r\n\
             --{b}--\r\n\
             bye\r\n",
            b = boundary
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_preamble_ignored_on_leaf() {
        let mut part = plain("x");
        part.set_preamble(Some("ignored".into()));
        let mut out = String::new();
        part.write_body(&mut out, Policy::Default);
        assert_eq!(out, "x\n");
    }

    #[test]
    fn test_boundaries_are_unique() {
        let a = MimePart::multipart("mixed", vec![]);
        let b = MimePart::multipart("mixed", vec![]);
        assert_ne!(a, b);
    }
}
