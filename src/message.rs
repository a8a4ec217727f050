//! Email messages and their builder.
//!
//! An [`Email`] owns two independent things: the SMTP *envelope* (sender and
//! merged recipient list used for delivery) and the *content* (headers plus
//! the MIME tree). Header values are display-only and are never read back to
//! address the message.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};

use crate::attach::{Attachable, AttachmentStrategy};
use crate::error::Result;
use crate::mime::encoding::{encode_header, fold_header, normalize_newlines, transcode};
use crate::mime::part::MimePart;
use crate::model::attachment::FileAttachment;
use crate::model::header::{EmailHeader, HeaderMap};
use crate::model::policy::Policy;
use crate::utility::{dedup, emails_to_list, IntoAddressList};

/// Charset used for text parts unless another is requested.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// What the dispatch client needs to deliver one message.
#[derive(Debug, Clone, Copy)]
pub struct SmtpArguments<'a> {
    /// The message whose content is transmitted.
    pub message: &'a Email,
    /// Envelope sender (`MAIL FROM`).
    pub from_addr: &'a str,
    /// Envelope recipients (`RCPT TO`), to + cc + bcc without duplicates.
    pub to_addrs: &'a [String],
}

/// A composed message ready to be serialized or dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    mail_from: String,
    rcpt_to: Vec<String>,
    policy: Policy,
    charset: String,
    headers: HeaderMap,
    body: MimePart,
}

impl Email {
    /// Start building a message from an envelope sender and recipient(s).
    pub fn builder(mail_from: impl Into<String>, rcpt_to: impl IntoAddressList) -> EmailBuilder {
        EmailBuilder::new(mail_from, rcpt_to)
    }

    /// Envelope sender.
    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    /// Envelope recipients (to, cc and bcc merged).
    pub fn rcpt_to(&self) -> &[String] {
        &self.rcpt_to
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Message-level headers (the root's `Content-*` headers are derived from the body).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Values of all headers named `name`.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
    }

    /// Append a header; existing headers with the same name are kept.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let header = EmailHeader::new(name, value)?;
        header.check(self.policy)?;
        self.headers.push(header);
        Ok(self)
    }

    /// Replace the first header named `name` (appending when absent).
    pub fn replace_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let header = EmailHeader::new(name, value)?;
        header.check(self.policy)?;
        self.headers.replace(header);
        Ok(self)
    }

    /// Delete every header named `name`; returns how many were removed.
    pub fn remove_header(&mut self, name: &str) -> usize {
        self.headers.remove_all(name)
    }

    /// The root content type, e.g. `multipart/mixed`.
    pub fn content_type(&self) -> String {
        self.body.content_type()
    }

    /// The MIME tree.
    pub fn body(&self) -> &MimePart {
        &self.body
    }

    /// Replace the plain-text representation.
    ///
    /// A single-part body is replaced outright; inside an alternative the
    /// existing `text/plain` child is swapped in place.
    pub fn set_text(&mut self, text: &str) -> Result<&mut Self> {
        let part = self.text_part("plain", text)?;
        self.with_primary(|primary| {
            if primary.is_multipart_of("alternative") {
                if let Some(parts) = primary.parts_mut() {
                    match parts.iter_mut().find(|p| p.content_type() == "text/plain") {
                        Some(existing) => *existing = part,
                        None => parts.insert(0, part),
                    }
                    return;
                }
            }
            *primary = part;
        });
        Ok(self)
    }

    /// Add an HTML representation after the plain text.
    ///
    /// The primary body becomes `multipart/alternative` if it is not one already.
    pub fn add_alternative_html(&mut self, html: &str) -> Result<&mut Self> {
        let part = self.text_part("html", html)?;
        self.with_primary(|primary| {
            if !primary.is_multipart_of("alternative") {
                wrap_in_place(primary, "alternative");
            }
            if let Some(parts) = primary.parts_mut() {
                parts.push(part);
            }
        });
        Ok(self)
    }

    /// Append an attachment, turning the root into `multipart/mixed` when needed.
    pub fn add_attachment(&mut self, file: &FileAttachment) -> &mut Self {
        if !self.body.is_multipart_of("mixed") {
            wrap_in_place(&mut self.body, "mixed");
        }
        if let Some(parts) = self.body.parts_mut() {
            parts.push(MimePart::attachment(file));
        }
        tracing::debug!(
            file = %file.file_name,
            content_type = %file.content_type(),
            "Attached file"
        );
        self
    }

    /// Text written before the first boundary of a multipart root.
    pub fn set_preamble(&mut self, preamble: Option<String>) -> &mut Self {
        self.body.set_preamble(preamble);
        self
    }

    /// Text written after the final boundary of a multipart root.
    pub fn set_epilogue(&mut self, epilogue: Option<String>) -> &mut Self {
        self.body.set_epilogue(epilogue);
        self
    }

    /// Leaf parts that carry a `Content-Disposition` (the attachments).
    pub fn attachments(&self) -> Vec<&MimePart> {
        self.body
            .leaves()
            .into_iter()
            .filter(|p| p.disposition().is_some())
            .collect()
    }

    /// The delivery triple consumed by the dispatch clients.
    pub fn smtp_arguments(&self) -> SmtpArguments<'_> {
        SmtpArguments {
            message: self,
            from_addr: &self.mail_from,
            to_addrs: &self.rcpt_to,
        }
    }

    /// Serialize under the message's own policy.
    pub fn to_text(&self) -> String {
        self.render(self.policy)
    }

    /// Serialize under the message's own policy, as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_text().into_bytes()
    }

    /// Serialize for transmission: same rules as the message policy, CRLF line endings.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        self.render(self.policy.for_wire()).into_bytes()
    }

    /// Content types of every part, one per line, nested parts prefixed by `-`.
    pub fn structure(&self) -> Vec<String> {
        self.body.structure()
    }

    /// [`Email::structure`] joined with newlines.
    pub fn tree_view(&self) -> String {
        self.structure().join("\n")
    }

    fn render(&self, policy: Policy) -> String {
        let linesep = policy.linesep();
        let mut out = String::new();
        for header in &self.headers {
            let value = encode_header(header.name(), header.value(), policy);
            out.push_str(&fold_header(header.name(), &value, policy));
            out.push_str(linesep);
        }
        if !self.headers.contains("MIME-Version") {
            out.push_str("MIME-Version: 1.0");
            out.push_str(linesep);
        }
        self.body.write(&mut out, policy);
        out
    }

    fn text_part(&self, subtype: &str, text: &str) -> Result<MimePart> {
        let encoded = transcode(&normalize_newlines(text), &self.charset)?;
        Ok(MimePart::text(subtype, encoded.bytes, encoded.charset))
    }

    /// Run `f` on the part holding the readable body: the first child of a
    /// mixed root, otherwise the root itself.
    fn with_primary<R>(&mut self, f: impl FnOnce(&mut MimePart) -> R) -> R {
        if self.body.is_multipart_of("mixed") {
            if let Some(first) = self.body.parts_mut().and_then(|p| p.first_mut()) {
                return f(first);
            }
        }
        f(&mut self.body)
    }
}

fn wrap_in_place(part: &mut MimePart, subtype: &str) {
    let inner = std::mem::replace(part, MimePart::text("plain", Vec::new(), DEFAULT_CHARSET));
    *part = inner.wrap(subtype);
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// A header supplied to the builder, validated at build time.
#[derive(Debug, Clone)]
enum PendingHeader {
    Line(String),
    Built(EmailHeader),
}

/// Keyword-style construction of an [`Email`].
///
/// ```no_run
/// # fn main() -> mailie::error::Result<()> {
/// let email = mailie::message::Email::builder("sender@example.com", ["a@example.com"])
///     .subject("Report")
///     .text("See attached.")
///     .attachment("report.pdf")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct EmailBuilder {
    mail_from: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: Option<String>,
    text: Option<String>,
    html: Option<String>,
    charset: String,
    policy: Policy,
    headers: Vec<PendingHeader>,
    attachment_paths: Vec<PathBuf>,
    resolved: Vec<FileAttachment>,
    strategy: Box<dyn Attachable>,
    preamble: Option<String>,
    epilogue: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    message_id_domain: Option<String>,
}

impl EmailBuilder {
    pub fn new(mail_from: impl Into<String>, rcpt_to: impl IntoAddressList) -> Self {
        Self {
            mail_from: mail_from.into(),
            to: rcpt_to.into_address_list(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            text: None,
            html: None,
            charset: DEFAULT_CHARSET.to_string(),
            policy: Policy::default(),
            headers: Vec::new(),
            attachment_paths: Vec::new(),
            resolved: Vec::new(),
            strategy: Box::new(AttachmentStrategy),
            preamble: None,
            epilogue: None,
            date: None,
            message_id_domain: None,
        }
    }

    /// Carbon-copy recipients: delivered to, never rendered as a header.
    pub fn cc(mut self, addresses: impl IntoAddressList) -> Self {
        self.cc.extend(addresses.into_address_list());
        self
    }

    /// Blind carbon-copy recipients: delivered to, never rendered as a header.
    pub fn bcc(mut self, addresses: impl IntoAddressList) -> Self {
        self.bcc.extend(addresses.into_address_list());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Plain-text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// HTML body, sent as an alternative after the plain text.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Charset for text parts (default `utf-8`).
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Policy by name; unknown names fall back to the default policy.
    pub fn policy_name(mut self, name: &str) -> Self {
        self.policy = Policy::from_name(name);
        self
    }

    /// Additional header as a `name:value` string.
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(PendingHeader::Line(line.into()));
        self
    }

    /// Several `name:value` strings.
    pub fn headers<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers
            .extend(lines.into_iter().map(|l| PendingHeader::Line(l.into())));
        self
    }

    /// Additional pre-built header.
    pub fn email_header(mut self, header: EmailHeader) -> Self {
        self.headers.push(PendingHeader::Built(header));
        self
    }

    /// A file or directory to attach, resolved at build time.
    pub fn attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment_paths.push(path.into());
        self
    }

    /// Several files or directories to attach.
    pub fn attachments<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.attachment_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Attachments that were already read into memory.
    pub fn resolved_attachments(mut self, files: impl IntoIterator<Item = FileAttachment>) -> Self {
        self.resolved.extend(files);
        self
    }

    /// Replace the strategy used to resolve attachment paths.
    pub fn attachment_strategy(mut self, strategy: impl Attachable + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Text shown by MIME-unaware clients before the first part.
    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Text after the last part.
    pub fn epilogue(mut self, epilogue: impl Into<String>) -> Self {
        self.epilogue = Some(epilogue.into());
        self
    }

    /// Emit a `Date` header.
    pub fn date(mut self, date: impl Into<DateTime<FixedOffset>>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Emit a `Message-ID` header of the form `<uuid@domain>`.
    pub fn message_id(mut self, domain: impl Into<String>) -> Self {
        self.message_id_domain = Some(domain.into());
        self
    }

    /// Assemble the message.
    ///
    /// Header and attachment problems surface here, unchanged.
    pub fn build(self) -> Result<Email> {
        let policy = self.policy;
        let to = emails_to_list(self.to);
        let cc = emails_to_list(self.cc);
        let bcc = emails_to_list(self.bcc);
        let rcpt_to = dedup(to.iter().chain(&cc).chain(&bcc).cloned());

        let extra: Vec<EmailHeader> = self
            .headers
            .into_iter()
            .map(|pending| match pending {
                PendingHeader::Line(line) => EmailHeader::from_string(&line),
                PendingHeader::Built(header) => Ok(header),
            })
            .collect::<Result<_>>()?;

        let mut headers = HeaderMap::new();
        headers.push(EmailHeader::new("From", &self.mail_from)?);
        headers.push(EmailHeader::new("To", to.join(", "))?);
        match self.subject {
            Some(subject) => headers.push(EmailHeader::new("Subject", subject)?),
            None if !extra.iter().any(|h| h.is_named("Subject")) => {
                headers.push(EmailHeader::new("Subject", "")?)
            }
            None => {}
        }
        if let Some(date) = self.date {
            headers.push(EmailHeader::new("Date", date.to_rfc2822())?);
        }
        if let Some(domain) = self.message_id_domain {
            let id = format!("<{}@{}>", uuid::Uuid::new_v4().simple(), domain);
            headers.push(EmailHeader::new("Message-ID", id)?);
        }
        for header in extra {
            if header.name().to_ascii_lowercase().starts_with("content-") {
                tracing::warn!(
                    header = header.name(),
                    "Ignoring content header, it is derived from the body"
                );
                continue;
            }
            headers.push(header);
        }
        for header in &headers {
            header.check(policy)?;
        }

        let mut email = Email {
            mail_from: self.mail_from,
            rcpt_to,
            policy,
            charset: self.charset,
            headers,
            body: MimePart::text("plain", Vec::new(), DEFAULT_CHARSET),
        };

        email.set_text(self.text.as_deref().unwrap_or_default())?;
        if let Some(html) = &self.html {
            email.add_alternative_html(html)?;
        }

        let mut files = self.strategy.resolve(&self.attachment_paths)?;
        files.extend(self.resolved);
        for file in &files {
            email.add_attachment(file);
        }

        email.set_preamble(self.preamble);
        email.set_epilogue(self.epilogue);

        tracing::debug!(
            from = %email.mail_from,
            recipients = email.rcpt_to.len(),
            content_type = %email.content_type(),
            attachments = files.len(),
            "Assembled message"
        );
        Ok(email)
    }
}

impl fmt::Debug for EmailBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailBuilder")
            .field("mail_from", &self.mail_from)
            .field("to", &self.to)
            .field("cc", &self.cc)
            .field("bcc", &self.bcc)
            .field("subject", &self.subject)
            .field("policy", &self.policy)
            .field("attachment_paths", &self.attachment_paths)
            .finish_non_exhaustive()
    }
}
