//! SMTP dispatch clients.
//!
//! [`SyncClient`] and [`AsyncClient`] share one lifecycle: a client starts
//! [`ClientState::NotOpened`], connects on [`open`](SyncClient::open) or on
//! the first send, and once closed it stays closed. The SMTP conversation
//! itself is carried out by `lettre`'s connection types; this module only
//! drives MAIL/RCPT/DATA so that refused recipients can be reported one by
//! one.

pub mod asynchronous;
pub mod response;
pub mod sync;

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::TlsParameters;
use lettre::transport::smtp::extension::{
    ClientId, Extension, MailBodyParameter, MailParameter, ServerInfo,
};
use lettre::transport::smtp::response::Response;
use lettre::Address;
use serde::{Deserialize, Serialize};

use crate::error::{MailieError, Result};
use crate::message::Email;
use crate::model::address::EmailAddress;

pub use asynchronous::AsyncClient;
pub use response::{SendOptions, SmtpError, SmtpResponse};
pub use sync::SyncClient;

/// Lifecycle of a dispatch client. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, nothing sent yet.
    NotOpened,
    /// Connected, or has dispatched at least one message.
    Opened,
    /// Closed explicitly; every further operation fails.
    Closed,
}

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plaintext.
    #[default]
    None,
    /// Plaintext, upgraded in-band with STARTTLS.
    #[serde(rename = "starttls")]
    StartTls,
    /// TLS from the first byte (SMTPS).
    Tls,
}

/// Well-known submission endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Local,
    Gmail,
}

impl Provider {
    pub fn host(&self) -> &'static str {
        match self {
            Self::Local => "localhost",
            Self::Gmail => "smtp.gmail.com",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Local => 25,
            Self::Gmail => 465,
        }
    }

    pub fn tls(&self) -> TlsMode {
        match self {
            Self::Local => TlsMode::None,
            Self::Gmail => TlsMode::Tls,
        }
    }
}

/// Called with the message just before it is transmitted.
pub type PreSendHook = Arc<dyn Fn(&Email) + Send + Sync>;
/// Called with the message and the server's answer after a successful send.
pub type PostSendHook = Arc<dyn Fn(&Email, &SmtpResponse) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    pub pre: Option<PreSendHook>,
    pub post: Option<PostSendHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

/// Connection settings shared by both clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    host: String,
    port: u16,
    local_hostname: Option<String>,
    source_address: Option<IpAddr>,
    timeout: Duration,
    tls: TlsMode,
    credentials: Option<(String, String)>,
    hooks: Hooks,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("localhost", 25)
    }
}

impl From<Provider> for ClientConfig {
    fn from(provider: Provider) -> Self {
        Self::new(provider.host(), provider.port()).tls_mode(provider.tls())
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            local_hostname: None,
            source_address: None,
            timeout: Duration::from_secs(30),
            tls: TlsMode::None,
            credentials: None,
            hooks: Hooks::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tls(&self) -> TlsMode {
        self.tls
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    /// Request implicit TLS. Takes priority over STARTTLS.
    pub fn use_tls(mut self, enabled: bool) -> Self {
        if enabled {
            self.tls = TlsMode::Tls;
        } else if self.tls == TlsMode::Tls {
            self.tls = TlsMode::None;
        }
        self
    }

    /// Request a STARTTLS upgrade. Ignored when implicit TLS is already requested.
    pub fn use_starttls(mut self, enabled: bool) -> Self {
        match (enabled, self.tls) {
            (true, TlsMode::None) => self.tls = TlsMode::StartTls,
            (false, TlsMode::StartTls) => self.tls = TlsMode::None,
            _ => {}
        }
        self
    }

    /// Name sent with EHLO.
    pub fn local_hostname(mut self, name: impl Into<String>) -> Self {
        self.local_hostname = Some(name.into());
        self
    }

    /// Local address to bind before connecting.
    pub fn source_address(mut self, addr: IpAddr) -> Self {
        self.source_address = Some(addr);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Authenticate with PLAIN or LOGIN after connecting.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    pub fn pre_send(mut self, hook: impl Fn(&Email) + Send + Sync + 'static) -> Self {
        self.hooks.pre = Some(Arc::new(hook));
        self
    }

    pub fn post_send(mut self, hook: impl Fn(&Email, &SmtpResponse) + Send + Sync + 'static) -> Self {
        self.hooks.post = Some(Arc::new(hook));
        self
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn client_id(&self) -> ClientId {
        match &self.local_hostname {
            Some(name) => ClientId::Domain(name.clone()),
            None => ClientId::default(),
        }
    }

    pub(crate) fn lettre_credentials(&self) -> Option<Credentials> {
        self.credentials
            .as_ref()
            .map(|(user, password)| Credentials::new(user.clone(), password.clone()))
    }

    pub(crate) fn tls_parameters(&self) -> Result<TlsParameters> {
        Ok(TlsParameters::new(self.host.clone())?)
    }

    /// Parameters for a connection that is encrypted from the start.
    pub(crate) fn wrapper_tls(&self) -> Result<Option<TlsParameters>> {
        match self.tls {
            TlsMode::Tls => self.tls_parameters().map(Some),
            TlsMode::None | TlsMode::StartTls => Ok(None),
        }
    }

    pub(crate) fn starttls_unsupported(&self) -> MailieError {
        MailieError::StartTlsNotSupported {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Sender, recipients and payload of one send, validated before any I/O.
///
/// Recipients that do not parse as addresses are kept aside as refusals
/// without a reply code; they never reach `RCPT TO`.
#[derive(Debug)]
pub(crate) struct Envelope {
    from: Option<Address>,
    to: Vec<(String, Address)>,
    unparsed: BTreeMap<String, SmtpError>,
    data: Vec<u8>,
    smtputf8: bool,
    enforce_all: bool,
}

impl Envelope {
    pub(crate) fn new(email: &Email, options: &SendOptions) -> Result<Self> {
        let args = email.smtp_arguments();
        let from_raw = options.from_addr.as_deref().unwrap_or(args.from_addr);
        let to_raw: &[String] = options.to_addrs.as_deref().unwrap_or(args.to_addrs);

        let from = match addr_spec(from_raw) {
            addr if addr.is_empty() => None,
            addr => Some(parse_address(&addr)?),
        };
        let mut to = Vec::with_capacity(to_raw.len());
        let mut unparsed = BTreeMap::new();
        for raw in to_raw {
            match addr_spec(raw).parse::<Address>() {
                Ok(address) => to.push((raw.clone(), address)),
                Err(e) => {
                    tracing::warn!(recipient = %raw, error = %e, "Recipient is not a valid address");
                    unparsed.insert(
                        raw.clone(),
                        SmtpError {
                            code: None,
                            message: format!("invalid address: {e}"),
                        },
                    );
                }
            }
        }

        let data = email.to_wire_bytes();
        // Display names are encoded in the headers; only the addr-spec matters here.
        let non_ascii_addresses = !addr_spec(from_raw).is_ascii()
            || to_raw.iter().any(|raw| !addr_spec(raw).is_ascii());
        let smtputf8 = non_ascii_addresses || (email.policy().utf8() && !data.is_ascii());

        Ok(Self {
            from,
            to,
            unparsed,
            data,
            smtputf8,
            enforce_all: options.enforce_all,
        })
    }

    pub(crate) fn from(&self) -> Option<Address> {
        self.from.clone()
    }

    pub(crate) fn recipients(&self) -> &[(String, Address)] {
        &self.to
    }

    /// Refusals known before connecting; delivery starts its refusal map from these.
    pub(crate) fn unparsed(&self) -> &BTreeMap<String, SmtpError> {
        &self.unparsed
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    /// `MAIL FROM` parameters for what the message needs and the server offers.
    pub(crate) fn mail_parameters(&self, server: &ServerInfo) -> Result<Vec<MailParameter>> {
        let mut params = Vec::new();
        if self.smtputf8 {
            if !server.supports_feature(Extension::SmtpUtfEight) {
                return Err(MailieError::NotSupported(
                    "One or more source or delivery addresses require internationalized \
                     email support, but the server does not advertise the required \
                     SMTPUTF8 capability"
                        .into(),
                ));
            }
            params.push(MailParameter::SmtpUtfEight);
        }
        if !self.data.is_ascii() && server.supports_feature(Extension::EightBitMime) {
            params.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }
        Ok(params)
    }

    /// Decide whether the refusals collected during RCPT end the send.
    pub(crate) fn check_refusals(&self, refused: &BTreeMap<String, SmtpError>) -> Result<()> {
        let recipients = self.to.len() + self.unparsed.len();
        let all_refused = refused.len() >= recipients;
        if refused.is_empty() || !(all_refused || self.enforce_all) {
            return Ok(());
        }
        tracing::warn!(
            refused = refused.len(),
            recipients,
            enforce_all = self.enforce_all,
            "Recipients refused"
        );
        Err(MailieError::RecipientsRefused {
            refused: refused.clone(),
        })
    }

    pub(crate) fn enforce_all(&self) -> bool {
        self.enforce_all
    }
}

/// Outcome of one `RCPT TO`: accepted, refused with a reply, or a transport failure.
pub(crate) fn recipient_result(
    result: std::result::Result<Response, lettre::transport::smtp::Error>,
) -> Result<Option<SmtpError>> {
    match result {
        Ok(_) => Ok(None),
        Err(e) if e.status().is_some() => Ok(Some(SmtpError::from_delegate(&e))),
        Err(e) => Err(e.into()),
    }
}

/// Parse an EHLO reply into lowercase keyword → parameter string.
pub(crate) fn parse_ehlo(response: &Response) -> BTreeMap<String, String> {
    response
        .message()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            let (keyword, params) = match line.find([' ', '=']) {
                Some(idx) => (&line[..idx], line[idx + 1..].trim()),
                None => (line, ""),
            };
            (!keyword.is_empty()).then(|| (keyword.to_ascii_lowercase(), params.to_string()))
        })
        .collect()
}

/// The bare `local@domain` part of an address that may carry a display name.
fn addr_spec(raw: &str) -> String {
    EmailAddress::parse(raw).address
}

fn parse_address(addr: &str) -> Result<Address> {
    addr.parse::<Address>()
        .map_err(|source| MailieError::InvalidAddress {
            address: addr.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email::builder("Sender <sender@example.com>", ["one@example.com", "two@example.com"])
            .text("hi")
            .build()
            .unwrap()
    }

    #[test]
    fn test_tls_beats_starttls() {
        let cfg = ClientConfig::new("h", 25).use_tls(true).use_starttls(true);
        assert_eq!(cfg.tls(), TlsMode::Tls);
        let cfg = ClientConfig::new("h", 25).use_starttls(true).use_tls(true);
        assert_eq!(cfg.tls(), TlsMode::Tls);
        let cfg = ClientConfig::new("h", 25).use_starttls(true);
        assert_eq!(cfg.tls(), TlsMode::StartTls);
    }

    #[test]
    fn test_provider_settings() {
        let gmail = ClientConfig::from(Provider::Gmail);
        assert_eq!(gmail.host(), "smtp.gmail.com");
        assert_eq!(gmail.port(), 465);
        assert_eq!(gmail.tls(), TlsMode::Tls);
        let local = ClientConfig::from(Provider::Local);
        assert_eq!((local.host(), local.port()), ("localhost", 25));
    }

    #[test]
    fn test_envelope_uses_addr_spec() {
        let envelope = Envelope::new(&email(), &SendOptions::default()).unwrap();
        assert_eq!(envelope.from().unwrap().to_string(), "sender@example.com");
        let to: Vec<&str> = envelope.recipients().iter().map(|(raw, _)| raw.as_str()).collect();
        assert_eq!(to, vec!["one@example.com", "two@example.com"]);
        assert!(envelope.data().starts_with(b"From: Sender <sender@example.com>\r\n"));
    }

    #[test]
    fn test_envelope_overrides() {
        let opts = SendOptions::default()
            .from_addr("other@example.com")
            .to_addrs("three@example.com");
        let envelope = Envelope::new(&email(), &opts).unwrap();
        assert_eq!(envelope.from().unwrap().to_string(), "other@example.com");
        assert_eq!(envelope.recipients().len(), 1);
    }

    #[test]
    fn test_invalid_sender_address() {
        let opts = SendOptions::default().from_addr("not an address");
        let err = Envelope::new(&email(), &opts).unwrap_err();
        assert!(matches!(err, MailieError::InvalidAddress { .. }));
        assert!(err.is_smtp());
    }

    #[test]
    fn test_unparsable_recipient_is_refused() {
        let opts = SendOptions::default().to_addrs(["good@example.com", "postmaster"]);
        let envelope = Envelope::new(&email(), &opts).unwrap();
        assert_eq!(envelope.recipients().len(), 1);
        let refusal = &envelope.unparsed()["postmaster"];
        assert_eq!(refusal.code, None);
        assert!(refusal.message.starts_with("invalid address"));

        // One refusal out of two recipients does not fail the send.
        assert!(envelope.check_refusals(envelope.unparsed()).is_ok());

        let opts = SendOptions::default().to_addrs("not an address");
        let envelope = Envelope::new(&email(), &opts).unwrap();
        assert!(envelope.recipients().is_empty());
        assert!(matches!(
            envelope.check_refusals(envelope.unparsed()),
            Err(MailieError::RecipientsRefused { .. })
        ));
    }

    #[test]
    fn test_refusal_rules() {
        let refused_one: BTreeMap<String, SmtpError> = [(
            "one@example.com".to_string(),
            SmtpError {
                code: Some(550),
                message: "no".into(),
            },
        )]
        .into_iter()
        .collect();

        let lenient = Envelope::new(&email(), &SendOptions::default()).unwrap();
        assert!(lenient.check_refusals(&BTreeMap::new()).is_ok());
        assert!(lenient.check_refusals(&refused_one).is_ok());

        let strict = Envelope::new(&email(), &SendOptions::default().enforce_all(true)).unwrap();
        assert!(matches!(
            strict.check_refusals(&refused_one),
            Err(MailieError::RecipientsRefused { .. })
        ));

        let mut refused_all = refused_one.clone();
        refused_all.insert(
            "two@example.com".into(),
            SmtpError {
                code: Some(550),
                message: "no".into(),
            },
        );
        assert!(lenient.check_refusals(&refused_all).is_err());
    }
}
