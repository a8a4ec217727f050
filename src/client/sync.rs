//! Blocking dispatch client.

use std::collections::BTreeMap;

use lettre::transport::smtp::authentication::Mechanism;
use lettre::transport::smtp::client::SmtpConnection;
use lettre::transport::smtp::commands::{Data, Ehlo, Mail, Rcpt, Rset};

use super::{
    parse_ehlo, recipient_result, ClientConfig, ClientState, Envelope, SendOptions, SmtpResponse,
    TlsMode,
};
use crate::error::{MailieError, Result};
use crate::message::Email;

/// Sends messages one at a time over a single blocking connection.
///
/// The connection is opened by [`SyncClient::open`] or lazily by the first
/// send, reused for every later send, and shut down by [`SyncClient::close`]
/// (or when the client is dropped).
pub struct SyncClient {
    config: ClientConfig,
    state: ClientState,
    connection: Option<SmtpConnection>,
}

impl SyncClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ClientState::NotOpened,
            connection: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect, negotiate TLS and authenticate.
    pub fn open(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.connection.is_none() {
            self.connection = Some(connect(&self.config)?);
        }
        self.state = ClientState::Opened;
        Ok(())
    }

    /// Send using the message's own envelope.
    pub fn send(&mut self, email: &Email) -> Result<SmtpResponse> {
        self.send_with(email, &SendOptions::default())
    }

    /// Send with envelope overrides or `enforce_all`.
    ///
    /// Refused recipients are reported in the response; the send fails only
    /// when every recipient is refused (or any, with `enforce_all`).
    pub fn send_with(&mut self, email: &Email, options: &SendOptions) -> Result<SmtpResponse> {
        self.ensure_open()?;
        let envelope = Envelope::new(email, options)?;
        self.open()?;

        if let Some(hook) = &self.config.hooks().pre {
            hook(email);
        }

        let connection = self.connection.as_mut().ok_or(MailieError::ClientClosed)?;
        let result = deliver(connection, &envelope);
        if result.is_err() {
            if connection.has_broken() {
                self.connection = None;
            } else if let Err(e) = connection.command(Rset) {
                tracing::debug!(error = %e, "RSET after failed send");
            }
        }
        let response = result?;

        tracing::info!(
            host = self.config.host(),
            recipients = response.accepted.len(),
            refused = response.refused.len(),
            code = response.code,
            "Message dispatched"
        );
        if let Some(hook) = &self.config.hooks().post {
            hook(email, &response);
        }
        Ok(response)
    }

    /// Send the same message `count` times, one after another.
    pub fn turret(&mut self, email: &Email, count: usize) -> Result<Vec<SmtpResponse>> {
        (0..count).map(|_| self.send(email)).collect()
    }

    /// Issue EHLO and return the advertised extensions, keyword lowercased.
    pub fn smtp_options(&mut self) -> Result<BTreeMap<String, String>> {
        self.open()?;
        let hello = self.config.client_id();
        let connection = self.connection.as_mut().ok_or(MailieError::ClientClosed)?;
        let reply = connection.command(Ehlo::new(hello))?;
        Ok(parse_ehlo(&reply))
    }

    /// Say QUIT and release the connection. Closing twice is harmless.
    pub fn close(&mut self) -> Result<()> {
        self.state = ClientState::Closed;
        if let Some(mut connection) = self.connection.take() {
            connection.quit()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ClientState::Closed => Err(MailieError::ClientClosed),
            ClientState::NotOpened | ClientState::Opened => Ok(()),
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.quit() {
                tracing::debug!(error = %e, "QUIT on drop failed");
            }
        }
    }
}

fn connect(config: &ClientConfig) -> Result<SmtpConnection> {
    let hello = config.client_id();
    let wrapper = config.wrapper_tls()?;
    let mut connection = SmtpConnection::connect(
        (config.host(), config.port()),
        Some(config.timeout_duration()),
        &hello,
        wrapper.as_ref(),
        config.source_address,
    )?;

    if config.tls() == TlsMode::StartTls {
        if !connection.can_starttls() {
            return Err(config.starttls_unsupported());
        }
        connection.starttls(&config.tls_parameters()?, &hello)?;
        tracing::debug!(host = config.host(), "Upgraded connection with STARTTLS");
    }

    if let Some(credentials) = config.lettre_credentials() {
        connection.auth(&[Mechanism::Plain, Mechanism::Login], &credentials)?;
    }

    tracing::debug!(host = config.host(), port = config.port(), "Connected");
    Ok(connection)
}

fn deliver(connection: &mut SmtpConnection, envelope: &Envelope) -> Result<SmtpResponse> {
    let mut refused = envelope.unparsed().clone();
    if envelope.recipients().is_empty() {
        envelope.check_refusals(&refused)?;
    }
    let params = envelope.mail_parameters(connection.server_info())?;
    connection.command(Mail::new(envelope.from(), params))?;

    let mut accepted = Vec::new();
    for (raw, address) in envelope.recipients() {
        match recipient_result(connection.command(Rcpt::new(address.clone(), vec![])))? {
            Some(err) => {
                tracing::warn!(recipient = %raw, error = %err, "Recipient refused");
                refused.insert(raw.clone(), err);
            }
            None => accepted.push(raw.clone()),
        }
    }
    envelope.check_refusals(&refused)?;

    connection.command(Data)?;
    let reply = connection.message(envelope.data())?;
    Ok(SmtpResponse::new(
        &reply,
        accepted,
        refused,
        envelope.enforce_all(),
    ))
}
