//! Non-blocking dispatch client on tokio.
//!
//! Mirrors [`SyncClient`](super::SyncClient): same lifecycle, same refusal
//! rules. Only network I/O suspends.

use std::collections::BTreeMap;

use lettre::transport::smtp::authentication::Mechanism;
use lettre::transport::smtp::client::AsyncSmtpConnection;
use lettre::transport::smtp::commands::{Data, Ehlo, Mail, Rcpt, Rset};

use super::{
    parse_ehlo, recipient_result, ClientConfig, ClientState, Envelope, SendOptions, SmtpResponse,
    TlsMode,
};
use crate::error::{MailieError, Result};
use crate::message::Email;

pub struct AsyncClient {
    config: ClientConfig,
    state: ClientState,
    connection: Option<AsyncSmtpConnection>,
}

impl AsyncClient {
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

    pub async fn open(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.connection.is_none() {
            self.connection = Some(connect(&self.config).await?);
        }
        self.state = ClientState::Opened;
        Ok(())
    }

    pub async fn send(&mut self, email: &Email) -> Result<SmtpResponse> {
        self.send_with(email, &SendOptions::default()).await
    }

    pub async fn send_with(&mut self, email: &Email, options: &SendOptions) -> Result<SmtpResponse> {
        self.ensure_open()?;
        let envelope = Envelope::new(email, options)?;
        self.open().await?;

        if let Some(hook) = &self.config.hooks().pre {
            hook(email);
        }

        let connection = self.connection.as_mut().ok_or(MailieError::ClientClosed)?;
        let result = deliver(connection, &envelope).await;
        if result.is_err() {
            if connection.has_broken() {
                self.connection = None;
            } else if let Err(e) = connection.command(Rset).await {
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

    /// Send the same message `count` times, awaiting each before the next.
    pub async fn turret(&mut self, email: &Email, count: usize) -> Result<Vec<SmtpResponse>> {
        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.send(email).await?);
        }
        Ok(responses)
    }

    pub async fn smtp_options(&mut self) -> Result<BTreeMap<String, String>> {
        self.open().await?;
        let hello = self.config.client_id();
        let connection = self.connection.as_mut().ok_or(MailieError::ClientClosed)?;
        let reply = connection.command(Ehlo::new(hello)).await?;
        Ok(parse_ehlo(&reply))
    }

    /// Say QUIT and release the connection.
    ///
    /// A client dropped without `close` simply drops its socket.
    pub async fn close(&mut self) -> Result<()> {
        self.state = ClientState::Closed;
        if let Some(mut connection) = self.connection.take() {
            connection.quit().await?;
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

async fn connect(config: &ClientConfig) -> Result<AsyncSmtpConnection> {
    let hello = config.client_id();
    let wrapper = config.wrapper_tls()?;
    let mut connection = AsyncSmtpConnection::connect_tokio1(
        (config.host(), config.port()),
        Some(config.timeout_duration()),
        &hello,
        wrapper,
        config.source_address,
    )
    .await?;

    if config.tls() == TlsMode::StartTls {
        if !connection.can_starttls() {
            return Err(config.starttls_unsupported());
        }
        connection
            .starttls(config.tls_parameters()?, &hello)
            .await?;
        tracing::debug!(host = config.host(), "Upgraded connection with STARTTLS");
    }

    if let Some(credentials) = config.lettre_credentials() {
        connection
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await?;
    }

    tracing::debug!(host = config.host(), port = config.port(), "Connected");
    Ok(connection)
}

async fn deliver(connection: &mut AsyncSmtpConnection, envelope: &Envelope) -> Result<SmtpResponse> {
    let mut refused = envelope.unparsed().clone();
    if envelope.recipients().is_empty() {
        envelope.check_refusals(&refused)?;
    }
    let params = envelope.mail_parameters(connection.server_info())?;
    connection.command(Mail::new(envelope.from(), params)).await?;

    let mut accepted = Vec::new();
    for (raw, address) in envelope.recipients() {
        let reply = connection
            .command(Rcpt::new(address.clone(), vec![]))
            .await;
        match recipient_result(reply)? {
            Some(err) => {
                tracing::warn!(recipient = %raw, error = %err, "Recipient refused");
                refused.insert(raw.clone(), err);
            }
            None => accepted.push(raw.clone()),
        }
    }
    envelope.check_refusals(&refused)?;

    connection.command(Data).await?;
    let reply = connection.message(envelope.data()).await?;
    Ok(SmtpResponse::new(
        &reply,
        accepted,
        refused,
        envelope.enforce_all(),
    ))
}
