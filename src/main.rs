//! CLI entry point for `mailie`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use mailie::client::{ClientConfig, Provider, SmtpResponse, SyncClient};
use mailie::config::Config;
use mailie::message::Email;
use mailie::model::address::EmailAddress;
use mailie::model::policy::Policy;
use mailie::utility::unpack_recipients_from_csv;

#[derive(Parser)]
#[command(name = "mailie", version, about = "Compose and send email over SMTP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose a message and send it
    Mail(Box<MailArgs>),
    /// Show the ESMTP extensions a server advertises
    Options {
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long)]
        json: bool,
    },
    /// Show where configuration and logs live, and the effective settings
    Config {
        /// Write the effective settings to the configuration file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// `-h` is taken by `--headers`, so help is only available as `--help`.
#[derive(Args)]
#[command(disable_help_flag = true)]
struct MailArgs {
    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Envelope sender and From header
    #[arg(short, long)]
    from: String,

    /// Recipient address, or a CSV file of addresses
    #[arg(short, long, required = true)]
    to: Vec<String>,

    /// Carbon-copy recipient, or a CSV file of addresses
    #[arg(long)]
    cc: Vec<String>,

    /// Blind carbon-copy recipient, or a CSV file of addresses
    #[arg(long)]
    bcc: Vec<String>,

    #[arg(short, long)]
    subject: Option<String>,

    /// Plain-text body
    #[arg(short, long)]
    message: Option<String>,

    /// HTML body, sent as an alternative to the plain text
    #[arg(long)]
    html: Option<String>,

    /// Charset of the text parts
    #[arg(long)]
    charset: Option<String>,

    /// Extra header as NAME:VALUE
    #[arg(short = 'h', long = "headers", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Serialization policy: default, strict, smtp, smtputf8, http
    #[arg(long)]
    policy: Option<Policy>,

    /// File or directory to attach
    #[arg(short, long)]
    attach: Vec<PathBuf>,

    #[command(flatten)]
    server: ServerArgs,

    /// Send the message this many times
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    count: u64,

    /// Print the serialized message instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Print the MIME structure instead of sending
    #[arg(long)]
    structure: bool,

    /// Print the server response as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ServerArgs {
    /// SMTP server host
    #[arg(long, value_name = "HOST")]
    smtp: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Connect with implicit TLS (takes priority over --starttls)
    #[arg(long)]
    tls: bool,

    /// Upgrade the connection with STARTTLS
    #[arg(long)]
    starttls: bool,

    /// Use a well-known server
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,

    /// Login user
    #[arg(long)]
    user: Option<String>,

    /// Login password
    #[arg(long, env = "MAILIE_SMTP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Local,
    Gmail,
}

impl From<ProviderArg> for Provider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Local => Provider::Local,
            ProviderArg::Gmail => Provider::Gmail,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailie::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Mail(args) => cmd_mail(&args, &config),
        Commands::Options { server, json } => cmd_options(&server, json, &config),
        Commands::Config { init } => cmd_config(init, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailie::config::cache_dir(config);
    let log_path = mailie::config::log_file_path(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender =
            tracing_appender::rolling::never(&log_dir, log_path.file_name().unwrap_or_default());
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        tracing::debug!(path = %log_path.display(), "Logging to file");
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Print the config and log locations plus the effective settings as TOML.
fn cmd_config(init: bool, config: &Config) -> anyhow::Result<()> {
    if init {
        mailie::config::save_config(config).context("Failed to write configuration")?;
    }
    match mailie::config::config_file_path() {
        Some(path) => println!("# config: {}", path.display()),
        None => println!("# config: (no config directory)"),
    }
    println!("# log: {}", mailie::config::log_file_path(config).display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Compose a message from the flags, then print or send it.
fn cmd_mail(args: &MailArgs, config: &Config) -> anyhow::Result<()> {
    let email = compose(args, config)?;

    if args.structure {
        print_structure(&email);
        return Ok(());
    }
    if args.dry_run {
        print!("{email}");
        return Ok(());
    }

    let mut client = SyncClient::new(client_config(&args.server, config)?);
    let responses = if args.count > 1 {
        let pb = ProgressBar::new(args.count);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Sending [{bar:40.cyan/blue}] {pos}/{len}")
                .expect("valid template")
                .progress_chars("#>-"),
        );
        let mut responses = Vec::new();
        for _ in 0..args.count {
            responses.push(client.send(&email)?);
            pb.inc(1);
        }
        pb.finish_and_clear();
        responses
    } else {
        vec![client.send(&email)?]
    };
    client.close()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&responses)?);
    } else {
        for response in &responses {
            print_response(response);
        }
    }
    Ok(())
}

/// Print the extensions advertised by the configured server.
fn cmd_options(server: &ServerArgs, json: bool, config: &Config) -> anyhow::Result<()> {
    let mut client = SyncClient::new(client_config(server, config)?);
    let options = client.smtp_options()?;
    client.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&options)?);
    } else {
        for (keyword, params) in &options {
            if params.is_empty() {
                println!("{keyword}");
            } else {
                println!("{keyword} {params}");
            }
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailie", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn compose(args: &MailArgs, config: &Config) -> anyhow::Result<Email> {
    let to = expand_recipients(&args.to)?;
    let cc = expand_recipients(&args.cc)?;
    let bcc = expand_recipients(&args.bcc)?;

    let mut builder = Email::builder(&args.from, to)
        .cc(cc)
        .bcc(bcc)
        .charset(args.charset.as_deref().unwrap_or(&config.message.charset))
        .policy(args.policy.unwrap_or(config.message.policy))
        .headers(args.headers.iter().cloned())
        .attachments(args.attach.iter().cloned())
        .date(chrono::Local::now())
        .message_id(sender_domain(&args.from));
    if let Some(subject) = &args.subject {
        builder = builder.subject(subject);
    }
    if let Some(text) = &args.message {
        builder = builder.text(text);
    }
    if let Some(html) = &args.html {
        builder = builder.html(html);
    }
    Ok(builder.build()?)
}

/// Each value is an address or a CSV file of addresses.
fn expand_recipients(values: &[String]) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    for value in values {
        out.extend(
            unpack_recipients_from_csv(value)
                .with_context(|| format!("Failed to read recipients from {value}"))?,
        );
    }
    Ok(out)
}

fn sender_domain(from: &str) -> String {
    EmailAddress::parse(from)
        .address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_string())
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Flags override the provider, which overrides the config file.
fn client_config(server: &ServerArgs, config: &Config) -> anyhow::Result<ClientConfig> {
    let base = match server.provider {
        Some(provider) => ClientConfig::from(Provider::from(provider))
            .timeout(config.smtp.client_config().timeout_duration()),
        None => config.smtp.client_config(),
    };

    let host = server.smtp.clone().unwrap_or_else(|| base.host().to_string());
    let port = server.port.unwrap_or(base.port());
    let mut client = ClientConfig::new(host, port)
        .tls_mode(base.tls())
        .timeout(base.timeout_duration());
    if let Some(name) = &config.smtp.local_hostname {
        client = client.local_hostname(name);
    }
    if server.starttls {
        client = client.use_starttls(true);
    }
    if server.tls {
        client = client.use_tls(true);
    }

    let user = server.user.as_ref().or(config.smtp.username.as_ref());
    match (user, &server.password) {
        (Some(user), Some(password)) => client = client.credentials(user, password),
        (Some(_), None) => {
            anyhow::bail!("A password is required to log in (--password or MAILIE_SMTP_PASSWORD)")
        }
        (None, _) => {}
    }
    Ok(client)
}

fn print_structure(email: &Email) {
    println!("{}", email.tree_view());
    let attachments = email.attachments();
    if attachments.is_empty() {
        return;
    }
    println!();
    for part in attachments {
        println!(
            "  {:<30} {:>10}  {}",
            part.content_type(),
            humansize::format_size(part.payload_len(), humansize::DECIMAL),
            part.disposition().unwrap_or_default()
        );
    }
}

fn print_response(response: &SmtpResponse) {
    println!(
        "  {} {} ({} accepted, {} refused)",
        response.code,
        response.message,
        response.accepted.len(),
        response.refused.len()
    );
    for (address, error) in &response.refused {
        println!("    refused {address}: {error}");
    }
}
