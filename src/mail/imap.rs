//! IMAP mail source: raw IMAP over TLS, run on the blocking pool.
//!
//! Speaks just enough IMAP4rev1 to pull unread messages: `LOGIN`,
//! `SELECT`, `UID SEARCH UNSEEN`, `UID FETCH` and `LOGOUT`. Literal
//! payloads (`{n}`) are read byte-exact so message bodies come through
//! unchanged.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::parse_env;
use crate::error::{ConfigError, MailError};
use crate::mail::message::parse_raw_message;
use crate::pipeline::types::{InboundMessage, MailSource};

/// Socket read timeout for IMAP connections.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest literal accepted from the server.
const MAX_LITERAL_BYTES: usize = 64 * 1024 * 1024;

// ── Configuration ───────────────────────────────────────────────────

/// IMAP account configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// Fetch with `RFC822` (marks messages seen) instead of `BODY.PEEK[]`.
    pub mark_seen: bool,
}

impl EmailConfig {
    /// Build config from environment variables.
    ///
    /// `EMAIL_IMAP_HOST`, `EMAIL_USERNAME` and `EMAIL_PASSWORD` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("EMAIL_IMAP_HOST".into()))?;

        let username = std::env::var("EMAIL_USERNAME")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_USERNAME".into()))?;
        let password = std::env::var("EMAIL_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("EMAIL_PASSWORD".into()))?;

        Ok(Self {
            imap_host: imap_host.trim().to_string(),
            imap_port: parse_env::<u16>("EMAIL_IMAP_PORT")?.unwrap_or(993),
            username,
            password: SecretString::from(password),
            mailbox: std::env::var("EMAIL_MAILBOX").unwrap_or_else(|_| "INBOX".into()),
            mark_seen: parse_env::<bool>("EMAIL_MARK_SEEN")?.unwrap_or(true),
        })
    }
}

// ── Protocol session ────────────────────────────────────────────────

/// Lines and literal payloads of one command's untagged responses.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// A synchronous IMAP session over any byte stream.
pub struct ImapSession<S: Read + Write> {
    stream: S,
    next_tag: u32,
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap a connected stream and consume the server greeting.
    pub fn start(stream: S) -> Result<Self, MailError> {
        let mut session = Self {
            stream,
            next_tag: 1,
        };
        let greeting = session.read_line()?;
        let greeting = String::from_utf8_lossy(&greeting);
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        Ok(session)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let cmd = format!("LOGIN {} {}", quote(username), quote(password));
        match self.command(&cmd) {
            Ok(_) => Ok(()),
            Err(MailError::Command { .. }) => Err(MailError::AuthFailed {
                username: username.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), MailError> {
        self.command(&format!("SELECT {}", quote(mailbox)))?;
        Ok(())
    }

    /// UIDs of unseen messages, newest (highest UID) first.
    pub fn search_unseen(&mut self) -> Result<Vec<u32>, MailError> {
        let response = self.command("UID SEARCH UNSEEN")?;
        let mut uids: Vec<u32> = response
            .lines
            .iter()
            .filter_map(|line| line.strip_prefix("* SEARCH"))
            .flat_map(|rest| rest.split_whitespace())
            .filter_map(|uid| uid.parse().ok())
            .collect();
        uids.sort_unstable_by(|a, b| b.cmp(a));
        uids.dedup();
        Ok(uids)
    }

    /// Raw message bytes for `uid`, or `None` if the server returned none.
    pub fn fetch_raw(&mut self, uid: u32, mark_seen: bool) -> Result<Option<Vec<u8>>, MailError> {
        let item = if mark_seen { "RFC822" } else { "BODY.PEEK[]" };
        let response = self.command(&format!("UID FETCH {uid} ({item})"))?;
        Ok(response.literals.into_iter().next())
    }

    /// Say goodbye. Errors are ignored; the server may just hang up.
    pub fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP LOGOUT failed");
        }
    }

    /// Send a tagged command and collect responses up to its completion.
    fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream
            .write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let verb = command_verb(cmd);
        let tag_prefix = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                if len > MAX_LITERAL_BYTES {
                    return Err(MailError::Protocol(format!(
                        "literal too large ({len} bytes, limit {MAX_LITERAL_BYTES})"
                    )));
                }
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
                response
                    .lines
                    .push(String::from_utf8_lossy(&line).trim_end().to_string());
                continue;
            }

            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            if let Some(status) = text.strip_prefix(&tag_prefix) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailError::Command {
                    command: verb,
                    response: status.to_string(),
                });
            }
            response.lines.push(text);
        }
    }

    /// Read one CRLF-terminated line (terminator included).
    fn read_line(&mut self) -> Result<Vec<u8>, MailError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => return Err(MailError::Protocol("connection closed by server".into())),
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(buf);
                    }
                }
            }
        }
    }
}

/// Length of the literal announced at the end of `line` (`... {n}\r\n`).
fn literal_len(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    std::str::from_utf8(&line[open + 1..]).ok()?.parse().ok()
}

/// Quote an IMAP string argument.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Command name for error messages, so credentials never reach logs.
fn command_verb(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some("UID"), Some(sub)) => format!("UID {sub}"),
        (Some(verb), _) => verb.to_string(),
        _ => String::new(),
    }
}

/// Run one fetch over an established session.
///
/// Returns `(uid, raw bytes)` pairs, newest first, at most `limit` of them.
pub fn fetch_unseen<S: Read + Write>(
    session: &mut ImapSession<S>,
    config: &EmailConfig,
    limit: usize,
) -> Result<Vec<(u32, Vec<u8>)>, MailError> {
    session.login(&config.username, config.password.expose_secret())?;
    session.select(&config.mailbox)?;

    let mut uids = session.search_unseen()?;
    uids.truncate(limit);
    debug!(count = uids.len(), mailbox = %config.mailbox, "Unseen messages selected");

    let mut raw_messages = Vec::with_capacity(uids.len());
    for uid in uids {
        match session.fetch_raw(uid, config.mark_seen)? {
            Some(raw) => raw_messages.push((uid, raw)),
            None => warn!(uid, "FETCH returned no message body"),
        }
    }

    session.logout();
    Ok(raw_messages)
}

// ── TLS connection ──────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Open a TLS connection to the IMAP server.
fn connect_tls(config: &EmailConfig) -> Result<TlsStream, MailError> {
    let connection_error = |reason: String| MailError::Connection {
        host: config.imap_host.clone(),
        port: config.imap_port,
        reason,
    };

    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
        .map_err(|e| connection_error(e.to_string()))?;
    tcp.set_read_timeout(Some(READ_TIMEOUT))
        .map_err(|e| connection_error(e.to_string()))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
        .map_err(|e| MailError::Tls(format!("invalid server name: {e}")))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailError::Tls(e.to_string()))?;

    Ok(rustls::StreamOwned::new(conn, tcp))
}

// ── Mail source ─────────────────────────────────────────────────────

/// Pulls unread messages from an IMAP mailbox.
pub struct ImapMailSource {
    config: EmailConfig,
    body_preview_chars: usize,
}

impl ImapMailSource {
    pub fn new(config: EmailConfig, body_preview_chars: usize) -> Self {
        Self {
            config,
            body_preview_chars,
        }
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    fn name(&self) -> &str {
        "imap"
    }

    async fn fetch_unread(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError> {
        let config = self.config.clone();
        let raw_messages = tokio::task::spawn_blocking(move || {
            let stream = connect_tls(&config)?;
            let mut session = ImapSession::start(stream)?;
            fetch_unseen(&mut session, &config, limit)
        })
        .await
        .map_err(|e| MailError::Task(e.to_string()))??;

        let fetched_at = Utc::now();
        let messages: Vec<InboundMessage> = raw_messages
            .into_iter()
            .filter_map(|(uid, raw)| {
                let parsed =
                    parse_raw_message(&uid.to_string(), &raw, self.body_preview_chars, fetched_at);
                if parsed.is_none() {
                    warn!(uid, "Skipping unparseable message");
                }
                parsed
            })
            .collect();

        info!(
            host = %self.config.imap_host,
            count = messages.len(),
            "Fetched unread messages"
        );
        Ok(messages)
    }
}
