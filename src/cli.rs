//! Interactive terminal session: a stdin/stdout REPL over the pipeline.
//!
//! Every command runs to completion before the next prompt. Failures are
//! printed and the session carries on.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::pipeline::processor::TriagePipeline;
use crate::pipeline::types::TriagedMessage;
use crate::store::traits::DraftStore;

const HELP: &str = "\
Commands:
  fetch [n]        fetch and triage up to n unread messages
  list             list fetched messages
  show <i>         show message i with its draft
  generate <i>     generate a fresh draft for message i
  edit <i> <text>  replace the draft for message i
  save <i>         save the draft for message i
  load <i>         load the saved draft for message i
  drafts           list saved drafts
  help             show this help
  quit             exit";

/// A parsed REPL command. Message indices are 1-based, as listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch(Option<usize>),
    List,
    Show(usize),
    Generate(usize),
    Edit(usize, String),
    Save(usize),
    Load(usize),
    Drafts,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        let command = match word.to_lowercase().as_str() {
            "fetch" if rest.is_empty() => Self::Fetch(None),
            "fetch" => Self::Fetch(Some(parse_count(rest)?)),
            "list" | "ls" => Self::List,
            "show" => Self::Show(parse_index(rest)?),
            "generate" | "gen" => Self::Generate(parse_index(rest)?),
            "edit" => {
                let (index, text) = rest
                    .split_once(char::is_whitespace)
                    .map(|(i, t)| (i, t.trim()))
                    .unwrap_or((rest, ""));
                Self::Edit(parse_index(index)?, text.to_string())
            }
            "save" => Self::Save(parse_index(rest)?),
            "load" => Self::Load(parse_index(rest)?),
            "drafts" => Self::Drafts,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command `{other}`, type `help` for a list"),
        };
        Ok(command)
    }
}

fn parse_index(arg: &str) -> anyhow::Result<usize> {
    if arg.is_empty() {
        bail!("missing message number");
    }
    match arg.parse::<usize>() {
        Ok(0) | Err(_) => bail!("`{arg}` is not a message number"),
        Ok(i) => Ok(i),
    }
}

fn parse_count(arg: &str) -> anyhow::Result<usize> {
    match arg.parse::<usize>() {
        Ok(0) | Err(_) => bail!("`{arg}` is not a positive count"),
        Ok(n) => Ok(n),
    }
}

/// One line of the message list.
pub fn format_list_line(index: usize, triaged: &TriagedMessage) -> String {
    let message = &triaged.message;
    let subject = if message.subject.trim().is_empty() {
        "(No Subject)"
    } else {
        message.subject.as_str()
    };
    let sender = if message.sender.trim().is_empty() {
        "Unknown"
    } else {
        message.display_sender()
    };
    format!(
        "{index}. [{}] {subject} — {sender} [{}]",
        triaged.category,
        message.received_at.format("%Y-%m-%d %H:%M")
    )
}

/// Wrap each `(start, end)` byte range of `text` in `**`.
fn highlight(text: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len() + spans.len() * 4);
    let mut last = 0;
    for &(start, end) in spans {
        out.push_str(&text[last..start]);
        out.push_str("**");
        out.push_str(&text[start..end]);
        out.push_str("**");
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

/// What the REPL does after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Interactive session state: the last fetch and its drafts.
pub struct CliSession<W: Write> {
    pipeline: TriagePipeline,
    store: Arc<dyn DraftStore>,
    fetch_limit: usize,
    messages: Vec<TriagedMessage>,
    out: W,
}

impl<W: Write> CliSession<W> {
    pub fn new(
        pipeline: TriagePipeline,
        store: Arc<dyn DraftStore>,
        fetch_limit: usize,
        out: W,
    ) -> Self {
        Self {
            pipeline,
            store,
            fetch_limit,
            messages: Vec::new(),
            out,
        }
    }

    /// Messages from the last fetch.
    pub fn messages(&self) -> &[TriagedMessage] {
        &self.messages
    }

    /// Read commands from `input` until EOF or `quit`.
    pub async fn run<R>(&mut self, input: R) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        writeln!(self.out, "Type `help` for commands.")?;
        let mut lines = input.lines();
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;

            let Some(line) = lines.next_line().await.context("reading input")? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match self.execute_line(&line).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => {
                    warn!(error = %e, "Command failed");
                    writeln!(self.out, "Error: {e:#}")?;
                }
            }
        }
        Ok(())
    }

    async fn execute_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        let command = Command::parse(line)?;
        self.execute(command).await
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<Flow> {
        match command {
            Command::Fetch(limit) => self.fetch(limit.unwrap_or(self.fetch_limit)).await?,
            Command::List => self.list()?,
            Command::Show(i) => self.show(i)?,
            Command::Generate(i) => {
                let idx = self.index(i)?;
                self.pipeline.regenerate(&mut self.messages[idx]).await;
                let draft = &self.messages[idx].draft;
                writeln!(self.out, "New draft for #{i}:\n{}", draft.reply_text)?;
            }
            Command::Edit(i, text) => {
                let idx = self.index(i)?;
                self.messages[idx].draft.edit(text);
                writeln!(self.out, "Draft #{i} updated.")?;
            }
            Command::Save(i) => self.save(i).await?,
            Command::Load(i) => self.load(i).await?,
            Command::Drafts => self.drafts().await?,
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Map a 1-based message number to a position in the fetched list.
    fn index(&self, i: usize) -> anyhow::Result<usize> {
        if self.messages.is_empty() {
            bail!("no messages loaded, run `fetch` first");
        }
        if i == 0 || i > self.messages.len() {
            bail!("no message #{i} (1-{})", self.messages.len());
        }
        Ok(i - 1)
    }

    async fn fetch(&mut self, limit: usize) -> anyhow::Result<()> {
        writeln!(self.out, "Fetching up to {limit} unread messages...")?;
        let messages = self
            .pipeline
            .fetch_and_triage(limit)
            .await
            .context("could not fetch messages")?;
        self.messages = messages;
        writeln!(self.out, "Fetched {} unread messages.", self.messages.len())?;
        self.list()
    }

    fn list(&mut self) -> anyhow::Result<()> {
        if self.messages.is_empty() {
            writeln!(self.out, "No messages.")?;
            return Ok(());
        }
        for (i, triaged) in self.messages.iter().enumerate() {
            writeln!(self.out, "{}", format_list_line(i + 1, triaged))?;
        }
        Ok(())
    }

    fn show(&mut self, i: usize) -> anyhow::Result<()> {
        let idx = self.index(i)?;
        let triaged = &self.messages[idx];
        let message = &triaged.message;

        let classifier = self.pipeline.classifier();
        let subject_spans = classifier.keyword_spans(&message.subject, triaged.category);
        let body_spans = classifier.keyword_spans(&message.body, triaged.category);
        let keywords = if triaged.matched_keywords.is_empty() {
            "none".to_string()
        } else {
            triaged.matched_keywords.join(", ")
        };
        let draft_label = if triaged.draft.edited {
            "Draft (edited)"
        } else {
            "Draft"
        };

        writeln!(self.out, "From:     {} <{}>", message.display_sender(), message.sender)?;
        writeln!(self.out, "Date:     {}", message.received_at.format("%Y-%m-%d %H:%M"))?;
        writeln!(self.out, "Subject:  {}", highlight(&message.subject, &subject_spans))?;
        writeln!(self.out, "Category: {} (keywords: {keywords})", triaged.category)?;
        writeln!(self.out, "\n{}\n", highlight(&message.body, &body_spans))?;
        writeln!(
            self.out,
            "--- {draft_label}, via {} ---\n{}",
            triaged.reply_source.label(),
            triaged.draft.reply_text
        )?;
        Ok(())
    }

    async fn save(&mut self, i: usize) -> anyhow::Result<()> {
        let idx = self.index(i)?;
        let draft = &self.messages[idx].draft;
        self.store.save_draft(draft).await?;
        writeln!(self.out, "Draft saved for message {}.", draft.message_id)?;
        Ok(())
    }

    async fn load(&mut self, i: usize) -> anyhow::Result<()> {
        let idx = self.index(i)?;
        let message_id = self.messages[idx].message.id.clone();
        match self.store.load_draft(&message_id).await? {
            Some(draft) => {
                writeln!(self.out, "Loaded saved draft:\n{}", draft.reply_text)?;
                self.messages[idx].draft = draft;
            }
            None => writeln!(self.out, "No saved draft for message {message_id}.")?,
        }
        Ok(())
    }

    async fn drafts(&mut self) -> anyhow::Result<()> {
        let drafts = self.store.list_drafts().await?;
        if drafts.is_empty() {
            writeln!(self.out, "No saved drafts.")?;
            return Ok(());
        }
        for draft in drafts {
            let preview: String = draft.reply_text.chars().take(60).collect();
            let preview = preview.replace('\n', " ");
            writeln!(
                self.out,
                "{} [{}] {}{}: {preview}",
                draft.message_id,
                draft.updated_at.format("%Y-%m-%d %H:%M"),
                if draft.subject.is_empty() {
                    "(No Subject)"
                } else {
                    draft.subject.as_str()
                },
                if draft.edited { " (edited)" } else { "" },
            )?;
        }
        Ok(())
    }
}
