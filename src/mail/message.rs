//! Raw RFC 822 message → `InboundMessage`.

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, PartType};

use crate::pipeline::types::InboundMessage;

/// Marker appended to bodies cut at the preview limit.
pub const TRUNCATION_MARKER: &str = "\n\n...[truncated]";

/// Parse a fetched message.
///
/// Subject and sender are MIME-word decoded. The plain-text body is
/// preferred; HTML is converted to text when there is no plain part.
/// A missing `Date` header falls back to `fetched_at`. Returns `None` if
/// the bytes are not a parseable message.
pub fn parse_raw_message(
    id: &str,
    raw: &[u8],
    preview_chars: usize,
    fetched_at: DateTime<Utc>,
) -> Option<InboundMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let (sender, sender_name) = extract_sender(&parsed);
    let subject = parsed.subject().unwrap_or_default().trim().to_string();
    let body = truncate_preview(extract_body(&parsed).trim(), preview_chars);
    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or(fetched_at);

    Some(InboundMessage {
        id: id.to_string(),
        sender,
        sender_name,
        subject,
        body,
        received_at,
    })
}

/// Sender address and display name from the `From` header.
fn extract_sender(parsed: &Message<'_>) -> (String, Option<String>) {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return (String::new(), None);
    };
    let address = addr.address().unwrap_or_default().to_string();
    let name = addr
        .name()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    (address, name)
}

/// Readable body text: all plain parts, else the first HTML part as text.
fn extract_body(parsed: &Message<'_>) -> String {
    let parts = || {
        parsed
            .text_body
            .iter()
            .chain(parsed.html_body.iter())
            .filter_map(|&id| parsed.parts.get(id as usize))
    };

    let plain: Vec<&str> = parsed
        .text_body
        .iter()
        .filter_map(|&id| parsed.parts.get(id as usize))
        .filter_map(|part| match &part.body {
            PartType::Text(text) => Some(text.as_ref()),
            _ => None,
        })
        .collect();
    if !plain.is_empty() {
        return plain.join("\n");
    }

    parts()
        .find_map(|part| match &part.body {
            PartType::Html(html) => Some(html_to_text(html)),
            _ => None,
        })
        .unwrap_or_default()
}

/// Convert an HTML body to plain text.
///
/// Drops tags along with `<script>` and `<style>` contents, breaks lines at
/// block elements, decodes common entities and removes blank lines.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..end].trim().to_ascii_lowercase();
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        rest = &after[end + 1..];

        if (name == "script" || name == "style") && !tag.starts_with('/') {
            let closing = format!("</{name}");
            rest = match rest.to_ascii_lowercase().find(&closing) {
                Some(pos) => rest[pos..].find('>').map_or("", |gt| &rest[pos + gt + 1..]),
                None => "",
            };
            continue;
        }

        if matches!(
            name.as_str(),
            "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        ) {
            text.push('\n');
        }
    }
    text.push_str(rest);

    decode_entities(&text)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Cut `body` to `max_chars` characters, appending a truncation marker.
pub fn truncate_preview(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut preview: String = body.chars().take(max_chars).collect();
    preview.push_str(TRUNCATION_MARKER);
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> InboundMessage {
        parse_raw_message("17", raw.as_bytes(), 2000, Utc::now()).unwrap()
    }

    #[test]
    fn plain_message_fields() {
        let msg = parse(
            "From: Alice Smith <alice@example.com>\r\n\
             To: me@example.com\r\n\
             Subject: Quick question\r\n\
             Date: Tue, 14 Oct 2025 09:30:00 +0000\r\n\
             \r\n\
             Can you send the report?\r\n",
        );
        assert_eq!(msg.id, "17");
        assert_eq!(msg.sender, "alice@example.com");
        assert_eq!(msg.sender_name.as_deref(), Some("Alice Smith"));
        assert_eq!(msg.subject, "Quick question");
        assert_eq!(msg.body, "Can you send the report?");
        assert_eq!(msg.received_at.to_rfc3339(), "2025-10-14T09:30:00+00:00");
    }

    #[test]
    fn date_with_offset_is_normalized_to_utc() {
        let msg = parse(
            "From: a@example.com\r\nSubject: x\r\nDate: Tue, 14 Oct 2025 11:30:00 +0200\r\n\r\nbody\r\n",
        );
        assert_eq!(msg.received_at.to_rfc3339(), "2025-10-14T09:30:00+00:00");
    }

    #[test]
    fn mime_encoded_subject_is_decoded() {
        let msg = parse(
            "From: =?UTF-8?Q?Jos=C3=A9?= <jose@example.com>\r\n\
             Subject: =?UTF-8?B?UmVwb3J0IGR1ZQ==?=\r\n\
             \r\n\
             hi\r\n",
        );
        assert_eq!(msg.subject, "Report due");
        assert_eq!(msg.sender_name.as_deref(), Some("José"));
    }

    #[test]
    fn missing_subject_and_date() {
        let fetched_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let msg = parse_raw_message(
            "3",
            b"From: bob@example.com\r\n\r\nHello there\r\n",
            2000,
            fetched_at,
        )
        .unwrap();
        assert_eq!(msg.subject, "");
        assert_eq!(msg.received_at, fetched_at);
        assert!(msg.sender_name.is_none());
    }

    #[test]
    fn html_only_body_converted() {
        let msg = parse(
            "From: news@example.com\r\n\
             Subject: Weekly digest\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             <html><head><style>p { color: red; }</style></head>\
             <body><p>Hello &amp; welcome</p><p>Second   line</p></body></html>\r\n",
        );
        assert_eq!(msg.body, "Hello & welcome\nSecond line");
    }

    #[test]
    fn multipart_prefers_plain_text() {
        let msg = parse(
            "From: a@example.com\r\n\
             Subject: Both\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
             \r\n\
             --b1\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             Plain version\r\n\
             --b1\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             <p>HTML version</p>\r\n\
             --b1--\r\n",
        );
        assert_eq!(msg.body, "Plain version");
    }

    #[test]
    fn long_body_truncated_with_marker() {
        let body = "x".repeat(2500);
        let raw = format!("From: a@example.com\r\nSubject: long\r\n\r\n{body}\r\n");
        let msg = parse(&raw);
        assert!(msg.body.ends_with(TRUNCATION_MARKER));
        assert_eq!(msg.body.chars().count(), 2000 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn truncate_preview_short_untouched() {
        assert_eq!(truncate_preview("short", 10), "short");
        assert_eq!(truncate_preview("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_preview("héllo wörld", 5), "héllo\n\n...[truncated]");
    }

    #[test]
    fn html_to_text_drops_scripts_and_tags() {
        let html = "<div>Hi <b>there</b></div><script>alert('x')</script><br/>Bye";
        assert_eq!(html_to_text(html), "Hi there\nBye");
    }

    #[test]
    fn html_to_text_plain_passthrough() {
        assert_eq!(html_to_text("just text"), "just text");
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn html_to_text_unclosed_tag() {
        assert_eq!(html_to_text("text <broken"), "text");
    }
}
