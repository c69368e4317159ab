use crate::transport::{ErrorReporter, TransportOptions};
use crate::domain::LogEntry;
use crate::format::{DefaultFormatter, OutputFormat};
use uuid::Uuid;

/// Discord rejects message content longer than this many characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

const SEPARATOR: &str = "\n\n";
const ELLIPSIS: &str = "...";

/// An entry waiting in the pending queue together with the options it was
/// logged with.
#[derive(Debug, Clone)]
pub(crate) struct QueuedEntry {
    pub(crate) entry: LogEntry,
    pub(crate) options: TransportOptions,
}

/// A group of entries packed into outbound messages.
///
/// Messages are rendered once, so every retry sends byte-identical content.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    messages: Vec<String>,
    entry_count: usize,
}

impl Batch {
    pub(crate) fn pack(entries: Vec<QueuedEntry>, reporter: Option<&ErrorReporter>) -> Self {
        let entry_count = entries.len();
        let formatted = entries
            .iter()
            .map(|queued| format_entry(&queued.entry, &queued.options, reporter));

        Self {
            id: Uuid::new_v4().to_string(),
            messages: pack_messages(formatted),
            entry_count,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn size(&self) -> usize {
        self.entry_count
    }
}

/// Renders one entry for a chat message.
pub fn format_entry(
    entry: &LogEntry,
    options: &TransportOptions,
    reporter: Option<&ErrorReporter>,
) -> String {
    if let Some(custom) = options.custom_line(entry, reporter) {
        return custom;
    }
    match options.format {
        OutputFormat::Json => match serde_json::to_string_pretty(entry) {
            Ok(json) => format!("```json\n{json}\n```"),
            Err(e) => {
                tracing::warn!("JSON rendering failed, using text format: {}", e);
                bold_title(entry)
            }
        },
        OutputFormat::Text => bold_title(entry),
    }
}

fn bold_title(entry: &LogEntry) -> String {
    let mut text = format!(
        "**[{}] {}**\n{}",
        entry.level_name, entry.timestamp, entry.message
    );
    if !entry.args.is_empty() {
        text.push('\n');
        text.push_str(&entry.args.join(" "));
    }
    if let Some(data) = entry.data.as_ref().filter(|data| !data.is_empty()) {
        if let Ok(json) = serde_json::to_string_pretty(data) {
            text.push_str("\n```json\n");
            text.push_str(&json);
            text.push_str("\n```");
        }
    }
    text
}

/// Greedily joins formatted entries with a blank line, starting a new message
/// whenever the next entry would push the current one past the limit.
pub fn pack_messages<I>(formatted: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let separator_len = SEPARATOR.chars().count();
    let mut messages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for text in formatted {
        let text = truncate(text, MAX_CONTENT_CHARS);
        let len = text.chars().count();

        if current.is_empty() {
            current = text;
            current_len = len;
        } else if current_len + separator_len + len <= MAX_CONTENT_CHARS {
            current.push_str(SEPARATOR);
            current.push_str(&text);
            current_len += separator_len + len;
        } else {
            messages.push(std::mem::replace(&mut current, text));
            current_len = len;
        }
    }

    if !current.is_empty() {
        messages.push(current);
    }
    messages
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let keep = max_chars - ELLIPSIS.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
