use colored::Colorize;
use once_cell::sync::Lazy;

pub static SUCCESS: Lazy<colored::ColoredString> = Lazy::new(|| "[PANEL]".green());
pub static FAIL: Lazy<colored::ColoredString> = Lazy::new(|| "[PANEL]".red());
pub static WARN: Lazy<colored::ColoredString> = Lazy::new(|| "[PANEL]".yellow());
pub static INFO: Lazy<colored::ColoredString> = Lazy::new(|| "[PANEL]".cyan());

/// Maximum length of a single chat message, in characters
pub const MESSAGE_LIMIT: usize = 4096;

/// Escape the three characters Telegram's HTML parse mode reserves
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn escaped_width(ch: char) -> usize {
    match ch {
        '&' => 5,
        '<' | '>' => 4,
        _ => 1,
    }
}

/// Last `max_chars` characters of `text`
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((start, _)) if max_chars > 0 => &text[start..],
        _ if max_chars == 0 => "",
        _ => text,
    }
}

/// HTML-escaped tail of `text` whose escaped form is at most `budget`
/// characters. When anything was cut, the partial first line is dropped too.
pub fn escaped_tail(text: &str, budget: usize) -> String {
    let mut used = 0;
    let mut start = text.len();

    for (index, ch) in text.char_indices().rev() {
        let width = escaped_width(ch);
        if used + width > budget {
            break;
        }
        used += width;
        start = index;
    }

    let mut kept = &text[start..];
    if start > 0 {
        if let Some(newline) = kept.find('\n') {
            kept = &kept[newline + 1..];
        }
    }

    escape_html(kept)
}

/// `header` followed by `body` in a `<pre>` block, trimmed from the front so
/// the whole message fits in one chat message.
pub fn pre_block(header: &str, body: &str) -> String {
    let frame = header.chars().count() + "<pre></pre>".len();
    let budget = MESSAGE_LIMIT.saturating_sub(frame);
    format!("{header}<pre>{}</pre>", escaped_tail(body, budget))
}
