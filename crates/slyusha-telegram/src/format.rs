//! Outgoing text formatting for Telegram.
//!
//! The model writes light Markdown; Telegram's HTML parse mode supports
//! `<b>`, `<i>`, `<u>`, `<s>`, `<code>`, `<pre>` and `<a href>`. Unmatched
//! delimiters are emitted literally so the result is always balanced HTML.

/// Telegram's per-message limit is 4096 characters; keep some headroom for
/// the markup added by conversion.
pub const MESSAGE_MAX_CHARS: usize = 4000;

/// Inline delimiters in match order: longer ones first.
const INLINE: &[(&str, &str)] = &[("**", "b"), ("__", "u"), ("~~", "s"), ("*", "i"), ("_", "i")];

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

/// Convert Markdown to Telegram HTML.
pub fn markdown_to_html(md: &str) -> String {
    let chars: Vec<char> = md.chars().collect();
    render(&chars)
}

fn render(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len() + 16);
    let mut i = 0;

    'outer: while i < chars.len() {
        // ```lang\ncode```
        if starts_with(chars, i, "```") {
            if let Some(end) = find(chars, i + 3, "```", false) {
                let inner: String = chars[i + 3..end].iter().collect();
                let (lang, body) = match inner.split_once('\n') {
                    Some((first, rest)) if !first.trim().contains(char::is_whitespace) => {
                        (first.trim(), rest)
                    }
                    _ => ("", inner.as_str()),
                };
                if lang.is_empty() {
                    out.push_str(&format!("<pre>{}</pre>", escape_html(body)));
                } else {
                    out.push_str(&format!(
                        "<pre><code class=\"language-{}\">{}</code></pre>",
                        escape_html(lang),
                        escape_html(body)
                    ));
                }
                i = end + 3;
                continue;
            }
        }

        if chars[i] == '`' {
            if let Some(end) = find(chars, i + 1, "`", true) {
                let code: String = chars[i + 1..end].iter().collect();
                out.push_str(&format!("<code>{}</code>", escape_html(&code)));
                i = end + 1;
                continue;
            }
        }

        if chars[i] == '[' {
            if let Some((text_end, url_end)) = find_link(chars, i) {
                let label = render(&chars[i + 1..text_end]);
                let url: String = chars[text_end + 2..url_end].iter().collect();
                out.push_str(&format!("<a href=\"{}\">{}</a>", escape_html(&url), label));
                i = url_end + 1;
                continue;
            }
        }

        for (delim, tag) in INLINE {
            if !opens_inline(chars, i, delim) {
                continue;
            }
            let len = delim.chars().count();
            if let Some(end) = find(chars, i + len, delim, true) {
                if end > i + len && !chars[end - 1].is_whitespace() {
                    let inner = render(&chars[i + len..end]);
                    out.push_str(&format!("<{tag}>{inner}</{tag}>"));
                    i = end + len;
                    continue 'outer;
                }
            }
        }

        push_escaped(&mut out, chars[i]);
        i += 1;
    }

    out
}

fn starts_with(chars: &[char], at: usize, pat: &str) -> bool {
    let mut idx = at;
    for p in pat.chars() {
        if chars.get(idx) != Some(&p) {
            return false;
        }
        idx += 1;
    }
    true
}

/// Index of the next `pat` at or after `from`. With `same_line`, the search
/// stops at a newline.
fn find(chars: &[char], from: usize, pat: &str, same_line: bool) -> Option<usize> {
    (from..chars.len())
        .take_while(|&j| !same_line || chars[j] != '\n')
        .find(|&j| starts_with(chars, j, pat))
}

/// A delimiter opens emphasis when followed by a non-space character.
/// `_` inside a word (snake_case) does not count.
fn opens_inline(chars: &[char], at: usize, delim: &str) -> bool {
    if !starts_with(chars, at, delim) {
        return false;
    }
    let len = delim.chars().count();
    let next_ok = chars.get(at + len).is_some_and(|c| !c.is_whitespace());
    let prev_ok = !delim.starts_with('_') || at == 0 || !chars[at - 1].is_alphanumeric();
    next_ok && prev_ok
}

/// `[text](url)` starting at `at`: returns the indices of `]` and `)`.
fn find_link(chars: &[char], at: usize) -> Option<(usize, usize)> {
    let text_end = find(chars, at + 1, "]", true)?;
    if chars.get(text_end + 1) != Some(&'(') {
        return None;
    }
    let url_end = find(chars, text_end + 2, ")", true)?;
    if url_end == text_end + 2 {
        return None;
    }
    Some((text_end, url_end))
}

/// Split `text` into chunks of at most `max` characters, preferring line
/// breaks, then spaces.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > max {
        let window = &rest[..max];
        let cut = window
            .iter()
            .rposition(|&c| c == '\n')
            .or_else(|| window.iter().rposition(|&c| c == ' '))
            .filter(|&p| p > 0)
            .unwrap_or(max);
        let chunk: String = rest[..cut].iter().collect();
        let chunk = chunk.trim_end().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        let skip = if cut < rest.len() && rest[cut].is_whitespace() {
            cut + 1
        } else {
            cut
        };
        rest.drain(..skip);
    }

    let tail: String = rest.into_iter().collect();
    if !tail.trim().is_empty() || chunks.is_empty() {
        chunks.push(tail);
    }
    chunks
}
