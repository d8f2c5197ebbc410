//! Plain-text helpers for turning stored article HTML into share-card copy.

/// Maximum excerpt length in characters, ellipsis excluded
pub const EXCERPT_LEN: usize = 150;
const ELLIPSIS: &str = "...";

/// Builds the description shown in link previews.
///
/// Tags are stripped, the common named entities decoded, whitespace runs
/// collapsed to single spaces, and the result cut at [`EXCERPT_LEN`]
/// characters with `"..."` appended when anything was cut.
///
/// ```
/// use municipal_news::text::excerpt;
///
/// assert_eq!(excerpt("<p>Obra   na\n<b>praça</b></p>"), "Obra na praça");
/// ```
pub fn excerpt(html: &str) -> String {
    let plain = collapse_whitespace(&decode_entities(&strip_tags(html)));
    truncate_chars(&plain, EXCERPT_LEN)
}

const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "tr", "td", "th", "section", "article", "figure", "figcaption", "hr",
];

/// Removes everything between `<` and the next `>`.
///
/// Block-level tags become a space so paragraphs don't run together; inline
/// tags vanish. A `<` with no closing `>` is kept as text.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        out.push_str(&rest[..open]);
        if is_block_tag(&rest[open + 1..open + close]) {
            out.push(' ');
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_block_tag(inner: &str) -> bool {
    let name = inner
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    BLOCK_TAGS.contains(&name.as_str())
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the handful of entities rich-text editors emit for plain prose.
/// `&amp;` goes last so `&amp;lt;` decodes to `&lt;`, not `<`.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Cuts `s` to `max` characters (not bytes) and appends an ellipsis if it was longer.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &s[..cut], ELLIPSIS),
        None => s.to_string(),
    }
}
