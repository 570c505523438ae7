//! Plain-text extraction from HTML mail bodies.

use std::sync::LazyLock;

use regex::Regex;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("script regex is valid")
});

static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/tr|/li|/h[1-6])[^>]*>").expect("break regex is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex is valid"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f]+").expect("whitespace regex is valid"));

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line regex is valid"));

/// Strip markup from an HTML body and collapse whitespace.
///
/// Block-level closings become line breaks so paragraph structure survives;
/// script and style contents are dropped entirely.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let no_scripts = SCRIPT_STYLE_RE.replace_all(html, "");
    let with_breaks = BLOCK_BREAK_RE.replace_all(&no_scripts, "\n");
    let no_tags = TAG_RE.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&no_tags);
    let collapsed = WHITESPACE_RE.replace_all(&decoded, " ");

    let trimmed_lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    let joined = trimmed_lines.join("\n");
    BLANK_LINES_RE.replace_all(&joined, "\n\n").trim().to_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_simple_markup() {
        let html = "<p>I forgot my <b>password</b>, please help.</p>";
        assert_eq!(html_to_text(html), "I forgot my password , please help.");
    }

    #[test]
    fn drops_script_and_style() {
        let html = "<style>p { color: red }</style><p>visible</p><script>alert(1)</script>";
        assert_eq!(html_to_text(html), "visible");
    }

    #[test]
    fn block_elements_become_line_breaks() {
        let html = "<p>first</p><p>second</p>";
        let text = html_to_text(html);
        assert!(text.contains('\n'));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn decodes_common_entities() {
        let html = "a &amp; b &lt;c&gt; &quot;d&quot; &#39;e&#39;&nbsp;f";
        assert_eq!(html_to_text(html), "a & b <c> \"d\" 'e' f");
    }

    #[test]
    fn collapses_whitespace() {
        let html = "<div>lots\t\t of     space</div>";
        assert_eq!(html_to_text(html), "lots of space");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("no markup here"), "no markup here");
    }

    #[test]
    fn empty_input() {
        assert_eq!(html_to_text(""), "");
    }
}
