//! Extraction of JSON envelopes from model output.
//!
//! Models are asked for a bare JSON object but routinely wrap it in fenced
//! code blocks or surrounding prose. The extractor accepts, in order: raw
//! JSON, a ```json fenced block, and the widest `{...}` span in the text.

/// Try to extract a JSON object from model output.
///
/// Returns `None` when no candidate parses — callers are expected to have a
/// fallback and must not treat this as fatal.
#[must_use]
pub fn json_envelope(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    // Raw JSON first.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
        && value.is_object()
    {
        return Some(value);
    }

    // ```json fenced block.
    if let Some(fenced) = fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(fenced)
        && value.is_object()
    {
        return Some(value);
    }

    // Widest {...} span.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
        && value.is_object()
    {
        return Some(value);
    }

    None
}

/// Return the contents of the first ``` fenced block, tolerating a `json`
/// language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let rest = text.split_once("```")?.1;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let inner = rest.split_once("```")?.0;
    Some(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_json() {
        let value = json_envelope(r#"{"category": "SUPPORT", "confidence": 92}"#).unwrap();
        assert_eq!(value["category"], "SUPPORT");
        assert_eq!(value["confidence"], 92);
    }

    #[test]
    fn fenced_json() {
        let text = "```json\n{\"category\": \"SUPPORT\"}\n```";
        let value = json_envelope(text).unwrap();
        assert_eq!(value["category"], "SUPPORT");
    }

    #[test]
    fn fenced_without_language_tag() {
        let text = "```\n{\"urgency\": \"HIGH\"}\n```";
        let value = json_envelope(text).unwrap();
        assert_eq!(value["urgency"], "HIGH");
    }

    #[test]
    fn json_embedded_in_prose() {
        let text = "Here is my assessment:\n{\"confidence\": 75, \"category\": \"PURCHASING\"}\nLet me know if you need more.";
        let value = json_envelope(text).unwrap();
        assert_eq!(value["confidence"], 75);
    }

    #[test]
    fn nested_braces_use_widest_span() {
        let text = r#"result: {"outer": {"inner": 1}, "n": 2} done"#;
        let value = json_envelope(text).unwrap();
        assert_eq!(value["outer"]["inner"], 1);
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn nonsense_returns_none() {
        assert!(json_envelope("I cannot classify this email.").is_none());
        assert!(json_envelope("").is_none());
        assert!(json_envelope("{broken json").is_none());
    }

    #[test]
    fn bare_array_is_not_an_envelope() {
        assert!(json_envelope("[1, 2, 3]").is_none());
    }
}
