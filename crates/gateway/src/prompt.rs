pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 100_000;

const PREAMBLE: &str = "You are DocIQ — a document intelligence assistant. Your job is to answer questions about the document provided by the user.";

const INSTRUCTIONS: &str = "## Instructions:
- Answer questions ONLY based on the document above
- Always quote specific text from the document when relevant (use \"...\" for exact quotes)
- Cite location when possible: \"In the [section/paragraph]...\" or \"According to the document...\"
- If the document doesn't contain the answer, say so clearly — don't speculate
- Be concise but complete — the goal is accurate information retrieval, not long essays
- For lists or comparisons, use bullet points for clarity
- If a question is ambiguous, ask for clarification before answering";

/// System instruction sent alongside the history; never shown in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    pub text: String,
    /// Characters of the original document, before truncation.
    pub document_chars: usize,
    pub truncated: bool,
}

/// Cuts `document` to at most `max_chars` characters on a char boundary.
pub fn truncate_document(document: &str, max_chars: usize) -> (&str, bool) {
    match document.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (&document[..byte_index], true),
        None => (document, false),
    }
}

pub fn truncation_notice(max_chars: usize) -> String {
    format!(
        "[Document truncated at {} characters]",
        group_thousands(max_chars)
    )
}

pub fn build_system_prompt(document: &str, max_chars: usize) -> SystemPrompt {
    let (embedded, truncated) = truncate_document(document, max_chars);

    let mut text = String::with_capacity(embedded.len() + PREAMBLE.len() + INSTRUCTIONS.len() + 128);
    text.push_str(PREAMBLE);
    text.push_str("\n\n## Document Content:\n<document>\n");
    text.push_str(embedded);
    if truncated {
        text.push_str("\n\n");
        text.push_str(&truncation_notice(max_chars));
    }
    text.push_str("\n</document>\n\n");
    text.push_str(INSTRUCTIONS);

    SystemPrompt {
        text,
        document_chars: document.chars().count(),
        truncated,
    }
}

fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded_document(prompt: &SystemPrompt) -> &str {
        let start = prompt.text.find("<document>\n").unwrap() + "<document>\n".len();
        let end = prompt.text.find("\n</document>").unwrap();
        &prompt.text[start..end]
    }

    #[test]
    fn short_document_is_embedded_verbatim() {
        let prompt = build_system_prompt("The sky is blue.", DEFAULT_MAX_DOCUMENT_CHARS);
        assert!(!prompt.truncated);
        assert_eq!(embedded_document(&prompt), "The sky is blue.");
        assert!(!prompt.text.contains("[Document truncated"));
    }

    #[test]
    fn document_at_limit_is_not_truncated() {
        let document = "a".repeat(DEFAULT_MAX_DOCUMENT_CHARS);
        let prompt = build_system_prompt(&document, DEFAULT_MAX_DOCUMENT_CHARS);
        assert!(!prompt.truncated);
        assert_eq!(embedded_document(&prompt), document);
    }

    #[test]
    fn long_document_is_cut_to_limit_with_notice() {
        let document = format!("{}{}", "b".repeat(DEFAULT_MAX_DOCUMENT_CHARS), "overflow");
        let prompt = build_system_prompt(&document, DEFAULT_MAX_DOCUMENT_CHARS);
        assert!(prompt.truncated);
        assert_eq!(prompt.document_chars, DEFAULT_MAX_DOCUMENT_CHARS + 8);

        let expected = format!(
            "{}\n\n[Document truncated at 100,000 characters]",
            "b".repeat(DEFAULT_MAX_DOCUMENT_CHARS)
        );
        assert_eq!(embedded_document(&prompt), expected);
        assert!(!prompt.text.contains("overflow"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let (cut, truncated) = truncate_document("héllo wörld", 4);
        assert!(truncated);
        assert_eq!(cut, "héll");
    }

    #[test]
    fn prompt_carries_behavioural_instructions() {
        let prompt = build_system_prompt("doc", 10);
        assert!(prompt.text.starts_with("You are DocIQ"));
        assert!(prompt.text.contains("ONLY based on the document"));
        assert!(prompt.text.contains("ask for clarification"));
    }

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(5), "5");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(100_000), "100,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
