//! Prompts for the summons page-range classifier.
//!
//! Both providers receive exactly the same messages; only the backend that
//! answers differs. Callers can override the system prompt via
//! [`crate::config::ExtractionConfig::system_prompt`]; the user prompt is
//! always built by [`classification_prompt`] because the response parser
//! depends on the JSON shape it asks for.

use crate::job::PageRecord;

/// Default system prompt for page-range classification.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a meticulous paralegal. You read OCR text of \
court filings and report page numbers exactly as labelled. You answer with a single JSON object \
and nothing else.";

/// Instructions placed before the document text.
const INSTRUCTIONS: &str = r#"The text below is a legal filing. We only care about the summons.
Identify the range of page numbers containing JUST the summons.

Rules:
- Analyse the pages before and after to make sure every summons page is included.
- Include all summons disclaimers and law firm signature pages.
- Always exclude the "field sheet" page.
- Always exclude the "complaint" pages.
- If this is not a legal document, or it contains no summons, use the null format below."#;

/// Build the user message embedding every transcribed page, labelled with
/// its one-based page number.
pub fn classification_prompt(pages: &[PageRecord]) -> String {
    let document = pages
        .iter()
        .map(|p| format!("Page {}:\n{}", p.page_index + 1, p.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{INSTRUCTIONS}\n\nHere is the legal document text:\n\n{document}\n\n\
Respond with {{\"start_page\": X, \"end_page\": Y}}, or {{\"start_page\": X}} if the summons is a \
single page. If no summons pages are identified, respond with \
{{\"start_page\": null, \"end_page\": null}}."
    )
}
