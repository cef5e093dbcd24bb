//! Post-processing: deterministic cleanup of raw tesseract output.
//!
//! Every transcribed page is re-sent to the classifier on every later chunk,
//! so noise here is paid for many times over. These rules only remove
//! layout artefacts; they never change recognised words.
//!
//! Rules (applied in order):
//! 1. Strip form feeds (tesseract ends every page with `\x0c`)
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim trailing whitespace per line
//! 5. Collapse 3+ consecutive blank lines down to 1
//! 6. Trim leading and trailing blank lines

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of OCR text.
pub fn clean_ocr_text(input: &str) -> String {
    let s = strip_form_feeds(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Strip form feeds ────────────────────────────────────────────────

fn strip_form_feeds(input: &str) -> String {
    input.replace('\x0c', "")
}

// ── Rule 2: Normalise line endings ──────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip invisible Unicode ─────────────────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

// ── Rule 4: Trim trailing whitespace per line ───────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ──────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tesseract_page_terminator() {
        assert_eq!(clean_ocr_text("SUMMONS\n\x0c"), "SUMMONS");
    }

    #[test]
    fn crlf_and_trailing_spaces() {
        assert_eq!(clean_ocr_text("a  \r\nb\t\r\n"), "a\nb");
    }

    #[test]
    fn blank_runs_collapse_to_one_empty_line() {
        assert_eq!(clean_ocr_text("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_ocr_text("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(clean_ocr_text("\u{FEFF}PLAIN\u{200B}TIFF"), "PLAINTIFF");
    }

    #[test]
    fn whitespace_only_page_becomes_empty() {
        assert_eq!(clean_ocr_text("\n \n\t\n\x0c"), "");
    }
}
