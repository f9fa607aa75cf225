/// Sanitize extracted text before it becomes blocks.
/// Strips control characters, collapses runs of spaces and drops blank lines.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.lines()
        .map(normalize_line)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-line form: control characters removed, internal whitespace collapsed.
pub fn normalize_line(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '\t' | '\u{00A0}' | '\u{2009}' | '\u{202F}' => ' ',
            // Soft hyphen and zero-width characters carry nothing for matching.
            '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => '\0',
            c => c,
        })
        .filter(|c| !c.is_control())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
