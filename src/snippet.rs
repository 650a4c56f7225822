use std::fs;
use std::path::Path;

use log::debug;
use regex::Regex;

use crate::error::{Error, Result};

// A single markdown section, captured once and consumed once to build the
// outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub heading: String,
    pub body: String,
    pub title_suffix: String,
}

impl Snippet {
    fn new(heading: &str, body: &str) -> Self {
        // Every '#' is stripped, not just the ATX prefix. The subject lines
        // built downstream rely on this exact behavior.
        let title_suffix = heading.replace('#', "").trim().to_string();
        Snippet {
            heading: heading.to_string(),
            body: body.trim().to_string(),
            title_suffix,
        }
    }
}

pub fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

// Pull the content that starts right after the given heading line, up to
// (not including) the first line consisting solely of "---", or the end of
// the document. Ungreedy so the first delimiter wins.
pub fn extract_snippet(markdown: &str, heading: &str) -> Result<Snippet> {
    let pattern = format!(
        r"(?s){}\r?\n(.*?)(?:\r?\n---(?:\r?\n|\z)|\z)",
        regex::escape(heading)
    );
    let regex = Regex::new(&pattern).expect("escaped heading forms a valid pattern");

    let captures = regex
        .captures(markdown)
        .ok_or_else(|| Error::HeadingNotFound(heading.to_string()))?;
    let body = captures.get(1).map_or("", |m| m.as_str());
    debug!("captured {} bytes after heading {:?}", body.len(), heading);

    Ok(Snippet::new(heading, body))
}

// Split the document into "##" sections for rotation. A section runs from
// its heading line to the next "##" heading or the end of the document.
// The regex crate has no look-ahead, so this is a plain line scan.
pub fn load_sections(markdown: &str) -> Vec<Snippet> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in markdown.lines() {
        if is_section_heading(line) {
            if let Some((heading, body)) = current.take() {
                push_section(&mut sections, &heading, &body);
            }
            current = Some((line.trim().to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((heading, body)) = current {
        push_section(&mut sections, &heading, &body);
    }

    debug!("loaded {} sections", sections.len());
    sections
}

fn is_section_heading(line: &str) -> bool {
    line.starts_with("##") && !line[2..].trim().is_empty()
}

fn push_section(sections: &mut Vec<Snippet>, heading: &str, body_lines: &[&str]) {
    let snippet = Snippet::new(heading, &body_lines.join("\n"));
    // Headings without content are skipped rather than sent as empty mail.
    if !snippet.body.is_empty() {
        sections.push(snippet);
    }
}

// Sequential rotation: the state file stores the index of the section sent
// last. Missing or corrupt state restarts from the beginning.
pub fn next_section_index(state_path: &Path, section_count: usize) -> usize {
    let last = fs::read_to_string(state_path)
        .ok()
        .and_then(|text| text.trim().parse::<usize>().ok());
    match last {
        Some(index) => (index + 1) % section_count,
        None => 0,
    }
}

pub fn save_section_index(state_path: &Path, index: usize) -> Result<()> {
    fs::write(state_path, index.to_string()).map_err(|source| Error::Io {
        path: state_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "\
# 读后感\n\
\n\
## Day 1《刻意练习》\n\
\n\
今天读到的要点。\n\
第二行。\n\
\n\
---\n\
\n\
## Day 2《原则》\n\
\n\
另一段正文。\n";

    #[test]
    fn extracts_body_up_to_delimiter() {
        let snippet = extract_snippet(DOCUMENT, "## Day 1《刻意练习》").unwrap();
        assert_eq!(snippet.body, "今天读到的要点。\n第二行。");
    }

    #[test]
    fn first_delimiter_bounds_the_snippet() {
        let doc = "## H\na\n---\nb\n---\nc\n";
        let snippet = extract_snippet(doc, "## H").unwrap();
        assert_eq!(snippet.body, "a");
    }

    #[test]
    fn runs_to_end_of_document_without_delimiter() {
        let snippet = extract_snippet(DOCUMENT, "## Day 2《原则》").unwrap();
        assert_eq!(snippet.body, "另一段正文。");
    }

    #[test]
    fn delimiter_must_be_the_whole_line() {
        let doc = "## H\nfirst\n--- not a rule\nlast\n";
        let snippet = extract_snippet(doc, "## H").unwrap();
        assert_eq!(snippet.body, "first\n--- not a rule\nlast");
    }

    #[test]
    fn missing_heading_is_reported() {
        let err = extract_snippet(DOCUMENT, "## Day 99").unwrap_err();
        assert!(matches!(err, Error::HeadingNotFound(_)));
    }

    #[test]
    fn title_suffix_strips_every_hash() {
        let snippet = extract_snippet(DOCUMENT, "## Day 1《刻意练习》").unwrap();
        assert_eq!(snippet.title_suffix, "Day 1《刻意练习》");

        let doc = "## A # B\nbody\n";
        let snippet = extract_snippet(doc, "## A # B").unwrap();
        assert_eq!(snippet.title_suffix, "A  B");
    }

    #[test]
    fn crlf_documents_extract_the_same() {
        let doc = "## H\r\nline one\r\nline two\r\n---\r\n";
        let snippet = extract_snippet(doc, "## H").unwrap();
        assert_eq!(snippet.body, "line one\r\nline two");
    }

    #[test]
    fn loads_all_sections() {
        let sections = load_sections(DOCUMENT);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, "## Day 1《刻意练习》");
        assert_eq!(sections[1].title_suffix, "Day 2《原则》");
    }

    #[test]
    fn empty_sections_are_skipped() {
        let doc = "## Empty\n\n## Full\ncontent\n##\nnot a heading start\n";
        let sections = load_sections(doc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "## Full");
    }

    #[test]
    fn rotation_starts_at_zero_and_wraps() {
        let state = std::env::temp_dir().join(format!("snipmail_rotation_{}", std::process::id()));
        let _ = fs::remove_file(&state);

        assert_eq!(next_section_index(&state, 3), 0);
        save_section_index(&state, 0).unwrap();
        assert_eq!(next_section_index(&state, 3), 1);
        save_section_index(&state, 2).unwrap();
        assert_eq!(next_section_index(&state, 3), 0);

        fs::write(&state, "not a number").unwrap();
        assert_eq!(next_section_index(&state, 3), 0);

        let _ = fs::remove_file(&state);
    }
}
