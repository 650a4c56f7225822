use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::settings::SmtpConfig;

// Longest chunk of header text encoded into one word; keeps every encoded
// word within the 75-character limit of RFC 2047.
const ENCODED_WORD_CHUNK: usize = 45;

// Build the RFC 5322 header block plus the CRLF-normalized body.
pub fn build_message(config: &SmtpConfig, subject: &str, body: &str) -> String {
    let headers = [
        format!(
            "From: {} <{}>",
            encode_mime_header(&config.from_name),
            config.username
        ),
        format!("To: {}", config.recipient),
        format!("Subject: {}", encode_mime_header(subject)),
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=UTF-8".to_string(),
        "Content-Transfer-Encoding: 8bit".to_string(),
    ];

    format!("{}\r\n\r\n{}", headers.join("\r\n"), normalize_line_endings(body))
}

// MIME encoded-word (B encoding, UTF-8). Pure-ASCII text passes through
// untouched; longer text is folded into continuation words.
pub fn encode_mime_header(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(encode_word(&chunk));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(encode_word(&chunk));
    }
    words.join("\r\n ")
}

fn encode_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", BASE64.encode(chunk.as_bytes()))
}

// SMTP requires CRLF line endings; source text may carry \n, \r\n, or a
// bare \r.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n")
}

// RFC 5321 transparency: one extra '.' in front of any line that starts
// with '.', so the lone '.' terminator stays unambiguous.
pub fn dot_stuff(message: &str) -> String {
    message
        .split("\r\n")
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}
