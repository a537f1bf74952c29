//! Text chunking and content hashing.
//!
//! Chunk boundaries prefer a newline, then any whitespace, then a hard
//! cut, scanned right-to-left inside the window so chunks break at the
//! latest natural point that still fits the limit.

/// One window over a line array, 1-indexed and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineChunk {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// MD5 hex digest of the UTF-8 bytes. Change detection only.
pub fn hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Split `text` into pieces of at most `limit` characters.
///
/// Empty (or all-whitespace) input yields no chunks; input within the
/// limit yields exactly one. Leading/trailing whitespace is stripped from
/// every chunk.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        // Skip inter-chunk whitespace.
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        let remaining = chars.len() - start;
        if remaining <= limit {
            push_trimmed(&mut chunks, &chars[start..]);
            break;
        }

        let window_end = start + limit;
        let mut cut = None;
        for i in (start + 1..=window_end).rev() {
            if chars[i] == '\n' {
                cut = Some(i);
                break;
            }
        }
        if cut.is_none() {
            for i in (start + 1..=window_end).rev() {
                if chars[i].is_whitespace() {
                    cut = Some(i);
                    break;
                }
            }
        }
        let cut = cut.unwrap_or(window_end);

        push_trimmed(&mut chunks, &chars[start..cut]);
        start = cut;
    }
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, chars: &[char]) {
    let piece: String = chars.iter().collect();
    let piece = piece.trim();
    if !piece.is_empty() {
        chunks.push(piece.to_string());
    }
}

/// Split on blank lines and greedily pack paragraphs (joined with
/// `"\n\n"`) up to `limit`. Oversized paragraphs fall back to
/// [`chunk_text`].
pub fn chunk_by_paragraph(text: &str, limit: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let paragraphs: Vec<&str> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks = Vec::new();
    let mut current = String::new();
    for para in paragraphs {
        if para.chars().count() > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(chunk_text(para, limit));
            continue;
        }
        let joined_len = if current.is_empty() {
            para.chars().count()
        } else {
            current.chars().count() + 2 + para.chars().count()
        };
        if joined_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(para);
        } else {
            current.push_str("\n\n");
            current.push_str(para);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Overlapping windows over a line array, 1-indexed.
///
/// Consecutive windows share exactly `overlap` lines:
/// `chunks[i].end_line - chunks[i+1].start_line + 1 == overlap`.
pub fn chunk_lines(lines: &[String], size: usize, overlap: usize) -> Vec<LineChunk> {
    if lines.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(lines.len());
        chunks.push(LineChunk {
            start_line: start + 1,
            end_line: end,
            text: lines[start..end].join("\n"),
        });
        if end == lines.len() {
            break;
        }
        start += step;
    }
    chunks
}
