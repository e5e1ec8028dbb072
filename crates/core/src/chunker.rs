//! Splits raw file text into line-aligned segments under a size cap.

/// Target upper bound on chunk size, in characters.
pub const MAX_CHUNK_CHARS: usize = 1000;

/// Splits `text` into chunks of at most `max_chars` characters without ever
/// breaking a line across chunks. A single line longer than `max_chars`
/// becomes its own oversized chunk rather than being split mid-line. Chunks
/// that contain only whitespace are skipped.
pub fn chunk_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        // +1 for the newline that joins the line onto the chunk.
        if !current.is_empty() && current.len() + line.len() + 1 > max_chars {
            push_chunk(&mut chunks, &mut current);
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    push_chunk(&mut chunks, &mut current);

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        chunks.push(std::mem::take(current));
    } else {
        current.clear();
    }
}
