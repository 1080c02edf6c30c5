//! Common payloads for dropbind tests

/// Deterministic binary payload of `len` bytes
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Text payload made of numbered lines
pub fn numbered_lines(count: usize) -> String {
    (0..count)
        .map(|i| format!("Line {}: test data\n", i))
        .collect()
}

/// Split `data` into consecutive chunks of the given sizes, then the rest
pub fn split_chunks<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut rest = data;
    for &size in sizes {
        let size = size.min(rest.len());
        let (head, tail) = rest.split_at(size);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}
