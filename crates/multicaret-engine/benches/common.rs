// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use multicaret_engine::{CaretPosition, Document};

/// `lines` lines of text with one caret at the start of each line
#[allow(dead_code)]
pub fn document_with_line_carets(lines: usize) -> Document {
    let line = "The quick brown fox jumps over the lazy dog.\n";
    let mut doc = Document::new(&line.repeat(lines));
    let positions: Vec<CaretPosition> = (0..lines)
        .map(|i| CaretPosition::at(i * line.len()))
        .collect();
    doc.set_carets(&positions);
    doc
}

/// Overlapping carets: every caret selects the next ten bytes from its own offset
#[allow(dead_code)]
pub fn overlapping_positions(count: usize) -> Vec<CaretPosition> {
    (0..count)
        .map(|i| CaretPosition::new(i * 5, i * 5, i * 5 + 10).unwrap())
        .collect()
}
