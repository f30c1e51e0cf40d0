//! Overlapping windows over a document's text.
//!
//! Offsets are in characters. Internally the iterator keeps a table of char
//! boundaries so slicing stays on valid UTF-8.

/// How far before a cut point a paragraph break may pull the boundary back.
pub const PARAGRAPH_TOLERANCE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    /// Inclusive start, in characters.
    pub start: usize,
    /// Exclusive end, in characters.
    pub end: usize,
    pub overlaps_previous: bool,
    pub text: &'a str,
}

/// Lazy chunk sequence. Cloning restarts from the clone point, and calling
/// [`chunk`] again with the same inputs yields the same sequence.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` at the end.
    boundaries: std::sync::Arc<[usize]>,
    size: usize,
    overlap: usize,
    next_start: Option<usize>,
    index: usize,
}

/// Split `text` into windows of at most `size` characters, each starting
/// `overlap` characters before the previous one ended.
///
/// `size` must be non-zero and `overlap` smaller than `size`; out of range
/// values are clamped so the sequence always makes progress.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Chunks<'_> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let boundaries: std::sync::Arc<[usize]> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    Chunks {
        text,
        boundaries,
        size,
        overlap,
        next_start: Some(0),
        index: 0,
    }
}

impl<'a> Chunks<'a> {
    fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.boundaries[start]..self.boundaries[end]]
    }

    /// Pull a hard cut back to just after a paragraph break when one sits
    /// inside the tolerance window and the result still advances past the
    /// overlap region.
    fn soft_cut(&self, start: usize, hard_end: usize) -> usize {
        let tolerance = PARAGRAPH_TOLERANCE.min(self.size / 10);
        let floor = (hard_end - tolerance).max(start + self.overlap + 1);
        if floor >= hard_end {
            return hard_end;
        }
        let window = self.slice(floor, hard_end);
        match window.rfind("\n\n") {
            Some(byte_pos) => {
                let cut_byte = self.boundaries[floor] + byte_pos + 2;
                // Convert back to a char offset.
                match self.boundaries.binary_search(&cut_byte) {
                    Ok(char_pos) if char_pos > floor && char_pos <= hard_end => char_pos,
                    _ => hard_end,
                }
            }
            None => hard_end,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let start = self.next_start?;
        let total = self.char_len();
        let hard_end = (start + self.size).min(total);

        let end = if hard_end == total {
            self.next_start = None;
            total
        } else {
            let end = self.soft_cut(start, hard_end);
            self.next_start = Some(end - self.overlap);
            end
        };

        let chunk = Chunk {
            index: self.index,
            start,
            end,
            overlaps_previous: self.index > 0,
            text: self.slice(start, end),
        };
        self.index += 1;
        Some(chunk)
    }
}
