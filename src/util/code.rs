use crate::{Code, Position};
use once_cell::unsync::OnceCell;

impl<'c> From<&'c [u8]> for Code<'c> {
    fn from(value: &'c [u8]) -> Self {
        Code::new(value)
    }
}
impl<'c> From<&'c str> for Code<'c> {
    fn from(value: &'c str) -> Self {
        Code::new(value.as_bytes())
    }
}

impl<'c> Code<'c> {
    pub fn new(value: &'c [u8]) -> Self {
        Self {
            value,
            line_table: OnceCell::new(),
        }
    }

    /// The `(start, end)` byte span of every line, line breaks excluded.
    /// An empty input still has one empty line.
    fn obtain_line_table(&self) -> &Vec<(usize, usize)> {
        self.line_table.get_or_init(|| {
            let mut spans = Vec::new();
            let mut line_start = 0;
            for (offset, byte) in self.value.iter().enumerate() {
                if *byte == b'\n' {
                    spans.push((line_start, offset));
                    line_start = offset + 1;
                }
            }
            spans.push((line_start, self.value.len()));
            spans
        })
    }

    /// The 1-based line and column of a byte offset. A pointer on a line break
    /// counts as one past the end of its line.
    pub fn obtain_position(&self, pointer: usize) -> Position {
        let spans = self.obtain_line_table();
        let index = spans
            .partition_point(|(start, _)| *start <= pointer)
            .saturating_sub(1);
        let (start, _) = spans[index];
        Position::new(index + 1, pointer - start + 1)
    }

    /// Number of lines of the input. An empty input has a single empty line.
    pub fn line_count(&self) -> usize {
        self.obtain_line_table().len()
    }

    /// Byte span of the 0-based line `index`, excluding the line break.
    pub fn line_span(&self, index: usize) -> Option<(usize, usize)> {
        self.obtain_line_table().get(index).copied()
    }

    /// Bytes of the 0-based line `index`, excluding the line break.
    pub fn line(&self, index: usize) -> Option<&'c [u8]> {
        let (start, end) = self.line_span(index)?;
        Some(&self.value[start..end])
    }
}
