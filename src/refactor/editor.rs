use crate::graph::{ByteRange, DeclarationId};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EditError {
    #[error("edits for {first} ({first_range:?}) and {second} ({second_range:?}) overlap without nesting")]
    #[diagnostic(code(testprune::emit::overlapping_edits))]
    Overlap {
        first: DeclarationId,
        first_range: ByteRange,
        second: DeclarationId,
        second_range: ByteRange,
    },

    #[error("edit for {owner} ({range:?}) is outside the source or splits a character")]
    #[diagnostic(code(testprune::emit::invalid_range))]
    InvalidRange { owner: DeclarationId, range: ByteRange },
}

/// One pending replacement of a byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub owner: DeclarationId,
    pub range: ByteRange,
    pub replacement: String,
}

/// Collects edits against one source text and applies them in a single
/// pass. Edits nested inside another edit are dropped; edits that cross
/// each other are an error.
pub struct SourceEditor<'s> {
    source: &'s str,
    edits: Vec<Edit>,
}

impl<'s> SourceEditor<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    /// Remove a range of bytes
    pub fn remove(&mut self, owner: &DeclarationId, range: ByteRange) {
        self.replace(owner, range, String::new());
    }

    /// Replace a range of text
    pub fn replace(&mut self, owner: &DeclarationId, range: ByteRange, replacement: impl Into<String>) {
        self.edits.push(Edit {
            owner: owner.clone(),
            range,
            replacement: replacement.into(),
        });
    }

    /// Remove a declaration's extent together with its indentation and one
    /// trailing newline when it sits on lines of its own
    pub fn remove_lines_of(&mut self, owner: &DeclarationId, range: ByteRange) {
        let expanded = expand_to_lines(self.source, range);
        self.remove(owner, expanded);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply(mut self) -> Result<String, EditError> {
        for edit in &self.edits {
            let r = edit.range;
            if r.start > r.end
                || r.end > self.source.len()
                || !self.source.is_char_boundary(r.start)
                || !self.source.is_char_boundary(r.end)
            {
                return Err(EditError::InvalidRange {
                    owner: edit.owner.clone(),
                    range: r,
                });
            }
        }

        // outer edits first so nested ones can be recognised and dropped
        self.edits
            .sort_by(|a, b| a.range.start.cmp(&b.range.start).then(b.range.end.cmp(&a.range.end)));

        let mut kept: Vec<Edit> = Vec::with_capacity(self.edits.len());
        for edit in self.edits {
            if let Some(last) = kept.last() {
                if last.range.encloses(&edit.range) && !edit.range.is_empty() {
                    continue;
                }
                if last.range == edit.range {
                    continue;
                }
                if edit.range.start < last.range.end {
                    return Err(EditError::Overlap {
                        first: last.owner.clone(),
                        first_range: last.range,
                        second: edit.owner,
                        second_range: edit.range,
                    });
                }
            }
            kept.push(edit);
        }

        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for edit in &kept {
            out.push_str(&self.source[cursor..edit.range.start]);
            out.push_str(&edit.replacement);
            cursor = edit.range.end;
        }
        out.push_str(&self.source[cursor..]);
        Ok(out)
    }
}

/// Grow a range over the indentation before it and the line break after
/// it, but only when nothing else shares those lines
pub fn expand_to_lines(source: &str, range: ByteRange) -> ByteRange {
    let bytes = source.as_bytes();
    let mut start = range.start;
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    let at_line_start = start == 0 || bytes[start - 1] == b'\n';
    if !at_line_start {
        start = range.start;
    }

    let mut end = range.end;
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\r' {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    } else if end < bytes.len() {
        // something follows on the same line
        end = range.end;
    }

    if !at_line_start {
        // keep the newline so the preceding code stays on its own line
        end = range.end;
        while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
            end += 1;
        }
        if end >= bytes.len() || bytes[end] == b'\n' || bytes[end] == b'\r' {
            return ByteRange::new(range.start, end);
        }
        return range;
    }
    ByteRange::new(start, end)
}
