use std::ops::Range;

/// The six placeholder kinds, each written as `?` followed by a marker letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `?n`: identifier (table or column name)
    Ident,
    /// `?s`: string literal
    Str,
    /// `?i`: integer
    Int,
    /// `?a`: comma-separated list, typically for `IN (...)`
    List,
    /// `?u`: `col=value` assignments for `SET`
    Set,
    /// `?p`: pre-built SQL inserted verbatim
    Raw,
}

impl Placeholder {
    pub(super) fn from_marker(b: u8) -> Option<Self> {
        match b {
            b'n' => Some(Placeholder::Ident),
            b's' => Some(Placeholder::Str),
            b'i' => Some(Placeholder::Int),
            b'a' => Some(Placeholder::List),
            b'u' => Some(Placeholder::Set),
            b'p' => Some(Placeholder::Raw),
            _ => None,
        }
    }

    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Placeholder::Ident => "?n",
            Placeholder::Str => "?s",
            Placeholder::Int => "?i",
            Placeholder::List => "?a",
            Placeholder::Set => "?u",
            Placeholder::Raw => "?p",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Segment {
    Literal(Range<usize>),
    Placeholder(Placeholder),
}

/// Split a template into literal byte ranges and placeholders, left to right.
///
/// Quotes and comments are not tracked: a `?s` inside a string literal is still a placeholder.
pub(super) fn scan(template: &str) -> Vec<Segment> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] == b'?'
            && let Some(kind) = bytes.get(idx + 1).copied().and_then(Placeholder::from_marker)
        {
            if literal_start < idx {
                segments.push(Segment::Literal(literal_start..idx));
            }
            segments.push(Segment::Placeholder(kind));
            idx += 2;
            literal_start = idx;
            continue;
        }
        idx += 1;
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(literal_start..bytes.len()));
    }
    segments
}

pub(super) fn count(segments: &[Segment]) -> usize {
    segments
        .iter()
        .filter(|segment| matches!(segment, Segment::Placeholder(_)))
        .count()
}
