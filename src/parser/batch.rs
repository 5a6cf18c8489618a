use super::comments::{self, CommentSpan};

/// One executable unit of a script, produced in order and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub text: String,
}

/// A batch break: the current batch ends at `end` and the next one starts at
/// `resume`. The gap between the two is the delimiter line being trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBoundary {
    pub end: usize,
    pub resume: usize,
}

/// Detects batch-terminator lines in raw text, given precomputed comment
/// spans. Terminators inside comments or string literals never split.
pub trait BatchLineAnalyzer: Send + Sync {
    fn boundaries(&self, text: &str, comments: &[CommentSpan]) -> Vec<BatchBoundary>;
}

/// T-SQL style: a line containing only `GO` (any case, surrounding whitespace
/// allowed) ends a batch. The GO line itself is excluded from the output.
pub struct GoBatchLineAnalyzer;

impl BatchLineAnalyzer for GoBatchLineAnalyzer {
    fn boundaries(&self, text: &str, comments: &[CommentSpan]) -> Vec<BatchBoundary> {
        let literals = literal_spans(text, comments, false);
        let mut boundaries = Vec::new();

        for line in lines_with_offsets(text) {
            let trimmed = line.content.trim();
            if !trimmed.eq_ignore_ascii_case("go") {
                continue;
            }
            let token_position =
                line.start + (line.content.len() - line.content.trim_start().len());
            if in_comment(comments, token_position) || in_span(&literals, token_position) {
                continue;
            }
            boundaries.push(BatchBoundary {
                end: line.start,
                resume: line.start + line.raw_len,
            });
        }

        boundaries
    }
}

/// Semicolon style: a `;` at end of line outside comments and literals ends a
/// batch, with the terminator retained in the batch text. Literal awareness
/// includes PostgreSQL dollar-quoted bodies.
pub struct SemicolonBatchLineAnalyzer;

impl BatchLineAnalyzer for SemicolonBatchLineAnalyzer {
    fn boundaries(&self, text: &str, comments: &[CommentSpan]) -> Vec<BatchBoundary> {
        let literals = literal_spans(text, comments, true);
        let mut boundaries = Vec::new();

        for line in lines_with_offsets(text) {
            let trimmed = line.content.trim_end();
            if !trimmed.ends_with(';') {
                continue;
            }
            let terminator_position = line.start + trimmed.len() - 1;
            if in_comment(comments, terminator_position) || in_span(&literals, terminator_position)
            {
                continue;
            }
            boundaries.push(BatchBoundary {
                end: terminator_position + 1,
                resume: line.start + line.raw_len,
            });
        }

        boundaries
    }
}

/// Splits raw script text into ordered executable batches.
///
/// Comment spans are computed once, boundary positions come from the
/// configured analyzer variant, and the text is sliced at those boundaries
/// with only the delimiter trimmed. Whitespace-only fragments are dropped, so
/// a trailing empty batch never appears.
pub struct SqlBatchParser {
    analyzer: Box<dyn BatchLineAnalyzer>,
}

impl SqlBatchParser {
    pub fn go() -> Self {
        Self {
            analyzer: Box::new(GoBatchLineAnalyzer),
        }
    }

    pub fn semicolon() -> Self {
        Self {
            analyzer: Box::new(SemicolonBatchLineAnalyzer),
        }
    }

    pub fn parse(&self, text: &str) -> Vec<Batch> {
        let comment_spans = comments::scan(text);
        let boundaries = self.analyzer.boundaries(text, &comment_spans);

        let mut batches = Vec::new();
        let mut start = 0;
        for boundary in boundaries {
            push_batch(&mut batches, &text[start..boundary.end]);
            start = boundary.resume;
        }
        push_batch(&mut batches, &text[start..]);
        batches
    }
}

fn push_batch(batches: &mut Vec<Batch>, fragment: &str) {
    if !fragment.trim().is_empty() {
        batches.push(Batch {
            text: fragment.to_string(),
        });
    }
}

struct Line<'a> {
    start: usize,
    /// Line content without its terminator
    content: &'a str,
    /// Length including the terminator
    raw_len: usize,
}

fn lines_with_offsets(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        Line {
            start,
            content: raw.trim_end_matches('\n').trim_end_matches('\r'),
            raw_len: raw.len(),
        }
    })
}

fn in_comment(comments: &[CommentSpan], position: usize) -> bool {
    comments.iter().any(|span| span.contains(position))
}

fn in_span(spans: &[(usize, usize)], position: usize) -> bool {
    spans
        .iter()
        .any(|&(start, end)| position >= start && position < end)
}

/// String-literal ranges outside comments: single-quoted (with `''` escaping)
/// and, when `dollar_quotes` is set, `$tag$ ... $tag$` bodies.
fn literal_spans(text: &str, comments: &[CommentSpan], dollar_quotes: bool) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if let Some(span) = comments.iter().find(|span| span.contains(i)) {
            i = span.end;
            continue;
        }
        match bytes[i] {
            b'\'' => {
                let start = i;
                i += 1;
                loop {
                    if i >= bytes.len() {
                        break;
                    }
                    if bytes[i] == b'\'' {
                        if bytes.get(i + 1) == Some(&b'\'') {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                spans.push((start, i));
            }
            b'$' if dollar_quotes => {
                if let Some(tag_len) = dollar_tag_len(&text[i..]) {
                    let start = i;
                    let tag = &text[i..i + tag_len];
                    i += tag_len;
                    match text[i..].find(tag) {
                        Some(found) => i += found + tag_len,
                        None => i = bytes.len(),
                    }
                    spans.push((start, i));
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    spans
}

/// Length of a dollar-quote opener (`$$` or `$tag$`) at the start of `text`,
/// if one is present.
fn dollar_tag_len(text: &str) -> Option<usize> {
    let rest = text.strip_prefix('$')?;
    let close = rest.find('$')?;
    if rest[..close].chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(close + 2)
    } else {
        None
    }
}
