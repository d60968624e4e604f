//! Splitting model output into prose and fenced code.
//!
//! Segmentation is lossless: [`reassemble`] puts the fences back and yields
//! the original text byte for byte.  Trimming is a rendering decision and
//! never happens here.

/// The code fence delimiter.
pub const FENCE: &str = "```";

/// A fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Everything between the opening fence and the first newline.
    pub info: String,
    /// Everything after the first newline, up to the closing fence.
    pub body: String,
    /// The fenced text had no newline at all; `info` is empty and `body` holds
    /// the whole piece.
    pub inline: bool,
}

impl CodeBlock {
    /// The declared language, if the info string names one.
    pub fn language(&self) -> Option<&str> {
        let tag = self.info.trim();
        if tag.is_empty() { None } else { Some(tag) }
    }

    /// True when there is nothing between the fences.
    pub fn is_empty(&self) -> bool {
        self.info.is_empty() && self.body.is_empty()
    }

    /// The exact text that sat between the two fences.
    pub fn raw(&self) -> String {
        if self.inline {
            self.body.clone()
        } else {
            format!("{}\n{}", self.info, self.body)
        }
    }

    fn parse(piece: &str) -> Self {
        match piece.split_once('\n') {
            Some((info, body)) => Self {
                info: info.to_string(),
                body: body.to_string(),
                inline: false,
            },
            None => Self {
                info: String::new(),
                body: piece.to_string(),
                inline: true,
            },
        }
    }
}

/// One contiguous unit of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text outside any fence.
    Prose(String),
    /// A fenced code block.
    Code(CodeBlock),
}

/// The result of segmenting a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// Segments in the order they appear.
    pub segments: Vec<Segment>,
    /// The text ended inside an unclosed fence.  The dangling fence and what
    /// follows it were kept as prose.
    pub unterminated_fence: bool,
}

/// Splits `text` into alternating prose and code segments.
pub fn segment(text: &str) -> Segmentation {
    let pieces: Vec<&str> = text.split(FENCE).collect();
    // An even number of pieces means an odd number of fences.
    let unterminated_fence = pieces.len() % 2 == 0;
    let mut segments = Vec::with_capacity(pieces.len());

    for (idx, piece) in pieces.iter().enumerate() {
        if idx % 2 == 0 {
            if !piece.is_empty() {
                segments.push(Segment::Prose(piece.to_string()));
            }
        } else if unterminated_fence && idx == pieces.len() - 1 {
            segments.push(Segment::Prose(format!("{FENCE}{piece}")));
        } else {
            segments.push(Segment::Code(CodeBlock::parse(piece)));
        }
    }

    if unterminated_fence {
        tracing::debug!(
            fences = pieces.len() - 1,
            "response ends inside an unterminated code fence"
        );
    }

    Segmentation {
        segments,
        unterminated_fence,
    }
}

/// Rebuilds the original text from its segments.
pub fn reassemble(segments: &[Segment]) -> String {
    let mut text = String::new();
    for segment in segments {
        match segment {
            Segment::Prose(prose) => text.push_str(prose),
            Segment::Code(block) => {
                text.push_str(FENCE);
                text.push_str(&block.raw());
                text.push_str(FENCE);
            }
        }
    }
    text
}
