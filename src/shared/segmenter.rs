use super::dialect::Dialect;
use super::language::is_hebrew_dominant;
use super::models::{Segment, SegmentKind};

/// Scanner state between lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Plain,
    InCode(Dialect),
}

/// Classification of a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Blank,
    Hebrew,
    OtherText,
    Code(Dialect),
}

impl LineClass {
    fn kind(&self) -> Option<SegmentKind> {
        match self {
            LineClass::Blank => None,
            LineClass::Hebrew => Some(SegmentKind::Hebrew),
            LineClass::OtherText => Some(SegmentKind::OtherText),
            LineClass::Code(_) => Some(SegmentKind::Code),
        }
    }
}

/// Classify `line` given the state left by the previous line and the line
/// that follows it.
///
/// Blank lines never change state. A closing line is still code; the state
/// drops back to `Plain` for the line after it. Because lookahead is one
/// line and blank lines are skipped, a block followed by a blank line and
/// then prose stays open and swallows that prose.
pub fn step(state: ScanState, line: &str, next: Option<&str>) -> (ScanState, LineClass) {
    if line.trim().is_empty() {
        return (state, LineClass::Blank);
    }

    let state = match state {
        ScanState::Plain => Dialect::detect_start(line)
            .map(ScanState::InCode)
            .unwrap_or(ScanState::Plain),
        in_code => in_code,
    };

    match state {
        ScanState::InCode(dialect) => {
            let next_state = if dialect.ends_block(line, next) {
                ScanState::Plain
            } else {
                state
            };
            (next_state, LineClass::Code(dialect))
        }
        ScanState::Plain if is_hebrew_dominant(line) => (ScanState::Plain, LineClass::Hebrew),
        ScanState::Plain => (ScanState::Plain, LineClass::OtherText),
    }
}

struct Buffer<'a> {
    kind: SegmentKind,
    dialect: Option<Dialect>,
    lines: Vec<&'a str>,
}

impl Buffer<'_> {
    fn into_segment(self) -> Segment {
        Segment {
            kind: self.kind,
            text: self.lines.join("\n").trim().to_string(),
            dialect: self.dialect,
        }
    }
}

/// Split text into ordered hebrew / other-text / code segments.
pub fn segment(text: &str) -> Vec<Segment> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut segments = Vec::new();
    let mut state = ScanState::Plain;
    let mut current: Option<Buffer> = None;

    for (i, line) in lines.iter().enumerate() {
        let next = lines.get(i + 1).copied();
        let (next_state, class) = step(state, line, next);
        state = next_state;

        let Some(kind) = class.kind() else {
            // leading blank lines are dropped, later ones stay in the buffer
            if let Some(buffer) = current.as_mut() {
                buffer.lines.push(line);
            }
            continue;
        };

        if let Some(buffer) = current.as_mut()
            && buffer.kind == kind
        {
            buffer.lines.push(line);
            continue;
        }

        if let Some(done) = current.take() {
            segments.push(done.into_segment());
        }
        let dialect = match class {
            LineClass::Code(dialect) => Some(dialect),
            _ => None,
        };
        current = Some(Buffer {
            kind,
            dialect,
            lines: vec![line],
        });
    }

    if let Some(done) = current {
        segments.push(done.into_segment());
    }

    segments
}
