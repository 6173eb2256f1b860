use serde::{Deserialize, Serialize};
use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::error::{EditorError, Result};

/// Which side of an edit a tracked offset sticks to when the edit lands exactly on it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StickyBias {
    /// Stay before inserted text
    Left,
    /// Move past inserted text
    Right,
}

/// One step of an edit script over the old text
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Segment {
    /// Keep `n` bytes unchanged
    Retain(usize),
    /// Replace `old` (which must be the current text) with `new`
    Replace { old: String, new: String },
}

/// Retain/replace edit script with composition, transformation and offset rebasing
///
/// Operations are always normalized: adjacent retains and replaces are merged, no-op
/// replacements become retains and the trailing retain is dropped. Every operation implicitly
/// retains whatever text follows its last segment, so the identity has no segments at all and
/// any operation can be composed with it regardless of document length.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Operation {
    segments: Vec<Segment>,
}

impl Operation {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut builder = SegmentsBuilder::default();
        for segment in segments {
            match segment {
                Segment::Retain(n) => builder.retain(n),
                Segment::Replace { old, new } => {
                    builder.delete(&old);
                    builder.insert(&new);
                }
            }
        }
        builder.finish()
    }

    pub fn insert(at: usize, text: &str) -> Self {
        Self::replace(at, "", text)
    }

    pub fn delete(at: usize, old: &str) -> Self {
        Self::replace(at, old, "")
    }

    pub fn replace(at: usize, old: &str, new: &str) -> Self {
        Self::from_segments([
            Segment::Retain(at),
            Segment::Replace {
                old: old.to_string(),
                new: new.to_string(),
            },
        ])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_identity(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether any replacement introduces a line break
    pub fn inserts_newline(&self) -> bool {
        self.segments.iter().any(|segment| match segment {
            Segment::Replace { new, .. } => new.contains(['\n', '\r']),
            Segment::Retain(_) => false,
        })
    }

    /// Ranges of replaced text, in post-edit offsets
    pub fn changed_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut changed = Vec::new();
        let mut new_pos = 0;
        for segment in &self.segments {
            match segment {
                Segment::Retain(n) => new_pos += n,
                Segment::Replace { new, .. } => {
                    changed.push(new_pos..new_pos + new.len());
                    new_pos += new.len();
                }
            }
        }
        changed
    }

    /// The operation that undoes this one
    pub fn invert(&self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .map(|segment| match segment {
                    Segment::Retain(n) => Segment::Retain(*n),
                    Segment::Replace { old, new } => Segment::Replace {
                        old: new.clone(),
                        new: old.clone(),
                    },
                })
                .collect(),
        }
    }

    /// Apply `self`, then `next`
    ///
    /// `next` must be expressed against the result of `self`. Where `next` deletes text that
    /// `self` inserted, the two texts must agree; otherwise this fails with `OperationMismatch`.
    pub fn compose(&self, next: &Operation) -> Result<Operation> {
        let mut first = Cursor::new(self);
        let mut second = Cursor::new(next);
        let mut out = SegmentsBuilder::default();
        // Offset into the text between the two operations
        let mut mid = 0;

        loop {
            match (first.peek(), second.peek()) {
                (None, None) => break,
                (Some(Component::Delete(text)), _) => {
                    out.delete(text);
                    first.advance();
                }
                (_, Some(Component::Insert(text))) => {
                    out.insert(text);
                    second.advance();
                }
                (None, Some(Component::Retain(n))) => {
                    out.retain(n);
                    mid += n;
                    second.advance();
                }
                (None, Some(Component::Delete(text))) => {
                    out.delete(text);
                    mid += text.len();
                    second.advance();
                }
                (Some(Component::Retain(n)), None) => {
                    out.retain(n);
                    mid += n;
                    first.advance();
                }
                (Some(Component::Insert(text)), None) => {
                    out.insert(text);
                    mid += text.len();
                    first.advance();
                }
                (Some(Component::Retain(n)), Some(Component::Retain(m))) => {
                    let len = n.min(m);
                    out.retain(len);
                    mid += len;
                    first.consume(len);
                    second.consume(len);
                }
                (Some(Component::Retain(n)), Some(Component::Delete(text))) => {
                    let len = n.min(text.len());
                    out.delete(prefix(text, len, mid)?);
                    mid += len;
                    first.consume(len);
                    second.consume(len);
                }
                (Some(Component::Insert(text)), Some(Component::Retain(m))) => {
                    let len = text.len().min(m);
                    out.insert(prefix(text, len, mid)?);
                    mid += len;
                    first.consume(len);
                    second.consume(len);
                }
                (Some(Component::Insert(inserted)), Some(Component::Delete(deleted))) => {
                    // Text inserted by `self` and deleted again by `next` cancels out
                    let len = inserted.len().min(deleted.len());
                    if inserted.get(..len) != deleted.get(..len) {
                        return Err(EditorError::OperationMismatch {
                            offset: mid,
                            reason: format!("deletes {deleted:?} where {inserted:?} was inserted"),
                        });
                    }
                    mid += len;
                    first.consume(len);
                    second.consume(len);
                }
            }
        }

        Ok(out.finish())
    }

    /// Transform two operations made against the same text
    ///
    /// Returns `(self', other')` where `self'` applies after `other` and `other'` applies after
    /// `self`; both orders produce the same text. When both insert at the same offset the text
    /// inserted by `self` comes first.
    pub fn transform(&self, other: &Operation) -> (Operation, Operation) {
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);
        let mut a_prime = SegmentsBuilder::default();
        let mut b_prime = SegmentsBuilder::default();

        loop {
            match (a.peek(), b.peek()) {
                (None, None) => break,
                (Some(Component::Insert(text)), _) => {
                    a_prime.insert(text);
                    b_prime.retain(text.len());
                    a.advance();
                }
                (_, Some(Component::Insert(text))) => {
                    b_prime.insert(text);
                    a_prime.retain(text.len());
                    b.advance();
                }
                (None, Some(Component::Retain(n))) => {
                    a_prime.retain(n);
                    b_prime.retain(n);
                    b.advance();
                }
                (None, Some(Component::Delete(text))) => {
                    b_prime.delete(text);
                    b.advance();
                }
                (Some(Component::Retain(n)), None) => {
                    a_prime.retain(n);
                    b_prime.retain(n);
                    a.advance();
                }
                (Some(Component::Delete(text)), None) => {
                    a_prime.delete(text);
                    a.advance();
                }
                (Some(Component::Retain(n)), Some(Component::Retain(m))) => {
                    let len = n.min(m);
                    a_prime.retain(len);
                    b_prime.retain(len);
                    a.consume(len);
                    b.consume(len);
                }
                (Some(Component::Delete(text)), Some(Component::Retain(m))) => {
                    let len = text.len().min(m);
                    a_prime.delete(&text[..len]);
                    a.consume(len);
                    b.consume(len);
                }
                (Some(Component::Retain(n)), Some(Component::Delete(text))) => {
                    let len = n.min(text.len());
                    b_prime.delete(&text[..len]);
                    a.consume(len);
                    b.consume(len);
                }
                (Some(Component::Delete(left)), Some(Component::Delete(right))) => {
                    // Both sides already removed this text
                    let len = left.len().min(right.len());
                    a.consume(len);
                    b.consume(len);
                }
            }
        }

        (a_prime.finish(), b_prime.finish())
    }

    /// Relocate an offset of the old text into the new text without looking at content
    pub fn map_offset(&self, offset: usize, bias: StickyBias) -> usize {
        let mut old_pos = 0;
        let mut new_pos = 0;
        for segment in &self.segments {
            match segment {
                Segment::Retain(n) => {
                    if offset < old_pos + n {
                        return new_pos + (offset - old_pos);
                    }
                    old_pos += n;
                    new_pos += n;
                }
                Segment::Replace { old, new } => {
                    if offset == old_pos || offset < old_pos + old.len() {
                        return match bias {
                            StickyBias::Left => new_pos,
                            StickyBias::Right => new_pos + new.len(),
                        };
                    }
                    old_pos += old.len();
                    new_pos += new.len();
                }
            }
        }
        new_pos + (offset - old_pos)
    }

    /// `map_offset` with the bias fixed, for handing to code that only rebases offsets
    pub fn rebasing(&self, bias: StickyBias) -> impl Fn(usize) -> usize + '_ {
        move |offset| self.map_offset(offset, bias)
    }

    /// Apply to a rope, checking every replaced span against the rope's current text
    pub fn apply(&self, text: &Rope) -> Result<Rope> {
        let len = text.len();
        let mut builder = Builder::new(len);
        let mut pos = 0;

        for segment in &self.segments {
            match segment {
                Segment::Retain(n) => pos += n,
                Segment::Replace { old, new } => {
                    let end = pos + old.len();
                    if end > len {
                        return Err(EditorError::OperationMismatch {
                            offset: pos,
                            reason: format!("replaced span ends at {end}, past length {len}"),
                        });
                    }
                    if let Some(offset) = [pos, end].into_iter().find(|&o| splits_char(text, o)) {
                        return Err(EditorError::OperationMismatch {
                            offset,
                            reason: "offset splits a character".to_string(),
                        });
                    }
                    let current = text.slice_to_cow(pos..end);
                    if current.as_ref() != old.as_str() {
                        return Err(EditorError::OperationMismatch {
                            offset: pos,
                            reason: format!("expected {old:?}, found {current:?}"),
                        });
                    }
                    if new.is_empty() {
                        builder.delete(pos..end);
                    } else {
                        builder.replace(pos..end, Rope::from(new.as_str()));
                    }
                    pos = end;
                }
            }
        }

        if pos > len {
            return Err(EditorError::OperationMismatch {
                offset: pos,
                reason: format!("retains past length {len}"),
            });
        }

        Ok(builder.build().apply(text))
    }
}

fn splits_char(text: &Rope, offset: usize) -> bool {
    offset > 0 && offset < text.len() && !text.is_codepoint_boundary(offset)
}

/// First `len` bytes of `text`, failing when `len` splits a character
fn prefix(text: &str, len: usize, offset: usize) -> Result<&str> {
    text.get(..len).ok_or_else(|| EditorError::OperationMismatch {
        offset,
        reason: format!("operations disagree on character boundaries in {text:?}"),
    })
}

/// Retain/insert/delete view of a segment, used while walking two operations in lockstep
#[derive(Clone, Copy, Debug)]
enum Component<'a> {
    Retain(usize),
    Insert(&'a str),
    Delete(&'a str),
}

impl<'a> Component<'a> {
    fn len(&self) -> usize {
        match self {
            Component::Retain(n) => *n,
            Component::Insert(text) | Component::Delete(text) => text.len(),
        }
    }

    fn skip(self, len: usize) -> Self {
        match self {
            Component::Retain(n) => Component::Retain(n - len),
            Component::Insert(text) => Component::Insert(&text[len..]),
            Component::Delete(text) => Component::Delete(&text[len..]),
        }
    }
}

struct Cursor<'a> {
    components: std::vec::IntoIter<Component<'a>>,
    head: Option<Component<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(op: &'a Operation) -> Self {
        let mut components = Vec::with_capacity(op.segments.len() * 2);
        for segment in &op.segments {
            match segment {
                Segment::Retain(n) => components.push(Component::Retain(*n)),
                Segment::Replace { old, new } => {
                    if !new.is_empty() {
                        components.push(Component::Insert(new));
                    }
                    if !old.is_empty() {
                        components.push(Component::Delete(old));
                    }
                }
            }
        }
        let mut components = components.into_iter();
        let head = components.next();
        Self { components, head }
    }

    fn peek(&self) -> Option<Component<'a>> {
        self.head
    }

    fn advance(&mut self) {
        self.head = self.components.next();
    }

    fn consume(&mut self, len: usize) {
        match self.head {
            Some(component) if component.len() > len => self.head = Some(component.skip(len)),
            _ => self.advance(),
        }
    }
}

#[derive(Default)]
struct SegmentsBuilder {
    segments: Vec<Segment>,
}

impl SegmentsBuilder {
    fn retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Retain(m)) => *m += n,
            _ => self.segments.push(Segment::Retain(n)),
        }
    }

    fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Replace { new, .. }) => new.push_str(text),
            _ => self.segments.push(Segment::Replace {
                old: String::new(),
                new: text.to_string(),
            }),
        }
    }

    fn delete(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Replace { old, .. }) => old.push_str(text),
            _ => self.segments.push(Segment::Replace {
                old: text.to_string(),
                new: String::new(),
            }),
        }
    }

    fn finish(self) -> Operation {
        let mut segments: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments {
            let segment = match segment {
                Segment::Replace { old, new } if old == new => Segment::Retain(old.len()),
                other => other,
            };
            match segment {
                Segment::Retain(0) => {}
                Segment::Retain(n) => match segments.last_mut() {
                    Some(Segment::Retain(m)) => *m += n,
                    _ => segments.push(Segment::Retain(n)),
                },
                replace => segments.push(replace),
            }
        }
        if let Some(Segment::Retain(_)) = segments.last() {
            segments.pop();
        }
        Operation { segments }
    }
}
