//! Tree-difference parsers for `--raw` and `--name-status` output.
//!
//! Both the NUL-terminated (`-z`) and the newline flavour are supported.
//! In the newline flavour paths may be C-quoted and are unquoted here.
//! A `*` at a record start ends the stream cleanly.

use crate::quote::unquote_path;
use crate::record::{find, line_end, parse_id, parse_mode, scan_records, split_fields, Step};
use crate::{ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::{ByteBuffer, FileMode, ObjectId, StringUtf8};
use smallvec::SmallVec;
use std::ops::Range;

/// Before and after state of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Path after the change.
    pub path: StringUtf8,
    /// Mode before; [`FileMode::NONE`] when the path did not exist.
    pub old_mode: FileMode,
    /// Mode after; [`FileMode::NONE`] when the path was removed.
    pub new_mode: FileMode,
    /// Blob before; [`ObjectId::ZERO`] when absent or not reported.
    pub old_id: ObjectId,
    /// Blob after; [`ObjectId::ZERO`] when absent or not reported.
    pub new_id: ObjectId,
}

/// A rename or copy between two paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedEntry {
    /// The change, keyed by the destination path.
    pub change: Change,
    /// Source path.
    pub original_path: StringUtf8,
    /// Similarity in percent; 0 when the stream did not report it.
    pub confidence: u8,
}

/// How a merge result differs from one of its parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentChangeKind {
    /// Added relative to this parent.
    Added,
    /// Deleted relative to this parent.
    Deleted,
    /// Content changed relative to this parent.
    Modified,
    /// File type changed relative to this parent.
    TypeChanged,
    /// Unmerged.
    Unmerged,
    /// Unknown change.
    Unknown,
    /// Renamed relative to this parent. Combined diffs carry no detail.
    RenamedInParent,
    /// Copied relative to this parent. Combined diffs carry no detail.
    CopiedInParent,
}

impl ParentChangeKind {
    fn from_letter(letter: u8) -> Option<Self> {
        Some(match letter {
            b'A' => Self::Added,
            b'D' => Self::Deleted,
            b'M' => Self::Modified,
            b'T' => Self::TypeChanged,
            b'U' => Self::Unmerged,
            b'X' => Self::Unknown,
            b'R' => Self::RenamedInParent,
            b'C' => Self::CopiedInParent,
            _ => return None,
        })
    }
}

/// One parent's side of a combined (merge) diff record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChange {
    /// What happened relative to this parent.
    pub kind: ParentChangeKind,
    /// Mode in this parent.
    pub old_mode: FileMode,
    /// Blob in this parent.
    pub old_id: ObjectId,
}

/// A path changed by a merge, compared against every parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    /// Path in the merge result.
    pub path: StringUtf8,
    /// Mode in the merge result.
    pub new_mode: FileMode,
    /// Blob in the merge result.
    pub new_id: ObjectId,
    /// One change per parent, in parent order.
    pub parents: SmallVec<[ParentChange; 2]>,
}

/// One per-path record of a tree difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDifferenceEntry {
    /// Path added.
    Added(Change),
    /// Path deleted.
    Deleted(Change),
    /// Content or mode changed.
    Modified(Change),
    /// File type changed.
    TypeChanged(Change),
    /// Path is unmerged.
    Unmerged(Change),
    /// Change of unknown kind.
    Unknown(Change),
    /// Path renamed.
    Renamed(RenamedEntry),
    /// Path copied.
    Copied(RenamedEntry),
    /// Path changed by a merge.
    Merged(MergedEntry),
}

impl TreeDifferenceEntry {
    /// The path after the change.
    pub fn path(&self) -> &StringUtf8 {
        match self {
            Self::Added(c)
            | Self::Deleted(c)
            | Self::Modified(c)
            | Self::TypeChanged(c)
            | Self::Unmerged(c)
            | Self::Unknown(c) => &c.path,
            Self::Renamed(r) | Self::Copied(r) => &r.change.path,
            Self::Merged(m) => &m.path,
        }
    }

    /// Similarity of a rename or copy.
    pub fn confidence(&self) -> Option<u8> {
        match self {
            Self::Renamed(r) | Self::Copied(r) => Some(r.confidence),
            _ => None,
        }
    }

    /// The single-letter status git uses for this kind of record.
    pub fn status_char(&self) -> char {
        match self {
            Self::Added(_) => 'A',
            Self::Deleted(_) => 'D',
            Self::Modified(_) => 'M',
            Self::TypeChanged(_) => 'T',
            Self::Unmerged(_) => 'U',
            Self::Unknown(_) => 'X',
            Self::Renamed(_) => 'R',
            Self::Copied(_) => 'C',
            Self::Merged(_) => 'm',
        }
    }
}

/// Ordered per-path changes between trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDifference {
    /// Entries in stream order.
    pub entries: Vec<TreeDifferenceEntry>,
}

impl TreeDifference {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in stream order.
    pub fn iter(&self) -> std::slice::Iter<'_, TreeDifferenceEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for TreeDifference {
    type Item = TreeDifferenceEntry;
    type IntoIter = std::vec::IntoIter<TreeDifferenceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Output format being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFormat {
    /// `--raw`, including combined `-c` output for merges.
    Raw,
    /// `--name-status`; single-parent only.
    NameStatus,
}

/// Field positions of one record.
struct Located {
    meta_end: usize,
    paths: SmallVec<[Range<usize>; 2]>,
    next: usize,
}

/// Parses `diff-tree`/`diff` raw or name-status output.
pub struct TreeDifferenceParser {
    format: DiffFormat,
    nul_terminated: bool,
    entries: Vec<TreeDifferenceEntry>,
}

impl TreeDifferenceParser {
    /// Parser for `--raw` output; `nul_terminated` for `-z`.
    pub fn raw(nul_terminated: bool) -> Self {
        Self::new(DiffFormat::Raw, nul_terminated)
    }

    /// Parser for `--name-status` output; `nul_terminated` for `-z`.
    pub fn name_status(nul_terminated: bool) -> Self {
        Self::new(DiffFormat::NameStatus, nul_terminated)
    }

    /// Creates a parser for `format`.
    pub fn new(format: DiffFormat, nul_terminated: bool) -> Self {
        Self {
            format,
            nul_terminated,
            entries: Vec::new(),
        }
    }

    fn record(&mut self, buffer: &ByteBuffer, at: usize, at_eof: bool) -> Result<Step> {
        let first = buffer[at];
        if first == b'*' {
            return Ok(Step::Terminator(at + 1));
        }
        let valid_start = match self.format {
            DiffFormat::Raw => first == b':',
            DiffFormat::NameStatus => first.is_ascii_uppercase(),
        };
        if !valid_start {
            return Ok(Step::NoMatch);
        }

        let format = self.format;
        let Some(loc) = self.locate(buffer, at, at_eof, |meta| has_two_paths(format, meta))? else {
            return Ok(Step::Incomplete);
        };

        let entry = match self.format {
            DiffFormat::Raw => self.raw_entry(buffer, at, &loc)?,
            DiffFormat::NameStatus => self.name_status_entry(buffer, at, &loc)?,
        };
        self.entries.push(entry);
        Ok(Step::Record(loc.next))
    }

    fn locate<F>(&self, buffer: &ByteBuffer, at: usize, at_eof: bool, two_paths: F) -> Result<Option<Located>>
    where
        F: Fn(&[u8]) -> bool,
    {
        if self.nul_terminated {
            let Some(meta_end) = find(buffer, 0, at) else {
                return Ok(None);
            };
            let count = if two_paths(&buffer[at..meta_end]) { 2 } else { 1 };
            let mut paths = SmallVec::new();
            let mut cursor = meta_end + 1;
            for _ in 0..count {
                let Some(end) = find(buffer, 0, cursor) else {
                    return Ok(None);
                };
                paths.push(cursor..end);
                cursor = end + 1;
            }
            return Ok(Some(Located {
                meta_end,
                paths,
                next: cursor,
            }));
        }

        let Some((end, next)) = line_end(buffer, b'\n', at, at_eof) else {
            return Ok(None);
        };
        let expected_tab = || ParseError::at(ParseErrorKind::Expected("tab"), buffer.as_slice(), at);
        let meta_end = buffer.find_byte(b'\t', at..end).ok_or_else(expected_tab)?;
        let mut paths = SmallVec::new();
        if two_paths(&buffer[at..meta_end]) {
            let split = buffer
                .find_byte(b'\t', meta_end + 1..end)
                .ok_or_else(expected_tab)?;
            paths.push(meta_end + 1..split);
            paths.push(split + 1..end);
        } else {
            paths.push(meta_end + 1..end);
        }
        Ok(Some(Located {
            meta_end,
            paths,
            next,
        }))
    }

    fn path(&self, buffer: &ByteBuffer, range: Range<usize>) -> Result<StringUtf8> {
        if self.nul_terminated {
            Ok(buffer.to_utf8(range))
        } else {
            let start = range.start;
            unquote_path(&buffer[range], start)
        }
    }

    fn raw_entry(&self, buffer: &ByteBuffer, at: usize, loc: &Located) -> Result<TreeDifferenceEntry> {
        let meta = &buffer[at..loc.meta_end];
        let parents = meta.iter().take_while(|&&b| b == b':').count();
        let sides = parents + 1;
        let base = at + parents;
        let fields = split_fields(&meta[parents..], b' ', 2 * sides + 1);
        if fields.len() != 2 * sides + 1 {
            return Err(ParseError::new(
                ParseErrorKind::Expected("mode, id and status fields"),
                at,
                meta,
            ));
        }

        let modes = fields[..sides]
            .iter()
            .map(|&(off, f)| parse_mode(f, base + off))
            .collect::<Result<SmallVec<[FileMode; 3]>>>()?;
        let ids = fields[sides..2 * sides]
            .iter()
            .map(|&(off, f)| parse_id(f, base + off))
            .collect::<Result<SmallVec<[ObjectId; 3]>>>()?;
        let (status_off, status) = fields[2 * sides];
        let status_off = base + status_off;

        let path = self.path(buffer, loc.paths[loc.paths.len() - 1].clone())?;

        if parents > 1 {
            // Combined diffs never carry a score; digits are ignored.
            let letters: SmallVec<[u8; 4]> =
                status.iter().copied().filter(|b| !b.is_ascii_digit()).collect();
            if letters.len() != parents {
                return Err(ParseError::new(
                    ParseErrorKind::Expected("one status letter per parent"),
                    status_off,
                    status,
                ));
            }
            let mut changes = SmallVec::with_capacity(parents);
            for (i, &letter) in letters.iter().enumerate() {
                let kind = ParentChangeKind::from_letter(letter).ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::UnknownStatus(char::from(letter)),
                        status_off,
                        status,
                    )
                })?;
                changes.push(ParentChange {
                    kind,
                    old_mode: modes[i],
                    old_id: ids[i],
                });
            }
            return Ok(TreeDifferenceEntry::Merged(MergedEntry {
                path,
                new_mode: modes[parents],
                new_id: ids[parents],
                parents: changes,
            }));
        }

        let original = if loc.paths.len() == 2 {
            Some(self.path(buffer, loc.paths[0].clone())?)
        } else {
            None
        };
        let change = Change {
            path,
            old_mode: modes[0],
            new_mode: modes[1],
            old_id: ids[0],
            new_id: ids[1],
        };
        single_parent_entry(change, original, status, status_off)
    }

    fn name_status_entry(
        &self,
        buffer: &ByteBuffer,
        at: usize,
        loc: &Located,
    ) -> Result<TreeDifferenceEntry> {
        let status = &buffer[at..loc.meta_end];
        let path = self.path(buffer, loc.paths[loc.paths.len() - 1].clone())?;
        let original = if loc.paths.len() == 2 {
            Some(self.path(buffer, loc.paths[0].clone())?)
        } else {
            None
        };
        let change = Change {
            path,
            old_mode: FileMode::NONE,
            new_mode: FileMode::NONE,
            old_id: ObjectId::ZERO,
            new_id: ObjectId::ZERO,
        };
        single_parent_entry(change, original, status, at)
    }
}

/// Whether a record's status field announces a source and destination path.
fn has_two_paths(format: DiffFormat, meta: &[u8]) -> bool {
    let status = match format {
        DiffFormat::Raw => {
            let parents = meta.iter().take_while(|&&b| b == b':').count();
            if parents != 1 {
                return false;
            }
            let start = memchr::memrchr(b' ', meta).map_or(0, |i| i + 1);
            &meta[start..]
        }
        DiffFormat::NameStatus => meta,
    };
    matches!(status.first(), Some(b'R' | b'C'))
}

fn single_parent_entry(
    change: Change,
    original: Option<StringUtf8>,
    status: &[u8],
    status_off: usize,
) -> Result<TreeDifferenceEntry> {
    let Some((&letter, score)) = status.split_first() else {
        return Err(ParseError::new(ParseErrorKind::Expected("status"), status_off, status));
    };
    Ok(match letter {
        b'A' => TreeDifferenceEntry::Added(change),
        b'D' => TreeDifferenceEntry::Deleted(change),
        b'M' => TreeDifferenceEntry::Modified(change),
        b'T' => TreeDifferenceEntry::TypeChanged(change),
        b'U' => TreeDifferenceEntry::Unmerged(change),
        b'X' => TreeDifferenceEntry::Unknown(change),
        b'R' | b'C' => {
            let confidence = parse_confidence(score, status_off + 1)?;
            let original_path = original.unwrap_or_default();
            let renamed = RenamedEntry {
                change,
                original_path,
                confidence,
            };
            if letter == b'R' {
                TreeDifferenceEntry::Renamed(renamed)
            } else {
                TreeDifferenceEntry::Copied(renamed)
            }
        }
        other => {
            return Err(ParseError::new(
                ParseErrorKind::UnknownStatus(char::from(other)),
                status_off,
                status,
            ))
        }
    })
}

/// Parses the optional similarity digits after `R`/`C`; absent means 0.
fn parse_confidence(digits: &[u8], offset: usize) -> Result<u8> {
    if digits.is_empty() {
        return Ok(0);
    }
    let value = crate::record::parse_u64(digits, offset)?;
    Ok(value.min(100) as u8)
}

impl RecordParser for TreeDifferenceParser {
    type Output = TreeDifference;

    fn parse(
        &mut self,
        buffer: &ByteBuffer,
        index: &mut usize,
        max: usize,
        at_eof: bool,
    ) -> Result<ParseResult> {
        scan_records(buffer, index, max, at_eof, |buf, at, eof| self.record(buf, at, eof))
    }

    fn records_parsed(&self) -> usize {
        self.entries.len()
    }

    fn finish(self) -> Result<TreeDifference> {
        Ok(TreeDifference {
            entries: self.entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";
    const B: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
    const C: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

    fn id(hex: &str) -> ObjectId {
        ObjectId::from_hex(hex).unwrap()
    }

    #[test]
    fn test_name_status_rename_with_score() {
        let diff = TreeDifferenceParser::name_status(false)
            .parse_complete(b"R90\told.txt\tnew.txt\n")
            .unwrap();
        assert_eq!(diff.len(), 1);
        match &diff.entries[0] {
            TreeDifferenceEntry::Renamed(r) => {
                assert_eq!(r.original_path, "old.txt");
                assert_eq!(r.change.path, "new.txt");
                assert_eq!(r.confidence, 90);
                assert_eq!(r.change.old_id, ObjectId::ZERO);
                assert_eq!(r.change.new_mode, FileMode::NONE);
            }
            other => panic!("expected rename, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_rename_without_score() {
        let line = format!(":100644 100644 {A} {B} R\told.txt\tnew.txt\n");
        let diff = TreeDifferenceParser::raw(false)
            .parse_complete(line.as_bytes())
            .unwrap();
        let entry = &diff.entries[0];
        assert!(matches!(entry, TreeDifferenceEntry::Renamed(_)));
        assert_eq!(entry.confidence(), Some(0));
        assert_eq!(entry.path(), &StringUtf8::from("new.txt"));
    }

    #[test]
    fn test_raw_copy_nul_terminated() {
        let data = format!(":100644 100644 {A} {A} C075\0src/a.rs\0src/b.rs\0");
        let diff = TreeDifferenceParser::raw(true)
            .parse_complete(data.as_bytes())
            .unwrap();
        match &diff.entries[0] {
            TreeDifferenceEntry::Copied(r) => {
                assert_eq!(r.confidence, 75);
                assert_eq!(r.original_path, "src/a.rs");
                assert_eq!(r.change.path, "src/b.rs");
            }
            other => panic!("expected copy, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_modified_and_added() {
        let data = format!(
            ":100644 100755 {A} {B} M\0bin/tool\0:000000 100644 {} {C} A\0new file\0",
            ObjectId::ZERO
        );
        let diff = TreeDifferenceParser::raw(true)
            .parse_complete(data.as_bytes())
            .unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(
            diff.entries[0],
            TreeDifferenceEntry::Modified(Change {
                path: StringUtf8::from("bin/tool"),
                old_mode: FileMode::BLOB,
                new_mode: FileMode::EXECUTABLE,
                old_id: id(A),
                new_id: id(B),
            })
        );
        match &diff.entries[1] {
            TreeDifferenceEntry::Added(c) => {
                assert_eq!(c.path, "new file");
                assert_eq!(c.old_mode, FileMode::NONE);
                assert!(c.old_id.is_zero());
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_never_carries_confidence() {
        let data = format!("::100644 100644 100644 {A} {B} {C} RM\tmerged.txt\n");
        let diff = TreeDifferenceParser::raw(false)
            .parse_complete(data.as_bytes())
            .unwrap();
        let entry = &diff.entries[0];
        assert_eq!(entry.confidence(), None);
        match entry {
            TreeDifferenceEntry::Merged(m) => {
                assert_eq!(m.path, "merged.txt");
                assert_eq!(m.new_id, id(C));
                assert_eq!(m.parents.len(), 2);
                assert_eq!(m.parents[0].kind, ParentChangeKind::RenamedInParent);
                assert_eq!(m.parents[0].old_id, id(A));
                assert_eq!(m.parents[1].kind, ParentChangeKind::Modified);
                assert_eq!(m.parents[1].old_id, id(B));
            }
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn test_terminator_ends_stream() {
        let data = format!(":100644 100644 {A} {B} M\tkept\n*:100644 100644 {A} {B} M\tignored\n");
        let diff = TreeDifferenceParser::raw(false)
            .parse_complete(data.as_bytes())
            .unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries[0].path(), &StringUtf8::from("kept"));
    }

    #[test]
    fn test_quoted_paths() {
        let data = b"M\t\"caf\\303\\251.txt\"\nR100\t\"a\\tb\"\tplain\n";
        let diff = TreeDifferenceParser::name_status(false)
            .parse_complete(data)
            .unwrap();
        assert_eq!(diff.entries[0].path(), &StringUtf8::from("café.txt"));
        match &diff.entries[1] {
            TreeDifferenceEntry::Renamed(r) => {
                assert_eq!(r.original_path, "a\tb");
                assert_eq!(r.confidence, 100);
            }
            other => panic!("expected rename, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_status_letter() {
        let err = TreeDifferenceParser::name_status(false)
            .parse_complete(b"Q\tpath\n")
            .unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnknownStatus('Q')));
    }

    #[test]
    fn test_bad_id_reports_field_offset() {
        let data = format!(":100644 100644 {A} nothex M\tx\n");
        let err = TreeDifferenceParser::raw(false)
            .parse_complete(data.as_bytes())
            .unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::InvalidObjectId));
        assert_eq!(err.offset(), 56);
        assert_eq!(err.window(), b"nothex");
    }

    #[test]
    fn test_record_split_across_refill() {
        let data = format!(":100644 100644 {A} {B} M\0file\0");
        let bytes = data.as_bytes();
        let mut parser = TreeDifferenceParser::raw(true);
        let mut buffer = ByteBuffer::from(&bytes[..bytes.len() - 3]);
        let mut index = 0;
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::MatchIncomplete
        );
        assert_eq!(index, 0);
        buffer.extend_from_slice(&bytes[bytes.len() - 3..]);
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::MatchMaybeComplete
        );
        assert_eq!(index, bytes.len());
    }

    #[test]
    fn test_not_a_record_start() {
        let mut parser = TreeDifferenceParser::raw(true);
        let buffer = ByteBuffer::from(&b"diff --git a b\n"[..]);
        let mut index = 0;
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::NoMatch
        );
    }
}
