//! `git status --porcelain=v2 -z --branch` parser.

use crate::record::{find, parse_id, parse_mode, parse_u64, scan_records, split_fields, Step};
use crate::{ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::{ByteBuffer, FileMode, ObjectId, StringUtf8};

/// State of a path in one of the two comparison buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// No change (`.`).
    Unmodified,
    /// Content changed.
    Modified,
    /// File type changed.
    TypeChanged,
    /// Newly added.
    Added,
    /// Deleted.
    Deleted,
    /// Renamed.
    Renamed,
    /// Copied.
    Copied,
    /// Updated but unmerged.
    Unmerged,
}

impl StatusKind {
    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            b'.' => Self::Unmodified,
            b'M' => Self::Modified,
            b'T' => Self::TypeChanged,
            b'A' => Self::Added,
            b'D' => Self::Deleted,
            b'R' => Self::Renamed,
            b'C' => Self::Copied,
            b'U' => Self::Unmerged,
            _ => return None,
        })
    }
}

/// Per-kind tallies for one bucket (staged or unstaged).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Added paths.
    pub added: usize,
    /// Deleted paths.
    pub deleted: usize,
    /// Modified paths.
    pub modified: usize,
    /// Renamed paths.
    pub renamed: usize,
    /// Copied paths.
    pub copied: usize,
    /// Paths whose type changed.
    pub type_changed: usize,
    /// Paths unchanged in this bucket.
    pub unmodified: usize,
}

impl StatusCounts {
    fn record(&mut self, kind: StatusKind) {
        match kind {
            StatusKind::Added => self.added += 1,
            StatusKind::Deleted => self.deleted += 1,
            StatusKind::Modified => self.modified += 1,
            StatusKind::Renamed => self.renamed += 1,
            StatusKind::Copied => self.copied += 1,
            StatusKind::TypeChanged => self.type_changed += 1,
            StatusKind::Unmodified => self.unmodified += 1,
            StatusKind::Unmerged => {}
        }
    }

    /// Number of changed paths in this bucket.
    pub fn changed(&self) -> usize {
        self.added + self.deleted + self.modified + self.renamed + self.copied + self.type_changed
    }
}

/// Branch tracking information from the `# branch.*` headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchInfo {
    /// Current commit; `None` before the first commit.
    pub oid: Option<ObjectId>,
    /// Current branch; `None` when HEAD is detached.
    pub head: Option<StringUtf8>,
    /// Upstream branch, if configured.
    pub upstream: Option<StringUtf8>,
    /// Commits ahead of upstream.
    pub ahead: u64,
    /// Commits behind upstream.
    pub behind: u64,
}

/// A tracked path with changes (`1` and `2` records).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Repository-relative path.
    pub path: StringUtf8,
    /// Index relative to HEAD.
    pub staged: StatusKind,
    /// Worktree relative to the index.
    pub unstaged: StatusKind,
    /// Submodule state field, `N...` for non-submodules.
    pub submodule: StringUtf8,
    /// Mode in HEAD.
    pub head_mode: FileMode,
    /// Mode in the index.
    pub index_mode: FileMode,
    /// Mode in the worktree.
    pub worktree_mode: FileMode,
    /// Object in HEAD.
    pub head_id: ObjectId,
    /// Object in the index.
    pub index_id: ObjectId,
    /// Source path of a rename or copy.
    pub original_path: Option<StringUtf8>,
    /// Similarity score of a rename or copy.
    pub score: Option<u8>,
}

/// An unmerged path (`u` record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmergedEntry {
    /// Repository-relative path.
    pub path: StringUtf8,
    /// The two-letter conflict code, e.g. `UU` or `AA`.
    pub code: [u8; 2],
    /// Submodule state field.
    pub submodule: StringUtf8,
    /// Modes of stages 1, 2 and 3.
    pub stage_modes: [FileMode; 3],
    /// Mode in the worktree.
    pub worktree_mode: FileMode,
    /// Objects of stages 1, 2 and 3.
    pub stage_ids: [ObjectId; 3],
}

/// A parsed working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Branch headers, when `--branch` was given.
    pub branch: BranchInfo,
    /// Number of stash entries, when `--show-stash` was given.
    pub stash_count: Option<u64>,
    /// Tracked paths with changes, in stream order.
    pub entries: Vec<StatusEntry>,
    /// Unmerged paths.
    pub unmerged: Vec<UnmergedEntry>,
    /// Untracked paths.
    pub untracked: Vec<StringUtf8>,
    /// Ignored paths.
    pub ignored: Vec<StringUtf8>,
    /// Tallies of `entries` by staged kind.
    pub staged: StatusCounts,
    /// Tallies of `entries` by unstaged kind.
    pub unstaged: StatusCounts,
}

impl StatusSnapshot {
    /// Returns true when nothing is staged, modified, unmerged or untracked.
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty() && self.unmerged.is_empty() && self.untracked.is_empty()
    }

    fn push_entry(&mut self, entry: StatusEntry) {
        self.staged.record(entry.staged);
        self.unstaged.record(entry.unstaged);
        self.entries.push(entry);
    }
}

/// Parses porcelain v2 status records.
#[derive(Default)]
pub struct StatusParser {
    snapshot: StatusSnapshot,
    records: usize,
}

impl StatusParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, buffer: &ByteBuffer, at: usize) -> Result<Step> {
        let kind = buffer[at];
        if !matches!(kind, b'#' | b'1' | b'2' | b'u' | b'?' | b'!') {
            return Ok(Step::NoMatch);
        }
        let Some(end) = find(buffer, 0, at) else {
            return Ok(Step::Incomplete);
        };
        let line = &buffer[at..end];

        match kind {
            b'#' => {
                self.header(line, at)?;
                return Ok(Step::Skip(end + 1));
            }
            b'?' => self.snapshot.untracked.push(path_after(line, at)?),
            b'!' => self.snapshot.ignored.push(path_after(line, at)?),
            b'1' => {
                let entry = tracked_entry(line, at, 9, None)?;
                self.snapshot.push_entry(entry);
            }
            b'2' => {
                // The source path follows as its own NUL-terminated field.
                let Some(orig_end) = find(buffer, 0, end + 1) else {
                    return Ok(Step::Incomplete);
                };
                let original = buffer.to_utf8(end + 1..orig_end);
                let entry = tracked_entry(line, at, 10, Some(original))?;
                self.snapshot.push_entry(entry);
                self.records += 1;
                return Ok(Step::Record(orig_end + 1));
            }
            _ => {
                let entry = unmerged_entry(line, at)?;
                self.snapshot.unmerged.push(entry);
            }
        }
        self.records += 1;
        Ok(Step::Record(end + 1))
    }

    fn header(&mut self, line: &[u8], at: usize) -> Result<()> {
        let fields = split_fields(line, b' ', 3);
        let (Some(&(_, key)), Some(&(value_off, value))) = (fields.get(1), fields.get(2)) else {
            return Ok(());
        };
        let value_off = at + value_off;
        let branch = &mut self.snapshot.branch;
        match key {
            b"branch.oid" if value != b"(initial)" => branch.oid = Some(parse_id(value, value_off)?),
            b"branch.head" if value != b"(detached)" => branch.head = Some(StringUtf8::from(value)),
            b"branch.upstream" => branch.upstream = Some(StringUtf8::from(value)),
            b"branch.ab" => {
                let ab = split_fields(value, b' ', 2);
                let signed = |(off, field): (usize, &[u8]), sign: u8| -> Result<u64> {
                    match field.split_first() {
                        Some((&s, digits)) if s == sign => parse_u64(digits, value_off + off + 1),
                        _ => Err(ParseError::new(ParseErrorKind::InvalidNumber, value_off + off, field)),
                    }
                };
                if ab.len() != 2 {
                    return Err(ParseError::new(ParseErrorKind::Expected("+ahead -behind"), value_off, value));
                }
                branch.ahead = signed(ab[0], b'+')?;
                branch.behind = signed(ab[1], b'-')?;
            }
            b"stash" => self.snapshot.stash_count = Some(parse_u64(value, value_off)?),
            _ => {}
        }
        Ok(())
    }

    /// The snapshot accumulated so far.
    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }
}

/// `? <path>` and `! <path>`.
fn path_after(line: &[u8], at: usize) -> Result<StringUtf8> {
    match line.get(1) {
        Some(b' ') if line.len() > 2 => Ok(StringUtf8::from(&line[2..])),
        _ => Err(ParseError::new(ParseErrorKind::Expected("path"), at, line)),
    }
}

fn xy(field: &[u8], offset: usize) -> Result<(StatusKind, StatusKind)> {
    let [x, y] = field else {
        return Err(ParseError::new(ParseErrorKind::Expected("XY status"), offset, field));
    };
    let kind = |code: u8, at: usize| {
        StatusKind::from_code(code).ok_or_else(|| {
            ParseError::new(ParseErrorKind::UnknownStatus(char::from(code)), at, field)
        })
    };
    Ok((kind(*x, offset)?, kind(*y, offset + 1)?))
}

/// `1 XY sub mH mI mW hH hI path` and `2 XY sub mH mI mW hH hI Xscore path`.
fn tracked_entry(
    line: &[u8],
    at: usize,
    field_count: usize,
    original_path: Option<StringUtf8>,
) -> Result<StatusEntry> {
    let f = split_fields(line, b' ', field_count);
    if f.len() != field_count {
        return Err(ParseError::new(ParseErrorKind::Expected("status fields"), at, line));
    }
    let off = |i: usize| at + f[i].0;

    let (staged, unstaged) = xy(f[1].1, off(1))?;
    let score = if original_path.is_some() {
        let (score_off, field) = f[8];
        let digits = field.get(1..).unwrap_or_default();
        Some(parse_u64(digits, at + score_off + 1)?.min(100) as u8)
    } else {
        None
    };

    Ok(StatusEntry {
        path: StringUtf8::from(f[field_count - 1].1),
        staged,
        unstaged,
        submodule: StringUtf8::from(f[2].1),
        head_mode: parse_mode(f[3].1, off(3))?,
        index_mode: parse_mode(f[4].1, off(4))?,
        worktree_mode: parse_mode(f[5].1, off(5))?,
        head_id: parse_id(f[6].1, off(6))?,
        index_id: parse_id(f[7].1, off(7))?,
        original_path,
        score,
    })
}

/// `u XY sub m1 m2 m3 mW h1 h2 h3 path`.
fn unmerged_entry(line: &[u8], at: usize) -> Result<UnmergedEntry> {
    let f = split_fields(line, b' ', 11);
    if f.len() != 11 {
        return Err(ParseError::new(ParseErrorKind::Expected("unmerged fields"), at, line));
    }
    let off = |i: usize| at + f[i].0;
    let code = match f[1].1 {
        [x, y] => [*x, *y],
        other => return Err(ParseError::new(ParseErrorKind::Expected("XY status"), off(1), other)),
    };
    Ok(UnmergedEntry {
        path: StringUtf8::from(f[10].1),
        code,
        submodule: StringUtf8::from(f[2].1),
        stage_modes: [
            parse_mode(f[3].1, off(3))?,
            parse_mode(f[4].1, off(4))?,
            parse_mode(f[5].1, off(5))?,
        ],
        worktree_mode: parse_mode(f[6].1, off(6))?,
        stage_ids: [
            parse_id(f[7].1, off(7))?,
            parse_id(f[8].1, off(8))?,
            parse_id(f[9].1, off(9))?,
        ],
    })
}

impl RecordParser for StatusParser {
    type Output = StatusSnapshot;

    fn parse(
        &mut self,
        buffer: &ByteBuffer,
        index: &mut usize,
        max: usize,
        at_eof: bool,
    ) -> Result<ParseResult> {
        scan_records(buffer, index, max, at_eof, |buf, at, _| self.record(buf, at))
    }

    fn records_parsed(&self) -> usize {
        self.records
    }

    fn finish(self) -> Result<StatusSnapshot> {
        Ok(self.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const H: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";
    const I: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn sample() -> Vec<u8> {
        let mut out = Vec::new();
        for record in [
            format!("# branch.oid {H}"),
            "# branch.head main".to_string(),
            "# branch.upstream origin/main".to_string(),
            "# branch.ab +2 -1".to_string(),
            format!("1 M. N... 100644 100644 100644 {H} {I} src/lib.rs"),
            format!("1 .M N... 100644 100644 100644 {H} {H} README.md"),
            format!("1 A. N... 000000 100644 100644 {} {I} new file.txt", ObjectId::ZERO),
            format!("2 R. N... 100644 100644 100644 {H} {H} R100 renamed.rs\0original.rs"),
            format!("u UU N... 100644 100644 100644 100644 {H} {I} {H} conflict.txt"),
            "? untracked.log".to_string(),
            "! target/debug".to_string(),
        ] {
            out.extend_from_slice(record.as_bytes());
            out.push(0);
        }
        out
    }

    #[test]
    fn test_parse_status() {
        let status = StatusParser::new().parse_complete(&sample()).unwrap();

        assert_eq!(status.branch.oid, Some(ObjectId::from_hex(H).unwrap()));
        assert_eq!(status.branch.head.as_ref().unwrap(), "main");
        assert_eq!(status.branch.upstream.as_ref().unwrap(), "origin/main");
        assert_eq!((status.branch.ahead, status.branch.behind), (2, 1));

        assert_eq!(status.entries.len(), 4);
        assert_eq!(status.entries[0].staged, StatusKind::Modified);
        assert_eq!(status.entries[0].unstaged, StatusKind::Unmodified);
        assert_eq!(status.entries[2].path, "new file.txt");

        let renamed = &status.entries[3];
        assert_eq!(renamed.staged, StatusKind::Renamed);
        assert_eq!(renamed.original_path.as_ref().unwrap(), "original.rs");
        assert_eq!(renamed.score, Some(100));

        assert_eq!(status.unmerged.len(), 1);
        assert_eq!(&status.unmerged[0].code, b"UU");
        assert_eq!(status.unmerged[0].stage_ids[1], ObjectId::from_hex(I).unwrap());

        assert_eq!(status.untracked, vec![StringUtf8::from("untracked.log")]);
        assert_eq!(status.ignored, vec![StringUtf8::from("target/debug")]);
        assert!(!status.is_clean());
    }

    #[test]
    fn test_counts_maintained_per_entry() {
        let status = StatusParser::new().parse_complete(&sample()).unwrap();
        assert_eq!(
            status.staged,
            StatusCounts {
                added: 1,
                modified: 1,
                renamed: 1,
                unmodified: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            status.unstaged,
            StatusCounts {
                modified: 1,
                unmodified: 3,
                ..Default::default()
            }
        );
        assert_eq!(status.staged.changed(), 3);
    }

    #[test]
    fn test_initial_and_detached() {
        let data = b"# branch.oid (initial)\0# branch.head (detached)\0";
        let status = StatusParser::new().parse_complete(data).unwrap();
        assert_eq!(status.branch, BranchInfo::default());
        assert!(status.is_clean());
    }

    #[test]
    fn test_rename_source_split_across_refill() {
        let data = sample();
        let source_at = data
            .windows(11)
            .position(|w| w == b"original.rs")
            .unwrap();
        let mut parser = StatusParser::new();
        let mut buffer = ByteBuffer::from(&data[..source_at + 3]);
        let mut index = 0;
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::MatchIncomplete
        );
        assert_eq!(parser.snapshot().entries.len(), 3);

        buffer.extend_from_slice(&data[source_at + 3..]);
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::MatchMaybeComplete
        );
        assert_eq!(parser.snapshot().entries.len(), 4);
    }

    #[test]
    fn test_bad_xy() {
        let data = format!("1 Z. N... 100644 100644 100644 {H} {H} f\0");
        let err = StatusParser::new().parse_complete(data.as_bytes()).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnknownStatus('Z')));
        assert_eq!(err.offset(), 2);
    }

    #[test]
    fn test_bad_ahead_behind() {
        let err = StatusParser::new()
            .parse_complete(b"# branch.ab 2 -1\0")
            .unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::InvalidNumber));
        assert_eq!(err.offset(), 12);
    }
}
