//! Tree payload and `ls-tree -z` listing parsers.

use crate::record::{find, parse_id, parse_mode, scan_records, Step};
use crate::{ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::{ByteBuffer, FileMode, ObjectId, ObjectType, StringUtf8};

/// One entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: FileMode,
    /// Type of the referenced object.
    pub object_type: ObjectType,
    /// Referenced object.
    pub id: ObjectId,
    /// File name, or repository-relative path for recursive listings.
    pub name: StringUtf8,
}

impl TreeEntry {
    /// Returns true if the entry is a subdirectory.
    pub fn is_tree(&self) -> bool {
        self.object_type == ObjectType::Tree
    }
}

/// The parsed contents of a tree object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeData {
    /// Entries in stored order.
    pub entries: Vec<TreeEntry>,
}

impl TreeData {
    /// Looks an entry up by name.
    pub fn get(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bytes() == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true for the empty tree.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries.
    pub fn iter(&self) -> std::slice::Iter<'_, TreeEntry> {
        self.entries.iter()
    }
}

fn is_mode_start(byte: u8) -> bool {
    (b'0'..=b'7').contains(&byte)
}

/// Parses the binary tree payload: `<mode> <name>\0<20-byte id>` records.
#[derive(Default)]
pub struct TreeParser {
    entries: Vec<TreeEntry>,
}

impl TreeParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, buffer: &ByteBuffer, at: usize) -> Result<Step> {
        if !is_mode_start(buffer[at]) {
            return Ok(Step::NoMatch);
        }
        let Some(space) = find(buffer, b' ', at) else {
            return Ok(Step::Incomplete);
        };
        let mode = parse_mode(&buffer[at..space], at)?;
        let Some(nul) = find(buffer, 0, space + 1) else {
            return Ok(Step::Incomplete);
        };
        let end = nul + 1 + ObjectId::LEN;
        if end > buffer.len() {
            return Ok(Step::Incomplete);
        }
        let id = ObjectId::from_slice(&buffer[nul + 1..end])
            .map_err(|_| ParseError::at(ParseErrorKind::InvalidObjectId, buffer.as_slice(), nul + 1))?;
        let object_type = mode
            .object_type()
            .ok_or_else(|| ParseError::at(ParseErrorKind::InvalidMode, buffer.as_slice(), at))?;

        self.entries.push(TreeEntry {
            mode,
            object_type,
            id,
            name: buffer.to_utf8(space + 1..nul),
        });
        Ok(Step::Record(end))
    }
}

impl RecordParser for TreeParser {
    type Output = TreeData;

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
        self.entries.len()
    }

    fn finish(self) -> Result<TreeData> {
        Ok(TreeData {
            entries: self.entries,
        })
    }
}

/// Parses `git ls-tree -z` output: `<mode> <type> <id>\t<path>\0` records.
#[derive(Default)]
pub struct LsTreeParser {
    entries: Vec<TreeEntry>,
}

impl LsTreeParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, buffer: &ByteBuffer, at: usize) -> Result<Step> {
        if !is_mode_start(buffer[at]) {
            return Ok(Step::NoMatch);
        }
        let Some(nul) = find(buffer, 0, at) else {
            return Ok(Step::Incomplete);
        };
        let record = &buffer[at..nul];
        let tab = memchr::memchr(b'\t', record)
            .ok_or_else(|| ParseError::new(ParseErrorKind::Expected("tab"), at, record))?;

        let meta = &record[..tab];
        let mut fields = meta.splitn(3, |&b| b == b' ');
        let (Some(mode), Some(ty), Some(id)) = (fields.next(), fields.next(), fields.next()) else {
            return Err(ParseError::new(ParseErrorKind::Expected("mode type id"), at, record));
        };

        let mode = parse_mode(mode, at)?;
        let type_offset = at + mode_len(meta) + 1;
        let object_type = ObjectType::parse_bytes(ty)
            .map_err(|_| ParseError::new(ParseErrorKind::UnknownObjectType, type_offset, ty))?;
        let id = parse_id(id, type_offset + ty.len() + 1)?;

        self.entries.push(TreeEntry {
            mode,
            object_type,
            id,
            name: buffer.to_utf8(at + tab + 1..nul),
        });
        Ok(Step::Record(nul + 1))
    }
}

fn mode_len(meta: &[u8]) -> usize {
    memchr::memchr(b' ', meta).unwrap_or(meta.len())
}

impl RecordParser for LsTreeParser {
    type Output = Vec<TreeEntry>;

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
        self.entries.len()
    }

    fn finish(self) -> Result<Vec<TreeEntry>> {
        Ok(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn binary_tree() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 README.md\0");
        data.extend_from_slice(&[0x11; 20]);
        data.extend_from_slice(b"40000 src\0");
        data.extend_from_slice(&[0x22; 20]);
        data.extend_from_slice(b"160000 vendor\0");
        data.extend_from_slice(&[0x33; 20]);
        data
    }

    #[test]
    fn test_parse_binary_tree() {
        let tree = TreeParser::new().parse_complete(&binary_tree()).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.entries[0].name, "README.md");
        assert_eq!(tree.entries[0].mode, FileMode::BLOB);
        assert_eq!(tree.entries[0].id, ObjectId::from_bytes([0x11; 20]));
        assert!(tree.get(b"src").unwrap().is_tree());
        assert_eq!(tree.get(b"vendor").unwrap().object_type, ObjectType::Commit);
    }

    #[test]
    fn test_binary_tree_resumes_inside_id() {
        let data = binary_tree();
        let split = 17 + 5;
        let mut parser = TreeParser::new();
        let mut buffer = ByteBuffer::from(&data[..split]);
        let mut index = 0;
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::MatchIncomplete
        );
        assert_eq!(index, 0);

        buffer.extend_from_slice(&data[split..]);
        assert_eq!(
            parser.parse(&buffer, &mut index, usize::MAX, false).unwrap(),
            ParseResult::MatchMaybeComplete
        );
        assert_eq!(index, data.len());
        assert_eq!(parser.records_parsed(), 3);
    }

    #[test]
    fn test_empty_tree() {
        let tree = TreeParser::new().parse_complete(b"").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_parse_ls_tree() {
        let data = b"100755 blob 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\tbin/run me.sh\0\
040000 tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\tdocs\0";
        let entries = LsTreeParser::new().parse_complete(data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mode, FileMode::EXECUTABLE);
        assert_eq!(entries[0].name, "bin/run me.sh");
        assert_eq!(entries[1].object_type, ObjectType::Tree);
    }

    #[test]
    fn test_ls_tree_bad_id() {
        let data = b"100644 blob nothex\tx\0";
        let err = LsTreeParser::new().parse_complete(data).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::InvalidObjectId));
        assert_eq!(err.offset(), 12);
    }

    #[test]
    fn test_ls_tree_max_records() {
        let data = ByteBuffer::from(
            &b"100644 blob 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\ta\0\
100644 blob 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\tb\0"[..],
        );
        let mut parser = LsTreeParser::new();
        let mut index = 0;
        assert_eq!(
            parser.parse(&data, &mut index, 1, false).unwrap(),
            ParseResult::MatchComplete
        );
        assert_eq!(parser.records_parsed(), 1);
        assert_eq!(index, 55);
    }
}
