//! Commit payload parser.

use crate::header::{first_line, Header, HeaderBlock};
use crate::record::parse_id;
use crate::{Identity, ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::{ByteBuffer, ObjectId, StringUtf8};
use smallvec::SmallVec;

/// The parsed contents of a commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitData {
    /// Root tree of the commit.
    pub tree: ObjectId,
    /// Parent commits, in recorded order.
    pub parents: SmallVec<[ObjectId; 2]>,
    /// Who wrote the change.
    pub author: Identity,
    /// Who recorded the commit.
    pub committer: Identity,
    /// Declared message encoding, if not UTF-8.
    pub encoding: Option<StringUtf8>,
    /// Everything after the blank line separating headers from the message.
    pub message: StringUtf8,
    /// The first line of the message.
    pub first_line: StringUtf8,
}

impl CommitData {
    /// Returns true for merge commits.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// Parses a commit payload as printed by `git cat-file commit`.
///
/// `mergetag`, `gpgsig` and unknown headers are parsed and dropped.
#[derive(Default)]
pub struct CommitParser {
    block: HeaderBlock,
    tree: Option<ObjectId>,
    parents: SmallVec<[ObjectId; 2]>,
    author: Option<Identity>,
    committer: Option<Identity>,
    encoding: Option<StringUtf8>,
}

impl CommitParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self::default()
    }

    fn on_header(
        tree: &mut Option<ObjectId>,
        parents: &mut SmallVec<[ObjectId; 2]>,
        author: &mut Option<Identity>,
        committer: &mut Option<Identity>,
        encoding: &mut Option<StringUtf8>,
        header: Header<'_>,
    ) -> Result<()> {
        let Header {
            key,
            value,
            value_offset,
        } = header;
        match key {
            b"tree" => {
                if tree.is_some() {
                    return Err(ParseError::new(
                        ParseErrorKind::DuplicateField("tree"),
                        value_offset,
                        value,
                    ));
                }
                *tree = Some(parse_id(value, value_offset)?);
            }
            b"parent" => parents.push(parse_id(value, value_offset)?),
            b"author" => *author = Some(Identity::parse(value, value_offset)?),
            b"committer" => *committer = Some(Identity::parse(value, value_offset)?),
            b"encoding" => *encoding = Some(StringUtf8::from(value)),
            _ => {}
        }
        Ok(())
    }
}

impl RecordParser for CommitParser {
    type Output = CommitData;

    fn parse(
        &mut self,
        buffer: &ByteBuffer,
        index: &mut usize,
        max: usize,
        at_eof: bool,
    ) -> Result<ParseResult> {
        if max == 0 {
            return Ok(ParseResult::MatchComplete);
        }
        let start = *index;
        let Self {
            block,
            tree,
            parents,
            author,
            committer,
            encoding,
        } = self;
        let result = block.parse(buffer, index, at_eof, |header| {
            Self::on_header(tree, parents, author, committer, encoding, header)
        })?;

        if result == ParseResult::MatchComplete && tree.is_none() {
            return Err(ParseError::at(
                ParseErrorKind::MissingField("tree"),
                buffer.as_slice(),
                start,
            ));
        }
        Ok(result)
    }

    fn records_parsed(&self) -> usize {
        usize::from(self.block.is_complete())
    }

    fn finish(mut self) -> Result<CommitData> {
        let missing = |field| ParseError::new(ParseErrorKind::MissingField(field), 0, &[]);
        let tree = self.tree.ok_or_else(|| missing("tree"))?;
        let author = self.author.take().ok_or_else(|| missing("author"))?;
        let committer = self.committer.take().ok_or_else(|| missing("committer"))?;

        let message = self.block.take_message();
        let first_line = StringUtf8::from(first_line(&message));

        Ok(CommitData {
            tree,
            parents: self.parents,
            author,
            committer,
            encoding: self.encoding,
            message: StringUtf8::from(message),
            first_line,
        })
    }
}
