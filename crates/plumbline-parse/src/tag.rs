//! Annotated tag payload parser.

use crate::header::{first_line, Header, HeaderBlock};
use crate::record::parse_id;
use crate::{Identity, ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::{ByteBuffer, ObjectId, ObjectType, StringUtf8};

/// The parsed contents of an annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagData {
    /// The tagged object.
    pub object: ObjectId,
    /// Type of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub name: StringUtf8,
    /// Who created the tag; absent in some very old tags.
    pub tagger: Option<Identity>,
    /// The tag message, including any signature block.
    pub message: StringUtf8,
    /// The first line of the message.
    pub first_line: StringUtf8,
}

/// Parses a tag payload as printed by `git cat-file tag`.
#[derive(Default)]
pub struct TagParser {
    block: HeaderBlock,
    object: Option<ObjectId>,
    target_type: Option<ObjectType>,
    name: Option<StringUtf8>,
    tagger: Option<Identity>,
}

impl TagParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordParser for TagParser {
    type Output = TagData;

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
        let Self {
            block,
            object,
            target_type,
            name,
            tagger,
        } = self;
        block.parse(buffer, index, at_eof, |header: Header<'_>| {
            let offset = header.value_offset;
            match header.key {
                b"object" => *object = Some(parse_id(header.value, offset)?),
                b"type" => {
                    let ty = ObjectType::parse_bytes(header.value).map_err(|_| {
                        ParseError::new(ParseErrorKind::UnknownObjectType, offset, header.value)
                    })?;
                    *target_type = Some(ty);
                }
                b"tag" => *name = Some(StringUtf8::from(header.value)),
                b"tagger" => *tagger = Some(Identity::parse(header.value, offset)?),
                _ => {}
            }
            Ok(())
        })
    }

    fn records_parsed(&self) -> usize {
        usize::from(self.block.is_complete())
    }

    fn finish(mut self) -> Result<TagData> {
        let missing = |field| ParseError::new(ParseErrorKind::MissingField(field), 0, &[]);
        let object = self.object.ok_or_else(|| missing("object"))?;
        let target_type = self.target_type.ok_or_else(|| missing("type"))?;
        let name = self.name.take().ok_or_else(|| missing("tag"))?;

        let message = self.block.take_message();
        let first_line = StringUtf8::from(first_line(&message));

        Ok(TagData {
            object,
            target_type,
            name,
            tagger: self.tagger,
            message: StringUtf8::from(message),
            first_line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag() {
        let data = b"object 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\n\
type commit\n\
tag v1.0.0\n\
tagger Rel Eng <rel@example.com> 1700000000 +0000\n\
\n\
Release 1.0.0\n\nNotes.\n";
        let tag = TagParser::new().parse_complete(data).unwrap();
        assert_eq!(
            tag.object,
            ObjectId::from_hex("3b18e512dba79e4c8300dd08aeb37f8e728b8dad").unwrap()
        );
        assert_eq!(tag.target_type, ObjectType::Commit);
        assert_eq!(tag.name, "v1.0.0");
        assert_eq!(tag.tagger.as_ref().unwrap().email, "rel@example.com");
        assert_eq!(tag.first_line, "Release 1.0.0");
    }

    #[test]
    fn test_tag_without_tagger() {
        let data = b"object 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\ntype blob\ntag old\n\nmsg\n";
        let tag = TagParser::new().parse_complete(data).unwrap();
        assert!(tag.tagger.is_none());
        assert_eq!(tag.target_type, ObjectType::Blob);
    }

    #[test]
    fn test_unknown_type() {
        let data = b"object 3b18e512dba79e4c8300dd08aeb37f8e728b8dad\ntype widget\ntag x\n\n";
        let err = TagParser::new().parse_complete(data).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnknownObjectType));
        assert_eq!(err.offset(), 53);
    }

    #[test]
    fn test_missing_object() {
        let data = b"type commit\ntag x\n\nmsg";
        let err = TagParser::new().parse_complete(data).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::MissingField("object")));
    }
}
