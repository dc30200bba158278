//! `git for-each-ref` output parser.

use crate::record::{find, parse_id, scan_records, Step};
use crate::{ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::{ByteBuffer, ObjectId, ObjectType, StringUtf8};

/// The `--format` argument whose output [`ReferenceParser`] reads.
pub const REFERENCE_FORMAT: &str =
    "%(objectname)%00%(objecttype)%00%(refname)%00%(symref)%00%(upstream)";

/// A named reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Object the reference points at.
    pub id: ObjectId,
    /// Type of that object.
    pub object_type: ObjectType,
    /// Full name, e.g. `refs/heads/main`.
    pub name: StringUtf8,
    /// Target of a symbolic reference.
    pub symref: Option<StringUtf8>,
    /// Configured upstream of a branch.
    pub upstream: Option<StringUtf8>,
}

impl Reference {
    /// Name with the `refs/heads/`, `refs/tags/` or `refs/remotes/` prefix removed.
    pub fn short_name(&self) -> StringUtf8 {
        let prefixes: [&[u8]; 3] = [b"refs/heads/", b"refs/tags/", b"refs/remotes/"];
        for prefix in prefixes {
            if self.name.starts_with(prefix) {
                return self.name.substring(prefix.len()..self.name.len());
            }
        }
        self.name.clone()
    }

    /// Returns true for `refs/heads/*`.
    pub fn is_branch(&self) -> bool {
        self.name.starts_with(b"refs/heads/")
    }

    /// Returns true for `refs/tags/*`.
    pub fn is_tag(&self) -> bool {
        self.name.starts_with(b"refs/tags/")
    }
}

/// Parses lines produced with [`REFERENCE_FORMAT`].
#[derive(Default)]
pub struct ReferenceParser {
    references: Vec<Reference>,
}

impl ReferenceParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, buffer: &ByteBuffer, at: usize) -> Result<Step> {
        if !buffer[at].is_ascii_hexdigit() {
            return Ok(Step::NoMatch);
        }
        let Some(end) = find(buffer, b'\n', at) else {
            return Ok(Step::Incomplete);
        };
        let line = &buffer[at..end];
        let mut fields = line.split(|&b| b == 0);
        let mut offset = at;
        let mut next = || {
            let field = fields.next()?;
            let field_offset = offset;
            offset += field.len() + 1;
            Some((field_offset, field))
        };

        let expected = || ParseError::new(ParseErrorKind::Expected("five NUL-separated fields"), at, line);
        let (id_off, id) = next().ok_or_else(expected)?;
        let (type_off, ty) = next().ok_or_else(expected)?;
        let (_, name) = next().ok_or_else(expected)?;
        let (_, symref) = next().ok_or_else(expected)?;
        let (_, upstream) = next().ok_or_else(expected)?;

        let optional = |field: &[u8]| (!field.is_empty()).then(|| StringUtf8::from(field));
        self.references.push(Reference {
            id: parse_id(id, id_off)?,
            object_type: ObjectType::parse_bytes(ty)
                .map_err(|_| ParseError::new(ParseErrorKind::UnknownObjectType, type_off, ty))?,
            name: StringUtf8::from(name),
            symref: optional(symref),
            upstream: optional(upstream),
        });
        Ok(Step::Record(end + 1))
    }
}

impl RecordParser for ReferenceParser {
    type Output = Vec<Reference>;

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
        self.references.len()
    }

    fn finish(self) -> Result<Vec<Reference>> {
        Ok(self.references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_references() {
        let data = b"3b18e512dba79e4c8300dd08aeb37f8e728b8dad\0commit\0refs/heads/main\0\0refs/remotes/origin/main\n\
3b18e512dba79e4c8300dd08aeb37f8e728b8dad\0commit\0refs/remotes/origin/HEAD\0refs/remotes/origin/main\0\n\
4b825dc642cb6eb9a060e54bf8d69288fbee4904\0tag\0refs/tags/v1.0\0\0\n";
        let refs = ReferenceParser::new().parse_complete(data).unwrap();
        assert_eq!(refs.len(), 3);

        assert!(refs[0].is_branch());
        assert_eq!(refs[0].short_name(), "main");
        assert_eq!(refs[0].upstream.as_ref().unwrap(), "refs/remotes/origin/main");
        assert_eq!(refs[0].symref, None);

        assert_eq!(refs[1].symref.as_ref().unwrap(), "refs/remotes/origin/main");
        assert_eq!(refs[1].short_name(), "origin/HEAD");

        assert!(refs[2].is_tag());
        assert_eq!(refs[2].object_type, ObjectType::Tag);
    }

    #[test]
    fn test_missing_fields() {
        let data = b"3b18e512dba79e4c8300dd08aeb37f8e728b8dad\0commit\0refs/heads/x\n";
        let err = ReferenceParser::new().parse_complete(data).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::Expected(_)));
    }

    #[test]
    fn test_bad_type_offset() {
        let data = b"3b18e512dba79e4c8300dd08aeb37f8e728b8dad\0widget\0refs/heads/x\0\0\n";
        let err = ReferenceParser::new().parse_complete(data).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnknownObjectType));
        assert_eq!(err.offset(), 41);
    }
}
