//! Parsed domain objects.
//!
//! Commits, trees and tags keep a [`DatabaseRef`] to the database that read
//! them, so related objects can be resolved lazily. The reference is weak: a
//! parsed object never keeps a disposed database alive.

use crate::database::{ObjectDatabase, Shared};
use crate::{OdbError, Result};
use bytes::Bytes;
use plumbline_core::{ObjectHeader, ObjectId, ObjectType, StringUtf8};
use plumbline_parse::{
    CommitData, CommitParser, Identity, RecordParser, TagData, TagParser, TreeData, TreeEntry,
    TreeParser,
};
use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;
use std::sync::Weak;

/// Non-owning handle to the database an object was read from.
#[derive(Clone, Default)]
pub struct DatabaseRef(Weak<Shared>);

impl DatabaseRef {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self(shared)
    }

    /// A handle that never resolves.
    pub fn detached() -> Self {
        Self::default()
    }

    /// The database, if it is still alive.
    pub fn upgrade(&self) -> Result<ObjectDatabase> {
        self.0
            .upgrade()
            .map(ObjectDatabase::from_shared)
            .ok_or(OdbError::Disposed)
    }
}

impl fmt::Debug for DatabaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRef")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

/// A type that [`ObjectDatabase::read_object`] can produce.
pub trait ObjectKind: Sized + Clone {
    /// The git object type this decodes.
    const TYPE: ObjectType;

    /// Decodes a full payload.
    fn from_payload(
        header: ObjectHeader,
        payload: Bytes,
        owner: &DatabaseRef,
    ) -> plumbline_parse::Result<Self>;

    /// Wraps into the [`Object`] enum.
    fn into_object(self) -> Object;

    /// Unwraps from the [`Object`] enum, returning it unchanged on a type mismatch.
    fn from_object(object: Object) -> std::result::Result<Self, Object>;
}

/// A parsed commit.
#[derive(Debug, Clone)]
pub struct Commit {
    header: ObjectHeader,
    data: CommitData,
    owner: DatabaseRef,
}

impl Commit {
    /// The commit id.
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    /// Header as reported by the batch process.
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// All parsed fields.
    pub fn data(&self) -> &CommitData {
        &self.data
    }

    /// Root tree id.
    pub fn tree_id(&self) -> ObjectId {
        self.data.tree
    }

    /// Parent ids, first parent first.
    pub fn parent_ids(&self) -> &[ObjectId] {
        &self.data.parents
    }

    /// Author identity.
    pub fn author(&self) -> &Identity {
        &self.data.author
    }

    /// Committer identity.
    pub fn committer(&self) -> &Identity {
        &self.data.committer
    }

    /// Full message.
    pub fn message(&self) -> &StringUtf8 {
        &self.data.message
    }

    /// First line of the message.
    pub fn first_line(&self) -> &StringUtf8 {
        &self.data.first_line
    }

    /// Whether this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.data.is_merge()
    }

    /// Reads the root tree.
    pub fn tree(&self) -> Result<Tree> {
        self.owner.upgrade()?.read_object::<Tree>(&self.data.tree)
    }

    /// Reads parent `n`, or `None` if there are fewer parents.
    pub fn parent(&self, n: usize) -> Result<Option<Commit>> {
        match self.data.parents.get(n) {
            Some(id) => Ok(Some(self.owner.upgrade()?.read_object::<Commit>(id)?)),
            None => Ok(None),
        }
    }
}

impl ObjectKind for Commit {
    const TYPE: ObjectType = ObjectType::Commit;

    fn from_payload(
        header: ObjectHeader,
        payload: Bytes,
        owner: &DatabaseRef,
    ) -> plumbline_parse::Result<Self> {
        Ok(Self {
            header,
            data: CommitParser::new().parse_complete(&payload)?,
            owner: owner.clone(),
        })
    }

    fn into_object(self) -> Object {
        Object::Commit(self)
    }

    fn from_object(object: Object) -> std::result::Result<Self, Object> {
        match object {
            Object::Commit(commit) => Ok(commit),
            other => Err(other),
        }
    }
}

/// A parsed tree.
#[derive(Debug, Clone)]
pub struct Tree {
    header: ObjectHeader,
    data: TreeData,
    owner: DatabaseRef,
}

impl Tree {
    /// The tree id.
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    /// Header as reported by the batch process.
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// Entries in stored order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.data.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Finds an entry by name.
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&TreeEntry> {
        self.data.get(name.as_ref())
    }

    /// Keeps only entries matching `filter`.
    pub fn filtered<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&TreeEntry) -> bool,
    {
        self.data.entries.retain(filter);
        self
    }

    /// Reads the object an entry points at.
    pub fn entry_object(&self, name: impl AsRef<[u8]>) -> Result<Option<Object>> {
        match self.get(name) {
            Some(entry) => Ok(Some(self.owner.upgrade()?.read(&entry.id)?)),
            None => Ok(None),
        }
    }

    /// Reads a child tree by name.
    pub fn subtree(&self, name: impl AsRef<[u8]>) -> Result<Option<Tree>> {
        match self.get(name) {
            Some(entry) if entry.is_tree() => {
                Ok(Some(self.owner.upgrade()?.read_object::<Tree>(&entry.id)?))
            }
            Some(entry) => Err(OdbError::TypeMismatch {
                id: entry.id,
                expected: ObjectType::Tree,
                actual: entry.object_type,
            }),
            None => Ok(None),
        }
    }
}

impl ObjectKind for Tree {
    const TYPE: ObjectType = ObjectType::Tree;

    fn from_payload(
        header: ObjectHeader,
        payload: Bytes,
        owner: &DatabaseRef,
    ) -> plumbline_parse::Result<Self> {
        Ok(Self {
            header,
            data: TreeParser::new().parse_complete(&payload)?,
            owner: owner.clone(),
        })
    }

    fn into_object(self) -> Object {
        Object::Tree(self)
    }

    fn from_object(object: Object) -> std::result::Result<Self, Object> {
        match object {
            Object::Tree(tree) => Ok(tree),
            other => Err(other),
        }
    }
}

/// A blob with its content in memory.
///
/// Use [`ObjectDatabase::stream_blob`] for content too large to buffer.
#[derive(Debug, Clone)]
pub struct Blob {
    header: ObjectHeader,
    content: Bytes,
}

impl Blob {
    /// The blob id.
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    /// Header as reported by the batch process.
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// Raw content.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// A reader over the content.
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.content.clone())
    }
}

impl ObjectKind for Blob {
    const TYPE: ObjectType = ObjectType::Blob;

    fn from_payload(
        header: ObjectHeader,
        payload: Bytes,
        _owner: &DatabaseRef,
    ) -> plumbline_parse::Result<Self> {
        Ok(Self {
            header,
            content: payload,
        })
    }

    fn into_object(self) -> Object {
        Object::Blob(self)
    }

    fn from_object(object: Object) -> std::result::Result<Self, Object> {
        match object {
            Object::Blob(blob) => Ok(blob),
            other => Err(other),
        }
    }
}

/// A parsed annotated tag.
#[derive(Debug, Clone)]
pub struct Tag {
    header: ObjectHeader,
    data: TagData,
    owner: DatabaseRef,
}

impl Tag {
    /// The tag object id.
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    /// Header as reported by the batch process.
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// All parsed fields.
    pub fn data(&self) -> &TagData {
        &self.data
    }

    /// Tag name.
    pub fn name(&self) -> &StringUtf8 {
        &self.data.name
    }

    /// Id of the tagged object.
    pub fn target_id(&self) -> ObjectId {
        self.data.object
    }

    /// Declared type of the tagged object.
    pub fn target_type(&self) -> ObjectType {
        self.data.target_type
    }

    /// Tagger identity, absent on some old tags.
    pub fn tagger(&self) -> Option<&Identity> {
        self.data.tagger.as_ref()
    }

    /// Full message.
    pub fn message(&self) -> &StringUtf8 {
        &self.data.message
    }

    /// Reads the tagged object.
    pub fn target_object(&self) -> Result<Object> {
        self.owner.upgrade()?.read(&self.data.object)
    }
}

impl ObjectKind for Tag {
    const TYPE: ObjectType = ObjectType::Tag;

    fn from_payload(
        header: ObjectHeader,
        payload: Bytes,
        owner: &DatabaseRef,
    ) -> plumbline_parse::Result<Self> {
        Ok(Self {
            header,
            data: TagParser::new().parse_complete(&payload)?,
            owner: owner.clone(),
        })
    }

    fn into_object(self) -> Object {
        Object::Tag(self)
    }

    fn from_object(object: Object) -> std::result::Result<Self, Object> {
        match object {
            Object::Tag(tag) => Ok(tag),
            other => Err(other),
        }
    }
}

/// Any object, dispatched on the type reported by git.
#[derive(Debug, Clone)]
pub enum Object {
    /// A commit.
    Commit(Commit),
    /// A tree.
    Tree(Tree),
    /// A blob.
    Blob(Blob),
    /// An annotated tag.
    Tag(Tag),
}

impl Object {
    /// Decodes `payload` with the parser for `header.object_type`.
    pub fn from_payload(
        header: ObjectHeader,
        payload: Bytes,
        owner: &DatabaseRef,
    ) -> plumbline_parse::Result<Self> {
        Ok(match header.object_type {
            ObjectType::Commit => Commit::from_payload(header, payload, owner)?.into_object(),
            ObjectType::Tree => Tree::from_payload(header, payload, owner)?.into_object(),
            ObjectType::Blob => Blob::from_payload(header, payload, owner)?.into_object(),
            ObjectType::Tag => Tag::from_payload(header, payload, owner)?.into_object(),
        })
    }

    /// Header as reported by the batch process.
    pub fn header(&self) -> &ObjectHeader {
        match self {
            Self::Commit(o) => o.header(),
            Self::Tree(o) => o.header(),
            Self::Blob(o) => o.header(),
            Self::Tag(o) => o.header(),
        }
    }

    /// The object id.
    pub fn id(&self) -> ObjectId {
        self.header().id
    }

    /// The object type.
    pub fn object_type(&self) -> ObjectType {
        self.header().object_type
    }

    /// Converts into a specific kind.
    pub fn into_kind<T: ObjectKind>(self) -> Result<T> {
        T::from_object(self).map_err(|other| OdbError::TypeMismatch {
            id: other.id(),
            expected: T::TYPE,
            actual: other.object_type(),
        })
    }
}
