//! Git file modes.

use crate::{Error, ObjectType, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A git file mode, as found in tree entries and diff records.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMode(u32);

impl FileMode {
    /// No mode (the path does not exist on this side).
    pub const NONE: FileMode = FileMode(0);
    /// Subdirectory.
    pub const TREE: FileMode = FileMode(0o040000);
    /// Regular file.
    pub const BLOB: FileMode = FileMode(0o100644);
    /// Group-writable regular file, found in old repositories.
    pub const BLOB_GROUP_WRITABLE: FileMode = FileMode(0o100664);
    /// Executable file.
    pub const EXECUTABLE: FileMode = FileMode(0o100755);
    /// Symbolic link.
    pub const SYMLINK: FileMode = FileMode(0o120000);
    /// Submodule commit.
    pub const GITLINK: FileMode = FileMode(0o160000);

    /// Creates a mode from its numeric value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the numeric value.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Parses ASCII octal digits.
    pub fn parse_octal(digits: &[u8]) -> Result<Self> {
        if digits.is_empty() || digits.len() > 7 {
            return Err(Error::InvalidMode(
                String::from_utf8_lossy(digits).into_owned(),
            ));
        }
        let mut value = 0u32;
        for &b in digits {
            if !(b'0'..=b'7').contains(&b) {
                return Err(Error::InvalidMode(
                    String::from_utf8_lossy(digits).into_owned(),
                ));
            }
            value = (value << 3) | u32::from(b - b'0');
        }
        Ok(Self(value))
    }

    /// Returns true when the path is absent on this side.
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Returns true for subdirectories.
    pub fn is_tree(&self) -> bool {
        self.0 & 0o170000 == 0o040000
    }

    /// Returns true for submodule entries.
    pub fn is_gitlink(&self) -> bool {
        self.0 & 0o170000 == 0o160000
    }

    /// Object type an entry with this mode points to.
    pub fn object_type(&self) -> Option<ObjectType> {
        match self.0 & 0o170000 {
            0 => None,
            0o040000 => Some(ObjectType::Tree),
            0o160000 => Some(ObjectType::Commit),
            _ => Some(ObjectType::Blob),
        }
    }
}

impl fmt::Debug for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileMode({:06o})", self.0)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.0)
    }
}
