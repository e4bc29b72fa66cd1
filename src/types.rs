//! Protocol types shared across the client.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::config::Endpoint;
use crate::errors::{Error, Result};
use crate::protocol::GROUP_NAME_MAX_LEN;

/// Default tracker port
pub const TRACKER_DEFAULT_PORT: u16 = 22122;
/// Default storage-node port
pub const STORAGE_DEFAULT_PORT: u16 = 23000;

/// Tracker protocol commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackerCommand {
    /// List one group's statistics
    ServerListOneGroup = 90,
    /// List statistics of every group
    ServerListAllGroups = 91,
    /// List storage nodes of a group
    ServerListStorage = 92,
    /// Remove a storage node from the cluster
    ServerDeleteStorage = 93,
    /// Resolve one writable storage node, any group
    QueryStoreWithoutGroupOne = 101,
    /// Resolve one readable storage node for a file
    QueryFetchOne = 102,
    /// Resolve one updatable storage node for a file
    QueryUpdate = 103,
    /// Resolve one writable storage node within a group
    QueryStoreWithGroupOne = 104,
    /// Resolve every readable storage node for a file
    QueryFetchAll = 105,
    /// Resolve every writable storage node, any group
    QueryStoreWithoutGroupAll = 106,
    /// Resolve every writable storage node within a group
    QueryStoreWithGroupAll = 107,
}

impl From<TrackerCommand> for u8 {
    fn from(cmd: TrackerCommand) -> u8 {
        cmd as u8
    }
}

/// Storage protocol commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageCommand {
    /// Upload a normal file
    UploadFile = 11,
    /// Delete a file
    DeleteFile = 12,
    /// Set file metadata
    SetMetadata = 13,
    /// Download file content
    DownloadFile = 14,
    /// Fetch file metadata
    GetMetadata = 15,
    /// Upload a slave file linked to a master file
    UploadSlaveFile = 21,
    /// Query authoritative file information
    QueryFileInfo = 22,
    /// Upload an appender file
    UploadAppenderFile = 23,
    /// Append content to an appender file
    AppendFile = 24,
    /// Overwrite a region of an appender file
    ModifyFile = 34,
    /// Truncate an appender file to a target size
    TruncateFile = 36,
    /// Regenerate the filename of an appender file
    RegenerateAppenderFilename = 38,
}

impl From<StorageCommand> for u8 {
    fn from(cmd: StorageCommand) -> u8 {
        cmd as u8
    }
}

/// Storage node status codes as reported by trackers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StorageStatus {
    /// Node is initializing
    Init = 0,
    /// Node is waiting to be synced
    WaitSync = 1,
    /// Node is syncing from its group
    Syncing = 2,
    /// Node changed its IP address
    IpChanged = 3,
    /// Node was deleted from the cluster
    Deleted = 4,
    /// Node is offline
    Offline = 5,
    /// Node is online but not yet serving
    Online = 6,
    /// Node is serving requests
    Active = 7,
    /// Node is recovering
    Recovery = 9,
    /// Status byte was not a known value
    None = 99,
}

impl StorageStatus {
    /// Maps a raw status byte onto the known set.
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => StorageStatus::Init,
            1 => StorageStatus::WaitSync,
            2 => StorageStatus::Syncing,
            3 => StorageStatus::IpChanged,
            4 => StorageStatus::Deleted,
            5 => StorageStatus::Offline,
            6 => StorageStatus::Online,
            7 => StorageStatus::Active,
            9 => StorageStatus::Recovery,
            _ => StorageStatus::None,
        }
    }
}

/// Metadata write semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetadataFlag {
    /// Replace all existing metadata with the new values
    Overwrite = b'O',
    /// Insert missing pairs, update existing ones
    Merge = b'M',
}

impl From<MetadataFlag> for u8 {
    fn from(flag: MetadataFlag) -> u8 {
        flag as u8
    }
}

/// Ordered metadata pairs attached to a remote file.
///
/// Order is preserved on the wire, so a plain vector of pairs is used
/// instead of a map.
pub type Metadata = Vec<(String, String)>;

/// One response/request frame header: body length, command, status.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Length of the body following the header
    pub length: u64,
    /// Command byte
    pub cmd: u8,
    /// Status byte; 0 means success
    pub status: u8,
}

impl FrameHeader {
    /// Converts a nonzero status byte into a server error.
    pub fn ensure_ok(&self) -> Result<()> {
        if self.status != 0 {
            Err(Error::server(self.status))
        } else {
            Ok(())
        }
    }
}

/// The kind of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular immutable file
    Normal,
    /// File that can be appended/modified after creation
    Appender,
    /// File derived from a master file
    Slave,
}

/// Information about a stored file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Whether the values came from a live query rather than the filename
    pub fetched_from_server: bool,
    /// The file kind
    pub kind: FileKind,
    /// File size in bytes
    pub size: u64,
    /// Creation time
    pub create_time: SystemTime,
    /// CRC32 checksum of the content
    pub crc32: u32,
    /// Address of the storage node the file was first written to; empty
    /// when the cluster uses storage ids instead of addresses
    pub source_ip: String,
}

/// A storage node returned by tracker resolution: its endpoint plus the
/// store-path index to echo back on new-file uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNode {
    /// Endpoint of the storage node
    pub endpoint: Endpoint,
    /// Which local storage path on the node new files should land on
    pub store_path_index: u8,
}

/// Addresses a stored file: group name plus server-generated filename.
///
/// The combined "group/filename" string and the (group, filename) pair are
/// two representations of the same identity; [`FileId::parse`] and the
/// `Display` impl convert between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId {
    group: String,
    remote_path: String,
}

impl FileId {
    /// Builds a file id from its two components without validation.
    pub fn new(group: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            remote_path: remote_path.into(),
        }
    }

    /// Parses the combined "group/filename" representation.
    pub fn parse(id: &str) -> Result<Self> {
        let (group, remote_path) = id
            .split_once('/')
            .ok_or_else(|| Error::InvalidFileId(id.to_string()))?;
        if group.is_empty() || group.len() > GROUP_NAME_MAX_LEN || remote_path.is_empty() {
            return Err(Error::InvalidFileId(id.to_string()));
        }
        Ok(Self::new(group, remote_path))
    }

    /// The group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The filename relative to the storage node.
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.remote_path)
    }
}

impl FromStr for FileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_round_trip() {
        let id = FileId::parse("group1/M00/00/00/test.jpg").unwrap();
        assert_eq!(id.group(), "group1");
        assert_eq!(id.remote_path(), "M00/00/00/test.jpg");
        assert_eq!(id.to_string(), "group1/M00/00/00/test.jpg");
    }

    #[test]
    fn file_id_rejects_malformed_input() {
        for id in [
            "",
            "group1",
            "/M00/00/00/test.jpg",
            "group1/",
            "averylonggroupname17/M00/00/00/test.jpg",
        ] {
            assert!(FileId::parse(id).is_err(), "file id {id:?} should be rejected");
        }
    }

    #[test]
    fn storage_status_maps_unknown_codes_to_none() {
        assert_eq!(StorageStatus::from_u8(7), StorageStatus::Active);
        assert_eq!(StorageStatus::from_u8(9), StorageStatus::Recovery);
        assert_eq!(StorageStatus::from_u8(42), StorageStatus::None);
    }
}
