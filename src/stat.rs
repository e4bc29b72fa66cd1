//! Cluster statistics records returned by tracker list operations.
//!
//! List responses are arrays of fixed-size records. Each record type
//! declares its size and a field-by-field decoder driven by a byte cursor;
//! one generic routine validates that the body length divides evenly and
//! maps the chunks.

use std::time::{Duration, SystemTime};

use crate::errors::{Error, Result};
use crate::protocol::{
    self, DOMAIN_NAME_MAX_SIZE, GROUP_NAME_MAX_LEN, IP_ADDR_SIZE, STORAGE_ID_MAX_SIZE,
    VERSION_SIZE,
};
use crate::types::StorageStatus;

/// A fixed-size wire record that can decode itself from one chunk.
pub trait RecordDecode: Sized {
    /// Exact byte size of one record on the wire
    const SIZE: usize;

    /// Decodes one record; `record` is exactly [`Self::SIZE`] bytes.
    fn decode(record: &[u8]) -> Self;
}

/// Decodes a response body holding zero or more fixed-size records.
pub fn decode_records<T: RecordDecode>(body: &[u8]) -> Result<Vec<T>> {
    if body.len() % T::SIZE != 0 {
        return Err(Error::Protocol(format!(
            "response body length {} is not a multiple of the {}-byte record size",
            body.len(),
            T::SIZE
        )));
    }
    Ok(body.chunks_exact(T::SIZE).map(T::decode).collect())
}

/// Sequential field cursor over one record.
struct FieldReader<'a> {
    record: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(record: &'a [u8]) -> Self {
        Self { record, offset: 0 }
    }

    fn text(&mut self, width: usize) -> String {
        let value = protocol::unpad_text(&self.record[self.offset..self.offset + width]);
        self.offset += width;
        value
    }

    fn u64(&mut self) -> u64 {
        let value = protocol::decode_u64(&self.record[self.offset..self.offset + 8]);
        self.offset += 8;
        value
    }

    fn u32(&mut self) -> u32 {
        let value = protocol::decode_u32(&self.record[self.offset..self.offset + 4]);
        self.offset += 4;
        value
    }

    fn byte(&mut self) -> u8 {
        let value = self.record[self.offset];
        self.offset += 1;
        value
    }

    fn flag(&mut self) -> bool {
        self.byte() != 0
    }

    fn time64(&mut self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(self.u64())
    }

    fn time32(&mut self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(self.u32()))
    }
}

/// Statistics of one group, as reported by a tracker.
#[derive(Debug, Clone)]
pub struct GroupStat {
    /// Group name
    pub group_name: String,
    /// Total disk space of the group, in MB
    pub total_mb: u64,
    /// Free disk space of the group, in MB
    pub free_mb: u64,
    /// Free trunk space of the group, in MB
    pub trunk_free_mb: u64,
    /// Number of storage nodes in the group
    pub storage_count: u64,
    /// File-transfer port shared by the group's nodes
    pub storage_port: u64,
    /// HTTP port shared by the group's nodes
    pub storage_http_port: u64,
    /// Number of currently active nodes
    pub active_count: u64,
    /// Index of the node receiving new files
    pub current_write_server: u64,
    /// Store paths per node
    pub store_path_count: u64,
    /// Subdirectories per store path
    pub subdir_count_per_path: u64,
    /// Id of the current trunk file
    pub current_trunk_file_id: u64,
}

impl RecordDecode for GroupStat {
    // group name keeps a trailing NUL on the wire
    const SIZE: usize = GROUP_NAME_MAX_LEN + 1 + 11 * 8;

    fn decode(record: &[u8]) -> Self {
        let mut fields = FieldReader::new(record);
        Self {
            group_name: fields.text(GROUP_NAME_MAX_LEN + 1),
            total_mb: fields.u64(),
            free_mb: fields.u64(),
            trunk_free_mb: fields.u64(),
            storage_count: fields.u64(),
            storage_port: fields.u64(),
            storage_http_port: fields.u64(),
            active_count: fields.u64(),
            current_write_server: fields.u64(),
            store_path_count: fields.u64(),
            subdir_count_per_path: fields.u64(),
            current_trunk_file_id: fields.u64(),
        }
    }
}

/// Statistics of one storage node, as reported by a tracker.
#[derive(Debug, Clone)]
pub struct StorageStat {
    /// Node status
    pub status: StorageStatus,
    /// Node id
    pub id: String,
    /// Node address
    pub ip_addr: String,
    /// Node domain name, if configured
    pub domain_name: String,
    /// Address of the node this one synced from
    pub src_ip_addr: String,
    /// Server software version
    pub version: String,
    /// When the node joined the cluster
    pub join_time: SystemTime,
    /// When the node last came up
    pub up_time: SystemTime,
    /// Total disk space, in MB
    pub total_mb: u64,
    /// Free disk space, in MB
    pub free_mb: u64,
    /// Upload priority relative to its group
    pub upload_priority: u64,
    /// Number of store paths on the node
    pub store_path_count: u64,
    /// Subdirectories per store path
    pub subdir_count_per_path: u64,
    /// Index of the store path receiving new files
    pub current_write_path: u64,
    /// File-transfer port
    pub storage_port: u64,
    /// HTTP port
    pub storage_http_port: u64,
    /// Connections allocated since startup
    pub connection_alloc_count: u32,
    /// Connections currently open
    pub connection_current_count: u32,
    /// Peak concurrent connections
    pub connection_max_count: u32,
    /// Upload attempts
    pub total_upload_count: u64,
    /// Successful uploads
    pub success_upload_count: u64,
    /// Append attempts
    pub total_append_count: u64,
    /// Successful appends
    pub success_append_count: u64,
    /// Modify attempts
    pub total_modify_count: u64,
    /// Successful modifies
    pub success_modify_count: u64,
    /// Truncate attempts
    pub total_truncate_count: u64,
    /// Successful truncates
    pub success_truncate_count: u64,
    /// Set-metadata attempts
    pub total_set_meta_count: u64,
    /// Successful set-metadata calls
    pub success_set_meta_count: u64,
    /// Delete attempts
    pub total_delete_count: u64,
    /// Successful deletes
    pub success_delete_count: u64,
    /// Download attempts
    pub total_download_count: u64,
    /// Successful downloads
    pub success_download_count: u64,
    /// Get-metadata attempts
    pub total_get_meta_count: u64,
    /// Successful get-metadata calls
    pub success_get_meta_count: u64,
    /// Link-creation attempts
    pub total_create_link_count: u64,
    /// Successful link creations
    pub success_create_link_count: u64,
    /// Link-deletion attempts
    pub total_delete_link_count: u64,
    /// Successful link deletions
    pub success_delete_link_count: u64,
    /// Bytes offered for upload
    pub total_upload_bytes: u64,
    /// Bytes successfully uploaded
    pub success_upload_bytes: u64,
    /// Bytes offered for append
    pub total_append_bytes: u64,
    /// Bytes successfully appended
    pub success_append_bytes: u64,
    /// Bytes offered for modify
    pub total_modify_bytes: u64,
    /// Bytes successfully modified
    pub success_modify_bytes: u64,
    /// Bytes requested for download
    pub total_download_bytes: u64,
    /// Bytes successfully downloaded
    pub success_download_bytes: u64,
    /// Bytes received through sync
    pub total_sync_in_bytes: u64,
    /// Bytes successfully received through sync
    pub success_sync_in_bytes: u64,
    /// Bytes sent through sync
    pub total_sync_out_bytes: u64,
    /// Bytes successfully sent through sync
    pub success_sync_out_bytes: u64,
    /// File-open attempts
    pub total_file_open_count: u64,
    /// Successful file opens
    pub success_file_open_count: u64,
    /// File-read attempts
    pub total_file_read_count: u64,
    /// Successful file reads
    pub success_file_read_count: u64,
    /// File-write attempts
    pub total_file_write_count: u64,
    /// Successful file writes
    pub success_file_write_count: u64,
    /// When the node last received a source update
    pub last_source_update: SystemTime,
    /// When the node last received a sync update
    pub last_sync_update: SystemTime,
    /// Timestamp of the last synced change
    pub last_synced_timestamp: SystemTime,
    /// When the node last heartbeated its tracker
    pub last_heart_beat_time: SystemTime,
    /// Whether the node serves as its group's trunk server
    pub is_trunk_server: bool,
}

impl RecordDecode for StorageStat {
    const SIZE: usize = 1
        + STORAGE_ID_MAX_SIZE
        + IP_ADDR_SIZE
        + DOMAIN_NAME_MAX_SIZE
        + IP_ADDR_SIZE
        + VERSION_SIZE
        + 10 * 8
        + 3 * 4
        + 38 * 8
        + 4 * 4
        + 1;

    fn decode(record: &[u8]) -> Self {
        let mut fields = FieldReader::new(record);
        Self {
            status: StorageStatus::from_u8(fields.byte()),
            id: fields.text(STORAGE_ID_MAX_SIZE),
            ip_addr: fields.text(IP_ADDR_SIZE),
            domain_name: fields.text(DOMAIN_NAME_MAX_SIZE),
            src_ip_addr: fields.text(IP_ADDR_SIZE),
            version: fields.text(VERSION_SIZE),
            join_time: fields.time64(),
            up_time: fields.time64(),
            total_mb: fields.u64(),
            free_mb: fields.u64(),
            upload_priority: fields.u64(),
            store_path_count: fields.u64(),
            subdir_count_per_path: fields.u64(),
            current_write_path: fields.u64(),
            storage_port: fields.u64(),
            storage_http_port: fields.u64(),
            connection_alloc_count: fields.u32(),
            connection_current_count: fields.u32(),
            connection_max_count: fields.u32(),
            total_upload_count: fields.u64(),
            success_upload_count: fields.u64(),
            total_append_count: fields.u64(),
            success_append_count: fields.u64(),
            total_modify_count: fields.u64(),
            success_modify_count: fields.u64(),
            total_truncate_count: fields.u64(),
            success_truncate_count: fields.u64(),
            total_set_meta_count: fields.u64(),
            success_set_meta_count: fields.u64(),
            total_delete_count: fields.u64(),
            success_delete_count: fields.u64(),
            total_download_count: fields.u64(),
            success_download_count: fields.u64(),
            total_get_meta_count: fields.u64(),
            success_get_meta_count: fields.u64(),
            total_create_link_count: fields.u64(),
            success_create_link_count: fields.u64(),
            total_delete_link_count: fields.u64(),
            success_delete_link_count: fields.u64(),
            total_upload_bytes: fields.u64(),
            success_upload_bytes: fields.u64(),
            total_append_bytes: fields.u64(),
            success_append_bytes: fields.u64(),
            total_modify_bytes: fields.u64(),
            success_modify_bytes: fields.u64(),
            total_download_bytes: fields.u64(),
            success_download_bytes: fields.u64(),
            total_sync_in_bytes: fields.u64(),
            success_sync_in_bytes: fields.u64(),
            total_sync_out_bytes: fields.u64(),
            success_sync_out_bytes: fields.u64(),
            total_file_open_count: fields.u64(),
            success_file_open_count: fields.u64(),
            total_file_read_count: fields.u64(),
            success_file_read_count: fields.u64(),
            total_file_write_count: fields.u64(),
            success_file_write_count: fields.u64(),
            last_source_update: fields.time32(),
            last_sync_update: fields.time32(),
            last_synced_timestamp: fields.time32(),
            last_heart_beat_time: fields.time32(),
            is_trunk_server: fields.flag(),
        }
    }
}
