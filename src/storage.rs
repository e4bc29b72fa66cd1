//! Storage-node operation protocols.
//!
//! Every operation resolves a storage node through the tracker (cached per
//! client instance after the first call), checks a pooled connection out
//! for it, sends one request frame, and reads one response frame. File
//! content is streamed in fixed-size chunks in both directions, so file
//! size is never bounded by memory. A transport or framing failure
//! force-closes the connection; a clean exchange releases it even when the
//! server answered with an application error status.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::errors::{Error, Result};
use crate::pool::PoolRegistry;
use crate::protocol::{
    self, FilenameInfo, FILE_EXT_NAME_MAX_LEN, FILE_PREFIX_MAX_LEN, GROUP_NAME_MAX_LEN,
    PKG_LEN_SIZE, PROTO_CMD_RESP, PROTO_HEADER_LEN, QUERY_FILE_INFO_BODY_LEN,
};
use crate::tracker::TrackerClient;
use crate::types::{
    FileId, FileInfo, FileKind, Metadata, MetadataFlag, StorageCommand, StorageNode,
};

/// Chunk size used when streaming file content in either direction
pub const STREAM_CHUNK_SIZE: usize = 256 * 1024;

/// Client for storage-node file operations.
///
/// Instances are not meant for concurrent use: operations take `&mut self`
/// and callers needing parallelism create one client per task via
/// [`crate::Cluster::storage_client`], sharing only the configuration and
/// the connection-pool registry.
pub struct StorageClient {
    pools: Arc<PoolRegistry>,
    tracker: TrackerClient,
    storage_node: Option<StorageNode>,
}

impl StorageClient {
    pub(crate) fn new(pools: Arc<PoolRegistry>, tracker: TrackerClient) -> Self {
        Self {
            pools,
            tracker,
            storage_node: None,
        }
    }

    /// Pins every following operation to one storage node instead of
    /// resolving through the tracker.
    pub fn set_storage_node(&mut self, node: StorageNode) {
        self.storage_node = Some(node);
    }

    /// Clears a cached or pinned storage node; the next operation resolves
    /// a fresh one.
    pub fn clear_storage_node(&mut self) {
        self.storage_node = None;
    }

    /// The currently cached storage node, if any.
    pub fn storage_node(&self) -> Option<&StorageNode> {
        self.storage_node.as_ref()
    }

    // ---- uploads -------------------------------------------------------

    /// Uploads an in-memory buffer as a new file.
    pub async fn upload_buffer(
        &mut self,
        group_name: Option<&str>,
        data: &[u8],
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let mut reader = data;
        self.do_upload(
            StorageCommand::UploadFile,
            group_name,
            None,
            ext_name,
            data.len() as u64,
            &mut reader,
            metadata,
        )
        .await
    }

    /// Uploads an in-memory buffer as a new appender file.
    pub async fn upload_appender_buffer(
        &mut self,
        group_name: Option<&str>,
        data: &[u8],
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let mut reader = data;
        self.do_upload(
            StorageCommand::UploadAppenderFile,
            group_name,
            None,
            ext_name,
            data.len() as u64,
            &mut reader,
            metadata,
        )
        .await
    }

    /// Uploads a local file, streaming its content.
    ///
    /// When `ext_name` is `None` the extension is taken from the local
    /// filename.
    pub async fn upload_file(
        &mut self,
        group_name: Option<&str>,
        local_path: impl AsRef<Path>,
        ext_name: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let (mut file, size, ext) = open_content_file(local_path.as_ref(), ext_name).await?;
        self.do_upload(
            StorageCommand::UploadFile,
            group_name,
            None,
            &ext,
            size,
            &mut file,
            metadata,
        )
        .await
    }

    /// Uploads a local file as an appender file.
    pub async fn upload_appender_file(
        &mut self,
        group_name: Option<&str>,
        local_path: impl AsRef<Path>,
        ext_name: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let (mut file, size, ext) = open_content_file(local_path.as_ref(), ext_name).await?;
        self.do_upload(
            StorageCommand::UploadAppenderFile,
            group_name,
            None,
            &ext,
            size,
            &mut file,
            metadata,
        )
        .await
    }

    /// Uploads `size` bytes pulled from an arbitrary content source.
    pub async fn upload_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        group_name: Option<&str>,
        reader: &mut R,
        size: u64,
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        self.do_upload(
            StorageCommand::UploadFile,
            group_name,
            None,
            ext_name,
            size,
            reader,
            metadata,
        )
        .await
    }

    /// Uploads `size` bytes from a content source as an appender file.
    pub async fn upload_appender_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        group_name: Option<&str>,
        reader: &mut R,
        size: u64,
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        self.do_upload(
            StorageCommand::UploadAppenderFile,
            group_name,
            None,
            ext_name,
            size,
            reader,
            metadata,
        )
        .await
    }

    /// Uploads an in-memory buffer as a slave file of `master`.
    pub async fn upload_slave_buffer(
        &mut self,
        master: &FileId,
        prefix_name: &str,
        data: &[u8],
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let mut reader = data;
        self.do_upload(
            StorageCommand::UploadSlaveFile,
            None,
            Some((master, prefix_name)),
            ext_name,
            data.len() as u64,
            &mut reader,
            metadata,
        )
        .await
    }

    /// Uploads a local file as a slave file of `master`.
    pub async fn upload_slave_file(
        &mut self,
        master: &FileId,
        prefix_name: &str,
        local_path: impl AsRef<Path>,
        ext_name: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let (mut file, size, ext) = open_content_file(local_path.as_ref(), ext_name).await?;
        self.do_upload(
            StorageCommand::UploadSlaveFile,
            None,
            Some((master, prefix_name)),
            &ext,
            size,
            &mut file,
            metadata,
        )
        .await
    }

    /// Uploads `size` bytes from a content source as a slave file.
    pub async fn upload_slave_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        master: &FileId,
        prefix_name: &str,
        reader: &mut R,
        size: u64,
        ext_name: &str,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        self.do_upload(
            StorageCommand::UploadSlaveFile,
            None,
            Some((master, prefix_name)),
            ext_name,
            size,
            reader,
            metadata,
        )
        .await
    }

    /// Shared upload path for normal, appender, and slave files.
    ///
    /// When metadata is supplied, a second round trip sets it in overwrite
    /// mode after a successful upload. If that round trip fails the just
    /// created file is deleted best-effort and the metadata error is
    /// reported; a failure of the cleanup delete itself is swallowed, so
    /// callers cannot tell a cleaned-up file from an orphaned one.
    async fn do_upload<R: AsyncRead + Unpin>(
        &mut self,
        cmd: StorageCommand,
        group_name: Option<&str>,
        slave: Option<(&FileId, &str)>,
        ext_name: &str,
        size: u64,
        reader: &mut R,
        metadata: Option<&Metadata>,
    ) -> Result<FileId> {
        let node = match slave {
            Some((master, prefix_name)) => {
                ensure_file_id(master)?;
                if prefix_name.is_empty() {
                    return Err(Error::InvalidArgument(
                        "a prefix name is required for slave files".to_string(),
                    ));
                }
                self.updatable_node(master).await?
            }
            None => self.writable_node(group_name).await?,
        };

        let ext_field = protocol::pad_text(ext_name, FILE_EXT_NAME_MAX_LEN);
        let mut fixed = BytesMut::new();
        match slave {
            Some((master, prefix_name)) => {
                let master_bytes = master.remote_path().as_bytes();
                let body_len = (2 * PKG_LEN_SIZE
                    + FILE_PREFIX_MAX_LEN
                    + FILE_EXT_NAME_MAX_LEN
                    + master_bytes.len()) as u64
                    + size;
                fixed.put_slice(&protocol::pack_header(cmd.into(), body_len, 0));
                fixed.put_u64(master_bytes.len() as u64);
                fixed.put_u64(size);
                fixed.put(protocol::pad_text(prefix_name, FILE_PREFIX_MAX_LEN));
                fixed.put(ext_field);
                fixed.put_slice(master_bytes);
            }
            None => {
                let body_len = (1 + PKG_LEN_SIZE + FILE_EXT_NAME_MAX_LEN) as u64 + size;
                fixed.put_slice(&protocol::pack_header(cmd.into(), body_len, 0));
                fixed.put_u8(node.store_path_index);
                fixed.put_u64(size);
                fixed.put(ext_field);
            }
        }

        let mut conn = self.pools.acquire(&node.endpoint).await?;
        let result = upload_exchange(&mut conn, &fixed, reader, size).await;
        let file = self.pools.settle(conn, result).await?;

        if let Some(metadata) = metadata {
            if !metadata.is_empty() {
                if let Err(meta_err) = self
                    .set_metadata(&file, metadata, MetadataFlag::Overwrite)
                    .await
                {
                    if let Err(cleanup_err) = self.delete_file(&file).await {
                        warn!(
                            file = %file,
                            error = %cleanup_err,
                            "cleanup delete after failed metadata write also failed; \
                             the remote file may be orphaned"
                        );
                    }
                    return Err(meta_err);
                }
            }
        }

        Ok(file)
    }

    // ---- appender mutations --------------------------------------------

    /// Appends an in-memory buffer to an appender file.
    pub async fn append_buffer(&mut self, file: &FileId, data: &[u8]) -> Result<()> {
        let mut reader = data;
        self.do_append(file, data.len() as u64, &mut reader).await
    }

    /// Appends a local file's content to an appender file.
    pub async fn append_file(
        &mut self,
        file: &FileId,
        local_path: impl AsRef<Path>,
    ) -> Result<()> {
        let (mut content, size, _) = open_content_file(local_path.as_ref(), Some("")).await?;
        self.do_append(file, size, &mut content).await
    }

    /// Appends `size` bytes from a content source to an appender file.
    pub async fn append_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        file: &FileId,
        reader: &mut R,
        size: u64,
    ) -> Result<()> {
        self.do_append(file, size, reader).await
    }

    async fn do_append<R: AsyncRead + Unpin>(
        &mut self,
        file: &FileId,
        size: u64,
        reader: &mut R,
    ) -> Result<()> {
        ensure_file_id(file)?;
        let node = self.updatable_node(file).await?;
        let path = file.remote_path().as_bytes();
        let body_len = (2 * PKG_LEN_SIZE + path.len()) as u64 + size;
        let mut fixed = BytesMut::with_capacity(PROTO_HEADER_LEN + 2 * PKG_LEN_SIZE + path.len());
        fixed.put_slice(&protocol::pack_header(
            StorageCommand::AppendFile.into(),
            body_len,
            0,
        ));
        fixed.put_u64(path.len() as u64);
        fixed.put_u64(size);
        fixed.put_slice(path);

        let mut conn = self.pools.acquire(&node.endpoint).await?;
        let result = content_exchange(&mut conn, &fixed, reader, size, Some(0)).await;
        self.pools.settle(conn, result).await?;
        Ok(())
    }

    /// Overwrites a region of an appender file with an in-memory buffer.
    pub async fn modify_buffer(
        &mut self,
        file: &FileId,
        file_offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let mut reader = data;
        self.do_modify(file, file_offset, data.len() as u64, &mut reader)
            .await
    }

    /// Overwrites a region of an appender file with a local file's content.
    pub async fn modify_file(
        &mut self,
        file: &FileId,
        file_offset: u64,
        local_path: impl AsRef<Path>,
    ) -> Result<()> {
        let (mut content, size, _) = open_content_file(local_path.as_ref(), Some("")).await?;
        self.do_modify(file, file_offset, size, &mut content).await
    }

    /// Overwrites a region of an appender file from a content source.
    pub async fn modify_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        file: &FileId,
        file_offset: u64,
        reader: &mut R,
        size: u64,
    ) -> Result<()> {
        self.do_modify(file, file_offset, size, reader).await
    }

    async fn do_modify<R: AsyncRead + Unpin>(
        &mut self,
        file: &FileId,
        file_offset: u64,
        size: u64,
        reader: &mut R,
    ) -> Result<()> {
        ensure_file_id(file)?;
        let node = self.updatable_node(file).await?;
        let path = file.remote_path().as_bytes();
        let body_len = (3 * PKG_LEN_SIZE + path.len()) as u64 + size;
        let mut fixed = BytesMut::with_capacity(PROTO_HEADER_LEN + 3 * PKG_LEN_SIZE + path.len());
        fixed.put_slice(&protocol::pack_header(
            StorageCommand::ModifyFile.into(),
            body_len,
            0,
        ));
        fixed.put_u64(path.len() as u64);
        fixed.put_u64(file_offset);
        fixed.put_u64(size);
        fixed.put_slice(path);

        let mut conn = self.pools.acquire(&node.endpoint).await?;
        let result = content_exchange(&mut conn, &fixed, reader, size, Some(0)).await;
        self.pools.settle(conn, result).await?;
        Ok(())
    }

    /// Truncates an appender file to a target size.
    pub async fn truncate_file(&mut self, file: &FileId, truncated_size: u64) -> Result<()> {
        ensure_file_id(file)?;
        let node = self.updatable_node(file).await?;
        let path = file.remote_path().as_bytes();
        let body_len = 2 * PKG_LEN_SIZE + path.len();
        let mut request = BytesMut::with_capacity(PROTO_HEADER_LEN + body_len);
        request.put_slice(&protocol::pack_header(
            StorageCommand::TruncateFile.into(),
            body_len as u64,
            0,
        ));
        request.put_u64(path.len() as u64);
        request.put_u64(truncated_size);
        request.put_slice(path);
        self.node_round_trip(&node, &request, Some(0)).await?;
        Ok(())
    }

    /// Truncates an appender file to zero bytes.
    pub async fn truncate_file_to_zero(&mut self, file: &FileId) -> Result<()> {
        self.truncate_file(file, 0).await
    }

    /// Asks the storage node for a fresh filename for an appender file,
    /// returning the new identity.
    pub async fn regenerate_appender_filename(&mut self, file: &FileId) -> Result<FileId> {
        ensure_file_id(file)?;
        let node = self.updatable_node(file).await?;
        let path = file.remote_path().as_bytes();
        let mut request = BytesMut::with_capacity(PROTO_HEADER_LEN + path.len());
        request.put_slice(&protocol::pack_header(
            StorageCommand::RegenerateAppenderFilename.into(),
            path.len() as u64,
            0,
        ));
        request.put_slice(path);

        let mut conn = self.pools.acquire(&node.endpoint).await?;
        let result = match conn.request(&request, PROTO_CMD_RESP, None).await {
            Ok(body) => parse_new_file_id(&body),
            Err(err) => Err(err),
        };
        self.pools.settle(conn, result).await
    }

    // ---- deletion and metadata -----------------------------------------

    /// Deletes a file.
    pub async fn delete_file(&mut self, file: &FileId) -> Result<()> {
        let node = self.updatable_node(file).await?;
        let request = file_request(StorageCommand::DeleteFile, file);
        self.node_round_trip(&node, &request, Some(0)).await?;
        Ok(())
    }

    /// Writes metadata for a file with the given write semantics.
    pub async fn set_metadata(
        &mut self,
        file: &FileId,
        metadata: &Metadata,
        flag: MetadataFlag,
    ) -> Result<()> {
        let node = self.updatable_node(file).await?;
        let meta_bytes = protocol::encode_metadata(metadata);
        let path = file.remote_path().as_bytes();
        let body_len = 2 * PKG_LEN_SIZE + 1 + GROUP_NAME_MAX_LEN + path.len() + meta_bytes.len();
        let mut request = BytesMut::with_capacity(PROTO_HEADER_LEN + body_len);
        request.put_slice(&protocol::pack_header(
            StorageCommand::SetMetadata.into(),
            body_len as u64,
            0,
        ));
        request.put_u64(path.len() as u64);
        request.put_u64(meta_bytes.len() as u64);
        request.put_u8(flag.into());
        request.put(protocol::pad_text(file.group(), GROUP_NAME_MAX_LEN));
        request.put_slice(path);
        request.put(meta_bytes);
        self.node_round_trip(&node, &request, Some(0)).await?;
        Ok(())
    }

    /// Reads all metadata attached to a file.
    pub async fn get_metadata(&mut self, file: &FileId) -> Result<Metadata> {
        let node = self.updatable_node(file).await?;
        let request = file_request(StorageCommand::GetMetadata, file);
        let body = self.node_round_trip(&node, &request, None).await?;
        Ok(protocol::decode_metadata(&body))
    }

    // ---- downloads -----------------------------------------------------

    /// Downloads a whole file into memory.
    pub async fn download_bytes(&mut self, file: &FileId) -> Result<Bytes> {
        self.download_bytes_range(file, 0, 0).await
    }

    /// Downloads up to `max_bytes` starting at `offset` into memory;
    /// `max_bytes` 0 means everything from the offset on.
    pub async fn download_bytes_range(
        &mut self,
        file: &FileId,
        offset: u64,
        max_bytes: u64,
    ) -> Result<Bytes> {
        let node = self.readable_node(file).await?;
        let request = download_request(file, offset, max_bytes);
        self.node_round_trip(&node, &request, None).await
    }

    /// Streams a file region into a writer, returning the byte count.
    ///
    /// The declared body length must arrive in full; a short stream is a
    /// protocol error.
    pub async fn download_to_writer<W: AsyncWrite + Unpin>(
        &mut self,
        file: &FileId,
        offset: u64,
        max_bytes: u64,
        writer: &mut W,
    ) -> Result<u64> {
        let node = self.readable_node(file).await?;
        let request = download_request(file, offset, max_bytes);
        let mut conn = self.pools.acquire(&node.endpoint).await?;
        let result = stream_download(&mut conn, &request, writer).await;
        self.pools.settle(conn, result).await
    }

    /// Streams a whole file into a local file.
    ///
    /// On any failure the partially written local file is removed.
    pub async fn download_to_file(
        &mut self,
        file: &FileId,
        local_path: impl AsRef<Path>,
    ) -> Result<u64> {
        let path = local_path.as_ref();
        let mut output = fs::File::create(path).await?;
        match self.download_to_writer(file, 0, 0, &mut output).await {
            Ok(written) => Ok(written),
            Err(err) => {
                drop(output);
                if let Err(remove_err) = fs::remove_file(path).await {
                    debug!(
                        path = %path.display(),
                        error = %remove_err,
                        "could not remove partial download"
                    );
                }
                Err(err)
            }
        }
    }

    // ---- file information ----------------------------------------------

    /// Returns file information, decoding it from the filename when
    /// possible.
    ///
    /// Appender and slave files mutate after creation, so their embedded
    /// values are stale; those fall back to [`Self::query_file_info`]
    /// automatically. Normal files decode with zero network calls.
    pub async fn get_file_info(&mut self, file: &FileId) -> Result<FileInfo> {
        match protocol::file_info_from_filename(file.remote_path())? {
            FilenameInfo::Decoded(info) => Ok(info),
            FilenameInfo::NeedsQuery(kind) => {
                let mut info = self.query_file_info(file).await?;
                info.kind = kind;
                Ok(info)
            }
        }
    }

    /// Queries the storage node for authoritative file information.
    pub async fn query_file_info(&mut self, file: &FileId) -> Result<FileInfo> {
        let node = self.updatable_node(file).await?;
        let request = file_request(StorageCommand::QueryFileInfo, file);
        let body = self
            .node_round_trip(&node, &request, Some(QUERY_FILE_INFO_BODY_LEN as u64))
            .await?;

        let size = protocol::decode_u64(&body[..PKG_LEN_SIZE]);
        let create_timestamp = protocol::decode_u64(&body[PKG_LEN_SIZE..2 * PKG_LEN_SIZE]);
        let crc32 = protocol::decode_u64(&body[2 * PKG_LEN_SIZE..3 * PKG_LEN_SIZE]) as u32;
        let source_ip = protocol::unpad_text(&body[3 * PKG_LEN_SIZE..]);

        Ok(FileInfo {
            fetched_from_server: true,
            kind: FileKind::Normal,
            size,
            create_time: SystemTime::UNIX_EPOCH + Duration::from_secs(create_timestamp),
            crc32,
            source_ip,
        })
    }

    // ---- node resolution -----------------------------------------------

    async fn writable_node(&mut self, group_name: Option<&str>) -> Result<StorageNode> {
        if let Some(node) = &self.storage_node {
            return Ok(node.clone());
        }
        let node = self.tracker.resolve_store(group_name).await?;
        self.storage_node = Some(node.clone());
        Ok(node)
    }

    async fn readable_node(&mut self, file: &FileId) -> Result<StorageNode> {
        if let Some(node) = &self.storage_node {
            return Ok(node.clone());
        }
        let node = self
            .tracker
            .resolve_fetch(file.group(), file.remote_path())
            .await?;
        self.storage_node = Some(node.clone());
        Ok(node)
    }

    async fn updatable_node(&mut self, file: &FileId) -> Result<StorageNode> {
        if let Some(node) = &self.storage_node {
            return Ok(node.clone());
        }
        let node = self
            .tracker
            .resolve_update(file.group(), file.remote_path())
            .await?;
        self.storage_node = Some(node.clone());
        Ok(node)
    }

    /// One request/response exchange against a storage node.
    async fn node_round_trip(
        &self,
        node: &StorageNode,
        request: &[u8],
        expect_len: Option<u64>,
    ) -> Result<Bytes> {
        let mut conn = self.pools.acquire(&node.endpoint).await?;
        let result = conn.request(request, PROTO_CMD_RESP, expect_len).await;
        self.pools.settle(conn, result).await
    }
}

/// Opens a local file for streaming and works out its size and extension.
async fn open_content_file(
    path: &Path,
    ext_name: Option<&str>,
) -> Result<(fs::File, u64, String)> {
    let ext = match ext_name {
        Some(ext) => ext.to_string(),
        None => protocol::file_ext_name(&path.to_string_lossy()),
    };
    let file = fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    Ok((file, size, ext))
}

/// Streams exactly `size` bytes from a content source into the connection.
///
/// A source that errors or runs dry aborts the call with its own error; the
/// connection is then force-closed by the caller because the request body
/// is incomplete.
async fn stream_content<R: AsyncRead + Unpin>(
    conn: &mut Connection,
    reader: &mut R,
    size: u64,
) -> Result<()> {
    let mut remaining = size;
    if remaining == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let read = reader.read(&mut buf[..want]).await?;
        if read == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "content source ended before the declared size",
            )));
        }
        conn.write_all(&buf[..read]).await?;
        remaining -= read as u64;
    }
    Ok(())
}

async fn upload_exchange<R: AsyncRead + Unpin>(
    conn: &mut Connection,
    fixed: &[u8],
    reader: &mut R,
    size: u64,
) -> Result<FileId> {
    let body = content_exchange(conn, fixed, reader, size, None).await?;
    parse_new_file_id(&body)
}

async fn content_exchange<R: AsyncRead + Unpin>(
    conn: &mut Connection,
    fixed: &[u8],
    reader: &mut R,
    size: u64,
    expect_len: Option<u64>,
) -> Result<Bytes> {
    conn.write_all(fixed).await?;
    stream_content(conn, reader, size).await?;
    conn.recv_package(PROTO_CMD_RESP, expect_len).await
}

/// Pumps a download response body into a writer in fixed-size chunks,
/// enforcing that exactly the declared length arrives.
async fn stream_download<W: AsyncWrite + Unpin>(
    conn: &mut Connection,
    request: &[u8],
    writer: &mut W,
) -> Result<u64> {
    conn.write_all(request).await?;
    let header = conn.recv_header(PROTO_CMD_RESP, None).await?;
    header.ensure_ok()?;

    let total = header.length;
    let mut remaining = total;
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let read = conn.read_some(&mut buf[..want]).await?;
        if read == 0 {
            return Err(Error::Protocol(format!(
                "connection closed after {} of {} body bytes",
                total - remaining,
                total
            )));
        }
        writer.write_all(&buf[..read]).await?;
        remaining -= read as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Parses a response body carrying a new file identity: the fixed group
/// field followed by the generated filename, which must be non-empty.
fn parse_new_file_id(body: &[u8]) -> Result<FileId> {
    if body.len() <= GROUP_NAME_MAX_LEN {
        return Err(Error::Protocol(format!(
            "new-file response body too short: {} bytes",
            body.len()
        )));
    }
    let group = protocol::unpad_text(&body[..GROUP_NAME_MAX_LEN]);
    let remote_path = String::from_utf8_lossy(&body[GROUP_NAME_MAX_LEN..]).to_string();
    Ok(FileId::new(group, remote_path))
}

/// Builds a request whose body is the padded group name plus the filename.
fn file_request(cmd: StorageCommand, file: &FileId) -> Bytes {
    let path = file.remote_path().as_bytes();
    let body_len = GROUP_NAME_MAX_LEN + path.len();
    let mut request = BytesMut::with_capacity(PROTO_HEADER_LEN + body_len);
    request.put_slice(&protocol::pack_header(cmd.into(), body_len as u64, 0));
    request.put(protocol::pad_text(file.group(), GROUP_NAME_MAX_LEN));
    request.put_slice(path);
    request.freeze()
}

/// Builds a download request: offset, byte count, group, filename.
fn download_request(file: &FileId, offset: u64, max_bytes: u64) -> Bytes {
    let path = file.remote_path().as_bytes();
    let body_len = 2 * PKG_LEN_SIZE + GROUP_NAME_MAX_LEN + path.len();
    let mut request = BytesMut::with_capacity(PROTO_HEADER_LEN + body_len);
    request.put_slice(&protocol::pack_header(
        StorageCommand::DownloadFile.into(),
        body_len as u64,
        0,
    ));
    request.put_u64(offset);
    request.put_u64(max_bytes);
    request.put(protocol::pad_text(file.group(), GROUP_NAME_MAX_LEN));
    request.put_slice(path);
    request.freeze()
}

fn ensure_file_id(file: &FileId) -> Result<()> {
    if file.group().is_empty() || file.remote_path().is_empty() {
        return Err(Error::InvalidArgument(
            "a group name and filename are both required".to_string(),
        ));
    }
    Ok(())
}
