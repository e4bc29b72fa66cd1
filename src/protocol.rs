//! Wire-protocol framing and field encoding.
//!
//! Every exchange is one fixed 10-byte header (8-byte big-endian body
//! length, command byte, status byte) followed by `length` body bytes.
//! Text fields are fixed-width, zero padded and truncated; all numeric
//! fields are big endian. Filenames generated by storage nodes embed a
//! base64 segment carrying the source address, creation time, size, and
//! CRC32 of the file, which lets clients answer metadata queries without
//! a network round trip.

use std::time::{Duration, SystemTime};

use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{Error, Result};
use crate::types::{FileInfo, FileKind, FrameHeader, Metadata};

/// Frame header size: 8-byte body length + command + status
pub const PROTO_HEADER_LEN: usize = 10;
/// Width of every 64-bit length/offset/timestamp field
pub const PKG_LEN_SIZE: usize = 8;
/// Fixed width of a group-name field
pub const GROUP_NAME_MAX_LEN: usize = 16;
/// Width reserved for an IP address field; the last byte stays unused
pub const IP_ADDR_SIZE: usize = 16;
/// Fixed width of a file-extension field
pub const FILE_EXT_NAME_MAX_LEN: usize = 6;
/// Fixed width of a slave-file prefix field
pub const FILE_PREFIX_MAX_LEN: usize = 16;
/// Fixed width of a storage-node id field
pub const STORAGE_ID_MAX_SIZE: usize = 16;
/// Fixed width of a domain-name field in storage statistics
pub const DOMAIN_NAME_MAX_SIZE: usize = 128;
/// Fixed width of a version field in storage statistics
pub const VERSION_SIZE: usize = 6;

/// Response command byte shared by trackers and storage nodes
pub const PROTO_CMD_RESP: u8 = 100;
/// No-op probe used to re-validate pooled connections
pub const PROTO_CMD_ACTIVE_TEST: u8 = 111;

/// Body length of a store-resolution response:
/// group + address + port + store-path index
pub const QUERY_STORE_BODY_LEN: usize =
    GROUP_NAME_MAX_LEN + IP_ADDR_SIZE - 1 + PKG_LEN_SIZE + 1;
/// Body length of a fetch/update-resolution response: group + address + port
pub const QUERY_FETCH_BODY_LEN: usize = GROUP_NAME_MAX_LEN + IP_ADDR_SIZE - 1 + PKG_LEN_SIZE;
/// Body length of a file-info query response
pub const QUERY_FILE_INFO_BODY_LEN: usize = 3 * PKG_LEN_SIZE + IP_ADDR_SIZE;
/// Store-resolution responses never carry more nodes than this
pub const MAX_STORE_NODES_PER_QUERY: usize = 16;

/// Length of the "M00/00/00/" path prefix in a storage filename
pub const FILE_PATH_LEN: usize = 10;
/// Length of the base64 metadata segment embedded in a filename
pub const FILENAME_BASE64_LEN: usize = 27;
/// Extra filename bytes carried by trunk-packed files
pub const TRUNK_FILE_INFO_LEN: usize = 16;
/// Total length of a normal file's logical filename
pub const NORMAL_LOGIC_FILENAME_LEN: usize =
    FILE_PATH_LEN + FILENAME_BASE64_LEN + FILE_EXT_NAME_MAX_LEN + 1;
/// Total length of a trunk-packed file's logical filename
pub const TRUNK_LOGIC_FILENAME_LEN: usize = NORMAL_LOGIC_FILENAME_LEN + TRUNK_FILE_INFO_LEN;

/// Bit set in the embedded size field of appender files
pub const APPENDER_FILE_SIZE_MARK: u64 = 1 << 58;
/// Bit set in the embedded size field of trunk-packed files
pub const TRUNK_FILE_MARK_SIZE: u64 = 1 << 59;

/// Separator between metadata records
pub const RECORD_SEPARATOR: u8 = 0x01;
/// Separator between a metadata name and its value
pub const FIELD_SEPARATOR: u8 = 0x02;

/// Base64 variant used for filename segments: URL-safe alphabet, no
/// padding character on the wire, trailing bits tolerated on decode.
const FILENAME_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Packs a frame header. The header size never varies with the body length.
pub fn pack_header(cmd: u8, body_len: u64, status: u8) -> [u8; PROTO_HEADER_LEN] {
    let mut header = [0u8; PROTO_HEADER_LEN];
    header[..PKG_LEN_SIZE].copy_from_slice(&body_len.to_be_bytes());
    header[PKG_LEN_SIZE] = cmd;
    header[PKG_LEN_SIZE + 1] = status;
    header
}

/// Parses a frame header from the first [`PROTO_HEADER_LEN`] bytes.
pub fn parse_header(data: &[u8]) -> Result<FrameHeader> {
    if data.len() < PROTO_HEADER_LEN {
        return Err(Error::Protocol(format!(
            "header too short: {} bytes",
            data.len()
        )));
    }
    let mut length_bytes = [0u8; PKG_LEN_SIZE];
    length_bytes.copy_from_slice(&data[..PKG_LEN_SIZE]);
    Ok(FrameHeader {
        length: u64::from_be_bytes(length_bytes),
        cmd: data[PKG_LEN_SIZE],
        status: data[PKG_LEN_SIZE + 1],
    })
}

/// Pads text to a fixed-width field, truncating if it is too long.
pub fn pad_text(s: &str, width: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(width);
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(width);
    buf.put_slice(&bytes[..copy_len]);
    buf.resize(width, 0);
    buf.freeze()
}

/// Recovers text from a fixed-width field, dropping padding.
pub fn unpad_text(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}

/// Decodes an 8-byte big-endian integer; short input decodes to 0.
pub fn decode_u64(data: &[u8]) -> u64 {
    if data.len() < 8 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[..8]);
    u64::from_be_bytes(buf)
}

/// Decodes a 4-byte big-endian integer; short input decodes to 0.
pub fn decode_u32(data: &[u8]) -> u32 {
    if data.len() < 4 {
        return 0;
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[..4]);
    u32::from_be_bytes(buf)
}

/// Encodes metadata pairs into the wire form.
///
/// Records are joined with 0x01 and each name/value pair is split by 0x02;
/// there is no trailing record separator.
pub fn encode_metadata(metadata: &Metadata) -> Bytes {
    if metadata.is_empty() {
        return Bytes::new();
    }
    let mut buf = BytesMut::new();
    for (i, (name, value)) in metadata.iter().enumerate() {
        if i > 0 {
            buf.put_u8(RECORD_SEPARATOR);
        }
        buf.put_slice(name.as_bytes());
        buf.put_u8(FIELD_SEPARATOR);
        buf.put_slice(value.as_bytes());
    }
    buf.freeze()
}

/// Decodes the wire form produced by [`encode_metadata`], preserving pair
/// order. Records that are not exactly name/value are skipped.
pub fn decode_metadata(data: &[u8]) -> Metadata {
    let mut metadata = Metadata::new();
    if data.is_empty() {
        return metadata;
    }
    for record in data.split(|&b| b == RECORD_SEPARATOR) {
        if record.is_empty() {
            continue;
        }
        let fields: Vec<&[u8]> = record.split(|&b| b == FIELD_SEPARATOR).collect();
        if fields.len() != 2 {
            continue;
        }
        metadata.push((
            String::from_utf8_lossy(fields[0]).to_string(),
            String::from_utf8_lossy(fields[1]).to_string(),
        ));
    }
    metadata
}

/// Extracts a file extension without the leading dot, truncated to the
/// protocol's fixed width.
pub fn file_ext_name(filename: &str) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if ext.len() > FILE_EXT_NAME_MAX_LEN {
        ext[..FILE_EXT_NAME_MAX_LEN].to_string()
    } else {
        ext.to_string()
    }
}

/// What a filename alone can say about a file.
#[derive(Debug, Clone)]
pub enum FilenameInfo {
    /// Metadata decoded entirely from the embedded segment
    Decoded(FileInfo),
    /// The file's metadata mutates after creation; a live query is required
    NeedsQuery(FileKind),
}

/// Derives file information from the metadata segment embedded in a
/// storage filename.
///
/// Appender files carry [`APPENDER_FILE_SIZE_MARK`] in the embedded size
/// field and slave files are recognized by their filename length combined
/// with [`TRUNK_FILE_MARK_SIZE`]; both kinds mutate after creation, so the
/// embedded values are stale and [`FilenameInfo::NeedsQuery`] is returned
/// instead.
pub fn file_info_from_filename(remote_path: &str) -> Result<FilenameInfo> {
    if remote_path.len() < NORMAL_LOGIC_FILENAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "filename {remote_path:?} is too short to carry embedded metadata"
        )));
    }

    let segment = &remote_path.as_bytes()[FILE_PATH_LEN..FILE_PATH_LEN + FILENAME_BASE64_LEN];
    let buf = FILENAME_BASE64
        .decode(segment)
        .map_err(|e| Error::Protocol(format!("bad filename metadata segment: {e}")))?;
    if buf.len() < 20 {
        return Err(Error::Protocol(format!(
            "filename metadata segment decoded to {} bytes",
            buf.len()
        )));
    }

    let mut size = decode_u64(&buf[8..16]);
    if size & APPENDER_FILE_SIZE_MARK != 0 {
        return Ok(FilenameInfo::NeedsQuery(FileKind::Appender));
    }

    let name_len = remote_path.len();
    if name_len > TRUNK_LOGIC_FILENAME_LEN
        || (name_len > NORMAL_LOGIC_FILENAME_LEN && size & TRUNK_FILE_MARK_SIZE == 0)
    {
        return Ok(FilenameInfo::NeedsQuery(FileKind::Slave));
    }

    let create_timestamp = decode_u32(&buf[4..8]);
    if size >> 63 != 0 {
        // top bit set: only the low 32 bits hold the true size
        size &= 0xFFFF_FFFF;
    }
    let crc32 = decode_u32(&buf[16..20]);

    Ok(FilenameInfo::Decoded(FileInfo {
        fetched_from_server: false,
        kind: FileKind::Normal,
        size,
        create_time: SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(create_timestamp)),
        crc32,
        source_ip: ip_from_bytes(&buf[0..4]),
    }))
}

/// Renders the 4-byte source address embedded in a filename.
///
/// A zero first or last byte means the cluster stores a storage-node id
/// there instead of an address, in which case the result is empty.
pub fn ip_from_bytes(bytes: &[u8]) -> String {
    if bytes.len() < 4 || bytes[0] == 0 || bytes[3] == 0 {
        return String::new();
    }
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filename_with_segment(ip: [u8; 4], timestamp: u32, size: u64, crc32: u32) -> String {
        let mut raw = Vec::with_capacity(20);
        raw.extend_from_slice(&ip);
        raw.extend_from_slice(&timestamp.to_be_bytes());
        raw.extend_from_slice(&size.to_be_bytes());
        raw.extend_from_slice(&crc32.to_be_bytes());
        let segment = FILENAME_BASE64.encode(&raw);
        assert_eq!(segment.len(), FILENAME_BASE64_LEN);
        // six-char extension makes the name exactly the normal logic length
        format!("M00/00/00/{segment}.extnam")
    }

    #[test]
    fn header_round_trip_and_constant_size() {
        for body_len in [0u64, 1, 1024, u64::from(u32::MAX), 1 << 40] {
            let packed = pack_header(11, body_len, 0);
            assert_eq!(packed.len(), PROTO_HEADER_LEN);
            let header = parse_header(&packed).unwrap();
            assert_eq!(header.length, body_len);
            assert_eq!(header.cmd, 11);
            assert_eq!(header.status, 0);
        }
    }

    #[test]
    fn normal_filename_decodes_without_query() {
        let name = filename_with_segment([192, 168, 1, 7], 1_700_000_000, 12345, 0xDEAD_BEEF);
        assert_eq!(name.len(), NORMAL_LOGIC_FILENAME_LEN);
        match file_info_from_filename(&name).unwrap() {
            FilenameInfo::Decoded(info) => {
                assert!(!info.fetched_from_server);
                assert_eq!(info.kind, FileKind::Normal);
                assert_eq!(info.size, 12345);
                assert_eq!(info.crc32, 0xDEAD_BEEF);
                assert_eq!(info.source_ip, "192.168.1.7");
                assert_eq!(
                    info.create_time,
                    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
                );
            }
            other => panic!("expected decoded info, got {other:?}"),
        }
    }

    #[test]
    fn appender_mark_forces_live_query() {
        let name = filename_with_segment(
            [10, 0, 0, 1],
            1_700_000_000,
            4096 | APPENDER_FILE_SIZE_MARK,
            1,
        );
        match file_info_from_filename(&name).unwrap() {
            FilenameInfo::NeedsQuery(kind) => assert_eq!(kind, FileKind::Appender),
            other => panic!("expected live-query marker, got {other:?}"),
        }
    }

    #[test]
    fn overlong_filename_is_a_slave_file() {
        let base = filename_with_segment([10, 0, 0, 1], 1_700_000_000, 4096, 1);
        let name = format!("{base}_prefix-overflows-trunk-len");
        assert!(name.len() > TRUNK_LOGIC_FILENAME_LEN);
        match file_info_from_filename(&name).unwrap() {
            FilenameInfo::NeedsQuery(kind) => assert_eq!(kind, FileKind::Slave),
            other => panic!("expected live-query marker, got {other:?}"),
        }
    }

    #[test]
    fn top_bit_masks_size_to_low_32_bits() {
        let size = (1u64 << 63) | TRUNK_FILE_MARK_SIZE | 777;
        let name = filename_with_segment([10, 0, 0, 1], 42, size, 1);
        match file_info_from_filename(&name).unwrap() {
            FilenameInfo::Decoded(info) => assert_eq!(info.size, 777),
            other => panic!("expected decoded info, got {other:?}"),
        }
    }

    #[test]
    fn short_filename_is_rejected() {
        assert!(matches!(
            file_info_from_filename("M00/00/00/short.jpg"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn storage_id_source_renders_empty() {
        assert_eq!(ip_from_bytes(&[0, 0, 1, 2]), "");
        assert_eq!(ip_from_bytes(&[1, 2, 3, 0]), "");
        assert_eq!(ip_from_bytes(&[172, 16, 0, 9]), "172.16.0.9");
    }
}
