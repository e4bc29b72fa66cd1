//! Unit tests for wire framing, field encoding, and record decoding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use dfstore::protocol::{
    self, FilenameInfo, APPENDER_FILE_SIZE_MARK, FILENAME_BASE64_LEN, NORMAL_LOGIC_FILENAME_LEN,
    PROTO_HEADER_LEN,
};
use dfstore::stat::{decode_records, GroupStat, RecordDecode, StorageStat};
use dfstore::types::FileKind;
use dfstore::{Error, FileId};

/// Builds a filename whose embedded segment carries the given values and
/// whose total length is exactly the normal logical filename length.
fn filename_with(ip: [u8; 4], timestamp: u32, size: u64, crc32: u32) -> String {
    let mut raw = Vec::with_capacity(20);
    raw.extend_from_slice(&ip);
    raw.extend_from_slice(&timestamp.to_be_bytes());
    raw.extend_from_slice(&size.to_be_bytes());
    raw.extend_from_slice(&crc32.to_be_bytes());
    let segment = URL_SAFE_NO_PAD.encode(&raw);
    assert_eq!(segment.len(), FILENAME_BASE64_LEN);
    format!("M00/00/00/{segment}.extnam")
}

mod framing {
    use super::*;

    #[test]
    fn header_survives_a_round_trip_at_any_body_length() {
        for body_len in [0u64, 1, 255, 65_536, u64::from(u32::MAX) + 1] {
            let packed = protocol::pack_header(24, body_len, 3);
            assert_eq!(
                packed.len(),
                PROTO_HEADER_LEN,
                "header size must not vary with the body length"
            );
            let header = protocol::parse_header(&packed).unwrap();
            assert_eq!(header.length, body_len);
            assert_eq!(header.cmd, 24);
            assert_eq!(header.status, 3);
        }
    }

    #[test]
    fn short_header_is_rejected() {
        assert!(protocol::parse_header(b"too short").is_err());
    }

    #[test]
    fn fixed_width_text_round_trips() {
        let padded = protocol::pad_text("group1", 16);
        assert_eq!(padded.len(), 16);
        assert_eq!(protocol::unpad_text(&padded), "group1");

        let truncated = protocol::pad_text("a-very-long-group-name", 16);
        assert_eq!(truncated.len(), 16);
    }

    #[test]
    fn short_integer_fields_decode_to_zero() {
        assert_eq!(protocol::decode_u64(b"short"), 0);
        assert_eq!(protocol::decode_u32(b"ab"), 0);
        assert_eq!(protocol::decode_u64(&42u64.to_be_bytes()), 42);
        assert_eq!(protocol::decode_u32(&7u32.to_be_bytes()), 7);
    }
}

mod metadata {
    use super::*;

    #[test]
    fn encoding_uses_record_and_field_separators_without_a_trailer() {
        let metadata = vec![
            ("author".to_string(), "tester".to_string()),
            ("rev".to_string(), "2".to_string()),
        ];
        let encoded = protocol::encode_metadata(&metadata);
        assert_eq!(&encoded[..], b"author\x02tester\x01rev\x022");
    }

    #[test]
    fn decoding_preserves_pair_order() {
        let decoded = protocol::decode_metadata(b"z\x021\x01a\x022\x01m\x023");
        let names: Vec<&str> = decoded.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let decoded = protocol::decode_metadata(b"good\x02value\x01nofield\x01also\x02fine");
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], ("good".to_string(), "value".to_string()));
        assert_eq!(decoded[1], ("also".to_string(), "fine".to_string()));
    }

    #[test]
    fn empty_metadata_round_trips() {
        assert!(protocol::encode_metadata(&Vec::new()).is_empty());
        assert!(protocol::decode_metadata(b"").is_empty());
    }
}

mod file_identity {
    use super::*;

    #[test]
    fn combined_and_split_representations_are_equivalent() {
        let id = FileId::parse("group1/M00/00/00/file.jpg").unwrap();
        assert_eq!(id.group(), "group1");
        assert_eq!(id.remote_path(), "M00/00/00/file.jpg");
        assert_eq!(
            FileId::new("group1", "M00/00/00/file.jpg").to_string(),
            id.to_string()
        );
    }

    #[test]
    fn extension_extraction_matches_the_field_width() {
        assert_eq!(protocol::file_ext_name("photo.jpeg"), "jpeg");
        assert_eq!(protocol::file_ext_name("archive.tar.gz"), "gz");
        assert_eq!(protocol::file_ext_name("noext"), "");
        assert_eq!(protocol::file_ext_name("file.verylongext"), "verylo");
    }
}

mod filename_metadata {
    use super::*;

    #[test]
    fn normal_file_decodes_with_zero_network_calls() {
        let name = filename_with([192, 168, 0, 42], 1_690_000_000, 9_999, 0x0BAD_F00D);
        assert_eq!(name.len(), NORMAL_LOGIC_FILENAME_LEN);
        match protocol::file_info_from_filename(&name).unwrap() {
            FilenameInfo::Decoded(info) => {
                assert_eq!(info.kind, FileKind::Normal);
                assert_eq!(info.size, 9_999);
                assert_eq!(info.crc32, 0x0BAD_F00D);
                assert_eq!(info.source_ip, "192.168.0.42");
                assert!(!info.fetched_from_server);
            }
            other => panic!("expected a decoded result, got {other:?}"),
        }
    }

    #[test]
    fn appender_bit_demands_a_live_query() {
        let name = filename_with([10, 1, 1, 1], 1, 100 | APPENDER_FILE_SIZE_MARK, 1);
        assert!(matches!(
            protocol::file_info_from_filename(&name).unwrap(),
            FilenameInfo::NeedsQuery(FileKind::Appender)
        ));
    }

    #[test]
    fn slave_length_demands_a_live_query() {
        let name = format!("{}{}", filename_with([10, 1, 1, 1], 1, 100, 1), "-slave-suffix-material");
        assert!(matches!(
            protocol::file_info_from_filename(&name).unwrap(),
            FilenameInfo::NeedsQuery(FileKind::Slave)
        ));
    }

    #[test]
    fn undersized_filename_is_an_argument_error() {
        assert!(matches!(
            protocol::file_info_from_filename("M00/00/00/tiny.jpg"),
            Err(Error::InvalidArgument(_))
        ));
    }
}

mod records {
    use super::*;

    fn group_record(name: &str) -> Vec<u8> {
        let mut record = Vec::with_capacity(GroupStat::SIZE);
        let mut field = vec![0u8; 17];
        field[..name.len()].copy_from_slice(name.as_bytes());
        record.extend_from_slice(&field);
        for value in [
            102_400u64, 51_200, 1_024, 3, 23_000, 8_888, 3, 0, 2, 256, 17,
        ] {
            record.extend_from_slice(&value.to_be_bytes());
        }
        record
    }

    #[test]
    fn group_record_arrays_decode_field_by_field() {
        let mut body = group_record("group1");
        body.extend_from_slice(&group_record("group2"));

        let groups: Vec<GroupStat> = decode_records(&body).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group_name, "group1");
        assert_eq!(groups[0].total_mb, 102_400);
        assert_eq!(groups[0].free_mb, 51_200);
        assert_eq!(groups[0].storage_count, 3);
        assert_eq!(groups[0].storage_port, 23_000);
        assert_eq!(groups[1].group_name, "group2");
    }

    #[test]
    fn ragged_record_arrays_are_rejected() {
        let mut body = group_record("group1");
        body.push(0);
        assert!(matches!(
            decode_records::<GroupStat>(&body),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn empty_bodies_decode_to_empty_lists() {
        let groups: Vec<GroupStat> = decode_records(&[]).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn storage_records_expose_the_status_byte() {
        let mut record = vec![0u8; StorageStat::SIZE];
        record[0] = 7; // active
        let stats: Vec<StorageStat> = decode_records(&record).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].status, dfstore::StorageStatus::Active);
    }
}
