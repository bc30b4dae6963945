//! ZIP container adapter.

use super::{ArchiveKind, ExtractedMember, is_csv_member};
use crate::{Error, Result};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn corrupt(cause: impl std::fmt::Display) -> Error {
    Error::CorruptArchive {
        kind: ArchiveKind::Zip,
        cause: cause.to_string(),
    }
}

/// Finds the first `.csv` file in central-directory order and decompresses it.
///
/// At most `limit` bytes are inflated, whatever the entry header claims.
pub(super) fn extract_first_csv(container: &[u8], limit: u64) -> Result<Option<ExtractedMember>> {
    let mut archive = ZipArchive::new(Cursor::new(container)).map_err(corrupt)?;

    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| corrupt(format!("entry {index}: {e}")))?;
        if file.is_dir() || !is_csv_member(file.name()) {
            continue;
        }

        let name = file.name().to_string();
        let size = file.size();
        if size > limit {
            return Err(too_large(limit));
        }
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        // The zip reader verifies the CRC once the entry is read to its end.
        file.take(limit.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| corrupt(format!("member '{name}': {e}")))?;
        if data.len() as u64 > limit {
            return Err(too_large(limit));
        }

        return Ok(Some(ExtractedMember { name, size, data }));
    }

    Ok(None)
}

const fn too_large(limit: u64) -> Error {
    Error::MemberTooLarge {
        kind: ArchiveKind::Zip,
        limit,
    }
}

/// Writes `payload` as the only, deflate-compressed member.
pub(super) fn pack(payload: &[u8], member_name: &str) -> Result<Vec<u8>> {
    let pack_error = |e: &dyn std::fmt::Display| Error::OperationFailed {
        operation: "zip_pack".to_string(),
        cause: e.to_string(),
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(payload.len() as u64 >= u64::from(u32::MAX))
        .unix_permissions(0o644);

    writer
        .start_file(member_name, options)
        .map_err(|e| pack_error(&e))?;
    writer.write_all(payload).map_err(|e| pack_error(&e))?;
    let cursor = writer.finish().map_err(|e| pack_error(&e))?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi_member(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(body).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_first_csv_member_wins() {
        let container = multi_member(&[
            ("readme.txt", b"ignore me"),
            ("nested.csv/", b""),
            ("first.csv", b"first"),
            ("second.csv", b"second"),
        ]);

        let member = extract_first_csv(&container, u64::MAX).unwrap().unwrap();
        assert_eq!(member.name, "first.csv");
        assert_eq!(member.data, b"first");
        assert_eq!(member.size, 5);
    }

    #[test]
    fn test_no_csv_member() {
        let container = multi_member(&[("a.txt", b"a"), ("b.json", b"{}")]);
        assert!(extract_first_csv(&container, u64::MAX).unwrap().is_none());
    }

    #[test]
    fn test_truncated_container_is_corrupt() {
        let container = pack(b"id,name\n1,a\n", "a.csv").unwrap();
        let truncated = &container[..container.len() / 2];
        assert!(matches!(
            extract_first_csv(truncated, u64::MAX),
            Err(Error::CorruptArchive { .. })
        ));
    }

    #[test]
    fn test_member_over_limit_is_refused() {
        let payload = vec![b'7'; 4096];
        let container = pack(&payload, "big.csv").unwrap();

        let member = extract_first_csv(&container, 4096).unwrap().unwrap();
        assert_eq!(member.data.len(), 4096);
        assert!(matches!(
            extract_first_csv(&container, 4095),
            Err(Error::MemberTooLarge { kind: ArchiveKind::Zip, limit: 4095 })
        ));
    }
}
