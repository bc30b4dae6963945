//! TAR container adapter.

use super::{ArchiveKind, ExtractedMember, is_csv_member};
use crate::{Error, Result};
use std::io::{Cursor, Read};
use tar::{Archive, Builder, EntryType, Header};

fn corrupt(cause: impl std::fmt::Display) -> Error {
    Error::CorruptArchive {
        kind: ArchiveKind::Tar,
        cause: cause.to_string(),
    }
}

/// Finds the first regular `.csv` file in stream order and reads it whole.
///
/// A member whose header advertises more than `limit` bytes is refused
/// before any of it is read.
pub(super) fn extract_first_csv(container: &[u8], limit: u64) -> Result<Option<ExtractedMember>> {
    let mut archive = Archive::new(Cursor::new(container));
    let entries = archive.entries().map_err(corrupt)?;

    for entry in entries {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .map_err(corrupt)?
            .to_string_lossy()
            .into_owned();
        if !is_csv_member(&name) {
            continue;
        }

        let size = entry.size();
        if size > limit {
            return Err(Error::MemberTooLarge {
                kind: ArchiveKind::Tar,
                limit,
            });
        }
        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        entry
            .read_to_end(&mut data)
            .map_err(|e| corrupt(format!("member '{name}': {e}")))?;
        // A truncated stream ends the entry early without an I/O error.
        if data.len() as u64 != size {
            return Err(corrupt(format!(
                "member '{name}' is truncated: {} of {size} bytes",
                data.len()
            )));
        }

        return Ok(Some(ExtractedMember { name, size, data }));
    }

    Ok(None)
}

/// Writes `payload` as the only regular-file member.
pub(super) fn pack(payload: &[u8], member_name: &str) -> Result<Vec<u8>> {
    let pack_error = |e: std::io::Error| Error::OperationFailed {
        operation: "tar_pack".to_string(),
        cause: e.to_string(),
    };

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(payload.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0));

    let mut builder = Builder::new(Vec::new());
    builder
        .append_data(&mut header, member_name, payload)
        .map_err(pack_error)?;
    builder.into_inner().map_err(pack_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi_member(entries: &[(&str, EntryType, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (name, entry_type, body) in entries {
            let mut header = Header::new_gnu();
            header.set_entry_type(*entry_type);
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_first_regular_csv_wins() {
        let container = multi_member(&[
            ("notes.txt", EntryType::Regular, b"skip"),
            ("dir.csv", EntryType::Directory, b""),
            ("data/first.csv", EntryType::Regular, b"first"),
            ("second.csv", EntryType::Regular, b"second"),
        ]);

        let member = extract_first_csv(&container, u64::MAX).unwrap().unwrap();
        assert_eq!(member.name, "data/first.csv");
        assert_eq!(member.data, b"first");
    }

    #[test]
    fn test_no_csv_member() {
        let container = multi_member(&[("a.txt", EntryType::Regular, b"a")]);
        assert!(extract_first_csv(&container, u64::MAX).unwrap().is_none());
    }

    #[test]
    fn test_truncated_member_is_corrupt() {
        let payload = vec![b'x'; 2048];
        let container = pack(&payload, "big.csv").unwrap();
        // Header block plus part of the first data block.
        let truncated = &container[..512 + 100];
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
            Err(Error::MemberTooLarge { kind: ArchiveKind::Tar, limit: 4095 })
        ));
    }
}
