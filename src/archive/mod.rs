//! Archive codec.
//!
//! Unwraps the first CSV member out of a ZIP or TAR container and wraps
//! arbitrary payloads into a single-member container. The codec knows nothing
//! about CSV beyond the member-name suffix.
//!
//! Both directions are fully buffered: a ZIP central directory sits at the
//! tail of the file, so no member can be located before the whole container
//! has arrived, and it cannot be written before the whole payload is known.
//!
//! | Kind | Unwrap | Wrap | MIME type |
//! |------|--------|------|-----------|
//! | `zip` | ✓ | ✓ (deflate) | `application/zip` |
//! | `tar` | ✓ | ✓ (ustar/GNU) | `application/x-tar` |
//!
//! ```rust,ignore
//! use priceanalyzer::archive::{self, ArchiveKind};
//!
//! let container = archive::wrap(b"id,name\n", ArchiveKind::Tar, "prices.csv")?;
//! let mut reader = archive::unwrap(container.as_slice(), ArchiveKind::Tar)?;
//! assert_eq!(reader.member_name(), "prices.csv");
//! ```

mod tar;
mod zip;

use crate::{Error, Result};
use std::io::{self, Cursor, Read, Write};
use std::str::FromStr;

/// Suffix identifying the CSV member inside a container.
pub const CSV_SUFFIX: &str = ".csv";

/// Default cap on the decompressed size of the CSV member (256 MiB).
pub const DEFAULT_MEMBER_LIMIT: u64 = 256 * 1024 * 1024;

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArchiveKind {
    /// ZIP container.
    #[default]
    Zip,
    /// POSIX tar container.
    Tar,
}

impl ArchiveKind {
    /// Returns all supported kinds.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::Zip, Self::Tar]
    }

    /// Returns the lowercase tag used in query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
        }
    }

    /// Returns the file extension for this kind.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Returns the MIME type for this kind.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::Tar => "application/x-tar",
        }
    }

    /// Maps a declared MIME type to a kind, if it names one.
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/zip" | "application/x-zip-compressed" | "application/x-zip" => {
                Some(Self::Zip)
            },
            "application/x-tar" | "application/tar" => Some(Self::Tar),
            _ => None,
        }
    }

    /// Maps a file name to a kind by its extension, if it has a known one.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|kind| lower.ends_with(&format!(".{}", kind.extension())))
    }
}

impl FromStr for ArchiveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if the member name identifies a CSV payload.
#[must_use]
pub fn is_csv_member(name: &str) -> bool {
    name.to_lowercase().ends_with(CSV_SUFFIX)
}

/// A member extracted from a container, before it is exposed as a reader.
#[derive(Debug)]
struct ExtractedMember {
    name: String,
    size: u64,
    data: Vec<u8>,
}

/// Reader over the CSV member of an unwrapped container.
///
/// Yields exactly [`ArchiveReader::size`] bytes, then end of stream. The
/// decompressed buffer is owned by the reader and released on
/// [`ArchiveReader::close`] or drop.
#[derive(Debug)]
pub struct ArchiveReader {
    kind: ArchiveKind,
    name: String,
    size: u64,
    inner: Option<io::Take<Cursor<Vec<u8>>>>,
}

impl ArchiveReader {
    fn from_member(kind: ArchiveKind, member: ExtractedMember) -> Result<Self> {
        let actual = member.data.len() as u64;
        if actual != member.size {
            return Err(Error::CorruptArchive {
                kind,
                cause: format!(
                    "member '{}' advertises {} bytes but holds {actual}",
                    member.name, member.size
                ),
            });
        }
        Ok(Self {
            kind,
            name: member.name,
            size: member.size,
            inner: Some(Cursor::new(member.data).take(member.size)),
        })
    }

    /// Returns the container kind this member came from.
    #[must_use]
    pub const fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Returns the member's name inside the container.
    #[must_use]
    pub fn member_name(&self) -> &str {
        &self.name
    }

    /// Returns the member's advertised (uncompressed) size.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns true once the reader has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Releases the decompression buffer. Safe to call more than once.
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// Consumes the reader and returns the unread remainder of the member.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self.inner {
            Some(take) => {
                let cursor = take.into_inner();
                let position = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
                let mut data = cursor.into_inner();
                data.drain(..position.min(data.len()));
                data
            },
            None => Vec::new(),
        }
    }
}

impl Read for ArchiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }
}

/// Buffers the whole container from `source`.
fn buffer_container<R: Read>(mut source: R, kind: ArchiveKind) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    source
        .read_to_end(&mut buf)
        .map_err(|e| Error::CorruptArchive {
            kind,
            cause: format!("failed to read container: {e}"),
        })?;
    Ok(buf)
}

/// Unwraps the first CSV member from a container, inflating at most
/// [`DEFAULT_MEMBER_LIMIT`] bytes.
///
/// # Errors
///
/// Returns [`Error::CorruptArchive`] if the container cannot be parsed or the
/// member cannot be read completely, [`Error::MemberNotFound`] if no member
/// name ends in `.csv`, and [`Error::MemberTooLarge`] past the limit.
pub fn unwrap<R: Read>(source: R, kind: ArchiveKind) -> Result<ArchiveReader> {
    unwrap_limited(source, kind, DEFAULT_MEMBER_LIMIT)
}

/// Like [`unwrap`], with an explicit cap on the decompressed member size.
///
/// The cap is enforced while inflating, so a member whose header understates
/// its size is cut off at `member_limit + 1` bytes and refused.
///
/// # Errors
///
/// See [`unwrap`].
pub fn unwrap_limited<R: Read>(
    source: R,
    kind: ArchiveKind,
    member_limit: u64,
) -> Result<ArchiveReader> {
    let container = buffer_container(source, kind)?;
    let member = match kind {
        ArchiveKind::Zip => zip::extract_first_csv(&container, member_limit)?,
        ArchiveKind::Tar => tar::extract_first_csv(&container, member_limit)?,
    };
    let member = member.ok_or(Error::MemberNotFound { kind })?;
    tracing::debug!(
        kind = %kind,
        member = %member.name,
        size = member.size,
        container_bytes = container.len(),
        "Unwrapped archive member"
    );
    ArchiveReader::from_member(kind, member)
}

/// Wraps `payload` into a container holding exactly one member.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the container cannot be written.
pub fn wrap(payload: &[u8], kind: ArchiveKind, member_name: &str) -> Result<Vec<u8>> {
    let container = match kind {
        ArchiveKind::Zip => zip::pack(payload, member_name)?,
        ArchiveKind::Tar => tar::pack(payload, member_name)?,
    };
    tracing::debug!(
        kind = %kind,
        member = member_name,
        payload_bytes = payload.len(),
        container_bytes = container.len(),
        "Wrapped payload into archive"
    );
    Ok(container)
}

/// `Write` adapter that collects a payload and emits a single-member container.
///
/// Nothing is produced until [`ArchiveWriter::finish`]; dropping an unfinished
/// writer just releases the buffered payload.
#[derive(Debug)]
pub struct ArchiveWriter {
    kind: ArchiveKind,
    member_name: String,
    payload: Vec<u8>,
}

impl ArchiveWriter {
    /// Creates a writer for the given kind and member name.
    #[must_use]
    pub fn new(kind: ArchiveKind, member_name: impl Into<String>) -> Self {
        Self {
            kind,
            member_name: member_name.into(),
            payload: Vec::new(),
        }
    }

    /// Returns the container kind.
    #[must_use]
    pub const fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Returns the number of payload bytes buffered so far.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.payload.len()
    }

    /// Assembles the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be written.
    pub fn finish(self) -> Result<Vec<u8>> {
        wrap(&self.payload, self.kind, &self.member_name)
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.payload.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn read_all(mut reader: ArchiveReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test_case(ArchiveKind::Zip, 0; "zip empty")]
    #[test_case(ArchiveKind::Zip, 1; "zip one byte")]
    #[test_case(ArchiveKind::Zip, 1 << 20; "zip one mebibyte")]
    #[test_case(ArchiveKind::Tar, 0; "tar empty")]
    #[test_case(ArchiveKind::Tar, 1; "tar one byte")]
    #[test_case(ArchiveKind::Tar, 1 << 20; "tar one mebibyte")]
    fn test_round_trip(kind: ArchiveKind, len: usize) {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let container = wrap(&payload, kind, "data.csv").unwrap();

        let reader = unwrap(container.as_slice(), kind).unwrap();
        assert_eq!(reader.member_name(), "data.csv");
        assert_eq!(reader.size(), len as u64);
        assert_eq!(read_all(reader), payload);
    }

    #[test_case(ArchiveKind::Zip)]
    #[test_case(ArchiveKind::Tar)]
    fn test_member_without_csv_suffix_is_not_found(kind: ArchiveKind) {
        let container = wrap(b"a,b\n", kind, "prices.txt").unwrap();
        let err = unwrap(container.as_slice(), kind).unwrap_err();
        assert!(matches!(err, Error::MemberNotFound { kind: k } if k == kind));
    }

    #[test_case(ArchiveKind::Zip)]
    #[test_case(ArchiveKind::Tar)]
    fn test_suffix_match_is_case_insensitive(kind: ArchiveKind) {
        let container = wrap(b"x", kind, "PRICES.CSV").unwrap();
        let reader = unwrap(container.as_slice(), kind).unwrap();
        assert_eq!(reader.member_name(), "PRICES.CSV");
    }

    #[test_case(ArchiveKind::Zip)]
    #[test_case(ArchiveKind::Tar)]
    fn test_member_limit_is_a_transport_error(kind: ArchiveKind) {
        let container = wrap(&[b'x'; 1000], kind, "a.csv").unwrap();

        assert_eq!(unwrap_limited(container.as_slice(), kind, 1000).unwrap().size(), 1000);
        let err = unwrap_limited(container.as_slice(), kind, 999).unwrap_err();
        assert!(matches!(err, Error::MemberTooLarge { limit: 999, .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_garbage_zip_is_corrupt() {
        let err = unwrap(&b"definitely not a zip file"[..], ArchiveKind::Zip).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));
    }

    #[test]
    fn test_garbage_tar_is_rejected() {
        let garbage = vec![0x5a_u8; 1024];
        let err = unwrap(garbage.as_slice(), ArchiveKind::Tar).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Transport);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let container = wrap(b"1,2,3,4,5\n", ArchiveKind::Tar, "a.csv").unwrap();
        let err = unwrap(container.as_slice(), ArchiveKind::Zip).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));
    }

    #[test]
    fn test_read_past_end_is_eof_not_error() {
        let container = wrap(b"abc", ArchiveKind::Zip, "a.csv").unwrap();
        let mut reader = unwrap(container.as_slice(), ArchiveKind::Zip).unwrap();
        let mut buf = [0_u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let container = wrap(b"abc", ArchiveKind::Tar, "a.csv").unwrap();
        let mut reader = unwrap(container.as_slice(), ArchiveKind::Tar).unwrap();
        reader.close();
        reader.close();
        assert!(reader.is_closed());
        let mut buf = [0_u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.into_bytes().is_empty());
    }

    #[test]
    fn test_into_bytes_returns_unread_remainder() {
        let container = wrap(b"header\nrow\n", ArchiveKind::Zip, "a.csv").unwrap();
        let mut reader = unwrap(container.as_slice(), ArchiveKind::Zip).unwrap();
        let mut first = [0_u8; 7];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(&first, b"header\n");
        assert_eq!(reader.into_bytes(), b"row\n");
    }

    #[test]
    fn test_writer_matches_wrap() {
        let mut writer = ArchiveWriter::new(ArchiveKind::Zip, "data.json");
        writer.write_all(b"[1,2").unwrap();
        writer.write_all(b",3]").unwrap();
        assert_eq!(writer.buffered(), 7);

        let container = writer.finish().unwrap();
        let mut reader = unwrap(container.as_slice(), ArchiveKind::Zip);
        // `.json` is not a CSV member, so the codec refuses it.
        assert!(matches!(reader, Err(Error::MemberNotFound { .. })));

        let container = ArchiveWriter::new(ArchiveKind::Tar, "data.csv").finish().unwrap();
        reader = unwrap(container.as_slice(), ArchiveKind::Tar);
        assert_eq!(reader.unwrap().size(), 0);
    }

    #[test_case("zip", ArchiveKind::Zip)]
    #[test_case("TAR", ArchiveKind::Tar)]
    #[test_case(" Zip ", ArchiveKind::Zip)]
    fn test_kind_from_str(input: &str, expected: ArchiveKind) {
        assert_eq!(input.parse::<ArchiveKind>().unwrap(), expected);
    }

    #[test]
    fn test_unsupported_kind() {
        let err = "rar".parse::<ArchiveKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref s) if s == "rar"));
    }

    #[test]
    fn test_kind_hints() {
        assert_eq!(
            ArchiveKind::from_mime_type("application/x-tar"),
            Some(ArchiveKind::Tar)
        );
        assert_eq!(
            ArchiveKind::from_mime_type("application/zip; charset=binary"),
            Some(ArchiveKind::Zip)
        );
        assert_eq!(ArchiveKind::from_mime_type("text/csv"), None);
        assert_eq!(
            ArchiveKind::from_file_name("prices.TAR"),
            Some(ArchiveKind::Tar)
        );
        assert_eq!(ArchiveKind::from_file_name("prices.csv"), None);
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_payload(
            payload in proptest::collection::vec(any::<u8>(), 0..4096),
            tar in any::<bool>(),
        ) {
            let kind = if tar { ArchiveKind::Tar } else { ArchiveKind::Zip };
            let container = wrap(&payload, kind, "p.csv").unwrap();
            let reader = unwrap(container.as_slice(), kind).unwrap();
            prop_assert_eq!(read_all(reader), payload);
        }
    }
}
