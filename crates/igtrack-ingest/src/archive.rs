//! Instagram export archive reader.
//!
//! Locates the relationship payloads inside an export `.zip` by file name,
//! wherever they sit in the tree, and collects their last-modified times for
//! snapshot dating.

use std::io::{Cursor, Read};

use chrono::{DateTime, NaiveDate, Utc};
use zip::ZipArchive;

use crate::IngestError;

const FOLLOWING_MEMBER: &str = "following.json";
const PENDING_MEMBER: &str = "pending_follow_requests.json";
const FOLLOWERS_MEMBER: &str = "followers_<n>.json";

/// Decompressed size cap for one relationship member.
pub const MAX_MEMBER_BYTES: u64 = 64 * 1024 * 1024;

/// Raw payload text pulled from one export archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportArchive {
    /// Every `followers_<n>.json` part, ordered by member path.
    pub followers: Vec<String>,
    pub following: String,
    /// `None` when the export has no pending requests file.
    pub pending: Option<String>,
    /// Last-modified times of the members above that carry a valid one.
    pub member_timestamps: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Followers,
    Following,
    Pending,
}

fn classify(path: &str) -> Option<Member> {
    let basename = path.rsplit('/').next().unwrap_or(path);
    if basename == FOLLOWING_MEMBER {
        return Some(Member::Following);
    }
    if basename == PENDING_MEMBER {
        return Some(Member::Pending);
    }
    let part = basename.strip_prefix("followers_")?.strip_suffix(".json")?;
    (!part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())).then_some(Member::Followers)
}

/// Zip times carry no zone; they are read as UTC.
fn zip_time_to_utc(time: zip::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )
    .map(|naive| naive.and_utc())
}

/// Reads the relationship payloads out of an export archive.
///
/// # Errors
///
/// - [`IngestError::Archive`] if `bytes` is not a readable zip file.
/// - [`IngestError::ArchiveMember`] if a located member is not UTF-8 text.
/// - [`IngestError::ArchiveMemberTooLarge`] if a located member decompresses
///   past [`MAX_MEMBER_BYTES`].
/// - [`IngestError::MissingArchiveMember`] if no followers part or no
///   `following.json` is present.
pub fn read_export_archive(bytes: &[u8]) -> Result<ExportArchive, IngestError> {
    read_export_archive_limited(bytes, MAX_MEMBER_BYTES)
}

fn read_export_archive_limited(
    bytes: &[u8],
    max_member_bytes: u64,
) -> Result<ExportArchive, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut followers: Vec<(String, String)> = Vec::new();
    let mut following = None;
    let mut pending = None;
    let mut member_timestamps = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let Some(member) = classify(file.name()) else {
            continue;
        };

        let name = file.name().to_string();
        let contents = read_member(&mut file, &name, max_member_bytes)?;

        if let Some(ts) = file.last_modified().and_then(zip_time_to_utc) {
            member_timestamps.push(ts);
        }

        match member {
            Member::Followers => followers.push((name, contents)),
            Member::Following => {
                if following.is_some() {
                    tracing::warn!(member = %name, "duplicate following member; keeping the first");
                } else {
                    following = Some(contents);
                }
            }
            Member::Pending => {
                if pending.is_some() {
                    tracing::warn!(member = %name, "duplicate pending member; keeping the first");
                } else {
                    pending = Some(contents);
                }
            }
        }
    }

    if followers.is_empty() {
        return Err(IngestError::MissingArchiveMember {
            member: FOLLOWERS_MEMBER,
        });
    }
    let following = following.ok_or(IngestError::MissingArchiveMember {
        member: FOLLOWING_MEMBER,
    })?;

    followers.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(ExportArchive {
        followers: followers.into_iter().map(|(_, text)| text).collect(),
        following,
        pending,
        member_timestamps,
    })
}

/// Reads at most `limit` bytes; the header size is not trusted.
fn read_member(reader: impl Read, name: &str, limit: u64) -> Result<String, IngestError> {
    let too_large = || IngestError::ArchiveMemberTooLarge {
        member: name.to_string(),
        limit,
    };
    let member_error = |source| IngestError::ArchiveMember {
        member: name.to_string(),
        source,
    };

    let mut buf = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(member_error)?;
    if buf.len() > usize::try_from(limit).unwrap_or(usize::MAX) {
        return Err(too_large());
    }

    String::from_utf8(buf)
        .map_err(|e| member_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn build_zip(members: &[(&str, &str, Option<(u16, u8, u8)>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body, date) in members {
            let mut options = SimpleFileOptions::default();
            if let Some((y, m, d)) = date {
                let time = zip::DateTime::from_date_and_time(*y, *m, *d, 9, 30, 0).unwrap();
                options = options.last_modified_time(time);
            }
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
                continue;
            }
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn classify_matches_basenames_anywhere() {
        assert_eq!(
            classify("connections/followers_and_following/followers_1.json"),
            Some(Member::Followers)
        );
        assert_eq!(classify("followers_12.json"), Some(Member::Followers));
        assert_eq!(classify("a/b/following.json"), Some(Member::Following));
        assert_eq!(
            classify("x/pending_follow_requests.json"),
            Some(Member::Pending)
        );
        assert_eq!(classify("followers_.json"), None);
        assert_eq!(classify("followers_x.json"), None);
        assert_eq!(classify("recent_follow_requests.json"), None);
        assert_eq!(classify("following.json.bak"), None);
    }

    #[test]
    fn reads_all_members_and_timestamps() {
        let bytes = build_zip(&[
            ("root/", "", None),
            ("root/connections/followers_2.json", "[2]", Some((2025, 6, 12))),
            ("root/connections/followers_1.json", "[1]", Some((2025, 6, 13))),
            ("root/connections/following.json", "{}", Some((2025, 6, 13))),
            (
                "root/connections/pending_follow_requests.json",
                "{}",
                Some((2025, 6, 11)),
            ),
            ("root/other.json", "ignored", Some((2030, 1, 1))),
        ]);

        let archive = read_export_archive(&bytes).unwrap();

        assert_eq!(archive.followers, vec!["[1]".to_string(), "[2]".to_string()]);
        assert_eq!(archive.following, "{}");
        assert_eq!(archive.pending.as_deref(), Some("{}"));
        assert_eq!(archive.member_timestamps.len(), 4);
        assert_eq!(
            archive.member_timestamps.iter().max().copied(),
            Some(Utc.with_ymd_and_hms(2025, 6, 13, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn pending_member_is_optional() {
        let bytes = build_zip(&[("followers_1.json", "[]", None), ("following.json", "{}", None)]);
        let archive = read_export_archive(&bytes).unwrap();
        assert!(archive.pending.is_none());
    }

    #[test]
    fn missing_followers_is_rejected() {
        let bytes = build_zip(&[("following.json", "{}", None)]);
        let err = read_export_archive(&bytes).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingArchiveMember { member } if member == FOLLOWERS_MEMBER
        ));
    }

    #[test]
    fn missing_following_is_rejected() {
        let bytes = build_zip(&[("followers_1.json", "[]", None)]);
        let err = read_export_archive(&bytes).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingArchiveMember { member } if member == FOLLOWING_MEMBER
        ));
    }

    #[test]
    fn oversized_member_is_rejected() {
        let body = format!("[{}]", "1,".repeat(64));
        let bytes = build_zip(&[("followers_1.json", body.as_str(), None), ("following.json", "{}", None)]);

        let err = read_export_archive_limited(&bytes, 32).unwrap_err();
        assert!(matches!(
            err,
            IngestError::ArchiveMemberTooLarge { ref member, limit: 32 } if member == "followers_1.json"
        ));
        assert_eq!(err.kind(), crate::IngestErrorKind::InputFormat);

        assert!(read_export_archive_limited(&bytes, 1024).is_ok());
    }

    #[test]
    fn member_at_the_limit_is_accepted() {
        let bytes = build_zip(&[("followers_1.json", "[]", None), ("following.json", "{}", None)]);
        let archive = read_export_archive_limited(&bytes, 2).unwrap();
        assert_eq!(archive.followers, vec!["[]".to_string()]);
    }

    #[test]
    fn non_zip_bytes_are_an_archive_error() {
        let err = read_export_archive(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, IngestError::Archive(_)));
        assert_eq!(err.kind(), crate::IngestErrorKind::InputFormat);
    }

    #[test]
    fn non_utf8_member_is_reported_by_name() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("followers_1.json", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&[0xff, 0xfe, 0x00]).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = read_export_archive(&bytes).unwrap_err();
        assert!(matches!(
            err,
            IngestError::ArchiveMember { ref member, .. } if member == "followers_1.json"
        ));
    }
}
