//! Assembles the downloadable archive: one directory per key, entries named
//! by the `{key}.MAIN.jpg` / `{key}.PT{nn}.jpg` convention, and a flat
//! failure report appended when any fetch failed or was quota-rejected.

use crate::fetch::FetchOutcome;
use std::io::{Cursor, Write};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const REPORT_FILE_NAME: &str = "error-report.txt";

/// The one fatal failure class of a job: a half-built archive is not a
/// meaningful partial result, so any error here aborts the whole request.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip write failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One recorded, non-fatal failure, rendered as a tab-separated report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub key: String,
    pub url: String,
    pub reason: &'static str,
}

/// Build the finished archive from the full outcome set, which must already
/// be in flattened `(key appearance, ordinal)` order. Successful outcomes
/// become per-key entries; failures become report lines. Keys with zero
/// successes produce no directory.
pub fn build_archive(outcomes: &[FetchOutcome]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut failures = Vec::new();
    for outcome in outcomes {
        match &outcome.result {
            Ok(payload) => {
                writer.start_file(entry_path(&outcome.key, outcome.ordinal), options)?;
                writer.write_all(payload)?;
            }
            Err(failure) => failures.push(FailureRecord {
                key: outcome.key.clone(),
                url: outcome.url.clone(),
                reason: failure.report_token(),
            }),
        }
    }

    if !failures.is_empty() {
        writer.start_file(REPORT_FILE_NAME, options)?;
        writer.write_all(render_report(&failures).as_bytes())?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

pub fn entry_path(key: &str, ordinal: usize) -> String {
    format!("{key}/{name}", name = entry_file_name(key, ordinal))
}

/// Deterministic naming contract consumers of the archive depend on. The
/// `.jpg` extension is fixed regardless of the fetched content type; gaps in
/// ordinals are never renumbered.
pub fn entry_file_name(key: &str, ordinal: usize) -> String {
    if ordinal == 0 {
        format!("{key}.MAIN.jpg")
    } else {
        format!("{key}.PT{ordinal:02}.jpg")
    }
}

fn render_report(failures: &[FailureRecord]) -> String {
    let mut report = String::new();
    for failure in failures {
        report.push_str(&failure.key);
        report.push('\t');
        report.push_str(&failure.url);
        report.push('\t');
        report.push_str(failure.reason);
        report.push('\n');
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchFailure;
    use std::io::Read;
    use zip::ZipArchive;

    fn ok(key: &str, ordinal: usize, payload: &[u8]) -> FetchOutcome {
        FetchOutcome {
            flat_index: 0,
            key: key.to_string(),
            ordinal,
            url: format!("https://img.example.com/{key}-{ordinal}.jpg"),
            result: Ok(payload.to_vec()),
        }
    }

    fn failed(key: &str, ordinal: usize, failure: FetchFailure) -> FetchOutcome {
        FetchOutcome {
            flat_index: 0,
            key: key.to_string(),
            ordinal,
            url: format!("https://img.example.com/{key}-{ordinal}.jpg"),
            result: Err(failure),
        }
    }

    fn open(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).expect("readable archive")
    }

    // by_index follows write order; file_names() does not guarantee one.
    fn entry_names(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
        let mut entry = archive.by_name(name).expect("entry present");
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).expect("entry readable");
        buf
    }

    #[test]
    fn names_entries_by_key_and_ordinal() {
        let outcomes = vec![
            ok("B0001", 0, b"main"),
            ok("B0001", 1, b"pt1"),
            ok("B0001", 2, b"pt2"),
            ok("B0002", 0, b"other"),
        ];
        let mut archive = open(build_archive(&outcomes).unwrap());
        assert_eq!(
            entry_names(&mut archive),
            vec![
                "B0001/B0001.MAIN.jpg",
                "B0001/B0001.PT01.jpg",
                "B0001/B0001.PT02.jpg",
                "B0002/B0002.MAIN.jpg",
            ]
        );
        assert_eq!(read_entry(&mut archive, "B0001/B0001.PT02.jpg"), b"pt2");
    }

    #[test]
    fn failed_ordinals_are_not_renumbered() {
        // Ordinal 0 fails, ordinal 1 succeeds: the survivor keeps PT01 and
        // does not get promoted to MAIN.
        let outcomes = vec![
            failed("B0001", 0, FetchFailure::Http(404)),
            ok("B0001", 1, b"pt1"),
        ];
        let mut archive = open(build_archive(&outcomes).unwrap());
        let names = entry_names(&mut archive);
        assert!(names.contains(&"B0001/B0001.PT01.jpg".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("MAIN.jpg")));

        let report = String::from_utf8(read_entry(&mut archive, REPORT_FILE_NAME)).unwrap();
        assert_eq!(
            report,
            "B0001\thttps://img.example.com/B0001-0.jpg\tfetch-failed\n"
        );
    }

    #[test]
    fn report_lists_failures_in_order_with_stable_tokens() {
        let outcomes = vec![
            failed("B0001", 0, FetchFailure::Transport("connect refused".into())),
            failed("B0002", 0, FetchFailure::QuotaExceeded),
        ];
        let mut archive = open(build_archive(&outcomes).unwrap());
        let report = String::from_utf8(read_entry(&mut archive, REPORT_FILE_NAME)).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("B0001\t"));
        assert!(lines[0].ends_with("\tfetch-failed"));
        assert!(lines[1].ends_with("\tquota-exceeded"));
    }

    #[test]
    fn empty_outcomes_yield_empty_archive_without_report() {
        let archive = open(build_archive(&[]).unwrap());
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn all_successes_omit_the_report() {
        let outcomes = vec![ok("B0001", 0, b"main")];
        let mut archive = open(build_archive(&outcomes).unwrap());
        assert_eq!(entry_names(&mut archive), vec!["B0001/B0001.MAIN.jpg"]);
    }
}
