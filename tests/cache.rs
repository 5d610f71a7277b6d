use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use ebible_corpus::cache::{
    ArchiveName, DownloadAction, DownloadOptions, Downloader, RetentionPolicy, list_entries,
};
use ebible_corpus::domain::TranslationId;
use ebible_corpus::ebible::EbibleClient;
use ebible_corpus::error::CorpusError;

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

enum Reply {
    Archive(Vec<u8>),
    Garbage,
    Offline,
}

struct MockEbible {
    reply: Reply,
    calls: Mutex<usize>,
}

impl MockEbible {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl EbibleClient for MockEbible {
    fn download_catalog(&self, _destination: &Path) -> Result<(), CorpusError> {
        Err(CorpusError::Fetch("catalog not mocked".to_string()))
    }

    fn download_archive(
        &self,
        _id: &TranslationId,
        destination: &Path,
    ) -> Result<u64, CorpusError> {
        *self.calls.lock().unwrap() += 1;
        let bytes = match &self.reply {
            Reply::Archive(bytes) => bytes.clone(),
            Reply::Garbage => b"<html>503 Service Unavailable</html>".to_vec(),
            Reply::Offline => return Err(CorpusError::Fetch("connection refused".to_string())),
        };
        fs::write(destination, &bytes).unwrap();
        Ok(bytes.len() as u64)
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn options(today: NaiveDate) -> DownloadOptions {
    DownloadOptions {
        max_age_days: 14,
        force: false,
        today,
        retention: RetentionPolicy::KeepAll,
        fetch_delay: Duration::ZERO,
    }
}

fn good_archive() -> Vec<u8> {
    zip_bytes(&[("GENgup.usfm", "\\id GEN\n\\c 1\n\\v 1 Text\n")])
}

fn seed(cache: &Path, id: &TranslationId, date: NaiveDate) -> std::path::PathBuf {
    let path = cache.join(ArchiveName::new(id.clone(), date).file_name());
    fs::write(&path, good_archive()).unwrap();
    path
}

#[test]
fn second_fetch_within_window_reuses_cache() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let downloader = Downloader::new(&client, temp.path());
    let id: TranslationId = "gup".parse().unwrap();

    let first = downloader.fetch(&id, &options(day(2024, 5, 1))).unwrap();
    let second = downloader.fetch(&id, &options(day(2024, 5, 3))).unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(first.action, DownloadAction::Fetched);
    assert_eq!(second.action, DownloadAction::Reused);
    assert_eq!(first.entry.path, second.entry.path);
    assert!(first.entry.path.ends_with("gup--2024-05-01.zip"));
}

#[test]
fn archive_exactly_max_age_is_reused() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let id: TranslationId = "gup".parse().unwrap();
    seed(temp.path(), &id, day(2024, 5, 1));

    let download = Downloader::new(&client, temp.path())
        .fetch(&id, &options(day(2024, 5, 15)))
        .unwrap();

    assert_eq!(download.action, DownloadAction::Reused);
    assert_eq!(client.calls(), 0);
}

#[test]
fn archive_one_day_past_max_age_is_refetched_alongside() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let id: TranslationId = "gup".parse().unwrap();
    let old = seed(temp.path(), &id, day(2024, 5, 1));

    let download = Downloader::new(&client, temp.path())
        .fetch(&id, &options(day(2024, 5, 16)))
        .unwrap();

    assert_eq!(download.action, DownloadAction::Fetched);
    assert_eq!(client.calls(), 1);
    assert!(download.entry.path.ends_with("gup--2024-05-16.zip"));
    assert!(old.exists());
    assert_eq!(list_entries(temp.path(), &id).unwrap().len(), 2);
}

#[test]
fn newest_archive_decides_freshness() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let id: TranslationId = "gup".parse().unwrap();
    seed(temp.path(), &id, day(2024, 1, 1));
    let recent = seed(temp.path(), &id, day(2024, 5, 10));

    let download = Downloader::new(&client, temp.path())
        .fetch(&id, &options(day(2024, 5, 16)))
        .unwrap();

    assert_eq!(download.entry.path, recent);
    assert_eq!(client.calls(), 0);
}

#[test]
fn force_fetches_despite_fresh_cache() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let id: TranslationId = "gup".parse().unwrap();
    seed(temp.path(), &id, day(2024, 5, 10));

    let mut forced = options(day(2024, 5, 11));
    forced.force = true;
    let download = Downloader::new(&client, temp.path())
        .fetch(&id, &forced)
        .unwrap();

    assert_eq!(download.action, DownloadAction::Fetched);
    assert_eq!(client.calls(), 1);
}

#[test]
fn corrupt_download_is_not_promoted() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Garbage);
    let id: TranslationId = "gup".parse().unwrap();

    let err = Downloader::new(&client, temp.path())
        .fetch(&id, &options(day(2024, 5, 1)))
        .unwrap_err();

    assert_matches!(err, CorpusError::CorruptArchive { .. });
    assert!(list_entries(temp.path(), &id).unwrap().is_empty());
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn network_failure_with_stale_cache_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Offline);
    let id: TranslationId = "gup".parse().unwrap();
    seed(temp.path(), &id, day(2024, 1, 1));

    let err = Downloader::new(&client, temp.path())
        .fetch(&id, &options(day(2024, 5, 1)))
        .unwrap_err();

    assert!(err.is_network());
    assert_matches!(err, CorpusError::Fetch(_));
}

#[test]
fn unreadable_fresh_archive_is_refetched() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let id: TranslationId = "gup".parse().unwrap();
    let cached = temp
        .path()
        .join(ArchiveName::new(id.clone(), day(2024, 5, 1)).file_name());
    fs::write(&cached, b"").unwrap();

    let download = Downloader::new(&client, temp.path())
        .fetch(&id, &options(day(2024, 5, 2)))
        .unwrap();

    assert_eq!(download.action, DownloadAction::Fetched);
    assert!(download.entry.path.ends_with("gup--2024-05-02.zip"));
}

#[test]
fn keep_latest_prunes_only_older_archives_of_the_same_id() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockEbible::new(Reply::Archive(good_archive()));
    let id: TranslationId = "gup".parse().unwrap();
    let other: TranslationId = "gupk".parse().unwrap();
    let oldest = seed(temp.path(), &id, day(2024, 1, 1));
    let older = seed(temp.path(), &id, day(2024, 2, 1));
    let unrelated = seed(temp.path(), &other, day(2024, 1, 1));

    let mut keep_two = options(day(2024, 5, 1));
    keep_two.retention = RetentionPolicy::KeepLatest(2);
    let download = Downloader::new(&client, temp.path())
        .fetch(&id, &keep_two)
        .unwrap();

    assert_eq!(download.pruned, vec![oldest.clone()]);
    assert!(!oldest.exists());
    assert!(older.exists());
    assert!(download.entry.path.exists());
    assert!(unrelated.exists());
}
