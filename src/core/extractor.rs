//! Extraction controller
//!
//! Wires the pipeline together: open the archive, start the workers, run the
//! producer on the calling thread, wait for the tracker, join the pool, then
//! report the first failure or a summary.

use crate::archive::TarArchive;
use crate::config::{ExtractConfig, OutputFormat};
use crate::core::{
    apply_deferred_modes, job_queue, spawn_workers, CompletionTracker, ExtractStats, Producer,
    WorkerContext,
};
use crate::error::{ExtractError, Result};
use crate::fs::{platform_primitive, CopyPrimitive};
use crate::progress::ProgressReporter;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a successful extraction
#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    /// Regular files written
    pub files_extracted: u64,
    /// Regular files skipped in update mode
    pub files_skipped: u64,
    /// Directories created
    pub dirs_created: u64,
    /// Entries of unsupported types that were skipped
    pub entries_ignored: u64,
    /// Payload bytes written
    pub bytes_copied: u64,
    /// Workers used
    pub workers: usize,
    /// Transfer primitive used
    pub primitive: &'static str,
    /// Wall time
    pub duration: Duration,
    /// Average throughput in bytes/second
    pub throughput: f64,
}

impl ExtractSummary {
    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Extraction Summary ===");
        println!("Files extracted: {}", self.files_extracted);
        if self.files_skipped > 0 {
            println!("Files skipped:   {}", self.files_skipped);
        }
        println!("Directories:     {}", self.dirs_created);
        if self.entries_ignored > 0 {
            println!("Other entries:   {} (not extracted)", self.entries_ignored);
        }
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!("Workers:         {} ({})", self.workers, self.primitive);
        println!("Duration:        {:.2?}", self.duration);
        println!("Throughput:      {}/s", humansize::format_size(self.throughput as u64, humansize::BINARY));
    }

    /// Print in the requested format
    pub fn print(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => self.print_summary(),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(self)
                    .map_err(|e| ExtractError::config(format!("cannot encode summary: {}", e)))?;
                println!("{}", json);
            }
        }
        Ok(())
    }
}

/// Parallel archive extractor
pub struct Extractor {
    config: ExtractConfig,
    primitive: Arc<dyn CopyPrimitive>,
    progress: Option<Arc<ProgressReporter>>,
}

impl Extractor {
    /// Create an extractor using the platform transfer primitive
    pub fn new(config: ExtractConfig) -> Self {
        let primitive = platform_primitive(config.buffer_size);
        Self {
            config,
            primitive,
            progress: None,
        }
    }

    /// Replace the transfer primitive
    pub fn with_primitive(mut self, primitive: Arc<dyn CopyPrimitive>) -> Self {
        self.primitive = primitive;
        self
    }

    /// Attach a progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Run the extraction to completion or to the first failure
    pub fn execute(&self) -> Result<ExtractSummary> {
        let result = self.run();
        if let Some(progress) = &self.progress {
            match &result {
                Ok(summary) => progress.finish_success(&format!(
                    "{} files extracted",
                    summary.files_extracted
                )),
                Err(e) => progress.finish_error(&format!(
                    "{} after {} files ({})",
                    e,
                    progress.files_done(),
                    humansize::format_size(progress.bytes_copied(), humansize::BINARY)
                )),
            }
        }
        result
    }

    fn run(&self) -> Result<ExtractSummary> {
        let start_time = Instant::now();
        let config = &self.config;
        config.validate()?;

        let root = &config.destination;
        std::fs::create_dir_all(root).map_err(|source| ExtractError::DirectoryCreate {
            path: root.clone(),
            source,
        })?;

        let mut archive = TarArchive::open(&config.archive)?;
        if let Some(progress) = &self.progress {
            progress.set_total_bytes(archive.size());
            progress.set_status("extracting");
        }

        let workers = config.effective_workers();
        let tracker = Arc::new(CompletionTracker::new());
        let stats = Arc::new(ExtractStats::default());
        let ctx = Arc::new(WorkerContext {
            archive: config.archive.clone(),
            update: config.update,
            preallocate: config.preallocate,
            preserve_mtime: config.preserve_mtime,
            list_entries: config.list_entries,
            primitive: Arc::clone(&self.primitive),
            tracker: Arc::clone(&tracker),
            stats: Arc::clone(&stats),
            progress: self.progress.clone(),
        });

        tracing::info!(
            "extracting {} into {} with {} workers ({})",
            archive.path().display(),
            root.display(),
            workers,
            self.primitive.name()
        );

        let (sender, receiver) = job_queue(config.effective_queue_depth());
        // On failure, already-started workers exit once `sender` drops here.
        let handles = spawn_workers(workers, receiver, ctx)?;

        let producer = Producer::new(root, &tracker, &stats)
            .update(config.update)
            .list_entries(config.list_entries);
        let produced = archive
            .entries()
            .and_then(|entries| producer.run(entries, sender));

        // The queue is closed by now, whichever way the producer ended.
        let deferred = match produced {
            Ok(report) => {
                tracing::debug!("producer finished: {} jobs", report.jobs_enqueued);
                report.deferred_modes
            }
            Err(e) => {
                tracker.fail(e);
                Vec::new()
            }
        };

        tracker.wait();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                tracker.fail(ExtractError::WorkerPanicked(worker_id));
            }
        }

        if let Some(err) = tracker.take_failure() {
            tracing::error!(entry = ?err.entry_path(), "extraction failed: {}", err);
            return Err(err);
        }

        apply_deferred_modes(&deferred)?;

        let duration = start_time.elapsed();
        let bytes_copied = stats.bytes_copied.load(Ordering::Relaxed);
        let throughput = if duration.as_secs_f64() > 0.0 {
            bytes_copied as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Ok(ExtractSummary {
            files_extracted: stats.files_extracted.load(Ordering::Relaxed),
            files_skipped: stats.files_skipped.load(Ordering::Relaxed),
            dirs_created: stats.dirs_created.load(Ordering::Relaxed),
            entries_ignored: stats.entries_ignored.load(Ordering::Relaxed),
            bytes_copied,
            workers,
            primitive: self.primitive.name(),
            duration,
            throughput,
        })
    }
}

/// Extract `archive` into `destination` with default settings
pub fn extract(archive: &Path, destination: &Path) -> Result<ExtractSummary> {
    Extractor::new(ExtractConfig::new(archive, destination)).execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{default_primitive, PartialCopy};
    use proptest::prelude::*;
    use std::fs::File;
    use std::io::{self, Write};
    use std::os::unix::fs::MetadataExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    enum Item<'a> {
        Dir(&'a str, u32),
        File(&'a str, &'a [u8], u32),
        Symlink(&'a str, &'a str),
    }

    fn write_archive(path: &Path, items: &[Item<'_>]) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for item in items {
            let mut header = tar::Header::new_gnu();
            match *item {
                Item::Dir(name, mode) => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(mode);
                    header.set_cksum();
                    builder.append_data(&mut header, name, io::empty()).unwrap();
                }
                Item::File(name, data, mode) => {
                    header.set_size(data.len() as u64);
                    header.set_mode(mode);
                    header.set_mtime(1_650_000_000);
                    header.set_cksum();
                    builder.append_data(&mut header, name, data).unwrap();
                }
                Item::Symlink(name, target) => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    header.set_cksum();
                    builder.append_link(&mut header, name, target).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().flush().unwrap();
    }

    fn config(archive: &Path, dest: &Path, workers: usize) -> ExtractConfig {
        ExtractConfig {
            workers,
            ..ExtractConfig::new(archive, dest)
        }
    }

    fn mode_of(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().mode() & 0o7777
    }

    #[test]
    fn test_extracts_directories_and_files() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.tar");
        write_archive(
            &archive,
            &[
                Item::Dir("a/", 0o755),
                Item::File("a/x.txt", b"hi", 0o644),
                Item::File("a/y.txt", b"bye", 0o600),
            ],
        );
        let out = dir.path().join("out");

        let summary = Extractor::new(config(&archive, &out, 2)).execute().unwrap();

        assert_eq!(std::fs::read(out.join("a/x.txt")).unwrap(), b"hi");
        assert_eq!(std::fs::read(out.join("a/y.txt")).unwrap(), b"bye");
        assert_eq!(mode_of(&out.join("a/x.txt")), 0o644);
        assert_eq!(mode_of(&out.join("a/y.txt")), 0o600);
        assert_eq!(std::fs::metadata(out.join("a/x.txt")).unwrap().mtime(), 1_650_000_000);

        assert_eq!(summary.files_extracted, 2);
        assert_eq!(summary.dirs_created, 1);
        assert_eq!(summary.bytes_copied, 5);
        assert_eq!(summary.workers, 2);
    }

    #[test]
    fn test_worker_count_does_not_change_result() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("many.tar");

        let names: Vec<String> = (0..40).map(|i| format!("d{}/f{}.bin", i % 5, i)).collect();
        let payloads: Vec<Vec<u8>> = (0..40)
            .map(|i| (0..(i * 997 % 9000)).map(|b| (b % 251) as u8).collect())
            .collect();
        let mut items = vec![
            Item::Dir("d0", 0o755),
            Item::Dir("d1", 0o755),
            Item::Dir("d2", 0o755),
            Item::Dir("d3", 0o755),
            Item::Dir("d4", 0o755),
        ];
        for (name, data) in names.iter().zip(&payloads) {
            items.push(Item::File(name, data, 0o644));
        }
        write_archive(&archive, &items);

        let expected: u64 = payloads.iter().map(|p| p.len() as u64).sum();
        for workers in [1, 4, 64] {
            let out = dir.path().join(format!("out{}", workers));
            let summary = Extractor::new(config(&archive, &out, workers)).execute().unwrap();
            assert_eq!(summary.files_extracted, 40);
            assert_eq!(summary.bytes_copied, expected);
            for (name, data) in names.iter().zip(&payloads) {
                assert_eq!(&std::fs::read(out.join(name)).unwrap(), data, "{}", name);
            }
        }
    }

    #[test]
    fn test_update_mode_leaves_matching_files() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("u.tar");
        write_archive(
            &archive,
            &[
                Item::Dir("a", 0o755),
                Item::File("a/same.txt", b"12345", 0o644),
                Item::File("a/new.txt", b"fresh", 0o644),
            ],
        );
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("a")).unwrap();
        std::fs::write(out.join("a/same.txt"), b"ABCDE").unwrap();
        std::fs::set_permissions(
            out.join("a/same.txt"),
            std::os::unix::fs::PermissionsExt::from_mode(0o644),
        )
        .unwrap();

        // Without update the existing directory is an error
        let err = Extractor::new(config(&archive, &out, 2)).execute().unwrap_err();
        assert!(matches!(err, ExtractError::DirectoryCreate { .. }));

        let summary = Extractor::new(ExtractConfig {
            update: true,
            ..config(&archive, &out, 2)
        })
        .execute()
        .unwrap();

        assert_eq!(std::fs::read(out.join("a/same.txt")).unwrap(), b"ABCDE");
        assert_eq!(std::fs::read(out.join("a/new.txt")).unwrap(), b"fresh");
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_extracted, 1);
    }

    /// Transfers normally except for one offset, where the source "ends" early
    struct ShortAt {
        inner: Arc<dyn CopyPrimitive>,
        offset: u64,
    }

    impl CopyPrimitive for ShortAt {
        fn name(&self) -> &'static str {
            "short-at"
        }

        fn expand(&self, file: &File, len: u64) -> io::Result<()> {
            self.inner.expand(file, len)
        }

        fn bulk_copy(&self, dst: &File, src: &File, offset: u64, len: u64) -> std::result::Result<u64, PartialCopy> {
            if offset == self.offset {
                return self.inner.bulk_copy(dst, src, offset, len / 2);
            }
            self.inner.bulk_copy(dst, src, offset, len)
        }
    }

    fn offset_of(archive: &Path, name: &str) -> u64 {
        let mut archive = TarArchive::open(archive).unwrap();
        let found = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .find(|e| e.path == Path::new(name))
            .unwrap();
        found.data_offset
    }

    #[test]
    fn test_short_transfer_fails_and_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("f.tar");
        write_archive(
            &archive,
            &[
                Item::File("one.txt", b"first file", 0o644),
                Item::File("two.txt", b"second file", 0o644),
                Item::File("bad.txt", b"this one is cut short", 0o644),
            ],
        );
        let out = dir.path().join("out");
        let primitive = Arc::new(ShortAt {
            inner: default_primitive(),
            offset: offset_of(&archive, "bad.txt"),
        });

        let err = Extractor::new(config(&archive, &out, 1))
            .with_primitive(primitive)
            .execute()
            .unwrap_err();

        match err {
            ExtractError::ShortTransfer { path, expected, actual } => {
                assert_eq!(path, out.join("bad.txt"));
                assert_eq!(expected, 21);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!out.join("bad.txt").exists());
        assert_eq!(std::fs::read(out.join("one.txt")).unwrap(), b"first file");
        assert_eq!(std::fs::read(out.join("two.txt")).unwrap(), b"second file");
    }

    #[test]
    fn test_failure_with_many_workers_is_reported() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("f.tar");
        let payload = vec![7u8; 4096];
        let names: Vec<String> = (0..32).map(|i| format!("f{:02}", i)).collect();
        let items: Vec<_> = names
            .iter()
            .map(|n| Item::File(n, &payload, 0o644))
            .collect();
        write_archive(&archive, &items);

        let out = dir.path().join("out");
        let primitive = Arc::new(ShortAt {
            inner: default_primitive(),
            offset: offset_of(&archive, "f05"),
        });

        let err = Extractor::new(ExtractConfig {
            queue_depth: Some(1),
            ..config(&archive, &out, 4)
        })
        .with_primitive(primitive)
        .execute()
        .unwrap_err();

        assert!(matches!(err, ExtractError::ShortTransfer { .. }));
        assert!(!out.join("f05").exists());
    }

    #[test]
    fn test_corrupt_tail_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("c.tar");
        write_archive(&archive, &[Item::File("ok.txt", b"fine", 0o644)]);

        // Replace the end-of-archive blocks with a header that fails its checksum
        let mut bytes = std::fs::read(&archive).unwrap();
        bytes.truncate(bytes.len() - 1024);
        bytes.extend_from_slice(&[0x5Au8; 512]);
        std::fs::write(&archive, &bytes).unwrap();

        let out = dir.path().join("out");
        let err = Extractor::new(config(&archive, &out, 2)).execute().unwrap_err();
        assert!(matches!(err, ExtractError::StreamDecode { .. }));
    }

    #[test]
    fn test_unsafe_entry_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar");

        // tar::Builder refuses "..", so write the name into the header directly
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..9].copy_from_slice(b"../escape");
        header.set_size(3);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"bad"[..]).unwrap();
        builder.into_inner().unwrap().flush().unwrap();

        let out = dir.path().join("out");
        let err = Extractor::new(config(&archive, &out, 2)).execute().unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_other_entry_types_skipped() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("l.tar");
        write_archive(
            &archive,
            &[
                Item::File("target.txt", b"data", 0o644),
                Item::Symlink("link", "target.txt"),
            ],
        );
        let out = dir.path().join("out");

        let summary = Extractor::new(config(&archive, &out, 2)).execute().unwrap();
        assert_eq!(summary.entries_ignored, 1);
        assert_eq!(summary.files_extracted, 1);
        assert!(std::fs::symlink_metadata(out.join("link")).is_err());
    }

    #[test]
    fn test_read_only_directory_gets_its_mode_last() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("ro.tar");
        write_archive(
            &archive,
            &[
                Item::Dir("locked", 0o555),
                Item::File("locked/inside.txt", b"still written", 0o444),
            ],
        );
        let out = dir.path().join("out");

        Extractor::new(config(&archive, &out, 2)).execute().unwrap();
        assert_eq!(std::fs::read(out.join("locked/inside.txt")).unwrap(), b"still written");
        assert_eq!(mode_of(&out.join("locked")), 0o555);

        std::fs::set_permissions(
            out.join("locked"),
            std::os::unix::fs::PermissionsExt::from_mode(0o755),
        )
        .unwrap();
    }

    #[test]
    fn test_empty_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("empty.tar");
        write_archive(&archive, &[]);

        let summary = extract(&archive, &dir.path().join("out")).unwrap();
        assert_eq!(summary.files_extracted, 0);
        assert_eq!(summary.bytes_copied, 0);
    }

    #[test]
    fn test_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = extract(&dir.path().join("none.tar"), dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::ArchiveOpen { .. }));
    }

    #[test]
    fn test_summary_json() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("j.tar");
        write_archive(&archive, &[Item::File("x", b"abc", 0o644)]);

        let summary = extract(&archive, &dir.path().join("out")).unwrap();
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["files_extracted"], 1);
        assert_eq!(value["bytes_copied"], 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_extracted_tree_matches_archive(
            sizes in proptest::collection::vec(0usize..20_000, 1..12),
            workers in 1usize..9,
        ) {
            let dir = TempDir::new().unwrap();
            let archive = dir.path().join("p.tar");
            let names: Vec<String> = (0..sizes.len()).map(|i| format!("p{}", i)).collect();
            let payloads: Vec<Vec<u8>> = sizes
                .iter()
                .enumerate()
                .map(|(i, &n)| (0..n).map(|b| ((b + i) % 256) as u8).collect())
                .collect();
            let items: Vec<_> = names
                .iter()
                .zip(&payloads)
                .map(|(n, p)| Item::File(n, p, 0o644))
                .collect();
            write_archive(&archive, &items);

            let out: PathBuf = dir.path().join("out");
            let summary = Extractor::new(config(&archive, &out, workers)).execute().unwrap();

            prop_assert_eq!(summary.bytes_copied, sizes.iter().sum::<usize>() as u64);
            for (name, data) in names.iter().zip(&payloads) {
                prop_assert_eq!(&std::fs::read(out.join(name)).unwrap(), data);
            }
        }
    }
}
