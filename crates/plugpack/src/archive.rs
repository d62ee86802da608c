//! Bounded streaming archive builder with progress events.
//!
//! Archiving runs in two passes. The enumeration pass walks the source list
//! breadth-first, counting files and bytes against the configured
//! [`ArchiveLimit`] before any output exists. The compression pass streams
//! every enumerated file into a tar container in enumeration order,
//! reporting bytes written as they land on disk.
//!
//! The pass sequence is strict:
//! `idle -> enumerating -> {limit exceeded | enumerated} -> compressing ->
//! {I/O error | complete}`. A limit breach leaves no output file at all; an
//! I/O failure mid-stream leaves the partial output under a `.partial`
//! suffix. Only a fully sealed archive ever carries the final name.
//!
//! Progress is delivered through a caller-supplied [`ArchiveEvent`]
//! callback. The pipeline is single-threaded, so delivery order is exactly
//! operation order.

use crate::manifest::Manifest;
use crate::{ARCHIVE_MAGIC, PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Size/count ceiling applied during the enumeration pass.
///
/// A value of `0` in either field means unlimited for that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimit {
    /// Maximum total bytes across all enumerated files.
    #[serde(default)]
    pub max_bytes: u64,

    /// Maximum number of enumerated files.
    #[serde(default)]
    pub max_entries: u64,
}

impl ArchiveLimit {
    /// No ceiling in either dimension.
    pub const UNLIMITED: Self = Self {
        max_bytes: 0,
        max_entries: 0,
    };

    /// Create a limit pair. `0` means unlimited per dimension.
    #[must_use]
    pub fn new(max_bytes: u64, max_entries: u64) -> Self {
        Self {
            max_bytes,
            max_entries,
        }
    }
}

/// Progress events emitted while building an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEvent {
    /// Enumeration is starting over this many queued source paths.
    Start { total_entries: usize },

    /// A file was discovered during enumeration.
    Stat {
        path: PathBuf,
        size: u64,
        running_total: u64,
    },

    /// Enumeration finished; compression begins next.
    StatsComplete { total_bytes: u64 },

    /// Bytes written to the archive stream so far. Monotonically increasing.
    Progress { bytes_written: u64 },

    /// The build failed; the message mirrors the returned error.
    Error { message: String },

    /// The archive is sealed under its final name.
    Complete,
}

/// Optional self-describing ASCII preamble written before the tar stream.
///
/// Layout: `<MAGIC>@@<5-digit zero-padded length><payload>` where the
/// payload is `@@@<name>\n<manifest JSON>\n\n\n` and the length field is the
/// payload byte length plus a constant offset of 25.
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    name: String,
    manifest_json: String,
}

impl ArchiveHeader {
    /// Build the preamble for a manifest, embedding its compact JSON form.
    pub fn new(manifest: &Manifest) -> PackResult<Self> {
        Ok(Self {
            name: manifest.name.clone(),
            manifest_json: manifest.to_json_compact()?,
        })
    }

    /// Render the preamble bytes.
    #[must_use]
    pub fn preamble(&self) -> Vec<u8> {
        let payload = format!("@@@{}\n{}\n\n\n", self.name, self.manifest_json);
        let length = payload.len() + 25;
        format!("{ARCHIVE_MAGIC}@@{length:05}{payload}").into_bytes()
    }
}

/// Totals gathered across the two passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Files enumerated (and archived).
    pub total_entries: u64,

    /// Sum of enumerated file sizes.
    pub total_bytes: u64,

    /// Bytes of archive stream written (preamble excluded).
    pub bytes_written: u64,
}

/// Streams a set of source paths into a single bounded tar archive.
///
/// Directory sources are archived relative to themselves (their contents
/// land at the archive root); file sources are archived under their file
/// name. Children of a directory are visited in lexicographic order, so
/// enumeration (and therefore the archive entry order) is deterministic
/// for identical input trees.
pub struct ArchiveBuilder {
    sources: Vec<PathBuf>,
    dest: PathBuf,
    limit: ArchiveLimit,
    header: Option<ArchiveHeader>,
}

struct FileEntry {
    path: PathBuf,
    name: PathBuf,
}

impl ArchiveBuilder {
    /// Create a builder over an ordered source list and a destination path.
    #[must_use]
    pub fn new(sources: Vec<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            dest: dest.into(),
            limit: ArchiveLimit::UNLIMITED,
            header: None,
        }
    }

    /// Set the size/count limit enforced during enumeration.
    #[must_use]
    pub fn with_limit(mut self, limit: ArchiveLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Prepend a self-describing preamble to the archive.
    #[must_use]
    pub fn with_header(mut self, header: ArchiveHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// Run both passes, delivering progress through `on_event`.
    ///
    /// Every failure is surfaced twice: as an [`ArchiveEvent::Error`] on the
    /// callback and as the returned error.
    pub fn build(self, mut on_event: impl FnMut(ArchiveEvent)) -> PackResult<ArchiveStats> {
        match self.run(&mut on_event) {
            Ok(stats) => Ok(stats),
            Err(err) => {
                on_event(ArchiveEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn run<F: FnMut(ArchiveEvent)>(&self, on_event: &mut F) -> PackResult<ArchiveStats> {
        let (entries, mut stats) = self.enumerate(on_event)?;
        self.compress(&entries, &mut stats, on_event)?;
        info!(
            entries = stats.total_entries,
            bytes = stats.bytes_written,
            dest = %self.dest.display(),
            "archive sealed"
        );
        Ok(stats)
    }

    /// Enumeration pass: breadth-first walk of the source list.
    fn enumerate<F: FnMut(ArchiveEvent)>(
        &self,
        on_event: &mut F,
    ) -> PackResult<(Vec<FileEntry>, ArchiveStats)> {
        on_event(ArchiveEvent::Start {
            total_entries: self.sources.len(),
        });

        let mut queue: VecDeque<FileEntry> = VecDeque::new();
        for source in &self.sources {
            let meta = fs::metadata(source)?;
            let name = if meta.is_dir() {
                PathBuf::new()
            } else {
                source.file_name().map(PathBuf::from).unwrap_or_default()
            };
            queue.push_back(FileEntry {
                path: source.clone(),
                name,
            });
        }

        let mut entries = Vec::new();
        let mut stats = ArchiveStats::default();

        while let Some(entry) = queue.pop_front() {
            let meta = fs::metadata(&entry.path)?;

            if meta.is_dir() {
                let mut children = fs::read_dir(&entry.path)?.collect::<io::Result<Vec<_>>>()?;
                children.sort_by_key(|c| c.file_name());
                for child in children {
                    queue.push_back(FileEntry {
                        path: child.path(),
                        name: entry.name.join(child.file_name()),
                    });
                }
                continue;
            }

            let size = meta.len();
            stats.total_entries += 1;
            stats.total_bytes += size;
            debug!(path = %entry.path.display(), size, "enumerated");
            on_event(ArchiveEvent::Stat {
                path: entry.path.clone(),
                size,
                running_total: stats.total_bytes,
            });

            if self.limit.max_entries != 0 && stats.total_entries > self.limit.max_entries {
                return Err(PackError::LimitExceeded {
                    dimension: "entry count",
                    actual: stats.total_entries,
                    limit: self.limit.max_entries,
                });
            }

            if self.limit.max_bytes != 0 && stats.total_bytes > self.limit.max_bytes {
                return Err(PackError::LimitExceeded {
                    dimension: "byte",
                    actual: stats.total_bytes,
                    limit: self.limit.max_bytes,
                });
            }

            entries.push(entry);
        }

        on_event(ArchiveEvent::StatsComplete {
            total_bytes: stats.total_bytes,
        });
        Ok((entries, stats))
    }

    /// Compression pass: stream enumerated files into the tar container.
    fn compress<F: FnMut(ArchiveEvent)>(
        &self,
        entries: &[FileEntry],
        stats: &mut ArchiveStats,
        on_event: &mut F,
    ) -> PackResult<()> {
        let partial = partial_path(&self.dest);
        let mut file = File::create(&partial)?;

        // The preamble is written whole before the tar stream begins; the
        // same handle then appends the streamed content after it.
        if let Some(header) = &self.header {
            file.write_all(&header.preamble())?;
            file.flush()?;
        }

        let writer = ProgressWriter {
            inner: file,
            bytes: 0,
            on_event: &mut *on_event,
        };
        let mut builder = tar::Builder::new(writer);

        for entry in entries {
            let mut source = File::open(&entry.path)?;
            builder.append_file(&entry.name, &mut source)?;
        }

        let mut writer = builder.into_inner()?;
        writer.flush()?;
        stats.bytes_written = writer.bytes;
        drop(writer);

        // Only a sealed archive gets the final name.
        fs::rename(&partial, &self.dest)?;
        on_event(ArchiveEvent::Complete);
        Ok(())
    }
}

/// Counting writer that reports archive-stream bytes as they are written.
struct ProgressWriter<'a, W: Write, F: FnMut(ArchiveEvent)> {
    inner: W,
    bytes: u64,
    on_event: &'a mut F,
}

impl<W: Write, F: FnMut(ArchiveEvent)> Write for ProgressWriter<'_, W, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes += written as u64;
        (self.on_event)(ArchiveEvent::Progress {
            bytes_written: self.bytes,
        });
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
