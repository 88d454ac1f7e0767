//! Decides between streaming a single output file or building a ZIP archive, using a
//! spill-to-disk buffer so a large archive never forces the whole thing to live in
//! memory at once.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::model::OutputFileEntry;

/// Memory-resident up to this many bytes, then backed by a temporary file.
const SPOOL_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024;

/// A (storage-path, archive-name) pair.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub storage_path: PathBuf,
    pub archive_name: String,
}

impl From<&OutputFileEntry> for OutputEntry {
    fn from(f: &OutputFileEntry) -> Self {
        Self {
            storage_path: PathBuf::from(&f.path),
            archive_name: f.name.clone(),
        }
    }
}

/// What the download handler should do for a completed job's output files.
pub enum DownloadPlan {
    NoOutputs,
    SingleFile(OutputEntry),
    Zip(Vec<OutputEntry>),
}

/// Chooses the download strategy: no files means 404, one file streams directly, more
/// than one gets archived.
pub fn plan_download(output_files: &[OutputFileEntry]) -> DownloadPlan {
    match output_files {
        [] => DownloadPlan::NoOutputs,
        [only] => DownloadPlan::SingleFile(OutputEntry::from(only)),
        many => DownloadPlan::Zip(many.iter().map(OutputEntry::from).collect()),
    }
}

/// A buffer that starts in memory and migrates to a temporary file once it would
/// exceed `SPOOL_THRESHOLD_BYTES`, mirroring `tempfile.SpooledTemporaryFile`.
enum SpooledBuffer {
    Memory(Cursor<Vec<u8>>),
    Disk(File),
}

impl SpooledBuffer {
    fn new() -> Self {
        SpooledBuffer::Memory(Cursor::new(Vec::new()))
    }

    fn migrate_to_disk(&mut self) -> io::Result<()> {
        if let SpooledBuffer::Memory(cursor) = self {
            let position = cursor.position();
            let mut file = tempfile::tempfile()?;
            file.write_all(cursor.get_ref())?;
            file.seek(SeekFrom::Start(position))?;
            *self = SpooledBuffer::Disk(file);
        }
        Ok(())
    }
}

impl Write for SpooledBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let SpooledBuffer::Memory(cursor) = self {
            let projected = cursor.position() + buf.len() as u64;
            if projected > SPOOL_THRESHOLD_BYTES {
                self.migrate_to_disk()?;
            }
        }
        match self {
            SpooledBuffer::Memory(c) => c.write(buf),
            SpooledBuffer::Disk(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SpooledBuffer::Memory(c) => c.flush(),
            SpooledBuffer::Disk(f) => f.flush(),
        }
    }
}

impl Seek for SpooledBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SpooledBuffer::Memory(c) => c.seek(pos),
            SpooledBuffer::Disk(f) => f.seek(pos),
        }
    }
}

impl Read for SpooledBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SpooledBuffer::Memory(c) => c.read(buf),
            SpooledBuffer::Disk(f) => f.read(buf),
        }
    }
}

/// Streamable bytes produced by [`build_zip`]: a finished archive, seeked to the start.
pub struct ZipStream {
    buffer: SpooledBuffer,
    pub missing: Vec<String>,
}

impl Read for ZipStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

/// Builds a ZIP archive from `entries` into a spill-to-disk buffer. Any entry missing
/// from disk at build time is skipped and recorded in `MISSING_FILES.txt` inside the
/// archive, mirroring the original implementation's manifest behavior.
pub fn build_zip(entries: &[OutputEntry]) -> io::Result<ZipStream> {
    let mut buffer = SpooledBuffer::new();
    let mut missing = Vec::new();

    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options: zip::write::FileOptions<()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for entry in entries {
            if entry.storage_path.is_file() {
                zip.start_file(&entry.archive_name, options)
                    .map_err(io::Error::other)?;
                let mut source = File::open(&entry.storage_path)?;
                io::copy(&mut source, &mut zip)?;
            } else {
                missing.push(entry.archive_name.clone());
            }
        }

        if !missing.is_empty() {
            let note = format!(
                "The following files were not found at download time:\n{}",
                missing
                    .iter()
                    .map(|name| format!("- {name}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            zip.start_file("MISSING_FILES.txt", options)
                .map_err(io::Error::other)?;
            zip.write_all(note.as_bytes())?;
        }

        zip.finish().map_err(io::Error::other)?;
    }

    buffer.seek(SeekFrom::Start(0))?;
    Ok(ZipStream { buffer, missing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn entry(dir: &std::path::Path, name: &str, content: &str) -> OutputEntry {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        OutputEntry {
            storage_path: path,
            archive_name: name.to_string(),
        }
    }

    #[test]
    fn plan_download_no_outputs_is_not_found() {
        assert!(matches!(plan_download(&[]), DownloadPlan::NoOutputs));
    }

    #[test]
    fn plan_download_single_output_streams_directly() {
        let files = vec![OutputFileEntry {
            name: "a.txt".to_string(),
            path: "/tmp/a.txt".to_string(),
            size: Some(1),
        }];
        assert!(matches!(plan_download(&files), DownloadPlan::SingleFile(_)));
    }

    #[test]
    fn plan_download_multiple_outputs_archives() {
        let files = vec![
            OutputFileEntry {
                name: "a.txt".to_string(),
                path: "/tmp/a.txt".to_string(),
                size: Some(1),
            },
            OutputFileEntry {
                name: "b.txt".to_string(),
                path: "/tmp/b.txt".to_string(),
                size: Some(1),
            },
        ];
        assert!(matches!(plan_download(&files), DownloadPlan::Zip(entries) if entries.len() == 2));
    }

    #[test]
    fn build_zip_contains_present_files_and_manifest_for_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let present = entry(tmp.path(), "a.txt", "hello");
        let missing = OutputEntry {
            storage_path: tmp.path().join("missing.txt"),
            archive_name: "missing.txt".to_string(),
        };

        let mut stream = build_zip(&[present, missing]).unwrap();
        assert_eq!(stream.missing, vec!["missing.txt".to_string()]);

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("a.txt").is_ok());
        assert!(archive.by_name("MISSING_FILES.txt").is_ok());
    }

    #[test]
    fn spooled_buffer_migrates_to_disk_past_threshold() {
        let mut buffer = SpooledBuffer::new();
        let chunk = vec![0u8; 1024];
        buffer.write_all(&chunk).unwrap();
        assert!(matches!(buffer, SpooledBuffer::Memory(_)));

        buffer.seek(SeekFrom::Start(SPOOL_THRESHOLD_BYTES)).unwrap();
        buffer.write_all(&chunk).unwrap();
        assert!(matches!(buffer, SpooledBuffer::Disk(_)));
    }
}
