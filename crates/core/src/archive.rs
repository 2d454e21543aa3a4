//! Archive container I/O: zip-backed jars, in-memory archives and the
//! manifest main section.

use indexmap::IndexMap;
use jarsmith_utils::errors::ArchiveError;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Path of the manifest inside an archive.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

const CLASS_SUFFIX: &str = ".class";
const LINE_LIMIT: usize = 72;

/// One file stored in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn is_class(&self) -> bool {
        self.path.ends_with(CLASS_SUFFIX)
    }
}

/// True for the manifest and for jar signature files, which never become
/// resources.
pub fn is_metadata(path: &str) -> bool {
    let upper = path.to_ascii_uppercase();
    upper.ends_with(MANIFEST_PATH)
        || upper.ends_with(".SF")
        || upper.ends_with(".RSA")
        || upper.ends_with(".DSA")
}

/// Produces the file entries of an archive.
pub trait EntrySource {
    /// All file entries in archive order. Directories are not included.
    fn read_entries(&mut self) -> Result<Vec<Entry>, ArchiveError>;

    /// Archive-level comment, if any.
    fn comment(&self) -> Option<String> {
        None
    }
}

/// Accepts entries for a new archive.
pub trait EntrySink {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), ArchiveError>;

    fn set_comment(&mut self, comment: &str);

    /// Flushes the archive. No entry may be added afterwards.
    fn finish(&mut self) -> Result<(), ArchiveError>;
}

/// Reads a zip-format archive.
pub struct JarReader<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl JarReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ArchiveError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> JarReader<R> {
    pub fn new(reader: R) -> Result<Self, ArchiveError> {
        Ok(Self {
            archive: ZipArchive::new(reader)?,
        })
    }
}

impl<R: Read + Seek> EntrySource for JarReader<R> {
    fn read_entries(&mut self) -> Result<Vec<Entry>, ArchiveError> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let mut file = self.archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.push(Entry::new(file.name(), data));
        }
        tracing::debug!("read {} archive entries", entries.len());
        Ok(entries)
    }

    fn comment(&self) -> Option<String> {
        let comment = self.archive.comment();
        (!comment.is_empty()).then(|| String::from_utf8_lossy(comment).into_owned())
    }
}

/// Writes a deflate-compressed zip archive.
pub struct JarWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl JarWriter<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ArchiveError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Seek> JarWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
        }
    }
}

impl<W: Write + Seek> EntrySink for JarWriter<W> {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(path, options)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    fn set_comment(&mut self, comment: &str) {
        self.zip.set_comment(comment);
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        self.zip.finish()?;
        Ok(())
    }
}

/// An archive held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryArchive {
    pub entries: Vec<Entry>,
    pub comment: Option<String>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, path: impl Into<String>, data: Vec<u8>) -> Self {
        self.entries.push(Entry::new(path, data));
        self
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.data.as_slice())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.path.as_str())
    }
}

impl EntrySource for MemoryArchive {
    fn read_entries(&mut self) -> Result<Vec<Entry>, ArchiveError> {
        Ok(self.entries.clone())
    }

    fn comment(&self) -> Option<String> {
        self.comment.clone()
    }
}

impl EntrySink for MemoryArchive {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), ArchiveError> {
        self.entries.push(Entry::new(path, data.to_vec()));
        Ok(())
    }

    fn set_comment(&mut self, comment: &str) {
        self.comment = Some(comment.to_string());
    }

    fn finish(&mut self) -> Result<(), ArchiveError> {
        Ok(())
    }
}

/// Main section of a jar manifest.
///
/// Attribute names compare case-insensitively. Per-entry sections are not
/// kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    main: IndexMap<String, String>,
}

impl Default for Manifest {
    fn default() -> Self {
        let mut main = IndexMap::new();
        main.insert("Manifest-Version".to_string(), "1.0".to_string());
        Self { main }
    }
}

impl Manifest {
    pub const VERSION: &'static str = "Manifest-Version";
    pub const MAIN_CLASS: &'static str = "Main-Class";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let text = String::from_utf8_lossy(bytes);
        let mut main: IndexMap<String, String> = IndexMap::new();
        let mut last: Option<String> = None;
        for (number, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                // End of the main section.
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                let Some(value) = last.as_ref().and_then(|key| main.get_mut(key)) else {
                    return Err(ArchiveError::Manifest {
                        line: number + 1,
                        msg: "continuation line without an attribute".to_string(),
                    });
                };
                value.push_str(rest);
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(ArchiveError::Manifest {
                    line: number + 1,
                    msg: format!("missing ':' in {line:?}"),
                });
            };
            let key = key.trim().to_string();
            let value = value.strip_prefix(' ').unwrap_or(value).to_string();
            let existing = main.keys().find(|k| k.eq_ignore_ascii_case(&key)).cloned();
            let key = existing.unwrap_or(key);
            main.insert(key.clone(), value);
            last = Some(key);
        }
        Ok(Self { main })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.main
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let existing = self.main.keys().find(|k| k.eq_ignore_ascii_case(&key)).cloned();
        self.main.insert(existing.unwrap_or(key), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let existing = self.main.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()?;
        self.main.shift_remove(&existing)
    }

    /// Entry class as an internal name.
    pub fn main_class(&self) -> Option<String> {
        self.get(Self::MAIN_CLASS)
            .map(|name| name.trim().replace('.', "/"))
            .filter(|name| !name.is_empty())
    }

    /// Sets the entry class from an internal name.
    pub fn set_main_class(&mut self, internal_name: &str) {
        self.put(Self::MAIN_CLASS, internal_name.replace('/', "."));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.main.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialises with CRLF line ends, `Manifest-Version` first and lines
    /// wrapped at 72 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let version = self.get(Self::VERSION).unwrap_or("1.0");
        write_attribute(&mut out, Self::VERSION, version);
        for (key, value) in &self.main {
            if !key.eq_ignore_ascii_case(Self::VERSION) {
                write_attribute(&mut out, key, value);
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn write_attribute(out: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{key}: {value}");
    let mut budget = LINE_LIMIT;
    let mut used = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if used + len > budget {
            out.extend_from_slice(b"\r\n ");
            budget = LINE_LIMIT - 1;
            used = 0;
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        used += len;
    }
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn manifest_reads_continuations_and_main_class() {
        let text = b"Manifest-Version: 1.0\r\nMain-Class: com.example.VeryLongPackageName\r\n .App\r\nCreated-By: test\r\n\r\nName: a/B.class\r\nSHA-256-Digest: xyz\r\n";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(
            manifest.main_class().as_deref(),
            Some("com/example/VeryLongPackageName/App")
        );
        assert_eq!(manifest.get("created-by"), Some("test"));
        assert_eq!(manifest.get("SHA-256-Digest"), None);
    }

    #[test]
    fn manifest_wraps_long_lines() {
        let mut manifest = Manifest::new();
        manifest.set_main_class(&format!("p/{}", "X".repeat(100)));
        let bytes = manifest.to_bytes();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("Manifest-Version: 1.0\r\n"));
        assert!(text.lines().all(|l| l.len() <= LINE_LIMIT));
        assert_eq!(Manifest::parse(&bytes).unwrap(), manifest);
    }

    #[test]
    fn manifest_rejects_stray_continuation() {
        let err = Manifest::parse(b" orphan\r\n").unwrap_err();
        assert!(matches!(err, ArchiveError::Manifest { line: 1, .. }));
    }

    #[test]
    fn metadata_paths() {
        assert!(is_metadata("META-INF/MANIFEST.MF"));
        assert!(is_metadata("META-INF/SIGNER.SF"));
        assert!(is_metadata("META-INF/signer.rsa"));
        assert!(!is_metadata("META-INF/services/x.Y"));
    }

    #[test]
    fn jar_file_round_trip_keeps_entries_and_comment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jar");
        let mut writer = JarWriter::create(&path).unwrap();
        writer.put("a/B.class", &[0xca, 0xfe]).unwrap();
        writer.put("res/data.txt", b"hello").unwrap();
        writer.set_comment("built by a test");
        writer.finish().unwrap();

        let mut reader = JarReader::open(&path).unwrap();
        let entries = reader.read_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_class());
        assert_eq!(entries[1].data, b"hello");
        assert_eq!(reader.comment().as_deref(), Some("built by a test"));
    }

    #[test]
    fn memory_archive_is_both_source_and_sink() {
        let mut archive = MemoryArchive::new();
        archive.put("x.txt", b"1").unwrap();
        archive.set_comment("c");
        archive.finish().unwrap();
        assert_eq!(archive.get("x.txt"), Some(&b"1"[..]));
        assert_eq!(archive.read_entries().unwrap().len(), 1);
        assert_eq!(EntrySource::comment(&archive).as_deref(), Some("c"));
    }

    #[test]
    fn jar_reader_skips_directories() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.add_directory("a/", options).unwrap();
            zip.start_file("a/B.class", options).unwrap();
            zip.write_all(&[1, 2, 3]).unwrap();
            zip.set_comment("note");
            zip.finish().unwrap();
        }
        buffer.set_position(0);
        let mut reader = JarReader::new(buffer).unwrap();
        let entries = reader.read_entries().unwrap();
        assert_eq!(entries, vec![Entry::new("a/B.class", vec![1, 2, 3])]);
        assert_eq!(reader.comment().as_deref(), Some("note"));
    }
}
