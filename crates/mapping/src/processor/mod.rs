//! Mapping file readers and writers.
//!
//! A [`MappingProcessor`] turns lines of one file format into store
//! insertions. [`load`] drives a processor over a file; [`write`] renders a
//! store back into either format.

mod proguard;
mod srg;

pub use proguard::ProGuardProcessor;
pub use srg::SrgProcessor;

use crate::store::{Direction, MappingStore};
use jarsmith_utils::errors::MappingLoadError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Supported mapping file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingFormat {
    /// Indented `original -> obfuscated:` listing with source-syntax types.
    ProGuard,
    /// `PK:`/`CL:`/`FD:`/`MD:` lines with descriptors.
    Srg,
}

impl MappingFormat {
    /// Direction a freshly loaded store of this format translates in.
    ///
    /// ProGuard files describe how an archive was obfuscated, so loading one
    /// restores the original names. SRG lines name the current symbol first.
    pub const fn default_direction(self) -> Direction {
        match self {
            Self::ProGuard => Direction::Reversing,
            Self::Srg => Direction::Applying,
        }
    }

    pub fn processor(self) -> Box<dyn MappingProcessor> {
        match self {
            Self::ProGuard => Box::new(ProGuardProcessor::default()),
            Self::Srg => Box::new(SrgProcessor),
        }
    }
}

/// Line-oriented parser of one mapping format.
pub trait MappingProcessor {
    fn format(&self) -> MappingFormat;

    /// Handles one line. `number` is 1-based and only used for errors.
    fn process_line(
        &mut self,
        store: &mut MappingStore,
        number: usize,
        line: &str,
    ) -> Result<(), MappingLoadError>;

    /// Runs after the last line.
    fn finish(&mut self, _store: &mut MappingStore) {}
}

pub(crate) fn parse_error(number: usize, line: &str, msg: impl Into<String>) -> MappingLoadError {
    MappingLoadError::Parse {
        line: number,
        msg: msg.into(),
        raw: line.to_string(),
    }
}

/// Reads a mapping file into a new store in the format's default direction.
pub fn load(path: impl AsRef<Path>, format: MappingFormat) -> Result<MappingStore, MappingLoadError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    if !path.exists() {
        return Err(MappingLoadError::NotFound(shown));
    }
    let file = File::open(path).map_err(|source| MappingLoadError::FileRead {
        path: shown.clone(),
        source,
    })?;
    tracing::debug!(path = %shown, "loading {:?} mappings", format);
    parse(BufReader::new(file), format).map_err(|e| match e {
        MappingLoadError::FileRead { source, .. } => MappingLoadError::FileRead {
            path: shown,
            source,
        },
        other => other,
    })
}

/// Parses mapping text from any buffered reader.
pub fn parse(reader: impl BufRead, format: MappingFormat) -> Result<MappingStore, MappingLoadError> {
    let mut store = MappingStore::new(format.default_direction());
    let mut processor = format.processor();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| MappingLoadError::FileRead {
            path: String::new(),
            source,
        })?;
        processor.process_line(&mut store, index + 1, &line)?;
    }
    processor.finish(&mut store);
    tracing::debug!(
        "loaded {} class, {} field and {} method mappings",
        store.class_count(),
        store.field_count(),
        store.method_count()
    );
    Ok(store)
}

/// Parses mapping text held in memory.
pub fn parse_str(text: &str, format: MappingFormat) -> Result<MappingStore, MappingLoadError> {
    parse(text.as_bytes(), format)
}

/// Renders `store` in `format`. Names are written as stored; the direction
/// is not part of either format.
pub fn write(store: &MappingStore, format: MappingFormat) -> String {
    match format {
        MappingFormat::ProGuard => proguard::write(store),
        MappingFormat::Srg => srg::write(store),
    }
}

impl MappingStore {
    /// See [`load`].
    pub fn load(path: impl AsRef<Path>, format: MappingFormat) -> Result<Self, MappingLoadError> {
        load(path, format)
    }

    /// See [`write`].
    pub fn write(&self, format: MappingFormat) -> String {
        write(self, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_reported() {
        let err = load("/nonexistent/mappings.txt", MappingFormat::Srg).unwrap_err();
        assert!(matches!(err, MappingLoadError::NotFound(_)));
    }

    #[test]
    fn errors_carry_the_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.srg");
        match load(&missing, MappingFormat::Srg) {
            Err(MappingLoadError::NotFound(path)) => assert_eq!(path, missing.display().to_string()),
            other => panic!("unexpected result: {other:?}"),
        }

        // a directory exists but cannot be read line by line
        assert!(matches!(
            load(dir.path(), MappingFormat::Srg),
            Err(MappingLoadError::FileRead { path, .. }) if path == dir.path().display().to_string()
        ));
    }

    #[test]
    fn loads_from_disk_with_format_direction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CL: a p/Main").unwrap();
        let store = load(file.path(), MappingFormat::Srg).unwrap();
        assert_eq!(store.direction(), Direction::Applying);
        assert_eq!(store.class("a").unwrap().mapping, "p/Main");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "p.Main -> a:").unwrap();
        let store = load(file.path(), MappingFormat::ProGuard).unwrap();
        assert_eq!(store.direction(), Direction::Reversing);
        assert_eq!(store.flatten()["a"], "p/Main");
    }

    #[test]
    fn written_store_parses_back() {
        let text = "p.A -> a:\n    int count -> b\n    void run(int,java.lang.String[]) -> c\n";
        let store = parse_str(text, MappingFormat::ProGuard).unwrap();
        for format in [MappingFormat::ProGuard, MappingFormat::Srg] {
            let mut back = parse_str(&store.write(format), format).unwrap();
            back.set_direction(store.direction());
            assert_eq!(back.flatten(), store.flatten(), "{format:?}");
        }
    }
}
