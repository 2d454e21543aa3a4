//! Archive build pipeline.
//!
//! A [`Jar`] is opened from an entry source, which parses every class into a
//! [`ClassArena`] and resolves it. Renaming goes through a [`MappingStore`],
//! either generated or loaded from a file, and [`Jar::remap`]. Callers can run
//! their own [`Transformer`]s in between. Saving writes the manifest first,
//! then classes, then resources.

use crate::dispatcher::{dispatch, DispatchReport};
use crate::hierarchy::ArenaHierarchy;
use crate::remapper::remap_arena;
use crate::Transformer;
use indexmap::IndexMap;
use jarsmith_core::archive::{
    is_metadata, EntrySink, EntrySource, JarReader, JarWriter, Manifest, MANIFEST_PATH,
};
use jarsmith_core::classfile::{FrameMode, WriterOptions};
use jarsmith_core::graph::{ClassArena, ClassEntry, ClassId, DEFAULT_MAJOR_VERSION};
use jarsmith_mapping::processor::MappingFormat;
use jarsmith_mapping::{GeneratorConfig, MappingGenerator, MappingStore};
use jarsmith_utils::cancel::CancellationToken;
use jarsmith_utils::errors::ProcessError;
use jarsmith_utils::log::{LogSink, SilentSink, TracingSink};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Options for [`Jar::open`] and [`Jar::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Entry class overriding the manifest's `Main-Class`. Dots and slashes
    /// are both accepted.
    pub main_class: Option<String>,
}

/// Options for [`Jar::save`] and [`Jar::save_to`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Internal-name prefixes of the classes to write; empty writes all.
    pub filters: Vec<String>,
    /// How stack map frames are produced. A class whose frames cannot be
    /// computed is written with its existing frames instead.
    pub frames: FrameMode,
    /// Archive comment, replacing the one read at load time.
    pub comment: Option<String>,
}

impl SaveOptions {
    /// Whether the class `name` passes the filters.
    pub fn accepts(&self, name: &str) -> bool {
        self.filters.is_empty()
            || self
                .filters
                .iter()
                .any(|prefix| name.starts_with(&prefix.replace('.', "/")))
    }
}

/// What a save wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub classes_written: usize,
    pub classes_filtered: usize,
    pub resources_written: usize,
    /// Classes written with preserved frames after frame computation failed.
    pub frame_fallbacks: Vec<String>,
}

/// Log sink and cancellation token shared by every phase.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub log: Arc<dyn LogSink>,
    pub cancel: CancellationToken,
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl ProcessContext {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            log,
            cancel: CancellationToken::new(),
        }
    }

    /// A context that drops every message.
    pub fn silent() -> Self {
        Self::new(Arc::new(SilentSink))
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One archive: its classes, resources and manifest.
#[derive(Debug)]
pub struct Jar {
    arena: ClassArena,
    resources: IndexMap<String, Vec<u8>>,
    manifest: Option<Manifest>,
    comment: Option<String>,
    context: ProcessContext,
}

impl Jar {
    /// An archive with no entries and a default manifest.
    pub fn empty(context: ProcessContext) -> Self {
        Self {
            arena: ClassArena::new(),
            resources: IndexMap::new(),
            manifest: Some(Manifest::new()),
            comment: None,
            context,
        }
    }

    /// Opens and resolves the jar at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        options: &LoadOptions,
        context: ProcessContext,
    ) -> Result<Self, ProcessError> {
        let mut reader = JarReader::open(path)?;
        Self::load(&mut reader, options, context)
    }

    /// Reads every entry of `source`, then resolves the classes.
    ///
    /// Class files that fail to parse are reported as warnings and left out.
    /// Signature files are dropped.
    pub fn load(
        source: &mut dyn EntrySource,
        options: &LoadOptions,
        context: ProcessContext,
    ) -> Result<Self, ProcessError> {
        context.cancel.checkpoint("load")?;
        let entries = source.read_entries()?;
        let comment = source.comment();

        let mut arena = ClassArena::new();
        let mut resources = IndexMap::new();
        let mut manifest = None;
        let mut skipped = 0usize;
        for entry in entries {
            if entry.path.eq_ignore_ascii_case(MANIFEST_PATH) {
                manifest = Some(Manifest::parse(&entry.data)?);
            } else if is_metadata(&entry.path) {
                tracing::debug!("dropping signature file {}", entry.path);
            } else if entry.is_class() {
                match ClassEntry::load(&entry.data) {
                    Ok(class) => {
                        arena.insert(class);
                    }
                    Err(err) => {
                        skipped += 1;
                        context
                            .log
                            .warn(&format!("skipping invalid class {}: {err}", entry.path));
                    }
                }
            } else {
                resources.insert(entry.path, entry.data);
            }
        }

        let main = options
            .main_class
            .as_deref()
            .map(|name| name.trim().replace('.', "/"))
            .or_else(|| manifest.as_ref().and_then(Manifest::main_class));
        if let Some(main) = main {
            match arena.get_mut(&main) {
                Some(class) => class.set_main(true),
                None => context
                    .log
                    .warn(&format!("main class {main} is not in the archive")),
            }
        }

        context.log.info(&format!(
            "loaded {} classes and {} resources ({skipped} classes skipped)",
            arena.len(),
            resources.len()
        ));

        let mut jar = Self {
            arena,
            resources,
            manifest,
            comment,
            context,
        };
        jar.context.cancel.checkpoint("resolve")?;
        let repaired = jar.arena.repair_broken_inner();
        if repaired > 0 {
            tracing::debug!("repaired {repaired} inner classes without an outer class");
        }
        jar.arena.resolve();
        Ok(jar)
    }

    pub fn arena(&self) -> &ClassArena {
        &self.arena
    }

    /// Mutable access to the classes. Structural changes leave the arena
    /// unresolved until [`resolve`](Self::resolve) runs.
    pub fn arena_mut(&mut self) -> &mut ClassArena {
        &mut self.arena
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn manifest_mut(&mut self) -> Option<&mut Manifest> {
        self.manifest.as_mut()
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    /// Internal name of the entry class.
    pub fn main_class(&self) -> Option<&str> {
        self.arena
            .iter()
            .find(|(_, class)| class.is_main())
            .map(|(_, class)| class.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arena.contains(name)
    }

    pub fn resource(&self, path: &str) -> Option<&[u8]> {
        self.resources.get(path).map(Vec::as_slice)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.resources
            .iter()
            .map(|(path, data)| (path.as_str(), data.as_slice()))
    }

    pub fn put_resource(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.resources.insert(path.into(), data);
    }

    pub fn remove_resource(&mut self, path: &str) -> Option<Vec<u8>> {
        self.resources.shift_remove(path)
    }

    /// Adds an empty class whose source file is `<simple name>.java`.
    pub fn create_class(
        &mut self,
        access: u16,
        name: &str,
        super_name: Option<&str>,
        interfaces: &[&str],
    ) -> ClassId {
        let class = ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            access,
            name,
            super_name.map(str::to_string),
            interfaces.iter().map(|i| i.to_string()).collect(),
        );
        self.arena.insert(class)
    }

    /// Links the arena again after mutation.
    pub fn resolve(&mut self) -> Result<(), ProcessError> {
        self.context.cancel.checkpoint("resolve")?;
        self.arena.resolve();
        Ok(())
    }

    /// Generates names for every renameable symbol.
    pub fn generate_mapping(
        &mut self,
        config: &GeneratorConfig,
    ) -> Result<MappingStore, ProcessError> {
        self.context.cancel.checkpoint("generate")?;
        if !self.arena.is_resolved() {
            self.arena.resolve();
        }
        let mut generator = MappingGenerator::new(config.clone());
        let store = generator.generate(&self.arena)?;
        if config.rename_locals {
            let renamed = generator.rename_locals(&mut self.arena);
            tracing::debug!("renamed {renamed} local variables");
        }
        self.context.log.info(&format!(
            "generated {} class, {} field and {} method mappings",
            store.class_count(),
            store.field_count(),
            store.method_count()
        ));
        Ok(store)
    }

    /// Reads a mapping file in `format`.
    pub fn load_mapping(
        &self,
        path: impl AsRef<Path>,
        format: MappingFormat,
    ) -> Result<MappingStore, ProcessError> {
        self.context.cancel.checkpoint("load mapping")?;
        Ok(MappingStore::load(path, format)?)
    }

    /// Renames every symbol through `store` and resolves the arena under the
    /// new names. A renamed entry class is written back to the manifest.
    pub fn remap(&mut self, store: &MappingStore) -> Result<usize, ProcessError> {
        self.context.cancel.checkpoint("remap")?;
        let renamed = remap_arena(&mut self.arena, store);

        let main = self.main_class().map(str::to_string);
        if let (Some(manifest), Some(main)) = (self.manifest.as_mut(), main) {
            if manifest.main_class().as_deref() != Some(main.as_str()) {
                manifest.set_main_class(&main);
                self.context.log.info(&format!("Main-Class is now {main}"));
            }
        }
        self.context
            .log
            .info(&format!("remapped {} classes, {renamed} renamed", self.arena.len()));
        Ok(renamed)
    }

    /// Runs a caller-supplied transformer, then resolves the arena again.
    pub fn transform(
        &mut self,
        transformer: &mut dyn Transformer,
    ) -> Result<DispatchReport, ProcessError> {
        self.context.cancel.checkpoint("transform")?;
        let report = dispatch(&mut self.arena, transformer, self.context.log.as_ref());
        self.arena.resolve();
        Ok(report)
    }

    /// Serialises one class.
    pub fn class_bytes(&self, name: &str, frames: FrameMode) -> Result<Vec<u8>, ProcessError> {
        let class = self
            .arena
            .get(name)
            .ok_or_else(|| ProcessError::UnknownClass(name.to_string()))?;
        self.write_class(class, frames).map(|(bytes, _)| bytes)
    }

    /// Writes `class`, falling back to preserved frames when computing them
    /// fails. The flag reports the fallback.
    fn write_class(
        &self,
        class: &ClassEntry,
        frames: FrameMode,
    ) -> Result<(Vec<u8>, bool), ProcessError> {
        let hierarchy = ArenaHierarchy::new(&self.arena);
        match class.write(&WriterOptions::with_frames(frames), &hierarchy) {
            Ok(bytes) => Ok((bytes, false)),
            Err(err) if frames == FrameMode::Compute => {
                self.context.log.warn(&format!(
                    "could not compute frames for {}, keeping existing frames: {err}",
                    class.name()
                ));
                class
                    .write(&WriterOptions::with_frames(FrameMode::Preserve), &hierarchy)
                    .map(|bytes| (bytes, true))
                    .map_err(|source| ProcessError::ClassWrite {
                        class: class.name().to_string(),
                        source,
                    })
            }
            Err(source) => Err(ProcessError::ClassWrite {
                class: class.name().to_string(),
                source,
            }),
        }
    }

    /// Writes the archive to a new jar file at `path`.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        options: &SaveOptions,
    ) -> Result<SaveReport, ProcessError> {
        let mut writer = JarWriter::create(path)?;
        self.save_to(&mut writer, options)
    }

    /// Writes the manifest, the accepted classes and every resource to `sink`.
    pub fn save_to(
        &self,
        sink: &mut dyn EntrySink,
        options: &SaveOptions,
    ) -> Result<SaveReport, ProcessError> {
        self.context.cancel.checkpoint("serialize")?;
        let mut report = SaveReport::default();

        if let Some(comment) = options.comment.as_deref().or(self.comment.as_deref()) {
            sink.set_comment(comment);
        }
        if let Some(manifest) = &self.manifest {
            sink.put(MANIFEST_PATH, &manifest.to_bytes())?;
        }
        for (_, class) in self.arena.iter() {
            if !options.accepts(class.name()) {
                report.classes_filtered += 1;
                continue;
            }
            let (bytes, fell_back) = self.write_class(class, options.frames)?;
            if fell_back {
                report.frame_fallbacks.push(class.name().to_string());
            }
            sink.put(&format!("{}.class", class.name()), &bytes)?;
            report.classes_written += 1;
        }
        for (path, data) in &self.resources {
            sink.put(path, data)?;
            report.resources_written += 1;
        }
        sink.finish()?;

        self.context.log.info(&format!(
            "wrote {} classes and {} resources",
            report.classes_written, report.resources_written
        ));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarsmith_core::access::{ACC_PUBLIC, ACC_STATIC};
    use jarsmith_core::archive::MemoryArchive;
    use jarsmith_core::classfile::{Insn, ObjectFallback};
    use jarsmith_core::graph::MethodEntry;
    use jarsmith_core::opcode::RETURN;
    use jarsmith_mapping::processor::parse_str;
    use jarsmith_utils::log::{Level, MemorySink};

    fn class_bytes(name: &str) -> Vec<u8> {
        let mut class = ClassEntry::create(
            DEFAULT_MAJOR_VERSION,
            ACC_PUBLIC,
            name,
            Some("java/lang/Object".into()),
            vec![],
        );
        let index = class.add_method(MethodEntry::new(ACC_PUBLIC | ACC_STATIC, "run", "()V"));
        class.methods_mut()[index]
            .instructions_mut()
            .add(Insn::Simple(RETURN));
        class
            .write(&WriterOptions::default(), &ObjectFallback)
            .unwrap()
    }

    fn archive() -> MemoryArchive {
        MemoryArchive::new()
            .with_entry(
                MANIFEST_PATH,
                b"Manifest-Version: 1.0\r\nMain-Class: p.Main\r\n\r\n".to_vec(),
            )
            .with_entry("p/Main.class", class_bytes("p/Main"))
            .with_entry("p/Util.class", class_bytes("p/Util"))
            .with_entry("p/Broken.class", vec![0xde, 0xad])
            .with_entry("META-INF/SIGNER.SF", b"digest".to_vec())
            .with_entry("config/app.properties", b"k=v".to_vec())
    }

    #[test]
    fn load_sorts_entries_and_skips_invalid_classes() {
        let sink = Arc::new(MemorySink::new());
        let jar = Jar::load(
            &mut archive(),
            &LoadOptions::default(),
            ProcessContext::new(sink.clone()),
        )
        .unwrap();

        assert_eq!(jar.arena().len(), 2);
        assert!(jar.arena().is_resolved());
        assert_eq!(jar.main_class(), Some("p/Main"));
        assert_eq!(jar.resource("config/app.properties"), Some(&b"k=v"[..]));
        assert!(jar.resource("META-INF/SIGNER.SF").is_none());
        let warnings = sink.messages(Level::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("p/Broken.class"));
    }

    #[test]
    fn load_option_overrides_manifest_main_class() {
        let options = LoadOptions {
            main_class: Some("p.Util".into()),
        };
        let jar = Jar::load(&mut archive(), &options, ProcessContext::silent()).unwrap();
        assert_eq!(jar.main_class(), Some("p/Util"));
    }

    #[test]
    fn remap_rewrites_manifest_main_class() {
        let mut jar =
            Jar::load(&mut archive(), &LoadOptions::default(), ProcessContext::silent()).unwrap();
        let store = parse_str("CL: p/Main q/Start\n", MappingFormat::Srg).unwrap();
        assert_eq!(jar.remap(&store).unwrap(), 1);

        assert_eq!(jar.main_class(), Some("q/Start"));
        assert_eq!(jar.manifest().unwrap().main_class().as_deref(), Some("q/Start"));
        assert_eq!(jar.manifest().unwrap().get("Main-Class"), Some("q.Start"));
    }

    #[test]
    fn save_writes_manifest_then_classes_then_resources() {
        let jar =
            Jar::load(&mut archive(), &LoadOptions::default(), ProcessContext::silent()).unwrap();
        let mut out = MemoryArchive::new();
        let options = SaveOptions {
            filters: vec!["p.Ma".into()],
            comment: Some("built".into()),
            ..SaveOptions::default()
        };
        let report = jar.save_to(&mut out, &options).unwrap();

        assert_eq!(report.classes_written, 1);
        assert_eq!(report.classes_filtered, 1);
        assert_eq!(report.resources_written, 1);
        let paths: Vec<&str> = out.paths().collect();
        assert_eq!(paths, vec![MANIFEST_PATH, "p/Main.class", "config/app.properties"]);
        assert_eq!(out.comment.as_deref(), Some("built"));
    }

    #[test]
    fn cancelled_token_stops_before_the_next_phase() {
        let token = CancellationToken::new();
        let context = ProcessContext::silent().with_cancel(token.clone());
        let mut jar = Jar::load(&mut archive(), &LoadOptions::default(), context).unwrap();
        token.cancel();
        let err = jar.generate_mapping(&GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { phase: "generate" }));

        let err = Jar::load(
            &mut archive(),
            &LoadOptions::default(),
            ProcessContext::silent().with_cancel(token),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { phase: "load" }));
    }

    #[test]
    fn created_classes_are_queryable() {
        let mut jar = Jar::empty(ProcessContext::silent());
        jar.create_class(ACC_PUBLIC, "p/Made", Some("java/lang/Object"), &[]);
        jar.resolve().unwrap();
        assert!(jar.contains("p/Made"));
        let bytes = jar.class_bytes("p/Made", FrameMode::Compute).unwrap();
        let back = ClassEntry::load(&bytes).unwrap();
        assert_eq!(back.node().source_file.as_deref(), Some("Made.java"));
        assert!(matches!(
            jar.class_bytes("p/Missing", FrameMode::Preserve),
            Err(ProcessError::UnknownClass(_))
        ));
    }
}
