//! Symbol mappings: the store, file processors and the name generator.

pub mod generator;
pub mod processor;
pub mod store;

pub use generator::{GeneratorConfig, MappingGenerator, NameStrategy, NameStrategyKind};
pub use processor::{MappingFormat, MappingProcessor};
pub use store::{ClassMapping, Direction, FieldMapping, MappingStore, MethodMapping};
