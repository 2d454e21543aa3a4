use thiserror::Error;

/// Error raised when a class file cannot be decoded.
///
/// The archive pipeline treats this as non-fatal: the offending entry is
/// logged as a warning and skipped.
#[derive(Debug, Error)]
pub enum ClassFormatError {
    /// The first four bytes are not `0xCAFEBABE`.
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    /// The input ended before a structure was complete.
    #[error("unexpected end of class data at offset {offset}")]
    UnexpectedEof {
        /// Byte offset at which more data was expected.
        offset: usize,
    },
    /// A constant-pool index is zero, out of range or points at the wrong kind.
    #[error("invalid constant pool index {index}: expected {expected}")]
    InvalidConstant {
        /// The offending index.
        index: u16,
        /// What the reader was looking for.
        expected: &'static str,
    },
    /// The constant pool contains a tag this reader does not know.
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag {
        /// Raw tag byte.
        tag: u8,
        /// Pool index of the entry.
        index: u16,
    },
    /// A code attribute contains an opcode outside the instruction set.
    #[error("unknown opcode 0x{opcode:02x} at code offset {offset}")]
    UnknownOpcode {
        /// Raw opcode byte.
        opcode: u8,
        /// Offset inside the code array.
        offset: usize,
    },
    /// A structurally invalid attribute or instruction operand.
    #[error("malformed {what}: {msg}")]
    Malformed {
        /// Which structure was being decoded.
        what: &'static str,
        /// Details.
        msg: String,
    },
}

/// Error raised while serialising a class node.
#[derive(Debug, Error)]
pub enum ClassWriteError {
    /// More than 65535 constant pool slots would be required.
    #[error("constant pool overflow")]
    ConstantPoolOverflow,
    /// A conditional branch target is farther than a signed 16-bit offset.
    #[error("branch offset {offset} out of range in {method}")]
    BranchOutOfRange {
        /// Method being written.
        method: String,
        /// Offending offset.
        offset: i64,
    },
    /// The code array exceeds the 65535 byte limit.
    #[error("code of {method} is too large ({size} bytes)")]
    CodeTooLarge {
        /// Method being written.
        method: String,
        /// Final size of the code array.
        size: usize,
    },
    /// An instruction references a label that is not placed in the list.
    #[error("label {label} is not placed in {method}")]
    UnknownLabel {
        /// Method being written.
        method: String,
        /// The missing label id.
        label: u32,
    },
    /// Stack map frames could not be computed for a method.
    #[error("frame computation failed in {method}: {msg}")]
    FrameComputation {
        /// Method being analysed.
        method: String,
        /// Details.
        msg: String,
    },
}

/// Error raised while reading or writing archive bytes.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("could not open archive '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest at line {line}: {msg}")]
    Manifest { line: usize, msg: String },
}

/// Error raised while loading a mapping file.
#[derive(Debug, Error)]
pub enum MappingLoadError {
    #[error("mapping file '{0}' not found")]
    NotFound(String),

    #[error("could not read mapping file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mapping parse error at line {line}: {msg} ⇒ `{raw}`")]
    Parse {
        line: usize,
        msg: String,
        raw: String,
    },
}

/// Error raised when a structural precondition of the generator fails.
#[derive(Debug, Error)]
pub enum MappingGenerateError {
    /// The arena was mutated since its last resolution.
    #[error("class arena must be resolved before generating mappings")]
    NotResolved,
    /// Generation only populates an empty store.
    #[error("mapping store already holds {0} class mappings")]
    StoreNotEmpty(usize),
}

/// Error returned by a user visitor. Isolated to the class it occurred in.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform of {class} failed: {msg}")]
    Visitor { class: String, msg: String },
    #[error("instruction {insn} of {class}.{method} not found")]
    MissingInstruction {
        class: String,
        method: String,
        insn: u32,
    },
    #[error("generic error: {0}")]
    Generic(String),
}

/// Top-level error for the archive pipeline.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("mapping load error: {0}")]
    MappingLoad(#[from] MappingLoadError),

    #[error("mapping generation error: {0}")]
    MappingGenerate(#[from] MappingGenerateError),

    #[error("could not write class {class}: {source}")]
    ClassWrite {
        class: String,
        #[source]
        source: ClassWriteError,
    },

    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error("cancelled before {phase}")]
    Cancelled { phase: &'static str },
}
