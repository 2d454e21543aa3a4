//! Access flag constants and the [`Access`] predicate trait shared by classes,
//! fields, methods and inner-class records.

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_STRICT: u16 = 0x0800;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MANDATED: u16 = 0x8000;

/// Composed access-bit accessors.
///
/// Implementors only provide [`Access::access`]; every predicate tests one bit.
/// Bits that share a value (`ACC_SYNCHRONIZED`/`ACC_SUPER`,
/// `ACC_VOLATILE`/`ACC_BRIDGE`, `ACC_TRANSIENT`/`ACC_VARARGS`) are exposed
/// under both names; which one applies depends on the record kind.
pub trait Access {
    fn access(&self) -> u16;

    fn has_access(&self, flag: u16) -> bool {
        self.access() & flag != 0
    }
    fn is_public(&self) -> bool {
        self.has_access(ACC_PUBLIC)
    }
    fn is_private(&self) -> bool {
        self.has_access(ACC_PRIVATE)
    }
    fn is_protected(&self) -> bool {
        self.has_access(ACC_PROTECTED)
    }
    fn is_static(&self) -> bool {
        self.has_access(ACC_STATIC)
    }
    fn is_final(&self) -> bool {
        self.has_access(ACC_FINAL)
    }
    fn is_synchronized(&self) -> bool {
        self.has_access(ACC_SYNCHRONIZED)
    }
    fn is_volatile(&self) -> bool {
        self.has_access(ACC_VOLATILE)
    }
    fn is_bridge(&self) -> bool {
        self.has_access(ACC_BRIDGE)
    }
    fn is_transient(&self) -> bool {
        self.has_access(ACC_TRANSIENT)
    }
    fn is_varargs(&self) -> bool {
        self.has_access(ACC_VARARGS)
    }
    fn is_native(&self) -> bool {
        self.has_access(ACC_NATIVE)
    }
    fn is_interface(&self) -> bool {
        self.has_access(ACC_INTERFACE)
    }
    fn is_abstract(&self) -> bool {
        self.has_access(ACC_ABSTRACT)
    }
    fn is_strict(&self) -> bool {
        self.has_access(ACC_STRICT)
    }
    fn is_synthetic(&self) -> bool {
        self.has_access(ACC_SYNTHETIC)
    }
    /// Annotation types are interfaces with the annotation bit set.
    fn is_annotation(&self) -> bool {
        self.is_interface() && self.has_access(ACC_ANNOTATION)
    }
    fn is_enum(&self) -> bool {
        self.has_access(ACC_ENUM)
    }
    fn is_mandated(&self) -> bool {
        self.has_access(ACC_MANDATED)
    }
}

impl Access for u16 {
    fn access(&self) -> u16 {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_needs_interface_bit() {
        assert!(!ACC_ANNOTATION.is_annotation());
        assert!((ACC_ANNOTATION | ACC_INTERFACE | ACC_ABSTRACT).is_annotation());
    }

    #[test]
    fn predicates_test_single_bits() {
        let flags = ACC_PUBLIC | ACC_STATIC | ACC_FINAL;
        assert!(flags.is_public());
        assert!(flags.is_static());
        assert!(flags.is_final());
        assert!(!flags.is_private());
        assert!(!flags.is_synthetic());
        assert!((ACC_SYNTHETIC | ACC_MANDATED).is_mandated());
    }
}
