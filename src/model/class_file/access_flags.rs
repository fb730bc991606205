//! Access and property flags for classes, fields and methods. Each kind of member gets its own
//! module so that flags sharing a bit (`ACC_SUPER` and `ACC_SYNCHRONIZED`, say) cannot be mixed up.

/// Returns true if every bit of `flag` is set in `flags`.
pub fn is_set(flags: super::u2, flag: super::u2) -> bool {
    flags & flag == flag
}

pub mod class_access_flags {
    #[allow(non_camel_case_types)]
    pub type t = super::super::u2;

    /// Declared `public`; may be accessed from outside its package.
    pub const ACC_PUBLIC: t = 0x0001;
    /// Declared `final`; no subclasses allowed.
    pub const ACC_FINAL: t = 0x0010;
    /// Treat superclass methods specially when invoked by the `invokespecial` instruction.
    pub const ACC_SUPER: t = 0x0020;
    /// Is an interface, not a class.
    pub const ACC_INTERFACE: t = 0x0200;
    /// Declared `abstract`; must not be instantiated.
    pub const ACC_ABSTRACT: t = 0x0400;
    /// Declared synthetic; not present in the source code.
    pub const ACC_SYNTHETIC: t = 0x1000;
    /// Declared as an annotation type.
    pub const ACC_ANNOTATION: t = 0x2000;
    /// Declared as an `enum` type.
    pub const ACC_ENUM: t = 0x4000;
    /// Is a module, not a class or interface.
    pub const ACC_MODULE: t = 0x8000;
}

pub mod field_access_flags {
    #[allow(non_camel_case_types)]
    pub type t = super::super::u2;

    pub const ACC_PUBLIC: t = 0x0001;
    pub const ACC_PRIVATE: t = 0x0002;
    pub const ACC_PROTECTED: t = 0x0004;
    pub const ACC_STATIC: t = 0x0008;
    pub const ACC_FINAL: t = 0x0010;
    pub const ACC_VOLATILE: t = 0x0040;
    pub const ACC_TRANSIENT: t = 0x0080;
    pub const ACC_SYNTHETIC: t = 0x1000;
    pub const ACC_ENUM: t = 0x4000;
}

pub mod method_access_flags {
    #[allow(non_camel_case_types)]
    pub type t = super::super::u2;

    pub const ACC_PUBLIC: t = 0x0001;
    pub const ACC_PRIVATE: t = 0x0002;
    pub const ACC_PROTECTED: t = 0x0004;
    pub const ACC_STATIC: t = 0x0008;
    pub const ACC_FINAL: t = 0x0010;
    pub const ACC_SYNCHRONIZED: t = 0x0020;
    /// A bridge method, generated by the compiler.
    pub const ACC_BRIDGE: t = 0x0040;
    pub const ACC_VARARGS: t = 0x0080;
    pub const ACC_NATIVE: t = 0x0100;
    pub const ACC_ABSTRACT: t = 0x0400;
    pub const ACC_STRICT: t = 0x0800;
    pub const ACC_SYNTHETIC: t = 0x1000;
}
