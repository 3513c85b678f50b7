//! Method metadata: the packed call field and extra literal info
//!
//! ```text
//! CallField (u64)
//! ┌────┬────┬────┬────┬──────────────┬──────────────┬────────┐
//! │ 0  │ 1  │ 2  │ 3  │ 4 ....... 31 │ 32 ..... 59  │ 60     │
//! │this│ nt │extr│func│ num vregs    │ num args     │ native │
//! └────┴────┴────┴────┴──────────────┴──────────────┴────────┘
//! ```

use crate::glue::{BaselineCodeId, NativeFnId};
use crate::value::TaggedValue;

/// Bit-packed call descriptor read fresh on every call
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CallField(u64);

impl CallField {
    /// Callee wants a `this` slot
    pub const HAVE_THIS_BIT: u64 = 1 << 0;
    /// Callee wants a `new.target` slot
    pub const HAVE_NEW_TARGET_BIT: u64 = 1 << 1;
    /// Callee keeps every actual argument and the actual count
    pub const HAVE_EXTRA_BIT: u64 = 1 << 2;
    /// Callee wants a call-target slot
    pub const HAVE_FUNC_BIT: u64 = 1 << 3;
    /// All "call type" bits
    pub const CALL_TYPE_MASK: u64 = 0xF;

    const NUM_VREGS_SHIFT: u32 = 4;
    const NUM_VREGS_MASK: u64 = (1 << 28) - 1;
    const NUM_ARGS_SHIFT: u32 = 32;
    const NUM_ARGS_MASK: u64 = (1 << 28) - 1;
    const IS_NATIVE_BIT: u64 = 1 << 60;

    /// Call field with the given counts and no flags
    pub fn new(num_args: u32, num_vregs: u32) -> Self {
        Self(
            ((num_args as u64 & Self::NUM_ARGS_MASK) << Self::NUM_ARGS_SHIFT)
                | ((num_vregs as u64 & Self::NUM_VREGS_MASK) << Self::NUM_VREGS_SHIFT),
        )
    }

    /// From raw bits
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw bits
    pub const fn raw(self) -> u64 {
        self.0
    }

    fn with_bit(self, bit: u64, on: bool) -> Self {
        if on {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }

    /// Set the have-this bit
    pub fn with_this(self, on: bool) -> Self {
        self.with_bit(Self::HAVE_THIS_BIT, on)
    }

    /// Set the have-new-target bit
    pub fn with_new_target(self, on: bool) -> Self {
        self.with_bit(Self::HAVE_NEW_TARGET_BIT, on)
    }

    /// Set the have-extra bit
    pub fn with_extra(self, on: bool) -> Self {
        self.with_bit(Self::HAVE_EXTRA_BIT, on)
    }

    /// Set the have-func bit
    pub fn with_func(self, on: bool) -> Self {
        self.with_bit(Self::HAVE_FUNC_BIT, on)
    }

    /// Set the native bit
    pub fn with_native(self, on: bool) -> Self {
        self.with_bit(Self::IS_NATIVE_BIT, on)
    }

    /// Declared (fixed) argument count
    #[inline]
    pub fn declared_num_args(self) -> usize {
        ((self.0 >> Self::NUM_ARGS_SHIFT) & Self::NUM_ARGS_MASK) as usize
    }

    /// Local register count
    #[inline]
    pub fn num_vregs(self) -> usize {
        ((self.0 >> Self::NUM_VREGS_SHIFT) & Self::NUM_VREGS_MASK) as usize
    }

    /// `this` slot requested
    #[inline]
    pub fn have_this(self) -> bool {
        self.0 & Self::HAVE_THIS_BIT != 0
    }

    /// `new.target` slot requested
    #[inline]
    pub fn have_new_target(self) -> bool {
        self.0 & Self::HAVE_NEW_TARGET_BIT != 0
    }

    /// Extra arguments kept
    #[inline]
    pub fn have_extra(self) -> bool {
        self.0 & Self::HAVE_EXTRA_BIT != 0
    }

    /// Call-target slot requested
    #[inline]
    pub fn have_func(self) -> bool {
        self.0 & Self::HAVE_FUNC_BIT != 0
    }

    /// Any of this / new.target / extra / func
    #[inline]
    pub fn has_call_type_bits(self) -> bool {
        self.0 & Self::CALL_TYPE_MASK != 0
    }

    /// Native method
    #[inline]
    pub fn is_native(self) -> bool {
        self.0 & Self::IS_NATIVE_BIT != 0
    }
}

impl std::fmt::Debug for CallField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallField")
            .field("num_args", &self.declared_num_args())
            .field("num_vregs", &self.num_vregs())
            .field("this", &self.have_this())
            .field("new_target", &self.have_new_target())
            .field("extra", &self.have_extra())
            .field("func", &self.have_func())
            .field("native", &self.is_native())
            .finish()
    }
}

/// Function kind, ordered so that every kind up to and including
/// `ClassConstructor` constructs with its own `this`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FunctionKind {
    /// Plain function
    NormalFunction = 0,
    /// Arrow function
    ArrowFunction = 1,
    /// Base constructor
    BaseConstructor = 2,
    /// Base class constructor
    ClassConstructor = 3,
    /// Derived class constructor
    DerivedConstructor = 4,
    /// Generator
    GeneratorFunction = 5,
    /// Async function
    AsyncFunction = 6,
    /// Async generator
    AsyncGeneratorFunction = 7,
}

impl FunctionKind {
    /// Does a `new` call of this kind return the allocated `this` when the
    /// body returns a primitive?
    #[inline]
    pub fn is_base_constructor_kind(self) -> bool {
        self <= FunctionKind::ClassConstructor
    }

    fn from_bits(bits: u64) -> Self {
        match bits {
            1 => FunctionKind::ArrowFunction,
            2 => FunctionKind::BaseConstructor,
            3 => FunctionKind::ClassConstructor,
            4 => FunctionKind::DerivedConstructor,
            5 => FunctionKind::GeneratorFunction,
            6 => FunctionKind::AsyncFunction,
            7 => FunctionKind::AsyncGeneratorFunction,
            _ => FunctionKind::NormalFunction,
        }
    }
}

/// Function kind and builtin stub id
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtraLiteralInfo(u64);

impl ExtraLiteralInfo {
    const FUNCTION_KIND_MASK: u64 = 0xF;
    const BUILTIN_ID_SHIFT: u32 = 4;
    const BUILTIN_ID_MASK: u64 = 0xFF;
    /// Builtin id value meaning "no fast builtin stub"
    pub const NO_BUILTIN: u8 = 0xFF;

    /// Pack a kind and optional builtin stub id
    pub fn new(kind: FunctionKind, builtin_id: Option<u8>) -> Self {
        let id = builtin_id.unwrap_or(Self::NO_BUILTIN) as u64;
        Self((kind as u64) | (id << Self::BUILTIN_ID_SHIFT))
    }

    /// Function kind
    pub fn function_kind(self) -> FunctionKind {
        FunctionKind::from_bits(self.0 & Self::FUNCTION_KIND_MASK)
    }

    /// Builtin stub id, if any
    pub fn builtin_id(self) -> Option<u8> {
        let id = ((self.0 >> Self::BUILTIN_ID_SHIFT) & Self::BUILTIN_ID_MASK) as u8;
        if id == Self::NO_BUILTIN {
            None
        } else {
            Some(id)
        }
    }

    /// Raw bits
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for ExtraLiteralInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtraLiteralInfo")
            .field("kind", &self.function_kind())
            .field("builtin_id", &self.builtin_id())
            .finish()
    }
}

/// Where a method's code lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodCode {
    /// Bytecode array at this address
    Bytecode(usize),
    /// Native function
    Native(NativeFnId),
}

/// Method object: shared code and metadata of functions
#[derive(Debug, Clone)]
pub struct Method {
    /// Packed call descriptor
    pub call_field: CallField,
    /// Kind and builtin id
    pub extra_literal_info: ExtraLiteralInfo,
    /// Bytecode or native entry
    pub code: MethodCode,
    /// Constant pool
    pub constant_pool: TaggedValue,
    /// Literal info; the low 16 bits seed the hotness counter
    pub literal_info: u64,
}

impl Method {
    /// Bytecode base address, for interpreted methods
    pub fn bytecode_base(&self) -> Option<usize> {
        match self.code {
            MethodCode::Bytecode(addr) => Some(addr),
            MethodCode::Native(_) => None,
        }
    }

    /// Native entry, for native methods
    pub fn native_entry(&self) -> Option<NativeFnId> {
        match self.code {
            MethodCode::Native(id) => Some(id),
            MethodCode::Bytecode(_) => None,
        }
    }

    /// Initial hotness counter
    #[inline]
    pub fn hotness_counter(&self) -> u16 {
        (self.literal_info & 0xFFFF) as u16
    }
}

/// Installed baseline code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineCode {
    /// Baseline entry
    pub entry: BaselineCodeId,
}
