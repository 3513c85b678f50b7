//! Tagged value representation
//!
//! Every stack slot and heap field that holds a JS value is a 64-bit word.
//! The tag lives in the top 16 bits and the bottom 3 bits:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────┬─────┐
//! │ 63 ........... 48│ 47 ............................ 3│ 2 0 │
//! ├──────────────────┼──────────────────────────────────┼─────┤
//! │ 0x0000           │ heap address (8-byte aligned)    │ 000 │  object
//! │ 0xFFFF           │ 0 ... │ int32 payload            │     │  int
//! │ 0x0000           │ 0 ...                  │ special bits │  special
//! └──────────────────┴──────────────────────────────────┴─────┘
//! ```
//!
//! Specials always have bit 1 or bit 2 set, so they can never be confused
//! with an aligned heap address.

use std::fmt;

/// High tag marking an inline 32-bit integer
pub const TAG_INT: u64 = 0xFFFF_0000_0000_0000;
/// Bit set in every special value except hole
pub const TAG_SPECIAL: u64 = 0x02;
/// Bit set in booleans and hole
pub const TAG_BOOLEAN: u64 = 0x04;
/// Any of these bits set means "not a heap object"
pub const TAG_HEAP_OBJECT_MASK: u64 = TAG_INT | TAG_SPECIAL | TAG_BOOLEAN;

/// Hole: uninitialized binding / "no value yet" marker
pub const VALUE_HOLE: u64 = 0x05;
/// `null`
pub const VALUE_NULL: u64 = TAG_SPECIAL;
/// `false`
pub const VALUE_FALSE: u64 = TAG_BOOLEAN | TAG_SPECIAL;
/// `true`
pub const VALUE_TRUE: u64 = VALUE_FALSE | 0x01;
/// `undefined`
pub const VALUE_UNDEFINED: u64 = TAG_SPECIAL | 0x08;
/// Exception sentinel returned across the ABI boundary
pub const VALUE_EXCEPTION: u64 = TAG_SPECIAL | 0x10;

/// A tagged 64-bit JS value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TaggedValue(u64);

impl TaggedValue {
    /// Rebuild a value from a raw stack or heap word
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw machine word
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self(VALUE_UNDEFINED)
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self(VALUE_NULL)
    }

    /// The hole sentinel
    #[inline]
    pub const fn hole() -> Self {
        Self(VALUE_HOLE)
    }

    /// The exception sentinel
    #[inline]
    pub const fn exception() -> Self {
        Self(VALUE_EXCEPTION)
    }

    /// Boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        if b {
            Self(VALUE_TRUE)
        } else {
            Self(VALUE_FALSE)
        }
    }

    /// Inline 32-bit integer
    #[inline]
    pub const fn int(i: i32) -> Self {
        Self(TAG_INT | (i as u32 as u64))
    }

    /// Pointer to a heap object. `addr` must be 8-byte aligned, nonzero and
    /// fit in 48 bits.
    #[inline]
    pub fn from_address(addr: usize) -> Self {
        debug_assert!(addr != 0 && addr & 0x7 == 0 && (addr as u64) >> 48 == 0);
        Self(addr as u64)
    }

    /// Heap address, if this is a heap object
    #[inline]
    pub fn address(self) -> Option<usize> {
        if self.is_heap_object() {
            Some(self.0 as usize)
        } else {
            None
        }
    }

    /// Integer payload, if this is an inline int
    #[inline]
    pub fn as_int(self) -> Option<i32> {
        if self.is_int() {
            Some(self.0 as u32 as i32)
        } else {
            None
        }
    }

    /// Is this an inline int?
    #[inline]
    pub const fn is_int(self) -> bool {
        self.0 & TAG_INT == TAG_INT
    }

    /// Is this a heap pointer?
    #[inline]
    pub const fn is_heap_object(self) -> bool {
        self.0 & TAG_HEAP_OBJECT_MASK == 0 && self.0 != 0
    }

    /// Is this `undefined`?
    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == VALUE_UNDEFINED
    }

    /// Is this the hole?
    #[inline]
    pub const fn is_hole(self) -> bool {
        self.0 == VALUE_HOLE
    }

    /// Is this the exception sentinel?
    #[inline]
    pub const fn is_exception(self) -> bool {
        self.0 == VALUE_EXCEPTION
    }

    /// Is this `null`?
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == VALUE_NULL
    }
}

impl Default for TaggedValue {
    fn default() -> Self {
        Self::undefined()
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            VALUE_HOLE => write!(f, "Hole"),
            VALUE_NULL => write!(f, "Null"),
            VALUE_FALSE => write!(f, "False"),
            VALUE_TRUE => write!(f, "True"),
            VALUE_UNDEFINED => write!(f, "Undefined"),
            VALUE_EXCEPTION => write!(f, "Exception"),
            _ if self.is_int() => write!(f, "Int({})", self.0 as u32 as i32),
            _ if self.is_heap_object() => write!(f, "Object({:#x})", self.0),
            raw => write!(f, "Raw({:#x})", raw),
        }
    }
}

impl From<i32> for TaggedValue {
    fn from(i: i32) -> Self {
        Self::int(i)
    }
}

impl From<bool> for TaggedValue {
    fn from(b: bool) -> Self {
        Self::boolean(b)
    }
}
