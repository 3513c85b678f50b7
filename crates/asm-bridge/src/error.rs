//! Error types
//!
//! Recoverable failures (`Throw`) travel as `Result` inside the bridge and
//! are collapsed to the exception sentinel only at the ABI entry points.
//! Layout and frame-chain errors are not recoverable.

use crate::frames::FrameType;
use crate::heap::region::RegionFlagScheme;

/// Fixed message table for the runtime's TypeError entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageId {
    /// Generic call on a non-callable value
    NonCallable = 0,
    /// Class constructor invoked as a plain call
    ClassConstructorWithoutNew = 1,
    /// Derived constructor returned a non-object that is not undefined
    DerivedMustReturnObjectOrUndefined = 2,
    /// Maximum call stack size exceeded
    StackOverflow = 3,
}

impl MessageId {
    /// Message text
    pub fn message(self) -> &'static str {
        match self {
            MessageId::NonCallable => "is not callable",
            MessageId::ClassConstructorWithoutNew => {
                "class constructor cannot be called without 'new'"
            }
            MessageId::DerivedMustReturnObjectOrUndefined => {
                "Derived constructor must return object or undefined"
            }
            MessageId::StackOverflow => "Stack overflow!",
        }
    }
}

/// Which classification branch rejected a callee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotCallableKind {
    /// Value outside the function range without the callable bit
    Generic,
    /// Value in the function range without the callable bit
    ClassConstructor,
}

impl NotCallableKind {
    /// Message shown to the user
    pub fn message_id(self) -> MessageId {
        match self {
            NotCallableKind::Generic => MessageId::NonCallable,
            NotCallableKind::ClassConstructor => MessageId::ClassConstructorWithoutNew,
        }
    }
}

/// A JS-level exception raised or observed by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Throw {
    /// A checked push would have crossed the stack limit
    #[error("Maximum call stack size exceeded")]
    StackOverflow,

    /// Dispatch rejected the callee
    #[error("TypeError: {}", .0.message_id().message())]
    NotCallable(NotCallableKind),

    /// TypeError raised through the runtime's message table
    #[error("TypeError: {}", .0.message())]
    TypeError(MessageId),

    /// A callee already returned the exception sentinel
    #[error("Pending exception")]
    Pending,
}

/// Result type used inside the bridge
pub type CallResult<T> = Result<T, Throw>;

/// Corrupt frame chain observed by the walker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Type slot does not hold a known frame tag
    #[error("Unknown frame type tag {tag:#x} at frame {handle:#x}")]
    UnknownTag {
        /// Frame handle
        handle: usize,
        /// Raw slot contents
        tag: u64,
    },

    /// Previous-frame link points outside the stack or does not grow upward
    #[error("Broken frame link from {handle:#x} to {prev:#x}")]
    BrokenLink {
        /// Frame handle
        handle: usize,
        /// Link read from the frame
        prev: usize,
    },

    /// Frame handle is outside the stack
    #[error("Frame handle {0:#x} is outside the machine stack")]
    OutOfBounds(usize),

    /// Expected a different frame type at this handle
    #[error("Expected {expected:?} frame at {handle:#x}, found {found:?}")]
    Unexpected {
        /// Frame handle
        handle: usize,
        /// Expected type
        expected: FrameType,
        /// Found type
        found: FrameType,
    },
}

/// Frame completion mismatch between a push/pop sequence and its constant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{frame} frame has been modified, and the offset {constant} should be updated too \
     (expected {expected} slots, measured {measured})"
)]
pub struct FrameLayoutError {
    /// Frame being checked
    pub frame: &'static str,
    /// Constant that no longer matches
    pub constant: &'static str,
    /// Constant value
    pub expected: usize,
    /// Distance measured by running the sequence
    pub measured: usize,
}

/// Invalid bridge options
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("Invalid options: {0}")]
    Parse(#[from] toml::de::Error),

    /// Region flags break the barrier's range tests
    #[error("Region flag scheme is not ordered: {0:?}")]
    RegionScheme(RegionFlagScheme),

    /// Stack cannot hold the reserved headroom
    #[error("Stack of {stack_slots} slots cannot reserve {reserved_slots} slots")]
    StackTooSmall {
        /// Configured stack size
        stack_slots: usize,
        /// Configured headroom
        reserved_slots: usize,
    },

    /// Headroom cannot hold the frames pushed after a passing check
    #[error("Reserved headroom of {reserved_slots} slots is below the minimum of {minimum}")]
    HeadroomTooSmall {
        /// Configured headroom
        reserved_slots: usize,
        /// Smallest accepted headroom
        minimum: usize,
    },

    /// Argument batch size must be positive
    #[error("Argument push batch must be at least 1")]
    ZeroBatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_callable_messages_differ() {
        let generic = Throw::NotCallable(NotCallableKind::Generic).to_string();
        let ctor = Throw::NotCallable(NotCallableKind::ClassConstructor).to_string();
        assert_ne!(generic, ctor);
        assert!(ctor.contains("without 'new'"));
    }

    #[test]
    fn test_layout_error_names_constant() {
        let err = FrameLayoutError {
            frame: "AsmInterpreterEntry",
            constant: "CPP_TO_ASM_INTERP_SLOTS",
            expected: 11,
            measured: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("CPP_TO_ASM_INTERP_SLOTS should be updated too"));
    }
}
