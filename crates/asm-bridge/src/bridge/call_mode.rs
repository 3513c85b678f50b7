//! Call modes and frame transition types

use crate::frames::FrameType;
use crate::value::TaggedValue;

use super::JsCall;

/// How a call site supplies its callee, receiver and arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JSCallMode {
    /// `f()`
    CallArg0,
    /// `f(a)`
    CallArg1,
    /// `f(a, b)`
    CallArgs2,
    /// `f(a, b, c)`
    CallArgs3,
    /// `o.f()`
    CallThisArg0,
    /// `o.f(a)`
    CallThisArg1,
    /// `o.f(a, b)`
    CallThisArgs2,
    /// `o.f(a, b, c)`
    CallThisArgs3,
    /// `f(...range)`
    CallWithArgv,
    /// `o.f(...range)`
    CallThisWithArgv,
    /// `new f(...range)`
    CallConstructorWithArgv,
    /// `super(...range)`
    SuperCallWithArgv,
    /// `super(...spread)`
    SuperCallSpreadWithArgv,
    /// Accessor getter invoked from native code
    CallGetter,
    /// Accessor setter invoked from native code
    CallSetter,
    /// Native container callback with two arguments
    CallThisArg2WithReturn,
    /// Native container callback with three arguments
    CallThisArg3WithReturn,
    /// Native callback with an argv, result returned
    CallThisArgvWithReturn,
    /// Native code entering the interpreter
    CallEntry,
    /// Optimized code calling back into the interpreter
    CallFromAot,
}

impl JSCallMode {
    /// Every mode
    pub const ALL: [JSCallMode; 20] = [
        JSCallMode::CallArg0,
        JSCallMode::CallArg1,
        JSCallMode::CallArgs2,
        JSCallMode::CallArgs3,
        JSCallMode::CallThisArg0,
        JSCallMode::CallThisArg1,
        JSCallMode::CallThisArgs2,
        JSCallMode::CallThisArgs3,
        JSCallMode::CallWithArgv,
        JSCallMode::CallThisWithArgv,
        JSCallMode::CallConstructorWithArgv,
        JSCallMode::SuperCallWithArgv,
        JSCallMode::SuperCallSpreadWithArgv,
        JSCallMode::CallGetter,
        JSCallMode::CallSetter,
        JSCallMode::CallThisArg2WithReturn,
        JSCallMode::CallThisArg3WithReturn,
        JSCallMode::CallThisArgvWithReturn,
        JSCallMode::CallEntry,
        JSCallMode::CallFromAot,
    ];

    /// Argument count encoded in the mode, if any
    pub fn fixed_argc(self) -> Option<usize> {
        match self {
            JSCallMode::CallArg0 | JSCallMode::CallThisArg0 | JSCallMode::CallGetter => Some(0),
            JSCallMode::CallArg1 | JSCallMode::CallThisArg1 | JSCallMode::CallSetter => Some(1),
            JSCallMode::CallArgs2
            | JSCallMode::CallThisArgs2
            | JSCallMode::CallThisArg2WithReturn => Some(2),
            JSCallMode::CallArgs3
            | JSCallMode::CallThisArgs3
            | JSCallMode::CallThisArg3WithReturn => Some(3),
            _ => None,
        }
    }

    /// Does the call site supply a receiver?
    pub fn has_this_arg(self) -> bool {
        !matches!(
            self,
            JSCallMode::CallArg0
                | JSCallMode::CallArg1
                | JSCallMode::CallArgs2
                | JSCallMode::CallArgs3
                | JSCallMode::CallWithArgv
        )
    }

    /// Does the call site supply new.target?
    pub fn has_new_target_arg(self) -> bool {
        matches!(
            self,
            JSCallMode::CallConstructorWithArgv
                | JSCallMode::SuperCallWithArgv
                | JSCallMode::SuperCallSpreadWithArgv
                | JSCallMode::CallEntry
                | JSCallMode::CallFromAot
        )
    }

    /// `new` or `super` call
    pub fn is_construct(self) -> bool {
        matches!(
            self,
            JSCallMode::CallConstructorWithArgv
                | JSCallMode::SuperCallWithArgv
                | JSCallMode::SuperCallSpreadWithArgv
        )
    }

    /// Arguments come from an argv range rather than registers
    pub fn has_argv(self) -> bool {
        matches!(
            self,
            JSCallMode::CallWithArgv
                | JSCallMode::CallThisWithArgv
                | JSCallMode::CallConstructorWithArgv
                | JSCallMode::SuperCallWithArgv
                | JSCallMode::SuperCallSpreadWithArgv
                | JSCallMode::CallThisArgvWithReturn
                | JSCallMode::CallEntry
                | JSCallMode::CallFromAot
        )
    }

    /// Call originates in native code
    pub fn is_from_native(self) -> bool {
        matches!(
            self,
            JSCallMode::CallGetter
                | JSCallMode::CallSetter
                | JSCallMode::CallThisArg2WithReturn
                | JSCallMode::CallThisArg3WithReturn
                | JSCallMode::CallThisArgvWithReturn
                | JSCallMode::CallEntry
        )
    }

    /// Frame type used when the callee turns out to be a builtin
    pub fn native_frame_type(self) -> FrameType {
        if self.is_from_native() || self == JSCallMode::CallFromAot {
            FrameType::BuiltinEntry
        } else if self.has_argv() {
            FrameType::BuiltinWithArgv
        } else {
            FrameType::Builtin
        }
    }

    /// Receiver the callee sees
    pub fn resolve_this(self, call: &JsCall<'_>) -> TaggedValue {
        if self.has_this_arg() {
            call.this
        } else {
            TaggedValue::undefined()
        }
    }

    /// new.target the callee sees
    pub fn resolve_new_target(self, call: &JsCall<'_>) -> TaggedValue {
        if self.has_new_target_arg() {
            call.new_target
        } else {
            TaggedValue::undefined()
        }
    }

    /// Mode used to re-dispatch a flattened bound call
    pub fn for_bound_target(self) -> JSCallMode {
        match self {
            JSCallMode::CallConstructorWithArgv
            | JSCallMode::SuperCallWithArgv
            | JSCallMode::SuperCallSpreadWithArgv
            | JSCallMode::CallEntry
            | JSCallMode::CallFromAot => self,
            m if m.is_from_native() => JSCallMode::CallThisArgvWithReturn,
            _ => JSCallMode::CallThisWithArgv,
        }
    }
}

/// Which tiers a call moves between; decides whether installed baseline
/// code is considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameTransitionType {
    /// Non-baseline caller, callee may run baseline code
    OtherToBaselineCheck,
    /// Baseline caller, callee may run baseline code
    BaselineToBaselineCheck,
    /// Non-baseline caller, callee stays interpreted
    OtherToOther,
    /// Baseline caller, callee stays interpreted
    BaselineToOther,
}

impl FrameTransitionType {
    /// Should the callee's baseline code be checked?
    pub fn checks_baseline(self) -> bool {
        matches!(
            self,
            FrameTransitionType::OtherToBaselineCheck
                | FrameTransitionType::BaselineToBaselineCheck
        )
    }

    /// Is the caller running baseline code?
    pub fn from_baseline(self) -> bool {
        matches!(
            self,
            FrameTransitionType::BaselineToBaselineCheck | FrameTransitionType::BaselineToOther
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Argv;

    #[test]
    fn test_fixed_arity_modes() {
        assert_eq!(JSCallMode::CallArg0.fixed_argc(), Some(0));
        assert_eq!(JSCallMode::CallThisArgs3.fixed_argc(), Some(3));
        assert_eq!(JSCallMode::CallSetter.fixed_argc(), Some(1));
        assert_eq!(JSCallMode::CallWithArgv.fixed_argc(), None);
    }

    #[test]
    fn test_fixed_arity_and_argv_are_exclusive() {
        for mode in JSCallMode::ALL {
            assert!(!(mode.fixed_argc().is_some() && mode.has_argv()), "{:?}", mode);
        }
    }

    #[test]
    fn test_receiver_resolution() {
        let call = JsCall {
            call_target: TaggedValue::null(),
            this: TaggedValue::int(1),
            new_target: TaggedValue::int(2),
            args: Argv::Slice(&[]),
        };
        assert!(JSCallMode::CallArg1.resolve_this(&call).is_undefined());
        assert_eq!(JSCallMode::CallThisArg1.resolve_this(&call), TaggedValue::int(1));
        assert!(JSCallMode::CallThisArg1.resolve_new_target(&call).is_undefined());
        assert_eq!(
            JSCallMode::CallConstructorWithArgv.resolve_new_target(&call),
            TaggedValue::int(2)
        );
    }

    #[test]
    fn test_native_frame_types() {
        assert_eq!(JSCallMode::CallArgs2.native_frame_type(), FrameType::Builtin);
        assert_eq!(
            JSCallMode::CallThisWithArgv.native_frame_type(),
            FrameType::BuiltinWithArgv
        );
        assert_eq!(JSCallMode::CallEntry.native_frame_type(), FrameType::BuiltinEntry);
        assert_eq!(JSCallMode::CallGetter.native_frame_type(), FrameType::BuiltinEntry);
    }

    #[test]
    fn test_bound_redispatch_keeps_construct() {
        assert_eq!(
            JSCallMode::CallConstructorWithArgv.for_bound_target(),
            JSCallMode::CallConstructorWithArgv
        );
        assert_eq!(JSCallMode::CallArg1.for_bound_target(), JSCallMode::CallThisWithArgv);
        assert_eq!(
            JSCallMode::CallGetter.for_bound_target(),
            JSCallMode::CallThisArgvWithReturn
        );
    }

    #[test]
    fn test_transition_baseline_checks() {
        assert!(FrameTransitionType::OtherToBaselineCheck.checks_baseline());
        assert!(FrameTransitionType::BaselineToBaselineCheck.checks_baseline());
        assert!(!FrameTransitionType::OtherToOther.checks_baseline());
        assert!(FrameTransitionType::BaselineToOther.from_baseline());
    }
}
