//! Assembly-interpreter calling-convention bridge
//!
//! The routines that carry a JS call between execution tiers: native code
//! entering the interpreter, the interpreter calling itself, builtins,
//! optimized and baseline code, generator resumption, deoptimization
//! re-entry and the write-barrier fast path.
//!
//! Execution happens on a simulated machine stack with real addresses, so
//! every frame these routines build has the byte layout the GC's stack
//! walker reads:
//!
//! ```text
//! InterpretedEntry ─► Interpreted ─► Builtin ─► InterpretedEntry ─► ...
//!        ▲                 │            │
//!        └──── prev ───────┘◄── prev ───┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use asm_bridge::{BridgeOptions, TaggedValue, VmThread};
//!
//! let mut thread = VmThread::new(&BridgeOptions::default())?;
//! let bridge = thread.bridge();
//! let result = bridge.asm_interpreter_entry(
//!     &mut thread,
//!     function,
//!     TaggedValue::undefined(),
//!     TaggedValue::undefined(),
//!     &[TaggedValue::int(1)],
//! );
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

// ============================================================================
// Values and heap
// ============================================================================

/// Tagged value encoding
pub mod value;

/// Heap objects and regions
pub mod heap;

// ============================================================================
// Execution context
// ============================================================================

/// Compile-time defaults
pub mod defaults;

/// Error types
pub mod error;

/// Machine stack model
pub mod stack;

/// Frame layouts and the frame walker
pub mod frames;

/// Per-thread glue block and entry tables
pub mod glue;

/// Register state passed to handlers, builtins and compiled code
pub mod context;

/// Architecture backends
pub mod arch;

/// Configuration
pub mod config;

/// Execution context
pub mod thread;

// ============================================================================
// Bridge
// ============================================================================

/// Call-path routines
pub mod bridge;

// ============================================================================
// Re-exports
// ============================================================================

pub use arch::{ArchBackend, CpuState, Reg, TargetArch};
pub use bridge::{
    AsmBridge, Argv, BarrierAction, CalleeClass, DeoptFrame, DeoptStackContext,
    FrameTransitionType, JSCallMode, JsCall,
};
pub use config::BridgeOptions;
pub use context::{
    BarrierCall, BaselineContext, InterpreterContext, OptimizedCallInfo, RuntimeCallInfo,
};
pub use error::{
    CallResult, ConfigError, FrameError, FrameLayoutError, MessageId, NotCallableKind, Throw,
};
pub use frames::{FrameInfo, FrameIterator, FrameType, InterpretedFrame, StackSnapshot};
pub use glue::{
    BarrierKind, BaselineCodeId, BytecodeStubId, Glue, NativeFnId, OptimizedCodeId,
    RuntimeStubId,
};
pub use heap::{Heap, HClass, JsFunction, JsType};
pub use stack::MachineStack;
pub use thread::VmThread;
pub use value::TaggedValue;
