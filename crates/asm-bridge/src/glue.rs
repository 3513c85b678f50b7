//! Glue: the per-thread state block every bridge routine is threaded through
//!
//! Holds the fields machine code reads at fixed offsets (stack limit, leave
//! frame, last fp, GC state bits) and the entry tables the bridge jumps
//! through (bytecode handlers by opcode, runtime stubs by id, builtins,
//! optimized and baseline code, barrier slow paths).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::context::{
    BarrierCall, BaselineContext, InterpreterContext, OptimizedCallInfo, RuntimeCallInfo,
};
use crate::thread::VmThread;
use crate::value::TaggedValue;

/// Concurrent marking is running on the local heap
pub const CONCURRENT_MARKING_BITFIELD_MASK: u64 = 0x1;
/// Concurrent marking is running on the shared heap
pub const SHARED_CONCURRENT_MARKING_BITFIELD_MASK: u64 = 0x1;

/// Number of one-byte opcodes
pub const OPCODE_COUNT: usize = 256;

/// Index of a native function in the builtin table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeFnId(pub u32);

/// Index of optimized code in the optimized entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptimizedCodeId(pub u32);

/// Index of baseline code in the baseline entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaselineCodeId(pub u32);

/// Bytecode stubs that live after the opcode handlers in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BytecodeStubId {
    /// Unwinds to the catch handler of the current frame
    ExceptionHandler = 256,
    /// Derived constructor returned a non-object to an interpreted caller
    NewObjectRangeThrowException = 257,
}

/// Size of the bytecode stub table
pub const BC_STUB_TABLE_SIZE: usize = OPCODE_COUNT + 2;

/// Runtime entry points invoked by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeStubId {
    /// TypeError: value is not callable
    ThrowNotCallableException,
    /// RangeError: maximum call stack size exceeded
    ThrowStackOverflowException,
    /// TypeError: class constructor called without new
    ThrowCallConstructorException,
    /// TypeError with a message id argument
    ThrowTypeError,
    /// Native pc offset in baseline code for an absolute bytecode pc,
    /// passed as a raw word
    GetNativePcOfstForBaseline,
    /// Deoptimization entry
    DeoptHandler,
    /// Any other runtime function, dispatched through `CallRuntime`
    Runtime(u16),
}

impl RuntimeStubId {
    /// Word recorded in a leave frame's callee-id slot
    pub fn code(self) -> u64 {
        match self {
            RuntimeStubId::ThrowNotCallableException => 0,
            RuntimeStubId::ThrowStackOverflowException => 1,
            RuntimeStubId::ThrowCallConstructorException => 2,
            RuntimeStubId::ThrowTypeError => 3,
            RuntimeStubId::GetNativePcOfstForBaseline => 4,
            RuntimeStubId::DeoptHandler => 5,
            RuntimeStubId::Runtime(id) => 0x100 + id as u64,
        }
    }
}

/// Opcode handler or bytecode stub
pub type BytecodeHandler =
    Arc<dyn Fn(&mut VmThread, InterpreterContext) -> TaggedValue + Send + Sync>;
/// Runtime stub
pub type RuntimeStub = Arc<dyn Fn(&mut VmThread, &[TaggedValue]) -> TaggedValue + Send + Sync>;
/// Native builtin
pub type NativeFunction =
    Arc<dyn Fn(&mut VmThread, RuntimeCallInfo) -> TaggedValue + Send + Sync>;
/// Optimized code entry
pub type OptimizedEntry =
    Arc<dyn Fn(&mut VmThread, OptimizedCallInfo) -> TaggedValue + Send + Sync>;
/// Baseline code entry
pub type BaselineEntry =
    Arc<dyn Fn(&mut VmThread, BaselineContext) -> TaggedValue + Send + Sync>;
/// Write barrier slow path
pub type BarrierSlowPath = Arc<dyn Fn(&mut VmThread, BarrierCall) + Send + Sync>;

/// Which barrier slow path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// `SetNonSValueWithBarrier`: local value
    NonShared = 0,
    /// `SetSValueWithBarrier`: shared value
    Shared = 1,
}

/// Per-thread state block
pub struct Glue {
    /// Lowest sp a checked push may reach
    pub stack_limit: usize,
    /// Last managed frame below a run of native frames
    pub leave_frame: usize,
    /// Frame pointer recorded by the exception unwinder
    pub last_fp: usize,
    gc_state_bitfield: Arc<AtomicU64>,
    shared_gc_state_bitfield: Arc<AtomicU64>,
    bc_stub_entries: Vec<Option<BytecodeHandler>>,
    rt_stub_entries: FxHashMap<RuntimeStubId, RuntimeStub>,
    builtin_entries: Vec<NativeFunction>,
    optimized_entries: Vec<OptimizedEntry>,
    baseline_entries: Vec<BaselineEntry>,
    barrier_stubs: [Option<BarrierSlowPath>; 2],
}

impl Glue {
    /// Empty glue with the given stack limit
    pub fn new(stack_limit: usize) -> Self {
        Self {
            stack_limit,
            leave_frame: 0,
            last_fp: 0,
            gc_state_bitfield: Arc::new(AtomicU64::new(0)),
            shared_gc_state_bitfield: Arc::new(AtomicU64::new(0)),
            bc_stub_entries: vec![None; BC_STUB_TABLE_SIZE],
            rt_stub_entries: FxHashMap::default(),
            builtin_entries: Vec::new(),
            optimized_entries: Vec::new(),
            baseline_entries: Vec::new(),
            barrier_stubs: [None, None],
        }
    }

    // ========================================================================
    // GC state
    // ========================================================================

    /// Local GC state word, shared with the collector thread
    pub fn gc_state_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.gc_state_bitfield)
    }

    /// Shared-heap GC state word
    pub fn shared_gc_state_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.shared_gc_state_bitfield)
    }

    /// Attach to a shared heap's GC state word
    pub fn set_shared_gc_state_handle(&mut self, handle: Arc<AtomicU64>) {
        self.shared_gc_state_bitfield = handle;
    }

    /// Local concurrent marking active?
    #[inline]
    pub fn is_concurrent_marking(&self) -> bool {
        self.gc_state_bitfield.load(Ordering::Acquire) & CONCURRENT_MARKING_BITFIELD_MASK != 0
    }

    /// Shared concurrent marking active?
    #[inline]
    pub fn is_shared_concurrent_marking(&self) -> bool {
        self.shared_gc_state_bitfield.load(Ordering::Acquire)
            & SHARED_CONCURRENT_MARKING_BITFIELD_MASK
            != 0
    }

    /// Set or clear local concurrent marking
    pub fn set_concurrent_marking(&self, on: bool) {
        set_mask(&self.gc_state_bitfield, CONCURRENT_MARKING_BITFIELD_MASK, on);
    }

    /// Set or clear shared concurrent marking
    pub fn set_shared_concurrent_marking(&self, on: bool) {
        set_mask(
            &self.shared_gc_state_bitfield,
            SHARED_CONCURRENT_MARKING_BITFIELD_MASK,
            on,
        );
    }

    // ========================================================================
    // Entry tables
    // ========================================================================

    /// Install the handler for one opcode
    pub fn set_bytecode_handler(&mut self, opcode: u8, handler: BytecodeHandler) {
        self.bc_stub_entries[opcode as usize] = Some(handler);
    }

    /// Install a bytecode stub
    pub fn set_bytecode_stub(&mut self, id: BytecodeStubId, handler: BytecodeHandler) {
        self.bc_stub_entries[id as usize] = Some(handler);
    }

    /// Handler at a table index (opcode or stub id)
    pub fn bytecode_handler(&self, index: usize) -> Option<BytecodeHandler> {
        self.bc_stub_entries.get(index).and_then(|h| h.clone())
    }

    /// Install a runtime stub
    pub fn set_runtime_stub(&mut self, id: RuntimeStubId, stub: RuntimeStub) {
        self.rt_stub_entries.insert(id, stub);
    }

    /// Runtime stub by id
    pub fn runtime_stub(&self, id: RuntimeStubId) -> Option<RuntimeStub> {
        self.rt_stub_entries.get(&id).cloned()
    }

    /// Append a builtin to the builtin table
    pub fn register_native(&mut self, f: NativeFunction) -> NativeFnId {
        self.builtin_entries.push(f);
        NativeFnId(self.builtin_entries.len() as u32 - 1)
    }

    /// Builtin by id
    pub fn native(&self, id: NativeFnId) -> Option<NativeFunction> {
        self.builtin_entries.get(id.0 as usize).cloned()
    }

    /// Append optimized code
    pub fn register_optimized(&mut self, f: OptimizedEntry) -> OptimizedCodeId {
        self.optimized_entries.push(f);
        OptimizedCodeId(self.optimized_entries.len() as u32 - 1)
    }

    /// Optimized code by id
    pub fn optimized(&self, id: OptimizedCodeId) -> Option<OptimizedEntry> {
        self.optimized_entries.get(id.0 as usize).cloned()
    }

    /// Append baseline code
    pub fn register_baseline(&mut self, f: BaselineEntry) -> BaselineCodeId {
        self.baseline_entries.push(f);
        BaselineCodeId(self.baseline_entries.len() as u32 - 1)
    }

    /// Baseline code by id
    pub fn baseline(&self, id: BaselineCodeId) -> Option<BaselineEntry> {
        self.baseline_entries.get(id.0 as usize).cloned()
    }

    /// Install a barrier slow path
    pub fn set_barrier_slow_path(&mut self, kind: BarrierKind, stub: BarrierSlowPath) {
        self.barrier_stubs[kind as usize] = Some(stub);
    }

    /// Barrier slow path
    pub fn barrier_slow_path(&self, kind: BarrierKind) -> Option<BarrierSlowPath> {
        self.barrier_stubs[kind as usize].clone()
    }
}

fn set_mask(word: &AtomicU64, mask: u64, on: bool) {
    if on {
        word.fetch_or(mask, Ordering::AcqRel);
    } else {
        word.fetch_and(!mask, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Glue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Glue")
            .field("stack_limit", &format_args!("{:#x}", self.stack_limit))
            .field("leave_frame", &format_args!("{:#x}", self.leave_frame))
            .field("last_fp", &format_args!("{:#x}", self.last_fp))
            .field("concurrent_marking", &self.is_concurrent_marking())
            .field("builtins", &self.builtin_entries.len())
            .field("runtime_stubs", &self.rt_stub_entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marking_bits() {
        let glue = Glue::new(0);
        assert!(!glue.is_concurrent_marking());
        glue.set_concurrent_marking(true);
        assert!(glue.is_concurrent_marking());
        glue.set_concurrent_marking(false);
        assert!(!glue.is_concurrent_marking());
    }

    #[test]
    fn test_shared_state_is_shared() {
        let a = Glue::new(0);
        let mut b = Glue::new(0);
        b.set_shared_gc_state_handle(a.shared_gc_state_handle());
        a.set_shared_concurrent_marking(true);
        assert!(b.is_shared_concurrent_marking());
    }

    #[test]
    fn test_stub_table_indices() {
        let mut glue = Glue::new(0);
        let h: BytecodeHandler = Arc::new(|_, ctx| ctx.acc);
        glue.set_bytecode_stub(BytecodeStubId::ExceptionHandler, h.clone());
        glue.set_bytecode_handler(0x10, h);
        assert!(glue.bytecode_handler(256).is_some());
        assert!(glue.bytecode_handler(0x10).is_some());
        assert!(glue.bytecode_handler(0x11).is_none());
        assert!(glue.bytecode_handler(BC_STUB_TABLE_SIZE).is_none());
    }

    #[test]
    fn test_native_ids_are_dense() {
        let mut glue = Glue::new(0);
        let a = glue.register_native(Arc::new(|_, _| TaggedValue::int(1)));
        let b = glue.register_native(Arc::new(|_, _| TaggedValue::int(2)));
        assert_eq!(a, NativeFnId(0));
        assert_eq!(b, NativeFnId(1));
        assert!(glue.native(NativeFnId(2)).is_none());
    }
}
