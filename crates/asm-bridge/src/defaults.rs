//! Default constants for bridge configuration.
//!
//! Centralizes the sizes shared by the stack model, the argument adapter
//! and the heap's region allocator.

/// Size of one stack slot in bytes.
pub const FRAME_SLOT_SIZE: usize = 8;

/// Default machine stack size in slots (1 MiB).
pub const DEFAULT_STACK_SLOTS: usize = 128 * 1024;

/// Slots kept between the glue stack limit and the physical bottom of the
/// stack. Fixed-size pushes that follow a successful overflow check
/// (frame headers, frame state, call info) land here.
pub const DEFAULT_RESERVED_SLOTS: usize = 256;

/// Smallest accepted headroom. Covers the unchecked pushes that can follow
/// a passing check: a native entry frame with the widest callee-saved set,
/// a leave frame with its inline runtime arguments and the stack-overflow
/// frame.
pub const MIN_RESERVED_SLOTS: usize = 32;

/// Inline arguments a runtime call may pass in its leave frame.
pub const MAX_INLINE_RUNTIME_ARGS: usize = 4;

/// Upper address (exclusive) of the simulated machine stack.
pub const STACK_TOP_ADDRESS: usize = 0x7FF0_0000_0000;

/// Number of argument slots copied between two stack-limit checks.
pub const DEFAULT_ARG_PUSH_BATCH: usize = 8;

/// Heap region size in bytes (256 KiB).
pub const REGION_SIZE_LOG2: u32 = 18;

/// Heap region size in bytes.
pub const REGION_SIZE: usize = 1 << REGION_SIZE_LOG2;

/// Mask selecting the offset of an address within its region.
pub const DEFAULT_REGION_MASK: usize = REGION_SIZE - 1;

/// Base address of the first heap region.
pub const HEAP_BASE_ADDRESS: usize = 0x1_0000_0000;

/// Base address of the bytecode area.
pub const BYTECODE_BASE_ADDRESS: usize = 0x4000_0000_0000;

/// Bytes reserved at the start of each region for its header.
pub const REGION_HEADER_SIZE: usize = 64;

/// Bytes reserved per heap object.
pub const OBJECT_SLOT_SIZE: usize = 64;
