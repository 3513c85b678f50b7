//! Heap object model consumed by the bridge
//!
//! The bridge only ever reads a handful of facts from heap objects: the
//! hidden-class bit-field, a function's method and installed code, a
//! method's call field, bound-function and generator-context payloads, and
//! the region flag byte of any address. This module models exactly those
//! on top of region-aligned addresses so tagged values carry real pointers.

pub mod method;
pub mod region;

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::defaults::{
    BYTECODE_BASE_ADDRESS, HEAP_BASE_ADDRESS, OBJECT_SLOT_SIZE, REGION_HEADER_SIZE, REGION_SIZE,
};
use crate::glue::{NativeFnId, OptimizedCodeId};
use crate::value::TaggedValue;

pub use method::{CallField, ExtraLiteralInfo, FunctionKind, MachineCode, Method, MethodCode};
pub use region::{region_base, Region, RegionFlagScheme, RememberedSet, SpaceKind};

// ============================================================================
// Hidden classes
// ============================================================================

/// Object type tag stored in the hidden class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum JsType {
    /// Not an object
    Invalid = 0x00,
    /// Fixed-length value array
    TaggedArray = 0x01,
    /// Method metadata
    Method = 0x02,
    /// Profile type info cell
    ProfileTypeInfoCell = 0x03,
    /// Baseline machine code
    MachineCode = 0x04,
    /// Suspended generator frame
    GeneratorContext = 0x05,
    /// Ordinary object
    JsObject = 0x10,
    /// Array
    JsArray = 0x11,
    /// Error object
    JsError = 0x12,
    /// Function base, first of the function range
    JsFunctionBase = 0x20,
    /// Ordinary function
    JsFunction = 0x21,
    /// Generator function
    JsGeneratorFunction = 0x22,
    /// Async function
    JsAsyncFunction = 0x23,
    /// Async generator function, last of the function range
    JsAsyncGeneratorFunction = 0x24,
    /// Bound function
    JsBoundFunction = 0x30,
    /// Proxy
    JsProxy = 0x31,
}

impl JsType {
    /// First type of the function range
    pub const JS_FUNCTION_FIRST: JsType = JsType::JsFunctionBase;
    /// Last type of the function range
    pub const JS_FUNCTION_LAST: JsType = JsType::JsAsyncGeneratorFunction;
    /// First ECMA object type
    pub const ECMA_OBJECT_FIRST: JsType = JsType::JsObject;
    /// Last ECMA object type
    pub const ECMA_OBJECT_LAST: JsType = JsType::JsProxy;

    /// Decode a type byte
    pub fn from_u8(raw: u8) -> JsType {
        match raw {
            0x01 => JsType::TaggedArray,
            0x02 => JsType::Method,
            0x03 => JsType::ProfileTypeInfoCell,
            0x04 => JsType::MachineCode,
            0x05 => JsType::GeneratorContext,
            0x10 => JsType::JsObject,
            0x11 => JsType::JsArray,
            0x12 => JsType::JsError,
            0x20 => JsType::JsFunctionBase,
            0x21 => JsType::JsFunction,
            0x22 => JsType::JsGeneratorFunction,
            0x23 => JsType::JsAsyncFunction,
            0x24 => JsType::JsAsyncGeneratorFunction,
            0x30 => JsType::JsBoundFunction,
            0x31 => JsType::JsProxy,
            _ => JsType::Invalid,
        }
    }

    /// In `[JS_FUNCTION_FIRST, JS_FUNCTION_LAST]`?
    #[inline]
    pub fn is_function(self) -> bool {
        self >= Self::JS_FUNCTION_FIRST && self <= Self::JS_FUNCTION_LAST
    }

    /// In `[ECMA_OBJECT_FIRST, ECMA_OBJECT_LAST]`?
    #[inline]
    pub fn is_ecma_object(self) -> bool {
        self >= Self::ECMA_OBJECT_FIRST && self <= Self::ECMA_OBJECT_LAST
    }
}

/// Hidden class, reduced to the bits the bridge reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HClass {
    /// Object type
    pub js_type: JsType,
    /// `[[Call]]` is allowed
    pub callable: bool,
    /// `[[Construct]]` is allowed
    pub constructor: bool,
}

impl HClass {
    const TYPE_MASK: u32 = 0xFF;
    const CALLABLE_BIT: u32 = 1 << 8;
    const CONSTRUCTOR_BIT: u32 = 1 << 9;

    /// Plain hidden class
    pub const fn new(js_type: JsType, callable: bool, constructor: bool) -> Self {
        Self {
            js_type,
            callable,
            constructor,
        }
    }

    /// Callable, constructible ordinary function
    pub const fn function() -> Self {
        Self::new(JsType::JsFunction, true, true)
    }

    /// Arrow function or method: callable, not constructible
    pub const fn arrow_function() -> Self {
        Self::new(JsType::JsFunction, true, false)
    }

    /// Class constructor: constructible but not callable
    pub const fn class_constructor() -> Self {
        Self::new(JsType::JsFunction, false, true)
    }

    /// Packed bit-field as stored in the object header
    pub fn bit_field(self) -> u32 {
        let mut bits = self.js_type as u32;
        if self.callable {
            bits |= Self::CALLABLE_BIT;
        }
        if self.constructor {
            bits |= Self::CONSTRUCTOR_BIT;
        }
        bits
    }

    /// Unpack a bit-field
    pub fn from_bit_field(bits: u32) -> Self {
        Self {
            js_type: JsType::from_u8((bits & Self::TYPE_MASK) as u8),
            callable: bits & Self::CALLABLE_BIT != 0,
            constructor: bits & Self::CONSTRUCTOR_BIT != 0,
        }
    }
}

// ============================================================================
// Object bodies
// ============================================================================

/// Function object
#[derive(Debug, Clone)]
pub struct JsFunction {
    /// Method object
    pub method: TaggedValue,
    /// Closure environment
    pub lexical_env: TaggedValue,
    /// Profile type info cell, or undefined
    pub raw_profile_type_info: TaggedValue,
    /// Baseline code: undefined (none), hole (compiling) or a machine code object
    pub baseline_code: TaggedValue,
    /// Installed optimized code
    pub optimized_code: Option<OptimizedCodeId>,
}

impl JsFunction {
    /// Function with no environment, profile or compiled code
    pub fn new(method: TaggedValue) -> Self {
        Self {
            method,
            lexical_env: TaggedValue::undefined(),
            raw_profile_type_info: TaggedValue::undefined(),
            baseline_code: TaggedValue::undefined(),
            optimized_code: None,
        }
    }
}

/// Bound function
#[derive(Debug, Clone)]
pub struct BoundFunction {
    /// Target callable
    pub target: TaggedValue,
    /// Bound `this`
    pub bound_this: TaggedValue,
    /// Tagged array of bound arguments
    pub bound_arguments: TaggedValue,
}

/// Proxy
#[derive(Debug, Clone)]
pub struct JsProxy {
    /// Proxy target
    pub target: TaggedValue,
    /// Handler object
    pub handler: TaggedValue,
    /// Native `[[Call]]` trampoline
    pub call_trampoline: NativeFnId,
}

/// Saved frame of a suspended generator
#[derive(Debug, Clone)]
pub struct GeneratorContext {
    /// Generator function
    pub method: TaggedValue,
    /// Saved `this`
    pub this: TaggedValue,
    /// Tagged array holding the register file
    pub regs_array: TaggedValue,
    /// Number of registers to restore
    pub nregs: u32,
    /// Byte offset of the resume point
    pub bc_offset: u32,
    /// Saved accumulator
    pub acc: TaggedValue,
    /// Saved lexical environment
    pub lexical_env: TaggedValue,
}

/// Object payload
#[derive(Debug, Clone)]
pub enum ObjectBody {
    /// Tagged array
    TaggedArray(Vec<TaggedValue>),
    /// Method
    Method(Method),
    /// Profile type info cell
    ProfileTypeInfoCell(TaggedValue),
    /// Baseline code
    MachineCode(MachineCode),
    /// Generator context
    GeneratorContext(GeneratorContext),
    /// Function
    Function(JsFunction),
    /// Bound function
    BoundFunction(BoundFunction),
    /// Proxy
    Proxy(JsProxy),
    /// Ordinary object, optionally with a native `[[Call]]`
    Object {
        /// Native call entry of a callable host object
        native_call: Option<NativeFnId>,
        /// Property storage
        fields: Vec<TaggedValue>,
    },
}

/// Heap object: hidden class plus payload
#[derive(Debug, Clone)]
pub struct HeapObject {
    /// Hidden class
    pub hclass: HClass,
    /// Payload
    pub body: ObjectBody,
}

impl HeapObject {
    /// Build an object
    pub fn new(hclass: HClass, body: ObjectBody) -> Self {
        Self { hclass, body }
    }
}

// ============================================================================
// Heap
// ============================================================================

/// Region-based heap
#[derive(Debug)]
pub struct Heap {
    scheme: RegionFlagScheme,
    regions: FxHashMap<usize, Region>,
    objects: FxHashMap<usize, HeapObject>,
    current: FxHashMap<SpaceKind, usize>,
    next_region_base: usize,
    bytecode: BTreeMap<usize, Vec<u8>>,
    next_bytecode: usize,
}

impl Heap {
    /// Empty heap using `scheme` to tag regions
    pub fn new(scheme: RegionFlagScheme) -> Self {
        Self {
            scheme,
            regions: FxHashMap::default(),
            objects: FxHashMap::default(),
            current: FxHashMap::default(),
            next_region_base: HEAP_BASE_ADDRESS,
            bytecode: BTreeMap::new(),
            next_bytecode: BYTECODE_BASE_ADDRESS,
        }
    }

    /// Region flag scheme
    pub fn scheme(&self) -> &RegionFlagScheme {
        &self.scheme
    }

    fn fresh_region(&mut self, space: SpaceKind) -> usize {
        let base = self.next_region_base;
        self.next_region_base += REGION_SIZE;
        let flag = self.scheme.flag_for(space);
        self.regions
            .insert(base, Region::new(base, flag, REGION_HEADER_SIZE));
        self.current.insert(space, base);
        base
    }

    /// Allocate `obj` in `space`
    pub fn allocate(&mut self, space: SpaceKind, obj: HeapObject) -> TaggedValue {
        let base = match self.current.get(&space) {
            Some(base) => *base,
            None => self.fresh_region(space),
        };
        let addr = match self.regions.get_mut(&base).and_then(|r| r.bump(OBJECT_SLOT_SIZE)) {
            Some(addr) => addr,
            None => {
                let base = self.fresh_region(space);
                // A fresh region always has room for one object slot.
                self.regions
                    .get_mut(&base)
                    .and_then(|r| r.bump(OBJECT_SLOT_SIZE))
                    .unwrap_or(base + REGION_HEADER_SIZE)
            }
        };
        self.objects.insert(addr, obj);
        TaggedValue::from_address(addr)
    }

    /// Allocate in the young generation
    pub fn alloc(&mut self, obj: HeapObject) -> TaggedValue {
        self.allocate(SpaceKind::Young, obj)
    }

    /// Object behind a tagged value
    pub fn get(&self, v: TaggedValue) -> Option<&HeapObject> {
        v.address().and_then(|addr| self.objects.get(&addr))
    }

    /// Mutable object behind a tagged value
    pub fn get_mut(&mut self, v: TaggedValue) -> Option<&mut HeapObject> {
        let addr = v.address()?;
        self.objects.get_mut(&addr)
    }

    /// Hidden class of a value
    pub fn hclass(&self, v: TaggedValue) -> Option<HClass> {
        self.get(v).map(|o| o.hclass)
    }

    /// Packed hidden-class bit-field; zero for non-objects
    pub fn hclass_bit_field(&self, v: TaggedValue) -> u32 {
        self.hclass(v).map(HClass::bit_field).unwrap_or(0)
    }

    /// Is `v` an ECMA object?
    pub fn is_ecma_object(&self, v: TaggedValue) -> bool {
        self.hclass(v)
            .map(|h| h.js_type.is_ecma_object())
            .unwrap_or(false)
    }

    /// Function payload
    pub fn function(&self, v: TaggedValue) -> Option<&JsFunction> {
        match &self.get(v)?.body {
            ObjectBody::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Mutable function payload
    pub fn function_mut(&mut self, v: TaggedValue) -> Option<&mut JsFunction> {
        match &mut self.get_mut(v)?.body {
            ObjectBody::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Method payload
    pub fn method(&self, v: TaggedValue) -> Option<&Method> {
        match &self.get(v)?.body {
            ObjectBody::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Method of a function
    pub fn function_method(&self, func: TaggedValue) -> Option<&Method> {
        self.function(func).and_then(|f| self.method(f.method))
    }

    /// Tagged array contents
    pub fn tagged_array(&self, v: TaggedValue) -> Option<&[TaggedValue]> {
        match &self.get(v)?.body {
            ObjectBody::TaggedArray(values) => Some(values),
            _ => None,
        }
    }

    /// Bound function payload
    pub fn bound_function(&self, v: TaggedValue) -> Option<&BoundFunction> {
        match &self.get(v)?.body {
            ObjectBody::BoundFunction(b) => Some(b),
            _ => None,
        }
    }

    /// Proxy payload
    pub fn proxy(&self, v: TaggedValue) -> Option<&JsProxy> {
        match &self.get(v)?.body {
            ObjectBody::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Generator context payload
    pub fn generator_context(&self, v: TaggedValue) -> Option<&GeneratorContext> {
        match &self.get(v)?.body {
            ObjectBody::GeneratorContext(g) => Some(g),
            _ => None,
        }
    }

    /// Baseline machine code payload
    pub fn machine_code(&self, v: TaggedValue) -> Option<&MachineCode> {
        match &self.get(v)?.body {
            ObjectBody::MachineCode(m) => Some(m),
            _ => None,
        }
    }

    /// Value stored in a profile type info cell
    pub fn profile_cell_value(&self, v: TaggedValue) -> Option<TaggedValue> {
        match &self.get(v)?.body {
            ObjectBody::ProfileTypeInfoCell(value) => Some(*value),
            _ => None,
        }
    }

    /// Native `[[Call]]` of a callable host object
    pub fn native_call(&self, v: TaggedValue) -> Option<NativeFnId> {
        match &self.get(v)?.body {
            ObjectBody::Object { native_call, .. } => *native_call,
            _ => None,
        }
    }

    /// Region containing `addr`
    pub fn region(&self, addr: usize) -> Option<&Region> {
        self.regions.get(&region_base(addr))
    }

    /// Mutable region containing `addr`
    pub fn region_mut(&mut self, addr: usize) -> Option<&mut Region> {
        self.regions.get_mut(&region_base(addr))
    }

    /// Flag byte of the region containing `addr`; zero outside the heap
    pub fn region_flag(&self, addr: usize) -> u8 {
        self.region(addr).map(|r| r.flag).unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Bytecode area
    // ------------------------------------------------------------------------

    /// Copy a bytecode array into the bytecode area; returns its base address
    pub fn load_bytecode(&mut self, bytes: &[u8]) -> usize {
        let base = self.next_bytecode;
        // Keep arrays apart so a pc never reads into the next array.
        self.next_bytecode += (bytes.len() + 16 + 7) & !7;
        self.bytecode.insert(base, bytes.to_vec());
        base
    }

    /// Byte at `pc`
    pub fn read_bytecode(&self, pc: usize) -> Option<u8> {
        let (base, bytes) = self.bytecode.range(..=pc).next_back()?;
        bytes.get(pc - base).copied()
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// New tagged array
    pub fn new_tagged_array(&mut self, values: Vec<TaggedValue>) -> TaggedValue {
        self.alloc(HeapObject::new(
            HClass::new(JsType::TaggedArray, false, false),
            ObjectBody::TaggedArray(values),
        ))
    }

    /// New method
    pub fn new_method(&mut self, method: Method) -> TaggedValue {
        self.allocate(
            SpaceKind::Old,
            HeapObject::new(
                HClass::new(JsType::Method, false, false),
                ObjectBody::Method(method),
            ),
        )
    }

    /// New function with the given hidden class
    pub fn new_function(&mut self, function: JsFunction, hclass: HClass) -> TaggedValue {
        self.alloc(HeapObject::new(hclass, ObjectBody::Function(function)))
    }

    /// New bound function. Callable and constructible follow the target.
    pub fn new_bound_function(
        &mut self,
        target: TaggedValue,
        bound_this: TaggedValue,
        bound_args: Vec<TaggedValue>,
    ) -> TaggedValue {
        let target_class = self.hclass(target);
        let bound_arguments = self.new_tagged_array(bound_args);
        let hclass = HClass::new(
            JsType::JsBoundFunction,
            target_class.map(|h| h.callable || h.constructor).unwrap_or(false),
            target_class.map(|h| h.constructor).unwrap_or(false),
        );
        self.alloc(HeapObject::new(
            hclass,
            ObjectBody::BoundFunction(BoundFunction {
                target,
                bound_this,
                bound_arguments,
            }),
        ))
    }

    /// New callable proxy
    pub fn new_proxy(
        &mut self,
        target: TaggedValue,
        handler: TaggedValue,
        call_trampoline: NativeFnId,
    ) -> TaggedValue {
        self.alloc(HeapObject::new(
            HClass::new(JsType::JsProxy, true, true),
            ObjectBody::Proxy(JsProxy {
                target,
                handler,
                call_trampoline,
            }),
        ))
    }

    /// New ordinary object; callable when `native_call` is set
    pub fn new_object(&mut self, native_call: Option<NativeFnId>) -> TaggedValue {
        self.alloc(HeapObject::new(
            HClass::new(JsType::JsObject, native_call.is_some(), false),
            ObjectBody::Object {
                native_call,
                fields: Vec::new(),
            },
        ))
    }

    /// New generator context
    pub fn new_generator_context(&mut self, context: GeneratorContext) -> TaggedValue {
        self.alloc(HeapObject::new(
            HClass::new(JsType::GeneratorContext, false, false),
            ObjectBody::GeneratorContext(context),
        ))
    }

    /// New profile type info cell
    pub fn new_profile_cell(&mut self, value: TaggedValue) -> TaggedValue {
        self.alloc(HeapObject::new(
            HClass::new(JsType::ProfileTypeInfoCell, false, false),
            ObjectBody::ProfileTypeInfoCell(value),
        ))
    }

    /// New baseline code object
    pub fn new_machine_code(&mut self, code: MachineCode) -> TaggedValue {
        self.allocate(
            SpaceKind::Old,
            HeapObject::new(
                HClass::new(JsType::MachineCode, false, false),
                ObjectBody::MachineCode(code),
            ),
        )
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(RegionFlagScheme::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_range() {
        assert!(JsType::JsFunction.is_function());
        assert!(JsType::JsAsyncGeneratorFunction.is_function());
        assert!(!JsType::JsBoundFunction.is_function());
        assert!(!JsType::JsObject.is_function());
        assert!(JsType::JsProxy.is_ecma_object());
        assert!(!JsType::TaggedArray.is_ecma_object());
    }

    #[test]
    fn test_bit_field_round_trip() {
        for h in [
            HClass::function(),
            HClass::class_constructor(),
            HClass::new(JsType::JsProxy, true, true),
        ] {
            assert_eq!(HClass::from_bit_field(h.bit_field()), h);
        }
    }

    #[test]
    fn test_allocation_tags_regions() {
        let mut heap = Heap::default();
        let young = heap.new_object(None);
        let old = heap.allocate(SpaceKind::Old, heap_object());
        let scheme = *heap.scheme();
        assert_eq!(heap.region_flag(young.address().unwrap()), scheme.young);
        assert_eq!(heap.region_flag(old.address().unwrap()), scheme.old);
        assert_ne!(
            region_base(young.address().unwrap()),
            region_base(old.address().unwrap())
        );
    }

    fn heap_object() -> HeapObject {
        HeapObject::new(
            HClass::new(JsType::JsObject, false, false),
            ObjectBody::Object {
                native_call: None,
                fields: vec![],
            },
        )
    }

    #[test]
    fn test_region_rollover() {
        let mut heap = Heap::default();
        let per_region = (REGION_SIZE - REGION_HEADER_SIZE) / OBJECT_SLOT_SIZE;
        let first = heap.alloc(heap_object());
        let mut last = first;
        for _ in 0..per_region {
            last = heap.alloc(heap_object());
        }
        assert_ne!(
            region_base(first.address().unwrap()),
            region_base(last.address().unwrap())
        );
        assert!(heap.get(last).is_some());
    }

    #[test]
    fn test_bytecode_reads() {
        let mut heap = Heap::default();
        let a = heap.load_bytecode(&[1, 2, 3]);
        let b = heap.load_bytecode(&[9]);
        assert_eq!(heap.read_bytecode(a + 2), Some(3));
        assert_eq!(heap.read_bytecode(a + 3), None);
        assert_eq!(heap.read_bytecode(b), Some(9));
    }

    #[test]
    fn test_bound_function_inherits_callability() {
        let mut heap = Heap::default();
        let method = heap.new_method(Method {
            call_field: CallField::new(0, 0),
            extra_literal_info: ExtraLiteralInfo::default(),
            code: MethodCode::Bytecode(0),
            constant_pool: TaggedValue::undefined(),
            literal_info: 0,
        });
        let f = heap.new_function(JsFunction::new(method), HClass::function());
        let bound = heap.new_bound_function(f, TaggedValue::null(), vec![TaggedValue::int(1)]);
        let class = heap.hclass(bound).unwrap();
        assert!(class.callable);
        let b = heap.bound_function(bound).unwrap();
        assert_eq!(heap.tagged_array(b.bound_arguments).unwrap().len(), 1);
    }
}
