//! The host runtime seam
//!
//! Everything the bridge needs from the managed runtime goes through
//! [`HostEnv`]. The JVM implementation lives in `crate::jni` (feature `jni`);
//! tests use [`crate::testing::MockHost`].
//!
//! Methods that can fail on the host side return `Option` or `bool`. A
//! failure always leaves a host exception pending, which callers surface as
//! [`crate::BridgeError::PendingException`].

use std::ptr::NonNull;

/// Constructor argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostValue {
    /// `J`
    Long(i64),
    /// `I`
    Int(i32),
}

/// What happens to a pinned byte array when it is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Native writes are committed back to the host array
    CopyBack,
    /// Native writes, if any, are dropped
    Discard,
}

/// Access to one attached host thread
pub trait HostEnv {
    /// Local reference to any host object, including strings and arrays
    type Object;
    /// Local reference to a class
    type Class;
    /// Class reference that keeps the class loaded until released
    type GlobalClass: Send + Sync;
    type FieldId: Copy + Send + Sync;
    type MethodId: Copy + Send + Sync;

    fn exception_pending(&self) -> bool;

    /// Look up a class by its internal name (`java/lang/String`)
    fn find_class(&self, name: &str) -> Option<Self::Class>;

    /// Raise a new exception of `class`; false if the host could not
    fn throw_new(&self, class: &Self::Class, message: &str) -> bool;

    /// Abort the host process
    fn fatal_error(&self, message: &str) -> !;

    fn pin_class(&self, class: &Self::Class) -> Option<Self::GlobalClass>;

    /// Release a class pinned by [`HostEnv::pin_class`]
    fn unpin_class(&self, class: Self::GlobalClass);

    fn global_as_class(&self, class: &Self::GlobalClass) -> Self::Class;

    fn field_id(&self, class: &Self::Class, name: &str, signature: &str) -> Option<Self::FieldId>;

    fn method_id(&self, class: &Self::Class, name: &str, signature: &str)
        -> Option<Self::MethodId>;

    fn get_long(&self, object: &Self::Object, field: Self::FieldId) -> i64;

    fn set_long(&self, object: &Self::Object, field: Self::FieldId, value: i64);

    fn get_bool(&self, object: &Self::Object, field: Self::FieldId) -> bool;

    fn new_object(
        &self,
        class: &Self::Class,
        ctor: Self::MethodId,
        args: &[HostValue],
    ) -> Option<Self::Object>;

    /// Invoke a `void` method taking one object argument
    fn call_void(&self, object: &Self::Object, method: Self::MethodId, arg: &Self::Object);

    fn delete_local(&self, object: Self::Object);

    /// UTF-16 code units of a host string, exactly as stored
    ///
    /// `None` leaves the host's exception pending.
    fn string_utf16(&self, string: &Self::Object) -> Option<Vec<u16>>;

    fn array_len(&self, array: &Self::Object) -> i32;

    /// Stable address of a byte array's elements until [`HostEnv::unpin_bytes`]
    fn pin_bytes(&self, array: &Self::Object) -> Option<NonNull<u8>>;

    fn unpin_bytes(&self, array: &Self::Object, elements: NonNull<u8>, mode: PinMode);
}

/// Host classes the bridge refers to by name
pub mod class_names {
    pub const PARSER_HANDLE: &str = "com/lightboxtechnologies/lightgrep/ParserHandle";
    pub const PROGRAM_HANDLE: &str = "com/lightboxtechnologies/lightgrep/ProgramHandle";
    pub const CONTEXT_HANDLE: &str = "com/lightboxtechnologies/lightgrep/ContextHandle";
    pub const KEY_OPTIONS: &str = "com/lightboxtechnologies/lightgrep/KeyOptions";
    pub const PROGRAM_OPTIONS: &str = "com/lightboxtechnologies/lightgrep/ProgramOptions";
    pub const CONTEXT_OPTIONS: &str = "com/lightboxtechnologies/lightgrep/ContextOptions";
    pub const HIT_CALLBACK: &str = "com/lightboxtechnologies/lightgrep/HitCallback";
    pub const SEARCH_HIT: &str = "com/lightboxtechnologies/lightgrep/SearchHit";

    pub const KEYWORD_EXCEPTION: &str = "com/lightboxtechnologies/lightgrep/KeywordException";
    pub const PROGRAM_EXCEPTION: &str = "com/lightboxtechnologies/lightgrep/ProgramException";
    pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
    pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/IndexOutOfBoundsException";
    pub const ILLEGAL_STATE_EXCEPTION: &str = "java/lang/IllegalStateException";
    pub const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
}
