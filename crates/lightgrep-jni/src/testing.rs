//! In-memory host for tests
//!
//! `MockHost` models just enough of a JVM to drive every entry point:
//! classes with versioned member IDs, plain objects with fields, strings,
//! byte arrays pinned as copies, callback objects that record their hits,
//! and a single pending-exception slot. Faults can be injected at each
//! point where a real host can fail.

use crate::api::Bridge;
use crate::host::{class_names, HostEnv, HostValue, PinMode};
use crate::lifecycle::Bindings;
use crate::registry::HandleRegistry;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Arc;

/// Action run by a callback object after recording hit number `n` (0-based)
pub type HitAction = Rc<dyn Fn(&MockHost, usize)>;

/// Local reference to a mock object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockRef(usize);

/// A class as seen at one load epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockClass {
    pub name: String,
    pub epoch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockMemberId(usize);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Long(i64),
    Int(i32),
    Bool(bool),
}

enum Object {
    Instance {
        class: String,
        epoch: u32,
        fields: HashMap<String, Value>,
    },
    Str(Vec<u16>),
    Bytes(Vec<u8>),
    Callback {
        hits: Vec<(i64, i64, i32)>,
        action: Option<HitAction>,
    },
}

struct Member {
    class: String,
    epoch: u32,
    name: String,
}

struct Pin {
    array: MockRef,
    copy: Vec<u8>,
}

#[derive(Default)]
struct State {
    objects: Vec<Option<Object>>,
    members: Vec<Member>,
    epochs: HashMap<String, u32>,
    missing_classes: HashSet<String>,
    missing_members: HashSet<(String, String)>,
    pending: Option<(String, String)>,
    fatal: Option<String>,
    global_refs: usize,
    pins: Vec<Pin>,
    pin_log: Vec<PinMode>,
    fail_next_pin: bool,
    fail_throws: bool,
    fail_handle_allocation: bool,
    hit_allocations_left: Option<usize>,
}

/// In-memory [`HostEnv`] with fault injection
#[derive(Default)]
pub struct MockHost {
    state: RefCell<State>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self, object: Object) -> MockRef {
        let mut state = self.state.borrow_mut();
        state.objects.push(Some(object));
        MockRef(state.objects.len() - 1)
    }

    fn epoch(state: &State, class: &str) -> u32 {
        state.epochs.get(class).copied().unwrap_or(0)
    }

    fn instance(&self, class: &str, fields: &[(&str, Value)]) -> MockRef {
        let epoch = Self::epoch(&self.state.borrow(), class);
        self.alloc(Object::Instance {
            class: class.to_string(),
            epoch,
            fields: fields
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        })
    }

    /// Resolve a field of an instance, panicking on IDs from an older class
    /// load like a real host would misbehave
    fn field<R>(&self, object: &MockRef, id: MockMemberId, f: impl FnOnce(&mut HashMap<String, Value>, &str) -> R) -> R {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let member = &state.members[id.0];
        match state.objects.get_mut(object.0).and_then(Option::as_mut) {
            Some(Object::Instance { class, epoch, fields }) => {
                assert_eq!(class.as_str(), member.class.as_str(), "field {} used on {}", member.name, class);
                assert_eq!(*epoch, member.epoch, "stale field id {}.{}", class, member.name);
                f(fields, &member.name)
            }
            _ => panic!("field access on non-instance {:?}", object),
        }
    }

    fn member_id(&self, class: &MockClass, name: &str, missing: &str) -> Option<MockMemberId> {
        let mut state = self.state.borrow_mut();
        if state
            .missing_members
            .contains(&(class.name.clone(), name.to_string()))
        {
            state.pending = Some((missing.to_string(), name.to_string()));
            return None;
        }
        state.members.push(Member {
            class: class.name.clone(),
            epoch: class.epoch,
            name: name.to_string(),
        });
        Some(MockMemberId(state.members.len() - 1))
    }

    pub fn new_string(&self, value: &str) -> MockRef {
        self.new_string_utf16(value.encode_utf16().collect())
    }

    /// A string from raw code units, which need not be valid UTF-16
    pub fn new_string_utf16(&self, units: Vec<u16>) -> MockRef {
        self.alloc(Object::Str(units))
    }

    pub fn new_byte_array(&self, bytes: Vec<u8>) -> MockRef {
        self.alloc(Object::Bytes(bytes))
    }

    pub fn new_key_options(&self, fixed_string: bool, case_insensitive: bool) -> MockRef {
        self.instance(
            class_names::KEY_OPTIONS,
            &[
                ("FixedString", Value::Bool(fixed_string)),
                ("CaseInsensitive", Value::Bool(case_insensitive)),
            ],
        )
    }

    pub fn new_program_options(&self, determinize: bool) -> MockRef {
        self.instance(
            class_names::PROGRAM_OPTIONS,
            &[("Determinize", Value::Bool(determinize))],
        )
    }

    pub fn new_context_options(&self) -> MockRef {
        self.instance(class_names::CONTEXT_OPTIONS, &[])
    }

    /// A `ParserHandle` whose `Pointer` holds `token`
    pub fn new_parser_handle(&self, token: i64) -> MockRef {
        self.instance(class_names::PARSER_HANDLE, &[("Pointer", Value::Long(token))])
    }

    pub fn new_program_handle(&self, token: i64) -> MockRef {
        self.instance(class_names::PROGRAM_HANDLE, &[("Pointer", Value::Long(token))])
    }

    pub fn new_context_handle(&self, token: i64) -> MockRef {
        self.instance(class_names::CONTEXT_HANDLE, &[("Pointer", Value::Long(token))])
    }

    pub fn new_callback(&self) -> MockRef {
        self.alloc(Object::Callback {
            hits: Vec::new(),
            action: None,
        })
    }

    pub fn new_callback_with(&self, action: impl Fn(&MockHost, usize) + 'static) -> MockRef {
        self.alloc(Object::Callback {
            hits: Vec::new(),
            action: Some(Rc::new(action)),
        })
    }

    /// `(start, end, keyword_index)` of every hit delivered to `callback`
    pub fn hits(&self, callback: &MockRef) -> Vec<(i64, i64, i32)> {
        match self.state.borrow().objects.get(callback.0) {
            Some(Some(Object::Callback { hits, .. })) => hits.clone(),
            _ => panic!("{:?} is not a callback", callback),
        }
    }

    pub fn bytes(&self, array: &MockRef) -> Vec<u8> {
        match self.state.borrow().objects.get(array.0) {
            Some(Some(Object::Bytes(bytes))) => bytes.clone(),
            _ => panic!("{:?} is not a byte array", array),
        }
    }

    /// The `Pointer` field of a handle object
    pub fn pointer(&self, handle: &MockRef) -> i64 {
        match self.state.borrow().objects.get(handle.0) {
            Some(Some(Object::Instance { fields, .. })) => match fields.get("Pointer") {
                Some(Value::Long(token)) => *token,
                _ => 0,
            },
            _ => panic!("{:?} is not an instance", handle),
        }
    }

    /// Class name of an instance
    pub fn class_of(&self, object: &MockRef) -> Option<String> {
        match self.state.borrow().objects.get(object.0) {
            Some(Some(Object::Instance { class, .. })) => Some(class.clone()),
            _ => None,
        }
    }

    /// Raise an exception as host code would
    pub fn throw(&self, class: &str, message: &str) {
        self.state.borrow_mut().pending = Some((class.to_string(), message.to_string()));
    }

    pub fn pending_exception(&self) -> Option<(String, String)> {
        self.state.borrow().pending.clone()
    }

    /// Clear and return the pending exception, like a host `catch`
    pub fn take_exception(&self) -> Option<(String, String)> {
        self.state.borrow_mut().pending.take()
    }

    pub fn fatal_message(&self) -> Option<String> {
        self.state.borrow().fatal.clone()
    }

    pub fn global_refs(&self) -> usize {
        self.state.borrow().global_refs
    }

    pub fn open_pins(&self) -> usize {
        self.state.borrow().pins.len()
    }

    pub fn pin_log(&self) -> Vec<PinMode> {
        self.state.borrow().pin_log.clone()
    }

    /// `SearchHit` objects not yet released
    pub fn live_hits(&self) -> usize {
        self.state
            .borrow()
            .objects
            .iter()
            .filter(|object| {
                matches!(object, Some(Object::Instance { class, .. }) if class == class_names::SEARCH_HIT)
            })
            .count()
    }

    pub fn remove_class(&self, class: &str) {
        self.state.borrow_mut().missing_classes.insert(class.to_string());
    }

    pub fn remove_member(&self, class: &str, member: &str) {
        self.state
            .borrow_mut()
            .missing_members
            .insert((class.to_string(), member.to_string()));
    }

    /// Unload and reload `class`; IDs bound before are stale afterwards
    pub fn reload_class(&self, class: &str) {
        *self
            .state
            .borrow_mut()
            .epochs
            .entry(class.to_string())
            .or_insert(0) += 1;
    }

    pub fn fail_next_pin(&self) {
        self.state.borrow_mut().fail_next_pin = true;
    }

    pub fn fail_throws(&self) {
        self.state.borrow_mut().fail_throws = true;
    }

    pub fn fail_handle_allocation(&self) {
        self.state.borrow_mut().fail_handle_allocation = true;
    }

    /// Let `count` more `SearchHit` allocations succeed, then fail
    pub fn fail_hit_allocation_after(&self, count: usize) {
        self.state.borrow_mut().hit_allocations_left = Some(count);
    }
}

impl HostEnv for MockHost {
    type Object = MockRef;
    type Class = MockClass;
    type GlobalClass = MockClass;
    type FieldId = MockMemberId;
    type MethodId = MockMemberId;

    fn exception_pending(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    fn find_class(&self, name: &str) -> Option<MockClass> {
        let mut state = self.state.borrow_mut();
        if state.missing_classes.contains(name) {
            state.pending = Some(("java/lang/NoClassDefFoundError".to_string(), name.to_string()));
            return None;
        }
        Some(MockClass {
            name: name.to_string(),
            epoch: Self::epoch(&state, name),
        })
    }

    fn throw_new(&self, class: &MockClass, message: &str) -> bool {
        let mut state = self.state.borrow_mut();
        if state.fail_throws {
            return false;
        }
        state.pending = Some((class.name.clone(), message.to_string()));
        true
    }

    fn fatal_error(&self, message: &str) -> ! {
        self.state.borrow_mut().fatal = Some(message.to_string());
        panic!("host fatal error: {}", message);
    }

    fn pin_class(&self, class: &MockClass) -> Option<MockClass> {
        self.state.borrow_mut().global_refs += 1;
        Some(class.clone())
    }

    fn unpin_class(&self, _class: MockClass) {
        self.state.borrow_mut().global_refs -= 1;
    }

    fn global_as_class(&self, class: &MockClass) -> MockClass {
        class.clone()
    }

    fn field_id(&self, class: &MockClass, name: &str, _signature: &str) -> Option<MockMemberId> {
        self.member_id(class, name, "java/lang/NoSuchFieldError")
    }

    fn method_id(&self, class: &MockClass, name: &str, _signature: &str) -> Option<MockMemberId> {
        self.member_id(class, name, "java/lang/NoSuchMethodError")
    }

    fn get_long(&self, object: &MockRef, field: MockMemberId) -> i64 {
        self.field(object, field, |fields, name| match fields.get(name) {
            Some(Value::Long(value)) => *value,
            _ => 0,
        })
    }

    fn set_long(&self, object: &MockRef, field: MockMemberId, value: i64) {
        self.field(object, field, |fields, name| {
            fields.insert(name.to_string(), Value::Long(value));
        })
    }

    fn get_bool(&self, object: &MockRef, field: MockMemberId) -> bool {
        self.field(object, field, |fields, name| {
            matches!(fields.get(name), Some(Value::Bool(true)))
        })
    }

    fn new_object(&self, class: &MockClass, ctor: MockMemberId, args: &[HostValue]) -> Option<MockRef> {
        {
            let mut state = self.state.borrow_mut();
            let member = &state.members[ctor.0];
            assert_eq!(member.class, class.name, "constructor of another class");
            assert_eq!(member.epoch, class.epoch, "stale constructor id");

            let out_of_memory = if class.name == class_names::SEARCH_HIT {
                match &mut state.hit_allocations_left {
                    Some(0) => true,
                    Some(left) => {
                        *left -= 1;
                        false
                    }
                    None => false,
                }
            } else {
                state.fail_handle_allocation
            };
            if out_of_memory {
                state.pending = Some(("java/lang/OutOfMemoryError".to_string(), class.name.clone()));
                return None;
            }
        }

        let long = |i: usize| match args.get(i) {
            Some(HostValue::Long(value)) => Value::Long(*value),
            other => panic!("expected long argument {}, got {:?}", i, other),
        };
        let fields = if class.name == class_names::SEARCH_HIT {
            let keyword_index = match args.get(2) {
                Some(HostValue::Int(value)) => Value::Int(*value),
                other => panic!("expected int argument 2, got {:?}", other),
            };
            vec![("Start", long(0)), ("End", long(1)), ("KeywordIndex", keyword_index)]
        } else {
            vec![("Pointer", long(0))]
        };
        Some(self.instance(&class.name, &fields))
    }

    fn call_void(&self, object: &MockRef, _method: MockMemberId, arg: &MockRef) {
        let hit = match self.state.borrow().objects.get(arg.0) {
            Some(Some(Object::Instance { fields, .. })) => {
                let get = |name: &str| fields.get(name).copied();
                match (get("Start"), get("End"), get("KeywordIndex")) {
                    (Some(Value::Long(start)), Some(Value::Long(end)), Some(Value::Int(index))) => {
                        (start, end, index)
                    }
                    _ => panic!("callback argument is not a SearchHit"),
                }
            }
            _ => panic!("callback argument {:?} is not live", arg),
        };

        let (action, n) = match self.state.borrow_mut().objects.get_mut(object.0) {
            Some(Some(Object::Callback { hits, action })) => {
                hits.push(hit);
                (action.clone(), hits.len() - 1)
            }
            _ => panic!("{:?} is not a callback", object),
        };
        // the borrow is released, so the action may call back into the bridge
        if let Some(action) = action {
            action(self, n);
        }
    }

    fn delete_local(&self, object: MockRef) {
        if let Some(slot) = self.state.borrow_mut().objects.get_mut(object.0) {
            *slot = None;
        }
    }

    fn string_utf16(&self, string: &MockRef) -> Option<Vec<u16>> {
        match self.state.borrow().objects.get(string.0) {
            Some(Some(Object::Str(value))) => Some(value.clone()),
            _ => panic!("{:?} is not a string", string),
        }
    }

    fn array_len(&self, array: &MockRef) -> i32 {
        self.bytes(array).len() as i32
    }

    fn pin_bytes(&self, array: &MockRef) -> Option<NonNull<u8>> {
        let copy = self.bytes(array);
        let mut state = self.state.borrow_mut();
        if state.fail_next_pin {
            state.fail_next_pin = false;
            state.pending = Some(("java/lang/OutOfMemoryError".to_string(), "pin".to_string()));
            return None;
        }
        state.pins.push(Pin {
            array: *array,
            copy,
        });
        state.pins.last_mut().map(|pin| {
            NonNull::new(pin.copy.as_mut_ptr()).unwrap_or(NonNull::dangling())
        })
    }

    fn unpin_bytes(&self, array: &MockRef, elements: NonNull<u8>, mode: PinMode) {
        let mut state = self.state.borrow_mut();
        let index = state
            .pins
            .iter_mut()
            .position(|pin| pin.array == *array && pin.copy.as_mut_ptr() == elements.as_ptr())
            .unwrap_or_else(|| panic!("unpin of {:?} that was not pinned", array));
        let pin = state.pins.remove(index);
        state.pin_log.push(mode);
        if mode == PinMode::CopyBack {
            if let Some(Some(Object::Bytes(bytes))) = state.objects.get_mut(array.0) {
                *bytes = pin.copy;
            }
        }
    }
}

/// A mock host with a bridge loaded and every class bound
pub struct Harness {
    pub host: MockHost,
    pub bindings: Arc<Bindings<MockHost>>,
    pub handles: Arc<HandleRegistry>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_handles(Arc::new(HandleRegistry::new()))
    }

    /// A harness sharing `handles` with others, one per thread
    pub fn with_handles(handles: Arc<HandleRegistry>) -> Self {
        let harness = Self::unbound(handles);
        harness
            .bindings
            .on_load(&harness.host)
            .unwrap_or_else(|e| panic!("load failed: {}", e));
        for class in [
            class_names::PARSER_HANDLE,
            class_names::PROGRAM_HANDLE,
            class_names::CONTEXT_HANDLE,
            class_names::KEY_OPTIONS,
            class_names::PROGRAM_OPTIONS,
            class_names::CONTEXT_OPTIONS,
        ] {
            harness.bind(class);
        }
        harness
    }

    /// Nothing loaded or bound
    pub fn unbound(handles: Arc<HandleRegistry>) -> Self {
        Self {
            host: MockHost::new(),
            bindings: Arc::new(Bindings::new()),
            handles,
        }
    }

    /// Run the static initializer of `class`
    pub fn bind(&self, class: &str) {
        let bridge = self.bridge();
        let Some(cls) = self.host.find_class(class) else {
            panic!("class {} is missing", class);
        };
        match class {
            class_names::PARSER_HANDLE => bridge.parser_init(&cls),
            class_names::PROGRAM_HANDLE => bridge.program_init(&cls),
            class_names::CONTEXT_HANDLE => bridge.context_init(&cls),
            class_names::KEY_OPTIONS => bridge.key_options_init(&cls),
            class_names::PROGRAM_OPTIONS => bridge.program_options_init(&cls),
            class_names::CONTEXT_OPTIONS => bridge.context_options_init(&cls),
            other => panic!("{} has no initializer", other),
        }
    }

    pub fn bridge(&self) -> Bridge<'_, MockHost> {
        Bridge::new(&self.host, &self.bindings, &self.handles)
    }

    /// A new `ParserHandle` object, as `new ParserHandle(hint)` would build
    pub fn parser(&self, hint: i32) -> MockRef {
        let token = self.bridge().parser_create(hint);
        assert_ne!(token, 0, "{:?}", self.host.pending_exception());
        self.host.new_parser_handle(token)
    }

    /// Parser with `keywords` added as `(pattern, index)`, all plain UTF-8
    pub fn parser_with(&self, keywords: &[(&str, i32)]) -> MockRef {
        let parser = self.parser(0);
        let options = self.host.new_key_options(false, false);
        let encoding = self.host.new_string("UTF-8");
        for (keyword, index) in keywords {
            let keyword = self.host.new_string(keyword);
            let added = self.bridge().parser_add_keyword(
                &parser,
                Some(&keyword),
                *index,
                Some(&options),
                Some(&encoding),
            );
            assert_eq!(added, 1, "{:?}", self.host.pending_exception());
        }
        parser
    }

    pub fn program(&self, parser: &MockRef, determinize: bool) -> MockRef {
        let options = self.host.new_program_options(determinize);
        self.bridge()
            .parser_create_program(parser, Some(&options))
            .unwrap_or_else(|| panic!("createProgram failed: {:?}", self.host.pending_exception()))
    }

    pub fn context(&self, program: &MockRef) -> MockRef {
        let options = self.host.new_context_options();
        self.bridge()
            .program_create_context(program, Some(&options))
            .unwrap_or_else(|| panic!("createContext failed: {:?}", self.host.pending_exception()))
    }

    /// Search all of `data` at `start_offset`, returning the resume offset
    pub fn search(&self, context: &MockRef, data: &[u8], start_offset: i64, callback: &MockRef) -> i64 {
        let buffer = self.host.new_byte_array(data.to_vec());
        self.bridge().context_search(
            context,
            Some(&buffer),
            0,
            data.len() as i32,
            start_offset,
            Some(callback),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_member_ids_are_detected() {
        let host = MockHost::new();
        let class = host.find_class(class_names::PROGRAM_OPTIONS).unwrap();
        let determinize = host.field_id(&class, "Determinize", "Z").unwrap();
        let before = host.new_program_options(true);
        assert!(host.get_bool(&before, determinize));

        host.reload_class(class_names::PROGRAM_OPTIONS);
        let after = host.new_program_options(true);
        let stale = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            host.get_bool(&after, determinize)
        }));
        assert!(stale.is_err());
    }

    #[test]
    fn test_pins_are_copies() {
        let host = MockHost::new();
        let array = host.new_byte_array(vec![1, 2]);
        let elements = host.pin_bytes(&array).unwrap();
        unsafe { *elements.as_ptr() = 5 };
        assert_eq!(host.bytes(&array), vec![1, 2]);
        host.unpin_bytes(&array, elements, PinMode::CopyBack);
        assert_eq!(host.bytes(&array), vec![5, 2]);
    }
}
