//! [`HostEnv`] over a raw `JNIEnv`

use crate::host::{HostEnv, HostValue, PinMode};
use ::jni::sys::{
    jboolean, jbyte, jchar, jclass, jfieldID, jint, jmethodID, jobject, jvalue, JNIEnv, JNI_ABORT,
};
use std::ffi::CString;
use std::ptr::{self, NonNull};

/// Call a JNI function through the environment's function table
///
/// A missing table entry means a broken VM; there is no way to report it.
macro_rules! jni_call {
    ($env:expr, $name:ident $(, $arg:expr)* $(,)?) => {{
        let env: *mut JNIEnv = $env;
        match (**env).$name {
            Some(f) => f(env $(, $arg)*),
            None => std::process::abort(),
        }
    }};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldId(jfieldID);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodId(jmethodID);

/// Global class reference
#[derive(Debug)]
pub struct GlobalClass(jclass);

// SAFETY: field IDs, method IDs and global references are valid on every
// thread attached to the VM.
unsafe impl Send for FieldId {}
unsafe impl Sync for FieldId {}
unsafe impl Send for MethodId {}
unsafe impl Sync for MethodId {}
unsafe impl Send for GlobalClass {}
unsafe impl Sync for GlobalClass {}

fn c_string(value: &str) -> CString {
    CString::new(value.replace('\0', "")).unwrap_or_default()
}

fn jvalue_of(value: &HostValue) -> jvalue {
    match *value {
        HostValue::Long(j) => jvalue { j },
        HostValue::Int(i) => jvalue { i },
    }
}

/// One attached thread's JNI environment, valid for one native call
pub struct JniHost {
    env: *mut JNIEnv,
}

impl JniHost {
    /// # Safety
    /// `env` must be the environment the VM passed to the current native call.
    pub unsafe fn new(env: *mut JNIEnv) -> Self {
        Self { env }
    }
}

impl HostEnv for JniHost {
    type Object = jobject;
    type Class = jclass;
    type GlobalClass = GlobalClass;
    type FieldId = FieldId;
    type MethodId = MethodId;

    fn exception_pending(&self) -> bool {
        let pending: jboolean = unsafe { jni_call!(self.env, ExceptionCheck) };
        pending != 0
    }

    fn find_class(&self, name: &str) -> Option<jclass> {
        let name = c_string(name);
        let class = unsafe { jni_call!(self.env, FindClass, name.as_ptr()) };
        (!class.is_null()).then_some(class)
    }

    fn throw_new(&self, class: &jclass, message: &str) -> bool {
        let message = c_string(message);
        let status: jint = unsafe { jni_call!(self.env, ThrowNew, *class, message.as_ptr()) };
        status == 0
    }

    #[allow(unreachable_code)]
    fn fatal_error(&self, message: &str) -> ! {
        let message = c_string(message);
        unsafe { jni_call!(self.env, FatalError, message.as_ptr()) };
        std::process::abort()
    }

    fn pin_class(&self, class: &jclass) -> Option<GlobalClass> {
        let global = unsafe { jni_call!(self.env, NewGlobalRef, *class) };
        (!global.is_null()).then_some(GlobalClass(global))
    }

    fn unpin_class(&self, class: GlobalClass) {
        unsafe { jni_call!(self.env, DeleteGlobalRef, class.0) }
    }

    fn global_as_class(&self, class: &GlobalClass) -> jclass {
        class.0
    }

    fn field_id(&self, class: &jclass, name: &str, signature: &str) -> Option<FieldId> {
        let (name, signature) = (c_string(name), c_string(signature));
        let id = unsafe { jni_call!(self.env, GetFieldID, *class, name.as_ptr(), signature.as_ptr()) };
        (!id.is_null()).then_some(FieldId(id))
    }

    fn method_id(&self, class: &jclass, name: &str, signature: &str) -> Option<MethodId> {
        let (name, signature) = (c_string(name), c_string(signature));
        let id =
            unsafe { jni_call!(self.env, GetMethodID, *class, name.as_ptr(), signature.as_ptr()) };
        (!id.is_null()).then_some(MethodId(id))
    }

    fn get_long(&self, object: &jobject, field: FieldId) -> i64 {
        unsafe { jni_call!(self.env, GetLongField, *object, field.0) }
    }

    fn set_long(&self, object: &jobject, field: FieldId, value: i64) {
        unsafe { jni_call!(self.env, SetLongField, *object, field.0, value) }
    }

    fn get_bool(&self, object: &jobject, field: FieldId) -> bool {
        let value: jboolean = unsafe { jni_call!(self.env, GetBooleanField, *object, field.0) };
        value != 0
    }

    fn new_object(&self, class: &jclass, ctor: MethodId, args: &[HostValue]) -> Option<jobject> {
        let args: Vec<jvalue> = args.iter().map(jvalue_of).collect();
        let object = unsafe { jni_call!(self.env, NewObjectA, *class, ctor.0, args.as_ptr()) };
        (!object.is_null()).then_some(object)
    }

    fn call_void(&self, object: &jobject, method: MethodId, arg: &jobject) {
        let args = [jvalue { l: *arg }];
        unsafe { jni_call!(self.env, CallVoidMethodA, *object, method.0, args.as_ptr()) }
    }

    fn delete_local(&self, object: jobject) {
        unsafe { jni_call!(self.env, DeleteLocalRef, object) }
    }

    fn string_utf16(&self, string: &jobject) -> Option<Vec<u16>> {
        let len: jint = unsafe { jni_call!(self.env, GetStringLength, *string) };
        let mut units: Vec<jchar> = vec![0; len.max(0) as usize];
        unsafe { jni_call!(self.env, GetStringRegion, *string, 0, len, units.as_mut_ptr()) };
        if self.exception_pending() {
            return None;
        }
        Some(units)
    }

    fn array_len(&self, array: &jobject) -> i32 {
        unsafe { jni_call!(self.env, GetArrayLength, *array) }
    }

    fn pin_bytes(&self, array: &jobject) -> Option<NonNull<u8>> {
        let elements: *mut jbyte =
            unsafe { jni_call!(self.env, GetByteArrayElements, *array, ptr::null_mut()) };
        match NonNull::new(elements as *mut u8) {
            Some(elements) => Some(elements),
            // some VMs hand out no buffer for an empty array
            None if !self.exception_pending() && self.array_len(array) == 0 => {
                Some(NonNull::dangling())
            }
            None => None,
        }
    }

    fn unpin_bytes(&self, array: &jobject, elements: NonNull<u8>, mode: PinMode) {
        if elements == NonNull::dangling() {
            return;
        }
        let mode = match mode {
            PinMode::CopyBack => 0,
            PinMode::Discard => JNI_ABORT,
        };
        unsafe {
            jni_call!(
                self.env,
                ReleaseByteArrayElements,
                *array,
                elements.as_ptr() as *mut jbyte,
                mode,
            )
        }
    }
}
