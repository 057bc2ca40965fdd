//! JVM exports for `com.lightboxtechnologies.lightgrep`
//!
//! Every `Java_*` symbol builds a [`JniHost`] for the calling thread and
//! forwards to the matching [`Bridge`] method, which validates, guards and
//! translates failures into Java exceptions.
//!
//! `ContextHandle.search` returns `long` (the resume offset), not `int`.
//! The Java class must declare it that way.

mod host;

pub use host::{FieldId, GlobalClass, JniHost, MethodId};

use crate::api::Bridge;
use crate::config::LogConfig;
use crate::lifecycle::Bindings;
use crate::registry::HandleRegistry;
use ::jni::sys::{
    jbyteArray, jclass, jint, jlong, jobject, jstring, JNIEnv, JavaVM, JNI_ERR, JNI_OK,
    JNI_VERSION_1_6,
};
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::LazyLock;
use tracing::error;

static BINDINGS: LazyLock<Bindings<JniHost>> = LazyLock::new(Bindings::new);
static HANDLES: LazyLock<HandleRegistry> = LazyLock::new(HandleRegistry::new);

fn with_bridge<T>(env: *mut JNIEnv, f: impl FnOnce(&Bridge<'_, JniHost>) -> T) -> T {
    // SAFETY: env is the one the VM passed to the calling native method
    let host = unsafe { JniHost::new(env) };
    f(&Bridge::new(&host, &BINDINGS, &HANDLES))
}

fn nullable(object: &jobject) -> Option<&jobject> {
    (!object.is_null()).then_some(object)
}

fn or_null(object: Option<jobject>) -> jobject {
    object.unwrap_or(ptr::null_mut())
}

/// The current thread's environment, if the VM can provide one
unsafe fn vm_env(vm: *mut JavaVM) -> Option<*mut JNIEnv> {
    if vm.is_null() {
        return None;
    }
    let get_env = (**vm).GetEnv?;
    let mut env: *mut c_void = ptr::null_mut();
    (get_env(vm, &mut env, JNI_VERSION_1_6) == JNI_OK && !env.is_null()).then_some(env as *mut JNIEnv)
}

#[no_mangle]
pub unsafe extern "system" fn JNI_OnLoad(vm: *mut JavaVM, _reserved: *mut c_void) -> jint {
    LogConfig::from_env().install();
    let Some(env) = vm_env(vm) else {
        error!("JNI_OnLoad: no JNIEnv for JNI 1.6");
        return JNI_ERR;
    };
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| with_bridge(env, |bridge| bridge.on_load())));
    match loaded {
        Ok(Ok(())) => JNI_VERSION_1_6,
        Ok(Err(err)) => {
            error!(error = %err, "JNI_OnLoad failed");
            JNI_ERR
        }
        Err(_) => {
            error!("JNI_OnLoad panicked");
            JNI_ERR
        }
    }
}

#[no_mangle]
pub unsafe extern "system" fn JNI_OnUnload(vm: *mut JavaVM, _reserved: *mut c_void) {
    let env = vm_env(vm);
    let _ = panic::catch_unwind(AssertUnwindSafe(|| match env {
        Some(env) => {
            let host = JniHost::new(env);
            BINDINGS.on_unload(Some(&host));
        }
        None => BINDINGS.on_unload(None),
    }));
}

// ParserHandle

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ParserHandle_init(env: *mut JNIEnv, class: jclass) {
    with_bridge(env, |bridge| bridge.parser_init(&class))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ParserHandle_create(
    env: *mut JNIEnv,
    _class: jclass,
    num_fsm_state_size_hint: jint,
) -> jlong {
    with_bridge(env, |bridge| bridge.parser_create(num_fsm_state_size_hint))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ParserHandle_destroy(env: *mut JNIEnv, this: jobject) {
    with_bridge(env, |bridge| bridge.parser_destroy(&this))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ParserHandle_addKeyword(
    env: *mut JNIEnv,
    this: jobject,
    keyword: jstring,
    key_index: jint,
    options: jobject,
    encoding: jstring,
) -> jint {
    with_bridge(env, |bridge| {
        bridge.parser_add_keyword(
            &this,
            nullable(&keyword),
            key_index,
            nullable(&options),
            nullable(&encoding),
        )
    })
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ParserHandle_createProgram(
    env: *mut JNIEnv,
    this: jobject,
    options: jobject,
) -> jobject {
    with_bridge(env, |bridge| {
        or_null(bridge.parser_create_program(&this, nullable(&options)))
    })
}

// ProgramHandle

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramHandle_init(env: *mut JNIEnv, class: jclass) {
    with_bridge(env, |bridge| bridge.program_init(&class))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramHandle_destroy(env: *mut JNIEnv, this: jobject) {
    with_bridge(env, |bridge| bridge.program_destroy(&this))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramHandle_size(env: *mut JNIEnv, this: jobject) -> jint {
    with_bridge(env, |bridge| bridge.program_size(&this))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramHandle_write(
    env: *mut JNIEnv,
    this: jobject,
    buffer: jbyteArray,
    offset: jint,
) {
    with_bridge(env, |bridge| bridge.program_write(&this, nullable(&buffer), offset))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramHandle_read(
    env: *mut JNIEnv,
    _class: jclass,
    buffer: jbyteArray,
    offset: jint,
    size: jint,
) -> jobject {
    with_bridge(env, |bridge| or_null(bridge.program_read(nullable(&buffer), offset, size)))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramHandle_createContext(
    env: *mut JNIEnv,
    this: jobject,
    options: jobject,
) -> jobject {
    with_bridge(env, |bridge| {
        or_null(bridge.program_create_context(&this, nullable(&options)))
    })
}

// ContextHandle

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextHandle_init(env: *mut JNIEnv, class: jclass) {
    with_bridge(env, |bridge| bridge.context_init(&class))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextHandle_destroy(env: *mut JNIEnv, this: jobject) {
    with_bridge(env, |bridge| bridge.context_destroy(&this))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextHandle_reset(env: *mut JNIEnv, this: jobject) {
    with_bridge(env, |bridge| bridge.context_reset(&this))
}

/// `native long search(byte[], int, int, long, HitCallback)`
///
/// Returns the 64-bit resume offset. Older bindings declared this method as
/// returning `int`; the Java `ContextHandle` declaration must say `long` or
/// the VM will not link it.
#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextHandle_search(
    env: *mut JNIEnv,
    this: jobject,
    buffer: jbyteArray,
    offset: jint,
    size: jint,
    start_offset: jlong,
    callback: jobject,
) -> jlong {
    with_bridge(env, |bridge| {
        bridge.context_search(
            &this,
            nullable(&buffer),
            offset,
            size,
            start_offset,
            nullable(&callback),
        )
    })
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextHandle_closeoutSearch(
    env: *mut JNIEnv,
    this: jobject,
    callback: jobject,
) {
    with_bridge(env, |bridge| bridge.context_closeout_search(&this, nullable(&callback)))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextHandle_startsWith(
    env: *mut JNIEnv,
    this: jobject,
    buffer: jbyteArray,
    offset: jint,
    size: jint,
    start_offset: jlong,
    callback: jobject,
) {
    with_bridge(env, |bridge| {
        bridge.context_starts_with(
            &this,
            nullable(&buffer),
            offset,
            size,
            start_offset,
            nullable(&callback),
        )
    })
}

// Options

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_KeyOptions_init(env: *mut JNIEnv, class: jclass) {
    with_bridge(env, |bridge| bridge.key_options_init(&class))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ProgramOptions_init(env: *mut JNIEnv, class: jclass) {
    with_bridge(env, |bridge| bridge.program_options_init(&class))
}

#[no_mangle]
pub extern "system" fn Java_com_lightboxtechnologies_lightgrep_ContextOptions_init(env: *mut JNIEnv, class: jclass) {
    with_bridge(env, |bridge| bridge.context_options_init(&class))
}
