// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! C entry points loaded by the Fluent Bit plugin proxy.
//!
//! The host calls, in order:
//!
//! 1. `FLBPluginRegister` once when the shared object is loaded
//! 2. `FLBPluginInit` once per configured `[OUTPUT]` section
//! 3. `FLBPluginFlushCtx` for every chunk routed to that instance
//! 4. `FLBPluginExitCtx` per instance, then `FLBPluginExit` on shutdown
//!
//! Every entry point catches panics so that none unwinds into the host.
//! A session pointer is only ever used by one host thread at a time.

use std::any::Any;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use tracing::{error, info};

use crate::config::ConfigSource;
use crate::logger;
use crate::plugin::{FlushStatus, OutputPlugin, SqsOutput};

pub const FLB_ERROR: c_int = 0;
pub const FLB_OK: c_int = 1;
pub const FLB_RETRY: c_int = 2;

pub const FLB_PROXY_OUTPUT_PLUGIN: c_int = 2;
pub const FLB_PROXY_GOLANG: c_int = 11;

/// Plugin definition filled in at registration.
#[repr(C)]
#[derive(Debug)]
pub struct FlbPluginProxyDef {
    pub plugin_type: c_int,
    pub proto_version: c_int,
    pub flags: c_int,
    pub name: *mut c_char,
    pub description: *mut c_char,
}

/// Host callbacks. Only the leading member is used.
#[repr(C)]
pub struct FlbApi {
    pub output_get_property:
        Option<unsafe extern "C" fn(key: *mut c_char, instance: *mut c_void) -> *mut c_char>,
}

#[repr(C)]
pub struct FlbPluginProxyContext {
    pub remote_context: *mut c_void,
}

/// What `FLBPluginInit` receives.
#[repr(C)]
pub struct FlbOutputPlugin {
    pub reserved: *mut c_void,
    pub api: *mut FlbApi,
    pub o_ins: *mut c_void,
    pub context: *mut FlbPluginProxyContext,
}

/// Properties of one output instance, looked up through the host API.
pub struct HostProperties {
    api: *const FlbApi,
    instance: *mut c_void,
}

impl ConfigSource for HostProperties {
    fn get(&self, key: &str) -> Option<String> {
        if self.api.is_null() {
            return None;
        }
        // SAFETY: `api` is the host's callback table for the lifetime of init
        let get_property = unsafe { (*self.api).output_get_property }?;
        let key = CString::new(key).ok()?;
        // SAFETY: the host returns NULL or a NUL-terminated string it owns
        unsafe {
            let value = get_property(key.as_ptr().cast_mut(), self.instance);
            cstr_to_string(value)
        }
    }
}

/// Copies a host string, NULL meaning "not set".
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown cause".to_string()
    }
}

fn guarded(operation: &str, f: impl FnOnce() -> c_int) -> c_int {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(code) => code,
        Err(payload) => {
            error!("Panic during {operation}: {}", panic_message(payload.as_ref()));
            FLB_ERROR
        }
    }
}

/// # Safety
///
/// `def` must be NULL or point to a writable `FlbPluginProxyDef`. The name
/// and description strings written into it are never freed.
#[no_mangle]
pub unsafe extern "C" fn FLBPluginRegister(def: *mut c_void) -> c_int {
    guarded("register", || {
        logger::init();
        let def = def.cast::<FlbPluginProxyDef>();
        if def.is_null() {
            error!("Plugin definition is NULL");
            return FLB_ERROR;
        }
        let registration = <SqsOutput as OutputPlugin>::register();
        let (Ok(name), Ok(description)) = (
            CString::new(registration.name),
            CString::new(registration.description),
        ) else {
            return FLB_ERROR;
        };
        (*def).plugin_type = FLB_PROXY_OUTPUT_PLUGIN;
        (*def).proto_version = FLB_PROXY_GOLANG;
        (*def).flags = 0;
        (*def).name = name.into_raw();
        (*def).description = description.into_raw();
        FLB_OK
    })
}

/// # Safety
///
/// `plugin` must be NULL or point to the host's `flbgo_output_plugin` for
/// the instance being initialized.
#[no_mangle]
pub unsafe extern "C" fn FLBPluginInit(plugin: *mut c_void) -> c_int {
    guarded("init", || {
        let plugin = plugin.cast::<FlbOutputPlugin>();
        if plugin.is_null() || (*plugin).context.is_null() {
            error!("Plugin instance is NULL");
            return FLB_ERROR;
        }
        let properties = HostProperties {
            api: (*plugin).api,
            instance: (*plugin).o_ins,
        };
        match <SqsOutput as OutputPlugin>::init(&properties) {
            Ok(output) => {
                (*(*plugin).context).remote_context = Box::into_raw(Box::new(output)).cast();
                FLB_OK
            }
            Err(e) => {
                error!("{e}");
                FLB_ERROR
            }
        }
    })
}

/// # Safety
///
/// `ctx` must be NULL or a context stored by `FLBPluginInit` and not yet
/// passed to `FLBPluginExitCtx`. `data` must hold `length` readable bytes and
/// `tag` must be NULL or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn FLBPluginFlushCtx(
    ctx: *mut c_void,
    data: *const c_void,
    length: c_int,
    tag: *const c_char,
) -> c_int {
    guarded("flush", || {
        let output = ctx.cast::<SqsOutput>();
        if output.is_null() {
            error!("No context found for flush");
            return FLB_ERROR;
        }
        let data: &[u8] = match usize::try_from(length) {
            Ok(len) if len > 0 && !data.is_null() => slice::from_raw_parts(data.cast::<u8>(), len),
            _ => &[],
        };
        let tag = cstr_to_string(tag).unwrap_or_default();
        let status: FlushStatus = (*output).flush(data, &tag);
        status.code()
    })
}

/// # Safety
///
/// `ctx` must be NULL or a context stored by `FLBPluginInit`; it must not be
/// used again afterwards.
#[no_mangle]
pub unsafe extern "C" fn FLBPluginExitCtx(ctx: *mut c_void) -> c_int {
    guarded("exit", || {
        let output = ctx.cast::<SqsOutput>();
        if !output.is_null() {
            Box::from_raw(output).exit();
        }
        FLB_OK
    })
}

#[no_mangle]
pub extern "C" fn FLBPluginExit() -> c_int {
    info!("Plugin unloaded");
    FLB_OK
}

/// Empty definition to hand to `FLBPluginRegister`.
impl Default for FlbPluginProxyDef {
    fn default() -> Self {
        FlbPluginProxyDef {
            plugin_type: 0,
            proto_version: 0,
            flags: 0,
            name: ptr::null_mut(),
            description: ptr::null_mut(),
        }
    }
}
