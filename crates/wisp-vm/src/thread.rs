//! Thread VM (spec component Q, §4.9): one OS thread per spawned task,
//! each running its own fully independent [`Interp`] over the shared
//! [`Global`]. Values cross the OS-thread boundary through `Arc`'s
//! atomic refcounting; nothing here synchronizes a value's *interior*
//! any further than `wisp_vm::value` already does (spec §4.9:
//! "mutation... is not synchronized by the runtime — scripts coordinate
//! via explicit mutex types").
//!
//! No cooperative scheduler, no async/await (spec §4.9 "Scheduling"):
//! a spawned task is a plain `std::thread::spawn`, and `join` is a
//! blocking `JoinHandle::join`.

use std::sync::Arc;

use parking_lot::Mutex;
use wisp_core::Loc;

use crate::error::{Failure, VmError, VmResult};
use crate::interp::Interp;
use crate::value::object::{CallArgs, ThreadObj};
use crate::value::{Value, ValueData};
use crate::Global;

/// Packages `callee` + the already-`copy`'d `args` into a task (spec
/// §4.9: "package a callable + captured args, construct a packaged task
/// returning a `Value`"), spawns an OS thread running a fresh `Interp`
/// over a cloned `Arc<Global>`, and returns the thread value.
pub fn spawn(global: &Arc<Global>, callee: Value, args: Vec<Value>, loc: Loc) -> VmResult<Value> {
    let global = global.clone();
    let id = global.next_thread_id();
    #[cfg(feature = "trace")]
    tracing::debug!(thread_id = id, argc = args.len(), "spawning wisp thread");
    let handle = std::thread::Builder::new()
        .name(format!("wisp-thread-{id}"))
        .spawn(move || {
            #[cfg(feature = "trace")]
            let _span = tracing::debug_span!("wisp_thread", thread_id = id).entered();
            let mut interp = Interp::new(global);
            let mut positional = Vec::with_capacity(args.len() + 1);
            positional.push(Value::nil());
            positional.extend(args);
            let call_args = CallArgs { positional, keyword: Default::default() };
            interp.do_call(&callee, call_args, loc)
        })
        .map_err(|e| Failure::new(VmError::Thread(format!("failed to spawn thread: {e}")), loc))?;
    Ok(Value::thread(ThreadObj { id, handle: Mutex::new(Some(handle)) }))
}

/// `Thread.join()` (spec §4.9: "Joining waits on the future and returns
/// the value"). A subthread failure or panic surfaces as `ThreadError`
/// on the joining thread, matching spec §7's `ThreadError` kind.
pub fn join(recv: &Value, loc: Loc) -> VmResult<Value> {
    let ValueData::Thread(t) = recv.data() else {
        return Err(Failure::new(VmError::RuntimeType("join() is only defined on thread".into()), loc));
    };
    let handle = t.handle.lock().take().ok_or_else(|| Failure::new(VmError::Thread("thread already joined".into()), loc))?;
    #[cfg(feature = "trace")]
    tracing::debug!(thread_id = t.id, "joining wisp thread");
    match handle.join() {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(failure)) => Err(Failure::new(VmError::Thread(format!("subthread failed: {}", failure.message())), loc)),
        Err(_) => Err(Failure::new(VmError::Thread("subthread panicked".into()), loc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builtins, module::BuiltinFinder, typetable::TypeTable, VmOptions};
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicBool, AtomicI32};

    fn global() -> Arc<Global> {
        let g = Arc::new(Global {
            modules: crate::module::ModuleRegistry::new(),
            types: TypeTable::new(),
            globals: PlMutex::new(crate::util::OrderedMap::new()),
            natives: crate::native::NativeLoader::new(),
            recursion_limit: VmOptions::default().recursion_limit,
            stop: AtomicBool::new(false),
            exit_code: PlMutex::new(None),
            next_thread_id: AtomicI32::new(1),
        });
        g.modules.add_finder(Box::new(BuiltinFinder { install_lib_dir: None }));
        builtins::install(&g);
        g
    }

    #[test]
    fn spawn_and_join_roundtrip() {
        let g = global();
        let double = g.globals.lock().get("vec").cloned();
        assert!(double.is_some());
        let add_one = crate::native::native_fn("add_one", 1..=1, |_, call: CallArgs, loc| {
            let ValueData::Int(i) = call.args()[0].data() else {
                return Err(Failure::new(VmError::RuntimeType("expected int".into()), loc));
            };
            Ok(Value::int(i + 1))
        });
        let t = spawn(&g, add_one, vec![Value::int(41)], Loc::synthetic()).unwrap();
        let result = join(&t, Loc::synthetic()).unwrap();
        assert_eq!(format!("{result}"), "42");
    }

    #[test]
    fn joining_twice_fails_cleanly() {
        let g = global();
        let noop = crate::native::native_fn("noop", 0..=0, |_, _: CallArgs, _| Ok(Value::nil()));
        let t = spawn(&g, noop, vec![], Loc::synthetic()).unwrap();
        join(&t, Loc::synthetic()).unwrap();
        let err = join(&t, Loc::synthetic()).unwrap_err();
        assert!(matches!(err.kind, VmError::Thread(_)));
    }
}
