//! Render host contract.
//!
//! The relay drives an embedded, single-threaded web engine it cannot
//! control directly. All it needs is the ability to expose named callbacks
//! to host-side code, install code that runs at startup, and submit code
//! that runs "at some point" with no return channel.
//!
//! `MemoryHost` implements the contract in memory for headless use and tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::HostError;
use crate::types::Value;

/// Callback invocable from host-side code. Arguments arrive as JSON values.
pub type HostCallback = Rc<dyn Fn(&[Value])>;

/// Opaque, fire-and-forget render engine.
pub trait RenderHost {
    /// Expose `callback` to host code under `name`.
    fn bind(&self, name: &str, callback: HostCallback) -> Result<(), HostError>;

    /// Run `code` once when the host starts.
    fn init(&self, code: &str) -> Result<(), HostError>;

    /// Submit `code` for asynchronous execution. Nothing comes back.
    fn eval(&self, code: &str) -> Result<(), HostError>;
}

// =============================================================================
// MemoryHost
// =============================================================================

/// In-memory render host.
///
/// Records everything submitted to it. Host-side activity (a heartbeat
/// interval firing, a script reporting its result) is simulated by calling
/// [`MemoryHost::invoke`] with a bound name.
#[derive(Default)]
pub struct MemoryHost {
    bindings: RefCell<HashMap<String, HostCallback>>,
    init_scripts: RefCell<Vec<String>>,
    evals: RefCell<Vec<String>>,
    closed: Cell<bool>,
}

impl MemoryHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Call a bound callback as host code would. Returns false if nothing
    /// is bound under `name`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> bool {
        // Clone out so the callback may bind or eval re-entrantly
        let callback = self.bindings.borrow().get(name).cloned();
        match callback {
            Some(callback) => {
                callback(args);
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    pub fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.borrow().clone()
    }

    /// Every eval submitted so far, in order.
    pub fn evals(&self) -> Vec<String> {
        self.evals.borrow().clone()
    }

    pub fn eval_count(&self) -> usize {
        self.evals.borrow().len()
    }

    /// Drain the eval log.
    pub fn take_evals(&self) -> Vec<String> {
        std::mem::take(&mut *self.evals.borrow_mut())
    }

    /// Make every further operation fail with `HostError::Closed`.
    pub fn close(&self) {
        self.closed.set(true);
    }

    fn check_open(&self) -> Result<(), HostError> {
        if self.closed.get() {
            Err(HostError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RenderHost for MemoryHost {
    fn bind(&self, name: &str, callback: HostCallback) -> Result<(), HostError> {
        self.check_open()?;
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(name) {
            return Err(HostError::Binding(name.to_string()));
        }
        bindings.insert(name.to_string(), callback);
        Ok(())
    }

    fn init(&self, code: &str) -> Result<(), HostError> {
        self.check_open()?;
        self.init_scripts.borrow_mut().push(code.to_string());
        Ok(())
    }

    fn eval(&self, code: &str) -> Result<(), HostError> {
        self.check_open()?;
        self.evals.borrow_mut().push(code.to_string());
        Ok(())
    }
}
