//! Ephemeral, addressable module texts.
//!
//! Every compiled script is stored in the pool under an opaque address that
//! importers embed into their own rewritten text. Revoking an address while
//! any compilation is in flight could pull a module out from under a sibling
//! that is still embedding it, so revocations are queued until the last
//! [`CompilationGuard`] is dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};
use ulid::Ulid;

pub const ADDRESS_SCHEME: &str = "blob:netscript/";

#[derive(Debug, Default)]
struct PoolState {
    /// `None` while reserved but not yet filled.
    resources: HashMap<Rc<str>, Option<Rc<str>>>,
    active: usize,
    pending: Vec<Rc<str>>,
}

#[derive(Debug, Default)]
pub struct ResourcePool {
    state: RefCell<PoolState>,
}

impl ResourcePool {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Allocate a fresh address with no content yet.
    pub fn reserve(&self) -> Rc<str> {
        let address: Rc<str> = format!("{ADDRESS_SCHEME}{}", Ulid::new()).into();
        self.state
            .borrow_mut()
            .resources
            .insert(address.clone(), None);
        trace!(%address, "reserved module address");
        address
    }

    pub fn fill(&self, address: &str, text: String) {
        if let Some(slot) = self.state.borrow_mut().resources.get_mut(address) {
            *slot = Some(text.into());
        }
    }

    /// Reserve and fill in one step.
    pub fn create(&self, text: String) -> Rc<str> {
        let address = self.reserve();
        self.fill(&address, text);
        address
    }

    pub fn get(&self, address: &str) -> Option<Rc<str>> {
        self.state
            .borrow()
            .resources
            .get(address)
            .and_then(|slot| slot.clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.state.borrow().resources.contains_key(address)
    }

    /// Number of live (reserved or filled) addresses.
    pub fn len(&self) -> usize {
        self.state.borrow().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_compilations(&self) -> usize {
        self.state.borrow().active
    }

    pub fn pending_revocations(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Dispose of an address, or queue it while compilations are running.
    pub fn revoke(&self, address: &str) {
        let mut state = self.state.borrow_mut();
        let Some((key, _)) = state.resources.get_key_value(address) else {
            return;
        };
        let key = key.clone();
        if state.active > 0 {
            if !state.pending.contains(&key) {
                trace!(address = %key, "deferring revocation");
                state.pending.push(key);
            }
        } else {
            state.resources.remove(&key);
            trace!(address = %key, "revoked module address");
        }
    }

    /// Mark a compilation as in flight until the returned guard is dropped.
    pub fn begin_compilation(self: &Rc<Self>) -> CompilationGuard {
        self.state.borrow_mut().active += 1;
        CompilationGuard {
            pool: Rc::clone(self),
        }
    }

    fn end_compilation(&self) {
        let mut state = self.state.borrow_mut();
        state.active = state.active.saturating_sub(1);
        if state.active == 0 && !state.pending.is_empty() {
            let pending = std::mem::take(&mut state.pending);
            debug!(count = pending.len(), "flushing deferred revocations");
            for address in pending {
                state.resources.remove(&address);
            }
        }
    }
}

/// Keeps the pool's active-compilation count raised while alive.
#[derive(Debug)]
pub struct CompilationGuard {
    pool: Rc<ResourcePool>,
}

impl Drop for CompilationGuard {
    fn drop(&mut self) {
        self.pool.end_compilation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_then_fill() {
        let pool = ResourcePool::new();
        let address = pool.reserve();
        assert!(address.starts_with(ADDRESS_SCHEME));
        assert!(pool.contains(&address));
        assert_eq!(pool.get(&address), None);

        pool.fill(&address, "export const a = 1;".into());
        assert_eq!(pool.get(&address).as_deref(), Some("export const a = 1;"));
        assert_ne!(pool.reserve(), address);
    }

    #[test]
    fn test_revoke_is_deferred_while_compiling() {
        let pool = ResourcePool::new();
        let address = pool.create("a".into());

        let outer = pool.begin_compilation();
        let inner = pool.begin_compilation();
        assert_eq!(pool.active_compilations(), 2);

        pool.revoke(&address);
        pool.revoke(&address);
        assert!(pool.contains(&address));
        assert_eq!(pool.pending_revocations(), 1);

        drop(inner);
        assert!(pool.contains(&address));
        drop(outer);
        assert!(!pool.contains(&address));
        assert_eq!(pool.pending_revocations(), 0);
        assert_eq!(pool.active_compilations(), 0);
    }

    #[test]
    fn test_revoke_without_compilation_is_immediate() {
        let pool = ResourcePool::new();
        let address = pool.create("a".into());
        pool.revoke(&address);
        assert!(pool.is_empty());
        pool.revoke(&address);
        pool.revoke("blob:netscript/unknown");
    }
}
