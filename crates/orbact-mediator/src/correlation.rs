//! Sub-request correlation.
//!
//! When the mediator issues a call of its own (a re-issued invocation, or
//! one leg of a locate broadcast) it records which original client request
//! the sub-request serves. Several entries may serve the same original
//! request, one per broadcast leg; removing the last one, or a positive
//! broadcast reply, terminates the original request. The map's lock is a
//! leaf: it is never held while any other lock is acquired.

use std::collections::HashMap;
use std::sync::Mutex;

use orbact_common::{RequestId, SubRequestId};

#[derive(Default)]
pub struct CorrelationMap {
    inner: Mutex<HashMap<SubRequestId, RequestId>>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sub: SubRequestId, id: RequestId) {
        self.inner
            .lock()
            .expect("correlation lock poisoned")
            .insert(sub, id);
    }

    /// Remove one entry, returning the request it served.
    pub fn remove(&self, sub: SubRequestId) -> Option<RequestId> {
        self.inner
            .lock()
            .expect("correlation lock poisoned")
            .remove(&sub)
    }

    /// Remove every entry serving `id`, returning the removed sub-request
    /// ids.
    pub fn remove_all_for(&self, id: RequestId) -> Vec<SubRequestId> {
        let mut map = self.inner.lock().expect("correlation lock poisoned");
        let subs: Vec<SubRequestId> = map
            .iter()
            .filter(|(_, served)| **served == id)
            .map(|(sub, _)| *sub)
            .collect();
        for sub in &subs {
            map.remove(sub);
        }
        subs
    }

    /// Whether any in-flight sub-request still serves `id`.
    pub fn has_any_for(&self, id: RequestId) -> bool {
        self.inner
            .lock()
            .expect("correlation lock poisoned")
            .values()
            .any(|served| *served == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("correlation lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let map = CorrelationMap::new();
        map.insert(SubRequestId(10), RequestId(1));
        assert_eq!(map.remove(SubRequestId(10)), Some(RequestId(1)));
        assert_eq!(map.remove(SubRequestId(10)), None);
    }

    #[test]
    fn test_one_to_many_legs() {
        let map = CorrelationMap::new();
        map.insert(SubRequestId(10), RequestId(1));
        map.insert(SubRequestId(11), RequestId(1));
        map.insert(SubRequestId(12), RequestId(2));

        assert!(map.has_any_for(RequestId(1)));
        let mut removed = map.remove_all_for(RequestId(1));
        removed.sort_by_key(|s| s.0);
        assert_eq!(removed, vec![SubRequestId(10), SubRequestId(11)]);
        assert!(!map.has_any_for(RequestId(1)));
        assert!(map.has_any_for(RequestId(2)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove_all_for_unknown_is_empty() {
        let map = CorrelationMap::new();
        assert!(map.remove_all_for(RequestId(9)).is_empty());
    }
}
