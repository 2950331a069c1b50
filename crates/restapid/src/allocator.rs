//! VNET identifier allocator.
//!
//! Binds operator-chosen VNET names to small reusable integer IDs (the `<id>`
//! of the `Vnet<id>` store key) and keeps the VNI to name mapping used for
//! duplicate-VNI detection. IDs start at 1 and are always handed out
//! lowest-free-first.

use std::collections::HashMap;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    id: u32,
    vni: u32,
}

/// Bitmap allocator with a lowest-free cursor.
///
/// The allocator does not reject a second `allocate` for the same name;
/// callers check [`IdAllocator::lookup`] first.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    /// `used[i]` tracks id `i + 1`.
    used: Vec<bool>,
    /// Lowest id known to be free.
    next: u32,
    by_name: HashMap<String, Binding>,
    by_vni: HashMap<u32, String>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            used: Vec::new(),
            next: 1,
            by_name: HashMap::new(),
            by_vni: HashMap::new(),
        }
    }

    fn is_used(&self, id: u32) -> bool {
        self.used.get(id as usize - 1).copied().unwrap_or(false)
    }

    fn mark(&mut self, id: u32, used: bool) {
        let idx = id as usize - 1;
        if idx >= self.used.len() {
            self.used.resize(idx + 1, false);
        }
        self.used[idx] = used;
    }

    fn first_free_from(&self, start: u32) -> u32 {
        let mut id = start;
        while self.is_used(id) {
            id += 1;
        }
        id
    }

    /// Assigns the lowest free id to `name` and binds `vni` to it.
    pub fn allocate(&mut self, name: &str, vni: u32) -> u32 {
        let id = self.next;
        self.mark(id, true);
        self.by_name.insert(name.to_string(), Binding { id, vni });
        self.by_vni.insert(vni, name.to_string());
        self.next = self.first_free_from(id + 1);
        debug!(name, id, vni, next = self.next, "Allocated VNET id");
        id
    }

    /// Frees the id bound to `name`. Returns the released id.
    pub fn release(&mut self, name: &str) -> Option<u32> {
        let binding = self.by_name.remove(name)?;
        if self.by_vni.get(&binding.vni).map(String::as_str) == Some(name) {
            self.by_vni.remove(&binding.vni);
        }
        self.mark(binding.id, false);
        if binding.id < self.next {
            self.next = binding.id;
        }
        debug!(name, id = binding.id, next = self.next, "Released VNET id");
        Some(binding.id)
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|b| b.id)
    }

    /// Name the VNI is bound to, if any.
    pub fn reverse_lookup(&self, vni: u32) -> Option<&str> {
        self.by_vni.get(&vni).map(String::as_str)
    }

    /// Replaces the whole state with `(id, name, vni)` entries read from
    /// the store.
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (u32, String, u32)>,
    {
        *self = Self::new();
        for (id, name, vni) in entries {
            if id == 0 {
                continue;
            }
            self.mark(id, true);
            self.by_vni.insert(vni, name.clone());
            self.by_name.insert(name, Binding { id, vni });
        }
        self.next = self.first_free_from(1);
        debug!(count = self.by_name.len(), next = self.next, "Rebuilt VNET id map");
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sequential_allocation() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.allocate("Vnet-A", 5000), 1);
        assert_eq!(alloc.allocate("Vnet-B", 6000), 2);
        assert_eq!(alloc.allocate("Vnet-C", 7000), 3);
        assert_eq!(alloc.lookup("Vnet-B"), Some(2));
        assert_eq!(alloc.reverse_lookup(7000), Some("Vnet-C"));
        assert_eq!(alloc.len(), 3);
    }

    #[test]
    fn test_lowest_free_reuse() {
        let mut alloc = IdAllocator::new();
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            alloc.allocate(name, 100 + i as u32);
        }

        assert_eq!(alloc.release("d"), Some(4));
        assert_eq!(alloc.release("b"), Some(2));
        assert_eq!(alloc.allocate("f", 200), 2);
        assert_eq!(alloc.allocate("g", 201), 4);
        assert_eq!(alloc.allocate("h", 202), 6);
    }

    #[test]
    fn test_release_unknown() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.release("missing"), None);
        assert!(alloc.is_empty());
    }

    #[test]
    fn test_release_clears_vni() {
        let mut alloc = IdAllocator::new();
        alloc.allocate("Vnet-A", 5000);
        alloc.release("Vnet-A");
        assert_eq!(alloc.reverse_lookup(5000), None);
        assert_eq!(alloc.lookup("Vnet-A"), None);
    }

    #[test]
    fn test_bijection_under_churn() {
        let mut alloc = IdAllocator::new();
        let mut live: Vec<String> = Vec::new();
        for round in 0..50u32 {
            let name = format!("vnet-{}", round);
            alloc.allocate(&name, round);
            live.push(name);
            if round % 3 == 0 {
                let victim = live.remove((round as usize * 7) % live.len());
                alloc.release(&victim);
            }

            let mut ids: Vec<u32> = live.iter().filter_map(|n| alloc.lookup(n)).collect();
            assert_eq!(ids.len(), live.len());
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), live.len(), "ids must be unique");
        }
    }

    #[test]
    fn test_rebuild() {
        let mut alloc = IdAllocator::new();
        alloc.allocate("stale", 1);
        alloc.rebuild(vec![
            (1, "Vnet-A".to_string(), 5000),
            (3, "Vnet-C".to_string(), 7000),
        ]);

        assert_eq!(alloc.lookup("stale"), None);
        assert_eq!(alloc.lookup("Vnet-C"), Some(3));
        assert_eq!(alloc.reverse_lookup(5000), Some("Vnet-A"));
        assert_eq!(alloc.allocate("Vnet-B", 6000), 2);
        assert_eq!(alloc.allocate("Vnet-D", 8000), 4);
    }
}
