use std::collections::BTreeMap;

/// Connected clients keyed by slot id.
///
/// Slot ids grow monotonically and are never reused, so iteration order is
/// registration order.
#[derive(Debug)]
pub struct ClientRegistry<P> {
    clients: BTreeMap<u64, P>,
    next_slot: u64,
}

impl<P> Default for ClientRegistry<P> {
    fn default() -> Self {
        Self {
            clients: BTreeMap::new(),
            next_slot: 0,
        }
    }
}

impl<P> ClientRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: P) -> u64 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.clients.insert(slot, client);
        slot
    }

    pub fn remove(&mut self, slot: u64) -> Option<P> {
        self.clients.remove(&slot)
    }

    pub fn get_mut(&mut self, slot: u64) -> Option<&mut P> {
        self.clients.get_mut(&slot)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.clients.keys().copied().collect()
    }

    /// Visit every client in slot order, dropping those for which `keep`
    /// returns false. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(u64, &mut P) -> bool) -> usize {
        let before = self.clients.len();
        self.clients.retain(|slot, client| keep(*slot, client));
        before - self.clients.len()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (u64, P)> + '_ {
        std::mem::take(&mut self.clients).into_iter()
    }
}
