/// A handle into a [`Slab`].
///
/// A key names one slot *and* one occupancy of that slot: once the value
/// is removed, the slot's generation moves on and every key issued for
/// the old value stops resolving, even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: usize,
    generation: u32,
}

impl Key {
    /// Position of the slot inside the slab.
    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

/// A single storage slot.
struct Slot<T> {
    /// Incremented every time the slot is vacated.
    generation: u32,
    value: Option<T>,
}

/// A generation-tagged slab allocator.
///
/// A `Slab` stores values in a contiguous array and hands out [`Key`]s
/// that stay valid until the value is removed. Freed slots are reused
/// for later insertions, and the backing storage grows by doubling and
/// never shrinks.
///
/// Stale keys are detected rather than trusted: looking up a removed or
/// reused slot through an old key returns `None`.
pub(crate) struct Slab<T> {
    /// Storage for slots.
    slots: Vec<Slot<T>>,
    /// Stack of vacant slot indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` vacant slots.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let slab = Slab::<i32>::new(16);
    /// ```
    pub(crate) fn new(size: usize) -> Self {
        let slots = (0..size)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        let free = (0..size).rev().collect();

        Self {
            slots,
            free,
            len: 0,
        }
    }

    /// Inserts a value and returns its key.
    ///
    /// If a vacant slot is available it is reused; otherwise the slab
    /// doubles in size.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let mut slab = Slab::new(1);
    /// let key = slab.insert(42);
    /// assert_eq!(slab.get(key), Some(&42));
    /// ```
    pub(crate) fn insert(&mut self, value: T) -> Key {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let len = self.slots.len();
                let new_len = if len == 0 { 1 } else { 2 * len };

                self.slots.extend((len..new_len).map(|_| Slot {
                    generation: 0,
                    value: None,
                }));
                self.free.extend(((len + 1)..new_len).rev());

                len
            }
        };

        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.len += 1;

        Key {
            index,
            generation: slot.generation,
        }
    }

    /// Removes and returns the value behind `key`.
    ///
    /// Returns `None` if the key is stale or was never issued by this slab.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        self.free.push(key.index);
        self.len -= 1;

        Some(value)
    }

    /// Returns a reference to the value behind `key`, if it is still live.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Returns a mutable reference to the value behind `key`, if it is still live.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `key` still resolves to a live value.
    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over live values.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Key {
                        index,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Number of slots, occupied or not. Never decreases.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_vacant_slots() {
        let mut slab = Slab::new(2);
        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!(slab.capacity(), 2);

        assert_eq!(slab.remove(a), Some("a"));
        let c = slab.insert("c");

        assert_eq!(c.index(), a.index());
        assert_eq!(slab.get(b), Some(&"b"));
        assert_eq!(slab.get(c), Some(&"c"));
        assert_eq!(slab.capacity(), 2);
    }

    #[test]
    fn stale_keys_do_not_resolve_after_reuse() {
        let mut slab = Slab::new(1);
        let old = slab.insert(1);
        slab.remove(old);
        let new = slab.insert(2);

        assert_eq!(old.index(), new.index());
        assert!(!slab.contains(old));
        assert_eq!(slab.get(old), None);
        assert_eq!(slab.remove(old), None);
        assert_eq!(slab.get(new), Some(&2));
    }

    #[test]
    fn grows_by_doubling_and_never_shrinks() {
        let mut slab = Slab::new(0);
        let keys: Vec<_> = (0..5).map(|i| slab.insert(i)).collect();
        assert_eq!(slab.capacity(), 8);
        assert_eq!(slab.len(), 5);

        for key in keys {
            slab.remove(key);
        }

        assert_eq!(slab.len(), 0);
        assert_eq!(slab.capacity(), 8);
        assert_eq!(slab.iter().count(), 0);
    }
}
