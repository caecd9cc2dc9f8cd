// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! A generational arena used to own runtime graph nodes for the lifetime of a player.
//!
//! All runtime nodes of a player are allocated once, wired together by [`Handle`], and never
//! individually freed or reallocated (see spec §9, "Cyclic references"): this lets a transition
//! node hold a handle to its destination state and a state hold handles to its outgoing
//! transitions without fighting the borrow checker.

use std::{
    fmt::{Debug, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::{Index, IndexMut},
};

const INVALID_GENERATION: u32 = 0;

/// A handle to an object stored in a [`Pool`]. Stable across insertions and removals of other
/// objects; becomes invalid (and safely detectable as such) once the object it pointed to is
/// removed, because removal bumps the slot's generation.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    type_marker: PhantomData<T>,
}

impl<T> Handle<T> {
    /// A handle that never points to a valid object.
    pub const NONE: Self = Self {
        index: 0,
        generation: INVALID_GENERATION,
        type_marker: PhantomData,
    };

    /// Creates a handle directly from its raw parts. Mostly useful for building the handle graph
    /// of runtime nodes in two passes (see [`Pool::spawn_empty`]).
    pub fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            type_marker: PhantomData,
        }
    }

    /// Index of the slot this handle refers to.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// `true` for any handle other than [`Handle::NONE`]. Does **not** check that the handle is
    /// still valid for a particular pool — use [`Pool::is_valid_handle`] for that.
    pub fn is_some(&self) -> bool {
        self.generation != INVALID_GENERATION
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}:{})", self.index, self.generation)
    }
}

struct PoolRecord<T> {
    generation: u32,
    payload: Option<T>,
}

/// A contiguous growable arena with stable handles. Removing from the middle never shifts other
/// entries and never invalidates other handles.
pub struct Pool<T> {
    records: Vec<PoolRecord<T>>,
    free_stack: Vec<u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            free_stack: Vec::new(),
        }
    }

    /// Creates an empty pool with pre-reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            free_stack: Vec::new(),
        }
    }

    /// Inserts a new object and returns a handle to it.
    pub fn spawn(&mut self, payload: T) -> Handle<T> {
        if let Some(free_index) = self.free_stack.pop() {
            let record = &mut self.records[free_index as usize];
            record.payload = Some(payload);
            Handle::new(free_index, record.generation)
        } else {
            let generation = 1;
            self.records.push(PoolRecord {
                generation,
                payload: Some(payload),
            });
            Handle::new(self.records.len() as u32 - 1, generation)
        }
    }

    /// Reserves a slot without a payload yet; used when runtime nodes must reference each other
    /// by handle before every node has been constructed (see spec §9). The slot is filled in with
    /// [`Pool::put_back`].
    pub fn spawn_empty(&mut self) -> Handle<T> {
        let generation = 1;
        self.records.push(PoolRecord {
            generation,
            payload: None,
        });
        Handle::new(self.records.len() as u32 - 1, generation)
    }

    /// Fills in a slot previously reserved with [`Pool::spawn_empty`].
    pub fn put_back(&mut self, handle: Handle<T>, payload: T) {
        let record = &mut self.records[handle.index() as usize];
        assert_eq!(
            record.generation, handle.generation,
            "stale handle passed to Pool::put_back"
        );
        record.payload = Some(payload);
    }

    /// Temporarily removes the payload at `handle`, leaving the slot reserved (same generation,
    /// not freed). Lets a caller recurse back into the pool - e.g. a runtime node computing its
    /// children - without holding a borrow of the node being computed. Restore with
    /// [`Pool::put_back`] before the handle is read again.
    pub fn take_reserve(&mut self, handle: Handle<T>) -> T {
        let record = &mut self.records[handle.index() as usize];
        assert_eq!(
            record.generation, handle.generation,
            "stale handle passed to Pool::take_reserve"
        );
        record
            .payload
            .take()
            .expect("Pool::take_reserve called on an already-reserved slot")
    }

    /// Returns `true` if `handle` still refers to a live object in this pool.
    pub fn is_valid_handle(&self, handle: Handle<T>) -> bool {
        self.records
            .get(handle.index() as usize)
            .map(|r| r.generation == handle.generation && r.payload.is_some())
            .unwrap_or(false)
    }

    /// Borrows an object by handle, panicking if the handle is stale or out of range.
    pub fn borrow(&self, handle: Handle<T>) -> &T {
        self.try_borrow(handle)
            .expect("invalid handle passed to Pool::borrow")
    }

    /// Mutably borrows an object by handle, panicking if the handle is stale or out of range.
    pub fn borrow_mut(&mut self, handle: Handle<T>) -> &mut T {
        self.try_borrow_mut(handle)
            .expect("invalid handle passed to Pool::borrow_mut")
    }

    /// Borrows an object by handle, returning `None` if the handle is stale or out of range.
    pub fn try_borrow(&self, handle: Handle<T>) -> Option<&T> {
        self.records
            .get(handle.index() as usize)
            .filter(|r| r.generation == handle.generation)
            .and_then(|r| r.payload.as_ref())
    }

    /// Mutably borrows an object by handle, returning `None` if the handle is stale or out of
    /// range.
    pub fn try_borrow_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.records
            .get_mut(handle.index() as usize)
            .filter(|r| r.generation == handle.generation)
            .and_then(|r| r.payload.as_mut())
    }

    /// Iterates over all live objects in the pool.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter().filter_map(|r| r.payload.as_ref())
    }

    /// Number of live objects in the pool.
    pub fn alive_count(&self) -> usize {
        self.records.iter().filter(|r| r.payload.is_some()).count()
    }
}

impl<T> Index<Handle<T>> for Pool<T> {
    type Output = T;

    fn index(&self, index: Handle<T>) -> &Self::Output {
        self.borrow(index)
    }
}

impl<T> IndexMut<Handle<T>> for Pool<T> {
    fn index_mut(&mut self, index: Handle<T>) -> &mut Self::Output {
        self.borrow_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_borrow_roundtrip() {
        let mut pool: Pool<i32> = Pool::new();
        let a = pool.spawn(1);
        let b = pool.spawn(2);
        assert_eq!(*pool.borrow(a), 1);
        assert_eq!(*pool.borrow(b), 2);
    }

    #[test]
    fn none_handle_is_never_valid() {
        let pool: Pool<i32> = Pool::new();
        assert!(!pool.is_valid_handle(Handle::<i32>::NONE));
    }

    #[test]
    fn take_reserve_then_put_back_roundtrip() {
        let mut pool: Pool<i32> = Pool::new();
        let h = pool.spawn(7);
        let taken = pool.take_reserve(h);
        assert_eq!(taken, 7);
        assert!(pool.try_borrow(h).is_none());
        pool.put_back(h, taken + 1);
        assert_eq!(*pool.borrow(h), 8);
    }

    #[test]
    fn spawn_empty_then_put_back() {
        let mut pool: Pool<i32> = Pool::new();
        let h = pool.spawn_empty();
        assert!(pool.try_borrow(h).is_none());
        pool.put_back(h, 42);
        assert_eq!(*pool.borrow(h), 42);
    }
}
