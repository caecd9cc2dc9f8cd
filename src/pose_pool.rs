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

//! A pool of reusable [`Pose`] buffers so a frame's job queue never allocates. See [`PosePool`].

use crate::pose::{Pose, PoseKind};
use crate::skeleton::Skeleton;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

struct PosePoolInner {
    skeleton: Arc<Skeleton>,
    free: Vec<Box<Pose>>,
    borrowed_count: usize,
}

/// Lends out [`Pose`] buffers bound to one skeleton, recycling them once every [`PoseHandle`] for
/// a given generation is dropped. Grows on demand; never shrinks, since job queues tend to need
/// the same number of temporaries frame over frame.
pub struct PosePool {
    inner: Rc<RefCell<PosePoolInner>>,
}

impl PosePool {
    pub fn new(skeleton: Arc<Skeleton>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PosePoolInner {
                skeleton,
                free: Vec::new(),
                borrowed_count: 0,
            })),
        }
    }

    /// Number of pose buffers currently lent out and not yet returned.
    pub fn borrowed_count(&self) -> usize {
        self.inner.borrow().borrowed_count
    }

    /// Total buffers owned by the pool, borrowed or free.
    pub fn capacity(&self) -> usize {
        let inner = self.inner.borrow();
        inner.free.len() + inner.borrowed_count
    }

    /// Borrows a pose buffer reset to `kind`'s identity, allocating a new one only if the free
    /// list is empty.
    pub fn take(&mut self, kind: PoseKind) -> PoseHandle {
        let mut inner = self.inner.borrow_mut();
        let mut pose = inner
            .free
            .pop()
            .unwrap_or_else(|| Box::new(Pose::new(inner.skeleton.clone(), kind)));
        pose.reset(kind);
        inner.borrowed_count += 1;
        drop(inner);
        PoseHandle {
            pose: Some(pose),
            inner: self.inner.clone(),
        }
    }
}

impl Drop for PosePool {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.inner.borrow().borrowed_count,
            0,
            "pose pool dropped with outstanding borrowed poses"
        );
    }
}

/// An owned, pool-backed pose. Returns itself to the pool it came from on drop (spec §4.1): no
/// caller is required to call [`PoseHandle::recycle`] for correctness, though doing so right after
/// a pose's last use documents intent and is checked against the pool it's returned to.
pub struct PoseHandle {
    pose: Option<Box<Pose>>,
    inner: Rc<RefCell<PosePoolInner>>,
}

impl PoseHandle {
    pub fn get(&self) -> &Pose {
        self.pose.as_ref().expect("pose already recycled")
    }

    pub fn get_mut(&mut self) -> &mut Pose {
        self.pose.as_mut().expect("pose already recycled")
    }

    /// Returns the underlying buffer to `pool` for reuse. Equivalent to simply dropping the
    /// handle; kept as an explicit call for call sites that want to mark a pose's last use.
    pub fn recycle(self, pool: &mut PosePool) {
        debug_assert!(
            Rc::ptr_eq(&self.inner, &pool.inner),
            "pose handle recycled into a different pool than it was borrowed from"
        );
    }
}

impl Drop for PoseHandle {
    fn drop(&mut self) {
        if let Some(pose) = self.pose.take() {
            let mut inner = self.inner.borrow_mut();
            inner.borrowed_count -= 1;
            inner.free.push(pose);
        }
    }
}
