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

//! [`Pose`] is a set of joint transforms bound to one [`Skeleton`] for its whole lifetime.

use crate::core::Transform;
use crate::skeleton::Skeleton;
use std::sync::Arc;

/// Distinguishes poses whose identity element is the rest pose from poses whose identity element
/// is a zero-delta, additive layer (spec §3.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoseKind {
    Absolute,
    Additive,
}

/// A pose bound to exactly one skeleton. Stores joint-local transforms directly and computes
/// object-space transforms lazily, amortized by tracking the shallowest joint touched since the
/// last read (spec §3.2).
#[derive(Clone, Debug)]
pub struct Pose {
    skeleton: Arc<Skeleton>,
    kind: PoseKind,
    joint_local: Vec<Transform>,
    object_space: Vec<Transform>,
    shallow_dirty: Option<usize>,
}

impl Pose {
    /// Creates a pose reset to the identity element of `kind`.
    pub fn new(skeleton: Arc<Skeleton>, kind: PoseKind) -> Self {
        let count = skeleton.joint_count();
        let identity = identity_for(kind);
        Self {
            skeleton,
            kind,
            joint_local: vec![identity; count],
            object_space: vec![identity; count],
            shallow_dirty: None,
        }
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn kind(&self) -> PoseKind {
        self.kind
    }

    pub fn joint_count(&self) -> usize {
        self.joint_local.len()
    }

    /// Resets every joint to the identity element of `kind`, and changes the pose's kind to
    /// match. Clip sampling sets this explicitly for additive clips (spec §9 Open Questions).
    pub fn reset(&mut self, kind: PoseKind) {
        let identity = identity_for(kind);
        self.kind = kind;
        self.joint_local.fill(identity);
        self.shallow_dirty = Some(0);
    }

    pub fn joint_local(&self, index: usize) -> &Transform {
        &self.joint_local[index]
    }

    /// Sets a joint's transform relative to its parent. Marks the shallowest dirty index as
    /// `min(current, index)` so the next object-space read only recomputes what changed.
    pub fn set_joint_local(&mut self, index: usize, transform: Transform) {
        self.joint_local[index] = transform;
        self.shallow_dirty = Some(self.shallow_dirty.map_or(index, |d| d.min(index)));
    }

    /// Returns the object-space transform of `index`, recomputing the dirty suffix first.
    pub fn object_space(&mut self, index: usize) -> &Transform {
        self.recompute_object_space_if_dirty();
        &self.object_space[index]
    }

    /// Returns all object-space transforms, recomputing the dirty suffix first.
    pub fn object_space_all(&mut self) -> &[Transform] {
        self.recompute_object_space_if_dirty();
        &self.object_space
    }

    fn recompute_object_space_if_dirty(&mut self) {
        let Some(start) = self.shallow_dirty else {
            return;
        };
        for i in start..self.joint_local.len() {
            self.object_space[i] = match self.skeleton.parent_of(i) {
                Some(parent) => self.object_space[parent].compose(&self.joint_local[i]),
                None => self.joint_local[i],
            };
        }
        self.shallow_dirty = None;
    }

    /// Overwrites every joint-local transform, e.g. when copying a saved pose into another.
    pub fn copy_from(&mut self, other: &Pose) {
        debug_assert!(
            Arc::ptr_eq(&self.skeleton, &other.skeleton),
            "copy_from requires both poses to share the same skeleton"
        );
        self.kind = other.kind;
        self.joint_local.copy_from_slice(&other.joint_local);
        self.shallow_dirty = Some(0);
    }
}

fn identity_for(kind: PoseKind) -> Transform {
    match kind {
        PoseKind::Absolute => Transform::identity(),
        PoseKind::Additive => Transform::additive_identity(),
    }
}

/// Per-joint lerp (translation/scale) + slerp (rotation) into `out`. Requires all three poses to
/// share the same skeleton (spec §3.2).
pub fn blend(a: &Pose, b: &Pose, weight: f32, out: &mut Pose) {
    assert!(
        Arc::ptr_eq(&a.skeleton, &b.skeleton) && Arc::ptr_eq(&a.skeleton, &out.skeleton),
        "blend requires all three poses to share the same skeleton"
    );
    for i in 0..out.joint_local.len() {
        out.joint_local[i] = Transform::blend(&a.joint_local[i], &b.joint_local[i], weight);
    }
    out.kind = a.kind;
    out.shallow_dirty = Some(0);
}

/// Like [`blend`], but lerps `other` into `target` in place instead of writing a third pose.
/// Lets the job queue reuse one operand's buffer for a blend's result (spec §4.2).
pub fn blend_in_place(target: &mut Pose, other: &Pose, weight: f32) {
    assert!(
        Arc::ptr_eq(&target.skeleton, &other.skeleton),
        "blend requires both poses to share the same skeleton"
    );
    for i in 0..target.joint_local.len() {
        target.joint_local[i] = Transform::blend(&target.joint_local[i], &other.joint_local[i], weight);
    }
    target.shallow_dirty = Some(0);
}

/// `base.translation += additive.translation; base.rotation = additive.rotation * base.rotation;
/// base.scale *= additive.scale` (spec §3.2). `additive` must be of [`PoseKind::Additive`] kind.
pub fn add(base: &mut Pose, additive: &Pose) {
    assert!(
        Arc::ptr_eq(&base.skeleton, &additive.skeleton),
        "add requires both poses to share the same skeleton"
    );
    assert_eq!(
        additive.kind,
        PoseKind::Additive,
        "add's second argument must be an additive pose"
    );
    for i in 0..base.joint_local.len() {
        base.joint_local[i] = base.joint_local[i].add_additive(&additive.joint_local[i]);
    }
    base.shallow_dirty = Some(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn two_joint_skeleton() -> Arc<Skeleton> {
        Arc::new(Skeleton::new(vec![
            Joint {
                name: "root".into(),
                parent: None,
                rest_pose: Transform::new(
                    Vector3::new(1.0, 0.0, 0.0),
                    Default::default(),
                    Vector3::new(1.0, 1.0, 1.0),
                ),
            },
            Joint {
                name: "child".into(),
                parent: Some(0),
                rest_pose: Transform::new(
                    Vector3::new(0.0, 1.0, 0.0),
                    Default::default(),
                    Vector3::new(1.0, 1.0, 1.0),
                ),
            },
        ]))
    }

    #[test]
    fn reset_absolute_restores_identity() {
        let skeleton = two_joint_skeleton();
        let mut pose = Pose::new(skeleton, PoseKind::Absolute);
        pose.set_joint_local(0, Transform::new(Vector3::new(9.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        pose.reset(PoseKind::Absolute);
        assert_eq!(*pose.joint_local(0), Transform::identity());
    }

    #[test]
    fn object_space_composes_through_parent() {
        let skeleton = two_joint_skeleton();
        let mut pose = Pose::new(skeleton, PoseKind::Absolute);
        pose.set_joint_local(0, Transform::new(Vector3::new(1.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        pose.set_joint_local(1, Transform::new(Vector3::new(0.0, 1.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let object_space_child = *pose.object_space(1);
        assert_abs_diff_eq!(object_space_child.translation.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(object_space_child.translation.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn blend_with_self_is_identity() {
        let skeleton = two_joint_skeleton();
        let mut a = Pose::new(skeleton.clone(), PoseKind::Absolute);
        a.set_joint_local(0, Transform::new(Vector3::new(3.0, 1.0, 2.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let mut out = Pose::new(skeleton, PoseKind::Absolute);
        blend(&a, &a, 0.42, &mut out);
        assert_abs_diff_eq!(out.joint_local(0).translation.x, a.joint_local(0).translation.x, epsilon = 1e-6);
    }

    #[test]
    fn blend_in_place_matches_blend_into_third_buffer() {
        let skeleton = two_joint_skeleton();
        let mut a = Pose::new(skeleton.clone(), PoseKind::Absolute);
        a.set_joint_local(0, Transform::new(Vector3::new(0.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let mut b = Pose::new(skeleton.clone(), PoseKind::Absolute);
        b.set_joint_local(0, Transform::new(Vector3::new(4.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));

        let mut out = Pose::new(skeleton, PoseKind::Absolute);
        blend(&a, &b, 0.25, &mut out);
        blend_in_place(&mut a, &b, 0.25);

        assert_abs_diff_eq!(a.joint_local(0).translation.x, out.joint_local(0).translation.x, epsilon = 1e-6);
    }

    #[test]
    fn add_identity_additive_is_noop() {
        let skeleton = two_joint_skeleton();
        let mut base = Pose::new(skeleton.clone(), PoseKind::Absolute);
        base.set_joint_local(0, Transform::new(Vector3::new(2.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let before = *base.joint_local(0);
        let additive = Pose::new(skeleton, PoseKind::Additive);
        add(&mut base, &additive);
        assert_eq!(*base.joint_local(0), before);
    }

    #[test]
    #[should_panic]
    fn add_rejects_non_additive_second_argument() {
        let skeleton = two_joint_skeleton();
        let mut base = Pose::new(skeleton.clone(), PoseKind::Absolute);
        let not_additive = Pose::new(skeleton, PoseKind::Absolute);
        add(&mut base, &not_additive);
    }
}
