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

//! 3-vector, quaternion and transform algebra used throughout skeletons and poses.

use nalgebra::{Unit, UnitQuaternion, Vector3};

/// Wraps an unsigned `n` into the range `[min_limit, max_limit)`.
pub fn wrapf(mut n: f32, min_limit: f32, max_limit: f32) -> f32 {
    let range = max_limit - min_limit;
    if range.abs() < f32::EPSILON {
        return min_limit;
    }
    while n >= max_limit {
        n -= range;
    }
    while n < min_limit {
        n += range;
    }
    n
}

/// Linear interpolation between two scalars.
pub fn lerpf(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// A joint-local or object-space rigid-plus-scale transform: scale, then rotate, then translate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Identity transform: zero translation, no rotation, unit scale.
    pub fn identity() -> Self {
        Self {
            translation: Vector3::new(0.0, 0.0, 0.0),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Additive identity: zero translation, no rotation, unit scale delta (same representation
    /// as [`Transform::identity`] — additive poses use a separate "kind" tag, not a different
    /// identity transform shape, see [`crate::pose::PoseKind`]).
    pub fn additive_identity() -> Self {
        Self::identity()
    }

    pub fn new(translation: Vector3<f32>, rotation: UnitQuaternion<f32>, scale: Vector3<f32>) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Composes `self` (parent) with `child`: `self * child` converts `child` from `self`'s
    /// space into `self`'s parent space. Used to go from joint-local to object-space transforms.
    pub fn compose(&self, child: &Transform) -> Transform {
        let scaled = child.translation.component_mul(&self.scale);
        let rotated = self.rotation * scaled;
        Transform {
            translation: rotated + self.translation,
            rotation: self.rotation * child.rotation,
            scale: self.scale.component_mul(&child.scale),
        }
    }

    /// Per-component lerp of translation/scale, slerp of rotation.
    pub fn blend(a: &Transform, b: &Transform, weight: f32) -> Transform {
        Transform {
            translation: a.translation.lerp(&b.translation, weight),
            rotation: a.rotation.slerp(&b.rotation, weight),
            scale: a.scale.lerp(&b.scale, weight),
        }
    }

    /// Layers an additive delta on top of `self`: translation adds, rotation pre-multiplies,
    /// scale multiplies component-wise (spec §3.2).
    pub fn add_additive(&self, additive: &Transform) -> Transform {
        Transform {
            translation: self.translation + additive.translation,
            rotation: additive.rotation * self.rotation,
            scale: self.scale.component_mul(&additive.scale),
        }
    }

    /// `true` if every component is within `epsilon` of `other`.
    pub fn near(&self, other: &Transform, epsilon: f32) -> bool {
        (self.translation - other.translation).abs().max() <= epsilon
            && rotation_near(&self.rotation, &other.rotation, epsilon)
            && (self.scale - other.scale).abs().max() <= epsilon
    }
}

fn rotation_near(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, epsilon: f32) -> bool {
    let dot = a.coords.dot(&b.coords);
    (dot.abs() - 1.0).abs() <= epsilon
}

/// Builds a rotation of `angle_rad` around an arbitrary (not necessarily unit-length) axis.
pub fn quat_from_axis_angle(axis: Vector3<f32>, angle_rad: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle_rad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn wrapf_wraps_into_range() {
        assert_abs_diff_eq!(wrapf(1.25, 0.0, 1.0), 0.25, epsilon = 1e-6);
        assert_abs_diff_eq!(wrapf(-0.25, 0.0, 1.0), 0.75, epsilon = 1e-6);
        assert_abs_diff_eq!(wrapf(0.5, 0.0, 1.0), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn compose_translates_child_through_parent_rotation() {
        let parent = Transform::new(
            Vector3::new(1.0, 0.0, 0.0),
            quat_from_axis_angle(Vector3::y(), FRAC_PI_2),
            Vector3::new(1.0, 1.0, 1.0),
        );
        let child = Transform::new(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity(), Vector3::new(1.0, 1.0, 1.0));
        let composed = parent.compose(&child);
        // Rotating (1,0,0) by +90 degrees around Y gives (0,0,-1), then add parent translation.
        assert_abs_diff_eq!(composed.translation.x, 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(composed.translation.z, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn blend_with_self_is_identity() {
        let t = Transform::new(Vector3::new(1.0, 2.0, 3.0), quat_from_axis_angle(Vector3::x(), 0.3), Vector3::new(1.0, 1.0, 1.0));
        let blended = Transform::blend(&t, &t, 0.37);
        assert!(blended.near(&t, 1e-5));
    }
}
