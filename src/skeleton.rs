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

//! A skeleton is an immutable, topologically-sorted joint hierarchy. See [`Skeleton`] docs.

use crate::core::Transform;

/// A single joint: a stable name, an optional parent, and a rest-pose transform relative to the
/// parent (or to the object, for roots).
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    /// Stable identifier, unique within the skeleton.
    pub name: String,
    /// Index of the parent joint. `None` for roots.
    pub parent: Option<usize>,
    /// Rest-pose transform, in joint-local space.
    pub rest_pose: Transform,
}

/// Ordered joint hierarchy, immutable after construction. Joints are topologically sorted: a
/// joint's parent index is always strictly less than its own index, so object-space transforms
/// can be computed with a single forward sweep (spec §3.1).
#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton {
    joints: Vec<Joint>,
}

impl Skeleton {
    /// Builds a skeleton from an already topologically-sorted joint list.
    ///
    /// # Panics
    ///
    /// Panics if any joint's parent index is not strictly less than its own index - this is a
    /// contract violation by the resource pipeline that produced the skeleton, not a recoverable
    /// runtime condition (see spec §7: construction here is assumed already-cooked data, unlike
    /// `GraphPlayerBuilder` which does surface recoverable errors to the host).
    pub fn new(joints: Vec<Joint>) -> Self {
        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                assert!(
                    parent < index,
                    "joint '{}' at index {index} has parent index {parent} >= its own index",
                    joint.name
                );
            }
        }
        Self { joints }
    }

    /// Number of joints in the skeleton.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// All joints, parent-before-child.
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Finds a joint's index by name.
    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn joint(&self, index: usize) -> &Joint {
        &self.joints[index]
    }

    pub fn parent_of(&self, index: usize) -> Option<usize> {
        self.joints[index].parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joint(name: &str, parent: Option<usize>) -> Joint {
        Joint {
            name: name.to_owned(),
            parent,
            rest_pose: Transform::identity(),
        }
    }

    #[test]
    fn accepts_topologically_sorted_joints() {
        let skeleton = Skeleton::new(vec![joint("root", None), joint("child", Some(0))]);
        assert_eq!(skeleton.joint_count(), 2);
        assert_eq!(skeleton.parent_of(1), Some(0));
    }

    #[test]
    #[should_panic]
    fn rejects_forward_parent_reference() {
        Skeleton::new(vec![joint("root", Some(1)), joint("child", None)]);
    }

    #[test]
    fn finds_joint_by_name() {
        let skeleton = Skeleton::new(vec![joint("root", None), joint("hand", Some(0))]);
        assert_eq!(skeleton.find_joint("hand"), Some(1));
        assert_eq!(skeleton.find_joint("foot"), None);
    }
}
