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

//! The external interface a host provides for sampling animation clips. This crate never parses
//! or decodes clip data itself - it only schedules sampling work against whatever a host's resource
//! pipeline has already loaded, same split as eely's `clip` abstraction.

use crate::pose::Pose;
use std::fmt::Debug;

/// An animation clip: a fixed duration and a factory for stateless or stateful samplers.
///
/// Implementations are provided by the host application. This crate only needs `duration` (to
/// drive phase advancement) and `create_sampler` (to fill job-queue `sample_clip` jobs).
pub trait Clip: Debug + Send + Sync {
    /// Clip length in seconds. Must be strictly positive.
    fn duration(&self) -> f32;

    /// Whether samples from this clip should be applied as additive deltas rather than absolute
    /// joint-local transforms (spec §9 Open Questions: decided per-clip, carried onto sampled
    /// poses via [`crate::pose::PoseKind`]).
    fn is_additive(&self) -> bool {
        false
    }

    /// Creates a sampler instance. Called once per graph player per clip node, not once per frame.
    fn create_sampler(&self) -> Box<dyn Sampler>;
}

/// Produces joint-local transforms for one clip at an arbitrary point in time.
///
/// Samplers may cache per-joint track cursors internally to make sequential sampling (the common
/// case, since the job queue re-samples every frame at a nearby time) fast; `sample` takes
/// `&mut self` for exactly this reason.
pub trait Sampler: Send {
    /// Writes this clip's pose at `time` (clamped to `[0, duration)` by the caller) into `out`.
    /// Joints with no authored track are left untouched, so `out` should already hold a sensible
    /// default (identity, or another clip's pose) before this is called.
    fn sample(&mut self, time: f32, out: &mut Pose);
}
