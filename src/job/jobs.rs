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

//! The five job kinds a graph's `compute` pass can enqueue (spec §5).

/// A single unit of pose-producing work. Registers are queue-local integers assigned by
/// [`super::JobQueue`] as nodes enqueue work; they are not stable across frames.
#[derive(Clone, Copy, Debug)]
pub enum Job {
    /// Samples a clip at `time` into a new register. `sampler` indexes into the `samplers` slice
    /// passed to [`super::JobQueue::run`]. `additive` marks the result as an additive pose.
    SampleClip {
        sampler: usize,
        time: f32,
        additive: bool,
        output: usize,
    },
    /// Blends registers `a` and `b` by `weight` (0 favors `a`, 1 favors `b`) into a new register.
    Blend { a: usize, b: usize, weight: f32, output: usize },
    /// Layers additive register `additive` on top of absolute register `base` into a new register.
    Add { base: usize, additive: usize, output: usize },
    /// Copies register `source` into persistent slot `slot`, surviving past this frame.
    Save { source: usize, slot: usize },
    /// Loads persistent slot `slot` into a new register.
    Restore { slot: usize, output: usize },
}
