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

//! The job queue is the second evaluation pass (spec §5): graph nodes enqueue work during
//! `compute`, then [`JobQueue::run`] executes it against pool-borrowed pose buffers and the
//! player's persistent saved-pose slots.

mod jobs;

pub use jobs::Job;

use crate::clip::Sampler;
use crate::pose::Pose;
use crate::pose_pool::{PoseHandle, PosePool};

/// Persistent pose storage that survives across frames, used by `save`/`restore` jobs to
/// implement frozen-fade transitions (spec §6: a transition freezes its source pose the instant
/// it starts, then blends the running destination against that frozen snapshot).
#[derive(Default)]
pub struct SavedSlots {
    slots: Vec<Option<Box<Pose>>>,
}

impl SavedSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_len(&mut self, slot: usize) {
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
    }

    fn set(&mut self, slot: usize, pose: Box<Pose>) {
        self.ensure_len(slot);
        self.slots[slot] = Some(pose);
    }

    /// Whether `slot` currently holds a saved pose.
    pub fn is_occupied(&self, slot: usize) -> bool {
        self.slots.get(slot).map_or(false, Option::is_some)
    }

    fn get(&self, slot: usize) -> &Pose {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("job queue tried to restore unsaved slot {slot}"))
            .as_ref()
    }
}

/// A queue of pose-producing operations, built by one `compute` pass and executed once per frame.
///
/// Jobs read and write numbered registers; a register is materialized into an actual pose buffer
/// borrowed from the [`PosePool`] only the first time it is written (spec §5: "the job queue must
/// not allocate poses eagerly for registers a frame's graph never touches").
#[derive(Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
    register_count: usize,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn alloc_register(&mut self) -> usize {
        let r = self.register_count;
        self.register_count += 1;
        r
    }

    /// Enqueues a clip sample into a freshly allocated register and returns it.
    pub fn push_sample_clip(&mut self, sampler: usize, time: f32, additive: bool) -> usize {
        let output = self.alloc_register();
        self.jobs.push(Job::SampleClip {
            sampler,
            time,
            additive,
            output,
        });
        output
    }

    /// Enqueues a blend of two existing registers into a new one.
    pub fn push_blend(&mut self, a: usize, b: usize, weight: f32) -> usize {
        let output = self.alloc_register();
        self.jobs.push(Job::Blend { a, b, weight, output });
        output
    }

    /// Enqueues an additive layer of `additive` on top of `base` into a new register.
    pub fn push_add(&mut self, base: usize, additive: usize) -> usize {
        let output = self.alloc_register();
        self.jobs.push(Job::Add { base, additive, output });
        output
    }

    /// Enqueues copying `source`'s register into a persistent slot.
    pub fn push_save(&mut self, source: usize, slot: usize) {
        self.jobs.push(Job::Save { source, slot });
    }

    /// Enqueues loading a persistent slot into a new register.
    pub fn push_restore(&mut self, slot: usize) -> usize {
        let output = self.alloc_register();
        self.jobs.push(Job::Restore { slot, output });
        output
    }

    /// Executes every enqueued job in order against `pool`, `samplers` (indexed the same way the
    /// graph assigned sampler ids) and `slots`. Returns the pose produced by register `root`.
    ///
    /// # Panics
    ///
    /// Panics if `root` (or any job's input register) was never written, or if a `restore` job
    /// targets an unoccupied slot - both are contract violations by the code that built the
    /// queue, not recoverable runtime conditions (spec §7).
    pub fn run(
        &self,
        pool: &mut PosePool,
        samplers: &mut [&mut dyn Sampler],
        slots: &mut SavedSlots,
        root: usize,
    ) -> PoseHandle {
        let mut registers: Vec<Option<PoseHandle>> = (0..self.register_count).map(|_| None).collect();

        for job in &self.jobs {
            match *job {
                Job::SampleClip {
                    sampler,
                    time,
                    additive,
                    output,
                } => {
                    let kind = if additive {
                        crate::pose::PoseKind::Additive
                    } else {
                        crate::pose::PoseKind::Absolute
                    };
                    let mut handle = pool.take(kind);
                    samplers[sampler].sample(time, handle.get_mut());
                    registers[output] = Some(handle);
                }
                Job::Blend { a, b, weight, output } => {
                    // Reuses register `a`'s buffer for the result instead of allocating a third
                    // one, and releases `b`'s buffer immediately - mirrors `transfer_result_pose`/
                    // `release_result_pose` in the engine this job model is grounded on.
                    let mut result = registers[a].take().expect("blend job read an empty register");
                    let other = registers[b].take().expect("blend job read an empty register");
                    crate::pose::blend_in_place(result.get_mut(), other.get(), weight);
                    other.recycle(pool);
                    registers[output] = Some(result);
                }
                Job::Add { base, additive, output } => {
                    let base_pose = registers[base].take().expect("add job read an empty base register");
                    let mut base_pose = base_pose;
                    {
                        let additive_pose = registers[additive]
                            .as_ref()
                            .expect("add job read an empty additive register")
                            .get();
                        crate::pose::add(base_pose.get_mut(), additive_pose);
                    }
                    registers[output] = Some(base_pose);
                }
                Job::Save { source, slot } => {
                    let pose = registers[source]
                        .as_ref()
                        .expect("save job read an empty register")
                        .get()
                        .clone();
                    slots.set(slot, Box::new(pose));
                }
                Job::Restore { slot, output } => {
                    let mut handle = pool.take(crate::pose::PoseKind::Absolute);
                    handle.get_mut().copy_from(slots.get(slot));
                    registers[output] = Some(handle);
                }
            }
        }

        let result = registers[root].take().expect("job queue root register was never written");

        // Every other register still holding a pose was an intermediate the caller never asked
        // for (a blend/add operand already consumed above, or a save/restore byproduct) - release
        // it back to the pool now rather than letting it leak out as an un-recycled handle.
        for handle in registers.into_iter().flatten() {
            handle.recycle(pool);
        }

        result
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.register_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transform;
    use crate::skeleton::{Joint, Skeleton};
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(Skeleton::new(vec![Joint {
            name: "root".into(),
            parent: None,
            rest_pose: Transform::identity(),
        }]))
    }

    struct ConstSampler(Transform);
    impl Sampler for ConstSampler {
        fn sample(&mut self, _time: f32, out: &mut Pose) {
            out.set_joint_local(0, self.0);
        }
    }

    #[test]
    fn sample_then_blend_produces_midpoint() {
        let mut queue = JobQueue::new();
        let a = queue.push_sample_clip(0, 0.0, false);
        let b = queue.push_sample_clip(1, 0.0, false);
        let root = queue.push_blend(a, b, 0.5);

        let mut pool = PosePool::new(skeleton());
        let mut slots = SavedSlots::new();
        let mut sampler_a = ConstSampler(Transform::new(Vector3::new(0.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let mut sampler_b = ConstSampler(Transform::new(Vector3::new(2.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let mut samplers: Vec<&mut dyn Sampler> = vec![&mut sampler_a, &mut sampler_b];

        let result = queue.run(&mut pool, &mut samplers, &mut slots, root);
        assert_eq!(result.get().joint_local(0).translation.x, 1.0);
    }

    #[test]
    fn save_then_restore_round_trips_across_runs() {
        let mut queue = JobQueue::new();
        let a = queue.push_sample_clip(0, 0.0, false);
        queue.push_save(a, 3);
        let mut pool = PosePool::new(skeleton());
        let mut slots = SavedSlots::new();
        let mut sampler = ConstSampler(Transform::new(Vector3::new(7.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)));
        let mut samplers: Vec<&mut dyn Sampler> = vec![&mut sampler];
        let result = queue.run(&mut pool, &mut samplers, &mut slots, a);
        result.recycle(&mut pool);

        let mut restore_queue = JobQueue::new();
        let restored = restore_queue.push_restore(3);
        let mut no_samplers: Vec<&mut dyn Sampler> = Vec::new();
        let restored_handle = restore_queue.run(&mut pool, &mut no_samplers, &mut slots, restored);
        assert_eq!(restored_handle.get().joint_local(0).translation.x, 7.0);
    }

    #[test]
    #[should_panic]
    fn restore_unsaved_slot_panics() {
        let mut queue = JobQueue::new();
        let restored = queue.push_restore(0);
        let mut pool = PosePool::new(skeleton());
        let mut slots = SavedSlots::new();
        let mut no_samplers: Vec<&mut dyn Sampler> = Vec::new();
        queue.run(&mut pool, &mut no_samplers, &mut slots, restored);
    }
}
