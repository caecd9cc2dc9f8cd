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

//! [`GraphPlayer`] binds one [`crate::graph::Graph`] to one skeleton and one parameter store and
//! drives it, one `play` call per frame (spec §3.5, §6).

pub mod context;
mod runtime;

pub use context::{ComputeValue, EvalContext, PhaseRules};
pub use runtime::{BlendSelection, RuntimeNode, StateMachineAmbient};

use crate::clip::Sampler;
use crate::core::{Handle, Pool};
use crate::graph::{Graph, Node};
use crate::job::{JobQueue, SavedSlots};
use crate::log::Log;
use crate::param::ParamStore;
use crate::pose::{Pose, PoseKind};
use crate::pose_pool::PosePool;
use crate::resource::{PlayerBuildError, ResourceContainer};
use fxhash::FxHashMap;
use std::sync::Arc;

/// A live animation graph bound to one skeleton and parameter store. Owns every per-evaluation
/// resource: the runtime node pool, pose pool, job queue and saved-pose slots (spec §5).
pub struct GraphPlayer {
    graph: Arc<Graph>,
    skeleton: Arc<crate::skeleton::Skeleton>,
    nodes: Pool<RuntimeNode>,
    root: Handle<RuntimeNode>,
    samplers: Vec<Box<dyn Sampler>>,
    pose_pool: PosePool,
    job_queue: JobQueue,
    saved_slots: SavedSlots,
    sm_stack: Vec<StateMachineAmbient>,
    play_counter: u32,
}

impl GraphPlayer {
    /// Advances the graph by `dt_s` seconds against `params` and writes the result into `out`.
    ///
    /// Runs the two-phase traversal described in spec §4.3: `update_duration` on the root, then
    /// `compute`, then executes the job queue it built and copies the winning pose out.
    pub fn play(&mut self, dt_s: f32, params: &ParamStore, out: &mut Pose) {
        self.play_counter = self.play_counter.wrapping_add(1);
        self.job_queue.clear();

        {
            let mut ctx = EvalContext {
                job_queue: &mut self.job_queue,
                params,
                play_counter: self.play_counter,
                dt_s,
                sync_enabled: false,
                sync_phase: None,
            };
            runtime::update_duration(&mut self.nodes, self.root, &mut ctx, &mut self.sm_stack);
        }

        let root_register = {
            let mut ctx = EvalContext {
                job_queue: &mut self.job_queue,
                params,
                play_counter: self.play_counter,
                dt_s,
                sync_enabled: false,
                sync_phase: None,
            };
            runtime::compute(&mut self.nodes, self.root, &mut ctx, &mut self.sm_stack).expect_job_index()
        };

        let mut samplers: Vec<&mut dyn Sampler> = self.samplers.iter_mut().map(|s| s.as_mut()).collect();
        let result = self
            .job_queue
            .run(&mut self.pose_pool, &mut samplers, &mut self.saved_slots, root_register);
        out.copy_from(result.get());
        result.recycle(&mut self.pose_pool);
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn skeleton(&self) -> &Arc<crate::skeleton::Skeleton> {
        &self.skeleton
    }
}

/// Builds a [`GraphPlayer`] from a [`Graph`] and a [`ResourceContainer`] (spec §6).
pub struct GraphPlayerBuilder<'a> {
    graph: Arc<Graph>,
    resources: &'a dyn ResourceContainer,
    random_seed_base: u64,
}

impl<'a> GraphPlayerBuilder<'a> {
    pub fn new(graph: Arc<Graph>, resources: &'a dyn ResourceContainer) -> Self {
        Self {
            graph,
            resources,
            random_seed_base: 0,
        }
    }

    /// Seeds every `random` node's RNG, xor'd with that node's own graph-authored seed. Exists
    /// so tests can make random-node selection deterministic (spec §8: "determinism modulo the
    /// random node, which should be seedable for tests").
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed_base = seed;
        self
    }

    pub fn build(self) -> Result<GraphPlayer, PlayerBuildError> {
        let skeleton = self
            .resources
            .skeleton(self.graph.skeleton_id())
            .ok_or_else(|| PlayerBuildError::UnknownSkeleton(self.graph.skeleton_id().to_owned()))?;

        let mut clip_durations = FxHashMap::default();
        let mut clip_additive = FxHashMap::default();
        let mut sampler_indices = FxHashMap::default();
        let mut samplers: Vec<Box<dyn Sampler>> = Vec::new();

        for (id, node) in self.graph.nodes() {
            if let Node::Clip { clip_id } = node {
                let clip = self
                    .resources
                    .clip(clip_id)
                    .ok_or_else(|| PlayerBuildError::UnknownClip(clip_id.clone()))?;
                clip_durations.insert(id, clip.duration());
                clip_additive.insert(id, clip.is_additive());
                sampler_indices.insert(id, samplers.len());
                samplers.push(clip.create_sampler());
            }
        }

        let (mut nodes, handles) =
            runtime::build_runtime_pool(&self.graph, &clip_durations, &sampler_indices, &clip_additive, self.random_seed_base);

        let mut next_slot = 0usize;
        runtime::finalize_breakpoints_and_slots(&mut nodes, &handles, &self.graph, &mut next_slot);

        let root = handles[&self.graph.root()];

        Log::info(format!(
            "built graph player for skeleton '{}' with {} runtime nodes",
            self.graph.skeleton_id(),
            nodes.alive_count()
        ));

        Ok(GraphPlayer {
            nodes,
            root,
            samplers,
            pose_pool: PosePool::new(skeleton.clone()),
            job_queue: JobQueue::new(),
            saved_slots: SavedSlots::new(),
            sm_stack: Vec::new(),
            play_counter: 0,
            skeleton,
            graph: self.graph,
        })
    }
}

impl GraphPlayer {
    /// Creates a fresh, identity-initialised pose for this player's skeleton. Convenience for
    /// hosts that don't want to construct one by hand before the first `play`.
    pub fn new_pose(&self) -> Pose {
        Pose::new(self.skeleton.clone(), PoseKind::Absolute)
    }
}
