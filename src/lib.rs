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

//! A runtime animation graph engine: skeletons, poses, a pool-backed job queue, and a graph
//! player that evaluates clip/blend/state-machine node graphs into sampled poses.
//!
//! A typical host:
//!
//! 1. Builds a [`skeleton::Skeleton`] and some [`clip::Clip`]s (data the host's resource
//!    pipeline owns; this crate never loads them).
//! 2. Implements [`resource::ResourceContainer`] over that data.
//! 3. Authors a [`graph::Graph`] with [`graph::GraphBuilder`].
//! 4. Builds a [`player::GraphPlayer`] with [`player::GraphPlayerBuilder`].
//! 5. Calls [`player::GraphPlayer::play`] once per frame and reads the resulting [`pose::Pose`].

pub mod clip;
pub mod core;
pub mod graph;
pub mod job;
pub mod log;
pub mod param;
pub mod player;
pub mod pose;
pub mod pose_pool;
pub mod resource;
pub mod skeleton;

pub use clip::{Clip, Sampler};
pub use graph::{Graph, GraphBuildError, GraphBuilder, Node, NodeId};
pub use param::{ParamStore, ParamValue};
pub use player::{GraphPlayer, GraphPlayerBuilder};
pub use pose::{Pose, PoseKind};
pub use resource::{PlayerBuildError, ResourceContainer};
pub use skeleton::{Joint, Skeleton};
