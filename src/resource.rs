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

//! The external interface a host provides for resolving skeleton and clip ids into real data.
//! This crate never reads resource files itself - that is the host's cooked-data pipeline, out of
//! scope per the specification's non-goals.

use crate::clip::Clip;
use crate::skeleton::Skeleton;
use std::fmt;
use std::sync::Arc;

/// A host-provided lookup of skeletons and clips by string id. Implemented by whatever owns the
/// project's cooked resource table; this crate only ever calls `skeleton`/`clip` during player
/// construction (spec §6).
pub trait ResourceContainer {
    fn skeleton(&self, id: &str) -> Option<Arc<Skeleton>>;
    fn clip(&self, id: &str) -> Option<Arc<dyn Clip>>;
}

/// A construction-time failure while building a [`crate::player::GraphPlayer`]. Recoverable: the
/// host is expected to report this and decline to spawn whatever asked for the player.
#[derive(Debug, Clone)]
pub enum PlayerBuildError {
    UnknownSkeleton(String),
    UnknownClip(String),
    Graph(crate::graph::GraphBuildError),
}

impl fmt::Display for PlayerBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerBuildError::UnknownSkeleton(id) => write!(f, "unknown skeleton resource '{id}'"),
            PlayerBuildError::UnknownClip(id) => write!(f, "unknown clip resource '{id}'"),
            PlayerBuildError::Graph(e) => write!(f, "graph is invalid: {e}"),
        }
    }
}

impl std::error::Error for PlayerBuildError {}

impl From<crate::graph::GraphBuildError> for PlayerBuildError {
    fn from(e: crate::graph::GraphBuildError) -> Self {
        PlayerBuildError::Graph(e)
    }
}
