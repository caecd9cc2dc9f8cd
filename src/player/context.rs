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

//! Per-tick traversal context (spec §4.3) and the rules governing how a pose node's phase moves.

use crate::job::JobQueue;
use crate::param::ParamStore;
use bitflags::bitflags;

bitflags! {
    /// Controls how a pose node's phase advances each `compute` (spec §4.3.1).
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct PhaseRules: u8 {
        /// Wrap past 1.0 by taking the fractional part. Without this flag, clamp at 1.0.
        const WRAP = 0b0001;
        /// If the context carries a `sync_phase`, copy it (clamped) instead of advancing by `dt/duration`.
        const SYNC = 0b0010;
        /// Phase is copied verbatim from another runtime node, not advanced locally.
        const COPY = 0b0100;
        /// Advance phase in the negative direction.
        const REVERSED = 0b1000;
    }
}

impl Default for PhaseRules {
    fn default() -> Self {
        PhaseRules::WRAP
    }
}

/// The dynamically-typed result of a node's `compute` (spec §9: "a strict implementation should
/// model [the reference's `Any` return] as a tagged variant").
#[derive(Copy, Clone, Debug)]
pub enum ComputeValue {
    Unit,
    /// Register in the job queue holding this pose node's result.
    JobIndex(usize),
    Bool(bool),
    Param(crate::param::ParamValue),
}

impl ComputeValue {
    pub fn expect_job_index(self) -> usize {
        match self {
            ComputeValue::JobIndex(i) => i,
            other => panic!("expected a pose-producing compute result, got {other:?}"),
        }
    }

    pub fn expect_bool(self) -> bool {
        match self {
            ComputeValue::Bool(b) => b,
            other => panic!("expected a boolean compute result, got {other:?}"),
        }
    }

    pub fn expect_float(self) -> f32 {
        match self {
            ComputeValue::Param(v) => v
                .as_float()
                .unwrap_or_else(|| panic!("expected a numeric parameter value, got {v:?}")),
            other => panic!("expected a numeric compute result, got {other:?}"),
        }
    }
}

/// Everything `update_duration` and `compute` need to see for one tick, threaded down the node
/// tree and narrowed by wrapper nodes (`speed` scales `dt_s`, `blend`/state machines set
/// `sync_phase`).
pub struct EvalContext<'a> {
    pub job_queue: &'a mut JobQueue,
    pub params: &'a ParamStore,
    pub play_counter: u32,
    pub dt_s: f32,
    pub sync_enabled: bool,
    pub sync_phase: Option<f32>,
}

impl<'a> EvalContext<'a> {
    /// Borrows a context identical to `self` but with `dt_s` scaled, for `speed` nodes.
    pub fn with_scaled_dt(&mut self, multiplier: f32) -> EvalContext<'_> {
        EvalContext {
            job_queue: self.job_queue,
            params: self.params,
            play_counter: self.play_counter,
            dt_s: self.dt_s * multiplier,
            sync_enabled: self.sync_enabled,
            sync_phase: self.sync_phase,
        }
    }

    /// Borrows a context identical to `self` but forcing synchronisation with `phase`, for `blend`
    /// and state-machine nodes.
    pub fn with_sync_phase(&mut self, phase: f32) -> EvalContext<'_> {
        EvalContext {
            job_queue: self.job_queue,
            params: self.params,
            play_counter: self.play_counter,
            dt_s: self.dt_s,
            sync_enabled: true,
            sync_phase: Some(phase),
        }
    }

    pub fn reborrow(&mut self) -> EvalContext<'_> {
        EvalContext {
            job_queue: self.job_queue,
            params: self.params,
            play_counter: self.play_counter,
            dt_s: self.dt_s,
            sync_enabled: self.sync_enabled,
            sync_phase: self.sync_phase,
        }
    }
}
