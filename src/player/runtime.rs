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

//! Per-node runtime state and the `update_duration`/`compute` traversal (spec §4.3-§4.4).
//!
//! Runtime nodes live together in one [`Pool`], allocated once per player and never individually
//! freed (spec §9). A node being computed is temporarily removed from the pool with
//! [`Pool::take_reserve`] so the traversal can recurse back into the same pool for its children
//! without aliasing; it is restored with [`Pool::put_back`] before returning.

use crate::core::{wrapf, Handle, Pool};
use crate::graph::{CompareOp, Graph, Node, NodeId, TransitionKind};
use crate::log::Log;
use crate::param::ParamValue;
use crate::player::context::{ComputeValue, EvalContext, PhaseRules};
use fxhash::FxHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shared bookkeeping for pose-producing nodes that have a well-defined phase in `[0, 1]`.
#[derive(Clone, Debug, Default)]
pub struct PoseTiming {
    pub phase: f32,
    pub cached_duration: f32,
    pub last_play_counter: Option<u32>,
    /// For [`PhaseRules::COPY`] nodes: whose phase this node mirrors.
    pub phase_copy_source: Option<Handle<RuntimeNode>>,
}

#[derive(Debug)]
pub struct ClipRuntime {
    pub sampler_index: usize,
    pub is_additive: bool,
    pub duration: f32,
    pub timing: PoseTiming,
}

#[derive(Debug)]
pub struct ParamRuntime {
    pub param_id: String,
}

#[derive(Debug)]
pub struct ParamComparisonRuntime {
    pub param_id: String,
    pub value: ParamValue,
    pub op: CompareOp,
}

#[derive(Debug)]
pub struct AndLogicRuntime {
    pub children: Vec<Handle<RuntimeNode>>,
}

#[derive(Debug)]
pub struct RandomRuntime {
    pub children: Vec<Handle<RuntimeNode>>,
    pub rng: StdRng,
    pub selected: usize,
    pub timing: PoseTiming,
}

#[derive(Debug)]
pub struct SpeedRuntime {
    pub child: Handle<RuntimeNode>,
    pub multiplier: Handle<RuntimeNode>,
    pub cached_duration: f32,
}

#[derive(Copy, Clone, Debug)]
pub enum BlendSelection {
    Single(Handle<RuntimeNode>),
    Pair {
        lower: Handle<RuntimeNode>,
        upper: Handle<RuntimeNode>,
        weight: f32,
    },
}

#[derive(Debug)]
pub struct BlendRuntime {
    pub factor_provider: Handle<RuntimeNode>,
    /// Sorted ascending by factor, mirroring the graph definition.
    pub children: Vec<(f32, Handle<RuntimeNode>)>,
    pub selection: BlendSelection,
    pub last_factor: Option<f32>,
    pub timing: PoseTiming,
}

#[derive(Debug)]
pub struct SumRuntime {
    pub a: Handle<RuntimeNode>,
    pub b: Handle<RuntimeNode>,
    pub cached_duration: f32,
}

#[derive(Debug)]
pub struct StateRuntime {
    pub name: String,
    pub pose: Handle<RuntimeNode>,
    pub transitions: Vec<Handle<RuntimeNode>>,
    /// Distinct required phases of outgoing transitions' conditions, ascending (spec §4.3.2).
    pub breakpoints: Vec<f32>,
    pub timing: PoseTiming,
}

#[derive(Debug)]
pub struct TransitionRuntime {
    pub condition: Handle<RuntimeNode>,
    pub destination: Handle<RuntimeNode>,
    /// The state this transition started from. Filled in by `update_state` the tick the state
    /// machine enters this transition, since the graph-level payload only names the destination.
    pub source: Handle<RuntimeNode>,
    pub duration: f32,
    pub reversible: bool,
    pub reversed: bool,
    pub phase: f32,
    pub started: bool,
    pub slot_a: usize,
    pub slot_b: usize,
    pub source_is_a: bool,
    pub source_captured_phase: f32,
    pub last_condition: Option<bool>,
}

impl TransitionRuntime {
    pub fn is_finished(&self, phase: f32) -> bool {
        if self.reversed {
            phase <= 0.0
        } else {
            phase >= 1.0
        }
    }

    fn source_slot(&self) -> usize {
        if self.source_is_a {
            self.slot_a
        } else {
            self.slot_b
        }
    }

    fn result_slot(&self) -> usize {
        if self.source_is_a {
            self.slot_b
        } else {
            self.slot_a
        }
    }
}

#[derive(Debug)]
pub struct StateMachineRuntime {
    pub states: Vec<Handle<RuntimeNode>>,
    pub current: Handle<RuntimeNode>,
    pub source_candidate: Handle<RuntimeNode>,
    pub source_candidate_phase: f32,
    pub last_committed_source: Handle<RuntimeNode>,
    pub timing: PoseTiming,
}

#[derive(Debug)]
pub struct StateConditionRuntime {
    pub required_phase: Option<f32>,
}

/// One node's live, mutable runtime state, mirroring [`Node`] one-to-one.
#[derive(Debug)]
pub enum RuntimeNode {
    Clip(ClipRuntime),
    Param(ParamRuntime),
    ParamComparison(ParamComparisonRuntime),
    AndLogic(AndLogicRuntime),
    Random(RandomRuntime),
    Speed(SpeedRuntime),
    Blend(BlendRuntime),
    Sum(SumRuntime),
    State(StateRuntime),
    StateTransition(TransitionRuntime),
    StateMachine(StateMachineRuntime),
    StateCondition(StateConditionRuntime),
}

impl RuntimeNode {
    pub fn cached_duration(&self) -> f32 {
        match self {
            RuntimeNode::Clip(c) => c.timing.cached_duration,
            RuntimeNode::Random(r) => r.timing.cached_duration,
            RuntimeNode::Speed(s) => s.cached_duration,
            RuntimeNode::Blend(b) => b.timing.cached_duration,
            RuntimeNode::Sum(s) => s.cached_duration,
            RuntimeNode::State(s) => s.timing.cached_duration,
            RuntimeNode::StateMachine(sm) => sm.timing.cached_duration,
            RuntimeNode::StateTransition(t) => t.duration,
            _ => 0.0,
        }
    }

    pub fn phase(&self) -> f32 {
        match self {
            RuntimeNode::Clip(c) => c.timing.phase,
            RuntimeNode::Random(r) => r.timing.phase,
            RuntimeNode::Blend(b) => b.timing.phase,
            RuntimeNode::State(s) => s.timing.phase,
            RuntimeNode::StateMachine(sm) => sm.timing.phase,
            RuntimeNode::StateTransition(t) => t.phase,
            _ => 0.0,
        }
    }
}

/// Everything needed across one player's traversal besides the node pool itself: the node-id to
/// handle map used only at build time is gone by then, but the ambient state-machine stack and
/// the random node seed source live here for the whole player lifetime.
pub struct StateMachineAmbient {
    pub source_candidate_phase: f32,
}

fn clamp_or_wrap(phase: f32, rules: PhaseRules) -> f32 {
    if rules.contains(PhaseRules::WRAP) {
        wrapf(phase, 0.0, 1.0)
    } else {
        phase.clamp(0.0, 1.0)
    }
}

fn begin_tick(timing: &mut PoseTiming, ctx: &EvalContext) -> bool {
    let is_first = match timing.last_play_counter {
        None => true,
        Some(last) => ctx.play_counter.wrapping_sub(last) > 1,
    };
    timing.last_play_counter = Some(ctx.play_counter);
    if is_first {
        timing.phase = 0.0;
    }
    is_first
}

/// Computes what `timing.phase` would become this tick, without committing it (spec §4.3.1).
fn next_phase_unwrapped(timing: &PoseTiming, rules: PhaseRules, ctx: &EvalContext) -> f32 {
    if rules.contains(PhaseRules::SYNC) && ctx.sync_enabled {
        if let Some(p) = ctx.sync_phase {
            return p;
        }
    }
    let delta = if timing.cached_duration > 0.0 {
        ctx.dt_s / timing.cached_duration
    } else {
        0.0
    };
    if rules.contains(PhaseRules::REVERSED) {
        timing.phase - delta
    } else {
        timing.phase + delta
    }
}

fn advance_phase(timing: &mut PoseTiming, rules: PhaseRules, ctx: &EvalContext) {
    let raw = next_phase_unwrapped(timing, rules, ctx);
    timing.phase = clamp_or_wrap(raw, rules);
}

/// Recursively updates `handle`'s cached duration and, for control nodes, its children's.
pub fn update_duration(
    pool: &mut Pool<RuntimeNode>,
    handle: Handle<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> f32 {
    let mut node = pool.take_reserve(handle);
    let duration = match &mut node {
        RuntimeNode::Clip(c) => c.timing.cached_duration,
        RuntimeNode::Param(_) | RuntimeNode::ParamComparison(_) | RuntimeNode::AndLogic(_) | RuntimeNode::StateCondition(_) => 0.0,
        RuntimeNode::Random(r) => {
            for &child in &r.children.clone() {
                update_duration(pool, child, ctx, sm_stack);
            }
            let selected = r.children[r.selected];
            let d = pool.borrow(selected).cached_duration();
            r.timing.cached_duration = d;
            d
        }
        RuntimeNode::Speed(s) => {
            let d = update_duration(pool, s.child, ctx, sm_stack);
            update_duration(pool, s.multiplier, ctx, sm_stack);
            s.cached_duration = d;
            d
        }
        RuntimeNode::Blend(b) => {
            let children = b.children.clone();
            for &(_, child) in &children {
                update_duration(pool, child, ctx, sm_stack);
            }
            update_duration(pool, b.factor_provider, ctx, sm_stack);
            let d = match b.selection {
                BlendSelection::Single(h) => pool.borrow(h).cached_duration(),
                BlendSelection::Pair { lower, upper, weight } => {
                    let ld = pool.borrow(lower).cached_duration();
                    let ud = pool.borrow(upper).cached_duration();
                    crate::core::lerpf(ld, ud, weight)
                }
            };
            b.timing.cached_duration = d;
            d
        }
        RuntimeNode::Sum(s) => {
            let a = update_duration(pool, s.a, ctx, sm_stack);
            let b = update_duration(pool, s.b, ctx, sm_stack);
            let d = a.max(b);
            s.cached_duration = d;
            d
        }
        RuntimeNode::State(s) => {
            let d = update_duration(pool, s.pose, ctx, sm_stack);
            s.timing.cached_duration = d;
            d
        }
        RuntimeNode::StateTransition(t) => t.duration,
        RuntimeNode::StateMachine(_) => {
            // Handled by `update_state_machine_duration`, which also drives transition scheduling
            // (spec §4.4.2). Plain `update_duration` recursion alone is not enough here.
            0.0
        }
    };

    if let RuntimeNode::StateMachine(_) = &node {
        pool.put_back(handle, node);
        return update_state_machine_duration(pool, handle, ctx, sm_stack);
    }

    pool.put_back(handle, node);
    duration
}

/// Drives a state machine's per-tick transition scheduling (spec §4.4.2), then returns its
/// reported duration.
fn update_state_machine_duration(
    pool: &mut Pool<RuntimeNode>,
    handle: Handle<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> f32 {
    let mut sm = take_state_machine(pool, handle);

    sm_stack.push(StateMachineAmbient {
        source_candidate_phase: 0.0,
    });

    update_duration(pool, sm.current, ctx, sm_stack);
    let next_phase = {
        let current = pool.borrow(sm.current);
        let rules = phase_rules_of(current);
        let timing = timing_of(current).expect("state machine's current node always carries timing");
        next_phase_unwrapped(timing, rules, ctx)
    };

    if update_state(&mut sm, pool, next_phase, ctx, sm_stack) {
        update_duration(pool, sm.current, ctx, sm_stack);
    }

    let duration = match pool.borrow(sm.current) {
        RuntimeNode::StateTransition(t) => pool.borrow(t.destination).cached_duration(),
        other => other.cached_duration(),
    };
    sm.timing.cached_duration = duration;
    sm.timing.phase_copy_source = Some(match pool.borrow(sm.current) {
        RuntimeNode::StateTransition(t) => t.destination,
        _ => sm.current,
    });

    sm_stack.pop();
    put_back_state_machine(pool, handle, sm);
    duration
}

fn phase_rules_of(node: &RuntimeNode) -> PhaseRules {
    match node {
        RuntimeNode::Clip(_) => PhaseRules::WRAP | PhaseRules::SYNC,
        RuntimeNode::Random(_) => PhaseRules::COPY,
        RuntimeNode::Blend(_) => PhaseRules::WRAP | PhaseRules::SYNC,
        RuntimeNode::State(_) => PhaseRules::COPY,
        RuntimeNode::StateMachine(_) => PhaseRules::COPY,
        _ => PhaseRules::empty(),
    }
}

fn timing_of(node: &RuntimeNode) -> Option<&PoseTiming> {
    match node {
        RuntimeNode::Clip(c) => Some(&c.timing),
        RuntimeNode::Random(r) => Some(&r.timing),
        RuntimeNode::Blend(b) => Some(&b.timing),
        RuntimeNode::State(s) => Some(&s.timing),
        RuntimeNode::StateMachine(sm) => Some(&sm.timing),
        _ => None,
    }
}

/// Forces a pose node's own phase back to zero. Used only by transitions restarting or reversing
/// onto a destination state (see `original_source`'s `TODO` in its transition update, carried
/// forward deliberately rather than "fixed").
fn reset_phase(pool: &mut Pool<RuntimeNode>, handle: Handle<RuntimeNode>) {
    match pool.borrow_mut(handle) {
        RuntimeNode::Clip(c) => c.timing.phase = 0.0,
        RuntimeNode::Random(r) => r.timing.phase = 0.0,
        RuntimeNode::Blend(b) => b.timing.phase = 0.0,
        RuntimeNode::State(s) => s.timing.phase = 0.0,
        RuntimeNode::StateMachine(sm) => sm.timing.phase = 0.0,
        _ => {}
    }
}

fn take_state_machine(pool: &mut Pool<RuntimeNode>, handle: Handle<RuntimeNode>) -> StateMachineRuntime {
    match pool.take_reserve(handle) {
        RuntimeNode::StateMachine(sm) => sm,
        _ => panic!("handle does not refer to a state machine node"),
    }
}

fn put_back_state_machine(pool: &mut Pool<RuntimeNode>, handle: Handle<RuntimeNode>, sm: StateMachineRuntime) {
    pool.put_back(handle, RuntimeNode::StateMachine(sm));
}

/// Implements `update_state` (spec §4.4.2): breakpoint scan, then terminal-phase scan, for a
/// state; plain `is_finished` check for a transition. Returns whether `sm.current` changed.
fn update_state(
    sm: &mut StateMachineRuntime,
    pool: &mut Pool<RuntimeNode>,
    next_phase: f32,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> bool {
    let is_state = matches!(pool.borrow(sm.current), RuntimeNode::State(_));

    if is_state {
        let (breakpoints, transitions) = match pool.borrow(sm.current) {
            RuntimeNode::State(s) => (s.breakpoints.clone(), s.transitions.clone()),
            _ => unreachable!(),
        };

        for &bp in breakpoints.iter().filter(|&&bp| bp < next_phase) {
            sm.source_candidate = sm.current;
            sm.source_candidate_phase = bp;
            if let Some(transition) = first_passing_transition(&transitions, pool, ctx, sm_stack, bp) {
                sm.last_committed_source = sm.current;
                if let RuntimeNode::StateTransition(t) = pool.borrow_mut(transition) {
                    t.source = sm.current;
                }
                sm.current = transition;
                return true;
            }
        }

        sm.source_candidate = sm.current;
        sm.source_candidate_phase = next_phase;
        if let Some(transition) = first_passing_transition(&transitions, pool, ctx, sm_stack, next_phase) {
            sm.last_committed_source = sm.current;
            if let RuntimeNode::StateTransition(t) = pool.borrow_mut(transition) {
                t.source = sm.current;
            }
            sm.current = transition;
            return true;
        }

        false
    } else {
        let (destination, finished) = match pool.borrow(sm.current) {
            RuntimeNode::StateTransition(t) => (t.destination, t.is_finished(next_phase)),
            _ => unreachable!(),
        };
        if finished {
            sm.current = destination;
            true
        } else {
            false
        }
    }
}

fn first_passing_transition(
    transitions: &[Handle<RuntimeNode>],
    pool: &mut Pool<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
    phase: f32,
) -> Option<Handle<RuntimeNode>> {
    if let Some(top) = sm_stack.last_mut() {
        top.source_candidate_phase = phase;
    }
    for &transition in transitions {
        let condition = match pool.borrow(transition) {
            RuntimeNode::StateTransition(t) => t.condition,
            _ => continue,
        };
        if compute(pool, condition, ctx, sm_stack).expect_bool() {
            return Some(transition);
        }
    }
    None
}

/// Recursively advances phase, enqueues jobs, and returns this node's compute result (spec §4.3).
///
/// State machines are dispatched separately to [`compute_state_machine`], which needs to push and
/// pop the ambient stack around the whole call - `take_reserve`-then-`compute_inner` alone can't
/// do that bookkeeping.
pub fn compute(
    pool: &mut Pool<RuntimeNode>,
    handle: Handle<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> ComputeValue {
    if matches!(pool.borrow(handle), RuntimeNode::StateMachine(_)) {
        return compute_state_machine(pool, handle, ctx, sm_stack);
    }

    let mut node = pool.take_reserve(handle);
    let result = compute_inner(&mut node, pool, ctx, sm_stack);
    pool.put_back(handle, node);
    result
}

fn compute_inner(
    node: &mut RuntimeNode,
    pool: &mut Pool<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> ComputeValue {
    match node {
        RuntimeNode::Clip(c) => {
            begin_tick(&mut c.timing, ctx);
            advance_phase(&mut c.timing, PhaseRules::WRAP | PhaseRules::SYNC, ctx);
            let time = c.timing.phase * c.duration;
            let reg = ctx.job_queue.push_sample_clip(c.sampler_index, time, c.is_additive);
            ComputeValue::JobIndex(reg)
        }
        RuntimeNode::Param(p) => ComputeValue::Param(
            ctx.params
                .get(&p.param_id)
                .unwrap_or_else(|| panic!("unknown parameter '{}'", p.param_id)),
        ),
        RuntimeNode::ParamComparison(pc) => {
            let current = ctx
                .params
                .get(&pc.param_id)
                .unwrap_or_else(|| panic!("unknown parameter '{}'", pc.param_id));
            ComputeValue::Bool(pc.op.apply(&current, &pc.value))
        }
        RuntimeNode::AndLogic(a) => {
            let mut all_true = true;
            for &child in &a.children {
                if !compute(pool, child, ctx, sm_stack).expect_bool() {
                    all_true = false;
                    break;
                }
            }
            ComputeValue::Bool(all_true)
        }
        RuntimeNode::Random(r) => {
            let is_first = begin_tick(&mut r.timing, ctx);
            if is_first || r.children.len() == 1 {
                r.selected = if r.children.len() == 1 { 0 } else { r.rng.gen_range(0..r.children.len()) };
            } else {
                let selected_child = r.children[r.selected];
                let rules = pool.borrow(selected_child).compute_rules();
                let selected_timing = timing_of(pool.borrow(selected_child)).cloned().unwrap_or_default();
                if next_phase_unwrapped(&selected_timing, rules, ctx) > 1.0 {
                    r.selected = r.rng.gen_range(0..r.children.len());
                }
            }
            let selected = r.children[r.selected];
            let value = compute(pool, selected, ctx, sm_stack);
            r.timing.phase = pool.borrow(selected).phase();
            r.timing.cached_duration = pool.borrow(selected).cached_duration();
            value
        }
        RuntimeNode::Speed(s) => {
            let multiplier = compute(pool, s.multiplier, ctx, sm_stack).expect_float();
            let mut child_ctx = ctx.with_scaled_dt(multiplier);
            compute(pool, s.child, &mut child_ctx, sm_stack)
        }
        RuntimeNode::Blend(b) => {
            begin_tick(&mut b.timing, ctx);
            let factor = compute(pool, b.factor_provider, ctx, sm_stack).expect_float();
            if b.last_factor != Some(factor) {
                b.selection = select_blend(&b.children, factor);
                b.last_factor = Some(factor);
            }
            // Read off the single "what would my phase become" value before committing it, so
            // children are synchronised to the same value this node advances to - not a second,
            // already-advanced step past it.
            let rules = PhaseRules::WRAP | PhaseRules::SYNC;
            let sync_phase = next_phase_unwrapped(&b.timing, rules, ctx);
            advance_phase(&mut b.timing, rules, ctx);

            match b.selection {
                BlendSelection::Single(h) => {
                    let mut child_ctx = ctx.with_sync_phase(sync_phase);
                    compute(pool, h, &mut child_ctx, sm_stack)
                }
                BlendSelection::Pair { lower, upper, weight } => {
                    let a_reg = {
                        let mut child_ctx = ctx.with_sync_phase(sync_phase);
                        compute(pool, lower, &mut child_ctx, sm_stack).expect_job_index()
                    };
                    let b_reg = {
                        let mut child_ctx = ctx.with_sync_phase(sync_phase);
                        compute(pool, upper, &mut child_ctx, sm_stack).expect_job_index()
                    };
                    let out = ctx.job_queue.push_blend(a_reg, b_reg, weight);
                    ComputeValue::JobIndex(out)
                }
            }
        }
        RuntimeNode::Sum(s) => {
            let a_reg = compute(pool, s.a, ctx, sm_stack).expect_job_index();
            let additive_reg = compute(pool, s.b, ctx, sm_stack).expect_job_index();
            let out = ctx.job_queue.push_add(a_reg, additive_reg);
            ComputeValue::JobIndex(out)
        }
        RuntimeNode::State(s) => {
            let value = compute(pool, s.pose, ctx, sm_stack);
            s.timing.phase = pool.borrow(s.pose).phase();
            s.timing.cached_duration = pool.borrow(s.pose).cached_duration();
            value
        }
        RuntimeNode::StateTransition(t) => compute_transition(t, pool, ctx, sm_stack),
        RuntimeNode::StateCondition(c) => {
            let phase = sm_stack
                .last()
                .unwrap_or_else(|| panic!("state_condition evaluated outside any state machine"))
                .source_candidate_phase;
            ComputeValue::Bool(match c.required_phase {
                Some(required) => phase >= required,
                None => true,
            })
        }
        RuntimeNode::StateMachine(_) => {
            panic!("state machine compute must go through compute_state_machine, not compute_inner")
        }
    }
}

impl RuntimeNode {
    fn compute_rules(&self) -> PhaseRules {
        phase_rules_of(self)
    }
}

fn select_blend(children: &[(f32, Handle<RuntimeNode>)], factor: f32) -> BlendSelection {
    debug_assert!(!children.is_empty(), "blend node must have at least one child");

    match children.iter().position(|&(f, _)| f >= factor) {
        None => BlendSelection::Single(children.last().unwrap().1),
        Some(0) => BlendSelection::Single(children[0].1),
        Some(idx) => {
            let (upper_factor, upper_handle) = children[idx];
            if (upper_factor - factor).abs() < f32::EPSILON {
                BlendSelection::Single(upper_handle)
            } else {
                let (lower_factor, lower_handle) = children[idx - 1];
                let weight = if (upper_factor - lower_factor).abs() < f32::EPSILON {
                    1.0
                } else {
                    (factor - lower_factor) / (upper_factor - lower_factor)
                };
                BlendSelection::Pair {
                    lower: lower_handle,
                    upper: upper_handle,
                    weight,
                }
            }
        }
    }
}

/// Implements the state machine's top-level `compute` (spec §4.4.2): for a state, just forward;
/// for a transition, re-run `update_state` under the true, synchronised phase before forwarding.
pub fn compute_state_machine(
    pool: &mut Pool<RuntimeNode>,
    handle: Handle<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> ComputeValue {
    let mut sm = take_state_machine(pool, handle);

    sm_stack.push(StateMachineAmbient {
        source_candidate_phase: sm.source_candidate_phase,
    });

    if ctx.sync_enabled {
        let has_breakpoints = matches!(pool.borrow(sm.current), RuntimeNode::State(s) if !s.breakpoints.is_empty());
        if has_breakpoints {
            update_state(&mut sm, pool, sm.timing.phase, ctx, sm_stack);
        }
    }

    let value = compute(pool, sm.current, ctx, sm_stack);
    sm.timing.phase = pool.borrow(sm.current).phase();

    sm_stack.pop();
    put_back_state_machine(pool, handle, sm);
    value
}

fn compute_transition(
    t: &mut TransitionRuntime,
    pool: &mut Pool<RuntimeNode>,
    ctx: &mut EvalContext,
    sm_stack: &mut Vec<StateMachineAmbient>,
) -> ComputeValue {
    let condition_true = compute(pool, t.condition, ctx, sm_stack).expect_bool();
    if t.reversible {
        if let Some(previous) = t.last_condition {
            if previous != condition_true {
                t.reversed = !t.reversed;
                t.source_captured_phase = t.phase;
                let swap = t.source_is_a;
                t.source_is_a = !swap;
                Log::info(format!(
                    "transition reversed, now heading toward its {}",
                    if t.reversed { "source" } else { "destination" }
                ));
                // The destination's own phase restarts at zero on every (re)start of the
                // transition, reversal included - a quirk carried over from the engine this is
                // based on rather than something spec.md asks for outright.
                reset_phase(pool, t.destination);
            }
        }
    }
    t.last_condition = Some(condition_true);

    let delta = if t.duration > 0.0 { ctx.dt_s / t.duration } else { 0.0 };
    t.phase = if t.reversed { t.phase - delta } else { t.phase + delta };

    if !t.started {
        t.started = true;
        Log::info("state machine transition started");
        t.source_captured_phase = 0.0;
        let source_candidate_phase = sm_stack
            .last()
            .map(|a| a.source_candidate_phase)
            .unwrap_or(0.0);
        t.source_captured_phase = source_candidate_phase;
        let mut source_ctx = ctx.with_sync_phase(source_candidate_phase);
        // `t.source` is the state the transition started from; it must be sampled explicitly
        // here to freeze it, since by the time the machine lands on this transition the state's
        // own `compute` for this tick may already be done (or may never run again).
        let source_reg = compute(pool, t.source, &mut source_ctx, sm_stack).expect_job_index();
        ctx.job_queue.push_save(source_reg, t.slot_a);
        t.source_is_a = true;
        reset_phase(pool, t.destination);
    }

    let weight = {
        let denom = if t.reversed {
            t.source_captured_phase
        } else {
            1.0 - t.source_captured_phase
        };
        if denom.abs() < f32::EPSILON {
            1.0
        } else {
            ((t.phase - t.source_captured_phase).abs() / denom).clamp(0.0, 1.0)
        }
    };

    let restored_source = ctx.job_queue.push_restore(t.source_slot());
    let destination_reg = compute(pool, t.destination, ctx, sm_stack).expect_job_index();
    let blended = ctx.job_queue.push_blend(restored_source, destination_reg, weight);
    ctx.job_queue.push_save(blended, t.result_slot());

    ComputeValue::JobIndex(blended)
}

/// Builds the runtime node pool for `graph`, wiring cyclic references (state <-> transition) in
/// two passes as spec §9 describes.
pub fn build_runtime_pool(
    graph: &Graph,
    clip_durations: &FxHashMap<NodeId, f32>,
    sampler_indices: &FxHashMap<NodeId, usize>,
    clip_additive: &FxHashMap<NodeId, bool>,
    random_seed_base: u64,
) -> (Pool<RuntimeNode>, FxHashMap<NodeId, Handle<RuntimeNode>>) {
    let mut pool = Pool::new();
    let mut handles = FxHashMap::default();

    for (id, _) in graph.nodes() {
        handles.insert(id, pool.spawn_empty());
    }

    for (id, node) in graph.nodes() {
        let handle = handles[&id];
        let runtime = build_one(id, node, &handles, clip_durations, sampler_indices, clip_additive, random_seed_base);
        pool.put_back(handle, runtime);
    }

    (pool, handles)
}

fn build_one(
    id: NodeId,
    node: &Node,
    handles: &FxHashMap<NodeId, Handle<RuntimeNode>>,
    clip_durations: &FxHashMap<NodeId, f32>,
    sampler_indices: &FxHashMap<NodeId, usize>,
    clip_additive: &FxHashMap<NodeId, bool>,
    random_seed_base: u64,
) -> RuntimeNode {
    let h = |id: &NodeId| handles[id];
    match node {
        Node::Clip { .. } => RuntimeNode::Clip(ClipRuntime {
            sampler_index: sampler_indices[&id],
            is_additive: clip_additive.get(&id).copied().unwrap_or(false),
            duration: clip_durations[&id],
            timing: PoseTiming::default(),
        }),
        Node::Param { param_id } => RuntimeNode::Param(ParamRuntime {
            param_id: param_id.clone(),
        }),
        Node::ParamComparison { param_id, value, op } => RuntimeNode::ParamComparison(ParamComparisonRuntime {
            param_id: param_id.clone(),
            value: *value,
            op: *op,
        }),
        Node::AndLogic { children } => RuntimeNode::AndLogic(AndLogicRuntime {
            children: children.iter().map(&h).collect(),
        }),
        Node::Random { children, seed } => RuntimeNode::Random(RandomRuntime {
            children: children.iter().map(&h).collect(),
            rng: StdRng::seed_from_u64(random_seed_base ^ *seed),
            selected: 0,
            timing: PoseTiming::default(),
        }),
        Node::Speed { child, multiplier } => RuntimeNode::Speed(SpeedRuntime {
            child: h(child),
            multiplier: h(multiplier),
            cached_duration: 0.0,
        }),
        Node::Blend { factor_provider, children } => {
            let children: Vec<(f32, Handle<RuntimeNode>)> = children.iter().map(|(f, id)| (*f, h(id))).collect();
            let fallback = children[0].1;
            RuntimeNode::Blend(BlendRuntime {
                factor_provider: h(factor_provider),
                children,
                selection: BlendSelection::Single(fallback),
                last_factor: None,
                timing: PoseTiming::default(),
            })
        }
        Node::Sum { a, b } => RuntimeNode::Sum(SumRuntime {
            a: h(a),
            b: h(b),
            cached_duration: 0.0,
        }),
        Node::State { name, pose, transitions } => RuntimeNode::State(StateRuntime {
            name: name.clone(),
            pose: h(pose),
            transitions: transitions.iter().map(&h).collect(),
            breakpoints: Vec::new(),
            timing: PoseTiming::default(),
        }),
        Node::StateTransition {
            destination,
            condition,
            duration,
            reversible,
            kind: TransitionKind::FrozenFade,
        } => RuntimeNode::StateTransition(TransitionRuntime {
            condition: h(condition),
            destination: h(destination),
            source: Handle::NONE,
            duration: *duration,
            reversible: *reversible,
            reversed: false,
            phase: 0.0,
            started: false,
            slot_a: 0,
            slot_b: 0,
            source_is_a: true,
            source_captured_phase: 0.0,
            last_condition: None,
        }),
        Node::StateMachine { states } => RuntimeNode::StateMachine(StateMachineRuntime {
            states: states.iter().map(&h).collect(),
            current: h(&states[0]),
            source_candidate: h(&states[0]),
            source_candidate_phase: 0.0,
            last_committed_source: h(&states[0]),
            timing: PoseTiming::default(),
        }),
        Node::StateCondition { required_phase } => RuntimeNode::StateCondition(StateConditionRuntime {
            required_phase: *required_phase,
        }),
    }
}

/// Fills in each `StateTransition`'s saved-pose slot indices and each `State`'s breakpoint list,
/// a second pass over the already-built pool since both need every node to already exist.
pub fn finalize_breakpoints_and_slots(
    pool: &mut Pool<RuntimeNode>,
    handles: &FxHashMap<NodeId, Handle<RuntimeNode>>,
    graph: &Graph,
    next_slot: &mut usize,
) {
    for (id, node) in graph.nodes() {
        if let Node::StateTransition { .. } = node {
            let handle = handles[&id];
            let (slot_a, slot_b) = (*next_slot, *next_slot + 1);
            *next_slot += 2;
            if let RuntimeNode::StateTransition(t) = pool.borrow_mut(handle) {
                t.slot_a = slot_a;
                t.slot_b = slot_b;
            }
        }
    }

    for (id, node) in graph.nodes() {
        if let Node::State { transitions, .. } = node {
            let mut phases = Vec::new();
            for transition_id in transitions {
                collect_required_phases(graph, *transition_id, &mut phases);
            }
            phases.sort_by(|a: &f32, b: &f32| a.partial_cmp(b).unwrap());
            phases.dedup();
            let handle = handles[&id];
            if let RuntimeNode::State(s) = pool.borrow_mut(handle) {
                s.breakpoints = phases;
            }
        }
    }
}

fn collect_required_phases(graph: &Graph, transition_id: NodeId, out: &mut Vec<f32>) {
    if let Node::StateTransition { condition, .. } = graph.node(transition_id) {
        collect_required_phases_from(graph, *condition, out);
    }
}

fn collect_required_phases_from(graph: &Graph, id: NodeId, out: &mut Vec<f32>) {
    match graph.node(id) {
        Node::StateCondition { required_phase: Some(p) } => out.push(*p),
        Node::AndLogic { children } => {
            for child in children {
                collect_required_phases_from(graph, *child, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(index: u32) -> Handle<RuntimeNode> {
        Handle::new(index, 1)
    }

    #[test]
    fn select_blend_below_first_factor_clamps_to_first() {
        let children = [(0.25, h(0)), (0.75, h(1))];
        match select_blend(&children, 0.0) {
            BlendSelection::Single(node) => assert_eq!(node, h(0)),
            other => panic!("expected single selection, got {other:?}"),
        }
    }

    #[test]
    fn select_blend_above_last_factor_clamps_to_last() {
        let children = [(0.25, h(0)), (0.75, h(1))];
        match select_blend(&children, 1.0) {
            BlendSelection::Single(node) => assert_eq!(node, h(1)),
            other => panic!("expected single selection, got {other:?}"),
        }
    }

    #[test]
    fn select_blend_between_factors_yields_weighted_pair() {
        let children = [(0.0, h(0)), (1.0, h(1))];
        match select_blend(&children, 0.25) {
            BlendSelection::Pair { lower, upper, weight } => {
                assert_eq!(lower, h(0));
                assert_eq!(upper, h(1));
                assert!((weight - 0.25).abs() < 1e-6);
            }
            other => panic!("expected pair selection, got {other:?}"),
        }
    }

    #[test]
    fn select_blend_exact_factor_match_is_single() {
        let children = [(0.0, h(0)), (0.5, h(1)), (1.0, h(2))];
        match select_blend(&children, 0.5) {
            BlendSelection::Single(node) => assert_eq!(node, h(1)),
            other => panic!("expected single selection, got {other:?}"),
        }
    }

    #[test]
    fn clamp_or_wrap_wraps_past_one() {
        let wrapped = clamp_or_wrap(1.25, PhaseRules::WRAP);
        assert!((wrapped - 0.25).abs() < 1e-6);
    }

    #[test]
    fn clamp_or_wrap_clamps_without_wrap_flag() {
        assert_eq!(clamp_or_wrap(1.25, PhaseRules::empty()), 1.0);
        assert_eq!(clamp_or_wrap(-0.25, PhaseRules::empty()), 0.0);
    }
}
