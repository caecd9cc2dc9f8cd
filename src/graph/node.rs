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

//! Node variants making up the graph's static node catalogue (spec §3.4).

use crate::param::ParamValue;

/// A node's identifier, stable and unique within its graph.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(pub u8);

/// Comparison operator for a `param_comparison` node.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn apply(self, a: &ParamValue, b: &ParamValue) -> bool {
        match self {
            CompareOp::Equal => a == b,
            CompareOp::NotEqual => a != b,
        }
    }
}

/// The only transition blend flavour this crate implements (spec §4.4.3).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TransitionKind {
    FrozenFade,
}

/// One node's payload. See spec §3.4 for the full variant table.
#[derive(Clone, Debug)]
pub enum Node {
    Clip {
        clip_id: String,
    },
    Param {
        param_id: String,
    },
    ParamComparison {
        param_id: String,
        value: ParamValue,
        op: CompareOp,
    },
    AndLogic {
        children: Vec<NodeId>,
    },
    Random {
        children: Vec<NodeId>,
        seed: u64,
    },
    Speed {
        child: NodeId,
        multiplier: NodeId,
    },
    /// `children` is sorted by factor ascending; non-empty (enforced by `GraphBuilder::build`).
    Blend {
        factor_provider: NodeId,
        children: Vec<(f32, NodeId)>,
    },
    Sum {
        a: NodeId,
        b: NodeId,
    },
    State {
        name: String,
        pose: NodeId,
        transitions: Vec<NodeId>,
    },
    StateTransition {
        condition: NodeId,
        destination: NodeId,
        kind: TransitionKind,
        duration: f32,
        reversible: bool,
    },
    /// `states` is non-empty (enforced by `GraphBuilder::build`); `states[0]` is the initial state.
    StateMachine {
        states: Vec<NodeId>,
    },
    StateCondition {
        required_phase: Option<f32>,
    },
}

impl Node {
    /// Every node id this node's payload references, for graph validation and descendant walks.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Clip { .. } | Node::Param { .. } | Node::ParamComparison { .. } | Node::StateCondition { .. } => {
                Vec::new()
            }
            Node::AndLogic { children } => children.clone(),
            Node::Random { children, .. } => children.clone(),
            Node::Speed { child, multiplier } => vec![*child, *multiplier],
            Node::Blend { factor_provider, children } => {
                let mut ids: Vec<NodeId> = children.iter().map(|(_, id)| *id).collect();
                ids.push(*factor_provider);
                ids
            }
            Node::Sum { a, b } => vec![*a, *b],
            Node::State { pose, transitions, .. } => {
                let mut ids = transitions.clone();
                ids.push(*pose);
                ids
            }
            Node::StateTransition { condition, destination, .. } => vec![*condition, *destination],
            Node::StateMachine { states } => states.clone(),
        }
    }

    /// Whether this variant produces a pose (as opposed to a float/bool/param value).
    pub fn is_pose_node(&self) -> bool {
        matches!(
            self,
            Node::Clip { .. }
                | Node::Random { .. }
                | Node::Speed { .. }
                | Node::Blend { .. }
                | Node::Sum { .. }
                | Node::State { .. }
                | Node::StateTransition { .. }
                | Node::StateMachine { .. }
        )
    }
}
