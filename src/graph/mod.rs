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

//! The static, immutable graph definition: typed nodes with a designated root. A [`Graph`] never
//! changes once built; all per-evaluation state lives in the player's runtime nodes instead
//! (`crate::player`).

mod node;

pub use node::{CompareOp, Node, NodeId, TransitionKind};

use crate::log::Log;
use crate::param::ParamValue;
use fxhash::FxHashMap;
use std::fmt;

/// A validation failure discovered while building a [`Graph`]. All of these are recoverable:
/// the host is expected to fix the authored graph and retry, not crash.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphBuildError {
    EmptyNodeList,
    RootDoesNotResolve(NodeId),
    EmptyBlendList(NodeId),
    StateMachineWithNoStates(NodeId),
    DanglingTransitionDestination { transition: NodeId, destination: NodeId },
    SpeedNodeMissingMultiplier(NodeId),
    DanglingChildReference { node: NodeId, child: NodeId },
}

impl fmt::Display for GraphBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphBuildError::EmptyNodeList => write!(f, "graph has no nodes"),
            GraphBuildError::RootDoesNotResolve(id) => write!(f, "root node {id:?} does not exist"),
            GraphBuildError::EmptyBlendList(id) => write!(f, "blend node {id:?} has an empty child list"),
            GraphBuildError::StateMachineWithNoStates(id) => {
                write!(f, "state machine node {id:?} has no states")
            }
            GraphBuildError::DanglingTransitionDestination { transition, destination } => write!(
                f,
                "transition {transition:?} references destination state {destination:?} which does not exist"
            ),
            GraphBuildError::SpeedNodeMissingMultiplier(id) => {
                write!(f, "speed node {id:?} has no multiplier child")
            }
            GraphBuildError::DanglingChildReference { node, child } => {
                write!(f, "node {node:?} references child {child:?} which does not exist")
            }
        }
    }
}

impl std::error::Error for GraphBuildError {}

/// An immutable, validated animation graph: a set of typed nodes and a root (spec §3.4).
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: FxHashMap<NodeId, Node>,
    root: NodeId,
    skeleton_id: String,
}

impl Graph {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn skeleton_id(&self) -> &str {
        &self.skeleton_id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes
            .get(&id)
            .unwrap_or_else(|| panic!("graph node {id:?} does not exist - this is a contract violation, graphs are validated at build time"))
    }

    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }
}

/// Incrementally assembles a [`Graph`], validating all of spec §3.4's structural invariants on
/// [`GraphBuilder::build`].
pub struct GraphBuilder {
    nodes: FxHashMap<NodeId, Node>,
    root: Option<NodeId>,
    skeleton_id: String,
}

impl GraphBuilder {
    pub fn new(skeleton_id: impl Into<String>) -> Self {
        Self {
            nodes: FxHashMap::default(),
            root: None,
            skeleton_id: skeleton_id.into(),
        }
    }

    pub fn add_node(&mut self, id: NodeId, node: Node) -> &mut Self {
        self.nodes.insert(id, node);
        self
    }

    pub fn set_root(&mut self, id: NodeId) -> &mut Self {
        self.root = Some(id);
        self
    }

    pub fn build(self) -> Result<Graph, GraphBuildError> {
        if self.nodes.is_empty() {
            Log::warn("graph validation failed: node list is empty");
            return Err(GraphBuildError::EmptyNodeList);
        }

        let root = self.root.unwrap_or_else(|| {
            panic!("GraphBuilder::build called without set_root - this is a builder-usage bug, not a data error")
        });

        if !self.nodes.contains_key(&root) {
            Log::warn(format!("graph validation failed: root node {root:?} does not resolve"));
            return Err(GraphBuildError::RootDoesNotResolve(root));
        }

        for (id, node) in &self.nodes {
            match node {
                Node::Blend { children, .. } if children.is_empty() => {
                    Log::warn(format!("graph validation failed: blend node {id:?} has no children"));
                    return Err(GraphBuildError::EmptyBlendList(*id));
                }
                Node::StateMachine { states } if states.is_empty() => {
                    Log::warn(format!("graph validation failed: state machine {id:?} has no states"));
                    return Err(GraphBuildError::StateMachineWithNoStates(*id));
                }
                Node::StateTransition { destination, .. } => {
                    if !matches!(self.nodes.get(destination), Some(Node::State { .. })) {
                        Log::warn(format!(
                            "graph validation failed: transition {id:?} destination {destination:?} is not a state"
                        ));
                        return Err(GraphBuildError::DanglingTransitionDestination {
                            transition: *id,
                            destination: *destination,
                        });
                    }
                }
                Node::Speed { multiplier, .. } if !self.nodes.contains_key(multiplier) => {
                    Log::warn(format!("graph validation failed: speed node {id:?} has no multiplier child"));
                    return Err(GraphBuildError::SpeedNodeMissingMultiplier(*id));
                }
                _ => {}
            }

            for child in node.children() {
                if !self.nodes.contains_key(&child) {
                    Log::warn(format!("graph validation failed: node {id:?} references missing child {child:?}"));
                    return Err(GraphBuildError::DanglingChildReference { node: *id, child });
                }
            }
        }

        Ok(Graph {
            nodes: self.nodes,
            root,
            skeleton_id: self.skeleton_id,
        })
    }
}

/// A value a `param_comparison` node checks a parameter against (reuses [`ParamValue`]'s
/// bit-equal semantics for floats, see spec §3.3).
pub type ComparedValue = ParamValue;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_is_rejected() {
        let builder = GraphBuilder::new("biped");
        assert_eq!(builder.build().unwrap_err(), GraphBuildError::EmptyNodeList);
    }

    #[test]
    fn unresolved_root_is_rejected() {
        let mut builder = GraphBuilder::new("biped");
        builder.add_node(NodeId(0), Node::Clip { clip_id: "idle".into() });
        builder.set_root(NodeId(1));
        assert!(matches!(builder.build().unwrap_err(), GraphBuildError::RootDoesNotResolve(_)));
    }

    #[test]
    fn empty_blend_list_is_rejected() {
        let mut builder = GraphBuilder::new("biped");
        builder.add_node(
            NodeId(0),
            Node::Blend {
                factor_provider: NodeId(1),
                children: vec![],
            },
        );
        builder.add_node(NodeId(1), Node::Param { param_id: "factor".into() });
        builder.set_root(NodeId(0));
        assert_eq!(builder.build().unwrap_err(), GraphBuildError::EmptyBlendList(NodeId(0)));
    }

    #[test]
    fn dangling_transition_destination_is_rejected() {
        let mut builder = GraphBuilder::new("biped");
        builder.add_node(NodeId(0), Node::Clip { clip_id: "idle".into() });
        builder.add_node(
            NodeId(1),
            Node::State {
                name: "A".into(),
                pose: NodeId(0),
                transitions: vec![NodeId(2)],
            },
        );
        builder.add_node(
            NodeId(2),
            Node::StateTransition {
                condition: NodeId(3),
                destination: NodeId(99),
                kind: TransitionKind::FrozenFade,
                duration: 0.2,
                reversible: true,
            },
        );
        builder.add_node(NodeId(3), Node::StateCondition { required_phase: None });
        builder.add_node(NodeId(4), Node::StateMachine { states: vec![NodeId(1)] });
        builder.set_root(NodeId(4));
        assert!(matches!(
            builder.build().unwrap_err(),
            GraphBuildError::DanglingTransitionDestination { .. }
        ));
    }

    #[test]
    fn well_formed_graph_builds() {
        let mut builder = GraphBuilder::new("biped");
        builder.add_node(NodeId(0), Node::Clip { clip_id: "idle".into() });
        builder.set_root(NodeId(0));
        assert!(builder.build().is_ok());
    }
}
