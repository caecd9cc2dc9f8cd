//! End-to-end scenarios driving a full [`GraphPlayer`] through [`GraphBuilder`]-authored graphs.

use fxhash::FxHashMap;
use motion_graph::clip::Sampler;
use motion_graph::core::Transform;
use motion_graph::graph::{CompareOp, TransitionKind};
use motion_graph::param::{ParamStore, ParamValue};
use motion_graph::skeleton::Joint;
use motion_graph::{Clip, Graph, GraphBuilder, GraphPlayerBuilder, Node, NodeId, ResourceContainer, Skeleton};
use nalgebra::Vector3;
use std::sync::Arc;

fn skeleton() -> Arc<Skeleton> {
    Arc::new(Skeleton::new(vec![Joint {
        name: "root".into(),
        parent: None,
        rest_pose: Transform::new(Vector3::new(5.0, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0)),
    }]))
}

fn translation_x(x: f32) -> Transform {
    Transform::new(Vector3::new(x, 0.0, 0.0), Default::default(), Vector3::new(1.0, 1.0, 1.0))
}

/// A clip that always samples to the same transform, regardless of time - the tests only care
/// about which pose won a blend or transition, not about intra-clip animation.
#[derive(Debug)]
struct ConstClip {
    duration: f32,
    transform: Transform,
}

struct ConstSampler(Transform);

impl Sampler for ConstSampler {
    fn sample(&mut self, _time: f32, out: &mut motion_graph::Pose) {
        out.set_joint_local(0, self.0);
    }
}

impl Clip for ConstClip {
    fn duration(&self) -> f32 {
        self.duration
    }

    fn create_sampler(&self) -> Box<dyn Sampler> {
        Box::new(ConstSampler(self.transform))
    }
}

/// A clip whose sample is proportional to elapsed time, used to make a `speed` node's effect on
/// playback rate directly observable.
#[derive(Debug)]
struct RampClip {
    duration: f32,
    rate: f32,
}

struct RampSampler(f32);

impl Sampler for RampSampler {
    fn sample(&mut self, time: f32, out: &mut motion_graph::Pose) {
        out.set_joint_local(0, translation_x(time * self.0));
    }
}

impl Clip for RampClip {
    fn duration(&self) -> f32 {
        self.duration
    }

    fn create_sampler(&self) -> Box<dyn Sampler> {
        Box::new(RampSampler(self.rate))
    }
}

/// A `ResourceContainer` test double: all skeletons and clips live in-memory, keyed by id.
struct TestResources {
    skeleton: Arc<Skeleton>,
    clips: FxHashMap<String, Arc<dyn Clip>>,
}

impl TestResources {
    fn new() -> Self {
        Self {
            skeleton: skeleton(),
            clips: FxHashMap::default(),
        }
    }

    fn with_clip(mut self, id: &str, clip: impl Clip + 'static) -> Self {
        self.clips.insert(id.to_owned(), Arc::new(clip));
        self
    }
}

impl ResourceContainer for TestResources {
    fn skeleton(&self, id: &str) -> Option<Arc<Skeleton>> {
        if id == "biped" {
            Some(self.skeleton.clone())
        } else {
            None
        }
    }

    fn clip(&self, id: &str) -> Option<Arc<dyn Clip>> {
        self.clips.get(id).cloned()
    }
}

fn build_graph(skeleton_id: &str, nodes: Vec<(NodeId, Node)>, root: NodeId) -> Graph {
    let mut builder = GraphBuilder::new(skeleton_id);
    for (id, node) in nodes {
        builder.add_node(id, node);
    }
    builder.set_root(root);
    builder.build().expect("test graph must be well-formed")
}

#[test]
fn rest_pose_scenario_samples_skeleton_rest_pose() {
    let resources = TestResources::new().with_clip(
        "idle",
        ConstClip {
            duration: 1.0,
            transform: translation_x(5.0),
        },
    );
    let graph = build_graph("biped", vec![(NodeId(0), Node::Clip { clip_id: "idle".into() })], NodeId(0));
    let mut player = GraphPlayerBuilder::new(Arc::new(graph), &resources).build().unwrap();

    let params = ParamStore::new();
    let mut out = player.new_pose();
    player.play(1.0 / 60.0, &params, &mut out);

    assert_eq!(out.joint_local(0).translation.x, 5.0);
}

#[test]
fn blend_node_at_midpoint_factor_averages_its_two_children() {
    let resources = TestResources::new()
        .with_clip(
            "low",
            ConstClip {
                duration: 1.0,
                transform: translation_x(0.0),
            },
        )
        .with_clip(
            "high",
            ConstClip {
                duration: 1.0,
                transform: translation_x(2.0),
            },
        );
    let graph = build_graph(
        "biped",
        vec![
            (NodeId(0), Node::Clip { clip_id: "low".into() }),
            (NodeId(1), Node::Clip { clip_id: "high".into() }),
            (NodeId(2), Node::Param { param_id: "factor".into() }),
            (
                NodeId(3),
                Node::Blend {
                    factor_provider: NodeId(2),
                    children: vec![(0.0, NodeId(0)), (1.0, NodeId(1))],
                },
            ),
        ],
        NodeId(3),
    );
    let mut player = GraphPlayerBuilder::new(Arc::new(graph), &resources).build().unwrap();

    let mut params = ParamStore::new();
    params.set("factor", ParamValue::Float(0.5));
    let mut out = player.new_pose();
    player.play(1.0 / 60.0, &params, &mut out);

    assert!((out.joint_local(0).translation.x - 1.0).abs() < 1e-5);
}

#[test]
fn speed_node_scales_how_fast_its_child_advances() {
    let fast_resources = TestResources::new().with_clip("ramp", RampClip { duration: 10.0, rate: 10.0 });
    let fast_graph = build_graph(
        "biped",
        vec![
            (NodeId(0), Node::Clip { clip_id: "ramp".into() }),
            (NodeId(1), Node::Param { param_id: "speed".into() }),
            (NodeId(2), Node::Speed { child: NodeId(0), multiplier: NodeId(1) }),
        ],
        NodeId(2),
    );
    let mut fast_player = GraphPlayerBuilder::new(Arc::new(fast_graph), &fast_resources).build().unwrap();
    let mut fast_params = ParamStore::new();
    fast_params.set("speed", ParamValue::Float(2.0));
    let mut fast_out = fast_player.new_pose();
    fast_player.play(0.05, &fast_params, &mut fast_out);

    let slow_resources = TestResources::new().with_clip("ramp", RampClip { duration: 10.0, rate: 10.0 });
    let slow_graph = build_graph(
        "biped",
        vec![
            (NodeId(0), Node::Clip { clip_id: "ramp".into() }),
            (NodeId(1), Node::Param { param_id: "speed".into() }),
            (NodeId(2), Node::Speed { child: NodeId(0), multiplier: NodeId(1) }),
        ],
        NodeId(2),
    );
    let mut slow_player = GraphPlayerBuilder::new(Arc::new(slow_graph), &slow_resources).build().unwrap();
    let mut slow_params = ParamStore::new();
    slow_params.set("speed", ParamValue::Float(1.0));
    let mut slow_out = slow_player.new_pose();
    slow_player.play(0.05, &slow_params, &mut slow_out);

    assert!(
        fast_out.joint_local(0).translation.x > slow_out.joint_local(0).translation.x * 1.5,
        "doubling the speed multiplier should roughly double how far the child clip advanced"
    );
}

fn state_machine_graph_with_param_trigger() -> (Graph, TestResources) {
    let resources = TestResources::new()
        .with_clip(
            "idle",
            ConstClip {
                duration: 1.0,
                transform: translation_x(0.0),
            },
        )
        .with_clip(
            "run",
            ConstClip {
                duration: 1.0,
                transform: translation_x(10.0),
            },
        );
    let graph = build_graph(
        "biped",
        vec![
            (NodeId(0), Node::Clip { clip_id: "idle".into() }),
            (NodeId(1), Node::Clip { clip_id: "run".into() }),
            (
                NodeId(2),
                Node::State {
                    name: "Idle".into(),
                    pose: NodeId(0),
                    transitions: vec![NodeId(3)],
                },
            ),
            (
                NodeId(4),
                Node::State {
                    name: "Run".into(),
                    pose: NodeId(1),
                    transitions: vec![],
                },
            ),
            (
                NodeId(5),
                Node::ParamComparison {
                    param_id: "trigger".into(),
                    value: ParamValue::Bool(true),
                    op: CompareOp::Equal,
                },
            ),
            (
                NodeId(3),
                Node::StateTransition {
                    destination: NodeId(4),
                    condition: NodeId(5),
                    kind: TransitionKind::FrozenFade,
                    duration: 0.01,
                    reversible: false,
                },
            ),
            (
                NodeId(6),
                Node::StateMachine {
                    states: vec![NodeId(2), NodeId(4)],
                },
            ),
        ],
        NodeId(6),
    );
    (graph, resources)
}

#[test]
fn state_machine_stays_in_idle_until_its_trigger_parameter_fires() {
    let (graph, resources) = state_machine_graph_with_param_trigger();
    let mut player = GraphPlayerBuilder::new(Arc::new(graph), &resources).build().unwrap();

    let mut params = ParamStore::new();
    params.set("trigger", ParamValue::Bool(false));
    let mut out = player.new_pose();
    player.play(1.0 / 60.0, &params, &mut out);

    assert_eq!(out.joint_local(0).translation.x, 0.0);
}

#[test]
fn state_machine_param_trigger_starts_a_transition_toward_the_target_state() {
    let (graph, resources) = state_machine_graph_with_param_trigger();
    let mut player = GraphPlayerBuilder::new(Arc::new(graph), &resources).build().unwrap();

    let mut params = ParamStore::new();
    params.set("trigger", ParamValue::Bool(false));
    let mut out = player.new_pose();
    player.play(1.0 / 60.0, &params, &mut out);

    params.set("trigger", ParamValue::Bool(true));
    // Duration is tiny relative to dt so the frozen-fade transition's weight saturates to 1.0
    // this tick, landing squarely on the destination's pose.
    player.play(0.1, &params, &mut out);

    assert!((out.joint_local(0).translation.x - 10.0).abs() < 1e-3);
}

#[test]
fn state_machine_crosses_a_mid_tick_breakpoint_before_the_tick_ends() {
    let resources = TestResources::new()
        .with_clip(
            "idle",
            ConstClip {
                duration: 1.0,
                transform: translation_x(0.0),
            },
        )
        .with_clip(
            "run",
            ConstClip {
                duration: 1.0,
                transform: translation_x(10.0),
            },
        );
    let graph = build_graph(
        "biped",
        vec![
            (NodeId(0), Node::Clip { clip_id: "idle".into() }),
            (NodeId(1), Node::Clip { clip_id: "run".into() }),
            (
                NodeId(2),
                Node::State {
                    name: "Idle".into(),
                    pose: NodeId(0),
                    transitions: vec![NodeId(3)],
                },
            ),
            (
                NodeId(4),
                Node::State {
                    name: "Run".into(),
                    pose: NodeId(1),
                    transitions: vec![],
                },
            ),
            (NodeId(5), Node::StateCondition { required_phase: Some(0.5) }),
            (
                NodeId(3),
                Node::StateTransition {
                    destination: NodeId(4),
                    condition: NodeId(5),
                    kind: TransitionKind::FrozenFade,
                    duration: 0.01,
                    reversible: false,
                },
            ),
            (
                NodeId(6),
                Node::StateMachine {
                    states: vec![NodeId(2), NodeId(4)],
                },
            ),
        ],
        NodeId(6),
    );
    let mut player = GraphPlayerBuilder::new(Arc::new(graph), &resources).build().unwrap();

    let params = ParamStore::new();
    let mut out = player.new_pose();
    // A single 0.6s tick crosses phase 0.5 partway through - the breakpoint scan must catch it
    // even though it never lands on phase 0.5 exactly at a tick boundary.
    player.play(0.6, &params, &mut out);

    assert!((out.joint_local(0).translation.x - 10.0).abs() < 1e-3);
}

#[test]
fn reversible_transition_backs_off_toward_the_source_when_its_condition_flips_back() {
    let resources = TestResources::new()
        .with_clip(
            "idle",
            ConstClip {
                duration: 1.0,
                transform: translation_x(0.0),
            },
        )
        .with_clip(
            "run",
            ConstClip {
                duration: 1.0,
                transform: translation_x(10.0),
            },
        );
    let graph = build_graph(
        "biped",
        vec![
            (NodeId(0), Node::Clip { clip_id: "idle".into() }),
            (NodeId(1), Node::Clip { clip_id: "run".into() }),
            (
                NodeId(2),
                Node::State {
                    name: "Idle".into(),
                    pose: NodeId(0),
                    transitions: vec![NodeId(3)],
                },
            ),
            (
                NodeId(4),
                Node::State {
                    name: "Run".into(),
                    pose: NodeId(1),
                    transitions: vec![],
                },
            ),
            (
                NodeId(5),
                Node::ParamComparison {
                    param_id: "go".into(),
                    value: ParamValue::Bool(true),
                    op: CompareOp::Equal,
                },
            ),
            (
                NodeId(3),
                Node::StateTransition {
                    destination: NodeId(4),
                    condition: NodeId(5),
                    kind: TransitionKind::FrozenFade,
                    duration: 1.0,
                    reversible: true,
                },
            ),
            (
                NodeId(6),
                Node::StateMachine {
                    states: vec![NodeId(2), NodeId(4)],
                },
            ),
        ],
        NodeId(6),
    );
    let mut player = GraphPlayerBuilder::new(Arc::new(graph), &resources).build().unwrap();

    let mut params = ParamStore::new();
    params.set("go", ParamValue::Bool(true));
    let mut out = player.new_pose();

    // Drive the transition partway toward Run.
    for _ in 0..3 {
        player.play(0.1, &params, &mut out);
    }
    let partway = out.joint_local(0).translation.x;
    assert!(partway > 0.0, "transition should have moved the pose away from Idle");
    assert!(partway < 10.0, "transition should not have reached Run yet");

    // Flip the condition back off and keep ticking - a reversible transition must head back
    // toward the source instead of snapping to, or continuing past, the destination.
    params.set("go", ParamValue::Bool(false));
    for _ in 0..5 {
        player.play(0.1, &params, &mut out);
    }
    let after_reversal = out.joint_local(0).translation.x;

    assert!(
        after_reversal < partway,
        "reversing before completion should move the blended pose back toward the source (was {partway}, now {after_reversal})"
    );
}
