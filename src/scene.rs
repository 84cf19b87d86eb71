//! Scene graph stand-in - Pure DOP
//!
//! The host renderer owns the real scene. This flat node table holds what the
//! tracking synchronizers need to own and update: a transform, visibility,
//! optional geometry and optional augmented material per node.

use crate::shader::MaterialHandle;
use cgmath::Matrix4;
use rustc_hash::FxHashMap;

pub type NodeId = u64;

/// Triangle mesh, positions in the node's local space
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub transform: Matrix4<f32>,
    pub visible: bool,
    pub mesh: Option<MeshData>,
    pub material: Option<MaterialHandle>,
}

#[derive(Debug, Default)]
pub struct SceneGraph {
    pub nodes: FxHashMap<NodeId, SceneNode>,
    pub next_node_id: NodeId,
}

pub fn create_scene_graph() -> SceneGraph {
    SceneGraph {
        nodes: FxHashMap::default(),
        next_node_id: 1,
    }
}

/// Add a visible node and return its id
pub fn attach_node(
    scene: &mut SceneGraph,
    transform: Matrix4<f32>,
    mesh: Option<MeshData>,
    material: Option<MaterialHandle>,
) -> NodeId {
    let id = scene.next_node_id;
    scene.next_node_id += 1;
    scene.nodes.insert(
        id,
        SceneNode {
            transform,
            visible: true,
            mesh,
            material,
        },
    );
    id
}

/// Remove a node; returns it if it was attached
pub fn detach_node(scene: &mut SceneGraph, id: NodeId) -> Option<SceneNode> {
    scene.nodes.remove(&id)
}

pub fn is_attached(scene: &SceneGraph, id: NodeId) -> bool {
    scene.nodes.contains_key(&id)
}

pub fn set_node_transform(scene: &mut SceneGraph, id: NodeId, transform: Matrix4<f32>) {
    if let Some(node) = scene.nodes.get_mut(&id) {
        node.transform = transform;
    }
}

pub fn set_node_visible(scene: &mut SceneGraph, id: NodeId, visible: bool) {
    if let Some(node) = scene.nodes.get_mut(&id) {
        node.visible = visible;
    }
}

pub fn set_node_mesh(scene: &mut SceneGraph, id: NodeId, mesh: MeshData) {
    if let Some(node) = scene.nodes.get_mut(&id) {
        node.mesh = Some(mesh);
    }
}
