//! 模型运行时
//!
//! 持有渲染器消费的扁平缓冲与骨架，并提供「推进一步、读取姿态」的驱动入口。

use glam::Mat4;

use crate::animation::Motion;
use crate::pmx;
use crate::skeleton::BoneManager;

use super::{MmdMaterial, SubMesh, VertexWeight};

/// 运行时模型
#[derive(Clone)]
pub struct MmdModel {
    pub name: String,
    pub name_en: String,
    pub comment: String,

    /// 每顶点 3 个分量
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    /// 每顶点 2 个分量
    pub uvs: Vec<f32>,
    pub edge_scales: Vec<f32>,
    /// 每顶点 4 个骨骼索引
    pub bone_indices: Vec<i32>,
    /// 每顶点 4 个权重
    pub bone_weights: Vec<f32>,
    /// 蒙皮用的权重变体（保留 SDEF 附加数据）
    pub weights: Vec<VertexWeight>,

    /// 三角形索引缓冲
    pub indices: Vec<u32>,
    pub materials: Vec<MmdMaterial>,
    pub submeshes: Vec<SubMesh>,

    pub bone_manager: BoneManager,
}

impl MmdModel {
    /// 从解码值树展开运行时模型
    pub fn from_pmx(model: &pmx::Model) -> Self {
        let vertex_count = model.vertices.len();
        let mut positions = Vec::with_capacity(vertex_count * 3);
        let mut normals = Vec::with_capacity(vertex_count * 3);
        let mut uvs = Vec::with_capacity(vertex_count * 2);
        let mut edge_scales = Vec::with_capacity(vertex_count);
        let mut bone_indices = Vec::with_capacity(vertex_count * 4);
        let mut bone_weights = Vec::with_capacity(vertex_count * 4);
        let mut weights = Vec::with_capacity(vertex_count);

        for vertex in &model.vertices {
            positions.extend_from_slice(&vertex.position.to_array());
            normals.extend_from_slice(&vertex.normal.to_array());
            uvs.extend_from_slice(&vertex.uv.to_array());
            edge_scales.push(vertex.edge_scale);

            let weight = VertexWeight::from(&vertex.weight);
            let (ids, values) = weight.flatten();
            bone_indices.extend_from_slice(&ids);
            bone_weights.extend_from_slice(&values);
            weights.push(weight);
        }

        let mut indices = Vec::with_capacity(model.faces.len() * 3);
        for face in &model.faces {
            indices.extend_from_slice(face);
        }

        // 材质按声明顺序覆盖连续的面索引范围
        let mut submeshes = Vec::with_capacity(model.materials.len());
        let mut index_offset = 0u32;
        for (material_id, material) in model.materials.iter().enumerate() {
            let index_count = material.face_vertex_count.max(0) as u32;
            submeshes.push(SubMesh {
                begin_index: index_offset,
                index_count,
                material_id: material_id as i32,
            });
            index_offset += index_count;
        }

        let materials = model
            .materials
            .iter()
            .map(|material| MmdMaterial::from_pmx(material, &model.textures))
            .collect();

        Self {
            name: model.name.clone(),
            name_en: model.name_en.clone(),
            comment: model.comment.clone(),
            positions,
            normals,
            uvs,
            edge_scales,
            bone_indices,
            bone_weights,
            weights,
            indices,
            materials,
            submeshes,
            bone_manager: BoneManager::from_pmx(&model.bones),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.weights.len()
    }

    /// 推进一步动画并更新姿态
    pub fn advance(&mut self, motion: &mut Motion) {
        motion.step(&mut self.bone_manager);
        self.bone_manager.update_pose();
    }

    /// 每骨骼蒙皮矩阵（每步重算一次）
    pub fn skinning_matrices(&self) -> Vec<Mat4> {
        self.bone_manager.local_matrices()
    }

    /// 每骨骼世界矩阵
    pub fn global_matrices(&self) -> Vec<Mat4> {
        self.bone_manager.global_matrices()
    }
}
