//! 运行时模型
//!
//! 解码值树到渲染器可用数据的展开：扁平顶点缓冲、三角形索引、
//! 材质与面范围、骨架。

mod material;
mod runtime;
mod submesh;

pub use material::MmdMaterial;
pub use runtime::MmdModel;
pub use submesh::SubMesh;

use glam::Vec3;

use crate::pmx;

/// 运行时顶点骨骼权重
#[derive(Clone, Debug)]
pub enum VertexWeight {
    Bdef1 {
        bone: i32,
    },
    Bdef2 {
        bones: [i32; 2],
        weight: f32,
    },
    Bdef4 {
        bones: [i32; 4],
        weights: [f32; 4],
    },
    Sdef {
        bones: [i32; 2],
        weight: f32,
        c: Vec3,
        r0: Vec3,
        r1: Vec3,
    },
}

impl Default for VertexWeight {
    fn default() -> Self {
        VertexWeight::Bdef1 { bone: 0 }
    }
}

impl From<&pmx::BoneWeight> for VertexWeight {
    fn from(weight: &pmx::BoneWeight) -> Self {
        match *weight {
            pmx::BoneWeight::Bdef1 { bone } => VertexWeight::Bdef1 { bone },
            pmx::BoneWeight::Bdef2 { bones, weight } => VertexWeight::Bdef2 { bones, weight },
            pmx::BoneWeight::Bdef4 { bones, weights } => VertexWeight::Bdef4 { bones, weights },
            pmx::BoneWeight::Sdef {
                bones,
                weight,
                c,
                r0,
                r1,
            } => VertexWeight::Sdef {
                bones,
                weight,
                c,
                r0,
                r1,
            },
        }
    }
}

impl VertexWeight {
    /// 展开为 4 骨骼索引 + 4 权重（补权重 = 1 − w，空位补零）
    pub fn flatten(&self) -> ([i32; 4], [f32; 4]) {
        match *self {
            VertexWeight::Bdef1 { bone } => ([bone, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
            VertexWeight::Bdef2 { bones, weight } | VertexWeight::Sdef { bones, weight, .. } => (
                [bones[0], bones[1], 0, 0],
                [weight, 1.0 - weight, 0.0, 0.0],
            ),
            VertexWeight::Bdef4 { bones, weights } => (bones, weights),
        }
    }
}
