//! 顶点变换混合
//!
//! 按权重变体对骨骼蒙皮矩阵加权求和，得到每顶点的变换矩阵。
//! SDEF 退化为 BDEF2 混合。

use glam::Mat4;

use crate::model::VertexWeight;

/// 计算全部顶点的混合变换矩阵
///
/// `bone_matrices` 为每骨骼蒙皮（local）矩阵，需在姿态更新后读取。
pub fn vertex_transforms(weights: &[VertexWeight], bone_matrices: &[Mat4]) -> Vec<Mat4> {
    weights
        .iter()
        .map(|weight| blend_vertex_transform(weight, bone_matrices))
        .collect()
}

/// 单个顶点的混合变换
pub fn blend_vertex_transform(weight: &VertexWeight, matrices: &[Mat4]) -> Mat4 {
    match *weight {
        VertexWeight::Bdef1 { bone } => get_matrix(matrices, bone),
        VertexWeight::Bdef2 { bones, weight } | VertexWeight::Sdef { bones, weight, .. } => {
            let (ids, values) = ([bones[0], bones[1]], [weight, 1.0 - weight]);
            blend(matrices, &ids, &values)
        }
        VertexWeight::Bdef4 { bones, weights } => blend(matrices, &bones, &weights),
    }
}

fn blend(matrices: &[Mat4], bones: &[i32], weights: &[f32]) -> Mat4 {
    // 权重全零时退回单位阵
    let sum: f32 = weights.iter().sum();
    if sum == 0.0 {
        return Mat4::IDENTITY;
    }

    let mut result = Mat4::ZERO;
    for (&bone, &weight) in bones.iter().zip(weights.iter()) {
        result += get_matrix(matrices, bone) * weight;
    }
    result
}

fn get_matrix(matrices: &[Mat4], index: i32) -> Mat4 {
    if index < 0 {
        return Mat4::IDENTITY;
    }
    matrices.get(index as usize).copied().unwrap_or(Mat4::IDENTITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn zero_weights_blend_to_identity() {
        let weight = VertexWeight::Bdef4 {
            bones: [0, 0, 0, 0],
            weights: [0.0; 4],
        };
        let matrices = [Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0))];
        assert_eq!(blend_vertex_transform(&weight, &matrices), Mat4::IDENTITY);
    }

    #[test]
    fn bdef2_mixes_two_matrices() {
        let matrices = [
            Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)),
            Mat4::from_translation(Vec3::new(0.0, 0.0, 0.0)),
        ];
        let weight = VertexWeight::Bdef2 {
            bones: [0, 1],
            weight: 0.5,
        };
        let transform = blend_vertex_transform(&weight, &matrices);
        let moved = transform.transform_point3(Vec3::ZERO);
        assert!(moved.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn negative_bone_index_uses_identity() {
        let weight = VertexWeight::Bdef1 { bone: -1 };
        let matrices = [Mat4::from_translation(Vec3::X)];
        assert_eq!(blend_vertex_transform(&weight, &matrices), Mat4::IDENTITY);
    }

    #[test]
    fn sdef_falls_back_to_bdef2() {
        let matrices = [
            Mat4::from_translation(Vec3::new(0.0, 4.0, 0.0)),
            Mat4::IDENTITY,
        ];
        let sdef = VertexWeight::Sdef {
            bones: [0, 1],
            weight: 0.25,
            c: Vec3::ZERO,
            r0: Vec3::ZERO,
            r1: Vec3::ZERO,
        };
        let bdef2 = VertexWeight::Bdef2 {
            bones: [0, 1],
            weight: 0.25,
        };
        assert_eq!(
            blend_vertex_transform(&sdef, &matrices),
            blend_vertex_transform(&bdef2, &matrices)
        );
    }
}
