//! 运行时材质
//!
//! 解码材质中的纹理索引解析为路径字符串，共享 toon 编号解析为内置文件名。

use glam::{Vec3, Vec4};

use crate::pmx;

/// 运行时材质
#[derive(Clone, Debug)]
pub struct MmdMaterial {
    pub name: String,
    pub name_en: String,
    pub diffuse: Vec4,
    pub specular_color: Vec3,
    pub specular_scale: f32,
    pub ambient_color: Vec3,
    pub is_double_sided: bool,
    pub enabled_drop_shadow: bool,
    pub enabled_self_shadow_map: bool,
    pub enabled_self_shadow: bool,
    pub enabled_toon_edge: bool,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_path: Option<String>,
    pub sphere_texture_path: Option<String>,
    pub sphere_texture_mode: u8,
    pub toon_texture_path: Option<String>,
}

impl MmdMaterial {
    pub fn from_pmx(material: &pmx::Material, textures: &[String]) -> Self {
        let lookup = |index: i32| -> Option<String> {
            usize::try_from(index)
                .ok()
                .and_then(|i| textures.get(i).cloned())
        };

        let toon_texture_path = match material.toon {
            // 文件内编号 0 起，文件名 1 起
            pmx::Toon::Shared(number) => {
                Some(format!("toon{:02}.bmp", i32::from(number) + 1))
            }
            pmx::Toon::Texture(index) => lookup(index),
        };

        Self {
            name: material.name.clone(),
            name_en: material.name_en.clone(),
            diffuse: material.diffuse,
            specular_color: material.specular_color,
            specular_scale: material.specular_scale,
            ambient_color: material.ambient_color,
            is_double_sided: material.flags.contains(pmx::MaterialFlags::DOUBLE_SIDED),
            enabled_drop_shadow: material.flags.contains(pmx::MaterialFlags::DROP_SHADOW),
            enabled_self_shadow_map: material
                .flags
                .contains(pmx::MaterialFlags::SELF_SHADOW_MAP),
            enabled_self_shadow: material.flags.contains(pmx::MaterialFlags::SELF_SHADOW),
            enabled_toon_edge: material.flags.contains(pmx::MaterialFlags::TOON_EDGE),
            edge_color: material.edge_color,
            edge_size: material.edge_size,
            texture_path: lookup(material.texture_index),
            sphere_texture_path: lookup(material.sphere_texture_index),
            sphere_texture_mode: material.sphere_texture_mode,
            toon_texture_path,
        }
    }
}
