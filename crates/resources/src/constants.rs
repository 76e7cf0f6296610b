//! Constant buffer layouts shared with the shaders.
//!
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod`, so a value
//! can be copied into an upload buffer byte for byte.
//!
//! # Matrix convention
//!
//! The shaders read matrices row-major, so every matrix is stored
//! transposed. The `new` constructors take column-major `glam` matrices and
//! transpose them on the way in.
//!
//! # Overview
//!
//! - [`ObjectConstants`] - per render item transforms
//! - [`MaterialConstants`] - per material shading parameters
//! - [`PassConstants`] - per frame camera, timing, fog and lights
//! - [`Light`] - one light entry of [`PassConstants`]

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Number of light slots in [`PassConstants`].
pub const MAX_LIGHTS: usize = 16;

/// Per-object constants.
///
/// # Memory Layout
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | world |
/// | 64     | 64   | tex_transform |
///
/// Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object to world transform (transposed).
    pub world: Mat4,
    /// Texture coordinate transform (transposed).
    pub tex_transform: Mat4,
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
        }
    }
}

impl ObjectConstants {
    /// Builds constants from column-major transforms.
    #[inline]
    pub fn new(world: Mat4, tex_transform: Mat4) -> Self {
        Self {
            world: world.transpose(),
            tex_transform: tex_transform.transpose(),
        }
    }

    /// Returns the size of this structure in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Per-material shading parameters.
///
/// # Memory Layout
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | mat_transform |
/// | 64     | 12   | diffuse |
/// | 76     | 4    | metallic |
/// | 80     | 12   | fresnel_r0 |
/// | 92     | 4    | roughness |
/// | 96     | 12   | transmission |
/// | 108    | 4    | height_scale |
/// | 112    | 12   | emissive |
/// | 124    | 4    | opacity |
/// | 128    | 20   | sheen .. anisotropy_rotation |
/// | 148    | 12   | _padding |
///
/// Total size: 160 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Texture coordinate transform applied per material (transposed).
    pub mat_transform: Mat4,
    pub diffuse: Vec3,
    pub metallic: f32,
    /// Reflectance at normal incidence.
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transmission: Vec3,
    pub height_scale: f32,
    pub emissive: Vec3,
    pub opacity: f32,
    pub sheen: f32,
    pub clear_coat_thickness: f32,
    pub clear_coat_roughness: f32,
    pub anisotropy: f32,
    pub anisotropy_rotation: f32,
    pub _padding: [f32; 3],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            mat_transform: Mat4::IDENTITY,
            diffuse: Vec3::ONE,
            metallic: 0.0,
            fresnel_r0: Vec3::splat(0.04),
            roughness: 1.0,
            transmission: Vec3::ONE,
            height_scale: 1.0,
            emissive: Vec3::ZERO,
            opacity: 1.0,
            sheen: 0.0,
            clear_coat_thickness: 0.0,
            clear_coat_roughness: 0.0,
            anisotropy: 0.0,
            anisotropy_rotation: 0.0,
            _padding: [0.0; 3],
        }
    }
}

impl MaterialConstants {
    /// Default parameters with the given diffuse color, metallic and roughness.
    pub fn with_base(diffuse: Vec3, metallic: f32, roughness: f32) -> Self {
        Self {
            diffuse,
            metallic,
            roughness,
            ..Self::default()
        }
    }

    /// Returns a copy ready for upload, with the material transform transposed.
    #[inline]
    pub fn to_gpu(&self) -> Self {
        Self {
            mat_transform: self.mat_transform.transpose(),
            ..*self
        }
    }

    /// Returns the size of this structure in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// One light slot.
///
/// Directional lights use `direction`; point lights use `position` and the
/// falloff range; spot lights use all fields.
///
/// Total size: 48 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub strength: Vec3,
    pub falloff_start: f32,
    pub direction: Vec3,
    pub falloff_end: f32,
    pub position: Vec3,
    pub spot_power: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            strength: Vec3::splat(0.5),
            falloff_start: 1.0,
            direction: Vec3::new(0.0, -1.0, 0.0),
            falloff_end: 10.0,
            position: Vec3::ZERO,
            spot_power: 64.0,
        }
    }
}

impl Light {
    /// A directional light. `direction` is normalized.
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            strength,
            direction: direction.normalize_or_zero(),
            ..Self::default()
        }
    }

    /// A point light with linear falloff between `falloff_start` and `falloff_end`.
    pub fn point(position: Vec3, strength: Vec3, falloff_start: f32, falloff_end: f32) -> Self {
        Self {
            strength,
            position,
            falloff_start,
            falloff_end,
            ..Self::default()
        }
    }
}

/// Per-pass constants, written every frame.
///
/// # Memory Layout
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 384  | view .. inv_view_proj |
/// | 384    | 16   | eye_position, _pad0 |
/// | 400    | 16   | render_target_size, inv_render_target_size |
/// | 416    | 16   | near_z, far_z, total_time, delta_time |
/// | 432    | 16   | ambient_light |
/// | 448    | 16   | fog_color |
/// | 464    | 16   | fog_start, fog_range, _pad1 |
/// | 480    | 768  | lights |
///
/// Total size: 1248 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub eye_position: Vec3,
    pub _pad0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub fog_color: Vec4,
    pub fog_start: f32,
    pub fog_range: f32,
    pub _pad1: [f32; 2],
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            eye_position: Vec3::ZERO,
            _pad0: 0.0,
            render_target_size: Vec2::ZERO,
            inv_render_target_size: Vec2::ZERO,
            near_z: 0.0,
            far_z: 0.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: Vec4::new(0.03, 0.03, 0.03, 1.0),
            fog_color: Vec4::new(0.7, 0.7, 0.7, 1.0),
            fog_start: 5.0,
            fog_range: 150.0,
            _pad1: [0.0; 2],
            lights: [Light::default(); MAX_LIGHTS],
        }
    }
}

impl PassConstants {
    /// Sets the camera matrices, deriving inverses and the combined
    /// view-projection. Inputs are column-major; stored values are transposed.
    pub fn set_camera(&mut self, view: Mat4, proj: Mat4, eye_position: Vec3) {
        let view_proj = proj * view;
        self.view = view.transpose();
        self.inv_view = view.inverse().transpose();
        self.proj = proj.transpose();
        self.inv_proj = proj.inverse().transpose();
        self.view_proj = view_proj.transpose();
        self.inv_view_proj = view_proj.inverse().transpose();
        self.eye_position = eye_position;
    }

    /// Sets the render target size and clip planes.
    pub fn set_viewport(&mut self, width: f32, height: f32, near_z: f32, far_z: f32) {
        self.render_target_size = Vec2::new(width, height);
        self.inv_render_target_size = Vec2::new(1.0 / width, 1.0 / height);
        self.near_z = near_z;
        self.far_z = far_z;
    }

    /// Sets the frame timing fields.
    #[inline]
    pub fn set_time(&mut self, total_time: f32, delta_time: f32) {
        self.total_time = total_time;
        self.delta_time = delta_time;
    }

    /// Returns the size of this structure in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{align_of, offset_of, size_of};

    use super::*;

    #[test]
    fn test_object_constants_layout() {
        assert_eq!(size_of::<ObjectConstants>(), 128);
        assert_eq!(ObjectConstants::size(), 128);
        assert_eq!(offset_of!(ObjectConstants, tex_transform), 64);
    }

    #[test]
    fn test_object_constants_are_transposed() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let constants = ObjectConstants::new(world, Mat4::IDENTITY);
        // Translation lands in the last row once transposed.
        assert_eq!(constants.world.row(3), Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(constants.tex_transform, Mat4::IDENTITY);
    }

    #[test]
    fn test_material_constants_layout() {
        assert_eq!(size_of::<MaterialConstants>(), 160);
        assert_eq!(offset_of!(MaterialConstants, diffuse), 64);
        assert_eq!(offset_of!(MaterialConstants, metallic), 76);
        assert_eq!(offset_of!(MaterialConstants, roughness), 92);
        assert_eq!(offset_of!(MaterialConstants, opacity), 124);
        assert_eq!(offset_of!(MaterialConstants, anisotropy_rotation), 144);
    }

    #[test]
    fn test_material_defaults() {
        let material = MaterialConstants::default();
        assert_eq!(material.fresnel_r0, Vec3::splat(0.04));
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.opacity, 1.0);

        let red = MaterialConstants::with_base(Vec3::X, 0.5, 0.25);
        assert_eq!(red.diffuse, Vec3::X);
        assert_eq!(red.metallic, 0.5);
        assert_eq!(red.height_scale, 1.0);
    }

    #[test]
    fn test_material_to_gpu_transposes_transform() {
        let material = MaterialConstants {
            mat_transform: Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0))
                * Mat4::from_translation(Vec3::X),
            ..MaterialConstants::default()
        };
        let gpu = material.to_gpu();
        assert_eq!(gpu.mat_transform, material.mat_transform.transpose());
        assert_eq!(gpu.diffuse, material.diffuse);
    }

    #[test]
    fn test_light_layout() {
        assert_eq!(size_of::<Light>(), 48);
        assert_eq!(offset_of!(Light, direction), 16);
        assert_eq!(offset_of!(Light, position), 32);
    }

    #[test]
    fn test_pass_constants_layout() {
        assert_eq!(size_of::<PassConstants>(), 1248);
        assert_eq!(align_of::<PassConstants>() % 16, 0);
        assert_eq!(offset_of!(PassConstants, eye_position), 384);
        assert_eq!(offset_of!(PassConstants, render_target_size), 400);
        assert_eq!(offset_of!(PassConstants, near_z), 416);
        assert_eq!(offset_of!(PassConstants, ambient_light), 432);
        assert_eq!(offset_of!(PassConstants, fog_color), 448);
        assert_eq!(offset_of!(PassConstants, fog_start), 464);
        assert_eq!(offset_of!(PassConstants, lights), 480);
    }

    #[test]
    fn test_pass_camera_inverses() {
        let view = Mat4::look_at_lh(Vec3::new(0.0, 0.0, -10.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_lh(0.25 * std::f32::consts::PI, 16.0 / 9.0, 1.0, 1000.0);

        let mut pass = PassConstants::default();
        pass.set_camera(view, proj, Vec3::new(0.0, 0.0, -10.0));

        let identity = (pass.view_proj * pass.inv_view_proj).abs_diff_eq(Mat4::IDENTITY, 1e-4);
        assert!(identity);
        assert_eq!(pass.view, view.transpose());
    }

    #[test]
    fn test_pass_viewport() {
        let mut pass = PassConstants::default();
        pass.set_viewport(800.0, 600.0, 1.0, 1000.0);
        assert_eq!(pass.inv_render_target_size, Vec2::new(1.0 / 800.0, 1.0 / 600.0));
        assert_eq!(pass.far_z, 1000.0);
    }

    #[test]
    fn test_constants_pod_bytes() {
        let pass = PassConstants::default();
        assert_eq!(bytemuck::bytes_of(&pass).len(), 1248);
        let back: &PassConstants = bytemuck::from_bytes(bytemuck::bytes_of(&pass));
        assert_eq!(back.fog_range, 150.0);
    }
}
