//! Cascade fitting and texel-snapped light matrices (§4.10 steps 1-5).

use glam::{Mat4, Vec3};

use crate::math::Frustum;

pub const CASCADE_COUNT: usize = 4;

/// Fixed fallback split distances, used when SDSM hasn't produced a reading
/// yet or its result was the empty-depth-buffer sentinel (§8 scenario f).
pub const FIXED_SPLITS: [f32; CASCADE_COUNT] = [15.0, 50.0, 150.0, 500.0];

/// One fitted cascade: its depth range, light-space view-projection (used
/// by both the light pass for sampling and the cull pass for culling), and
/// extracted frustum planes.
#[derive(Debug, Clone, Copy)]
pub struct Cascade {
    pub near: f32,
    pub far: f32,
    pub light_view_projection: Mat4,
    pub frustum: Frustum,
}

/// Inflation factor applied to cascade `index`'s near plane so casters just
/// behind the camera are not clipped out of the shadow frustum (§4.10 step 4).
fn near_inflation_factor(cascade_index: usize) -> f32 {
    3.5_f32.powi(3 - cascade_index as i32)
}

/// Fits four cascades for `camera_view_projection_inverse` against a light
/// pointing along `light_direction` (normalized, pointing from the light
/// toward the scene). `splits` is either the SDSM-derived distances or
/// [`FIXED_SPLITS`].
#[must_use]
pub fn fit_cascades(
    camera_inverse_view_projection: Mat4,
    camera_position: Vec3,
    light_direction: Vec3,
    near_plane: f32,
    splits: [f32; CASCADE_COUNT],
    shadow_map_resolution: u32,
) -> [Cascade; CASCADE_COUNT] {
    let mut cascades = Vec::with_capacity(CASCADE_COUNT);
    let mut prev_far = near_plane;

    for (index, &far) in splits.iter().enumerate() {
        let near = prev_far;
        prev_far = far;

        let corners = frustum_corners_for_range(camera_inverse_view_projection, near_plane, splits[CASCADE_COUNT - 1], near, far);
        let centroid = corners.iter().fold(Vec3::ZERO, |acc, c| acc + *c) / corners.len() as f32;
        let mut radius: f32 = corners.iter().map(|c| (*c - centroid).length()).fold(0.0, f32::max);

        // Texel snap: round radius to a texel-grid step so the ortho size
        // is stable frame-to-frame despite rotation.
        let texel_size = (2.0 * radius) / shadow_map_resolution as f32;
        radius = (radius / texel_size).ceil() * texel_size;

        // Sub-texel remainder of the camera position only, to avoid
        // catastrophic cancellation from large camera translations.
        let light_right = light_direction.any_orthonormal_vector();
        let light_up = light_direction.cross(light_right).normalize();
        let texel_size_final = (2.0 * radius) / shadow_map_resolution as f32;

        let snap = |center: Vec3| -> Vec3 {
            let light_space_x = light_right.dot(center);
            let light_space_y = light_up.dot(center);
            let snapped_x = (light_space_x / texel_size_final).floor() * texel_size_final;
            let snapped_y = (light_space_y / texel_size_final).floor() * texel_size_final;
            center + light_right * (snapped_x - light_space_x) + light_up * (snapped_y - light_space_y)
        };
        let snapped_center = snap(centroid);

        let eye = snapped_center - light_direction * (radius * 2.0);
        let light_view = Mat4::look_at_rh(eye, snapped_center, light_up);

        let mut z_min = f32::MAX;
        let mut z_max = f32::MIN;
        for corner in &corners {
            let light_space = light_view.transform_point3(*corner);
            z_min = z_min.min(light_space.z);
            z_max = z_max.max(light_space.z);
        }
        let z_texel = (z_max - z_min) / shadow_map_resolution as f32;
        if z_texel > 0.0 {
            z_min = (z_min / z_texel).floor() * z_texel;
            z_max = (z_max / z_texel).ceil() * z_texel;
        }
        let near_inflated = z_min - radius * (near_inflation_factor(index) - 1.0);

        let light_proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, -z_max, -near_inflated);
        let light_view_projection = light_proj * light_view;

        cascades.push(Cascade {
            near,
            far,
            light_view_projection,
            frustum: Frustum::from_matrix_standard_z(light_view_projection),
        });
    }

    cascades.try_into().unwrap_or_else(|_| unreachable!("exactly CASCADE_COUNT cascades were pushed"))
}

/// The 8 NDC corners of the camera frustum slice `[near, far]` within the
/// overall `[camera_near, camera_far]` range, transformed to world space.
fn frustum_corners_for_range(inverse_view_projection: Mat4, camera_near: f32, camera_far: f32, near: f32, far: f32) -> [Vec3; 8] {
    let near_t = ((near - camera_near) / (camera_far - camera_near)).clamp(0.0, 1.0);
    let far_t = ((far - camera_near) / (camera_far - camera_near)).clamp(0.0, 1.0);

    let ndc_corners = [
        glam::Vec4::new(-1.0, -1.0, 0.0, 1.0),
        glam::Vec4::new(1.0, -1.0, 0.0, 1.0),
        glam::Vec4::new(-1.0, 1.0, 0.0, 1.0),
        glam::Vec4::new(1.0, 1.0, 0.0, 1.0),
    ];

    let mut out = [Vec3::ZERO; 8];
    for (i, ndc) in ndc_corners.iter().enumerate() {
        let near_world = inverse_view_projection * glam::Vec4::new(ndc.x, ndc.y, near_t, 1.0);
        let far_world = inverse_view_projection * glam::Vec4::new(ndc.x, ndc.y, far_t, 1.0);
        out[i] = near_world.truncate() / near_world.w;
        out[i + 4] = far_world.truncate() / far_world.w;
    }
    out
}
