use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::BoundingSphere;

/// Six normalized frustum planes `(normal:vec3, d:f32)`, extracted from a
/// view-projection matrix via the Gribb-Hartmann row-sum method.
///
/// `#[repr(C)]` and `Pod` so a `[Frustum; 4]` can be uploaded directly as the
/// 24-plane cascade CBV consumed by the shadow cull pass (§3, Shadow cascade set).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Frustum {
    /// Left, Right, Bottom, Top, Near, Far.
    planes: [Vec4; 6],
}

impl Default for Frustum {
    fn default() -> Self {
        Self {
            planes: [Vec4::ZERO; 6],
        }
    }
}

impl Frustum {
    /// Extracts frustum planes from a reverse-Z, infinite-far-plane
    /// view-projection matrix (the convention used by the rest of this crate).
    ///
    /// The far plane is left degenerate (all zero) since an infinite
    /// projection has no finite far plane to extract; intersection tests
    /// skip it.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[0] = rows[3] + rows[0]; // Left
        planes[1] = rows[3] - rows[0]; // Right
        planes[2] = rows[3] + rows[1]; // Bottom
        planes[3] = rows[3] - rows[1]; // Top

        // Reverse-Z: the near plane corresponds to NDC z = 1.0, i.e. w_c - z_c >= 0.
        planes[4] = rows[3] - rows[2]; // Near
        planes[5] = Vec4::ZERO; // Far (infinite projection, left degenerate)

        Self {
            planes: normalize_planes(planes, 5),
        }
    }

    /// Extracts planes from a standard (finite, non-reverse) z-convention
    /// view-projection matrix, keeping a real far plane. Used for the shadow
    /// cascades' orthographic projections, which are not reverse-Z.
    #[must_use]
    pub fn from_matrix_standard_z(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[0] = rows[3] + rows[0]; // Left
        planes[1] = rows[3] - rows[0]; // Right
        planes[2] = rows[3] + rows[1]; // Bottom
        planes[3] = rows[3] - rows[1]; // Top
        planes[4] = rows[3] + rows[2]; // Near (NDC z = -1)
        planes[5] = rows[3] - rows[2]; // Far (NDC z = 1)

        Self {
            planes: normalize_planes(planes, 6),
        }
    }

    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Sphere-frustum test used by the visibility compute pass (mirrored
    /// here for CPU-side validation and tests).
    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        for plane in self.active_planes() {
            let dist = plane.x * center.x + plane.y * center.y + plane.z * center.z + plane.w;
            if dist < -radius {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn intersects_bounding_sphere(&self, sphere: BoundingSphere) -> bool {
        self.intersects_sphere(sphere.center, sphere.radius)
    }

    /// AABB-frustum test using the positive-vertex (p-vertex) trick: if the
    /// corner most aligned with a plane's normal lies outside it, the whole
    /// box is outside.
    #[must_use]
    pub fn intersects_box(&self, min: Vec3, max: Vec3) -> bool {
        for plane in self.active_planes() {
            let p = Vec3::new(
                if plane.x >= 0.0 { max.x } else { min.x },
                if plane.y >= 0.0 { max.y } else { min.y },
                if plane.z >= 0.0 { max.z } else { min.z },
            );
            let dist = plane.x * p.x + plane.y * p.y + plane.z * p.z + plane.w;
            if dist < 0.0 {
                return false;
            }
        }
        true
    }

    fn active_planes(&self) -> impl Iterator<Item = &Vec4> {
        self.planes
            .iter()
            .filter(|p| p.x != 0.0 || p.y != 0.0 || p.z != 0.0)
    }
}

fn normalize_planes(mut planes: [Vec4; 6], skip: usize) -> [Vec4; 6] {
    for (i, plane) in planes.iter_mut().enumerate() {
        if i == skip {
            continue;
        }
        let length = Vec3::new(plane.x, plane.y, plane.z).length();
        if length > 1e-6 {
            *plane /= length;
        } else {
            // Degenerate normal: leave the plane at zero so it never rejects
            // (dist = 0 is never < -radius for radius >= 0).
            *plane = Vec4::ZERO;
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn perspective_reverse_z(fov_y: f32, aspect: f32, near: f32) -> Mat4 {
        Mat4::perspective_infinite_reverse_rh(fov_y, aspect, near)
    }

    #[test]
    fn sphere_on_axis_is_visible() {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = perspective_reverse_z(60f32.to_radians(), 16.0 / 9.0, 0.1);
        let frustum = Frustum::from_matrix(proj * view);
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn sphere_behind_camera_is_culled() {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = perspective_reverse_z(60f32.to_radians(), 16.0 / 9.0, 0.1);
        let frustum = Frustum::from_matrix(proj * view);
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn sphere_far_off_axis_is_culled() {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = perspective_reverse_z(60f32.to_radians(), 16.0 / 9.0, 0.1);
        let frustum = Frustum::from_matrix(proj * view);
        assert!(!frustum.intersects_sphere(Vec3::new(100.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn box_straddling_near_plane_is_visible() {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = perspective_reverse_z(60f32.to_radians(), 16.0 / 9.0, 0.1);
        let frustum = Frustum::from_matrix(proj * view);
        assert!(frustum.intersects_box(
            Vec3::new(-0.5, -0.5, -1.0),
            Vec3::new(0.5, 0.5, 1.0),
        ));
    }

    #[test]
    fn standard_z_far_plane_culls_distant_sphere() {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.1, 50.0);
        let frustum = Frustum::from_matrix_standard_z(proj * view);
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, -100.0), 1.0));
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -25.0), 1.0));
        let _ = approx(1.0, 1.0);
    }
}
