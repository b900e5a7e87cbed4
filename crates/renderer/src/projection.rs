use glam::{EulerRot, Mat4, Vec3};

use crate::types::CameraParams;

const NEAR_PLANE: f32 = 1.0;
const FAR_PLANE: f32 = 32_768.0;

/// Perspective × rotation × translation for the final stage.
///
/// World space is output pixel space: x right, y down, z toward the viewer.
/// The default camera (`-640, -360, -360`, 90° fov) frames a 1280×720 plane
/// at `z = 0` edge to edge. The y flip maps pixel row 0 to the top of the
/// output texture.
pub fn camera_matrix(camera: &CameraParams, output_size: (u32, u32)) -> Mat4 {
    let (width, height) = output_size;
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let projection = Mat4::perspective_rh(camera.fov.to_radians(), aspect, NEAR_PLANE, FAR_PLANE);
    let flip = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0));
    let rotation = Mat4::from_euler(
        EulerRot::XYZ,
        camera.pitch.to_radians(),
        camera.yaw.to_radians(),
        camera.roll.to_radians(),
    );
    let translation = Mat4::from_translation(Vec3::new(camera.x, camera.y, camera.z));
    projection * flip * rotation * translation
}
