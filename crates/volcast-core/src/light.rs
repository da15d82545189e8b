use glam::Vec3;

/// How a light's position and focal point are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Located at the camera, shining along the view direction.
    HeadLight,
    /// Position and focal point given in view coordinates.
    CameraLight,
    /// Position and focal point given in world coordinates.
    SceneLight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub switch: bool,
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    pub focal_point: Vec3,
    pub positional: bool,
    /// Constant, linear and quadratic attenuation (positional only).
    pub attenuation: Vec3,
    /// Spot cone half angle in degrees; 90 or more disables the cone.
    pub cone_angle: f32,
    pub exponent: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            switch: true,
            light_type: LightType::SceneLight,
            color: Vec3::ONE,
            intensity: 1.0,
            position: Vec3::new(0.0, 0.0, 1.0),
            focal_point: Vec3::ZERO,
            positional: false,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            cone_angle: 30.0,
            exponent: 1.0,
        }
    }
}

impl Light {
    /// White unit-intensity light riding on the camera.
    pub fn headlight() -> Self {
        Self {
            light_type: LightType::HeadLight,
            ..Default::default()
        }
    }

    pub fn scene_light(position: Vec3, focal_point: Vec3) -> Self {
        Self {
            position,
            focal_point,
            ..Default::default()
        }
    }

    pub fn is_headlight(&self) -> bool {
        self.light_type == LightType::HeadLight
    }

    /// Unit vector from position toward focal point.
    pub fn direction(&self) -> Vec3 {
        (self.focal_point - self.position).normalize_or_zero()
    }

    /// Color premultiplied by intensity.
    pub fn scaled_color(&self) -> Vec3 {
        self.color * self.intensity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headlight_defaults() {
        let light = Light::headlight();
        assert!(light.switch);
        assert!(light.is_headlight());
        assert_eq!(light.intensity, 1.0);
        assert!(!light.positional);
    }

    #[test]
    fn test_direction_points_at_focal_point() {
        let light = Light::scene_light(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);
        assert_eq!(light.direction(), Vec3::NEG_Y);
    }

    #[test]
    fn test_scaled_color() {
        let light = Light {
            color: Vec3::new(1.0, 0.5, 0.0),
            intensity: 2.0,
            ..Default::default()
        };
        assert_eq!(light.scaled_color(), Vec3::new(2.0, 1.0, 0.0));
    }
}
