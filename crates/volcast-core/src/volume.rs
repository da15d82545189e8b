use glam::{Mat4, Quat, Vec3};

use crate::image::ImageData;
use crate::property::VolumeProperty;
use crate::stamp::VolumeId;

/// Something the volume pass can draw: a scalar field placed in the world.
pub trait Renderable {
    fn volume_id(&self) -> VolumeId;

    /// The scalar field, if one has been connected.
    fn input_data(&self) -> Option<&ImageData>;

    /// Model to world transform.
    fn matrix(&self) -> Mat4;

    /// True when `matrix()` is the identity, letting callers skip normal
    /// matrix inversion.
    fn is_identity(&self) -> bool;
}

pub trait HasProperty {
    fn property(&self) -> &VolumeProperty;
}

/// Everything the multi-volume mapper needs from one volume.
pub trait VolumeActor: Renderable + HasProperty {}

impl<T: Renderable + HasProperty> VolumeActor for T {}

/// Scene-owned volume: a scalar field, its property and a placement.
#[derive(Debug, Clone)]
pub struct Volume {
    id: VolumeId,
    input: Option<ImageData>,
    property: VolumeProperty,
    position: Vec3,
    orientation: Quat,
    scale: Vec3,
    /// Pivot for rotation and scale.
    origin: Vec3,
    user_matrix: Option<Mat4>,
}

impl Volume {
    pub fn new(id: VolumeId, input: Option<ImageData>, property: VolumeProperty) -> Self {
        Self {
            id,
            input,
            property,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
            origin: Vec3::ZERO,
            user_matrix: None,
        }
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Connect a new scalar field. Its stamp is advanced past the previous
    /// field's so caches keyed on this volume rebuild.
    pub fn set_input(&mut self, input: Option<ImageData>) {
        let previous = self.input.as_ref().map(ImageData::stamp);
        self.input = input;
        if let (Some(image), Some(previous)) = (self.input.as_mut(), previous) {
            image.advance_stamp_past(previous);
        }
    }

    pub fn input_mut(&mut self) -> Option<&mut ImageData> {
        self.input.as_mut()
    }

    pub fn property_mut(&mut self) -> &mut VolumeProperty {
        &mut self.property
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    /// Extra transform applied before the placement.
    pub fn set_user_matrix(&mut self, matrix: Option<Mat4>) {
        self.user_matrix = matrix;
    }

    /// Model-space bounds transformed to world space, as `(min, max)`.
    pub fn world_bounds(&self) -> Option<(Vec3, Vec3)> {
        let image = self.input.as_ref()?;
        let ext = image.extent();
        let to_world = self.matrix() * image.index_to_world();
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                ext[if i & 1 == 0 { 0 } else { 1 }] as f32,
                ext[if i & 2 == 0 { 2 } else { 3 }] as f32,
                ext[if i & 4 == 0 { 4 } else { 5 }] as f32,
            );
            let p = to_world.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Some((min, max))
    }
}

impl Renderable for Volume {
    fn volume_id(&self) -> VolumeId {
        self.id
    }

    fn input_data(&self) -> Option<&ImageData> {
        self.input.as_ref()
    }

    fn matrix(&self) -> Mat4 {
        let placement = Mat4::from_translation(self.position + self.origin)
            * Mat4::from_scale_rotation_translation(self.scale, self.orientation, Vec3::ZERO)
            * Mat4::from_translation(-self.origin);
        match self.user_matrix {
            Some(user) => placement * user,
            None => placement,
        }
    }

    fn is_identity(&self) -> bool {
        self.matrix() == Mat4::IDENTITY
    }
}

impl HasProperty for Volume {
    fn property(&self) -> &VolumeProperty {
        &self.property
    }
}
