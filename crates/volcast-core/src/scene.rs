use glam::Vec3;

use crate::camera::Camera;
use crate::image::ImageData;
use crate::light::Light;
use crate::property::VolumeProperty;
use crate::stamp::{IdAllocator, VolumeId};
use crate::volume::{Volume, VolumeActor};

/// Owns the volumes, lights and camera of one view.
#[derive(Debug, Default)]
pub struct Scene {
    ids: IdAllocator,
    volumes: Vec<Volume>,
    pub lights: Vec<Light>,
    pub camera: Camera,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a volume and return its id.
    pub fn add_volume(&mut self, input: Option<ImageData>, property: VolumeProperty) -> VolumeId {
        let id = self.ids.allocate();
        self.volumes.push(Volume::new(id, input, property));
        id
    }

    pub fn remove_volume(&mut self, id: VolumeId) -> Option<Volume> {
        let index = self.volumes.iter().position(|v| v.id() == id)?;
        Some(self.volumes.remove(index))
    }

    pub fn volume(&self, id: VolumeId) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.id() == id)
    }

    pub fn volume_mut(&mut self, id: VolumeId) -> Option<&mut Volume> {
        self.volumes.iter_mut().find(|v| v.id() == id)
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    /// The active volume list handed to the mapper for one frame.
    pub fn volume_actors(&self) -> Vec<&dyn VolumeActor> {
        self.volumes.iter().map(|v| v as &dyn VolumeActor).collect()
    }

    /// World bounds enclosing every volume with input.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.volumes
            .iter()
            .filter_map(Volume::world_bounds)
            .reduce(|(amin, amax), (bmin, bmax)| (amin.min(bmin), amax.max(bmax)))
    }

    /// Fit the camera clipping range around the scene bounds.
    pub fn reset_camera_clipping_range(&mut self) {
        if let Some((min, max)) = self.bounds() {
            self.camera.reset_clipping_range(min, max);
        }
    }
}
