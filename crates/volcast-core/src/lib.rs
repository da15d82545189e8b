pub mod camera;
pub mod config;
pub mod constants;
pub mod error;
pub mod image;
pub mod light;
pub mod property;
pub mod scene;
pub mod stamp;
pub mod transfer;
pub mod volume;

pub use camera::Camera;
pub use config::MapperConfig;
pub use error::VolcastError;
pub use image::{ImageData, ScalarData, ScalarType};
pub use light::{Light, LightType};
pub use property::{ComponentProperty, GradientOpacity, Interpolation, VolumeProperty};
pub use scene::Scene;
pub use stamp::{IdAllocator, ModifiedStamp, VolumeId};
pub use transfer::{ColorTransferFunction, PiecewiseFunction, TransferFunction};
pub use volume::{HasProperty, Renderable, Volume, VolumeActor};
