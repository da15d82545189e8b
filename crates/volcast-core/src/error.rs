use thiserror::Error;

/// Errors raised while preparing or issuing a volume render.
#[derive(Debug, Error)]
pub enum VolcastError {
    #[error("Scalar buffer holds {actual} values, expected {expected} ({dims:?} x {components} components)")]
    ScalarSizeMismatch {
        expected: usize,
        actual: usize,
        dims: [u32; 3],
        components: usize,
    },

    #[error("Volume {0} has no input data")]
    MissingInput(usize),

    #[error("Unsupported component count {0} (expected 1-4)")]
    UnsupportedComponents(usize),

    #[error("Too many volumes: {count} (maximum {max})")]
    TooManyVolumes { count: usize, max: usize },

    #[error("Texture creation failed: {0}")]
    TextureCreationFailed(String),

    #[error("Shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    #[error("Draw failed: {0}")]
    DrawFailed(String),

    #[error("Unknown GPU resource handle {0}")]
    UnknownHandle(u64),

    #[error("Failed to parse mapper config RON: {0}")]
    ConfigParse(String),

    #[error("Invalid mapper config: {0}")]
    InvalidConfig(String),

    #[error("GPU adapter not found: {0}")]
    AdapterNotFound(String),

    #[error("Failed to request GPU device: {0}")]
    DeviceRequestFailed(String),
}
