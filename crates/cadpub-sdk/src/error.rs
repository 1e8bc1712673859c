use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("cannot parse settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot render settings: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key error: {0}")]
    Key(#[from] cadpub_types::KeyError),

    #[error("store error: {0}")]
    Store(#[from] cadpub_store::StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] cadpub_cache::CacheError),

    #[error("engine error: {0}")]
    Engine(#[from] cadpub_engine::EngineError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] cadpub_pipeline::PipelineError),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] cadpub_descriptor::DescriptorError),
}

pub type SdkResult<T> = Result<T, SdkError>;
