pub mod image_llm;
pub mod snapshot;
pub mod text_llm;

pub use image_llm::OpenAiImageAdapter;
pub use snapshot::FileSnapshotStore;
pub use text_llm::OpenAiTextAdapter;
