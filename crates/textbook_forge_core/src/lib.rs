pub mod domain;
pub mod export;
pub mod ingest;
pub mod outline;
pub mod pipeline;
pub mod ports;
pub mod story;

pub use domain::{
    Chapter, GenerationProgress, GenerationStage, GenerationStatus, Outline, OutlineSection, Page,
    Section, Snapshot, SnapshotRef, StoryDocument, StoryOutline, TextbookDocument,
};
pub use ingest::{assemble_source, IngestError, IngestLimits, SourceFile};
pub use pipeline::{GenerationError, TextbookGenerator};
pub use ports::{
    GenerationObserver, ImageGenerationService, PageRequest, PortError, PortResult,
    SectionRequest, SnapshotStore, TextGenerationService, TextStream,
};
pub use story::{StoryControl, StoryGenerator, StoryRunState};
