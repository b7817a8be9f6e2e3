mod ids;
mod media;
mod resume;

pub use ids::{ContentId, SourceId};
pub use media::{MediaSource, TrackDescriptor, TrackKind};
pub use resume::ResumePoint;
