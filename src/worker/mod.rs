//! Result handling: artifact fetch, delivery gate and ack decision

pub mod deliver;
pub mod fetch;
pub mod handler;

pub use deliver::{Delivered, MAX_UPLOAD_BYTES, Outcome};
pub use fetch::{Artifact, ArtifactFetcher};
pub use handler::{Disposition, ResultHandler};
