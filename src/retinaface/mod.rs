pub mod found_face;
pub mod nms;
pub mod post_process;
pub mod retinaface_common;

pub use found_face::{BoundingBox, FoundFace};
pub use retinaface_common::{DetectorSettings, RetinaFaceFaceDetector};
