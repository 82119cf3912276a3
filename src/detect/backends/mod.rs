pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{neutral_landmarks, StubFaceBackend, StubHandBackend};

#[cfg(feature = "backend-tract")]
pub use tract::{TractFaceBackend, TractHandBackend};
