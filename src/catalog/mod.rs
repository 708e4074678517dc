pub mod platforms;
pub mod references;

pub use platforms::{ContainerKind, PlatformProfile, PlatformTable, PlatformTag};
pub use references::{ExpectedDigest, ReferenceEntry, ReferenceIntegrityDatabase};
