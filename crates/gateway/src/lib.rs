//! pixport-gateway: concrete adapters for the export engine's ports
//!
//! `LocalFs` puts the engine on the real filesystem; `LocalLibrary` serves
//! a manifest-driven photo library from a local directory, standing in for
//! the remote service in the CLI and in tests.

pub mod library;
pub mod local;

pub use library::{
    encode_live_photo, LibraryManifest, LocalLibrary, ManifestEntry, PassthroughExif,
    MANIFEST_FILE,
};
pub use local::LocalFs;
