pub mod manifest;

pub use manifest::{
    Library, LibraryManifest, ReadFile, ReadOrientation, DEFAULT_READ_LENGTH, MAX_LIBRARIES,
};
