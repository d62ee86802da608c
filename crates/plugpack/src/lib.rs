//! Packaging pipeline for plugpack plugin artifacts
//!
//! This crate turns a plugin project's build output into a single signed,
//! verifiable `.tpex` archive: it stages the compiled files into a canonical
//! layout, merges asset sources with conflict detection, computes per-file
//! SHA-256 digests plus an aggregate signature, seals the manifest, and
//! streams the result into a size/count-bounded tar container while
//! reporting progress.
//!
//! # Staging Layout
//!
//! ```text
//! build/staging/
//! ├── manifest.json              # sealed: carries _files and _signature
//! ├── plugin.key                 # random installation secret
//! ├── index.js                   # compiled entry
//! ├── preload.js                 # compiled preload entry
//! ├── widgets/                   # optional widget sources
//! ├── assets/                    # merged static assets
//! └── README.md
//! ```
//!
//! # Example
//!
//! ```no_run
//! use plugpack::{PackOptions, Packager};
//!
//! let packager = Packager::new("path/to/plugin-project", PackOptions::default());
//! let report = packager.run()?;
//! println!("sealed {}", report.archive_path.display());
//! # Ok::<(), plugpack::PackError>(())
//! ```

mod error;

pub mod archive;
pub mod assets;
pub mod hasher;
pub mod manifest;
pub mod packager;

pub use archive::{ArchiveBuilder, ArchiveEvent, ArchiveHeader, ArchiveLimit, ArchiveStats};
pub use assets::AssetMerger;
pub use error::{AssetConflict, PackError};
pub use manifest::{
    BuildConfig, DevConfig, IconInfo, Manifest, OnlinePolicy, SecretConfig, UpdatePolicy,
    VerifyConfig, VersionPolicy,
};
pub use packager::{PackOptions, PackReport, Packager};

/// Result type for packaging operations.
pub type PackResult<T> = Result<T, PackError>;

/// Sealed archive file extension.
pub const ARCHIVE_EXTENSION: &str = "tpex";

/// Magic string opening the optional self-describing archive preamble.
pub const ARCHIVE_MAGIC: &str = "Plugpack-PluginPackage";

/// Manifest file name within the staging tree and the archive.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Installation secret key file name, written next to the manifest.
pub const KEY_FILE: &str = "plugin.key";
