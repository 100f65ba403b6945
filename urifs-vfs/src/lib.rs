// SPDX-License-Identifier: AGPL-3.0-or-later
//! URI-addressed file system for URIFS
//!
//! [`UriFilesystem`] accepts full URIs (`s3://bucket/key`, `file:///tmp/x`,
//! or bare local paths), routes each call to a cached backend instance via
//! [`FileSystemContainer`], and turns every path the backend returns back
//! into a URI.

mod container;
mod filesystem;
mod qualify;

#[cfg(test)]
mod testing;

pub use container::{CacheKey, FileSystemContainer};
pub use filesystem::UriFilesystem;
pub use qualify::Qualify;
