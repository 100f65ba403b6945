// SPDX-License-Identifier: AGPL-3.0-or-later
//! Re-qualification of backend results

use urifs_core::{DiskUsage, Entry, Uri, WalkEntry};

/// Rewrites the paths inside a backend result into full URIs on the
/// scheme and authority of `base`.
///
/// Only fields holding paths are touched. Bare names, such as the `dirs`
/// and `files` of a [`WalkEntry`], stay as they are.
pub trait Qualify {
    fn qualify(self, base: &Uri) -> Self;
}

impl Qualify for String {
    fn qualify(self, base: &Uri) -> Self {
        base.qualify(&self)
    }
}

impl Qualify for Entry {
    fn qualify(mut self, base: &Uri) -> Self {
        self.path = base.qualify(&self.path);
        self
    }
}

impl Qualify for WalkEntry {
    fn qualify(mut self, base: &Uri) -> Self {
        self.root = base.qualify(&self.root);
        self
    }
}

impl Qualify for DiskUsage {
    fn qualify(self, base: &Uri) -> Self {
        match self {
            DiskUsage::Total(total) => DiskUsage::Total(total),
            DiskUsage::PerPath(sizes) => DiskUsage::PerPath(
                sizes
                    .into_iter()
                    .map(|(path, size)| (base.qualify(&path), size))
                    .collect(),
            ),
        }
    }
}

impl<T: Qualify> Qualify for Vec<T> {
    fn qualify(self, base: &Uri) -> Self {
        self.into_iter().map(|item| item.qualify(base)).collect()
    }
}
