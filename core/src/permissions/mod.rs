//! Reading and applying the running user's access rights on one entry.
//!
//! One implementation exists per permission model; the walker and the
//! materializer only ever talk to [`PermissionAdapter`], and the build target
//! picks [`NativePermissions`].

use crate::{Platform, Result};
use std::path::Path;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use posix::PosixPermissions;
#[cfg(windows)]
pub use windows::WindowsAcl;

#[cfg(unix)]
pub type NativePermissions = PosixPermissions;
#[cfg(windows)]
pub type NativePermissions = WindowsAcl;

pub trait PermissionAdapter {
    /// Which rights field of an entry this adapter owns.
    fn platform(&self) -> Platform;

    /// Returns the current rights of `path` for this permission model.
    fn read_current(&self, path: &Path) -> Result<u32>;

    /// Installs `rights` on `path`. A value of `0` is applied as-is.
    fn apply(&self, path: &Path, rights: u32, is_directory: bool) -> Result<()>;
}

impl<A: PermissionAdapter + ?Sized> PermissionAdapter for &A {
    fn platform(&self) -> Platform {
        (**self).platform()
    }

    fn read_current(&self, path: &Path) -> Result<u32> {
        (**self).read_current(path)
    }

    fn apply(&self, path: &Path, rights: u32, is_directory: bool) -> Result<()> {
        (**self).apply(path, rights, is_directory)
    }
}
