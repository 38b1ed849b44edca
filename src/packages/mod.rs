//! Package provisioning module.
//!
//! Selects an install strategy by platform family and converges the broker
//! package through it.
//!
//! ## Adding a Platform Family
//!
//! 1. Add a variant to `PlatformFamily` and map its names in `from_name`
//! 2. Implement `PackageProvisioner` for it
//! 3. Return it from `provisioner_for`

mod artifact;
mod debian;
mod platform;
mod rpm;
mod traits;
mod unknown;

pub use artifact::{artifact_for, artifact_file_name, artifact_url};
pub use debian::{apt_source_line, DebianProvisioner};
pub use platform::{parse_os_release, PlatformFamily};
pub use rpm::RpmProvisioner;
pub use traits::{InstallStrategy, PackageProvisioner, ProvisionContext};
pub use unknown::UnknownProvisioner;

/// Strategy for a platform family.
pub fn provisioner_for(platform: &PlatformFamily) -> Box<dyn PackageProvisioner> {
    match platform {
        PlatformFamily::DebianLike => Box::new(DebianProvisioner),
        PlatformFamily::RpmLike => Box::new(RpmProvisioner),
        PlatformFamily::Unknown(name) => Box::new(UnknownProvisioner::new(name)),
    }
}
