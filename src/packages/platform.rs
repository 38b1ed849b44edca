//! Platform family resolution.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::host::PackageFormat;

const OS_RELEASE_PATH: &str = "/etc/os-release";

const DEBIAN_FAMILY: &[&str] = &["debian", "ubuntu", "linuxmint", "raspbian"];

const RPM_FAMILY: &[&str] = &[
    "rhel",
    "fedora",
    "centos",
    "amazon",
    "scientific",
    "oracle",
    "ol",
    "rocky",
    "almalinux",
];

/// Platform families with distinct install strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "family", content = "name", rename_all = "snake_case")]
pub enum PlatformFamily {
    DebianLike,
    RpmLike,
    /// Anything else, carrying the name it was resolved from.
    Unknown(String),
}

impl PlatformFamily {
    /// Map a platform or platform-family name.
    pub fn from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        if DEBIAN_FAMILY.contains(&lower.as_str()) {
            PlatformFamily::DebianLike
        } else if RPM_FAMILY.contains(&lower.as_str()) {
            PlatformFamily::RpmLike
        } else {
            PlatformFamily::Unknown(lower)
        }
    }

    /// Resolve the configured name, or detect from `/etc/os-release`.
    pub fn resolve(configured: Option<&str>) -> Self {
        if let Some(name) = configured {
            return Self::from_name(name);
        }
        match std::fs::read_to_string(OS_RELEASE_PATH) {
            Ok(content) => parse_os_release(&content),
            Err(e) => {
                debug!(error = %e, "Could not read {}", OS_RELEASE_PATH);
                PlatformFamily::Unknown("unknown".to_string())
            }
        }
    }

    /// Package format used on this family.
    pub fn package_format(&self) -> Option<PackageFormat> {
        match self {
            PlatformFamily::DebianLike => Some(PackageFormat::Deb),
            PlatformFamily::RpmLike => Some(PackageFormat::Rpm),
            PlatformFamily::Unknown(_) => None,
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFamily::DebianLike => f.write_str("debian"),
            PlatformFamily::RpmLike => f.write_str("rhel"),
            PlatformFamily::Unknown(name) => write!(f, "unknown ({})", name),
        }
    }
}

/// Determine the family from os-release content, trying `ID` then each
/// `ID_LIKE` entry.
pub fn parse_os_release(content: &str) -> PlatformFamily {
    let mut id = None;
    let mut id_like = Vec::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "ID" => id = Some(value.to_string()),
            "ID_LIKE" => id_like = value.split_whitespace().map(str::to_string).collect(),
            _ => {}
        }
    }

    for candidate in id.iter().chain(id_like.iter()) {
        let family = PlatformFamily::from_name(candidate);
        if !matches!(family, PlatformFamily::Unknown(_)) {
            return family;
        }
    }

    PlatformFamily::Unknown(id.unwrap_or_else(|| "unknown".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(PlatformFamily::from_name("debian"), PlatformFamily::DebianLike);
        assert_eq!(PlatformFamily::from_name("Ubuntu"), PlatformFamily::DebianLike);
        assert_eq!(PlatformFamily::from_name("rhel"), PlatformFamily::RpmLike);
        assert_eq!(PlatformFamily::from_name("fedora"), PlatformFamily::RpmLike);
        assert_eq!(
            PlatformFamily::from_name("arch"),
            PlatformFamily::Unknown("arch".to_string())
        );
    }

    #[test]
    fn test_configured_name_wins() {
        assert_eq!(PlatformFamily::resolve(Some("centos")), PlatformFamily::RpmLike);
    }

    #[test]
    fn test_parse_os_release_id() {
        let content = "NAME=\"Debian GNU/Linux\"\nID=debian\nVERSION_ID=\"12\"\n";
        assert_eq!(parse_os_release(content), PlatformFamily::DebianLike);
    }

    #[test]
    fn test_parse_os_release_id_like() {
        let content = "ID=\"rocky-custom\"\nID_LIKE=\"rhel centos fedora\"\n";
        assert_eq!(parse_os_release(content), PlatformFamily::RpmLike);
    }

    #[test]
    fn test_parse_os_release_unknown() {
        assert_eq!(
            parse_os_release("ID=alpine\n"),
            PlatformFamily::Unknown("alpine".to_string())
        );
        assert_eq!(
            parse_os_release(""),
            PlatformFamily::Unknown("unknown".to_string())
        );
    }

    #[test]
    fn test_package_format() {
        assert_eq!(PlatformFamily::DebianLike.package_format(), Some(PackageFormat::Deb));
        assert_eq!(PlatformFamily::RpmLike.package_format(), Some(PackageFormat::Rpm));
        assert_eq!(PlatformFamily::Unknown("x".into()).package_format(), None);
    }
}
