// SPDX-FileCopyrightText: Copyright © 2026 TanmiDock Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Canonical platform values and the three mappings between them: the short
//! CLI key a user types, the downloader's "base key" (which fans out into
//! sanitizer variants), and loose/lowercase spellings seen in manifests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::environment::GENERAL_PLATFORM_DIR;

/// A concrete, canonical platform value (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "macOS")]
    MacOS,
    #[serde(rename = "macOS-asan")]
    MacOSAsan,
    Win,
    #[serde(rename = "iOS")]
    IOS,
    #[serde(rename = "iOS-asan")]
    IOSAsan,
    #[serde(rename = "android")]
    Android,
    #[serde(rename = "android-asan")]
    AndroidAsan,
    #[serde(rename = "android-hwasan")]
    AndroidHwasan,
    #[serde(rename = "ubuntu")]
    Ubuntu,
    #[serde(rename = "wasm")]
    Wasm,
    #[serde(rename = "ohos")]
    Ohos,
}

impl Platform {
    /// All canonical platform values, in a stable order.
    pub const ALL: &'static [Platform] = &[
        Platform::MacOS,
        Platform::MacOSAsan,
        Platform::Win,
        Platform::IOS,
        Platform::IOSAsan,
        Platform::Android,
        Platform::AndroidAsan,
        Platform::AndroidHwasan,
        Platform::Ubuntu,
        Platform::Wasm,
        Platform::Ohos,
    ];

    /// Canonical directory/string form, e.g. `macOS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::MacOS => "macOS",
            Platform::MacOSAsan => "macOS-asan",
            Platform::Win => "Win",
            Platform::IOS => "iOS",
            Platform::IOSAsan => "iOS-asan",
            Platform::Android => "android",
            Platform::AndroidAsan => "android-asan",
            Platform::AndroidHwasan => "android-hwasan",
            Platform::Ubuntu => "ubuntu",
            Platform::Wasm => "wasm",
            Platform::Ohos => "ohos",
        }
    }

    /// Short CLI key, e.g. `mac` for every macOS variant.
    pub fn cli_key(self) -> &'static str {
        match self {
            Platform::MacOS | Platform::MacOSAsan => "mac",
            Platform::Win => "win",
            Platform::IOS | Platform::IOSAsan => "ios",
            Platform::Android | Platform::AndroidAsan | Platform::AndroidHwasan => "android",
            Platform::Ubuntu => "linux",
            Platform::Wasm => "wasm",
            Platform::Ohos => "ohos",
        }
    }

    /// The downloader "base key" this platform is fetched under. Sanitizer
    /// variants share a base key with their plain counterpart because the
    /// downloader returns every variant for one base key (spec §4.10).
    pub fn downloader_base_key(self) -> &'static str {
        match self {
            Platform::MacOS | Platform::MacOSAsan => "macOS",
            Platform::Win => "Win",
            Platform::IOS | Platform::IOSAsan => "iOS",
            Platform::Android | Platform::AndroidAsan | Platform::AndroidHwasan => "android",
            Platform::Ubuntu => "ubuntu",
            Platform::Wasm => "wasm",
            Platform::Ohos => "ohos",
        }
    }

    /// Resolve a short CLI key (`mac`, `win`, `ios`, `android`, `linux`,
    /// `wasm`, `ohos`) to the set of canonical platforms it can denote.
    /// A CLI key is ambiguous for families with sanitizer variants; callers
    /// that need exactly one value should use [`Platform::from_loose`]
    /// instead, which resolves to the plain (non-sanitizer) member.
    pub fn from_cli_key(key: &str) -> Option<Platform> {
        match key {
            "mac" => Some(Platform::MacOS),
            "win" => Some(Platform::Win),
            "ios" => Some(Platform::IOS),
            "android" => Some(Platform::Android),
            "linux" => Some(Platform::Ubuntu),
            "wasm" => Some(Platform::Wasm),
            "ohos" => Some(Platform::Ohos),
            _ => None,
        }
    }

    /// Resolve a loose/lowercase spelling (e.g. `macos`, `MACOS-ASAN`) to the
    /// canonical platform value. Case-insensitive; hyphens are significant.
    pub fn from_loose(input: &str) -> Option<Platform> {
        let normalized = input.trim();
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(normalized))
    }

    /// Whether `name` case-normalizes to a canonical platform directory name
    /// (spec §4.1 `isPlatformDir`). The `_shared` sentinel is excluded: it is
    /// a general-library marker, not a platform.
    pub fn is_platform_dir(name: &str) -> bool {
        name != GENERAL_PLATFORM_DIR && Platform::from_loose(name).is_some()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::from_loose(s).ok_or_else(|| ParsePlatformError(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized platform value {0:?}")]
pub struct ParsePlatformError(String);

/// A platform "key" in the Store/Registry sense: either a concrete
/// [`Platform`] or the general sentinel `_shared` (spec §4.1, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformKey {
    Concrete(Platform),
    General,
}

impl PlatformKey {
    pub const GENERAL_STR: &'static str = GENERAL_PLATFORM_DIR;

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformKey::Concrete(p) => p.as_str(),
            PlatformKey::General => Self::GENERAL_STR,
        }
    }

    pub fn parse(name: &str) -> Option<PlatformKey> {
        if name == Self::GENERAL_STR {
            Some(PlatformKey::General)
        } else {
            Platform::from_loose(name).map(PlatformKey::Concrete)
        }
    }

    pub fn is_general(self) -> bool {
        matches!(self, PlatformKey::General)
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PlatformKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlatformKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PlatformKey::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("bad platform key {s:?}")))
    }
}

/// Deduplicate a list of requested platforms onto their downloader base keys,
/// preserving first-seen order (spec §4.10).
pub fn dedupe_base_keys(platforms: &[Platform]) -> Vec<&'static str> {
    let mut seen = Vec::new();
    for p in platforms {
        let base = p.downloader_base_key();
        if !seen.contains(&base) {
            seen.push(base);
        }
    }
    seen
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loose_parsing_is_case_insensitive() {
        assert_eq!(Platform::from_loose("macos"), Some(Platform::MacOS));
        assert_eq!(Platform::from_loose("MACOS"), Some(Platform::MacOS));
        assert_eq!(Platform::from_loose("android-HWASAN"), Some(Platform::AndroidHwasan));
        assert_eq!(Platform::from_loose("nonsense"), None);
    }

    #[test]
    fn cli_key_roundtrip_for_plain_platforms() {
        for p in Platform::ALL {
            let key = p.cli_key();
            let resolved = Platform::from_cli_key(key);
            assert!(resolved.is_some(), "cli key {key} should resolve");
        }
    }

    #[test]
    fn base_key_dedupe_preserves_order() {
        let platforms = [Platform::MacOSAsan, Platform::MacOS, Platform::Android];
        let keys = dedupe_base_keys(&platforms);
        assert_eq!(keys, vec!["macOS", "android"]);
    }

    #[test]
    fn is_platform_dir_excludes_general_sentinel() {
        assert!(Platform::is_platform_dir("macOS"));
        assert!(!Platform::is_platform_dir("_shared"));
        assert!(!Platform::is_platform_dir("not-a-platform"));
    }

    #[test]
    fn platform_key_parses_general_and_concrete() {
        assert_eq!(PlatformKey::parse("_shared"), Some(PlatformKey::General));
        assert_eq!(
            PlatformKey::parse("android"),
            Some(PlatformKey::Concrete(Platform::Android))
        );
        assert_eq!(PlatformKey::parse("bogus"), None);
    }
}
