/// Sound identifiers
///
/// A sound is addressed either by a free-form name or by one of the fixed
/// [`SoundType`]s. Each scheme has its own backing map in the registry and
/// the two never overlap.
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Built-in sound categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SoundType {
    /// Bass drum hit
    BassDrum,

    /// Closed hi-hat
    ClosedHat,

    /// Mid conga
    MidConga,
}

impl SoundType {
    pub const ALL: [SoundType; 3] = [SoundType::BassDrum, SoundType::ClosedHat, SoundType::MidConga];

    /// Asset loaded for this type when the configuration names none
    pub fn default_asset_path(&self) -> PathBuf {
        let file = match self {
            SoundType::BassDrum => "BD2575.WAV",
            SoundType::ClosedHat => "CH.WAV",
            SoundType::MidConga => "MC50.WAV",
        };
        PathBuf::from("assets").join("sounds").join(file)
    }
}

impl fmt::Display for SoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundType::BassDrum => write!(f, "Bass Drum"),
            SoundType::ClosedHat => write!(f, "Closed Hat"),
            SoundType::MidConga => write!(f, "Mid Conga"),
        }
    }
}

/// Key into the buffer registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SoundId {
    Named(String),
    Typed(SoundType),
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundId::Named(name) => write!(f, "'{}'", name),
            SoundId::Typed(kind) => write!(f, "type '{}'", kind),
        }
    }
}

impl From<&str> for SoundId {
    fn from(name: &str) -> Self {
        SoundId::Named(name.to_string())
    }
}

impl From<String> for SoundId {
    fn from(name: String) -> Self {
        SoundId::Named(name)
    }
}

impl From<SoundType> for SoundId {
    fn from(kind: SoundType) -> Self {
        SoundId::Typed(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_type_display() {
        assert_eq!(SoundType::BassDrum.to_string(), "Bass Drum");
        assert_eq!(SoundType::MidConga.to_string(), "Mid Conga");
    }

    #[test]
    fn test_default_asset_paths_are_distinct() {
        let paths: std::collections::HashSet<_> =
            SoundType::ALL.iter().map(|t| t.default_asset_path()).collect();
        assert_eq!(paths.len(), SoundType::ALL.len());
        assert!(SoundType::ClosedHat.default_asset_path().ends_with("CH.WAV"));
    }

    #[test]
    fn test_sound_id_conversions() {
        assert_eq!(SoundId::from("laser"), SoundId::Named("laser".to_string()));
        assert_eq!(SoundId::from(SoundType::ClosedHat), SoundId::Typed(SoundType::ClosedHat));
        assert_eq!(SoundId::from(String::from("x")), SoundId::Named("x".to_string()));
        assert_eq!(SoundId::from("laser").to_string(), "'laser'");
    }
}
