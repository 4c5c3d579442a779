//! Speaking characters and their synthesis voices.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A character that can appear in a timeline and speak.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Character {
    /// The main presenter.
    #[default]
    Zundamon,
    /// Shikoku Metan.
    Metan,
    /// Kasukabe Tsumugi.
    Tsumugi,
}

impl Character {
    /// Every known character, in declaration order.
    pub const ALL: [Self; 3] = [Self::Zundamon, Self::Metan, Self::Tsumugi];

    /// Wire name of the character (`"zundamon"`, `"metan"`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zundamon => "zundamon",
            Self::Metan => "metan",
            Self::Tsumugi => "tsumugi",
        }
    }

    /// Default VOICEVOX speaker id for this character.
    pub const fn default_voice_id(self) -> u32 {
        match self {
            Self::Zundamon => 3,
            Self::Metan => 2,
            Self::Tsumugi => 8,
        }
    }
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a character name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown character '{0}'")]
pub struct UnknownCharacter(pub String);

impl FromStr for Character {
    type Err = UnknownCharacter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownCharacter(s.to_string()))
    }
}

/// Mapping from character to synthesis voice id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTable {
    voices: BTreeMap<Character, u32>,
}

impl VoiceTable {
    /// Build a table from explicit entries.
    pub fn new(voices: impl IntoIterator<Item = (Character, u32)>) -> Self {
        Self {
            voices: voices.into_iter().collect(),
        }
    }

    /// Voice id for `character`, if one is configured.
    pub fn voice_for(&self, character: Character) -> Option<u32> {
        self.voices.get(&character).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self::new(Character::ALL.map(|c| (c, c.default_voice_id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Metan".parse::<Character>().unwrap(), Character::Metan);
        assert_eq!(" zundamon ".parse::<Character>().unwrap(), Character::Zundamon);
        assert!("kiritan".parse::<Character>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Character::Tsumugi).unwrap();
        assert_eq!(json, "\"tsumugi\"");
    }

    #[test]
    fn default_table_covers_every_character() {
        let table = VoiceTable::default();
        for character in Character::ALL {
            assert_eq!(table.voice_for(character), Some(character.default_voice_id()));
        }
    }

    #[test]
    fn custom_table_only_knows_listed_characters() {
        let table = VoiceTable::new([(Character::Zundamon, 1)]);
        assert_eq!(table.voice_for(Character::Zundamon), Some(1));
        assert_eq!(table.voice_for(Character::Metan), None);
    }
}
