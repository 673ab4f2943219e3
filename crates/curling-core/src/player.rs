use serde::{Deserialize, Serialize};

/// Unique identifier for a player. Never reused within a match.
pub type PlayerId = u64;

/// A player seated in a curling match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
}

impl Player {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Team colour. Assigned once at match start and fixed thereafter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerColor {
    #[default]
    Red,
    Blue,
}

impl PlayerColor {
    pub const fn opposite(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }
}

impl std::fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Blue => write!(f, "blue"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        assert_eq!(PlayerColor::Red.opposite(), PlayerColor::Blue);
        assert_eq!(PlayerColor::Blue.opposite(), PlayerColor::Red);
        assert_eq!(PlayerColor::Red.opposite().opposite(), PlayerColor::Red);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(PlayerColor::Red.to_string(), "red");
        assert_eq!(PlayerColor::Blue.to_string(), "blue");
    }
}
