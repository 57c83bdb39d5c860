use std::fmt;

/// A hierarchical name such as `Ability.Fire.Primary`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GameplayTag(String);

impl GameplayTag {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    /// The tag one level up, `None` for a root tag.
    pub fn parent(&self) -> Option<GameplayTag> {
        self.0
            .rfind('.')
            .map(|dot| GameplayTag(self.0[..dot].to_string()))
    }

    /// Whether this tag is `other` or one of its descendants.
    pub fn matches_tag(&self, other: &GameplayTag) -> bool {
        if !other.is_valid() {
            return false;
        }
        self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'.'))
    }
}

impl fmt::Display for GameplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
