// Vote domain - pure state machine, no side effects
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something a user can vote on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VoteTarget {
    Post(i64),
    Commentary(i64),
}

impl VoteTarget {
    pub fn id(self) -> i64 {
        match self {
            VoteTarget::Post(id) | VoteTarget::Commentary(id) => id,
        }
    }

    /// Table holding the target row and its counters.
    pub(crate) fn table(self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "posts",
            VoteTarget::Commentary(_) => "commentaries",
        }
    }

    /// Column in the `likes`/`dislikes` tables that references the target.
    pub(crate) fn vote_column(self) -> &'static str {
        match self {
            VoteTarget::Post(_) => "post_id",
            VoteTarget::Commentary(_) => "commentary_id",
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteTarget::Post(id) => write!(f, "post {}", id),
            VoteTarget::Commentary(id) => write!(f, "commentary {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    /// Fact table recording this reaction.
    pub(crate) fn table(self) -> &'static str {
        match self {
            Reaction::Like => "likes",
            Reaction::Dislike => "dislikes",
        }
    }
}

/// Where one user stands with respect to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteState {
    #[default]
    None,
    Liked,
    Disliked,
}

impl VoteState {
    pub fn reaction(self) -> Option<Reaction> {
        match self {
            VoteState::None => None,
            VoteState::Liked => Some(Reaction::Like),
            VoteState::Disliked => Some(Reaction::Dislike),
        }
    }

    /// Applying the reaction already held retracts it; anything else casts it.
    pub fn apply(self, reaction: Reaction) -> Transition {
        let to = if self.reaction() == Some(reaction) {
            VoteState::None
        } else {
            reaction.into()
        };
        Transition { from: self, to }
    }
}

impl From<Reaction> for VoteState {
    fn from(reaction: Reaction) -> Self {
        match reaction {
            Reaction::Like => VoteState::Liked,
            Reaction::Dislike => VoteState::Disliked,
        }
    }
}

/// A single step of the toggle machine. `from` and `to` always differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: VoteState,
    pub to: VoteState,
}

impl Transition {
    /// Fact row to delete, if any.
    pub fn removed(self) -> Option<Reaction> {
        self.from.reaction()
    }

    /// Fact row to insert, if any.
    pub fn added(self) -> Option<Reaction> {
        self.to.reaction()
    }

    pub fn like_delta(self) -> i64 {
        (self.to == VoteState::Liked) as i64 - (self.from == VoteState::Liked) as i64
    }

    pub fn dislike_delta(self) -> i64 {
        (self.to == VoteState::Disliked) as i64 - (self.from == VoteState::Disliked) as i64
    }
}
