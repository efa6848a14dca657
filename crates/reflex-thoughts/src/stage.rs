use std::fmt;
use std::str::FromStr;

use reflex_branches::Category;
use reflex_core::ReflexError;

/// One named step of a sequence. The name doubles as the key of the
/// stage's middleware stack and of its completion timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Hear,
    Listen,
    Understand,
    Serve,
    Act,
    Respond,
    Remember,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Hear => "hear",
            Stage::Listen => "listen",
            Stage::Understand => "understand",
            Stage::Serve => "serve",
            Stage::Act => "act",
            Stage::Respond => "respond",
            Stage::Remember => "remember",
        }
    }

    /// Branch category evaluated by this stage; `None` for stages that only
    /// run their middleware.
    pub fn category(&self) -> Option<Category> {
        match self {
            Stage::Listen => Some(Category::Listen),
            Stage::Understand => Some(Category::Understand),
            Stage::Serve => Some(Category::Serve),
            Stage::Act => Some(Category::Act),
            Stage::Hear | Stage::Respond | Stage::Remember => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named, ordered stage lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    /// Inbound chat messages.
    Receive,
    /// Inbound server requests.
    Serve,
    /// Deliver what a reaction wrote, mid-sequence.
    Respond,
    /// Outgoing-only messages.
    Dispatch,
}

impl Sequence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sequence::Receive => "receive",
            Sequence::Serve => "serve",
            Sequence::Respond => "respond",
            Sequence::Dispatch => "dispatch",
        }
    }

    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Sequence::Receive => &[
                Stage::Hear,
                Stage::Listen,
                Stage::Understand,
                Stage::Act,
                Stage::Remember,
            ],
            Sequence::Serve => &[Stage::Hear, Stage::Serve, Stage::Act, Stage::Remember],
            Sequence::Respond => &[Stage::Respond],
            Sequence::Dispatch => &[Stage::Respond, Stage::Remember],
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sequence {
    type Err = ReflexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receive" => Ok(Sequence::Receive),
            "serve" => Ok(Sequence::Serve),
            "respond" => Ok(Sequence::Respond),
            "dispatch" => Ok(Sequence::Dispatch),
            other => Err(ReflexError::Sequence {
                sequence: other.to_string(),
                reason: "unknown sequence".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_list_their_stages() {
        let names: Vec<&str> = Sequence::Receive.stages().iter().map(Stage::as_str).collect();
        assert_eq!(names, ["hear", "listen", "understand", "act", "remember"]);
        assert_eq!(Sequence::Dispatch.stages(), &[Stage::Respond, Stage::Remember]);
        assert!("think".parse::<Sequence>().is_err());
        assert_eq!("serve".parse::<Sequence>().unwrap(), Sequence::Serve);
    }

    #[test]
    fn only_branch_stages_have_categories() {
        assert_eq!(Stage::Act.category(), Some(Category::Act));
        assert_eq!(Stage::Hear.category(), None);
        assert_eq!(Stage::Remember.category(), None);
    }
}
