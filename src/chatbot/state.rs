//! Chat state machine — tracks which step of the scripted dialogue is active.

use serde::{Deserialize, Serialize};

use super::script::MENU_QUICK_REPLIES;

/// The steps of the lead-capture conversation.
///
/// Progresses: Initial → Menu → CollectName → CollectEmail → CollectPhone →
/// Final, with Final looping back to Menu or ending the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStep {
    #[default]
    Initial,
    Menu,
    CollectName,
    CollectEmail,
    CollectPhone,
    Final,
}

impl ChatStep {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Staying in the same step (a re-prompt) is not a transition.
    pub fn can_transition_to(&self, target: ChatStep) -> bool {
        use ChatStep::*;
        matches!(
            (self, target),
            (Initial, Menu)
                | (Menu, CollectName)
                | (CollectName, CollectEmail)
                | (CollectEmail, CollectPhone)
                | (CollectPhone, Final)
                | (Final, Menu)
                | (Final, Initial)
        )
    }

    /// Quick-reply buttons offered in this step.
    pub fn quick_replies(&self) -> &'static [&'static str] {
        match self {
            Self::Menu => MENU_QUICK_REPLIES,
            _ => &[],
        }
    }
}

impl std::fmt::Display for ChatStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::Menu => "menu",
            Self::CollectName => "collect_name",
            Self::CollectEmail => "collect_email",
            Self::CollectPhone => "collect_phone",
            Self::Final => "final",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ChatStep; 6] = [
        ChatStep::Initial,
        ChatStep::Menu,
        ChatStep::CollectName,
        ChatStep::CollectEmail,
        ChatStep::CollectPhone,
        ChatStep::Final,
    ];

    #[test]
    fn valid_transitions() {
        use ChatStep::*;
        let transitions = [
            (Initial, Menu),
            (Menu, CollectName),
            (CollectName, CollectEmail),
            (CollectEmail, CollectPhone),
            (CollectPhone, Final),
            (Final, Menu),
            (Final, Initial),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use ChatStep::*;
        // Skipping a lead field
        assert!(!Menu.can_transition_to(CollectEmail));
        assert!(!CollectName.can_transition_to(CollectPhone));
        // Backwards
        assert!(!CollectEmail.can_transition_to(CollectName));
        // Self
        for step in ALL {
            assert!(!step.can_transition_to(step), "{step} self-loop is not a transition");
        }
    }

    #[test]
    fn only_menu_offers_quick_replies() {
        for step in ALL {
            let replies = step.quick_replies();
            if step == ChatStep::Menu {
                assert_eq!(replies.len(), 5);
            } else {
                assert!(replies.is_empty(), "{step} should offer no quick replies");
            }
        }
    }

    #[test]
    fn display_matches_serde() {
        for step in ALL {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json);
        }
    }
}
