//! ConversationEngine — the synchronous chat state machine.
//!
//! The engine applies a user input immediately (step and lead change at once)
//! and returns the bot replies as scheduled actions. Whoever drives the engine
//! waits out each action's delay and hands it back through [`apply`].
//!
//! [`apply`]: ConversationEngine::apply

use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::model::{ChatMessage, ChatView, Lead, Sender};
use super::script::{self, MenuChoice, NavChoice};
use super::state::ChatStep;
use crate::error::ChatError;

/// Something the engine wants done after a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append a bot message.
    Say(String),
    /// Clear the session and close the widget.
    EndSession,
}

/// An action with its delay, measured from the input that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub after: Duration,
    pub action: Action,
}

impl Scheduled {
    fn say(after: Duration, text: impl Into<String>) -> Self {
        Self {
            after,
            action: Action::Say(text.into()),
        }
    }
}

/// Result of feeding one input to the engine.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// The user message appended to the log, if the input was not blank.
    pub user_message: Option<ChatMessage>,
    /// Bot actions to run, in delay order.
    pub scheduled: Vec<Scheduled>,
    /// Set when this input completed the lead.
    pub submitted: Option<Lead>,
}

/// What applying a scheduled action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Message(ChatMessage),
    Ended,
    /// The session was closed before the action came due.
    Dropped,
}

/// Chat session state plus the transition logic.
#[derive(Debug, Default)]
pub struct ConversationEngine {
    messages: Vec<ChatMessage>,
    step: ChatStep,
    lead: Lead,
    is_open: bool,
    next_id: u64,
}

impl ConversationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> ChatStep {
        self.step
    }

    pub fn lead(&self) -> &Lead {
        &self.lead
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn quick_replies(&self) -> &'static [&'static str] {
        self.step.quick_replies()
    }

    pub fn view(&self) -> ChatView {
        ChatView {
            messages: self.messages.clone(),
            quick_replies: self.quick_replies().iter().map(|s| s.to_string()).collect(),
            is_open: self.is_open,
            step: self.step,
        }
    }

    /// Open the widget. Greets only when the log is empty.
    pub fn open(&mut self) -> Vec<Scheduled> {
        self.is_open = true;
        if !self.messages.is_empty() || self.step != ChatStep::Initial {
            return Vec::new();
        }
        self.transition(ChatStep::Menu);
        vec![
            Scheduled::say(script::GREETING_DELAY, script::GREETING),
            Scheduled::say(script::LATE_FOLLOW_UP_DELAY, script::MENU_PROMPT),
        ]
    }

    /// Close the widget, discarding the session.
    pub fn close(&mut self) {
        self.reset();
    }

    /// Handle free text typed by the user. Blank input is ignored.
    pub fn send_user_message(&mut self, text: &str) -> Result<Outcome, ChatError> {
        if !self.is_open {
            return Err(ChatError::Closed);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(Outcome::default());
        }
        let user_message = self.push(text.to_string(), Sender::User);
        let mut outcome = self.respond(text);
        outcome.user_message = Some(user_message);
        Ok(outcome)
    }

    /// Handle a quick-reply button. Only options offered in the current step
    /// are accepted.
    pub fn select_quick_reply(&mut self, option: &str) -> Result<Outcome, ChatError> {
        if !self.is_open {
            return Err(ChatError::Closed);
        }
        if !self.quick_replies().contains(&option) {
            return Err(ChatError::QuickReplyUnavailable {
                step: self.step.to_string(),
                option: option.to_string(),
            });
        }
        self.send_user_message(option)
    }

    /// Carry out a scheduled action.
    pub fn apply(&mut self, action: Action) -> Applied {
        if !self.is_open {
            return Applied::Dropped;
        }
        match action {
            Action::Say(text) => Applied::Message(self.push(text, Sender::Bot)),
            Action::EndSession => {
                self.reset();
                Applied::Ended
            }
        }
    }

    /// Apply every action at once, ignoring delays.
    pub fn apply_all(&mut self, scheduled: Vec<Scheduled>) -> Vec<Applied> {
        scheduled.into_iter().map(|s| self.apply(s.action)).collect()
    }

    fn respond(&mut self, text: &str) -> Outcome {
        let lower = text.to_lowercase();
        let mut outcome = Outcome::default();
        let replies = &mut outcome.scheduled;

        match self.step {
            ChatStep::Initial => match script::match_rule(script::INITIAL_RULES, &lower) {
                Some(NavChoice::Menu) => {
                    self.transition(ChatStep::Menu);
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::HOW_CAN_I_HELP));
                }
                _ => replies.push(Scheduled::say(
                    script::REPLY_DELAY,
                    script::INITIAL_NOT_UNDERSTOOD,
                )),
            },

            ChatStep::Menu => match script::match_rule(script::MENU_RULES, &lower) {
                Some(MenuChoice::Quote(quote)) => {
                    self.lead.interest = Some(quote.interest);
                    self.transition(ChatStep::CollectName);
                    replies.push(Scheduled::say(script::REPLY_DELAY, quote.ack));
                    replies.push(Scheduled::say(script::FOLLOW_UP_DELAY, quote.ask));
                }
                Some(MenuChoice::Faq) => {
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::FAQ_INTRO));
                    replies.push(Scheduled::say(script::FOLLOW_UP_DELAY, script::FAQ_LIST));
                    replies.push(Scheduled::say(script::LATE_FOLLOW_UP_DELAY, script::FAQ_OUTRO));
                }
                Some(MenuChoice::Contact) => {
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::CONTACT_INTRO));
                    replies.push(Scheduled::say(script::FOLLOW_UP_DELAY, script::CONTACT_DETAILS));
                    replies.push(Scheduled::say(
                        script::LATE_FOLLOW_UP_DELAY,
                        script::CONTACT_HOURS,
                    ));
                }
                Some(MenuChoice::ShowOptions) => {
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::MENU_PROMPT));
                }
                None => {
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::MENU_NOT_UNDERSTOOD));
                }
            },

            ChatStep::CollectName => {
                self.lead.name = Some(text.to_string());
                self.transition(ChatStep::CollectEmail);
                replies.push(Scheduled::say(script::REPLY_DELAY, script::greet_by_name(text)));
            }

            ChatStep::CollectEmail => {
                if text.contains('@') {
                    self.lead.email = Some(text.to_string());
                    self.transition(ChatStep::CollectPhone);
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::ASK_PHONE));
                } else {
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::INVALID_EMAIL));
                }
            }

            ChatStep::CollectPhone => {
                self.lead.phone = Some(text.to_string());
                self.transition(ChatStep::Final);
                let name = self.lead.name.clone().unwrap_or_default();
                replies.push(Scheduled::say(script::REPLY_DELAY, script::thank_by_name(&name)));
                replies.push(Scheduled::say(script::LATE_FOLLOW_UP_DELAY, script::ANYTHING_ELSE));
                outcome.submitted = Some(self.lead.clone());
            }

            ChatStep::Final => match script::match_rule(script::FINAL_RULES, &lower) {
                Some(NavChoice::Menu) => {
                    self.transition(ChatStep::Menu);
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::HOW_CAN_I_HELP));
                }
                Some(NavChoice::Exit) => {
                    replies.push(Scheduled::say(script::REPLY_DELAY, script::FAREWELL));
                    replies.push(Scheduled {
                        after: script::LATE_FOLLOW_UP_DELAY,
                        action: Action::EndSession,
                    });
                }
                None => replies.push(Scheduled::say(script::REPLY_DELAY, script::FINAL_HINT)),
            },
        }

        outcome
    }

    fn transition(&mut self, target: ChatStep) {
        debug_assert!(
            self.step.can_transition_to(target),
            "invalid chat transition {} -> {}",
            self.step,
            target
        );
        debug!(from = %self.step, to = %target, "Chat step transition");
        self.step = target;
    }

    fn push(&mut self, text: String, sender: Sender) -> ChatMessage {
        self.next_id += 1;
        let message = ChatMessage {
            id: self.next_id,
            text,
            sender,
            timestamp: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.lead = Lead::default();
        self.step = ChatStep::Initial;
        self.is_open = false;
    }
}
