//! Site chat widget: a scripted lead-capture dialogue.
//!
//! [`ConversationEngine`] is the pure state machine. [`ChatSession`] plays
//! its replies on a timer and publishes events; [`routes`] exposes a session
//! per WebSocket connection.

pub mod engine;
pub mod model;
pub mod routes;
pub mod script;
pub mod session;
pub mod state;

pub use engine::{Action, Applied, ConversationEngine, Outcome, Scheduled};
pub use model::{ChatMessage, ChatView, Interest, Lead, Sender};
pub use routes::{ChatRouteState, ClientFrame, chat_routes};
pub use session::{ChatEvent, ChatSession, Pacing};
pub use state::ChatStep;
