//! ChatSession — drives a [`ConversationEngine`] in real time.
//!
//! Inputs are serialized: each one is applied and its bot replies are played
//! out on their timers before the next input is looked at. Closing does not
//! wait for that; it bumps the session epoch, which cancels whatever replies
//! are still pending.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::engine::{Action, Applied, ConversationEngine, Outcome, Scheduled};
use super::model::{ChatMessage, ChatView};
use super::state::ChatStep;
use crate::error::ChatError;
use crate::leads::{LeadRecord, LeadSink};

const EVENT_CAPACITY: usize = 64;

/// How bot reply delays are honoured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Wait out each delay, like a person typing.
    #[default]
    Ui,
    /// Deliver replies immediately, in order.
    Instant,
}

impl Pacing {
    pub fn scale(&self, delay: Duration) -> Duration {
        match self {
            Self::Ui => delay,
            Self::Instant => Duration::ZERO,
        }
    }
}

/// Events published to whoever renders the chat.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Full state, sent on connect.
    Sync { view: ChatView },
    /// A message was appended to the log.
    Message { message: ChatMessage },
    /// Step or visibility changed.
    State {
        step: ChatStep,
        is_open: bool,
        quick_replies: Vec<String>,
    },
    /// The session was cleared and the widget closed.
    Closed,
    /// An input was refused.
    Rejected { reason: String },
}

struct Shared {
    engine: Mutex<ConversationEngine>,
    /// Held from the moment an input is taken until its replies are out.
    input: Mutex<()>,
    epoch: watch::Sender<u64>,
    tx: broadcast::Sender<ChatEvent>,
    pacing: Pacing,
    sink: Option<Arc<dyn LeadSink>>,
}

/// One visitor's chat. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<Shared>,
}

impl ChatSession {
    pub fn new(pacing: Pacing, sink: Option<Arc<dyn LeadSink>>) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        let (epoch, _epoch_rx) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(ConversationEngine::new()),
                input: Mutex::new(()),
                epoch,
                tx,
                pacing,
                sink,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.tx.subscribe()
    }

    pub async fn view(&self) -> ChatView {
        self.shared.engine.lock().await.view()
    }

    /// Open the widget and play the greeting, if any.
    pub async fn open(&self) {
        let _input = self.shared.input.lock().await;
        let (scheduled, epoch_rx) = {
            let mut engine = self.shared.engine.lock().await;
            let scheduled = engine.open();
            self.shared.publish_state(&engine);
            (scheduled, self.shared.epoch.subscribe())
        };
        self.play(scheduled, epoch_rx).await;
    }

    /// Close the widget and discard the session. Pending replies are dropped.
    pub async fn close(&self) {
        let mut engine = self.shared.engine.lock().await;
        engine.close();
        self.shared.end_epoch();
        debug!(epoch = *self.shared.epoch.borrow(), "Chat session closed");
    }

    pub async fn send_user_message(&self, text: &str) -> Result<(), ChatError> {
        let _input = self.shared.input.lock().await;
        let (outcome, epoch_rx) = {
            let mut engine = self.shared.engine.lock().await;
            let outcome = engine.send_user_message(text)?;
            (outcome, self.shared.epoch.subscribe())
        };
        self.handle_outcome(outcome, epoch_rx).await
    }

    pub async fn select_quick_reply(&self, option: &str) -> Result<(), ChatError> {
        let _input = self.shared.input.lock().await;
        let (outcome, epoch_rx) = {
            let mut engine = self.shared.engine.lock().await;
            let outcome = engine.select_quick_reply(option)?;
            (outcome, self.shared.epoch.subscribe())
        };
        self.handle_outcome(outcome, epoch_rx).await
    }

    /// Publish the input, hand a completed lead to the sink, then play the
    /// replies. A sink failure is returned and the replies are not played.
    async fn handle_outcome(
        &self,
        outcome: Outcome,
        epoch_rx: watch::Receiver<u64>,
    ) -> Result<(), ChatError> {
        let Some(message) = outcome.user_message else {
            return Ok(());
        };
        self.shared.publish(ChatEvent::Message { message });
        self.shared.publish_state(&*self.shared.engine.lock().await);

        if let Some(lead) = outcome.submitted {
            info!(fields = ?lead.filled_fields(), "Chat lead completed");
            if let Some(sink) = &self.shared.sink {
                if let Err(e) = sink.submit(LeadRecord::from_chat(lead)).await {
                    warn!(error = %e, "Failed to store chat lead");
                    return Err(ChatError::LeadNotStored(e.to_string()));
                }
            }
        }

        self.play(outcome.scheduled, epoch_rx).await;
        Ok(())
    }

    /// Play scheduled actions in order, each at its delay from now. Stops as
    /// soon as the epoch moves on.
    async fn play(&self, scheduled: Vec<Scheduled>, mut epoch_rx: watch::Receiver<u64>) {
        let epoch = *epoch_rx.borrow_and_update();
        let start = Instant::now();

        for item in scheduled {
            let delay = self.shared.pacing.scale(item.after);
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep_until(start + delay) => {}
                    _ = epoch_rx.changed() => {
                        debug!("Dropping replies from a closed session");
                        return;
                    }
                }
            }

            let mut engine = self.shared.engine.lock().await;
            if *epoch_rx.borrow() != epoch {
                return;
            }
            self.shared.apply(&mut engine, item.action);
        }
    }
}

impl Shared {
    fn apply(&self, engine: &mut ConversationEngine, action: Action) {
        match engine.apply(action) {
            Applied::Message(message) => self.publish(ChatEvent::Message { message }),
            Applied::Ended => {
                info!("Chat session ended by visitor");
                self.end_epoch();
            }
            Applied::Dropped => {}
        }
    }

    fn end_epoch(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
        self.publish(ChatEvent::Closed);
    }

    fn publish_state(&self, engine: &ConversationEngine) {
        self.publish(ChatEvent::State {
            step: engine.step(),
            is_open: engine.is_open(),
            quick_replies: engine.quick_replies().iter().map(|s| s.to_string()).collect(),
        });
    }

    fn publish(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
