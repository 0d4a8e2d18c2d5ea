//! Voice agent facade
//!
//! Owns a [`Controller`] on a background task. Commands from the presentation
//! layer and events from the controller's subsystems are serialized through one
//! loop, so every transition runs to completion before the next input.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::Result;
use crate::config::Config;
use crate::conversation::{
    Controller, ConversationState, Event, Handler, ListenerId, Notification, NotificationKind,
    Subsystems,
};

enum Request {
    Connect,
    Disconnect,
    Toggle,
    On {
        id: ListenerId,
        kind: NotificationKind,
        handler: Handler,
    },
    Off(ListenerId),
    Shutdown,
}

/// Handle to a running conversation controller
pub struct VoiceAgent {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConversationState>,
    connected: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl VoiceAgent {
    /// Validate `config` and start the controller task
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn spawn(config: Config, subsystems: Subsystems) -> Result<Self> {
        config.validate()?;

        let (controller, events) = Controller::new(config, subsystems);
        let state = controller.watch_state();
        let (connected_tx, connected) = watch::channel(false);
        let (requests, requests_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(drive(controller, requests_rx, events, connected_tx));

        Ok(Self {
            requests,
            state,
            connected,
            task: Some(task),
        })
    }

    /// Start a conversation; no-op unless idle
    pub fn connect(&self) {
        self.request(Request::Connect);
    }

    /// End the conversation and release everything
    pub fn disconnect(&self) {
        self.request(Request::Disconnect);
    }

    /// Connect when idle, disconnect otherwise
    pub fn toggle(&self) {
        self.request(Request::Toggle);
    }

    /// Current conversation state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        *self.state.borrow()
    }

    /// Whether the channel to the agent is open and ready
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observe state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConversationState> {
        self.state.clone()
    }

    /// Register a listener for `kind`
    ///
    /// Listeners run on the controller task, in registration order.
    pub fn on<F>(&self, kind: NotificationKind, handler: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + 'static,
    {
        let id = ListenerId::next();
        self.request(Request::On {
            id,
            kind,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a listener
    pub fn off(&self, id: ListenerId) {
        self.request(Request::Off(id));
    }

    /// Disconnect and wait for the controller task to finish
    pub async fn shutdown(mut self) {
        self.request(Request::Shutdown);
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "voice agent task failed");
        }
    }

    fn request(&self, request: Request) {
        if self.requests.send(request).is_err() {
            tracing::debug!("voice agent stopped, request dropped");
        }
    }
}

impl Drop for VoiceAgent {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.requests.send(Request::Shutdown);
        }
    }
}

async fn drive(
    mut controller: Controller,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut events: mpsc::UnboundedReceiver<Event>,
    connected: watch::Sender<bool>,
) {
    tracing::debug!("voice agent started");

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(Request::Connect) => controller.connect(),
                Some(Request::Disconnect) => controller.disconnect(),
                Some(Request::Toggle) => controller.toggle(),
                Some(Request::On { id, kind, handler }) => {
                    controller.insert_listener(id, kind, handler);
                }
                Some(Request::Off(id)) => {
                    controller.off(id);
                }
                Some(Request::Shutdown) | None => break,
            },
            Some(event) = events.recv() => controller.handle(event),
        }

        connected.send_if_modified(|current| {
            let now = controller.is_connected();
            let changed = *current != now;
            *current = now;
            changed
        });
    }

    controller.disconnect();
    connected.send_replace(false);
    tracing::debug!("voice agent stopped");
}
