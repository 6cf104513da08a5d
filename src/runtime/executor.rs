//! Session worker task

use super::SessionEvent;
use crate::data::DataContext;
use crate::llm::GenerativeBackend;
use crate::session::{ChatSession, TurnOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Queued commands; at most one `Submit` is ever pending
const COMMAND_CHANNEL_CAPACITY: usize = 16;

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<TurnOutcome>,
    },
    BindContext {
        data: Option<DataContext>,
        reply: oneshot::Sender<bool>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("A request is already in progress")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Session worker has stopped")]
    Closed,
}

/// Pending result of one submitted turn
#[derive(Debug)]
pub struct TurnHandle {
    rx: oneshot::Receiver<TurnOutcome>,
}

impl TurnHandle {
    pub async fn wait(self) -> Result<TurnOutcome, SubmitError> {
        self.rx.await.map_err(|_| SubmitError::Closed)
    }
}

/// Caller side of a running session
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    busy: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Move `session` onto a tokio task and return its handle
pub fn spawn_session<B>(session: ChatSession<B>) -> SessionHandle
where
    B: GenerativeBackend + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let broadcast_tx = session.event_sender();
    let busy = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run(session, command_rx, Arc::clone(&busy), cancel.clone()));

    SessionHandle {
        command_tx,
        broadcast_tx,
        busy,
        cancel,
        task: Some(task),
    }
}

impl SessionHandle {
    /// Start a turn. Rejected while another turn is in flight.
    pub fn submit(&self, text: &str) -> Result<TurnHandle, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyMessage);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubmitError::Busy);
        }

        let (reply, rx) = oneshot::channel();
        let command = Command::Submit {
            text: text.to_string(),
            reply,
        };
        if let Err(e) = self.command_tx.try_send(command) {
            self.busy.store(false, Ordering::Release);
            return Err(match e {
                // Binds and resets still queued ahead of this turn
                TrySendError::Full(_) => SubmitError::Busy,
                TrySendError::Closed(_) => SubmitError::Closed,
            });
        }
        Ok(TurnHandle { rx })
    }

    /// Bind a data context once any running turn has finished.
    /// Returns whether the context changed.
    pub async fn bind_data_context(&self, data: Option<DataContext>) -> Result<bool, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::BindContext { data, reply }).await?;
        rx.await.map_err(|_| SubmitError::Closed)
    }

    /// Clear the conversation once any running turn has finished
    pub async fn reset(&self) -> Result<(), SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        rx.await.map_err(|_| SubmitError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Stop the worker after the current turn and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Session worker panicked");
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), SubmitError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SubmitError::Closed)
    }
}

async fn run<B: GenerativeBackend>(
    mut session: ChatSession<B>,
    mut command_rx: mpsc::Receiver<Command>,
    busy: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    tracing::info!("Session worker started");

    loop {
        let command = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = command_rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Submit { text, reply } => {
                let outcome = session.run_turn(&text).await;
                busy.store(false, Ordering::Release);
                // The caller may have dropped its handle
                let _ = reply.send(outcome);
            }
            Command::BindContext { data, reply } => {
                let _ = reply.send(session.bind_data_context(data));
            }
            Command::Reset { reply } => {
                session.reset();
                let _ = reply.send(());
            }
        }
    }

    busy.store(false, Ordering::Release);
    tracing::info!("Session worker stopped");
}
