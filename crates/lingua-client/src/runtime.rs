//! Session runtime.
//!
//! One spawned task owns the [`ChatSession`] and the [`ConnectionManager`]
//! and processes one input to completion before taking the next:
//!
//! ```text
//!  SessionHandle ── commands ──┐
//!  ConnectionManager ── events ┼──> select! ──> ChatSession ──> actions
//!  hydration task ── result ───┘                                  │
//!        ^                                                        │
//!        └──────── FetchHistory ──── Emit ──> manager.send ───────┤
//!                                    Notify ──> notices + view <──┘
//! ```
//!
//! Hydration runs as its own task so a slow history endpoint never blocks
//! live traffic. Its result re-enters the loop tagged with the activation that
//! asked for it.
//!
//! Shutdown (explicit, handle dropped, or transport gone) aborts hydration,
//! tears the session down, detaches every subscription and closes the
//! transport.

use std::sync::Arc;

use lingua_core::{
    ActivationId, ChatSession, ConnectionState, Environment, HydrationError, Hydration, Message,
    SessionAction, SessionCommand, SessionError, SessionEvent, SessionNotice,
};
use lingua_proto::{EventKind, HistoryRecord};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot, watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    history::HistorySource,
    manager::{ConnectionManager, ManagerEvent},
    transport::Transport,
};

/// Snapshot of everything a UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    /// Message log, oldest first.
    pub messages: Vec<Message>,
    /// Connection state.
    pub connection: ConnectionState,
    /// Current retry number.
    pub reconnect_attempt: u32,
    /// The relay acknowledged the join.
    pub joined: bool,
    /// History progress of the current activation.
    pub hydration: Option<Hydration>,
    /// The counterpart was seen in the room.
    pub counterpart_online: bool,
    /// The counterpart is typing.
    pub counterpart_typing: bool,
    /// Language announced by the customer (agent sessions).
    pub counterpart_language: Option<String>,
    /// The conversation was closed.
    pub ended: bool,
    /// Who closed it, when known.
    pub ended_by: Option<String>,
    /// The runtime stopped.
    pub closed: bool,
}

enum RuntimeCommand {
    Session(SessionCommand),
    Shutdown(oneshot::Sender<()>),
}

type HistoryResult = (ActivationId, Result<Vec<HistoryRecord>, HydrationError>);

/// Notices buffered for [`SessionHandle::next_notice`]. Once full, newer
/// notices are dropped until the handle reads again.
pub const NOTICE_CAPACITY: usize = 256;

/// Control surface of a running session.
///
/// Dropping the handle shuts the runtime down.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<RuntimeCommand>,
    notices: mpsc::Receiver<SessionNotice>,
    view: watch::Receiver<SessionView>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Send a chat turn. Returns `false` when the runtime is gone.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        self.command(SessionCommand::SendMessage(text.into()))
    }

    /// Tell the counterpart we are typing.
    pub fn typing(&self) -> bool {
        self.command(SessionCommand::Typing)
    }

    /// Tell the counterpart we stopped typing.
    pub fn stop_typing(&self) -> bool {
        self.command(SessionCommand::StopTyping)
    }

    /// Close the conversation.
    pub fn end_chat(&self) -> bool {
        self.command(SessionCommand::EndChat)
    }

    /// Receiver of view snapshots.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Next notice. `None` once the runtime stopped and every notice was read.
    ///
    /// At most [`NOTICE_CAPACITY`] unread notices are kept.
    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        self.notices.recv().await
    }

    /// Stop the runtime and wait for it to finish.
    pub async fn shutdown(mut self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(RuntimeCommand::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "session runtime task failed");
            }
        }
    }

    fn command(&self, command: SessionCommand) -> bool {
        self.commands.send(RuntimeCommand::Session(command)).is_ok()
    }
}

/// Event loop driving one session over one connection.
pub struct SessionRuntime<T: Transport, H: HistorySource, E: Environment> {
    manager: ConnectionManager<T>,
    session: ChatSession<E>,
    history: Arc<H>,
    view: watch::Sender<SessionView>,
    notices: mpsc::Sender<SessionNotice>,
    hydration_tx: mpsc::UnboundedSender<HistoryResult>,
    hydration_rx: mpsc::UnboundedReceiver<HistoryResult>,
    hydration_task: Option<JoinHandle<()>>,
}

impl<T: Transport, H: HistorySource, E: Environment> SessionRuntime<T, H, E> {
    /// Activate `session` and drive it on a new task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        mut manager: ConnectionManager<T>,
        mut session: ChatSession<E>,
        history: H,
    ) -> Result<SessionHandle, SessionError> {
        for kind in EventKind::ALL {
            manager.subscribe(kind);
        }

        let mut actions =
            session.handle_event(SessionEvent::ConnectionChanged(manager.state()));
        actions.extend(session.activate()?);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CAPACITY);
        let (view_tx, view_rx) = watch::channel(SessionView::default());
        let (hydration_tx, hydration_rx) = mpsc::unbounded_channel();

        let mut runtime = Self {
            manager,
            session,
            history: Arc::new(history),
            view: view_tx,
            notices: notice_tx,
            hydration_tx,
            hydration_rx,
            hydration_task: None,
        };
        runtime.execute(actions);
        runtime.publish();

        let task = tokio::spawn(runtime.run(command_rx));
        Ok(SessionHandle {
            commands: command_tx,
            notices: notice_rx,
            view: view_rx,
            task: Some(task),
        })
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RuntimeCommand>) {
        info!(room_id = %self.session.room_id(), role = %self.session.role(), "session runtime started");
        let mut shutdown_ack = None;

        loop {
            let actions = tokio::select! {
                command = commands.recv() => match command {
                    Some(RuntimeCommand::Session(command)) => self.session.handle_command(command),
                    Some(RuntimeCommand::Shutdown(ack)) => {
                        shutdown_ack = Some(ack);
                        break;
                    },
                    None => {
                        debug!("session handle dropped");
                        break;
                    },
                },
                events = self.manager.next_event() => match events {
                    Some(events) => self.on_manager_events(events),
                    None => {
                        info!("transport gone");
                        break;
                    },
                },
                Some((activation, result)) = self.hydration_rx.recv() => {
                    self.hydration_task = None;
                    self.session.handle_event(SessionEvent::HistoryLoaded { activation, result })
                },
            };
            self.execute(actions);
            self.publish();
        }

        self.teardown();
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn on_manager_events(&mut self, events: Vec<ManagerEvent>) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        for event in events {
            match event {
                ManagerEvent::StateChanged { from, to } => {
                    info!(%from, %to, "connection state changed");
                    actions.extend(self.session.handle_event(SessionEvent::ConnectionChanged(to)));
                },
                ManagerEvent::AttemptChanged(attempt) => {
                    debug!(attempt, "reconnect attempt changed");
                },
                ManagerEvent::Inbound(event) => {
                    actions.extend(self.session.handle_event(SessionEvent::Inbound(event)));
                },
            }
        }
        actions
    }

    fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Emit(event) => {
                    self.manager.send(&event);
                },
                SessionAction::FetchHistory { activation, room_id } => {
                    if let Some(previous) = self.hydration_task.take() {
                        previous.abort();
                    }
                    let history = Arc::clone(&self.history);
                    let results = self.hydration_tx.clone();
                    self.hydration_task = Some(tokio::spawn(async move {
                        let result = history.fetch(&room_id).await;
                        let _ = results.send((activation, result));
                    }));
                },
                SessionAction::Notify(notice) => match self.notices.try_send(notice) {
                    Ok(()) | Err(TrySendError::Closed(_)) => {},
                    Err(TrySendError::Full(notice)) => {
                        debug!(?notice, "notice buffer full, dropping notice");
                    },
                },
            }
        }
    }

    fn publish(&self) {
        let session = &self.session;
        let view = SessionView {
            messages: session.messages().to_vec(),
            connection: self.manager.state(),
            reconnect_attempt: self.manager.reconnect_attempt(),
            joined: session.is_joined(),
            hydration: session.activation().map(|_| session.hydration()),
            counterpart_online: session.counterpart_online(),
            counterpart_typing: session.counterpart_typing(),
            counterpart_language: session.counterpart_language().map(str::to_string),
            ended: session.is_ended(),
            ended_by: session.ended_by().map(str::to_string),
            closed: self.manager.is_closed(),
        };
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn teardown(&mut self) {
        if let Some(task) = self.hydration_task.take() {
            debug!("aborting in-flight history fetch");
            task.abort();
        }
        self.session.teardown();
        self.manager.unsubscribe_all();
        self.manager.close();
        self.publish();
        info!(room_id = %self.session.room_id(), "session runtime stopped");
    }
}
