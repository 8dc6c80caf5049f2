//! Interactive loop: stdin commands in, rendered snapshots out.

use std::io::{self, Write};

use lingua_client::{
    ConnectionManager, HttpHistorySource, SessionHandle, SessionRuntime, SessionView,
    SocketIoTransport, TransportError,
};
use lingua_core::{ChatSession, ConfigError, SessionError, SessionNotice, SystemEnv};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::{
    args::Args,
    commands::{self, Command},
    render::Renderer,
};

/// Errors that end the client.
#[derive(Debug, Error)]
pub enum CliError {
    /// Arguments describe an unusable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session could not be started.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Transport or history client could not be built.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading input or writing output failed.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

enum Input {
    Line(io::Result<Option<String>>),
    Notice(Option<SessionNotice>),
    View(bool),
}

/// Join the room described by `args` and run until `/quit`, end of input or
/// the session stops.
pub async fn run(args: Args) -> Result<(), CliError> {
    let connection = args.connection_config();
    connection.validate()?;
    let history = args.history_config();
    history.validate()?;

    let session = ChatSession::new(SystemEnv, args.session_config())?;
    info!(
        room_id = %session.room_id(),
        role = %session.role(),
        endpoint = %connection.endpoint,
        "joining room"
    );

    let history = HttpHistorySource::new(&history)?;
    let transport = SocketIoTransport::connect(SystemEnv, connection.clone())?;
    let manager = ConnectionManager::new(transport, &connection);
    let handle = SessionRuntime::spawn(manager, session, history)?;

    let renderer = Renderer::new(args.role(), !args.hide_translation);
    drive(handle, renderer, BufReader::new(tokio::io::stdin()), io::stdout()).await
}

/// Feed `input` lines to the session and render its snapshots to `out`.
///
/// Shuts the session down before returning.
pub async fn drive<R, W>(
    mut handle: SessionHandle,
    mut renderer: Renderer,
    input: R,
    mut out: W,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut view = handle.view();
    let mut lines = input.lines();
    let mut notices_open = true;

    let snapshot = view.borrow_and_update().clone();
    renderer.render(&snapshot, &mut out)?;
    out.flush()?;

    let result = loop {
        let next = tokio::select! {
            line = lines.next_line() => Input::Line(line),
            notice = handle.next_notice(), if notices_open => Input::Notice(notice),
            changed = view.changed() => Input::View(changed.is_ok()),
        };

        match next {
            Input::Line(Err(err)) => break Err(err.into()),
            Input::Line(Ok(None)) => break Ok(()),
            Input::Line(Ok(Some(line))) => {
                let snapshot = view.borrow().clone();
                match dispatch(&handle, &mut renderer, &snapshot, commands::parse(&line), &mut out) {
                    Ok(true) => {},
                    Ok(false) => break Ok(()),
                    Err(err) => break Err(err.into()),
                }
            },
            Input::Notice(None) => notices_open = false,
            Input::Notice(Some(notice)) => {
                if let Err(err) = write_notice(&notice, &mut out) {
                    break Err(err.into());
                }
            },
            Input::View(false) => break Ok(()),
            Input::View(true) => {
                let snapshot = view.borrow_and_update().clone();
                if let Err(err) = renderer.render(&snapshot, &mut out) {
                    break Err(err.into());
                }
                if snapshot.closed {
                    break Ok(());
                }
            },
        }

        if let Err(err) = out.flush() {
            break Err(err.into());
        }
    };

    handle.shutdown().await;
    out.flush()?;
    result
}

/// Run one command. Returns `false` on `/quit`.
fn dispatch(
    handle: &SessionHandle,
    renderer: &mut Renderer,
    view: &SessionView,
    command: Command,
    out: &mut impl Write,
) -> io::Result<bool> {
    match command {
        Command::Empty => {},
        Command::Message { content } => {
            handle.send_message(content);
            handle.stop_typing();
        },
        Command::Typing => {
            handle.typing();
        },
        Command::StopTyping => {
            handle.stop_typing();
        },
        Command::EndChat => {
            handle.end_chat();
        },
        Command::ToggleTranslation => renderer.toggle_translation(view, out)?,
        Command::Status => renderer.status(view, out)?,
        Command::Quit => return Ok(false),
        Command::Unknown { input } => {
            writeln!(out, "unknown command: {input}")?;
            writeln!(out, "commands: /typing /stop /end /translation /status /quit")?;
        },
        Command::InvalidArgs { command, error } => writeln!(out, "/{command}: {error}")?,
    }
    Ok(true)
}

fn write_notice(notice: &SessionNotice, out: &mut impl Write) -> io::Result<()> {
    match notice {
        SessionNotice::RelayError { message } => writeln!(out, "-- relay error: {message} --"),
        SessionNotice::HistoryUnavailable { reason } => {
            writeln!(out, "-- history unavailable: {reason} --")
        },
        other => {
            debug!(notice = ?other, "session notice");
            Ok(())
        },
    }
}
