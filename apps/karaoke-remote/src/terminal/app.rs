use std::future::Future;
use std::sync::Arc;

use remote_proto::{Command, SongChoice};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::cli::Cli;
use super::error::CliError;
use super::input::{HELP, UserIntent, parse_line};
use super::view::TerminalView;
use crate::config::{ClientConfig, WakeLockMode};
use crate::session::{Delivery, Enqueued, LifecycleTrigger, SessionClient};
use crate::suggest::SuggestDebouncer;
use crate::telemetry::logging;
use crate::transport::TransportFactory;
use crate::transport::websocket::WebSocketFactory;
use crate::wake_lock::{InhibitWakeLock, NoWakeLock, WakeLockGuard, WakeLockProvider};

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let log_config = cli.logging.to_config();
    logging::init(&log_config).map_err(|err| CliError::Logging(err.to_string()))?;
    debug!(
        target: "karaoke::app",
        log_level = ?log_config.level,
        log_file = ?log_config.file,
        "logging configured"
    );

    let config = cli.client_config()?;
    info!(
        target: "karaoke::app",
        sid = %config.session.sid,
        hub = %config.hub.hub_url(),
        prefer_primary = config.session.prefer_primary,
        "starting remote"
    );
    let factory = Arc::new(WebSocketFactory::new(config.hub.hub_url().clone())?);
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "karaoke::app", error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    run_remote(
        config,
        factory,
        TerminalView::stdout(),
        BufReader::new(tokio::io::stdin()),
        shutdown,
    )
    .await
}

/// Drives one remote until the input ends, the user quits or `shutdown` fires.
pub async fn run_remote<R, S>(
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    view: Arc<TerminalView>,
    input: R,
    shutdown: S,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let provider: Arc<dyn WakeLockProvider> = match config.wake_lock {
        WakeLockMode::None => Arc::new(NoWakeLock),
        WakeLockMode::Inhibit => Arc::new(InhibitWakeLock::default()),
    };
    let client = SessionClient::create(config.session.clone(), factory, WakeLockGuard::new(provider));
    view.attach(&client);
    let suggest = SuggestDebouncer::new(
        Arc::clone(&client),
        config.suggest_debounce,
        config.suggest_limit,
    );
    view.line(&format!(
        "karaoke remote for session {} (type `help` for commands)",
        client.sid()
    ));

    let boot = spawn_trigger(&client, LifecycleTrigger::Boot);

    let mut lines = input.lines();
    tokio::pin!(shutdown);
    let result = loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut shutdown => {
                info!(target: "karaoke::app", "interrupted");
                Ok(None)
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(err) => break Err(CliError::Io(err)),
        };
        match parse_line(&line) {
            Ok(UserIntent::Quit) => break Ok(()),
            Ok(intent) => apply_intent(&client, &suggest, &view, intent),
            Err(err) => view.line(&format!("⚠️  {err}")),
        }
    };

    suggest.cancel();
    boot.abort();
    client.dispose().await;
    result
}

fn spawn_trigger(
    client: &Arc<SessionClient>,
    trigger: LifecycleTrigger,
) -> tokio::task::JoinHandle<()> {
    let client = Arc::clone(client);
    tokio::spawn(async move {
        if let Some(outcome) = client.handle_trigger(trigger).await {
            debug!(target: "karaoke::app", ?trigger, ?outcome, "connect sequence finished");
        }
    })
}

fn apply_intent(
    client: &Arc<SessionClient>,
    suggest: &SuggestDebouncer,
    view: &TerminalView,
    intent: UserIntent,
) {
    match intent {
        UserIntent::Empty | UserIntent::Quit => {}
        UserIntent::Search(keyword) => report(view, client.dispatch(&Command::Search { keyword })),
        UserIntent::Suggest(text) => suggest.keystroke(&text),
        UserIntent::Reserve { index, first } => {
            let state = client.player_state();
            let Some(song) = index.checked_sub(1).and_then(|i| state.search_results.get(i)) else {
                view.line(&format!("⚠️  no search result #{index}; run `search` first"));
                return;
            };
            let choice = SongChoice::from(song);
            let command = if first {
                Command::ReserveFirst(choice)
            } else {
                Command::Reserve(choice)
            };
            report(view, client.dispatch(&command));
        }
        // The host counts queue positions from zero.
        UserIntent::MoveFirst(position) => report(
            view,
            client.dispatch(&Command::QueueMoveFirst { position: position - 1 }),
        ),
        UserIntent::MoveUp(position) => report(
            view,
            client.dispatch(&Command::QueueMoveUp { position: position - 1 }),
        ),
        UserIntent::Remove(position) => report(
            view,
            client.dispatch(&Command::QueueRemove { position: position - 1 }),
        ),
        UserIntent::ShowState => {
            view.line(&format!("connection: {}", client.state()));
            view.render_player(&client.player_state());
        }
        UserIntent::Online => {
            spawn_trigger(client, LifecycleTrigger::Online);
        }
        UserIntent::Visible(visible) => {
            spawn_trigger(client, LifecycleTrigger::VisibilityChanged(visible));
        }
        UserIntent::Help => view.line(HELP),
    }
}

fn report(view: &TerminalView, delivery: Delivery) {
    match delivery {
        Delivery::Sent => {}
        Delivery::Queued(Enqueued::Dropped) => view.line("⚠️  offline queue full; command dropped"),
        Delivery::Queued(_) => view.line("… offline; command queued until reconnect"),
        Delivery::Failed => view.line("⚠️  send failed; try again"),
    }
}
