use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use threadline_cli::{
    command::{Command, HELP},
    config::Config,
    render::{notice_line, thread_line, Transcript},
};
use threadline_persist::{AuthClient, PersistClientBuilder};
use threadline_session::{Notice, SessionAuth, SessionUpdate, ThreadSession};
use threadline_types::ThreadListParams;

const USAGE: &str = "usage: threadline [THREAD_ID | --new TITLE]";

/// How often the access token is checked against its refresh buffer
const TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Which thread to open, from the command line
enum Target {
    List,
    Open(String),
    Create(String),
}

fn parse_args() -> anyhow::Result<Target> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => Ok(Target::List),
        [flag, title @ ..] if flag == "--new" && !title.is_empty() => Ok(Target::Create(title.join(" "))),
        [id] if !id.starts_with('-') => Ok(Target::Open(id.clone())),
        _ => Err(anyhow::anyhow!(USAGE)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let target = parse_args()?;

    // Load configuration
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_logging(&config);

    tracing::info!("Starting Threadline client");
    tracing::info!("API: {}, realtime: {}", config.api.base_url, config.connection.ws_url);

    // Sign in
    let persistence = PersistClientBuilder::new()
        .base_url(&config.api.base_url)
        .timeout(config.api.timeout())
        .build()?;
    let tokens = persistence.auth().sign_in(&config.email, &config.password).await?;
    let user = persistence.auth().current_user().await?;
    tracing::info!(user_id = %user.id, "Signed in");
    let auth = Arc::clone(persistence.auth());

    let (mut session, mut notices) = ThreadSession::builder()
        .persistence(Arc::new(persistence))
        .connection_config(config.connection.clone())
        .session_config(config.session.clone())
        .auth(SessionAuth::new(&user.id, tokens.access_token))
        .build()?;

    let thread_id = match target {
        Target::List => {
            session.fetch_threads(ThreadListParams::new()).await?;
            print_threads(&session);
            println!("{}", USAGE);
            return Ok(());
        }
        Target::Create(title) => session.create_thread(&title).await?.id,
        Target::Open(id) => id,
    };

    session.open_thread(&thread_id).await?;
    if let Err(e) = session.fetch_thread(&thread_id).await {
        tracing::warn!(error = %e, "Could not load history");
    }

    let mut transcript = Transcript::new(&user.id);
    println!("== {} ==", session.current_thread().map(|t| t.title.as_str()).unwrap_or(&thread_id));
    print_lines(transcript.new_lines(session.messages()));
    println!("{}", session.input_placeholder());

    if let Err(e) = session.wait_connected(Duration::from_secs(15)).await {
        println!("{}", e);
    }

    let result = chat_loop(&mut session, &auth, &mut notices, &mut transcript).await;
    session.dispose().await;
    result
}

async fn chat_loop(
    session: &mut ThreadSession,
    auth: &AuthClient,
    notices: &mut UnboundedReceiver<Notice>,
    transcript: &mut Transcript,
) -> anyhow::Result<()> {
    enum Step {
        Line(Option<String>),
        Update(Option<SessionUpdate>),
        Notice(Option<Notice>),
        TokenCheck,
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut was_thinking = false;
    let mut token_check = tokio::time::interval(TOKEN_CHECK_INTERVAL);
    token_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Line(line?),
            update = session.next_update() => Step::Update(update),
            notice = notices.recv() => Step::Notice(notice),
            _ = token_check.tick() => Step::TokenCheck,
        };

        match step {
            Step::Line(None) => return Ok(()),
            Step::Line(Some(line)) => {
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                if !run_command(session, auth, command).await? {
                    return Ok(());
                }
            }
            Step::TokenCheck => refresh_session_token(session, auth).await?,
            Step::Update(None) => {
                println!("Thread closed");
                return Ok(());
            }
            Step::Update(Some(update)) => {
                if let SessionUpdate::Connection(state) = update {
                    println!("-- {} ({})", state.label(), session.input_placeholder());
                }
            }
            Step::Notice(Some(notice)) => println!("{}", notice_line(&notice)),
            Step::Notice(None) => {}
        }

        print_lines(transcript.new_lines(session.messages()));

        let thinking = session.is_agent_thinking();
        if thinking && !was_thinking {
            println!("agent is thinking...");
        }
        was_thinking = thinking;
    }
}

/// Hand a refreshed access token to the session, which reconnects the open
/// thread with it. Fails only when the user has to sign in again.
async fn refresh_session_token(session: &mut ThreadSession, auth: &AuthClient) -> anyhow::Result<()> {
    let token = match auth.ensure_fresh_token().await {
        Ok(token) => token,
        Err(e) if e.requires_sign_in() => {
            session.set_auth(None).await;
            return Err(anyhow::anyhow!("Session expired, sign in again"));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not refresh access token");
            return Ok(());
        }
    };

    session.replace_token(token).await?;
    Ok(())
}

/// Returns false when the user asked to leave
async fn run_command(session: &mut ThreadSession, auth: &AuthClient, command: Command) -> anyhow::Result<bool> {
    let result = match command {
        Command::Send(content) => session.send_message(&content).await.map(|_| ()),
        Command::Retry => {
            let failed = session.messages().iter().rev().find(|m| m.has_failed()).map(|m| m.id.clone());
            match failed {
                Some(id) => session.retry_message(&id).await,
                None => {
                    println!("Nothing to retry");
                    Ok(())
                }
            }
        }
        Command::Reconnect => {
            // Connect is idempotent, so a reconnect triggered by a new token is harmless here
            refresh_session_token(session, auth).await?;
            session.reconnect()
        }
        Command::Participants => {
            println!("You are {}", session.presence().effective_role().as_str());
            for participant in session.presence().participants() {
                println!("  {} ({})", participant.user_id, participant.role.as_str());
            }
            Ok(())
        }
        Command::Threads => match session.fetch_threads(ThreadListParams::new()).await {
            Ok(()) => {
                print_threads(session);
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Quit => return Ok(false),
        Command::Unknown(name) => {
            println!("Unknown command /{}, try /help", name);
            Ok(())
        }
    };

    // Failures already surfaced as notices
    if let Err(e) = result {
        tracing::debug!(error = %e, "Command failed");
    }
    Ok(true)
}

fn print_threads(session: &ThreadSession) {
    if session.threads().is_empty() {
        println!("No threads yet");
    }
    for thread in session.threads() {
        println!("{}", thread_line(thread));
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
