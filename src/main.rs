use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use luckylotto::app::AppContext;
use luckylotto::auth::AuthError;
use luckylotto::backend::realtime::{ChangeEvent, ChangeFeed, ChannelSubscription, RealtimeError};
use luckylotto::config::BackendConfig;
use luckylotto::error::ErrorCode;
use luckylotto::flows::Flows;
use luckylotto::forms::{FieldErrors, FindIdForm, FindPasswordForm, LoginForm, PasswordChangeForm, PhoneInput, RegisterForm};
use luckylotto::notify::{Notifier, TracingNotifier};
use luckylotto::session::{History, Navigator, SessionState};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("{0}")]
    Form(String),
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<FieldErrors> for CliError {
    fn from(errors: FieldErrors) -> Self {
        let rendered: Vec<String> = errors.iter().map(|(field, message)| format!("{field}: {message}")).collect();
        Self::Form(rendered.join("; "))
    }
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.error_code(),
            Self::Realtime(e) => e.error_code(),
            Self::Form(_) => "E_FORM_INVALID",
            Self::NotSignedIn => "E_NOT_SIGNED_IN",
            Self::InvalidJson(_) => "E_JSON",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.retryable(),
            Self::Realtime(e) => e.retryable(),
            Self::Form(_) | Self::NotSignedIn | Self::InvalidJson(_) => false,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "luckylotto",
    about = "Lucky Lotto account and session CLI",
    after_help = "Set SUPABASE_SESSION_FILE to keep the session between invocations."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the signed-in user.
    Whoami,
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LUCKYLOTTO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        user_id: String,
        #[arg(long, env = "LUCKYLOTTO_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long, help = "010-1234-5678 or 01012345678")]
        phone: String,
        #[arg(long)]
        referral_code: Option<String>,
    },
    SignOut,
    /// Email a password-reset link.
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Change the password of the signed-in user.
    UpdatePassword {
        #[arg(long)]
        new_password: String,
    },
    FindId {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
    },
    /// Confirm an account by id and phone, optionally changing its password.
    FindPassword {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        phone: String,
        #[arg(long, requires_all = ["current_password", "new_password"])]
        email: Option<String>,
        #[arg(long)]
        current_password: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
    },
    /// Print session transitions and, optionally, a change feed until Ctrl-C.
    Watch {
        #[arg(long, value_enum)]
        feed: Option<FeedArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FeedArg {
    Tickets,
    Notifications,
    DrawResults,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match BackendConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(code = e.error_code(), error = %e, "startup: configuration invalid");
            return ExitCode::from(2);
        }
    };
    let app = match AppContext::init(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "startup: backend client init failed");
            return ExitCode::from(2);
        }
    };

    let result = run(&app, cli.command).await;
    app.shutdown();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.error_code(), retryable = e.retryable(), error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(app: &AppContext, command: Command) -> Result<(), CliError> {
    let flows = app.flows(
        Arc::new(TracingNotifier) as Arc<dyn Notifier>,
        Arc::new(History::new("/")) as Arc<dyn Navigator>,
    );
    match command {
        Command::Whoami => {
            let user = app.session.user().ok_or(CliError::NotSignedIn)?;
            print_json(&user)
        }
        Command::SignIn { email, password } => {
            flows.login(&LoginForm { email, password }).await?;
            let user = app.session.user().ok_or(CliError::NotSignedIn)?;
            print_json(&user)
        }
        Command::SignUp { email, user_id, password, name, phone, referral_code } => {
            let form = RegisterForm {
                email,
                user_id,
                confirm_password: password.clone(),
                password,
                name,
                phone: PhoneInput::parse(&phone),
                referral_code: referral_code.unwrap_or_default(),
            };
            let outcome = flows.register(&form).await?;
            if !outcome.profile_saved {
                eprintln!("account created, but the profile could not be saved");
            }
            println!("{}", outcome.user_id.unwrap_or_default());
            Ok(())
        }
        Command::SignOut => Ok(flows.logout().await?),
        Command::ResetPassword { email } => {
            app.auth.request_password_reset(&email).await?;
            println!("reset email sent to {email}");
            Ok(())
        }
        Command::UpdatePassword { new_password } => {
            let user = app.auth.update_password(&new_password).await?;
            print_json(&user)
        }
        Command::FindId { name, phone } => {
            let username = flows.find_id(&FindIdForm { name, phone: PhoneInput::parse(&phone) }).await?;
            println!("{username}");
            Ok(())
        }
        Command::FindPassword { user_id, phone, email, current_password, new_password } => {
            let found = flows
                .find_password(&FindPasswordForm { user_id, phone: PhoneInput::parse(&phone) })
                .await?;
            print_json(&found)?;
            if let (Some(email), Some(current_password), Some(new_password)) = (email, current_password, new_password) {
                change_password(&flows, email, current_password, new_password).await?;
            }
            Ok(())
        }
        Command::Watch { feed } => watch(app, feed).await,
    }
}

async fn change_password(
    flows: &Flows,
    email: String,
    current_password: String,
    new_password: String,
) -> Result<(), CliError> {
    let form = PasswordChangeForm { email, current_password, confirm_password: new_password.clone(), new_password };
    flows.change_password(&form).await?;
    Ok(())
}

async fn watch(app: &AppContext, feed: Option<FeedArg>) -> Result<(), CliError> {
    let mut states = app.session.subscribe();
    print_state(&states.borrow_and_update());

    let mut subscription = match feed {
        None => None,
        Some(arg) => {
            let feed = resolve_feed(arg, &app.session.state())?;
            info!(table = feed.table(), "watch: subscribing");
            Some(app.subscribe_feed(feed).await?)
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                print_state(&states.borrow_and_update());
            }
            event = next_change(subscription.as_mut()) => {
                let Some(event) = event else {
                    info!("watch: change feed closed");
                    subscription = None;
                    continue;
                };
                println!("{:?} {} {}", event.kind, event.table, event.record);
            }
        }
    }
}

async fn next_change(subscription: Option<&mut ChannelSubscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

fn resolve_feed(arg: FeedArg, state: &SessionState) -> Result<ChangeFeed, CliError> {
    let user_id = || state.user().map(|u| u.id.clone()).ok_or(CliError::NotSignedIn);
    Ok(match arg {
        FeedArg::Tickets => ChangeFeed::Tickets { user_id: user_id()? },
        FeedArg::Notifications => ChangeFeed::Notifications { user_id: user_id()? },
        FeedArg::DrawResults => ChangeFeed::DrawResults,
    })
}

fn print_state(state: &SessionState) {
    match state {
        SessionState::Uninitialized => println!("session: uninitialized"),
        SessionState::Loading => println!("session: loading"),
        SessionState::Ready(None) => println!("session: signed out"),
        SessionState::Ready(Some(user)) => println!("session: signed in as {}", user.email),
    }
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
