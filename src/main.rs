use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use estate_client::auth::LOGIN_PATH;
use estate_client::payments::CheckoutReturn;
use estate_client::{Access, AppState, LoginOutcome, RelationshipResolver, Role, SessionEvent, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// estate-client - command line access to the estate-planning backend
#[derive(Parser, Debug)]
#[command(name = "estate-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in with email and password
    Login {
        email: String,
        #[arg(long, env = "ESTATE_PASSWORD")]
        password: String,
    },

    /// Complete a login with the one-time password sent by email
    VerifyOtp { email: String, code: String },

    /// Show the signed-in user
    Whoami,

    /// Check access to a protected path
    Check {
        path: String,
        #[arg(long)]
        admin: bool,
    },

    /// Forget the stored session
    Logout,

    /// List relationship names
    Relationships,

    /// Start a Stripe checkout for a plan
    Checkout { plan: String },

    /// Interpret a checkout return URL and verify the payment
    CheckoutReturn { url: String },

    /// Stay signed in and log out after inactivity
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("loading configuration")?;
    info!("Using backend {}", config.api.base_url);

    let state = AppState::new(config).await?;
    state.auth.restore().await?;

    match cli.command {
        Commands::Login { email, password } => match state.auth.login(&email, &password).await? {
            LoginOutcome::Authenticated(user) => {
                println!("Logged in as {} <{}>", user.name, user.email);
                println!("Continue at {}", state.auth.take_return_url().await?);
            }
            LoginOutcome::OtpRequired => {
                println!("A one-time password was sent to {}. Run `verify-otp {} <code>`.", email, email);
            }
        },
        Commands::VerifyOtp { email, code } => {
            let user = state.auth.verify_otp(&email, &code).await?;
            println!("Logged in as {} <{}>", user.name, user.email);
        }
        Commands::Whoami => match state.auth.current_user().await {
            Some(user) => println!("{} <{}> ({:?})", user.name, user.email, user.role),
            None => println!("Not logged in"),
        },
        Commands::Check { path, admin } => {
            let required = admin.then_some(Role::Admin);
            match state.route_guard().check(&path, required).await {
                Access::Granted(user) => println!("{} may open {}", user.email, path),
                Access::Redirect(to) => println!("Redirect to {}", to),
            }
        }
        Commands::Logout => {
            state.auth.logout().await?;
            println!("Logged out");
        }
        Commands::Relationships => {
            let resolver = RelationshipResolver::fetch(&state.client).await?;
            if !resolver.is_ready() {
                bail!("no relationships returned by the backend");
            }
            for (id, name) in resolver.entries() {
                println!("{:>4}  {}", id, name);
            }
        }
        Commands::Checkout { plan } => {
            let session = state.payments().create_checkout(&plan).await?;
            println!("Complete payment at {}", session.url);
        }
        Commands::CheckoutReturn { url } => match CheckoutReturn::parse(&url)? {
            CheckoutReturn::Success { session_id } => {
                let verification = state.payments().verify(&session_id).await?;
                println!("Payment {:?}", verification.status);
            }
            CheckoutReturn::Cancelled => println!("Payment cancelled"),
            CheckoutReturn::Unknown => bail!("not a checkout return URL: {}", url),
        },
        Commands::Watch => {
            if state.auth.current_user().await.is_none() {
                bail!("not logged in");
            }
            let handle = state.start_session()?;
            let mut events = handle.subscribe();
            println!("Watching session; press Enter to register activity");

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line? {
                        Some(_) => handle.touch(),
                        None => break,
                    },
                    event = events.recv() => match event {
                        Ok(SessionEvent::Warning { remaining }) => {
                            println!("Still there? Logging out in {}s", remaining.as_secs());
                        }
                        Ok(SessionEvent::Resumed) => println!("Welcome back"),
                        Ok(SessionEvent::Expired) => {
                            println!("Session expired. Redirecting to {}", LOGIN_PATH);
                            break;
                        }
                        Err(_) => break,
                    },
                }
            }
        }
    }

    Ok(())
}
