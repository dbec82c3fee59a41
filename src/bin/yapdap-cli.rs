use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use twitch_helix::{Authorizer, HelixClient, MemoryTokenStore, SystemBrowser, TokenStore, TokenVault, WebhookVerifier};
use yapdap::config::Settings;
use yapdap::store::SqliteTokenStore;
use yapdap::utils::logging::{init_tracing, redact};

/// yapdap CLI - operator commands for the Twitch credentials
#[derive(Parser)]
#[command(name = "yapdap-cli")]
#[command(version)]
#[command(about = "Manage the Twitch credentials used by yapdap", long_about = None)]
struct Cli {
    /// Keep tokens in memory only, leaving the database untouched
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the user authorization and stores the refresh token
    Auth {
        /// Opens the browser even when a refresh token is already stored
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Resolves the app token (cached or newly issued)
    AppToken,

    /// Refreshes the user access token, then revokes it
    Revoke,

    /// Prints the signature header for a webhook delivery
    Sign {
        #[arg(long, env = "TWITCH_WEBHOOK_SECRET")]
        secret: String,

        #[arg(long)]
        message_id: String,

        /// RFC 3339 timestamp, defaults to now
        #[arg(long)]
        timestamp: Option<String>,

        /// Raw JSON body
        #[arg(long)]
        body: String,
    },
}

async fn open_store(settings: &Settings, ephemeral: bool) -> Result<Arc<dyn TokenStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryTokenStore::new()));
    }
    let store = SqliteTokenStore::connect(&settings.database.url)
        .await
        .with_context(|| format!("opening token store {}", settings.database.url))?;
    Ok(Arc::new(store))
}

async fn authorizer(ephemeral: bool) -> Result<Authorizer> {
    let settings = Settings::new().context("loading settings")?;
    settings.validate_twitch()?;
    let vault = Arc::new(TokenVault::new(open_store(&settings, ephemeral).await?));
    Ok(Authorizer::new(settings.auth_config(), vault, Arc::new(SystemBrowser))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Auth { force } => {
            let auth = authorizer(cli.ephemeral).await?;
            let tokens = if force {
                auth.authorize_user_interactive().await?
            } else {
                auth.user_tokens().await?
            };
            println!("✅ Refresh token stored ({})", redact(&tokens.refresh_token));
            if tokens.scopes.is_empty() {
                println!("   (already authorized, use --force to repeat the browser flow)");
            } else {
                println!("   Scopes: {}", tokens.scopes.join(", "));
            }
        }
        Commands::AppToken => {
            let token = authorizer(cli.ephemeral).await?.app_token().await?;
            println!("🔑 App token: {}", redact(&token));
        }
        Commands::Revoke => {
            let auth = authorizer(cli.ephemeral).await?;
            let tokens = auth.user_tokens().await?;
            let user = HelixClient::user_in_vault(auth.oauth_client().clone(), tokens, auth.vault()).await?;
            user.revoke().await?;
            println!("🚪 User access token revoked");
        }
        Commands::Sign {
            secret,
            message_id,
            timestamp,
            body,
        } => {
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
            let signature = WebhookVerifier::new(&secret)?.sign(&message_id, &timestamp, body.as_bytes());
            println!("Twitch-Eventsub-Message-Id: {}", message_id);
            println!("Twitch-Eventsub-Message-Timestamp: {}", timestamp);
            println!("Twitch-Eventsub-Message-Signature: {}", signature);
        }
    }

    Ok(())
}
