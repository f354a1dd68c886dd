//! vkuser - manage locally authenticated VK users from the terminal.
//!
//! Stores access tokens, switches the current user and issues API calls on
//! their behalf, optionally answering reads from the offline cache.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vkuser_core::api::HttpTransport;
use vkuser_core::auth::{CredentialPersistence, FileCredentialStore, KeyringCredentialStore};
use vkuser_core::config::CredentialBackend;
use vkuser_core::{
    ApiClient, CacheManager, Config, CredentialRecord, Endpoint, Params, SessionStore,
};

// ============================================================================
// Constants
// ============================================================================

/// Passphrase for sealing tokens in the credentials file
const PASSPHRASE_ENV: &str = "VKUSER_VAULT_PASSPHRASE";

/// Log file name inside the cache directory; file logging is off when unset
const LOG_FILE_ENV: &str = "VKUSER_LOG_FILE";

const USAGE: &str = "\
Usage: vkuser <command>

Commands:
  users                               List stored users (* marks the current one)
  current                             Show the current user, promoting one if needed
  activate <user_id>                  Make a stored user current
  login <user_id> [expires_in_secs]   Store an access token (prompted)
  logout <user_id>                    Forget a user and their cached responses
  reset                               Forget every user
  call <method> [key=value ...] [--offline]
                                      Call an API method as the current user";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Users,
    Current,
    Activate(u64),
    Login {
        user_id: u64,
        expires_in: Option<i64>,
    },
    Logout(u64),
    Reset,
    Call {
        method: String,
        params: Params,
        offline: bool,
    },
    Help,
}

fn parse_user_id(arg: Option<&String>) -> Result<u64> {
    let arg = arg.context("Missing <user_id>")?;
    arg.parse().with_context(|| format!("Invalid user id: {}", arg))
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };

    let command = match command.as_str() {
        "users" => Command::Users,
        "current" => Command::Current,
        "activate" => Command::Activate(parse_user_id(args.get(1))?),
        "login" => {
            let user_id = parse_user_id(args.get(1))?;
            let expires_in = args
                .get(2)
                .map(|s| s.parse::<i64>())
                .transpose()
                .context("Invalid expires_in_secs")?;
            Command::Login {
                user_id,
                expires_in,
            }
        }
        "logout" => Command::Logout(parse_user_id(args.get(1))?),
        "reset" => Command::Reset,
        "call" => {
            let method = args.get(1).context("Missing <method>")?.clone();
            let mut params = Params::new();
            let mut offline = false;
            for arg in &args[2..] {
                if arg == "--offline" {
                    offline = true;
                    continue;
                }
                let (key, value) = arg
                    .split_once('=')
                    .with_context(|| format!("Expected key=value, got {}", arg))?;
                params.insert(key, value);
            }
            Command::Call {
                method,
                params,
                offline,
            }
        }
        "help" | "--help" | "-h" => Command::Help,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    };
    Ok(command)
}

/// Initialize the tracing subscriber for logging
fn init_tracing(cache_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match (cache_dir, std::env::var(LOG_FILE_ENV).ok()) {
        (Some(dir), Some(file_name)) => {
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn open_persistence(config: &Config) -> Result<Arc<dyn CredentialPersistence>> {
    let path = config.credentials_path()?;
    let persistence: Arc<dyn CredentialPersistence> = match config.credential_backend {
        CredentialBackend::File => match std::env::var(PASSPHRASE_ENV) {
            Ok(passphrase) if !passphrase.is_empty() => {
                Arc::new(FileCredentialStore::encrypted(path, &passphrase)?)
            }
            _ => Arc::new(FileCredentialStore::new(path)),
        },
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new(path)),
    };
    Ok(persistence)
}

fn open_store(config: &Config) -> Result<(SessionStore, Arc<CacheManager>)> {
    let cache = Arc::new(CacheManager::new(config.responses_dir()?)?);
    let transport = HttpTransport::new(config.api_version.clone())?;
    let client = ApiClient::new(Arc::new(transport))
        .with_cache(cache.clone(), config.cache_lifetime_minutes);

    let store = SessionStore::open_with_client(
        open_persistence(config)?,
        config.session_options(),
        client,
    );
    Ok((store, cache))
}

/// Re-designate the user that was current when the last command exited.
fn restore_current_user(config: &Config, store: &SessionStore) {
    if let Some(user_id) = config.current_user_id {
        if !store.activate(user_id) {
            warn!(user_id, "Remembered current user is no longer stored");
        }
    }
}

/// Record the store's designation in `config`. Returns whether it changed.
fn remember_current_user(config: &mut Config, store: &SessionStore) -> bool {
    let active = store.active_user_id();
    if config.current_user_id == active {
        return false;
    }
    config.current_user_id = active;
    true
}

async fn run(command: Command, store: &SessionStore, cache: &CacheManager) -> Result<()> {
    match command {
        Command::Help => println!("{}", USAGE),

        Command::Users => {
            let mut users = store.local_users();
            users.sort_unstable();
            if users.is_empty() {
                println!("No stored users");
            }
            let active = store.active_user_id();
            for user_id in users {
                let marker = if Some(user_id) == active { "*" } else { " " };
                let expired = store
                    .record(user_id)
                    .map(|r| r.is_expired())
                    .unwrap_or(false);
                println!(
                    "{} {}{}",
                    marker,
                    user_id,
                    if expired { " (token expired)" } else { "" }
                );
            }
        }

        Command::Current => match store.current() {
            Some(session) => println!("{}", session),
            None => println!("No stored users"),
        },

        Command::Activate(user_id) => {
            if !store.activate(user_id) {
                bail!("No stored credentials for user {}", user_id);
            }
            println!("User {} is now current", user_id);
        }

        Command::Login {
            user_id,
            expires_in,
        } => {
            let token = rpassword::prompt_password(format!("Access token for {}: ", user_id))?;
            let token = token.trim();
            if token.is_empty() {
                bail!("Empty access token");
            }
            let record = match expires_in {
                Some(secs) => CredentialRecord::with_expiry(user_id, token, secs),
                None => CredentialRecord::new(user_id, token),
            };
            store.add_or_replace(record);
            println!("Stored credentials for user {}", user_id);
        }

        Command::Logout(user_id) => {
            if !store.remove(user_id) {
                bail!("No stored credentials for user {}", user_id);
            }
            cache.clear_user(user_id)?;
            println!("Removed user {}", user_id);
        }

        Command::Reset => {
            for user_id in store.local_users() {
                cache.clear_user(user_id)?;
            }
            store.reset();
            println!("Removed all users");
        }

        Command::Call {
            method,
            params,
            offline,
        } => {
            let session = store
                .current()
                .context("No stored users - run `vkuser login <user_id>` first")?;
            if offline {
                session.set_offline_mode(true);
            }

            let mut request = session.request(Endpoint::named(&method), params)?;
            if !request.is_started() {
                request.start()?;
            }
            let response = request.response().await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let mut config = Config::load()?;
    let _guard = init_tracing(config.cache_dir().ok().as_deref());
    info!(?command, "vkuser starting");

    let (store, cache) = open_store(&config)?;
    restore_current_user(&config, &store);

    run(command, &store, &cache).await?;

    if remember_current_user(&mut config, &store) {
        config.save()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkuser_core::auth::MemoryCredentialStore;
    use vkuser_core::SessionOptions;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_args(&args(&[])).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["users"])).unwrap(), Command::Users);
        assert_eq!(parse_args(&args(&["current"])).unwrap(), Command::Current);
        assert_eq!(parse_args(&args(&["reset"])).unwrap(), Command::Reset);
        assert_eq!(
            parse_args(&args(&["activate", "42"])).unwrap(),
            Command::Activate(42)
        );
        assert_eq!(
            parse_args(&args(&["logout", "7"])).unwrap(),
            Command::Logout(7)
        );
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parse_args(&args(&["login", "1"])).unwrap(),
            Command::Login {
                user_id: 1,
                expires_in: None
            }
        );
        assert_eq!(
            parse_args(&args(&["login", "1", "86400"])).unwrap(),
            Command::Login {
                user_id: 1,
                expires_in: Some(86400)
            }
        );
        assert!(parse_args(&args(&["login", "1", "soon"])).is_err());
    }

    #[test]
    fn test_parse_call() {
        let command = parse_args(&args(&[
            "call",
            "wall.get",
            "owner_id=-1",
            "count=5",
            "--offline",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Call {
                method: "wall.get".to_string(),
                params: Params::new().with("owner_id", "-1").with("count", "5"),
                offline: true,
            }
        );
        assert!(parse_args(&args(&["call", "wall.get", "owner_id"])).is_err());
        assert!(parse_args(&args(&["call"])).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["activate"])).is_err());
        assert!(parse_args(&args(&["activate", "abc"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
    }

    fn reopen(persistence: &Arc<MemoryCredentialStore>) -> SessionStore {
        SessionStore::open(persistence.clone(), SessionOptions::default())
    }

    #[test]
    fn test_activation_survives_restart() {
        let persistence = Arc::new(MemoryCredentialStore::new());
        let mut config = Config::default();

        let store = reopen(&persistence);
        for id in [1, 2, 3] {
            store.add_or_replace(CredentialRecord::new(id, format!("token-{}", id)));
        }
        assert!(store.activate(2));
        assert!(remember_current_user(&mut config, &store));
        assert_eq!(config.current_user_id, Some(2));

        let restarted = reopen(&persistence);
        restore_current_user(&config, &restarted);
        assert_eq!(restarted.active_user_id(), Some(2));
        assert!(!remember_current_user(&mut config, &restarted));
    }

    #[test]
    fn test_logout_forgets_current_user() {
        let persistence = Arc::new(MemoryCredentialStore::new());
        let mut config = Config {
            current_user_id: Some(5),
            ..Config::default()
        };

        let store = reopen(&persistence);
        store.add_or_replace(CredentialRecord::new(5, "token-5"));
        restore_current_user(&config, &store);
        store.remove(5);

        assert!(remember_current_user(&mut config, &store));
        assert_eq!(config.current_user_id, None);
    }

    #[test]
    fn test_stale_current_user_is_cleared() {
        let persistence = Arc::new(MemoryCredentialStore::new());
        let mut config = Config {
            current_user_id: Some(9),
            ..Config::default()
        };

        let store = reopen(&persistence);
        restore_current_user(&config, &store);
        assert_eq!(store.active_user_id(), None);
        assert!(remember_current_user(&mut config, &store));
        assert_eq!(config.current_user_id, None);
    }
}
