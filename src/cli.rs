//! CLI argument parsing, validation, and startup helpers.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::STANDARD};
use clap::Parser;
use tracing::{error, info};

use crate::ServerConfig;
use crate::auth::{Authority, DEFAULT_EXEMPT_PREFIXES};
use crate::db::Database;
use crate::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_REFRESH_TOKEN_TTL_SECS, TokenTtl};
use crate::password::hash_password;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Upper bound for token lifetimes: 10 years
const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "bearer-gate",
    about = "Stateless bearer token authentication with refresh rotation"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "BEARER_GATE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path to SQLite database file (":memory:" for a throwaway database)
    #[arg(short, long, env = "BEARER_GATE_DATABASE", default_value = "bearer-gate.db")]
    pub database: String,

    /// Path to file containing the base64 JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, value_parser = validate_ttl, default_value_t = DEFAULT_ACCESS_TOKEN_TTL_SECS)]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, value_parser = validate_ttl, default_value_t = DEFAULT_REFRESH_TOKEN_TTL_SECS)]
    pub refresh_token_ttl: u64,

    /// Path prefix that bypasses authentication (repeatable)
    #[arg(long = "exempt-prefix", value_name = "PREFIX",
        default_values = DEFAULT_EXEMPT_PREFIXES.iter().copied())]
    pub exempt_prefixes: Vec<String>,

    /// Periodically delete refresh records whose token has expired
    #[arg(long)]
    pub prune_expired_refresh: bool,

    /// Create (or promote) an admin member on startup. Password is read from ADMIN_PASSWORD
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_ttl(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("TTL must be a number of seconds: {}", s))?;
    if secs == 0 {
        return Err("TTL must be greater than zero".to_string());
    }
    if secs > MAX_TOKEN_TTL_SECS {
        return Err(format!("TTL must be at most {} seconds", MAX_TOKEN_TTL_SECS));
    }
    Ok(secs)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Decode a base64 secret and check its length.
pub fn decode_jwt_secret(encoded: &str) -> Result<Vec<u8>, String> {
    let secret = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("JWT secret is not valid base64: {}", e))?;

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(format!(
            "JWT secret decodes to fewer than {} bytes. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        ));
    }

    Ok(secret)
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<Vec<u8>> {
    let encoded = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    match decode_jwt_secret(&encoded) {
        Ok(secret) => Some(secret),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

/// Handle the --create-admin flag: create the admin member, or grant
/// `ROLE_ADMIN` to an existing member with that email.
pub async fn handle_create_admin(db: &Database, email: &str) -> bool {
    let members = db.members();

    match members.get_by_email(email).await {
        Ok(Some(existing)) => match members.add_authority(existing.id, Authority::Admin).await {
            Ok(true) => info!(email = %email, "Existing member promoted to admin"),
            Ok(false) => info!(email = %email, "Admin member already exists"),
            Err(e) => {
                error!(error = %e, "Failed to grant admin authority");
                return false;
            }
        },
        Ok(None) => {
            let Some(password) = std::env::var("ADMIN_PASSWORD")
                .ok()
                .filter(|p| !p.trim().is_empty())
            else {
                error!("ADMIN_PASSWORD must be set to create an admin member");
                return false;
            };
            // SAFETY: Still single-threaded startup, see load_jwt_secret.
            unsafe { std::env::remove_var("ADMIN_PASSWORD") };

            let hash = match hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    return false;
                }
            };

            let username = email.split('@').next().unwrap_or(email);
            let authorities = BTreeSet::from([Authority::User, Authority::Admin]);
            match members.create(email, username, &hash, &authorities).await {
                Ok(_) => info!(email = %email, "Admin member created"),
                Err(e) => {
                    error!(error = %e, "Failed to create admin member");
                    return false;
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            return false;
        }
    }

    true
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: Vec<u8>) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret,
        token_ttl: TokenTtl {
            access: args.access_token_ttl,
            refresh: args.refresh_token_ttl,
        },
        exempt_prefixes: args.exempt_prefixes.clone(),
        prune_expired_refresh: args.prune_expired_refresh,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
