use std::env;

use chrono::Duration;
use log::*;
use pay_common::{helpers::parse_boolean_flag, Secret};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8360;
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(24);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub collaborators: CollaboratorConfig,
    /// Buffer size of the mpsc channels carrying payment events to their hooks.
    pub event_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            gateway: GatewayConfig::default(),
            collaborators: CollaboratorConfig::default(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env::var("MPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPG_PORT. {e} Using the default, {DEFAULT_MPG_PORT}, instead."
                    );
                    DEFAULT_MPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_DATABASE_URL is not set. Please set it to the URL for the payments database.");
            String::default()
        });
        let auth = AuthConfig::from_env_or_default();
        let gateway = GatewayConfig::from_env_or_default();
        let collaborators = CollaboratorConfig::from_env_or_default();
        let event_buffer_size = env::var("MPG_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        Self { host, port, database_url, auth, gateway, collaborators, event_buffer_size }
    }
}

//-------------------------------------------------  AuthConfig  ------------------------------------------------------

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HS256 secret used to sign and verify access tokens.
    pub jwt_secret: Secret<String>,
    /// How long an issued access token stays valid.
    pub token_lifetime: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT signing secret has not been set. I'm using a random value for this session. DO NOT \
             operate on production like this, since every access token dies with this process. Set MPG_JWT_SECRET \
             instead. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
        Self { jwt_secret: Secret::new(secret), token_lifetime: DEFAULT_TOKEN_LIFETIME }
    }
}

impl AuthConfig {
    pub fn from_env_or_default() -> Self {
        let token_lifetime = env::var("MPG_JWT_TOKEN_LIFETIME_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Duration::hours)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        match env::var("MPG_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => Self { jwt_secret: Secret::new(secret), token_lifetime },
            _ => Self { token_lifetime, ..Self::default() },
        }
    }
}

//-------------------------------------------------  GatewayConfig  ---------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Base url of the payment provider's API, e.g. "https://api.gateway.example.com".
    pub base_url: String,
    /// The merchant secret key, sent as basic auth on approve/cancel calls.
    pub secret_key: Secret<String>,
    /// The key the provider uses to sign webhook bodies.
    pub webhook_secret: Secret<String>,
    /// If false, webhook signature checks are skipped. Test environments only.
    pub hmac_checks: bool,
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("MPG_GATEWAY_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_GATEWAY_URL is not set. Please set it to the payment provider's API url.");
            String::default()
        });
        let secret_key = env::var("MPG_GATEWAY_SECRET_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_GATEWAY_SECRET_KEY is not set. Approve and cancel calls will be rejected upstream.");
            String::default()
        });
        let webhook_secret = env::var("MPG_GATEWAY_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_GATEWAY_WEBHOOK_SECRET is not set. Incoming webhooks cannot be verified.");
            String::default()
        });
        let hmac_checks = parse_boolean_flag(env::var("MPG_GATEWAY_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Anyone can move payments around. Test environments only!");
        }
        Self { base_url, secret_key: Secret::new(secret_key), webhook_secret: Secret::new(webhook_secret), hmac_checks }
    }
}

//-------------------------------------------------  CollaboratorConfig  ----------------------------------------------

/// Base urls for the services owned by other teams.
#[derive(Clone, Debug, Default)]
pub struct CollaboratorConfig {
    pub order_service_url: String,
    pub user_service_url: String,
    pub store_service_url: String,
}

impl CollaboratorConfig {
    pub fn from_env_or_default() -> Self {
        let order_service_url = required_url("MPG_ORDER_SERVICE_URL");
        let user_service_url = required_url("MPG_USER_SERVICE_URL");
        let store_service_url = required_url("MPG_STORE_SERVICE_URL");
        Self { order_service_url, user_service_url, store_service_url }
    }
}

fn required_url(var: &str) -> String {
    env::var(var).ok().unwrap_or_else(|| {
        error!("🪛️ {var} is not set. Calls against this service will fail.");
        String::default()
    })
}
