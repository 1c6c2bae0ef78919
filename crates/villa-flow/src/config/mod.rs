use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
///
/// Constructed once at startup and injected into the modules that need it;
/// nothing in the pipeline reads ambient environment state after load.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub signing: SigningConfig,
    pub routing: RoutingConfig,
    pub checkout: CheckoutConfig,
    pub site: SiteConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        // Signed owner-action links are a startup precondition: refusing to
        // boot beats minting links that can never verify.
        let secret = env::var("OWNER_ACTION_SECRET").unwrap_or_default();
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingSigningSecret);
        }
        let link_ttl_hours = env::var("ACTION_LINK_TTL_HOURS")
            .ok()
            .map(|raw| raw.parse::<u64>())
            .transpose()
            .map_err(|_| ConfigError::InvalidLinkTtl)?
            .unwrap_or(72);

        let operator_inbox =
            env::var("OPERATOR_INBOX").unwrap_or_else(|_| "inquiries@goelite.studio".to_string());
        let routing = RoutingConfig {
            from_email: env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "bookings@lovethisplace.co".to_string()),
            from_name: env::var("FROM_NAME").unwrap_or_else(|_| "Love This Place".to_string()),
            owner_fallback_email: env::var("OWNER_FALLBACK_EMAIL")
                .unwrap_or_else(|_| operator_inbox.clone()),
            public_contact_email: env::var("PUBLIC_CONTACT_EMAIL")
                .unwrap_or_else(|_| "concierge@lovethisplace.co".to_string()),
            operator_inbox,
        };

        let checkout = CheckoutConfig {
            webhook_token: env::var("CHECKOUT_WEBHOOK_TOKEN")
                .unwrap_or_else(|_| "whsec_dev".to_string()),
        };

        let base_url = env::var("SITE_URL")
            .unwrap_or_else(|_| "https://lovethisplace-sites.vercel.app".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            signing: SigningConfig {
                secret,
                link_ttl_hours,
            },
            routing,
            checkout,
            site: SiteConfig { base_url },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Secret and validity window for signed owner-action links.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub secret: String,
    pub link_ttl_hours: u64,
}

/// Fixed addresses governing how inquiry mail is routed.
///
/// `operator_inbox` is internal: it receives every lead and a blind copy of
/// every guest message, and must never appear in a guest-facing header.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub operator_inbox: String,
    pub from_email: String,
    pub from_name: String,
    pub owner_fallback_email: String,
    pub public_contact_email: String,
}

/// Webhook verification settings for the payment provider.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub webhook_token: String,
}

/// Public site settings used when building redirect and checkout URLs.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
}

impl SiteConfig {
    /// Landing page after a completed payment, per listing and language.
    pub fn thank_you_url(&self, slug: &str, lang: &str) -> String {
        format!("{}/villas/{}/{}/thank-you", self.base_url, slug, lang)
    }

    pub fn contact_url(&self, slug: &str, lang: &str) -> String {
        format!("{}/villas/{}/{}/contact", self.base_url, slug, lang)
    }

    pub fn owner_action_url(&self) -> String {
        format!("{}/api/owner-action", self.base_url)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLinkTtl,
    MissingSigningSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLinkTtl => {
                write!(f, "ACTION_LINK_TTL_HOURS must be a positive integer")
            }
            ConfigError::MissingSigningSecret => {
                write!(f, "OWNER_ACTION_SECRET must be set before startup")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "OWNER_ACTION_SECRET",
            "ACTION_LINK_TTL_HOURS",
            "OPERATOR_INBOX",
            "FROM_EMAIL",
            "FROM_NAME",
            "OWNER_FALLBACK_EMAIL",
            "PUBLIC_CONTACT_EMAIL",
            "CHECKOUT_WEBHOOK_TOKEN",
            "SITE_URL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_fails_fast_without_signing_secret() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let err = AppConfig::load().expect_err("secret is a startup precondition");
        assert!(matches!(err, ConfigError::MissingSigningSecret));
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("OWNER_ACTION_SECRET", "test-secret");
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.signing.link_ttl_hours, 72);
        assert_eq!(config.routing.owner_fallback_email, config.routing.operator_inbox);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("OWNER_ACTION_SECRET", "test-secret");
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }
}
