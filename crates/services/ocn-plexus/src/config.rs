use ocn_identity::Did;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Prometheus exporter listener; disabled when unset.
    pub metrics_addr: Option<SocketAddr>,
    /// Public host used in `did:web` identifiers and claim URLs.
    pub domain: String,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    /// OTP code validity window.
    pub otp_ttl_secs: i64,
    /// Attempts allowed per OTP challenge before it is discarded.
    pub otp_max_attempts: u32,
    /// Out-of-network claim exchange validity window.
    pub claim_ttl_secs: i64,
    /// Contact-method session token validity window.
    pub session_ttl_secs: i64,
    /// Login-provider DIDs trusted for proof-of-login presentations.
    pub trusted_login_providers: Vec<Did>,
    /// DIDs admitted to the phone-issuer trust registry.
    pub phone_registry: Vec<Did>,
    /// Publishable key of each integration allowed to dispatch OTP
    /// challenges, mapped to the integration's DID. Phone challenges
    /// additionally require that DID on the phone registry.
    pub integration_keys: HashMap<String, Did>,
    /// Hex seed for the service keypair; a fresh key is generated when unset.
    pub signing_seed: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8787)),
            metrics_addr: None,
            domain: "localhost".to_string(),
            jwt_secret: "change_this_to_a_secure_secret_key_in_production".to_string(),
            jwt_issuer: None,
            otp_ttl_secs: 300,
            otp_max_attempts: 6,
            claim_ttl_secs: 30 * 24 * 3600,
            session_ttl_secs: 600,
            trusted_login_providers: Vec::new(),
            phone_registry: Vec::new(),
            integration_keys: HashMap::new(),
            signing_seed: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_env("OCN_BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.metrics_addr = parse_env("OCN_METRICS_ADDR");
        if let Ok(domain) = std::env::var("OCN_DOMAIN") {
            config.domain = domain;
        }
        if let Ok(secret) = std::env::var("OCN_JWT_SECRET") {
            config.jwt_secret = secret;
        }
        config.jwt_issuer = std::env::var("OCN_JWT_ISSUER").ok();
        if let Some(ttl) = parse_env("OCN_OTP_TTL_SECS") {
            config.otp_ttl_secs = ttl;
        }
        if let Some(cap) = parse_env("OCN_OTP_MAX_ATTEMPTS") {
            config.otp_max_attempts = cap;
        }
        if let Some(ttl) = parse_env("OCN_CLAIM_TTL_SECS") {
            config.claim_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_env("OCN_SESSION_TTL_SECS") {
            config.session_ttl_secs = ttl;
        }
        config.trusted_login_providers = parse_did_list("OCN_TRUSTED_LOGIN_PROVIDERS");
        config.phone_registry = parse_did_list("OCN_PHONE_REGISTRY");
        if let Ok(keys) = std::env::var("OCN_INTEGRATION_KEYS") {
            // Comma-separated `<publishable key>=<integration DID>` pairs.
            config.integration_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|entry| {
                    let (key, did) = entry.split_once('=')?;
                    match Did::from_str(did.trim()) {
                        Ok(did) => Some((key.trim().to_string(), did)),
                        Err(e) => {
                            tracing::warn!("ignoring integration key {}: {}", key, e);
                            None
                        }
                    }
                })
                .collect();
        }
        config.signing_seed = std::env::var("OCN_SIGNING_SEED").ok();

        config
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

fn parse_did_list(name: &str) -> Vec<Did> {
    let Ok(raw) = std::env::var(name) else {
        return Vec::new();
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Did::from_str(s) {
            Ok(did) => Some(did),
            Err(e) => {
                tracing::warn!("ignoring invalid DID in {}: {} ({})", name, s, e);
                None
            }
        })
        .collect()
}
