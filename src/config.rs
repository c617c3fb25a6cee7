use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub debug_errors: bool,
    pub bootstrap_token: Option<String>,
    pub bootstrap_admin_name: String,
    pub bootstrap_admin_email: String,
    pub bootstrap_admin_password: String,
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

impl Config {
    pub fn from_env() -> Self {
        let backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => Backend::Memory,
            _ => Backend::Postgres,
        };
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set, using an insecure default");
            "changeme".to_string()
        });
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            backend,
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret,
            debug_errors: env_flag("DEBUG_ERRORS"),
            bootstrap_token: env::var("BOOTSTRAP_TOKEN").ok().filter(|t| !t.is_empty()),
            bootstrap_admin_name: env::var("BOOTSTRAP_ADMIN_NAME")
                .unwrap_or_else(|_| "Admin".to_string()),
            bootstrap_admin_email: env::var("BOOTSTRAP_ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@example.com".to_string()),
            bootstrap_admin_password: env::var("BOOTSTRAP_ADMIN_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
        }
    }
}
