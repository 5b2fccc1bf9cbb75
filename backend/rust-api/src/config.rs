use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub mtn_api_url: String,
    pub airtel_api_url: String,
    pub payout_timeout_secs: u64,
    /// Reward-amount-to-points conversion divisor (points = amount / divisor).
    pub points_divisor: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up),
        // falling back to a local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/instantwin".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "instantwin".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let mtn_api_url = settings
            .get_string("payments.mtn_api_url")
            .or_else(|_| env::var("MTN_API_URL"))
            .unwrap_or_else(|_| "http://localhost:9091".to_string());

        let airtel_api_url = settings
            .get_string("payments.airtel_api_url")
            .or_else(|_| env::var("AIRTEL_API_URL"))
            .unwrap_or_else(|_| "http://localhost:9092".to_string());

        let payout_timeout_secs = settings
            .get_int("payments.timeout_secs")
            .ok()
            .or_else(|| {
                env::var("PAYOUT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(10) as u64;

        let points_divisor = settings
            .get_int("rewards.points_divisor")
            .ok()
            .or_else(|| {
                env::var("POINTS_DIVISOR")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(10);

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            mtn_api_url,
            airtel_api_url,
            payout_timeout_secs,
            points_divisor,
        })
    }
}
