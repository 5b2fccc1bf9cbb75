#![allow(dead_code)]

use axum::Router;
use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use std::sync::Arc;

use instantwin_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    services::AppState,
};

pub struct TestApp {
    pub router: Router,
    pub config: Config,
    pub mongo: mongodb::Database,
}

pub async fn create_test_app() -> TestApp {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    // Load test environment from .env.test
    dotenvy::from_filename(".env.test").ok();

    let config = Config::load().expect("Failed to load test configuration");

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create test Redis client");

    let app_state = Arc::new(
        AppState::new(config.clone(), mongo_client.clone(), redis_client)
            .await
            .expect("Failed to initialize test app state"),
    );

    let mongo = mongo_client.database(&config.mongo_database);
    let router = create_router(app_state);

    TestApp {
        router,
        config,
        mongo,
    }
}

pub fn bearer_token(config: &Config, user_id: &str) -> String {
    let now = Utc::now().timestamp() as usize;
    let token = JwtService::new(&config.jwt_secret)
        .generate_token(JwtClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + 3600,
        })
        .expect("Failed to mint test token");
    format!("Bearer {}", token)
}

pub struct QuestionFixture {
    pub id: String,
    pub correct_answer: String,
    pub reward_amount: i64,
    pub max_winners: u32,
    pub winners_count: u32,
    pub is_instant_reward: bool,
    pub is_active: bool,
    pub expiry_time: Option<DateTime<Utc>>,
    pub payment_provider: Option<&'static str>,
}

impl Default for QuestionFixture {
    fn default() -> Self {
        Self {
            id: format!("test-q-{}", uuid::Uuid::new_v4()),
            correct_answer: "Kampala".to_string(),
            reward_amount: 5000,
            max_winners: 2,
            winners_count: 0,
            is_instant_reward: true,
            is_active: true,
            expiry_time: None,
            payment_provider: Some("MTN"),
        }
    }
}

pub async fn seed_question(mongo: &mongodb::Database, fixture: &QuestionFixture) {
    let collection = mongo.collection::<mongodb::bson::Document>("reward_questions");

    let document = doc! {
        "_id": &fixture.id,
        "text": "What is the capital of Uganda?",
        "options": ["Kampala", "Nairobi", "Kigali", "Dodoma"],
        "correct_answer": &fixture.correct_answer,
        "reward_amount": fixture.reward_amount,
        "is_instant_reward": fixture.is_instant_reward,
        "max_winners": fixture.max_winners as i64,
        "winners_count": fixture.winners_count as i64,
        "is_completed": fixture.winners_count >= fixture.max_winners,
        "is_active": fixture.is_active,
        "expiry_time": fixture.expiry_time.map(|t| t.to_rfc3339()),
        "payment_provider": fixture.payment_provider,
        "phone_number": "256700000000",
        "created_at": Utc::now().to_rfc3339(),
    };

    collection
        .insert_one(document)
        .await
        .expect("Failed to seed test question");
}
