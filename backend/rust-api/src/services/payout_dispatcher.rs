use anyhow::{Context, Result};
use chrono::Utc;
use mongodb::bson::doc;
use mongodb::Database;

use super::winner_allocator::WINNERS_COLLECTION;
use crate::config::Config;
use crate::metrics::record_payout;
use crate::models::question::PayoutProvider;
use crate::models::winner::{PaymentStatus, Winner};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

struct ProviderReceipt {
    success: bool,
    reference: Option<String>,
}

/// Client-side timeout on the provider call. Only definitive declines and
/// transport failures may move a winner to FAILED.
fn is_timeout_error(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(reqwest::Error::is_timeout)
}

/// Invokes the external mobile-money provider for an allocated winner and
/// reconciles the result back onto the winner row.
///
/// Runs strictly after the allocation commit; the claim path never waits on
/// provider latency. The provider call carries a stable reference derived
/// from the winner id so provider-side retries cannot double-pay, and the
/// terminal status write is conditioned on `payment_status: pending` so
/// re-invoking the reconciliation is a no-op.
pub struct PayoutDispatcher {
    mongo: Database,
    http: reqwest::Client,
    mtn_api_url: String,
    airtel_api_url: String,
}

impl PayoutDispatcher {
    pub fn new(mongo: Database, http: reqwest::Client, config: &Config) -> Self {
        Self {
            mongo,
            http,
            mtn_api_url: config.mtn_api_url.clone(),
            airtel_api_url: config.airtel_api_url.clone(),
        }
    }

    fn winners(&self) -> mongodb::Collection<Winner> {
        self.mongo.collection(WINNERS_COLLECTION)
    }

    pub async fn dispatch(&self, winner: &Winner) -> Result<PaymentStatus> {
        let reference = Self::idempotency_reference(winner);
        let provider = winner.payment_provider;

        tracing::info!(
            "Dispatching payout: winner={}, provider={}, amount={}, reference={}",
            winner.id,
            provider,
            winner.amount_awarded,
            reference
        );

        let status = match self.call_provider(winner, &reference).await {
            Ok(receipt) if receipt.success => {
                let provider_reference = receipt.reference.unwrap_or(reference);
                self.mark_successful(&winner.id, &provider_reference).await?;
                PaymentStatus::Successful
            }
            Ok(_) => {
                tracing::warn!("Provider declined payout for winner={}", winner.id);
                self.mark_failed(&winner.id).await?;
                PaymentStatus::Failed
            }
            Err(e) if is_timeout_error(&e) => {
                // Indeterminate: the transfer may have gone through. Leave
                // the row PENDING so reconciliation can settle it later.
                tracing::warn!(
                    "Payout call timed out for winner={}; leaving PENDING",
                    winner.id
                );
                PaymentStatus::Pending
            }
            Err(e) => {
                tracing::error!("Payout call failed for winner={}: {:#}", winner.id, e);
                self.mark_failed(&winner.id).await?;
                PaymentStatus::Failed
            }
        };

        let status_label = match status {
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Pending => "pending",
        };
        record_payout(&provider.to_string(), status_label);

        Ok(status)
    }

    /// Stable per-winner reference; replays of the same winner always carry
    /// the same string, letting the provider deduplicate.
    pub fn idempotency_reference(winner: &Winner) -> String {
        format!("payout:{}", winner.id)
    }

    async fn call_provider(&self, winner: &Winner, reference: &str) -> Result<ProviderReceipt> {
        let base_url = match winner.payment_provider {
            PayoutProvider::Mtn => &self.mtn_api_url,
            PayoutProvider::Airtel => &self.airtel_api_url,
        };
        let url = format!("{}/v1/disbursements", base_url);

        let body = serde_json::json!({
            "amount": winner.amount_awarded,
            "phone_number": winner.phone_number,
            "reference": reference,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to call payment provider")?;

        if !response.status().is_success() {
            anyhow::bail!("Provider returned status: {}", response.status());
        }

        let body: serde_json::Value = response.json().await?;
        Ok(ProviderReceipt {
            success: body["success"].as_bool().unwrap_or(false),
            reference: body["reference"].as_str().map(String::from),
        })
    }

    async fn mark_successful(&self, winner_id: &str, reference: &str) -> Result<()> {
        retry_async_with_config(RetryConfig::aggressive(), || async {
            self.winners()
                .update_one(
                    doc! { "_id": winner_id, "payment_status": "pending" },
                    doc! { "$set": {
                        "payment_status": "successful",
                        "payment_reference": reference,
                        "paid_at": Utc::now().to_rfc3339(),
                    }},
                )
                .await
        })
        .await
        .context("Failed to mark winner payout successful")?;

        tracing::info!(
            "Payout settled: winner={}, reference={}",
            winner_id,
            reference
        );
        Ok(())
    }

    async fn mark_failed(&self, winner_id: &str) -> Result<()> {
        retry_async_with_config(RetryConfig::aggressive(), || async {
            self.winners()
                .update_one(
                    doc! { "_id": winner_id, "payment_status": "pending" },
                    doc! { "$set": { "payment_status": "failed" } },
                )
                .await
        })
        .await
        .context("Failed to mark winner payout failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_is_stable_per_winner() {
        let winner = Winner {
            id: "w-123".to_string(),
            question_id: "q1".to_string(),
            user_id: "u1".to_string(),
            position: 1,
            amount_awarded: 5000,
            payment_status: PaymentStatus::Pending,
            payment_provider: PayoutProvider::Mtn,
            phone_number: "256700000000".to_string(),
            payment_reference: None,
            awarded_at: Utc::now(),
            paid_at: None,
        };

        let first = PayoutDispatcher::idempotency_reference(&winner);
        let second = PayoutDispatcher::idempotency_reference(&winner);
        assert_eq!(first, second);
        assert_eq!(first, "payout:w-123");
    }
}
