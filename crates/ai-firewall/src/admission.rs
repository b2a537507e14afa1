//! Pre-flight budget admission.
//!
//! Decides whether to forward a request based on the user's spend so far
//! today and a tokenizer-derived cost estimate. The estimate covers input
//! tokens only by default; the true output cost is unknowable before
//! generation and is reconciled at settlement. Two requests admitted within
//! a short window can both pass against the same stale snapshot, so the cap
//! is eventually accurate rather than linearizable.

use crate::api::types::ChatCompletionRequest;
use crate::error::FirewallError;
use budget_ledger::SpendLedger;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use token_meter::{PricingTable, TokenMeter};
use tracing::{debug, warn};

/// Immutable per-request record produced by admission.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: String,
    pub model: String,
    pub stream: bool,
    /// UTC calendar date at admission time; settlement bills to this day.
    pub day: NaiveDate,
    /// Tokenizer-estimated input tokens, overridden by upstream-reported
    /// usage at settlement when available.
    pub input_tokens: usize,
}

/// Admission controller: reads the ledger, estimates cost, admits or rejects.
pub struct AdmissionController {
    ledger: Arc<dyn SpendLedger>,
    meter: TokenMeter,
    pricing: Arc<PricingTable>,
    daily_limit_usd: f64,
    reserved_output_tokens: usize,
}

impl AdmissionController {
    pub fn new(
        ledger: Arc<dyn SpendLedger>,
        meter: TokenMeter,
        pricing: Arc<PricingTable>,
        daily_limit_usd: f64,
        reserved_output_tokens: usize,
    ) -> Self {
        Self {
            ledger,
            meter,
            pricing,
            daily_limit_usd,
            reserved_output_tokens,
        }
    }

    /// Evaluate a request against the daily cap.
    ///
    /// An unreadable ledger counts as zero prior spend: availability is
    /// favored over strict enforcement at read time.
    pub async fn admit(
        &self,
        user: &str,
        request: &ChatCompletionRequest,
    ) -> Result<RequestContext, FirewallError> {
        let input_tokens = self.meter.count_messages(&request.messages);

        let mut estimate = self.pricing.input_cost(&request.model, input_tokens);
        if self.reserved_output_tokens > 0 {
            estimate += self
                .pricing
                .output_cost(&request.model, self.reserved_output_tokens);
        }

        let day = Utc::now().date_naive();
        let spent = match self.ledger.spent(user, day).await {
            Ok(spent) => spent,
            Err(e) => {
                warn!(user, error = %e, "Ledger unreadable, admitting against zero spend");
                0.0
            }
        };

        if spent + estimate >= self.daily_limit_usd {
            return Err(FirewallError::BudgetExceeded {
                spent,
                limit: self.daily_limit_usd,
            });
        }

        debug!(
            user,
            model = %request.model,
            input_tokens,
            estimate,
            spent,
            "Request admitted"
        );

        Ok(RequestContext {
            user: user.to_string(),
            model: request.model.clone(),
            stream: request.stream,
            day,
            input_tokens,
        })
    }

    /// The configured daily cap in USD.
    pub fn daily_limit_usd(&self) -> f64 {
        self.daily_limit_usd
    }
}
