//! Swap quote and execution client over the aggregator HTTP API.
//!
//! The HTTP legs (quote, transaction build) live here; the signing and
//! submission of the built transaction is a chain concern behind the
//! [`TransactionSubmitter`] seam.

use super::{ConnectorError, RejectionReason, SwapExecutor, SwapOutcome, SwapRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Signs and submits a pre-built base64 transaction. Black box for wallet
/// and RPC handling; returns the confirmed signature.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn sign_and_send(&self, transaction_base64: &str) -> Result<String, ConnectorError>;

    /// The wallet public key swaps are executed for.
    fn wallet_pubkey(&self) -> String;
}

/// Swap executor backed by the aggregator's quote and swap endpoints.
pub struct JupiterSwapExecutor {
    client: Client,
    quote_url: String,
    swap_url: String,
    slippage_bps: u32,
    submitter: Arc<dyn TransactionSubmitter>,
    retry_delay: Duration,
}

impl JupiterSwapExecutor {
    pub fn new(
        quote_url: String,
        swap_url: String,
        slippage_bps: u32,
        submitter: Arc<dyn TransactionSubmitter>,
    ) -> Self {
        Self {
            client: Client::new(),
            quote_url,
            swap_url,
            slippage_bps,
            submitter,
            retry_delay: Duration::from_secs(1),
        }
    }

    async fn fetch_quote(
        &self,
        request: &SwapRequest,
    ) -> Result<serde_json::Value, ConnectorError> {
        let swap_mode = if request.amount_is_output {
            "ExactOut"
        } else {
            "ExactIn"
        };
        let url = format!(
            "{}?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode={}",
            self.quote_url,
            request.input_mint,
            request.output_mint,
            request.amount,
            self.slippage_bps,
            swap_mode
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Http {
                status: status.as_u16(),
                message: "Quote request failed".to_string(),
            });
        }

        let quote: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        if let Some(error) = quote.get("error").and_then(|v| v.as_str()) {
            return Err(ConnectorError::Rejected(RejectionReason::from_message(
                error,
            )));
        }
        Ok(quote)
    }

    async fn execute_quote(&self, quote: &serde_json::Value) -> Result<String, ConnectorError> {
        let payload = serde_json::json!({
            "dynamicComputeUnitLimit": true,
            "dynamicSlippage": true,
            "prioritizationFeeLamports": "auto",
            "quoteResponse": quote,
            "userPublicKey": self.submitter.wallet_pubkey(),
            "wrapAndUnwrapSol": true,
        });

        let response = self
            .client
            .post(&self.swap_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ConnectorError::Network(e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;

        let transaction = body
            .get("swapTransaction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                let error = body
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("missing swapTransaction");
                ConnectorError::Rejected(RejectionReason::from_message(error))
            })?;

        self.submitter.sign_and_send(transaction).await
    }

    async fn quote_and_swap_once(
        &self,
        request: &SwapRequest,
    ) -> Result<SwapOutcome, ConnectorError> {
        let quote = self.fetch_quote(request).await?;
        let outcome = parse_quote_amounts(&quote)?;

        debug!(
            "Swap quote {} -> {}: in={} out={} (~${})",
            request.input_mint.short(),
            request.output_mint.short(),
            outcome.in_amount,
            outcome.out_amount,
            outcome.usd_value
        );

        if request.execute {
            let signature = self.execute_quote(&quote).await?;
            info!("Swap executed, signature {}", signature);
        }
        Ok(outcome)
    }
}

#[async_trait]
impl SwapExecutor for JupiterSwapExecutor {
    async fn quote_and_swap(&self, request: &SwapRequest) -> Result<SwapOutcome, ConnectorError> {
        let attempts = request.max_attempts.max(1);
        let mut last_error = ConnectorError::Other("no attempts made".to_string());
        for attempt in 1..=attempts {
            match self.quote_and_swap_once(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!("Swap attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_error)
    }
}

/// Pull the realized amounts out of a quote response.
fn parse_quote_amounts(quote: &serde_json::Value) -> Result<SwapOutcome, ConnectorError> {
    let amount = |field: &str| -> Result<u64, ConnectorError> {
        quote
            .get(field)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| ConnectorError::Parse(format!("missing {} in quote", field)))
    };

    let usd_value = quote
        .get("swapUsdValue")
        .and_then(|v| v.as_str())
        .and_then(|s| crate::domain::Decimal::from_str_canonical(s).ok())
        .map(|d| d.round2())
        .unwrap_or_default();

    Ok(SwapOutcome {
        in_amount: amount("inAmount")?,
        out_amount: amount("outAmount")?,
        usd_value,
    })
}
