//! Dry-run validation against the brokerage.

use crate::error::{OptionsError, Result};
use crate::types::ValidationResult;
use rust_decimal::Decimal;
use spreadbot_tastytrade::{
    ApiErrorDetail, OrderRequest, OrderResponse, PriceEffect, TastytradeClient, TastytradeError,
};
use tracing::{info, warn};

/// Submits orders to the dry-run endpoint.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    client: TastytradeClient,
}

fn signed(amount: Decimal, effect: Option<PriceEffect>) -> Decimal {
    match effect {
        Some(PriceEffect::Debit) => -amount,
        _ => amount,
    }
}

impl ValidationResult {
    fn accepted(response: &OrderResponse) -> Self {
        Self {
            accepted: true,
            buying_power_effect: response
                .buying_power_effect
                .as_ref()
                .map(|b| signed(b.change_in_buying_power, b.change_in_buying_power_effect)),
            total_fees: response
                .fee_calculation
                .as_ref()
                .map(|f| f.total_fees),
            warnings: response.warnings.clone(),
            errors: Vec::new(),
            message: None,
        }
    }

    fn rejected(message: String, errors: Vec<ApiErrorDetail>) -> Self {
        Self {
            accepted: false,
            buying_power_effect: None,
            total_fees: None,
            warnings: Vec::new(),
            errors,
            message: Some(message),
        }
    }

    /// Converts a rejected result into the matching error.
    ///
    /// # Errors
    /// Returns [`OptionsError::ValidationRejected`] when not accepted.
    pub fn into_accepted(self) -> Result<Self> {
        if self.accepted {
            return Ok(self);
        }
        Err(OptionsError::ValidationRejected {
            message: self.message.unwrap_or_default(),
            errors: self.errors,
        })
    }
}

impl OrderValidator {
    #[must_use]
    pub fn new(client: TastytradeClient) -> Self {
        Self { client }
    }

    /// Validates `order` without executing it.
    ///
    /// A structured rejection is returned as a non-accepted result, not an
    /// error. Every warning on an accepted order is logged.
    ///
    /// # Errors
    /// Returns error for transport failures and unstructured API errors.
    pub async fn dry_run(&self, account: &str, order: &OrderRequest) -> Result<ValidationResult> {
        match self.client.dry_run_order(account, order).await {
            Ok(response) => {
                let result = ValidationResult::accepted(&response);
                for warning in &result.warnings {
                    warn!(
                        code = warning.code.as_deref().unwrap_or(""),
                        "dry-run warning: {}",
                        warning.message
                    );
                }
                info!(
                    buying_power_effect = ?result.buying_power_effect,
                    fees = ?result.total_fees,
                    warnings = result.warnings.len(),
                    "order validated"
                );
                Ok(result)
            }
            Err(TastytradeError::Rejected {
                status_code,
                message,
                errors,
            }) => {
                let lines: Vec<&str> = errors.iter().map(ApiErrorDetail::text).collect();
                warn!(status_code, %message, errors = ?lines, "order rejected by dry-run");
                Ok(ValidationResult::rejected(message, errors))
            }
            Err(e) => Err(OptionsError::from_broker(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use spreadbot_tastytrade::{
        InstrumentType, OrderAction, OrderLeg, OrderType, TastytradeClientConfig, TimeInForce,
    };
    use std::num::NonZeroU32;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TastytradeClient {
        let client = TastytradeClient::new(
            TastytradeClientConfig::default()
                .with_base_url(server.uri())
                .with_rate_limit(NonZeroU32::new(1000).unwrap()),
        )
        .unwrap();
        client.set_session_token(Some("token".to_string()));
        client
    }

    fn order() -> OrderRequest {
        OrderRequest {
            time_in_force: TimeInForce::Day,
            order_type: OrderType::Limit,
            price: dec!(1.00),
            price_effect: PriceEffect::Credit,
            legs: vec![OrderLeg {
                instrument_type: InstrumentType::IndexOption,
                symbol: "SPXW  241014P04120000".to_string(),
                quantity: 1,
                action: OrderAction::SellToOpen,
            }],
        }
    }

    #[tokio::test]
    async fn test_dry_run_accepted_with_warnings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/5WT00001/orders/dry-run"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": {
                    "order": {"id": 0, "status": "Received", "legs": []},
                    "warnings": [{"code": "tif_next_valid_session", "message": "Order will be queued"}],
                    "buying-power-effect": {
                        "change-in-buying-power": "1900.0",
                        "change-in-buying-power-effect": "Debit"
                    },
                    "fee-calculation": {"total-fees": "1.72", "total-fees-effect": "Debit"}
                }
            })))
            .mount(&server)
            .await;

        let validator = OrderValidator::new(client_for(&server));
        let result = validator.dry_run("5WT00001", &order()).await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.buying_power_effect, Some(dec!(-1900.0)));
        assert_eq!(result.total_fees, Some(dec!(1.72)));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.into_accepted().is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_structured_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/5WT00001/orders/dry-run"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "message": "Insufficient funds",
                    "errors": [{"reason": "buying power"}]
                }
            })))
            .mount(&server)
            .await;

        let validator = OrderValidator::new(client_for(&server));
        let result = validator.dry_run("5WT00001", &order()).await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.message.as_deref(), Some("Insufficient funds"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].text(), "buying power");

        let err = result.into_accepted().unwrap_err();
        assert_eq!(
            err.rejection_lines(),
            vec!["Insufficient funds".to_string(), "buying power".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dry_run_unstructured_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/5WT00001/orders/dry-run"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let validator = OrderValidator::new(client_for(&server));
        let err = validator.dry_run("5WT00001", &order()).await.unwrap_err();
        assert!(matches!(err, OptionsError::Broker(_)));
    }
}
