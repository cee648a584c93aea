// libs/billing-cell/src/services/ledger.rs
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::tenant::TenantContext;

use crate::models::{
    AllocationRequest, BillingError, CreatePaymentRequest, Payment, PaymentItemAllocation,
    PaymentStatus,
};

pub struct PaymentLedgerService {
    supabase: Arc<SupabaseClient>,
}

impl PaymentLedgerService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Validate that a payment status change is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &PaymentStatus,
        new_status: &PaymentStatus,
    ) -> Result<(), BillingError> {
        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!(
                "Invalid payment status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(BillingError::InvalidStatusTransition(*current_status));
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status. Direct
    /// Pending -> Approved covers front-desk cash entries that never pass
    /// through a processor.
    pub fn get_valid_transitions(&self, current_status: &PaymentStatus) -> Vec<PaymentStatus> {
        match current_status {
            PaymentStatus::Pending => vec![
                PaymentStatus::Processing,
                PaymentStatus::Approved,
                PaymentStatus::Cancelled,
            ],
            PaymentStatus::Processing => vec![PaymentStatus::Approved, PaymentStatus::Rejected],
            PaymentStatus::Approved => vec![PaymentStatus::Refunded],
            // Terminal states
            PaymentStatus::Rejected => vec![],
            PaymentStatus::Cancelled => vec![],
            PaymentStatus::Refunded => vec![],
        }
    }

    /// Append a ledger row. The ledger is append-only: rows are never
    /// deleted or re-priced, corrections are new rows.
    pub async fn create_payment(
        &self,
        tenant: &TenantContext,
        request: CreatePaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, BillingError> {
        self.validate_create_request(&request)?;

        let payment: Payment = self
            .supabase
            .insert(
                "payments",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "plan_id": request.plan_id,
                    "appointment_id": request.appointment_id,
                    "status": PaymentStatus::Pending,
                    "amount": request.amount,
                    "method": request.method,
                    "reference": request.reference,
                    "created_at": Utc::now(),
                }),
                auth_token,
            )
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        if let Some(allocations) = request.allocations {
            self.insert_allocations(payment.id, &allocations, auth_token)
                .await?;
        }

        info!(
            "Payment {} recorded for {:?} ({})",
            payment.id,
            payment.scope(),
            payment.amount
        );
        Ok(payment)
    }

    pub async fn get_payment(
        &self,
        tenant: &TenantContext,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Payment, BillingError> {
        let filters = format!("id=eq.{}&{}", payment_id, tenant.filter());
        self.supabase
            .select_one("payments", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::NotFound)
    }

    pub async fn get_allocations(
        &self,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<PaymentItemAllocation>, BillingError> {
        let filters = format!("payment_id=eq.{}", payment_id);
        self.supabase
            .select("payment_item_allocations", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))
    }

    /// Re-validate and apply a status change. `processed_at` is stamped the
    /// first time the payment reaches a settled status.
    pub async fn transition_payment(
        &self,
        tenant: &TenantContext,
        payment_id: Uuid,
        new_status: PaymentStatus,
        auth_token: &str,
    ) -> Result<Payment, BillingError> {
        let payment = self.get_payment(tenant, payment_id, auth_token).await?;

        self.validate_status_transition(&payment.status, &new_status)?;

        let mut patch = json!({
            "status": new_status,
        });
        let settled = matches!(
            new_status,
            PaymentStatus::Approved | PaymentStatus::Rejected | PaymentStatus::Refunded
        );
        if settled && payment.processed_at.is_none() {
            patch["processed_at"] = json!(Utc::now());
        }

        let filters = format!("id=eq.{}&{}", payment_id, tenant.filter());
        let updated: Payment = self
            .supabase
            .update("payments", &filters, patch, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        info!(
            "Payment {} moved {} -> {}",
            payment_id, payment.status, new_status
        );
        Ok(updated)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_create_request(&self, request: &CreatePaymentRequest) -> Result<(), BillingError> {
        match (request.plan_id, request.appointment_id) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => return Err(BillingError::InvalidScope),
        }

        if request.amount <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount(
                "Payment amount must be positive".to_string(),
            ));
        }

        if let Some(allocations) = &request.allocations {
            if request.plan_id.is_none() {
                return Err(BillingError::AllocationWithoutPlan);
            }
            validate_allocations(request.amount, allocations)?;
        }

        Ok(())
    }

    async fn insert_allocations(
        &self,
        payment_id: Uuid,
        allocations: &[AllocationRequest],
        auth_token: &str,
    ) -> Result<(), BillingError> {
        for allocation in allocations {
            self.supabase
                .insert_only(
                    "payment_item_allocations",
                    json!({
                        "payment_id": payment_id,
                        "item_id": allocation.item_id,
                        "amount": allocation.amount,
                    }),
                    auth_token,
                )
                .await
                .map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Allocation rows must each be positive and must not, in sum, exceed the
/// payment they split.
pub fn validate_allocations(
    payment_amount: Decimal,
    allocations: &[AllocationRequest],
) -> Result<(), BillingError> {
    let mut total = Decimal::ZERO;
    for allocation in allocations {
        if allocation.amount <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount(
                "Allocation amounts must be positive".to_string(),
            ));
        }
        total += allocation.amount;
    }
    if total > payment_amount {
        return Err(BillingError::AllocationExceedsPayment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestConfig;

    fn service() -> PaymentLedgerService {
        PaymentLedgerService::new(&TestConfig::default().to_app_config())
    }

    #[test]
    fn pending_can_settle_or_cancel() {
        let service = service();
        let next = service.get_valid_transitions(&PaymentStatus::Pending);
        assert!(next.contains(&PaymentStatus::Processing));
        assert!(next.contains(&PaymentStatus::Approved));
        assert!(next.contains(&PaymentStatus::Cancelled));
        assert!(!next.contains(&PaymentStatus::Refunded));
    }

    #[test]
    fn settled_states_are_terminal_except_refund() {
        let service = service();
        assert_eq!(
            service.get_valid_transitions(&PaymentStatus::Approved),
            vec![PaymentStatus::Refunded]
        );
        assert!(service.get_valid_transitions(&PaymentStatus::Rejected).is_empty());
        assert!(service.get_valid_transitions(&PaymentStatus::Cancelled).is_empty());
        assert!(service.get_valid_transitions(&PaymentStatus::Refunded).is_empty());
    }

    #[test]
    fn refund_requires_approval_first() {
        let service = service();
        assert_matches!(
            service.validate_status_transition(&PaymentStatus::Pending, &PaymentStatus::Refunded),
            Err(BillingError::InvalidStatusTransition(PaymentStatus::Pending))
        );
    }

    #[test]
    fn allocations_cannot_exceed_payment() {
        let allocations = vec![
            AllocationRequest {
                item_id: Uuid::new_v4(),
                amount: Decimal::new(6000, 2),
            },
            AllocationRequest {
                item_id: Uuid::new_v4(),
                amount: Decimal::new(5000, 2),
            },
        ];
        assert_matches!(
            validate_allocations(Decimal::new(10000, 2), &allocations),
            Err(BillingError::AllocationExceedsPayment)
        );
    }

    #[test]
    fn partial_allocation_is_allowed() {
        let allocations = vec![AllocationRequest {
            item_id: Uuid::new_v4(),
            amount: Decimal::new(2500, 2),
        }];
        assert!(validate_allocations(Decimal::new(10000, 2), &allocations).is_ok());
    }
}
