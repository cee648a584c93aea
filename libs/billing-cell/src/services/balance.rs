// libs/billing-cell/src/services/balance.rs
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::tenant::TenantContext;

use crate::models::{
    AllocationWithPayment, AppointmentBalance, AppointmentChargeRow, BillingError, ItemBalance,
    ItemChargeRow, Payment, PaymentScope, PaymentStatus, PlanBalance, PlanChargeRow,
};

/// The three balance calculators. All follow the same shape:
/// `balance = cost − Σ(approved payments matching this scope)`, floored at
/// zero, recomputed from the ledger on every call. A refund moves a row out
/// of the approved sum, so the balance re-opens by itself.
pub struct BalanceService {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScopeBalance {
    Plan(PlanBalance),
    Appointment(AppointmentBalance),
}

impl BalanceService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Prepayment/copay balance of a single appointment.
    pub async fn appointment_balance(
        &self,
        tenant: &TenantContext,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentBalance, BillingError> {
        let filters = format!(
            "id=eq.{}&{}&select=id,requires_payment,consultation_fee",
            appointment_id,
            tenant.filter()
        );
        let charge: AppointmentChargeRow = self
            .supabase
            .select_one("appointments", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::ChargeTargetNotFound)?;

        let payments = self
            .scope_payments(tenant, "appointment_id", appointment_id, auth_token)
            .await?;

        let approved_total = sum_where(&payments, PaymentStatus::Approved);
        let refunded_total = sum_where(&payments, PaymentStatus::Refunded);

        debug!(
            "Recomputed appointment {} balance from {} ledger rows",
            appointment_id,
            payments.len()
        );

        Ok(AppointmentBalance {
            appointment_id,
            consultation_fee: charge.consultation_fee,
            approved_total,
            refunded_total,
            balance: floor_zero(charge.consultation_fee - approved_total),
        })
    }

    /// Plan-level balance over the plan's stored total.
    pub async fn plan_balance(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<PlanBalance, BillingError> {
        let filters = format!("id=eq.{}&{}&select=id,total", plan_id, tenant.filter());
        let charge: PlanChargeRow = self
            .supabase
            .select_one("treatment_plans", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::ChargeTargetNotFound)?;

        let payments = self
            .scope_payments(tenant, "plan_id", plan_id, auth_token)
            .await?;

        let approved_total = sum_where(&payments, PaymentStatus::Approved);
        let refunded_total = sum_where(&payments, PaymentStatus::Refunded);

        debug!(
            "Recomputed plan {} balance from {} ledger rows",
            plan_id,
            payments.len()
        );

        Ok(PlanBalance {
            plan_id,
            total: charge.total,
            approved_total,
            refunded_total,
            balance: floor_zero(charge.total - approved_total),
        })
    }

    /// Item-level partial-payment balance, fed by allocations of approved
    /// plan payments.
    pub async fn item_balance(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        auth_token: &str,
    ) -> Result<ItemBalance, BillingError> {
        let filters = format!("id=eq.{}&{}&select=id,final_cost,status", item_id, tenant.filter());
        let item: ItemChargeRow = self
            .supabase
            .select_one("treatment_plan_items", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?
            .ok_or(BillingError::ChargeTargetNotFound)?;

        let allocations = self.item_allocations(&[item_id], auth_token).await?;

        Ok(item_balance_from(&item, &allocations))
    }

    /// Per-item balances for a whole plan, used for plan read models.
    pub async fn plan_item_balances(
        &self,
        tenant: &TenantContext,
        item_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<Vec<ItemBalance>, BillingError> {
        if item_ids.is_empty() {
            return Ok(vec![]);
        }

        let id_list = item_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let filters = format!(
            "id=in.({})&{}&select=id,final_cost,status",
            id_list,
            tenant.filter()
        );
        let items: Vec<ItemChargeRow> = self
            .supabase
            .select("treatment_plan_items", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))?;

        let allocations = self.item_allocations(item_ids, auth_token).await?;

        Ok(items
            .iter()
            .map(|item| item_balance_from(item, &allocations))
            .collect())
    }

    /// Balance of whatever scope a payment belongs to; reported back to the
    /// caller right after approval.
    pub async fn balance_for_payment(
        &self,
        tenant: &TenantContext,
        payment: &Payment,
        auth_token: &str,
    ) -> Result<ScopeBalance, BillingError> {
        match payment.scope() {
            PaymentScope::Plan(plan_id) => Ok(ScopeBalance::Plan(
                self.plan_balance(tenant, plan_id, auth_token).await?,
            )),
            PaymentScope::Appointment(appointment_id) => Ok(ScopeBalance::Appointment(
                self.appointment_balance(tenant, appointment_id, auth_token)
                    .await?,
            )),
            PaymentScope::Unscoped => Err(BillingError::InvalidScope),
        }
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn scope_payments(
        &self,
        tenant: &TenantContext,
        scope_column: &str,
        scope_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Payment>, BillingError> {
        let filters = format!("{}=eq.{}&{}", scope_column, scope_id, tenant.filter());
        self.supabase
            .select("payments", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))
    }

    async fn item_allocations(
        &self,
        item_ids: &[Uuid],
        auth_token: &str,
    ) -> Result<Vec<AllocationWithPayment>, BillingError> {
        let id_list = item_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let filters = format!(
            "item_id=in.({})&select=item_id,amount,payment:payments(status)",
            id_list
        );
        self.supabase
            .select("payment_item_allocations", &filters, auth_token)
            .await
            .map_err(|e| BillingError::DatabaseError(e.to_string()))
    }
}

fn sum_where(payments: &[Payment], status: PaymentStatus) -> Decimal {
    payments
        .iter()
        .filter(|p| p.status == status)
        .map(|p| p.amount)
        .sum()
}

fn floor_zero(value: Decimal) -> Decimal {
    if value < Decimal::ZERO {
        Decimal::ZERO
    } else {
        value
    }
}

/// A cancelled item owes nothing; its allocations are still reported.
fn item_balance_from(item: &ItemChargeRow, allocations: &[AllocationWithPayment]) -> ItemBalance {
    let allocated_approved: Decimal = allocations
        .iter()
        .filter(|a| a.item_id == item.id && a.payment.status == PaymentStatus::Approved)
        .map(|a| a.amount)
        .sum();

    let owed = if item.status == "Cancelado" {
        Decimal::ZERO
    } else {
        item.final_cost
    };

    let balance = floor_zero(owed - allocated_approved);

    ItemBalance {
        item_id: item.id,
        final_cost: item.final_cost,
        allocated_approved,
        balance,
        paid: balance == Decimal::ZERO,
    }
}
