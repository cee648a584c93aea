// libs/treatment-plan-cell/src/services/planning.rs
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use billing_cell::services::balance::BalanceService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::tenant::TenantContext;

use crate::models::{
    AcceptanceStatus, AcceptPlanRequest, ApprovalStatus, CreatePlanRequest, ItemStatus,
    NewItemRequest, PlanError, PlanItem, PlanSummary, TreatmentPlan, TreatmentStatus,
};
use crate::services::lifecycle::PlanLifecycleService;
use crate::services::totals::PlanTotalsService;

/// Storage-backed treatment-plan workflow: drafting, approval, patient
/// acceptance, execution and the auto-completion cascade. Totals are
/// recomputed and stored after every item mutation.
pub struct TreatmentPlanningService {
    supabase: Arc<SupabaseClient>,
    lifecycle: PlanLifecycleService,
    totals: PlanTotalsService,
    balances: BalanceService,
}

impl TreatmentPlanningService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            lifecycle: PlanLifecycleService::new(),
            totals: PlanTotalsService::new(),
            balances: BalanceService::new(config),
        }
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    pub async fn get_plan(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let filters = format!("id=eq.{}&{}", plan_id, tenant.filter());
        self.supabase
            .select_one("treatment_plans", &filters, auth_token)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?
            .ok_or(PlanError::NotFound)
    }

    pub async fn get_items(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<PlanItem>, PlanError> {
        let filters = format!(
            "plan_id=eq.{}&{}&order=order_index.asc",
            plan_id,
            tenant.filter()
        );
        self.supabase
            .select("treatment_plan_items", &filters, auth_token)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))
    }

    pub async fn get_item(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        let filters = format!("id=eq.{}&{}", item_id, tenant.filter());
        self.supabase
            .select_one("treatment_plan_items", &filters, auth_token)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?
            .ok_or(PlanError::ItemNotFound)
    }

    /// Plan with its items and their ledger-derived payment status.
    pub async fn plan_summary(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<PlanSummary, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;
        let items = self.get_items(tenant, plan_id, auth_token).await?;

        let item_ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        let item_balances = self
            .balances
            .plan_item_balances(tenant, &item_ids, auth_token)
            .await
            .map_err(|e| PlanError::Billing(e.to_string()))?;

        Ok(PlanSummary {
            plan,
            items,
            item_balances,
        })
    }

    // ==============================================================================
    // DRAFTING
    // ==============================================================================

    pub async fn create_plan(
        &self,
        tenant: &TenantContext,
        request: CreatePlanRequest,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let discount = request.discount.unwrap_or(Decimal::ZERO);
        if discount < Decimal::ZERO {
            return Err(PlanError::ValidationError(
                "Discount cannot be negative".to_string(),
            ));
        }
        for item in &request.items {
            validate_new_item(item)?;
        }

        let now = Utc::now();
        let plan: TreatmentPlan = self
            .supabase
            .insert(
                "treatment_plans",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "patient_id": request.patient_id,
                    "dentist_id": request.dentist_id,
                    "appointment_id": request.appointment_id,
                    "approval_status": ApprovalStatus::Draft,
                    "treatment_status": TreatmentStatus::Proposed,
                    "acceptance_status": AcceptanceStatus::Pending,
                    "valid_until": request.valid_until,
                    "is_editable": true,
                    "discount": discount,
                    "subtotal": Decimal::ZERO,
                    "total": Decimal::ZERO,
                    "overall_progress": 0.0,
                    "created_at": now,
                    "updated_at": now,
                }),
                auth_token,
            )
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        for (index, item) in request.items.iter().enumerate() {
            self.insert_item(tenant, plan.id, item, index as i32, auth_token)
                .await?;
        }

        let (plan, _) = self.recompute_totals(tenant, plan.id, auth_token).await?;

        info!(
            "Treatment plan {} drafted for patient {} with {} items",
            plan.id,
            plan.patient_id,
            request.items.len()
        );
        Ok(plan)
    }

    /// Draft plans only; a signed-off quote stops changing.
    pub async fn add_item(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        request: NewItemRequest,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        validate_new_item(&request)?;

        let plan = self.get_plan(tenant, plan_id, auth_token).await?;
        if !plan.is_editable {
            return Err(PlanError::PlanNotEditable);
        }

        let existing = self.get_items(tenant, plan_id, auth_token).await?;
        let next_index = existing
            .iter()
            .map(|item| item.order_index)
            .max()
            .map_or(0, |max| max + 1);

        let item = self
            .insert_item(tenant, plan_id, &request, next_index, auth_token)
            .await?;

        self.recompute_totals(tenant, plan_id, auth_token).await?;
        Ok(item)
    }

    /// Item cancellation stays possible after approval; it is the one edit
    /// a frozen plan still takes.
    pub async fn cancel_item(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        let item = self.get_item(tenant, item_id, auth_token).await?;

        self.lifecycle
            .validate_item_transition(&item.status, &ItemStatus::Cancelled)?;

        let updated = self
            .patch_item(tenant, item_id, json!({ "status": ItemStatus::Cancelled }), auth_token)
            .await?;

        let (plan, items) = self.recompute_totals(tenant, item.plan_id, auth_token).await?;
        self.maybe_complete_plan(tenant, &plan, &items, auth_token).await?;

        info!("Plan item {} cancelled", item_id);
        Ok(updated)
    }

    // ==============================================================================
    // APPROVAL (editability gate)
    // ==============================================================================

    pub async fn approve_plan(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        approver: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;

        if plan.approval_status != ApprovalStatus::Draft {
            return Err(PlanError::InvalidApprovalTransition(plan.approval_status));
        }

        let updated = self
            .patch_plan(
                tenant,
                plan_id,
                json!({
                    "approval_status": ApprovalStatus::Approved,
                    "is_editable": false,
                    "approved_by": approver,
                    "approved_at": Utc::now(),
                }),
                auth_token,
            )
            .await?;

        info!("Treatment plan {} approved by {}", plan_id, approver);
        Ok(updated)
    }

    /// Withdraw the quote entirely; both axes end cancelled.
    pub async fn cancel_plan(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;

        if plan.approval_status == ApprovalStatus::Cancelled {
            return Err(PlanError::InvalidApprovalTransition(plan.approval_status));
        }
        self.lifecycle
            .validate_treatment_transition(&plan.treatment_status, &TreatmentStatus::Cancelled)?;

        let updated = self
            .patch_plan(
                tenant,
                plan_id,
                json!({
                    "approval_status": ApprovalStatus::Cancelled,
                    "treatment_status": TreatmentStatus::Cancelled,
                    "is_editable": false,
                }),
                auth_token,
            )
            .await?;

        info!("Treatment plan {} cancelled", plan_id);
        Ok(updated)
    }

    // ==============================================================================
    // PATIENT ACCEPTANCE
    // ==============================================================================

    /// Record the patient's answer. Full acceptance activates every pending
    /// item; a strict subset leaves the plan Partial with the rest still
    /// pending. Answering after the vigency date lapses the quote.
    pub async fn record_acceptance(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        request: AcceptPlanRequest,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;

        if plan.approval_status != ApprovalStatus::Approved {
            return Err(PlanError::NotApproved);
        }
        if !self.lifecycle.can_record_acceptance(&plan.acceptance_status) {
            return Err(PlanError::AcceptanceWindowClosed(
                plan.valid_until.unwrap_or_else(Utc::now),
            ));
        }

        if let Err(e) = self
            .lifecycle
            .validate_acceptance_window(plan.valid_until, Utc::now())
        {
            warn!("Acceptance attempt on lapsed plan {}", plan_id);
            self.patch_plan(
                tenant,
                plan_id,
                json!({ "acceptance_status": AcceptanceStatus::Expired }),
                auth_token,
            )
            .await?;
            return Err(e);
        }

        let items = self.get_items(tenant, plan_id, auth_token).await?;
        let pending_ids: Vec<Uuid> = items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .map(|item| item.id)
            .collect();

        let accepted_ids = match request.item_ids {
            Some(ids) => ids,
            None => pending_ids.clone(),
        };
        if accepted_ids.is_empty() {
            return Err(PlanError::ValidationError(
                "At least one item must be accepted".to_string(),
            ));
        }

        for id in &accepted_ids {
            let item = items
                .iter()
                .find(|item| item.id == *id)
                .ok_or(PlanError::ItemNotFound)?;
            self.lifecycle
                .validate_item_transition(&item.status, &ItemStatus::Active)?;
        }

        for id in &accepted_ids {
            self.patch_item(tenant, *id, json!({ "status": ItemStatus::Active }), auth_token)
                .await?;
        }

        let fully_accepted = pending_ids.iter().all(|id| accepted_ids.contains(id));
        let acceptance_status = if fully_accepted {
            AcceptanceStatus::Accepted
        } else {
            AcceptanceStatus::Partial
        };

        let mut patch = json!({ "acceptance_status": acceptance_status });
        if fully_accepted {
            patch["accepted_at"] = json!(Utc::now());
        }
        if plan.treatment_status == TreatmentStatus::Proposed {
            self.lifecycle
                .validate_treatment_transition(&plan.treatment_status, &TreatmentStatus::Accepted)?;
            patch["treatment_status"] = json!(TreatmentStatus::Accepted);
        }

        let updated = self.patch_plan(tenant, plan_id, patch, auth_token).await?;

        info!(
            "Treatment plan {} acceptance recorded as {}",
            plan_id, acceptance_status
        );
        Ok(updated)
    }

    /// A rejection can be reconsidered while the vigency window stays open.
    pub async fn record_rejection(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;

        if plan.approval_status != ApprovalStatus::Approved {
            return Err(PlanError::NotApproved);
        }
        if !self.lifecycle.can_record_acceptance(&plan.acceptance_status) {
            return Err(PlanError::AcceptanceWindowClosed(
                plan.valid_until.unwrap_or_else(Utc::now),
            ));
        }

        let updated = self
            .patch_plan(
                tenant,
                plan_id,
                json!({ "acceptance_status": AcceptanceStatus::Rejected }),
                auth_token,
            )
            .await?;

        info!("Treatment plan {} rejected by patient", plan_id);
        Ok(updated)
    }

    // ==============================================================================
    // EXECUTION
    // ==============================================================================

    pub async fn start_execution(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;

        self.lifecycle
            .validate_treatment_transition(&plan.treatment_status, &TreatmentStatus::InProgress)?;

        if !matches!(
            plan.acceptance_status,
            AcceptanceStatus::Accepted | AcceptanceStatus::Partial
        ) {
            return Err(PlanError::ValidationError(
                "Execution requires a patient-accepted plan".to_string(),
            ));
        }

        let items = self.get_items(tenant, plan_id, auth_token).await?;
        if !items.iter().any(|item| item.status == ItemStatus::Active) {
            return Err(PlanError::NoActiveItems);
        }

        let updated = self
            .patch_plan(
                tenant,
                plan_id,
                json!({ "treatment_status": TreatmentStatus::InProgress }),
                auth_token,
            )
            .await?;

        info!("Treatment plan {} execution started", plan_id);
        Ok(updated)
    }

    pub async fn pause_execution(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        self.transition_treatment(tenant, plan_id, TreatmentStatus::Paused, auth_token)
            .await
    }

    pub async fn resume_execution(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        self.transition_treatment(tenant, plan_id, TreatmentStatus::InProgress, auth_token)
            .await
    }

    /// Mark an active item done. When the last non-cancelled item carries an
    /// execution timestamp, the plan completes itself.
    pub async fn record_item_execution(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        executed_by: Uuid,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        let item = self.get_item(tenant, item_id, auth_token).await?;
        let plan = self.get_plan(tenant, item.plan_id, auth_token).await?;

        if plan.treatment_status != TreatmentStatus::InProgress {
            return Err(PlanError::ValidationError(
                "Items can only be executed while the plan is in execution".to_string(),
            ));
        }

        self.lifecycle
            .validate_item_transition(&item.status, &ItemStatus::Completed)?;

        let updated = self
            .patch_item(
                tenant,
                item_id,
                json!({
                    "status": ItemStatus::Completed,
                    "executed_by": executed_by,
                    "executed_at": Utc::now(),
                    "progress_percent": 100,
                }),
                auth_token,
            )
            .await?;

        let (plan, items) = self.recompute_totals(tenant, item.plan_id, auth_token).await?;
        self.maybe_complete_plan(tenant, &plan, &items, auth_token).await?;

        info!("Plan item {} executed by {}", item_id, executed_by);
        Ok(updated)
    }

    /// Store a fresh progress figure for an item and refresh the plan's
    /// stored aggregate.
    pub async fn store_item_progress(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        plan_id: Uuid,
        progress_percent: i32,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        let updated = self
            .patch_item(
                tenant,
                item_id,
                json!({ "progress_percent": progress_percent }),
                auth_token,
            )
            .await?;

        self.recompute_totals(tenant, plan_id, auth_token).await?;
        Ok(updated)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn transition_treatment(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        new_status: TreatmentStatus,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;

        self.lifecycle
            .validate_treatment_transition(&plan.treatment_status, &new_status)?;

        let updated = self
            .patch_plan(
                tenant,
                plan_id,
                json!({ "treatment_status": new_status }),
                auth_token,
            )
            .await?;

        info!(
            "Treatment plan {} moved {} -> {}",
            plan_id, plan.treatment_status, new_status
        );
        Ok(updated)
    }

    /// The post-write check behind auto-completion: once every non-cancelled
    /// item has been executed, the running plan completes on its own.
    async fn maybe_complete_plan(
        &self,
        tenant: &TenantContext,
        plan: &TreatmentPlan,
        items: &[PlanItem],
        auth_token: &str,
    ) -> Result<(), PlanError> {
        if plan.treatment_status != TreatmentStatus::InProgress {
            return Ok(());
        }
        if !self.totals.all_items_executed(items) {
            return Ok(());
        }

        self.patch_plan(
            tenant,
            plan.id,
            json!({ "treatment_status": TreatmentStatus::Completed }),
            auth_token,
        )
        .await?;

        info!("Treatment plan {} auto-completed: all items executed", plan.id);
        Ok(())
    }

    async fn recompute_totals(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<(TreatmentPlan, Vec<PlanItem>), PlanError> {
        let plan = self.get_plan(tenant, plan_id, auth_token).await?;
        let items = self.get_items(tenant, plan_id, auth_token).await?;

        let totals = self.totals.compute(&items, plan.discount);

        let updated = self
            .patch_plan(
                tenant,
                plan_id,
                json!({
                    "subtotal": totals.subtotal,
                    "total": totals.total,
                    "overall_progress": totals.overall_progress,
                }),
                auth_token,
            )
            .await?;

        Ok((updated, items))
    }

    async fn insert_item(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        request: &NewItemRequest,
        default_index: i32,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        self.supabase
            .insert(
                "treatment_plan_items",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "plan_id": plan_id,
                    "procedure_code": request.procedure_code,
                    "description": request.description,
                    "status": ItemStatus::Pending,
                    "final_cost": request.final_cost,
                    "order_index": request.order_index.unwrap_or(default_index),
                    "progress_percent": 0,
                }),
                auth_token,
            )
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))
    }

    async fn patch_plan(
        &self,
        tenant: &TenantContext,
        plan_id: Uuid,
        mut patch: Value,
        auth_token: &str,
    ) -> Result<TreatmentPlan, PlanError> {
        patch["updated_at"] = json!(Utc::now());
        let filters = format!("id=eq.{}&{}", plan_id, tenant.filter());
        self.supabase
            .update("treatment_plans", &filters, patch, auth_token)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))
    }

    async fn patch_item(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        patch: Value,
        auth_token: &str,
    ) -> Result<PlanItem, PlanError> {
        let filters = format!("id=eq.{}&{}", item_id, tenant.filter());
        self.supabase
            .update("treatment_plan_items", &filters, patch, auth_token)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))
    }
}

fn validate_new_item(request: &NewItemRequest) -> Result<(), PlanError> {
    if request.procedure_code.trim().is_empty() {
        return Err(PlanError::ValidationError(
            "Procedure code is required".to_string(),
        ));
    }
    if request.final_cost < Decimal::ZERO {
        return Err(PlanError::ValidationError(
            "Item cost cannot be negative".to_string(),
        ));
    }
    Ok(())
}
