// libs/treatment-plan-cell/src/services/progress.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::tenant::TenantContext;

use crate::models::{PlanError, RecordSessionRequest, TreatmentSession, TreatmentStatus};
use crate::services::planning::TreatmentPlanningService;

/// Per-item clinical progress, one session row per visit. Progress is
/// monotonically non-decreasing; hitting 100% completes the item through
/// the same path as an explicit execution, which can cascade into plan
/// auto-completion.
pub struct TreatmentProgressService {
    supabase: Arc<SupabaseClient>,
    planning: TreatmentPlanningService,
}

impl TreatmentProgressService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            planning: TreatmentPlanningService::new(config),
        }
    }

    pub async fn record_session(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        request: RecordSessionRequest,
        performed_by: Uuid,
        auth_token: &str,
    ) -> Result<TreatmentSession, PlanError> {
        if !(0..=100).contains(&request.progress_percent) {
            return Err(PlanError::ValidationError(
                "Progress must be between 0 and 100".to_string(),
            ));
        }

        let item = self.planning.get_item(tenant, item_id, auth_token).await?;
        let plan = self
            .planning
            .get_plan(tenant, item.plan_id, auth_token)
            .await?;

        if plan.treatment_status != TreatmentStatus::InProgress {
            return Err(PlanError::ValidationError(
                "Sessions can only be recorded while the plan is in execution".to_string(),
            ));
        }

        if request.progress_percent < item.progress_percent {
            return Err(PlanError::ProgressRegression {
                current: item.progress_percent,
                attempted: request.progress_percent,
            });
        }

        let session: TreatmentSession = self
            .supabase
            .insert(
                "treatment_sessions",
                json!({
                    "tenant_id": tenant.tenant_id,
                    "item_id": item_id,
                    "appointment_id": request.appointment_id,
                    "progress_percent": request.progress_percent,
                    "notes": request.notes,
                    "performed_by": performed_by,
                    "performed_at": Utc::now(),
                }),
                auth_token,
            )
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))?;

        if request.progress_percent == 100 {
            // Full progress completes the item and may complete the plan
            self.planning
                .record_item_execution(tenant, item_id, performed_by, auth_token)
                .await?;
        } else {
            self.planning
                .store_item_progress(
                    tenant,
                    item_id,
                    item.plan_id,
                    request.progress_percent,
                    auth_token,
                )
                .await?;
        }

        info!(
            "Session recorded for item {} at {}%",
            item_id, request.progress_percent
        );
        Ok(session)
    }

    pub async fn item_sessions(
        &self,
        tenant: &TenantContext,
        item_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TreatmentSession>, PlanError> {
        let filters = format!(
            "item_id=eq.{}&{}&order=performed_at.asc",
            item_id,
            tenant.filter()
        );
        self.supabase
            .select("treatment_sessions", &filters, auth_token)
            .await
            .map_err(|e| PlanError::DatabaseError(e.to_string()))
    }
}
