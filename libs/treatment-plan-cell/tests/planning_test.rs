// Treatment-plan workflow against a mocked PostgREST backend.

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_models::tenant::TenantContext;
use shared_utils::test_utils::TestConfig;
use treatment_plan_cell::models::{
    AcceptanceStatus, AcceptPlanRequest, NewItemRequest, PlanError, RecordSessionRequest,
};
use treatment_plan_cell::services::planning::TreatmentPlanningService;
use treatment_plan_cell::services::progress::TreatmentProgressService;

fn plan_row(
    id: Uuid,
    tenant_id: Uuid,
    approval: &str,
    treatment: &str,
    acceptance: &str,
    valid_until: Option<chrono::DateTime<Utc>>,
    is_editable: bool,
) -> serde_json::Value {
    json!({
        "id": id,
        "tenant_id": tenant_id,
        "patient_id": Uuid::new_v4(),
        "dentist_id": Uuid::new_v4(),
        "appointment_id": null,
        "approval_status": approval,
        "treatment_status": treatment,
        "acceptance_status": acceptance,
        "valid_until": valid_until,
        "is_editable": is_editable,
        "approved_by": null,
        "approved_at": null,
        "accepted_at": null,
        "discount": "0.00",
        "subtotal": "300.00",
        "total": "300.00",
        "overall_progress": 0.0,
        "created_at": "2025-03-01T12:00:00Z",
        "updated_at": "2025-03-01T12:00:00Z",
    })
}

fn item_row(
    id: Uuid,
    tenant_id: Uuid,
    plan_id: Uuid,
    status: &str,
    progress: i32,
) -> serde_json::Value {
    json!({
        "id": id,
        "tenant_id": tenant_id,
        "plan_id": plan_id,
        "procedure_code": "D2740",
        "description": "Crown, porcelain",
        "status": status,
        "final_cost": "150.00",
        "order_index": 0,
        "executed_by": if status == "Completado" { Some(Uuid::new_v4()) } else { None },
        "executed_at": if status == "Completado" { Some("2025-03-15T10:00:00Z") } else { None },
        "progress_percent": progress,
    })
}

#[tokio::test]
async fn approved_plans_stop_taking_new_items() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentPlanningService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .and(query_param("id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "Propuesto",
            "Pendiente",
            None,
            false,
        )])))
        .mount(&mock_server)
        .await;

    let result = service
        .add_item(
            &tenant,
            plan_id,
            NewItemRequest {
                procedure_code: "D1110".to_string(),
                description: None,
                final_cost: rust_decimal::Decimal::new(9000, 2),
                order_index: None,
            },
            "test-token",
        )
        .await;

    assert!(matches!(result, Err(PlanError::PlanNotEditable)));
}

#[tokio::test]
async fn approval_freezes_the_draft_and_stamps_the_approver() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentPlanningService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let approver = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Borrador",
            "Propuesto",
            "Pendiente",
            None,
            true,
        )])))
        .mount(&mock_server)
        .await;

    let mut approved = plan_row(
        plan_id,
        tenant.tenant_id,
        "Aprobado",
        "Propuesto",
        "Pendiente",
        None,
        false,
    );
    approved["approved_by"] = json!(approver);
    approved["approved_at"] = json!(Utc::now());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plans"))
        .and(body_partial_json(json!({
            "approval_status": "Aprobado",
            "is_editable": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([approved])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let plan = service
        .approve_plan(&tenant, plan_id, approver, "test-token")
        .await
        .expect("approval should apply");

    assert!(!plan.is_editable);
    assert_eq!(plan.approved_by, Some(approver));
}

#[tokio::test]
async fn acceptance_after_the_vigency_date_lapses_the_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentPlanningService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let deadline = Utc::now() - Duration::days(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "Propuesto",
            "Pendiente",
            Some(deadline),
            false,
        )])))
        .mount(&mock_server)
        .await;

    // The failed attempt must still mark the plan as lapsed
    let mut lapsed = plan_row(
        plan_id,
        tenant.tenant_id,
        "Aprobado",
        "Propuesto",
        "Caducado",
        Some(deadline),
        false,
    );
    lapsed["acceptance_status"] = json!("Caducado");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plans"))
        .and(body_partial_json(json!({ "acceptance_status": "Caducado" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([lapsed])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = service
        .record_acceptance(
            &tenant,
            plan_id,
            AcceptPlanRequest { item_ids: None },
            "test-token",
        )
        .await;

    assert!(matches!(result, Err(PlanError::AcceptanceWindowClosed(_))));
}

#[tokio::test]
async fn partial_acceptance_activates_only_the_chosen_items() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentPlanningService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let chosen = Uuid::new_v4();
    let declined = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "Propuesto",
            "Pendiente",
            Some(Utc::now() + Duration::days(30)),
            false,
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plan_items"))
        .and(query_param("plan_id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            item_row(chosen, tenant.tenant_id, plan_id, "Pendiente", 0),
            item_row(declined, tenant.tenant_id, plan_id, "Pendiente", 0),
        ])))
        .mount(&mock_server)
        .await;

    // Exactly one item activation is expected: the chosen one
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plan_items"))
        .and(query_param("id", format!("eq.{}", chosen)))
        .and(body_partial_json(json!({ "status": "Activo" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_row(
            chosen,
            tenant.tenant_id,
            plan_id,
            "Activo",
            0,
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let partial = plan_row(
        plan_id,
        tenant.tenant_id,
        "Aprobado",
        "Aceptado",
        "Parcial",
        Some(Utc::now() + Duration::days(30)),
        false,
    );

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plans"))
        .and(body_partial_json(json!({
            "acceptance_status": "Parcial",
            "treatment_status": "Aceptado",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([partial])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let plan = service
        .record_acceptance(
            &tenant,
            plan_id,
            AcceptPlanRequest {
                item_ids: Some(vec![chosen]),
            },
            "test-token",
        )
        .await
        .expect("partial acceptance should apply");

    assert_eq!(plan.acceptance_status, AcceptanceStatus::Partial);
}

#[tokio::test]
async fn executing_the_last_item_auto_completes_the_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentPlanningService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let item_id = Uuid::new_v4();
    let dentist = Uuid::new_v4();

    // Item lookup by id: still active before execution
    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plan_items"))
        .and(query_param("id", format!("eq.{}", item_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_row(
            item_id,
            tenant.tenant_id,
            plan_id,
            "Activo",
            80,
        )])))
        .mount(&mock_server)
        .await;

    // Item listing by plan: reflects the post-write state, everything done
    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plan_items"))
        .and(query_param("plan_id", format!("eq.{}", plan_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            item_row(item_id, tenant.tenant_id, plan_id, "Completado", 100),
            item_row(Uuid::new_v4(), tenant.tenant_id, plan_id, "Completado", 100),
            item_row(Uuid::new_v4(), tenant.tenant_id, plan_id, "Cancelado", 0),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "En Ejecución",
            "Aceptado",
            None,
            false,
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plan_items"))
        .and(body_partial_json(json!({ "status": "Completado" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_row(
            item_id,
            tenant.tenant_id,
            plan_id,
            "Completado",
            100,
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    // The cascade: a PATCH flipping the plan to Completado must be issued
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plans"))
        .and(body_partial_json(json!({ "treatment_status": "Completado" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "Completado",
            "Aceptado",
            None,
            false,
        )])))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Totals recompute write
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "En Ejecución",
            "Aceptado",
            None,
            false,
        )])))
        .mount(&mock_server)
        .await;

    let item = service
        .record_item_execution(&tenant, item_id, dentist, "test-token")
        .await
        .expect("execution should apply");

    assert_eq!(item.progress_percent, 100);
    // The expect(1) on the Completado PATCH verifies the cascade on drop
}

#[tokio::test]
async fn pending_items_cannot_be_executed() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentPlanningService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let item_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plan_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_row(
            item_id,
            tenant.tenant_id,
            plan_id,
            "Pendiente",
            0,
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "En Ejecución",
            "Parcial",
            None,
            false,
        )])))
        .mount(&mock_server)
        .await;

    let result = service
        .record_item_execution(&tenant, item_id, Uuid::new_v4(), "test-token")
        .await;

    assert!(matches!(
        result,
        Err(PlanError::InvalidItemTransition(
            treatment_plan_cell::models::ItemStatus::Pending
        ))
    ));
}

#[tokio::test]
async fn session_progress_never_regresses() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = TreatmentProgressService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let item_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plan_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_row(
            item_id,
            tenant.tenant_id,
            plan_id,
            "Activo",
            60,
        )])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/treatment_plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([plan_row(
            plan_id,
            tenant.tenant_id,
            "Aprobado",
            "En Ejecución",
            "Aceptado",
            None,
            false,
        )])))
        .mount(&mock_server)
        .await;

    let result = service
        .record_session(
            &tenant,
            item_id,
            RecordSessionRequest {
                appointment_id: None,
                progress_percent: 40,
                notes: None,
            },
            Uuid::new_v4(),
            "test-token",
        )
        .await;

    assert!(matches!(
        result,
        Err(PlanError::ProgressRegression {
            current: 60,
            attempted: 40
        })
    ));
}
