// Payment ledger workflow against a mocked PostgREST backend.

use rust_decimal::Decimal;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use serde_json::json;

use billing_cell::models::{
    BillingError, CreatePaymentRequest, PaymentMethod, PaymentStatus,
};
use billing_cell::services::ledger::PaymentLedgerService;
use shared_models::tenant::TenantContext;
use shared_utils::test_utils::TestConfig;

fn stored_payment(tenant_id: Uuid, plan_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "tenant_id": tenant_id,
        "plan_id": plan_id,
        "appointment_id": null,
        "status": status,
        "amount": "120.00",
        "method": "en_linea",
        "reference": "ch_12345",
        "created_at": "2025-03-10T09:00:00Z",
        "processed_at": null,
    })
}

#[tokio::test]
async fn create_payment_persists_ledger_row() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = PaymentLedgerService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([stored_payment(tenant.tenant_id, plan_id, "pendiente")])),
        )
        .mount(&mock_server)
        .await;

    let payment = service
        .create_payment(
            &tenant,
            CreatePaymentRequest {
                plan_id: Some(plan_id),
                appointment_id: None,
                amount: Decimal::new(12000, 2),
                method: PaymentMethod::Online,
                reference: Some("ch_12345".to_string()),
                allocations: None,
            },
            "test-token",
        )
        .await
        .expect("payment should be recorded");

    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Decimal::new(12000, 2));
}

#[tokio::test]
async fn create_payment_rejects_double_scope() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = PaymentLedgerService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());

    let result = service
        .create_payment(
            &tenant,
            CreatePaymentRequest {
                plan_id: Some(Uuid::new_v4()),
                appointment_id: Some(Uuid::new_v4()),
                amount: Decimal::new(1000, 2),
                method: PaymentMethod::Cash,
                reference: None,
                allocations: None,
            },
            "test-token",
        )
        .await;

    assert!(matches!(result, Err(BillingError::InvalidScope)));
}

#[tokio::test]
async fn approving_a_pending_payment_stamps_processed_at() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = PaymentLedgerService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let payment_id = Uuid::new_v4();

    let mut pending = stored_payment(tenant.tenant_id, plan_id, "pendiente");
    pending["id"] = json!(payment_id);
    let mut approved = stored_payment(tenant.tenant_id, plan_id, "aprobado");
    approved["id"] = json!(payment_id);
    approved["processed_at"] = json!("2025-03-10T09:05:00Z");

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("id", format!("eq.{}", payment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pending])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .and(query_param("id", format!("eq.{}", payment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([approved])))
        .mount(&mock_server)
        .await;

    let payment = service
        .transition_payment(&tenant, payment_id, PaymentStatus::Approved, "test-token")
        .await
        .expect("approval should apply");

    assert_eq!(payment.status, PaymentStatus::Approved);
    assert!(payment.processed_at.is_some());
}

#[tokio::test]
async fn refund_of_unapproved_payment_is_rejected_without_a_write() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let service = PaymentLedgerService::new(&config);

    let tenant = TenantContext::new(Uuid::new_v4());
    let plan_id = Uuid::new_v4();
    let payment_id = Uuid::new_v4();

    let mut pending = stored_payment(tenant.tenant_id, plan_id, "pendiente");
    pending["id"] = json!(payment_id);

    // Only the read is mocked; a PATCH would fail the test with a 404 from
    // the mock server.
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pending])))
        .mount(&mock_server)
        .await;

    let result = service
        .transition_payment(&tenant, payment_id, PaymentStatus::Refunded, "test-token")
        .await;

    assert!(matches!(
        result,
        Err(BillingError::InvalidStatusTransition(PaymentStatus::Pending))
    ));
}
