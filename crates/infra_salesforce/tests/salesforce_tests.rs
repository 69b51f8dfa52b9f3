//! Transport tests against a mocked Salesforce org

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use core_kernel::{DatatypeRegistry, DeleteOutcome, PortError, Record, RecordKey};
use domain_sync::{
    ApiMethod, CredentialDefaults, CrmConnector, CrmPort, Credentials, ExtractFilters,
    SessionManager, SyncService, ValueSetAliases,
};
use infra_salesforce::{SalesforceConfig, SalesforceConnector};
use test_utils::*;

const DATA_ROOT: &str = "/services/data/v52.0";
const SESSION_ID: &str = "00D000000000001!SESSION";

fn login_success(server: &MockServer) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns="urn:partner.soap.sforce.com">
  <soapenv:Body><loginResponse><result>
    <serverUrl>{}/services/Soap/u/52.0/00D000000000001</serverUrl>
    <sessionId>{}</sessionId>
  </result></loginResponse></soapenv:Body>
</soapenv:Envelope>"#,
        server.uri(),
        SESSION_ID
    )
}

const LOGIN_FAULT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body><soapenv:Fault>
    <faultcode>sf:INVALID_LOGIN</faultcode>
    <faultstring>INVALID_LOGIN: Invalid username, password, security token; or user locked out.</faultstring>
  </soapenv:Fault></soapenv:Body>
</soapenv:Envelope>"#;

fn config_for(server: &MockServer) -> SalesforceConfig {
    SalesforceConfig::default()
        .with_login_url(server.uri())
        .with_bulk_polling(Duration::from_millis(10), Duration::from_secs(5))
}

fn credentials() -> Credentials {
    Credentials::new("integration@example.com", "secret", "TOKEN")
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/52.0"))
        .and(header("SOAPAction", "login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_success(server)))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> Arc<dyn CrmPort> {
    mount_login(server).await;
    SalesforceConnector::new(config_for(server))
        .unwrap()
        .connect(&credentials())
        .await
        .unwrap()
}

// ── Login ───────────────────────────────────────────────────────

#[tokio::test]
async fn login_fault_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/52.0"))
        .respond_with(ResponseTemplate::new(500).set_body_string(LOGIN_FAULT))
        .mount(&server)
        .await;

    let connector = SalesforceConnector::new(config_for(&server)).unwrap();
    let result = connector.connect(&credentials()).await;
    match result {
        Err(PortError::Unauthorized { message }) => assert!(message.starts_with("INVALID_LOGIN")),
        Err(other) => panic!("expected Unauthorized, got {:?}", other),
        Ok(_) => panic!("expected Unauthorized, got a client"),
    }
}

#[tokio::test]
async fn requests_carry_the_session_as_bearer_token() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects/Account/describe", DATA_ROOT)))
        .and(header("Authorization", format!("Bearer {}", SESSION_ID).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(SchemaFixtures::account_describe()))
        .mount(&server)
        .await;

    let fields = client.describe("Account").await.unwrap();
    assert_eq!(fields, SchemaFixtures::account());
}

// ── Describe and query ──────────────────────────────────────────

#[tokio::test]
async fn describe_of_unknown_object_is_not_found() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects/Nope__c/describe", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!([
            {"errorCode": "NOT_FOUND", "message": "The requested resource does not exist"}
        ])))
        .mount(&server)
        .await;

    let error = client.describe("Nope__c").await.unwrap_err();
    assert!(matches!(error, PortError::NotFound { .. }));
}

#[tokio::test]
async fn query_follows_next_records_url() {
    let server = MockServer::start().await;
    let client = connect(&server).await;
    let query = ExtractFilters::default()
        .to_query("Account", &SchemaFixtures::account())
        .unwrap();

    Mock::given(method("GET"))
        .and(path(format!("{}/queryAll", DATA_ROOT)))
        .and(query_param("q", query.to_soql().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2,
            "done": false,
            "records": [{"attributes": {"type": "Account"}, "Id": "001"}],
            "nextRecordsUrl": format!("{}/query/01g000000000001-1", DATA_ROOT),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query/01g000000000001-1", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 2,
            "done": true,
            "records": [{"attributes": {"type": "Account"}, "Id": "002"}],
        })))
        .mount(&server)
        .await;

    let first = client.query(&query).await.unwrap();
    assert_eq!(first.total_size, Some(2));
    assert_eq!(first.records[0].get_str("Id"), Some("001"));

    let second = client.query_more(first.next.as_deref().unwrap()).await.unwrap();
    assert!(second.is_last());
    assert_eq!(second.records[0].get_str("Id"), Some("002"));
}

#[tokio::test]
async fn incremental_condition_is_sent_as_soql() {
    let server = MockServer::start().await;
    let client = connect(&server).await;
    let query = ExtractFilters::default()
        .since("2023-01-02T00:00:00.250Z")
        .condition("Name = 'Globex'")
        .to_query("Account", &SchemaFixtures::account())
        .unwrap();
    let fields = SchemaFixtures::account()
        .into_iter()
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ");
    let expected = format!(
        "SELECT {} FROM Account WHERE SystemModstamp > 2023-01-02T00:00:00Z \
         AND (Name = 'Globex') ORDER BY SystemModstamp",
        fields
    );

    Mock::given(method("GET"))
        .and(path(format!("{}/queryAll", DATA_ROOT)))
        .and(query_param("q", expected.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 1,
            "done": true,
            "records": [{"attributes": {"type": "Account"}, "Id": "002", "Name": "Globex"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client.query(&query).await.unwrap();
    assert!(page.is_last());
    assert_eq!(page.records[0].get_str("Name"), Some("Globex"));
}

#[tokio::test]
async fn malformed_query_relays_crm_error_body() {
    let server = MockServer::start().await;
    let client = connect(&server).await;
    let query = ExtractFilters::default()
        .condition("Name = ")
        .to_query("Account", &SchemaFixtures::account())
        .unwrap();

    let body = json!([{"errorCode": "MALFORMED_QUERY", "message": "unexpected token"}]);
    Mock::given(method("GET"))
        .and(path(format!("{}/queryAll", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(400).set_body_json(body.clone()))
        .mount(&server)
        .await;

    match client.query(&query).await {
        Err(PortError::Crm(failure)) => {
            assert_eq!(failure.status, 400);
            assert_eq!(failure.content, body);
            assert!(failure.url.contains("/queryAll"));
        }
        other => panic!("expected a CRM failure, got {:?}", other),
    }
}

// ── Keyed reads and writes ──────────────────────────────────────

#[tokio::test]
async fn get_missing_record_is_not_found() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects/Account/External__c/E404", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!([{"errorCode": "NOT_FOUND"}])))
        .mount(&server)
        .await;

    let error = client
        .get("Account", &RecordKey::external("External__c", "E404"))
        .await
        .unwrap_err();
    assert!(matches!(error, PortError::NotFound { .. }));
}

#[tokio::test]
async fn upsert_patches_external_key_url() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/sobjects/Account/External__c/E1", DATA_ROOT)))
        .and(body_json(json!({"Name": "Acme"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "0010000000000001", "success": true, "errors": [], "created": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .upsert(
            "Account",
            &RecordKey::external("External__c", "E1"),
            &Record::new().with("Name", "Acme"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_reports_absent_records() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("DELETE"))
        .and(path(format!("{}/sobjects/Account/0010000000000001", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/sobjects/Account/0010000000000404", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!([{"errorCode": "NOT_FOUND"}])))
        .mount(&server)
        .await;

    let deleted = client
        .delete("Account", &RecordKey::id("0010000000000001"))
        .await
        .unwrap();
    let absent = client
        .delete("Account", &RecordKey::id("0010000000000404"))
        .await
        .unwrap();
    assert_eq!(deleted, DeleteOutcome::Deleted);
    assert_eq!(absent, DeleteOutcome::NotFound);
}

// ── Bulk ────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_upsert_runs_a_job_to_completion() {
    let server = MockServer::start().await;
    let client = connect(&server).await;
    let rows = keyed_batch("External__c", "E", 2);

    Mock::given(method("POST"))
        .and(path("/services/async/52.0/job"))
        .and(header("X-SFDC-Session", SESSION_ID))
        .and(body_json(json!({
            "operation": "upsert",
            "object": "Account",
            "contentType": "JSON",
            "concurrencyMode": "Serial",
            "externalIdFieldName": "External__c",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "750J", "state": "Open"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/async/52.0/job/750J/batch"))
        .and(body_json(serde_json::to_value(&rows).unwrap()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "751B", "state": "Queued"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/async/52.0/job/750J"))
        .and(body_json(json!({"state": "Closed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "750J", "state": "Closed"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/async/52.0/job/750J/batch/751B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "751B", "state": "Completed"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/async/52.0/job/750J/batch/751B/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "0010000000000001", "success": true, "created": true, "errors": []},
            {"id": null, "success": false, "created": false, "errors": [{"message": "bad"}]},
        ])))
        .mount(&server)
        .await;

    let results = client.bulk_upsert("Account", "External__c", &rows).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].success && results[0].created);
    assert!(!results[1].success);
    assert_eq!(results[1].errors, vec![json!({"message": "bad"})]);
}

#[tokio::test]
async fn failed_bulk_batch_is_a_crm_error() {
    let server = MockServer::start().await;
    let client = connect(&server).await;
    let rows = vec![Record::new().with("Id", "0010000000000001")];

    Mock::given(method("POST"))
        .and(path("/services/async/52.0/job"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "750J"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/async/52.0/job/750J/batch"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "751B", "state": "Queued"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/async/52.0/job/750J"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "750J"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/async/52.0/job/750J/batch/751B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "751B",
            "state": "Failed",
            "stateMessage": "InvalidBatch : Field name not found"
        })))
        .mount(&server)
        .await;

    match client.bulk_delete("Account", &rows).await {
        Err(PortError::Crm(failure)) => {
            assert_eq!(failure.resource_name, "Account");
            assert_eq!(failure.content["stateMessage"], "InvalidBatch : Field name not found");
        }
        other => panic!("expected a CRM failure, got {:?}", other),
    }
}

// ── Passthrough ─────────────────────────────────────────────────

#[tokio::test]
async fn tooling_and_rest_passthrough() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/tooling/sobjects/GlobalValueSet/0Nt000000000001", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "0Nt000000000001",
            "Metadata": {"customValue": [{"valueName": "Red"}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/tooling/sobjects/GlobalValueSet/0Nt000000000001", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/limits", DATA_ROOT)))
        .and(query_param("scope", "daily"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"DailyApiRequests": {"Max": 15000}})))
        .mount(&server)
        .await;

    let value_set = client
        .tooling(ApiMethod::Get, "sobjects/GlobalValueSet/0Nt000000000001", None)
        .await
        .unwrap();
    assert_eq!(value_set["Metadata"]["customValue"][0]["valueName"], "Red");

    let patched = client
        .tooling(
            ApiMethod::Patch,
            "sobjects/GlobalValueSet/0Nt000000000001",
            Some(&json!({"Metadata": {}})),
        )
        .await
        .unwrap();
    assert_eq!(patched, Value::Null);

    let limits = client
        .rest(
            ApiMethod::Get,
            "limits",
            &[("scope".to_string(), "daily".to_string())],
            None,
        )
        .await
        .unwrap();
    assert_eq!(limits["DailyApiRequests"]["Max"], 15000);
}

// ── End to end ──────────────────────────────────────────────────

#[tokio::test]
async fn extraction_through_the_service_normalizes_records() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sobjects/Account/describe", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(SchemaFixtures::account_describe()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/queryAll", DATA_ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 1,
            "done": true,
            "records": [RecordFixtures::account(
                "0010000000000002", "E2", "Globex", "2023-01-02T08:30:00.000+0000"
            )],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = SalesforceConnector::new(config_for(&server)).unwrap();
    let sessions = SessionManager::new(
        Arc::new(connector),
        CredentialDefaults {
            environment: Some(credentials()),
            ..Default::default()
        },
        chrono::Duration::minutes(45),
    );
    let service = SyncService::new(sessions, DatatypeRegistry::new(0), ValueSetAliases::default());

    let stream = service
        .extract(
            None,
            "Account",
            &ExtractFilters::default().since(TemporalFixtures::watermark_param()),
            None,
        )
        .await
        .unwrap();
    let records: Vec<Record> = stream.try_collect().await.unwrap();

    assert_eq!(records.len(), 1);
    assert_normalized(&records[0]);
    assert_eq!(records[0]["_updated"], "2023-01-02T08:30:00Z");
}
