//! HTTP surface tests against the in-memory CRM

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use core_kernel::{DatatypeConfig, DatatypeRegistry, Record};
use domain_sync::{
    CredentialDefaults, CrmCall, Credentials, MockConnector, MockCrmPort, SessionManager,
    SyncService, ValueSetAliases,
};
use interface_api::config::ConnectorConfig;
use interface_api::create_router;
use test_utils::*;

struct Harness {
    server: TestServer,
    connector: Arc<MockConnector>,
}

impl Harness {
    fn port(&self) -> &Arc<MockCrmPort> {
        self.connector.port()
    }
}

fn account_port() -> MockCrmPort {
    MockCrmPort::new()
        .with_schema("Account", SchemaFixtures::account())
        .with_records("Account", RecordFixtures::accounts())
}

fn env_defaults() -> CredentialDefaults {
    CredentialDefaults {
        environment: Some(Credentials::new("env@example.com", "pw", "tok")),
        ..Default::default()
    }
}

fn harness_with(
    port: MockCrmPort,
    defaults: CredentialDefaults,
    registry: DatatypeRegistry,
    aliases: ValueSetAliases,
) -> Harness {
    let connector = Arc::new(MockConnector::new(Arc::new(port)).rejecting("intruder@example.com"));
    let sessions = SessionManager::new(connector.clone(), defaults, chrono::Duration::minutes(45));
    let sync = Arc::new(SyncService::new(sessions, registry, aliases));
    let server = TestServer::new(create_router(sync, ConnectorConfig::default()))
        .expect("Failed to create test server");
    Harness { server, connector }
}

fn harness(port: MockCrmPort) -> Harness {
    harness_with(
        port,
        env_defaults(),
        DatatypeRegistry::new(0),
        ValueSetAliases::default(),
    )
}

fn basic_auth(username: &str, password: &str) -> (HeaderName, HeaderValue) {
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    (
        "Authorization".parse().unwrap(),
        format!("Basic {}", encoded).parse().unwrap(),
    )
}

fn records_of(body: Vec<Value>) -> Vec<Record> {
    body.into_iter()
        .map(|v| Record::from_value(v).expect("feed items are objects"))
        .collect()
}

mod health_and_auth {
    use super::*;

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let h = harness_with(
            account_port(),
            CredentialDefaults::default(),
            DatatypeRegistry::new(0),
            ValueSetAliases::default(),
        );

        let response = h.server.get("/health").await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["session_active"], false);
        assert_eq!(body["default_credentials"], false);
        assert_eq!(h.connector.logins(), 0);
    }

    #[tokio::test]
    async fn health_reports_an_established_session() {
        let h = harness(account_port());

        h.server.get("/Account").await.assert_status_ok();
        let body = h.server.get("/health").await.json::<Value>();

        assert_eq!(body["session_active"], true);
        assert_eq!(body["default_credentials"], true);
    }

    #[tokio::test]
    async fn missing_credentials_get_a_basic_challenge() {
        let h = harness_with(
            account_port(),
            CredentialDefaults::default(),
            DatatypeRegistry::new(0),
            ValueSetAliases::default(),
        );

        let response = h.server.get("/Account").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.header("www-authenticate"),
            r#"Basic realm="Login Required""#
        );
        assert_eq!(h.connector.logins(), 0);
    }

    #[tokio::test]
    async fn basic_auth_credentials_log_in() {
        let h = harness_with(
            account_port(),
            CredentialDefaults::default(),
            DatatypeRegistry::new(0),
            ValueSetAliases::default(),
        );
        let (name, value) = basic_auth("TOKEN\\ops@example.com", "secret");

        let response = h.server.get("/Account").add_header(name, value).await;

        response.assert_status_ok();
        assert_eq!(h.connector.logins(), 1);
    }

    #[tokio::test]
    async fn rejected_login_is_unauthorized() {
        let h = harness_with(
            account_port(),
            CredentialDefaults::default(),
            DatatypeRegistry::new(0),
            ValueSetAliases::default(),
        );
        let (name, value) = basic_auth("TOKEN\\intruder@example.com", "guess");

        let response = h.server.get("/Account").add_header(name, value).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn username_without_token_is_unauthorized() {
        let h = harness(account_port());
        let (name, value) = basic_auth("ops@example.com", "secret");

        let response = h.server.get("/Account").add_header(name, value).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let h = harness(account_port());

        let response = h.server.get("/Account").await;

        response.assert_status_ok();
        let request_id = response.header("x-request-id");
        assert_eq!(request_id.to_str().unwrap().len(), 36);
    }
}

mod feeds {
    use super::*;

    #[tokio::test]
    async fn collection_read_streams_every_record() {
        let h = harness(account_port());

        let response = h.server.get("/Account").await;

        response.assert_status_ok();
        let records = records_of(response.json());
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_normalized(record);
            assert_eq!(record["_deleted"], false);
        }
        assert_eq!(records[0]["_id"], "0010000000000001");
    }

    #[tokio::test]
    async fn since_returns_strictly_newer_records_in_order() {
        let h = harness(account_port());

        let response = h
            .server
            .get("/Account")
            .add_query_param("since", TemporalFixtures::watermark_param())
            .await;

        response.assert_status_ok();
        let records = records_of(response.json());
        assert_eq!(records.len(), 2);
        assert_updated_after_ascending(&records, TemporalFixtures::watermark_param());
    }

    #[tokio::test]
    async fn where_condition_reaches_the_query() {
        let h = harness(account_port());

        let response = h
            .server
            .get("/Account")
            .add_query_param("where", "Name = 'Globex'")
            .await;

        response.assert_status_ok();
        let records = records_of(response.json());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["_id"], "0010000000000002");
        let filtered = h
            .port()
            .count_calls(|c| matches!(c, CrmCall::Query(q) if q.contains("WHERE (Name = 'Globex')")))
            .await;
        assert_eq!(filtered, 1);
    }

    #[tokio::test]
    async fn empty_feed_is_an_empty_array() {
        let h = harness(MockCrmPort::new().with_schema("Contact", SchemaFixtures::account()));

        let response = h.server.get("/Contact").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!([]));
    }

    #[tokio::test]
    async fn multi_page_feeds_are_joined() {
        let h = harness(account_port().with_page_size(1));

        let response = h.server.get("/Account").await;

        assert_eq!(records_of(response.json()).len(), 3);
        let pages = h
            .port()
            .count_calls(|c| matches!(c, CrmCall::QueryMore(_)))
            .await;
        assert_eq!(pages, 2);
    }

    #[tokio::test]
    async fn invalid_since_is_a_plain_text_error() {
        let h = harness(account_port());

        let response = h
            .server
            .get("/Account")
            .add_query_param("since", "yesterday-ish")
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().contains("yesterday-ish"));
    }

    #[tokio::test]
    async fn unknown_datatype_is_not_found() {
        let h = harness(account_port());

        h.server.get("/Nope__c").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn single_record_by_id_is_an_object() {
        let h = harness(account_port());

        let response = h.server.get("/Account/0010000000000002").await;

        response.assert_status_ok();
        let record = response.json::<Value>();
        assert_eq!(record["_id"], "0010000000000002");
        assert_eq!(record["Name"], "Globex");
    }

    #[tokio::test]
    async fn single_record_by_external_id() {
        let h = harness(account_port());

        let response = h.server.get("/Account/External__c/E3").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["_id"], "0010000000000003");
    }

    #[tokio::test]
    async fn missing_single_record_is_not_found() {
        let h = harness(account_port());

        h.server
            .get("/Account/0010000000000404")
            .await
            .assert_status_not_found();
    }
}

mod writes {
    use super::*;

    #[tokio::test]
    async fn post_upserts_an_array() {
        let h = harness_with(
            account_port(),
            env_defaults(),
            DatatypeRegistry::new(0)
                .with_datatype("Account", DatatypeConfig::with_key_fields(["External__c"])),
            ValueSetAliases::default(),
        );

        let response = h
            .server
            .post("/Account")
            .json(&json!([
                {"External__c": "E1", "Name": "Acme Renamed"},
                {"External__c": "E7", "Name": "Hooli"},
            ]))
            .await;

        response.assert_status_ok();
        let summary = response.json::<Value>();
        assert_eq!(summary["upserted"], 2);
        assert_eq!(summary["bulk"], false);

        let stored = h.port().stored("Account").await;
        assert_eq!(stored.len(), 4);
        assert!(stored
            .iter()
            .any(|r| r.get_str("Name") == Some("Acme Renamed")));
    }

    #[tokio::test]
    async fn delete_method_deletes_the_addressed_record() {
        let h = harness(account_port());

        let response = h
            .server
            .delete("/Account/0010000000000001")
            .json(&json!({}))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["deleted"], 1);
        assert_eq!(h.port().stored("Account").await.len(), 2);
    }

    #[tokio::test]
    async fn flagged_deletes_skip_missing_records() {
        let h = harness(account_port());

        let response = h
            .server
            .post("/Account")
            .json(&json!([
                RecordBuilder::with_id("0010000000000404").deleted().build(),
                RecordBuilder::with_id("0010000000000002").deleted().build(),
            ]))
            .await;

        response.assert_status_ok();
        let summary = response.json::<Value>();
        assert_eq!(summary["already_absent"], 1);
        assert_eq!(summary["deleted"], 1);
        let upserts = h
            .port()
            .count_calls(|c| matches!(c, CrmCall::Upsert { .. }))
            .await;
        assert_eq!(upserts, 0);
    }

    #[tokio::test]
    async fn crm_rejection_is_relayed_with_its_status() {
        let h = harness(account_port().with_failing_key("External__c/BAD"));

        let response = h
            .server
            .put("/Account/External__c/BAD")
            .json(&json!({"Name": "Rejected"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["resource_name"], "Account");
        assert_eq!(body["content"][0]["errorCode"], "FIELD_CUSTOM_VALIDATION_EXCEPTION");
        assert!(body["url"].as_str().unwrap().contains("External__c/BAD"));
    }

    #[tokio::test]
    async fn large_writes_switch_to_bulk() {
        let h = harness_with(
            account_port(),
            env_defaults(),
            DatatypeRegistry::new(2)
                .with_datatype("Account", DatatypeConfig::with_key_fields(["External__c"])),
            ValueSetAliases::default(),
        );

        let response = h
            .server
            .post("/Account")
            .json(&keyed_batch("External__c", "B", 3))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["bulk"], true);
        let bulk_calls = h
            .port()
            .count_calls(|c| matches!(c, CrmCall::BulkUpsert { .. }))
            .await;
        assert_eq!(bulk_calls, 1);
    }

    #[tokio::test]
    async fn scalar_payload_is_rejected() {
        let h = harness(account_port());

        let response = h.server.post("/Account").json(&json!(42)).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.connector.logins(), 0);
    }
}

mod value_sets {
    use super::*;

    const GLOBAL: &str = "/GlobalValueSet/0Nt000000000001";
    const CUSTOM: &str = "/CustomField/00N000000000001";

    fn tooling_port() -> MockCrmPort {
        MockCrmPort::new()
            .with_tooling_object(
                format!("sobjects{}", GLOBAL),
                json!({
                    "Id": "0Nt000000000001",
                    "DeveloperName": "Colors",
                    "Metadata": {"customValue": [{"valueName": "Red"}]}
                }),
            )
            .with_tooling_object(
                format!("sobjects{}", CUSTOM),
                json!({
                    "Id": "00N000000000001",
                    "FullName": "Account.Size__c",
                    "Metadata": {
                        "valueSet": {
                            "valueSetDefinition": {"value": [{"valueName": "S"}]},
                            "valueSettings": null
                        }
                    }
                }),
            )
    }

    fn value_set_harness() -> Harness {
        harness_with(
            tooling_port(),
            env_defaults(),
            DatatypeRegistry::new(0),
            ValueSetAliases::new([("colors", GLOBAL), ("sizes", CUSTOM)]),
        )
    }

    #[tokio::test]
    async fn global_value_set_is_refined_to_its_values() {
        let h = value_set_harness();

        let response = h.server.get("/ValueSet/GlobalValueSet/0Nt000000000001").await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!([{"path": GLOBAL, "_id": GLOBAL, "data": [{"valueName": "Red"}]}])
        );
    }

    #[tokio::test]
    async fn refinement_can_be_disabled() {
        let h = value_set_harness();

        let response = h
            .server
            .get("/ValueSet/CustomField/00N000000000001")
            .add_query_param("do_refine", "false")
            .await;

        response.assert_status_ok();
        let items = response.json::<Value>();
        assert_eq!(items[0]["data"]["FullName"], "Account.Size__c");
    }

    #[tokio::test]
    async fn all_configured_value_sets_are_listed() {
        let h = value_set_harness();

        let response = h.server.get("/ValueSet").await;

        response.assert_status_ok();
        let items = response.json::<Vec<Value>>();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["data"], json!([{"valueName": "S"}]));
    }

    #[tokio::test]
    async fn unknown_alias_is_rejected() {
        let h = value_set_harness();

        let response = h.server.get("/ValueSet/SesamAlias/shapes").await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().contains("shapes"));
    }

    #[tokio::test]
    async fn alias_update_splices_values_and_strips_read_only_fields() {
        let h = value_set_harness();

        let response = h
            .server
            .post("/ValueSet/SesamAlias/colors")
            .json(&json!({"data": [{"valueName": "Blue"}]}))
            .await;

        response.assert_status_ok();
        let stored = h
            .port()
            .tooling_object(&format!("sobjects{}", GLOBAL))
            .await
            .unwrap();
        assert_eq!(stored["Metadata"]["customValue"], json!([{"valueName": "Blue"}]));
        assert!(stored.get("Id").is_none());
        assert!(stored.get("DeveloperName").is_none());
    }

    #[tokio::test]
    async fn bulk_update_reads_paths_from_the_body() {
        let h = value_set_harness();

        let response = h
            .server
            .post("/ValueSet")
            .json(&json!([{"path": CUSTOM, "data": [{"valueName": "M"}]}]))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["updated"], 1);
        let stored = h
            .port()
            .tooling_object(&format!("sobjects{}", CUSTOM))
            .await
            .unwrap();
        assert_eq!(
            stored,
            json!({
                "Metadata": {
                    "valueSet": {
                        "valueSetDefinition": {"value": [{"valueName": "M"}]},
                        "valueSettings": []
                    }
                }
            })
        );
    }
}

mod passthrough {
    use super::*;

    #[tokio::test]
    async fn tooling_get_is_normalized() {
        let h = harness(MockCrmPort::new().with_tooling_object(
            "sobjects/ApexClass/01p000000000001",
            json!({"Id": "01p000000000001", "Name": "Greeter"}),
        ));

        let response = h.server.get("/sf/tooling/sobjects/ApexClass/01p000000000001").await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["_id"], "01p000000000001");
        assert_eq!(body["Name"], "Greeter");
    }

    #[tokio::test]
    async fn rest_forwards_method_params_and_body() {
        let h = harness(MockCrmPort::new());

        let response = h
            .server
            .patch("/sf/rest/sobjects/Account/001")
            .add_query_param("_HttpMethod", "PATCH")
            .json(&json!({"Name": "Acme"}))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({
                "method": "PATCH",
                "path": "sobjects/Account/001",
                "params": {"_HttpMethod": "PATCH"},
                "body": {"Name": "Acme"}
            })
        );
    }

    #[tokio::test]
    async fn missing_tooling_object_is_not_found() {
        let h = harness(MockCrmPort::new());

        h.server
            .get("/sf/tooling/sobjects/ApexClass/nothing")
            .await
            .assert_status_not_found();
    }
}
