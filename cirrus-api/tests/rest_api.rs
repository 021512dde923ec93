//! REST API integration tests: namespaces, credentials/connections, vNets,
//! labels, and the request tracker, all against a mock broker.

mod common;

use serde_json::{json, Value};

// =============================================================================
// Readiness
// =============================================================================

#[tokio::test]
async fn test_readyz() {
    let server = common::TestServer::spawn().await;

    let resp = server.get("/readyz").await;
    assert_eq!(resp.status(), 200);

    server.shutdown().await;
}

// =============================================================================
// Namespaces
// =============================================================================

#[tokio::test]
async fn test_ns_crud() {
    let server = common::TestServer::spawn().await;

    let resp = server
        .post_json("/ns", &json!({ "Name": "team-a", "Description": "team A" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["Id"], "team-a");
    assert!(body["Uuid"].is_string());

    let resp = server.get("/ns/team-a").await;
    assert_eq!(resp.status(), 200);

    // Duplicate creation conflicts.
    let resp = server.post_json("/ns", &json!({ "Name": "team-a" })).await;
    assert_eq!(resp.status(), 409);

    let resp = server.delete("/ns/team-a").await;
    assert_eq!(resp.status(), 200);

    // Deleting again: not found, state unchanged.
    let resp = server.delete("/ns/team-a").await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_ns_name_validation() {
    let server = common::TestServer::spawn().await;

    for bad in ["1a", "a-", "-a", "a+b", ""] {
        let resp = server.post_json("/ns", &json!({ "Name": bad })).await;
        assert_eq!(resp.status(), 400, "name '{}' should be rejected", bad);
    }
    // Single letter and interior double hyphen are fine.
    for good in ["a", "a--b"] {
        let resp = server.post_json("/ns", &json!({ "Name": good })).await;
        assert_eq!(resp.status(), 200, "name '{}' should be accepted", good);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_nonempty_ns_conflicts() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    let resp = server
        .post_json(
            "/ns/default/resources/sshKey",
            &json!({ "Name": "k1", "ConnectionName": "aws-us-east-1" }),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let resp = server.delete("/ns/default").await;
    assert_eq!(resp.status(), 409);

    server.shutdown().await;
}

// =============================================================================
// Credentials and connections (scenario S1)
// =============================================================================

#[tokio::test]
async fn test_credential_fanout_and_representatives() {
    let server = common::TestServer::spawn().await;
    let list = server.register_aws_credential().await;

    let configs = list["ConnConfig"].as_array().unwrap();
    let names: Vec<&str> = configs
        .iter()
        .map(|c| c["ConfigName"].as_str().unwrap())
        .collect();
    for expected in [
        "aws-us-east-1",
        "aws-us-east-1-a",
        "aws-us-east-1-b",
        "aws-us-west-2",
        "aws-us-west-2-a",
        "aws-us-west-2-b",
    ] {
        assert!(names.contains(&expected), "missing {}", expected);
    }

    // Exactly one representative per region.
    let reps: Vec<&Value> = configs
        .iter()
        .filter(|c| c["RegionRepresentative"] == true)
        .collect();
    assert_eq!(reps.len(), 2);
    assert!(configs.iter().all(|c| c["Verified"] == true));

    // The issued token is single-use.
    let resp = server.get("/connConfig/aws-us-east-1").await;
    assert_eq!(resp.status(), 200);
    let conn: Value = resp.json().await.unwrap();
    assert_eq!(conn["ProviderName"], "aws");
    assert_eq!(conn["CredentialHolder"], "admin");
    assert_eq!(conn["CredentialName"], "aws");

    server.shutdown().await;
}

#[tokio::test]
async fn test_credential_token_is_one_shot() {
    let server = common::TestServer::spawn().await;

    // A bogus token is rejected and stays rejected.
    let body = json!({
        "providerName": "aws",
        "credentialHolder": "admin",
        "publicKeyTokenId": "no-such-token",
        "encryptedAesKey": "AAAA",
        "credentialKeyValueList": []
    });
    let resp = server.post_json("/credential", &body).await;
    assert_eq!(resp.status(), 404);

    // A real token dies with a failed registration too: corrupt AES key.
    let resp = server.get("/credential/publicKey").await;
    let issued: Value = resp.json().await.unwrap();
    let token = issued["publicKeyTokenId"].as_str().unwrap();

    let body = json!({
        "providerName": "aws",
        "credentialHolder": "admin",
        "publicKeyTokenId": token,
        "encryptedAesKey": "AAAA",
        "credentialKeyValueList": []
    });
    let resp = server.post_json("/credential", &body).await;
    assert_eq!(resp.status(), 400);
    assert!(!server.state.key_store.contains(token));

    // Re-use of the spent token reports it missing.
    let resp = server.post_json("/credential", &body).await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unverified_region_still_gets_representative() {
    let server = common::TestServer::spawn().await;

    // Every us-west-2 probe fails; us-east-1 verifies normally.
    {
        let mut fail = server.mock.fail_probe.lock().await;
        fail.insert("aws-us-west-2".to_string());
        fail.insert("aws-us-west-2-a".to_string());
        fail.insert("aws-us-west-2-b".to_string());
    }

    let list = server.register_aws_credential().await;
    let configs = list["ConnConfig"].as_array().unwrap();

    let west: Vec<&Value> = configs
        .iter()
        .filter(|c| c["RegionZoneInfo"]["AssignedRegion"] == "us-west-2")
        .collect();
    // Only the fallback representative survives for the dead region.
    assert_eq!(west.len(), 1);
    assert_eq!(west[0]["ConfigName"], "aws-us-west-2");
    assert_eq!(west[0]["Verified"], false);
    assert_eq!(west[0]["RegionRepresentative"], true);
    // Its handle is rewritten to the lexicographically first zoned sibling.
    assert_eq!(west[0]["RegionZoneInfoName"], "aws-us-west-2-a");

    server.shutdown().await;
}

// =============================================================================
// vNet (scenarios S2, S5)
// =============================================================================

async fn create_vnet1(server: &common::TestServer) -> Value {
    let resp = server
        .post_json(
            "/ns/default/resources/vNet",
            &json!({
                "Name": "vnet1",
                "ConnectionName": "aws-us-east-1",
                "CidrBlock": "10.0.0.0/16",
                "SubnetInfoList": [
                    { "Name": "sn1", "IPv4_CIDR": "10.0.1.0/24", "Zone": "us-east-1a" },
                    { "Name": "sn2", "IPv4_CIDR": "10.0.2.0/24", "Zone": "us-east-1b" }
                ]
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_vnet_create_reconciles_csp_ids() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    let vnet = create_vnet1(&server).await;
    assert_eq!(vnet["Status"], "InUse");
    assert!(vnet["Uuid"].is_string());
    assert!(vnet["CspVNetId"].as_str().unwrap().starts_with("vpc-"));

    // Subnets correlate by uuid even though the mock reverses the list.
    let subnets = vnet["SubnetInfoList"].as_array().unwrap();
    assert_eq!(subnets.len(), 2);
    for subnet in subnets {
        assert!(subnet["CspSubnetId"].as_str().unwrap().starts_with("subnet-"));
        assert_eq!(subnet["CspVNetId"], vnet["CspVNetId"]);
        assert_eq!(subnet["Status"], "InUse");
    }
    let sn1 = subnets.iter().find(|s| s["Id"] == "sn1").unwrap();
    assert_eq!(sn1["IPv4_CIDR"], "10.0.1.0/24");
    assert_eq!(sn1["Zone"], "us-east-1a");

    // Both the parent and the child keys exist (canonical layout).
    assert!(server
        .state
        .store
        .exists("/ns/default/resources/vNet/vnet1")
        .await
        .unwrap());
    assert!(server
        .state
        .store
        .exists("/ns/default/resources/vNet/vnet1/subnet/sn1")
        .await
        .unwrap());

    // Read-back equals the create response.
    let resp = server.get("/ns/default/resources/vNet/vnet1").await;
    assert_eq!(resp.status(), 200);
    let read: Value = resp.json().await.unwrap();
    assert_eq!(read, vnet);

    server.shutdown().await;
}

#[tokio::test]
async fn test_vnet_validation() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    // No subnets.
    let resp = server
        .post_json(
            "/ns/default/resources/vNet",
            &json!({
                "Name": "v0",
                "ConnectionName": "aws-us-east-1",
                "CidrBlock": "10.0.0.0/16",
                "SubnetInfoList": []
            }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    // Subnet CIDR outside the vNet block.
    let resp = server
        .post_json(
            "/ns/default/resources/vNet",
            &json!({
                "Name": "v1",
                "ConnectionName": "aws-us-east-1",
                "CidrBlock": "10.0.0.0/16",
                "SubnetInfoList": [{ "Name": "sn1", "IPv4_CIDR": "192.168.1.0/24" }]
            }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    // Zone not declared for the region.
    let resp = server
        .post_json(
            "/ns/default/resources/vNet",
            &json!({
                "Name": "v2",
                "ConnectionName": "aws-us-east-1",
                "CidrBlock": "10.0.0.0/16",
                "SubnetInfoList": [{ "Name": "sn1", "IPv4_CIDR": "10.0.1.0/24", "Zone": "us-west-2a" }]
            }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    // Unknown connection.
    let resp = server
        .post_json(
            "/ns/default/resources/vNet",
            &json!({
                "Name": "v3",
                "ConnectionName": "nope",
                "CidrBlock": "10.0.0.0/16",
                "SubnetInfoList": [{ "Name": "sn1", "IPv4_CIDR": "10.0.1.0/24" }]
            }),
        )
        .await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_vnet_duplicate_create_leaves_state_unchanged() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    let first = create_vnet1(&server).await;

    let resp = server
        .post_json(
            "/ns/default/resources/vNet",
            &json!({
                "Name": "vnet1",
                "ConnectionName": "aws-us-east-1",
                "CidrBlock": "10.9.0.0/16",
                "SubnetInfoList": [{ "Name": "other", "IPv4_CIDR": "10.9.1.0/24" }]
            }),
        )
        .await;
    assert_eq!(resp.status(), 409);

    // The stored document is untouched.
    let read: Value = server
        .get("/ns/default/resources/vNet/vnet1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(read, first);

    server.shutdown().await;
}

#[tokio::test]
async fn test_vnet_cascading_delete() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;
    create_vnet1(&server).await;

    // Two subnets, no cascade: conflict, subnets still present.
    let resp = server.delete("/ns/default/resources/vNet/vnet1").await;
    assert_eq!(resp.status(), 409);
    assert!(server
        .state
        .store
        .exists("/ns/default/resources/vNet/vnet1/subnet/sn1")
        .await
        .unwrap());

    // Cascade removes everything under the vNet key.
    let resp = server
        .delete("/ns/default/resources/vNet/vnet1?withSubnets=true")
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["Message"], "the vNet (vnet1) has been deleted");

    let remaining = server
        .state
        .store
        .list("/ns/default/resources/vNet/vnet1")
        .await
        .unwrap();
    assert!(remaining.is_empty());

    // Deleting again: not found.
    let resp = server.delete("/ns/default/resources/vNet/vnet1").await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_register_csp_vnet_adopts_subnets() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    let resp = server
        .post_json(
            "/ns/default/resources/registerCspVNet",
            &json!({
                "Name": "adopted",
                "ConnectionName": "aws-us-east-1",
                "CspVNetId": "vpc-external"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let vnet: Value = resp.json().await.unwrap();

    assert_eq!(vnet["Status"], "Available");
    assert_eq!(vnet["CspVNetId"], "vpc-external");
    let subnets = vnet["SubnetInfoList"].as_array().unwrap();
    assert_eq!(subnets.len(), 2);
    assert_eq!(subnets[0]["Id"], "reg-subnet-00");
    assert_eq!(subnets[0]["Status"], "Unknown");
    assert_eq!(subnets[1]["Id"], "reg-subnet-01");

    server.shutdown().await;
}

#[tokio::test]
async fn test_subnet_add_and_remove() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;
    create_vnet1(&server).await;

    let resp = server
        .post_json(
            "/ns/default/resources/vNet/vnet1/subnet",
            &json!({ "Name": "sn3", "IPv4_CIDR": "10.0.3.0/24", "Zone": "us-east-1a" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let vnet: Value = resp.json().await.unwrap();
    assert_eq!(vnet["SubnetInfoList"].as_array().unwrap().len(), 3);
    assert!(server
        .state
        .store
        .exists("/ns/default/resources/vNet/vnet1/subnet/sn3")
        .await
        .unwrap());

    let resp = server
        .delete("/ns/default/resources/vNet/vnet1/subnet/sn3")
        .await;
    assert_eq!(resp.status(), 200);
    let vnet: Value = resp.json().await.unwrap();
    assert_eq!(vnet["SubnetInfoList"].as_array().unwrap().len(), 2);

    server.shutdown().await;
}

// =============================================================================
// Security groups
// =============================================================================

#[tokio::test]
async fn test_security_group_rules() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    let resp = server
        .post_json(
            "/ns/default/resources/securityGroup",
            &json!({
                "Name": "sg1",
                "ConnectionName": "aws-us-east-1",
                "FirewallRules": [
                    { "Direction": "inbound", "Protocol": "tcp", "FromPort": "22", "ToPort": "22", "CIDR": "0.0.0.0/0" }
                ]
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let sg: Value = resp.json().await.unwrap();
    assert_eq!(sg["Status"], "Available");
    assert!(sg["CspSecurityGroupId"].as_str().unwrap().starts_with("sg-"));

    // Append a rule.
    let resp = server
        .post_json(
            "/ns/default/resources/securityGroup/sg1/rules",
            &json!([
                { "Direction": "inbound", "Protocol": "tcp", "FromPort": "80", "ToPort": "80", "CIDR": "0.0.0.0/0" }
            ]),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let sg: Value = resp.json().await.unwrap();
    assert_eq!(sg["FirewallRules"].as_array().unwrap().len(), 2);

    // Remove by exact match.
    let resp = server
        .client
        .delete(format!(
            "{}/ns/default/resources/securityGroup/sg1/rules",
            server.base_url()
        ))
        .json(&json!([
            { "Direction": "inbound", "Protocol": "tcp", "FromPort": "80", "ToPort": "80", "CIDR": "0.0.0.0/0" }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let sg: Value = resp.json().await.unwrap();
    let rules = sg["FirewallRules"].as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["FromPort"], "22");

    server.shutdown().await;
}

// =============================================================================
// Specs
// =============================================================================

#[tokio::test]
async fn test_spec_fetch_and_range_filter() {
    let server = common::TestServer::spawn().await;
    server.register_aws_credential().await;

    let resp = server
        .post_json(
            "/ns/default/resources/fetchSpecs?connectionName=aws-us-east-1",
            &json!({}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let specs: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(specs.len(), 3);

    // Cached: direct get without broker involvement.
    let resp = server
        .get("/ns/default/resources/spec/aws-us-east-1-t2-micro")
        .await;
    assert_eq!(resp.status(), 200);
    let spec: Value = resp.json().await.unwrap();
    assert_eq!(spec["CspSpecName"], "t2.micro");
    assert_eq!(spec["VCPU"], 1);

    let resp = server
        .get("/ns/default/resources/filterSpecsByRange?MinVCPU=2&MaxCostPerHour=0.2")
        .await;
    assert_eq!(resp.status(), 200);
    let filtered: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["CspSpecName"], "m5.large");

    server.shutdown().await;
}

// =============================================================================
// Labels (scenario S4)
// =============================================================================

#[tokio::test]
async fn test_label_selector_scenarios() {
    let server = common::TestServer::spawn().await;

    // Three labeled entities backed by raw documents.
    for (uuid, doc, labels) in [
        ("e1", json!({"Id": "e1"}), json!({"env": "prod", "tier": "api"})),
        ("e2", json!({"Id": "e2"}), json!({"env": "prod", "tier": "db"})),
        ("e3", json!({"Id": "e3"}), json!({"env": "dev"})),
    ] {
        server
            .state
            .store
            .put(&format!("/{}", uuid), &doc.to_string())
            .await
            .unwrap();
        let resp = server
            .put_json(
                &format!("/label/vm/{}", uuid),
                &json!({ "labels": labels, "resourceKey": format!("/{}", uuid) }),
            )
            .await;
        assert_eq!(resp.status(), 200);
    }

    let ids = |body: Vec<Value>| -> Vec<String> {
        body.iter()
            .map(|v| v["Id"].as_str().unwrap().to_string())
            .collect()
    };

    let resp = server
        .get("/resources/vm?labelSelector=env%3Dprod,tier%20in%20(api,db)")
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(ids(resp.json().await.unwrap()), vec!["e1", "e2"]);

    let resp = server
        .get("/resources/vm?labelSelector=env!%3Dprod,tier%20exists")
        .await;
    assert_eq!(resp.status(), 200);
    assert!(resp.json::<Vec<Value>>().await.unwrap().is_empty());

    let resp = server.get("/resources/vm?labelSelector=!tier").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(ids(resp.json().await.unwrap()), vec!["e3"]);

    // Unknown operator is a parse error.
    let resp = server.get("/resources/vm?labelSelector=env%3E%3Dprod").await;
    assert_eq!(resp.status(), 400);

    server.shutdown().await;
}

#[tokio::test]
async fn test_label_crud_roundtrip() {
    let server = common::TestServer::spawn().await;

    server.state.store.put("/doc", "{}").await.unwrap();
    let labels = json!({ "env": "prod", "owner": "team-a" });
    let resp = server
        .put_json(
            "/label/vm/u-1",
            &json!({ "labels": labels, "resourceKey": "/doc" }),
        )
        .await;
    assert_eq!(resp.status(), 200);

    // Get returns an equal map.
    let resp = server.get("/label/vm/u-1").await;
    assert_eq!(resp.status(), 200);
    let got: Value = resp.json().await.unwrap();
    assert_eq!(got, labels);

    // Remove one key only.
    let resp = server.delete("/label/vm/u-1/owner").await;
    assert_eq!(resp.status(), 200);
    let got: Value = server.get("/label/vm/u-1").await.json().await.unwrap();
    assert_eq!(got, json!({ "env": "prod" }));

    server.shutdown().await;
}

// =============================================================================
// Request tracker
// =============================================================================

#[tokio::test]
async fn test_request_tracking() {
    let server = common::TestServer::spawn().await;

    // A caller-supplied id is honored and echoed back.
    let resp = server
        .client
        .get(format!("{}/ns", server.base_url()))
        .header("x-request-id", "my-req-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "my-req-1"
    );

    // The record captured method, path, status, and the response body.
    let resp = server.get("/request/my-req-1").await;
    assert_eq!(resp.status(), 200);
    let record: Value = resp.json().await.unwrap();
    assert_eq!(record["method"], "GET");
    assert_eq!(record["path"], "/tumblebug/ns");
    assert_eq!(record["status"], 200);
    assert!(record["responseBody"].as_str().unwrap().contains("default"));

    // Error bodies carry the request id.
    let resp = server.get("/ns/not-there").await;
    assert_eq!(resp.status(), 404);
    let request_id = resp
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("not-there"));
    assert_eq!(body["requestId"].as_str().unwrap(), request_id);

    // Listing and deletion.
    let resp = server.get("/request").await;
    assert_eq!(resp.status(), 200);
    assert!(!resp.json::<Vec<Value>>().await.unwrap().is_empty());

    let resp = server.delete("/request/my-req-1").await;
    assert_eq!(resp.status(), 200);
    let resp = server.get("/request/my-req-1").await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}
