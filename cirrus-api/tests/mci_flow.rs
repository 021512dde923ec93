//! MCI orchestration flows: dynamic create, status fan-out, scale-out,
//! bastion wiring, remote command, policy storage, snapshot, and VPN
//! streaming.

mod common;

use serde_json::{json, Value};

async fn setup_mci(server: &common::TestServer) -> Value {
    server.register_aws_credential().await;

    let resp = server
        .post_json(
            "/ns/default/resources/fetchSpecs?connectionName=aws-us-east-1",
            &json!({}),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let resp = server
        .post_json(
            "/ns/default/mci",
            &json!({
                "Name": "m1",
                "Description": "test mci",
                "Vm": [
                    {
                        "Name": "app",
                        "SubGroupSize": 2,
                        "SpecId": "aws-us-east-1-t2-micro",
                        "ImageId": "ubuntu-22-04"
                    },
                    {
                        "Name": "bast",
                        "SubGroupSize": 1,
                        "SpecId": "aws-us-east-1-m5-large",
                        "ImageId": "ubuntu-22-04"
                    }
                ]
            }),
        )
        .await;
    assert_eq!(resp.status(), 200, "MCI creation failed");
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_mci_dynamic_create() {
    let server = common::TestServer::spawn().await;
    let mci = setup_mci(&server).await;

    assert_eq!(mci["Id"], "m1");
    assert_eq!(mci["Status"], "InUse");

    let vms = mci["VmList"].as_array().unwrap();
    assert_eq!(vms.len(), 3);
    let ids: Vec<&str> = vms.iter().map(|v| v["Id"].as_str().unwrap()).collect();
    for expected in ["app-1", "app-2", "bast-1"] {
        assert!(ids.contains(&expected), "missing VM {}", expected);
    }
    for vm in vms {
        assert_eq!(vm["Status"], "InUse");
        assert!(vm["CspVmId"].as_str().unwrap().starts_with("i-"));
        assert!(!vm["PublicIP"].as_str().unwrap().is_empty());
        assert_eq!(vm["ConnectionName"], "aws-us-east-1");
    }

    let subgroups = mci["SubGroupList"].as_array().unwrap();
    assert_eq!(subgroups.len(), 2);
    let app_sg = subgroups.iter().find(|s| s["Id"] == "app").unwrap();
    assert_eq!(app_sg["SubGroupSize"], 2);
    assert_eq!(app_sg["VmIds"].as_array().unwrap().len(), 2);

    // Shared default infrastructure exists once.
    let resp = server
        .get("/ns/default/resources/vNet/sysdefault-aws-us-east-1")
        .await;
    assert_eq!(resp.status(), 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_mci_status_fanout_reports_per_vm_errors() {
    let server = common::TestServer::spawn().await;
    let mci = setup_mci(&server).await;

    // One VM's status probe fails at the broker.
    let broken_uuid = mci["VmList"][0]["Uuid"].as_str().unwrap().to_string();
    let broken_id = mci["VmList"][0]["Id"].as_str().unwrap().to_string();
    server.mock.fail_vm_status.lock().await.insert(broken_uuid);

    let resp = server.get("/ns/default/mci/m1?option=status").await;
    assert_eq!(resp.status(), 200);
    let status: Value = resp.json().await.unwrap();

    let vm_statuses = status["Vm"].as_array().unwrap();
    assert_eq!(vm_statuses.len(), 3);
    for vm in vm_statuses {
        if vm["Id"] == broken_id.as_str() {
            // The failed probe surfaces as Unknown, not as a failed call.
            assert_eq!(vm["Status"], "Unknown");
            assert!(vm["Error"].is_string());
        } else {
            assert_eq!(vm["Status"], "Running");
        }
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_mci_status_budget_exhaustion_marks_unknown() {
    use cirrus_api::mci::ops;

    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    // An exhausted budget returns the partial view instead of failing.
    let fanout = ops::mci_status_with_budget(
        &server.state,
        "default",
        "m1",
        std::time::Duration::ZERO,
    )
    .await
    .unwrap();

    assert!(fanout.timed_out);
    assert_eq!(fanout.view.vm.len(), 3);
    // Probes that did not land inside the budget are Unknown.
    assert!(fanout.view.vm.iter().any(|v| v.status == "Unknown"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_subgroup_scale_out() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server
        .post_json(
            "/ns/default/mci/m1/subgroup/app",
            &json!({ "NumVMsToAdd": 2 }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let mci: Value = resp.json().await.unwrap();

    let ids: Vec<&str> = mci["VmList"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["Id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 5);
    // New ids continue the subgroup numbering.
    assert!(ids.contains(&"app-3"));
    assert!(ids.contains(&"app-4"));

    let app_sg = mci["SubGroupList"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["Id"] == "app")
        .unwrap()
        .clone();
    assert_eq!(app_sg["SubGroupSize"], 4);

    // Scaling an unknown subgroup: not found.
    let resp = server
        .post_json(
            "/ns/default/mci/m1/subgroup/nope",
            &json!({ "NumVMsToAdd": 1 }),
        )
        .await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_bastion_reference_lifecycle() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    // Wire app-1 through bast-1.
    let resp = server
        .put("/ns/default/mci/m1/vm/app-1/bastion/bast-1")
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["bastionVmId"], "bast-1");

    let resp = server.get("/ns/default/mci/m1/vm/app-1/bastion").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["bastionVmId"], "bast-1");

    // Cycles are rejected.
    let resp = server
        .put("/ns/default/mci/m1/vm/app-1/bastion/app-1")
        .await;
    assert_eq!(resp.status(), 400);
    let resp = server
        .put("/ns/default/mci/m1/vm/bast-1/bastion/app-1")
        .await;
    assert_eq!(resp.status(), 409);

    // Clearing the bastion removes the edge.
    let resp = server.delete("/ns/default/mci/m1/bastion/bast-1").await;
    assert_eq!(resp.status(), 200);
    let resp = server.get("/ns/default/mci/m1/vm/app-1/bastion").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body.get("bastionVmId").is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_bastion_protects_vm_deletion() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    server
        .put("/ns/default/mci/m1/vm/app-1/bastion/bast-1")
        .await;

    // The bastion cannot be deleted while referenced.
    let resp = server.delete("/ns/default/mci/m1/vm/bast-1").await;
    assert_eq!(resp.status(), 409);

    // Force delete clears the reference.
    let resp = server.delete("/ns/default/mci/m1/vm/bast-1?force=true").await;
    assert_eq!(resp.status(), 200);

    let resp = server.get("/ns/default/mci/m1/vm/app-1/bastion").await;
    let body: Value = resp.json().await.unwrap();
    assert!(body.get("bastionVmId").is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_remote_command_fanout() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server
        .post_json("/ns/default/cmd/mci/m1", &json!({ "Command": "uptime" }))
        .await;
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();

    let results = report["Results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for r in results {
        assert_eq!(r["Output"], "ran: uptime");
    }
    assert!(report["Failures"].as_array().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_control_fanout() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server.get("/ns/default/control/mci/m1?action=suspend").await;
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["Results"].as_array().unwrap().len(), 3);

    // Unknown actions are rejected.
    let resp = server.get("/ns/default/control/mci/m1?action=explode").await;
    assert_eq!(resp.status(), 400);

    server.shutdown().await;
}

#[tokio::test]
async fn test_policy_stored_verbatim() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let policy = json!({
        "autoCondition": { "metric": "cpu", "operator": ">=", "operand": "80" },
        "actionType": "ScaleOut",
        "placementAlgo": "random"
    });
    let resp = server.put_json("/ns/default/policy/mci/m1", &policy).await;
    assert_eq!(resp.status(), 200);

    let resp = server.get("/ns/default/policy/mci/m1").await;
    assert_eq!(resp.status(), 200);
    let stored: Value = resp.json().await.unwrap();
    assert_eq!(stored, policy);

    // The MCI now references its policy.
    let resp = server.get("/ns/default/mci/m1").await;
    let mci: Value = resp.json().await.unwrap();
    assert_eq!(mci["AssociatedPolicyId"], "m1");

    let resp = server.delete("/ns/default/policy/mci/m1").await;
    assert_eq!(resp.status(), 200);
    let resp = server.get("/ns/default/policy/mci/m1").await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_vm_snapshot_creates_custom_image_and_disks() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server
        .post_json(
            "/ns/default/mci/m1/vm/app-1/snapshot",
            &json!({ "Name": "snap1" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let result: Value = resp.json().await.unwrap();

    let image = &result["CustomImage"];
    assert_eq!(image["Id"], "snap1");
    assert_eq!(image["SourceVmId"], "app-1");
    assert_eq!(image["SourceVmSpecId"], "aws-us-east-1-t2-micro");
    assert_eq!(image["Status"], "Available");
    assert!(image["CspCustomImageId"].as_str().unwrap().starts_with("snap-"));

    let disks = result["DataDisks"].as_array().unwrap();
    assert_eq!(disks.len(), 2);
    assert_eq!(disks[0]["Id"], "snap1-disk-00");
    assert_eq!(disks[0]["ConnectionName"], "aws-us-east-1");

    // Both are addressable as resources afterwards.
    let resp = server.get("/ns/default/resources/customImage/snap1").await;
    assert_eq!(resp.status(), 200);
    let resp = server.get("/ns/default/resources/dataDisk/snap1-disk-01").await;
    assert_eq!(resp.status(), 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_data_disk_attach_detach() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server
        .post_json(
            "/ns/default/resources/dataDisk",
            &json!({
                "Name": "dd1",
                "ConnectionName": "aws-us-east-1",
                "DiskType": "gp2",
                "DiskSize": "20"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let resp = server
        .put("/ns/default/resources/dataDisk/dd1/attach/m1/app-1")
        .await;
    assert_eq!(resp.status(), 200);
    let disk: Value = resp.json().await.unwrap();
    assert_eq!(disk["AttachedVmId"], "app-1");
    assert_eq!(disk["Status"], "InUse");

    // Attached disks cannot be deleted.
    let resp = server.delete("/ns/default/resources/dataDisk/dd1").await;
    assert_eq!(resp.status(), 409);

    // The VM records the attachment.
    let vm: Value = server
        .get("/ns/default/mci/m1/vm/app-1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(vm["DataDiskIds"], json!(["dd1"]));

    let resp = server
        .put("/ns/default/resources/dataDisk/dd1/detach/m1/app-1")
        .await;
    assert_eq!(resp.status(), 200);
    let resp = server.delete("/ns/default/resources/dataDisk/dd1").await;
    assert_eq!(resp.status(), 200);

    server.shutdown().await;
}

#[tokio::test]
async fn test_mci_delete_requires_force_while_running() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server.delete("/ns/default/mci/m1").await;
    assert_eq!(resp.status(), 409);

    let resp = server.delete("/ns/default/mci/m1?option=force").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["Message"], "the MCI (m1) has been deleted");

    // The whole subtree is gone.
    let remaining = server.state.store.list("/ns/default/mci/m1").await.unwrap();
    assert!(remaining.is_empty());

    let resp = server.get("/ns/default/mci/m1").await;
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_vnet_in_use_by_vm_blocks_delete() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    // The shared default vNet is referenced by the MCI's VMs.
    let resp = server
        .delete("/ns/default/resources/vNet/sysdefault-aws-us-east-1?withSubnets=true")
        .await;
    assert_eq!(resp.status(), 409);

    server.shutdown().await;
}

#[tokio::test]
async fn test_vpn_streaming_request() {
    let server = common::TestServer::spawn().await;
    setup_mci(&server).await;

    let resp = server
        .post_json(
            "/ns/default/vpn/mci/m1",
            &json!({
                "ConnectionName": "aws-us-east-1",
                "Name": "site1",
                "PeerCidr": "192.168.0.0/16"
            }),
        )
        .await;
    assert_eq!(resp.status(), 202);
    let accepted: Value = resp.json().await.unwrap();
    let req_id = accepted["requestId"].as_str().unwrap().to_string();

    // Poll until the stream reaches a terminal phase.
    let mut phase = String::new();
    for _ in 0..50 {
        let record: Value = server
            .get(&format!("/ns/default/vpn/mci/m1/request/{}", req_id))
            .await
            .json()
            .await
            .unwrap();
        phase = record["phase"].as_str().unwrap_or_default().to_string();
        if phase != "Running" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(phase, "Succeeded");

    server.shutdown().await;
}
