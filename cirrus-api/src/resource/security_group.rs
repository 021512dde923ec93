//! Security group lifecycle. The effective rule list lives on the SG
//! document, so deleting the SG drops its rules atomically from the local
//! view.

use serde::Deserialize;

use crate::broker::{SecurityGroupWireReq, SecurityRuleWire};
use crate::error::{CoreError, Result};
use crate::model::{FirewallRule, KeyValue, ResourceKind, ResourceStatus, SecurityGroup};
use crate::registry;
use crate::state::AppState;
use crate::util::{check_name, new_uuid};

use super::{ensure_new_id, ensure_ns, load_entity, save_entity, system_labels, vms_in_namespace};

#[derive(Debug, Deserialize)]
pub struct CreateSecurityGroupRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "VNetId", default)]
    pub vnet_id: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "FirewallRules", default)]
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(rename = "TagList", default)]
    pub tag_list: Vec<KeyValue>,
}

fn to_wire(rule: &FirewallRule) -> SecurityRuleWire {
    SecurityRuleWire {
        direction: rule.direction.clone(),
        ip_protocol: rule.protocol.clone(),
        from_port: rule.from_port.clone(),
        to_port: rule.to_port.clone(),
        cidr: rule.cidr.clone(),
    }
}

fn sg_key(ns: &str, id: &str) -> String {
    ResourceKind::SecurityGroup.key(ns, id)
}

pub async fn create_security_group(
    state: &AppState,
    ns: &str,
    req: CreateSecurityGroupRequest,
) -> Result<SecurityGroup> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::SecurityGroup, ns, &req.name).await?;
    registry::get_connection(state, &req.connection_name).await?;

    let vpc_name = if req.vnet_id.is_empty() {
        String::new()
    } else {
        // The broker addresses the vNet by its uuid (NameId).
        let vnet = super::vnet::get_vnet(state, ns, &req.vnet_id).await?;
        vnet.uuid
    };

    let mut sg = SecurityGroup {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: req.connection_name.clone(),
        vnet_id: req.vnet_id.clone(),
        description: req.description,
        firewall_rules: req.firewall_rules.clone(),
        status: ResourceStatus::Configuring,
        csp_security_group_id: String::new(),
        csp_security_group_name: String::new(),
        tag_list: req.tag_list,
    };
    save_entity(state, &sg_key(ns, &sg.id), &sg).await?;

    let wire = SecurityGroupWireReq {
        name: sg.uuid.clone(),
        vpc_name,
        security_rules: sg.firewall_rules.iter().map(to_wire).collect(),
    };
    match state
        .broker
        .create_security_group(&sg.connection_name, wire)
        .await
    {
        Ok(info) => {
            sg.csp_security_group_id = info.iid.system_id;
            sg.csp_security_group_name = info.iid.name_id;
            sg.status = ResourceStatus::Available;
            save_entity(state, &sg_key(ns, &sg.id), &sg).await?;
        }
        Err(e) => {
            sg.status = ResourceStatus::ErrorOnConfiguring;
            save_entity(state, &sg_key(ns, &sg.id), &sg).await?;
            return Err(e);
        }
    }

    state
        .labels
        .put_labels(
            ResourceKind::SecurityGroup.as_str(),
            &sg.uuid,
            &sg_key(ns, &sg.id),
            system_labels(ns, &sg.id, &sg.uuid, &sg.connection_name, &sg.tag_list),
        )
        .await?;

    Ok(sg)
}

pub async fn get_security_group(state: &AppState, ns: &str, id: &str) -> Result<SecurityGroup> {
    ensure_ns(state, ns).await?;
    load_entity(state, &sg_key(ns, id), &format!("securityGroup '{}'", id)).await
}

/// Append rules; the broker sees them first, the document second.
pub async fn add_rules(
    state: &AppState,
    ns: &str,
    id: &str,
    rules: Vec<FirewallRule>,
) -> Result<SecurityGroup> {
    let mut sg = get_security_group(state, ns, id).await?;
    if rules.is_empty() {
        return Err(CoreError::Validation("no rules supplied".into()));
    }

    state
        .broker
        .add_security_group_rules(
            &sg.connection_name,
            &sg.uuid,
            rules.iter().map(to_wire).collect(),
        )
        .await?;

    for rule in rules {
        if !sg.firewall_rules.contains(&rule) {
            sg.firewall_rules.push(rule);
        }
    }
    save_entity(state, &sg_key(ns, id), &sg).await?;
    Ok(sg)
}

/// Remove rules by exact match of (direction, protocol, from, to, cidr).
pub async fn remove_rules(
    state: &AppState,
    ns: &str,
    id: &str,
    rules: Vec<FirewallRule>,
) -> Result<SecurityGroup> {
    let mut sg = get_security_group(state, ns, id).await?;
    if rules.is_empty() {
        return Err(CoreError::Validation("no rules supplied".into()));
    }
    if rules.iter().any(|r| !sg.firewall_rules.contains(r)) {
        return Err(CoreError::NotFound(
            "one or more rules not present on the security group".into(),
        ));
    }

    state
        .broker
        .remove_security_group_rules(
            &sg.connection_name,
            &sg.uuid,
            rules.iter().map(to_wire).collect(),
        )
        .await?;

    sg.firewall_rules.retain(|r| !rules.contains(r));
    save_entity(state, &sg_key(ns, id), &sg).await?;
    Ok(sg)
}

pub async fn delete_security_group(state: &AppState, ns: &str, id: &str) -> Result<()> {
    let mut sg = get_security_group(state, ns, id).await?;

    for vm in vms_in_namespace(state, ns).await? {
        if vm.sg_ids.iter().any(|s| s == id) {
            return Err(CoreError::Conflict(format!(
                "securityGroup '{}' is in use by VM '{}'",
                id, vm.id
            )));
        }
    }

    sg.status = ResourceStatus::Deleting;
    save_entity(state, &sg_key(ns, id), &sg).await?;

    if let Err(e) = state
        .broker
        .delete_security_group(&sg.connection_name, &sg.uuid)
        .await
    {
        sg.status = ResourceStatus::ErrorOnDeleting;
        save_entity(state, &sg_key(ns, id), &sg).await?;
        return Err(e);
    }

    state.store.delete(&sg_key(ns, id)).await?;
    state
        .labels
        .remove_entity(ResourceKind::SecurityGroup.as_str(), &sg.uuid)
        .await?;
    Ok(())
}
