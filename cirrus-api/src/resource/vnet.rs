//! vNet and subnet lifecycle.
//!
//! Subnets are both embedded in the vNet document and written under their
//! own keys; subnet keys are written before the parent so a reader that
//! finds the vNet always finds its subnets. Subnet uuids double as the
//! broker's NameId, which makes response correlation independent of list
//! order.

use ipnet::Ipv4Net;
use serde::Deserialize;
use tracing::warn;

use crate::broker::{RegisterVpcReq, SubnetWireReq, VpcInfo, VpcReq};
use crate::error::{CoreError, Result};
use crate::model::{ConnConfig, KeyValue, ResourceKind, ResourceStatus, Subnet, VNet};
use crate::registry;
use crate::state::AppState;
use crate::util::{check_name, new_uuid};

use super::{
    ensure_new_id, ensure_ns, load_entity, save_entity, system_labels, vms_in_namespace,
};

#[derive(Debug, Clone, Deserialize)]
pub struct SubnetReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
    #[serde(rename = "Zone", default)]
    pub zone: String,
    #[serde(rename = "TagList", default)]
    pub tag_list: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVNetRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "CidrBlock")]
    pub cidr_block: String,
    #[serde(rename = "SubnetInfoList")]
    pub subnet_info_list: Vec<SubnetReq>,
    #[serde(rename = "TagList", default)]
    pub tag_list: Vec<KeyValue>,
    #[serde(rename = "Description", default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVNetRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "CspVNetId")]
    pub csp_vnet_id: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

fn parse_cidr(raw: &str, what: &str) -> Result<Ipv4Net> {
    raw.parse::<Ipv4Net>()
        .map_err(|_| CoreError::Validation(format!("{} '{}' is not a valid IPv4 CIDR", what, raw)))
}

fn validate_subnet_against(
    vnet_net: &Ipv4Net,
    conn: &ConnConfig,
    subnet: &SubnetReq,
) -> Result<()> {
    check_name(&subnet.name)?;
    let subnet_net = parse_cidr(&subnet.ipv4_cidr, "subnet CIDR")?;
    if !vnet_net.contains(&subnet_net) {
        return Err(CoreError::Validation(format!(
            "subnet CIDR '{}' is not contained in vNet CIDR '{}'",
            subnet.ipv4_cidr, vnet_net
        )));
    }
    if !subnet.zone.is_empty() && !conn.region_detail.zones.contains(&subnet.zone) {
        return Err(CoreError::Validation(format!(
            "zone '{}' is not a zone of region '{}'",
            subnet.zone, conn.region_detail.region_id
        )));
    }
    Ok(())
}

/// Fold the broker's subnet list into local subnets, matched by uuid.
fn reconcile_subnets(vnet: &mut VNet, info: &VpcInfo) {
    vnet.csp_vnet_id = info.iid.system_id.clone();
    vnet.csp_vnet_name = info.iid.name_id.clone();
    for subnet in &mut vnet.subnet_info_list {
        subnet.csp_vnet_id = vnet.csp_vnet_id.clone();
        // Match by NameId (the local uuid), never by position.
        if let Some(wire) = info
            .subnet_info_list
            .iter()
            .find(|w| w.iid.name_id == subnet.uuid)
        {
            subnet.csp_subnet_id = wire.iid.system_id.clone();
            subnet.csp_subnet_name = wire.iid.name_id.clone();
            subnet.status = ResourceStatus::InUse;
        } else {
            warn!(subnet = %subnet.id, "broker response missing subnet");
            subnet.status = ResourceStatus::Unknown;
        }
    }
}

async fn persist_vnet(state: &AppState, ns: &str, vnet: &VNet) -> Result<()> {
    // Children first, parent last.
    for subnet in &vnet.subnet_info_list {
        save_entity(state, &Subnet::key(ns, &vnet.id, &subnet.id), subnet).await?;
    }
    save_entity(state, &ResourceKind::VNet.key(ns, &vnet.id), vnet).await
}

pub async fn create_vnet(state: &AppState, ns: &str, req: CreateVNetRequest) -> Result<VNet> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::VNet, ns, &req.name).await?;

    if req.subnet_info_list.is_empty() {
        return Err(CoreError::Validation(
            "a vNet must declare at least one subnet".into(),
        ));
    }
    let vnet_net = parse_cidr(&req.cidr_block, "vNet CIDR")?;
    let conn = registry::get_connection(state, &req.connection_name).await?;
    for subnet in &req.subnet_info_list {
        validate_subnet_against(&vnet_net, &conn, subnet)?;
    }

    let mut vnet = VNet {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: req.connection_name.clone(),
        cidr_block: req.cidr_block.clone(),
        status: ResourceStatus::Configuring,
        csp_vnet_id: String::new(),
        csp_vnet_name: String::new(),
        subnet_info_list: req
            .subnet_info_list
            .iter()
            .map(|s| Subnet {
                id: s.name.clone(),
                uuid: new_uuid(),
                name: s.name.clone(),
                ipv4_cidr: s.ipv4_cidr.clone(),
                zone: s.zone.clone(),
                status: ResourceStatus::Configuring,
                csp_subnet_id: String::new(),
                csp_subnet_name: String::new(),
                csp_vnet_id: String::new(),
                tag_list: s.tag_list.clone(),
            })
            .collect(),
        tag_list: req.tag_list,
        key_value_list: vec![],
        description: req.description,
    };

    // Intent state goes to the store before the broker sees anything.
    persist_vnet(state, ns, &vnet).await?;

    let wire_req = VpcReq {
        name: vnet.uuid.clone(),
        ipv4_cidr: vnet.cidr_block.clone(),
        subnet_info_list: vnet
            .subnet_info_list
            .iter()
            .map(|s| SubnetWireReq {
                name: s.uuid.clone(),
                ipv4_cidr: s.ipv4_cidr.clone(),
                zone: s.zone.clone(),
            })
            .collect(),
    };

    match state.broker.create_vpc(&vnet.connection_name, wire_req).await {
        Ok(info) => {
            reconcile_subnets(&mut vnet, &info);
            vnet.status = ResourceStatus::InUse;
            persist_vnet(state, ns, &vnet).await?;
        }
        Err(e) => {
            vnet.status = ResourceStatus::ErrorOnConfiguring;
            persist_vnet(state, ns, &vnet).await?;
            return Err(e);
        }
    }

    state
        .labels
        .put_labels(
            ResourceKind::VNet.as_str(),
            &vnet.uuid,
            &ResourceKind::VNet.key(ns, &vnet.id),
            system_labels(ns, &vnet.id, &vnet.uuid, &vnet.connection_name, &vnet.tag_list),
        )
        .await?;

    Ok(vnet)
}

/// Adopt a pre-existing CSP vNet. The broker reports its current subnets,
/// each of which becomes a local subnet with a synthesized id and status
/// `Unknown` until first read.
pub async fn register_vnet(state: &AppState, ns: &str, req: RegisterVNetRequest) -> Result<VNet> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::VNet, ns, &req.name).await?;
    registry::get_connection(state, &req.connection_name).await?;

    let mut vnet = VNet {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: req.connection_name.clone(),
        cidr_block: String::new(),
        status: ResourceStatus::Registering,
        csp_vnet_id: req.csp_vnet_id.clone(),
        csp_vnet_name: String::new(),
        subnet_info_list: vec![],
        tag_list: vec![],
        key_value_list: vec![],
        description: req.description,
    };
    persist_vnet(state, ns, &vnet).await?;

    let wire_req = RegisterVpcReq {
        name: vnet.uuid.clone(),
        csp_id: req.csp_vnet_id.clone(),
    };
    match state.broker.register_vpc(&vnet.connection_name, wire_req).await {
        Ok(info) => {
            vnet.csp_vnet_id = info.iid.system_id.clone();
            vnet.csp_vnet_name = info.iid.name_id.clone();
            vnet.cidr_block = info.ipv4_cidr.clone();
            vnet.subnet_info_list = info
                .subnet_info_list
                .iter()
                .enumerate()
                .map(|(i, wire)| Subnet {
                    id: format!("reg-subnet-{:02}", i),
                    uuid: new_uuid(),
                    name: format!("reg-subnet-{:02}", i),
                    ipv4_cidr: wire.ipv4_cidr.clone(),
                    zone: wire.zone.clone(),
                    status: ResourceStatus::Unknown,
                    csp_subnet_id: wire.iid.system_id.clone(),
                    csp_subnet_name: wire.iid.name_id.clone(),
                    csp_vnet_id: info.iid.system_id.clone(),
                    tag_list: vec![],
                })
                .collect();
            vnet.status = ResourceStatus::Available;
            persist_vnet(state, ns, &vnet).await?;
        }
        Err(e) => {
            vnet.status = ResourceStatus::ErrorOnRegistering;
            persist_vnet(state, ns, &vnet).await?;
            return Err(e);
        }
    }

    state
        .labels
        .put_labels(
            ResourceKind::VNet.as_str(),
            &vnet.uuid,
            &ResourceKind::VNet.key(ns, &vnet.id),
            system_labels(ns, &vnet.id, &vnet.uuid, &vnet.connection_name, &[]),
        )
        .await?;

    Ok(vnet)
}

pub async fn get_vnet(state: &AppState, ns: &str, id: &str) -> Result<VNet> {
    ensure_ns(state, ns).await?;
    load_entity(state, &ResourceKind::VNet.key(ns, id), &format!("vNet '{}'", id)).await
}

pub async fn list_vnets(state: &AppState, ns: &str) -> Result<Vec<VNet>> {
    super::list_resources_raw(state, ResourceKind::VNet, ns)
        .await?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(Into::into))
        .collect()
}

/// Delete a vNet. Blocks when subnets exist and `with_subnets` is false,
/// and when any VM still references the vNet.
pub async fn delete_vnet(
    state: &AppState,
    ns: &str,
    id: &str,
    with_subnets: bool,
) -> Result<String> {
    let mut vnet = get_vnet(state, ns, id).await?;

    let subnet_prefix = format!("{}/subnet/", ResourceKind::VNet.key(ns, id));
    let subnet_entries = state.store.list(&subnet_prefix).await?;
    if !subnet_entries.is_empty() && !with_subnets {
        return Err(CoreError::Conflict(format!(
            "vNet '{}' still has {} subnet(s); pass withSubnets=true to cascade",
            id,
            subnet_entries.len()
        )));
    }

    for vm in vms_in_namespace(state, ns).await? {
        if vm.vnet_id == id {
            return Err(CoreError::Conflict(format!(
                "vNet '{}' is in use by VM '{}'",
                id, vm.id
            )));
        }
    }

    vnet.status = ResourceStatus::Deleting;
    save_entity(state, &ResourceKind::VNet.key(ns, id), &vnet).await?;

    if let Err(e) = state.broker.delete_vpc(&vnet.connection_name, &vnet.uuid).await {
        vnet.status = ResourceStatus::ErrorOnDeleting;
        save_entity(state, &ResourceKind::VNet.key(ns, id), &vnet).await?;
        return Err(e);
    }

    // Subnet keys live under the vNet key; the trailing slash keeps
    // sibling ids sharing this one as a prefix out of the sweep.
    state
        .store
        .delete_prefix(&format!("{}/", ResourceKind::VNet.key(ns, id)))
        .await?;
    state.store.delete(&ResourceKind::VNet.key(ns, id)).await?;
    state
        .labels
        .remove_entity(ResourceKind::VNet.as_str(), &vnet.uuid)
        .await?;

    Ok(format!("the vNet ({}) has been deleted", id))
}

/// Add a subnet to a live vNet.
pub async fn add_subnet(state: &AppState, ns: &str, vnet_id: &str, req: SubnetReq) -> Result<VNet> {
    let mut vnet = get_vnet(state, ns, vnet_id).await?;

    if vnet.subnet_info_list.iter().any(|s| s.id == req.name) {
        return Err(CoreError::Conflict(format!(
            "subnet '{}' already exists in vNet '{}'",
            req.name, vnet_id
        )));
    }
    let vnet_net = parse_cidr(&vnet.cidr_block, "vNet CIDR")?;
    let conn = registry::get_connection(state, &vnet.connection_name).await?;
    validate_subnet_against(&vnet_net, &conn, &req)?;

    let mut subnet = Subnet {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        ipv4_cidr: req.ipv4_cidr.clone(),
        zone: req.zone.clone(),
        status: ResourceStatus::Configuring,
        csp_subnet_id: String::new(),
        csp_subnet_name: String::new(),
        csp_vnet_id: vnet.csp_vnet_id.clone(),
        tag_list: req.tag_list.clone(),
    };
    save_entity(state, &Subnet::key(ns, vnet_id, &subnet.id), &subnet).await?;

    let wire = SubnetWireReq {
        name: subnet.uuid.clone(),
        ipv4_cidr: subnet.ipv4_cidr.clone(),
        zone: subnet.zone.clone(),
    };
    match state.broker.add_subnet(&vnet.connection_name, &vnet.uuid, wire).await {
        Ok(info) => {
            if let Some(w) = info
                .subnet_info_list
                .iter()
                .find(|w| w.iid.name_id == subnet.uuid)
            {
                subnet.csp_subnet_id = w.iid.system_id.clone();
                subnet.csp_subnet_name = w.iid.name_id.clone();
            }
            subnet.status = ResourceStatus::InUse;
        }
        Err(e) => {
            subnet.status = ResourceStatus::ErrorOnConfiguring;
            save_entity(state, &Subnet::key(ns, vnet_id, &subnet.id), &subnet).await?;
            return Err(e);
        }
    }

    vnet.subnet_info_list.push(subnet);
    persist_vnet(state, ns, &vnet).await?;
    Ok(vnet)
}

/// Remove a subnet from a live vNet. Blocked while a VM sits on it.
pub async fn remove_subnet(
    state: &AppState,
    ns: &str,
    vnet_id: &str,
    subnet_id: &str,
) -> Result<VNet> {
    let mut vnet = get_vnet(state, ns, vnet_id).await?;

    let subnet = vnet
        .subnet_info_list
        .iter()
        .find(|s| s.id == subnet_id)
        .cloned()
        .ok_or_else(|| {
            CoreError::NotFound(format!(
                "subnet '{}' not found in vNet '{}'",
                subnet_id, vnet_id
            ))
        })?;

    for vm in vms_in_namespace(state, ns).await? {
        if vm.vnet_id == vnet_id && vm.subnet_id == subnet_id {
            return Err(CoreError::Conflict(format!(
                "subnet '{}' is in use by VM '{}'",
                subnet_id, vm.id
            )));
        }
    }

    state
        .broker
        .remove_subnet(&vnet.connection_name, &vnet.uuid, &subnet.uuid)
        .await?;

    vnet.subnet_info_list.retain(|s| s.id != subnet_id);
    state
        .store
        .delete(&Subnet::key(ns, vnet_id, subnet_id))
        .await?;
    persist_vnet(state, ns, &vnet).await?;
    Ok(vnet)
}
