//! Dynamic MCI creation and subgroup scale-out.
//!
//! Each VM template resolves to a spec and image, leaning on shared
//! default infrastructure (vNet, security group, ssh key) that is created
//! on first use per connection. VM creation fans out one broker call per
//! VM; a failed VM lands in `ErrorOnConfiguring` without failing the MCI.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::broker::VmReq;
use crate::error::{CoreError, Result};
use crate::model::{
    FirewallRule, Mci, ResourceStatus, SpecInfo, SubGroup, Vm, VmTemplate,
};
use crate::resource::vnet::{CreateVNetRequest, SubnetReq};
use crate::resource::{self, ensure_ns, save_entity, system_labels};
use crate::state::AppState;
use crate::util::{check_name, gen_random_password, new_uuid, sanitize_id};

use super::{get_mci, load_mci, MciView, MCI_LABEL_KIND, VM_LABEL_KIND};

/// Hard cap on parallel VM creations per request.
const VM_FANOUT_CAP: usize = 32;

const VM_ADMIN_USER: &str = "cb-user";

#[derive(Debug, Deserialize)]
pub struct CreateMciRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Vm")]
    pub vm: Vec<VmTemplate>,
}

#[derive(Debug, Deserialize)]
pub struct ScaleOutRequest {
    #[serde(rename = "NumVMsToAdd")]
    pub num_vms_to_add: u32,
}

/// Shared default infrastructure for one connection.
struct DefaultInfra {
    vnet_id: String,
    vnet_uuid: String,
    subnet_id: String,
    subnet_uuid: String,
    sg_id: String,
    sg_uuid: String,
    ssh_key_id: String,
    ssh_key_uuid: String,
}

/// Get-or-create the `sysdefault` vNet/SG/sshKey for a connection.
async fn ensure_default_infra(
    state: &AppState,
    ns: &str,
    connection_name: &str,
) -> Result<DefaultInfra> {
    let base = sanitize_id(&format!("sysdefault-{}", connection_name));

    let vnet = match resource::vnet::get_vnet(state, ns, &base).await {
        Ok(v) => v,
        Err(CoreError::NotFound(_)) => {
            info!(ns, connection = connection_name, "creating default vNet");
            resource::vnet::create_vnet(
                state,
                ns,
                CreateVNetRequest {
                    name: base.clone(),
                    connection_name: connection_name.to_string(),
                    cidr_block: "10.0.0.0/16".to_string(),
                    subnet_info_list: vec![SubnetReq {
                        name: format!("{}-sn", base),
                        ipv4_cidr: "10.0.1.0/24".to_string(),
                        zone: String::new(),
                        tag_list: vec![],
                    }],
                    tag_list: vec![],
                    description: "shared default vNet".to_string(),
                },
            )
            .await?
        }
        Err(e) => return Err(e),
    };
    let (subnet_id, subnet_uuid) = vnet
        .subnet_info_list
        .first()
        .map(|s| (s.id.clone(), s.uuid.clone()))
        .ok_or_else(|| CoreError::Internal(format!("default vNet '{}' has no subnet", base)))?;

    let sg = match resource::security_group::get_security_group(state, ns, &base).await {
        Ok(sg) => sg,
        Err(CoreError::NotFound(_)) => {
            resource::security_group::create_security_group(
                state,
                ns,
                resource::security_group::CreateSecurityGroupRequest {
                    name: base.clone(),
                    connection_name: connection_name.to_string(),
                    vnet_id: vnet.id.clone(),
                    description: "shared default security group".to_string(),
                    firewall_rules: vec![FirewallRule {
                        direction: "inbound".to_string(),
                        protocol: "tcp".to_string(),
                        from_port: "22".to_string(),
                        to_port: "22".to_string(),
                        cidr: "0.0.0.0/0".to_string(),
                    }],
                    tag_list: vec![],
                },
            )
            .await?
        }
        Err(e) => return Err(e),
    };

    let ssh_key = match resource::ssh_key::get_ssh_key(state, ns, &base).await {
        Ok(k) => k,
        Err(CoreError::NotFound(_)) => {
            resource::ssh_key::create_ssh_key(
                state,
                ns,
                resource::ssh_key::CreateSshKeyRequest {
                    name: base.clone(),
                    connection_name: connection_name.to_string(),
                    username: VM_ADMIN_USER.to_string(),
                    description: "shared default ssh key".to_string(),
                },
            )
            .await?
        }
        Err(e) => return Err(e),
    };

    Ok(DefaultInfra {
        vnet_id: vnet.id,
        vnet_uuid: vnet.uuid,
        subnet_id,
        subnet_uuid,
        sg_id: sg.id,
        sg_uuid: sg.uuid,
        ssh_key_id: ssh_key.id,
        ssh_key_uuid: ssh_key.uuid,
    })
}

/// Resolve a template: cached spec, image name at the CSP, connection.
async fn resolve_template(
    state: &AppState,
    ns: &str,
    template: &VmTemplate,
) -> Result<(SpecInfo, String, String)> {
    let spec = resource::spec::get_spec(state, ns, &template.spec_id).await?;
    let connection_name = if template.connection_name.is_empty() {
        spec.connection_name.clone()
    } else {
        template.connection_name.clone()
    };

    // A cached image entity wins; otherwise the id is taken as the
    // CSP-native image name.
    let image_name = match resource::image::get_image(state, ns, &template.image_id).await {
        Ok(image) => image.csp_image_name,
        Err(CoreError::NotFound(_)) => template.image_id.clone(),
        Err(e) => return Err(e),
    };

    Ok((spec, image_name, connection_name))
}

struct VmSeed {
    vm: Vm,
    csp_image_name: String,
    csp_spec_name: String,
    vnet_uuid: String,
    subnet_uuid: String,
    sg_uuid: String,
    ssh_key_uuid: String,
    root_disk_type: String,
    root_disk_size: String,
    user_labels: std::collections::HashMap<String, String>,
}

/// Create the VMs of one subgroup in parallel. Returns them with their
/// terminal statuses; broker failures stay on the VM, not on the call.
async fn create_subgroup_vms(state: &AppState, ns: &str, mci_id: &str, seeds: Vec<VmSeed>) -> Result<Vec<Vm>> {
    let user_labels: std::collections::HashMap<String, std::collections::HashMap<String, String>> =
        seeds
            .iter()
            .map(|s| (s.vm.id.clone(), s.user_labels.clone()))
            .collect();

    // Intent first: every VM exists in Configuring before any broker call.
    for seed in &seeds {
        save_entity(state, &Vm::key(ns, mci_id, &seed.vm.id), &seed.vm).await?;
    }

    let vms: Vec<Vm> = stream::iter(seeds)
        .map(|seed| {
            let broker = state.broker.clone();
            async move {
                let mut vm = seed.vm;
                let req = VmReq {
                    name: vm.uuid.clone(),
                    image_name: seed.csp_image_name,
                    vm_spec_name: seed.csp_spec_name,
                    vpc_name: seed.vnet_uuid,
                    subnet_name: seed.subnet_uuid,
                    security_group_names: vec![seed.sg_uuid],
                    key_pair_name: seed.ssh_key_uuid,
                    root_disk_type: seed.root_disk_type,
                    root_disk_size: seed.root_disk_size,
                    vm_user_id: VM_ADMIN_USER.to_string(),
                    vm_user_passwd: gen_random_password(16),
                };
                match broker.create_vm(&vm.connection_name, req).await {
                    Ok(info) => {
                        vm.csp_vm_id = info.iid.system_id;
                        vm.csp_vm_name = info.iid.name_id;
                        vm.public_ip = info.public_ip;
                        vm.private_ip = info.private_ip;
                        vm.status = ResourceStatus::InUse;
                    }
                    Err(e) => {
                        warn!(vm = %vm.id, "VM create failed: {}", e);
                        vm.status = ResourceStatus::ErrorOnConfiguring;
                        vm.error_message = Some(e.to_string());
                    }
                }
                vm
            }
        })
        .buffer_unordered(VM_FANOUT_CAP)
        .collect()
        .await;

    for vm in &vms {
        save_entity(state, &Vm::key(ns, mci_id, &vm.id), vm).await?;
        let mut labels = system_labels(ns, &vm.id, &vm.uuid, &vm.connection_name, &[]);
        if let Some(extra) = user_labels.get(&vm.id) {
            labels.extend(extra.clone());
        }
        state
            .labels
            .put_labels(VM_LABEL_KIND, &vm.uuid, &Vm::key(ns, mci_id, &vm.id), labels)
            .await?;
    }
    Ok(vms)
}

fn vm_seed(template: &VmTemplate, id: String, connection_name: &str, spec: &SpecInfo, image_name: &str, infra: &DefaultInfra, sub_group_id: &str) -> VmSeed {
    VmSeed {
        vm: Vm {
            id,
            uuid: new_uuid(),
            connection_name: connection_name.to_string(),
            csp_vm_id: String::new(),
            csp_vm_name: String::new(),
            status: ResourceStatus::Configuring,
            public_ip: String::new(),
            private_ip: String::new(),
            sg_ids: vec![infra.sg_id.clone()],
            vnet_id: infra.vnet_id.clone(),
            subnet_id: infra.subnet_id.clone(),
            ssh_key_id: infra.ssh_key_id.clone(),
            image_id: template.image_id.clone(),
            spec_id: template.spec_id.clone(),
            data_disk_ids: vec![],
            sub_group_id: Some(sub_group_id.to_string()),
            bastion_vm_id: None,
            error_message: None,
        },
        csp_image_name: image_name.to_string(),
        csp_spec_name: spec.csp_spec_name.clone(),
        vnet_uuid: infra.vnet_uuid.clone(),
        subnet_uuid: infra.subnet_uuid.clone(),
        sg_uuid: infra.sg_uuid.clone(),
        ssh_key_uuid: infra.ssh_key_uuid.clone(),
        root_disk_type: template.root_disk_type.clone(),
        root_disk_size: template.root_disk_size.clone(),
        user_labels: template.label.clone(),
    }
}

/// Create an MCI from a list of VM templates.
pub async fn create_mci_dynamic(
    state: &AppState,
    ns: &str,
    req: CreateMciRequest,
) -> Result<MciView> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    if state.store.exists(&Mci::key(ns, &req.name)).await? {
        return Err(CoreError::Conflict(format!(
            "MCI '{}' already exists in namespace '{}'",
            req.name, ns
        )));
    }
    if req.vm.is_empty() {
        return Err(CoreError::Validation(
            "an MCI needs at least one VM template".into(),
        ));
    }
    for (i, template) in req.vm.iter().enumerate() {
        if !template.name.is_empty() {
            check_name(&template.name)?;
        }
        if template.sub_group_size == 0 {
            return Err(CoreError::Validation(format!(
                "template {} has subGroupSize 0",
                i
            )));
        }
    }

    let mut mci = Mci {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        description: req.description,
        status: ResourceStatus::Configuring,
        associated_policy_id: None,
    };
    save_entity(state, &Mci::key(ns, &mci.id), &mci).await?;

    let mut any_ok = false;
    for (idx, template) in req.vm.iter().enumerate() {
        let sub_group_id = if template.name.is_empty() {
            format!("g{}", idx + 1)
        } else {
            template.name.clone()
        };

        let (spec, image_name, connection_name) = resolve_template(state, ns, template).await?;
        let infra = ensure_default_infra(state, ns, &connection_name).await?;

        let seeds: Vec<VmSeed> = (1..=template.sub_group_size)
            .map(|i| {
                vm_seed(
                    template,
                    format!("{}-{}", sub_group_id, i),
                    &connection_name,
                    &spec,
                    &image_name,
                    &infra,
                    &sub_group_id,
                )
            })
            .collect();

        let sub_group = SubGroup {
            id: sub_group_id.clone(),
            uuid: new_uuid(),
            sub_group_size: template.sub_group_size,
            vm_ids: seeds.iter().map(|s| s.vm.id.clone()).collect(),
            template: template.clone(),
        };
        save_entity(state, &SubGroup::key(ns, &mci.id, &sub_group_id), &sub_group).await?;

        let vms = create_subgroup_vms(state, ns, &mci.id, seeds).await?;
        any_ok |= vms.iter().any(|v| v.status == ResourceStatus::InUse);
    }

    mci.status = if any_ok {
        ResourceStatus::InUse
    } else {
        ResourceStatus::ErrorOnConfiguring
    };
    save_entity(state, &Mci::key(ns, &mci.id), &mci).await?;

    state
        .labels
        .put_labels(
            MCI_LABEL_KIND,
            &mci.uuid,
            &Mci::key(ns, &mci.id),
            system_labels(ns, &mci.id, &mci.uuid, "", &[]),
        )
        .await?;

    get_mci(state, ns, &mci.id).await
}

/// Next free index for `<subgroup>-<n>` ids.
fn next_vm_index(vm_ids: &[String], sub_group_id: &str) -> u32 {
    vm_ids
        .iter()
        .filter_map(|id| id.strip_prefix(&format!("{}-", sub_group_id)))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Scale out a subgroup: replay its stored template for N more VMs.
pub async fn scale_out_subgroup(
    state: &AppState,
    ns: &str,
    mci_id: &str,
    sub_group_id: &str,
    req: ScaleOutRequest,
) -> Result<MciView> {
    load_mci(state, ns, mci_id).await?;
    if req.num_vms_to_add == 0 {
        return Err(CoreError::Validation("NumVMsToAdd must be positive".into()));
    }

    let sg_key = SubGroup::key(ns, mci_id, sub_group_id);
    let mut sub_group: SubGroup = match state.store.get(&sg_key).await? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => {
            return Err(CoreError::NotFound(format!(
                "subgroup '{}' not found in MCI '{}'",
                sub_group_id, mci_id
            )))
        }
    };

    let template = sub_group.template.clone();
    let (spec, image_name, connection_name) = resolve_template(state, ns, &template).await?;
    let infra = ensure_default_infra(state, ns, &connection_name).await?;

    let start = next_vm_index(&sub_group.vm_ids, sub_group_id);
    let seeds: Vec<VmSeed> = (0..req.num_vms_to_add)
        .map(|i| {
            vm_seed(
                &template,
                format!("{}-{}", sub_group_id, start + i),
                &connection_name,
                &spec,
                &image_name,
                &infra,
                sub_group_id,
            )
        })
        .collect();

    sub_group.vm_ids.extend(seeds.iter().map(|s| s.vm.id.clone()));
    sub_group.sub_group_size += req.num_vms_to_add;
    save_entity(state, &sg_key, &sub_group).await?;

    create_subgroup_vms(state, ns, mci_id, seeds).await?;
    get_mci(state, ns, mci_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_vm_index() {
        let ids = vec!["web-1".to_string(), "web-2".to_string(), "web-5".to_string()];
        assert_eq!(next_vm_index(&ids, "web"), 6);
        // Ids from other subgroups are ignored.
        assert_eq!(next_vm_index(&ids, "db"), 1);
        assert_eq!(next_vm_index(&[], "web"), 1);
    }
}
