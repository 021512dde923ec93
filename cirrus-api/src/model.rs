//! Persisted domain model.
//!
//! One JSON document per entity, stored under the canonical key layout
//! (`/ns/<ns>/resources/<kind>/<id>`, `/ns/<ns>/mci/<mci>/vm/<vm>`, ...).
//! Field spellings on the wire are stable; external tooling reads them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Shared pieces
// =============================================================================

/// Lifecycle status shared by every managed entity.
///
/// The local store transitions to the intent state (`Configuring`,
/// `Deleting`, ...) before the broker call and to the terminal state after a
/// successful response; a failed response lands in the matching `ErrorOn…`
/// state. The spellings are a stable external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Configuring,
    Available,
    InUse,
    Updating,
    Deleting,
    Deleted,
    Registering,
    Deregistering,
    Unknown,
    ErrorOnConfiguring,
    ErrorOnUpdating,
    ErrorOnDeleting,
    ErrorOnRegistering,
}

impl ResourceStatus {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ResourceStatus::ErrorOnConfiguring
                | ResourceStatus::ErrorOnUpdating
                | ResourceStatus::ErrorOnDeleting
                | ResourceStatus::ErrorOnRegistering
        )
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Configuring => "Configuring",
            ResourceStatus::Available => "Available",
            ResourceStatus::InUse => "InUse",
            ResourceStatus::Updating => "Updating",
            ResourceStatus::Deleting => "Deleting",
            ResourceStatus::Deleted => "Deleted",
            ResourceStatus::Registering => "Registering",
            ResourceStatus::Deregistering => "Deregistering",
            ResourceStatus::Unknown => "Unknown",
            ResourceStatus::ErrorOnConfiguring => "ErrorOnConfiguring",
            ResourceStatus::ErrorOnUpdating => "ErrorOnUpdating",
            ResourceStatus::ErrorOnDeleting => "ErrorOnDeleting",
            ResourceStatus::ErrorOnRegistering => "ErrorOnRegistering",
        };
        f.write_str(s)
    }
}

/// Closed set of namespaced resource kinds managed by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VNet,
    SecurityGroup,
    SshKey,
    Image,
    CustomImage,
    Spec,
    DataDisk,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::VNet,
        ResourceKind::SecurityGroup,
        ResourceKind::SshKey,
        ResourceKind::Image,
        ResourceKind::CustomImage,
        ResourceKind::Spec,
        ResourceKind::DataDisk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::VNet => "vNet",
            ResourceKind::SecurityGroup => "securityGroup",
            ResourceKind::SshKey => "sshKey",
            ResourceKind::Image => "image",
            ResourceKind::CustomImage => "customImage",
            ResourceKind::Spec => "spec",
            ResourceKind::DataDisk => "dataDisk",
        }
    }

    /// Canonical key prefix for this kind inside a namespace.
    pub fn key_prefix(self, ns: &str) -> String {
        format!("/ns/{}/resources/{}", ns, self.as_str())
    }

    /// Canonical key of one entity.
    pub fn key(self, ns: &str, id: &str) -> String {
        format!("{}/{}", self.key_prefix(ns), id)
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vNet" => Ok(ResourceKind::VNet),
            "securityGroup" => Ok(ResourceKind::SecurityGroup),
            "sshKey" => Ok(ResourceKind::SshKey),
            "image" => Ok(ResourceKind::Image),
            "customImage" => Ok(ResourceKind::CustomImage),
            "spec" => Ok(ResourceKind::Spec),
            "dataDisk" => Ok(ResourceKind::DataDisk),
            other => Err(format!("unknown resource kind '{}'", other)),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic key/value pair carried on several entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

// =============================================================================
// Namespace
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Namespace {
    pub id: String,
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub description: String,
    pub created_time: chrono::DateTime<chrono::Utc>,
}

impl Namespace {
    pub fn key(id: &str) -> String {
        format!("/ns/{}", id)
    }
}

// =============================================================================
// Connections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegionZoneInfo {
    pub assigned_region: String,
    #[serde(default)]
    pub assigned_zone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegionDetail {
    pub region_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub zones: Vec<String>,
}

/// A verified (driver, credential, region-or-region+zone) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnConfig {
    pub config_name: String,
    pub provider_name: String,
    pub driver_name: String,
    pub credential_name: String,
    pub credential_holder: String,
    pub region_zone_info_name: String,
    pub region_zone_info: RegionZoneInfo,
    pub region_detail: RegionDetail,
    pub verified: bool,
    pub region_representative: bool,
}

impl ConnConfig {
    pub fn key(config_name: &str) -> String {
        format!("/connection/{}", config_name)
    }
}

/// Stored (redacted) record of a registered credential holder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CredentialHolder {
    pub credential_holder: String,
    #[serde(default)]
    pub credentials: Vec<RedactedCredential>,
}

impl CredentialHolder {
    pub fn key(holder: &str) -> String {
        format!("/credentialHolder/{}", holder)
    }
}

/// A credential with its secret material stripped; only key names survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RedactedCredential {
    pub credential_name: String,
    pub provider_name: String,
    pub credential_keys: Vec<String>,
}

// =============================================================================
// vNet / subnet
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub id: String,
    pub uuid: String,
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
    #[serde(default)]
    pub zone: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub csp_subnet_id: String,
    #[serde(default)]
    pub csp_subnet_name: String,
    #[serde(rename = "CspVNetId", default)]
    pub csp_vnet_id: String,
    #[serde(default)]
    pub tag_list: Vec<KeyValue>,
}

impl Subnet {
    pub fn key(ns: &str, vnet_id: &str, id: &str) -> String {
        format!("/ns/{}/resources/vNet/{}/subnet/{}", ns, vnet_id, id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VNet {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    pub cidr_block: String,
    pub status: ResourceStatus,
    #[serde(rename = "CspVNetId", default)]
    pub csp_vnet_id: String,
    #[serde(rename = "CspVNetName", default)]
    pub csp_vnet_name: String,
    pub subnet_info_list: Vec<Subnet>,
    #[serde(default)]
    pub tag_list: Vec<KeyValue>,
    #[serde(default)]
    pub key_value_list: Vec<KeyValue>,
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// Security group
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FirewallRule {
    /// `inbound` or `outbound`.
    pub direction: String,
    pub protocol: String,
    #[serde(default)]
    pub from_port: String,
    #[serde(default)]
    pub to_port: String,
    #[serde(rename = "CIDR", default)]
    pub cidr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    #[serde(rename = "VNetId", default)]
    pub vnet_id: String,
    #[serde(default)]
    pub description: String,
    pub firewall_rules: Vec<FirewallRule>,
    pub status: ResourceStatus,
    #[serde(default)]
    pub csp_security_group_id: String,
    #[serde(default)]
    pub csp_security_group_name: String,
    #[serde(default)]
    pub tag_list: Vec<KeyValue>,
}

// =============================================================================
// SSH key
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SshKey {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub public_key: String,
    /// Only populated in the create response; the stored copy is redacted.
    #[serde(default)]
    pub private_key: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub csp_key_pair_id: String,
    #[serde(default)]
    pub csp_key_pair_name: String,
}

// =============================================================================
// Spec / image / custom image / data disk
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpecInfo {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub region_name: String,
    pub csp_spec_name: String,
    #[serde(rename = "VCPU", default)]
    pub vcpu: u32,
    #[serde(rename = "MemoryGiB", default)]
    pub memory_gib: f64,
    #[serde(default)]
    pub cost_per_hour: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInfo {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    pub csp_image_id: String,
    #[serde(default)]
    pub csp_image_name: String,
    #[serde(rename = "OsType", default)]
    pub os_type: String,
    #[serde(default)]
    pub description: String,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomImage {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    pub source_vm_id: String,
    #[serde(default)]
    pub source_vm_spec_id: String,
    #[serde(default)]
    pub csp_custom_image_id: String,
    #[serde(default)]
    pub csp_custom_image_name: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataDisk {
    pub id: String,
    pub uuid: String,
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub disk_type: String,
    #[serde(default)]
    pub disk_size: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub csp_disk_id: String,
    #[serde(default)]
    pub csp_disk_name: String,
    #[serde(default)]
    pub attached_vm_id: Option<String>,
}

// =============================================================================
// MCI / subgroup / VM
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mci {
    pub id: String,
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub associated_policy_id: Option<String>,
}

impl Mci {
    pub fn key(ns: &str, id: &str) -> String {
        format!("/ns/{}/mci/{}", ns, id)
    }

    pub fn prefix(ns: &str) -> String {
        format!("/ns/{}/mci", ns)
    }

    pub fn vm_prefix(ns: &str, mci: &str) -> String {
        format!("/ns/{}/mci/{}/vm", ns, mci)
    }

    pub fn subgroup_prefix(ns: &str, mci: &str) -> String {
        format!("/ns/{}/mci/{}/subgroup", ns, mci)
    }

    pub fn policy_key(ns: &str, mci: &str) -> String {
        format!("/ns/{}/policy/mci/{}", ns, mci)
    }
}

/// Template used to stamp out the VMs of a subgroup; kept verbatim so
/// scale-out can replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VmTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_subgroup_size")]
    pub sub_group_size: u32,
    pub spec_id: String,
    pub image_id: String,
    #[serde(default)]
    pub connection_name: String,
    #[serde(default)]
    pub root_disk_type: String,
    #[serde(default)]
    pub root_disk_size: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub label: HashMap<String, String>,
}

fn default_subgroup_size() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubGroup {
    pub id: String,
    pub uuid: String,
    pub sub_group_size: u32,
    pub vm_ids: Vec<String>,
    pub template: VmTemplate,
}

impl SubGroup {
    pub fn key(ns: &str, mci: &str, id: &str) -> String {
        format!("/ns/{}/mci/{}/subgroup/{}", ns, mci, id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vm {
    pub id: String,
    pub uuid: String,
    pub connection_name: String,
    #[serde(default)]
    pub csp_vm_id: String,
    #[serde(default)]
    pub csp_vm_name: String,
    pub status: ResourceStatus,
    #[serde(rename = "PublicIP", default)]
    pub public_ip: String,
    #[serde(rename = "PrivateIP", default)]
    pub private_ip: String,
    #[serde(default)]
    pub sg_ids: Vec<String>,
    #[serde(rename = "VNetId", default)]
    pub vnet_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub ssh_key_id: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub spec_id: String,
    #[serde(default)]
    pub data_disk_ids: Vec<String>,
    #[serde(default)]
    pub sub_group_id: Option<String>,
    /// Bastion edge: this VM is reached through `bastion_vm_id`.
    #[serde(default)]
    pub bastion_vm_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Vm {
    pub fn key(ns: &str, mci: &str, id: &str) -> String {
        format!("/ns/{}/mci/{}/vm/{}", ns, mci, id)
    }
}
