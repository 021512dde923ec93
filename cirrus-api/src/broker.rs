//! REST client for the downstream CSP abstraction broker.
//!
//! Every provider-touching operation goes through here. Request bodies are
//! `{ConnectionName, ReqInfo{...}}`; responses carry an `IId{NameId,
//! SystemId}` per entity. This wire shape is preserved at this boundary and
//! nowhere else. No retries at this layer; retry policy is owned by the
//! caller.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::KeyValue;

/// Timeout classes for broker calls.
#[derive(Debug, Clone, Copy)]
pub enum TimeoutClass {
    /// Health checks and lookups.
    Short,
    /// Create/delete of a single resource.
    Medium,
    /// Bounded by the caller (cluster, VPN).
    Long(Duration),
}

impl TimeoutClass {
    fn duration(self) -> Duration {
        match self {
            TimeoutClass::Short => Duration::from_secs(5),
            TimeoutClass::Medium => Duration::from_secs(60),
            TimeoutClass::Long(d) => d,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// Broker-side identifier pair for an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IId {
    #[serde(rename = "NameId", default)]
    pub name_id: String,
    #[serde(rename = "SystemId", default)]
    pub system_id: String,
}

/// Common request envelope.
#[derive(Debug, Serialize)]
struct BrokerRequest<T: Serialize> {
    #[serde(rename = "ConnectionName")]
    connection_name: String,
    #[serde(rename = "ReqInfo", skip_serializing_if = "Option::is_none")]
    req_info: Option<T>,
    #[serde(rename = "IDTransformMode")]
    id_transform_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct BrokerErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverReq {
    #[serde(rename = "DriverName")]
    pub driver_name: String,
    #[serde(rename = "ProviderName")]
    pub provider_name: String,
    #[serde(rename = "DriverLibFileName")]
    pub driver_lib_file_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionReq {
    #[serde(rename = "RegionName")]
    pub region_name: String,
    #[serde(rename = "ProviderName")]
    pub provider_name: String,
    #[serde(rename = "KeyValueInfoList")]
    pub key_value_info_list: Vec<KeyValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialReq {
    #[serde(rename = "CredentialName")]
    pub credential_name: String,
    #[serde(rename = "ProviderName")]
    pub provider_name: String,
    #[serde(rename = "KeyValueInfoList")]
    pub key_value_info_list: Vec<KeyValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionConfigReq {
    #[serde(rename = "ConfigName")]
    pub config_name: String,
    #[serde(rename = "ProviderName")]
    pub provider_name: String,
    #[serde(rename = "DriverName")]
    pub driver_name: String,
    #[serde(rename = "CredentialName")]
    pub credential_name: String,
    #[serde(rename = "RegionName")]
    pub region_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubnetWireReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
    #[serde(rename = "Zone", skip_serializing_if = "String::is_empty")]
    pub zone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpcReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
    #[serde(rename = "SubnetInfoList")]
    pub subnet_info_list: Vec<SubnetWireReq>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterVpcReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CSPId")]
    pub csp_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubnetWireInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "IPv4_CIDR", default)]
    pub ipv4_cidr: String,
    #[serde(rename = "Zone", default)]
    pub zone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VpcInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "IPv4_CIDR", default)]
    pub ipv4_cidr: String,
    #[serde(rename = "SubnetInfoList", default)]
    pub subnet_info_list: Vec<SubnetWireInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRuleWire {
    #[serde(rename = "Direction")]
    pub direction: String,
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(rename = "FromPort", default)]
    pub from_port: String,
    #[serde(rename = "ToPort", default)]
    pub to_port: String,
    #[serde(rename = "CIDR", default)]
    pub cidr: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupWireReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "VPCName", skip_serializing_if = "String::is_empty")]
    pub vpc_name: String,
    #[serde(rename = "SecurityRules")]
    pub security_rules: Vec<SecurityRuleWire>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityGroupWireInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "SecurityRules", default)]
    pub security_rules: Vec<SecurityRuleWire>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyPairReq {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyPairInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "PublicKey", default)]
    pub public_key: String,
    #[serde(rename = "PrivateKey", default)]
    pub private_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct KeyPairList {
    #[serde(rename = "keypair", default)]
    keypair: Vec<KeyPairInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VmReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ImageName")]
    pub image_name: String,
    #[serde(rename = "VMSpecName")]
    pub vm_spec_name: String,
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "SubnetName")]
    pub subnet_name: String,
    #[serde(rename = "SecurityGroupNames")]
    pub security_group_names: Vec<String>,
    #[serde(rename = "KeyPairName")]
    pub key_pair_name: String,
    #[serde(rename = "RootDiskType", skip_serializing_if = "String::is_empty")]
    pub root_disk_type: String,
    #[serde(rename = "RootDiskSize", skip_serializing_if = "String::is_empty")]
    pub root_disk_size: String,
    #[serde(rename = "VMUserId", skip_serializing_if = "String::is_empty")]
    pub vm_user_id: String,
    #[serde(rename = "VMUserPasswd", skip_serializing_if = "String::is_empty")]
    pub vm_user_passwd: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmWireInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "PublicIP", default)]
    pub public_ip: String,
    #[serde(rename = "PrivateIP", default)]
    pub private_ip: String,
}

#[derive(Debug, Default, Deserialize)]
struct VmStatusWire {
    #[serde(rename = "Status", default)]
    status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "DiskType", skip_serializing_if = "String::is_empty")]
    pub disk_type: String,
    #[serde(rename = "DiskSize", skip_serializing_if = "String::is_empty")]
    pub disk_size: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskWireInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "DiskType", default)]
    pub disk_type: String,
    #[serde(rename = "DiskSize", default)]
    pub disk_size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotReq {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "SourceVM")]
    pub source_vm: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotWireInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "SourceVM", default)]
    pub source_vm: String,
    #[serde(rename = "DataDiskIIds", default)]
    pub data_disk_iids: Vec<IId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VCpuWire {
    #[serde(rename = "Count", default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecWireInfo {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "VCpu", default)]
    pub vcpu: VCpuWire,
    #[serde(rename = "MemSizeMiB", default)]
    pub mem_size_mib: u64,
    #[serde(rename = "CostPerHour", default)]
    pub cost_per_hour: f64,
}

#[derive(Debug, Default, Deserialize)]
struct SpecList {
    #[serde(rename = "vmspec", default)]
    vmspec: Vec<SpecWireInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageWireInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "GuestOS", default)]
    pub guest_os: String,
}

#[derive(Debug, Default, Deserialize)]
struct ImageList {
    #[serde(rename = "image", default)]
    image: Vec<ImageWireInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandReq {
    #[serde(rename = "Command")]
    pub command: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandResult {
    #[serde(rename = "Output", default)]
    pub output: String,
}

#[derive(Debug, Default, Deserialize)]
struct Ack {
    #[serde(rename = "Result", default)]
    #[allow(dead_code)]
    result: String,
}

// =============================================================================
// Client
// =============================================================================

/// Typed client over the broker's REST surface.
#[derive(Clone)]
pub struct BrokerClient {
    base_url: String,
    http: reqwest::Client,
}

impl BrokerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        connection_name: &str,
        req_info: Option<B>,
        class: TimeoutClass,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let body = BrokerRequest {
            connection_name: connection_name.to_string(),
            req_info,
            id_transform_mode: "ON",
        };

        let resp = self
            .http
            .request(method, &url)
            .timeout(class.duration())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BrokerErrorBody>(&text)
                .map(|e| e.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            return Err(CoreError::Broker {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json::<T>().await?)
    }

    // -------------------------------------------------------------------------
    // Catalog / credential / connection
    // -------------------------------------------------------------------------

    pub async fn register_driver(&self, req: DriverReq) -> Result<()> {
        let _: serde_json::Value = self
            .call(Method::POST, "/driver", "", Some(req), TimeoutClass::Short)
            .await?;
        Ok(())
    }

    pub async fn register_region(&self, req: RegionReq) -> Result<()> {
        let _: serde_json::Value = self
            .call(Method::POST, "/region", "", Some(req), TimeoutClass::Short)
            .await?;
        Ok(())
    }

    pub async fn register_credential(&self, req: CredentialReq) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                Method::POST,
                "/credential",
                "",
                Some(req),
                TimeoutClass::Short,
            )
            .await?;
        Ok(())
    }

    pub async fn create_connection_config(&self, req: ConnectionConfigReq) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                Method::POST,
                "/connectionconfig",
                "",
                Some(req),
                TimeoutClass::Short,
            )
            .await?;
        Ok(())
    }

    /// Reachability probe: list keypairs under a connection.
    pub async fn list_keypairs(&self, connection_name: &str) -> Result<Vec<KeyPairInfo>> {
        let list: KeyPairList = self
            .call(
                Method::GET,
                "/allkeypair",
                connection_name,
                None::<()>,
                TimeoutClass::Short,
            )
            .await?;
        Ok(list.keypair)
    }

    // -------------------------------------------------------------------------
    // vNet (VPC)
    // -------------------------------------------------------------------------

    pub async fn create_vpc(&self, connection_name: &str, req: VpcReq) -> Result<VpcInfo> {
        self.call(
            Method::POST,
            "/vpc",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn register_vpc(
        &self,
        connection_name: &str,
        req: RegisterVpcReq,
    ) -> Result<VpcInfo> {
        self.call(
            Method::POST,
            "/regvpc",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn delete_vpc(&self, connection_name: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/vpc/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    pub async fn add_subnet(
        &self,
        connection_name: &str,
        vpc_name: &str,
        req: SubnetWireReq,
    ) -> Result<VpcInfo> {
        self.call(
            Method::POST,
            &format!("/vpc/{}/subnet", vpc_name),
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn remove_subnet(
        &self,
        connection_name: &str,
        vpc_name: &str,
        subnet_name: &str,
    ) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/vpc/{}/subnet/{}", vpc_name, subnet_name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Security group
    // -------------------------------------------------------------------------

    pub async fn create_security_group(
        &self,
        connection_name: &str,
        req: SecurityGroupWireReq,
    ) -> Result<SecurityGroupWireInfo> {
        self.call(
            Method::POST,
            "/securitygroup",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn delete_security_group(&self, connection_name: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/securitygroup/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    pub async fn add_security_group_rules(
        &self,
        connection_name: &str,
        name: &str,
        rules: Vec<SecurityRuleWire>,
    ) -> Result<SecurityGroupWireInfo> {
        self.call(
            Method::POST,
            &format!("/securitygroup/{}/rules", name),
            connection_name,
            Some(rules),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn remove_security_group_rules(
        &self,
        connection_name: &str,
        name: &str,
        rules: Vec<SecurityRuleWire>,
    ) -> Result<SecurityGroupWireInfo> {
        self.call(
            Method::DELETE,
            &format!("/securitygroup/{}/rules", name),
            connection_name,
            Some(rules),
            TimeoutClass::Medium,
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Keypair
    // -------------------------------------------------------------------------

    pub async fn create_keypair(
        &self,
        connection_name: &str,
        req: KeyPairReq,
    ) -> Result<KeyPairInfo> {
        self.call(
            Method::POST,
            "/keypair",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn delete_keypair(&self, connection_name: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/keypair/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // VM
    // -------------------------------------------------------------------------

    pub async fn create_vm(&self, connection_name: &str, req: VmReq) -> Result<VmWireInfo> {
        self.call(
            Method::POST,
            "/vm",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn get_vm_status(&self, connection_name: &str, name: &str) -> Result<String> {
        let s: VmStatusWire = self
            .call(
                Method::GET,
                &format!("/vmstatus/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(s.status)
    }

    pub async fn control_vm(
        &self,
        connection_name: &str,
        name: &str,
        action: &str,
    ) -> Result<()> {
        let _: Ack = self
            .call(
                Method::PUT,
                &format!("/controlvm/{}?action={}", name, action),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    pub async fn terminate_vm(&self, connection_name: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/vm/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    pub async fn exec_command(
        &self,
        connection_name: &str,
        vm_name: &str,
        command: &str,
    ) -> Result<CommandResult> {
        self.call(
            Method::POST,
            &format!("/cmd/{}", vm_name),
            connection_name,
            Some(CommandReq {
                command: command.to_string(),
            }),
            TimeoutClass::Medium,
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Disk / snapshot
    // -------------------------------------------------------------------------

    pub async fn create_disk(&self, connection_name: &str, req: DiskReq) -> Result<DiskWireInfo> {
        self.call(
            Method::POST,
            "/disk",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn delete_disk(&self, connection_name: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/disk/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    pub async fn attach_disk(
        &self,
        connection_name: &str,
        name: &str,
        vm_name: &str,
    ) -> Result<DiskWireInfo> {
        #[derive(Serialize)]
        struct Attach<'a> {
            #[serde(rename = "VMName")]
            vm_name: &'a str,
        }
        self.call(
            Method::PUT,
            &format!("/disk/{}/attach", name),
            connection_name,
            Some(Attach { vm_name }),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn detach_disk(
        &self,
        connection_name: &str,
        name: &str,
        vm_name: &str,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Detach<'a> {
            #[serde(rename = "VMName")]
            vm_name: &'a str,
        }
        let _: Ack = self
            .call(
                Method::PUT,
                &format!("/disk/{}/detach", name),
                connection_name,
                Some(Detach { vm_name }),
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    pub async fn snapshot_vm(
        &self,
        connection_name: &str,
        req: SnapshotReq,
    ) -> Result<SnapshotWireInfo> {
        self.call(
            Method::POST,
            "/snapshot",
            connection_name,
            Some(req),
            TimeoutClass::Medium,
        )
        .await
    }

    pub async fn delete_snapshot(&self, connection_name: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/snapshot/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Medium,
            )
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Spec / image lookup
    // -------------------------------------------------------------------------

    pub async fn list_vmspecs(&self, connection_name: &str) -> Result<Vec<SpecWireInfo>> {
        let list: SpecList = self
            .call(
                Method::GET,
                "/vmspec",
                connection_name,
                None::<()>,
                TimeoutClass::Short,
            )
            .await?;
        Ok(list.vmspec)
    }

    pub async fn list_vmimages(&self, connection_name: &str) -> Result<Vec<ImageWireInfo>> {
        let list: ImageList = self
            .call(
                Method::GET,
                "/vmimage",
                connection_name,
                None::<()>,
                TimeoutClass::Short,
            )
            .await?;
        Ok(list.image)
    }

    // -------------------------------------------------------------------------
    // Site-to-site VPN (long-running)
    // -------------------------------------------------------------------------

    pub async fn create_vpn(
        &self,
        connection_name: &str,
        req: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        self.call(
            Method::POST,
            "/vpn",
            connection_name,
            Some(req),
            TimeoutClass::Long(timeout),
        )
        .await
    }

    pub async fn delete_vpn(
        &self,
        connection_name: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &format!("/vpn/{}", name),
                connection_name,
                None::<()>,
                TimeoutClass::Long(timeout),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_shape() {
        let body = BrokerRequest {
            connection_name: "aws-us-east-1".to_string(),
            req_info: Some(VpcReq {
                name: "u-1".into(),
                ipv4_cidr: "10.0.0.0/16".into(),
                subnet_info_list: vec![SubnetWireReq {
                    name: "u-2".into(),
                    ipv4_cidr: "10.0.1.0/24".into(),
                    zone: "us-east-1a".into(),
                }],
            }),
            id_transform_mode: "ON",
        };

        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["ConnectionName"], "aws-us-east-1");
        assert_eq!(v["IDTransformMode"], "ON");
        assert_eq!(v["ReqInfo"]["IPv4_CIDR"], "10.0.0.0/16");
        assert_eq!(v["ReqInfo"]["SubnetInfoList"][0]["Name"], "u-2");
    }

    #[test]
    fn test_iid_decoding_defaults() {
        let info: VpcInfo = serde_json::from_str(
            r#"{"IId":{"NameId":"u-1","SystemId":"vpc-123"},"IPv4_CIDR":"10.0.0.0/16"}"#,
        )
        .unwrap();
        assert_eq!(info.iid.system_id, "vpc-123");
        assert!(info.subnet_info_list.is_empty());
    }

    #[test]
    fn test_timeout_classes() {
        assert_eq!(TimeoutClass::Short.duration(), Duration::from_secs(5));
        assert_eq!(TimeoutClass::Medium.duration(), Duration::from_secs(60));
        assert_eq!(
            TimeoutClass::Long(Duration::from_secs(600)).duration(),
            Duration::from_secs(600)
        );
    }
}
