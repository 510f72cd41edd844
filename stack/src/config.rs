//! Configuration of the stack definition.
//!
//! A [Config] is assembled from environment variables ([Config::from_vars]) or a YAML file
//! ([Config::from_file]) and validated eagerly: every missing required key is reported at once
//! and no descriptor is built from a partial configuration.

use crate::{security_group::IngressRule, Error};
use serde::Deserialize;
use serde_yaml::Value;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    fs::File,
    io::Read,
    net::Ipv4Addr,
    path::Path,
    str::FromStr,
};

/// Stack name used when none is configured
pub const DEFAULT_STACK_NAME: &str = "CdkDeployEc2Stack";

/// Subnet mask used when none is configured
pub const DEFAULT_SUBNET_CIDR_MASK: u8 = 24;

/// Smallest prefix (largest block) AWS accepts for a VPC or subnet
pub const MIN_PREFIX: u8 = 16;

/// Largest prefix (smallest block) AWS accepts for a VPC or subnet
pub const MAX_PREFIX: u8 = 28;

/// Ports opened by the `ssh` ingress preset
pub const SSH_PORTS: &[u16] = &[22];

/// Ports opened by the `web` ingress preset
pub const WEB_PORTS: &[u16] = &[22, 80, 443, 8000, 8080];

/// Longest security group description CloudFormation accepts
pub const MAX_DESCRIPTION_LEN: usize = 255;

pub const STACK_NAME_VAR: &str = "STACK_NAME";
pub const SUBNET_CIDR_MASK_VAR: &str = "SUBNET_CIDR_MASK";
pub const INGRESS_VAR: &str = "INGRESS";
pub const PUBLIC_IP_VAR: &str = "PUBLIC_IP";

/// Required configuration keys, in the order they are reported when missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    VpcName,
    Cidr,
    Subnet,
    SecurityGroup,
    KeyName,
    InstanceRole,
    Instance,
}

impl Key {
    pub const REQUIRED: [Key; 7] = [
        Key::VpcName,
        Key::Cidr,
        Key::Subnet,
        Key::SecurityGroup,
        Key::KeyName,
        Key::InstanceRole,
        Key::Instance,
    ];

    /// Name of the environment variable holding this key.
    pub const fn var(&self) -> &'static str {
        match self {
            Key::VpcName => "VPC_NAME",
            Key::Cidr => "CIDR",
            Key::Subnet => "SUBNET",
            Key::SecurityGroup => "SECURITY_GROUP",
            Key::KeyName => "KEY_NAME",
            Key::InstanceRole => "EC2_INSTANCE_ROLE",
            Key::Instance => "EC2_INSTANCE",
        }
    }

    /// Name of the YAML field holding this key.
    pub const fn field(&self) -> &'static str {
        match self {
            Key::VpcName => "vpc_name",
            Key::Cidr => "cidr",
            Key::Subnet => "subnet",
            Key::SecurityGroup => "security_group",
            Key::KeyName => "key_name",
            Key::InstanceRole => "instance_role",
            Key::Instance => "instance",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.var())
    }
}

/// An IPv4 network block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns the first block of size `/mask` inside this one.
    pub fn first_subnet(&self, mask: u8) -> Result<Cidr, Error> {
        if mask < self.prefix || mask > MAX_PREFIX {
            return Err(Error::InvalidSubnetMask {
                mask,
                prefix: self.prefix,
            });
        }
        Ok(Cidr {
            address: self.address,
            prefix: mask,
        })
    }
}

fn netmask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0)
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidCidr(s.to_string());
        let (address, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if !(MIN_PREFIX..=MAX_PREFIX).contains(&prefix) {
            return Err(invalid());
        }

        // Host bits must be clear
        if u32::from(address) & !netmask(prefix) != 0 {
            return Err(invalid());
        }
        Ok(Cidr { address, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// TCP ports opened to `0.0.0.0/0` by the security group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Ingress {
    /// SSH only
    Ssh,
    /// SSH, HTTP, HTTPS and the two application ports
    #[default]
    Web,
    /// An explicit, non-empty list of unique ports
    Ports(Vec<u16>),
}

impl Ingress {
    pub fn ports(&self) -> &[u16] {
        match self {
            Ingress::Ssh => SSH_PORTS,
            Ingress::Web => WEB_PORTS,
            Ingress::Ports(ports) => ports,
        }
    }

    pub fn rules(&self) -> Vec<IngressRule> {
        self.ports().iter().map(|port| IngressRule::tcp(*port)).collect()
    }

    /// Description attached to the security group.
    pub fn description(&self) -> String {
        match self {
            Ingress::Ssh => "SSH access".to_string(),
            Ingress::Web => "HTTP, HTTPS, SSH, and application ports access".to_string(),
            Ingress::Ports(ports) => {
                let listed: Vec<String> = ports.iter().map(u16::to_string).collect();
                let description = format!("TCP access on ports {}", listed.join(", "));
                if description.len() > MAX_DESCRIPTION_LEN {
                    return format!("TCP access on {} ports", ports.len());
                }
                description
            }
        }
    }

    fn from_ports(ports: Vec<u16>) -> Result<Self, Error> {
        if ports.is_empty() {
            return Err(Error::EmptyIngress);
        }
        let mut seen = BTreeSet::new();
        for port in &ports {
            if *port == 0 {
                return Err(Error::InvalidPort(port.to_string()));
            }
            if !seen.insert(*port) {
                return Err(Error::DuplicatePort(*port));
            }
        }
        Ok(Ingress::Ports(ports))
    }
}

impl FromStr for Ingress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ssh" => Ok(Ingress::Ssh),
            "web" => Ok(Ingress::Web),
            "" => Err(Error::EmptyIngress),
            list => {
                let ports = list
                    .split(',')
                    .map(|port| {
                        let port = port.trim();
                        port.parse::<u16>()
                            .map_err(|_| Error::InvalidPort(port.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ingress::from_ports(ports)
            }
        }
    }
}

/// How the published `InstancePublicIP` output is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PublicIp {
    /// Allocate an Elastic IP and associate it with the instance
    #[default]
    Elastic,
    /// Publish the address assigned to the instance at launch
    Instance,
}

impl FromStr for PublicIp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "elastic" => Ok(PublicIp::Elastic),
            "instance" => Ok(PublicIp::Instance),
            other => Err(Error::InvalidValue {
                key: PUBLIC_IP_VAR,
                value: other.to_string(),
            }),
        }
    }
}

/// Validated configuration of a stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub stack_name: String,
    pub vpc_name: String,
    pub cidr: Cidr,
    pub subnet: String,
    pub subnet_cidr_mask: u8,
    pub security_group: String,
    pub key_name: String,
    pub instance_role: String,
    pub instance: String,
    pub ingress: Ingress,
    pub public_ip: PublicIp,
}

impl Config {
    /// Builds a configuration from `(name, value)` pairs named like the environment variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |name: &str| vars.get(name).cloned();
        let optional = |name: &str| get(name).map(Value::String);

        RawConfig {
            stack_name: optional(STACK_NAME_VAR),
            vpc_name: get(Key::VpcName.var()),
            cidr: get(Key::Cidr.var()),
            subnet: get(Key::Subnet.var()),
            subnet_cidr_mask: optional(SUBNET_CIDR_MASK_VAR),
            security_group: get(Key::SecurityGroup.var()),
            key_name: get(Key::KeyName.var()),
            instance_role: get(Key::InstanceRole.var()),
            instance: get(Key::Instance.var()),
            ingress: optional(INGRESS_VAR),
            public_ip: optional(PUBLIC_IP_VAR),
        }
        .validate()
    }

    /// Builds a configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a configuration from a YAML document.
    pub fn from_yaml<R: Read>(reader: R) -> Result<Self, Error> {
        let raw: RawConfig = serde_yaml::from_reader(reader)?;
        raw.validate()
    }

    /// Builds a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::from_yaml(file)
    }
}

/// Configuration as read, before validation.
///
/// Optional values stay untyped until every required key is known to be present.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    stack_name: Option<Value>,
    vpc_name: Option<String>,
    cidr: Option<String>,
    subnet: Option<String>,
    subnet_cidr_mask: Option<Value>,
    security_group: Option<String>,
    key_name: Option<String>,
    instance_role: Option<String>,
    instance: Option<String>,
    ingress: Option<Value>,
    public_ip: Option<Value>,
}

/// Trims a value, treating blank values as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Reads an optional scalar, treating null and blank values as absent.
fn scalar(key: &'static str, value: &Option<Value>) -> Result<Option<String>, Error> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(value)) => value.trim().to_string(),
        Some(Value::Number(value)) => value.to_string(),
        Some(Value::Bool(value)) => value.to_string(),
        Some(other) => {
            return Err(Error::InvalidValue {
                key,
                value: serde_yaml::to_string(other)?.trim().to_string(),
            })
        }
    };
    Ok(Some(value).filter(|value| !value.is_empty()))
}

/// Checks that a construct name can be used as a construct path segment.
fn construct_name(key: &'static str, name: &str) -> Result<String, Error> {
    if name.contains('/') {
        return Err(Error::InvalidValue {
            key,
            value: name.to_string(),
        });
    }
    Ok(name.to_string())
}

impl RawConfig {
    fn value(&self, key: Key) -> Option<&str> {
        present(match key {
            Key::VpcName => &self.vpc_name,
            Key::Cidr => &self.cidr,
            Key::Subnet => &self.subnet,
            Key::SecurityGroup => &self.security_group,
            Key::KeyName => &self.key_name,
            Key::InstanceRole => &self.instance_role,
            Key::Instance => &self.instance,
        })
    }

    fn check_required(&self) -> Result<(), Error> {
        let missing: Vec<Key> = Key::REQUIRED
            .into_iter()
            .filter(|key| self.value(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingKeys(missing));
        }
        Ok(())
    }

    fn ingress(&self) -> Result<Ingress, Error> {
        if let Some(ports @ Value::Sequence(_)) = &self.ingress {
            return Ingress::from_ports(serde_yaml::from_value(ports.clone())?);
        }
        match scalar(INGRESS_VAR, &self.ingress)? {
            None => Ok(Ingress::default()),
            Some(value) => value.parse(),
        }
    }

    fn validate(self) -> Result<Config, Error> {
        self.check_required()?;
        let required = |key: Key| self.value(key).unwrap_or_default();
        let name = |key: Key| construct_name(key.var(), required(key));

        let cidr: Cidr = required(Key::Cidr).parse()?;
        let subnet_cidr_mask = match scalar(SUBNET_CIDR_MASK_VAR, &self.subnet_cidr_mask)? {
            None => DEFAULT_SUBNET_CIDR_MASK,
            Some(mask) => mask.parse().map_err(|_| Error::InvalidValue {
                key: SUBNET_CIDR_MASK_VAR,
                value: mask,
            })?,
        };
        cidr.first_subnet(subnet_cidr_mask)?;
        let ingress = self.ingress()?;
        let public_ip = match scalar(PUBLIC_IP_VAR, &self.public_ip)? {
            None => PublicIp::default(),
            Some(value) => value.parse()?,
        };
        let stack_name = match scalar(STACK_NAME_VAR, &self.stack_name)? {
            None => DEFAULT_STACK_NAME.to_string(),
            Some(value) => construct_name(STACK_NAME_VAR, &value)?,
        };

        Ok(Config {
            stack_name,
            vpc_name: name(Key::VpcName)?,
            cidr,
            subnet: name(Key::Subnet)?,
            subnet_cidr_mask,
            security_group: name(Key::SecurityGroup)?,
            key_name: required(Key::KeyName).to_string(),
            instance_role: name(Key::InstanceRole)?,
            instance: name(Key::Instance)?,
            ingress,
            public_ip,
        })
    }
}
