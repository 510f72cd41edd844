//! Security group attached to the stack's VPC.

use crate::{
    network::Network,
    template::{self, Resource, Template},
    Error,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Source of every ingress rule
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Description CloudFormation shows for the allow-all egress rule
const EGRESS_DESCRIPTION: &str = "Allow all outbound traffic by default";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Egress {
    AllowAll,
}

/// A single-port rule admitting traffic from [ANY_IPV4].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub port: u16,
    pub source: &'static str,
    pub description: String,
}

impl IngressRule {
    pub fn tcp(port: u16) -> Self {
        let description = match port {
            22 => "Allow SSH access".to_string(),
            80 => "Allow HTTP access".to_string(),
            443 => "Allow HTTPS access".to_string(),
            8000 | 8080 => "custom port for node service".to_string(),
            port => format!("Allow TCP {port} access"),
        };
        Self {
            protocol: Protocol::Tcp,
            port,
            source: ANY_IPV4,
            description,
        }
    }

    fn synth(&self) -> Value {
        json!({
            "CidrIp": self.source,
            "Description": format!("from {}:{} {}", self.source, self.port, self.description),
            "FromPort": self.port,
            "IpProtocol": self.protocol.as_str(),
            "ToPort": self.port,
        })
    }
}

/// Security group on the stack's VPC.
#[derive(Clone, Debug)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub path: String,
    pub vpc_id: String,
    pub description: String,
    pub egress: Egress,
    ingress: Vec<IngressRule>,
}

impl SecurityGroup {
    pub fn new(stack: &str, name: &str, network: &Network, description: String) -> Self {
        Self {
            id: template::logical_id(stack, &[name]),
            name: name.to_string(),
            path: template::path(stack, &[name]),
            vpc_id: network.id.clone(),
            description,
            egress: Egress::AllowAll,
            ingress: Vec::new(),
        }
    }

    /// Adds a rule. Rules are additive and each port may only be opened once.
    pub fn add_ingress_rule(&mut self, rule: IngressRule) -> Result<(), Error> {
        if self.ingress.iter().any(|existing| existing.port == rule.port) {
            return Err(Error::DuplicatePort(rule.port));
        }
        self.ingress.push(rule);
        Ok(())
    }

    pub fn ingress(&self) -> &[IngressRule] {
        &self.ingress
    }

    pub fn ports(&self) -> BTreeSet<u16> {
        self.ingress.iter().map(|rule| rule.port).collect()
    }

    pub(crate) fn synth(&self, template: &mut Template) -> Result<(), Error> {
        let egress = match self.egress {
            Egress::AllowAll => json!([{
                "CidrIp": ANY_IPV4,
                "Description": EGRESS_DESCRIPTION,
                "IpProtocol": "-1",
            }]),
        };
        let ingress: Vec<Value> = self.ingress.iter().map(IngressRule::synth).collect();
        template.add_resource(
            &self.id,
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": self.description,
                    "SecurityGroupEgress": egress,
                    "SecurityGroupIngress": ingress,
                    "Tags": template::name_tag(&self.path),
                    "VpcId": template::reference(&self.vpc_id),
                }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::demo_config;

    fn demo_group() -> SecurityGroup {
        let config = demo_config();
        let network = Network::new(
            &config.stack_name,
            &config.vpc_name,
            config.cidr,
            &config.subnet,
            config.subnet_cidr_mask,
        )
        .unwrap();
        SecurityGroup::new(
            &config.stack_name,
            &config.security_group,
            &network,
            config.ingress.description(),
        )
    }

    #[test]
    fn test_rule_descriptions() {
        assert_eq!(IngressRule::tcp(22).description, "Allow SSH access");
        assert_eq!(IngressRule::tcp(443).description, "Allow HTTPS access");
        assert_eq!(IngressRule::tcp(8080).description, "custom port for node service");
        assert_eq!(IngressRule::tcp(5432).description, "Allow TCP 5432 access");
        assert_eq!(IngressRule::tcp(5432).source, ANY_IPV4);
        assert_eq!(IngressRule::tcp(5432).protocol, Protocol::Tcp);
    }

    #[test]
    fn test_add_ingress_rule() {
        let mut group = demo_group();
        assert!(group.ingress().is_empty());
        group.add_ingress_rule(IngressRule::tcp(22)).unwrap();
        group.add_ingress_rule(IngressRule::tcp(80)).unwrap();
        assert!(matches!(
            group.add_ingress_rule(IngressRule::tcp(22)),
            Err(Error::DuplicatePort(22))
        ));
        assert_eq!(group.ports(), BTreeSet::from([22, 80]));
        assert_eq!(group.egress, Egress::AllowAll);
    }

    #[test]
    fn test_synth() {
        let mut group = demo_group();
        group.add_ingress_rule(IngressRule::tcp(22)).unwrap();
        let mut template = Template::new("test");
        group.synth(&mut template).unwrap();

        let resource = template.resource(&group.id).unwrap();
        assert_eq!(resource.kind, "AWS::EC2::SecurityGroup");
        let properties = &resource.properties;
        assert_eq!(properties["VpcId"], json!({ "Ref": group.vpc_id }));
        assert_eq!(properties["SecurityGroupEgress"][0]["IpProtocol"], "-1");
        assert_eq!(properties["SecurityGroupEgress"][0]["CidrIp"], ANY_IPV4);
        let ingress = properties["SecurityGroupIngress"].as_array().unwrap();
        assert_eq!(ingress.len(), 1);
        assert_eq!(ingress[0]["FromPort"], 22);
        assert_eq!(ingress[0]["ToPort"], 22);
        assert_eq!(ingress[0]["IpProtocol"], "tcp");
    }
}
