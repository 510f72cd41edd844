//! Published public address of the instance.

use crate::{
    config::PublicIp,
    instance::Instance,
    network::Network,
    template::{self, Output, Resource, Template},
    Error,
};
use serde_json::json;

/// Name of the only output of the stack
pub const OUTPUT_NAME: &str = "InstancePublicIP";

/// Construct name of the Elastic IP
pub const ELASTIC_IP_NAME: &str = "ElasticIp";

/// Source of the published address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputBinding {
    /// An Elastic IP (with the given logical id) associated with the instance
    ElasticIp { id: String },
    /// The address assigned to the instance at launch
    InstancePublicIp,
}

#[derive(Clone, Debug)]
pub struct PublicAddress {
    pub binding: OutputBinding,
    pub instance_id: String,
    /// Gateway attachment an Elastic IP must wait for
    pub attachment_id: String,
}

impl PublicAddress {
    pub fn new(stack: &str, public_ip: PublicIp, network: &Network, instance: &Instance) -> Self {
        let binding = match public_ip {
            PublicIp::Elastic => OutputBinding::ElasticIp {
                id: template::logical_id(stack, &[ELASTIC_IP_NAME]),
            },
            PublicIp::Instance => OutputBinding::InstancePublicIp,
        };
        Self {
            binding,
            instance_id: instance.id.clone(),
            attachment_id: network.attachment_id.clone(),
        }
    }

    pub(crate) fn synth(&self, template: &mut Template) -> Result<(), Error> {
        let output = match &self.binding {
            OutputBinding::ElasticIp { id } => {
                template.add_resource(
                    id,
                    Resource::new(
                        "AWS::EC2::EIP",
                        json!({ "InstanceId": template::reference(&self.instance_id) }),
                    )
                    .depends_on(&self.attachment_id),
                )?;
                Output {
                    description: "Elastic IP of the EC2 instance".to_string(),
                    value: template::reference(id),
                }
            }
            OutputBinding::InstancePublicIp => Output {
                description: "Public IP of the EC2 instance".to_string(),
                value: template::get_att(&self.instance_id, "PublicIp"),
            },
        };
        template.add_output(OUTPUT_NAME, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{iam::Role, network::Network, security_group::SecurityGroup};

    fn address(public_ip: PublicIp) -> (PublicAddress, Instance) {
        let network =
            Network::new("Stack", "vpc", "10.0.0.0/16".parse().unwrap(), "subnet", 24).unwrap();
        let group = SecurityGroup::new("Stack", "sg", &network, "test".to_string());
        let role = Role::new("Stack", "role");
        let instance = Instance::new("Stack", "instance", &network, &group, &role, "key");
        let address = PublicAddress::new("Stack", public_ip, &network, &instance);
        assert_eq!(address.attachment_id, network.attachment_id);
        (address, instance)
    }

    #[test]
    fn test_elastic_ip() {
        let (address, instance) = address(PublicIp::Elastic);
        assert!(matches!(address.binding, OutputBinding::ElasticIp { .. }));
        let mut template = Template::new("test");
        address.synth(&mut template).unwrap();

        let (id, eip) = template.resources_of_type("AWS::EC2::EIP").next().unwrap();
        assert_eq!(eip.properties["InstanceId"], template::reference(&instance.id));
        assert_eq!(eip.depends_on, vec![address.attachment_id.clone()]);
        let output = &template.outputs()[OUTPUT_NAME];
        assert_eq!(output.value, template::reference(id));
        assert_eq!(template.outputs().len(), 1);
    }

    #[test]
    fn test_instance_public_ip() {
        let (address, instance) = address(PublicIp::Instance);
        assert_eq!(address.binding, OutputBinding::InstancePublicIp);
        let mut template = Template::new("test");
        address.synth(&mut template).unwrap();

        assert!(template.resources().is_empty());
        let output = &template.outputs()[OUTPUT_NAME];
        assert_eq!(output.value, template::get_att(&instance.id, "PublicIp"));
    }
}
