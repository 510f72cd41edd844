//! Assembly of the stack from a validated configuration.

use crate::{
    config::{Config, PublicIp},
    iam::Role,
    instance::{Instance, MachineImage},
    network::Network,
    output::{PublicAddress, ELASTIC_IP_NAME},
    security_group::SecurityGroup,
    template::Template,
    Error,
};
use std::collections::HashSet;
use tracing::{debug, info};

/// Network, security group, role, instance and published address of one deployment.
#[derive(Clone, Debug)]
pub struct Stack {
    name: String,
    network: Network,
    security_group: SecurityGroup,
    role: Role,
    instance: Instance,
    output: PublicAddress,
}

impl Stack {
    /// Builds every descriptor of the stack.
    ///
    /// Construct names must be unique within the stack (an Elastic IP, when bound, is named
    /// `ElasticIp`).
    pub fn new(config: &Config) -> Result<Self, Error> {
        let stack = config.stack_name.as_str();
        let mut names = HashSet::new();
        let mut constructs = vec![
            config.vpc_name.as_str(),
            config.security_group.as_str(),
            config.instance_role.as_str(),
            config.instance.as_str(),
        ];
        if config.public_ip == PublicIp::Elastic {
            constructs.push(ELASTIC_IP_NAME);
        }
        for name in constructs {
            if !names.insert(name) {
                return Err(Error::DuplicateConstructName(name.to_string()));
            }
        }

        let network = Network::new(
            stack,
            &config.vpc_name,
            config.cidr,
            &config.subnet,
            config.subnet_cidr_mask,
        )?;
        debug!(
            vpc = network.id.as_str(),
            cidr = %network.cidr,
            subnet = %network.public_subnet().cidr,
            "built network"
        );

        let mut security_group = SecurityGroup::new(
            stack,
            &config.security_group,
            &network,
            config.ingress.description(),
        );
        for rule in config.ingress.rules() {
            security_group.add_ingress_rule(rule)?;
        }
        debug!(
            security_group = security_group.id.as_str(),
            ports = ?security_group.ports(),
            "built security group"
        );

        let role = Role::new(stack, &config.instance_role);
        debug!(role = role.id.as_str(), "built role");

        let instance = Instance::new(
            stack,
            &config.instance,
            &network,
            &security_group,
            &role,
            &config.key_name,
        );
        debug!(
            instance = instance.id.as_str(),
            key = instance.key_name.as_str(),
            "built instance"
        );

        let output = PublicAddress::new(stack, config.public_ip, &network, &instance);
        info!(stack, binding = ?output.binding, "built stack");

        Ok(Self {
            name: stack.to_string(),
            network,
            security_group,
            role,
            instance,
            output,
        })
    }

    /// Replaces the image the instance boots from.
    pub fn with_image(mut self, image: MachineImage) -> Self {
        self.instance.image = image;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn output(&self) -> &PublicAddress {
        &self.output
    }

    /// Synthesizes the CloudFormation template of the stack.
    pub fn synth(&self) -> Result<Template, Error> {
        let description = format!(
            "{}: single-AZ VPC with one EC2 instance ({})",
            self.name, self.instance.instance_type
        );
        let mut template = Template::new(&description);
        self.network.synth(&mut template)?;
        self.security_group.synth(&mut template)?;
        self.role.synth(&mut template)?;
        self.instance.synth(&mut template)?;
        self.output.synth(&mut template)?;
        info!(
            stack = self.name.as_str(),
            resources = template.resources().len(),
            parameters = template.parameters().len(),
            "synthesized template"
        );
        Ok(template)
    }
}
