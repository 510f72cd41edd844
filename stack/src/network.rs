//! Single-AZ VPC with one public subnet.
//!
//! A public subnet on AWS is a subnet whose route table sends `0.0.0.0/0` to an internet gateway
//! attached to the VPC, so the gateway, its attachment, the route table, the association and the
//! default route are all part of the network.

use crate::{
    config::Cidr,
    template::{self, Resource, Template},
    Error,
};
use serde_json::json;
use std::slice;

/// Number of availability zones the network spans
pub const AVAILABILITY_ZONES: usize = 1;

/// Destination of the default route
const DEFAULT_ROUTE: &str = "0.0.0.0/0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubnetType {
    Public,
}

impl SubnetType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
        }
    }
}

/// The network's only subnet.
#[derive(Clone, Debug)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub path: String,
    pub cidr: Cidr,
    pub subnet_type: SubnetType,
    /// Index of the availability zone within the region
    pub availability_zone: usize,
    pub route_table_id: String,
    pub association_id: String,
    pub default_route_id: String,
}

/// VPC with exactly one public subnet in one availability zone.
#[derive(Clone, Debug)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub path: String,
    pub cidr: Cidr,
    pub gateway_id: String,
    pub attachment_id: String,
    subnet: Subnet,
}

impl Network {
    pub fn new(
        stack: &str,
        name: &str,
        cidr: Cidr,
        subnet_name: &str,
        subnet_cidr_mask: u8,
    ) -> Result<Self, Error> {
        let subnet_cidr = cidr.first_subnet(subnet_cidr_mask)?;
        let subnet_construct = format!("{subnet_name}Subnet1");
        let subnet_parts = [name, subnet_construct.as_str()];
        let subnet = Subnet {
            id: template::logical_id(stack, &subnet_parts),
            name: subnet_name.to_string(),
            path: template::path(stack, &subnet_parts),
            cidr: subnet_cidr,
            subnet_type: SubnetType::Public,
            availability_zone: 0,
            route_table_id: template::logical_id(
                stack,
                &[name, subnet_construct.as_str(), "RouteTable"],
            ),
            association_id: template::logical_id(
                stack,
                &[name, subnet_construct.as_str(), "RouteTableAssociation"],
            ),
            default_route_id: template::logical_id(
                stack,
                &[name, subnet_construct.as_str(), "DefaultRoute"],
            ),
        };
        Ok(Self {
            id: template::logical_id(stack, &[name]),
            name: name.to_string(),
            path: template::path(stack, &[name]),
            cidr,
            gateway_id: template::logical_id(stack, &[name, "IGW"]),
            attachment_id: template::logical_id(stack, &[name, "VPCGW"]),
            subnet,
        })
    }

    pub fn availability_zones(&self) -> usize {
        AVAILABILITY_ZONES
    }

    pub fn subnets(&self) -> &[Subnet] {
        slice::from_ref(&self.subnet)
    }

    pub fn public_subnet(&self) -> &Subnet {
        &self.subnet
    }

    pub(crate) fn synth(&self, template: &mut Template) -> Result<(), Error> {
        template.add_resource(
            &self.id,
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": self.cidr.to_string(),
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                    "Tags": template::name_tag(&self.path),
                }),
            ),
        )?;
        template.add_resource(
            &self.gateway_id,
            Resource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": template::name_tag(&self.path) }),
            ),
        )?;
        template.add_resource(
            &self.attachment_id,
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "InternetGatewayId": template::reference(&self.gateway_id),
                    "VpcId": template::reference(&self.id),
                }),
            ),
        )?;

        let subnet = &self.subnet;
        template.add_resource(
            &subnet.id,
            Resource::new(
                "AWS::EC2::Subnet",
                json!({
                    "AvailabilityZone": template::first_availability_zone(),
                    "CidrBlock": subnet.cidr.to_string(),
                    "MapPublicIpOnLaunch": true,
                    "Tags": [
                        { "Key": "aws-cdk:subnet-name", "Value": subnet.name },
                        { "Key": "aws-cdk:subnet-type", "Value": subnet.subnet_type.as_str() },
                        { "Key": "Name", "Value": subnet.path },
                    ],
                    "VpcId": template::reference(&self.id),
                }),
            ),
        )?;
        template.add_resource(
            &subnet.route_table_id,
            Resource::new(
                "AWS::EC2::RouteTable",
                json!({
                    "Tags": template::name_tag(&subnet.path),
                    "VpcId": template::reference(&self.id),
                }),
            ),
        )?;
        template.add_resource(
            &subnet.association_id,
            Resource::new(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": template::reference(&subnet.route_table_id),
                    "SubnetId": template::reference(&subnet.id),
                }),
            ),
        )?;

        // The route cannot exist before the gateway is attached
        template.add_resource(
            &subnet.default_route_id,
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "DestinationCidrBlock": DEFAULT_ROUTE,
                    "GatewayId": template::reference(&self.gateway_id),
                    "RouteTableId": template::reference(&subnet.route_table_id),
                }),
            )
            .depends_on(&self.attachment_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_network(mask: u8) -> Network {
        Network::new(
            "Stack",
            "demo-vpc",
            "10.0.0.0/16".parse().unwrap(),
            "demo-subnet",
            mask,
        )
        .unwrap()
    }

    #[test]
    fn test_single_public_subnet() {
        let network = demo_network(24);
        assert_eq!(network.availability_zones(), 1);
        assert_eq!(network.subnets().len(), 1);
        let subnet = network.public_subnet();
        assert_eq!(subnet.subnet_type, SubnetType::Public);
        assert_eq!(subnet.availability_zone, 0);
        assert_eq!(subnet.name, "demo-subnet");
        assert_eq!(subnet.cidr.to_string(), "10.0.0.0/24");
        assert_eq!(subnet.path, "Stack/demo-vpc/demo-subnetSubnet1");
    }

    #[test]
    fn test_subnet_mask() {
        assert_eq!(demo_network(20).public_subnet().cidr.to_string(), "10.0.0.0/20");
        assert!(matches!(
            Network::new("Stack", "vpc", "10.0.0.0/24".parse().unwrap(), "subnet", 16),
            Err(Error::InvalidSubnetMask { mask: 16, prefix: 24 })
        ));
    }

    #[test]
    fn test_synth() {
        let network = demo_network(24);
        let mut template = Template::new("test");
        network.synth(&mut template).unwrap();
        assert_eq!(template.resources().len(), 7);
        assert_eq!(template.resources_of_type("AWS::EC2::VPC").count(), 1);
        assert_eq!(template.resources_of_type("AWS::EC2::Subnet").count(), 1);

        let vpc = template.resource(&network.id).unwrap();
        assert_eq!(vpc.properties["CidrBlock"], "10.0.0.0/16");

        let subnet = template.resource(&network.public_subnet().id).unwrap();
        assert_eq!(subnet.properties["CidrBlock"], "10.0.0.0/24");
        assert_eq!(subnet.properties["MapPublicIpOnLaunch"], true);
        assert_eq!(subnet.properties["VpcId"], template::reference(&network.id));

        let route = template
            .resource(&network.public_subnet().default_route_id)
            .unwrap();
        assert_eq!(route.properties["DestinationCidrBlock"], DEFAULT_ROUTE);
        assert_eq!(route.properties["GatewayId"], template::reference(&network.gateway_id));
        assert_eq!(route.depends_on, vec![network.attachment_id.clone()]);
    }
}
