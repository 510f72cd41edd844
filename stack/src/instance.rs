//! EC2 instance placed in the public subnet.

use crate::{
    iam::Role,
    network::Network,
    security_group::SecurityGroup,
    template::{self, Parameter, Resource, Template},
    Error,
};
use serde_json::{json, Value};

/// Instance type of the stack's only instance
pub const INSTANCE_TYPE: &str = "t2.micro";

/// Public SSM parameter resolving to the latest Amazon Linux AMI
pub const AMAZON_LINUX_PARAMETER: &str =
    "/aws/service/ami-amazon-linux-latest/amzn-ami-hvm-x86_64-gp2";

/// Name pattern of the images behind [AMAZON_LINUX_PARAMETER]
pub const AMAZON_LINUX_NAME_PATTERN: &str = "amzn-ami-hvm-*-x86_64-gp2";

/// Logical id of the template parameter carrying the resolved image
pub const IMAGE_PARAMETER_ID: &str = "LatestAmazonLinuxImageId";

/// Type of [IMAGE_PARAMETER_ID]
const IMAGE_PARAMETER_TYPE: &str = "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>";

/// Image the instance boots from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MachineImage {
    /// Resolved by CloudFormation from [AMAZON_LINUX_PARAMETER] at deploy time
    #[default]
    LatestAmazonLinux,
    /// A concrete AMI id
    Pinned(String),
}

/// The stack's instance and the profile that carries its role.
#[derive(Clone, Debug)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub path: String,
    pub profile_id: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub role_id: String,
    /// Resources that make the subnet reach the internet
    pub connectivity_ids: Vec<String>,
    pub key_name: String,
    pub instance_type: &'static str,
    pub image: MachineImage,
}

impl Instance {
    pub fn new(
        stack: &str,
        name: &str,
        network: &Network,
        security_group: &SecurityGroup,
        role: &Role,
        key_name: &str,
    ) -> Self {
        Self {
            id: template::logical_id(stack, &[name]),
            name: name.to_string(),
            path: template::path(stack, &[name]),
            profile_id: template::logical_id(stack, &[name, "InstanceProfile"]),
            vpc_id: network.id.clone(),
            subnet_id: network.public_subnet().id.clone(),
            security_group_id: security_group.id.clone(),
            role_id: role.id.clone(),
            connectivity_ids: vec![
                network.public_subnet().association_id.clone(),
                network.public_subnet().default_route_id.clone(),
            ],
            key_name: key_name.to_string(),
            instance_type: INSTANCE_TYPE,
            image: MachineImage::default(),
        }
    }

    fn image_id(&self, template: &mut Template) -> Result<Value, Error> {
        match &self.image {
            MachineImage::LatestAmazonLinux => {
                template.add_parameter(
                    IMAGE_PARAMETER_ID,
                    Parameter {
                        kind: IMAGE_PARAMETER_TYPE.to_string(),
                        default: AMAZON_LINUX_PARAMETER.to_string(),
                    },
                )?;
                Ok(template::reference(IMAGE_PARAMETER_ID))
            }
            MachineImage::Pinned(ami) => Ok(json!(ami)),
        }
    }

    pub(crate) fn synth(&self, template: &mut Template) -> Result<(), Error> {
        template.add_resource(
            &self.profile_id,
            Resource::new(
                "AWS::IAM::InstanceProfile",
                json!({ "Roles": [template::reference(&self.role_id)] }),
            ),
        )?;
        let image_id = self.image_id(template)?;

        // The profile only carries the role's permissions once the role exists, and the
        // instance only gets a reachable public address once the default route is in place
        let mut resource = Resource::new(
            "AWS::EC2::Instance",
            json!({
                "AvailabilityZone": template::first_availability_zone(),
                "IamInstanceProfile": template::reference(&self.profile_id),
                "ImageId": image_id,
                "InstanceType": self.instance_type,
                "KeyName": self.key_name,
                "SecurityGroupIds": [template::get_att(&self.security_group_id, "GroupId")],
                "SubnetId": template::reference(&self.subnet_id),
                "Tags": template::name_tag(&self.path),
            }),
        )
        .depends_on(&self.role_id);
        for id in &self.connectivity_ids {
            resource = resource.depends_on(id);
        }
        template.add_resource(&self.id, resource)
    }
}
