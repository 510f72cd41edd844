//! IAM role assumed by the instance.

use crate::{
    template::{self, Resource, Template},
    Error,
};
use serde_json::{json, Value};

/// Service principal allowed to assume the role
pub const EC2_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// AWS managed policy granting Systems Manager access
pub const SSM_MANAGED_POLICY: &str = "AmazonSSMManagedInstanceCore";

/// Version of the IAM policy language
const POLICY_VERSION: &str = "2012-10-17";

/// An AWS managed policy referenced by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedPolicy {
    pub name: String,
}

impl ManagedPolicy {
    pub fn aws_managed(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// ARN of the policy in the deployment partition.
    pub fn arn(&self) -> Value {
        template::join(vec![
            json!("arn:"),
            template::reference("AWS::Partition"),
            json!(format!(":iam::aws:policy/{}", self.name)),
        ])
    }
}

/// Role trusted by EC2 with the Systems Manager policy attached.
#[derive(Clone, Debug)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub path: String,
    principal: &'static str,
    policies: Vec<ManagedPolicy>,
}

impl Role {
    pub fn new(stack: &str, name: &str) -> Self {
        Self {
            id: template::logical_id(stack, &[name]),
            name: name.to_string(),
            path: template::path(stack, &[name]),
            principal: EC2_SERVICE_PRINCIPAL,
            policies: vec![ManagedPolicy::aws_managed(SSM_MANAGED_POLICY)],
        }
    }

    pub fn principal(&self) -> &str {
        self.principal
    }

    pub fn managed_policies(&self) -> &[ManagedPolicy] {
        &self.policies
    }

    pub(crate) fn synth(&self, template: &mut Template) -> Result<(), Error> {
        let policies: Vec<Value> = self.policies.iter().map(ManagedPolicy::arn).collect();
        template.add_resource(
            &self.id,
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": {
                        "Statement": [{
                            "Action": "sts:AssumeRole",
                            "Effect": "Allow",
                            "Principal": { "Service": self.principal },
                        }],
                        "Version": POLICY_VERSION,
                    },
                    "ManagedPolicyArns": policies,
                    "Tags": template::name_tag(&self.path),
                }),
            ),
        )
    }
}
