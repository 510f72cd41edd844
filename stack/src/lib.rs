//! Define a single-AZ VPC and EC2 instance as a CloudFormation template.
//!
//! # Overview
//!
//! A [stack::Stack] is built from a validated [config::Config] and contains:
//!
//! * A VPC with exactly one availability zone and one public subnet (plus the internet gateway
//!   and default route that make the subnet public).
//! * A security group on that VPC that allows all egress and opens the configured TCP ports to
//!   `0.0.0.0/0`.
//! * An IAM role assumable by `ec2.amazonaws.com` carrying `AmazonSSMManagedInstanceCore`.
//! * A `t2.micro` instance in the public subnet using the latest Amazon Linux image, the security
//!   group, the role (through an instance profile) and an existing key pair.
//! * One output, `InstancePublicIP`, holding either an Elastic IP bound to the instance or the
//!   instance's own public address.
//!
//! Nothing is provisioned here. [stack::Stack::synth] produces a [template::Template] that is
//! handed to CloudFormation (or any compatible engine), which owns creation, diffing and rollback.
//!
//! # Configuration
//!
//! Required keys (environment variable / YAML field):
//!
//! | Variable            | Field            | Meaning                           |
//! |---------------------|------------------|-----------------------------------|
//! | `VPC_NAME`          | `vpc_name`       | Name of the VPC construct         |
//! | `CIDR`              | `cidr`           | VPC CIDR block (`/16` to `/28`)   |
//! | `SUBNET`            | `subnet`         | Name of the public subnet         |
//! | `SECURITY_GROUP`    | `security_group` | Name of the security group        |
//! | `KEY_NAME`          | `key_name`       | Existing EC2 key pair             |
//! | `EC2_INSTANCE_ROLE` | `instance_role`  | Name of the IAM role              |
//! | `EC2_INSTANCE`      | `instance`       | Name of the instance              |
//!
//! Optional keys: `STACK_NAME` (`stack_name`), `SUBNET_CIDR_MASK` (`subnet_cidr_mask`, default
//! `24`), `INGRESS` (`ingress`: `ssh`, `web` or a list of ports, default `web`) and `PUBLIC_IP`
//! (`public_ip`: `elastic` or `instance`, default `elastic`). Blank optional values use the
//! default. Construct names may not contain `/`.
//!
//! ```yaml
//! vpc_name: demo-vpc
//! cidr: 10.0.0.0/16
//! subnet: demo-subnet
//! security_group: demo-sg
//! key_name: demo-key
//! instance_role: demo-role
//! instance: demo-instance
//! ingress: [22, 443]
//! public_ip: instance
//! ```
//!
//! # Example
//!
//! ```
//! use ec2_stack::{config::Config, stack::Stack};
//!
//! let config = Config::from_vars([
//!     ("VPC_NAME", "demo-vpc"),
//!     ("CIDR", "10.0.0.0/16"),
//!     ("SUBNET", "demo-subnet"),
//!     ("SECURITY_GROUP", "demo-sg"),
//!     ("KEY_NAME", "demo-key"),
//!     ("EC2_INSTANCE_ROLE", "demo-role"),
//!     ("EC2_INSTANCE", "demo-instance"),
//! ])
//! .unwrap();
//! let template = Stack::new(&config).unwrap().synth().unwrap();
//! assert_eq!(template.outputs().len(), 1);
//! ```

use thiserror::Error;

pub mod config;
pub mod iam;
pub mod instance;
pub mod network;
pub mod output;
pub mod security_group;
pub mod stack;
pub mod template;

cfg_if::cfg_if! {
    if #[cfg(feature = "aws")] {
        pub mod aws;
    }
}

use config::Key;

/// Errors that can occur while building or synthesizing a stack.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing required configuration: {}", join_keys(.0))]
    MissingKeys(Vec<Key>),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid CIDR block: {0}")]
    InvalidCidr(String),
    #[error("invalid subnet mask /{mask} for VPC prefix /{prefix}")]
    InvalidSubnetMask { mask: u8, prefix: u8 },
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("duplicate ingress port: {0}")]
    DuplicatePort(u16),
    #[error("no ingress ports configured")]
    EmptyIngress,
    #[error("duplicate construct name: {0}")]
    DuplicateConstructName(String),
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "aws")]
    #[error("AWS describe images error: {0}")]
    AwsDescribeImages(#[from] aws_sdk_ec2::operation::describe_images::DescribeImagesError),
    #[cfg(feature = "aws")]
    #[error("AWS describe key pairs error: {0}")]
    AwsDescribeKeyPairs(#[from] aws_sdk_ec2::operation::describe_key_pairs::DescribeKeyPairsError),
    #[cfg(feature = "aws")]
    #[error("AWS describe VPCs error: {0}")]
    AwsDescribeVpcs(#[from] aws_sdk_ec2::operation::describe_vpcs::DescribeVpcsError),
    #[cfg(feature = "aws")]
    #[error("no image found matching {0}")]
    ImageNotFound(String),
    #[cfg(feature = "aws")]
    #[error("key pair not found: {0}")]
    KeyPairNotFound(String),
}

fn join_keys(keys: &[Key]) -> String {
    keys.iter()
        .map(|key| key.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
