//! EC2 lookups against a LocalStack container.
//!
//! These tests need a running Docker daemon: `cargo test --test localstack -- --ignored`.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::config::Credentials;
use ec2_stack::{
    aws::{self, Ec2Client},
    config::Cidr,
};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const LOCALSTACK_IMAGE: &str = "localstack/localstack";
const LOCALSTACK_VERSION: &str = "latest";
const LOCALSTACK_PORT: u16 = 4566;
const REGION: &str = "us-east-1";

struct LocalStack {
    // Stopped when dropped
    _container: ContainerAsync<GenericImage>,
    client: Ec2Client,
}

impl LocalStack {
    async fn start() -> Self {
        let container = GenericImage::new(LOCALSTACK_IMAGE, LOCALSTACK_VERSION)
            .with_exposed_port(LOCALSTACK_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Ready."))
            .with_env_var("SERVICES", "ec2")
            .with_env_var("AWS_DEFAULT_REGION", REGION)
            .start()
            .await
            .unwrap();
        let port = container
            .get_host_port_ipv4(LOCALSTACK_PORT.tcp())
            .await
            .unwrap();

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(REGION))
            .endpoint_url(format!("http://localhost:{port}"))
            .credentials_provider(Credentials::new("test", "test", None, None, "static"))
            .load()
            .await;
        Self {
            _container: container,
            client: Ec2Client::new(&config),
        }
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_key_pair_exists() {
    let localstack = LocalStack::start().await;
    let client = &localstack.client;

    assert!(!aws::key_pair_exists(client, "demo-key").await.unwrap());

    client
        .create_key_pair()
        .key_name("demo-key")
        .send()
        .await
        .unwrap();
    assert!(aws::key_pair_exists(client, "demo-key").await.unwrap());
    assert!(!aws::key_pair_exists(client, "other-key").await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_find_conflicting_vpcs() {
    let localstack = LocalStack::start().await;
    let client = &localstack.client;
    let cidr: Cidr = "10.42.0.0/16".parse().unwrap();

    assert!(aws::find_conflicting_vpcs(client, &cidr)
        .await
        .unwrap()
        .is_empty());

    let vpc = client
        .create_vpc()
        .cidr_block(cidr.to_string())
        .send()
        .await
        .unwrap()
        .vpc
        .and_then(|vpc| vpc.vpc_id)
        .unwrap();
    let vpcs = aws::find_conflicting_vpcs(client, &cidr).await.unwrap();
    assert_eq!(vpcs, vec![vpc]);

    // Only VPCs with the same primary block conflict
    let other: Cidr = "10.43.0.0/16".parse().unwrap();
    assert!(aws::find_conflicting_vpcs(client, &other)
        .await
        .unwrap()
        .is_empty());
}
