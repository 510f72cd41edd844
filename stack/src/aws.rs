//! Read-only EC2 lookups used to check a stack against an account before it is deployed.

use crate::{
    config::Cidr,
    instance::{AMAZON_LINUX_NAME_PATTERN, INSTANCE_TYPE},
    Error,
};
pub use aws_config::Region;
use aws_config::BehaviorVersion;
pub use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::types::Filter;
use tracing::debug;

/// Owner alias of Amazon-published images
const AMAZON_OWNER: &str = "amazon";

/// Creates an EC2 client for the given region using the default credential chain.
pub async fn create_client(region: Region) -> Ec2Client {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .load()
        .await;
    Ec2Client::new(&config)
}

/// Finds the newest available Amazon Linux image matching [AMAZON_LINUX_NAME_PATTERN].
pub async fn find_latest_ami(client: &Ec2Client) -> Result<String, Error> {
    let resp = client
        .describe_images()
        .owners(AMAZON_OWNER)
        .filters(
            Filter::builder()
                .name("name")
                .values(AMAZON_LINUX_NAME_PATTERN)
                .build(),
        )
        .filters(Filter::builder().name("state").values("available").build())
        .filters(
            Filter::builder()
                .name("architecture")
                .values("x86_64")
                .build(),
        )
        .send()
        .await
        .map_err(|err| err.into_service_error())?;

    // Creation dates are ISO 8601, so lexical order is chronological
    let mut images = resp.images.unwrap_or_default();
    images.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
    let image = images
        .into_iter()
        .find_map(|image| image.image_id)
        .ok_or_else(|| Error::ImageNotFound(AMAZON_LINUX_NAME_PATTERN.to_string()))?;
    debug!(
        ami = image.as_str(),
        instance_type = INSTANCE_TYPE,
        "found latest Amazon Linux image"
    );
    Ok(image)
}

/// Returns whether a key pair named `name` exists in the client's region.
pub async fn key_pair_exists(client: &Ec2Client, name: &str) -> Result<bool, Error> {
    // Filtering (rather than naming the key) returns an empty list instead of an error
    let resp = client
        .describe_key_pairs()
        .filters(Filter::builder().name("key-name").values(name).build())
        .send()
        .await
        .map_err(|err| err.into_service_error())?;
    let exists = !resp.key_pairs.unwrap_or_default().is_empty();
    debug!(key = name, exists, "looked up key pair");
    Ok(exists)
}

/// Finds VPCs in the client's region whose primary CIDR block equals `cidr`.
pub async fn find_conflicting_vpcs(
    client: &Ec2Client,
    cidr: &Cidr,
) -> Result<Vec<String>, Error> {
    let resp = client
        .describe_vpcs()
        .filters(
            Filter::builder()
                .name("cidr-block")
                .values(cidr.to_string())
                .build(),
        )
        .send()
        .await
        .map_err(|err| err.into_service_error())?;
    let vpcs: Vec<String> = resp
        .vpcs
        .unwrap_or_default()
        .into_iter()
        .filter_map(|vpc| vpc.vpc_id)
        .collect();
    debug!(cidr = %cidr, count = vpcs.len(), "looked up VPCs with CIDR");
    Ok(vpcs)
}
