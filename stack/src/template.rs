//! CloudFormation template model and intrinsic function helpers.

use crate::Error;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Template format version accepted by CloudFormation
pub const FORMAT_VERSION: &str = "2010-09-09";

/// Number of hash bytes appended to a logical id
const ID_HASH_BYTES: usize = 4;

/// Longest logical id CloudFormation accepts
pub const MAX_LOGICAL_ID_LEN: usize = 255;

/// Returns the construct path of `parts` inside `stack`.
pub fn path(stack: &str, parts: &[&str]) -> String {
    let mut path = stack.to_string();
    for part in parts {
        path.push('/');
        path.push_str(part);
    }
    path
}

/// Derives a stable logical id for the construct at `parts` inside `stack`.
///
/// The id is the alphanumeric characters of `parts` followed by the upper-case hex encoding of
/// the first bytes of the SHA-256 digest of the full path. Distinct paths that sanitize to the
/// same prefix still receive distinct ids. The prefix is truncated so the id never exceeds
/// [MAX_LOGICAL_ID_LEN].
pub fn logical_id(stack: &str, parts: &[&str]) -> String {
    let mut id: String = parts
        .iter()
        .flat_map(|part| part.chars())
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_LOGICAL_ID_LEN - ID_HASH_BYTES * 2)
        .collect();
    let digest = Sha256::digest(path(stack, parts).as_bytes());
    for byte in digest.iter().take(ID_HASH_BYTES) {
        id.push_str(&format!("{byte:02X}"));
    }
    id
}

/// `{ "Ref": id }`
pub fn reference(id: &str) -> Value {
    json!({ "Ref": id })
}

/// `{ "Fn::GetAtt": [id, attribute] }`
pub fn get_att(id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id, attribute] })
}

/// `{ "Fn::Join": ["", parts] }`
pub fn join(parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": ["", parts] })
}

/// First availability zone of the deployment region.
pub fn first_availability_zone() -> Value {
    json!({ "Fn::Select": [0, { "Fn::GetAZs": "" }] })
}

/// Tag list naming a resource after its construct path.
pub fn name_tag(path: &str) -> Value {
    json!([{ "Key": "Name", "Value": path }])
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(kind: &str, properties: Value) -> Self {
        Self {
            kind: kind.to_string(),
            properties,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.depends_on.push(id.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub kind: String,
    pub default: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub description: String,
    pub value: Value,
}

/// A synthesized CloudFormation template.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, Parameter>,
    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: &str) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            description: description.to_string(),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Adds a resource, failing if the logical id is already taken by anything in the template.
    pub fn add_resource(&mut self, id: &str, resource: Resource) -> Result<(), Error> {
        self.check_unused(id)?;
        self.resources.insert(id.to_string(), resource);
        Ok(())
    }

    pub fn add_parameter(&mut self, id: &str, parameter: Parameter) -> Result<(), Error> {
        self.check_unused(id)?;
        self.parameters.insert(id.to_string(), parameter);
        Ok(())
    }

    pub fn add_output(&mut self, id: &str, output: Output) -> Result<(), Error> {
        if self.outputs.contains_key(id) {
            return Err(Error::DuplicateLogicalId(id.to_string()));
        }
        self.outputs.insert(id.to_string(), output);
        Ok(())
    }

    fn check_unused(&self, id: &str) -> Result<(), Error> {
        if self.resources.contains_key(id) || self.parameters.contains_key(id) {
            return Err(Error::DuplicateLogicalId(id.to_string()));
        }
        Ok(())
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Returns the resources of the given CloudFormation type.
    pub fn resources_of_type<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.kind == kind)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Serialization format of an emitted template.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    pub const VALUES: [&'static str; 2] = ["json", "yaml"];

    pub fn render(&self, template: &Template) -> Result<String, Error> {
        match self {
            Format::Json => template.to_json(),
            Format::Yaml => template.to_yaml(),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            other => Err(Error::InvalidValue {
                key: "format",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("json"),
            Format::Yaml => f.write_str("yaml"),
        }
    }
}

/// Collects every logical id referenced through `Ref` or `Fn::GetAtt` inside `value`.
pub fn references(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("Ref") {
                found.push(id.clone());
            }
            if let Some(Value::String(id)) = map
                .get("Fn::GetAtt")
                .and_then(|att| att.get(0))
            {
                found.push(id.clone());
            }
            for child in map.values() {
                collect_references(child, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path() {
        assert_eq!(path("Stack", &[]), "Stack");
        assert_eq!(path("Stack", &["vpc", "IGW"]), "Stack/vpc/IGW");
    }

    #[test]
    fn test_logical_id() {
        let id = logical_id("Stack", &["demo-vpc"]);
        assert!(id.starts_with("demovpc"));
        assert_eq!(id.len(), "demovpc".len() + ID_HASH_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));

        // Deterministic
        assert_eq!(id, logical_id("Stack", &["demo-vpc"]));

        // Same sanitized prefix, different path
        let other = logical_id("Stack", &["demo_vpc"]);
        assert!(other.starts_with("demovpc"));
        assert_ne!(id, other);

        // Stack name is part of the hash but not the prefix
        let other = logical_id("Other", &["demo-vpc"]);
        assert!(other.starts_with("demovpc"));
        assert_ne!(id, other);
    }

    #[test]
    fn test_logical_id_long_name() {
        let name = "a".repeat(300);
        let id = logical_id("Stack", &[&name]);
        assert_eq!(id.len(), MAX_LOGICAL_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));

        // Names sharing the truncated prefix still get distinct ids
        let longer = "a".repeat(301);
        let other = logical_id("Stack", &[&longer]);
        assert_eq!(other.len(), MAX_LOGICAL_ID_LEN);
        assert_ne!(id, other);

        let subnet = logical_id("Stack", &[&name, "publicSubnet1", "DefaultRoute"]);
        assert_eq!(subnet.len(), MAX_LOGICAL_ID_LEN);
    }

    #[test]
    fn test_logical_id_without_alphanumerics() {
        let id = logical_id("Stack", &["---"]);
        assert_eq!(id.len(), ID_HASH_BYTES * 2);
    }

    #[test]
    fn test_duplicate_ids() {
        let mut template = Template::new("test");
        template
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC", json!({})))
            .unwrap();
        assert!(matches!(
            template.add_resource("Vpc", Resource::new("AWS::EC2::VPC", json!({}))),
            Err(Error::DuplicateLogicalId(id)) if id == "Vpc"
        ));
        assert!(matches!(
            template.add_parameter(
                "Vpc",
                Parameter {
                    kind: "String".to_string(),
                    default: "x".to_string(),
                }
            ),
            Err(Error::DuplicateLogicalId(_))
        ));
        let output = Output {
            description: "out".to_string(),
            value: reference("Vpc"),
        };
        template.add_output("Out", output.clone()).unwrap();
        assert!(matches!(
            template.add_output("Out", output),
            Err(Error::DuplicateLogicalId(_))
        ));
    }

    #[test]
    fn test_render() {
        let mut template = Template::new("test stack");
        template
            .add_resource(
                "Eip",
                Resource::new("AWS::EC2::EIP", json!({ "InstanceId": reference("Instance") }))
                    .depends_on("Instance"),
            )
            .unwrap();

        let rendered: Value = serde_json::from_str(&Format::Json.render(&template).unwrap()).unwrap();
        assert_eq!(rendered["AWSTemplateFormatVersion"], FORMAT_VERSION);
        assert_eq!(rendered["Description"], "test stack");
        assert_eq!(rendered["Resources"]["Eip"]["Type"], "AWS::EC2::EIP");
        assert_eq!(rendered["Resources"]["Eip"]["DependsOn"], json!(["Instance"]));
        assert!(rendered.get("Parameters").is_none());
        assert!(rendered.get("Outputs").is_none());

        let rendered = Format::Yaml.render(&template).unwrap();
        assert!(rendered.contains("AWSTemplateFormatVersion: 2010-09-09")
            || rendered.contains("AWSTemplateFormatVersion: '2010-09-09'"));
        assert!(rendered.contains("Type: AWS::EC2::EIP"));
    }

    #[test]
    fn test_format() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("yml".parse::<Format>().unwrap(), Format::Yaml);
        assert!("xml".parse::<Format>().is_err());
        assert_eq!(Format::Yaml.to_string(), "yaml");
    }

    #[test]
    fn test_references() {
        let value = json!({
            "InstanceId": reference("Instance"),
            "Ids": [get_att("Group", "GroupId")],
            "Arn": join(vec![json!("arn:"), reference("AWS::Partition")]),
        });
        let mut found = references(&value);
        found.sort();
        assert_eq!(found, vec!["AWS::Partition", "Group", "Instance"]);
    }
}
