//! Encoding between the `MemberList` custom resource and [`Memberlist`].
//!
//! ```yaml
//! apiVersion: chroma.cluster/v1
//! kind: MemberList
//! metadata: { name: worker-memberlist, namespace: chroma, resourceVersion: "42" }
//! spec:
//!   members:
//!     - url: 10.0.0.1
//! ```

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::MemberlistError;
use crate::memberlist::{Memberlist, NodeId, ResourceVersion};

pub const GROUP: &str = "chroma.cluster";
pub const VERSION: &str = "v1";
pub const KIND: &str = "MemberList";
pub const PLURAL: &str = "memberlists";

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, KIND), PLURAL)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemberListSpec {
    #[serde(default)]
    members: Option<Vec<MemberEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MemberEntry {
    url: NodeId,
}

pub fn decode(object: &DynamicObject) -> Result<(Memberlist, ResourceVersion), MemberlistError> {
    let version = object
        .metadata
        .resource_version
        .clone()
        .ok_or_else(|| MemberlistError::decode("memberlist has no resourceVersion"))?;

    let spec = match object.data.get("spec") {
        None | Some(Value::Null) => MemberListSpec::default(),
        Some(spec) => serde_json::from_value(spec.clone())
            .map_err(|e| MemberlistError::decode(format!("invalid memberlist spec: {}", e)))?,
    };

    let members = spec
        .members
        .unwrap_or_default()
        .into_iter()
        .map(|entry| entry.url)
        .collect();
    Ok((members, ResourceVersion::new(version)))
}

/// Build the full object for a create (`version == None`) or conditional replace
pub fn encode(
    name: &str,
    namespace: &str,
    memberlist: &Memberlist,
    version: Option<&ResourceVersion>,
) -> DynamicObject {
    let mut object = DynamicObject::new(name, &api_resource()).within(namespace);
    object.metadata.resource_version = version.map(|v| v.as_str().to_string());

    let spec = MemberListSpec {
        members: Some(
            memberlist
                .iter()
                .map(|url| MemberEntry { url: url.clone() })
                .collect(),
        ),
    };
    object.data = serde_json::json!({ "spec": spec });
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(spec: Value, version: Option<&str>) -> DynamicObject {
        let mut object = DynamicObject::new("worker-memberlist", &api_resource()).within("chroma");
        object.metadata.resource_version = version.map(str::to_string);
        object.data = json!({ "spec": spec });
        object
    }

    #[test]
    fn test_decode_members_in_order() {
        let obj = object(json!({ "members": [{ "url": "10.0.0.2" }, { "url": "10.0.0.1" }] }), Some("7"));
        let (members, version) = decode(&obj).unwrap();
        assert_eq!(members.as_slice(), ["10.0.0.2", "10.0.0.1"]);
        assert_eq!(version.as_str(), "7");
    }

    #[test]
    fn test_decode_empty_forms() {
        for spec in [json!({}), json!({ "members": null }), json!({ "members": [] }), Value::Null] {
            let (members, _) = decode(&object(spec, Some("1"))).unwrap();
            assert!(members.is_empty());
        }

        let mut bare = object(Value::Null, Some("1"));
        bare.data = json!({});
        assert!(decode(&bare).unwrap().0.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed_entries() {
        let obj = object(json!({ "members": [{ "address": "10.0.0.1" }] }), Some("1"));
        assert!(matches!(decode(&obj), Err(MemberlistError::Decode(_))));

        let obj = object(json!({ "members": "10.0.0.1" }), Some("1"));
        assert!(matches!(decode(&obj), Err(MemberlistError::Decode(_))));
    }

    #[test]
    fn test_decode_requires_version() {
        let obj = object(json!({ "members": [] }), None);
        assert!(matches!(decode(&obj), Err(MemberlistError::Decode(_))));
    }

    #[test]
    fn test_encode_full_object() {
        let members: Memberlist = ["10.0.0.1", "10.0.0.2"].into_iter().collect();
        let obj = encode("worker-memberlist", "chroma", &members, Some(&ResourceVersion::new("3")));

        let value = serde_json::to_value(&obj).unwrap();
        assert_eq!(value["apiVersion"], "chroma.cluster/v1");
        assert_eq!(value["kind"], "MemberList");
        assert_eq!(value["metadata"]["name"], "worker-memberlist");
        assert_eq!(value["metadata"]["namespace"], "chroma");
        assert_eq!(value["metadata"]["resourceVersion"], "3");
        assert_eq!(
            value["spec"],
            json!({ "members": [{ "url": "10.0.0.1" }, { "url": "10.0.0.2" }] })
        );
    }

    #[test]
    fn test_encoded_object_decodes_back() {
        let members: Memberlist = ["10.0.0.3"].into_iter().collect();
        let obj = encode("worker-memberlist", "chroma", &members, Some(&ResourceVersion::new("9")));
        assert_eq!(decode(&obj).unwrap(), (members, ResourceVersion::new("9")));
    }

    #[test]
    fn test_encode_for_create_has_no_version() {
        let obj = encode("worker-memberlist", "chroma", &Memberlist::new(), None);
        assert!(obj.metadata.resource_version.is_none());
        assert_eq!(obj.data["spec"]["members"], json!([]));
    }
}
