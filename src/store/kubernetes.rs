use async_trait::async_trait;
use kube::api::{Api, DynamicObject, PostParams};
use kube::Client;
use tracing::debug;
use super::{codec, MemberlistStore};
use crate::config::KubernetesConfig;
use crate::error::MemberlistError;
use crate::memberlist::{Memberlist, ResourceVersion};

/// Memberlist persisted as a `MemberList` custom resource
pub struct CrMemberlistStore {
    api: Api<DynamicObject>,
    namespace: String,
    name: String,
}

fn status_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// Classify a failed read of `resource`
fn read_error(resource: &str, error: &kube::Error) -> MemberlistError {
    match status_code(error) {
        Some(404) => MemberlistError::NotFound(resource.to_string()),
        _ => MemberlistError::TransientRead(format!("{}: {}", resource, error)),
    }
}

/// Classify a failed create (`observed == None`) or conditional replace
fn write_error(resource: &str, error: &kube::Error, observed: Option<&ResourceVersion>) -> MemberlistError {
    match status_code(error) {
        Some(409) => MemberlistError::Conflict(match observed {
            Some(version) => format!("{} changed since version {}", resource, version),
            None => format!("{} already exists", resource),
        }),
        Some(404) => MemberlistError::NotFound(resource.to_string()),
        _ => MemberlistError::Write(format!("{}: {}", resource, error)),
    }
}

impl CrMemberlistStore {
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let api = Api::namespaced_with(client, &namespace, &codec::api_resource());
        Self {
            api,
            namespace,
            name: name.into(),
        }
    }

    pub fn from_config(client: Client, config: &KubernetesConfig) -> Self {
        Self::new(client, config.namespace.clone(), config.memberlist_name.clone())
    }

    fn resource(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[async_trait]
impl MemberlistStore for CrMemberlistStore {
    async fn get_memberlist(&self) -> Result<(Memberlist, ResourceVersion), MemberlistError> {
        let object = self.api.get_opt(&self.name).await.map_err(|e| read_error(&self.resource(), &e))?;
        let object = object.ok_or_else(|| MemberlistError::NotFound(self.resource()))?;
        codec::decode(&object)
    }

    async fn update_memberlist(
        &self,
        memberlist: &Memberlist,
        observed: &ResourceVersion,
    ) -> Result<ResourceVersion, MemberlistError> {
        let object = codec::encode(&self.name, &self.namespace, memberlist, Some(observed));
        let updated = self
            .api
            .replace(&self.name, &PostParams::default(), &object)
            .await
            .map_err(|e| write_error(&self.resource(), &e, Some(observed)))?;
        let (_, version) = codec::decode(&updated)?;
        debug!(resource = %self.resource(), %version, members = memberlist.len(), "Memberlist replaced");
        Ok(version)
    }

    async fn create_memberlist(&self, memberlist: &Memberlist) -> Result<ResourceVersion, MemberlistError> {
        let object = codec::encode(&self.name, &self.namespace, memberlist, None);
        let created = self
            .api
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| write_error(&self.resource(), &e, None))?;
        let (_, version) = codec::decode(&created)?;
        debug!(resource = %self.resource(), %version, "Memberlist created");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    const RESOURCE: &str = "chroma/worker-memberlist";

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} from apiserver", reason),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_read_not_found() {
        let error = read_error(RESOURCE, &api_error(404, "NotFound"));
        assert_eq!(error, MemberlistError::NotFound(RESOURCE.to_string()));
    }

    #[test]
    fn test_other_read_failures_are_transient() {
        for code in [500, 503, 403, 409] {
            let error = read_error(RESOURCE, &api_error(code, "InternalError"));
            assert!(matches!(error, MemberlistError::TransientRead(_)), "code {}", code);
        }
        let error = read_error(RESOURCE, &kube::Error::LinesCodecMaxLineLengthExceeded);
        assert!(matches!(error, MemberlistError::TransientRead(_)));
    }

    #[test]
    fn test_replace_conflict() {
        let version = ResourceVersion::new("41");
        let error = write_error(RESOURCE, &api_error(409, "Conflict"), Some(&version));
        match error {
            MemberlistError::Conflict(msg) => assert!(msg.contains("41"), "{}", msg),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_create_conflict_means_already_exists() {
        let error = write_error(RESOURCE, &api_error(409, "AlreadyExists"), None);
        match error {
            MemberlistError::Conflict(msg) => assert!(msg.contains("already exists"), "{}", msg),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_write_not_found_and_other_failures() {
        let version = ResourceVersion::new("7");
        assert_eq!(
            write_error(RESOURCE, &api_error(404, "NotFound"), Some(&version)),
            MemberlistError::NotFound(RESOURCE.to_string())
        );
        assert!(matches!(
            write_error(RESOURCE, &api_error(500, "InternalError"), Some(&version)),
            MemberlistError::Write(_)
        ));
        assert!(matches!(
            write_error(RESOURCE, &api_error(422, "Invalid"), None),
            MemberlistError::Write(_)
        ));
    }
}
