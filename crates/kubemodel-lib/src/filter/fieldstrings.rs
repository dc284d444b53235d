//! Field names shared by every filter type

pub const FIELD_UID: &str = "uid";

pub const FIELD_CLUSTER_ID: &str = "cluster";
pub const FIELD_NODE: &str = "node";
pub const FIELD_NAMESPACE: &str = "namespace";
pub const FIELD_CONTROLLER_KIND: &str = "controllerKind";
pub const FIELD_CONTROLLER_NAME: &str = "controllerName";
pub const FIELD_POD: &str = "pod";
pub const FIELD_CONTAINER: &str = "container";
pub const FIELD_PROVIDER: &str = "provider";
pub const FIELD_SERVICES: &str = "services";
pub const FIELD_LABEL: &str = "label";
pub const FIELD_ANNOTATION: &str = "annotation";
pub const FIELD_NODE_LABEL: &str = "nodeLabel";
pub const FIELD_NAMESPACE_LABEL: &str = "namespaceLabel";

pub const FIELD_RESOURCE_QUOTA: &str = "resourcequota";

pub const FIELD_NAME: &str = "name";
pub const FIELD_ACCOUNT: &str = "account";
pub const FIELD_PROVIDER_ID: &str = "providerID";
pub const FIELD_SERVICE: &str = "service";

pub const FIELD_VERSION: &str = "version";
pub const FIELD_REGION: &str = "region";
