//! Custom resource definitions: `OaatGroup` and `OaatType`.

use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use oaat_core::{GroupSpec, JobTypeSpec};
use oaat_state::GroupStatus;

/// A group of items run one at a time.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "oaat.dev",
    version = "v1",
    kind = "OaatGroup",
    namespaced,
    status = "GroupStatus",
    shortname = "oaatg",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Running","type":"string","jsonPath":".status.currentlyRunning"}"#,
    printcolumn = r#"{"name":"Loops","type":"integer","jsonPath":".status.loops"}"#
)]
pub struct OaatGroupSpec {
    #[serde(flatten)]
    pub group: GroupSpec,
}

/// How the items of a group are executed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(group = "oaat.dev", version = "v1", kind = "OaatType", namespaced, shortname = "oaatt")]
pub struct OaatTypeSpec {
    #[serde(flatten)]
    pub job: JobTypeSpec,
}

/// Both definitions as a `v1` `List`, ready for `kubectl apply -f -`.
pub fn crd_list() -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [OaatGroup::crd(), OaatType::crd()],
    })
}
