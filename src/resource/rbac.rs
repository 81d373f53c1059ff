//! Per-kind access control: a manager role and a binding of that role to the service account.

use crate::config::BaseConfig;
use crate::naming::KindNames;
use crate::resource::document::ObjectMeta;
use crate::resource::MANAGED_BY;
use serde::{Deserialize, Serialize};

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
pub const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

fn rule(group: &str, resource: String, verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: vec![group.to_string()],
        resources: vec![resource],
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
    }
}

pub fn role_name(names: &KindNames) -> String {
    format!("{}-manager-role", names.singular)
}

pub fn binding_name(names: &KindNames) -> String {
    format!("{}-manager-rolebinding", names.singular)
}

impl Role {
    /// Full access to the kind, update on its finalizers, read/write on its status.
    pub fn manager(names: &KindNames, config: &BaseConfig) -> Self {
        let group = config.group_version.group.as_str();
        Role {
            api_version: RBAC_API_VERSION.to_string(),
            kind: "Role".to_string(),
            metadata: ObjectMeta::namespaced(&config.namespace, role_name(names)),
            rules: vec![
                rule(
                    group,
                    names.plural.clone(),
                    &["create", "delete", "get", "list", "patch", "update", "watch"],
                ),
                rule(group, format!("{}/finalizers", names.plural), &["update"]),
                rule(group, format!("{}/status", names.plural), &["get", "patch", "update"]),
            ],
        }
    }

    pub fn same_desired_state(&self, existing: &Role) -> bool {
        self.rules == existing.rules
    }
}

impl RoleBinding {
    pub fn manager(names: &KindNames, config: &BaseConfig) -> Self {
        let mut metadata = ObjectMeta::namespaced(&config.namespace, binding_name(names));
        for (key, value) in [
            ("app.kubernetes.io/component", "rbac"),
            ("app.kubernetes.io/created-by", names.singular.as_str()),
            ("app.kubernetes.io/instance", "manager-rolebinding"),
            ("app.kubernetes.io/managed-by", MANAGED_BY),
            ("app.kubernetes.io/name", "rolebinding"),
            ("app.kubernetes.io/part-of", names.singular.as_str()),
        ] {
            metadata.labels.insert(key.to_string(), value.to_string());
        }
        RoleBinding {
            api_version: RBAC_API_VERSION.to_string(),
            kind: "RoleBinding".to_string(),
            metadata,
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "Role".to_string(),
                name: role_name(names),
            },
            subjects: vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: config.service_account.clone(),
                namespace: Some(config.namespace.clone()),
            }],
        }
    }

    pub fn same_desired_state(&self, existing: &RoleBinding) -> bool {
        self.role_ref == existing.role_ref
            && self.subjects == existing.subjects
            && self
                .metadata
                .labels
                .iter()
                .all(|(k, v)| existing.metadata.labels.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupVersion;

    fn config() -> BaseConfig {
        BaseConfig::new(GroupVersion::new("test.crdbase.io", "v1"), "crdb-test", "controller")
    }

    #[test]
    fn manager_role_grants_kind_finalizers_and_status() {
        let role = Role::manager(&KindNames::from_name("Count"), &config());
        assert_eq!(role.metadata.name, "count-manager-role");
        assert_eq!(role.metadata.namespace.as_deref(), Some("crdb-test"));
        assert_eq!(role.rules.len(), 3);
        assert_eq!(role.rules[0].resources, vec!["counts"]);
        assert_eq!(role.rules[0].verbs.len(), 7);
        assert_eq!(role.rules[1].resources, vec!["counts/finalizers"]);
        assert_eq!(role.rules[1].verbs, vec!["update"]);
        assert_eq!(role.rules[2].resources, vec!["counts/status"]);
        assert!(role.rules.iter().all(|r| r.api_groups == vec!["test.crdbase.io"]));
    }

    #[test]
    fn binding_targets_role_and_service_account() {
        let binding = RoleBinding::manager(&KindNames::from_name("Count"), &config());
        assert_eq!(binding.metadata.name, "count-manager-rolebinding");
        assert_eq!(binding.role_ref.name, "count-manager-role");
        assert_eq!(binding.role_ref.api_group, RBAC_API_GROUP);
        assert_eq!(binding.subjects[0].kind, "ServiceAccount");
        assert_eq!(binding.subjects[0].name, "controller");
        assert_eq!(binding.metadata.labels["app.kubernetes.io/part-of"], "count");

        let v = serde_json::to_value(&binding).unwrap();
        assert_eq!(v["roleRef"]["apiGroup"], RBAC_API_GROUP);
    }
}
