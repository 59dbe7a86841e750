//! Job pod resolution: turn a group's pod template into the pod for one item.

use std::collections::BTreeMap;

use oaat_core::{EnvVar, ITEM_ENV_VAR, ITEM_PLACEHOLDER, JobTemplate};

use crate::error::ConfigError;
use crate::pods::{
    APP_LABEL, GROUP_API_VERSION, GROUP_KIND, ITEM_LABEL, JobPodSpec, OwnerRef, PARENT_LABEL,
};

/// Restart policy every job pod runs with.
pub const RESTART_POLICY: &str = "Never";

/// Longest generated name prefix; leaves room for the random suffix.
const MAX_PREFIX_LEN: usize = 57;

/// Identity of the group a job pod belongs to.
#[derive(Debug, Clone, Copy)]
pub struct GroupRef<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub uid: &'a str,
}

/// Check that a pod template can run as a one-at-a-time job.
pub fn check_template(template: &JobTemplate) -> Result<(), ConfigError> {
    match template.containers.len() {
        0 => return Err(ConfigError::NoContainers),
        1 => {}
        n => return Err(ConfigError::MultipleContainers(n)),
    }
    match template.restart_policy.as_deref() {
        None | Some(RESTART_POLICY) => Ok(()),
        Some(other) => Err(ConfigError::RestartPolicy(other.to_string())),
    }
}

/// Build the pod that runs `item`.
///
/// The item name replaces every placeholder in the container's command
/// and args and is exported as an environment variable.
pub fn build_job_pod(
    group: GroupRef<'_>,
    item: &str,
    template: &JobTemplate,
    app_label: &str,
) -> Result<JobPodSpec, ConfigError> {
    check_template(template)?;
    let Some(mut container) = template.containers.first().cloned() else {
        return Err(ConfigError::NoContainers);
    };

    container.command = substitute(&container.command, item);
    container.args = substitute(&container.args, item);
    container.env.retain(|var| var.name != ITEM_ENV_VAR);
    container.env.push(EnvVar {
        name: ITEM_ENV_VAR.to_string(),
        value: item.to_string(),
    });

    let labels = BTreeMap::from([
        (APP_LABEL.to_string(), app_label.to_string()),
        (PARENT_LABEL.to_string(), group.name.to_string()),
        (ITEM_LABEL.to_string(), item.to_string()),
    ]);

    Ok(JobPodSpec {
        namespace: group.namespace.to_string(),
        generate_name: generate_name(group.name, item),
        labels,
        owner: OwnerRef {
            api_version: GROUP_API_VERSION.to_string(),
            kind: GROUP_KIND.to_string(),
            name: group.name.to_string(),
            uid: group.uid.to_string(),
        },
        container,
        restart_policy: RESTART_POLICY.to_string(),
        service_account_name: template.service_account_name.clone(),
    })
}

fn substitute(values: &[String], item: &str) -> Vec<String> {
    values
        .iter()
        .map(|v| v.replace(ITEM_PLACEHOLDER, item))
        .collect()
}

/// `<group>-<item>-`, reduced to DNS-label characters.
fn generate_name(group: &str, item: &str) -> String {
    let mut name = String::with_capacity(group.len() + item.len() + 2);
    for c in format!("{group}-{item}").chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    name.truncate(MAX_PREFIX_LEN);
    let trimmed = name.trim_matches('-');
    if trimmed.is_empty() {
        "oaat-".to_string()
    } else {
        format!("{trimmed}-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oaat_core::ContainerTemplate;

    fn group() -> GroupRef<'static> {
        GroupRef {
            name: "nightly",
            namespace: "jobs",
            uid: "0b7c",
        }
    }

    fn template() -> JobTemplate {
        JobTemplate {
            containers: vec![ContainerTemplate {
                name: "job".to_string(),
                image: "busybox".to_string(),
                command: vec!["sh".to_string(), "-c".to_string()],
                args: vec![format!("echo {ITEM_PLACEHOLDER}; run --item={ITEM_PLACEHOLDER}")],
                env: vec![EnvVar {
                    name: "MODE".to_string(),
                    value: "full".to_string(),
                }],
            }],
            restart_policy: None,
            service_account_name: Some("runner".to_string()),
        }
    }

    #[test]
    fn item_is_injected_everywhere() {
        let pod = build_job_pod(group(), "db-7", &template(), "oaat-operator").unwrap();
        assert_eq!(pod.container.args, vec!["echo db-7; run --item=db-7"]);
        assert_eq!(pod.container.command, vec!["sh", "-c"]);
        assert!(
            pod.container
                .env
                .iter()
                .any(|v| v.name == ITEM_ENV_VAR && v.value == "db-7")
        );
        assert_eq!(pod.container.env.len(), 2);
        assert_eq!(pod.labels[ITEM_LABEL], "db-7");
        assert_eq!(pod.labels[PARENT_LABEL], "nightly");
        assert_eq!(pod.labels[APP_LABEL], "oaat-operator");
        assert_eq!(pod.owner.uid, "0b7c");
        assert_eq!(pod.owner.kind, GROUP_KIND);
        assert_eq!(pod.restart_policy, "Never");
        assert_eq!(pod.service_account_name.as_deref(), Some("runner"));
        assert_eq!(pod.namespace, "jobs");
    }

    #[test]
    fn template_env_cannot_override_item_variable() {
        let mut template = template();
        template.containers[0].env.push(EnvVar {
            name: ITEM_ENV_VAR.to_string(),
            value: "spoofed".to_string(),
        });
        let pod = build_job_pod(group(), "a", &template, "oaat-operator").unwrap();
        let values: Vec<&str> = pod
            .container
            .env
            .iter()
            .filter(|v| v.name == ITEM_ENV_VAR)
            .map(|v| v.value.as_str())
            .collect();
        assert_eq!(values, vec!["a"]);
    }

    #[test]
    fn rejects_unsupported_templates() {
        let mut two = template();
        two.containers.push(two.containers[0].clone());
        assert_eq!(
            build_job_pod(group(), "a", &two, "x").err(),
            Some(ConfigError::MultipleContainers(2))
        );

        let mut none = template();
        none.containers.clear();
        assert_eq!(check_template(&none), Err(ConfigError::NoContainers));

        let mut restart = template();
        restart.restart_policy = Some("OnFailure".to_string());
        assert_eq!(
            check_template(&restart),
            Err(ConfigError::RestartPolicy("OnFailure".to_string()))
        );

        let mut never = template();
        never.restart_policy = Some("Never".to_string());
        assert_eq!(check_template(&never), Ok(()));
    }

    #[test]
    fn generated_names_are_dns_safe() {
        assert_eq!(generate_name("nightly", "db-7"), "nightly-db-7-");
        assert_eq!(generate_name("Nightly", "Host_A.example"), "nightly-host-a-example-");
        assert_eq!(generate_name("--", "__"), "oaat-");
        let long = generate_name(&"g".repeat(40), &"i".repeat(40));
        assert!(long.len() <= MAX_PREFIX_LEN + 1);
        assert!(long.ends_with('-'));
    }
}
