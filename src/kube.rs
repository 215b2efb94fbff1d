//! `kubectl` subprocess glue for reaching the Rook toolbox pod.

use std::path::Path;
use std::process::{Command, Output};

use crate::error::{RookError, RookResult};

/// Label selector for the Rook toolbox deployment.
pub const TOOLBOX_APP_LABEL: &str = "rook-ceph-tools";

/// Runs `kubectl` against one namespace: pod discovery by label, exec in a
/// pod and file copy in and out of a pod.
///
/// ```rust,no_run
/// use rook_ceph::kube::KubeOperator;
/// # use rook_ceph::error::RookResult;
/// # fn run() -> RookResult<()> {
/// let kube = KubeOperator::new("rook-ceph");
/// let pod = kube.find_toolbox_pod()?;
/// let out = kube.exec_in_pod(&pod, &["ceph".to_string(), "fsid".to_string()])?;
/// # Ok(())
/// # }
/// ```
pub struct KubeOperator {
    namespace: String,
}

impl KubeOperator {
    pub fn new<T: Into<String>>(namespace: T) -> KubeOperator {
        KubeOperator {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the first running pod matching an app label.
    pub fn find_pod(&self, app_label: &str) -> RookResult<String> {
        let output = self.kubectl(&[
            "get",
            "pod",
            "-l",
            &format!("app={}", app_label),
            "--field-selector=status.phase=Running",
            "-o",
            "jsonpath={.items[0].metadata.name}",
        ])?;
        let name = stdout_string(&output)?.trim().to_string();
        if name.is_empty() {
            return Err(RookError::CommandFailure(format!(
                "no running pod with label app={} in namespace {}",
                app_label, self.namespace
            )));
        }
        Ok(name)
    }

    pub fn find_toolbox_pod(&self) -> RookResult<String> {
        self.find_pod(TOOLBOX_APP_LABEL)
    }

    /// Run an argv inside a pod and return its stdout.
    pub fn exec_in_pod(&self, pod: &str, words: &[String]) -> RookResult<String> {
        let mut args: Vec<&str> = vec!["exec", pod, "--"];
        args.extend(words.iter().map(String::as_str));
        let output = self.kubectl(&args)?;
        stdout_string(&output)
    }

    /// Copy a local file into a pod.
    pub fn copy_to_pod(&self, pod: &str, local: &Path, remote: &str) -> RookResult<()> {
        self.kubectl(&[
            "cp",
            &local.to_string_lossy(),
            &format!("{}/{}:{}", self.namespace, pod, remote),
        ])?;
        Ok(())
    }

    /// Copy a file out of a pod.
    pub fn copy_from_pod(&self, pod: &str, remote: &str, local: &Path) -> RookResult<()> {
        self.kubectl(&[
            "cp",
            &format!("{}/{}:{}", self.namespace, pod, remote),
            &local.to_string_lossy(),
        ])?;
        Ok(())
    }

    /// Fetch a named object as JSON, e.g. a configmap.
    pub fn get_object(&self, kind: &str, name: &str) -> RookResult<crate::JsonData> {
        let output = self.kubectl(&["get", kind, name, "-o", "json"])?;
        Ok(serde_json::from_str(&stdout_string(&output)?)?)
    }

    fn kubectl(&self, args: &[&str]) -> RookResult<Output> {
        debug!("kubectl -n {} {}", self.namespace, args.join(" "));
        let output = Command::new("kubectl")
            .arg("-n")
            .arg(&self.namespace)
            .args(args)
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RookError::CommandFailure(format!(
                "kubectl {} exited with {}: {}",
                args.first().cloned().unwrap_or(""),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

fn stdout_string(output: &Output) -> RookResult<String> {
    Ok(String::from_utf8(output.stdout.clone())?)
}

/// Pull a single string value out of a parsed JSON object, the way the
/// toolbox output is usually picked apart for one field.
pub fn get_object_value(data: &crate::JsonData, key: &str) -> Option<String> {
    data.as_object()
        .and_then(|map| map.get(key))
        .map(|value| match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_extracts_an_object_value() {
        let data: crate::JsonData =
            serde_json::from_str(r#"{"status":"HEALTH_OK","epoch":12}"#).unwrap();
        assert_eq!(get_object_value(&data, "status"), Some("HEALTH_OK".to_string()));
        assert_eq!(get_object_value(&data, "epoch"), Some("12".to_string()));
        assert_eq!(get_object_value(&data, "missing"), None);
    }
}
