//! HTTP client for the image-generation workflow runner, grounded on
//! `endpoints/runninghub.py`'s `create_runninghub_task`/
//! `get_runninghub_task_status`/`get_runninghub_task_result`.

use crate::retry::with_default_retry;
use crate::traits::{ImageWorkflow, ResultFile, WorkflowStatus};
use crate::util::{decode_response, from_reqwest};
use np_domain::error::{Error, Result};
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct RunningHubWorkflow {
    host: String,
    api_key: String,
    http: reqwest::Client,
}

impl RunningHubWorkflow {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            "www.runninghub.cn",
            std::env::var("RUNNINGHUB_API_KEY").unwrap_or_default(),
        )
    }

    async fn invoke<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        mut payload: serde_json::Value,
    ) -> Result<T> {
        payload
            .as_object_mut()
            .expect("object literal")
            .insert("apiKey".into(), json!(self.api_key));

        let response = self
            .http
            .post(format!("https://{}/task/openapi/{endpoint}", self.host))
            .header("host", self.host.clone())
            .json(&payload)
            .send()
            .await
            .map_err(from_reqwest)?;
        decode_response("runninghub", response).await
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    code: i32,
    msg: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(Error::Provider {
                provider: "runninghub".into(),
                message: format!("{}: {}", self.code, self.msg),
            });
        }
        self.data.ok_or_else(|| Error::Provider {
            provider: "runninghub".into(),
            message: format!("empty data field: {}", self.msg),
        })
    }
}

#[derive(Deserialize)]
struct CreateData {
    #[serde(rename = "taskId")]
    task_id: String,
}

#[derive(Deserialize)]
struct ResultFileWire {
    #[serde(rename = "fileUrl")]
    file_url: String,
    #[serde(rename = "fileType")]
    file_type: String,
}

#[async_trait::async_trait]
impl ImageWorkflow for RunningHubWorkflow {
    async fn create(&self, workflow_id: &str, node_overrides: serde_json::Value) -> Result<String> {
        let mut payload = json!({ "workflowId": workflow_id });
        if !matches!(&node_overrides, serde_json::Value::Null) {
            payload
                .as_object_mut()
                .expect("object literal")
                .insert("nodeInfoList".into(), node_overrides);
        }

        with_default_retry(|| {
            let payload = payload.clone();
            async {
                let envelope: Envelope<CreateData> = self.invoke("create", payload).await?;
                Ok(envelope.into_data()?.task_id)
            }
        })
        .await
    }

    async fn status(&self, task_id: &str) -> Result<WorkflowStatus> {
        with_default_retry(|| async {
            let payload = json!({ "taskId": task_id });
            let envelope: Envelope<String> = self.invoke("status", payload).await?;
            let raw = envelope.into_data()?;
            match raw.to_uppercase().as_str() {
                "QUEUED" => Ok(WorkflowStatus::Queued),
                "RUNNING" => Ok(WorkflowStatus::Running),
                "COMPLETED" | "SUCCESS" | "SUCCEEDED" => Ok(WorkflowStatus::Completed),
                "FAILED" | "ERROR" => Ok(WorkflowStatus::Failed),
                "CANCELLED" | "CANCELED" => Ok(WorkflowStatus::Cancelled),
                other => Err(Error::Provider {
                    provider: "runninghub".into(),
                    message: format!("unrecognized workflow status: {other}"),
                }),
            }
        })
        .await
    }

    async fn result(&self, task_id: &str) -> Result<Vec<ResultFile>> {
        with_default_retry(|| async {
            let payload = json!({ "taskId": task_id });
            let envelope: Envelope<Vec<ResultFileWire>> = self.invoke("outputs", payload).await?;
            Ok(envelope
                .into_data()?
                .into_iter()
                .map(|f| ResultFile {
                    file_url: f.file_url,
                    file_type: f.file_type,
                })
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_synonyms_map_to_enum() {
        for (raw, expected) in [
            ("QUEUED", WorkflowStatus::Queued),
            ("running", WorkflowStatus::Running),
            ("SUCCESS", WorkflowStatus::Completed),
            ("error", WorkflowStatus::Failed),
            ("CANCELED", WorkflowStatus::Cancelled),
        ] {
            let mapped = match raw.to_uppercase().as_str() {
                "QUEUED" => WorkflowStatus::Queued,
                "RUNNING" => WorkflowStatus::Running,
                "COMPLETED" | "SUCCESS" | "SUCCEEDED" => WorkflowStatus::Completed,
                "FAILED" | "ERROR" => WorkflowStatus::Failed,
                "CANCELLED" | "CANCELED" => WorkflowStatus::Cancelled,
                _ => unreachable!(),
            };
            assert_eq!(mapped, expected, "raw={raw}");
        }
    }

    #[test]
    fn envelope_nonzero_code_is_error() {
        let envelope: Envelope<String> = Envelope {
            code: 1,
            msg: "bad workflow".into(),
            data: None,
        };
        assert!(envelope.into_data().is_err());
    }
}
