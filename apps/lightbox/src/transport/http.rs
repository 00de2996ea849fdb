//! REST client for the generation service. One struct implements all three
//! request/response contracts; the endpoints mirror the service's `/api`
//! surface.

use crate::model::{ArtifactId, GenerationParams, HistoryRecord};
use crate::protocol::{
    Ack, AddMoreRequest, DeleteArtifactRequest, DeleteArtifactResponse, FetchRecordResponse,
    HistoryListResponse, PresetPromptResponse, StartRequest, StartResponse, StatusSnapshot,
    SwitchRecordRequest,
};
use crate::transport::{ArtifactStore, GenerationBackend, HistoryStore, TransportError};
use async_trait::async_trait;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpApi {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    pub fn from_server(server: &str) -> Result<Self, TransportError> {
        let base = Url::parse(server)
            .map_err(|err| TransportError::Request(format!("invalid server url: {err}")))?;
        Ok(Self::new(base))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn check_ack(ack: Ack) -> Result<(), TransportError> {
        if ack.success {
            Ok(())
        } else {
            Err(TransportError::Rejected(
                ack.message.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpApi {
    async fn request_start(&self, params: &GenerationParams) -> Result<(), TransportError> {
        let response: StartResponse = self
            .client
            .post(self.endpoint("/api/start"))
            .json(&StartRequest::unbounded(params))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(TransportError::Rejected("start refused".to_string()))
        }
    }

    async fn request_stop(&self) -> Result<(), TransportError> {
        let ack: Ack = self
            .client
            .post(self.endpoint("/api/stop"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check_ack(ack)
    }

    async fn request_more(&self, count: u32) -> Result<(), TransportError> {
        let ack: Ack = self
            .client
            .post(self.endpoint("/api/add_more"))
            .json(&AddMoreRequest { count })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check_ack(ack)
    }

    async fn poll_status(&self) -> Result<StatusSnapshot, TransportError> {
        Ok(self
            .client
            .get(self.endpoint("/api/status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn preset_prompt(&self) -> Result<Option<String>, TransportError> {
        let response: PresetPromptResponse = self
            .client
            .get(self.endpoint("/api/prompts"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.prompt.filter(|_| response.success))
    }
}

#[async_trait]
impl ArtifactStore for HttpApi {
    async fn delete_artifact(&self, id: &ArtifactId) -> Result<Vec<ArtifactId>, TransportError> {
        let response: DeleteArtifactResponse = self
            .client
            .post(self.endpoint("/api/delete_image"))
            .json(&DeleteArtifactRequest {
                filename: id.as_str().to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.success {
            Ok(response.remaining)
        } else {
            Err(TransportError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| format!("delete of {id} refused")),
            ))
        }
    }
}

#[async_trait]
impl HistoryStore for HttpApi {
    async fn list_records(&self) -> Result<Vec<HistoryRecord>, TransportError> {
        let response: HistoryListResponse = self
            .client
            .get(self.endpoint("/api/history"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.success {
            Ok(response.records)
        } else {
            Err(TransportError::Rejected("history listing refused".to_string()))
        }
    }

    async fn fetch_record(
        &self,
        id: &str,
    ) -> Result<(HistoryRecord, Vec<ArtifactId>), TransportError> {
        let response: FetchRecordResponse = self
            .client
            .post(self.endpoint("/api/switch_prompt"))
            .json(&SwitchRecordRequest {
                prompt_id: id.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        match (response.success, response.record) {
            (true, Some(record)) => Ok((record, response.artifacts)),
            _ => Err(TransportError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| format!("record {id} not found")),
            )),
        }
    }

    async fn delete_record(&self, id: &str) -> Result<(), TransportError> {
        let ack: Ack = self
            .client
            .delete(self.endpoint(&format!("/api/history/{id}")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check_ack(ack)
    }
}
