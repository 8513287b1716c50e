// src/service/http.rs

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use super::wire::{CompletedResponse, FilesResponse, QueueResponse, StartResponse, StatusResponse};
use super::{StatusReport, StemService};
use crate::config::ClientConfig;
use crate::error::ServiceError;
use crate::job::{JobId, JobRequest, StartedJob, StemFile};
use crate::observers::{CompletedRecord, QueueSnapshot};

/// reqwest client bound to one server.
#[derive(Debug, Clone)]
pub struct HttpStemService {
    client: Client,
    base: Url,
}

impl HttpStemService {
    pub fn new(config: &ClientConfig) -> Result<Self, ServiceError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::malformed(&config.base_url, format!("bad server url: {e}")))?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// `base` + path segments, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::malformed(self.base.as_str(), "server url cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Server-relative links (`/download/...`) become absolute; absolute ones pass through.
    pub fn resolve(&self, url: &str) -> Result<Url, ServiceError> {
        self.base
            .join(url)
            .map_err(|e| ServiceError::malformed(url, format!("bad resource url: {e}")))
    }

    async fn checked(endpoint: &str, res: Response) -> Result<Response, ServiceError> {
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            Err(ServiceError::status(endpoint, status.as_u16()))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ServiceError> {
        let label = segments.first().copied().unwrap_or("/");
        let url = self.endpoint(segments)?;
        let res = Self::checked(label, self.client.get(url).send().await?).await?;
        res.json::<T>()
            .await
            .map_err(|e| ServiceError::malformed(label, e.to_string()))
    }

    async fn get_bytes(&self, label: &str, url: Url) -> Result<Vec<u8>, ServiceError> {
        let res = Self::checked(label, self.client.get(url).send().await?).await?;
        Ok(res.bytes().await?.to_vec())
    }
}

#[async_trait]
impl StemService for HttpStemService {
    async fn start_job(&self, request: &JobRequest) -> Result<StartedJob, ServiceError> {
        let form = reqwest::multipart::Form::new()
            .text("url", request.source_url.clone())
            .text("name", request.track_name.clone())
            .text("mode", request.mode.as_wire());

        let url = self.endpoint(&["start"])?;
        let res = Self::checked("start", self.client.post(url).multipart(form).send().await?).await?;
        let raw: StartResponse = res
            .json()
            .await
            .map_err(|e| ServiceError::malformed("start", e.to_string()))?;
        raw.into_started().map_err(|reason| ServiceError::malformed("start", reason))
    }

    async fn job_status(&self, job_id: &JobId) -> Result<StatusReport, ServiceError> {
        let raw: StatusResponse = self.get_json(&["status", job_id.as_str()]).await?;
        Ok(raw.into())
    }

    async fn list_files(&self, job_id: &JobId, song_name: &str) -> Result<Vec<StemFile>, ServiceError> {
        let raw: FilesResponse = self.get_json(&["files", job_id.as_str(), song_name]).await?;
        Ok(raw.files.into_iter().map(Into::into).collect())
    }

    async fn queue(&self) -> Result<QueueSnapshot, ServiceError> {
        let raw: QueueResponse = self.get_json(&["queue"]).await?;
        Ok(raw.into())
    }

    async fn completed(&self) -> Result<Vec<CompletedRecord>, ServiceError> {
        let raw: CompletedResponse = self.get_json(&["completed"]).await?;
        Ok(raw.completed.into_iter().map(Into::into).collect())
    }

    async fn remove_job(&self, job_id: &JobId) -> Result<(), ServiceError> {
        let url = self.endpoint(&["remove_job", job_id.as_str()])?;
        Self::checked("remove_job", self.client.post(url).send().await?).await?;
        Ok(())
    }

    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let resolved = self.resolve(url)?;
        self.get_bytes("download", resolved).await
    }

    async fn fetch_archive(&self, job_id: &JobId, song_name: &str) -> Result<Vec<u8>, ServiceError> {
        let url = self.endpoint(&["zip", job_id.as_str(), song_name])?;
        self.get_bytes("zip", url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpStemService {
        HttpStemService::new(&ClientConfig::default().with_base_url(base)).unwrap()
    }

    #[test]
    fn endpoints_encode_song_names() {
        let svc = service("http://localhost:8000");
        let url = svc.endpoint(&["files", "ab12", "My Song #2"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/files/ab12/My%20Song%20%232");
    }

    #[test]
    fn endpoints_keep_a_base_path() {
        let svc = service("http://host/api");
        let url = svc.endpoint(&["queue"]).unwrap();
        assert_eq!(url.as_str(), "http://host/api/queue");
    }

    #[test]
    fn relative_downloads_resolve_against_the_server() {
        let svc = service("http://localhost:8000");
        let url = svc.resolve("/download/ab12/Song/vocals.mp3").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/download/ab12/Song/vocals.mp3");
        let abs = svc.resolve("https://cdn.example/x.mp3").unwrap();
        assert_eq!(abs.as_str(), "https://cdn.example/x.mp3");
    }

    #[test]
    fn base_url_is_reported_without_slash() {
        assert_eq!(service("http://localhost:8000").base_url(), "http://localhost:8000");
    }
}
