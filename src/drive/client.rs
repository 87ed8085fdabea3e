//! Drive REST API v3 client.

use super::{classify_status, DriveError, DriveFile, DriveStore, ListFilter, CSV_MIME_TYPE};
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

const DEFAULT_DRIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-shot Drive REST client authenticated with a caller-supplied bearer token.
pub struct DriveClient {
    client: Client,
    access_token: String,
    api_url: String,
    upload_url: String,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl DriveClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            api_url: DRIVE_API_URL.to_string(),
            upload_url: DRIVE_UPLOAD_URL.to_string(),
            timeout: Some(DEFAULT_DRIVE_TIMEOUT),
        }
    }

    /// Override both API roots (tests, proxies).
    pub fn with_base_urls(mut self, api_url: &str, upload_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self.upload_url = upload_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.bearer_auth(&self.access_token);
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    async fn check(response: Response) -> Result<Response, DriveError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&error_text)
            .map(|r| r.error.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or(error_text)
            });

        let err = classify_status(status.as_u16(), message);
        log::error!("Drive request failed: {}", err);
        Err(err)
    }

    fn metadata_part(name: &str, mime_type: &str, folder: &str) -> Result<multipart::Part, DriveError> {
        let mut metadata = json!({ "name": name, "mimeType": mime_type });
        if !folder.is_empty() {
            metadata["parents"] = json!([folder]);
        }
        multipart::Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(|e| DriveError::InvalidResponse(format!("Failed to build metadata part: {}", e)))
    }

    async fn create(
        &self,
        bytes: Vec<u8>,
        name: &str,
        mime_type: &str,
        folder: &str,
    ) -> Result<DriveFile, DriveError> {
        let file_part = multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime_type)
            .map_err(|e| DriveError::InvalidResponse(format!("Invalid MIME type {}: {}", mime_type, e)))?;

        let form = multipart::Form::new()
            .part("metadata", Self::metadata_part(name, mime_type, folder)?)
            .part("file", file_part);

        let req = self
            .client
            .post(format!("{}/files", self.upload_url))
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id,name,createdTime,webViewLink"),
            ])
            .multipart(form);

        let response = Self::check(self.authorized(req).send().await?).await?;
        response
            .json::<DriveFile>()
            .await
            .map_err(|e| DriveError::InvalidResponse(format!("Failed to parse created file: {}", e)))
    }

    /// `<base>/files/<file_id>` with the id percent-encoded as one path segment.
    fn file_url(base: &str, file_id: &str) -> Result<Url, DriveError> {
        let invalid = || DriveError::InvalidResponse(format!("Invalid Drive API URL: {}", base));
        let mut url = Url::parse(&format!("{}/files", base)).map_err(|_| invalid())?;
        url.path_segments_mut().map_err(|_| invalid())?.push(file_id);
        Ok(url)
    }

    fn list_query(folder: &str, filter: &ListFilter) -> String {
        let escape = |s: &str| s.replace('\\', "\\\\").replace('\'', "\\'");
        let mut clauses = vec![
            format!("name contains '{}'", escape(&filter.name_prefix)),
            format!("mimeType = '{}'", escape(&filter.mime_type)),
            "trashed = false".to_string(),
        ];
        if !folder.is_empty() {
            clauses.insert(0, format!("'{}' in parents", escape(folder)));
        }
        clauses.join(" and ")
    }
}

#[async_trait]
impl DriveStore for DriveClient {
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
        folder: &str,
    ) -> Result<String, DriveError> {
        log::debug!("Uploading {} ({} bytes) to Drive", name, bytes.len());
        let file = self.create(bytes.to_vec(), name, mime_type, folder).await?;
        Ok(file.view_url())
    }

    async fn write(&self, content: &str, name: &str, folder: &str) -> Result<DriveFile, DriveError> {
        log::debug!("Writing {} ({} bytes) to Drive", name, content.len());
        let file = self
            .create(content.as_bytes().to_vec(), name, CSV_MIME_TYPE, folder)
            .await?;
        log::info!("Saved {} as Drive file {}", name, file.id);
        Ok(file)
    }

    async fn update(&self, file_id: &str, content: &str) -> Result<(), DriveError> {
        let req = self
            .client
            .patch(Self::file_url(&self.upload_url, file_id)?)
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, CSV_MIME_TYPE)
            .body(content.to_string());

        Self::check(self.authorized(req).send().await?).await?;
        log::info!("Updated Drive file {}", file_id);
        Ok(())
    }

    async fn list(&self, folder: &str, filter: &ListFilter) -> Result<Vec<DriveFile>, DriveError> {
        let page_size = filter.limit.clamp(1, 1000).to_string();
        let req = self.client.get(format!("{}/files", self.api_url)).query(&[
            ("q", Self::list_query(folder, filter).as_str()),
            ("fields", "files(id,name,createdTime)"),
            ("orderBy", "createdTime desc"),
            ("pageSize", page_size.as_str()),
        ]);

        let response = Self::check(self.authorized(req).send().await?).await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(format!("Failed to parse file list: {}", e)))?;

        let mut files = list.files;
        files.truncate(filter.limit);
        Ok(files)
    }

    async fn read(&self, file_id: &str) -> Result<String, DriveError> {
        let req = self
            .client
            .get(Self::file_url(&self.api_url, file_id)?)
            .query(&[("alt", "media")]);

        let response = Self::check(self.authorized(req).send().await?).await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> DriveClient {
        DriveClient::new("tok".to_string())
            .with_base_urls(&format!("{}/drive/v3", server.uri()), &format!("{}/upload/drive/v3", server.uri()))
    }

    #[test]
    fn test_list_query() {
        let q = DriveClient::list_query("folder1", &ListFilter::default());
        assert_eq!(
            q,
            "'folder1' in parents and name contains 'IDEATION_' and mimeType = 'text/csv' and trashed = false"
        );
        let q = DriveClient::list_query("", &ListFilter::default());
        assert!(!q.contains("in parents"));
    }

    #[test]
    fn test_file_url_encodes_id() {
        let url = DriveClient::file_url("https://drive.example/drive/v3", "abc").unwrap();
        assert_eq!(url.as_str(), "https://drive.example/drive/v3/files/abc");

        let url = DriveClient::file_url("https://drive.example/drive/v3", "a/b c?x").unwrap();
        assert_eq!(url.as_str(), "https://drive.example/drive/v3/files/a%2Fb%20c%3Fx");
    }

    #[tokio::test]
    async fn test_upload_returns_web_view_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "img1",
                "webViewLink": "https://drive.google.com/file/d/img1/view?usp=drivesdk"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server)
            .await
            .upload(b"\xff\xd8", "IMG_s_1.jpg", "image/jpeg", "folder1")
            .await
            .unwrap();
        assert_eq!(url, "https://drive.google.com/file/d/img1/view?usp=drivesdk");
    }

    #[tokio::test]
    async fn test_upload_without_link_builds_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "img2" })))
            .mount(&server)
            .await;

        let url = client(&server)
            .await
            .upload(b"x", "IMG_s_2.jpg", "image/jpeg", "")
            .await
            .unwrap();
        assert_eq!(url, "https://drive.google.com/file/d/img2/view");
    }

    #[tokio::test]
    async fn test_update_patches_media() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/upload/drive/v3/files/abc"))
            .and(query_param("uploadType", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "abc" })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.update("abc", "a\n\"1\"").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("orderBy", "createdTime desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    { "id": "f2", "name": "IDEATION_B_2026-01-02.csv", "createdTime": "2026-01-02T10:00:00Z" },
                    { "id": "f1", "name": "IDEATION_A_2026-01-01.csv", "createdTime": "2026-01-01T10:00:00Z" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/f1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n\"1\",\"2\""))
            .mount(&server)
            .await;

        let c = client(&server).await;
        let files = c.list("folder1", &ListFilter::default()).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, "f2");
        assert!(files[0].created_time.is_some());

        assert_eq!(c.read("f1").await.unwrap(), "a,b\n\"1\",\"2\"");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/expired"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Invalid Credentials" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "message": "Backend Error" }
            })))
            .mount(&server)
            .await;

        let c = client(&server).await;
        assert!(matches!(c.read("gone").await, Err(DriveError::NotFound)));
        assert!(matches!(c.read("expired").await, Err(DriveError::AuthExpired)));
        match c.read("broken").await {
            Err(DriveError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "Backend Error");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
