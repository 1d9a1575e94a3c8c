use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use url::Url;

use super::client::{ClassifierClient, ClassifierError};
use crate::config::ClassifierConfig;

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

/// Client for a model served as a Gradio app, speaking its three step HTTP
/// API: upload the file, queue a call, then read the call's event stream.
#[derive(Clone)]
pub struct GradioClient {
    http_client: HttpClient,
    base_url: Url,
    api_prefix: String,
    token: Option<String>,
}

impl GradioClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let http_client = HttpClient::builder().timeout(config.timeout).build()?;

        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http_client,
            base_url,
            api_prefix: config.api_prefix.trim_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn api_url(&self, tail: &str) -> Result<Url, ClassifierError> {
        let tail = tail.trim_start_matches('/');
        let relative = if self.api_prefix.is_empty() {
            tail.to_string()
        } else {
            format!("{}/{}", self.api_prefix, tail)
        };
        Ok(self.base_url.join(&relative)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(response: Response, step: &str) -> Result<Response, ClassifierError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await?;
        Err(ClassifierError::Remote(format!(
            "{} failed with status {}: {}",
            step, status, error_text
        )))
    }

    async fn upload(&self, path: &Path) -> Result<String, ClassifierError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = tokio::fs::read(path).await?;

        let form = Form::new().part("files", Part::bytes(bytes).file_name(file_name));
        let url = self.api_url("upload")?;
        log::debug!("Uploading {} to {}", path.display(), url);

        let response = self
            .authorize(self.http_client.post(url))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response, "Upload").await?;

        let paths: Vec<String> = response.json().await?;
        paths
            .into_iter()
            .next()
            .ok_or_else(|| ClassifierError::Protocol("upload returned no file path".to_string()))
    }

    async fn call(&self, operation: &str, remote_path: &str) -> Result<String, ClassifierError> {
        let url = self.api_url(&format!("call/{}", operation.trim_start_matches('/')))?;
        let payload = json!({
            "data": [{
                "path": remote_path,
                "meta": { "_type": "gradio.FileData" }
            }]
        });
        log::debug!("Queueing call at {}", url);

        let response = self
            .authorize(self.http_client.post(url))
            .json(&payload)
            .send()
            .await?;
        let response = Self::check_status(response, "Call").await?;

        let call: CallResponse = response.json().await?;
        Ok(call.event_id)
    }

    async fn result(&self, operation: &str, event_id: &str) -> Result<Value, ClassifierError> {
        let url = self.api_url(&format!(
            "call/{}/{}",
            operation.trim_start_matches('/'),
            event_id
        ))?;
        log::debug!("Reading result stream {}", url);

        let response = self.authorize(self.http_client.get(url)).send().await?;
        let response = Self::check_status(response, "Result").await?;
        let body = response.text().await?;
        parse_event_stream(&body)
    }
}

#[async_trait]
impl ClassifierClient for GradioClient {
    async fn submit(&self, path: &Path, operation: &str) -> Result<Value, ClassifierError> {
        let remote_path = self.upload(path).await?;
        let event_id = self.call(operation, &remote_path).await?;
        log::debug!("Call queued with event id {}", event_id);
        self.result(operation, &event_id).await
    }

    fn endpoint(&self) -> String {
        match self.api_url("") {
            Ok(url) => url.to_string(),
            Err(_) => self.base_url.to_string(),
        }
    }
}

/// Extracts the first output of a Gradio server-sent event stream.
///
/// `complete` carries a JSON array of outputs; `error` means the remote
/// function failed. Other events (`generating`, `heartbeat`) are skipped.
pub fn parse_event_stream(body: &str) -> Result<Value, ClassifierError> {
    let mut event = "";
    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => {
                    let outputs: Value = serde_json::from_str(data)?;
                    return first_output(outputs);
                }
                "error" => {
                    let message = if data.is_empty() || data == "null" {
                        "remote classifier reported an error".to_string()
                    } else {
                        data.to_string()
                    };
                    return Err(ClassifierError::Remote(message));
                }
                _ => {}
            }
        }
    }
    Err(ClassifierError::Protocol(
        "event stream ended without a result".to_string(),
    ))
}

fn first_output(outputs: Value) -> Result<Value, ClassifierError> {
    match outputs {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| ClassifierError::Protocol("call returned no outputs".to_string())),
        other => Err(ClassifierError::Protocol(format!(
            "expected an array of outputs, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_multipart::Multipart;
    use actix_web::dev::ServerHandle;
    use actix_web::http::header;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use futures::TryStreamExt;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    fn client_with(base_url: &str, api_prefix: &str, token: Option<&str>) -> GradioClient {
        let config = ClassifierConfig {
            space: "owner/name".to_string(),
            base_url: Url::parse(base_url).unwrap(),
            api_prefix: api_prefix.to_string(),
            operation: "/predict".to_string(),
            timeout: Duration::from_secs(5),
            token: token.map(str::to_string),
        };
        GradioClient::new(&config).unwrap()
    }

    fn client(base_url: &str, api_prefix: &str) -> GradioClient {
        client_with(base_url, api_prefix, None)
    }

    const REMOTE_PATH: &str = "/tmp/gradio/0a1b/leaf.png";
    const EVENT_ID: &str = "evt-42";

    /// What the fake space saw, one entry per request where it applies.
    #[derive(Debug, Default, Clone)]
    struct Received {
        upload_fields: Vec<(String, Option<String>, Vec<u8>)>,
        call_body: Option<Value>,
        result_event_id: Option<String>,
        auth_headers: Vec<Option<String>>,
    }

    type SharedReceived = web::Data<Mutex<Received>>;

    fn auth_of(req: &HttpRequest) -> Option<String> {
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    async fn fake_upload(
        req: HttpRequest,
        received: SharedReceived,
        fail: web::Data<bool>,
        mut payload: Multipart,
    ) -> HttpResponse {
        let mut fields = Vec::new();
        while let Ok(Some(mut field)) = payload.try_next().await {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
            let mut bytes = Vec::new();
            while let Ok(Some(chunk)) = field.try_next().await {
                bytes.extend_from_slice(&chunk);
            }
            fields.push((name, filename, bytes));
        }

        {
            let mut received = received.lock().unwrap();
            received.auth_headers.push(auth_of(&req));
            received.upload_fields = fields;
        }

        if *fail.get_ref() {
            return HttpResponse::InternalServerError().body("upload quota exceeded");
        }
        HttpResponse::Ok().json(vec![REMOTE_PATH])
    }

    async fn fake_call(
        req: HttpRequest,
        received: SharedReceived,
        body: web::Json<Value>,
    ) -> HttpResponse {
        let mut received = received.lock().unwrap();
        received.auth_headers.push(auth_of(&req));
        received.call_body = Some(body.into_inner());
        HttpResponse::Ok().json(json!({ "event_id": EVENT_ID }))
    }

    async fn fake_result(
        req: HttpRequest,
        received: SharedReceived,
        event_id: web::Path<String>,
    ) -> HttpResponse {
        let mut received = received.lock().unwrap();
        received.auth_headers.push(auth_of(&req));
        received.result_event_id = Some(event_id.into_inner());
        HttpResponse::Ok().content_type("text/event-stream").body(
            "event: generating\ndata: null\n\n\
             event: complete\n\
             data: [{\"label\": \"Curl Virus\", \"confidences\": [{\"label\": \"Curl Virus\", \"confidence\": 0.8}]}, \"unused\"]\n\n",
        )
    }

    /// Serves the three Gradio routes on an ephemeral local port.
    async fn start_fake_space(fail_upload: bool) -> (String, SharedReceived, ServerHandle) {
        let received: SharedReceived = web::Data::new(Mutex::new(Received::default()));
        let data = received.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .app_data(web::Data::new(fail_upload))
                .route("/gradio_api/upload", web::post().to(fake_upload))
                .route("/gradio_api/call/predict", web::post().to(fake_call))
                .route("/gradio_api/call/predict/{event_id}", web::get().to(fake_result))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{}", addr), received, handle)
    }

    fn leaf_image() -> tempfile::NamedTempFile {
        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(b"leaf pixels").unwrap();
        image.flush().unwrap();
        image
    }

    #[actix_web::test]
    async fn submit_uploads_queues_and_reads_the_result() {
        let (base_url, received, handle) = start_fake_space(false).await;
        let client = client_with(&base_url, "/gradio_api", Some("hf_test"));
        let image = leaf_image();

        let output = client.submit(image.path(), "/predict").await.unwrap();
        assert_eq!(output["label"], "Curl Virus");
        assert_eq!(output["confidences"][0]["confidence"], 0.8);

        let received = received.lock().unwrap().clone();
        assert_eq!(received.upload_fields.len(), 1);
        let (name, filename, bytes) = &received.upload_fields[0];
        assert_eq!(name, "files");
        assert_eq!(
            filename.as_deref(),
            image.path().file_name().and_then(|n| n.to_str())
        );
        assert_eq!(bytes, b"leaf pixels");
        assert_eq!(
            received.call_body,
            Some(json!({
                "data": [{
                    "path": REMOTE_PATH,
                    "meta": { "_type": "gradio.FileData" }
                }]
            }))
        );
        assert_eq!(received.result_event_id.as_deref(), Some(EVENT_ID));
        assert_eq!(
            received.auth_headers,
            vec![Some("Bearer hf_test".to_string()); 3]
        );

        handle.stop(true).await;
    }

    #[actix_web::test]
    async fn failed_upload_is_a_remote_error_and_stops_the_call() {
        let (base_url, received, handle) = start_fake_space(true).await;
        let client = client(&base_url, "/gradio_api");
        let image = leaf_image();

        let err = client.submit(image.path(), "/predict").await.unwrap_err();
        match err {
            ClassifierError::Remote(message) => {
                assert!(message.contains("Upload failed with status 500"), "{}", message);
                assert!(message.contains("upload quota exceeded"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let received = received.lock().unwrap().clone();
        assert!(received.call_body.is_none());
        assert!(received.result_event_id.is_none());
        assert_eq!(received.auth_headers, vec![None]);

        handle.stop(true).await;
    }

    #[test]
    fn builds_urls_under_the_api_prefix() {
        let client = client("https://shoaibramim-cldd-resnet50.hf.space", "/gradio_api");
        assert_eq!(
            client.api_url("upload").unwrap().as_str(),
            "https://shoaibramim-cldd-resnet50.hf.space/gradio_api/upload"
        );
        assert_eq!(
            client.api_url("call/predict/abc123").unwrap().as_str(),
            "https://shoaibramim-cldd-resnet50.hf.space/gradio_api/call/predict/abc123"
        );
    }

    #[test]
    fn keeps_base_path_and_allows_empty_prefix() {
        let client = client("http://127.0.0.1:7860/proxy", "");
        assert_eq!(
            client.api_url("upload").unwrap().as_str(),
            "http://127.0.0.1:7860/proxy/upload"
        );
        assert_eq!(client.endpoint(), "http://127.0.0.1:7860/proxy/");
    }

    #[test]
    fn parses_complete_event() {
        let body = "event: generating\ndata: null\n\n\
                    event: complete\n\
                    data: [{\"label\": \"Healthy Leaf\", \"confidences\": [{\"label\": \"Healthy Leaf\", \"confidence\": 0.91}]}]\n\n";
        let output = parse_event_stream(body).unwrap();
        assert_eq!(output["label"], "Healthy Leaf");
        assert_eq!(output["confidences"][0]["confidence"], 0.91);
    }

    #[test]
    fn error_event_is_a_remote_error() {
        let err = parse_event_stream("event: error\ndata: null\n\n").unwrap_err();
        assert!(matches!(err, ClassifierError::Remote(_)));

        let err = parse_event_stream("event: error\ndata: \"GPU quota exceeded\"\n").unwrap_err();
        assert_eq!(err.to_string(), "Remote error: \"GPU quota exceeded\"");
    }

    #[test]
    fn stream_without_result_is_a_protocol_error() {
        let err = parse_event_stream("event: heartbeat\ndata: null\n\n").unwrap_err();
        assert!(matches!(err, ClassifierError::Protocol(_)));

        let err = parse_event_stream("event: complete\ndata: []\n").unwrap_err();
        assert!(matches!(err, ClassifierError::Protocol(_)));
    }
}
