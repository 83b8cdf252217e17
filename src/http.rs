//! HTTP transport abstraction for the REST clients.
//!
//! The history loader and the upload relay go through this trait instead of
//! calling reqwest directly so tests can substitute an in-memory transport
//! and exercise the status-code handling (403 vs everything else) without a
//! network. The default implementation wraps reqwest.

use async_trait::async_trait;

use crate::Error;

/// Raw response: status plus body text. Callers classify the status
/// themselves (a 403 on a history fetch means something different from a
/// 403 anywhere else).
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET with an optional bearer token.
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpResponse, Error>;

    /// Multipart form POST: every `(key, value)` pair plus the file bytes
    /// under the part name `file`. Used only by the direct-upload target,
    /// which is pre-authorized and carries no application auth.
    async fn post_multipart(
        &self,
        url: &str,
        fields: Vec<(String, String)>,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<HttpResponse, Error>;
}

#[derive(Clone, Default)]
pub struct DefaultHttpTransport {
    client: reqwest::Client,
}

impl DefaultHttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for DefaultHttpTransport {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpResponse, Error> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn post_multipart(
        &self,
        url: &str,
        fields: Vec<(String, String)>,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<HttpResponse, Error> {
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in fields {
            form = form.text(key, value);
        }
        form = form.part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self.client.post(url).multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
