// src/upload.rs
//
// Two-phase attachment upload: obtain a pre-authorized direct-upload target
// from the backend, then POST the bytes straight to it. The stable content
// URL is returned only once the transfer itself has succeeded; the caller
// embeds it into a message body and owns any user-facing failure messaging.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::http::{DefaultHttpTransport, HttpTransport};
use crate::Error;

#[derive(Debug, Deserialize)]
struct UploadAuthorization {
    put_url: PutTarget,
    finalurl: String,
}

#[derive(Debug, Deserialize)]
struct PutTarget {
    url: String,
    #[serde(default)]
    fields: HashMap<String, String>,
}

pub struct UploadRelay {
    config: Arc<ChatConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl UploadRelay {
    pub fn new(config: Arc<ChatConfig>) -> Self {
        Self::with_transport(config, Arc::new(DefaultHttpTransport::new()))
    }

    pub fn with_transport(config: Arc<ChatConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// Uploads `bytes` and returns the stable content URL. Each call is
    /// independent; concurrent uploads are fine.
    pub async fn upload(&self, bytes: Vec<u8>, file_name_hint: &str) -> Result<String, Error> {
        let ext = extension_for(file_name_hint);

        // Phase 1: upload authorization. If this fails, no transfer is
        // attempted and no URL exists to leak.
        let auth_url = format!("{}/uploads/upload-url?ext={}", self.config.api_base, ext);
        let response = self
            .transport
            .get(&auth_url, Some(&self.config.access_token))
            .await?;
        if !response.is_success() {
            warn!("upload authorization failed: HTTP {}", response.status);
            return Err(Error::Upload(format!(
                "upload authorization returned HTTP {}",
                response.status
            )));
        }
        let auth: UploadAuthorization = serde_json::from_str(&response.body)
            .map_err(|e| Error::Upload(format!("malformed upload authorization: {}", e)))?;

        // Phase 2: direct transfer to the authorized target. The form fields
        // are the authorization; no application auth goes along.
        debug!("uploading {} byte(s) to {}", bytes.len(), auth.put_url.url);
        let fields: Vec<(String, String)> = auth.put_url.fields.into_iter().collect();
        let response = self
            .transport
            .post_multipart(&auth.put_url.url, fields, file_name_hint.to_string(), bytes)
            .await?;
        if !response.is_success() {
            warn!("direct upload failed: HTTP {}", response.status);
            return Err(Error::Upload(format!(
                "direct upload returned HTTP {}",
                response.status
            )));
        }

        Ok(auth.finalurl)
    }
}

/// File extension from a name hint, defaulting to `jpg` when there is none.
fn extension_for(file_name_hint: &str) -> String {
    match file_name_hint.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => "jpg".to_string(),
    }
}
