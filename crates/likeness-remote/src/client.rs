//! Blocking HTTP client for a DeepFace-compatible face service.
//!
//! Calls block the current thread; callers inside an async runtime must run
//! them on a dedicated thread.

use crate::wire::{
    self, AnalyzeRequest, AnalyzeResponse, VerifyRequest, VerifyResponse, ANALYZE_ACTIONS,
};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use likeness_core::{AttributeAnalyzer, CapabilityError, FaceComparer, RawAttributes};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const UPLOAD_JPEG_QUALITY: u8 = 90;

/// Connection settings for the remote face service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL, e.g. `http://127.0.0.1:5005`.
    pub base_url: String,
    /// Recognition model used by `/verify` (e.g. "Facenet", "ArcFace").
    pub model_name: String,
    /// Face detector backend (e.g. "opencv", "retinaface").
    pub detector_backend: String,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5005".to_string(),
            model_name: "Facenet".to_string(),
            detector_backend: "opencv".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Face comparison and attribute analysis backed by one remote service.
pub struct DeepFaceClient {
    http: reqwest::blocking::Client,
    config: RemoteConfig,
}

impl DeepFaceClient {
    pub fn new(config: RemoteConfig) -> Result<Self, CapabilityError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CapabilityError::Transport(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(
            base_url = %config.base_url,
            model = %config.model_name,
            detector = %config.detector_backend,
            "face service client ready"
        );

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, CapabilityError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| CapabilityError::Transport(format!("POST {url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| CapabilityError::Transport(format!("reading {url} response: {e}")))?;

        if !status.is_success() {
            return Err(wire::service_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| CapabilityError::Malformed(format!("{path} response: {e}")))
    }
}

impl FaceComparer for DeepFaceClient {
    fn compare(
        &self,
        probe: &RgbImage,
        reference: &RgbImage,
        tolerant: bool,
    ) -> Result<bool, CapabilityError> {
        let img1 = encode_data_url(probe)?;
        let img2 = encode_data_url(reference)?;
        let request = VerifyRequest {
            img1: &img1,
            img2: &img2,
            model_name: &self.config.model_name,
            detector_backend: &self.config.detector_backend,
            enforce_detection: !tolerant,
        };

        match self.post::<_, VerifyResponse>("verify", &request) {
            Ok(response) => {
                tracing::debug!(
                    verified = response.verified,
                    distance = ?response.distance,
                    threshold = ?response.threshold,
                    "verify answered"
                );
                Ok(response.verified)
            }
            Err(CapabilityError::NoFace) if tolerant => Ok(false),
            Err(err) => Err(err),
        }
    }
}

impl AttributeAnalyzer for DeepFaceClient {
    fn analyze(&self, image: &RgbImage, tolerant: bool) -> Result<RawAttributes, CapabilityError> {
        let img = encode_data_url(image)?;
        let request = AnalyzeRequest {
            img: &img,
            actions: &ANALYZE_ACTIONS,
            detector_backend: &self.config.detector_backend,
            enforce_detection: !tolerant,
        };

        let response: AnalyzeResponse = self.post("analyze", &request)?;
        let face = response.into_first().ok_or(CapabilityError::NoFace)?;
        Ok(face.into())
    }
}

/// JPEG-encode `image` as a `data:` URL, the form DeepFace accepts inline.
pub fn encode_data_url(image: &RgbImage) -> Result<String, CapabilityError> {
    let mut jpeg = Vec::new();
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, UPLOAD_JPEG_QUALITY))
        .map_err(|e| CapabilityError::Encode(e.to_string()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&jpeg);
    Ok(format!("data:image/jpeg;base64,{encoded}"))
}
