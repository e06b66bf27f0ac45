use crate::types::{Backend, GpuCount, ParseValueError, Precision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid model id '{0}', must be in 'org/model' form")]
    InvalidModelId(String),

    #[error(transparent)]
    InvalidValue(#[from] ParseValueError),
}

/// A validated request to resolve one model against local hardware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub model_id: String,
    pub gpu_count: Option<GpuCount>,
    pub precision: Option<Precision>,
    pub backend: Backend,
}

impl ResolutionRequest {
    pub fn new(model_id: impl Into<String>, backend: Backend) -> Result<Self, ValidationError> {
        let model_id = model_id.into();
        if model_id.trim().is_empty() || !model_id.contains('/') {
            return Err(ValidationError::InvalidModelId(model_id));
        }
        Ok(Self {
            model_id,
            gpu_count: None,
            precision: None,
            backend,
        })
    }

    pub fn with_gpu_count(mut self, gpu_count: GpuCount) -> Self {
        self.gpu_count = Some(gpu_count);
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Validate raw user input
    pub fn parse(
        model_id: &str,
        gpu_count: Option<u32>,
        precision: Option<&str>,
        backend: &str,
    ) -> Result<Self, ValidationError> {
        let backend: Backend = backend.parse()?;
        let mut request = Self::new(model_id, backend)?;
        if let Some(count) = gpu_count {
            request = request.with_gpu_count(GpuCount::new(count)?);
        }
        if let Some(precision) = precision {
            request = request.with_precision(precision.parse()?);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let request = ResolutionRequest::parse("Qwen/Qwen3-32B", Some(4), Some("bf16"), "vllm").unwrap();
        assert_eq!(request.gpu_count.map(|g| g.get()), Some(4));
        assert_eq!(request.precision, Some(Precision::Bf16));
        assert_eq!(request.backend, Backend::Vllm);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(
            ResolutionRequest::parse("qwen3", None, None, "vllm"),
            Err(ValidationError::InvalidModelId(_))
        ));
        assert!(ResolutionRequest::parse("", None, None, "vllm").is_err());
        assert!(ResolutionRequest::parse("A/B", Some(0), None, "vllm").is_err());
        assert!(ResolutionRequest::parse("A/B", Some(9), None, "vllm").is_err());
        assert!(ResolutionRequest::parse("A/B", None, Some("fp32"), "vllm").is_err());
        assert!(ResolutionRequest::parse("A/B", None, None, "tgi").is_err());
    }
}
