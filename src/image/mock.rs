use super::Transcoder;
use crate::models::{compression_ratio_percent, ImageKind, ResizeSpec, TranscodeResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MockTranscoder {
    transform_count: Arc<Mutex<usize>>,
    output: Arc<Mutex<Option<Vec<u8>>>>,
    should_fail: Arc<Mutex<bool>>,
    failing_inputs: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self {
            transform_count: Arc::new(Mutex::new(0)),
            output: Arc::new(Mutex::new(None)),
            should_fail: Arc::new(Mutex::new(false)),
            failing_inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always return these bytes instead of halving the input.
    pub fn with_output(self, output: Vec<u8>) -> Self {
        *self.output.lock().unwrap() = Some(output);
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    /// Fail only when handed exactly these bytes.
    pub fn with_failing_input(self, input: Vec<u8>) -> Self {
        self.failing_inputs.lock().unwrap().push(input);
        self
    }

    pub fn get_transform_count(&self) -> usize {
        *self.transform_count.lock().unwrap()
    }
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn transform(&self, image_data: &[u8], spec: &ResizeSpec) -> Result<TranscodeResult> {
        *self.transform_count.lock().unwrap() += 1;

        spec.validate()?;
        if *self.should_fail.lock().unwrap()
            || self
                .failing_inputs
                .lock()
                .unwrap()
                .iter()
                .any(|input| input == image_data)
        {
            return Err(Error::Decode("Mock failure".to_string()));
        }

        let bytes = self
            .output
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| image_data[..image_data.len() / 2].to_vec());

        Ok(TranscodeResult {
            original_byte_length: image_data.len(),
            new_byte_length: bytes.len(),
            compression_ratio_percent: compression_ratio_percent(image_data.len(), bytes.len()),
            bytes,
            source_format: "jpeg".to_string(),
            resolved_format: spec.output_format.map(Into::into).unwrap_or(ImageKind::Jpeg),
            width: spec.width.unwrap_or(1),
            height: spec.height.unwrap_or(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutputFormat;

    #[tokio::test]
    async fn test_mock_transcoder_halves_input() {
        let transcoder = MockTranscoder::new();

        let result = transcoder
            .transform(b"12345678", &ResizeSpec::new())
            .await
            .unwrap();

        assert_eq!(result.bytes, b"1234");
        assert_eq!(result.byte_savings(), 4);
        assert_eq!(result.compression_ratio_percent, 50.0);
        assert_eq!(transcoder.get_transform_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_transcoder_respects_output_format() {
        let transcoder = MockTranscoder::new().with_output(b"out".to_vec());

        let spec = ResizeSpec::new().with_output_format(OutputFormat::Png);
        let result = transcoder.transform(b"input", &spec).await.unwrap();

        assert_eq!(result.bytes, b"out");
        assert_eq!(result.resolved_format, ImageKind::Png);
    }

    #[tokio::test]
    async fn test_mock_transcoder_failures() {
        let transcoder = MockTranscoder::new().with_failing_input(b"bad".to_vec());

        assert!(transcoder
            .transform(b"bad", &ResizeSpec::new())
            .await
            .is_err());
        assert!(transcoder
            .transform(b"good", &ResizeSpec::new())
            .await
            .is_ok());

        let always = MockTranscoder::new().with_failure(true);
        assert!(always.transform(b"good", &ResizeSpec::new()).await.is_err());
    }
}
