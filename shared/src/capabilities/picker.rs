use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachment::{
    IMAGE_TOO_LARGE_NOTICE, MAX_ATTACHMENT_BYTES, PHOTO_PERMISSION_NOTICE, UNREADABLE_IMAGE_NOTICE,
};

/// Asks the shell to let the user choose an image from the device.
#[derive(Clone)]
pub struct ImagePicker<E> {
    context: CapabilityContext<PickerOperation, E>,
}

impl<Ev> Capability<Ev> for ImagePicker<Ev> {
    type Operation = PickerOperation;
    type MappedSelf<MappedEv> = ImagePicker<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        ImagePicker::new(self.context.map_event(f))
    }
}

impl<E> ImagePicker<E> {
    pub fn new(context: CapabilityContext<PickerOperation, E>) -> Self {
        Self { context }
    }
}

impl<E> ImagePicker<E>
where
    E: Send + 'static,
{
    pub fn pick_image<F>(&self, config: PickConfig, callback: F)
    where
        F: FnOnce(PickerResult) -> E + Send + 'static,
    {
        let config = config.validated();
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx
                .request_from_shell(PickerOperation::PickImage { config })
                .await;
            ctx.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PickerOperation {
    PickImage { config: PickConfig },
}

impl Operation for PickerOperation {
    type Output = PickerResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickConfig {
    /// MIME patterns the picker should offer.
    pub accept: Vec<String>,
    pub max_file_size: usize,
}

impl Default for PickConfig {
    fn default() -> Self {
        Self {
            accept: vec!["image/*".to_string()],
            max_file_size: MAX_ATTACHMENT_BYTES,
        }
    }
}

impl PickConfig {
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.max_file_size = self.max_file_size.clamp(1, MAX_ATTACHMENT_BYTES);
        self.accept.retain(|a| a.starts_with("image/"));
        if self.accept.is_empty() {
            self.accept.push("image/*".to_string());
        }
        self
    }
}

/// Bytes the user picked, plus a local reference the shell can preview.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickedImage {
    pub uri: String,
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl std::fmt::Debug for PickedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickedImage")
            .field("uri", &self.uri)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum PickerError {
    #[error("picker cancelled by user")]
    Cancelled,

    #[error("photo library permission denied")]
    PermissionDenied,

    #[error("file too large: {size} bytes, max {max_size}")]
    TooLarge { size: usize, max_size: usize },

    #[error("could not read picked file: {reason}")]
    Io { reason: String },
}

impl PickerError {
    /// What to tell the user, if anything. Cancelling is not a failure.
    #[must_use]
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            PickerError::Cancelled => None,
            PickerError::PermissionDenied => Some(PHOTO_PERMISSION_NOTICE),
            PickerError::TooLarge { .. } => Some(IMAGE_TOO_LARGE_NOTICE),
            PickerError::Io { .. } => Some(UNREADABLE_IMAGE_NOTICE),
        }
    }
}

pub type PickerResult = Result<PickedImage, PickerError>;
