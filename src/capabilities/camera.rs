//! Camera capture capability for summit photos.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraOperation {
    /// Open the system capture UI. The shell downsizes to at most
    /// `max_dimension` pixels on the long edge before handing bytes back.
    Capture { max_dimension: u32, quality: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPhoto {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available")]
    Unavailable,
    #[error("user cancelled capture")]
    Cancelled,
    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },
}

pub type CameraResult = Result<CapturedPhoto, CameraError>;

impl Operation for CameraOperation {
    type Output = CameraResult;
}

pub struct Camera<Ev> {
    context: CapabilityContext<CameraOperation, Ev>,
}

impl<Ev> Camera<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<CameraOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn capture<F>(&self, max_dimension: u32, quality: u8, make_event: F)
    where
        F: FnOnce(CameraResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context
                .request_from_shell(CameraOperation::Capture {
                    max_dimension,
                    quality,
                })
                .await;
            context.update_app(make_event(response));
        });
    }
}

impl<Ev> Capability<Ev> for Camera<Ev> {
    type Operation = CameraOperation;
    type MappedSelf<MappedEv> = Camera<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Camera::new(self.context.map_event(f))
    }
}
