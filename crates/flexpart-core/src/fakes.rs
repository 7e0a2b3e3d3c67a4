//! In-memory container runtime (testing only)
//!
//! `RecordingRuntime` satisfies [`ContainerRuntime`] without Docker: it knows a
//! configurable set of images, records every invocation and lets tests attach
//! per-image handlers that simulate the container's side effects on mounted
//! host directories.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::docker::{ContainerInvocation, ContainerOutput, ContainerRuntime, DockerError};

type RunHandler =
    Box<dyn Fn(&ContainerInvocation) -> Result<ContainerOutput, DockerError> + Send + Sync>;

/// Container runtime that records invocations instead of running them.
#[derive(Default)]
pub struct RecordingRuntime {
    images: Mutex<HashSet<String>>,
    handlers: Mutex<HashMap<String, RunHandler>>,
    invocations: Mutex<Vec<ContainerInvocation>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `image` as present locally.
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.images.lock().unwrap().insert(image.into());
        self
    }

    /// Handle every `run` of `image` with `handler`. Runs without a handler succeed
    /// with empty output.
    pub fn on_run<F>(self, image: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ContainerInvocation) -> Result<ContainerOutput, DockerError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(image.into(), Box::new(handler));
        self
    }

    /// Every invocation seen so far, in call order.
    pub fn invocations(&self) -> Vec<ContainerInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, DockerError> {
        Ok(self.images.lock().unwrap().contains(image))
    }

    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput, DockerError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(&invocation.image) {
            Some(handler) => handler(invocation),
            None => Ok(ContainerOutput::default()),
        }
    }
}
