//! The upload/convert controller.
//!
//! [`ConverterWidget`] owns everything a file-picker-plus-convert-button UI
//! needs: the picked file, the editable output name, the quality tier, the
//! progress bar and status line, and the state machine that decides whether
//! the convert trigger is enabled.
//!
//! ```text
//!  Idle ──pick──▶ FileSelected ──convert──▶ Converting ──▶ Succeeded
//!                     ▲   ▲                      │
//!                     │   └──────pick────────────┼───── Failed
//!                     └─────acknowledge──────────┘
//! ```
//!
//! `convert` takes `&mut self`, so a second conversion cannot start while one
//! is in flight; there is no queue and no automatic retry.

use crate::backend::{Backend, ConversionBackend};
use crate::config::{ConversionConfig, QualityTier};
use crate::deliver::{save_download, Delivery};
use crate::error::ConvertError;
use crate::naming::{download_filename, propose_output_name};
use crate::progress::{checkpoints, ProgressCallback, ProgressState, ProgressTracker};
use crate::request::{ConversionRequest, ConvertedAudio, SelectedFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the widget is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WidgetState {
    Idle,
    FileSelected,
    Converting,
    Succeeded,
    Failed,
}

/// Raw input from the drop zone and file picker.
#[derive(Debug, Clone)]
pub enum IntakeEvent {
    /// Pointer click on the drop zone.
    Browse,
    /// Key pressed while the drop zone has focus, by key name
    /// (`"Enter"`, `" "`, `"Space"`, …).
    Key(String),
    DragOver,
    DragLeave,
    /// Files dropped on the zone; only the first is used.
    Drop(Vec<SelectedFile>),
    /// Files returned by the picker dialog; only the first is used.
    Picked(Vec<SelectedFile>),
}

/// What the host UI should do after an [`IntakeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Show the native file picker.
    OpenPicker,
    /// A file was taken.
    FileSelected,
    /// Drop-zone highlight toggled.
    HoverChanged,
    Ignored,
}

/// Upload/convert controller generic over the conversion strategy.
#[derive(Debug)]
pub struct ConverterWidget<B: ConversionBackend = Backend> {
    backend: B,
    state: WidgetState,
    selected: Option<SelectedFile>,
    picked_name: String,
    output_name: String,
    quality: QualityTier,
    hover: bool,
    output_dir: PathBuf,
    progress: Arc<ProgressTracker>,
}

impl ConverterWidget<Backend> {
    /// Build a widget with the backend selected by `config.strategy`.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, ConvertError> {
        let backend = Backend::from_config(config)?;
        let mut widget = Self::new(
            backend,
            config.output_dir.clone(),
            config.progress_callback.clone(),
        );
        widget.quality = config.quality;
        Ok(widget)
    }
}

impl<B: ConversionBackend> ConverterWidget<B> {
    pub fn new(backend: B, output_dir: impl Into<PathBuf>, observer: Option<ProgressCallback>) -> Self {
        Self {
            backend,
            state: WidgetState::Idle,
            selected: None,
            picked_name: String::new(),
            output_name: String::new(),
            quality: QualityTier::default(),
            hover: false,
            output_dir: output_dir.into(),
            progress: Arc::new(ProgressTracker::new(observer)),
        }
    }

    // ── Intake ───────────────────────────────────────────────────────────

    /// Route a drop-zone or picker event.
    pub fn dispatch(&mut self, event: IntakeEvent) -> IntakeOutcome {
        match event {
            IntakeEvent::Browse => IntakeOutcome::OpenPicker,
            IntakeEvent::Key(key) => match key.as_str() {
                "Enter" | " " | "Space" | "Spacebar" => IntakeOutcome::OpenPicker,
                _ => IntakeOutcome::Ignored,
            },
            IntakeEvent::DragOver => self.set_hover(true),
            IntakeEvent::DragLeave => self.set_hover(false),
            IntakeEvent::Drop(files) => {
                self.hover = false;
                self.take_first(files)
            }
            IntakeEvent::Picked(files) => self.take_first(files),
        }
    }

    /// Retain `file`, replacing any earlier pick.
    ///
    /// Shows the file name, proposes an output name, and clears the status
    /// line and progress from the previous attempt.
    pub fn select_file(&mut self, file: SelectedFile) {
        debug!("Selected '{}' ({} bytes)", file.name(), file.size());
        self.picked_name = file.name().to_string();
        self.output_name = propose_output_name(file.name());
        self.selected = Some(file);
        self.progress.reset("");
        self.state = WidgetState::FileSelected;
    }

    fn take_first(&mut self, files: Vec<SelectedFile>) -> IntakeOutcome {
        match files.into_iter().next() {
            Some(file) => {
                self.select_file(file);
                IntakeOutcome::FileSelected
            }
            None => IntakeOutcome::Ignored,
        }
    }

    fn set_hover(&mut self, hover: bool) -> IntakeOutcome {
        if self.hover == hover {
            return IntakeOutcome::Ignored;
        }
        self.hover = hover;
        IntakeOutcome::HoverChanged
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> WidgetState {
        self.state
    }

    /// Read-only display of the chosen file's name.
    pub fn picked_name(&self) -> &str {
        &self.picked_name
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Let the user edit the proposed name. Sanitised when the request is built.
    pub fn set_output_name(&mut self, name: impl Into<String>) {
        self.output_name = name.into();
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn set_quality(&mut self, quality: QualityTier) {
        self.quality = quality;
    }

    /// Set the tier from a select-box value; unknown values mean medium.
    pub fn set_quality_str(&mut self, value: &str) {
        self.quality = QualityTier::parse_lenient(value);
    }

    pub fn is_hovering(&self) -> bool {
        self.hover
    }

    pub fn progress(&self) -> ProgressState {
        self.progress.snapshot()
    }

    pub fn status(&self) -> String {
        self.progress.status()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether the convert trigger is enabled.
    pub fn can_convert(&self) -> bool {
        self.selected.is_some() && self.state != WidgetState::Converting
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Run one conversion attempt and save the result.
    ///
    /// Every error is also reflected in the status line with progress reset
    /// to 0; the trigger is enabled again afterwards either way.
    pub async fn convert(&mut self) -> Result<Delivery, ConvertError> {
        let Some(file) = self.selected.clone() else {
            self.progress
                .set_status(ConvertError::NoFileSelected.status_message());
            return Err(ConvertError::NoFileSelected);
        };

        self.state = WidgetState::Converting;
        self.progress.reset("");
        if let Some(cb) = self.progress.observer() {
            cb.on_conversion_start(file.name(), file.size());
        }
        info!(
            "Converting '{}' via {} backend at {}",
            file.name(),
            self.backend.name(),
            self.quality.bitrate()
        );

        let request = ConversionRequest::new(file, &self.output_name, self.quality);
        let result = match self.backend.convert(&request, &self.progress).await {
            Ok(audio) => self.deliver(&request, audio).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(delivery) => {
                self.state = WidgetState::Succeeded;
                self.progress
                    .advance(checkpoints::DONE, format!("Done! Saved {}", delivery.filename));
                if let Some(cb) = self.progress.observer() {
                    cb.on_conversion_complete(&delivery.filename, delivery.bytes);
                }
                Ok(delivery)
            }
            Err(e) => {
                warn!("Conversion failed: {e}");
                self.state = WidgetState::Failed;
                let message = e.status_message();
                self.progress.reset(message.as_str());
                if let Some(cb) = self.progress.observer() {
                    cb.on_conversion_error(&message);
                }
                Err(e)
            }
        }
    }

    /// Clear the full progress bar once the success message has been seen.
    pub fn acknowledge(&mut self) {
        if self.state == WidgetState::Succeeded {
            self.progress.reset_percent();
            self.state = WidgetState::FileSelected;
        }
    }

    async fn deliver(&self, request: &ConversionRequest, audio: ConvertedAudio) -> Result<Delivery, ConvertError> {
        let filename = match audio.suggested_filename {
            Some(ref server_name) => download_filename(server_name),
            None => download_filename(&request.output_name),
        };
        self.progress.advance(checkpoints::DELIVERING, "Saving…");
        save_download(&self.output_dir, &filename, &audio.data).await
    }
}
