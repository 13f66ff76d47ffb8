//! Post-capture steps.
//!
//! Each step degrades independently: a failed conversion keeps the raw
//! capture, a failed contact sheet or registration is only logged. The
//! pipeline stops early only when there is no captured file at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::engine::MediaEngine;
use super::session::SessionOutcome;
use crate::chat::{ChatCaptureSession, ChatService};
use crate::config::LivestreamConfig;
use crate::media_store::{MediaStore, RecordedFile, RecordedKind};
use crate::notification::Notifier;
use crate::utils::filename::{with_extension, with_suffix};
use crate::utils::hash::hash_file;

pub(crate) const CONVERTED_EXTENSION: &str = "mp4";
pub(crate) const CONTACT_SHEET_SUFFIX: &str = "_contact_sheet.jpg";

pub(crate) struct PostProcessor<'a> {
    pub engine: &'a dyn MediaEngine,
    pub store: &'a dyn MediaStore,
    pub notifier: &'a Notifier,
    pub settings: &'a LivestreamConfig,
    pub creator_id: &'a str,
    pub creator_name: &'a str,
}

impl PostProcessor<'_> {
    pub async fn run(
        &self,
        capture: &Path,
        chat: Option<(&ChatService, Arc<ChatCaptureSession>)>,
    ) -> SessionOutcome {
        if let Some((service, session)) = chat
            && let Err(e) = service.stop_exact(&session).await
        {
            warn!(creator_id = %self.creator_id, error = %e, "Failed to stop chat capture");
        }

        if !self.has_output(capture).await {
            warn!(
                creator_id = %self.creator_id,
                path = %capture.display(),
                "Capture produced no output"
            );
            return SessionOutcome::NoOutput;
        }

        let final_file = if self.settings.convert_to_mp4 {
            self.convert(capture).await
        } else {
            capture.to_path_buf()
        };

        self.register(&final_file, RecordedKind::Livestream).await;

        let contact_sheet = if self.settings.generate_contact_sheet {
            self.contact_sheet(&final_file).await
        } else {
            None
        };

        let final_name = final_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        self.notifier
            .notify_live_end(self.creator_name, self.creator_id, final_name);

        info!(
            creator_id = %self.creator_id,
            final_file = %final_file.display(),
            contact_sheet = contact_sheet.is_some(),
            "Recording finished"
        );

        SessionOutcome::Completed {
            final_file,
            contact_sheet,
        }
    }

    /// A capture counts only if it exists and is non-empty; an empty file is removed.
    async fn has_output(&self, capture: &Path) -> bool {
        match tokio::fs::metadata(capture).await {
            Ok(meta) if meta.len() > 0 => true,
            Ok(_) => {
                let _ = tokio::fs::remove_file(capture).await;
                false
            }
            Err(_) => false,
        }
    }

    /// Convert and return the file to keep; the original on failure.
    async fn convert(&self, capture: &Path) -> PathBuf {
        let converted = with_extension(capture, CONVERTED_EXTENSION);
        match self.engine.convert(capture, &converted).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(capture).await {
                    warn!(path = %capture.display(), error = %e, "Failed to delete original capture");
                }
                debug!(creator_id = %self.creator_id, output = %converted.display(), "Converted capture");
                converted
            }
            Err(e) => {
                warn!(
                    creator_id = %self.creator_id,
                    error = %e,
                    "Conversion failed; keeping original capture"
                );
                if tokio::fs::try_exists(&converted).await.unwrap_or(false) {
                    let _ = tokio::fs::remove_file(&converted).await;
                }
                capture.to_path_buf()
            }
        }
    }

    async fn contact_sheet(&self, source: &Path) -> Option<PathBuf> {
        let sheet = with_suffix(source, CONTACT_SHEET_SUFFIX);
        match self.engine.contact_sheet(source, &sheet).await {
            Ok(()) => {
                self.register(&sheet, RecordedKind::ContactSheet).await;
                Some(sheet)
            }
            Err(e) => {
                warn!(creator_id = %self.creator_id, error = %e, "Contact sheet generation failed");
                None
            }
        }
    }

    /// Hash `path` and record it in the media store (failures are logged).
    async fn register(&self, path: &Path, kind: RecordedKind) {
        let content_hash = match hash_file(path).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to hash recorded file");
                return;
            }
        };

        match self.store.exists(&content_hash).await {
            Ok(true) => {
                debug!(path = %path.display(), hash = %content_hash, "File already registered");
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Media store lookup failed; saving anyway"),
        }

        let file = RecordedFile {
            creator_name: self.creator_name.to_string(),
            content_hash,
            path: path.to_path_buf(),
            kind,
        };
        if let Err(e) = self.store.save(&file).await {
            warn!(path = %path.display(), kind = %kind, error = %e, "Failed to register recorded file");
        }
    }
}
