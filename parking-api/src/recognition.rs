//! License-plate recognition from uploaded images.
//!
//! The OCR engine is a black box behind [`PlateRecognizer`]. Its output is
//! sanitised and fed into the normal reservation path, so a recognized plate
//! goes through exactly the same validation as a typed one.

use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use rocket::fairing::AdHoc;
use thiserror::Error;

use crate::config::ParkingConfig;
use crate::lifecycle::ParkingError;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("recognized text is not valid UTF-8")]
    Encoding,
}

/// Reads the text printed on a plate image.
pub trait PlateRecognizer: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<String, RecognitionError>;
}

/// Recognizer shared between requests through Rocket managed state.
pub type SharedRecognizer = Arc<dyn PlateRecognizer>;

/// Runs the `tesseract` command-line program and returns what it prints.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>) -> Self {
        TesseractCli {
            command: command.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        TesseractCli::new("tesseract")
    }
}

impl PlateRecognizer for TesseractCli {
    fn recognize(&self, image: &Path) -> Result<String, RecognitionError> {
        let output = Command::new(&self.command)
            .arg(image)
            .arg("stdout")
            .output()
            .map_err(|source| RecognitionError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RecognitionError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| RecognitionError::Encoding)
    }
}

/// Recognizes the image and strips everything that cannot be part of a plate.
pub fn recognize_plate(
    recognizer: &dyn PlateRecognizer,
    image: &Path,
) -> Result<String, ParkingError> {
    match recognizer.recognize(image) {
        Ok(raw) => {
            let text = plate::sanitize(&raw);
            info!("Recognized plate text {:?} from {}", text, image.display());
            Ok(text)
        }
        Err(e) => {
            warn!("Image recognition failed for {}: {}", image.display(), e);
            Err(ParkingError::RecognitionFailed)
        }
    }
}

/// Creates a fairing that manages a [`TesseractCli`] built from
/// [`ParkingConfig`], unless a recognizer is already managed.
pub fn recognizer_fairing() -> AdHoc {
    AdHoc::on_ignite("Plate Recognizer", |rocket| async {
        if rocket.state::<SharedRecognizer>().is_some() {
            return rocket;
        }
        let command = rocket
            .state::<ParkingConfig>()
            .map(|config| config.recognizer_command.clone())
            .unwrap_or_else(|| ParkingConfig::default().recognizer_command);
        let recognizer: SharedRecognizer = Arc::new(TesseractCli::new(command));
        rocket.manage(recognizer)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ParkingService;
    use crate::lifecycle::tests::MemoryStore;

    struct StubRecognizer(Option<&'static str>);

    impl PlateRecognizer for StubRecognizer {
        fn recognize(&self, _image: &Path) -> Result<String, RecognitionError> {
            self.0.map(str::to_string).ok_or(RecognitionError::Encoding)
        }
    }

    fn image() -> &'static Path {
        Path::new("assets/upload-test.png")
    }

    #[test]
    fn test_recognized_text_is_sanitized_and_reserved() {
        let mut service = ParkingService::new(MemoryStore::default());
        let recognizer = StubRecognizer(Some(" ABC-1234\n\x0c"));

        let text = recognize_plate(&recognizer, image()).unwrap();
        assert_eq!(text, "ABC-1234");
        assert_eq!(service.reserve_recognized(&text), Ok(1));
        assert_eq!(service.into_store().rows[0].plate, "ABC-1234");
    }

    #[test]
    fn test_unreadable_plate_reports_text() {
        let mut service = ParkingService::new(MemoryStore::default());
        let recognizer = StubRecognizer(Some("A8C 1234."));

        let text = recognize_plate(&recognizer, image()).unwrap();
        assert_eq!(
            service.reserve_recognized(&text),
            Err(ParkingError::UnreadablePlate("A8C1234".to_string()))
        );
        assert_eq!(service.into_store().calls, 0);
    }

    #[test]
    fn test_recognition_failure_is_distinct() {
        assert_eq!(
            recognize_plate(&StubRecognizer(None), image()),
            Err(ParkingError::RecognitionFailed)
        );
    }

    #[test]
    fn test_missing_ocr_program() {
        let recognizer = TesseractCli::new("parking-no-such-ocr-program");

        let err = recognizer.recognize(image()).unwrap_err();
        assert!(matches!(err, RecognitionError::Spawn { .. }));
        assert_eq!(
            recognize_plate(&recognizer, image()),
            Err(ParkingError::RecognitionFailed)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_ocr_program_failure() {
        let err = TesseractCli::new("false").recognize(image()).unwrap_err();
        assert!(matches!(err, RecognitionError::Failed { .. }));
    }
}
