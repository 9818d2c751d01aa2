//! Application settings read from Rocket's figment under the `parking` key.
//!
//! ```toml
//! [default.parking]
//! upload_dir = "assets"
//! recognizer_command = "tesseract"
//! ```

use std::path::PathBuf;

use rocket::fairing::AdHoc;
use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

fn default_upload_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_recognizer_command() -> String {
    "tesseract".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingConfig {
    /// Where uploaded plate images are written before recognition.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// OCR program invoked as `<command> <image> stdout`.
    #[serde(default = "default_recognizer_command")]
    pub recognizer_command: String,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        ParkingConfig {
            upload_dir: default_upload_dir(),
            recognizer_command: default_recognizer_command(),
        }
    }
}

impl ParkingConfig {
    /// Extracts the `parking` table, falling back to defaults when it is absent.
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        match figment.extract_inner::<ParkingConfig>("parking") {
            Ok(config) => Ok(config),
            Err(e) if e.missing() => Ok(ParkingConfig::default()),
            Err(e) => Err(e),
        }
    }
}

/// Creates a fairing that places [`ParkingConfig`] in managed state.
/// Ignition is aborted if the `parking` table is malformed.
pub fn config_fairing() -> AdHoc {
    AdHoc::try_on_ignite("Parking Config", |rocket| async {
        match ParkingConfig::from_figment(rocket.figment()) {
            Ok(config) => {
                info!("Upload directory: {}", config.upload_dir.display());
                info!("Plate recognizer: {}", config.recognizer_command);
                Ok(rocket.manage(config))
            }
            Err(e) => {
                error!("Invalid parking configuration: {}", e);
                Err(rocket)
            }
        }
    })
}
